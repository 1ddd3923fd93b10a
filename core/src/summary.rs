//! Entry totals, the daily nutrition summary, and the week-over-week comparison.
//!
//! Everything here works on rows the caller already fetched.

use std::collections::HashSet;

use chrono::{Duration, NaiveDate};
use serde::Serialize;

use crate::clock::start_of_week;
use crate::models::{
    CalorieEntry, ExerciseEntry, FoodItem, MealType, NutritionTotals, round_places,
};

/// Nutrients for `quantity` of `food`, each field rounded to 2 decimals.
#[must_use]
pub fn entry_totals(food: &FoodItem, quantity: f64) -> NutritionTotals {
    food.nutrients.scale(food.multiplier(quantity)).rounded(2)
}

#[derive(Debug, Clone, Serialize)]
pub struct MealGroup {
    pub meal_type: MealType,
    pub entries: Vec<CalorieEntry>,
    pub totals: NutritionTotals,
}

#[derive(Debug, Clone, Serialize)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub goals: NutritionTotals,
    pub actual_intake: NutritionTotals,
    pub actual_consumption: NutritionTotals,
    pub remaining: NutritionTotals,
    pub meals: Vec<MealGroup>,
    pub exercises: Vec<ExerciseEntry>,
}

/// Build one day's summary. Entries for other dates are the caller's
/// problem; this groups whatever it is given.
#[must_use]
pub fn daily_summary(
    date: NaiveDate,
    goals: NutritionTotals,
    entries: Vec<CalorieEntry>,
    exercises: Vec<ExerciseEntry>,
) -> DailySummary {
    let mut meals = Vec::new();
    for meal_type in MealType::ALL {
        let group: Vec<CalorieEntry> = entries
            .iter()
            .filter(|e| e.meal_type == meal_type)
            .cloned()
            .collect();
        if group.is_empty() {
            continue;
        }
        let totals = group.iter().map(|e| e.totals).sum();
        meals.push(MealGroup {
            meal_type,
            entries: group,
            totals,
        });
    }

    let actual_intake: NutritionTotals = entries.iter().map(|e| e.totals).sum();
    let burned: f64 = exercises.iter().map(|e| e.calories_burned).sum();
    let actual_consumption = NutritionTotals::calories_only(burned);

    // Exercise widens the budget; remaining never goes negative.
    let remaining = goals
        .zip_with(actual_intake, |goal, intake| goal - intake)
        .zip_with(actual_consumption, |left, burned| (left + burned).max(0.0));

    DailySummary {
        date,
        goals,
        actual_intake,
        actual_consumption,
        remaining,
        meals,
        exercises,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct WeeklyAverages {
    pub calories: f64,
    pub carbs: f64,
    pub protein: f64,
    pub fats: f64,
    pub exercise: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct WeeklyComparison {
    pub current_week: WeeklyAverages,
    pub last_week: WeeklyAverages,
    pub current_week_start: NaiveDate,
    pub current_week_end: NaiveDate,
    pub last_week_start: NaiveDate,
    pub last_week_end: NaiveDate,
}

/// `(current_start, current_end, last_start, last_end)` for the Monday to
/// Sunday week containing `today` and the week before it.
#[must_use]
pub fn week_bounds(today: NaiveDate) -> (NaiveDate, NaiveDate, NaiveDate, NaiveDate) {
    let current_start = start_of_week(today);
    let current_end = current_start + Duration::days(6);
    let last_start = current_start - Duration::days(7);
    let last_end = current_start - Duration::days(1);
    (current_start, current_end, last_start, last_end)
}

/// Averages per day *with data*, not per calendar day: a week with one
/// logged day averages to that day's total.
#[allow(clippy::cast_precision_loss)]
fn window_averages(
    start: NaiveDate,
    end: NaiveDate,
    entries: &[CalorieEntry],
    exercises: &[ExerciseEntry],
) -> WeeklyAverages {
    let in_window = |d: NaiveDate| d >= start && d <= end;

    let mut nutrition_dates = HashSet::new();
    let mut sum = NutritionTotals::ZERO;
    for entry in entries.iter().filter(|e| in_window(e.date)) {
        sum += entry.totals;
        nutrition_dates.insert(entry.date);
    }

    let mut exercise_dates = HashSet::new();
    let mut burned = 0.0;
    for ex in exercises.iter().filter(|e| in_window(e.date)) {
        burned += ex.calories_burned;
        exercise_dates.insert(ex.date);
    }

    let days = nutrition_dates.len().max(1) as f64;
    let exercise_days = exercise_dates.len().max(1) as f64;

    WeeklyAverages {
        calories: round_places(sum.calories / days, 1),
        carbs: round_places(sum.carbs_g / days, 1),
        protein: round_places(sum.protein_g / days, 1),
        fats: round_places(sum.fat_g / days, 1),
        exercise: round_places(burned / exercise_days, 1),
    }
}

/// Compare this week with last week. `entries` and `exercises` may span any
/// range; only rows inside the two windows count.
#[must_use]
pub fn weekly_comparison(
    today: NaiveDate,
    entries: &[CalorieEntry],
    exercises: &[ExerciseEntry],
) -> WeeklyComparison {
    let (current_start, current_end, last_start, last_end) = week_bounds(today);
    WeeklyComparison {
        current_week: window_averages(current_start, current_end, entries, exercises),
        last_week: window_averages(last_start, last_end, entries, exercises),
        current_week_start: current_start,
        current_week_end: current_end,
        last_week_start: last_start,
        last_week_end: last_end,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::goals::DEFAULT_DAILY_GOALS;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn chicken() -> FoodItem {
        FoodItem {
            id: 1,
            name: "Chicken Breast".to_string(),
            serving_size: "1 serving".to_string(),
            reference_amount: None,
            nutrients: NutritionTotals {
                calories: 165.0,
                protein_g: 31.0,
                carbs_g: 0.0,
                fat_g: 3.6,
                fiber_g: 0.0,
                sodium_mg: 0.0,
            },
            source: "manual".to_string(),
            fdc_id: None,
            created_at: String::new(),
        }
    }

    fn flat_food(calories: f64, carbs: f64, protein: f64, fat: f64) -> FoodItem {
        FoodItem {
            nutrients: NutritionTotals {
                calories,
                protein_g: protein,
                carbs_g: carbs,
                fat_g: fat,
                ..NutritionTotals::ZERO
            },
            ..chicken()
        }
    }

    fn entry(id: i64, food: &FoodItem, quantity: f64, meal: MealType, date: NaiveDate) -> CalorieEntry {
        CalorieEntry {
            id,
            user_id: 1,
            food_item_id: food.id,
            meal_type: meal,
            quantity,
            unit: "serving".to_string(),
            date,
            created_at: String::new(),
            food_item: food.clone(),
            totals: entry_totals(food, quantity),
        }
    }

    fn exercise(id: i64, calories: f64, date: NaiveDate) -> ExerciseEntry {
        ExerciseEntry {
            id,
            user_id: 1,
            name: "Running".to_string(),
            calories_burned: calories,
            date,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn test_entry_totals_quantity_one() {
        let totals = entry_totals(&chicken(), 1.0);
        assert_eq!(totals, chicken().nutrients);
    }

    #[test]
    fn test_entry_totals_linear() {
        let food = chicken();
        for q in [0.5, 1.0, 1.5, 3.0] {
            let single = entry_totals(&food, q);
            let double = entry_totals(&food, 2.0 * q);
            assert!((double.calories - 2.0 * single.calories).abs() < 0.011);
            assert!((double.fat_g - 2.0 * single.fat_g).abs() < 0.011);
        }
    }

    #[test]
    fn test_entry_totals_rounds_to_two_places() {
        let totals = entry_totals(&chicken(), 1.0 / 3.0);
        assert!((totals.calories - 55.0).abs() < 1e-9);
        assert!((totals.fat_g - 1.2).abs() < 1e-9);
        assert!((totals.protein_g - 10.33).abs() < 1e-9);
    }

    #[test]
    fn test_entry_totals_reference_amount() {
        let food = FoodItem {
            serving_size: "100g".to_string(),
            reference_amount: Some(100.0),
            nutrients: NutritionTotals {
                calories: 300.0,
                protein_g: 25.0,
                carbs_g: 30.0,
                fat_g: 10.0,
                ..NutritionTotals::ZERO
            },
            ..chicken()
        };
        let totals = entry_totals(&food, 50.0);
        assert!((totals.calories - 150.0).abs() < f64::EPSILON);
        assert!((totals.protein_g - 12.5).abs() < f64::EPSILON);
        assert!((totals.carbs_g - 15.0).abs() < f64::EPSILON);
        assert!((totals.fat_g - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_daily_summary_single_breakfast() {
        let date = day(2024, 6, 15);
        let food = chicken();
        let summary = daily_summary(
            date,
            DEFAULT_DAILY_GOALS,
            vec![entry(1, &food, 1.0, MealType::Breakfast, date)],
            vec![],
        );
        assert_eq!(summary.meals.len(), 1);
        assert_eq!(summary.meals[0].meal_type, MealType::Breakfast);
        assert_eq!(summary.meals[0].totals, food.nutrients);
        assert_eq!(summary.actual_intake, food.nutrients);
        assert!((summary.remaining.calories - 1835.0).abs() < 1e-9);
        assert!((summary.remaining.protein_g - 119.0).abs() < 1e-9);
    }

    #[test]
    fn test_daily_summary_meal_order_and_omission() {
        let date = day(2024, 6, 15);
        let food = chicken();
        let summary = daily_summary(
            date,
            DEFAULT_DAILY_GOALS,
            vec![
                entry(1, &food, 1.0, MealType::InBetween, date),
                entry(2, &food, 1.0, MealType::Dinner, date),
                entry(3, &food, 2.0, MealType::Breakfast, date),
                entry(4, &food, 1.0, MealType::Dinner, date),
            ],
            vec![],
        );
        let order: Vec<MealType> = summary.meals.iter().map(|m| m.meal_type).collect();
        assert_eq!(
            order,
            vec![MealType::Breakfast, MealType::Dinner, MealType::InBetween]
        );
        assert_eq!(summary.meals[1].entries.len(), 2);
        assert!((summary.meals[1].totals.calories - 330.0).abs() < 1e-9);
        assert!((summary.actual_intake.calories - 825.0).abs() < 1e-9);
    }

    #[test]
    fn test_daily_summary_empty_day() {
        let summary = daily_summary(day(2024, 6, 15), DEFAULT_DAILY_GOALS, vec![], vec![]);
        assert!(summary.meals.is_empty());
        assert_eq!(summary.actual_intake, NutritionTotals::ZERO);
        assert_eq!(summary.actual_consumption, NutritionTotals::ZERO);
        assert_eq!(summary.remaining, DEFAULT_DAILY_GOALS);
    }

    #[test]
    fn test_daily_summary_exercise_extends_budget() {
        let date = day(2024, 6, 15);
        let food = flat_food(500.0, 50.0, 20.0, 10.0);
        let summary = daily_summary(
            date,
            DEFAULT_DAILY_GOALS,
            vec![entry(1, &food, 1.0, MealType::Lunch, date)],
            vec![exercise(1, 300.0, date), exercise(2, 150.0, date)],
        );
        assert!((summary.actual_consumption.calories - 450.0).abs() < 1e-9);
        assert!(summary.actual_consumption.protein_g.abs() < f64::EPSILON);
        assert!((summary.remaining.calories - 1950.0).abs() < 1e-9);
        // exercise adds nothing to macro budgets
        assert!((summary.remaining.protein_g - 130.0).abs() < 1e-9);
        assert_eq!(summary.exercises.len(), 2);
    }

    #[test]
    fn test_daily_summary_remaining_never_negative() {
        let date = day(2024, 6, 15);
        let food = flat_food(1500.0, 400.0, 200.0, 90.0);
        let summary = daily_summary(
            date,
            DEFAULT_DAILY_GOALS,
            vec![
                entry(1, &food, 1.0, MealType::Lunch, date),
                entry(2, &food, 1.0, MealType::Dinner, date),
            ],
            vec![exercise(1, 200.0, date)],
        );
        for v in [
            summary.remaining.calories,
            summary.remaining.protein_g,
            summary.remaining.carbs_g,
            summary.remaining.fat_g,
            summary.remaining.fiber_g,
            summary.remaining.sodium_mg,
        ] {
            assert!(v >= 0.0);
        }
        assert!(summary.remaining.calories.abs() < f64::EPSILON);
        assert!((summary.remaining.fiber_g - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_week_bounds() {
        // Wednesday
        let (cs, ce, ls, le) = week_bounds(day(2024, 6, 12));
        assert_eq!(cs, day(2024, 6, 10));
        assert_eq!(ce, day(2024, 6, 16));
        assert_eq!(ls, day(2024, 6, 3));
        assert_eq!(le, day(2024, 6, 9));
    }

    #[test]
    fn test_weekly_full_week_identical_days() {
        let today = day(2024, 6, 16);
        let food = flat_food(200.0, 20.0, 10.0, 5.0);
        let entries: Vec<CalorieEntry> = (0..7)
            .map(|i| entry(i, &food, 1.0, MealType::Lunch, day(2024, 6, 10) + Duration::days(i)))
            .collect();
        let cmp = weekly_comparison(today, &entries, &[]);
        assert!((cmp.current_week.calories - 200.0).abs() < f64::EPSILON);
        assert!((cmp.current_week.carbs - 20.0).abs() < f64::EPSILON);
        assert!((cmp.current_week.protein - 10.0).abs() < f64::EPSILON);
        assert!((cmp.current_week.fats - 5.0).abs() < f64::EPSILON);
        assert_eq!(cmp.last_week, WeeklyAverages::default());
    }

    #[test]
    fn test_weekly_averages_over_days_with_data() {
        let today = day(2024, 6, 12);
        let food = flat_food(300.0, 0.0, 0.0, 0.0);
        let entries = vec![
            entry(1, &food, 1.0, MealType::Lunch, day(2024, 6, 3)),
            entry(2, &food, 1.0, MealType::Lunch, day(2024, 6, 5)),
            entry(3, &food, 1.0, MealType::Lunch, day(2024, 6, 7)),
        ];
        let cmp = weekly_comparison(today, &entries, &[]);
        assert!((cmp.last_week.calories - 300.0).abs() < f64::EPSILON);
        assert!(cmp.current_week.calories.abs() < f64::EPSILON);
    }

    #[test]
    fn test_weekly_single_day_is_not_divided_by_seven() {
        let today = day(2024, 6, 12);
        let food = flat_food(700.0, 0.0, 0.0, 0.0);
        let entries = vec![
            entry(1, &food, 1.0, MealType::Lunch, day(2024, 6, 11)),
            entry(2, &food, 1.0, MealType::Dinner, day(2024, 6, 11)),
        ];
        let cmp = weekly_comparison(today, &entries, &[]);
        assert!((cmp.current_week.calories - 1400.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_weekly_exercise_uses_its_own_divisor() {
        let today = day(2024, 6, 12);
        let food = flat_food(100.0, 0.0, 0.0, 0.0);
        let entries: Vec<CalorieEntry> = (0..3)
            .map(|i| entry(i, &food, 1.0, MealType::Lunch, day(2024, 6, 10) + Duration::days(i)))
            .collect();
        let exercises = vec![
            exercise(1, 300.0, day(2024, 6, 10)),
            exercise(2, 250.0, day(2024, 6, 10)),
            exercise(3, 150.0, day(2024, 6, 11)),
        ];
        let cmp = weekly_comparison(today, &entries, &exercises);
        assert!((cmp.current_week.exercise - 350.0).abs() < f64::EPSILON);
        assert!((cmp.current_week.calories - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_weekly_ignores_rows_outside_windows() {
        let today = day(2024, 6, 12);
        let food = flat_food(900.0, 0.0, 0.0, 0.0);
        let entries = vec![
            entry(1, &food, 1.0, MealType::Lunch, day(2024, 5, 20)),
            entry(2, &food, 1.0, MealType::Lunch, day(2024, 6, 17)),
        ];
        let cmp = weekly_comparison(today, &entries, &[exercise(1, 400.0, day(2024, 6, 2))]);
        assert_eq!(cmp.current_week, WeeklyAverages::default());
        assert_eq!(cmp.last_week, WeeklyAverages::default());
    }

    #[test]
    fn test_weekly_rounds_to_one_decimal() {
        let today = day(2024, 6, 12);
        let food = flat_food(100.0, 0.0, 0.0, 0.0);
        let heavier = flat_food(101.0, 0.0, 0.0, 0.0);
        let entries = vec![
            entry(1, &food, 1.0, MealType::Lunch, day(2024, 6, 10)),
            entry(2, &food, 1.0, MealType::Lunch, day(2024, 6, 11)),
            entry(3, &heavier, 1.0, MealType::Lunch, day(2024, 6, 12)),
        ];
        let cmp = weekly_comparison(today, &entries, &[]);
        assert!((cmp.current_week.calories - 100.3).abs() < 1e-9);
    }
}
