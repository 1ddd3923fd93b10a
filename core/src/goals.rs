//! BMR, TDEE and macro targets (Mifflin-St Jeor).

use anyhow::Result;
use serde::Serialize;

use crate::error::VitalsError;
use crate::models::{CustomNutrition, Goal, NutritionTotals, Sex, User};

/// Moderately active.
pub const ACTIVITY_MULTIPLIER: f64 = 1.55;

/// Daily surplus or deficit for gain/lose goals (~0.5 kg per week).
pub const GOAL_CALORIE_OFFSET: i64 = 500;

/// Used when a profile is too incomplete to compute personal goals.
pub const DEFAULT_DAILY_GOALS: NutritionTotals = NutritionTotals {
    calories: 2000.0,
    protein_g: 150.0,
    carbs_g: 250.0,
    fat_g: 65.0,
    fiber_g: 25.0,
    sodium_mg: 2300.0,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Biometrics {
    pub sex: Sex,
    pub age: i64,
    pub height: i64,
    pub weight: i64,
}

impl Biometrics {
    /// `None` unless sex, age, height and weight are all recorded.
    #[must_use]
    pub fn from_user(user: &User) -> Option<Self> {
        Some(Self {
            sex: user.sex?,
            age: user.age?,
            height: user.height?,
            weight: user.weight?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NutritionGoals {
    pub bmr: i64,
    pub tdee: i64,
    pub calories: i64,
    pub protein: i64,
    pub carbs: i64,
    pub fat: i64,
    pub goal: Goal,
}

struct MacroSplit {
    carb_ratio: f64,
    fat_ratio: f64,
    protein_per_kg: f64,
}

// Protein is fixed per kg of body weight, so only the carb:fat ratio
// affects the split of the remaining calories.
fn macro_split(goal: Goal) -> MacroSplit {
    match goal {
        Goal::Lose => MacroSplit {
            carb_ratio: 0.40,
            fat_ratio: 0.30,
            protein_per_kg: 2.0,
        },
        Goal::Gain => MacroSplit {
            carb_ratio: 0.50,
            fat_ratio: 0.25,
            protein_per_kg: 1.8,
        },
        Goal::Maintain => MacroSplit {
            carb_ratio: 0.50,
            fat_ratio: 0.25,
            protein_per_kg: 1.6,
        },
    }
}

/// Nearest integer, ties to even.
fn round_int(value: f64) -> i64 {
    value.round_ties_even() as i64
}

#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn bmr(sex: Sex, age: i64, height: i64, weight: i64) -> i64 {
    let base = 10.0 * weight as f64 + 6.25 * height as f64 - 5.0 * age as f64;
    let male = base + 5.0;
    let female = base - 161.0;
    let value = match sex {
        Sex::Male => male,
        Sex::Female => female,
        Sex::Unspecified => (male + female) / 2.0,
    };
    round_int(value)
}

#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn tdee(bmr: i64) -> i64 {
    round_int(bmr as f64 * ACTIVITY_MULTIPLIER)
}

#[must_use]
pub fn target_calories(tdee: i64, goal: Goal) -> i64 {
    match goal {
        Goal::Lose => tdee - GOAL_CALORIE_OFFSET,
        Goal::Gain => tdee + GOAL_CALORIE_OFFSET,
        Goal::Maintain => tdee,
    }
}

/// Returns `(protein_g, carbs_g, fat_g)`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn macros(calories: i64, weight: i64, goal: Goal) -> (i64, i64, i64) {
    let split = macro_split(goal);
    let protein = round_int(weight as f64 * split.protein_per_kg);
    let remaining = (calories - protein * 4) as f64;
    let ratio_total = split.carb_ratio + split.fat_ratio;
    let carb_calories = remaining * (split.carb_ratio / ratio_total);
    let fat_calories = remaining * (split.fat_ratio / ratio_total);
    (
        protein,
        round_int(carb_calories / 4.0),
        round_int(fat_calories / 9.0),
    )
}

#[must_use]
pub fn calculate(bio: &Biometrics, goal: Goal) -> NutritionGoals {
    let bmr = bmr(bio.sex, bio.age, bio.height, bio.weight);
    let tdee = tdee(bmr);
    let calories = target_calories(tdee, goal);
    let (protein, carbs, fat) = macros(calories, bio.weight, goal);
    NutritionGoals {
        bmr,
        tdee,
        calories,
        protein,
        carbs,
        fat,
        goal,
    }
}

/// Personal goals for a user, or a validation error if the profile is incomplete.
pub fn goals_for_user(user: &User) -> Result<NutritionGoals> {
    let bio = Biometrics::from_user(user).ok_or_else(|| {
        VitalsError::validation(
            "Please complete your profile (sex, age, height, weight) to calculate nutrition goals",
        )
    })?;
    if bio.age <= 0 || bio.height <= 0 || bio.weight <= 0 {
        return Err(
            VitalsError::validation("Age, height and weight must be greater than 0").into(),
        );
    }
    Ok(calculate(&bio, user.goal))
}

#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn custom_goals(custom: &CustomNutrition) -> NutritionTotals {
    let cal = custom.calories as f64;
    NutritionTotals {
        calories: cal,
        protein_g: cal * custom.protein_pct as f64 / 100.0 / 4.0,
        carbs_g: cal * custom.carbs_pct as f64 / 100.0 / 4.0,
        fat_g: cal * custom.fat_pct as f64 / 100.0 / 9.0,
        ..DEFAULT_DAILY_GOALS
    }
}

/// The goal vector the daily summary measures against: a custom override if
/// the user set one, else computed goals, else the defaults.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn daily_goals(user: &User) -> NutritionTotals {
    if let Some(custom) = &user.custom_nutrition {
        return custom_goals(custom);
    }
    match goals_for_user(user) {
        Ok(goals) => NutritionTotals {
            calories: goals.calories as f64,
            protein_g: goals.protein as f64,
            carbs_g: goals.carbs as f64,
            fat_g: goals.fat as f64,
            ..DEFAULT_DAILY_GOALS
        },
        Err(_) => DEFAULT_DAILY_GOALS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(sex: Option<Sex>, age: Option<i64>, height: Option<i64>, weight: Option<i64>) -> User {
        User {
            id: 1,
            username: "alice".to_string(),
            sex,
            age,
            height,
            weight,
            goal: Goal::Maintain,
            custom_nutrition: None,
            created_at: String::new(),
        }
    }

    #[test]
    fn test_bmr_male_lose_scenario() {
        let goals = calculate(
            &Biometrics {
                sex: Sex::Male,
                age: 30,
                height: 180,
                weight: 75,
            },
            Goal::Lose,
        );
        assert_eq!(goals.bmr, 1730);
        assert_eq!(goals.tdee, 2682);
        assert_eq!(goals.calories, goals.tdee - 500);
        assert_eq!(goals.calories, 2182);
        assert_eq!(goals.protein, 150);
        assert_eq!(goals.carbs, 226);
        assert_eq!(goals.fat, 75);
        assert_eq!(goals.goal, Goal::Lose);
    }

    #[test]
    fn test_female_maintain() {
        let goals = calculate(
            &Biometrics {
                sex: Sex::Female,
                age: 25,
                height: 165,
                weight: 60,
            },
            Goal::Maintain,
        );
        assert_eq!(goals.bmr, 1345);
        assert_eq!(goals.tdee, 2085);
        assert_eq!(goals.calories, 2085);
        assert_eq!((goals.protein, goals.carbs, goals.fat), (96, 284, 63));
    }

    #[test]
    fn test_unspecified_gain() {
        let goals = calculate(
            &Biometrics {
                sex: Sex::Unspecified,
                age: 40,
                height: 170,
                weight: 80,
            },
            Goal::Gain,
        );
        assert_eq!(goals.bmr, 1584);
        assert_eq!(goals.tdee, 2455);
        assert_eq!(goals.calories, 2955);
        assert_eq!((goals.protein, goals.carbs, goals.fat), (144, 396, 88));
    }

    #[test]
    fn test_female_offset_is_constant() {
        for age in [18, 30, 47, 80] {
            for height in [150, 165, 170, 171, 198] {
                for weight in [45, 60, 75, 120] {
                    assert_eq!(
                        bmr(Sex::Female, age, height, weight),
                        bmr(Sex::Male, age, height, weight) - 166,
                        "age={age} height={height} weight={weight}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_half_rounds_to_even() {
        // 10*70 + 6.25*170 - 5*30 = 1612.5
        assert_eq!(bmr(Sex::Male, 30, 170, 70), 1618);
        assert_eq!(bmr(Sex::Female, 30, 170, 70), 1452);
    }

    #[test]
    fn test_goal_offsets() {
        for tdee in [1500, 2000, 2681] {
            assert_eq!(target_calories(tdee, Goal::Lose), tdee - 500);
            assert_eq!(target_calories(tdee, Goal::Gain), tdee + 500);
            assert_eq!(target_calories(tdee, Goal::Maintain), tdee);
        }
    }

    #[test]
    fn test_goals_for_user_incomplete_profile() {
        let err = goals_for_user(&user(Some(Sex::Male), Some(30), None, Some(75))).unwrap_err();
        assert!(err.to_string().starts_with("Please complete your profile"));
        assert!(matches!(
            crate::error::find_vitals_error(&err),
            Some(VitalsError::Validation(_))
        ));
    }

    #[test]
    fn test_daily_goals_fallback_to_default() {
        let goals = daily_goals(&user(None, None, None, None));
        assert_eq!(goals, DEFAULT_DAILY_GOALS);
    }

    #[test]
    fn test_daily_goals_from_profile() {
        let goals = daily_goals(&user(Some(Sex::Male), Some(30), Some(180), Some(75)));
        assert!((goals.calories - 2682.0).abs() < f64::EPSILON);
        assert!((goals.protein_g - 120.0).abs() < f64::EPSILON);
        assert!((goals.fiber_g - 25.0).abs() < f64::EPSILON);
        assert!((goals.sodium_mg - 2300.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_daily_goals_custom_override_wins() {
        let mut u = user(Some(Sex::Male), Some(30), Some(180), Some(75));
        u.custom_nutrition = Some(CustomNutrition {
            calories: 1800,
            protein_pct: 30,
            carbs_pct: 40,
            fat_pct: 30,
        });
        let goals = daily_goals(&u);
        assert!((goals.calories - 1800.0).abs() < f64::EPSILON);
        assert!((goals.protein_g - 135.0).abs() < 0.01);
        assert!((goals.carbs_g - 180.0).abs() < 0.01);
        assert!((goals.fat_g - 60.0).abs() < 0.01);
    }

    #[test]
    fn test_nutrition_goals_serialize_shape() {
        let goals = calculate(
            &Biometrics {
                sex: Sex::Male,
                age: 30,
                height: 180,
                weight: 75,
            },
            Goal::Lose,
        );
        let value = serde_json::to_value(goals).unwrap();
        assert_eq!(value["bmr"], 1730);
        assert_eq!(value["goal"], "lose");
    }
}
