use anyhow::Result;
use chrono::NaiveDate;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use vitals_core::db::Database;
use vitals_core::models::User;
use vitals_core::summary::WeeklyAverages;

use super::helpers::{macro_line, no_neg_zero, print_json, truncate};

pub(crate) fn cmd_summary(db: &Database, user: &User, date: NaiveDate, json: bool) -> Result<()> {
    let summary = db.build_daily_summary(user.id, date)?;

    if json {
        return print_json(&summary);
    }

    println!("=== {} ===\n", summary.date);

    if summary.meals.is_empty() {
        println!("  No food logged");
    }
    for meal in &summary.meals {
        let label = meal.meal_type.as_str().to_uppercase();
        println!("  {label} ({:.0} kcal)", meal.totals.calories);
        for e in &meal.entries {
            println!(
                "    [{}] {} x{} {} | {}",
                e.id,
                truncate(&e.food_item.name, 35),
                e.quantity,
                e.unit,
                macro_line(&e.totals)
            );
        }
        println!();
    }

    if !summary.exercises.is_empty() {
        println!("  EXERCISE");
        for ex in &summary.exercises {
            println!("    [{}] {} | {:.0} kcal", ex.id, ex.name, ex.calories_burned);
        }
        println!();
    }

    println!("  GOAL:      {}", macro_line(&summary.goals));
    println!("  EATEN:     {}", macro_line(&summary.actual_intake));
    println!(
        "  BURNED:    {:.0} kcal",
        no_neg_zero(summary.actual_consumption.calories)
    );
    println!("  REMAINING: {}", macro_line(&summary.remaining));

    Ok(())
}

pub(crate) fn cmd_weekly(db: &Database, user: &User, today: NaiveDate, json: bool) -> Result<()> {
    let cmp = db.build_weekly_comparison(user.id, today)?;

    if json {
        return print_json(&cmp);
    }

    #[derive(Tabled)]
    struct WeekRow {
        #[tabled(rename = "Week")]
        label: String,
        #[tabled(rename = "Cal/day")]
        calories: String,
        #[tabled(rename = "P/day")]
        protein: String,
        #[tabled(rename = "C/day")]
        carbs: String,
        #[tabled(rename = "F/day")]
        fats: String,
        #[tabled(rename = "Exercise/day")]
        exercise: String,
    }

    let row = |label: String, avg: &WeeklyAverages| WeekRow {
        label,
        calories: format!("{:.0}", avg.calories),
        protein: format!("{:.1}", avg.protein),
        carbs: format!("{:.1}", avg.carbs),
        fats: format!("{:.1}", avg.fats),
        exercise: format!("{:.0}", avg.exercise),
    };

    let rows = vec![
        row(
            format!("This week ({} to {})", cmp.current_week_start, cmp.current_week_end),
            &cmp.current_week,
        ),
        row(
            format!("Last week ({} to {})", cmp.last_week_start, cmp.last_week_end),
            &cmp.last_week,
        ),
    ];

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..6)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    Ok(())
}
