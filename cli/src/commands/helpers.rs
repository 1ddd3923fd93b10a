use anyhow::Result;
use serde::Serialize;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use vitals_core::db::Database;
use vitals_core::error::VitalsError;
use vitals_core::models::{FoodItem, NutritionTotals, User};

/// Look up the user a command acts for.
pub(crate) fn resolve_user(db: &Database, username: Option<&str>) -> Result<User> {
    let Some(username) = username.map(str::trim).filter(|u| !u.is_empty()) else {
        return Err(VitalsError::validation("No user given. Pass --user or set VITALS_USER").into());
    };
    db.find_user_by_username(username)?
        .ok_or_else(|| VitalsError::not_found(format!("User '{username}' not found")).into())
}

pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// One-line `kcal | P C F` rendering used by summaries and entry confirmations.
pub(crate) fn macro_line(n: &NutritionTotals) -> String {
    format!(
        "{:.0} kcal | P:{:.1}g C:{:.1}g F:{:.1}g",
        no_neg_zero(n.calories),
        no_neg_zero(n.protein_g),
        no_neg_zero(n.carbs_g),
        no_neg_zero(n.fat_g)
    )
}

pub(crate) fn print_food_items(foods: &[FoodItem]) {
    #[derive(Tabled)]
    struct FoodRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Serving")]
        serving: String,
        #[tabled(rename = "Cal")]
        calories: String,
        #[tabled(rename = "P")]
        protein: String,
        #[tabled(rename = "C")]
        carbs: String,
        #[tabled(rename = "F")]
        fat: String,
        #[tabled(rename = "Source")]
        source: String,
    }

    let rows: Vec<FoodRow> = foods
        .iter()
        .map(|f| FoodRow {
            id: f.id,
            name: truncate(&f.name, 35),
            serving: truncate(&f.serving_size, 15),
            calories: format!("{:.0}", f.nutrients.calories),
            protein: format!("{:.1}", f.nutrients.protein_g),
            carbs: format!("{:.1}", f.nutrients.carbs_g),
            fat: format!("{:.1}", f.nutrients.fat_g),
            source: f.source.clone(),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(3..7)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

pub(crate) fn no_neg_zero(v: f64) -> f64 {
    if v == 0.0 { 0.0 } else { v }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}
