use anyhow::{Result, bail};
use chrono::NaiveDate;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use vitals_core::db::Database;
use vitals_core::models::{NewWeightEntry, User};
use vitals_core::weight_trend::HistoryQuery;

use super::helpers::{no_neg_zero, print_json};

const LBS_PER_KG: f64 = 2.20462;
const KG_PER_LB: f64 = 0.453_592;

/// Convert a weight in `unit` (kg or lbs) to kilograms.
fn to_kg(value: f64, unit: &str) -> Result<f64> {
    match unit.trim().to_lowercase().as_str() {
        "kg" => Ok(value),
        "lbs" | "lb" => Ok(no_neg_zero(value * KG_PER_LB)),
        _ => bail!("Invalid unit '{unit}'. Use 'kg' or 'lbs'"),
    }
}

pub(crate) fn cmd_weight_log(
    db: &Database,
    user: &User,
    value: f64,
    unit: &str,
    date: NaiveDate,
    json: bool,
) -> Result<()> {
    let weight = to_kg(value, unit)?;
    if !unit.eq_ignore_ascii_case("kg") {
        eprintln!("Converting {value:.1} lbs → {weight:.2} kg");
    }

    let result = db.upsert_weight(user.id, &NewWeightEntry { date, weight })?;

    if json {
        print_json(&result)
    } else {
        println!(
            "Logged {:.1} kg ({:.1} lbs) for {}",
            result.weight,
            result.weight * LBS_PER_KG,
            result.date
        );
        Ok(())
    }
}

pub(crate) fn cmd_weight_latest(db: &Database, user: &User, json: bool) -> Result<()> {
    let latest = db.latest_weight(user.id)?;

    if json {
        return print_json(&latest);
    }
    match latest {
        Some(e) => println!(
            "[{}] {}: {:.1} kg ({:.1} lbs)",
            e.id,
            e.date,
            e.weight,
            e.weight * LBS_PER_KG
        ),
        None => eprintln!("No weight entries yet. Use `vitals weight log` to record your weight."),
    }
    Ok(())
}

pub(crate) fn cmd_weight_history(
    db: &Database,
    user: &User,
    query: &HistoryQuery,
    today: NaiveDate,
    json: bool,
) -> Result<()> {
    let points = db.weight_trend(user.id, query, today)?;

    if json {
        return print_json(&points);
    }
    if points.is_empty() {
        eprintln!("No weight entries found. Use `vitals weight log` to record your weight.");
        return Ok(());
    }

    #[derive(Tabled)]
    struct WeightRow {
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Weight (kg)")]
        kg: String,
        #[tabled(rename = "Weight (lbs)")]
        lbs: String,
        #[tabled(rename = "Change")]
        change: String,
    }

    let rows: Vec<WeightRow> = points
        .iter()
        .map(|p| WeightRow {
            date: p.date.to_string(),
            kg: format!("{:.1}", p.weight),
            lbs: format!("{:.1}", p.weight * LBS_PER_KG),
            change: p
                .change
                .map_or_else(|| "-".to_string(), |c| format!("{:+.2}", no_neg_zero(c))),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..4)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    Ok(())
}

pub(crate) fn cmd_weight_delete(db: &Database, user: &User, id: i64, json: bool) -> Result<()> {
    db.delete_weight(user.id, id)?;

    if json {
        println!("{}", serde_json::json!({ "deleted": id }));
    } else {
        println!("Deleted weight entry {id}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_kg() {
        assert!((to_kg(80.0, "kg").unwrap() - 80.0).abs() < f64::EPSILON);
        assert!((to_kg(100.0, "LBS").unwrap() - 45.3592).abs() < 1e-9);
        assert!((to_kg(100.0, "lb").unwrap() - 45.3592).abs() < 1e-9);
        assert!(to_kg(80.0, "stone").is_err());
    }
}
