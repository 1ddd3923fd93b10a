use anyhow::Result;
use chrono::NaiveDate;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use vitals_core::db::Database;
use vitals_core::models::{NewExerciseEntry, User};

use super::helpers::{print_json, truncate};

pub(crate) fn cmd_exercise_log(
    db: &Database,
    user: &User,
    name: &str,
    calories_burned: f64,
    date: NaiveDate,
    json: bool,
) -> Result<()> {
    let entry = db.insert_exercise(
        user.id,
        &NewExerciseEntry {
            name: name.to_string(),
            calories_burned,
            date,
        },
    )?;

    if json {
        print_json(&entry)
    } else {
        println!(
            "Logged [{}] {} ({:.0} kcal) on {}",
            entry.id, entry.name, entry.calories_burned, entry.date
        );
        Ok(())
    }
}

pub(crate) fn cmd_exercise_list(db: &Database, user: &User, date: NaiveDate, json: bool) -> Result<()> {
    let entries = db.exercises_between(user.id, date, date)?;

    if json {
        return print_json(&entries);
    }
    if entries.is_empty() {
        eprintln!("No exercise logged on {date}");
        return Ok(());
    }

    #[derive(Tabled)]
    struct ExerciseRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Exercise")]
        name: String,
        #[tabled(rename = "Burned (kcal)")]
        calories: String,
    }

    let rows: Vec<ExerciseRow> = entries
        .iter()
        .map(|e| ExerciseRow {
            id: e.id,
            name: truncate(&e.name, 40),
            calories: format!("{:.0}", e.calories_burned),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..3)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    let total: f64 = entries.iter().map(|e| e.calories_burned).sum();
    println!("Total burned: {total:.0} kcal");

    Ok(())
}

pub(crate) fn cmd_exercise_delete(db: &Database, user: &User, id: i64, json: bool) -> Result<()> {
    db.delete_exercise(user.id, id)?;

    if json {
        println!("{}", serde_json::json!({ "deleted": id }));
    } else {
        println!("Deleted exercise entry {id}");
    }
    Ok(())
}
