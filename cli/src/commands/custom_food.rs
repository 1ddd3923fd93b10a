use anyhow::Result;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use vitals_core::db::Database;
use vitals_core::models::{NewCustomFood, User};

use super::food::NutrientArgs;
use super::helpers::{macro_line, print_json, truncate};

pub(crate) fn cmd_custom_food_add(
    db: &Database,
    user: &User,
    name: &str,
    unit: &str,
    reference_amount: f64,
    nutrients: NutrientArgs,
    json: bool,
) -> Result<()> {
    let food = db.insert_custom_food(
        user.id,
        &NewCustomFood {
            name: name.to_string(),
            unit: unit.to_string(),
            reference_amount,
            nutrients: nutrients.into(),
        },
    )?;

    if json {
        print_json(&food)
    } else {
        println!(
            "Added custom food {} '{}' per {}{}: {}",
            food.id,
            food.name,
            food.reference_amount,
            food.unit,
            macro_line(&food.nutrients)
        );
        Ok(())
    }
}

pub(crate) fn cmd_custom_food_list(db: &Database, user: &User, json: bool) -> Result<()> {
    let foods = db.list_custom_foods(user.id)?;

    if json {
        return print_json(&foods);
    }
    if foods.is_empty() {
        eprintln!("No custom foods yet. Use `vitals custom-food add` to create one.");
        return Ok(());
    }

    #[derive(Tabled)]
    struct CustomFoodRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Per")]
        per: String,
        #[tabled(rename = "Cal")]
        calories: String,
        #[tabled(rename = "P")]
        protein: String,
        #[tabled(rename = "C")]
        carbs: String,
        #[tabled(rename = "F")]
        fat: String,
    }

    let rows: Vec<CustomFoodRow> = foods
        .iter()
        .map(|f| CustomFoodRow {
            id: f.id,
            name: truncate(&f.name, 35),
            per: format!("{}{}", f.reference_amount, f.unit),
            calories: format!("{:.0}", f.nutrients.calories),
            protein: format!("{:.1}", f.nutrients.protein_g),
            carbs: format!("{:.1}", f.nutrients.carbs_g),
            fat: format!("{:.1}", f.nutrients.fat_g),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(3..7)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    Ok(())
}

pub(crate) fn cmd_custom_food_delete(db: &Database, user: &User, id: i64, json: bool) -> Result<()> {
    db.delete_custom_food(user.id, id)?;

    if json {
        println!("{}", serde_json::json!({ "deleted": id }));
    } else {
        println!("Deleted custom food {id}");
    }
    Ok(())
}

/// Make a custom food loggable by creating (or reusing) its food item.
pub(crate) fn cmd_custom_food_seed(db: &Database, user: &User, id: i64, json: bool) -> Result<()> {
    let item = db.seed_food_item(user.id, id)?;

    if json {
        print_json(&item)
    } else {
        println!(
            "Food item {} '{}' ready to log (reference serving {})",
            item.id, item.name, item.serving_size
        );
        Ok(())
    }
}
