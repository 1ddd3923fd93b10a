use anyhow::Result;
use chrono::NaiveDate;
use clap::Args;

use vitals_core::db::Database;
use vitals_core::models::{MealType, NewCalorieEntry, NewFoodItem, NutritionTotals, User};

use super::helpers::{macro_line, print_food_items, print_json};

/// Nutrient values shared by `food add` and `custom-food add`.
#[derive(Args, Debug, Clone, Copy)]
pub(crate) struct NutrientArgs {
    /// Calories (kcal)
    #[arg(long)]
    pub calories: f64,
    /// Protein (g)
    #[arg(long, default_value_t = 0.0)]
    pub protein: f64,
    /// Carbohydrates (g)
    #[arg(long, default_value_t = 0.0)]
    pub carbs: f64,
    /// Fat (g)
    #[arg(long, default_value_t = 0.0)]
    pub fat: f64,
    /// Fiber (g)
    #[arg(long, default_value_t = 0.0)]
    pub fiber: f64,
    /// Sodium (mg)
    #[arg(long, default_value_t = 0.0)]
    pub sodium: f64,
}

impl From<NutrientArgs> for NutritionTotals {
    fn from(args: NutrientArgs) -> Self {
        Self {
            calories: args.calories,
            protein_g: args.protein,
            carbs_g: args.carbs,
            fat_g: args.fat,
            fiber_g: args.fiber,
            sodium_mg: args.sodium,
        }
    }
}

pub(crate) fn cmd_food_add(
    db: &Database,
    name: &str,
    serving_size: &str,
    reference_amount: Option<f64>,
    nutrients: NutrientArgs,
    json: bool,
) -> Result<()> {
    let food = db.insert_food_item(&NewFoodItem {
        name: name.to_string(),
        serving_size: serving_size.to_string(),
        reference_amount,
        nutrients: nutrients.into(),
        source: "manual".to_string(),
        fdc_id: None,
    })?;

    if json {
        print_json(&food)
    } else {
        println!(
            "Added food item {} '{}' ({}): {}",
            food.id,
            food.name,
            food.serving_size,
            macro_line(&food.nutrients)
        );
        Ok(())
    }
}

pub(crate) fn cmd_food_list(db: &Database, search: Option<&str>, json: bool) -> Result<()> {
    let foods = db.list_food_items(search)?;

    if json {
        print_json(&foods)
    } else if foods.is_empty() {
        eprintln!("No food items found. Use `vitals food add` or `vitals usda import` to add one.");
        Ok(())
    } else {
        print_food_items(&foods);
        Ok(())
    }
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn cmd_log(
    db: &Database,
    user: &User,
    food_item_id: i64,
    quantity: f64,
    unit: &str,
    meal: &str,
    date: NaiveDate,
    json: bool,
) -> Result<()> {
    let meal_type: MealType = meal.parse()?;
    let entry = db.insert_calorie_entry(
        user.id,
        &NewCalorieEntry {
            food_item_id,
            meal_type,
            quantity,
            unit: unit.to_string(),
            date,
        },
    )?;

    if json {
        print_json(&entry)
    } else {
        println!(
            "Logged [{}] {} x{} {} to {} on {}: {}",
            entry.id,
            entry.food_item.name,
            entry.quantity,
            entry.unit,
            entry.meal_type,
            entry.date,
            macro_line(&entry.totals)
        );
        Ok(())
    }
}

pub(crate) fn cmd_entry_delete(db: &Database, user: &User, id: i64, json: bool) -> Result<()> {
    db.delete_calorie_entry(user.id, id)?;

    if json {
        println!("{}", serde_json::json!({ "deleted": id }));
    } else {
        println!("Deleted entry {id}");
    }
    Ok(())
}
