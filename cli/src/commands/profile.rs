use anyhow::Result;

use vitals_core::db::Database;
use vitals_core::error::VitalsError;
use vitals_core::models::{CustomNutrition, UpdateProfile, User};

use super::helpers::print_json;
use crate::auth;

pub(crate) fn cmd_register(
    db: &Database,
    username: &str,
    password: &str,
    cost: u32,
    json: bool,
) -> Result<()> {
    let user = auth::register(db, username, password, cost)?;
    if json {
        print_json(&user)?;
    } else {
        println!("Registered '{}' (id {})", user.username, user.id);
    }
    Ok(())
}

fn print_profile(user: &User) {
    let show = |v: Option<i64>, unit: &str| v.map_or_else(|| "-".to_string(), |v| format!("{v}{unit}"));
    println!("User:   {} (id {})", user.username, user.id);
    println!(
        "Sex:    {}",
        user.sex.map_or_else(|| "-".to_string(), |s| s.to_string())
    );
    println!("Age:    {}", show(user.age, ""));
    println!("Height: {}", show(user.height, " cm"));
    println!("Weight: {}", show(user.weight, " kg"));
    println!("Goal:   {}", user.goal);
    if let Some(c) = &user.custom_nutrition {
        println!(
            "Custom: {} kcal | P:{}% C:{}% F:{}%",
            c.calories, c.protein_pct, c.carbs_pct, c.fat_pct
        );
    }
}

pub(crate) fn cmd_profile_show(user: &User, json: bool) -> Result<()> {
    if json {
        print_json(user)
    } else {
        print_profile(user);
        Ok(())
    }
}

pub(crate) fn cmd_profile_set(
    db: &Database,
    user: &User,
    update: &UpdateProfile,
    json: bool,
) -> Result<()> {
    if update.is_empty() {
        return Err(VitalsError::validation(
            "Nothing to update. Pass at least one of --sex, --age, --height, --weight, --goal",
        )
        .into());
    }
    let updated = db.update_profile(user.id, update)?;
    if json {
        print_json(&updated)
    } else {
        print_profile(&updated);
        Ok(())
    }
}

/// Set the custom calorie/macro override, or clear it with `None`.
pub(crate) fn cmd_profile_custom(
    db: &Database,
    user: &User,
    custom: Option<CustomNutrition>,
    json: bool,
) -> Result<()> {
    let updated = db.set_custom_nutrition(user.id, custom.as_ref())?;
    if json {
        return print_json(&updated);
    }
    match updated.custom_nutrition {
        Some(c) => println!(
            "Custom nutrition set: {} kcal | P:{}% C:{}% F:{}%",
            c.calories, c.protein_pct, c.carbs_pct, c.fat_pct
        ),
        None => println!("Custom nutrition cleared"),
    }
    Ok(())
}

pub(crate) fn cmd_goals(db: &Database, user: &User, json: bool) -> Result<()> {
    let goals = db.nutrition_goals(user.id)?;
    if json {
        return print_json(&goals);
    }
    println!("Goal:     {}", goals.goal);
    println!("BMR:      {} kcal", goals.bmr);
    println!("TDEE:     {} kcal", goals.tdee);
    println!("Calories: {} kcal", goals.calories);
    println!(
        "Macros:   P:{}g C:{}g F:{}g",
        goals.protein, goals.carbs, goals.fat
    );
    Ok(())
}
