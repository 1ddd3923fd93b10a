use anyhow::{Result, bail};
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use vitals_core::db::Database;

use super::helpers::{macro_line, print_json, truncate};
use crate::usda::UsdaClient;

pub(crate) async fn cmd_usda_search(usda: &UsdaClient, query: &str, json: bool) -> Result<()> {
    let query = query.trim();
    if query.is_empty() {
        bail!("Query cannot be empty");
    }
    let foods = usda.search(query).await?;

    if json {
        return print_json(&foods);
    }
    if foods.is_empty() {
        eprintln!("No USDA results for '{query}'");
        return Ok(());
    }

    #[derive(Tabled)]
    struct UsdaRow {
        #[tabled(rename = "FDC ID")]
        fdc_id: i64,
        #[tabled(rename = "Description")]
        description: String,
        #[tabled(rename = "Brand")]
        brand: String,
        #[tabled(rename = "Cal/100g")]
        calories: String,
        #[tabled(rename = "P/100g")]
        protein: String,
        #[tabled(rename = "C/100g")]
        carbs: String,
        #[tabled(rename = "F/100g")]
        fat: String,
    }

    let rows: Vec<UsdaRow> = foods
        .iter()
        .map(|f| UsdaRow {
            fdc_id: f.fdc_id,
            description: truncate(&f.description, 40),
            brand: f
                .brand_owner
                .as_deref()
                .map(|b| truncate(b, 20))
                .unwrap_or_default(),
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

/// Fetch a USDA food and store it as a per-100 g food item, reusing an
/// existing item with the same name.
pub(crate) async fn cmd_usda_import(
    db: &Database,
    usda: &UsdaClient,
    fdc_id: i64,
    json: bool,
) -> Result<()> {
    let seed = usda.food_item(fdc_id).await?;
    let item = db.find_or_create_food_item(&seed)?;

    if json {
        print_json(&item)
    } else {
        println!(
            "Food item {} '{}' ({}): {}",
            item.id,
            item.name,
            item.serving_size,
            macro_line(&item.nutrients)
        );
        Ok(())
    }
}
