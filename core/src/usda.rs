//! USDA FoodData Central response types and nutrient extraction.

use serde::{Deserialize, Serialize};

use crate::models::{NewFoodItem, NutritionTotals};

const KJ_PER_KCAL: f64 = 4.184;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    #[serde(default)]
    pub foods: Vec<FoodRecord>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoodRecord {
    pub fdc_id: i64,
    pub description: Option<String>,
    pub brand_owner: Option<String>,
    pub data_type: Option<String>,
    pub serving_size: Option<f64>,
    pub serving_size_unit: Option<String>,
    #[serde(default)]
    pub food_nutrients: Vec<FoodNutrient>,
}

/// Detail responses nest name/unit under `nutrient`; search responses put
/// them on the item itself and call the amount `value`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoodNutrient {
    pub nutrient: Option<NutrientInfo>,
    pub nutrient_name: Option<String>,
    pub unit_name: Option<String>,
    #[serde(alias = "value")]
    pub amount: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NutrientInfo {
    pub name: Option<String>,
    pub unit_name: Option<String>,
}

impl FoodNutrient {
    fn name(&self) -> String {
        self.nutrient
            .as_ref()
            .and_then(|n| n.name.as_deref())
            .or(self.nutrient_name.as_deref())
            .unwrap_or_default()
            .to_lowercase()
    }

    fn unit(&self) -> String {
        self.nutrient
            .as_ref()
            .and_then(|n| n.unit_name.as_deref())
            .or(self.unit_name.as_deref())
            .unwrap_or_default()
            .to_lowercase()
    }
}

/// A search hit as returned to API clients, nutrients per 100 g.
#[derive(Debug, Clone, Serialize)]
pub struct UsdaFood {
    pub fdc_id: i64,
    pub description: String,
    pub brand_owner: Option<String>,
    pub data_type: Option<String>,
    pub serving_size_g: Option<f64>,
    pub nutrients: NutritionTotals,
}

/// Pull the six tracked nutrients out of a record. Unknown nutrients are
/// ignored; missing ones stay 0. A kcal energy value wins over a kJ one.
#[must_use]
pub fn extract_nutrients(food: &FoodRecord) -> NutritionTotals {
    let mut totals = NutritionTotals::ZERO;
    let mut have_kcal = false;

    for item in &food.food_nutrients {
        let Some(amount) = item.amount else {
            continue;
        };
        let name = item.name();
        if name.contains("energy") {
            if item.unit() == "kj" {
                if !have_kcal {
                    totals.calories = amount / KJ_PER_KCAL;
                }
            } else {
                totals.calories = amount;
                have_kcal = true;
            }
            continue;
        }
        match name.as_str() {
            "protein" => totals.protein_g = amount,
            "carbohydrate, by difference" => totals.carbs_g = amount,
            "total lipid (fat)" => totals.fat_g = amount,
            "fiber, total dietary" => totals.fiber_g = amount,
            "sodium, na" => totals.sodium_mg = amount,
            _ => {}
        }
    }
    totals
}

/// Rescale per-serving values to per 100 g. No-op without a usable serving size.
#[must_use]
pub fn normalize_per_100g(nutrients: NutritionTotals, serving_size_grams: Option<f64>) -> NutritionTotals {
    match serving_size_grams {
        Some(grams) if grams > 0.0 && (grams - 100.0).abs() > f64::EPSILON => {
            nutrients.scale(100.0 / grams)
        }
        _ => nutrients,
    }
}

/// Serving size in grams, only when the record states it in grams.
#[must_use]
pub fn serving_size_grams(food: &FoodRecord) -> Option<f64> {
    let unit = food.serving_size_unit.as_deref()?.to_lowercase();
    let size = food.serving_size.filter(|s| *s > 0.0)?;
    matches!(unit.as_str(), "g" | "gram" | "grams").then_some(size)
}

fn description(food: &FoodRecord) -> Option<String> {
    food.description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(ToString::to_string)
}

#[must_use]
pub fn summarize(food: &FoodRecord) -> Option<UsdaFood> {
    let serving = serving_size_grams(food);
    Some(UsdaFood {
        fdc_id: food.fdc_id,
        description: description(food)?,
        brand_owner: food.brand_owner.clone().filter(|b| !b.is_empty()),
        data_type: food.data_type.clone(),
        serving_size_g: serving,
        nutrients: normalize_per_100g(extract_nutrients(food), serving).rounded(2),
    })
}

/// A food item seed measured per 100 g. `None` if the record has no description.
#[must_use]
pub fn record_to_food_item(food: &FoodRecord) -> Option<NewFoodItem> {
    let hit = summarize(food)?;
    Some(NewFoodItem {
        name: hit.description,
        serving_size: "100g".to_string(),
        reference_amount: Some(100.0),
        nutrients: hit.nutrients,
        source: "usda".to_string(),
        fdc_id: Some(hit.fdc_id),
    })
}
