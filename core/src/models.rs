use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};
use std::str::FromStr;

use anyhow::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::VitalsError;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub const CUSTOM_FOOD_UNITS: &[&str] = &[
    "g", "oz", "ml", "cup", "tbsp", "tsp", "serving", "piece", "slice",
];

pub const MAX_EXERCISE_NAME_LEN: usize = 200;

/// Round to a fixed number of decimal places, halves away from zero.
#[must_use]
pub fn round_places(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    let rounded = (value * factor).round() / factor;
    // normalise -0.0 so it serializes as 0
    if rounded == 0.0 { 0.0 } else { rounded }
}

// --- Enums ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Male,
    Female,
    Unspecified,
}

impl Sex {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
            Self::Unspecified => "unspecified",
        }
    }
}

impl FromStr for Sex {
    type Err = VitalsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "male" => Ok(Self::Male),
            "female" => Ok(Self::Female),
            "unspecified" => Ok(Self::Unspecified),
            _ => Err(VitalsError::validation(format!(
                "Invalid sex '{s}'. Must be one of: male, female, unspecified"
            ))),
        }
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Goal {
    Lose,
    #[default]
    Maintain,
    Gain,
}

impl Goal {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lose => "lose",
            Self::Maintain => "maintain",
            Self::Gain => "gain",
        }
    }
}

impl FromStr for Goal {
    type Err = VitalsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "lose" => Ok(Self::Lose),
            "maintain" => Ok(Self::Maintain),
            "gain" => Ok(Self::Gain),
            _ => Err(VitalsError::validation(format!(
                "Invalid goal '{s}'. Must be one of: lose, maintain, gain"
            ))),
        }
    }
}

impl fmt::Display for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MealType {
    Breakfast,
    Lunch,
    Dinner,
    Snack,
    InBetween,
}

impl MealType {
    /// Display and grouping order.
    pub const ALL: [MealType; 5] = [
        Self::Breakfast,
        Self::Lunch,
        Self::Dinner,
        Self::Snack,
        Self::InBetween,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Breakfast => "breakfast",
            Self::Lunch => "lunch",
            Self::Dinner => "dinner",
            Self::Snack => "snack",
            Self::InBetween => "in_between",
        }
    }
}

impl FromStr for MealType {
    type Err = VitalsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == lower)
            .ok_or_else(|| {
                let names: Vec<&str> = Self::ALL.iter().map(|m| m.as_str()).collect();
                VitalsError::validation(format!(
                    "Invalid meal type '{s}'. Must be one of: {}",
                    names.join(", ")
                ))
            })
    }
}

impl fmt::Display for MealType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- Nutrient vector ---

/// The six tracked nutrient fields. Used for per-serving values, entry
/// totals, goals and remaining budgets alike.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NutritionTotals {
    pub calories: f64,
    pub protein_g: f64,
    pub carbs_g: f64,
    pub fat_g: f64,
    pub fiber_g: f64,
    pub sodium_mg: f64,
}

impl NutritionTotals {
    pub const ZERO: Self = Self {
        calories: 0.0,
        protein_g: 0.0,
        carbs_g: 0.0,
        fat_g: 0.0,
        fiber_g: 0.0,
        sodium_mg: 0.0,
    };

    #[must_use]
    pub fn calories_only(calories: f64) -> Self {
        Self {
            calories,
            ..Self::ZERO
        }
    }

    /// Apply `f` to every field.
    #[must_use]
    pub fn map(self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            calories: f(self.calories),
            protein_g: f(self.protein_g),
            carbs_g: f(self.carbs_g),
            fat_g: f(self.fat_g),
            fiber_g: f(self.fiber_g),
            sodium_mg: f(self.sodium_mg),
        }
    }

    /// Combine two vectors field by field.
    #[must_use]
    pub fn zip_with(self, other: Self, f: impl Fn(f64, f64) -> f64) -> Self {
        Self {
            calories: f(self.calories, other.calories),
            protein_g: f(self.protein_g, other.protein_g),
            carbs_g: f(self.carbs_g, other.carbs_g),
            fat_g: f(self.fat_g, other.fat_g),
            fiber_g: f(self.fiber_g, other.fiber_g),
            sodium_mg: f(self.sodium_mg, other.sodium_mg),
        }
    }

    #[must_use]
    pub fn scale(self, factor: f64) -> Self {
        self.map(|v| v * factor)
    }

    #[must_use]
    pub fn rounded(self, places: i32) -> Self {
        self.map(|v| round_places(v, places))
    }

    fn fields(&self) -> [(&'static str, f64); 6] {
        [
            ("calories", self.calories),
            ("protein_g", self.protein_g),
            ("carbs_g", self.carbs_g),
            ("fat_g", self.fat_g),
            ("fiber_g", self.fiber_g),
            ("sodium_mg", self.sodium_mg),
        ]
    }

    pub fn validate_non_negative(&self) -> Result<()> {
        for (name, value) in self.fields() {
            if !value.is_finite() || value < 0.0 {
                return Err(VitalsError::validation(format!("{name} cannot be negative")).into());
            }
        }
        Ok(())
    }
}

impl Add for NutritionTotals {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        self.zip_with(rhs, |a, b| a + b)
    }
}

impl AddAssign for NutritionTotals {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sum for NutritionTotals {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a NutritionTotals> for NutritionTotals {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

// --- Users ---

/// A user-chosen calorie budget with a percentage macro split. When present
/// it replaces the computed goals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomNutrition {
    pub calories: i64,
    pub protein_pct: i64,
    pub carbs_pct: i64,
    pub fat_pct: i64,
}

impl CustomNutrition {
    pub fn validate(&self) -> Result<()> {
        if self.calories <= 0 {
            return Err(VitalsError::validation("Calories must be greater than 0").into());
        }
        validate_macro_split(self.protein_pct, self.carbs_pct, self.fat_pct)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub sex: Option<Sex>,
    pub age: Option<i64>,
    pub height: Option<i64>,
    pub weight: Option<i64>,
    pub goal: Goal,
    pub custom_nutrition: Option<CustomNutrition>,
    pub created_at: String,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateProfile {
    pub sex: Option<Sex>,
    pub age: Option<i64>,
    pub height: Option<i64>,
    pub weight: Option<i64>,
    pub goal: Option<Goal>,
}

impl UpdateProfile {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sex.is_none()
            && self.age.is_none()
            && self.height.is_none()
            && self.weight.is_none()
            && self.goal.is_none()
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("Age", self.age),
            ("Height", self.height),
            ("Weight", self.weight),
        ] {
            if value.is_some_and(|v| v <= 0) {
                return Err(VitalsError::validation(format!("{name} must be greater than 0")).into());
            }
        }
        Ok(())
    }
}

// --- Foods ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FoodItem {
    pub id: i64,
    pub name: String,
    pub serving_size: String,
    /// Units per serving. When set, entry quantities are measured in these
    /// units instead of in servings.
    pub reference_amount: Option<f64>,
    #[serde(flatten)]
    pub nutrients: NutritionTotals,
    pub source: String,
    pub fdc_id: Option<i64>,
    pub created_at: String,
}

impl FoodItem {
    /// How many servings `quantity` represents.
    #[must_use]
    pub fn multiplier(&self, quantity: f64) -> f64 {
        match self.reference_amount {
            Some(amount) if amount > 0.0 => quantity / amount,
            _ => quantity,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewFoodItem {
    pub name: String,
    pub serving_size: String,
    pub reference_amount: Option<f64>,
    pub nutrients: NutritionTotals,
    pub source: String,
    pub fdc_id: Option<i64>,
}

pub fn validate_food_item(food: &NewFoodItem) -> Result<()> {
    if food.name.trim().is_empty() {
        return Err(VitalsError::validation("Name cannot be empty").into());
    }
    if food
        .reference_amount
        .is_some_and(|a| !a.is_finite() || a <= 0.0)
    {
        return Err(VitalsError::validation("Reference amount must be positive").into());
    }
    food.nutrients.validate_non_negative()
}

#[derive(Debug, Clone, Serialize)]
pub struct CustomFood {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub unit: String,
    pub reference_amount: f64,
    #[serde(flatten)]
    pub nutrients: NutritionTotals,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewCustomFood {
    pub name: String,
    pub unit: String,
    pub reference_amount: f64,
    pub nutrients: NutritionTotals,
}

/// Validate and normalise a custom food: trims the name and lowercases the unit.
pub fn validate_custom_food(food: &NewCustomFood) -> Result<NewCustomFood> {
    let name = food.name.trim();
    if name.is_empty() {
        return Err(VitalsError::validation("Name cannot be empty").into());
    }
    let unit = food.unit.trim().to_lowercase();
    if !CUSTOM_FOOD_UNITS.contains(&unit.as_str()) {
        return Err(VitalsError::validation(format!(
            "Unit must be one of: {}",
            CUSTOM_FOOD_UNITS.join(", ")
        ))
        .into());
    }
    if !food.reference_amount.is_finite() || food.reference_amount <= 0.0 {
        return Err(VitalsError::validation("Reference amount must be positive").into());
    }
    food.nutrients.validate_non_negative()?;
    Ok(NewCustomFood {
        name: name.to_string(),
        unit,
        reference_amount: food.reference_amount,
        nutrients: food.nutrients,
    })
}

// --- Calorie entries ---

#[derive(Debug, Clone, Serialize)]
pub struct CalorieEntry {
    pub id: i64,
    pub user_id: i64,
    pub food_item_id: i64,
    pub meal_type: MealType,
    pub quantity: f64,
    pub unit: String,
    pub date: NaiveDate,
    pub created_at: String,
    pub food_item: FoodItem,
    pub totals: NutritionTotals,
}

#[derive(Debug, Clone)]
pub struct NewCalorieEntry {
    pub food_item_id: i64,
    pub meal_type: MealType,
    pub quantity: f64,
    pub unit: String,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateCalorieEntry {
    pub quantity: Option<f64>,
    pub unit: Option<String>,
    pub meal_type: Option<MealType>,
}

impl UpdateCalorieEntry {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.quantity.is_none() && self.unit.is_none() && self.meal_type.is_none()
    }
}

pub fn validate_quantity(quantity: f64) -> Result<()> {
    if !quantity.is_finite() || quantity <= 0.0 {
        return Err(VitalsError::validation("Quantity must be greater than 0").into());
    }
    Ok(())
}

// --- Exercise ---

#[derive(Debug, Clone, Serialize)]
pub struct ExerciseEntry {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub calories_burned: f64,
    pub date: NaiveDate,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct NewExerciseEntry {
    pub name: String,
    pub calories_burned: f64,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateExerciseEntry {
    pub name: Option<String>,
    pub calories_burned: Option<f64>,
}

pub fn validate_exercise_name(name: &str) -> Result<()> {
    let len = name.chars().count();
    if len == 0 || len > MAX_EXERCISE_NAME_LEN {
        return Err(VitalsError::validation(format!(
            "Exercise name must be between 1 and {MAX_EXERCISE_NAME_LEN} characters"
        ))
        .into());
    }
    Ok(())
}

pub fn validate_calories_burned(calories: f64) -> Result<()> {
    if !calories.is_finite() || calories <= 0.0 {
        return Err(VitalsError::validation("Calories burned must be greater than 0").into());
    }
    Ok(())
}

// --- Weight ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeightEntry {
    pub id: i64,
    pub user_id: i64,
    pub date: NaiveDate,
    pub weight: f64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct NewWeightEntry {
    pub date: NaiveDate,
    pub weight: f64,
}

pub fn validate_weight(weight: f64) -> Result<()> {
    if !weight.is_finite() || weight <= 0.0 {
        return Err(VitalsError::validation("Weight must be greater than 0").into());
    }
    Ok(())
}

// --- Validation helpers ---

pub fn validate_macro_split(protein: i64, carbs: i64, fat: i64) -> Result<()> {
    for (name, pct) in [("protein", protein), ("carbs", carbs), ("fat", fat)] {
        if !(0..=100).contains(&pct) {
            return Err(VitalsError::validation(format!(
                "{name} percentage must be between 0 and 100"
            ))
            .into());
        }
    }
    let total = protein + carbs + fat;
    if total != 100 {
        return Err(VitalsError::validation(format!(
            "Macro percentages must sum to 100 (got {total})"
        ))
        .into());
    }
    Ok(())
}

pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).map_err(|_| {
        VitalsError::validation(format!("Invalid date '{s}'. Use YYYY-MM-DD")).into()
    })
}
