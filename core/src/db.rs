use std::path::Path;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Type, ValueRef};
use rusqlite::{Connection, params};
use tracing::{debug, info};

use crate::error::VitalsError;
use crate::goals::{self, NutritionGoals};
use crate::models::{
    CalorieEntry, CustomFood, CustomNutrition, DATE_FORMAT, ExerciseEntry, FoodItem, Goal,
    MealType, NewCalorieEntry, NewCustomFood, NewExerciseEntry, NewFoodItem, NewWeightEntry,
    NutritionTotals, Sex, UpdateCalorieEntry, UpdateExerciseEntry, UpdateProfile, User,
    WeightEntry, validate_calories_burned, validate_custom_food, validate_exercise_name,
    validate_food_item, validate_quantity, validate_weight,
};
use crate::summary::{self, DailySummary, WeeklyComparison, entry_totals, week_bounds};
use crate::weight_trend::{self, HistoryQuery, TrendPoint};

const USER_COLUMNS: &str = "id, username, sex, age, height, weight, goal,
    custom_calories, custom_protein_pct, custom_carbs_pct, custom_fat_pct, created_at";

const FOOD_ITEM_COLUMNS: &str = "id, name, serving_size, reference_amount, calories,
    protein_g, carbs_g, fat_g, fiber_g, sodium_mg, source, fdc_id, created_at";

// Entry columns 0..=7, food item columns from 8 (same order as FOOD_ITEM_COLUMNS).
const CALORIE_ENTRY_SELECT: &str = "SELECT ce.id, ce.user_id, ce.food_item_id, ce.meal_type,
        ce.quantity, ce.unit, ce.date, ce.created_at,
        fi.id, fi.name, fi.serving_size, fi.reference_amount, fi.calories, fi.protein_g,
        fi.carbs_g, fi.fat_g, fi.fiber_g, fi.sodium_mg, fi.source, fi.fdc_id, fi.created_at
     FROM calorie_entries ce
     JOIN food_items fi ON ce.food_item_id = fi.id";

const EXERCISE_COLUMNS: &str =
    "id, user_id, name, calories_burned, date, created_at, updated_at";

const WEIGHT_COLUMNS: &str = "id, user_id, date, weight, created_at, updated_at";

const CUSTOM_FOOD_COLUMNS: &str = "id, user_id, name, unit, reference_amount, calories,
    protein_g, carbs_g, fat_g, fiber_g, sodium_mg, created_at";

fn now() -> String {
    Utc::now().to_rfc3339()
}

fn date_str(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn date_col(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<NaiveDate> {
    let s: String = row.get(idx)?;
    NaiveDate::parse_from_str(&s, DATE_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn text_enum<T>(value: ValueRef<'_>) -> FromSqlResult<T>
where
    T: std::str::FromStr<Err = VitalsError>,
{
    value
        .as_str()?
        .parse()
        .map_err(|e: VitalsError| FromSqlError::Other(Box::new(e)))
}

impl FromSql for MealType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        text_enum(value)
    }
}

impl ToSql for MealType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Goal {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        text_enum(value)
    }
}

impl ToSql for Goal {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Sex {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        text_enum(value)
    }
}

impl ToSql for Sex {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    #[allow(clippy::too_many_lines)]
    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    username TEXT NOT NULL UNIQUE,
                    password_hash TEXT NOT NULL,
                    sex TEXT,
                    age INTEGER,
                    height INTEGER,
                    weight INTEGER,
                    goal TEXT NOT NULL DEFAULT 'maintain',
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS sessions (
                    token_hash TEXT PRIMARY KEY,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    created_at TEXT NOT NULL,
                    expires_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS food_items (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL UNIQUE,
                    serving_size TEXT NOT NULL,
                    reference_amount REAL,
                    calories REAL NOT NULL,
                    protein_g REAL NOT NULL DEFAULT 0,
                    carbs_g REAL NOT NULL DEFAULT 0,
                    fat_g REAL NOT NULL DEFAULT 0,
                    fiber_g REAL NOT NULL DEFAULT 0,
                    sodium_mg REAL NOT NULL DEFAULT 0,
                    source TEXT NOT NULL,
                    fdc_id INTEGER,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS calorie_entries (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    food_item_id INTEGER NOT NULL REFERENCES food_items(id),
                    meal_type TEXT NOT NULL,
                    quantity REAL NOT NULL,
                    unit TEXT NOT NULL DEFAULT 'serving',
                    date TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS exercise_entries (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    name TEXT NOT NULL,
                    calories_burned REAL NOT NULL,
                    date TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS weight_entries (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    date TEXT NOT NULL,
                    weight REAL NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    UNIQUE (user_id, date)
                );

                CREATE TABLE IF NOT EXISTS custom_foods (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    name TEXT NOT NULL,
                    unit TEXT NOT NULL,
                    reference_amount REAL NOT NULL,
                    calories REAL NOT NULL,
                    protein_g REAL NOT NULL DEFAULT 0,
                    carbs_g REAL NOT NULL DEFAULT 0,
                    fat_g REAL NOT NULL DEFAULT 0,
                    fiber_g REAL NOT NULL DEFAULT 0,
                    sodium_mg REAL NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_calorie_entries_user_date ON calorie_entries(user_id, date);
                CREATE INDEX IF NOT EXISTS idx_exercise_entries_user_date ON exercise_entries(user_id, date);
                CREATE INDEX IF NOT EXISTS idx_custom_foods_user ON custom_foods(user_id);
                CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);

                PRAGMA user_version = 1;",
            )?;
            info!("database schema created");
        }

        if version < 2 {
            // Per-user calorie/macro override
            self.conn.execute_batch(
                "ALTER TABLE users ADD COLUMN custom_calories INTEGER;
                 ALTER TABLE users ADD COLUMN custom_protein_pct INTEGER;
                 ALTER TABLE users ADD COLUMN custom_carbs_pct INTEGER;
                 ALTER TABLE users ADD COLUMN custom_fat_pct INTEGER;
                 PRAGMA user_version = 2;",
            )?;
            debug!("migrated database to version 2");
        }

        Ok(())
    }

    // --- Row mapping helpers ---

    fn user_from_row(row: &rusqlite::Row) -> rusqlite::Result<User> {
        let custom_calories: Option<i64> = row.get(7)?;
        let protein_pct: Option<i64> = row.get(8)?;
        let carbs_pct: Option<i64> = row.get(9)?;
        let fat_pct: Option<i64> = row.get(10)?;
        let custom_nutrition = match (custom_calories, protein_pct, carbs_pct, fat_pct) {
            (Some(calories), Some(protein_pct), Some(carbs_pct), Some(fat_pct)) => {
                Some(CustomNutrition {
                    calories,
                    protein_pct,
                    carbs_pct,
                    fat_pct,
                })
            }
            _ => None,
        };
        Ok(User {
            id: row.get(0)?,
            username: row.get(1)?,
            sex: row.get(2)?,
            age: row.get(3)?,
            height: row.get(4)?,
            weight: row.get(5)?,
            goal: row.get(6)?,
            custom_nutrition,
            created_at: row.get(11)?,
        })
    }

    fn food_item_at(row: &rusqlite::Row, base: usize) -> rusqlite::Result<FoodItem> {
        Ok(FoodItem {
            id: row.get(base)?,
            name: row.get(base + 1)?,
            serving_size: row.get(base + 2)?,
            reference_amount: row.get(base + 3)?,
            nutrients: NutritionTotals {
                calories: row.get(base + 4)?,
                protein_g: row.get(base + 5)?,
                carbs_g: row.get(base + 6)?,
                fat_g: row.get(base + 7)?,
                fiber_g: row.get(base + 8)?,
                sodium_mg: row.get(base + 9)?,
            },
            source: row.get(base + 10)?,
            fdc_id: row.get(base + 11)?,
            created_at: row.get(base + 12)?,
        })
    }

    fn food_item_from_row(row: &rusqlite::Row) -> rusqlite::Result<FoodItem> {
        Self::food_item_at(row, 0)
    }

    fn calorie_entry_from_row(row: &rusqlite::Row) -> rusqlite::Result<CalorieEntry> {
        let food_item = Self::food_item_at(row, 8)?;
        let quantity: f64 = row.get(4)?;
        let totals = entry_totals(&food_item, quantity);
        Ok(CalorieEntry {
            id: row.get(0)?,
            user_id: row.get(1)?,
            food_item_id: row.get(2)?,
            meal_type: row.get(3)?,
            quantity,
            unit: row.get(5)?,
            date: date_col(row, 6)?,
            created_at: row.get(7)?,
            food_item,
            totals,
        })
    }

    fn exercise_from_row(row: &rusqlite::Row) -> rusqlite::Result<ExerciseEntry> {
        Ok(ExerciseEntry {
            id: row.get(0)?,
            user_id: row.get(1)?,
            name: row.get(2)?,
            calories_burned: row.get(3)?,
            date: date_col(row, 4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    fn weight_entry_from_row(row: &rusqlite::Row) -> rusqlite::Result<WeightEntry> {
        Ok(WeightEntry {
            id: row.get(0)?,
            user_id: row.get(1)?,
            date: date_col(row, 2)?,
            weight: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }

    fn custom_food_from_row(row: &rusqlite::Row) -> rusqlite::Result<CustomFood> {
        Ok(CustomFood {
            id: row.get(0)?,
            user_id: row.get(1)?,
            name: row.get(2)?,
            unit: row.get(3)?,
            reference_amount: row.get(4)?,
            nutrients: NutritionTotals {
                calories: row.get(5)?,
                protein_g: row.get(6)?,
                carbs_g: row.get(7)?,
                fat_g: row.get(8)?,
                fiber_g: row.get(9)?,
                sodium_mg: row.get(10)?,
            },
            created_at: row.get(11)?,
        })
    }

    // --- Users ---

    pub fn create_user(&self, username: &str, password_hash: &str) -> Result<User> {
        let username = username.trim();
        if username.is_empty() {
            return Err(VitalsError::validation("Username cannot be empty").into());
        }
        if self.find_user_by_username(username)?.is_some() {
            return Err(VitalsError::validation("Username already registered").into());
        }
        self.conn.execute(
            "INSERT INTO users (username, password_hash, goal, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![username, password_hash, Goal::default(), now()],
        )?;
        let id = self.conn.last_insert_rowid();
        info!(user_id = id, "registered user");
        self.get_user(id)
    }

    pub fn get_user(&self, id: i64) -> Result<User> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"))?;
        let mut rows = stmt.query(params![id])?;
        if let Some(row) = rows.next()? {
            Ok(Self::user_from_row(row)?)
        } else {
            Err(VitalsError::not_found("User not found").into())
        }
    }

    pub fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        Ok(self
            .find_credentials(username)?
            .map(|(user, _)| user))
    }

    /// The user and their stored password hash.
    pub fn find_credentials(&self, username: &str) -> Result<Option<(User, String)>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {USER_COLUMNS}, password_hash FROM users WHERE username = ?1"
        ))?;
        let mut rows = stmt.query(params![username.trim()])?;
        if let Some(row) = rows.next()? {
            let user = Self::user_from_row(row)?;
            let hash: String = row.get(12)?;
            Ok(Some((user, hash)))
        } else {
            Ok(None)
        }
    }

    pub fn update_profile(&self, user_id: i64, update: &UpdateProfile) -> Result<User> {
        update.validate()?;
        self.conn.execute(
            "UPDATE users SET
                sex = COALESCE(?1, sex),
                age = COALESCE(?2, age),
                height = COALESCE(?3, height),
                weight = COALESCE(?4, weight),
                goal = COALESCE(?5, goal)
             WHERE id = ?6",
            params![
                update.sex,
                update.age,
                update.height,
                update.weight,
                update.goal,
                user_id
            ],
        )?;
        self.get_user(user_id)
    }

    pub fn set_custom_nutrition(
        &self,
        user_id: i64,
        custom: Option<&CustomNutrition>,
    ) -> Result<User> {
        if let Some(c) = custom {
            c.validate()?;
        }
        self.conn.execute(
            "UPDATE users SET custom_calories = ?1, custom_protein_pct = ?2,
                custom_carbs_pct = ?3, custom_fat_pct = ?4
             WHERE id = ?5",
            params![
                custom.map(|c| c.calories),
                custom.map(|c| c.protein_pct),
                custom.map(|c| c.carbs_pct),
                custom.map(|c| c.fat_pct),
                user_id
            ],
        )?;
        self.get_user(user_id)
    }

    // --- Sessions ---

    pub fn create_session(&self, user_id: i64, token_hash: &str, expires_at: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO sessions (token_hash, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
            params![token_hash, user_id, now(), expires_at],
        )?;
        Ok(())
    }

    /// The user owning an unexpired session, if any.
    pub fn session_user(&self, token_hash: &str, now: &str) -> Result<Option<i64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT user_id FROM sessions WHERE token_hash = ?1 AND expires_at > ?2")?;
        let mut rows = stmt.query(params![token_hash, now])?;
        if let Some(row) = rows.next()? {
            Ok(Some(row.get(0)?))
        } else {
            Ok(None)
        }
    }

    pub fn delete_session(&self, token_hash: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM sessions WHERE token_hash = ?1", params![token_hash])?;
        Ok(rows > 0)
    }

    pub fn purge_expired_sessions(&self, now: &str) -> Result<usize> {
        let rows = self
            .conn
            .execute("DELETE FROM sessions WHERE expires_at <= ?1", params![now])?;
        if rows > 0 {
            debug!(count = rows, "purged expired sessions");
        }
        Ok(rows)
    }

    // --- Food items ---

    pub fn insert_food_item(&self, food: &NewFoodItem) -> Result<FoodItem> {
        validate_food_item(food)?;
        let name = food.name.trim();
        if self.find_food_item_by_name(name)?.is_some() {
            return Err(VitalsError::validation(format!("Food item '{name}' already exists")).into());
        }
        self.conn.execute(
            "INSERT INTO food_items (name, serving_size, reference_amount, calories, protein_g,
                carbs_g, fat_g, fiber_g, sodium_mg, source, fdc_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                name,
                food.serving_size,
                food.reference_amount,
                food.nutrients.calories,
                food.nutrients.protein_g,
                food.nutrients.carbs_g,
                food.nutrients.fat_g,
                food.nutrients.fiber_g,
                food.nutrients.sodium_mg,
                food.source,
                food.fdc_id,
                now(),
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_food_item(id)
    }

    /// Reuse an item with the same name, or insert a new one.
    pub fn find_or_create_food_item(&self, food: &NewFoodItem) -> Result<FoodItem> {
        if let Some(existing) = self.find_food_item_by_name(food.name.trim())? {
            return Ok(existing);
        }
        self.insert_food_item(food)
    }

    pub fn get_food_item(&self, id: i64) -> Result<FoodItem> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {FOOD_ITEM_COLUMNS} FROM food_items WHERE id = ?1"))?;
        let mut rows = stmt.query(params![id])?;
        if let Some(row) = rows.next()? {
            Ok(Self::food_item_from_row(row)?)
        } else {
            Err(VitalsError::not_found(format!("Food item {id} not found")).into())
        }
    }

    pub fn find_food_item_by_name(&self, name: &str) -> Result<Option<FoodItem>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {FOOD_ITEM_COLUMNS} FROM food_items WHERE name = ?1"))?;
        let mut rows = stmt.query(params![name])?;
        if let Some(row) = rows.next()? {
            Ok(Some(Self::food_item_from_row(row)?))
        } else {
            Ok(None)
        }
    }

    pub fn list_food_items(&self, search: Option<&str>) -> Result<Vec<FoodItem>> {
        let items = if let Some(query) = search.map(str::trim).filter(|q| !q.is_empty()) {
            let escaped = query
                .replace('\\', "\\\\")
                .replace('%', "\\%")
                .replace('_', "\\_");
            let pattern = format!("%{escaped}%");
            let mut stmt = self.conn.prepare(&format!(
                "SELECT {FOOD_ITEM_COLUMNS} FROM food_items
                 WHERE name LIKE ?1 ESCAPE '\\' ORDER BY name LIMIT 50"
            ))?;
            stmt.query_map(params![pattern], Self::food_item_from_row)?
                .collect::<Result<Vec<_>, _>>()?
        } else {
            let mut stmt = self.conn.prepare(&format!(
                "SELECT {FOOD_ITEM_COLUMNS} FROM food_items ORDER BY name LIMIT 100"
            ))?;
            stmt.query_map([], Self::food_item_from_row)?
                .collect::<Result<Vec<_>, _>>()?
        };
        Ok(items)
    }

    // --- Calorie entries ---

    pub fn insert_calorie_entry(&self, user_id: i64, entry: &NewCalorieEntry) -> Result<CalorieEntry> {
        validate_quantity(entry.quantity)?;
        // surfaces NotFound for a missing food item
        self.get_food_item(entry.food_item_id)?;
        self.conn.execute(
            "INSERT INTO calorie_entries (user_id, food_item_id, meal_type, quantity, unit, date, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                user_id,
                entry.food_item_id,
                entry.meal_type,
                entry.quantity,
                entry.unit,
                date_str(entry.date),
                now(),
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_calorie_entry(user_id, id)
    }

    pub fn get_calorie_entry(&self, user_id: i64, id: i64) -> Result<CalorieEntry> {
        let mut stmt = self.conn.prepare(&format!(
            "{CALORIE_ENTRY_SELECT} WHERE ce.id = ?1 AND ce.user_id = ?2"
        ))?;
        let mut rows = stmt.query(params![id, user_id])?;
        if let Some(row) = rows.next()? {
            Ok(Self::calorie_entry_from_row(row)?)
        } else {
            Err(VitalsError::not_found(format!("Calorie entry {id} not found")).into())
        }
    }

    pub fn update_calorie_entry(
        &self,
        user_id: i64,
        id: i64,
        update: &UpdateCalorieEntry,
    ) -> Result<CalorieEntry> {
        if update.is_empty() {
            return Err(VitalsError::validation("At least one field must be provided").into());
        }
        if let Some(quantity) = update.quantity {
            validate_quantity(quantity)?;
        }
        // Verify ownership
        self.get_calorie_entry(user_id, id)?;

        if let Some(quantity) = update.quantity {
            self.conn.execute(
                "UPDATE calorie_entries SET quantity = ?1 WHERE id = ?2",
                params![quantity, id],
            )?;
        }
        if let Some(ref unit) = update.unit {
            self.conn.execute(
                "UPDATE calorie_entries SET unit = ?1 WHERE id = ?2",
                params![unit, id],
            )?;
        }
        if let Some(meal_type) = update.meal_type {
            self.conn.execute(
                "UPDATE calorie_entries SET meal_type = ?1 WHERE id = ?2",
                params![meal_type, id],
            )?;
        }

        self.get_calorie_entry(user_id, id)
    }

    pub fn delete_calorie_entry(&self, user_id: i64, id: i64) -> Result<()> {
        let rows = self.conn.execute(
            "DELETE FROM calorie_entries WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;
        if rows == 0 {
            return Err(VitalsError::not_found(format!("Calorie entry {id} not found")).into());
        }
        Ok(())
    }

    /// Entries with `start <= date <= end`, in date then insertion order.
    pub fn calorie_entries_between(
        &self,
        user_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<CalorieEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "{CALORIE_ENTRY_SELECT}
             WHERE ce.user_id = ?1 AND ce.date >= ?2 AND ce.date <= ?3
             ORDER BY ce.date, ce.id"
        ))?;
        let entries = stmt
            .query_map(
                params![user_id, date_str(start), date_str(end)],
                Self::calorie_entry_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    // --- Exercise ---

    pub fn insert_exercise(&self, user_id: i64, entry: &NewExerciseEntry) -> Result<ExerciseEntry> {
        let name = entry.name.trim();
        validate_exercise_name(name)?;
        validate_calories_burned(entry.calories_burned)?;
        let now = now();
        self.conn.execute(
            "INSERT INTO exercise_entries (user_id, name, calories_burned, date, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![user_id, name, entry.calories_burned, date_str(entry.date), now],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_exercise(user_id, id)
    }

    pub fn get_exercise(&self, user_id: i64, id: i64) -> Result<ExerciseEntry> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {EXERCISE_COLUMNS} FROM exercise_entries WHERE id = ?1 AND user_id = ?2"
        ))?;
        let mut rows = stmt.query(params![id, user_id])?;
        if let Some(row) = rows.next()? {
            Ok(Self::exercise_from_row(row)?)
        } else {
            Err(VitalsError::not_found(format!("Exercise entry {id} not found")).into())
        }
    }

    pub fn update_exercise(
        &self,
        user_id: i64,
        id: i64,
        update: &UpdateExerciseEntry,
    ) -> Result<ExerciseEntry> {
        if update.name.is_none() && update.calories_burned.is_none() {
            return Err(VitalsError::validation("At least one field must be provided").into());
        }
        let name = update.name.as_deref().map(str::trim);
        if let Some(name) = name {
            validate_exercise_name(name)?;
        }
        if let Some(calories) = update.calories_burned {
            validate_calories_burned(calories)?;
        }
        self.get_exercise(user_id, id)?;

        self.conn.execute(
            "UPDATE exercise_entries SET
                name = COALESCE(?1, name),
                calories_burned = COALESCE(?2, calories_burned),
                updated_at = ?3
             WHERE id = ?4 AND user_id = ?5",
            params![name, update.calories_burned, now(), id, user_id],
        )?;
        self.get_exercise(user_id, id)
    }

    pub fn delete_exercise(&self, user_id: i64, id: i64) -> Result<()> {
        let rows = self.conn.execute(
            "DELETE FROM exercise_entries WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;
        if rows == 0 {
            return Err(VitalsError::not_found(format!("Exercise entry {id} not found")).into());
        }
        Ok(())
    }

    pub fn exercises_between(
        &self,
        user_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ExerciseEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {EXERCISE_COLUMNS} FROM exercise_entries
             WHERE user_id = ?1 AND date >= ?2 AND date <= ?3
             ORDER BY date, id"
        ))?;
        let entries = stmt
            .query_map(
                params![user_id, date_str(start), date_str(end)],
                Self::exercise_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    // --- Weight entries ---

    /// Create the entry for `(user, date)` or overwrite the weight of the
    /// existing one, keeping its id. Syncs the profile weight afterwards.
    pub fn upsert_weight(&self, user_id: i64, entry: &NewWeightEntry) -> Result<WeightEntry> {
        validate_weight(entry.weight)?;
        let now = now();
        let id = if let Some(existing) = self.find_weight_on(user_id, entry.date)? {
            self.conn.execute(
                "UPDATE weight_entries SET weight = ?1, updated_at = ?2 WHERE id = ?3",
                params![entry.weight, now, existing.id],
            )?;
            debug!(user_id, entry_id = existing.id, "overwrote weight entry");
            existing.id
        } else {
            self.conn.execute(
                "INSERT INTO weight_entries (user_id, date, weight, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                params![user_id, date_str(entry.date), entry.weight, now],
            )?;
            self.conn.last_insert_rowid()
        };
        self.sync_profile_weight(user_id)?;
        self.get_weight(user_id, id)
    }

    pub fn get_weight(&self, user_id: i64, id: i64) -> Result<WeightEntry> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {WEIGHT_COLUMNS} FROM weight_entries WHERE id = ?1 AND user_id = ?2"
        ))?;
        let mut rows = stmt.query(params![id, user_id])?;
        if let Some(row) = rows.next()? {
            Ok(Self::weight_entry_from_row(row)?)
        } else {
            Err(VitalsError::not_found("Weight entry not found").into())
        }
    }

    pub fn find_weight_on(&self, user_id: i64, date: NaiveDate) -> Result<Option<WeightEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {WEIGHT_COLUMNS} FROM weight_entries WHERE user_id = ?1 AND date = ?2"
        ))?;
        let mut rows = stmt.query(params![user_id, date_str(date)])?;
        if let Some(row) = rows.next()? {
            Ok(Some(Self::weight_entry_from_row(row)?))
        } else {
            Ok(None)
        }
    }

    /// Ascending by date. Either bound may be open.
    pub fn weights_between(
        &self,
        user_id: i64,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<WeightEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {WEIGHT_COLUMNS} FROM weight_entries
             WHERE user_id = ?1
               AND (?2 IS NULL OR date >= ?2)
               AND (?3 IS NULL OR date <= ?3)
             ORDER BY date, id"
        ))?;
        let entries = stmt
            .query_map(
                params![user_id, start.map(date_str), end.map(date_str)],
                Self::weight_entry_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn latest_weight(&self, user_id: i64) -> Result<Option<WeightEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {WEIGHT_COLUMNS} FROM weight_entries
             WHERE user_id = ?1 ORDER BY date DESC, id DESC LIMIT 1"
        ))?;
        let mut rows = stmt.query(params![user_id])?;
        if let Some(row) = rows.next()? {
            Ok(Some(Self::weight_entry_from_row(row)?))
        } else {
            Ok(None)
        }
    }

    pub fn delete_weight(&self, user_id: i64, id: i64) -> Result<()> {
        let rows = self.conn.execute(
            "DELETE FROM weight_entries WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;
        if rows == 0 {
            return Err(VitalsError::not_found("Weight entry not found").into());
        }
        self.sync_profile_weight(user_id)
    }

    /// Profile weight follows the most recent entry, whole kilograms.
    fn sync_profile_weight(&self, user_id: i64) -> Result<()> {
        let weight = self.latest_weight(user_id)?.map(|e| e.weight.trunc() as i64);
        self.conn.execute(
            "UPDATE users SET weight = ?1 WHERE id = ?2",
            params![weight, user_id],
        )?;
        Ok(())
    }

    // --- Custom foods ---

    pub fn insert_custom_food(&self, user_id: i64, food: &NewCustomFood) -> Result<CustomFood> {
        let food = validate_custom_food(food)?;
        self.conn.execute(
            "INSERT INTO custom_foods (user_id, name, unit, reference_amount, calories, protein_g,
                carbs_g, fat_g, fiber_g, sodium_mg, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                user_id,
                food.name,
                food.unit,
                food.reference_amount,
                food.nutrients.calories,
                food.nutrients.protein_g,
                food.nutrients.carbs_g,
                food.nutrients.fat_g,
                food.nutrients.fiber_g,
                food.nutrients.sodium_mg,
                now(),
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_custom_food(user_id, id)
    }

    pub fn get_custom_food(&self, user_id: i64, id: i64) -> Result<CustomFood> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CUSTOM_FOOD_COLUMNS} FROM custom_foods WHERE id = ?1 AND user_id = ?2"
        ))?;
        let mut rows = stmt.query(params![id, user_id])?;
        if let Some(row) = rows.next()? {
            Ok(Self::custom_food_from_row(row)?)
        } else {
            Err(VitalsError::not_found("Custom food not found").into())
        }
    }

    pub fn list_custom_foods(&self, user_id: i64) -> Result<Vec<CustomFood>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CUSTOM_FOOD_COLUMNS} FROM custom_foods WHERE user_id = ?1 ORDER BY name, id"
        ))?;
        let foods = stmt
            .query_map(params![user_id], Self::custom_food_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(foods)
    }

    pub fn delete_custom_food(&self, user_id: i64, id: i64) -> Result<()> {
        let rows = self.conn.execute(
            "DELETE FROM custom_foods WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;
        if rows == 0 {
            return Err(VitalsError::not_found("Custom food not found").into());
        }
        Ok(())
    }

    /// Food item for logging a custom food, measured in its reference unit.
    pub fn seed_food_item(&self, user_id: i64, custom_food_id: i64) -> Result<FoodItem> {
        let custom = self.get_custom_food(user_id, custom_food_id)?;
        self.find_or_create_food_item(&NewFoodItem {
            serving_size: format!("{}{}", custom.reference_amount, custom.unit),
            name: custom.name,
            reference_amount: Some(custom.reference_amount),
            nutrients: custom.nutrients,
            source: "custom".to_string(),
            fdc_id: None,
        })
    }

    // --- Derived views ---

    pub fn nutrition_goals(&self, user_id: i64) -> Result<NutritionGoals> {
        let user = self.get_user(user_id)?;
        goals::goals_for_user(&user)
    }

    pub fn build_daily_summary(&self, user_id: i64, date: NaiveDate) -> Result<DailySummary> {
        let user = self.get_user(user_id)?;
        let entries = self.calorie_entries_between(user_id, date, date)?;
        let exercises = self.exercises_between(user_id, date, date)?;
        Ok(summary::daily_summary(
            date,
            goals::daily_goals(&user),
            entries,
            exercises,
        ))
    }

    pub fn build_weekly_comparison(&self, user_id: i64, today: NaiveDate) -> Result<WeeklyComparison> {
        let (_, current_end, last_start, _) = week_bounds(today);
        let entries = self.calorie_entries_between(user_id, last_start, current_end)?;
        let exercises = self.exercises_between(user_id, last_start, current_end)?;
        Ok(summary::weekly_comparison(today, &entries, &exercises))
    }

    pub fn weight_trend(
        &self,
        user_id: i64,
        query: &HistoryQuery,
        today: NaiveDate,
    ) -> Result<Vec<TrendPoint>> {
        let (start, end) = query.date_bounds(today);
        let entries = self.weights_between(user_id, start, end)?;
        Ok(weight_trend::trend(query, today, &entries))
    }
}
