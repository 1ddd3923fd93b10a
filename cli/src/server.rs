use std::sync::{Arc, Mutex, MutexGuard};

use axum::{
    Extension, Json, Router,
    extract::{Path, Query, Request, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post, put},
};
use serde::{Deserialize, Serialize};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info, warn};

use crate::auth;
use crate::config::Config;
use crate::usda::UsdaClient;
use vitals_core::clock::ReferenceClock;
use vitals_core::db::Database;
use vitals_core::error::{VitalsError, find_vitals_error};
use vitals_core::goals::NutritionGoals;
use vitals_core::models::{
    CalorieEntry, CustomFood, CustomNutrition, ExerciseEntry, FoodItem, NewCalorieEntry,
    NewCustomFood, NewExerciseEntry, NewFoodItem, NewWeightEntry, NutritionTotals,
    UpdateCalorieEntry, UpdateExerciseEntry, UpdateProfile, User, WeightEntry, parse_date,
};
use vitals_core::summary::{DailySummary, WeeklyComparison};
use vitals_core::usda::UsdaFood;
use vitals_core::weight_trend::{Aggregation, HistoryQuery, TrendPoint};

const BODY_LIMIT: usize = 1024 * 1024; // 1 MiB

#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Database>>,
    usda: Arc<UsdaClient>,
    clock: ReferenceClock,
    session_days: i64,
    bcrypt_cost: u32,
}

impl AppState {
    fn db(&self) -> MutexGuard<'_, Database> {
        self.db
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Set by `require_auth` for every protected route.
#[derive(Clone, Copy)]
struct AuthUser(i64);

// --- Request / Response types ---

#[derive(Deserialize)]
struct CredentialsRequest {
    username: String,
    password: String,
}

#[derive(Serialize)]
struct TokenResponse {
    access_token: String,
    token_type: &'static str,
}

#[derive(Deserialize)]
struct ProfileUpdateRequest {
    sex: Option<String>,
    age: Option<i64>,
    height: Option<i64>,
    weight: Option<i64>,
    goal: Option<String>,
}

#[derive(Deserialize)]
struct DateQuery {
    date: Option<String>,
}

#[derive(Deserialize)]
struct FoodSearchQuery {
    q: Option<String>,
}

#[derive(Deserialize)]
struct UsdaSearchQuery {
    #[serde(default)]
    q: String,
}

#[derive(Deserialize)]
struct CreateEntryRequest {
    food_item_id: i64,
    meal_type: String,
    quantity: f64,
    #[serde(default = "default_unit")]
    unit: String,
    date: Option<String>,
}

fn default_unit() -> String {
    "serving".to_string()
}

#[derive(Deserialize)]
struct UpdateEntryRequest {
    quantity: Option<f64>,
    unit: Option<String>,
    meal_type: Option<String>,
}

#[derive(Deserialize)]
struct CreateFoodItemRequest {
    name: String,
    #[serde(default = "default_serving_size")]
    serving_size: String,
    reference_amount: Option<f64>,
    #[serde(flatten)]
    nutrients: NutritionTotals,
}

fn default_serving_size() -> String {
    "100g".to_string()
}

#[derive(Deserialize)]
struct CreateCustomFoodRequest {
    name: String,
    unit: String,
    reference_amount: f64,
    #[serde(flatten)]
    nutrients: NutritionTotals,
}

#[derive(Deserialize)]
struct CreateExerciseRequest {
    name: String,
    calories_burned: f64,
    date: Option<String>,
}

#[derive(Deserialize)]
struct UpdateExerciseRequest {
    name: Option<String>,
    calories_burned: Option<f64>,
}

#[derive(Deserialize)]
struct CreateWeightRequest {
    date: Option<String>,
    weight: f64,
}

#[derive(Deserialize)]
struct WeightHistoryParams {
    days: Option<i64>,
    start: Option<String>,
    end: Option<String>,
    aggregation: Option<String>,
    limit: Option<usize>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

#[derive(Debug)]
enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    NotFound(String),
    Upstream(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg),
            Self::Internal(err) => {
                error!("Internal server error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match find_vitals_error(&err) {
            Some(VitalsError::Validation(msg)) => Self::BadRequest(msg.clone()),
            Some(VitalsError::NotFound(msg)) => Self::NotFound(msg.clone()),
            Some(e @ VitalsError::Upstream(_)) => Self::Upstream(e.to_string()),
            None => Self::Internal(err),
        }
    }
}

impl From<VitalsError> for ApiError {
    fn from(err: VitalsError) -> Self {
        anyhow::Error::from(err).into()
    }
}

// --- Middleware ---

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

async fn require_auth(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let Some(token) = bearer_token(request.headers()) else {
        return ApiError::Unauthorized("Not authenticated".to_string()).into_response();
    };

    let user_id = {
        let db = state.db();
        match auth::authenticate(&db, token) {
            Ok(user_id) => user_id,
            Err(err) => return ApiError::Internal(err).into_response(),
        }
    };

    let Some(user_id) = user_id else {
        return ApiError::Unauthorized("Invalid or expired token".to_string()).into_response();
    };
    request.extensions_mut().insert(AuthUser(user_id));
    next.run(request).await
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

// --- Auth handlers ---

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn register(
    State(state): State<AppState>,
    Json(req): Json<CredentialsRequest>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let CredentialsRequest { username, password } = req;
    let cost = state.bcrypt_cost;
    let (username, hash) = auth::blocking(move || {
        auth::hash_credentials(&username, &password, cost).map(|hash| (username, hash))
    })
    .await??;
    let user = state.db().create_user(&username, &hash)?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<CredentialsRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let token = auth::login(&state.db, &req.username, &req.password, state.session_days)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Incorrect username or password".to_string()))?;
    Ok(Json(TokenResponse {
        access_token: token,
        token_type: "bearer",
    }))
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<StatusCode, ApiError> {
    if let Some(token) = bearer_token(&headers) {
        auth::logout(&state.db(), token)?;
    }
    Ok(StatusCode::NO_CONTENT)
}

// --- Profile handlers ---

async fn get_profile(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.db().get_user(user_id)?))
}

async fn update_profile(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(req): Json<ProfileUpdateRequest>,
) -> Result<Json<User>, ApiError> {
    let update = UpdateProfile {
        sex: req.sex.as_deref().map(str::parse).transpose()?,
        age: req.age,
        height: req.height,
        weight: req.weight,
        goal: req.goal.as_deref().map(str::parse).transpose()?,
    };
    if update.is_empty() {
        return Err(ApiError::BadRequest(
            "At least one field must be provided".to_string(),
        ));
    }
    Ok(Json(state.db().update_profile(user_id, &update)?))
}

async fn set_custom_nutrition(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(req): Json<CustomNutrition>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.db().set_custom_nutrition(user_id, Some(&req))?))
}

async fn clear_custom_nutrition(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.db().set_custom_nutrition(user_id, None)?))
}

async fn get_nutrition_goals(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> Result<Json<NutritionGoals>, ApiError> {
    Ok(Json(state.db().nutrition_goals(user_id)?))
}

async fn get_weekly_comparison(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> Result<Json<WeeklyComparison>, ApiError> {
    let today = state.clock.today();
    Ok(Json(state.db().build_weekly_comparison(user_id, today)?))
}

// --- Nutrition handlers ---

async fn get_daily_summary(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Query(params): Query<DateQuery>,
) -> Result<Json<DailySummary>, ApiError> {
    let date = state.clock.date_or_today(params.date.as_deref())?;
    Ok(Json(state.db().build_daily_summary(user_id, date)?))
}

async fn create_entry(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(req): Json<CreateEntryRequest>,
) -> Result<(StatusCode, Json<CalorieEntry>), ApiError> {
    let entry = NewCalorieEntry {
        food_item_id: req.food_item_id,
        meal_type: req.meal_type.parse()?,
        quantity: req.quantity,
        unit: req.unit,
        date: state.clock.date_or_today(req.date.as_deref())?,
    };
    let created = state.db().insert_calorie_entry(user_id, &entry)?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_entry(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateEntryRequest>,
) -> Result<Json<CalorieEntry>, ApiError> {
    let update = UpdateCalorieEntry {
        quantity: req.quantity,
        unit: req.unit,
        meal_type: req.meal_type.as_deref().map(str::parse).transpose()?,
    };
    Ok(Json(state.db().update_calorie_entry(user_id, id, &update)?))
}

async fn delete_entry(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.db().delete_calorie_entry(user_id, id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_food_items(
    State(state): State<AppState>,
    Query(params): Query<FoodSearchQuery>,
) -> Result<Json<Vec<FoodItem>>, ApiError> {
    Ok(Json(state.db().list_food_items(params.q.as_deref())?))
}

async fn create_food_item(
    State(state): State<AppState>,
    Json(req): Json<CreateFoodItemRequest>,
) -> Result<(StatusCode, Json<FoodItem>), ApiError> {
    let food = NewFoodItem {
        name: req.name,
        serving_size: req.serving_size,
        reference_amount: req.reference_amount,
        nutrients: req.nutrients,
        source: "manual".to_string(),
        fdc_id: None,
    };
    let created = state.db().insert_food_item(&food)?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn list_custom_foods(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> Result<Json<Vec<CustomFood>>, ApiError> {
    Ok(Json(state.db().list_custom_foods(user_id)?))
}

async fn create_custom_food(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(req): Json<CreateCustomFoodRequest>,
) -> Result<(StatusCode, Json<CustomFood>), ApiError> {
    let food = NewCustomFood {
        name: req.name,
        unit: req.unit,
        reference_amount: req.reference_amount,
        nutrients: req.nutrients,
    };
    let created = state.db().insert_custom_food(user_id, &food)?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn delete_custom_food(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.db().delete_custom_food(user_id, id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn seed_custom_food_item(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<(StatusCode, Json<FoodItem>), ApiError> {
    let item = state.db().seed_food_item(user_id, id)?;
    Ok((StatusCode::CREATED, Json(item)))
}

async fn usda_search(
    State(state): State<AppState>,
    Query(params): Query<UsdaSearchQuery>,
) -> Result<Json<Vec<UsdaFood>>, ApiError> {
    let query = params.q.trim();
    if query.is_empty() {
        return Err(ApiError::BadRequest("Query cannot be empty".to_string()));
    }
    Ok(Json(state.usda.search(query).await?))
}

async fn usda_import(
    State(state): State<AppState>,
    Path(fdc_id): Path<i64>,
) -> Result<(StatusCode, Json<FoodItem>), ApiError> {
    // Fetch first; the database lock is never held across the request.
    let seed = state.usda.food_item(fdc_id).await?;
    let item = state.db().find_or_create_food_item(&seed)?;
    Ok((StatusCode::CREATED, Json(item)))
}

// --- Exercise handlers ---

async fn list_exercises(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Query(params): Query<DateQuery>,
) -> Result<Json<Vec<ExerciseEntry>>, ApiError> {
    let date = state.clock.date_or_today(params.date.as_deref())?;
    Ok(Json(state.db().exercises_between(user_id, date, date)?))
}

async fn create_exercise(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(req): Json<CreateExerciseRequest>,
) -> Result<(StatusCode, Json<ExerciseEntry>), ApiError> {
    let entry = NewExerciseEntry {
        name: req.name,
        calories_burned: req.calories_burned,
        date: state.clock.date_or_today(req.date.as_deref())?,
    };
    let created = state.db().insert_exercise(user_id, &entry)?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_exercise(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateExerciseRequest>,
) -> Result<Json<ExerciseEntry>, ApiError> {
    let update = UpdateExerciseEntry {
        name: req.name,
        calories_burned: req.calories_burned,
    };
    Ok(Json(state.db().update_exercise(user_id, id, &update)?))
}

async fn delete_exercise(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.db().delete_exercise(user_id, id)?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Weight handlers ---

async fn create_weight(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(req): Json<CreateWeightRequest>,
) -> Result<(StatusCode, Json<WeightEntry>), ApiError> {
    let entry = NewWeightEntry {
        date: state.clock.date_or_today(req.date.as_deref())?,
        weight: req.weight,
    };
    let saved = state.db().upsert_weight(user_id, &entry)?;
    Ok((StatusCode::CREATED, Json(saved)))
}

fn history_query(params: &WeightHistoryParams) -> Result<HistoryQuery, ApiError> {
    let start = params.start.as_deref().map(parse_date).transpose()?;
    let end = params.end.as_deref().map(parse_date).transpose()?;
    let aggregation = params
        .aggregation
        .as_deref()
        .filter(|a| !a.trim().is_empty())
        .map(str::parse::<Aggregation>)
        .transpose()?;
    Ok(HistoryQuery::from_params(
        params.days,
        start,
        end,
        aggregation,
        params.limit,
    ))
}

async fn weight_history(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Query(params): Query<WeightHistoryParams>,
) -> Result<Json<Vec<TrendPoint>>, ApiError> {
    let query = history_query(&params)?;
    let today = state.clock.today();
    Ok(Json(state.db().weight_trend(user_id, &query, today)?))
}

async fn latest_weight(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> Result<Json<Option<WeightEntry>>, ApiError> {
    Ok(Json(state.db().latest_weight(user_id)?))
}

async fn delete_weight(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.db().delete_weight(user_id, id)?;
    Ok(StatusCode::NO_CONTENT)
}

fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/auth/logout", post(logout))
        .route("/api/profile", get(get_profile).put(update_profile))
        .route(
            "/api/profile/custom-nutrition",
            put(set_custom_nutrition).delete(clear_custom_nutrition),
        )
        .route("/api/profile/nutrition-goals", get(get_nutrition_goals))
        .route("/api/profile/weekly-comparison", get(get_weekly_comparison))
        .route("/api/nutrition/daily", get(get_daily_summary))
        .route("/api/nutrition/entries", post(create_entry))
        .route(
            "/api/nutrition/entries/{id}",
            patch(update_entry).delete(delete_entry),
        )
        .route(
            "/api/nutrition/food-items",
            get(list_food_items).post(create_food_item),
        )
        .route(
            "/api/nutrition/custom-foods",
            get(list_custom_foods).post(create_custom_food),
        )
        .route("/api/nutrition/custom-foods/{id}", delete(delete_custom_food))
        .route(
            "/api/nutrition/custom-foods/{id}/food-item",
            post(seed_custom_food_item),
        )
        .route("/api/nutrition/usda/search", get(usda_search))
        .route("/api/nutrition/usda/{fdc_id}", post(usda_import))
        .route("/api/exercises", get(list_exercises).post(create_exercise))
        .route(
            "/api/exercises/{id}",
            patch(update_exercise).delete(delete_exercise),
        )
        .route("/api/weights", post(create_weight))
        .route("/api/weights/history", get(weight_history))
        .route("/api/weights/latest", get(latest_weight))
        .route("/api/weights/{id}", delete(delete_weight))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/api/health", get(health))
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .merge(protected)
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

// --- Server startup ---

pub async fn start_server(db: Database, config: &Config, port: u16, bind: &str) -> anyhow::Result<()> {
    let state = AppState {
        db: Arc::new(Mutex::new(db)),
        usda: Arc::new(UsdaClient::new(config.usda_api_key.clone())?),
        clock: ReferenceClock::new(config.time_zone),
        session_days: config.session_days,
        bcrypt_cost: config.bcrypt_cost,
    };

    if config.usda_api_key.is_none() {
        warn!("USDA_API_KEY is not set; USDA lookups will fail with 502");
    }
    if bind != "127.0.0.1" && bind != "localhost" {
        warn!("Listening on {bind}. Traffic is plain HTTP; put a TLS proxy in front of it.");
    }

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}")).await?;
    info!(
        time_zone = %config.time_zone,
        db = %config.db_path.display(),
        "Listening on http://{bind}:{port}"
    );
    axum::serve(listener, app).await?;

    Ok(())
}
