mod auth;
mod commands;
mod config;
mod server;
mod usda;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process;
use tracing_subscriber::EnvFilter;

use crate::commands::{
    NutrientArgs, cmd_custom_food_add, cmd_custom_food_delete, cmd_custom_food_list,
    cmd_custom_food_seed, cmd_entry_delete, cmd_exercise_delete, cmd_exercise_list,
    cmd_exercise_log, cmd_food_add, cmd_food_list, cmd_goals, cmd_log, cmd_profile_custom,
    cmd_profile_set, cmd_profile_show, cmd_register, cmd_summary, cmd_usda_import,
    cmd_usda_search, cmd_weekly, cmd_weight_delete, cmd_weight_history, cmd_weight_latest,
    cmd_weight_log, json_error, resolve_user,
};
use crate::config::Config;
use crate::usda::UsdaClient;
use vitals_core::clock::ReferenceClock;
use vitals_core::db::Database;
use vitals_core::models::{CustomNutrition, UpdateProfile, parse_date};
use vitals_core::weight_trend::{Aggregation, HistoryQuery};

#[derive(Parser)]
#[command(
    name = "vitals",
    version,
    about = "Track food, exercise and body weight",
    long_about = "Track food, exercise and body weight.\n\n\
        Run `vitals serve` for the HTTP API, or use the subcommands to work \
        on the local database directly."
)]
struct Cli {
    /// Username to act as (for user-scoped commands)
    #[arg(long, global = true, env = "VITALS_USER")]
    user: Option<String>,
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the REST API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
    },
    /// Create a user account
    Register {
        /// Username
        username: String,
        /// Password
        #[arg(long, env = "VITALS_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Show or edit your profile
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },
    /// Show personal nutrition goals computed from your profile
    Goals,
    /// Show daily summary (defaults to today)
    Summary {
        /// Date to show (YYYY-MM-DD, default: today)
        date: Option<String>,
    },
    /// Compare this week's daily averages with last week's
    Weekly,
    /// Manage shared food items
    Food {
        #[command(subcommand)]
        command: FoodCommands,
    },
    /// Log a food item to a meal
    Log {
        /// Food item ID (see `vitals food list`)
        food_item_id: i64,
        /// Quantity, in servings or in the food's reference unit
        quantity: f64,
        /// Meal: breakfast, lunch, dinner, snack, in_between
        #[arg(short, long, default_value = "snack")]
        meal: String,
        /// Unit label stored with the entry
        #[arg(short, long, default_value = "serving")]
        unit: String,
        /// Date to log for (YYYY-MM-DD, default: today)
        #[arg(long)]
        date: Option<String>,
    },
    /// Delete a logged food entry by ID
    Unlog {
        /// Entry ID
        entry_id: i64,
    },
    /// Track exercise
    Exercise {
        #[command(subcommand)]
        command: ExerciseCommands,
    },
    /// Track body weight
    Weight {
        #[command(subcommand)]
        command: WeightCommands,
    },
    /// Manage your custom foods
    CustomFood {
        #[command(subcommand)]
        command: CustomFoodCommands,
    },
    /// Look up foods in USDA FoodData Central
    Usda {
        #[command(subcommand)]
        command: UsdaCommands,
    },
}

#[derive(Subcommand)]
enum ProfileCommands {
    /// Show your profile
    Show,
    /// Update profile fields
    Set {
        /// male, female or unspecified
        #[arg(long)]
        sex: Option<String>,
        /// Age in years
        #[arg(long)]
        age: Option<i64>,
        /// Height in cm
        #[arg(long)]
        height: Option<i64>,
        /// Weight in kg
        #[arg(long)]
        weight: Option<i64>,
        /// lose, maintain or gain
        #[arg(long)]
        goal: Option<String>,
    },
    /// Override computed goals with a fixed calorie budget and macro split
    Custom {
        /// Daily calories
        calories: i64,
        /// Protein percentage
        #[arg(long)]
        protein: i64,
        /// Carbs percentage
        #[arg(long)]
        carbs: i64,
        /// Fat percentage
        #[arg(long)]
        fat: i64,
    },
    /// Remove the custom override
    ClearCustom,
}

#[derive(Subcommand)]
enum FoodCommands {
    /// Add a food item
    Add {
        /// Food name
        name: String,
        /// Serving description
        #[arg(long, default_value = "100g")]
        serving: String,
        /// Amount the nutrients refer to; quantities are divided by it
        #[arg(long)]
        reference_amount: Option<f64>,
        #[command(flatten)]
        nutrients: NutrientArgs,
    },
    /// List or search food items
    List {
        /// Search query to filter by name
        #[arg(short, long)]
        search: Option<String>,
    },
}

#[derive(Subcommand)]
enum ExerciseCommands {
    /// Log an exercise
    Log {
        /// Exercise name
        name: String,
        /// Calories burned
        calories: f64,
        /// Date (YYYY-MM-DD, default: today)
        #[arg(long)]
        date: Option<String>,
    },
    /// List exercises for a day
    List {
        /// Date (YYYY-MM-DD, default: today)
        date: Option<String>,
    },
    /// Delete an exercise entry by ID
    Delete {
        /// Exercise entry ID
        id: i64,
    },
}

#[derive(Subcommand)]
enum WeightCommands {
    /// Log a weight (replaces any entry on the same date)
    Log {
        /// Weight value
        value: f64,
        /// Unit: kg or lbs
        #[arg(short, long, default_value = "kg")]
        unit: String,
        /// Date (YYYY-MM-DD, default: today)
        #[arg(long)]
        date: Option<String>,
    },
    /// Show weight history
    History {
        /// Number of days back (default: 90)
        #[arg(short, long)]
        days: Option<i64>,
        /// Range start (YYYY-MM-DD, needs --end)
        #[arg(long)]
        start: Option<String>,
        /// Range end (YYYY-MM-DD, needs --start)
        #[arg(long)]
        end: Option<String>,
        /// Average by week, month, quarter or year
        #[arg(short, long)]
        aggregation: Option<String>,
        /// Only the N most recent dates
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Show the most recent weight
    Latest,
    /// Delete a weight entry by ID
    Delete {
        /// Weight entry ID
        id: i64,
    },
}

#[derive(Subcommand)]
enum CustomFoodCommands {
    /// Add a custom food
    Add {
        /// Food name
        name: String,
        /// Unit: g, oz, ml, cup, tbsp, tsp, serving, piece, slice
        #[arg(long)]
        unit: String,
        /// Amount of `unit` the nutrients refer to
        #[arg(long)]
        amount: f64,
        #[command(flatten)]
        nutrients: NutrientArgs,
    },
    /// List your custom foods
    List,
    /// Delete a custom food by ID
    Delete {
        /// Custom food ID
        id: i64,
    },
    /// Create a loggable food item from a custom food
    Seed {
        /// Custom food ID
        id: i64,
    },
}

#[derive(Subcommand)]
enum UsdaCommands {
    /// Search FoodData Central
    Search {
        /// Search query
        query: String,
    },
    /// Import a food by FDC ID as a food item
    Import {
        /// FoodData Central ID
        fdc_id: i64,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if matches!(cli.command, Commands::Serve { .. }) {
        "info"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let json = cli.json;
    if let Err(e) = run(cli).await {
        if json {
            println!("{}", json_error(&format!("{e:#}")));
        } else {
            eprintln!("Error: {e:#}");
        }
        process::exit(1);
    }
}

fn history_query(
    days: Option<i64>,
    start: Option<&str>,
    end: Option<&str>,
    aggregation: Option<&str>,
    limit: Option<usize>,
) -> Result<HistoryQuery> {
    let start = start.map(parse_date).transpose()?;
    let end = end.map(parse_date).transpose()?;
    let aggregation = aggregation.map(str::parse::<Aggregation>).transpose()?;
    Ok(HistoryQuery::from_params(
        days,
        start,
        end,
        aggregation,
        limit,
    ))
}

#[allow(clippy::too_many_lines)]
async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let db = Database::open(&config.db_path)?;
    let clock = ReferenceClock::new(config.time_zone);
    let json = cli.json;
    let user = || resolve_user(&db, cli.user.as_deref());

    match cli.command {
        Commands::Serve { port, bind } => server::start_server(db, &config, port, &bind).await,
        Commands::Register { username, password } => {
            cmd_register(&db, &username, &password, config.bcrypt_cost, json)
        }
        Commands::Profile { command } => match command {
            ProfileCommands::Show => cmd_profile_show(&user()?, json),
            ProfileCommands::Set {
                sex,
                age,
                height,
                weight,
                goal,
            } => {
                let update = UpdateProfile {
                    sex: sex.as_deref().map(str::parse).transpose()?,
                    age,
                    height,
                    weight,
                    goal: goal.as_deref().map(str::parse).transpose()?,
                };
                cmd_profile_set(&db, &user()?, &update, json)
            }
            ProfileCommands::Custom {
                calories,
                protein,
                carbs,
                fat,
            } => {
                let custom = CustomNutrition {
                    calories,
                    protein_pct: protein,
                    carbs_pct: carbs,
                    fat_pct: fat,
                };
                cmd_profile_custom(&db, &user()?, Some(custom), json)
            }
            ProfileCommands::ClearCustom => cmd_profile_custom(&db, &user()?, None, json),
        },
        Commands::Goals => cmd_goals(&db, &user()?, json),
        Commands::Summary { date } => {
            let date = clock.date_or_today(date.as_deref())?;
            cmd_summary(&db, &user()?, date, json)
        }
        Commands::Weekly => cmd_weekly(&db, &user()?, clock.today(), json),
        Commands::Food { command } => match command {
            FoodCommands::Add {
                name,
                serving,
                reference_amount,
                nutrients,
            } => cmd_food_add(&db, &name, &serving, reference_amount, nutrients, json),
            FoodCommands::List { search } => cmd_food_list(&db, search.as_deref(), json),
        },
        Commands::Log {
            food_item_id,
            quantity,
            meal,
            unit,
            date,
        } => {
            let date = clock.date_or_today(date.as_deref())?;
            cmd_log(&db, &user()?, food_item_id, quantity, &unit, &meal, date, json)
        }
        Commands::Unlog { entry_id } => cmd_entry_delete(&db, &user()?, entry_id, json),
        Commands::Exercise { command } => match command {
            ExerciseCommands::Log {
                name,
                calories,
                date,
            } => {
                let date = clock.date_or_today(date.as_deref())?;
                cmd_exercise_log(&db, &user()?, &name, calories, date, json)
            }
            ExerciseCommands::List { date } => {
                let date = clock.date_or_today(date.as_deref())?;
                cmd_exercise_list(&db, &user()?, date, json)
            }
            ExerciseCommands::Delete { id } => cmd_exercise_delete(&db, &user()?, id, json),
        },
        Commands::Weight { command } => match command {
            WeightCommands::Log { value, unit, date } => {
                let date = clock.date_or_today(date.as_deref())?;
                cmd_weight_log(&db, &user()?, value, &unit, date, json)
            }
            WeightCommands::History {
                days,
                start,
                end,
                aggregation,
                limit,
            } => {
                let query = history_query(
                    days,
                    start.as_deref(),
                    end.as_deref(),
                    aggregation.as_deref(),
                    limit,
                )?;
                cmd_weight_history(&db, &user()?, &query, clock.today(), json)
            }
            WeightCommands::Latest => cmd_weight_latest(&db, &user()?, json),
            WeightCommands::Delete { id } => cmd_weight_delete(&db, &user()?, id, json),
        },
        Commands::CustomFood { command } => match command {
            CustomFoodCommands::Add {
                name,
                unit,
                amount,
                nutrients,
            } => cmd_custom_food_add(&db, &user()?, &name, &unit, amount, nutrients, json),
            CustomFoodCommands::List => cmd_custom_food_list(&db, &user()?, json),
            CustomFoodCommands::Delete { id } => cmd_custom_food_delete(&db, &user()?, id, json),
            CustomFoodCommands::Seed { id } => cmd_custom_food_seed(&db, &user()?, id, json),
        },
        Commands::Usda { command } => {
            let usda = UsdaClient::new(config.usda_api_key.clone())?;
            match command {
                UsdaCommands::Search { query } => cmd_usda_search(&usda, &query, json).await,
                UsdaCommands::Import { fdc_id } => cmd_usda_import(&db, &usda, fdc_id, json).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["vitals", "weight", "latest", "--user", "alice", "--json"])
            .unwrap();
        assert_eq!(cli.user.as_deref(), Some("alice"));
        assert!(cli.json);
        assert!(matches!(
            cli.command,
            Commands::Weight {
                command: WeightCommands::Latest
            }
        ));
    }

    #[test]
    fn test_nutrient_args_default_to_zero() {
        let cli = Cli::try_parse_from(["vitals", "food", "add", "Rice", "--calories", "130"]).unwrap();
        let Commands::Food {
            command: FoodCommands::Add {
                serving, nutrients, ..
            },
        } = cli.command
        else {
            panic!("expected food add");
        };
        assert_eq!(serving, "100g");
        assert!((nutrients.calories - 130.0).abs() < f64::EPSILON);
        assert!(nutrients.protein.abs() < f64::EPSILON);
    }

    #[test]
    fn test_history_query() {
        assert_eq!(
            history_query(None, None, None, None, None).unwrap(),
            HistoryQuery::default()
        );
        assert_eq!(
            history_query(Some(30), None, None, Some("month"), Some(3)).unwrap(),
            HistoryQuery::Aggregated(Aggregation::Month)
        );
        assert_eq!(
            history_query(None, Some("2024-01-01"), Some("2024-01-31"), None, None).unwrap(),
            HistoryQuery::Range {
                start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                end: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            }
        );
        assert!(history_query(None, None, None, Some("daily"), None).is_err());
        assert!(history_query(None, Some("01/01/2024"), None, None, None).is_err());
    }
}
