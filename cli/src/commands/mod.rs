mod custom_food;
mod exercise;
mod food;
mod helpers;
mod profile;
mod summary;
mod usda;
mod weight;

pub(crate) use custom_food::{
    cmd_custom_food_add, cmd_custom_food_delete, cmd_custom_food_list, cmd_custom_food_seed,
};
pub(crate) use exercise::{cmd_exercise_delete, cmd_exercise_list, cmd_exercise_log};
pub(crate) use food::{NutrientArgs, cmd_entry_delete, cmd_food_add, cmd_food_list, cmd_log};
pub(crate) use helpers::{json_error, resolve_user};
pub(crate) use profile::{
    cmd_goals, cmd_profile_custom, cmd_profile_set, cmd_profile_show, cmd_register,
};
pub(crate) use summary::{cmd_summary, cmd_weekly};
pub(crate) use usda::{cmd_usda_import, cmd_usda_search};
pub(crate) use weight::{cmd_weight_delete, cmd_weight_history, cmd_weight_latest, cmd_weight_log};
