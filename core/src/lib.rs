pub mod clock;
pub mod db;
pub mod error;
pub mod goals;
pub mod models;
pub mod summary;
pub mod usda;
pub mod weight_trend;
