use anyhow::{Context, Result};
use chrono_tz::Tz;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

use vitals_core::clock::{DEFAULT_TIME_ZONE, parse_time_zone};

pub const DEFAULT_SESSION_DAYS: i64 = 7;

pub struct Config {
    pub db_path: PathBuf,
    pub time_zone: Tz,
    pub usda_api_key: Option<String>,
    pub session_days: i64,
    pub bcrypt_cost: u32,
}

impl Config {
    pub fn load() -> Result<Self> {
        let proj_dirs =
            ProjectDirs::from("", "", "vitals").context("Could not determine home directory")?;

        let data_dir = proj_dirs.data_dir().to_path_buf();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        Self::from_lookup(&data_dir, |name| std::env::var(name).ok())
    }

    /// Build a config rooted at `data_dir`, reading overrides through `lookup`.
    pub fn from_lookup(data_dir: &Path, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let db_path = var("VITALS_DB").map_or_else(|| data_dir.join("vitals.db"), PathBuf::from);

        let time_zone = match var("VITALS_TIME_ZONE") {
            Some(name) => parse_time_zone(&name).context("Invalid VITALS_TIME_ZONE")?,
            None => DEFAULT_TIME_ZONE,
        };

        let session_days = match var("VITALS_SESSION_DAYS") {
            Some(days) => {
                let days: i64 = days
                    .parse()
                    .with_context(|| format!("Invalid VITALS_SESSION_DAYS '{days}'"))?;
                anyhow::ensure!(days > 0, "VITALS_SESSION_DAYS must be greater than 0");
                days
            }
            None => DEFAULT_SESSION_DAYS,
        };

        let bcrypt_cost = match var("VITALS_BCRYPT_COST") {
            Some(cost) => cost
                .parse()
                .with_context(|| format!("Invalid VITALS_BCRYPT_COST '{cost}'"))?,
            None => bcrypt::DEFAULT_COST,
        };

        Ok(Config {
            db_path,
            time_zone,
            usda_api_key: var("USDA_API_KEY"),
            session_days,
            bcrypt_cost,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_with(vars: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::from_lookup(Path::new("/data/vitals"), |name| map.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_with(&[]).unwrap();
        assert_eq!(config.db_path, PathBuf::from("/data/vitals/vitals.db"));
        assert_eq!(config.time_zone, DEFAULT_TIME_ZONE);
        assert_eq!(config.session_days, DEFAULT_SESSION_DAYS);
        assert_eq!(config.bcrypt_cost, bcrypt::DEFAULT_COST);
        assert!(config.usda_api_key.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = config_with(&[
            ("VITALS_DB", "/tmp/other.db"),
            ("VITALS_TIME_ZONE", "Europe/Berlin"),
            ("VITALS_SESSION_DAYS", "30"),
            ("USDA_API_KEY", " abc123 "),
        ])
        .unwrap();
        assert_eq!(config.db_path, PathBuf::from("/tmp/other.db"));
        assert_eq!(config.time_zone, chrono_tz::Europe::Berlin);
        assert_eq!(config.session_days, 30);
        assert_eq!(config.usda_api_key.as_deref(), Some("abc123"));
    }

    #[test]
    fn test_blank_api_key_is_unset() {
        let config = config_with(&[("USDA_API_KEY", "   ")]).unwrap();
        assert!(config.usda_api_key.is_none());
    }

    #[test]
    fn test_invalid_values_fail() {
        assert!(config_with(&[("VITALS_TIME_ZONE", "Nowhere/City")]).is_err());
        assert!(config_with(&[("VITALS_SESSION_DAYS", "week")]).is_err());
        assert!(config_with(&[("VITALS_SESSION_DAYS", "0")]).is_err());
        assert!(config_with(&[("VITALS_BCRYPT_COST", "high")]).is_err());
    }
}
