//! Runtime Configuration
//!
//! Environment variables are read once here and turned into explicit
//! config values; nothing deeper in the crate touches the environment.
//! Command-line flags arrive as [`Overrides`] and win over the variables.
//!
//! | Variable             | Meaning                                  |
//! |----------------------|------------------------------------------|
//! | `FANLENS_DB`         | `sqlite` (default) or `postgres`         |
//! | `FANLENS_SQLITE_PATH`| sqlite file path, default `fanlens.db`   |
//! | `DATABASE_URL`       | postgres connection string               |
//! | `FANLENS_MOCK`       | `1`/`true` to use the canned source      |
//! | `CHROME_PATH`        | explicit browser binary                  |

use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::HarvestConfig;

/// Which persistence backend to use
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    Sqlite { path: PathBuf },
    Postgres { url: String },
}

/// Everything the binary needs to run
#[derive(Debug, Clone)]
pub struct Config {
    pub store: StoreConfig,
    pub harvest: HarvestConfig,
    /// Serve canned profiles instead of driving a browser
    pub mock: bool,
}

/// Explicit settings that take precedence over the environment
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub db: Option<String>,
    pub sqlite_path: Option<String>,
    pub database_url: Option<String>,
    pub visible: bool,
    pub mock: bool,
}

fn store_config(
    backend: &str,
    sqlite_path: Option<String>,
    database_url: Option<String>,
) -> Result<StoreConfig> {
    match backend.to_lowercase().as_str() {
        "sqlite" => Ok(StoreConfig::Sqlite {
            path: PathBuf::from(sqlite_path.unwrap_or_else(|| "fanlens.db".to_string())),
        }),
        "postgres" => {
            let url = database_url.ok_or_else(|| {
                Error::Config("DATABASE_URL must be set for the postgres backend".to_string())
            })?;
            Ok(StoreConfig::Postgres { url })
        }
        other => Err(Error::Config(format!(
            "Unknown database backend: {}. Use 'sqlite' or 'postgres'",
            other
        ))),
    }
}

fn truthy(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "1" | "true" | "yes")
}

impl Config {
    /// Build configuration from the environment alone
    pub fn from_env() -> Result<Self> {
        Self::resolve(Overrides::default())
    }

    /// Build configuration from the environment plus explicit overrides
    pub fn resolve(overrides: Overrides) -> Result<Self> {
        let backend = overrides
            .db
            .or_else(|| std::env::var("FANLENS_DB").ok())
            .unwrap_or_else(|| "sqlite".to_string());
        let store = store_config(
            &backend,
            overrides
                .sqlite_path
                .or_else(|| std::env::var("FANLENS_SQLITE_PATH").ok()),
            overrides
                .database_url
                .or_else(|| std::env::var("DATABASE_URL").ok()),
        )?;

        let mut harvest = HarvestConfig::default();
        if let Ok(path) = std::env::var("CHROME_PATH") {
            harvest.chrome_path = Some(path);
        }
        if overrides.visible {
            harvest.headless = false;
        }

        let mock = overrides.mock
            || std::env::var("FANLENS_MOCK")
                .map(|v| truthy(&v))
                .unwrap_or(false);

        Ok(Self {
            store,
            harvest,
            mock,
        })
    }
}
