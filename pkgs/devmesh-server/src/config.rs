use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use tracing::{info, warn};

pub struct Config {
    pub port: u16,
    /// SQLite database path; in-memory stores when unset.
    pub db_path: Option<PathBuf>,
    /// Redis URL; single-process mode (no backplane) when unset.
    pub redis_url: Option<String>,
    pub cors_origin: String,
}

impl Config {
    pub fn load() -> Self {
        Self {
            port: try_load("DEVMESH_PORT", "3000"),
            db_path: optional("DEVMESH_DB").map(PathBuf::from),
            redis_url: optional("DEVMESH_REDIS"),
            cors_origin: try_load("DEVMESH_CORS_ORIGIN", "http://localhost:5173"),
        }
    }
}

fn optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => {
            info!("{key} not set");
            None
        }
    }
}

fn try_load<T: FromStr>(key: &str, default: &str) -> T
where
    T::Err: Display,
{
    env::var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| {
            warn!("Invalid {key} value: {e}");
        })
        .expect("Environment misconfigured!")
}
