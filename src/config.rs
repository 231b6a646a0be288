//! Application settings.
//!
//! Values come from the same figment Rocket reads (`Rocket.toml`, then
//! `ROCKET_*` environment variables), after `.env` has been loaded.

use dotenv::dotenv;
use rocket::figment::Figment;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::db::Result;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Falls back to `DATABASE_URL` when unset.
    #[serde(default)]
    pub database_url: Option<String>,
    /// Seconds a rendered home page stays cached.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl: u64,
    #[serde(default = "default_media_root")]
    pub media_root: PathBuf,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    /// Seconds a request waits for a pooled connection.
    #[serde(default = "default_pool_timeout")]
    pub pool_timeout: u64,
}

fn default_cache_ttl() -> u64 {
    20
}

fn default_media_root() -> PathBuf {
    PathBuf::from("media")
}

fn default_pool_size() -> u32 {
    10
}

fn default_pool_timeout() -> u64 {
    5
}

impl Config {
    pub fn from_figment(figment: &Figment) -> Result<Config> {
        Ok(figment.extract::<Config>()?)
    }

    pub fn database_url(&self) -> Result<String> {
        match self.database_url {
            Some(ref url) => Ok(url.clone()),
            None => Ok(env::var("DATABASE_URL")?),
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl)
    }

    pub fn pool_timeout(&self) -> Duration {
        Duration::from_secs(self.pool_timeout)
    }
}

pub fn figment() -> Figment {
    dotenv().ok();
    rocket::Config::figment()
}
