//! Runtime settings, resolved once and passed to constructors.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::coordinate::Coordinate;
use crate::error::ConfigError;
use crate::matrix::DEFAULT_BATCH_DELAY;
use crate::oracle::OracleConfig;
use crate::redis_store::RedisConfig;

pub const DEFAULT_DEPOT_LAT: f64 = -6.200000;
pub const DEFAULT_DEPOT_LNG: f64 = 106.816666;
pub const DEFAULT_TSP_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_CVRP_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct Settings {
    /// Start and end of every route unless a request overrides it.
    pub depot: Coordinate,
    pub tsp_timeout: Duration,
    pub cvrp_timeout: Duration,
    pub oracle: OracleConfig,
    /// Shared cache server.
    pub redis: RedisConfig,
    /// Pause between consecutive oracle batches.
    pub batch_delay: Duration,
    pub enable_profiling: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            depot: Coordinate::new_unchecked(DEFAULT_DEPOT_LAT, DEFAULT_DEPOT_LNG),
            tsp_timeout: DEFAULT_TSP_TIMEOUT,
            cvrp_timeout: DEFAULT_CVRP_TIMEOUT,
            oracle: OracleConfig::default(),
            redis: RedisConfig::default(),
            batch_delay: DEFAULT_BATCH_DELAY,
            enable_profiling: false,
        }
    }
}

impl Settings {
    /// Read settings from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read settings through `lookup`; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let depot_lat = parse_or(&get, "DEPOT_LAT", defaults.depot.lat())?;
        let depot_lng = parse_or(&get, "DEPOT_LNG", defaults.depot.lng())?;
        let depot = Coordinate::new(depot_lat, depot_lng)?;

        let tsp_timeout = Duration::from_secs(parse_or(
            &get,
            "TSP_TIMEOUT_SECONDS",
            defaults.tsp_timeout.as_secs(),
        )?);
        let cvrp_timeout = Duration::from_secs(parse_or(
            &get,
            "CVRP_TIMEOUT_SECONDS",
            defaults.cvrp_timeout.as_secs(),
        )?);

        let oracle = OracleConfig {
            base_url: get("ROUTES_API_URL").unwrap_or(defaults.oracle.base_url),
            api_key: get("GOOGLE_MAPS_API_KEY").unwrap_or_default(),
            timeout_secs: parse_or(&get, "ROUTES_API_TIMEOUT", defaults.oracle.timeout_secs)?,
        };

        let redis = RedisConfig {
            host: get("REDIS_HOST").unwrap_or(defaults.redis.host),
            port: parse_or(&get, "REDIS_PORT", defaults.redis.port)?,
            db: parse_or(&get, "REDIS_DB", defaults.redis.db)?,
            username: get("REDIS_USERNAME"),
            password: get("REDIS_PASSWORD"),
            timeout: Duration::from_secs(parse_or(
                &get,
                "REDIS_TIMEOUT_SECONDS",
                defaults.redis.timeout.as_secs(),
            )?),
        };

        let batch_delay = Duration::from_millis(parse_or(
            &get,
            "ROUTES_BATCH_DELAY_MS",
            defaults.batch_delay.as_millis() as u64,
        )?);

        let enable_profiling = match get("ENABLE_PROFILING") {
            Some(value) => parse_flag("ENABLE_PROFILING", &value)?,
            None => defaults.enable_profiling,
        };

        Ok(Self {
            depot,
            tsp_timeout,
            cvrp_timeout,
            oracle,
            redis,
            batch_delay,
            enable_profiling,
        })
    }
}

fn parse_or<T>(
    get: impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(value) => value.trim().parse().map_err(|err: T::Err| ConfigError::Invalid {
            key,
            value: value.clone(),
            reason: err.to_string(),
        }),
        None => Ok(default),
    }
}

fn parse_flag(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: "expected a boolean".to_string(),
        }),
    }
}
