use crate::store::writer::DEFAULT_BATCH_SIZE;
use crate::store::WriteMode;
use crate::transport::DEFAULT_TIMEOUT;
use std::env;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("store URL is not set (SUPABASE_URL or NEXT_PUBLIC_SUPABASE_URL)")]
    MissingUrl,

    #[error("no store key is set (SUPABASE_ANON_KEY, NEXT_PUBLIC_SUPABASE_ANON_KEY or SUPABASE_SERVICE_ROLE_KEY)")]
    MissingKey,

    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

/// Runtime settings, read from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub store_url: String,
    /// Sent as `apikey` on every store request.
    pub api_key: String,
    /// Sent as the bearer token; the service-role key when set, else the public key.
    pub bearer_token: String,
    pub timeout: Duration,
    pub batch_size: usize,
    pub write_mode: WriteMode,
}

/// Loads `.env.local` then `.env` into the process environment.
///
/// Variables already set are never overridden, so `.env.local` wins over `.env`.
pub fn load_dotenv() {
    dotenv::from_filename(".env.local").ok();
    dotenv::dotenv().ok();
}

impl Config {
    /// Reads the configuration from process environment variables.
    ///
    /// # Errors
    /// Returns an error if the store URL or every usable key is missing, or a
    /// tuning variable does not parse
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Reads the configuration through `lookup`; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |keys: &[&str]| {
            keys.iter()
                .filter_map(|key| lookup(*key))
                .map(|value| value.trim().to_string())
                .find(|value| !value.is_empty())
        };

        let store_url = get(&["SUPABASE_URL", "NEXT_PUBLIC_SUPABASE_URL"]).ok_or(ConfigError::MissingUrl)?;
        let public_key = get(&["SUPABASE_ANON_KEY", "NEXT_PUBLIC_SUPABASE_ANON_KEY"]);
        let service_key = get(&["SUPABASE_SERVICE_ROLE_KEY"]);

        let (api_key, bearer_token) = match (public_key, service_key) {
            (Some(public), Some(service)) => (public, service),
            (Some(public), None) => (public.clone(), public),
            (None, Some(service)) => (service.clone(), service),
            (None, None) => return Err(ConfigError::MissingKey),
        };

        let timeout = match get(&["CRUSH_SYNC_TIMEOUT_SECS"]) {
            Some(raw) => Duration::from_secs(parse_positive("CRUSH_SYNC_TIMEOUT_SECS", &raw)? as u64),
            None => DEFAULT_TIMEOUT,
        };

        let batch_size = match get(&["CRUSH_SYNC_BATCH_SIZE"]) {
            Some(raw) => parse_positive("CRUSH_SYNC_BATCH_SIZE", &raw)?,
            None => DEFAULT_BATCH_SIZE,
        };

        let write_mode = match get(&["CRUSH_SYNC_WRITE_MODE"]) {
            Some(raw) => raw.parse().map_err(|message| ConfigError::Invalid {
                key: "CRUSH_SYNC_WRITE_MODE",
                message,
            })?,
            None => WriteMode::default(),
        };

        Ok(Self {
            store_url,
            api_key,
            bearer_token,
            timeout,
            batch_size,
            write_mode,
        })
    }
}

fn parse_positive(key: &'static str, raw: &str) -> Result<usize, ConfigError> {
    match raw.parse::<usize>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(ConfigError::Invalid {
            key,
            message: format!("expected a positive integer, got '{}'", raw),
        }),
    }
}
