use std::env;
use std::net::SocketAddr;
use std::num::{NonZeroU32, NonZeroUsize};
use std::str::FromStr;
use std::time::Duration;

use nonzero_ext::nonzero;
use thiserror::Error;

const DEFAULT_CLOUD_API_URL: &str = "https://management.azure.com";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 300;
const DEFAULT_METRICS_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("{name} has invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

pub struct Config {
    /// Cloud control-plane base url.
    pub cloud_api_url: String,
    pub cloud_api_token: Option<String>,
    /// Inventory store base url. Only optional for dry runs.
    pub inventory_api_url: Option<String>,
    pub inventory_api_token: Option<String>,
    /// Fixed scope ids; `None` lists subscriptions from the cloud API.
    pub scopes: Option<Vec<String>>,
    pub poll_interval: Duration,
    pub metrics_addr: SocketAddr,
    pub cloud_requests_per_second: NonZeroU32,
    pub http_timeout: Duration,
    pub inventory_max_records_per_request: Option<NonZeroUsize>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the config from any variable source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let scopes = var("COLLECTOR_SCOPES").map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        });
        if matches!(&scopes, Some(ids) if ids.is_empty()) {
            return Err(ConfigError::Invalid {
                name: "COLLECTOR_SCOPES",
                value: var("COLLECTOR_SCOPES").unwrap_or_default(),
                reason: "no scope ids listed".to_string(),
            });
        }

        Ok(Self {
            cloud_api_url: var("CLOUD_API_URL")
                .unwrap_or_else(|| DEFAULT_CLOUD_API_URL.to_string()),
            cloud_api_token: var("CLOUD_API_TOKEN"),
            inventory_api_url: var("INVENTORY_API_URL"),
            inventory_api_token: var("INVENTORY_API_TOKEN"),
            scopes,
            poll_interval: Duration::from_secs(parse_or(
                "POLL_INTERVAL_SECS",
                var("POLL_INTERVAL_SECS"),
                DEFAULT_POLL_INTERVAL_SECS,
            )?),
            metrics_addr: match var("METRICS_ADDR") {
                Some(raw) => parse("METRICS_ADDR", &raw)?,
                None => parse("METRICS_ADDR", DEFAULT_METRICS_ADDR)?,
            },
            cloud_requests_per_second: match var("CLOUD_REQUESTS_PER_SECOND") {
                Some(raw) => parse("CLOUD_REQUESTS_PER_SECOND", &raw)?,
                None => nonzero!(20u32),
            },
            http_timeout: Duration::from_secs(parse_or(
                "HTTP_TIMEOUT_SECS",
                var("HTTP_TIMEOUT_SECS"),
                DEFAULT_HTTP_TIMEOUT_SECS,
            )?),
            inventory_max_records_per_request: var("INVENTORY_MAX_RECORDS_PER_REQUEST")
                .map(|raw| parse("INVENTORY_MAX_RECORDS_PER_REQUEST", &raw))
                .transpose()?,
        })
    }

    pub fn require_inventory_api_url(&self) -> Result<&str, ConfigError> {
        self.inventory_api_url
            .as_deref()
            .ok_or(ConfigError::Missing("INVENTORY_API_URL"))
    }
}

fn parse<T>(name: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|err: T::Err| ConfigError::Invalid {
        name,
        value: raw.to_string(),
        reason: err.to_string(),
    })
}

fn parse_or(name: &'static str, raw: Option<String>, default: u64) -> Result<u64, ConfigError> {
    match raw {
        Some(raw) => parse(name, &raw),
        None => Ok(default),
    }
}
