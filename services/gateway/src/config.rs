//! Gateway configuration, read from the environment.

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::correlator::CorrelatorConfig;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

/// Configuration for the gateway service.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// HTTP listen address (`GATEWAY_ADDR`).
    pub listen_addr: SocketAddr,
    /// NATS URL (`BUS_URL`).
    pub bus_url: String,
    /// Per-order confirmation deadline (`ORDER_TIMEOUT_MS`).
    pub order_timeout: Duration,
    /// Reaper sweep interval (`REAPER_INTERVAL_MS`).
    pub reaper_interval: Duration,
    /// Comma-separated tradable products (`PRODUCT_IDS`).
    pub product_ids: String,
    /// HMAC secret for session tokens (`JWT_SECRET`).
    pub jwt_secret: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            bus_url: "nats://localhost:4222".to_string(),
            order_timeout: Duration::from_millis(5000),
            reaper_interval: Duration::from_millis(1000),
            product_ids: "BTC-USD,ETH-USD".to_string(),
            jwt_secret: "secret".to_string(),
        }
    }
}

impl GatewayConfig {
    /// Read overrides from the environment on top of the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            listen_addr: parse_var("GATEWAY_ADDR", defaults.listen_addr)?,
            bus_url: env::var("BUS_URL").unwrap_or(defaults.bus_url),
            order_timeout: Duration::from_millis(parse_var(
                "ORDER_TIMEOUT_MS",
                defaults.order_timeout.as_millis() as u64,
            )?),
            reaper_interval: Duration::from_millis(parse_var(
                "REAPER_INTERVAL_MS",
                defaults.reaper_interval.as_millis() as u64,
            )?),
            product_ids: env::var("PRODUCT_IDS").unwrap_or(defaults.product_ids),
            jwt_secret: env::var("JWT_SECRET").unwrap_or(defaults.jwt_secret),
        })
    }

    pub fn correlator_config(&self) -> CorrelatorConfig {
        CorrelatorConfig {
            default_timeout: self.order_timeout,
            reaper_interval: self.reaper_interval,
            ..CorrelatorConfig::default()
        }
    }
}

fn parse_var<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        Err(_) => Ok(default),
    }
}
