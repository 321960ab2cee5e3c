//! Market data configuration, read from the environment.

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::client::{ClientConfig, OverflowPolicy};

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct MarketDataConfig {
    /// HTTP/websocket listen address (`MARKET_DATA_ADDR`).
    pub listen_addr: SocketAddr,
    /// NATS URL (`BUS_URL`).
    pub bus_url: String,
    /// Comma-separated tradable products (`PRODUCT_IDS`).
    pub product_ids: String,
    /// Outbound queue size per client (`CLIENT_QUEUE_CAPACITY`).
    pub client_queue_capacity: usize,
    /// `drop` or `disconnect` (`OVERFLOW_POLICY`).
    pub overflow_policy: OverflowPolicy,
    /// Heartbeat feed period (`HEARTBEAT_INTERVAL_MS`).
    pub heartbeat_interval: Duration,
    /// HMAC secret for session tokens (`JWT_SECRET`).
    pub jwt_secret: String,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8081)),
            bus_url: "nats://localhost:4222".to_string(),
            product_ids: "BTC-USD,ETH-USD".to_string(),
            client_queue_capacity: 1000,
            overflow_policy: OverflowPolicy::Disconnect,
            heartbeat_interval: Duration::from_millis(1000),
            jwt_secret: "secret".to_string(),
        }
    }
}

impl MarketDataConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            listen_addr: parse_var("MARKET_DATA_ADDR", defaults.listen_addr)?,
            bus_url: env::var("BUS_URL").unwrap_or(defaults.bus_url),
            product_ids: env::var("PRODUCT_IDS").unwrap_or(defaults.product_ids),
            client_queue_capacity: parse_var(
                "CLIENT_QUEUE_CAPACITY",
                defaults.client_queue_capacity,
            )?,
            overflow_policy: parse_var("OVERFLOW_POLICY", defaults.overflow_policy)?,
            heartbeat_interval: Duration::from_millis(parse_var(
                "HEARTBEAT_INTERVAL_MS",
                defaults.heartbeat_interval.as_millis() as u64,
            )?),
            jwt_secret: env::var("JWT_SECRET").unwrap_or(defaults.jwt_secret),
        })
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            queue_capacity: self.client_queue_capacity,
            overflow_policy: self.overflow_policy,
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MarketDataConfig::default();
        assert_eq!(config.listen_addr.port(), 8081);

        let client = config.client_config();
        assert_eq!(client.queue_capacity, 1000);
        assert_eq!(client.overflow_policy, OverflowPolicy::Disconnect);
    }

    #[test]
    fn test_overflow_policy_from_env() {
        env::set_var("MARKET_DATA_TEST_POLICY", "drop");
        assert_eq!(
            parse_var("MARKET_DATA_TEST_POLICY", OverflowPolicy::Disconnect).unwrap(),
            OverflowPolicy::DropMessage
        );

        env::set_var("MARKET_DATA_TEST_POLICY", "block");
        assert!(parse_var("MARKET_DATA_TEST_POLICY", OverflowPolicy::Disconnect).is_err());
        env::remove_var("MARKET_DATA_TEST_POLICY");
    }
}
