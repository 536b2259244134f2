//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use marquee_net::SimulatorConfig;
use marquee_shared::constants::{
    DEFAULT_DELIVERY_DELAY_MS, DEFAULT_HTTP_PORT, DEFAULT_INBOUND_INTERVAL_SECS,
    DEFAULT_INBOUND_PROBABILITY, DEFAULT_LOCAL_USER,
};
use marquee_shared::UserId;

/// Server configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// User the chat service connects as.
    /// Env: `LOCAL_USER_ID`
    /// Default: `current`
    pub local_user: UserId,

    /// Delay before a sent message is acknowledged.
    /// Env: `DELIVERY_DELAY_MS`
    pub delivery_delay: Duration,

    /// Period of simulated remote activity.
    /// Env: `INBOUND_INTERVAL_SECS`
    pub inbound_interval: Duration,

    /// Chance per tick that a peer writes something, in `[0, 1]`.
    /// Env: `INBOUND_PROBABILITY`
    pub inbound_probability: f64,

    /// Load the demo conversations on startup.
    /// Env: `SEED_SAMPLE_DATA` (true/false)
    /// Default: `true`
    pub seed_sample_data: bool,

    /// Fixed RNG seed for reproducible simulation.
    /// Env: `RANDOM_SEED`
    /// Default: unset (OS-seeded thread RNG).
    pub random_seed: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            local_user: UserId::from(DEFAULT_LOCAL_USER),
            delivery_delay: Duration::from_millis(DEFAULT_DELIVERY_DELAY_MS),
            inbound_interval: Duration::from_secs(DEFAULT_INBOUND_INTERVAL_SECS),
            inbound_probability: DEFAULT_INBOUND_PROBABILITY,
            seed_sample_data: true,
            random_seed: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = lookup("HTTP_ADDR") {
            if let Some(parsed) = parse_or_warn::<SocketAddr>("HTTP_ADDR", &addr) {
                config.http_addr = parsed;
            }
        }

        if let Some(user) = lookup("LOCAL_USER_ID") {
            if user.trim().is_empty() {
                tracing::warn!("Empty LOCAL_USER_ID, using default");
            } else {
                config.local_user = UserId::from(user.trim());
            }
        }

        if let Some(val) = lookup("DELIVERY_DELAY_MS") {
            if let Some(ms) = parse_or_warn::<u64>("DELIVERY_DELAY_MS", &val) {
                config.delivery_delay = Duration::from_millis(ms);
            }
        }

        if let Some(val) = lookup("INBOUND_INTERVAL_SECS") {
            match parse_or_warn::<u64>("INBOUND_INTERVAL_SECS", &val) {
                // A zero period would make the interval timer panic.
                Some(0) => tracing::warn!(value = %val, "INBOUND_INTERVAL_SECS must be positive, using default"),
                Some(secs) => config.inbound_interval = Duration::from_secs(secs),
                None => {}
            }
        }

        if let Some(val) = lookup("INBOUND_PROBABILITY") {
            match parse_or_warn::<f64>("INBOUND_PROBABILITY", &val) {
                Some(p) if (0.0..=1.0).contains(&p) => config.inbound_probability = p,
                Some(_) => tracing::warn!(value = %val, "INBOUND_PROBABILITY out of range, using default"),
                None => {}
            }
        }

        if let Some(val) = lookup("SEED_SAMPLE_DATA") {
            config.seed_sample_data = val != "false" && val != "0";
        }

        if let Some(val) = lookup("RANDOM_SEED") {
            config.random_seed = parse_or_warn::<u64>("RANDOM_SEED", &val);
        }

        config
    }

    pub fn simulator(&self) -> SimulatorConfig {
        SimulatorConfig {
            delivery_delay: self.delivery_delay,
            inbound_interval: self.inbound_interval,
            inbound_probability: self.inbound_probability,
            ..SimulatorConfig::default()
        }
    }
}

fn parse_or_warn<T: FromStr>(key: &str, value: &str) -> Option<T> {
    match value.trim().parse::<T>() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!(key, value, "Invalid value, using default");
            None
        }
    }
}
