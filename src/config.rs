//! Lease service configuration.
//!
//! Loaded from environment variables with sensible defaults and
//! validation. The lease period is the base unit every other timing
//! value derives from: the guard interval is a quarter of it and the
//! per-operation coordination deadline is half of it, so a single hung
//! call can never outlive the lease it is trying to extend.

use std::time::Duration;

use snafu::{Snafu, ensure};

/// Default lease duration in milliseconds.
pub const DEFAULT_LEASE_PERIOD_MS: u64 = 10_000;
/// Default coordination path of the lease record.
pub const DEFAULT_LEASE_PATH: &str = "/omid/tso-lease";
/// Default coordination path of the current-TSO record.
pub const DEFAULT_CURRENT_TSO_PATH: &str = "/omid/current-tso";
/// Default network interface used to derive advertised coordinates.
pub const DEFAULT_NETWORK_INTERFACE: &str = "eth0";
/// Default advertised TCP port.
pub const DEFAULT_PORT: u16 = 54758;

/// Configuration of the lease-based master election core.
#[derive(Debug, Clone)]
pub struct LeaseConfig {
    /// Lease duration and base scheduling unit, in milliseconds. Positive.
    pub lease_period_ms: u64,
    /// Coordination path of the lease record.
    pub lease_path: String,
    /// Coordination path of the current-TSO record.
    pub current_tso_path: String,
    /// Interface whose address forms the advertised `host:port`.
    pub network_interface: String,
    /// TCP port advertised in `host:port`.
    pub port: u16,
}

impl LeaseConfig {
    /// Load configuration from environment variables.
    ///
    /// Recognised variables: `TSO_LEASE_PERIOD_MS`, `TSO_LEASE_PATH`,
    /// `TSO_CURRENT_TSO_PATH`, `TSO_NETWORK_IFACE`, `TSO_PORT`. All are
    /// optional and fall back to the defaults above.
    pub fn load() -> Result<Self, ConfigError> {
        let lease_period_ms = match std::env::var("TSO_LEASE_PERIOD_MS") {
            Ok(raw) => raw.parse::<u64>().map_err(|e| ConfigError::InvalidValue {
                key: "TSO_LEASE_PERIOD_MS",
                value: raw.clone(),
                reason: format!("must be a positive integer of milliseconds: {e}"),
            })?,
            Err(_) => DEFAULT_LEASE_PERIOD_MS,
        };
        ensure!(
            lease_period_ms > 0,
            InvalidValueSnafu {
                key: "TSO_LEASE_PERIOD_MS",
                value: lease_period_ms.to_string(),
                reason: "lease period must be positive",
            }
        );

        let port = match std::env::var("TSO_PORT") {
            Ok(raw) => raw.parse::<u16>().map_err(|e| ConfigError::InvalidValue {
                key: "TSO_PORT",
                value: raw.clone(),
                reason: format!("must be a valid port number (0-65535): {e}"),
            })?,
            Err(_) => DEFAULT_PORT,
        };

        Ok(Self {
            lease_period_ms,
            lease_path: std::env::var("TSO_LEASE_PATH").unwrap_or_else(|_| DEFAULT_LEASE_PATH.to_string()),
            current_tso_path: std::env::var("TSO_CURRENT_TSO_PATH")
                .unwrap_or_else(|_| DEFAULT_CURRENT_TSO_PATH.to_string()),
            network_interface: std::env::var("TSO_NETWORK_IFACE")
                .unwrap_or_else(|_| DEFAULT_NETWORK_INTERFACE.to_string()),
            port,
        })
    }

    /// Get default configuration (useful for testing).
    pub fn default() -> Self {
        Self {
            lease_period_ms: DEFAULT_LEASE_PERIOD_MS,
            lease_path: DEFAULT_LEASE_PATH.to_string(),
            current_tso_path: DEFAULT_CURRENT_TSO_PATH.to_string(),
            network_interface: DEFAULT_NETWORK_INTERFACE.to_string(),
            port: DEFAULT_PORT,
        }
    }

    /// Lease duration.
    pub fn lease_period(&self) -> Duration {
        Duration::from_millis(self.lease_period_ms)
    }

    /// Safety margin subtracted from renewal deadlines.
    pub fn guard_ms(&self) -> u64 {
        self.lease_period_ms / 4
    }

    /// Deadline applied to every coordination-service call. Strictly
    /// shorter than the lease period so a hung call cannot prevent
    /// demotion.
    pub fn store_deadline(&self) -> Duration {
        Duration::from_millis(self.lease_period_ms / 2)
    }
}

/// Configuration error types.
#[derive(Debug, Snafu)]
pub enum ConfigError {
    /// A configuration value failed validation.
    #[snafu(display("invalid configuration for {key}: {value:?} ({reason})"))]
    InvalidValue {
        /// The environment variable at fault.
        key: &'static str,
        /// The rejected raw value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = LeaseConfig::default();
        assert_eq!(config.lease_period_ms, 10_000);
        assert_eq!(config.lease_path, "/omid/tso-lease");
        assert_eq!(config.current_tso_path, "/omid/current-tso");
        assert_eq!(config.network_interface, "eth0");
        assert_eq!(config.port, 54758);
    }

    #[test]
    fn derived_timings() {
        let config = LeaseConfig {
            lease_period_ms: 10_000,
            ..LeaseConfig::default()
        };
        assert_eq!(config.lease_period(), Duration::from_secs(10));
        assert_eq!(config.guard_ms(), 2_500);
        assert_eq!(config.store_deadline(), Duration::from_secs(5));
    }
}
