//! Driver configuration
//!
//! All tunables live in one context value passed into the driver at launch.
//! There are no hidden globals; components receive what they need from the
//! context explicitly.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::agent::IdleStrategy;
use crate::cnc::CncLengths;
use crate::concurrent::{broadcast, command_ring};
use crate::counters::{COUNTER_LENGTH, METADATA_LENGTH};
use crate::error::{DriverError, Result};

/// Environment variable overriding the driver directory
pub const AERON_DIR_ENV: &str = "AERON_DIR";

/// Name resolver configuration; present only on drivers that participate in
/// the gossip protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Name advertised to peers; defaults to the host name
    pub name: Option<String>,
    /// Local UDP socket address for resolution frames, e.g. "0.0.0.0:8050"
    pub bind_address: String,
    /// Optional single bootstrap neighbor as "host:port", resolved once via
    /// the system resolver
    pub bootstrap_neighbor: Option<String>,
    /// Interval between self-advertisements
    pub self_resolution_interval_ms: i64,
    /// Interval between neighbor-gossip rounds
    pub neighbor_resolution_interval_ms: i64,
    /// Age after which cache entries and neighbors are dropped
    pub entry_timeout_ms: i64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            name: None,
            bind_address: "0.0.0.0:8050".to_string(),
            bootstrap_neighbor: None,
            self_resolution_interval_ms: 1000,
            neighbor_resolution_interval_ms: 2000,
            entry_timeout_ms: 120_000,
        }
    }
}

/// Configuration for a media driver instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverContext {
    /// Directory holding the CnC file and log buffers
    pub aeron_dir: PathBuf,
    /// Data capacity of the to-driver command ring (power of two)
    pub to_driver_buffer_length: usize,
    /// Data capacity of the to-clients broadcast buffer (power of two)
    pub to_clients_buffer_length: usize,
    /// Length of the counters values region; the metadata region is derived
    pub counters_values_buffer_length: usize,
    /// Length of the error log region
    pub error_log_buffer_length: usize,
    /// Length of each publication log buffer file
    pub publication_log_buffer_length: usize,
    /// A client with no keepalive for this long is timed out
    pub client_liveness_timeout_ns: i64,
    /// Grace window before an unreferenced publication is unlinked
    pub publication_linger_timeout_ns: i64,
    /// Window before a reclaimed counter slot may be reused
    pub counter_free_to_reuse_timeout_ms: i64,
    /// Commands drained from the ring per duty cycle
    pub command_drain_limit: usize,
    /// Conductor idle strategy
    pub conductor_idle_strategy: IdleStrategy,
    /// Gossip resolver, if this driver runs one
    pub resolver: Option<ResolverConfig>,
}

impl Default for DriverContext {
    fn default() -> Self {
        Self {
            aeron_dir: default_aeron_dir(),
            to_driver_buffer_length: 1024 * 1024,
            to_clients_buffer_length: 1024 * 1024,
            counters_values_buffer_length: 64 * 1024,
            error_log_buffer_length: 64 * 1024,
            publication_log_buffer_length: 1024 * 1024,
            client_liveness_timeout_ns: 10_000_000_000,
            publication_linger_timeout_ns: 5_000_000_000,
            counter_free_to_reuse_timeout_ms: 1000,
            command_drain_limit: 10,
            conductor_idle_strategy: IdleStrategy::default(),
            resolver: None,
        }
    }
}

impl DriverContext {
    /// Validate the configuration before launch
    pub fn validate(&self) -> Result<()> {
        for (name, length) in [
            ("to_driver_buffer_length", self.to_driver_buffer_length),
            ("to_clients_buffer_length", self.to_clients_buffer_length),
        ] {
            if length == 0 || !length.is_power_of_two() {
                return Err(DriverError::invalid_parameter(
                    name,
                    "ring capacity must be a power of 2 and greater than 0",
                ));
            }
        }

        if self.counters_values_buffer_length < COUNTER_LENGTH {
            return Err(DriverError::invalid_parameter(
                "counters_values_buffer_length",
                "must hold at least one counter slot",
            ));
        }
        if self.client_liveness_timeout_ns <= 0 || self.publication_linger_timeout_ns <= 0 {
            return Err(DriverError::invalid_parameter(
                "timeouts",
                "liveness and linger timeouts must be positive",
            ));
        }
        if self.command_drain_limit == 0 {
            return Err(DriverError::invalid_parameter(
                "command_drain_limit",
                "must drain at least one command per cycle",
            ));
        }

        Ok(())
    }

    /// Derived length of the counters metadata region
    pub fn counters_metadata_buffer_length(&self) -> usize {
        (self.counters_values_buffer_length / COUNTER_LENGTH) * METADATA_LENGTH
    }

    /// Section lengths for the CnC file, trailers included
    pub fn cnc_lengths(&self) -> CncLengths {
        CncLengths {
            to_driver: self.to_driver_buffer_length + command_ring::TRAILER_LENGTH,
            to_clients: self.to_clients_buffer_length + broadcast::TRAILER_LENGTH,
            counters_metadata: self.counters_metadata_buffer_length(),
            counters_values: self.counters_values_buffer_length,
            error_log: self.error_log_buffer_length,
        }
    }
}

/// Default driver directory, overridable via `AERON_DIR`
pub fn default_aeron_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(AERON_DIR_ENV) {
        return PathBuf::from(dir);
    }

    let user = std::env::var("USER").unwrap_or_else(|_| "default".to_string());
    if cfg!(target_os = "linux") {
        PathBuf::from(format!("/dev/shm/aeron-{}", user))
    } else {
        std::env::temp_dir().join(format!("aeron-{}", user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_context_validates() {
        DriverContext::default().validate().unwrap();
    }

    #[test]
    fn test_rejects_non_power_of_two_ring() {
        let context = DriverContext {
            to_driver_buffer_length: 1000,
            ..Default::default()
        };
        assert!(context.validate().is_err());
    }

    #[test]
    fn test_metadata_length_tracks_values_length() {
        let context = DriverContext {
            counters_values_buffer_length: 32 * COUNTER_LENGTH,
            ..Default::default()
        };
        assert_eq!(
            context.counters_metadata_buffer_length(),
            32 * METADATA_LENGTH
        );
    }
}
