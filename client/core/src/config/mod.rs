//! The validated configuration surface.
//!
//! This module intentionally does *not* parse the host collector's raw
//! key-value configuration format (spec: "the raw configuration parsing
//! surface... is out of scope"). It owns the other half of that contract:
//! a typed [`Config`] plus the validation the host's parser is assumed to
//! have produced a candidate for, mirroring the split the teacher crate
//! draws between `node::config::read_config` (file → candidate struct) and
//! the validation each sub-service performs on its own options.

mod duration;
mod queue;
mod routing;
mod sink;

pub use queue::DurableQueueConfig;
pub use routing::{ConfigRegex, DynamicRoutingConfig, LineFormat, MetadataConfig, StatePolicyConfig};
pub use sink::{SinkConfig, SinkKind, TlsConfig};

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::state::StatePolicy;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("TLSCertFile and TLSKeyFile must both be set, or neither")]
    IncompleteTlsCertPair,
    #[error("TLSMinVersion ({min}) must be <= TLSMaxVersion ({max})")]
    TlsVersionOrder { min: String, max: String },
    #[error("{field} must be greater than zero")]
    MustBePositive { field: &'static str },
    #[error("{field} is not a valid regular expression: {source}")]
    InvalidRegex {
        field: &'static str,
        #[source]
        source: regex::Error,
    },
}

/// Strips a single layer of matching leading/trailing quotes (single or
/// double) from a config string.
///
/// The host passes some values pre-quoted (spec §9: "Several label and
/// header values in config arrive quoted"); every string-valued knob that
/// could plausibly be user-supplied is passed through this before use, not
/// just the two the design note calls out by name.
pub fn strip_quotes(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        let last = bytes[bytes.len() - 1];
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return &value[1..value.len() - 1];
        }
    }
    value
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct BatchProcessorConfig {
    pub max_queue_size: usize,
    pub max_batch_size: usize,
    #[serde(deserialize_with = "duration::deserialize")]
    pub export_timeout: Duration,
    #[serde(deserialize_with = "duration::deserialize")]
    pub export_interval: Duration,
    pub export_buffer_size: usize,
    pub retry: RetryConfig,
    pub throttle: ThrottleConfig,
    pub compression: Compression,
    pub num_batch_ids: u64,
}

impl Default for BatchProcessorConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 10_000,
            max_batch_size: 1_000,
            export_timeout: Duration::from_secs(10),
            export_interval: Duration::from_secs(1),
            export_buffer_size: 8,
            retry: RetryConfig::default(),
            throttle: ThrottleConfig::default(),
            compression: Compression::None,
            num_batch_ids: 10,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    None,
    Gzip,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub enabled: bool,
    #[serde(deserialize_with = "duration::deserialize")]
    pub initial_interval: Duration,
    #[serde(deserialize_with = "duration::deserialize")]
    pub max_interval: Duration,
    #[serde(deserialize_with = "duration::deserialize")]
    pub max_elapsed_time: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(30),
            max_elapsed_time: Duration::from_secs(300),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    pub enabled: bool,
    pub requests_per_sec: u32,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            requests_per_sec: 0,
        }
    }
}

/// Root configuration for one `OutputClient` (shoot or seed side).
#[derive(Clone, Debug, Deserialize)]
pub struct ClientConfig {
    pub sink: SinkConfig,
    #[serde(default)]
    pub batch_processor: BatchProcessorConfig,
    pub queue: DurableQueueConfig,
}

/// Top-level plugin configuration: everything enumerated in spec §6.
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub shoot: ClientConfig,
    pub seed: ClientConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub dynamic_routing: DynamicRoutingConfig,
    #[serde(default)]
    pub shoot_state_policy: StatePolicyConfig,
    #[serde(default)]
    pub seed_state_policy: StatePolicyConfig,
    #[serde(
        default = "default_sync_timeout",
        deserialize_with = "duration::deserialize"
    )]
    pub controller_sync_timeout: Duration,
    #[serde(
        default = "default_grace_window",
        deserialize_with = "duration::deserialize"
    )]
    pub deleted_client_time_expiration: Duration,
    #[serde(
        default = "default_sweep_period",
        deserialize_with = "duration::deserialize"
    )]
    pub clean_expired_clients_period: Duration,
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

fn default_sync_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_grace_window() -> Duration {
    Duration::from_secs(3600)
}

fn default_sweep_period() -> Duration {
    Duration::from_secs(24 * 3600)
}

fn default_metrics_port() -> u16 {
    2021
}

impl Config {
    /// Validates cross-field invariants that cannot be expressed as a
    /// single-field `serde` constraint. `Deserialize` itself only gets each
    /// struct into a plausible shape; this is the typed equivalent of the
    /// host's "produce a validated Config" contract (spec §6).
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shoot.sink.tls.validate()?;
        self.seed.sink.tls.validate()?;

        if self.shoot.batch_processor.num_batch_ids == 0 {
            return Err(ConfigError::MustBePositive {
                field: "num_batch_ids",
            });
        }
        if self.seed.batch_processor.num_batch_ids == 0 {
            return Err(ConfigError::MustBePositive {
                field: "num_batch_ids",
            });
        }
        if self.shoot.queue.segment_size == 0 || self.seed.queue.segment_size == 0 {
            return Err(ConfigError::MustBePositive {
                field: "DQueSegmentSize",
            });
        }

        self.dynamic_routing.validate()?;
        self.metadata.validate()?;

        Ok(())
    }
}

pub fn default_state_policy_shoot() -> StatePolicy {
    StatePolicy::shoot_default()
}

pub fn default_state_policy_seed() -> StatePolicy {
    StatePolicy::seed_default()
}
