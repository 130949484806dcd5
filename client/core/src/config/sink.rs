use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use super::{Compression, ConfigError};

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    #[serde(rename = "OTLPGRPC")]
    OtlpGrpc,
    #[serde(rename = "OTLPHTTP")]
    OtlpHttp,
    Stdout,
    Noop,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SinkConfig {
    pub kind: SinkKind,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub insecure: bool,
    #[serde(default)]
    pub compression: Compression,
    #[serde(
        default = "default_timeout",
        deserialize_with = "super::duration::deserialize"
    )]
    pub timeout: Duration,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub tls: TlsConfig,
}

fn default_timeout() -> Duration {
    Duration::from_secs(10)
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
pub enum TlsVersion {
    #[serde(rename = "1.0")]
    V1_0,
    #[serde(rename = "1.1")]
    V1_1,
    #[serde(rename = "1.2")]
    V1_2,
    #[serde(rename = "1.3")]
    V1_3,
}

impl TlsVersion {
    fn ordinal(self) -> u8 {
        match self {
            TlsVersion::V1_0 => 0,
            TlsVersion::V1_1 => 1,
            TlsVersion::V1_2 => 2,
            TlsVersion::V1_3 => 3,
        }
    }
}

impl std::fmt::Display for TlsVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TlsVersion::V1_0 => "1.0",
            TlsVersion::V1_1 => "1.1",
            TlsVersion::V1_2 => "1.2",
            TlsVersion::V1_3 => "1.3",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    pub cert_file: Option<String>,
    pub key_file: Option<String>,
    pub ca_file: Option<String>,
    pub server_name: Option<String>,
    pub insecure_skip_verify: bool,
    pub min_version: Option<TlsVersion>,
    pub max_version: Option<TlsVersion>,
}

impl TlsConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cert_file.is_some() != self.key_file.is_some() {
            return Err(ConfigError::IncompleteTlsCertPair);
        }
        if let (Some(min), Some(max)) = (self.min_version, self.max_version) {
            if min.ordinal() > max.ordinal() {
                return Err(ConfigError::TlsVersionOrder {
                    min: min.to_string(),
                    max: max.to_string(),
                });
            }
        }
        Ok(())
    }
}
