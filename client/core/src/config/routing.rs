use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Deserializer};

use super::ConfigError;

/// Wraps a compiled [`regex::Regex`] so it can sit on a `Deserialize`
/// config struct; `Regex` itself has no `Deserialize` impl.
#[derive(Clone, Debug)]
pub struct ConfigRegex(pub Regex);

impl<'de> Deserialize<'de> for ConfigRegex {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        Regex::new(super::strip_quotes(&raw))
            .map(ConfigRegex)
            .map_err(serde::de::Error::custom)
    }
}

impl PartialEq for ConfigRegex {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_str() == other.0.as_str()
    }
}
impl Eq for ConfigRegex {}

fn default_tag_key() -> String {
    "tag".to_string()
}

fn default_tag_expression() -> ConfigRegex {
    ConfigRegex(
        Regex::new(r"\.([^_]+)_([^_]+)_(.+)-([a-z0-9]{64})\.log$")
            .expect("default tag expression is valid"),
    )
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineFormat {
    Json,
    KeyValue,
}

/// Metadata-extraction and line-formatting knobs (spec §4.9 steps 1-3, 6).
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    pub fallback_to_tag_when_metadata_missing: bool,
    pub tag_key: String,
    pub tag_prefix: String,
    pub tag_expression: ConfigRegex,
    pub drop_log_entry_without_k8s_metadata: bool,
    /// Record-path -> label-name. Flattened dotted paths, e.g.
    /// `"kubernetes.namespace_name" -> "namespace"`.
    pub label_map: BTreeMap<String, String>,
    pub label_keys: Vec<String>,
    pub auto_promote_kubernetes_labels: bool,
    pub remove_keys: Vec<String>,
    pub drop_single_key: bool,
    pub line_format: LineFormat,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            fallback_to_tag_when_metadata_missing: false,
            tag_key: default_tag_key(),
            tag_prefix: String::new(),
            tag_expression: default_tag_expression(),
            drop_log_entry_without_k8s_metadata: false,
            label_map: BTreeMap::new(),
            label_keys: Vec::new(),
            auto_promote_kubernetes_labels: false,
            remove_keys: Vec::new(),
            drop_single_key: false,
            line_format: LineFormat::Json,
        }
    }
}

impl MetadataConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        // `ConfigRegex` already validated its pattern at deserialise time;
        // nothing else here is cross-field.
        Ok(())
    }
}

/// Dynamic per-tenant endpoint resolution (spec §4.9 step 4).
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct DynamicRoutingConfig {
    /// Dotted path into the record, e.g. `"kubernetes.namespace_name"`.
    pub dynamic_host_path: Vec<String>,
    pub dynamic_host_prefix: String,
    pub dynamic_host_suffix: String,
    pub dynamic_host_regex: Option<ConfigRegex>,
}

impl Default for DynamicRoutingConfig {
    fn default() -> Self {
        Self {
            dynamic_host_path: vec!["kubernetes".to_string(), "namespace_name".to_string()],
            dynamic_host_prefix: String::new(),
            dynamic_host_suffix: String::new(),
            dynamic_host_regex: None,
        }
    }
}

impl DynamicRoutingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        Ok(())
    }
}

/// The nine-state boolean table for one side (shoot or seed), as it arrives
/// from config (`SendLogsToMainClusterWhenIsInXState` /
/// `SendLogsToDefaultClientWhenClusterIsInXState`).
#[derive(Clone, Debug, Deserialize)]
pub struct StatePolicyConfig {
    pub creation: Option<bool>,
    pub ready: Option<bool>,
    pub hibernating: Option<bool>,
    pub hibernated: Option<bool>,
    pub waking: Option<bool>,
    pub deletion: Option<bool>,
    pub deleted: Option<bool>,
    pub restore: Option<bool>,
    pub migration: Option<bool>,
}

impl Default for StatePolicyConfig {
    fn default() -> Self {
        Self {
            creation: None,
            ready: None,
            hibernating: None,
            hibernated: None,
            waking: None,
            deletion: None,
            deleted: None,
            restore: None,
            migration: None,
        }
    }
}

impl StatePolicyConfig {
    /// Merges configured overrides onto a default table (shoot or seed).
    pub fn resolve(&self, default: crate::state::StatePolicy) -> crate::state::StatePolicy {
        crate::state::StatePolicy {
            creation: self.creation.unwrap_or(default.creation),
            ready: self.ready.unwrap_or(default.ready),
            hibernating: self.hibernating.unwrap_or(default.hibernating),
            hibernated: self.hibernated.unwrap_or(default.hibernated),
            waking: self.waking.unwrap_or(default.waking),
            deletion: self.deletion.unwrap_or(default.deletion),
            deleted: self.deleted.unwrap_or(default.deleted),
            restore: self.restore.unwrap_or(default.restore),
            migration: self.migration.unwrap_or(default.migration),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StatePolicy;

    #[test]
    fn resolve_falls_back_to_defaults_when_unset() {
        let cfg = StatePolicyConfig::default();
        let resolved = cfg.resolve(StatePolicy::shoot_default());
        assert_eq!(resolved, StatePolicy::shoot_default());
    }

    #[test]
    fn resolve_applies_explicit_overrides() {
        let mut cfg = StatePolicyConfig::default();
        cfg.hibernating = Some(true);
        let resolved = cfg.resolve(StatePolicy::shoot_default());
        assert!(resolved.hibernating);
        assert!(resolved.ready);
    }

    #[test]
    fn default_tag_expression_matches_spec_example() {
        let cfg = MetadataConfig::default();
        let caps = cfg
            .tag_expression
            .0
            .captures(
                "kubernetes.var.log.containers.podX_nsY_ctrZ-0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcd.log",
            )
            .expect("pattern should match");
        assert_eq!(&caps[1], "podX");
        assert_eq!(&caps[2], "nsY");
        assert_eq!(&caps[3], "ctrZ");
    }
}
