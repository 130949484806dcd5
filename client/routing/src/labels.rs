use flog_core::config::MetadataConfig;
use flog_core::LabelSet;

use crate::record::{get_path, Record, Value};

/// Prometheus-style label name: `[a-zA-Z_][a-zA-Z0-9_]*`.
fn is_valid_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Builds the label set for one record from `label_map` (dotted path ->
/// label name), `label_keys` (flat top-level keys, label name == key name)
/// and, if enabled, every leaf under `kubernetes` promoted to a label named
/// after its own key. Invalid label names are skipped rather than rejecting
/// the whole record.
pub fn extract_labels(record: &Record, config: &MetadataConfig) -> LabelSet {
    let mut labels = LabelSet::new();

    for (path, label_name) in &config.label_map {
        let segments: Vec<String> = path.split('.').map(str::to_string).collect();
        if let Some(value) = get_path(record, &segments) {
            insert_scalar(&mut labels, label_name, value);
        }
    }

    for key in &config.label_keys {
        if let Some(value) = record.get(key) {
            insert_scalar(&mut labels, key, value);
        }
    }

    if config.auto_promote_kubernetes_labels {
        if let Some(Value::Map(k8s)) = record.get("kubernetes") {
            collect_leaves(&mut labels, k8s);
        }
    }

    labels
}

fn collect_leaves(labels: &mut LabelSet, map: &std::collections::BTreeMap<String, Value>) {
    for (key, value) in map {
        match value {
            Value::Map(nested) => collect_leaves(labels, nested),
            other => insert_scalar(labels, key, other),
        }
    }
}

fn insert_scalar(labels: &mut LabelSet, name: &str, value: &Value) {
    if !is_valid_label_name(name) {
        return;
    }
    if let Value::Map(_) | Value::Array(_) = value {
        return;
    }
    labels.insert(name, value.render());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn k8s_record() -> Record {
        let mut inner = BTreeMap::new();
        inner.insert("pod_name".to_string(), Value::String("web-0".to_string()));
        inner.insert("namespace_name".to_string(), Value::String("shoot--foo".to_string()));
        let mut record = BTreeMap::new();
        record.insert("kubernetes".to_string(), Value::Map(inner));
        record.insert("app".to_string(), Value::String("frontend".to_string()));
        record
    }

    #[test]
    fn label_map_resolves_dotted_paths() {
        let record = k8s_record();
        let mut config = MetadataConfig::default();
        config.label_map.insert("kubernetes.namespace_name".to_string(), "namespace".to_string());
        let labels = extract_labels(&record, &config);
        assert_eq!(labels.get("namespace"), Some("shoot--foo"));
    }

    #[test]
    fn label_keys_use_the_key_itself_as_the_label_name() {
        let record = k8s_record();
        let mut config = MetadataConfig::default();
        config.label_keys.push("app".to_string());
        let labels = extract_labels(&record, &config);
        assert_eq!(labels.get("app"), Some("frontend"));
    }

    #[test]
    fn auto_promotion_flattens_every_kubernetes_leaf() {
        let record = k8s_record();
        let mut config = MetadataConfig::default();
        config.auto_promote_kubernetes_labels = true;
        let labels = extract_labels(&record, &config);
        assert_eq!(labels.get("pod_name"), Some("web-0"));
        assert_eq!(labels.get("namespace_name"), Some("shoot--foo"));
    }

    #[test]
    fn invalid_label_names_are_skipped() {
        let mut record: Record = BTreeMap::new();
        record.insert("9invalid".to_string(), Value::String("x".to_string()));
        let mut config = MetadataConfig::default();
        config.label_keys.push("9invalid".to_string());
        let labels = extract_labels(&record, &config);
        assert!(labels.is_empty());
    }
}
