use flog_core::config::{LineFormat, MetadataConfig};

use crate::record::{Record, Value};

/// Renders the record into the wire line handed to the selected tenant
/// client, after stripping the keys that were consumed as labels or
/// explicitly configured for removal.
///
/// `consumed_keys` are the top-level keys that fed label extraction
/// (`label_map`'s first path segment, `label_keys`, and `kubernetes` when
/// auto-promotion is enabled); they are removed from the rendered body
/// alongside `remove_keys` so a label is never duplicated in the line.
pub fn render_line(record: &Record, consumed_keys: &std::collections::BTreeSet<String>, config: &MetadataConfig) -> Vec<u8> {
    let mut body: Record = record
        .iter()
        .filter(|(k, _)| !consumed_keys.contains(k.as_str()) && !config.remove_keys.iter().any(|r| r == *k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    if config.drop_single_key && body.len() == 1 {
        let (_, value) = body.pop_first().expect("checked len == 1 above");
        return value.render().into_bytes();
    }

    match config.line_format {
        LineFormat::Json => {
            let json = Value::Map(body).to_json();
            serde_json::to_vec(&json).unwrap_or_default()
        }
        LineFormat::KeyValue => body
            .iter()
            .map(|(k, v)| format!("{k}={}", v.render()))
            .collect::<Vec<_>>()
            .join(" ")
            .into_bytes(),
    }
}

/// Top-level keys consumed as label sources, to be excluded from the
/// rendered line body.
pub fn consumed_label_keys(config: &MetadataConfig) -> std::collections::BTreeSet<String> {
    let mut keys = std::collections::BTreeSet::new();
    for path in config.label_map.keys() {
        if let Some(first) = path.split('.').next() {
            keys.insert(first.to_string());
        }
    }
    keys.extend(config.label_keys.iter().cloned());
    if config.auto_promote_kubernetes_labels {
        keys.insert("kubernetes".to_string());
    }
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn json_rendering_excludes_consumed_and_removed_keys() {
        let mut record: Record = BTreeMap::new();
        record.insert("app".to_string(), Value::String("frontend".to_string()));
        record.insert("msg".to_string(), Value::String("hello".to_string()));
        record.insert("debug".to_string(), Value::Bool(true));

        let mut config = MetadataConfig::default();
        config.remove_keys.push("debug".to_string());
        config.label_keys.push("app".to_string());

        let consumed = consumed_label_keys(&config);
        let line = render_line(&record, &consumed, &config);
        let parsed: serde_json::Value = serde_json::from_slice(&line).unwrap();
        assert_eq!(parsed, serde_json::json!({"msg": "hello"}));
    }

    #[test]
    fn key_value_rendering_is_sorted_by_key() {
        let mut record: Record = BTreeMap::new();
        record.insert("zeta".to_string(), Value::String("1".to_string()));
        record.insert("alpha".to_string(), Value::String("2".to_string()));
        let mut config = MetadataConfig::default();
        config.line_format = LineFormat::KeyValue;
        let line = render_line(&record, &std::collections::BTreeSet::new(), &config);
        assert_eq!(String::from_utf8(line).unwrap(), "alpha=2 zeta=1");
    }

    #[test]
    fn drop_single_key_renders_the_bare_value() {
        let mut record: Record = BTreeMap::new();
        record.insert("msg".to_string(), Value::String("hello world".to_string()));
        let mut config = MetadataConfig::default();
        config.drop_single_key = true;
        let line = render_line(&record, &std::collections::BTreeSet::new(), &config);
        assert_eq!(String::from_utf8(line).unwrap(), "hello world");
    }
}
