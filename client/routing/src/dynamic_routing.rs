use flog_core::config::DynamicRoutingConfig;

use crate::record::{get_path, Record};

/// Resolves the dynamic tenant name for a record, if any.
///
/// `dynamic_host_path` is traversed into the record; the resolved string is
/// wrapped in `dynamic_host_prefix`/`dynamic_host_suffix` and, when
/// `dynamic_host_regex` is configured, must match it to be accepted as a
/// dynamic tenant. Absent a configured regex, any resolved value is
/// accepted. A record with no value at the path, or one that fails the
/// regex, is routed to the default client only.
pub fn resolve_tenant(record: &Record, config: &DynamicRoutingConfig) -> Option<String> {
    let raw = get_path(record, &config.dynamic_host_path)?.as_str()?;
    let name = format!("{}{}{}", config.dynamic_host_prefix, raw, config.dynamic_host_suffix);

    match &config.dynamic_host_regex {
        Some(regex) if !regex.0.is_match(&name) => None,
        _ => Some(name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Value;
    use std::collections::BTreeMap;

    fn record_with_namespace(ns: &str) -> Record {
        let mut inner = BTreeMap::new();
        inner.insert("namespace_name".to_string(), Value::String(ns.to_string()));
        let mut record = BTreeMap::new();
        record.insert("kubernetes".to_string(), Value::Map(inner));
        record
    }

    #[test]
    fn resolves_name_with_prefix_and_suffix() {
        let record = record_with_namespace("shoot--foo");
        let mut config = DynamicRoutingConfig::default();
        config.dynamic_host_prefix = "https://".to_string();
        config.dynamic_host_suffix = ".example.com".to_string();
        assert_eq!(
            resolve_tenant(&record, &config),
            Some("https://shoot--foo.example.com".to_string())
        );
    }

    #[test]
    fn returns_none_when_path_is_missing() {
        let record: Record = BTreeMap::new();
        let config = DynamicRoutingConfig::default();
        assert_eq!(resolve_tenant(&record, &config), None);
    }

    #[test]
    fn returns_none_when_regex_does_not_match() {
        let record = record_with_namespace("garden");
        let config: DynamicRoutingConfig = toml::from_str(r#"dynamic_host_regex = "^shoot--""#).unwrap();
        assert_eq!(resolve_tenant(&record, &config), None);
    }

    #[test]
    fn returns_name_when_regex_matches() {
        let record = record_with_namespace("shoot--foo");
        let config: DynamicRoutingConfig = toml::from_str(r#"dynamic_host_regex = "^shoot--""#).unwrap();
        assert_eq!(resolve_tenant(&record, &config), Some("shoot--foo".to_string()));
    }
}
