use flog_core::config::MetadataConfig;

use crate::record::{get_path, Record, Value};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KubernetesMeta {
    pub pod_name: String,
    pub namespace_name: String,
    pub container_name: String,
}

pub enum MetadataOutcome {
    Found(KubernetesMeta),
    MissingContinue,
    Drop,
}

const KUBERNETES_KEY: &str = "kubernetes";

fn read_k8s_map(record: &Record) -> Option<KubernetesMeta> {
    let map = record.get(KUBERNETES_KEY)?.as_map()?;
    Some(KubernetesMeta {
        pod_name: map.get("pod_name")?.as_str()?.to_string(),
        namespace_name: map.get("namespace_name")?.as_str()?.to_string(),
        container_name: map.get("container_name")?.as_str()?.to_string(),
    })
}

/// Extracts pod/namespace/container metadata from the `kubernetes`
/// sub-mapping, falling back to a tag-based regex extraction when it is
/// absent and `fallback_to_tag_when_metadata_missing` is set.
///
/// On a successful tag-based fallback the decoded fields are injected back
/// into the record under `kubernetes` so that later steps (label extraction,
/// line formatting) see a uniform shape regardless of which path produced
/// the metadata.
pub fn extract_metadata(record: &mut Record, config: &MetadataConfig) -> MetadataOutcome {
    if let Some(meta) = read_k8s_map(record) {
        return MetadataOutcome::Found(meta);
    }

    if config.fallback_to_tag_when_metadata_missing {
        if let Some(meta) = extract_from_tag(record, config) {
            inject_k8s_map(record, &meta);
            return MetadataOutcome::Found(meta);
        }
    }

    if config.drop_log_entry_without_k8s_metadata {
        MetadataOutcome::Drop
    } else {
        MetadataOutcome::MissingContinue
    }
}

fn extract_from_tag(record: &Record, config: &MetadataConfig) -> Option<KubernetesMeta> {
    let tag = get_path(record, std::slice::from_ref(&config.tag_key))?.as_str()?;
    let tag = tag.strip_prefix(config.tag_prefix.as_str()).unwrap_or(tag);
    let caps = config.tag_expression.0.captures(tag)?;
    Some(KubernetesMeta {
        pod_name: caps.get(1)?.as_str().to_string(),
        namespace_name: caps.get(2)?.as_str().to_string(),
        container_name: caps.get(3)?.as_str().to_string(),
    })
}

fn inject_k8s_map(record: &mut Record, meta: &KubernetesMeta) {
    let mut map = std::collections::BTreeMap::new();
    map.insert("pod_name".to_string(), Value::String(meta.pod_name.clone()));
    map.insert("namespace_name".to_string(), Value::String(meta.namespace_name.clone()));
    map.insert("container_name".to_string(), Value::String(meta.container_name.clone()));
    record.insert(KUBERNETES_KEY.to_string(), Value::Map(map));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn record_with_k8s() -> Record {
        let mut inner = BTreeMap::new();
        inner.insert("pod_name".to_string(), Value::String("web-0".to_string()));
        inner.insert("namespace_name".to_string(), Value::String("shoot--foo".to_string()));
        inner.insert("container_name".to_string(), Value::String("app".to_string()));
        let mut record = BTreeMap::new();
        record.insert(KUBERNETES_KEY.to_string(), Value::Map(inner));
        record
    }

    #[test]
    fn prefers_kubernetes_submap_when_present() {
        let mut record = record_with_k8s();
        let config = MetadataConfig::default();
        match extract_metadata(&mut record, &config) {
            MetadataOutcome::Found(meta) => {
                assert_eq!(meta.pod_name, "web-0");
                assert_eq!(meta.namespace_name, "shoot--foo");
            }
            _ => panic!("expected metadata to be found"),
        }
    }

    #[test]
    fn falls_back_to_tag_expression_when_enabled() {
        let mut record = BTreeMap::new();
        record.insert(
            "tag".to_string(),
            Value::String(
                "kubernetes.var.log.containers.web-0_shoot--foo_app-0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcd.log"
                    .to_string(),
            ),
        );
        let mut config = MetadataConfig::default();
        config.fallback_to_tag_when_metadata_missing = true;

        match extract_metadata(&mut record, &config) {
            MetadataOutcome::Found(meta) => {
                assert_eq!(meta.pod_name, "web-0");
                assert_eq!(meta.container_name, "app");
            }
            _ => panic!("expected fallback extraction to succeed"),
        }
        assert!(record.contains_key(KUBERNETES_KEY));
    }

    #[test]
    fn drops_when_missing_and_drop_flag_set() {
        let mut record: Record = BTreeMap::new();
        let mut config = MetadataConfig::default();
        config.drop_log_entry_without_k8s_metadata = true;
        assert!(matches!(extract_metadata(&mut record, &config), MetadataOutcome::Drop));
    }

    #[test]
    fn continues_when_missing_and_drop_flag_unset() {
        let mut record: Record = BTreeMap::new();
        let config = MetadataConfig::default();
        assert!(matches!(
            extract_metadata(&mut record, &config),
            MetadataOutcome::MissingContinue
        ));
    }
}
