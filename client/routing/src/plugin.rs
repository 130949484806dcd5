//! The per-record entry point described in spec §4.9: everything the host
//! collector calls into for every ingested log line.

use std::collections::BTreeMap;
use std::sync::Arc;

use flog_core::config::{DynamicRoutingConfig, MetadataConfig};
use flog_core::{LogEntry, StatePolicy, Timestamp};
use flog_metrics::{target, RouterMetrics};
use tracing::{debug, warn};

use crate::dual_target::TenantClient;
use crate::dynamic_routing::resolve_tenant;
use crate::labels::extract_labels;
use crate::line_format::{consumed_label_keys, render_line};
use crate::metadata::{extract_metadata, MetadataOutcome};
use crate::record::{normalize, RawValue};
use crate::registry::{Lookup, Registry};

/// Construction-time configuration `RoutingPlugin` needs beyond the two
/// `ClientConfig`s already consumed by `ClusterWatcher`/`client_factory`.
pub struct RoutingPluginConfig {
    pub metadata: MetadataConfig,
    pub dynamic_routing: DynamicRoutingConfig,
}

/// Per-record entry point. Owns the `Registry` and the fleet-wide default
/// client; does not own the `ClusterWatcher` (constructed and driven
/// separately, sharing the same `Registry`).
pub struct RoutingPlugin {
    registry: Arc<Registry>,
    default_client: Arc<TenantClient>,
    config: RoutingPluginConfig,
    consumed_keys: std::collections::BTreeSet<String>,
    metrics: Option<Arc<RouterMetrics>>,
}

impl RoutingPlugin {
    pub fn new(
        registry: Arc<Registry>,
        default_client: Arc<TenantClient>,
        config: RoutingPluginConfig,
        metrics: Option<Arc<RouterMetrics>>,
    ) -> Self {
        let consumed_keys = consumed_label_keys(&config.metadata);
        Self {
            registry,
            default_client,
            config,
            consumed_keys,
            metrics,
        }
    }

    /// Handles one ingested record. Never returns an error to the caller:
    /// per spec §4.9, parsing/rendering failures are logged and the record
    /// is dropped rather than propagated, since a fatal return from the host
    /// ABI's `flush` would disable the whole plugin.
    pub async fn handle(&self, timestamp: Timestamp, raw: BTreeMap<Vec<u8>, RawValue>) {
        let mut record = normalize(raw);

        if let MetadataOutcome::Drop = extract_metadata(&mut record, &self.config.metadata) {
            debug!("dropping record with no kubernetes metadata");
            self.record_metric(None, target::DROPPED);
            return;
        }

        let labels = extract_labels(&record, &self.config.metadata);
        let line = render_line(&record, &self.consumed_keys, &self.config.metadata);

        let tenant_name = resolve_tenant(&record, &self.config.dynamic_routing);
        let client = match &tenant_name {
            Some(name) => match self.registry.get(name) {
                Lookup::Found(client) => client,
                Lookup::Missing | Lookup::Closed => self.default_client.clone(),
            },
            None => self.default_client.clone(),
        };

        let is_default = Arc::ptr_eq(&client, &self.default_client);
        let entry = LogEntry::new(timestamp, labels, line);
        let state = client.get_state();

        if let Err(err) = client.handle(entry).await {
            warn!(tenant = client.name(), %err, "routing delivery failed");
        }

        if is_default {
            self.record_metric(Some(&state.to_string()), target::DEFAULT);
        } else {
            let (shoot_muted, seed_muted) = client.mute_snapshot();
            if !shoot_muted {
                self.record_metric(Some(&state.to_string()), target::SHOOT);
            }
            if !seed_muted {
                self.record_metric(Some(&state.to_string()), target::SEED);
            }
        }
    }

    fn record_metric(&self, state: Option<&str>, target: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_routed(state.unwrap_or("unknown"), target);
        }
    }

    pub async fn stop_wait(&self) {
        self.registry.stop().await;
        self.default_client.stop();
        self.default_client.stop_wait().await;
    }
}

/// Builds the always-unmuted policy the fleet-wide default client uses: it
/// never goes through `ClusterWatcher`'s lifecycle-state machine, so it has
/// no notion of being muted by cluster state.
pub fn always_on_policy() -> StatePolicy {
    StatePolicy {
        creation: true,
        ready: true,
        hibernating: true,
        hibernated: true,
        waking: true,
        deletion: true,
        deleted: true,
        restore: true,
        migration: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flog_core::config::BatchProcessorConfig;
    use flog_core::ClusterState;
    use flog_pipeline::{BatchProcessor, OutputClient};
    use flog_queue::DurableQueue;
    use flog_sink::NoopSink;
    use std::collections::BTreeMap as StdMap;

    async fn default_client() -> Arc<TenantClient> {
        let dir = tempfile::tempdir().unwrap();
        let shoot_queue = Arc::new(DurableQueue::open(dir.path().join("shoot"), 100, false).unwrap());
        let seed_queue = Arc::new(DurableQueue::open(dir.path().join("seed"), 100, false).unwrap());
        let shoot = OutputClient::new(
            BatchProcessor::spawn(BatchProcessorConfig::default(), "id", shoot_queue, Arc::new(NoopSink), None),
            "shoot",
        );
        let seed = OutputClient::new(
            BatchProcessor::spawn(BatchProcessorConfig::default(), "id", seed_queue, Arc::new(NoopSink), None),
            "seed",
        );
        Arc::new(TenantClient::new(
            "default",
            shoot,
            seed,
            always_on_policy(),
            always_on_policy(),
            ClusterState::Ready,
        ))
    }

    fn raw_record() -> StdMap<Vec<u8>, RawValue> {
        let mut k8s = StdMap::new();
        k8s.insert(b"pod_name".to_vec(), RawValue::Bytes(b"web-0".to_vec()));
        k8s.insert(b"namespace_name".to_vec(), RawValue::Bytes(b"shoot--foo".to_vec()));
        k8s.insert(b"container_name".to_vec(), RawValue::Bytes(b"app".to_vec()));
        let mut record = StdMap::new();
        record.insert(b"kubernetes".to_vec(), RawValue::Map(k8s));
        record.insert(b"msg".to_vec(), RawValue::Bytes(b"hello".to_vec()));
        record
    }

    #[tokio::test]
    async fn unresolved_tenant_falls_back_to_default_client_without_panicking() {
        let registry = Arc::new(Registry::new());
        let plugin = RoutingPlugin::new(
            registry,
            default_client().await,
            RoutingPluginConfig {
                metadata: MetadataConfig::default(),
                dynamic_routing: DynamicRoutingConfig::default(),
            },
            None,
        );
        plugin.handle(Timestamp::from_nanos(1), raw_record()).await;
    }

    #[tokio::test]
    async fn resolved_but_unregistered_tenant_also_falls_back_to_default() {
        let registry = Arc::new(Registry::new());
        let mut dynamic_routing = DynamicRoutingConfig::default();
        dynamic_routing.dynamic_host_path = vec!["kubernetes".to_string(), "namespace_name".to_string()];
        let plugin = RoutingPlugin::new(
            registry,
            default_client().await,
            RoutingPluginConfig {
                metadata: MetadataConfig::default(),
                dynamic_routing,
            },
            None,
        );
        plugin.handle(Timestamp::from_nanos(1), raw_record()).await;
    }
}
