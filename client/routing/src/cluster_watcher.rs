//! Consumes cluster lifecycle events, decodes the embedded tenant spec, and
//! drives the [`Registry`] and each tenant's [`TenantClient`] state.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use flog_core::config::{ClientConfig, DynamicRoutingConfig};
use flog_core::ClusterState;
use flog_metrics::RouterMetrics;
use serde::Deserialize;
use tracing::{info, warn};

use crate::client_factory::build_output_client;
use crate::error::RoutingError;
use crate::registry::Registry;

/// One cluster lifecycle operation, as carried on a tenant spec.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum LifecycleOperation {
    Create,
    Delete,
    Restore,
    Migrate,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum LifecycleStatus {
    Processing,
    Succeeded,
}

#[derive(Clone, Debug, Deserialize)]
pub struct LifecycleCondition {
    pub op: LifecycleOperation,
    pub status: LifecycleStatus,
}

/// The subset of a tenant's cluster object this crate cares about. `status`
/// is the watcher's own notion of hibernation progress (distinct from
/// `hibernation_enabled`, the operator's request) — see `derive_state` for
/// why both are needed to place a tenant into `Hibernating` vs `Hibernated`
/// vs `Waking`.
#[derive(Clone, Debug, Deserialize)]
pub struct TenantSpec {
    pub purpose: Option<String>,
    #[serde(default)]
    pub hibernation_enabled: bool,
    #[serde(default)]
    pub hibernation_status: HibernationStatus,
    pub conditions: Vec<LifecycleCondition>,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum HibernationStatus {
    #[default]
    Awake,
    InProgress,
    Hibernated,
}

/// A cluster object as handed to the watcher by the external informer: a
/// tenant name, namespace pattern, and the raw spec blob to decode.
#[derive(Clone, Debug)]
pub struct ClusterObject {
    pub tenant_name: String,
    pub namespace: String,
    pub spec: serde_json::Value,
}

pub const TESTING_PURPOSE: &str = "testing";

fn decode_tenant_spec(raw: &serde_json::Value) -> Result<TenantSpec, RoutingError> {
    serde_json::from_value(raw.clone()).map_err(|e| RoutingError::Decode(e.to_string()))
}

/// Picks the newest condition (last in the list; the informer is assumed to
/// append conditions in occurrence order) that defines a state, per the
/// table in spec §4.8.
fn derive_state(spec: &TenantSpec, previous: Option<ClusterState>) -> Option<ClusterState> {
    if spec.hibernation_enabled {
        return Some(match spec.hibernation_status {
            HibernationStatus::Awake | HibernationStatus::InProgress => ClusterState::Hibernating,
            HibernationStatus::Hibernated => ClusterState::Hibernated,
        });
    }

    if matches!(previous, Some(ClusterState::Hibernating) | Some(ClusterState::Hibernated)) {
        return Some(ClusterState::Waking);
    }

    let condition = spec.conditions.last()?;
    Some(match (condition.op, condition.status) {
        (LifecycleOperation::Create, LifecycleStatus::Processing) => ClusterState::Creation,
        (LifecycleOperation::Create, LifecycleStatus::Succeeded) => ClusterState::Ready,
        (LifecycleOperation::Delete, LifecycleStatus::Processing) => ClusterState::Deletion,
        (LifecycleOperation::Delete, LifecycleStatus::Succeeded) => ClusterState::Deleted,
        (LifecycleOperation::Restore, _) => ClusterState::Restore,
        (LifecycleOperation::Migrate, _) => ClusterState::Migration,
    })
}

/// The external cluster-lifecycle informer contract (spec §6). Implementing
/// this against a real Kubernetes informer is out of scope; `ClusterWatcher`
/// only needs something that can report cache readiness and hand it
/// add/update/delete events, which is exactly the shape a `kube-rs`
/// reflector or a test double both provide.
#[async_trait]
pub trait ClusterInformer: Send + Sync {
    async fn wait_for_cache_sync(&self, timeout: Duration) -> bool;
}

/// Drives `Registry` state from cluster lifecycle events. Does not itself
/// run an informer loop (out of scope, spec §1); callers feed it events via
/// `on_add`/`on_update`/`on_delete`.
pub struct ClusterWatcher {
    registry: Arc<Registry>,
    shoot_template: ClientConfig,
    seed: flog_pipeline::OutputClient,
    dynamic_routing: DynamicRoutingConfig,
    shoot_policy: flog_core::StatePolicy,
    seed_policy: flog_core::StatePolicy,
    metrics: Option<Arc<RouterMetrics>>,
}

impl ClusterWatcher {
    pub fn new(
        registry: Arc<Registry>,
        shoot_template: ClientConfig,
        seed: flog_pipeline::OutputClient,
        dynamic_routing: DynamicRoutingConfig,
        shoot_policy: flog_core::StatePolicy,
        seed_policy: flog_core::StatePolicy,
        metrics: Option<Arc<RouterMetrics>>,
    ) -> Self {
        Self {
            registry,
            shoot_template,
            seed,
            dynamic_routing,
            shoot_policy,
            seed_policy,
            metrics,
        }
    }

    /// Blocks until the informer reports a synced cache, per spec §4.8's
    /// start-up gate. The plugin must not begin accepting records before
    /// this returns `Ok`.
    pub async fn wait_for_cache_sync(
        &self,
        informer: &dyn ClusterInformer,
        timeout: Duration,
    ) -> Result<(), RoutingError> {
        if informer.wait_for_cache_sync(timeout).await {
            Ok(())
        } else {
            Err(RoutingError::CacheSyncTimeout)
        }
    }

    /// The per-tenant shoot-side endpoint: the same `dynamic_host_prefix +
    /// name + dynamic_host_suffix` template `RoutingPlugin` uses to resolve
    /// a record's tenant name, reused here so a tenant's registry key and
    /// its shoot sink endpoint are always derived the same way.
    fn shoot_endpoint(&self, tenant_name: &str) -> String {
        format!(
            "{}{}{}",
            self.dynamic_routing.dynamic_host_prefix, tenant_name, self.dynamic_routing.dynamic_host_suffix
        )
    }

    pub async fn on_add(&self, obj: &ClusterObject) -> Result<(), RoutingError> {
        let spec = decode_tenant_spec(&obj.spec)?;
        if spec.purpose.as_deref() == Some(TESTING_PURPOSE) {
            info!(tenant = %obj.tenant_name, "ignoring tenant with testing purpose");
            return Ok(());
        }

        let state = derive_state(&spec, None).unwrap_or(ClusterState::Creation);
        let endpoint = self.shoot_endpoint(&obj.tenant_name);
        let mut shoot_config = self.shoot_template.clone();
        shoot_config.sink.endpoint = endpoint.clone();

        let shoot = build_output_client(&shoot_config, &obj.tenant_name, Some(&endpoint), self.metrics.clone())
            .await?;

        let client = Arc::new(crate::dual_target::TenantClient::new(
            obj.tenant_name.clone(),
            shoot,
            self.seed.clone(),
            self.shoot_policy,
            self.seed_policy,
            state,
        ));
        self.registry.insert(obj.tenant_name.clone(), client);
        info!(tenant = %obj.tenant_name, %state, "tenant client created");
        Ok(())
    }

    pub async fn on_update(&self, old: &ClusterObject, new: &ClusterObject) -> Result<(), RoutingError> {
        let old_spec = decode_tenant_spec(&old.spec)?;
        let new_spec = decode_tenant_spec(&new.spec)?;

        if !self.registry.contains_live(&new.tenant_name) {
            // Delete wins on order of arrival: an update racing a delete
            // that already tombstoned this tenant is a no-op.
            return Ok(());
        }

        if new_spec.purpose.as_deref() == Some(TESTING_PURPOSE) && old_spec.purpose.as_deref() != Some(TESTING_PURPOSE) {
            self.registry.delete(&new.tenant_name);
            return Ok(());
        }

        let previous_state = derive_state(&old_spec, None);
        let new_state = match derive_state(&new_spec, previous_state) {
            Some(state) => state,
            None => return Ok(()),
        };

        if Some(new_state) != previous_state {
            if !self.registry.set_state(&new.tenant_name, new_state) {
                warn!(tenant = %new.tenant_name, "update for tenant with no live registry entry");
            } else {
                info!(tenant = %new.tenant_name, %new_state, "tenant state transition");
            }
        }
        Ok(())
    }

    pub async fn on_delete(&self, obj: &ClusterObject) -> Result<(), RoutingError> {
        self.registry.delete(&obj.tenant_name);
        info!(tenant = %obj.tenant_name, "tenant tombstoned");
        Ok(())
    }
}
