//! Per-tenant dual-sink routing: cluster-state tracking, the tenant
//! registry, and the per-record routing pipeline that hands formed
//! [`flog_core::LogEntry`] values off to [`flog_pipeline::OutputClient`]s.

mod client_factory;
mod cluster_watcher;
mod dual_target;
mod dynamic_routing;
mod error;
mod labels;
mod line_format;
mod metadata;
mod plugin;
mod record;
mod registry;

pub use client_factory::build_output_client;
pub use cluster_watcher::{
    ClusterInformer, ClusterObject, ClusterWatcher, HibernationStatus, LifecycleCondition,
    LifecycleOperation, LifecycleStatus, TenantSpec, TESTING_PURPOSE,
};
pub use dual_target::TenantClient;
pub use error::RoutingError;
pub use metadata::KubernetesMeta;
pub use plugin::{always_on_policy, RoutingPlugin, RoutingPluginConfig};
pub use record::{normalize, RawValue, Record, Value};
pub use registry::{Lookup, Registry};
