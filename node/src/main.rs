mod cli;
mod config;
mod demo;
mod logging;

use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use flog_core::config::default_state_policy_shoot;
use flog_core::ClusterState;
use flog_metrics::RouterMetrics;
use flog_routing::{
    always_on_policy, build_output_client, ClusterInformer, ClusterWatcher, Registry, RoutingPlugin,
    RoutingPluginConfig, TenantClient,
};
use tracing::info;

/// Stands in for a real Kubernetes informer in the demo harness: reports an
/// immediately-synced cache so `ClusterWatcher`'s start-up gate (spec
/// §4.8/§5) has something real to wait on without requiring a cluster.
struct AlwaysSyncedInformer;

#[async_trait]
impl ClusterInformer for AlwaysSyncedInformer {
    async fn wait_for_cache_sync(&self, _timeout: std::time::Duration) -> bool {
        true
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init()?;

    let cli = cli::Cli::parse();
    let config = config::load(&cli.config)?;

    let metrics = Arc::new(RouterMetrics::register(prometheus::Registry::new())?);
    let metrics_handle = flog_metrics::serve((*metrics).clone(), config.metrics_port);

    let seed = build_output_client(&config.seed, "seed", None, Some(metrics.clone())).await?;
    let default_shoot = build_output_client(&config.shoot, "default", None, Some(metrics.clone())).await?;
    let default_client = Arc::new(TenantClient::new(
        "default",
        default_shoot,
        seed.clone(),
        always_on_policy(),
        always_on_policy(),
        ClusterState::Ready,
    ));

    let registry = Arc::new(Registry::new());
    let shoot_policy = config.shoot_state_policy.resolve(default_state_policy_shoot());
    let seed_policy = config
        .seed_state_policy
        .resolve(flog_core::config::default_state_policy_seed());

    let watcher = Arc::new(ClusterWatcher::new(
        registry.clone(),
        config.shoot.clone(),
        seed.clone(),
        config.dynamic_routing.clone(),
        shoot_policy,
        seed_policy,
        Some(metrics.clone()),
    ));
    watcher
        .wait_for_cache_sync(&AlwaysSyncedInformer, config.controller_sync_timeout)
        .await?;
    // The demo harness has no real cluster informer to drive `watcher`'s
    // add/update/delete callbacks afterwards; `wait_for_cache_sync` above
    // exercises the same start-up gate the host embeds this crate behind.
    let _ = &watcher;

    let sweeper = registry
        .clone()
        .spawn_sweeper(config.deleted_client_time_expiration, config.clean_expired_clients_period);

    let plugin = Arc::new(RoutingPlugin::new(
        registry,
        default_client,
        RoutingPluginConfig {
            metadata: config.metadata.clone(),
            dynamic_routing: config.dynamic_routing.clone(),
        },
        Some(metrics),
    ));

    info!("fleet log router demo harness reading records from stdin");
    tokio::select! {
        () = demo::run(plugin.clone()) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal");
        }
    }

    plugin.stop_wait().await;
    seed.stop_wait().await;
    sweeper.abort();
    metrics_handle.abort();

    Ok(())
}
