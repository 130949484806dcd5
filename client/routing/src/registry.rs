//! The name -> `TenantClient` map, with safe create/update/delete under
//! concurrent access and two-phase tombstoned deletion.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use flog_core::ClusterState;
use parking_lot::RwLock;
use tracing::info;

use crate::dual_target::TenantClient;

struct Entry {
    client: Arc<TenantClient>,
    /// Set the instant `delete` tombstones this entry; `None` while live.
    deleted_at: Option<Instant>,
    #[allow(dead_code)]
    last_observed: Instant,
}

/// Outcome of a [`Registry::get`] lookup.
pub enum Lookup {
    Found(Arc<TenantClient>),
    Missing,
    Closed,
}

/// The concurrent name -> `TenantClient` map described in spec §4.7.
///
/// A single `RwLock` guards map *structure* only: readers take the read lock
/// just long enough to clone an `Arc`, writers take the write lock just long
/// enough to insert/tombstone/remove an entry. Anything slow — constructing
/// a client, dialing a sink, draining on `stop_wait` — happens after the
/// lock is released, so a hot-path lookup never waits behind it.
pub struct Registry {
    entries: RwLock<HashMap<String, Entry>>,
    closed: AtomicBool,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Looks up `name`. A tombstoned entry (pending sweep) is still returned
    /// as `Found`: it keeps draining until the sweeper actually removes it.
    pub fn get(&self, name: &str) -> Lookup {
        if self.closed.load(Ordering::Acquire) {
            return Lookup::Closed;
        }
        match self.entries.read().get(name) {
            Some(entry) => Lookup::Found(entry.client.clone()),
            None => Lookup::Missing,
        }
    }

    /// Inserts a brand new client, or re-lives a tombstoned one that a
    /// racing `add` observed again before the sweeper removed it.
    pub fn insert(&self, name: impl Into<String>, client: Arc<TenantClient>) {
        let name = name.into();
        let mut entries = self.entries.write();
        entries.insert(
            name,
            Entry {
                client,
                deleted_at: None,
                last_observed: Instant::now(),
            },
        );
    }

    /// Applies a new lifecycle state to an existing client, if present and
    /// not already tombstoned. Returns `false` if there was nothing to
    /// update — the caller (`ClusterWatcher`) treats that as "not yet
    /// created", not an error.
    pub fn set_state(&self, name: &str, state: ClusterState) -> bool {
        let entries = self.entries.read();
        match entries.get(name) {
            Some(entry) if entry.deleted_at.is_none() => {
                entry.client.set_state(state);
                true
            }
            _ => false,
        }
    }

    pub fn contains_live(&self, name: &str) -> bool {
        matches!(self.entries.read().get(name), Some(e) if e.deleted_at.is_none())
    }

    /// Marks `name` tombstoned. The client keeps serving `handle` calls
    /// until the sweeper's grace window elapses; this only stops it from
    /// being resolved as "live" by `set_state`/`contains_live`.
    pub fn delete(&self, name: &str) {
        let mut entries = self.entries.write();
        if let Some(entry) = entries.get_mut(name) {
            if entry.deleted_at.is_none() {
                entry.deleted_at = Some(Instant::now());
            }
        }
    }

    /// Removes tombstones older than `grace` and stops their clients. Stops
    /// happen after the entries are removed from the map and the write lock
    /// is released, since `stop_wait` can take up to `2 * export_timeout`.
    pub async fn sweep(&self, grace: Duration) {
        let expired: Vec<(String, Arc<TenantClient>)> = {
            let mut entries = self.entries.write();
            let now = Instant::now();
            let expired_names: Vec<String> = entries
                .iter()
                .filter_map(|(name, entry)| match entry.deleted_at {
                    Some(deleted_at) if now.duration_since(deleted_at) >= grace => Some(name.clone()),
                    _ => None,
                })
                .collect();
            expired_names
                .into_iter()
                .filter_map(|name| entries.remove(&name).map(|e| (name, e.client)))
                .collect()
        };

        for (name, client) in expired {
            info!(tenant = %name, "sweeping expired tenant client");
            client.stop();
            client.stop_wait().await;
        }
    }

    /// Spawns the periodic sweeper task described in spec §4.7/§5. The
    /// returned handle is owned by the caller (`RoutingPlugin::stop_wait`
    /// aborts it after every live client has already been stopped).
    pub fn spawn_sweeper(self: Arc<Self>, grace: Duration, period: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await; // first tick fires immediately; skip it
            loop {
                ticker.tick().await;
                if self.closed.load(Ordering::Acquire) {
                    return;
                }
                self.sweep(grace).await;
            }
        })
    }

    /// Flips the closed flag and stops every still-live client. Future
    /// `get` calls return `Lookup::Closed`.
    pub async fn stop(&self) {
        self.closed.store(true, Ordering::Release);
        let clients: Vec<Arc<TenantClient>> = {
            let entries = self.entries.read();
            entries.values().map(|e| e.client.clone()).collect()
        };
        for client in &clients {
            client.stop();
        }
        for client in clients {
            client.stop_wait().await;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flog_core::StatePolicy;
    use flog_pipeline::OutputClient;

    // A `TenantClient` needs two real `OutputClient`s to construct, which in
    // turn need a running `BatchProcessor`; building those is the focus of
    // `client_factory`'s own tests. Here we only need *some* TenantClient to
    // exercise map/tombstone bookkeeping, so we spin up the cheapest
    // possible processors against `NoopSink`.
    fn counting_name(n: usize) -> String {
        format!("tenant-{n}")
    }

    async fn dummy_client(name: &str) -> Arc<TenantClient> {
        use flog_core::config::BatchProcessorConfig;
        use flog_pipeline::BatchProcessor;
        use flog_queue::DurableQueue;
        use flog_sink::NoopSink;

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
            name,
            shoot,
            seed,
            StatePolicy::shoot_default(),
            StatePolicy::seed_default(),
            ClusterState::Creation,
        ))
    }

    #[tokio::test]
    async fn get_returns_missing_for_unknown_tenant() {
        let registry = Registry::new();
        assert!(matches!(registry.get("unknown"), Lookup::Missing));
    }

    #[tokio::test]
    async fn insert_then_get_round_trips() {
        let registry = Registry::new();
        let client = dummy_client(&counting_name(0)).await;
        registry.insert(counting_name(0), client);
        assert!(matches!(registry.get(&counting_name(0)), Lookup::Found(_)));
    }

    #[tokio::test]
    async fn delete_tombstones_without_removing_from_the_map() {
        let registry = Registry::new();
        let name = counting_name(1);
        registry.insert(&name, dummy_client(&name).await);
        registry.delete(&name);
        assert!(matches!(registry.get(&name), Lookup::Found(_)));
        assert!(!registry.contains_live(&name));
    }

    #[tokio::test]
    async fn sweep_removes_tombstones_past_the_grace_window() {
        let registry = Arc::new(Registry::new());
        let name = counting_name(2);
        registry.insert(&name, dummy_client(&name).await);
        registry.delete(&name);

        registry.sweep(Duration::from_secs(3600)).await;
        assert_eq!(registry.len(), 1, "grace window not yet elapsed");

        registry.sweep(Duration::ZERO).await;
        assert_eq!(registry.len(), 0);
    }

    #[tokio::test]
    async fn stop_closes_future_lookups() {
        let registry = Registry::new();
        let name = counting_name(3);
        registry.insert(&name, dummy_client(&name).await);
        registry.stop().await;
        assert!(matches!(registry.get(&name), Lookup::Closed));
    }
}
