use std::sync::atomic::{AtomicBool, Ordering};

use flog_core::{ClusterState, LogEntry, StatePolicy};
use flog_pipeline::OutputClient;
use parking_lot::Mutex;

use crate::error::RoutingError;

/// One tenant's dual-sink delivery target: a shoot-side and a seed-side
/// [`OutputClient`], each muted independently according to its own
/// [`StatePolicy`] and the tenant's current [`ClusterState`].
///
/// Mute flags are plain atomics so `handle` never takes a lock on the
/// per-record hot path; `state` is behind a `Mutex` since it is only read
/// and written on the much colder cluster-event path.
pub struct TenantClient {
    name: String,
    shoot: OutputClient,
    seed: OutputClient,
    shoot_policy: StatePolicy,
    seed_policy: StatePolicy,
    shoot_mute: AtomicBool,
    seed_mute: AtomicBool,
    state: Mutex<ClusterState>,
}

impl TenantClient {
    pub fn new(
        name: impl Into<String>,
        shoot: OutputClient,
        seed: OutputClient,
        shoot_policy: StatePolicy,
        seed_policy: StatePolicy,
        initial_state: ClusterState,
    ) -> Self {
        Self {
            name: name.into(),
            shoot_mute: AtomicBool::new(!shoot_policy.allows(initial_state)),
            seed_mute: AtomicBool::new(!seed_policy.allows(initial_state)),
            shoot,
            seed,
            shoot_policy,
            seed_policy,
            state: Mutex::new(initial_state),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Delivers one entry to whichever sides are currently unmuted. Both
    /// sides are attempted even if one fails; a single-side failure is
    /// reported, a double failure is reported as [`RoutingError::Both`].
    pub async fn handle(&self, entry: LogEntry) -> Result<(), RoutingError> {
        let send_shoot = !self.shoot_mute.load(Ordering::Relaxed);
        let send_seed = !self.seed_mute.load(Ordering::Relaxed);

        let (shoot_result, seed_result) = match (send_shoot, send_seed) {
            (true, true) => {
                let shoot_entry = entry.clone();
                (
                    self.shoot.handle(shoot_entry).await,
                    self.seed.handle(entry).await,
                )
            }
            (true, false) => (self.shoot.handle(entry).await, Ok(())),
            (false, true) => (Ok(()), self.seed.handle(entry).await),
            (false, false) => (Ok(()), Ok(())),
        };

        match (shoot_result, seed_result) {
            (Ok(()), Ok(())) => Ok(()),
            (Err(shoot), Ok(())) => Err(RoutingError::Shoot(shoot)),
            (Ok(()), Err(seed)) => Err(RoutingError::Seed(seed)),
            (Err(shoot), Err(seed)) => Err(RoutingError::Both { shoot, seed }),
        }
    }

    /// Re-evaluates both mute flags against the configured policies. A
    /// no-op if `new_state` matches the currently recorded state; flag
    /// updates themselves are not atomic with each other, matching the
    /// host's existing tolerance of a record or two crossing a state
    /// transition under the previous policy.
    pub fn set_state(&self, new_state: ClusterState) {
        let mut current = self.state.lock();
        if *current == new_state {
            return;
        }
        self.shoot_mute.store(!self.shoot_policy.allows(new_state), Ordering::Relaxed);
        self.seed_mute.store(!self.seed_policy.allows(new_state), Ordering::Relaxed);
        *current = new_state;
    }

    pub fn get_state(&self) -> ClusterState {
        *self.state.lock()
    }

    /// Current `(shoot_muted, seed_muted)` snapshot, for metrics call sites
    /// that want to attribute a routed record to the side(s) it actually
    /// went to without re-deriving it from the policy tables. Like `handle`,
    /// this is a racy read of the mute flags; the spec explicitly tolerates
    /// that.
    pub fn mute_snapshot(&self) -> (bool, bool) {
        (
            self.shoot_mute.load(Ordering::Relaxed),
            self.seed_mute.load(Ordering::Relaxed),
        )
    }

    /// Stable identity used for logging and metrics; this client fans out
    /// to two sinks, so there is no single network endpoint to report.
    pub fn endpoint(&self) -> &str {
        &self.name
    }

    pub fn stop(&self) {
        self.shoot.stop();
        self.seed.stop();
    }

    pub async fn stop_wait(&self) {
        self.shoot.stop_wait().await;
        self.seed.stop_wait().await;
    }
}
