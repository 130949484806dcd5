use serde::Deserialize;

/// The lifecycle state of a tenant (shoot) cluster, derived by the
/// `ClusterWatcher` from the tenant spec.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ClusterState {
    Creation,
    Ready,
    Hibernating,
    Hibernated,
    Waking,
    Deletion,
    Deleted,
    Restore,
    Migration,
}

impl ClusterState {
    pub const ALL: [ClusterState; 9] = [
        ClusterState::Creation,
        ClusterState::Ready,
        ClusterState::Hibernating,
        ClusterState::Hibernated,
        ClusterState::Waking,
        ClusterState::Deletion,
        ClusterState::Deleted,
        ClusterState::Restore,
        ClusterState::Migration,
    ];
}

impl std::fmt::Display for ClusterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ClusterState::Creation => "Creation",
            ClusterState::Ready => "Ready",
            ClusterState::Hibernating => "Hibernating",
            ClusterState::Hibernated => "Hibernated",
            ClusterState::Waking => "Waking",
            ClusterState::Deletion => "Deletion",
            ClusterState::Deleted => "Deleted",
            ClusterState::Restore => "Restore",
            ClusterState::Migration => "Migration",
        };
        f.write_str(name)
    }
}

/// Whether logs are delivered to one side (shoot or seed) while the tenant
/// is in a given [`ClusterState`]. Shoot-side and seed-side policies are
/// independent, static config.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct StatePolicy {
    pub creation: bool,
    pub ready: bool,
    pub hibernating: bool,
    pub hibernated: bool,
    pub waking: bool,
    pub deletion: bool,
    pub deleted: bool,
    pub restore: bool,
    pub migration: bool,
}

impl StatePolicy {
    pub fn allows(&self, state: ClusterState) -> bool {
        match state {
            ClusterState::Creation => self.creation,
            ClusterState::Ready => self.ready,
            ClusterState::Hibernating => self.hibernating,
            ClusterState::Hibernated => self.hibernated,
            ClusterState::Waking => self.waking,
            ClusterState::Deletion => self.deletion,
            ClusterState::Deleted => self.deleted,
            ClusterState::Restore => self.restore,
            ClusterState::Migration => self.migration,
        }
    }

    /// Shoot-side default: deliver in every state except while hibernating
    /// or fully hibernated.
    pub fn shoot_default() -> Self {
        Self {
            creation: true,
            ready: true,
            hibernating: false,
            hibernated: false,
            waking: true,
            deletion: true,
            deleted: true,
            restore: true,
            migration: true,
        }
    }

    /// Seed-side default: deliver only around the tenant's create/delete/
    /// restore/migrate lifecycle transitions, not during steady-state
    /// operation or hibernation.
    pub fn seed_default() -> Self {
        Self {
            creation: true,
            ready: false,
            hibernating: false,
            hibernated: false,
            waking: false,
            deletion: true,
            deleted: true,
            restore: true,
            migration: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shoot_default_mutes_only_hibernation_states() {
        let policy = StatePolicy::shoot_default();
        for state in ClusterState::ALL {
            let expect_allowed = !matches!(
                state,
                ClusterState::Hibernating | ClusterState::Hibernated
            );
            assert_eq!(policy.allows(state), expect_allowed, "state={state}");
        }
    }

    #[test]
    fn seed_default_allows_only_lifecycle_transitions() {
        let policy = StatePolicy::seed_default();
        for state in ClusterState::ALL {
            let expect_allowed = matches!(
                state,
                ClusterState::Creation
                    | ClusterState::Deletion
                    | ClusterState::Deleted
                    | ClusterState::Restore
                    | ClusterState::Migration
            );
            assert_eq!(policy.allows(state), expect_allowed, "state={state}");
        }
    }
}
