use crate::state::{ClusterFingerprint, ClusterState};
use log::{debug, warn};
use parking_lot::Mutex;
use std::sync::Arc;

/// One fully reconstructed cluster state plus the fingerprint it answers to.
#[derive(Debug, Clone)]
pub struct CachedState {
    pub fingerprint: ClusterFingerprint,
    pub state: Arc<ClusterState>,
}

/// Last-known-good pointer: a single slot holding the most recently stored
/// reconstructed state. Replacement is whole-value, so a reader sees either
/// the old entry or the new one, never a blend. Monotonicity is the caller's
/// concern; the cache itself is unconditional last-write-wins.
#[derive(Debug, Default)]
pub struct ClusterStateCache {
    slot: Mutex<Option<CachedState>>,
}

impl ClusterStateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached state only on an exact fingerprint match. Any
    /// difference, including term-only or version-only, is a miss.
    pub fn get(
        &self,
        cluster_name: &str,
        fingerprint: &ClusterFingerprint,
    ) -> Option<Arc<ClusterState>> {
        let slot = self.slot.lock();
        match slot.as_ref() {
            Some(cached)
                if cached.fingerprint == *fingerprint
                    && cached.fingerprint.cluster_name == cluster_name =>
            {
                Some(Arc::clone(&cached.state))
            }
            _ => None,
        }
    }

    /// Stores a state, replacing whatever was cached. States missing their
    /// identity fields (cluster UUID, coordination term) are dropped: a
    /// state that cannot be fingerprinted can never be served.
    pub fn put(&self, state: Arc<ClusterState>) {
        if state.metadata.cluster_uuid.is_empty() {
            warn!("event=state_cache_reject reason=missing_cluster_uuid");
            return;
        }
        if state.term() == 0 {
            warn!(
                "event=state_cache_reject reason=missing_coordination_term cluster_uuid={}",
                state.metadata.cluster_uuid
            );
            return;
        }
        let fingerprint = state.fingerprint();
        debug!(
            "event=state_cache_put cluster={} term={} version={}",
            fingerprint.cluster_name, fingerprint.term, fingerprint.version
        );
        *self.slot.lock() = Some(CachedState { fingerprint, state });
    }

    /// Fingerprint of the currently cached state, if any.
    pub fn cached_fingerprint(&self) -> Option<ClusterFingerprint> {
        self.slot.lock().as_ref().map(|c| c.fingerprint.clone())
    }
}
