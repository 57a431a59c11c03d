//! Coordinator- and follower-side orchestration around the remote diff
//! store: the publisher pushes routing table deltas, the follower rebuilds
//! and validates state from them.

use crate::cache::ClusterStateCache;
use crate::checksum::{ChecksumError, ClusterStateChecksum};
use crate::manifest::{ClusterStateManifest, UploadedMetadata};
use crate::remote::frame::DiffFrame;
use crate::remote::store::{RemoteRoutingTableDiffStore, RemoteStateTransferError};
use crate::retry::RetryPolicy;
use crate::routing::diff::{DiffError, RoutingTableDiff};
use crate::routing::RoutingTable;
use crate::state::ClusterState;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Transfer(#[from] RemoteStateTransferError),
    #[error(transparent)]
    Diff(#[from] DiffError),
    #[error(transparent)]
    Checksum(#[from] ChecksumError),
}

/// Publishes routing table changes as incremental diffs. Owns the retry
/// schedule, since the store itself never retries.
pub struct RoutingTablePublisher {
    store: Arc<RemoteRoutingTableDiffStore>,
    retry: RetryPolicy,
}

impl RoutingTablePublisher {
    pub fn new(store: Arc<RemoteRoutingTableDiffStore>) -> Self {
        Self {
            store,
            retry: RetryPolicy::exponential(3, Duration::from_millis(100)).with_jitter(0.2),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Computes the delta between the previously published table and the
    /// current one and uploads it. Returns `None` without touching remote
    /// storage when nothing changed.
    pub async fn publish(
        &self,
        cluster_uuid: &str,
        term: u64,
        version: u64,
        previous: &RoutingTable,
        current: &RoutingTable,
    ) -> Result<Option<UploadedMetadata>, RemoteStateTransferError> {
        let diff = RoutingTableDiff::compute(previous, current);
        if diff.is_empty() {
            debug!("event=routing_diff_skip reason=empty term={term} version={version}");
            return Ok(None);
        }
        let mut frame = DiffFrame::for_upload(diff, cluster_uuid, term, version);
        let mut handle = self.retry.handle();
        loop {
            match self.store.write(&mut frame).await {
                Ok(metadata) => {
                    info!(
                        "event=routing_diff_published term={term} version={version} attempts={}",
                        handle.attempts() + 1
                    );
                    return Ok(Some(metadata));
                }
                Err(err) => match handle.next_delay() {
                    Some(delay) => {
                        warn!(
                            "event=routing_diff_retry term={term} version={version} attempt={} cause={err}",
                            handle.attempts()
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => return Err(err),
                },
            }
        }
    }
}

/// Result of one follower sync.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub state: Arc<ClusterState>,
    /// Component names whose checksums disagreed with the manifest.
    /// Drift is reportable data, not a failure: transient divergence during
    /// a publish window is expected.
    pub drift: Vec<&'static str>,
    pub from_cache: bool,
}

/// Rebuilds cluster state from published diffs, validates it against the
/// manifest checksum, and records the result in the state cache.
pub struct RoutingTableFollower {
    store: Arc<RemoteRoutingTableDiffStore>,
    cache: Arc<ClusterStateCache>,
}

impl RoutingTableFollower {
    pub fn new(store: Arc<RemoteRoutingTableDiffStore>, cache: Arc<ClusterStateCache>) -> Self {
        Self { store, cache }
    }

    pub fn cache(&self) -> &ClusterStateCache {
        &self.cache
    }

    /// Produces the cluster state the manifest describes, serving an exact
    /// fingerprint match from the cache without contacting remote storage.
    pub async fn sync(
        &self,
        manifest: &ClusterStateManifest,
        base: &ClusterState,
    ) -> Result<SyncOutcome, SyncError> {
        let fingerprint = manifest.fingerprint();
        if let Some(state) = self.cache.get(&manifest.cluster_name, &fingerprint) {
            debug!(
                "event=follower_sync_cache_hit cluster={} term={} version={}",
                fingerprint.cluster_name, fingerprint.term, fingerprint.version
            );
            return Ok(SyncOutcome {
                state,
                drift: Vec::new(),
                from_cache: true,
            });
        }

        let routing_table = match &manifest.routing_table_diff {
            Some(uploaded) => {
                let mut frame =
                    DiffFrame::for_download(&uploaded.uploaded_filename, &manifest.cluster_uuid);
                let result = self.store.read(&mut frame).await?;
                result.diff.apply(&base.routing_table)?
            }
            None => base.routing_table.clone(),
        };

        let mut state = base.clone();
        state.cluster_name = manifest.cluster_name.clone();
        state.metadata.cluster_uuid = manifest.cluster_uuid.clone();
        state.metadata.coordination.term = manifest.term;
        state.version = manifest.version;
        state.routing_table = routing_table;

        let drift = match &manifest.checksum {
            Some(expected) => {
                let computed = ClusterStateChecksum::compute(&state)?;
                let drift = computed.mismatched_components(expected);
                if !drift.is_empty() {
                    warn!(
                        "event=checksum_drift cluster={} term={} version={} components={}",
                        manifest.cluster_name,
                        manifest.term,
                        manifest.version,
                        drift.join(",")
                    );
                }
                drift
            }
            None => Vec::new(),
        };

        let state = Arc::new(state);
        self.cache.put(Arc::clone(&state));
        info!(
            "event=follower_sync_complete cluster={} term={} version={} drift={}",
            manifest.cluster_name,
            manifest.term,
            manifest.version,
            drift.len()
        );
        Ok(SyncOutcome {
            state,
            drift,
            from_cache: false,
        })
    }
}
