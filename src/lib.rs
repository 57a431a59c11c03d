//! routekeeper persists the authoritative shard routing table of a search
//! cluster to remote durable storage and lets any node rebuild or validate
//! that state without retransmitting it in full.
//!
//! A coordinator computes an incremental [`routing::diff::RoutingTableDiff`]
//! between successive routing tables, frames it with a sortable blob name
//! and a checksummed codec envelope, and pushes it through the
//! [`remote::store::RemoteRoutingTableDiffStore`]. Followers download the
//! frame, reapply the diff, verify per-component
//! [`checksum::ClusterStateChecksum`]s against the published manifest, and
//! keep the reconstructed state in a single-slot
//! [`cache::ClusterStateCache`].

pub mod cache;
pub mod checksum;
pub mod manifest;
pub mod publish;
pub mod remote;
pub mod retry;
pub mod routing;
pub mod state;

pub use cache::{CachedState, ClusterStateCache};
pub use checksum::{ChecksumError, ClusterStateChecksum, COMPONENT_ORDER};
pub use manifest::{
    merge_uploaded_indices, ClusterStateManifest, ManifestError, UploadedIndexMetadata,
    UploadedMetadata,
};
pub use publish::{RoutingTableFollower, RoutingTablePublisher, SyncError, SyncOutcome};
pub use remote::{
    blob::{
        BlobPath, BlobStore, BlobStoreError, Compressor, FsBlobStore, InMemoryBlobStore,
        NoneCompressor, WritePriority,
    },
    frame::{
        format_inverted, invert_u64, parse_inverted, DiffFrame, FrameError, FrameState,
        ROUTING_TABLE_DIFF_COMPONENT, ROUTING_TABLE_DIFF_FILE_PREFIX,
        ROUTING_TABLE_DIFF_PATH_TOKEN,
    },
    store::{
        RemoteReadResult, RemoteRoutingTableDiffStore, RemoteStateTransferError, RemoteStoreConfig,
    },
};
pub use retry::{RetryHandle, RetryPolicy, RetryStrategy};
pub use routing::{
    diff::{DiffError, IndexDiffEntry, IndexRoutingDiff, RoutingTableDiff},
    IndexRoutingTable, RoutingTable, ShardRole, ShardRouting, ShardState,
};
pub use state::{
    BlockLevel, ClusterBlock, ClusterBlocks, ClusterFingerprint, ClusterState,
    CoordinationMetadata, DiscoveryNode, DiscoveryNodes, IndexMetadata, Metadata, Settings,
    TemplateMetadata,
};
