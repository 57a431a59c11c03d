//! Remote persistence of routing table diffs: blob-store collaborator
//! interfaces, blob naming and framing, and the async diff store.

pub mod blob;
pub mod frame;
pub mod store;

pub use blob::{
    BlobPath, BlobStore, BlobStoreError, Compressor, FsBlobStore, InMemoryBlobStore,
    NoneCompressor, WritePriority,
};
pub use frame::{
    format_inverted, invert_u64, parse_inverted, DiffFrame, FrameError, FrameState,
    ROUTING_TABLE_DIFF_COMPONENT, ROUTING_TABLE_DIFF_FILE_PREFIX, ROUTING_TABLE_DIFF_PATH_TOKEN,
};
pub use store::{
    RemoteReadResult, RemoteRoutingTableDiffStore, RemoteStateTransferError, RemoteStoreConfig,
};
