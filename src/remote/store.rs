use crate::manifest::UploadedMetadata;
use crate::remote::blob::{BlobPath, BlobStore, Compressor, WritePriority};
use crate::remote::frame::{DiffFrame, FrameState, ROUTING_TABLE_DIFF_COMPONENT};
use crate::routing::diff::RoutingTableDiff;
use log::{debug, info};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;

const CLUSTER_STATE_PATH_TOKEN: &str = "cluster-state";
const DEFAULT_MAX_CONCURRENT_TRANSFERS: usize = 4;

/// Wraps every I/O or corruption failure crossing the remote boundary, so
/// callers pattern-match on one kind regardless of the underlying transport.
#[derive(Debug, Error)]
#[error("remote state transfer failed: {context}")]
pub struct RemoteStateTransferError {
    context: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl RemoteStateTransferError {
    pub fn new(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn message(context: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            source: None,
        }
    }

    pub fn context(&self) -> &str {
        &self.context
    }
}

/// Envelope returned by a successful read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteReadResult {
    pub component: String,
    pub diff: RoutingTableDiff,
}

#[derive(Debug, Clone)]
pub struct RemoteStoreConfig {
    /// Width of the bounded pool remote transfers run under.
    pub max_concurrent_transfers: usize,
}

impl Default for RemoteStoreConfig {
    fn default() -> Self {
        Self {
            max_concurrent_transfers: DEFAULT_MAX_CONCURRENT_TRANSFERS,
        }
    }
}

/// Serialize→upload and download→deserialize orchestration for routing
/// table diff frames.
///
/// Failures are always delivered through the returned future, never by
/// panicking, and the store adds no retry and no timeout of its own: retry
/// policy belongs to the caller, timeouts to the blob store collaborator.
pub struct RemoteRoutingTableDiffStore {
    blob_store: Arc<dyn BlobStore>,
    compressor: Arc<dyn Compressor>,
    cluster_name: String,
    permits: Arc<Semaphore>,
}

impl RemoteRoutingTableDiffStore {
    pub fn new(
        blob_store: Arc<dyn BlobStore>,
        compressor: Arc<dyn Compressor>,
        cluster_name: impl Into<String>,
        config: RemoteStoreConfig,
    ) -> Self {
        Self {
            blob_store,
            compressor,
            cluster_name: cluster_name.into(),
            permits: Arc::new(Semaphore::new(config.max_concurrent_transfers.max(1))),
        }
    }

    /// Container every diff blob for one cluster incarnation lives in:
    /// `<base>/<cluster-name>/cluster-state/<cluster-uuid>/routing-table-diff`.
    pub fn diff_container(&self, cluster_uuid: &str) -> BlobPath {
        self.blob_store
            .base_path()
            .add(&self.cluster_name)
            .add(CLUSTER_STATE_PATH_TOKEN)
            .add(cluster_uuid)
            .add(crate::remote::frame::ROUTING_TABLE_DIFF_PATH_TOKEN)
    }

    /// Names (if needed), serializes, and uploads one frame at urgent
    /// priority. Re-invoking with the same frame regenerates the same blob
    /// name and overwrites, so caller-driven retries are safe.
    pub async fn write(
        &self,
        frame: &mut DiffFrame,
    ) -> Result<UploadedMetadata, RemoteStateTransferError> {
        match self.write_inner(frame).await {
            Ok(metadata) => {
                let _ = frame.mark_done();
                info!(
                    "event=routing_diff_uploaded cluster={} term={} version={} path={}",
                    self.cluster_name,
                    frame.term(),
                    frame.version(),
                    metadata.uploaded_filename
                );
                Ok(metadata)
            }
            Err(err) => {
                if frame.state() == FrameState::InFlight {
                    let _ = frame.mark_failed();
                }
                Err(err)
            }
        }
    }

    async fn write_inner(
        &self,
        frame: &mut DiffFrame,
    ) -> Result<UploadedMetadata, RemoteStateTransferError> {
        if matches!(frame.state(), FrameState::Failed | FrameState::Done) {
            frame
                .reset_for_retry()
                .map_err(|err| RemoteStateTransferError::new("frame retry reset", err))?;
        }
        let bytes = frame
            .serialize(self.compressor.as_ref())
            .map_err(|err| RemoteStateTransferError::new("serializing routing table diff", err))?;

        let container = self.diff_container(frame.cluster_uuid());
        frame
            .set_blob_container(&container)
            .map_err(|err| RemoteStateTransferError::new("naming routing table diff", err))?;
        let file_name = frame
            .blob_file_name()
            .map_err(|err| RemoteStateTransferError::new("naming routing table diff", err))?
            .to_string();

        let _permit = self.permits.acquire().await.map_err(|err| {
            RemoteStateTransferError::new("remote transfer pool closed", err)
        })?;
        frame
            .mark_in_flight()
            .map_err(|err| RemoteStateTransferError::new("frame state", err))?;
        debug!(
            "event=routing_diff_upload_start cluster={} file={file_name}",
            self.cluster_name
        );
        self.blob_store
            .upload_blob(&container, &file_name, bytes, WritePriority::Urgent)
            .await
            .map_err(|err| {
                RemoteStateTransferError::new(
                    format!("uploading routing table diff {file_name}"),
                    err,
                )
            })?;

        Ok(UploadedMetadata {
            component: ROUTING_TABLE_DIFF_COMPONENT.to_string(),
            uploaded_filename: container.blob_path(&file_name),
        })
    }

    /// Downloads and deserializes the frame's named blob. A pure fetch:
    /// re-invocation has no side effects beyond the transfer itself.
    pub async fn read(
        &self,
        frame: &mut DiffFrame,
    ) -> Result<RemoteReadResult, RemoteStateTransferError> {
        let full_name = frame
            .full_blob_name()
            .ok_or_else(|| RemoteStateTransferError::message("frame has no blob name to read"))?
            .to_string();
        let (container, file_name) = BlobPath::split(&full_name);

        let _permit = self.permits.acquire().await.map_err(|err| {
            RemoteStateTransferError::new("remote transfer pool closed", err)
        })?;
        debug!(
            "event=routing_diff_download_start cluster={} file={file_name}",
            self.cluster_name
        );
        let bytes = self
            .blob_store
            .download_blob(&container, &file_name)
            .await
            .map_err(|err| {
                RemoteStateTransferError::new(
                    format!("downloading routing table diff {full_name}"),
                    err,
                )
            })?;

        let diff = frame
            .deserialize(&bytes, self.compressor.as_ref())
            .map_err(|err| {
                RemoteStateTransferError::new(
                    format!("deserializing routing table diff {full_name}"),
                    err,
                )
            })?;

        Ok(RemoteReadResult {
            component: ROUTING_TABLE_DIFF_COMPONENT.to_string(),
            diff,
        })
    }
}
