use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlobStoreError {
    #[error("blob not found: {path}")]
    NotFound { path: String },
    #[error("blob store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("injected {operation} failure")]
    Injected { operation: &'static str },
    #[error("{0}")]
    Other(String),
}

/// Relative urgency of an upload. Cluster-state diffs ride ahead of bulk
/// traffic so followers converge quickly after a publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePriority {
    Normal,
    Urgent,
}

/// Slash-joined token path addressing a blob container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobPath {
    tokens: Vec<String>,
}

impl BlobPath {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, token: impl Into<String>) -> Self {
        self.tokens.push(token.into());
        self
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Full path string for one blob inside this container.
    pub fn blob_path(&self, file_name: &str) -> String {
        if self.tokens.is_empty() {
            file_name.to_string()
        } else {
            format!("{}/{}", self.tokens.join("/"), file_name)
        }
    }

    /// Splits a full blob path back into its container path and file name.
    pub fn split(full_path: &str) -> (BlobPath, String) {
        match full_path.rsplit_once('/') {
            Some((container, file_name)) => (
                BlobPath {
                    tokens: container
                        .split('/')
                        .filter(|t| !t.is_empty())
                        .map(str::to_string)
                        .collect(),
                },
                file_name.to_string(),
            ),
            None => (BlobPath::new(), full_path.to_string()),
        }
    }
}

/// Optional payload codec owned by the blob store collaborator. The frame
/// layer only needs the three-operation contract; real codecs live outside
/// this crate.
pub trait Compressor: Send + Sync {
    fn name(&self) -> &'static str;
    fn compress(&self, bytes: &[u8]) -> Vec<u8>;
    fn uncompress(&self, bytes: &[u8]) -> Result<Vec<u8>, BlobStoreError>;
    fn is_compressed(&self, bytes: &[u8]) -> bool;
}

/// Identity codec: frames pass through untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoneCompressor;

impl Compressor for NoneCompressor {
    fn name(&self) -> &'static str {
        "none"
    }

    fn compress(&self, bytes: &[u8]) -> Vec<u8> {
        bytes.to_vec()
    }

    fn uncompress(&self, bytes: &[u8]) -> Result<Vec<u8>, BlobStoreError> {
        Ok(bytes.to_vec())
    }

    fn is_compressed(&self, _bytes: &[u8]) -> bool {
        false
    }
}

/// Durable object storage collaborator: path-addressed upload/download plus
/// a base path all cluster-state blobs live under.
#[async_trait]
pub trait BlobStore: Send + Sync {
    fn base_path(&self) -> BlobPath;

    async fn upload_blob(
        &self,
        path: &BlobPath,
        file_name: &str,
        bytes: Vec<u8>,
        priority: WritePriority,
    ) -> Result<(), BlobStoreError>;

    async fn download_blob(
        &self,
        path: &BlobPath,
        file_name: &str,
    ) -> Result<Vec<u8>, BlobStoreError>;
}

/// Map-backed store with failure injection, for tests and embedders that
/// want persistence without a remote dependency.
#[derive(Default)]
pub struct InMemoryBlobStore {
    base: BlobPath,
    blobs: parking_lot::Mutex<HashMap<String, Vec<u8>>>,
    fail_uploads: AtomicUsize,
    fail_downloads: AtomicUsize,
    upload_count: AtomicUsize,
    download_count: AtomicUsize,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base(base: BlobPath) -> Self {
        Self {
            base,
            ..Self::default()
        }
    }

    /// Fails the next `count` uploads before succeeding again.
    pub fn fail_next_uploads(&self, count: usize) {
        self.fail_uploads.store(count, Ordering::SeqCst);
    }

    pub fn fail_next_downloads(&self, count: usize) {
        self.fail_downloads.store(count, Ordering::SeqCst);
    }

    pub fn upload_count(&self) -> usize {
        self.upload_count.load(Ordering::SeqCst)
    }

    pub fn download_count(&self) -> usize {
        self.download_count.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.lock().is_empty()
    }

    pub fn contains(&self, full_path: &str) -> bool {
        self.blobs.lock().contains_key(full_path)
    }

    /// Blob paths in ascending lexicographic order, the order a remote
    /// listing would return them in.
    pub fn sorted_blob_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.blobs.lock().keys().cloned().collect();
        paths.sort();
        paths
    }

    fn consume_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    fn base_path(&self) -> BlobPath {
        self.base.clone()
    }

    async fn upload_blob(
        &self,
        path: &BlobPath,
        file_name: &str,
        bytes: Vec<u8>,
        _priority: WritePriority,
    ) -> Result<(), BlobStoreError> {
        self.upload_count.fetch_add(1, Ordering::SeqCst);
        if Self::consume_failure(&self.fail_uploads) {
            return Err(BlobStoreError::Injected {
                operation: "upload",
            });
        }
        self.blobs.lock().insert(path.blob_path(file_name), bytes);
        Ok(())
    }

    async fn download_blob(
        &self,
        path: &BlobPath,
        file_name: &str,
    ) -> Result<Vec<u8>, BlobStoreError> {
        self.download_count.fetch_add(1, Ordering::SeqCst);
        if Self::consume_failure(&self.fail_downloads) {
            return Err(BlobStoreError::Injected {
                operation: "download",
            });
        }
        let full_path = path.blob_path(file_name);
        self.blobs
            .lock()
            .get(&full_path)
            .cloned()
            .ok_or(BlobStoreError::NotFound { path: full_path })
    }
}

/// Filesystem-backed store rooted at a directory; blob paths become
/// directories, file names become files.
pub struct FsBlobStore {
    root: PathBuf,
    base: BlobPath,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            base: BlobPath::new(),
        }
    }

    pub fn with_base(mut self, base: BlobPath) -> Self {
        self.base = base;
        self
    }

    fn resolve(&self, path: &BlobPath, file_name: &str) -> PathBuf {
        let mut resolved = self.root.clone();
        for token in path.tokens() {
            resolved.push(token);
        }
        resolved.push(file_name);
        resolved
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    fn base_path(&self) -> BlobPath {
        self.base.clone()
    }

    async fn upload_blob(
        &self,
        path: &BlobPath,
        file_name: &str,
        bytes: Vec<u8>,
        _priority: WritePriority,
    ) -> Result<(), BlobStoreError> {
        let target = self.resolve(path, file_name);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, bytes).await?;
        Ok(())
    }

    async fn download_blob(
        &self,
        path: &BlobPath,
        file_name: &str,
    ) -> Result<Vec<u8>, BlobStoreError> {
        let target = self.resolve(path, file_name);
        match tokio::fs::read(&target).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(BlobStoreError::NotFound {
                    path: target.display().to_string(),
                })
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_path_round_trips_through_split() {
        let path = BlobPath::new().add("base").add("cluster-state").add("uuid");
        let full = path.blob_path("file-1");
        assert_eq!(full, "base/cluster-state/uuid/file-1");

        let (container, file_name) = BlobPath::split(&full);
        assert_eq!(container, path);
        assert_eq!(file_name, "file-1");
    }

    #[test]
    fn split_handles_bare_file_names() {
        let (container, file_name) = BlobPath::split("lonely");
        assert_eq!(container, BlobPath::new());
        assert_eq!(file_name, "lonely");
    }

    #[tokio::test]
    async fn in_memory_store_round_trips() {
        let store = InMemoryBlobStore::new();
        let path = BlobPath::new().add("dir");
        store
            .upload_blob(&path, "blob", b"payload".to_vec(), WritePriority::Urgent)
            .await
            .unwrap();
        let fetched = store.download_blob(&path, "blob").await.unwrap();
        assert_eq!(fetched, b"payload");
    }

    #[tokio::test]
    async fn injected_failures_are_consumed_in_order() {
        let store = InMemoryBlobStore::new();
        store.fail_next_uploads(1);
        let path = BlobPath::new();
        let err = store
            .upload_blob(&path, "blob", vec![1], WritePriority::Normal)
            .await
            .unwrap_err();
        assert!(matches!(err, BlobStoreError::Injected { .. }));
        store
            .upload_blob(&path, "blob", vec![1], WritePriority::Normal)
            .await
            .unwrap();
        assert_eq!(store.upload_count(), 2);
    }
}
