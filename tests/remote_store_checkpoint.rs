use routekeeper::{
    format_inverted, BlobPath, DiffFrame, FrameState, FsBlobStore, InMemoryBlobStore,
    IndexRoutingTable, NoneCompressor, RemoteRoutingTableDiffStore, RemoteStoreConfig,
    RoutingTable, RoutingTableDiff, ShardRouting, ShardState, ROUTING_TABLE_DIFF_COMPONENT,
};
use std::sync::Arc;

fn sample_tables() -> (RoutingTable, RoutingTable) {
    let previous = RoutingTable::new().with_index(
        "alpha",
        IndexRoutingTable::new("uuid-a")
            .with_shard(ShardRouting::primary(0, "node-1", ShardState::Started)),
    );
    let current = previous.clone().with_index(
        "beta",
        IndexRoutingTable::new("uuid-b")
            .with_shard(ShardRouting::primary(0, "node-2", ShardState::Started)),
    );
    (previous, current)
}

fn sample_diff() -> RoutingTableDiff {
    let (previous, current) = sample_tables();
    RoutingTableDiff::compute(&previous, &current)
}

fn in_memory_store(blob_store: Arc<InMemoryBlobStore>) -> RemoteRoutingTableDiffStore {
    RemoteRoutingTableDiffStore::new(
        blob_store,
        Arc::new(NoneCompressor),
        "test-cluster",
        RemoteStoreConfig::default(),
    )
}

#[test]
fn inverted_coordinate_format_is_stable() {
    // Format contract: changing these strings breaks cross-version listings.
    assert_eq!(format_inverted(0), "18446744073709551615");
    assert_eq!(format_inverted(2), "18446744073709551613");
    assert_eq!(format_inverted(3), "18446744073709551612");
    assert_eq!(format_inverted(u64::MAX), "00000000000000000000");
}

#[test]
fn newer_coordinates_sort_lexicographically_first() {
    let mut names = Vec::new();
    for (term, version) in [(1u64, 5u64), (1, 9), (2, 1), (3, 4)] {
        let mut frame = DiffFrame::for_upload(sample_diff(), "uuid", term, version);
        names.push((term, version, frame.blob_file_name().unwrap().to_string()));
    }
    for pair in names.windows(2) {
        let (older, newer) = (&pair[0], &pair[1]);
        assert!(
            newer.2 < older.2,
            "({},{}) should sort before ({},{})",
            newer.0,
            newer.1,
            older.0,
            older.1
        );
    }
}

#[test]
fn frame_round_trips_through_codec() {
    let diff = sample_diff();
    let mut upload = DiffFrame::for_upload(diff.clone(), "uuid-1", 2, 3);
    let bytes = upload.serialize(&NoneCompressor).unwrap();

    let mut download = DiffFrame::for_download("container/blob", "uuid-1");
    let decoded = download.deserialize(&bytes, &NoneCompressor).unwrap();
    assert_eq!(decoded, diff);
    assert_eq!(download.term(), 2);
    assert_eq!(download.version(), 3);
    assert_eq!(download.diff(), Some(&diff));
}

#[tokio::test]
async fn write_then_read_reconstructs_the_diff() {
    let blob_store = Arc::new(InMemoryBlobStore::new());
    let store = in_memory_store(Arc::clone(&blob_store));
    let (previous, current) = sample_tables();

    let mut frame = DiffFrame::for_upload(
        RoutingTableDiff::compute(&previous, &current),
        "uuid-1",
        2,
        3,
    );
    let metadata = store.write(&mut frame).await.unwrap();
    assert_eq!(metadata.component, ROUTING_TABLE_DIFF_COMPONENT);
    assert!(metadata
        .uploaded_filename
        .contains("test-cluster/cluster-state/uuid-1/routing-table-diff/"));
    assert_eq!(frame.state(), FrameState::Done);

    let mut download = DiffFrame::for_download(&metadata.uploaded_filename, "uuid-1");
    let result = store.read(&mut download).await.unwrap();
    assert_eq!(result.component, ROUTING_TABLE_DIFF_COMPONENT);
    assert_eq!(result.diff.apply(&previous).unwrap(), current);
}

#[tokio::test]
async fn upload_failure_wraps_cause_and_allows_retry() {
    let blob_store = Arc::new(InMemoryBlobStore::new());
    blob_store.fail_next_uploads(1);
    let store = in_memory_store(Arc::clone(&blob_store));

    let mut frame = DiffFrame::for_upload(sample_diff(), "uuid-1", 2, 3);
    let err = store.write(&mut frame).await.unwrap_err();
    assert!(err.context().contains("uploading routing table diff"));
    assert!(std::error::Error::source(&err).is_some());
    assert_eq!(frame.state(), FrameState::Failed);
    let failed_name = frame.full_blob_name().unwrap().to_string();

    // Retry reuses the cached name and overwrites.
    let metadata = store.write(&mut frame).await.unwrap();
    assert_eq!(metadata.uploaded_filename, failed_name);
    assert_eq!(blob_store.upload_count(), 2);
    assert!(blob_store.contains(&metadata.uploaded_filename));
}

#[tokio::test]
async fn download_failure_wraps_cause() {
    let blob_store = Arc::new(InMemoryBlobStore::new());
    let store = in_memory_store(blob_store);

    let mut frame = DiffFrame::for_download("container/missing-blob", "uuid-1");
    let err = store.read(&mut frame).await.unwrap_err();
    assert!(err.context().contains("downloading routing table diff"));
    assert!(std::error::Error::source(&err).is_some());
}

#[tokio::test]
async fn rewriting_a_done_frame_overwrites_the_same_blob() {
    let blob_store = Arc::new(InMemoryBlobStore::new());
    let store = in_memory_store(Arc::clone(&blob_store));

    let mut frame = DiffFrame::for_upload(sample_diff(), "uuid-1", 2, 3);
    let first = store.write(&mut frame).await.unwrap();
    let second = store.write(&mut frame).await.unwrap();
    assert_eq!(first.uploaded_filename, second.uploaded_filename);
    assert_eq!(blob_store.len(), 1);
}

#[tokio::test]
async fn listing_returns_newest_diff_first() {
    let blob_store = Arc::new(InMemoryBlobStore::new());
    let store = in_memory_store(Arc::clone(&blob_store));

    let mut old_frame = DiffFrame::for_upload(sample_diff(), "uuid-1", 1, 5);
    let mut new_frame = DiffFrame::for_upload(sample_diff(), "uuid-1", 2, 1);
    let old_meta = store.write(&mut old_frame).await.unwrap();
    let new_meta = store.write(&mut new_frame).await.unwrap();

    let listing = blob_store.sorted_blob_paths();
    assert_eq!(listing.len(), 2);
    assert_eq!(listing[0], new_meta.uploaded_filename);
    assert_eq!(listing[1], old_meta.uploaded_filename);
}

#[tokio::test]
async fn filesystem_store_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let blob_store = Arc::new(
        FsBlobStore::new(dir.path()).with_base(BlobPath::new().add("repo-base")),
    );
    let store = RemoteRoutingTableDiffStore::new(
        blob_store,
        Arc::new(NoneCompressor),
        "test-cluster",
        RemoteStoreConfig {
            max_concurrent_transfers: 2,
        },
    );
    let (previous, current) = sample_tables();

    let mut frame = DiffFrame::for_upload(
        RoutingTableDiff::compute(&previous, &current),
        "uuid-1",
        7,
        11,
    );
    let metadata = store.write(&mut frame).await.unwrap();
    assert!(metadata.uploaded_filename.starts_with("repo-base/"));

    let mut download = DiffFrame::for_download(&metadata.uploaded_filename, "uuid-1");
    let result = store.read(&mut download).await.unwrap();
    assert_eq!(result.diff.apply(&previous).unwrap(), current);
}
