use routekeeper::{
    checksum, ClusterStateCache, ClusterStateChecksum, ClusterStateManifest, DiscoveryNode,
    IndexRoutingTable, InMemoryBlobStore, NoneCompressor, RemoteRoutingTableDiffStore,
    RemoteStoreConfig, RetryPolicy, RoutingTable, RoutingTableFollower, RoutingTablePublisher,
    ShardRouting, ShardState,
};
use routekeeper::{ClusterState, UploadedMetadata};
use std::sync::Arc;
use std::time::Duration;

fn cluster_state(version: u64, term: u64, routing_table: RoutingTable) -> ClusterState {
    let mut state = ClusterState::new("test-cluster");
    state.version = version;
    state.metadata.cluster_uuid = "uuid-1".into();
    state.metadata.coordination.term = term;
    state.nodes.cluster_manager_node_id = Some("n1".into());
    state
        .nodes
        .add(DiscoveryNode::new("n1", "name-n1", "127.0.0.1:9300"));
    state.routing_table = routing_table;
    state
}

fn routing_with(indices: &[(&str, &str, &str)]) -> RoutingTable {
    let mut table = RoutingTable::new();
    for (name, uuid, node) in indices {
        table.add_index(
            *name,
            IndexRoutingTable::new(*uuid)
                .with_shard(ShardRouting::primary(0, *node, ShardState::Started)),
        );
    }
    table
}

struct Harness {
    blob_store: Arc<InMemoryBlobStore>,
    publisher: RoutingTablePublisher,
    follower: RoutingTableFollower,
}

fn harness() -> Harness {
    let blob_store = Arc::new(InMemoryBlobStore::new());
    let store = Arc::new(RemoteRoutingTableDiffStore::new(
        blob_store.clone(),
        Arc::new(NoneCompressor),
        "test-cluster",
        RemoteStoreConfig::default(),
    ));
    let publisher = RoutingTablePublisher::new(Arc::clone(&store))
        .with_retry_policy(RetryPolicy::linear(3, Duration::from_millis(1)));
    let follower =
        RoutingTableFollower::new(store, Arc::new(ClusterStateCache::new()));
    Harness {
        blob_store,
        publisher,
        follower,
    }
}

fn manifest(
    term: u64,
    version: u64,
    diff: Option<UploadedMetadata>,
    checksum: Option<ClusterStateChecksum>,
) -> ClusterStateManifest {
    ClusterStateManifest {
        cluster_name: "test-cluster".into(),
        cluster_uuid: "uuid-1".into(),
        term,
        version,
        routing_table_diff: diff,
        indices_routing: Vec::new(),
        checksum,
    }
}

#[tokio::test]
async fn coordinator_to_follower_round_trip() {
    let h = harness();
    let previous = routing_with(&[("alpha", "uuid-a", "node-1")]);
    let current = routing_with(&[("alpha", "uuid-a", "node-1"), ("beta", "uuid-b", "node-2")]);

    let uploaded = h
        .publisher
        .publish("uuid-1", 2, 10, &previous, &current)
        .await
        .unwrap()
        .expect("non-empty diff must upload");

    let target = cluster_state(10, 2, current.clone());
    let expected_checksum = ClusterStateChecksum::compute(&target).unwrap();
    let manifest = manifest(2, 10, Some(uploaded), Some(expected_checksum));

    let base = cluster_state(9, 2, previous);
    let outcome = h.follower.sync(&manifest, &base).await.unwrap();
    assert!(!outcome.from_cache);
    assert!(outcome.drift.is_empty());
    assert_eq!(outcome.state.routing_table, current);
    assert_eq!(outcome.state.fingerprint(), manifest.fingerprint());
}

#[tokio::test]
async fn second_sync_is_served_from_cache_without_remote_reads() {
    let h = harness();
    let previous = routing_with(&[("alpha", "uuid-a", "node-1")]);
    let current = routing_with(&[("alpha", "uuid-a", "node-2")]);

    let uploaded = h
        .publisher
        .publish("uuid-1", 3, 21, &previous, &current)
        .await
        .unwrap()
        .unwrap();
    let manifest = manifest(3, 21, Some(uploaded), None);
    let base = cluster_state(20, 3, previous);

    let first = h.follower.sync(&manifest, &base).await.unwrap();
    assert!(!first.from_cache);
    let downloads_after_first = h.blob_store.download_count();

    let second = h.follower.sync(&manifest, &base).await.unwrap();
    assert!(second.from_cache);
    assert_eq!(h.blob_store.download_count(), downloads_after_first);
    assert_eq!(second.state.routing_table, first.state.routing_table);
}

#[tokio::test]
async fn unchanged_routing_publishes_nothing() {
    let h = harness();
    let table = routing_with(&[("alpha", "uuid-a", "node-1")]);

    let uploaded = h
        .publisher
        .publish("uuid-1", 2, 11, &table, &table.clone())
        .await
        .unwrap();
    assert!(uploaded.is_none());
    assert!(h.blob_store.is_empty());
}

#[tokio::test]
async fn publisher_retries_transient_upload_failures() {
    let h = harness();
    h.blob_store.fail_next_uploads(2);
    let previous = RoutingTable::new();
    let current = routing_with(&[("alpha", "uuid-a", "node-1")]);

    let uploaded = h
        .publisher
        .publish("uuid-1", 1, 1, &previous, &current)
        .await
        .unwrap();
    assert!(uploaded.is_some());
    assert_eq!(h.blob_store.upload_count(), 3);
}

#[tokio::test]
async fn publisher_surfaces_exhausted_retries() {
    let h = harness();
    h.blob_store.fail_next_uploads(10);
    let current = routing_with(&[("alpha", "uuid-a", "node-1")]);

    let err = h
        .publisher
        .publish("uuid-1", 1, 1, &RoutingTable::new(), &current)
        .await
        .unwrap_err();
    assert!(err.context().contains("uploading routing table diff"));
    assert_eq!(h.blob_store.upload_count(), 3);
}

#[tokio::test]
async fn checksum_drift_is_reported_not_fatal() {
    let h = harness();
    let previous = routing_with(&[("alpha", "uuid-a", "node-1")]);
    let current = routing_with(&[("alpha", "uuid-a", "node-2")]);

    let uploaded = h
        .publisher
        .publish("uuid-1", 4, 30, &previous, &current)
        .await
        .unwrap()
        .unwrap();

    // Manifest advertises a checksum computed from a state with an extra
    // node: the follower must report drift on that component and succeed.
    let mut divergent = cluster_state(30, 4, current.clone());
    divergent
        .nodes
        .add(DiscoveryNode::new("n9", "name-n9", "127.0.0.1:9309"));
    let advertised = ClusterStateChecksum::compute(&divergent).unwrap();
    let manifest = manifest(4, 30, Some(uploaded), Some(advertised));

    let base = cluster_state(29, 4, previous);
    let outcome = h.follower.sync(&manifest, &base).await.unwrap();
    assert_eq!(outcome.drift, vec![checksum::DISCOVERY_NODES]);
    assert_eq!(outcome.state.routing_table, current);
}

#[tokio::test]
async fn manifest_without_diff_keeps_base_routing() {
    let h = harness();
    let table = routing_with(&[("alpha", "uuid-a", "node-1")]);
    let manifest = manifest(5, 40, None, None);
    let base = cluster_state(39, 5, table.clone());

    let outcome = h.follower.sync(&manifest, &base).await.unwrap();
    assert!(!outcome.from_cache);
    assert_eq!(outcome.state.routing_table, table);
    assert_eq!(outcome.state.version, 40);
}
