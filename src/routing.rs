use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub mod diff;

/// Role a shard copy plays within its replication group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ShardRole {
    Primary,
    Replica,
}

/// Lifecycle state of a shard copy on its assigned node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ShardState {
    Unassigned,
    Initializing,
    Started,
    Relocating,
}

/// One shard copy assignment. Identity within an index is (shard id, role, node).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShardRouting {
    pub shard_id: u32,
    pub node_id: Option<String>,
    pub role: ShardRole,
    pub state: ShardState,
}

impl ShardRouting {
    pub fn primary(shard_id: u32, node_id: impl Into<String>, state: ShardState) -> Self {
        Self {
            shard_id,
            node_id: Some(node_id.into()),
            role: ShardRole::Primary,
            state,
        }
    }

    pub fn replica(shard_id: u32, node_id: impl Into<String>, state: ShardState) -> Self {
        Self {
            shard_id,
            node_id: Some(node_id.into()),
            role: ShardRole::Replica,
            state,
        }
    }

    pub fn unassigned(shard_id: u32, role: ShardRole) -> Self {
        Self {
            shard_id,
            node_id: None,
            role,
            state: ShardState::Unassigned,
        }
    }

    fn sort_key(&self) -> (ShardRole, Option<String>, ShardState) {
        (self.role, self.node_id.clone(), self.state)
    }
}

/// Per-index routing: every shard copy assignment, keyed by shard id.
///
/// Copies within a shard are kept in canonical order (primary first, then
/// replicas by node id) so equality and hashing never depend on the order
/// assignments were recorded in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRoutingTable {
    pub index_uuid: String,
    shards: HashMap<u32, Vec<ShardRouting>>,
}

impl IndexRoutingTable {
    pub fn new(index_uuid: impl Into<String>) -> Self {
        Self {
            index_uuid: index_uuid.into(),
            shards: HashMap::new(),
        }
    }

    pub fn with_shard(mut self, routing: ShardRouting) -> Self {
        self.add_shard(routing);
        self
    }

    pub fn add_shard(&mut self, routing: ShardRouting) {
        let copies = self.shards.entry(routing.shard_id).or_default();
        copies.push(routing);
        copies.sort_by_key(ShardRouting::sort_key);
    }

    /// Replaces every copy of one shard. The replacement set is canonicalized.
    pub fn set_shard(&mut self, shard_id: u32, mut copies: Vec<ShardRouting>) {
        copies.sort_by_key(ShardRouting::sort_key);
        self.shards.insert(shard_id, copies);
    }

    pub fn remove_shard(&mut self, shard_id: u32) -> Option<Vec<ShardRouting>> {
        self.shards.remove(&shard_id)
    }

    pub fn shard(&self, shard_id: u32) -> Option<&[ShardRouting]> {
        self.shards.get(&shard_id).map(Vec::as_slice)
    }

    pub fn shards(&self) -> &HashMap<u32, Vec<ShardRouting>> {
        &self.shards
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Shard ids in ascending order. Canonical iteration for digests.
    pub fn sorted_shard_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.shards.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

/// The full routing table: index name to per-index routing. Two tables are
/// equal when they hold the same entries, regardless of the order they were
/// built in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingTable {
    indices: HashMap<String, IndexRoutingTable>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_index(mut self, name: impl Into<String>, routing: IndexRoutingTable) -> Self {
        self.indices.insert(name.into(), routing);
        self
    }

    pub fn add_index(&mut self, name: impl Into<String>, routing: IndexRoutingTable) {
        self.indices.insert(name.into(), routing);
    }

    pub fn remove_index(&mut self, name: &str) -> Option<IndexRoutingTable> {
        self.indices.remove(name)
    }

    pub fn index(&self, name: &str) -> Option<&IndexRoutingTable> {
        self.indices.get(name)
    }

    pub fn contains_index(&self, name: &str) -> bool {
        self.indices.contains_key(name)
    }

    pub fn indices(&self) -> &HashMap<String, IndexRoutingTable> {
        &self.indices
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Index names in ascending order. Canonical iteration for digests.
    pub fn sorted_index_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.indices.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
