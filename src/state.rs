//! The slice of the cluster-state object model that the diff and checksum
//! engines operate on. Everything else a real cluster carries (index mappings,
//! allocation decisions, ...) lives with external collaborators.

use crate::routing::RoutingTable;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

pub type Settings = HashMap<String, String>;

/// Identity of one published cluster-state revision. Two states with equal
/// fingerprints are interchangeable; any field differing means a different
/// revision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClusterFingerprint {
    pub cluster_name: String,
    pub cluster_uuid: String,
    pub term: u64,
    pub version: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterState {
    pub cluster_name: String,
    pub state_uuid: String,
    pub version: u64,
    pub metadata: Metadata,
    pub nodes: DiscoveryNodes,
    pub blocks: ClusterBlocks,
    pub customs: HashMap<String, serde_json::Value>,
    pub routing_table: RoutingTable,
}

impl ClusterState {
    pub fn new(cluster_name: impl Into<String>) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            ..Self::default()
        }
    }

    pub fn term(&self) -> u64 {
        self.metadata.coordination.term
    }

    pub fn fingerprint(&self) -> ClusterFingerprint {
        ClusterFingerprint {
            cluster_name: self.cluster_name.clone(),
            cluster_uuid: self.metadata.cluster_uuid.clone(),
            term: self.term(),
            version: self.version,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub cluster_uuid: String,
    pub version: u64,
    pub coordination: CoordinationMetadata,
    pub persistent_settings: Settings,
    pub transient_settings: Settings,
    /// Genuinely ordered: template precedence is positional.
    pub templates: Vec<TemplateMetadata>,
    pub hashes_of_consistent_settings: HashMap<String, String>,
    pub customs: HashMap<String, serde_json::Value>,
    pub indices: HashMap<String, IndexMetadata>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoordinationMetadata {
    pub term: u64,
    pub voting_nodes: HashSet<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateMetadata {
    pub name: String,
    pub patterns: Vec<String>,
    pub settings: Settings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMetadata {
    pub index_uuid: String,
    pub settings: Settings,
    pub number_of_shards: u32,
    pub number_of_replicas: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryNodes {
    pub cluster_manager_node_id: Option<String>,
    pub nodes: HashMap<String, DiscoveryNode>,
}

impl DiscoveryNodes {
    pub fn add(&mut self, node: DiscoveryNode) {
        self.nodes.insert(node.id.clone(), node);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryNode {
    pub id: String,
    pub name: String,
    pub address: String,
}

impl DiscoveryNode {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            address: address.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BlockLevel {
    Read,
    Write,
    Metadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterBlock {
    pub id: u32,
    pub description: String,
    pub levels: Vec<BlockLevel>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterBlocks {
    pub global: HashMap<u32, ClusterBlock>,
    pub indices: HashMap<String, HashSet<u32>>,
}

impl ClusterBlocks {
    pub fn add_global(&mut self, block: ClusterBlock) {
        self.global.insert(block.id, block);
    }

    pub fn add_index_block(&mut self, index: impl Into<String>, block_id: u32) {
        self.indices.entry(index.into()).or_default().insert(block_id);
    }
}
