//! Consistency checksums over cluster-state components.
//!
//! Each named component gets an independent 64-bit checksum so two nodes can
//! locate divergence without shipping full payloads. Unordered components
//! (maps, sets) combine per-entry hashes with XOR; genuinely ordered ones
//! (the templates list, the canonical routing walk) hash sequentially. The
//! aggregate is the XOR of all component checksums, so component computation
//! has no required join order.
//!
//! These are drift detectors, not cryptographic integrity seals: the
//! commutative combine is collision-prone under adversarial input.

use crate::state::{ClusterBlocks, ClusterState, CoordinationMetadata, DiscoveryNodes};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use thiserror::Error;

pub const ROUTING_TABLE: &str = "routing_table";
pub const DISCOVERY_NODES: &str = "discovery_nodes";
pub const CLUSTER_BLOCKS: &str = "cluster_blocks";
pub const CLUSTER_STATE_CUSTOMS: &str = "cluster_state_customs";
pub const COORDINATION_METADATA: &str = "coordination_metadata";
pub const SETTINGS_METADATA: &str = "settings_metadata";
pub const TRANSIENT_SETTINGS_METADATA: &str = "transient_settings_metadata";
pub const TEMPLATES_METADATA: &str = "templates_metadata";
pub const CUSTOM_METADATA_MAP: &str = "custom_metadata_map";
pub const HASHES_OF_CONSISTENT_SETTINGS: &str = "hashes_of_consistent_settings";
pub const INDICES_METADATA: &str = "indices_metadata";

/// Fixed reporting order for mismatch listings and the flat binary stream.
pub const COMPONENT_ORDER: [&str; 11] = [
    ROUTING_TABLE,
    DISCOVERY_NODES,
    CLUSTER_BLOCKS,
    CLUSTER_STATE_CUSTOMS,
    COORDINATION_METADATA,
    SETTINGS_METADATA,
    TRANSIENT_SETTINGS_METADATA,
    TEMPLATES_METADATA,
    CUSTOM_METADATA_MAP,
    HASHES_OF_CONSISTENT_SETTINGS,
    INDICES_METADATA,
];

const ENCODED_LEN: usize = 12 * 8;

#[derive(Debug, Error)]
pub enum ChecksumError {
    #[error("checksum serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("checksum stream truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
}

/// One checksum per cluster-state component plus the aggregate.
///
/// Equality considers the eleven component values only, so it is consistent
/// with [`mismatched_components`](Self::mismatched_components) returning an
/// empty list.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ClusterStateChecksum {
    pub routing_table: u64,
    pub discovery_nodes: u64,
    pub cluster_blocks: u64,
    pub cluster_state_customs: u64,
    pub coordination_metadata: u64,
    pub settings_metadata: u64,
    pub transient_settings_metadata: u64,
    pub templates_metadata: u64,
    pub custom_metadata_map: u64,
    pub hashes_of_consistent_settings: u64,
    pub indices_metadata: u64,
    pub cluster_state_checksum: u64,
}

impl PartialEq for ClusterStateChecksum {
    fn eq(&self, other: &Self) -> bool {
        self.components() == other.components()
    }
}

impl Eq for ClusterStateChecksum {}

impl ClusterStateChecksum {
    pub fn compute(state: &ClusterState) -> Result<Self, ChecksumError> {
        let routing_table = routing_table_checksum(state)?;
        let discovery_nodes = discovery_nodes_checksum(&state.nodes)?;
        let cluster_blocks = cluster_blocks_checksum(&state.blocks)?;
        let cluster_state_customs = unordered_map_checksum(CLUSTER_STATE_CUSTOMS, &state.customs)?;
        let coordination_metadata = coordination_checksum(&state.metadata.coordination)?;
        let settings_metadata =
            unordered_map_checksum(SETTINGS_METADATA, &state.metadata.persistent_settings)?;
        let transient_settings_metadata = unordered_map_checksum(
            TRANSIENT_SETTINGS_METADATA,
            &state.metadata.transient_settings,
        )?;
        let templates_metadata = templates_checksum(state)?;
        let custom_metadata_map =
            unordered_map_checksum(CUSTOM_METADATA_MAP, &state.metadata.customs)?;
        let hashes_of_consistent_settings = unordered_map_checksum(
            HASHES_OF_CONSISTENT_SETTINGS,
            &state.metadata.hashes_of_consistent_settings,
        )?;
        let indices_metadata = unordered_map_checksum(INDICES_METADATA, &state.metadata.indices)?;

        let mut checksum = Self {
            routing_table,
            discovery_nodes,
            cluster_blocks,
            cluster_state_customs,
            coordination_metadata,
            settings_metadata,
            transient_settings_metadata,
            templates_metadata,
            custom_metadata_map,
            hashes_of_consistent_settings,
            indices_metadata,
            cluster_state_checksum: 0,
        };
        checksum.cluster_state_checksum = checksum
            .components()
            .into_iter()
            .fold(0u64, |acc, value| acc ^ value);
        Ok(checksum)
    }

    /// Component values in [`COMPONENT_ORDER`].
    pub fn components(&self) -> [u64; 11] {
        [
            self.routing_table,
            self.discovery_nodes,
            self.cluster_blocks,
            self.cluster_state_customs,
            self.coordination_metadata,
            self.settings_metadata,
            self.transient_settings_metadata,
            self.templates_metadata,
            self.custom_metadata_map,
            self.hashes_of_consistent_settings,
            self.indices_metadata,
        ]
    }

    /// Names of every component whose checksum differs, in
    /// [`COMPONENT_ORDER`]. Empty means the two states agree in every
    /// checksummed dimension.
    pub fn mismatched_components(&self, other: &Self) -> Vec<&'static str> {
        let ours = self.components();
        let theirs = other.components();
        COMPONENT_ORDER
            .iter()
            .zip(ours.iter().zip(theirs.iter()))
            .filter(|(_, (a, b))| a != b)
            .map(|(name, _)| *name)
            .collect()
    }

    /// Flat binary form: the eleven components in fixed order, then the
    /// aggregate, little-endian u64 each.
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(ENCODED_LEN);
        for value in self.components() {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        bytes.extend_from_slice(&self.cluster_state_checksum.to_le_bytes());
        bytes
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ChecksumError> {
        if bytes.len() != ENCODED_LEN {
            return Err(ChecksumError::Truncated {
                expected: ENCODED_LEN,
                actual: bytes.len(),
            });
        }
        let mut fields = [0u64; 12];
        for (i, field) in fields.iter_mut().enumerate() {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&bytes[i * 8..i * 8 + 8]);
            *field = u64::from_le_bytes(buf);
        }
        Ok(Self {
            routing_table: fields[0],
            discovery_nodes: fields[1],
            cluster_blocks: fields[2],
            cluster_state_customs: fields[3],
            coordination_metadata: fields[4],
            settings_metadata: fields[5],
            transient_settings_metadata: fields[6],
            templates_metadata: fields[7],
            custom_metadata_map: fields[8],
            hashes_of_consistent_settings: fields[9],
            indices_metadata: fields[10],
            cluster_state_checksum: fields[11],
        })
    }
}

/// Canonical 64-bit hash of any serializable value. Round-tripping through
/// `serde_json::Value` sorts map keys, so equal maps hash equally regardless
/// of insertion order. Sets must be sorted by the caller before hashing.
fn hash64<T: Serialize>(value: &T) -> Result<u64, ChecksumError> {
    let canonical = serde_json::to_value(value)?;
    let encoded = serde_json::to_vec(&canonical)?;
    let digest = Sha256::digest(&encoded);
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&digest[..8]);
    Ok(u64::from_le_bytes(buf))
}

/// Commutative combine over map entries. Each entry is hashed with the
/// component label so equal (key, value) pairs in different components do
/// not produce correlated checksums.
fn unordered_map_checksum<V: Serialize>(
    label: &str,
    map: &HashMap<String, V>,
) -> Result<u64, ChecksumError> {
    let mut combined = 0u64;
    for (key, value) in map {
        combined ^= hash64(&(label, key, value))?;
    }
    Ok(combined)
}

/// Sequential hash over the canonical routing walk: index names ascending,
/// shard ids ascending within each index.
fn routing_table_checksum(state: &ClusterState) -> Result<u64, ChecksumError> {
    let table = &state.routing_table;
    let mut sha = Sha256::new();
    for name in table.sorted_index_names() {
        let Some(index) = table.index(name) else {
            continue;
        };
        sha.update(name.as_bytes());
        sha.update(index.index_uuid.as_bytes());
        for shard_id in index.sorted_shard_ids() {
            sha.update(shard_id.to_le_bytes());
            if let Some(copies) = index.shard(shard_id) {
                sha.update(serde_json::to_vec(copies)?);
            }
        }
    }
    let digest = sha.finalize();
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&digest[..8]);
    Ok(u64::from_le_bytes(buf))
}

fn discovery_nodes_checksum(nodes: &DiscoveryNodes) -> Result<u64, ChecksumError> {
    let mut combined = unordered_map_checksum(DISCOVERY_NODES, &nodes.nodes)?;
    combined ^= hash64(&(DISCOVERY_NODES, "cluster_manager_node_id", &nodes.cluster_manager_node_id))?;
    Ok(combined)
}

fn cluster_blocks_checksum(blocks: &ClusterBlocks) -> Result<u64, ChecksumError> {
    let mut combined = 0u64;
    for block in blocks.global.values() {
        combined ^= hash64(&(CLUSTER_BLOCKS, "global", block))?;
    }
    for (index, ids) in &blocks.indices {
        let mut sorted: Vec<u32> = ids.iter().copied().collect();
        sorted.sort_unstable();
        combined ^= hash64(&(CLUSTER_BLOCKS, "index", index, sorted))?;
    }
    Ok(combined)
}

fn coordination_checksum(coordination: &CoordinationMetadata) -> Result<u64, ChecksumError> {
    let mut voting: Vec<&str> = coordination.voting_nodes.iter().map(String::as_str).collect();
    voting.sort_unstable();
    hash64(&(COORDINATION_METADATA, coordination.term, voting))
}

/// Templates are positional; their checksum must change when they reorder.
fn templates_checksum(state: &ClusterState) -> Result<u64, ChecksumError> {
    let mut sha = Sha256::new();
    for template in &state.metadata.templates {
        let canonical = serde_json::to_value(template)?;
        sha.update(serde_json::to_vec(&canonical)?);
    }
    let digest = sha.finalize();
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&digest[..8]);
    Ok(u64::from_le_bytes(buf))
}
