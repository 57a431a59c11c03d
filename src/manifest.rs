use crate::checksum::ClusterStateChecksum;
use crate::state::ClusterFingerprint;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("manifest serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// One uploaded cluster-state component: what it is and where it landed.
/// This is the unit recorded in the manifest so a follower knows which blob
/// to fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedMetadata {
    pub component: String,
    pub uploaded_filename: String,
}

/// Per-index variant of [`UploadedMetadata`] for full index routing uploads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedIndexMetadata {
    pub index_name: String,
    pub component: String,
    pub uploaded_filename: String,
}

/// The published record naming the blobs that constitute one cluster-state
/// revision, plus the checksum set a follower validates against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterStateManifest {
    pub cluster_name: String,
    pub cluster_uuid: String,
    pub term: u64,
    pub version: u64,
    pub routing_table_diff: Option<UploadedMetadata>,
    pub indices_routing: Vec<UploadedIndexMetadata>,
    pub checksum: Option<ClusterStateChecksum>,
}

impl ClusterStateManifest {
    pub fn fingerprint(&self) -> ClusterFingerprint {
        ClusterFingerprint {
            cluster_name: self.cluster_name.clone(),
            cluster_uuid: self.cluster_uuid.clone(),
            term: self.term,
            version: self.version,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ManifestError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ManifestError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Combines the previous manifest's per-index routing entries with freshly
/// uploaded ones and drops deleted indices. Fresh uploads win over previous
/// entries for the same index. The result is sorted by index name so
/// manifests are deterministic.
pub fn merge_uploaded_indices(
    previous: &[UploadedIndexMetadata],
    uploaded: Vec<UploadedIndexMetadata>,
    deleted: &[String],
) -> Vec<UploadedIndexMetadata> {
    let mut merged: HashMap<String, UploadedIndexMetadata> = previous
        .iter()
        .map(|entry| (entry.index_name.clone(), entry.clone()))
        .collect();
    for entry in uploaded {
        merged.insert(entry.index_name.clone(), entry);
    }
    for index_name in deleted {
        merged.remove(index_name);
    }
    let mut result: Vec<UploadedIndexMetadata> = merged.into_values().collect();
    result.sort_by(|a, b| a.index_name.cmp(&b.index_name));
    result
}
