use super::{IndexRoutingTable, RoutingTable, ShardRouting};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DiffError {
    #[error("diff base mismatch on index {index}: {detail}")]
    BaseMismatch { index: String, detail: String },
}

impl DiffError {
    fn base_mismatch(index: &str, detail: impl Into<String>) -> Self {
        DiffError::BaseMismatch {
            index: index.to_string(),
            detail: detail.into(),
        }
    }
}

/// Per-index delta. No-op entries are never materialized, so a diff entry
/// always carries an actual change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexDiffEntry {
    Added(IndexRoutingTable),
    Removed,
    Updated(IndexRoutingDiff),
}

/// Shard-level delta for one index that exists on both sides: full
/// replacement sets for changed or new shards, removals for dropped ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRoutingDiff {
    pub index_uuid: String,
    upserts: HashMap<u32, Vec<ShardRouting>>,
    removals: Vec<u32>,
}

impl IndexRoutingDiff {
    fn compute(previous: &IndexRoutingTable, current: &IndexRoutingTable) -> Option<Self> {
        let mut upserts = HashMap::new();
        let mut removals = Vec::new();

        for (shard_id, copies) in current.shards() {
            if previous.shard(*shard_id) != Some(copies.as_slice()) {
                upserts.insert(*shard_id, copies.clone());
            }
        }
        for shard_id in previous.shards().keys() {
            if current.shard(*shard_id).is_none() {
                removals.push(*shard_id);
            }
        }
        removals.sort_unstable();

        if upserts.is_empty() && removals.is_empty() && previous.index_uuid == current.index_uuid {
            return None;
        }
        Some(Self {
            index_uuid: current.index_uuid.clone(),
            upserts,
            removals,
        })
    }

    fn apply(&self, index: &str, base: &IndexRoutingTable) -> Result<IndexRoutingTable, DiffError> {
        let mut result = base.clone();
        result.index_uuid = self.index_uuid.clone();
        for shard_id in &self.removals {
            if result.remove_shard(*shard_id).is_none() {
                return Err(DiffError::base_mismatch(
                    index,
                    format!("shard {shard_id} marked removed but absent from base"),
                ));
            }
        }
        for (shard_id, copies) in &self.upserts {
            result.set_shard(*shard_id, copies.clone());
        }
        Ok(result)
    }

    pub fn upserts(&self) -> &HashMap<u32, Vec<ShardRouting>> {
        &self.upserts
    }

    pub fn removals(&self) -> &[u32] {
        &self.removals
    }
}

/// Structural delta between two routing tables.
///
/// The delta depends only on the content of the two inputs, never on the
/// order entries were inserted, and applying it to the table it was computed
/// from reproduces the table it was computed to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingTableDiff {
    entries: HashMap<String, IndexDiffEntry>,
}

impl RoutingTableDiff {
    pub fn compute(previous: &RoutingTable, current: &RoutingTable) -> Self {
        let mut entries = HashMap::new();
        for (name, routing) in current.indices() {
            match previous.index(name) {
                None => {
                    entries.insert(name.clone(), IndexDiffEntry::Added(routing.clone()));
                }
                Some(prior) => {
                    if let Some(diff) = IndexRoutingDiff::compute(prior, routing) {
                        entries.insert(name.clone(), IndexDiffEntry::Updated(diff));
                    }
                }
            }
        }
        for name in previous.indices().keys() {
            if !current.contains_index(name) {
                entries.insert(name.clone(), IndexDiffEntry::Removed);
            }
        }
        Self { entries }
    }

    /// Reconstructs the target table from the base this diff was computed
    /// against. Fails fast on any evidence the base is not that table.
    pub fn apply(&self, base: &RoutingTable) -> Result<RoutingTable, DiffError> {
        let mut result = base.clone();
        for (name, entry) in &self.entries {
            match entry {
                IndexDiffEntry::Added(routing) => {
                    if result.contains_index(name) {
                        return Err(DiffError::base_mismatch(
                            name,
                            "marked added but already present in base",
                        ));
                    }
                    result.add_index(name.clone(), routing.clone());
                }
                IndexDiffEntry::Removed => {
                    if result.remove_index(name).is_none() {
                        return Err(DiffError::base_mismatch(
                            name,
                            "marked removed but absent from base",
                        ));
                    }
                }
                IndexDiffEntry::Updated(diff) => {
                    let prior = result.index(name).ok_or_else(|| {
                        DiffError::base_mismatch(name, "marked updated but absent from base")
                    })?;
                    let updated = diff.apply(name, prior)?;
                    result.add_index(name.clone(), updated);
                }
            }
        }
        Ok(result)
    }

    pub fn entries(&self) -> &HashMap<String, IndexDiffEntry> {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
