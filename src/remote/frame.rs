use crate::remote::blob::{BlobPath, Compressor};
use crate::routing::diff::RoutingTableDiff;
use crc32fast::Hasher as Crc32Hasher;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Path token the diff blobs live under, below the cluster-state container.
pub const ROUTING_TABLE_DIFF_PATH_TOKEN: &str = "routing-table-diff";
/// Fixed file-name prefix of every diff blob.
pub const ROUTING_TABLE_DIFF_FILE_PREFIX: &str = "routing-table-diff";
/// Component type recorded in the manifest for uploaded diffs.
pub const ROUTING_TABLE_DIFF_COMPONENT: &str = "routing_table_diff";

const PREFIX_DELIMITER: &str = "--";
const NAME_DELIMITER: &str = "__";

const FRAME_MAGIC: [u8; 4] = *b"RKDF";
const FRAME_FORMAT_VERSION: u16 = 1;
const HEADER_FIXED_LEN: usize = 4 + 2 + 8 + 8 + 2 + 4;
const TRAILER_LEN: usize = 4;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame has no diff payload to serialize")]
    MissingPayload,
    #[error("diff payload serialization failed: {0}")]
    Serialization(#[source] serde_json::Error),
    #[error("corrupt frame: {detail}")]
    CorruptFrame { detail: String },
    #[error("unsupported frame format version {found}")]
    UnsupportedVersion { found: u16 },
    #[error("illegal frame state transition {from:?} -> {to:?}")]
    IllegalTransition { from: FrameState, to: FrameState },
    #[error("inverted coordinate is not a fixed-width decimal: {token}")]
    MalformedCoordinate { token: String },
}

impl FrameError {
    fn corrupt(detail: impl Into<String>) -> Self {
        FrameError::CorruptFrame {
            detail: detail.into(),
        }
    }
}

/// `u64::MAX - x`: monotonically increasing coordinates become
/// monotonically decreasing ones, so newer blobs sort first.
pub fn invert_u64(value: u64) -> u64 {
    u64::MAX - value
}

/// Format contract: inverted coordinates render as zero-padded 20-digit
/// decimal so lexicographic and numeric order always coincide. Changing
/// this breaks cross-version blob listings.
pub fn format_inverted(value: u64) -> String {
    format!("{:020}", invert_u64(value))
}

/// Recovers the original coordinate from one blob-name token.
pub fn parse_inverted(token: &str) -> Result<u64, FrameError> {
    if token.len() != 20 {
        return Err(FrameError::MalformedCoordinate {
            token: token.to_string(),
        });
    }
    let inverted: u64 = token
        .parse()
        .map_err(|_| FrameError::MalformedCoordinate {
            token: token.to_string(),
        })?;
    Ok(invert_u64(inverted))
}

/// Lifecycle of one frame through the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    New,
    Named,
    Serialized,
    InFlight,
    Done,
    Failed,
}

impl FrameState {
    fn is_legal(self, to: FrameState) -> bool {
        use FrameState::*;
        matches!(
            (self, to),
            (New, Named)
                | (Named, Serialized)
                | (Serialized, Serialized)
                | (Serialized, InFlight)
                | (InFlight, Done)
                | (InFlight, Failed)
                | (Failed, Named)
                | (Done, Named)
        )
    }
}

/// On-the-wire unit for one routing table diff.
///
/// Upload mode carries the diff and derives its blob name on first request;
/// download mode carries the blob name and gains the diff on deserialize.
/// The generated name is cached, so repeated naming is idempotent within the
/// frame's lifetime.
#[derive(Debug)]
pub struct DiffFrame {
    cluster_uuid: String,
    term: u64,
    version: u64,
    diff: Option<RoutingTableDiff>,
    blob_file_name: Option<String>,
    full_blob_name: Option<String>,
    state: FrameState,
}

impl DiffFrame {
    pub fn for_upload(
        diff: RoutingTableDiff,
        cluster_uuid: impl Into<String>,
        term: u64,
        version: u64,
    ) -> Self {
        Self {
            cluster_uuid: cluster_uuid.into(),
            term,
            version,
            diff: Some(diff),
            blob_file_name: None,
            full_blob_name: None,
            state: FrameState::New,
        }
    }

    /// Term and version are taken from the frame header once the blob is
    /// deserialized.
    pub fn for_download(full_blob_name: impl Into<String>, cluster_uuid: impl Into<String>) -> Self {
        let full_blob_name = full_blob_name.into();
        let (_, file_name) = BlobPath::split(&full_blob_name);
        Self {
            cluster_uuid: cluster_uuid.into(),
            term: 0,
            version: 0,
            diff: None,
            blob_file_name: Some(file_name),
            full_blob_name: Some(full_blob_name),
            state: FrameState::Named,
        }
    }

    pub fn cluster_uuid(&self) -> &str {
        &self.cluster_uuid
    }

    pub fn term(&self) -> u64 {
        self.term
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn diff(&self) -> Option<&RoutingTableDiff> {
        self.diff.as_ref()
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn full_blob_name(&self) -> Option<&str> {
        self.full_blob_name.as_deref()
    }

    fn transition(&mut self, to: FrameState) -> Result<(), FrameError> {
        if !self.state.is_legal(to) {
            return Err(FrameError::IllegalTransition {
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }

    /// Derives (once) and returns the blob file name:
    /// `<prefix>--<inv(term)>__<inv(version)>__<inv(timestamp_ms)>`.
    pub fn blob_file_name(&mut self) -> Result<&str, FrameError> {
        if self.blob_file_name.is_none() {
            let name = format!(
                "{}{}{}{}{}{}{}",
                ROUTING_TABLE_DIFF_FILE_PREFIX,
                PREFIX_DELIMITER,
                format_inverted(self.term),
                NAME_DELIMITER,
                format_inverted(self.version),
                NAME_DELIMITER,
                format_inverted(current_time_ms()),
            );
            self.blob_file_name = Some(name);
            self.transition(FrameState::Named)?;
        }
        Ok(self.blob_file_name.as_deref().unwrap_or_default())
    }

    /// Records the container the blob was (or will be) uploaded into.
    pub fn set_blob_container(&mut self, container: &BlobPath) -> Result<(), FrameError> {
        let file_name = self.blob_file_name()?.to_string();
        self.full_blob_name = Some(container.blob_path(&file_name));
        Ok(())
    }

    /// Rewinds a finished or failed frame to `Named` so it can be
    /// re-serialized and re-uploaded under its cached name.
    pub fn reset_for_retry(&mut self) -> Result<(), FrameError> {
        self.transition(FrameState::Named)
    }

    pub fn mark_in_flight(&mut self) -> Result<(), FrameError> {
        self.transition(FrameState::InFlight)
    }

    pub fn mark_done(&mut self) -> Result<(), FrameError> {
        self.transition(FrameState::Done)
    }

    pub fn mark_failed(&mut self) -> Result<(), FrameError> {
        self.transition(FrameState::Failed)
    }

    /// Wraps the diff payload in the self-checksummed codec frame, then
    /// hands the result to the compressor.
    pub fn serialize(&mut self, compressor: &dyn Compressor) -> Result<Vec<u8>, FrameError> {
        if self.state == FrameState::New {
            self.blob_file_name()?;
        }
        let diff = self.diff.as_ref().ok_or(FrameError::MissingPayload)?;
        let payload = serde_json::to_vec(diff).map_err(FrameError::Serialization)?;
        let uuid = self.cluster_uuid.as_bytes();

        let mut bytes =
            Vec::with_capacity(HEADER_FIXED_LEN + uuid.len() + payload.len() + TRAILER_LEN);
        bytes.extend_from_slice(&FRAME_MAGIC);
        bytes.extend_from_slice(&FRAME_FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&self.term.to_le_bytes());
        bytes.extend_from_slice(&self.version.to_le_bytes());
        bytes.extend_from_slice(&(uuid.len() as u16).to_le_bytes());
        bytes.extend_from_slice(uuid);
        bytes.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&payload);

        let mut crc = Crc32Hasher::new();
        crc.update(&bytes);
        bytes.extend_from_slice(&crc.finalize().to_le_bytes());

        self.transition(FrameState::Serialized)?;
        Ok(compressor.compress(&bytes))
    }

    /// Validates magic, format version, lengths, and trailing checksum, then
    /// decodes the diff payload and records it on the frame.
    pub fn deserialize(
        &mut self,
        bytes: &[u8],
        compressor: &dyn Compressor,
    ) -> Result<RoutingTableDiff, FrameError> {
        let bytes = if compressor.is_compressed(bytes) {
            compressor
                .uncompress(bytes)
                .map_err(|err| FrameError::corrupt(format!("uncompress failed: {err}")))?
        } else {
            bytes.to_vec()
        };

        if bytes.len() < HEADER_FIXED_LEN + TRAILER_LEN {
            return Err(FrameError::corrupt("frame too short"));
        }
        let (body, trailer) = bytes.split_at(bytes.len() - TRAILER_LEN);
        let mut crc = Crc32Hasher::new();
        crc.update(body);
        let expected = u32::from_le_bytes(
            trailer
                .try_into()
                .map_err(|_| FrameError::corrupt("truncated checksum trailer"))?,
        );
        if crc.finalize() != expected {
            return Err(FrameError::corrupt("checksum mismatch"));
        }

        let mut cursor = 0usize;
        if body[..4] != FRAME_MAGIC {
            return Err(FrameError::corrupt("bad magic"));
        }
        cursor += 4;
        let format = u16::from_le_bytes(
            body[cursor..cursor + 2]
                .try_into()
                .map_err(|_| FrameError::corrupt("truncated format version"))?,
        );
        if format != FRAME_FORMAT_VERSION {
            return Err(FrameError::UnsupportedVersion { found: format });
        }
        cursor += 2;
        let term = read_u64(body, &mut cursor)?;
        let version = read_u64(body, &mut cursor)?;
        let uuid_len = u16::from_le_bytes(
            body[cursor..cursor + 2]
                .try_into()
                .map_err(|_| FrameError::corrupt("truncated uuid length"))?,
        ) as usize;
        cursor += 2;
        if cursor + uuid_len + 4 > body.len() {
            return Err(FrameError::corrupt("uuid overruns frame"));
        }
        let uuid = std::str::from_utf8(&body[cursor..cursor + uuid_len])
            .map_err(|_| FrameError::corrupt("uuid is not utf-8"))?;
        if uuid != self.cluster_uuid {
            return Err(FrameError::corrupt(format!(
                "cluster uuid mismatch: frame has {uuid}, expected {}",
                self.cluster_uuid
            )));
        }
        cursor += uuid_len;
        let payload_len = u32::from_le_bytes(
            body[cursor..cursor + 4]
                .try_into()
                .map_err(|_| FrameError::corrupt("truncated payload length"))?,
        ) as usize;
        cursor += 4;
        if cursor + payload_len != body.len() {
            return Err(FrameError::corrupt("payload length mismatch"));
        }

        let diff: RoutingTableDiff = serde_json::from_slice(&body[cursor..])
            .map_err(|err| FrameError::corrupt(format!("payload decode failed: {err}")))?;
        self.term = term;
        self.version = version;
        self.diff = Some(diff.clone());
        Ok(diff)
    }
}

fn read_u64(bytes: &[u8], cursor: &mut usize) -> Result<u64, FrameError> {
    let end = *cursor + 8;
    if end > bytes.len() {
        return Err(FrameError::corrupt("truncated u64 field"));
    }
    let value = u64::from_le_bytes(
        bytes[*cursor..end]
            .try_into()
            .map_err(|_| FrameError::corrupt("truncated u64 field"))?,
    );
    *cursor = end;
    Ok(value)
}

fn current_time_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
