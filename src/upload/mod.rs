//! Upload module
//!
//! Validates inbound upload requests and drives them against B2, either as a
//! single-shot upload or as one step of a large-file upload.

use crate::b2::B2Error;
use bytes::Bytes;
use thiserror::Error;

pub mod digest;
pub mod large_file;
pub mod orchestrator;

pub use large_file::{LargeFileHandle, PartRecord, UploadPhase};
pub use orchestrator::UploadOrchestrator;

/// Upload errors
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Payload is empty")]
    EmptyPayload,

    #[error("Part {part_number} is {size} bytes, below the {min_size} byte minimum for non-final parts")]
    PartTooSmall {
        part_number: u32,
        size: usize,
        min_size: usize,
    },

    #[error("Part number {part_number} is outside 1..={total_parts}")]
    InvalidPartNumber { part_number: u32, total_parts: u32 },

    #[error("fileId is required for part {0}")]
    MissingFileId(u32),

    #[error("B2 error: {0}")]
    Provider(#[from] B2Error),

    #[error("Digest mismatch for part {part_number}: sent {sent}, stored {stored}")]
    DigestMismatch {
        part_number: u32,
        sent: String,
        stored: String,
    },

    #[error("Cannot finish large file {file_id}: {reason}")]
    IncompleteParts { file_id: String, reason: String },
}

impl UploadError {
    /// Whether the caller sent something unusable (no B2 call was made)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            UploadError::MissingField(_)
                | UploadError::EmptyPayload
                | UploadError::PartTooSmall { .. }
                | UploadError::InvalidPartNumber { .. }
                | UploadError::MissingFileId(_)
        )
    }

    /// Short label for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            UploadError::MissingField(_) => "missing_field",
            UploadError::EmptyPayload => "empty_payload",
            UploadError::PartTooSmall { .. } => "part_too_small",
            UploadError::InvalidPartNumber { .. } => "invalid_part_number",
            UploadError::MissingFileId(_) => "missing_file_id",
            UploadError::Provider(_) => "provider",
            UploadError::DigestMismatch { .. } => "digest_mismatch",
            UploadError::IncompleteParts { .. } => "incomplete_parts",
        }
    }
}

/// One inbound upload: a whole file, or one chunk of a large file
#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    pub file_name: String,
    pub mime_type: Option<String>,
    pub payload: Bytes,
    /// 1-based chunk position; absent for single-shot uploads
    pub part_number: Option<u32>,
    /// Declared chunk count; zero means the caller did not send one
    pub total_parts: u32,
    /// Large-file id echoed back by the caller after part 1
    pub file_id: Option<String>,
}

/// What a validated request will do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadPlan {
    /// `total_parts == 1`: one upload call
    Single,
    /// One step of a large-file upload
    Part {
        part_number: u32,
        total_parts: u32,
        file_id: Option<String>,
    },
}

impl UploadPlan {
    pub fn mode(&self) -> &'static str {
        match self {
            UploadPlan::Single => "single",
            UploadPlan::Part { .. } => "large_file",
        }
    }
}

impl UploadRequest {
    /// Validate the request without touching the network.
    ///
    /// Non-final parts must carry at least `min_part_size` bytes; the final
    /// part may be smaller.
    pub fn plan(&self, min_part_size: usize) -> Result<UploadPlan, UploadError> {
        if self.file_name.trim().is_empty() {
            return Err(UploadError::MissingField("fileName"));
        }
        if self.total_parts == 0 {
            return Err(UploadError::MissingField("totalParts"));
        }
        if self.payload.is_empty() {
            return Err(UploadError::EmptyPayload);
        }

        if let Some(part_number) = self.part_number {
            if part_number == 0 || part_number > self.total_parts {
                return Err(UploadError::InvalidPartNumber {
                    part_number,
                    total_parts: self.total_parts,
                });
            }
        }

        if self.total_parts == 1 {
            return Ok(UploadPlan::Single);
        }

        let part_number = self
            .part_number
            .ok_or(UploadError::MissingField("partNumber"))?;

        let file_id = self
            .file_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string);

        if part_number > 1 && file_id.is_none() {
            return Err(UploadError::MissingFileId(part_number));
        }

        if part_number < self.total_parts && self.payload.len() < min_part_size {
            return Err(UploadError::PartTooSmall {
                part_number,
                size: self.payload.len(),
                min_size: min_part_size,
            });
        }

        Ok(UploadPlan::Part {
            part_number,
            total_parts: self.total_parts,
            file_id,
        })
    }
}

/// Result of handling one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// The whole file is stored at `file_url`
    Complete { file_name: String, file_url: String },
    /// An intermediate part was stored; the caller echoes `file_id` next time
    PartAccepted { file_id: String, part_number: u32 },
}
