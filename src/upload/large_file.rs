//! Large-file state
//!
//! Tracks one B2 large file through a single request. The handle is built
//! from what the caller echoes back (`fileId`, part number) and from what B2
//! reports; it is never stored between requests.

use super::digest::digests_match;
use super::UploadError;
use crate::b2::PartInfo;

/// Lifecycle of an upload as seen from one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadPhase {
    NotStarted,
    /// Large file exists at B2 and is accepting parts
    InProgress,
    /// The last declared part has been stored
    Finalizing,
    Complete,
}

/// A part B2 has stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartRecord {
    pub part_number: u32,
    pub content_sha1: String,
    pub content_length: u64,
}

impl From<PartInfo> for PartRecord {
    fn from(part: PartInfo) -> Self {
        Self {
            part_number: part.part_number,
            content_sha1: part.content_sha1,
            content_length: part.content_length,
        }
    }
}

/// A large file and the parts known for it
#[derive(Debug, Clone)]
pub struct LargeFileHandle {
    file_id: Option<String>,
    total_parts: u32,
    parts: Vec<PartRecord>,
    phase: UploadPhase,
}

impl LargeFileHandle {
    /// A handle for a file that has not been started at B2 yet
    pub fn new(total_parts: u32) -> Self {
        Self {
            file_id: None,
            total_parts,
            parts: Vec::new(),
            phase: UploadPhase::NotStarted,
        }
    }

    /// A handle for a file the caller says is already in progress
    pub fn resume(file_id: impl Into<String>, total_parts: u32) -> Self {
        Self {
            file_id: Some(file_id.into()),
            total_parts,
            parts: Vec::new(),
            phase: UploadPhase::InProgress,
        }
    }

    /// Record the id B2 assigned when the large file was started
    pub fn start(&mut self, file_id: impl Into<String>) {
        self.file_id = Some(file_id.into());
        self.phase = UploadPhase::InProgress;
    }

    pub fn file_id(&self) -> Option<&str> {
        self.file_id.as_deref()
    }

    pub fn total_parts(&self) -> u32 {
        self.total_parts
    }

    pub fn phase(&self) -> UploadPhase {
        self.phase
    }

    pub fn parts(&self) -> &[PartRecord] {
        &self.parts
    }

    /// Record a part accepted by B2; storing the last declared part moves
    /// the handle to `Finalizing`.
    pub fn record_part(&mut self, part: PartRecord) -> UploadPhase {
        if part.part_number == self.total_parts {
            self.phase = UploadPhase::Finalizing;
        }
        self.parts.retain(|p| p.part_number != part.part_number);
        self.parts.push(part);
        self.phase
    }

    /// Replace the known parts with B2's authoritative list
    pub fn replace_parts(&mut self, parts: impl IntoIterator<Item = PartRecord>) {
        self.parts = parts.into_iter().collect();
    }

    /// Digests for `b2_finish_large_file`, in part order.
    ///
    /// Parts must cover `1..=total_parts` exactly once each.
    pub fn finalize_digests(&self) -> Result<Vec<String>, UploadError> {
        let file_id = self.file_id.clone().unwrap_or_default();
        let incomplete = |reason: String| UploadError::IncompleteParts {
            file_id: file_id.clone(),
            reason,
        };

        if self.phase != UploadPhase::Finalizing {
            return Err(incomplete(format!(
                "last part {} has not been stored",
                self.total_parts
            )));
        }

        let mut parts: Vec<&PartRecord> = self.parts.iter().collect();
        parts.sort_by_key(|p| p.part_number);

        for (index, part) in parts.iter().enumerate() {
            let expected = index as u32 + 1;
            if part.part_number != expected {
                return Err(incomplete(if part.part_number < expected {
                    format!("part {} is listed more than once", part.part_number)
                } else {
                    format!("part {} is missing", expected)
                }));
            }
        }

        if parts.len() != self.total_parts as usize {
            return Err(incomplete(format!(
                "{} parts stored, {} declared",
                parts.len(),
                self.total_parts
            )));
        }

        Ok(parts.into_iter().map(|p| p.content_sha1.clone()).collect())
    }

    /// Check B2's stored digest for a part against the one we sent
    pub fn verify_part(&self, part_number: u32, sent_sha1: &str) -> Result<(), UploadError> {
        match self.parts.iter().find(|p| p.part_number == part_number) {
            Some(stored) if !digests_match(sent_sha1, &stored.content_sha1) => {
                Err(UploadError::DigestMismatch {
                    part_number,
                    sent: sent_sha1.to_string(),
                    stored: stored.content_sha1.clone(),
                })
            }
            _ => Ok(()),
        }
    }

    /// B2 accepted `b2_finish_large_file`
    pub fn complete(&mut self) {
        self.phase = UploadPhase::Complete;
    }
}
