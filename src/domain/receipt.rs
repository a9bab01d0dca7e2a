use super::stage::Receipt;
use crate::error::{Result, TrackError};
use chrono::Utc;
use serde::Deserialize;

/// Content types accepted as payment evidence.
pub const ALLOWED_CONTENT_TYPES: &[&str] = &[
    "image/png",
    "image/jpeg",
    "image/webp",
    "application/pdf",
];

/// Maximum accepted evidence size.
pub const MAX_EVIDENCE_BYTES: usize = 5 * 1024 * 1024;

/// Raw evidence as received from a tracker, before validation.
#[derive(Debug, Deserialize, Clone)]
pub struct EvidenceFile {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl EvidenceFile {
    /// Validates the evidence against the allow-list and size cap and stamps
    /// it into a [`Receipt`]. Nothing is appended to a stage unless this
    /// succeeds.
    pub fn into_receipt(self) -> Result<Receipt> {
        if !ALLOWED_CONTENT_TYPES.contains(&self.content_type.as_str()) {
            return Err(TrackError::ValidationError(format!(
                "unsupported evidence content type: {}",
                self.content_type
            )));
        }
        if self.bytes.is_empty() {
            return Err(TrackError::ValidationError(
                "evidence file is empty".to_string(),
            ));
        }
        if self.bytes.len() > MAX_EVIDENCE_BYTES {
            return Err(TrackError::ValidationError(format!(
                "evidence file exceeds {} bytes",
                MAX_EVIDENCE_BYTES
            )));
        }
        Ok(Receipt {
            content_type: self.content_type,
            bytes: self.bytes,
            submitted_at: Utc::now(),
        })
    }
}
