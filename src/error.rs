use crate::domain::stage::PaymentStatus;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TrackError>;

/// All failures surfaced by the tracking core.
///
/// The first five variants are the contract with callers: each maps to one
/// machine-readable kind (see [`TrackError::kind`]). The remaining variants
/// carry infrastructure faults.
#[derive(Error, Debug)]
pub enum TrackError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("caller does not own this shipment")]
    Unauthorized,
    #[error("validation failed: {0}")]
    ValidationError(String),
    #[error("payment status cannot change from {from} to {to}")]
    InvalidTransition {
        from: PaymentStatus,
        to: PaymentStatus,
    },
    #[error("stage does not require payment")]
    PaymentNotRequired,
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

impl TrackError {
    /// Stable kind identifier for structured responses.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Unauthorized => "unauthorized",
            Self::ValidationError(_) => "validation_error",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::PaymentNotRequired => "payment_not_required",
            Self::IoError(_) | Self::JsonError(_) | Self::InternalError(_) => "internal",
        }
    }

    /// Collapses internal detail for unauthenticated (tracker-facing)
    /// operations: anything other than `NotFound` or `PaymentNotRequired`
    /// becomes a plain `NotFound`.
    pub fn redacted(self, entity: &'static str) -> Self {
        match self {
            e @ (Self::NotFound(_) | Self::PaymentNotRequired) => e,
            _ => Self::NotFound(entity),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_strings() {
        assert_eq!(TrackError::NotFound("stage").kind(), "not_found");
        assert_eq!(TrackError::Unauthorized.kind(), "unauthorized");
        assert_eq!(
            TrackError::ValidationError("x".into()).kind(),
            "validation_error"
        );
        assert_eq!(
            TrackError::PaymentNotRequired.kind(),
            "payment_not_required"
        );
    }

    #[test]
    fn test_redaction_hides_internal_kinds() {
        let redacted = TrackError::Unauthorized.redacted("shipment");
        assert!(matches!(redacted, TrackError::NotFound("shipment")));

        let kept = TrackError::PaymentNotRequired.redacted("stage");
        assert!(matches!(kept, TrackError::PaymentNotRequired));
    }
}
