//! Error types for Verdant

use thiserror::Error;

/// Main error type for Verdant hub operations
#[derive(Error, Debug)]
pub enum HubError {
    /// An AppWrapper with the same job id was already submitted
    #[error("duplicate job id: {0}")]
    DuplicateJobId(String),

    /// The requested AppWrapper does not exist
    #[error("appwrapper not found: {0}")]
    NotFound(String),

    /// The target cluster is not registered with the hub
    #[error("unknown cluster: {0}")]
    UnknownCluster(String),

    /// An update would violate an AppWrapper lifecycle invariant
    #[error("invalid transition for {job_id}: {reason}")]
    InvalidTransition { job_id: String, reason: String },

    /// Submitted data failed validation
    #[error("validation error: {0}")]
    Validation(String),

    /// Dispatch to a Spoke cluster failed
    #[error("dispatch error: {0}")]
    Dispatch(String),

    /// I/O error wrapper
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias for Verdant hub operations
pub type Result<T> = std::result::Result<T, HubError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = HubError::DuplicateJobId("job-1".to_string());
        assert_eq!(format!("{}", err), "duplicate job id: job-1");
    }

    #[test]
    fn test_invalid_transition_display() {
        let err = HubError::InvalidTransition {
            job_id: "job-2".to_string(),
            reason: "gate re-closed after dispatch".to_string(),
        };
        assert!(format!("{}", err).contains("job-2"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let hub_err: HubError = io_err.into();
        assert!(matches!(hub_err, HubError::Io(_)));
    }
}
