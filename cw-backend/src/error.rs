use thiserror::Error;

pub type Result<T> = std::result::Result<T, BackendError>;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("query failed: {0}")]
    Query(String),

    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// Message fragments the backend emits when a resumable session id cannot be
/// found, typically because it was minted under a different working
/// directory. Matched case-insensitively.
const RESUME_MISMATCH_PATTERNS: &[&str] = &[
    "no conversation found with session",
    "session not found",
];

impl BackendError {
    /// True when the failure is a session-resume mismatch: the session id is
    /// stale for the current directory and should be cleared rather than
    /// reported as a hard error.
    pub fn is_resume_mismatch(&self) -> bool {
        let message = self.to_string().to_ascii_lowercase();
        RESUME_MISMATCH_PATTERNS
            .iter()
            .any(|pattern| message.contains(pattern))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resume_mismatch_is_detected_from_message_content() {
        let err = BackendError::Query(
            "No conversation found with session ID abc-123".to_string(),
        );
        assert!(err.is_resume_mismatch());
    }

    #[test]
    fn generic_failures_are_not_resume_mismatches() {
        let err = BackendError::Query("rate limited".to_string());
        assert!(!err.is_resume_mismatch());
        let err = BackendError::Unavailable("not configured".to_string());
        assert!(!err.is_resume_mismatch());
    }
}
