// 🚨 Error taxonomy for the analysis pipeline
//
// UserNotFound surfaces to the caller, UpstreamUnavailable is retryable,
// webhook failures never leave the orchestrator.

use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("User not found with account_no: {account_no} and bank_code: {bank_code}")]
    UserNotFound {
        account_no: String,
        bank_code: String,
    },

    #[error("No analysis results found for user {user_id}")]
    ResultNotFound { user_id: Uuid },

    #[error("Backing store unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Unreachable given clamping and neutral defaults; signals a bug.
    #[error("Computation error: {0}")]
    Computation(String),

    #[error("Webhook delivery failed: {0}")]
    Webhook(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AnalysisError {
    pub fn upstream(err: impl std::fmt::Display) -> Self {
        AnalysisError::UpstreamUnavailable(err.to_string())
    }

    /// Whether the caller may re-invoke the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AnalysisError::UpstreamUnavailable(_) | AnalysisError::Webhook(_)
        )
    }
}

impl From<rusqlite::Error> for AnalysisError {
    fn from(err: rusqlite::Error) -> Self {
        AnalysisError::upstream(err)
    }
}

pub type RiskResult<T> = Result<T, AnalysisError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_not_found_message() {
        let err = AnalysisError::UserNotFound {
            account_no: "123456789".to_string(),
            bank_code: "HDFC0001234".to_string(),
        };

        let msg = err.to_string();
        assert!(msg.contains("123456789"));
        assert!(msg.contains("HDFC0001234"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_upstream_is_retryable() {
        let err: AnalysisError = rusqlite::Error::InvalidQuery.into();
        assert!(matches!(err, AnalysisError::UpstreamUnavailable(_)));
        assert!(err.is_retryable());
    }
}
