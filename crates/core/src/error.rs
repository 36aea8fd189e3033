use std::time::Duration;
use thiserror::Error;

/// Request-level failures. Anything that is not a validation problem aborts the
/// whole run without partial results.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AnalysisError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

/// Failure of one external collaborator for one ticker. Never fatal to a run.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("data unavailable for {ticker}: {reason}")]
    DataUnavailable { ticker: String, reason: String },

    #[error("model invocation failed: {0:#}")]
    ModelInvocation(anyhow::Error),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl ProviderError {
    pub fn data_unavailable(ticker: &str, reason: impl Into<String>) -> Self {
        Self::DataUnavailable {
            ticker: ticker.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_messages_name_the_cause() {
        let err = ProviderError::data_unavailable("TSLA", "empty price history");
        assert_eq!(err.to_string(), "data unavailable for TSLA: empty price history");

        let err = ProviderError::Timeout(Duration::from_secs(5));
        assert_eq!(err.to_string(), "timed out after 5s");
    }

    #[test]
    fn anyhow_errors_become_internal() {
        let err: AnalysisError = anyhow::anyhow!("boom").into();
        assert!(matches!(err, AnalysisError::Internal(_)));
        assert_eq!(err.to_string(), "boom");
    }
}
