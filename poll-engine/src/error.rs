//! Error types for the poll-engine crate.

/// Errors returned by an [`ItemFetcher`](crate::ItemFetcher).
///
/// Fetch errors are transient: the engine logs them, skips the owner for the
/// current cycle and retries naturally on the next tick.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    /// The remote endpoint could not be reached
    #[error("Network error: {0}")]
    Network(String),

    /// The remote endpoint answered with something we could not decode
    #[error("Decode error: {0}")]
    Decode(String),

    /// The remote endpoint did not answer in time
    #[error("Fetch timed out: {0}")]
    Timeout(String),

    /// The fetch was abandoned because the engine is stopping
    #[error("Fetch cancelled")]
    Cancelled,
}

/// Error returned by a [`PersistenceHook`](crate::PersistenceHook).
#[derive(Debug, Clone, thiserror::Error)]
#[error("Persistence failed: {0}")]
pub struct PersistError(pub String);

/// Errors from poll engine operations.
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    /// Invalid configuration provided
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Every batch for an owner failed; carries the last batch error
    #[error("All batches failed for {owner}: {source}")]
    AllBatchesFailed {
        /// The owner whose items could not be fetched
        owner: String,
        /// The error from the last failed batch
        #[source]
        source: FetchError,
    },
}

/// Convenience type alias for Results using PollError.
pub type Result<T> = std::result::Result<T, PollError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_display() {
        let error = FetchError::Network("connection refused".to_string());
        assert_eq!(error.to_string(), "Network error: connection refused");

        let error = FetchError::Timeout("5s".to_string());
        assert_eq!(error.to_string(), "Fetch timed out: 5s");

        assert_eq!(FetchError::Cancelled.to_string(), "Fetch cancelled");
    }

    #[test]
    fn test_all_batches_failed_keeps_source() {
        let error = PollError::AllBatchesFailed {
            owner: "Reactor1".to_string(),
            source: FetchError::Network("down".to_string()),
        };
        assert!(error.to_string().contains("Reactor1"));
        assert!(error.to_string().contains("Network error: down"));
        assert!(std::error::Error::source(&error).is_some());
    }
}
