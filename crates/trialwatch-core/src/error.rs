//! Error taxonomy for the synchronization core.

use thiserror::Error;

use crate::api::ApiError;
use crate::cache::StorageError;

#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or server failure that survived the retry budget.
    #[error("Catalog unavailable after {attempts} attempts: {source}")]
    TransientFetch {
        attempts: u32,
        #[source]
        source: ApiError,
    },

    #[error("Maximum number of favorites ({max}) reached")]
    CapacityExceeded { max: usize },

    #[error("Failed to persist {key}: {source}")]
    Persistence {
        key: String,
        #[source]
        source: StorageError,
    },

    #[error("Study not found: {0}")]
    NotFound(String),

    #[error("Invalid catalog response: {0}")]
    InvalidResponse(String),

    #[error("Polling was stopped before it started")]
    Cancelled,
}

impl SyncError {
    /// Classify a gateway failure once retrying has stopped.
    pub fn from_api(err: ApiError, attempts: u32, id: Option<&str>) -> Self {
        match err {
            ApiError::NotFound(body) => {
                SyncError::NotFound(id.map(str::to_string).unwrap_or(body))
            }
            e if e.is_transient() => SyncError::TransientFetch { attempts, source: e },
            e => SyncError::InvalidResponse(e.to_string()),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, SyncError::TransientFetch { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_api_not_found_uses_id() {
        let err = SyncError::from_api(ApiError::NotFound("body".to_string()), 1, Some("NCT1"));
        assert!(matches!(err, SyncError::NotFound(ref id) if id == "NCT1"));
    }

    #[test]
    fn test_from_api_transient() {
        let err = SyncError::from_api(ApiError::ServerError("502".to_string()), 3, None);
        assert!(err.is_transient());
        assert!(err.to_string().contains("3 attempts"));
    }

    #[test]
    fn test_from_api_permanent() {
        let err = SyncError::from_api(ApiError::Unauthorized, 1, None);
        assert!(matches!(err, SyncError::InvalidResponse(_)));
    }

    #[test]
    fn test_capacity_message() {
        let err = SyncError::CapacityExceeded { max: 10 };
        assert_eq!(err.to_string(), "Maximum number of favorites (10) reached");
    }
}
