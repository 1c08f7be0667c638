use crate::archive::ArchiveError;
use crate::store::StorageError;
use thiserror::Error;

/// Errors surfaced by ingestion, replace, and record updates
#[derive(Error, Debug)]
pub enum AssetError {
    #[error(transparent)]
    ArchiveFormat(#[from] ArchiveError),

    #[error("Failed to store {key}: {source}")]
    StorageWrite {
        key: String,
        #[source]
        source: StorageError,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Asset {0} not found")]
    AssetNotFound(i64),

    #[error("{failed} of {attempted} objects under {prefix} could not be removed")]
    PartialPurge {
        prefix: String,
        attempted: usize,
        failed: usize,
    },

    #[error("Asset {asset_id} storage no longer matches its record after {phase}: {reason}")]
    InconsistentState {
        asset_id: i64,
        phase: String,
        reason: String,
    },

    #[error("Asset {0} was modified by a concurrent replace")]
    Conflict(i64),

    #[error("{0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl AssetError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Stable code for API error bodies and metric labels
    pub fn code(&self) -> &'static str {
        match self {
            AssetError::ArchiveFormat(_) => "ARCHIVE_FORMAT",
            AssetError::StorageWrite { .. } => "STORAGE_WRITE",
            AssetError::Storage(_) => "STORAGE_ERROR",
            AssetError::AssetNotFound(_) => "NOT_FOUND",
            AssetError::PartialPurge { .. } => "PARTIAL_PURGE",
            AssetError::InconsistentState { .. } => "INCONSISTENT_STATE",
            AssetError::Conflict(_) => "CONFLICT",
            AssetError::Validation(_) => "INVALID_REQUEST",
            AssetError::Database(_) => "DATABASE_ERROR",
            AssetError::Task(_) => "INTERNAL_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(AssetError::AssetNotFound(4).code(), "NOT_FOUND");
        assert_eq!(AssetError::validation("x").code(), "INVALID_REQUEST");
        assert_eq!(
            AssetError::from(StorageError::NotFound("k".into())).code(),
            "STORAGE_ERROR"
        );
    }

    #[test]
    fn test_partial_purge_message() {
        let err = AssetError::PartialPurge {
            prefix: "f/".to_string(),
            attempted: 5,
            failed: 2,
        };
        assert_eq!(err.to_string(), "2 of 5 objects under f/ could not be removed");
    }
}
