use thiserror::Error;

/// Errors raised by an object store backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Object {0} already exists")]
    AlreadyExists(String),

    #[error("Object {0} not found")]
    NotFound(String),

    #[error("Failed to write object {key}: {message}")]
    Write { key: String, message: String },

    #[error("Failed to read object {key}: {message}")]
    Read { key: String, message: String },

    #[error("Failed to list objects under {prefix}: {message}")]
    List { prefix: String, message: String },

    #[error("Failed to remove object {key}: {message}")]
    Remove { key: String, message: String },

    #[error("Failed to presign upload for {key}: {message}")]
    Presign { key: String, message: String },
}

impl StorageError {
    pub fn write(key: &str, message: impl ToString) -> Self {
        Self::Write {
            key: key.to_string(),
            message: message.to_string(),
        }
    }

    pub fn remove(key: &str, message: impl ToString) -> Self {
        Self::Remove {
            key: key.to_string(),
            message: message.to_string(),
        }
    }
}
