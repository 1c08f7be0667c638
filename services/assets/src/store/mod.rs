//! Object store gateway.
//!
//! Every object belonging to an asset lives under `{folder_id}/{name}`. The
//! gateway exposes the handful of operations the ingestion and replace flows
//! need; which backend sits behind it is decided once at startup.

mod error;
pub mod memory;
pub mod s3;

pub use error::StorageError;
pub use memory::MemoryObjectStore;
pub use s3::S3ObjectStore;

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Content type used for model files and archive entries
pub const OPAQUE_CONTENT_TYPE: &str = "application/octet-stream";

/// Outcome of a best-effort bulk removal
#[derive(Debug, Default)]
pub struct RemoveReport {
    pub removed: Vec<String>,
    pub failed: Vec<(String, StorageError)>,
}

impl RemoveReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn attempted(&self) -> usize {
        self.removed.len() + self.failed.len()
    }
}

/// Durable key -> bytes store with folder scoped keys
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Write `body` at `key` and return its public URL.
    ///
    /// With `overwrite == false` an existing object at `key` is an error.
    async fn put(
        &self,
        key: &str,
        body: Bytes,
        content_type: &str,
        overwrite: bool,
    ) -> Result<String, StorageError>;

    /// Read the full object at `key`
    async fn get(&self, key: &str) -> Result<Bytes, StorageError>;

    /// Every key starting with `prefix`
    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    /// Remove each key independently; one failure never stops the others.
    async fn remove_many(&self, keys: &[String]) -> RemoveReport;

    /// Public URL for `key`. Pure, no I/O.
    fn public_url(&self, key: &str) -> String;

    /// URL a client can PUT `key` to directly
    async fn presign_upload(&self, key: &str, expires_in: Duration)
        -> Result<String, StorageError>;
}

#[async_trait]
impl<T: ObjectStore + ?Sized> ObjectStore for Arc<T> {
    async fn put(
        &self,
        key: &str,
        body: Bytes,
        content_type: &str,
        overwrite: bool,
    ) -> Result<String, StorageError> {
        (**self).put(key, body, content_type, overwrite).await
    }

    async fn get(&self, key: &str) -> Result<Bytes, StorageError> {
        (**self).get(key).await
    }

    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        (**self).list_by_prefix(prefix).await
    }

    async fn remove_many(&self, keys: &[String]) -> RemoveReport {
        (**self).remove_many(keys).await
    }

    fn public_url(&self, key: &str) -> String {
        (**self).public_url(key)
    }

    async fn presign_upload(
        &self,
        key: &str,
        expires_in: Duration,
    ) -> Result<String, StorageError> {
        (**self).presign_upload(key, expires_in).await
    }
}

/// Prefix shared by every object of one asset
pub fn folder_prefix(folder_id: Uuid) -> String {
    format!("{folder_id}/")
}

/// Key for `name` inside an asset folder
pub fn object_key(folder_id: Uuid, name: &str) -> String {
    format!("{folder_id}/{name}")
}

/// `key` as a URL path, each segment percent-encoded
pub fn url_path(key: &str) -> String {
    key.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Content type guessed from a file extension, for media uploads that did
/// not declare one
pub fn content_type_for(file_name: &str) -> &'static str {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "jpeg" | "jpg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "m4a" => "audio/mp4",
        "ogg" => "audio/ogg",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "zip" => "application/zip",
        _ => OPAQUE_CONTENT_TYPE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_key_is_folder_scoped() {
        let folder_id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(
            object_key(folder_id, "model.glb"),
            "550e8400-e29b-41d4-a716-446655440000/model.glb"
        );
        assert!(object_key(folder_id, "a.png").starts_with(&folder_prefix(folder_id)));
    }

    #[test]
    fn test_url_path_encodes_segments() {
        assert_eq!(url_path("f/model.glb"), "f/model.glb");
        assert_eq!(url_path("f/temple gate#2.png"), "f/temple%20gate%232.png");
        assert_eq!(url_path("f/a?b.obj"), "f/a%3Fb.obj");
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("marker.JPG"), "image/jpeg");
        assert_eq!(content_type_for("guide.mp3"), "audio/mpeg");
        assert_eq!(content_type_for("clip.mp4"), "video/mp4");
        assert_eq!(content_type_for("model.glb"), OPAQUE_CONTENT_TYPE);
        assert_eq!(content_type_for("no_extension"), OPAQUE_CONTENT_TYPE);
    }
}
