use super::{url_path, ObjectStore, RemoveReport, StorageError};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
struct StoredObject {
    body: Bytes,
    content_type: String,
}

/// In-memory object store.
///
/// Backs local development runs (`storage.backend = "memory"`) and the
/// pipeline tests. Failures can be injected per key suffix to exercise the
/// partial-failure paths.
#[derive(Clone)]
pub struct MemoryObjectStore {
    base_url: String,
    objects: Arc<Mutex<BTreeMap<String, StoredObject>>>,
    failing_puts: Arc<Mutex<HashSet<String>>>,
    failing_removes: Arc<Mutex<HashSet<String>>>,
    put_delay: Arc<Mutex<Option<Duration>>>,
}

impl MemoryObjectStore {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            objects: Arc::new(Mutex::new(BTreeMap::new())),
            failing_puts: Arc::new(Mutex::new(HashSet::new())),
            failing_removes: Arc::new(Mutex::new(HashSet::new())),
            put_delay: Arc::new(Mutex::new(None)),
        }
    }

    /// Make every put whose key ends with `suffix` fail
    pub fn fail_puts_ending_with(&self, suffix: &str) {
        self.failing_puts.lock().insert(suffix.to_string());
    }

    /// Make every removal whose key ends with `suffix` fail
    pub fn fail_removes_ending_with(&self, suffix: &str) {
        self.failing_removes.lock().insert(suffix.to_string());
    }

    /// Make every put wait `delay` before it lands, like a slow upload
    pub fn delay_puts(&self, delay: Duration) {
        *self.put_delay.lock() = Some(delay);
    }

    /// Snapshot of every stored key, sorted
    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().keys().cloned().collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().contains_key(key)
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        self.objects.lock().get(key).map(|o| o.content_type.clone())
    }

    fn matches_any(set: &Mutex<HashSet<String>>, key: &str) -> bool {
        set.lock().iter().any(|suffix| key.ends_with(suffix.as_str()))
    }
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new("memory://assets")
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(
        &self,
        key: &str,
        body: Bytes,
        content_type: &str,
        overwrite: bool,
    ) -> Result<String, StorageError> {
        let delay = *self.put_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if Self::matches_any(&self.failing_puts, key) {
            return Err(StorageError::write(key, "injected failure"));
        }

        {
            let mut objects = self.objects.lock();
            if !overwrite && objects.contains_key(key) {
                return Err(StorageError::AlreadyExists(key.to_string()));
            }
            objects.insert(
                key.to_string(),
                StoredObject {
                    body,
                    content_type: content_type.to_string(),
                },
            );
        }

        debug!(key = %key, "[MEMORY] Object stored");
        Ok(self.public_url(key))
    }

    async fn get(&self, key: &str) -> Result<Bytes, StorageError> {
        self.objects
            .lock()
            .get(key)
            .map(|o| o.body.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        Ok(self
            .objects
            .lock()
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn remove_many(&self, keys: &[String]) -> RemoveReport {
        let mut report = RemoveReport::default();
        for key in keys {
            if Self::matches_any(&self.failing_removes, key) {
                report
                    .failed
                    .push((key.clone(), StorageError::remove(key, "injected failure")));
                continue;
            }
            // Removing an absent key is not an error, same as S3
            self.objects.lock().remove(key);
            report.removed.push(key.clone());
        }
        report
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, url_path(key))
    }

    async fn presign_upload(
        &self,
        key: &str,
        _expires_in: Duration,
    ) -> Result<String, StorageError> {
        Ok(format!("{}/upload/{}", self.base_url, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_put_without_overwrite_rejects_existing_key() {
        let store = MemoryObjectStore::default();
        assert_ok!(store.put("f/a.obj", Bytes::from_static(b"v1"), "x", false).await);

        let err = store
            .put("f/a.obj", Bytes::from_static(b"v2"), "x", false)
            .await
            .unwrap_err();
        assert_eq!(err, StorageError::AlreadyExists("f/a.obj".to_string()));

        assert_ok!(store.put("f/a.obj", Bytes::from_static(b"v2"), "x", true).await);
        assert_eq!(store.get("f/a.obj").await.unwrap(), Bytes::from_static(b"v2"));
    }

    #[tokio::test]
    async fn test_list_by_prefix_only_returns_folder() {
        let store = MemoryObjectStore::default();
        store.put("f1/a", Bytes::new(), "x", false).await.unwrap();
        store.put("f1/b", Bytes::new(), "x", false).await.unwrap();
        store.put("f2/a", Bytes::new(), "x", false).await.unwrap();

        let keys = store.list_by_prefix("f1/").await.unwrap();
        assert_eq!(keys, vec!["f1/a".to_string(), "f1/b".to_string()]);
    }

    #[tokio::test]
    async fn test_remove_many_continues_past_failures() {
        let store = MemoryObjectStore::default();
        for key in ["f/a", "f/b", "f/c"] {
            store.put(key, Bytes::new(), "x", false).await.unwrap();
        }
        store.fail_removes_ending_with("/b");

        let keys: Vec<String> = vec!["f/a".into(), "f/b".into(), "f/c".into()];
        let report = store.remove_many(&keys).await;

        assert_eq!(report.removed, vec!["f/a".to_string(), "f/c".to_string()]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.attempted(), 3);
        assert_eq!(store.keys(), vec!["f/b".to_string()]);
    }

    #[tokio::test]
    async fn test_injected_put_failure() {
        let store = MemoryObjectStore::default();
        store.fail_puts_ending_with(".png");
        assert_err!(store.put("f/t.png", Bytes::new(), "image/png", false).await);
        assert!(!store.contains("f/t.png"));
    }

    #[test]
    fn test_public_url() {
        let store = MemoryObjectStore::new("http://cdn.test/");
        assert_eq!(store.public_url("f/model.glb"), "http://cdn.test/f/model.glb");
        assert_eq!(
            store.public_url("f/bell tower.obj"),
            "http://cdn.test/f/bell%20tower.obj"
        );
    }
}
