use super::AssetMetadataStore;
use crate::asset::{Asset, NewAsset, UploadedFiles};
use crate::error::AssetError;
use crate::reconcile::AssetPatch;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Default)]
struct Rows {
    last_id: i64,
    assets: BTreeMap<i64, Asset>,
}

/// Process-local asset records for tests and single-node development
#[derive(Clone, Default)]
pub struct MemoryMetadataStore {
    rows: Arc<Mutex<Rows>>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored assets
    pub fn len(&self) -> usize {
        self.rows.lock().assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn update<T>(
        &self,
        id: i64,
        f: impl FnOnce(&mut Asset) -> Result<T, AssetError>,
    ) -> Result<T, AssetError> {
        let mut rows = self.rows.lock();
        let asset = rows
            .assets
            .get_mut(&id)
            .ok_or(AssetError::AssetNotFound(id))?;
        f(asset)
    }
}

#[async_trait]
impl AssetMetadataStore for MemoryMetadataStore {
    async fn get(&self, id: i64) -> Result<Asset, AssetError> {
        self.rows
            .lock()
            .assets
            .get(&id)
            .cloned()
            .ok_or(AssetError::AssetNotFound(id))
    }

    async fn list_by_object(&self, object_id: i64) -> Result<Vec<Asset>, AssetError> {
        Ok(self
            .rows
            .lock()
            .assets
            .values()
            .filter(|asset| asset.object_id == object_id)
            .cloned()
            .collect())
    }

    async fn delete(&self, id: i64) -> Result<Asset, AssetError> {
        self.rows
            .lock()
            .assets
            .remove(&id)
            .ok_or(AssetError::AssetNotFound(id))
    }

    async fn insert(&self, asset: NewAsset) -> Result<Asset, AssetError> {
        let mut rows = self.rows.lock();
        if rows.assets.values().any(|a| a.folder_id == asset.folder_id) {
            return Err(AssetError::validation(format!(
                "Folder {} already belongs to an asset",
                asset.folder_id
            )));
        }

        rows.last_id += 1;
        let now = Utc::now();
        let row = Asset {
            id: rows.last_id,
            object_id: asset.object_id,
            folder_id: asset.folder_id,
            title: asset.title,
            description: asset.description,
            interaction_method: asset.interaction_method,
            model_url: asset.files.model_url,
            material_urls: asset.files.material_urls,
            thumbnail_image_url: asset.files.thumbnail_image_url,
            marker_image_url: asset.files.marker_image_url,
            audio_url: asset.files.audio_url,
            video_url: asset.files.video_url,
            generation: 0,
            pending_generation: None,
            pending_since: None,
            created_at: now,
            updated_at: now,
        };
        rows.assets.insert(row.id, row.clone());
        Ok(row)
    }

    async fn apply_patch(&self, id: i64, patch: &AssetPatch) -> Result<Asset, AssetError> {
        self.update(id, |asset| {
            *asset = patch.apply_to(asset);
            Ok(asset.clone())
        })
    }

    async fn begin_replace(
        &self,
        id: i64,
        expected_generation: i64,
        stale_before: DateTime<Utc>,
    ) -> Result<i64, AssetError> {
        self.update(id, |asset| {
            let leased = asset.pending_since.is_some_and(|since| since >= stale_before);
            if asset.generation != expected_generation || leased {
                return Err(AssetError::Conflict(id));
            }
            let pending = asset.generation + 1;
            asset.pending_generation = Some(pending);
            asset.pending_since = Some(Utc::now());
            Ok(pending)
        })
    }

    async fn commit_replacement(
        &self,
        id: i64,
        expected_generation: i64,
        files: &UploadedFiles,
    ) -> Result<Asset, AssetError> {
        self.update(id, |asset| {
            if asset.generation != expected_generation
                || asset.pending_generation != Some(expected_generation + 1)
            {
                return Err(AssetError::Conflict(id));
            }
            asset.model_url = files.model_url.clone();
            asset.material_urls = files.material_urls.clone();
            asset.thumbnail_image_url = files.thumbnail_image_url.clone();
            asset.marker_image_url = files.marker_image_url.clone();
            asset.audio_url = files.audio_url.clone();
            asset.video_url = files.video_url.clone();
            asset.generation += 1;
            asset.pending_generation = None;
            asset.pending_since = None;
            asset.updated_at = Utc::now();
            Ok(asset.clone())
        })
    }

    async fn abandon_replace(&self, id: i64) -> Result<(), AssetError> {
        self.update(id, |asset| {
            asset.pending_since = None;
            Ok(())
        })
    }

    async fn list_interrupted_replacements(
        &self,
        stale_before: DateTime<Utc>,
    ) -> Result<Vec<Asset>, AssetError> {
        Ok(self
            .rows
            .lock()
            .assets
            .values()
            .filter(|a| a.pending_generation.is_some())
            .filter(|a| a.pending_since.map_or(true, |since| since < stale_before))
            .cloned()
            .collect())
    }

    async fn ping(&self) -> Result<(), AssetError> {
        Ok(())
    }
}
