//! Persistence for asset records.
//!
//! Replaces are tracked with two columns. `generation` counts committed
//! replaces and guards the commit like an optimistic version.
//! `pending_generation` is written before storage is purged and cleared by
//! the commit, so a row that still carries it after its lease expired
//! describes a replace that never finished.

mod memory;
mod postgres;

pub use memory::MemoryMetadataStore;
pub use postgres::PostgresMetadataStore;

use crate::asset::{Asset, NewAsset, UploadedFiles};
use crate::error::AssetError;
use crate::reconcile::AssetPatch;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AssetMetadataStore: Send + Sync {
    /// Fetch one asset; [`AssetError::AssetNotFound`] when missing
    async fn get(&self, id: i64) -> Result<Asset, AssetError>;

    /// Every asset attached to `object_id`, oldest first
    async fn list_by_object(&self, object_id: i64) -> Result<Vec<Asset>, AssetError>;

    async fn insert(&self, asset: NewAsset) -> Result<Asset, AssetError>;

    /// Remove the row and return it. Stored files are left in place.
    async fn delete(&self, id: i64) -> Result<Asset, AssetError>;

    /// Apply an update in one statement and return the new row
    async fn apply_patch(&self, id: i64, patch: &AssetPatch) -> Result<Asset, AssetError>;

    /// Take the replace lease and write the pending marker.
    ///
    /// Fails with [`AssetError::Conflict`] when the generation moved or a
    /// lease newer than `stale_before` is still held.
    async fn begin_replace(
        &self,
        id: i64,
        expected_generation: i64,
        stale_before: DateTime<Utc>,
    ) -> Result<i64, AssetError>;

    /// Write the URLs of a finished replace, bump the generation and clear
    /// the marker
    async fn commit_replacement(
        &self,
        id: i64,
        expected_generation: i64,
        files: &UploadedFiles,
    ) -> Result<Asset, AssetError>;

    /// Give up the lease of a failed replace; the pending marker stays
    async fn abandon_replace(&self, id: i64) -> Result<(), AssetError>;

    /// Rows whose replace was started and never committed
    async fn list_interrupted_replacements(
        &self,
        stale_before: DateTime<Utc>,
    ) -> Result<Vec<Asset>, AssetError>;

    /// Connectivity check for readiness probes
    async fn ping(&self) -> Result<(), AssetError>;
}

#[async_trait]
impl<T: AssetMetadataStore + ?Sized> AssetMetadataStore for Arc<T> {
    async fn get(&self, id: i64) -> Result<Asset, AssetError> {
        (**self).get(id).await
    }

    async fn list_by_object(&self, object_id: i64) -> Result<Vec<Asset>, AssetError> {
        (**self).list_by_object(object_id).await
    }

    async fn insert(&self, asset: NewAsset) -> Result<Asset, AssetError> {
        (**self).insert(asset).await
    }

    async fn delete(&self, id: i64) -> Result<Asset, AssetError> {
        (**self).delete(id).await
    }

    async fn apply_patch(&self, id: i64, patch: &AssetPatch) -> Result<Asset, AssetError> {
        (**self).apply_patch(id, patch).await
    }

    async fn begin_replace(
        &self,
        id: i64,
        expected_generation: i64,
        stale_before: DateTime<Utc>,
    ) -> Result<i64, AssetError> {
        (**self)
            .begin_replace(id, expected_generation, stale_before)
            .await
    }

    async fn commit_replacement(
        &self,
        id: i64,
        expected_generation: i64,
        files: &UploadedFiles,
    ) -> Result<Asset, AssetError> {
        (**self)
            .commit_replacement(id, expected_generation, files)
            .await
    }

    async fn abandon_replace(&self, id: i64) -> Result<(), AssetError> {
        (**self).abandon_replace(id).await
    }

    async fn list_interrupted_replacements(
        &self,
        stale_before: DateTime<Utc>,
    ) -> Result<Vec<Asset>, AssetError> {
        (**self).list_interrupted_replacements(stale_before).await
    }

    async fn ping(&self) -> Result<(), AssetError> {
        (**self).ping().await
    }
}
