use super::AssetMetadataStore;
use crate::asset::{Asset, NewAsset, UploadedFiles};
use crate::config::DatabaseConfig;
use crate::error::AssetError;
use crate::reconcile::AssetPatch;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info, instrument};

const ASSET_COLUMNS: &str = r#"
    id, object_id, folder_id, title, description, interaction_method,
    model_url, material_urls, thumbnail_image_url, marker_image_url,
    audio_url, video_url, generation, pending_generation, pending_since,
    created_at, updated_at
"#;

/// Asset records in PostgreSQL
pub struct PostgresMetadataStore {
    pool: PgPool,
}

impl PostgresMetadataStore {
    /// Create a new metadata store with connection pool
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout())
            .idle_timeout(Some(config.idle_timeout()))
            .connect(&config.url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        info!("Connected to PostgreSQL database");

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;

        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl AssetMetadataStore for PostgresMetadataStore {
    async fn get(&self, id: i64) -> Result<Asset, AssetError> {
        let sql = format!("SELECT {ASSET_COLUMNS} FROM assets WHERE id = $1");

        sqlx::query_as::<_, Asset>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AssetError::AssetNotFound(id))
    }

    async fn list_by_object(&self, object_id: i64) -> Result<Vec<Asset>, AssetError> {
        let sql = format!("SELECT {ASSET_COLUMNS} FROM assets WHERE object_id = $1 ORDER BY id");

        let rows = sqlx::query_as::<_, Asset>(&sql)
            .bind(object_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: i64) -> Result<Asset, AssetError> {
        let sql = format!("DELETE FROM assets WHERE id = $1 RETURNING {ASSET_COLUMNS}");

        let row = sqlx::query_as::<_, Asset>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AssetError::AssetNotFound(id))?;

        debug!(asset_id = id, folder_id = %row.folder_id, "Asset record deleted");
        Ok(row)
    }

    #[instrument(skip(self, asset), fields(folder_id = %asset.folder_id, object_id = asset.object_id))]
    async fn insert(&self, asset: NewAsset) -> Result<Asset, AssetError> {
        let sql = format!(
            r#"
            INSERT INTO assets (
                object_id, folder_id, title, description, interaction_method,
                model_url, material_urls, thumbnail_image_url, marker_image_url,
                audio_url, video_url, created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5,
                $6, $7, $8, $9,
                $10, $11, NOW(), NOW()
            )
            RETURNING {ASSET_COLUMNS}
            "#
        );

        let row = sqlx::query_as::<_, Asset>(&sql)
            .bind(asset.object_id)
            .bind(asset.folder_id)
            .bind(&asset.title)
            .bind(&asset.description)
            .bind(asset.interaction_method.as_str())
            .bind(&asset.files.model_url)
            .bind(&asset.files.material_urls)
            .bind(&asset.files.thumbnail_image_url)
            .bind(&asset.files.marker_image_url)
            .bind(&asset.files.audio_url)
            .bind(&asset.files.video_url)
            .fetch_one(&self.pool)
            .await?;

        debug!(asset_id = row.id, "Asset record created");
        Ok(row)
    }

    #[instrument(skip(self, patch))]
    async fn apply_patch(&self, id: i64, patch: &AssetPatch) -> Result<Asset, AssetError> {
        // Each URL column takes a (touched, value) pair so untouched columns
        // keep whatever a concurrent replace committed.
        let sql = format!(
            r#"
            UPDATE assets SET
                title = $2,
                description = $3,
                interaction_method = $4,
                model_url = CASE WHEN $5 THEN $6 ELSE model_url END,
                material_urls = CASE WHEN $7 THEN $8 ELSE material_urls END,
                thumbnail_image_url = CASE WHEN $9 THEN $10 ELSE thumbnail_image_url END,
                marker_image_url = CASE WHEN $11 THEN $12 ELSE marker_image_url END,
                audio_url = CASE WHEN $13 THEN $14 ELSE audio_url END,
                video_url = CASE WHEN $15 THEN $16 ELSE video_url END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {ASSET_COLUMNS}
            "#
        );

        let materials = patch.material_urls.clone().unwrap_or_default();

        sqlx::query_as::<_, Asset>(&sql)
            .bind(id)
            .bind(&patch.title)
            .bind(&patch.description)
            .bind(patch.interaction_method.as_str())
            .bind(patch.model_url.touches())
            .bind(patch.model_url.value())
            .bind(patch.material_urls.is_some())
            .bind(&materials)
            .bind(patch.thumbnail_image_url.touches())
            .bind(patch.thumbnail_image_url.value())
            .bind(patch.marker_image_url.touches())
            .bind(patch.marker_image_url.value())
            .bind(patch.audio_url.touches())
            .bind(patch.audio_url.value())
            .bind(patch.video_url.touches())
            .bind(patch.video_url.value())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AssetError::AssetNotFound(id))
    }

    #[instrument(skip(self))]
    async fn begin_replace(
        &self,
        id: i64,
        expected_generation: i64,
        stale_before: DateTime<Utc>,
    ) -> Result<i64, AssetError> {
        let pending: Option<(i64,)> = sqlx::query_as(
            r#"
            UPDATE assets
            SET pending_generation = generation + 1,
                pending_since = NOW()
            WHERE id = $1
              AND generation = $2
              AND (pending_since IS NULL OR pending_since < $3)
            RETURNING pending_generation
            "#,
        )
        .bind(id)
        .bind(expected_generation)
        .bind(stale_before)
        .fetch_optional(&self.pool)
        .await?;

        pending.map(|(generation,)| generation).ok_or(AssetError::Conflict(id))
    }

    #[instrument(skip(self, files))]
    async fn commit_replacement(
        &self,
        id: i64,
        expected_generation: i64,
        files: &UploadedFiles,
    ) -> Result<Asset, AssetError> {
        let sql = format!(
            r#"
            UPDATE assets SET
                model_url = $3,
                material_urls = $4,
                thumbnail_image_url = $5,
                marker_image_url = $6,
                audio_url = $7,
                video_url = $8,
                generation = generation + 1,
                pending_generation = NULL,
                pending_since = NULL,
                updated_at = NOW()
            WHERE id = $1
              AND generation = $2
              AND pending_generation = $2 + 1
            RETURNING {ASSET_COLUMNS}
            "#
        );

        sqlx::query_as::<_, Asset>(&sql)
            .bind(id)
            .bind(expected_generation)
            .bind(&files.model_url)
            .bind(&files.material_urls)
            .bind(&files.thumbnail_image_url)
            .bind(&files.marker_image_url)
            .bind(&files.audio_url)
            .bind(&files.video_url)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AssetError::Conflict(id))
    }

    async fn abandon_replace(&self, id: i64) -> Result<(), AssetError> {
        sqlx::query("UPDATE assets SET pending_since = NULL WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_interrupted_replacements(
        &self,
        stale_before: DateTime<Utc>,
    ) -> Result<Vec<Asset>, AssetError> {
        let sql = format!(
            r#"
            SELECT {ASSET_COLUMNS} FROM assets
            WHERE pending_generation IS NOT NULL
              AND (pending_since IS NULL OR pending_since < $1)
            ORDER BY id
            "#
        );

        let rows = sqlx::query_as::<_, Asset>(&sql)
            .bind(stale_before)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn ping(&self) -> Result<(), AssetError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
