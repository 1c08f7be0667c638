//! Destructive re-ingestion of an existing asset, and record updates that
//! must not interleave with it.
//!
//! ```text
//! Idle -> Listing -> Purging -> Reingesting -> Committing -> Done
//!                       |            |              |
//!                       +-- (warn) --+----> Failed <+
//! ```
//!
//! A replace holds the folder's in-process lock for its whole run and a
//! lease on the row (see [`AssetMetadataStore::begin_replace`]) from just
//! before purging until commit. Purge failures only leave orphans behind.
//! Anything failing after the purge leaves the pending marker on the row,
//! which [`ReplaceCoordinator::audit_interrupted`] reports at startup.

use crate::asset::Asset;
use crate::error::AssetError;
use crate::metadata_store::AssetMetadataStore;
use crate::pipeline::{IngestOutcome, IngestRequest, IngestionPipeline, SkippedFile, WriteMode};
use crate::reconcile::{reconcile, ClearFlags, TextFields};
use crate::store::folder_prefix;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Step a replace is in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplacePhase {
    Idle,
    Listing,
    Purging,
    Reingesting,
    Committing,
    Done,
    Failed,
}

impl ReplacePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplacePhase::Idle => "idle",
            ReplacePhase::Listing => "listing",
            ReplacePhase::Purging => "purging",
            ReplacePhase::Reingesting => "reingesting",
            ReplacePhase::Committing => "committing",
            ReplacePhase::Done => "done",
            ReplacePhase::Failed => "failed",
        }
    }
}

impl fmt::Display for ReplacePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a committed replace
#[derive(Debug, Clone)]
pub struct ReplaceReport {
    pub asset: Asset,
    /// Keys removed from the folder before re-ingesting
    pub purged: Vec<String>,
    /// Keys that could not be removed and may now be orphaned
    pub purge_failed: Vec<String>,
    pub skipped: Vec<SkippedFile>,
}

/// Result of a record update
#[derive(Debug, Clone)]
pub struct UpdateReport {
    pub asset: Asset,
    pub skipped: Vec<SkippedFile>,
}

type FolderLock = Arc<tokio::sync::Mutex<()>>;

/// Runs replaces against the object store and the asset records
pub struct ReplaceCoordinator {
    pipeline: Arc<IngestionPipeline>,
    records: Arc<dyn AssetMetadataStore>,
    folder_locks: Mutex<HashMap<Uuid, FolderLock>>,
    lease: chrono::Duration,
}

impl ReplaceCoordinator {
    pub fn new(
        pipeline: Arc<IngestionPipeline>,
        records: Arc<dyn AssetMetadataStore>,
        lease: Duration,
    ) -> Self {
        Self {
            pipeline,
            records,
            folder_locks: Mutex::new(HashMap::new()),
            lease: chrono::Duration::from_std(lease).unwrap_or_else(|_| chrono::Duration::days(1)),
        }
    }

    /// Swap the whole file set of `asset_id` for the files in `request`.
    ///
    /// The folder id never changes. The row is only written after the new
    /// files are stored, and it receives exactly the URLs this run produced.
    /// Once the precheck passes the run is detached from the caller, so
    /// dropping the returned future does not stop it between purge and
    /// commit.
    #[instrument(skip(self, request))]
    pub async fn replace(
        self: &Arc<Self>,
        asset_id: i64,
        request: IngestRequest,
    ) -> Result<ReplaceReport, AssetError> {
        let primary = request
            .primary
            .as_ref()
            .ok_or_else(|| AssetError::validation("A replacement file is required"))?;
        self.pipeline.precheck_primary(primary)?;

        let folder_id = self.records.get(asset_id).await?.folder_id;
        let this = Arc::clone(self);
        self.run_detached(folder_id, async move {
            this.replace_locked(asset_id, request).await
        })
        .await
    }

    /// Store new media for `asset_id` and apply the reconciled patch.
    ///
    /// Holds the folder lock like a replace, so a concurrent replace cannot
    /// purge the media written here. Model files are refused; they only
    /// change through [`replace`](Self::replace). Media whose clear flag is
    /// set are not stored at all.
    #[instrument(skip(self, request, clear, text))]
    pub async fn update(
        self: &Arc<Self>,
        asset_id: i64,
        request: IngestRequest,
        clear: ClearFlags,
        text: TextFields,
    ) -> Result<UpdateReport, AssetError> {
        if request.primary.is_some() {
            return Err(AssetError::validation(
                "Model files can only be changed by replacing the asset",
            ));
        }

        let request = drop_cleared(request, &clear);
        let folder_id = self.records.get(asset_id).await?.folder_id;
        let this = Arc::clone(self);
        self.run_detached(folder_id, async move {
            this.update_locked(asset_id, request, clear, text).await
        })
        .await
    }

    /// Delete the record of `asset_id` once no replace or update holds its
    /// folder. Stored files are left in place.
    #[instrument(skip(self))]
    pub async fn delete(&self, asset_id: i64) -> Result<Asset, AssetError> {
        let folder_id = self.records.get(asset_id).await?.folder_id;
        let asset = self
            .with_folder_lock(folder_id, self.records.delete(asset_id))
            .await?;

        info!(asset_id, folder_id = %folder_id, "Asset record deleted");
        Ok(asset)
    }

    async fn update_locked(
        &self,
        asset_id: i64,
        request: IngestRequest,
        clear: ClearFlags,
        text: TextFields,
    ) -> Result<UpdateReport, AssetError> {
        let current = self.records.get(asset_id).await?;

        let outcome = if request.is_empty() {
            IngestOutcome::default()
        } else {
            self.pipeline
                .ingest(current.folder_id, request, WriteMode::Overwrite)
                .await?
        };

        let patch = reconcile(&current, &outcome.files, &clear, text);
        let asset = self.records.apply_patch(asset_id, &patch).await?;

        info!(
            asset_id,
            written = outcome.written_keys.len(),
            skipped = outcome.skipped.len(),
            "Asset updated"
        );

        Ok(UpdateReport {
            asset,
            skipped: outcome.skipped,
        })
    }

    async fn replace_locked(
        &self,
        asset_id: i64,
        request: IngestRequest,
    ) -> Result<ReplaceReport, AssetError> {
        let start = Instant::now();

        // Re-read under the lock; a replace that held it may have moved the generation
        let current = self.records.get(asset_id).await?;
        let prefix = folder_prefix(current.folder_id);
        let mut phase = ReplacePhase::Idle;

        phase = self.advance(&current, phase, ReplacePhase::Listing);
        let keys = self.pipeline.store().list_by_prefix(&prefix).await?;

        let stale_before = Utc::now() - self.lease;
        self.records
            .begin_replace(asset_id, current.generation, stale_before)
            .await?;

        phase = self.advance(&current, phase, ReplacePhase::Purging);
        let report = self.pipeline.store().remove_many(&keys).await;
        if !report.is_complete() {
            let err = AssetError::PartialPurge {
                prefix: prefix.clone(),
                attempted: report.attempted(),
                failed: report.failed.len(),
            };
            for (key, e) in &report.failed {
                debug!(key = %key, error = %e, "Object left behind by purge");
            }
            warn!(asset_id, error = %err, "Continuing replace after partial purge");
            metrics::counter!("assets.replace.purge_failures").increment(report.failed.len() as u64);
        }

        phase = self.advance(&current, phase, ReplacePhase::Reingesting);
        let outcome = match self
            .pipeline
            .ingest(current.folder_id, request, WriteMode::Overwrite)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => return Err(self.fail(&current, phase, e).await),
        };

        phase = self.advance(&current, phase, ReplacePhase::Committing);
        let asset = match self
            .records
            .commit_replacement(asset_id, current.generation, &outcome.files)
            .await
        {
            Ok(asset) => asset,
            Err(e) => return Err(self.fail(&current, phase, e).await),
        };

        self.advance(&current, phase, ReplacePhase::Done);
        metrics::counter!("assets.replace.completed").increment(1);
        info!(
            asset_id,
            folder_id = %asset.folder_id,
            generation = asset.generation,
            purged = report.removed.len(),
            written = outcome.written_keys.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Asset replaced"
        );

        Ok(ReplaceReport {
            asset,
            purged: report.removed,
            purge_failed: report.failed.into_iter().map(|(key, _)| key).collect(),
            skipped: outcome.skipped,
        })
    }

    /// Log every asset whose replace purged storage and never committed
    #[instrument(skip(self))]
    pub async fn audit_interrupted(&self) -> Result<Vec<Asset>, AssetError> {
        let interrupted = self
            .records
            .list_interrupted_replacements(Utc::now() - self.lease)
            .await?;

        for asset in &interrupted {
            error!(
                asset_id = asset.id,
                folder_id = %asset.folder_id,
                generation = asset.generation,
                pending_generation = ?asset.pending_generation,
                inconsistent_state = true,
                "Replace was interrupted; stored files may not match the record"
            );
        }
        metrics::counter!("assets.replace.inconsistent_state").increment(interrupted.len() as u64);

        if interrupted.is_empty() {
            info!("No interrupted replaces found");
        }
        Ok(interrupted)
    }

    /// Number of folders with a replace or update running or queued
    pub fn in_flight(&self) -> usize {
        self.folder_locks.lock().len()
    }

    /// Wait for running replaces and updates to finish, up to `timeout`.
    /// Returns false if some were still running.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.in_flight() > 0 {
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        true
    }

    fn advance(&self, asset: &Asset, from: ReplacePhase, to: ReplacePhase) -> ReplacePhase {
        debug!(asset_id = asset.id, from = %from, to = %to, "Replace phase");
        to
    }

    /// Storage was already purged; report the asset as inconsistent
    async fn fail(&self, asset: &Asset, phase: ReplacePhase, cause: AssetError) -> AssetError {
        error!(
            asset_id = asset.id,
            folder_id = %asset.folder_id,
            phase = %phase,
            error = %cause,
            inconsistent_state = true,
            "Replace failed after purge"
        );
        metrics::counter!("assets.replace.inconsistent_state").increment(1);
        self.advance(asset, phase, ReplacePhase::Failed);

        // A newer generation means the row is no longer ours to touch
        if let AssetError::Conflict(_) = cause {
            return cause;
        }

        if let Err(e) = self.records.abandon_replace(asset.id).await {
            warn!(asset_id = asset.id, error = %e, "Failed to release replace lease");
        }

        AssetError::InconsistentState {
            asset_id: asset.id,
            phase: phase.to_string(),
            reason: cause.to_string(),
        }
    }

    /// Run `work` under the folder lock on its own task and wait for it
    async fn run_detached<T, F>(
        self: &Arc<Self>,
        folder_id: Uuid,
        work: F,
    ) -> Result<T, AssetError>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, AssetError>> + Send + 'static,
    {
        let this = Arc::clone(self);
        let handle =
            tokio::spawn(async move { this.with_folder_lock(folder_id, work).await });

        handle.await.map_err(|e| {
            error!(folder_id = %folder_id, error = %e, "Asset task did not complete");
            AssetError::Task(e.to_string())
        })?
    }

    async fn with_folder_lock<T>(&self, folder_id: Uuid, work: impl Future<Output = T>) -> T {
        let lock = self.folder_lock(folder_id);
        let result = {
            let _guard = lock.lock().await;
            work.await
        };
        drop(lock);
        self.release_folder_lock(folder_id);
        result
    }

    fn folder_lock(&self, folder_id: Uuid) -> FolderLock {
        self.folder_locks
            .lock()
            .entry(folder_id)
            .or_default()
            .clone()
    }

    fn release_folder_lock(&self, folder_id: Uuid) {
        let mut locks = self.folder_locks.lock();
        if locks
            .get(&folder_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&folder_id);
        }
    }
}

/// Media that a clear flag would blank out again are not worth storing
fn drop_cleared(mut request: IngestRequest, clear: &ClearFlags) -> IngestRequest {
    if clear.thumbnail && request.thumbnail_image.take().is_some() {
        debug!("Dropping thumbnail upload; thumbnail is being cleared");
    }
    if clear.audio && request.audio_file.take().is_some() {
        debug!("Dropping audio upload; audio is being cleared");
    }
    if clear.video && request.video.take().is_some() {
        debug!("Dropping video; video is being cleared");
    }
    request
}
