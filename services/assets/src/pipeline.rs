//! Asset ingestion pipeline.
//!
//! Turns the files of one request into stored objects under the asset's
//! folder plus the public URLs that end up on the asset row. Entries are
//! processed strictly in order, one storage round-trip at a time.

use crate::archive::{base_name, ArchiveError, ArchiveReader};
use crate::asset::UploadedFiles;
use crate::classifier::{
    classify, extension, is_direct_model, is_platform_artifact, is_thumbnail_candidate, FileRole,
};
use crate::error::AssetError;
use crate::store::{
    content_type_for, folder_prefix, object_key, ObjectStore, StorageError, OPAQUE_CONTENT_TYPE,
};
use bytes::Bytes;
use chrono::Utc;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// One file part of an upload request
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Client supplied file name
    pub name: String,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            content_type: None,
            body: body.into(),
        }
    }

    fn media_content_type(&self) -> String {
        self.content_type
            .clone()
            .filter(|ct| !ct.is_empty())
            .unwrap_or_else(|| content_type_for(&self.name).to_string())
    }
}

/// Where an asset's video comes from
#[derive(Debug, Clone)]
pub enum VideoSource {
    /// Binary to store in the asset folder
    Upload(UploadedFile),
    /// Already hosted elsewhere; stored verbatim
    External(String),
}

/// Files supplied with one ingestion request
#[derive(Debug, Clone, Default)]
pub struct IngestRequest {
    /// Archive or direct model file
    pub primary: Option<UploadedFile>,
    pub marker_image: Option<UploadedFile>,
    pub thumbnail_image: Option<UploadedFile>,
    pub audio_file: Option<UploadedFile>,
    pub video: Option<VideoSource>,
}

impl IngestRequest {
    pub fn is_empty(&self) -> bool {
        self.primary.is_none()
            && self.marker_image.is_none()
            && self.thumbnail_image.is_none()
            && self.audio_file.is_none()
            && self.video.is_none()
    }
}

/// Objects already uploaded by the client through presigned URLs
#[derive(Debug, Clone)]
pub struct StagedUpload {
    pub folder_id: Uuid,
    pub zip_path: Option<String>,
    pub marker_image_path: Option<String>,
    pub thumbnail_image_path: Option<String>,
    pub audio_path: Option<String>,
    pub video_path: Option<String>,
}

/// Overwrite policy for the writes of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Fresh folder: an existing key means a folder_id collision
    Create,
    /// Pre-existing folder: replace whatever is there
    Overwrite,
}

impl WriteMode {
    pub fn overwrite(self) -> bool {
        matches!(self, WriteMode::Overwrite)
    }
}

/// A file that was accepted by the request but did not make it to storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    pub name: String,
    pub reason: String,
}

/// Result of one ingestion run
#[derive(Debug, Clone, Default)]
pub struct IngestOutcome {
    pub files: UploadedFiles,
    /// Keys written, in write order
    pub written_keys: Vec<String>,
    pub skipped: Vec<SkippedFile>,
}

struct IngestRun {
    folder_id: Uuid,
    mode: WriteMode,
    outcome: IngestOutcome,
    written: HashSet<String>,
}

impl IngestRun {
    fn new(folder_id: Uuid, mode: WriteMode) -> Self {
        Self {
            folder_id,
            mode,
            outcome: IngestOutcome::default(),
            written: HashSet::new(),
        }
    }

    /// Same-named archive entries overwrite each other within a run
    fn overwrite_for(&self, key: &str) -> bool {
        self.mode.overwrite() || self.written.contains(key)
    }

    fn record_write(&mut self, key: String) {
        if self.written.insert(key.clone()) {
            self.outcome.written_keys.push(key);
        }
    }

    fn skip(&mut self, name: &str, reason: impl ToString) {
        self.outcome.skipped.push(SkippedFile {
            name: name.to_string(),
            reason: reason.to_string(),
        });
    }

    fn files(&mut self) -> &mut UploadedFiles {
        &mut self.outcome.files
    }
}

/// Writes request files to the object store and collects their URLs
pub struct IngestionPipeline {
    store: Arc<dyn ObjectStore>,
    max_entry_bytes: u64,
}

impl IngestionPipeline {
    pub fn new(store: Arc<dyn ObjectStore>, max_entry_bytes: u64) -> Self {
        Self {
            store,
            max_entry_bytes,
        }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Store every file of `request` under `folder_id`.
    ///
    /// Explicit media are written first so an uploaded thumbnail always
    /// wins over one found in the archive. A direct model file takes the
    /// primary slot; anything else in that slot is opened as an archive.
    ///
    /// Optional media and archive entries that fail to store are skipped and
    /// reported in [`IngestOutcome::skipped`]; a failed direct model write
    /// or an unreadable archive fails the whole run.
    #[instrument(skip(self, request), fields(folder_id = %folder_id, mode = ?mode))]
    pub async fn ingest(
        &self,
        folder_id: Uuid,
        request: IngestRequest,
        mode: WriteMode,
    ) -> Result<IngestOutcome, AssetError> {
        let start = Instant::now();
        let mut run = IngestRun::new(folder_id, mode);

        if let Some(file) = request.marker_image {
            let url = self.put_media(&mut run, "marker", file).await;
            run.files().marker_image_url = url;
        }

        if let Some(file) = request.thumbnail_image {
            let url = self.put_media(&mut run, "thumbnail", file).await;
            run.files().thumbnail_image_url = url;
        }

        if let Some(file) = request.audio_file {
            let url = self.put_media(&mut run, "audio", file).await;
            run.files().audio_url = url;
        }

        match request.video {
            Some(VideoSource::Upload(file)) => {
                let name = video_object_name(&file.name);
                let content_type = file.media_content_type();
                let url = self
                    .put_optional(&mut run, &name, file.body, &content_type)
                    .await;
                run.files().video_url = url;
            }
            Some(VideoSource::External(url)) => {
                run.files().video_url = Some(url);
            }
            None => {}
        }

        if let Some(file) = request.primary {
            let name = base_name(&file.name).to_string();
            if is_platform_artifact(&name) {
                debug!(name = %name, "Ignoring platform metadata upload");
                run.skip(&name, "platform metadata file");
            } else if is_direct_model(&name) {
                self.put_model(&mut run, file).await?;
            } else {
                self.walk_archive(&mut run, file.body).await?;
            }
        }

        Ok(self.finish(run, start))
    }

    /// Check that a primary file can be ingested without writing anything.
    ///
    /// Only archives can be rejected up front: their central directory is
    /// parsed here, so a corrupt upload fails before any destructive step.
    pub fn precheck_primary(&self, file: &UploadedFile) -> Result<(), AssetError> {
        let name = base_name(&file.name);
        if is_platform_artifact(name) || is_direct_model(name) {
            return Ok(());
        }
        ArchiveReader::open(file.body.clone(), self.max_entry_bytes)?;
        Ok(())
    }

    /// Resolve objects the client staged through presigned URLs.
    ///
    /// Staged media only need their URLs derived. A staged archive is
    /// downloaded, unpacked into the folder, then deleted: the archive itself
    /// is never kept.
    #[instrument(skip(self, staged), fields(folder_id = %staged.folder_id))]
    pub async fn finalize_staged(&self, staged: StagedUpload) -> Result<IngestOutcome, AssetError> {
        let start = Instant::now();
        let folder_id = staged.folder_id;
        let prefix = folder_prefix(folder_id);

        let paths = [
            &staged.zip_path,
            &staged.marker_image_path,
            &staged.thumbnail_image_path,
            &staged.audio_path,
            &staged.video_path,
        ];
        for path in paths.into_iter().flatten() {
            if !path.starts_with(&prefix) || path.len() == prefix.len() {
                return Err(AssetError::validation(format!(
                    "Staged path {path} is not inside folder {folder_id}"
                )));
            }
        }

        let present: HashSet<String> = self
            .store
            .list_by_prefix(&prefix)
            .await?
            .into_iter()
            .collect();

        let mut run = IngestRun::new(folder_id, WriteMode::Overwrite);

        let resolve = |run: &mut IngestRun, path: &Option<String>| -> Option<String> {
            let path = path.as_ref()?;
            if present.contains(path) {
                Some(self.store.public_url(path))
            } else {
                warn!(path = %path, "Staged object missing from storage");
                run.skip(base_name(path), "staged object not found");
                None
            }
        };

        let marker = resolve(&mut run, &staged.marker_image_path);
        let thumbnail = resolve(&mut run, &staged.thumbnail_image_path);
        let audio = resolve(&mut run, &staged.audio_path);
        let video = resolve(&mut run, &staged.video_path);
        {
            let files = run.files();
            files.marker_image_url = marker;
            files.thumbnail_image_url = thumbnail;
            files.audio_url = audio;
            files.video_url = video;
        }

        if let Some(zip_path) = staged.zip_path {
            let body = self.store.get(&zip_path).await.map_err(|e| match e {
                StorageError::NotFound(_) => {
                    AssetError::validation(format!("Staged archive {zip_path} not found"))
                }
                other => other.into(),
            })?;
            self.walk_archive(&mut run, body).await?;

            let report = self.store.remove_many(std::slice::from_ref(&zip_path)).await;
            for (key, e) in &report.failed {
                warn!(key = %key, error = %e, "Failed to delete staged archive");
            }
        }

        Ok(self.finish(run, start))
    }

    async fn put_model(&self, run: &mut IngestRun, file: UploadedFile) -> Result<(), AssetError> {
        let name = base_name(&file.name).to_string();
        let key = object_key(run.folder_id, &name);

        let url = self
            .store
            .put(&key, file.body, OPAQUE_CONTENT_TYPE, run.overwrite_for(&key))
            .await
            .map_err(|source| AssetError::StorageWrite {
                key: key.clone(),
                source,
            })?;

        run.record_write(key);
        run.files().model_url = Some(url);
        Ok(())
    }

    async fn put_media(
        &self,
        run: &mut IngestRun,
        role: &str,
        file: UploadedFile,
    ) -> Option<String> {
        let name = format!("{role}_{}", base_name(&file.name));
        let content_type = file.media_content_type();
        self.put_optional(run, &name, file.body, &content_type).await
    }

    async fn put_optional(
        &self,
        run: &mut IngestRun,
        name: &str,
        body: Bytes,
        content_type: &str,
    ) -> Option<String> {
        let key = object_key(run.folder_id, name);
        match self
            .store
            .put(&key, body, content_type, run.overwrite_for(&key))
            .await
        {
            Ok(url) => {
                run.record_write(key);
                Some(url)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to store optional file, leaving it unset");
                run.skip(name, &e);
                None
            }
        }
    }

    async fn walk_archive(&self, run: &mut IngestRun, body: Bytes) -> Result<(), AssetError> {
        let mut reader = ArchiveReader::open(body, self.max_entry_bytes)?;

        for entry in reader.entries() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(ArchiveError::EntryTooLarge { path, size, limit }) => {
                    warn!(path = %path, size, limit, "Skipping oversized archive entry");
                    run.skip(base_name(&path), format!("{size} bytes exceeds {limit} byte limit"));
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let name = entry.file_name().to_string();
            let role = classify(&name);
            if role == FileRole::Unclassified {
                debug!(path = %entry.path, "Ignoring unclassified archive entry");
                continue;
            }

            let key = object_key(run.folder_id, &name);
            let url = match self
                .store
                .put(&key, entry.content, OPAQUE_CONTENT_TYPE, run.overwrite_for(&key))
                .await
            {
                Ok(url) => url,
                Err(e) => {
                    warn!(key = %key, error = %e, "Failed to store archive entry, skipping");
                    run.skip(&name, &e);
                    continue;
                }
            };
            run.record_write(key);

            match role {
                FileRole::Model => {
                    if let Some(previous) = run.files().model_url.replace(url) {
                        debug!(previous = %previous, "Archive holds more than one model, last one wins");
                    }
                }
                FileRole::Material => {
                    let files = run.files();
                    if is_thumbnail_candidate(&name) && files.thumbnail_image_url.is_none() {
                        files.thumbnail_image_url = Some(url.clone());
                    }
                    if !files.material_urls.contains(&url) {
                        files.material_urls.push(url);
                    }
                }
                FileRole::Unclassified => {}
            }
        }

        Ok(())
    }

    fn finish(&self, run: IngestRun, start: Instant) -> IngestOutcome {
        let outcome = run.outcome;

        metrics::counter!("assets.ingest.files_written").increment(outcome.written_keys.len() as u64);
        metrics::counter!("assets.ingest.files_skipped").increment(outcome.skipped.len() as u64);
        metrics::histogram!("assets.ingest.duration_seconds").record(start.elapsed().as_secs_f64());

        if outcome.skipped.is_empty() {
            info!(
                folder_id = %run.folder_id,
                written = outcome.written_keys.len(),
                has_model = outcome.files.model_url.is_some(),
                materials = outcome.files.material_urls.len(),
                "Ingestion finished"
            );
        } else {
            warn!(
                folder_id = %run.folder_id,
                written = outcome.written_keys.len(),
                skipped = outcome.skipped.len(),
                "Ingestion finished with skipped files"
            );
        }

        outcome
    }
}

/// `video_{millis}_{random}.{ext}`, unique per upload
fn video_object_name(original_name: &str) -> String {
    let random = Uuid::new_v4().simple().to_string();
    let ext = extension(base_name(original_name)).unwrap_or_else(|| "bin".to_string());
    format!("video_{}_{}.{}", Utc::now().timestamp_millis(), &random[..13], ext)
}
