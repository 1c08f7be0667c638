//! Heritage Asset Service
//!
//! Ingestion service for the 3D and media assets attached to heritage
//! objects on the tour platform. Clients upload an archive (or a single
//! model file) together with optional marker, thumbnail, audio and video
//! files. The service classifies the archive entries, stores every accepted
//! file flat under the asset's folder in object storage, and records the
//! resulting public URLs in PostgreSQL.
//!
//! ## Features
//!
//! - **Archive ingestion**: single-pass walk over zip entries, one entry in
//!   memory at a time; models, materials and thumbnails picked by extension
//! - **Staged uploads**: presigned PUT URLs for large files, finalized into
//!   an asset in a second request
//! - **Replace**: purge-and-reingest of an asset's folder, serialized per
//!   folder and guarded by a write-ahead marker on the row
//! - **Partial updates**: per-field clear flags merged with new media
//!
//! ## Architecture
//!
//! ```text
//!  HTTP API (axum)
//! ┌──────────────┐       ┌──────────────┐        ┌──────────────┐
//! │ create       │──────▶│ Ingestion    │───────▶│ Object Store │
//! │ finalize     │       │ Pipeline     │        │ (S3/memory)  │
//! │ replace      │       └──────────────┘        └──────────────┘
//! │ update       │          │        ▲                  ▲
//! └──────────────┘          ▼        │                  │ list/purge
//!        │            ┌──────────┐ ┌──────────────┐     │
//!        │            │ Archive  │ │ Classifier   │     │
//!        │            │ Reader   │ └──────────────┘     │
//!        │            └──────────┘                      │
//!        ▼                                              │
//! ┌──────────────┐       ┌──────────────┐        ┌──────────────┐
//! │ Reconciler   │──────▶│ Metadata     │◀───────│ Replace      │
//! │              │       │ Store        │        │ Coordinator  │
//! └──────────────┘       └──────────────┘        └──────────────┘
//! ```

pub mod api;
pub mod archive;
pub mod asset;
pub mod classifier;
pub mod config;
pub mod error;
pub mod metadata_store;
pub mod pipeline;
pub mod reconcile;
pub mod replace;
pub mod store;

pub use api::{create_router, start_api_server, AppState};
pub use asset::{Asset, InteractionMethod, NewAsset, UploadedFiles};
pub use config::Config;
pub use error::AssetError;
pub use metadata_store::{AssetMetadataStore, MemoryMetadataStore, PostgresMetadataStore};
pub use pipeline::{IngestOutcome, IngestRequest, IngestionPipeline, UploadedFile, WriteMode};
pub use reconcile::{reconcile, AssetPatch, ClearFlags, FieldUpdate, TextFields};
pub use replace::{ReplaceCoordinator, ReplaceReport};
pub use store::{MemoryObjectStore, ObjectStore, S3ObjectStore, StorageError};
