use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// How the mobile client presents an asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionMethod {
    PlaceOnPlane,
    ShowOnMarker,
    ShowArPortal,
    ShowDirectly,
}

impl InteractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionMethod::PlaceOnPlane => "place_on_plane",
            InteractionMethod::ShowOnMarker => "show_on_marker",
            InteractionMethod::ShowArPortal => "show_ar_portal",
            InteractionMethod::ShowDirectly => "show_directly",
        }
    }
}

impl fmt::Display for InteractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
#[error("Unknown interaction method: {0}")]
pub struct UnknownInteractionMethod(pub String);

impl FromStr for InteractionMethod {
    type Err = UnknownInteractionMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "place_on_plane" => Ok(InteractionMethod::PlaceOnPlane),
            "show_on_marker" => Ok(InteractionMethod::ShowOnMarker),
            "show_ar_portal" => Ok(InteractionMethod::ShowArPortal),
            "show_directly" => Ok(InteractionMethod::ShowDirectly),
            other => Err(UnknownInteractionMethod(other.to_string())),
        }
    }
}

impl TryFrom<String> for InteractionMethod {
    type Error = UnknownInteractionMethod;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Stored asset row
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Asset {
    pub id: i64,
    /// Owning heritage object
    pub object_id: i64,
    /// Storage namespace; fixed at creation
    pub folder_id: Uuid,
    pub title: Option<String>,
    pub description: Option<String>,
    #[sqlx(try_from = "String")]
    pub interaction_method: InteractionMethod,
    pub model_url: Option<String>,
    pub material_urls: Vec<String>,
    pub thumbnail_image_url: Option<String>,
    pub marker_image_url: Option<String>,
    pub audio_url: Option<String>,
    pub video_url: Option<String>,
    /// Bumped by every committed replace
    pub generation: i64,
    /// Set while a replace is between purge and commit
    pub pending_generation: Option<i64>,
    /// Lease start of the replace holding `pending_generation`; cleared on release
    pub pending_since: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Public URLs produced by one ingestion run
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadedFiles {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_url: Option<String>,
    pub material_urls: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marker_image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
}

/// Values for a row about to be inserted
#[derive(Debug, Clone)]
pub struct NewAsset {
    pub object_id: i64,
    pub folder_id: Uuid,
    pub title: Option<String>,
    pub description: Option<String>,
    pub interaction_method: InteractionMethod,
    pub files: UploadedFiles,
}
