//! Builds the row mutation for an asset update request.

use crate::asset::{Asset, InteractionMethod, UploadedFiles};
use chrono::Utc;

/// Value written to a URL column that the client asked to clear
pub const CLEARED_URL: &str = "";

/// What an update does to one URL column
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FieldUpdate {
    /// Column left as it is
    #[default]
    Keep,
    Set(String),
    /// Column set to [`CLEARED_URL`]
    Clear,
}

impl FieldUpdate {
    /// Clearing wins over a value ingested in the same request
    fn resolve(clear: bool, ingested: Option<&String>) -> Self {
        match (clear, ingested) {
            (true, _) => FieldUpdate::Clear,
            (false, Some(url)) => FieldUpdate::Set(url.clone()),
            (false, None) => FieldUpdate::Keep,
        }
    }

    /// Whether the column is written at all
    pub fn touches(&self) -> bool {
        !matches!(self, FieldUpdate::Keep)
    }

    /// New column value; only meaningful when [`touches`](Self::touches)
    pub fn value(&self) -> Option<&str> {
        match self {
            FieldUpdate::Keep => None,
            FieldUpdate::Set(url) => Some(url),
            FieldUpdate::Clear => Some(CLEARED_URL),
        }
    }

    fn apply(&self, current: &Option<String>) -> Option<String> {
        match self {
            FieldUpdate::Keep => current.clone(),
            other => other.value().map(str::to_string),
        }
    }
}

/// Per-field clear requests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClearFlags {
    pub thumbnail: bool,
    pub audio: bool,
    pub video: bool,
    pub model: bool,
}

/// Text columns sent with every update
#[derive(Debug, Clone, Default)]
pub struct TextFields {
    pub title: Option<String>,
    pub description: Option<String>,
    pub interaction_method: Option<InteractionMethod>,
}

/// Final mutation applied to an asset row
#[derive(Debug, Clone, PartialEq)]
pub struct AssetPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub interaction_method: InteractionMethod,
    pub model_url: FieldUpdate,
    /// `None` keeps the stored list
    pub material_urls: Option<Vec<String>>,
    pub thumbnail_image_url: FieldUpdate,
    pub marker_image_url: FieldUpdate,
    pub audio_url: FieldUpdate,
    pub video_url: FieldUpdate,
}

/// Merge an update request into a patch for `current`.
///
/// Title and description are always overwritten with what the request
/// carried. A missing interaction method keeps the stored one, since the
/// column cannot be null. Clearing the model also drops its materials.
pub fn reconcile(
    current: &Asset,
    ingested: &UploadedFiles,
    clear: &ClearFlags,
    text: TextFields,
) -> AssetPatch {
    let material_urls = if clear.model {
        Some(Vec::new())
    } else if ingested.material_urls.is_empty() {
        None
    } else {
        Some(ingested.material_urls.clone())
    };

    AssetPatch {
        title: text.title,
        description: text.description,
        interaction_method: text
            .interaction_method
            .unwrap_or(current.interaction_method),
        model_url: FieldUpdate::resolve(clear.model, ingested.model_url.as_ref()),
        material_urls,
        thumbnail_image_url: FieldUpdate::resolve(
            clear.thumbnail,
            ingested.thumbnail_image_url.as_ref(),
        ),
        marker_image_url: FieldUpdate::resolve(false, ingested.marker_image_url.as_ref()),
        audio_url: FieldUpdate::resolve(clear.audio, ingested.audio_url.as_ref()),
        video_url: FieldUpdate::resolve(clear.video, ingested.video_url.as_ref()),
    }
}

impl AssetPatch {
    /// Row as it reads after the patch
    pub fn apply_to(&self, asset: &Asset) -> Asset {
        Asset {
            title: self.title.clone(),
            description: self.description.clone(),
            interaction_method: self.interaction_method,
            model_url: self.model_url.apply(&asset.model_url),
            material_urls: self
                .material_urls
                .clone()
                .unwrap_or_else(|| asset.material_urls.clone()),
            thumbnail_image_url: self.thumbnail_image_url.apply(&asset.thumbnail_image_url),
            marker_image_url: self.marker_image_url.apply(&asset.marker_image_url),
            audio_url: self.audio_url.apply(&asset.audio_url),
            video_url: self.video_url.apply(&asset.video_url),
            updated_at: Utc::now(),
            ..asset.clone()
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use uuid::Uuid;

    pub fn asset(id: i64) -> Asset {
        let now = Utc::now();
        Asset {
            id,
            object_id: 7,
            folder_id: Uuid::new_v4(),
            title: Some("Bronze horse".to_string()),
            description: Some("Tang dynasty".to_string()),
            interaction_method: InteractionMethod::PlaceOnPlane,
            model_url: Some("https://cdn/f/horse.obj".to_string()),
            material_urls: vec!["https://cdn/f/horse.mtl".to_string()],
            thumbnail_image_url: Some("https://cdn/f/thumbnail_horse.png".to_string()),
            marker_image_url: None,
            audio_url: Some("https://cdn/f/audio_old.mp3".to_string()),
            video_url: None,
            generation: 0,
            pending_generation: None,
            pending_since: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::asset;
    use super::*;

    fn text() -> TextFields {
        TextFields {
            title: Some("Bronze horse".to_string()),
            description: None,
            interaction_method: Some(InteractionMethod::ShowDirectly),
        }
    }

    #[test]
    fn test_clear_wins_over_new_upload() {
        let current = asset(1);
        let ingested = UploadedFiles {
            audio_url: Some("https://cdn/f/audio_new.mp3".to_string()),
            ..Default::default()
        };
        let clear = ClearFlags {
            audio: true,
            ..Default::default()
        };

        let patch = reconcile(&current, &ingested, &clear, text());

        assert_eq!(patch.audio_url, FieldUpdate::Clear);
        assert_eq!(patch.apply_to(&current).audio_url.as_deref(), Some(CLEARED_URL));
    }

    #[test]
    fn test_untouched_fields_are_kept() {
        let current = asset(1);
        let ingested = UploadedFiles {
            marker_image_url: Some("https://cdn/f/marker_gate.png".to_string()),
            ..Default::default()
        };

        let patch = reconcile(&current, &ingested, &ClearFlags::default(), text());
        let updated = patch.apply_to(&current);

        assert_eq!(patch.model_url, FieldUpdate::Keep);
        assert_eq!(patch.material_urls, None);
        assert_eq!(updated.model_url, current.model_url);
        assert_eq!(updated.material_urls, current.material_urls);
        assert_eq!(updated.thumbnail_image_url, current.thumbnail_image_url);
        assert_eq!(
            updated.marker_image_url.as_deref(),
            Some("https://cdn/f/marker_gate.png")
        );
    }

    #[test]
    fn test_text_fields_always_overwritten() {
        let current = asset(1);
        let patch = reconcile(
            &current,
            &UploadedFiles::default(),
            &ClearFlags::default(),
            text(),
        );
        let updated = patch.apply_to(&current);

        assert_eq!(updated.description, None);
        assert_eq!(updated.interaction_method, InteractionMethod::ShowDirectly);
    }

    #[test]
    fn test_missing_interaction_method_keeps_current() {
        let current = asset(1);
        let patch = reconcile(
            &current,
            &UploadedFiles::default(),
            &ClearFlags::default(),
            TextFields::default(),
        );
        assert_eq!(patch.interaction_method, InteractionMethod::PlaceOnPlane);
    }

    #[test]
    fn test_clear_model_drops_materials() {
        let current = asset(1);
        let clear = ClearFlags {
            model: true,
            ..Default::default()
        };
        let updated = reconcile(&current, &UploadedFiles::default(), &clear, text())
            .apply_to(&current);

        assert_eq!(updated.model_url.as_deref(), Some(CLEARED_URL));
        assert!(updated.material_urls.is_empty());
        assert_eq!(updated.folder_id, current.folder_id);
    }

    #[test]
    fn test_field_update_values() {
        assert!(!FieldUpdate::Keep.touches());
        assert_eq!(FieldUpdate::Clear.value(), Some(""));
        assert_eq!(FieldUpdate::Set("u".into()).value(), Some("u"));
    }
}
