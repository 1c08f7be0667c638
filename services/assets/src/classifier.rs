/// Semantic role of a file found in an upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileRole {
    /// 3D model (`.obj`, `.glb`, `.gltf`)
    Model,
    /// Material definition or texture (`.mtl`, `.jpg`, `.png`)
    Material,
    /// Not uploaded
    Unclassified,
}

const MODEL_EXTENSIONS: &[&str] = &["obj", "glb", "gltf"];
const MATERIAL_EXTENSIONS: &[&str] = &["mtl", "jpg", "png"];

/// Decide the role of a file from its base name.
///
/// Platform metadata artifacts (`._name`) and nested archives are never
/// uploaded, whatever their extension.
pub fn classify(file_name: &str) -> FileRole {
    if is_platform_artifact(file_name) {
        return FileRole::Unclassified;
    }

    match extension(file_name).as_deref() {
        Some("zip") => FileRole::Unclassified,
        Some(ext) if MODEL_EXTENSIONS.contains(&ext) => FileRole::Model,
        Some(ext) if MATERIAL_EXTENSIONS.contains(&ext) => FileRole::Material,
        _ => FileRole::Unclassified,
    }
}

/// Whether a direct upload can be stored as the model without unpacking
pub fn is_direct_model(file_name: &str) -> bool {
    classify(file_name) == FileRole::Model
}

/// Material whose name marks it as the asset's preview image
pub fn is_thumbnail_candidate(file_name: &str) -> bool {
    classify(file_name) == FileRole::Material
        && file_name.to_ascii_lowercase().contains("thumbnail")
}

/// AppleDouble `._` files written by macOS archivers
pub fn is_platform_artifact(file_name: &str) -> bool {
    file_name.starts_with("._")
}

/// Lowercased extension, if the name has one
pub fn extension(file_name: &str) -> Option<String> {
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => {
            Some(ext.to_ascii_lowercase())
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_extensions_case_insensitive() {
        assert_eq!(classify("statue.obj"), FileRole::Model);
        assert_eq!(classify("Statue.GLB"), FileRole::Model);
        assert_eq!(classify("scene.gltf"), FileRole::Model);
    }

    #[test]
    fn test_material_extensions() {
        assert_eq!(classify("statue.mtl"), FileRole::Material);
        assert_eq!(classify("albedo.JPG"), FileRole::Material);
        assert_eq!(classify("normal.png"), FileRole::Material);
    }

    #[test]
    fn test_other_files_unclassified() {
        assert_eq!(classify("notes.txt"), FileRole::Unclassified);
        assert_eq!(classify("texture.jpeg"), FileRole::Unclassified);
        assert_eq!(classify("bundle.zip"), FileRole::Unclassified);
        assert_eq!(classify("Makefile"), FileRole::Unclassified);
        assert_eq!(classify(".png"), FileRole::Unclassified);
    }

    #[test]
    fn test_platform_artifacts_never_classified() {
        assert_eq!(classify("._statue.obj"), FileRole::Unclassified);
        assert_eq!(classify("._thumbnail.png"), FileRole::Unclassified);
        assert!(!is_thumbnail_candidate("._thumbnail.png"));
    }

    #[test]
    fn test_thumbnail_candidates() {
        assert!(is_thumbnail_candidate("thumbnail.jpg"));
        assert!(is_thumbnail_candidate("statue_Thumbnail.png"));
        assert!(!is_thumbnail_candidate("thumbnail.txt"));
        assert!(!is_thumbnail_candidate("thumbnail.obj"));
        assert!(!is_thumbnail_candidate("albedo.png"));
    }

    #[test]
    fn test_is_direct_model() {
        assert!(is_direct_model("room.glb"));
        assert!(!is_direct_model("room.zip"));
    }
}
