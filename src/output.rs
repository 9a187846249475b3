use std::fs;
use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageFormat};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{CardError, Result};

/// What an artifact is, which decides where it is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactKind {
    Cropped { rank: usize },
    Trimmed { rank: usize },
    ContourOverlay,
    RectangleOverlay,
    /// Intermediate raster of the edge stage, numbered in pipeline order.
    Stage { index: usize, name: &'static str },
    CandidateRotated { rank: usize },
    CandidateCrop { rank: usize },
    /// A whole input with its border trimmed, written by the trim-only mode.
    TrimmedInput,
}

/// Names derived from one input; distinct inputs never share a subdirectory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageIdentity {
    pub stem: String,
    pub extension: String,
    pub subdir: String,
}

impl ImageIdentity {
    pub fn from_path(path: &Path) -> Self {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .filter(|e| ImageFormat::from_extension(e).is_some_and(|f| f.can_write()))
            .unwrap_or_else(|| "png".to_string());

        let digest = Sha256::digest(path.to_string_lossy().as_bytes());
        let subdir = format!("{}-{}", stem, &hex::encode(digest)[..8]);

        Self {
            stem,
            extension,
            subdir,
        }
    }

    /// Identity for an image that did not come from a file.
    pub fn named(stem: &str) -> Self {
        Self::from_path(&PathBuf::from(format!("{}.png", stem)))
    }

    /// Path of an artifact relative to the output root.
    pub fn relative_path(&self, kind: &ArtifactKind) -> PathBuf {
        let base = PathBuf::from(&self.subdir);
        let (stem, ext) = (&self.stem, &self.extension);
        match kind {
            ArtifactKind::Cropped { rank } => base.join(format!("{stem}-cropped-{rank}.{ext}")),
            ArtifactKind::Trimmed { rank } => base
                .join("trimmed")
                .join(format!("{stem}-cropped-{rank}-trimmed.{ext}")),
            ArtifactKind::ContourOverlay => {
                base.join("debug").join(format!("{stem}-contours.{ext}"))
            }
            ArtifactKind::RectangleOverlay => {
                base.join("debug").join(format!("{stem}-rectangles.{ext}"))
            }
            ArtifactKind::Stage { index, name } => {
                base.join("debug").join(format!("{index:02}-{name}.png"))
            }
            ArtifactKind::CandidateRotated { rank } => {
                base.join("debug").join(format!("candidate-{rank}-rotated.png"))
            }
            ArtifactKind::CandidateCrop { rank } => {
                base.join("debug").join(format!("candidate-{rank}-crop.png"))
            }
            ArtifactKind::TrimmedInput => base.join(format!("{stem}_trimmed.{ext}")),
        }
    }
}

/// Persists pipeline artifacts.
pub trait ArtifactWriter: Send + Sync {
    fn write(
        &self,
        identity: &ImageIdentity,
        kind: &ArtifactKind,
        image: &DynamicImage,
    ) -> Result<PathBuf>;
}

/// Writes artifacts as image files below a root directory.
#[derive(Debug, Clone)]
pub struct DirectoryWriter {
    root: PathBuf,
}

impl DirectoryWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ArtifactWriter for DirectoryWriter {
    fn write(
        &self,
        identity: &ImageIdentity,
        kind: &ArtifactKind,
        image: &DynamicImage,
    ) -> Result<PathBuf> {
        let path = self.root.join(identity.relative_path(kind));
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| CardError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let format = ImageFormat::from_path(&path).unwrap_or(ImageFormat::Png);
        let encodable = encodable_for(format, image);
        encodable
            .save_with_format(&path, format)
            .map_err(|source| CardError::Write {
                path: path.clone(),
                source,
            })?;

        debug!(path = %path.display(), "Artifact written");
        Ok(path)
    }
}

/// Drop channels the target format cannot store.
fn encodable_for(format: ImageFormat, image: &DynamicImage) -> std::borrow::Cow<'_, DynamicImage> {
    use std::borrow::Cow;

    if format != ImageFormat::Jpeg || !image.color().has_alpha() {
        return Cow::Borrowed(image);
    }
    if image.color().channel_count() == 2 {
        Cow::Owned(DynamicImage::ImageLuma8(image.to_luma8()))
    } else {
        Cow::Owned(DynamicImage::ImageRgb8(image.to_rgb8()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_from_path() {
        let identity = ImageIdentity::from_path(Path::new("/photos/binder page.JPG"));
        assert_eq!(identity.stem, "binder page");
        assert_eq!(identity.extension, "jpg");
        assert!(identity.subdir.starts_with("binder page-"));
        assert_eq!(identity.subdir.len(), "binder page-".len() + 8);
    }

    #[test]
    fn test_same_stem_different_dirs() {
        let a = ImageIdentity::from_path(Path::new("a/scan.png"));
        let b = ImageIdentity::from_path(Path::new("b/scan.png"));
        assert_eq!(a.stem, b.stem);
        assert_ne!(a.subdir, b.subdir);
    }

    #[test]
    fn test_unknown_extension_falls_back_to_png() {
        let identity = ImageIdentity::from_path(Path::new("card.raw"));
        assert_eq!(identity.extension, "png");
    }

    #[test]
    fn test_relative_paths() {
        let identity = ImageIdentity {
            stem: "page".to_string(),
            extension: "jpg".to_string(),
            subdir: "page-0123abcd".to_string(),
        };
        assert_eq!(
            identity.relative_path(&ArtifactKind::Cropped { rank: 2 }),
            PathBuf::from("page-0123abcd/page-cropped-2.jpg")
        );
        assert_eq!(
            identity.relative_path(&ArtifactKind::Trimmed { rank: 2 }),
            PathBuf::from("page-0123abcd/trimmed/page-cropped-2-trimmed.jpg")
        );
        assert_eq!(
            identity.relative_path(&ArtifactKind::ContourOverlay),
            PathBuf::from("page-0123abcd/debug/page-contours.jpg")
        );
        assert_eq!(
            identity.relative_path(&ArtifactKind::Stage { index: 3, name: "edges" }),
            PathBuf::from("page-0123abcd/debug/03-edges.png")
        );
        assert_eq!(
            identity.relative_path(&ArtifactKind::TrimmedInput),
            PathBuf::from("page-0123abcd/page_trimmed.jpg")
        );
    }

    #[test]
    fn test_jpeg_drops_alpha() {
        let rgba = DynamicImage::new_rgba8(2, 2);
        assert!(matches!(
            encodable_for(ImageFormat::Jpeg, &rgba).as_ref(),
            DynamicImage::ImageRgb8(_)
        ));
        assert!(matches!(
            encodable_for(ImageFormat::Png, &rgba).as_ref(),
            DynamicImage::ImageRgba8(_)
        ));
    }
}
