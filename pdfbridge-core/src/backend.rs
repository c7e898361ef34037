use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::annotations::Annotation;
use crate::DocumentInfo;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
}

/// Crop box of a page in PDF user space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropBox {
    pub left: f64,
    pub bottom: f64,
    pub right: f64,
    pub top: f64,
}

impl CropBox {
    pub fn width(&self) -> f64 {
        (self.right - self.left).abs()
    }

    pub fn height(&self) -> f64 {
        (self.top - self.bottom).abs()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutlineItem {
    pub title: String,
    /// 1-based.
    pub page_number: usize,
    pub depth: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct ThumbnailRequest {
    /// 0-based.
    pub page_index: usize,
    /// Longest edge of the produced image, in pixels.
    pub max_dimension: u32,
    pub dark_mode: bool,
}

#[derive(Debug, Clone)]
pub struct RenderImage {
    pub width: u32,
    pub height: u32,
    /// RGBA8, row major.
    pub pixels: Vec<u8>,
}

/// The rendering/parsing engine behind one open document.
///
/// Page indices are 0-based at this boundary.
pub trait DocumentBackend: Send + Sync {
    fn info(&self) -> &DocumentInfo;

    /// Live page count; may grow after [`DocumentBackend::append_image_page`].
    fn page_count(&self) -> usize;

    fn page_size(&self, page_index: usize) -> Result<PageSize>;

    fn crop_box(&self, page_index: usize) -> Result<CropBox>;

    fn outline(&self) -> Result<Vec<OutlineItem>>;

    fn page_text(&self, page_index: usize) -> Result<String>;

    fn render_thumbnail(&self, request: ThumbnailRequest) -> Result<RenderImage>;

    /// Appends an encoded PNG/JPEG image as a new last page. With `duplex`
    /// set, a blank page is inserted first when needed so that the image
    /// starts a new sheet.
    fn append_image_page(&self, image: &[u8], duplex: bool) -> Result<()>;

    /// Draws the appearance of each annotation into its page's content.
    /// `forms_only` is set when the host asked to flatten widgets only.
    fn flatten_annotations(&self, annotations: &[Annotation], forms_only: bool) -> Result<()>;

    /// Writes engine-side modifications (appended pages, flattened
    /// annotations) back to disk.
    fn persist(&self) -> Result<()>;
}

#[async_trait::async_trait]
pub trait DocumentProvider: Send + Sync {
    async fn open(&self, path: &Path) -> Result<Arc<dyn DocumentBackend>>;
}

/// File persistence for annotations and document saves.
pub trait DocumentPersistence: Send + Sync {
    /// Annotation XFDF previously saved for this document, if any.
    fn load_annotations(&self, info: &DocumentInfo) -> Result<Option<String>>;

    fn save(&self, document: &dyn DocumentBackend, xfdf: &str) -> Result<PathBuf>;
}

/// Keeps annotations in an `.xfdf` file next to the document.
#[derive(Debug, Default, Clone, Copy)]
pub struct SidecarPersistence;

impl SidecarPersistence {
    pub fn sidecar_path(document: &Path) -> PathBuf {
        let mut name = document.as_os_str().to_owned();
        name.push(".xfdf");
        PathBuf::from(name)
    }
}

impl DocumentPersistence for SidecarPersistence {
    fn load_annotations(&self, info: &DocumentInfo) -> Result<Option<String>> {
        let path = Self::sidecar_path(&info.path);
        if !path.exists() {
            return Ok(None);
        }
        let xfdf = fs::read_to_string(&path)
            .with_context(|| format!("failed to read annotations from {:?}", path))?;
        Ok(Some(xfdf))
    }

    fn save(&self, document: &dyn DocumentBackend, xfdf: &str) -> Result<PathBuf> {
        let info = document.info();
        document
            .persist()
            .with_context(|| format!("failed to persist {:?}", info.path))?;

        let path = Self::sidecar_path(&info.path);
        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp = PathBuf::from(tmp_name);
        let mut file = File::create(&tmp)
            .with_context(|| format!("failed to open temp annotation file {:?}", tmp))?;
        file.write_all(xfdf.as_bytes())?;
        file.flush()?;
        fs::rename(&tmp, &path)?;
        debug!(path = %path.display(), "annotations written");
        Ok(info.path.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeBackend;

    use tempfile::tempdir;

    #[test]
    fn crop_box_extent_ignores_orientation() {
        let crop = CropBox {
            left: 10.0,
            bottom: 800.0,
            right: 600.0,
            top: 0.0,
        };
        assert_eq!(crop.width(), 590.0);
        assert_eq!(crop.height(), 800.0);
    }

    #[test]
    fn sidecar_round_trips_annotations() {
        let dir = tempdir().unwrap();
        let doc_path = dir.path().join("report.pdf");
        std::fs::write(&doc_path, b"%PDF-1.7").unwrap();
        let backend = FakeBackend::with_path(&doc_path, 3);
        let persistence = SidecarPersistence;

        assert!(persistence.load_annotations(backend.info()).unwrap().is_none());

        let saved = persistence.save(&backend, "<xfdf/>").unwrap();
        assert_eq!(saved, doc_path);
        assert_eq!(backend.persist_calls(), 1);
        assert_eq!(
            persistence.load_annotations(backend.info()).unwrap().as_deref(),
            Some("<xfdf/>")
        );
        assert!(dir.path().join("report.pdf.xfdf").exists());
        assert!(!dir.path().join("report.pdf.xfdf.tmp").exists());
    }
}
