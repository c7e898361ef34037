use std::collections::BTreeMap;
use std::convert::TryFrom;
use std::fs;
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use pdfbridge_core::{
    document_id_for_path, Annotation, CropBox, DocumentBackend, DocumentInfo, DocumentMetadata,
    DocumentProvider, OutlineItem, PageSize, RenderImage, ThumbnailRequest,
};
use pdfium_render::prelude::*;
use tracing::{debug, instrument, warn};

use crate::{invert_pixels, needs_duplex_padding, thumbnail_scale};

const LIBRARY_PATH_ENV: &str = "PDFBRIDGE_PDFIUM_LIBRARY_PATH";

/// Margin around an appended image page, in points.
const IMAGE_PAGE_MARGIN: f32 = 36.0;

const FLATTENED_STROKE_WIDTH: f32 = 1.0;
const HIGHLIGHT_ALPHA: u8 = 96;

pub struct PdfiumRenderFactory {
    pdfium: Arc<Pdfium>,
}

impl PdfiumRenderFactory {
    pub fn new() -> Result<Self> {
        let pdfium = match bind_pdfium_from_env() {
            Some(pdfium) => pdfium,
            None => bind_pdfium_default()?,
        };
        Ok(Self {
            pdfium: Arc::new(pdfium),
        })
    }
}

#[async_trait]
impl DocumentProvider for PdfiumRenderFactory {
    async fn open(&self, path: &Path) -> Result<Arc<dyn DocumentBackend>> {
        let absolute = path
            .canonicalize()
            .with_context(|| format!("failed to resolve path for {:?}", path))?;
        let info = build_document_info(&self.pdfium, &absolute)?;
        Ok(Arc::new(PdfiumDocument::new(
            Arc::clone(&self.pdfium),
            absolute,
            info,
        )))
    }
}

pub struct PdfiumDocument {
    // Declared before `pdfium` so the document is dropped first.
    document: Mutex<Option<PdfDocument<'static>>>,
    pdfium: Arc<Pdfium>,
    path: PathBuf,
    info: DocumentInfo,
    page_count: AtomicUsize,
    outline_cache: Mutex<Option<Vec<OutlineItem>>>,
}

impl PdfiumDocument {
    fn new(pdfium: Arc<Pdfium>, path: PathBuf, info: DocumentInfo) -> Self {
        let page_count = AtomicUsize::new(info.page_count);
        Self {
            document: Mutex::new(None),
            pdfium,
            path,
            info,
            page_count,
            outline_cache: Mutex::new(None),
        }
    }

    fn open_document(&self) -> Result<PdfDocument<'static>> {
        let document = self
            .pdfium
            .load_pdf_from_file(&self.path, None)
            .with_context(|| format!("failed to open {:?}", self.path))?;
        // SAFETY: the document borrows the bindings owned by `self.pdfium`. It is only ever
        // stored in `self.document`, which is declared ahead of `pdfium` and therefore dropped
        // before the bindings it refers to.
        let document = unsafe { mem::transmute::<PdfDocument<'_>, PdfDocument<'static>>(document) };
        Ok(document)
    }

    fn with_document<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&PdfDocument<'static>) -> Result<R>,
    {
        self.with_document_mut(|document| f(document))
    }

    fn with_document_mut<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut PdfDocument<'static>) -> Result<R>,
    {
        let mut guard = self.document.lock();
        if guard.is_none() {
            *guard = Some(self.open_document()?);
        }
        match guard.as_mut() {
            Some(document) => f(document),
            None => Err(anyhow!("document {:?} is not loaded", self.path)),
        }
    }

    fn with_page<R, F>(&self, page_index: usize, f: F) -> Result<R>
    where
        F: FnOnce(&PdfPage<'_>) -> Result<R>,
    {
        self.with_document(|document| {
            let index = pdfium_page_index(page_index)?;
            let page = document
                .pages()
                .get(index)
                .with_context(|| format!("page {} out of range", page_index))?;
            f(&page)
        })
    }
}

impl DocumentBackend for PdfiumDocument {
    fn info(&self) -> &DocumentInfo {
        &self.info
    }

    fn page_count(&self) -> usize {
        self.page_count.load(Ordering::Acquire)
    }

    fn page_size(&self, page_index: usize) -> Result<PageSize> {
        self.with_page(page_index, |page| {
            Ok(PageSize {
                width: f64::from(page.width().value),
                height: f64::from(page.height().value),
            })
        })
    }

    fn crop_box(&self, page_index: usize) -> Result<CropBox> {
        self.with_page(page_index, |page| match page.boundaries().crop() {
            Ok(crop) => Ok(CropBox {
                left: f64::from(crop.bounds.left().value),
                bottom: f64::from(crop.bounds.bottom().value),
                right: f64::from(crop.bounds.right().value),
                top: f64::from(crop.bounds.top().value),
            }),
            // Pages without an explicit crop box are cropped to their media box.
            Err(_) => Ok(CropBox {
                left: 0.0,
                bottom: 0.0,
                right: f64::from(page.width().value),
                top: f64::from(page.height().value),
            }),
        })
    }

    fn outline(&self) -> Result<Vec<OutlineItem>> {
        if let Some(cached) = self.outline_cache.lock().as_ref() {
            return Ok(cached.clone());
        }

        let outline = self.with_document(|document| {
            let mut outline = Vec::new();
            if let Some(root) = document.bookmarks().root() {
                collect_outline(root, 0, &mut outline);
            }
            Ok(outline)
        })?;

        *self.outline_cache.lock() = Some(outline.clone());
        Ok(outline)
    }

    fn page_text(&self, page_index: usize) -> Result<String> {
        self.with_page(page_index, |page| {
            let text = page
                .text()
                .with_context(|| format!("failed to extract text for page {}", page_index))?;
            Ok(text.all())
        })
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    fn render_thumbnail(&self, request: ThumbnailRequest) -> Result<RenderImage> {
        self.with_page(request.page_index, |page| {
            let scale = thumbnail_scale(
                page.width().value,
                page.height().value,
                request.max_dimension,
            );
            let config = PdfRenderConfig::new().scale_page_by_factor(scale);
            let bitmap = page
                .render_with_config(&config)
                .with_context(|| format!("failed to render page {}", request.page_index))?;
            let mut pixels = bitmap.as_image().to_rgba8().into_raw();

            if request.dark_mode {
                invert_pixels(&mut pixels);
            }

            Ok(RenderImage {
                width: u32::try_from(bitmap.width()).unwrap_or_default(),
                height: u32::try_from(bitmap.height()).unwrap_or_default(),
                pixels,
            })
        })
    }

    #[instrument(skip(self, image), fields(path = %self.path.display(), bytes = image.len()))]
    fn append_image_page(&self, image: &[u8], duplex: bool) -> Result<()> {
        let image = image::load_from_memory(image).context("failed to decode appended image")?;

        let count = self.with_document_mut(|document| {
            let pages = document.pages_mut();
            let existing = usize::try_from(pages.len()).unwrap_or_default();
            if needs_duplex_padding(existing, duplex) {
                pages
                    .create_page_at_end(PdfPagePaperSize::a4())
                    .context("failed to insert duplex padding page")?;
            }

            let mut page = pages
                .create_page_at_end(PdfPagePaperSize::a4())
                .context("failed to create image page")?;
            let (width, height) = fit_image(
                image.width() as f32,
                image.height() as f32,
                page.width().value,
                page.height().value,
            );
            let x = (page.width().value - width) / 2.0;
            let y = (page.height().value - height) / 2.0;
            page.objects_mut()
                .create_image_object(
                    PdfPoints::new(x),
                    PdfPoints::new(y),
                    &image,
                    Some(PdfPoints::new(width)),
                    Some(PdfPoints::new(height)),
                )
                .context("failed to place image on page")?;
            page.regenerate_content()
                .context("failed to regenerate page content")?;

            Ok(usize::try_from(pages.len()).unwrap_or_default())
        })?;

        self.page_count.store(count, Ordering::Release);
        debug!(page_count = count, duplex, "image page appended");
        Ok(())
    }

    #[instrument(skip(self, annotations), fields(count = annotations.len()))]
    fn flatten_annotations(&self, annotations: &[Annotation], forms_only: bool) -> Result<()> {
        let mut by_page: BTreeMap<usize, Vec<&Annotation>> = BTreeMap::new();
        for annotation in annotations {
            by_page.entry(annotation.page).or_default().push(annotation);
        }

        self.with_document_mut(|document| {
            for (page_number, annotations) in &by_page {
                let index = pdfium_page_index(page_number.saturating_sub(1))?;
                let mut page = document
                    .pages_mut()
                    .get(index)
                    .with_context(|| format!("page {} out of range", page_number))?;
                for annotation in annotations {
                    let (stroke, fill) = flattened_colors(annotation);
                    page.objects_mut()
                        .create_path_object_rect(
                            annotation_bounds(annotation),
                            stroke,
                            stroke.map(|_| PdfPoints::new(FLATTENED_STROKE_WIDTH)),
                            fill,
                        )
                        .with_context(|| format!("failed to draw annotation {}", annotation.id))?;
                }
                page.regenerate_content()
                    .context("failed to regenerate page content")?;
            }
            Ok(())
        })?;

        debug!(pages = by_page.len(), forms_only, "annotations flattened into page content");
        Ok(())
    }

    fn persist(&self) -> Result<()> {
        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp = PathBuf::from(tmp_name);
        self.with_document(|document| {
            document
                .save_to_file(&tmp)
                .with_context(|| format!("failed to write {:?}", tmp))
        })?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to replace {:?}", self.path))?;
        Ok(())
    }
}

fn pdfium_page_index(page_index: usize) -> Result<PdfPageIndex> {
    page_index
        .try_into()
        .map_err(|_| anyhow!("page {} is out of supported range", page_index))
}

/// Largest size with the image's aspect ratio that fits the page margins.
fn fit_image(image_width: f32, image_height: f32, page_width: f32, page_height: f32) -> (f32, f32) {
    let max_width = (page_width - 2.0 * IMAGE_PAGE_MARGIN).max(1.0);
    let max_height = (page_height - 2.0 * IMAGE_PAGE_MARGIN).max(1.0);
    if image_width <= 0.0 || image_height <= 0.0 {
        return (max_width, max_height);
    }
    let scale = (max_width / image_width).min(max_height / image_height);
    (image_width * scale, image_height * scale)
}

/// Annotation rect normalised to pdfium's bottom/left/top/right order.
fn annotation_bounds(annotation: &Annotation) -> PdfRect {
    let rect = annotation.rect;
    PdfRect::new_from_values(
        rect.y1.min(rect.y2) as f32,
        rect.x1.min(rect.x2) as f32,
        rect.y1.max(rect.y2) as f32,
        rect.x1.max(rect.x2) as f32,
    )
}

/// `#RRGGBB` to its channels.
fn parse_hex_color(raw: &str) -> Option<(u8, u8, u8)> {
    let hex = raw.strip_prefix('#')?;
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |at: usize| u8::from_str_radix(&hex[at..at + 2], 16).ok();
    Some((channel(0)?, channel(2)?, channel(4)?))
}

/// Highlights become a translucent fill; everything else an outline.
fn flattened_colors(annotation: &Annotation) -> (Option<PdfColor>, Option<PdfColor>) {
    let (r, g, b) = annotation
        .color
        .as_deref()
        .and_then(parse_hex_color)
        .unwrap_or((0, 0, 0));
    if annotation.subtype == "highlight" {
        (None, Some(PdfColor::new(r, g, b, HIGHLIGHT_ALPHA)))
    } else {
        (Some(PdfColor::new(r, g, b, 255)), None)
    }
}

fn collect_outline(mut bookmark: PdfBookmark<'_>, depth: usize, out: &mut Vec<OutlineItem>) {
    loop {
        if let Some(title) = bookmark.title() {
            if let Some(destination) = bookmark.destination() {
                if let Ok(page_index) = destination.page_index() {
                    out.push(OutlineItem {
                        title,
                        page_number: page_index as usize + 1,
                        depth,
                    });
                }
            }
        }

        if let Some(child) = bookmark.first_child() {
            collect_outline(child, depth + 1, out);
        }

        match bookmark.next_sibling() {
            Some(next) => bookmark = next,
            None => break,
        }
    }
}

fn build_document_info(pdfium: &Pdfium, path: &Path) -> Result<DocumentInfo> {
    let document = pdfium
        .load_pdf_from_file(path, None)
        .with_context(|| format!("failed to open {:?}", path))?;
    let page_count = usize::try_from(document.pages().len()).unwrap_or_default();
    let metadata = document.metadata();

    let title = metadata
        .get(PdfDocumentMetadataTagType::Title)
        .map(|t| t.value().to_owned());
    let author = metadata
        .get(PdfDocumentMetadataTagType::Author)
        .map(|t| t.value().to_owned());

    Ok(DocumentInfo {
        id: document_id_for_path(path),
        path: path.to_path_buf(),
        page_count,
        metadata: DocumentMetadata { title, author },
    })
}

fn bind_pdfium_from_env() -> Option<Pdfium> {
    let path = std::env::var(LIBRARY_PATH_ENV).ok()?;
    if path.is_empty() {
        return None;
    }
    match Pdfium::bind_to_library(&path) {
        Ok(bindings) => Some(Pdfium::new(bindings)),
        Err(err) => {
            warn!("failed to load Pdfium from {}={}: {}", LIBRARY_PATH_ENV, path, err);
            None
        }
    }
}

fn bind_pdfium_default() -> Result<Pdfium> {
    let mut errors = Vec::new();

    let cwd_path = Pdfium::pdfium_platform_library_name_at_path("./");
    match Pdfium::bind_to_library(&cwd_path) {
        Ok(bindings) => return Ok(Pdfium::new(bindings)),
        Err(err) => errors.push(format!("{}: {}", cwd_path.display(), err)),
    }

    match Pdfium::bind_to_system_library() {
        Ok(bindings) => Ok(Pdfium::new(bindings)),
        Err(err) => {
            errors.push(format!("system: {err}"));
            Err(anyhow!(
                "failed to bind to a pdfium library; set {} or install it ({})",
                LIBRARY_PATH_ENV,
                errors.join(", ")
            ))
        }
    }
}
