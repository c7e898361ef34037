//! Scripted document engine for unit tests.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use parking_lot::{Condvar, Mutex};

use crate::annotations::Annotation;
use crate::backend::{
    CropBox, DocumentBackend, DocumentProvider, OutlineItem, PageSize, RenderImage,
    ThumbnailRequest,
};
use crate::{document_id_for_path, DocumentInfo, DocumentMetadata};

/// Holds thumbnail renders until released, so tests can abort or supersede
/// a task while it is provably in flight.
#[derive(Default)]
pub struct RenderGate {
    open: Mutex<bool>,
    released: Condvar,
    entered: Mutex<usize>,
    arrived: Condvar,
}

impl RenderGate {
    pub fn release(&self) {
        *self.open.lock() = true;
        self.released.notify_all();
    }

    /// Blocks until `count` renders have reached the gate.
    pub fn wait_for_renders(&self, count: usize) {
        let mut entered = self.entered.lock();
        while *entered < count {
            self.arrived.wait(&mut entered);
        }
    }

    fn pass(&self) {
        {
            let mut entered = self.entered.lock();
            *entered += 1;
            self.arrived.notify_all();
        }
        let mut open = self.open.lock();
        while !*open {
            self.released.wait(&mut open);
        }
    }
}

pub struct FakeBackend {
    info: DocumentInfo,
    pages: AtomicUsize,
    texts: Mutex<HashMap<usize, String>>,
    gate: Option<Arc<RenderGate>>,
    fail_renders: AtomicBool,
    persist_calls: AtomicUsize,
    appended: Mutex<Vec<(usize, bool)>>,
    flattened: Mutex<Vec<String>>,
    fail_flatten: AtomicBool,
}

impl FakeBackend {
    pub fn new(page_count: usize) -> Self {
        Self::with_path(Path::new("/tmp/fake.pdf"), page_count)
    }

    pub fn with_path(path: &Path, page_count: usize) -> Self {
        Self {
            info: DocumentInfo {
                id: document_id_for_path(path),
                path: path.to_path_buf(),
                page_count,
                metadata: DocumentMetadata::default(),
            },
            pages: AtomicUsize::new(page_count),
            texts: Mutex::new(HashMap::new()),
            gate: None,
            fail_renders: AtomicBool::new(false),
            persist_calls: AtomicUsize::new(0),
            appended: Mutex::new(Vec::new()),
            flattened: Mutex::new(Vec::new()),
            fail_flatten: AtomicBool::new(false),
        }
    }

    pub fn gated(mut self, gate: Arc<RenderGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Sets the text of a 1-based page.
    pub fn with_text(self, page: usize, text: &str) -> Self {
        self.texts.lock().insert(page - 1, text.to_string());
        self
    }

    pub fn fail_renders(&self) {
        self.fail_renders.store(true, Ordering::SeqCst);
    }

    pub fn persist_calls(&self) -> usize {
        self.persist_calls.load(Ordering::SeqCst)
    }

    /// Sizes of the appended images and their duplex flags.
    pub fn appended(&self) -> Vec<(usize, bool)> {
        self.appended.lock().clone()
    }

    /// Ids of the annotations drawn into page content, in call order.
    pub fn flattened(&self) -> Vec<String> {
        self.flattened.lock().clone()
    }

    pub fn fail_flatten(&self) {
        self.fail_flatten.store(true, Ordering::SeqCst);
    }

    fn check_index(&self, page_index: usize) -> Result<()> {
        if page_index >= self.page_count() {
            bail!("page index {page_index} out of range");
        }
        Ok(())
    }
}

impl DocumentBackend for FakeBackend {
    fn info(&self) -> &DocumentInfo {
        &self.info
    }

    fn page_count(&self) -> usize {
        self.pages.load(Ordering::SeqCst)
    }

    fn page_size(&self, page_index: usize) -> Result<PageSize> {
        self.check_index(page_index)?;
        Ok(PageSize {
            width: 612.0,
            height: 792.0,
        })
    }

    fn crop_box(&self, page_index: usize) -> Result<CropBox> {
        self.check_index(page_index)?;
        Ok(CropBox {
            left: 0.0,
            bottom: 0.0,
            right: 612.0,
            top: 792.0,
        })
    }

    fn outline(&self) -> Result<Vec<OutlineItem>> {
        Ok(vec![
            OutlineItem {
                title: "Introduction".to_string(),
                page_number: 1,
                depth: 0,
            },
            OutlineItem {
                title: "Details".to_string(),
                page_number: self.page_count(),
                depth: 1,
            },
        ])
    }

    fn page_text(&self, page_index: usize) -> Result<String> {
        self.check_index(page_index)?;
        Ok(self
            .texts
            .lock()
            .get(&page_index)
            .cloned()
            .unwrap_or_default())
    }

    fn render_thumbnail(&self, request: ThumbnailRequest) -> Result<RenderImage> {
        if let Some(gate) = &self.gate {
            gate.pass();
        }
        if self.fail_renders.load(Ordering::SeqCst) {
            return Err(anyhow!("render failed"));
        }
        self.check_index(request.page_index)?;
        let shade = if request.dark_mode { 0x20 } else { 0xe0 };
        Ok(RenderImage {
            width: 2,
            height: 3,
            pixels: vec![shade; 2 * 3 * 4],
        })
    }

    fn append_image_page(&self, image: &[u8], duplex: bool) -> Result<()> {
        let pad = duplex && self.page_count() % 2 == 1;
        let added = if pad { 2 } else { 1 };
        self.pages.fetch_add(added, Ordering::SeqCst);
        self.appended.lock().push((image.len(), duplex));
        Ok(())
    }

    fn flatten_annotations(&self, annotations: &[Annotation], _forms_only: bool) -> Result<()> {
        if self.fail_flatten.load(Ordering::SeqCst) {
            return Err(anyhow!("flatten failed"));
        }
        for annotation in annotations {
            self.check_index(annotation.page.saturating_sub(1))?;
        }
        self.flattened
            .lock()
            .extend(annotations.iter().map(|annotation| annotation.id.clone()));
        Ok(())
    }

    fn persist(&self) -> Result<()> {
        self.persist_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Opens every path as a [`FakeBackend`] with a fixed page count, except
/// paths named `missing.pdf`.
pub struct FakeProvider {
    pub page_count: usize,
}

#[async_trait::async_trait]
impl DocumentProvider for FakeProvider {
    async fn open(&self, path: &Path) -> Result<Arc<dyn DocumentBackend>> {
        if path.file_name().is_some_and(|name| name == "missing.pdf") {
            bail!("no such document: {}", path.display());
        }
        Ok(Arc::new(FakeBackend::with_path(path, self.page_count)))
    }
}
