use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::annotations::{AnnotationRef, AnnotationSync};
use crate::backend::{CropBox, DocumentBackend, OutlineItem, PageSize};
use crate::config::ViewDefaults;
use crate::error::{check_page, BatchReport, BridgeError, Result};
use crate::search::{self, SearchMatch, SearchOptions, SearchState};
use crate::state::PersistedViewState;
use crate::tasks::PendingTask;
use crate::view::{ColorMode, Rotation, ToolMode};
use crate::ViewTag;

/// Notifications queued for the host between commands.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum SessionEvent {
    PageChanged { page: usize },
    RedrawNeeded,
    SettingsRequested,
    SliderToggled { visible: bool },
    AnnotationsChanged,
    DocumentSaved { path: String },
}

pub type EventQueue = Arc<Mutex<Vec<SessionEvent>>>;

/// Live state of one document view.
pub struct Session {
    tag: ViewTag,
    document: Arc<dyn DocumentBackend>,
    state: PersistedViewState,
    tool_mode: ToolMode,
    search: Option<SearchState>,
    annotations: AnnotationSync,
    thumbnail: Option<PendingTask>,
    background: [u8; 3],
    slider_visible: bool,
    selected_annotation: Option<AnnotationRef>,
    events: EventQueue,
}

impl Session {
    /// Builds a session from configured defaults overlaid by the state
    /// persisted for this document, if any. A restored page beyond the
    /// document's end is clamped to its last page.
    pub fn new(
        tag: ViewTag,
        document: Arc<dyn DocumentBackend>,
        defaults: &ViewDefaults,
        persisted: Option<PersistedViewState>,
        annotations: AnnotationSync,
    ) -> Self {
        let mut state = persisted.unwrap_or_else(|| PersistedViewState {
            zoom: defaults.zoom,
            continuous: defaults.continuous,
            color_mode: defaults.color_mode,
            ..PersistedViewState::default()
        });
        let page_count = document.page_count().max(1);
        state.current_page = state.current_page.clamp(1, page_count);
        if !(state.zoom.is_finite() && state.zoom > 0.0) {
            state.zoom = defaults.zoom;
        }

        Self {
            tag,
            document,
            state,
            tool_mode: defaults.tool_mode,
            search: None,
            annotations,
            thumbnail: None,
            background: [255, 255, 255],
            slider_visible: true,
            selected_annotation: None,
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn tag(&self) -> ViewTag {
        self.tag
    }

    pub fn document(&self) -> &Arc<dyn DocumentBackend> {
        &self.document
    }

    pub fn document_path(&self) -> &Path {
        &self.document.info().path
    }

    pub fn page_count(&self) -> usize {
        self.document.page_count()
    }

    pub fn persisted_state(&self) -> &PersistedViewState {
        &self.state
    }

    pub fn events(&self) -> EventQueue {
        Arc::clone(&self.events)
    }

    pub fn drain_events(&self) -> Vec<SessionEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    fn emit(&self, event: SessionEvent) {
        self.events.lock().push(event);
    }

    pub fn current_page(&self) -> usize {
        self.state.current_page
    }

    /// Moves to a 1-based page. Out-of-range pages leave the session
    /// untouched.
    pub fn set_current_page(&mut self, page: usize) -> Result<()> {
        check_page(page, self.page_count())?;
        if page != self.state.current_page {
            self.state.current_page = page;
            self.emit(SessionEvent::PageChanged { page });
        }
        Ok(())
    }

    pub fn zoom(&self) -> f64 {
        self.state.zoom
    }

    pub fn set_zoom(&mut self, zoom: f64) -> Result<()> {
        if !(zoom.is_finite() && zoom > 0.0) {
            return Err(BridgeError::invalid_argument(
                "zoom",
                format!("{zoom} is not a positive number"),
            ));
        }
        if (self.state.zoom - zoom).abs() > f64::EPSILON {
            self.state.zoom = zoom;
            self.emit(SessionEvent::RedrawNeeded);
        }
        Ok(())
    }

    pub fn tool_mode(&self) -> ToolMode {
        self.tool_mode
    }

    pub fn set_tool_mode(&mut self, mode: ToolMode) {
        self.tool_mode = mode;
    }

    /// Finishes the stroke or vertex set the active tool is collecting.
    /// Returns whether the tool had anything to commit.
    pub fn commit_tool(&mut self) -> bool {
        let committed = self.tool_mode.is_multi_step();
        if committed {
            self.emit(SessionEvent::AnnotationsChanged);
        }
        committed
    }

    pub fn rotation(&self) -> Rotation {
        self.state.rotation
    }

    pub fn rotate(&mut self, counter_clockwise: bool) {
        self.state.rotation = self.state.rotation.rotated(counter_clockwise);
        self.emit(SessionEvent::RedrawNeeded);
    }

    pub fn color_mode(&self) -> ColorMode {
        self.state.color_mode
    }

    pub fn set_color_mode(&mut self, mode: ColorMode) {
        if self.state.color_mode != mode {
            self.state.color_mode = mode;
            self.emit(SessionEvent::RedrawNeeded);
        }
    }

    pub fn continuous(&self) -> bool {
        self.state.continuous
    }

    pub fn set_continuous(&mut self, continuous: bool) {
        if self.state.continuous != continuous {
            self.state.continuous = continuous;
            self.emit(SessionEvent::RedrawNeeded);
        }
    }

    /// Size of the current page.
    pub fn dimensions(&self) -> Result<PageSize> {
        Ok(self.document.page_size(self.state.current_page - 1)?)
    }

    pub fn crop_box(&self, page: usize) -> Result<CropBox> {
        check_page(page, self.page_count())?;
        Ok(self.document.crop_box(page - 1)?)
    }

    pub fn outline(&self) -> Result<Vec<OutlineItem>> {
        Ok(self.document.outline()?)
    }

    pub fn search_state(&self) -> Option<&SearchState> {
        self.search.as_ref()
    }

    /// Runs a search over every page and makes it the active one.
    #[instrument(skip(self), fields(tag = self.tag))]
    pub fn search(&mut self, query: &str, options: SearchOptions) -> Result<Vec<SearchMatch>> {
        let mut matches = Vec::new();
        if !query.is_empty() {
            let matcher = search::build_matcher(query, options)?;
            for page_index in 0..self.page_count() {
                let text = self.document.page_text(page_index)?;
                matches.extend(search::find_in_page(&matcher, page_index + 1, &text));
            }
        }
        debug!(matches = matches.len(), "search complete");
        self.search = Some(SearchState::new(
            query.to_string(),
            options,
            matches.clone(),
        ));
        Ok(matches)
    }

    pub fn clear_search(&mut self) {
        self.search = None;
    }

    /// Steps the active search cursor and returns the match now under it.
    pub fn find_text_result(&mut self, forward: bool) -> Option<SearchMatch> {
        let search = self.search.as_mut()?;
        let found = if forward {
            search.next_match()
        } else {
            search.previous_match()
        }
        .cloned()?;
        if found.page != self.state.current_page {
            self.state.current_page = found.page;
            self.emit(SessionEvent::PageChanged { page: found.page });
        }
        Some(found)
    }

    pub fn annotations(&self) -> &AnnotationSync {
        &self.annotations
    }

    pub fn annotations_mut(&mut self) -> &mut AnnotationSync {
        &mut self.annotations
    }

    pub fn notify_annotations_changed(&self) {
        self.emit(SessionEvent::AnnotationsChanged);
    }

    pub fn selected_annotation(&self) -> Option<&AnnotationRef> {
        self.selected_annotation.as_ref()
    }

    pub fn select_annotation(&mut self, id: &str, page: usize) -> Result<()> {
        check_page(page, self.page_count())?;
        self.annotations.locate(id, page)?;
        self.selected_annotation = Some(AnnotationRef {
            id: id.to_string(),
            page_number: Some(page),
        });
        Ok(())
    }

    /// Drops the selection if the selected annotation no longer exists.
    pub fn prune_selection(&mut self) {
        let stale = self
            .selected_annotation
            .as_ref()
            .is_some_and(|selected| self.annotations.get(&selected.id).is_none());
        if stale {
            self.selected_annotation = None;
        }
    }

    pub fn bookmarks(&self) -> &BTreeMap<usize, String> {
        &self.state.bookmarks
    }

    /// Bookmarks the current page as `Page N` and returns the title.
    pub fn add_bookmark(&mut self) -> String {
        let page = self.state.current_page;
        let title = format!("Page {page}");
        self.state.bookmarks.insert(page, title.clone());
        title
    }

    /// Replaces the user bookmarks from a JSON object mapping 0-based page
    /// indices to titles. Bad entries are reported and skipped.
    pub fn import_bookmarks(&mut self, json: &str) -> Result<BatchReport> {
        let entries: serde_json::Map<String, serde_json::Value> = serde_json::from_str(json)
            .map_err(|err| BridgeError::invalid_argument("bookmarkJson", err.to_string()))?;

        let page_count = self.page_count();
        let mut report = BatchReport::default();
        let mut bookmarks = BTreeMap::new();
        for (key, value) in entries {
            let Ok(index) = key.trim().parse::<usize>() else {
                report.rejected.push(BridgeError::invalid_argument(
                    key,
                    "bookmark key is not a page index",
                ));
                continue;
            };
            if index >= page_count {
                report.rejected.push(BridgeError::invalid_argument(
                    key,
                    format!("page index {index} is outside the document"),
                ));
                continue;
            }
            match value {
                serde_json::Value::String(title) if !title.trim().is_empty() => {
                    bookmarks.insert(index + 1, title);
                    report.applied.push(key);
                }
                _ => report.rejected.push(BridgeError::invalid_argument(
                    key,
                    "bookmark title must be a non-empty string",
                )),
            }
        }
        self.state.bookmarks = bookmarks;
        Ok(report)
    }

    /// Serializes the user bookmarks in the shape
    /// [`Session::import_bookmarks`] accepts.
    pub fn export_bookmarks(&self) -> Result<String> {
        let entries: BTreeMap<String, &String> = self
            .state
            .bookmarks
            .iter()
            .map(|(page, title)| ((page - 1).to_string(), title))
            .collect();
        serde_json::to_string(&entries).map_err(|err| BridgeError::Engine(err.into()))
    }

    pub fn background(&self) -> [u8; 3] {
        self.background
    }

    pub fn change_background(&mut self, red: i64, green: i64, blue: i64) -> Result<()> {
        let channel = |key: &str, value: i64| {
            u8::try_from(value).map_err(|_| {
                BridgeError::invalid_argument(key, format!("{value} is outside 0..=255"))
            })
        };
        let color = [
            channel("red", red)?,
            channel("green", green)?,
            channel("blue", blue)?,
        ];
        self.background = color;
        self.emit(SessionEvent::RedrawNeeded);
        Ok(())
    }

    pub fn slider_visible(&self) -> bool {
        self.slider_visible
    }

    pub fn toggle_slider(&mut self, visible: bool) {
        self.slider_visible = visible;
        self.emit(SessionEvent::SliderToggled { visible });
    }

    pub fn show_settings(&self) {
        self.emit(SessionEvent::SettingsRequested);
    }

    pub fn thumbnail_slot(&mut self) -> &mut Option<PendingTask> {
        &mut self.thumbnail
    }

    /// Aborts the outstanding thumbnail, if any. Safe to call repeatedly.
    pub fn abort_thumbnail(&mut self) -> bool {
        self.thumbnail
            .take()
            .is_some_and(|pending| pending.abort())
    }

    /// Releases transient state: the outstanding thumbnail, the active
    /// search and the selection. Persisted view state is kept.
    pub fn teardown(&mut self) {
        if self.abort_thumbnail() {
            debug!(tag = self.tag, "outstanding thumbnail aborted");
        }
        self.search = None;
        self.selected_annotation = None;
    }
}
