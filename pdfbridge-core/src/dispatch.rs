//! Single entry point routing `(tag, command)` pairs to sessions.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use strum::IntoStaticStr;
use tracing::{debug, info, instrument, warn};

use crate::annotations::{
    AnnotationFlagChange, AnnotationRef, AnnotationSync, ExportOptions, FieldFlag, FieldInput,
    PropertyValue,
};
use crate::backend::{
    CropBox, DocumentBackend, DocumentPersistence, DocumentProvider, OutlineItem, PageSize,
    ThumbnailRequest,
};
use crate::config::BridgeConfig;
use crate::error::{check_page, BatchReport, BridgeError, Result};
use crate::registry::TagRegistry;
use crate::search::{SearchMatch, SearchOptions};
use crate::session::{Session, SessionEvent};
use crate::state::StateStore;
use crate::tasks::{TaskHandle, TaskManager};
use crate::thumbnail::decode_base64_image;
use crate::view::{ColorMode, ToolMode};
use crate::ViewTag;

/// Every operation the host can address to a view.
///
/// Page numbers are 1-based.
#[derive(Debug, Clone, Deserialize, IntoStaticStr)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum Command {
    SetToolMode {
        tool_mode: ToolMode,
    },
    CommitTool,
    SetCurrentPage {
        page_number: usize,
    },
    JumpTo {
        page_number: usize,
    },
    Rotate {
        #[serde(default)]
        ccw: bool,
    },
    SetColorMode {
        color_mode: ColorMode,
    },
    SetContinuous {
        continuous: bool,
    },
    SetZoom {
        zoom: f64,
    },
    GetDimensions,
    GetPageCropBox {
        page_number: usize,
    },
    #[serde(alias = "getCurrentPage")]
    CurrentPage,
    GetPageCount,
    GetZoom,
    CloseAllTabs,

    ExportAnnotations {
        #[serde(default)]
        options: ExportOptions,
    },
    ImportAnnotations {
        xfdf: String,
    },
    ImportAnnotationCommand {
        xfdf_command: String,
        #[serde(default)]
        initial_load: bool,
    },
    FlattenAnnotations {
        #[serde(default)]
        forms_only: bool,
    },
    DeleteAnnotations {
        annotations: Vec<AnnotationRef>,
    },
    SetAnnotationFlags {
        annotations: Vec<AnnotationFlagChange>,
    },
    SelectAnnotation {
        id: String,
        page_number: usize,
    },
    SetAnnotationProperties {
        id: String,
        page_number: usize,
        properties: BTreeMap<String, PropertyValue>,
    },

    SetFieldFlags {
        fields: Vec<String>,
        flag: FieldFlag,
        value: bool,
    },
    SetFieldValues {
        values: BTreeMap<String, FieldInput>,
    },

    ImportBookmarkJson {
        bookmark_json: String,
    },
    ExportBookmarkJson,
    AddBookmark,
    GetOutline,

    Search {
        query: String,
        #[serde(default)]
        case_sensitive: bool,
        #[serde(default)]
        whole_word: bool,
    },
    ClearSearch,
    /// Older form of `search` without options.
    FindText {
        query: String,
    },
    /// Older form of `clearSearch`.
    CancelFindText,
    FindTextResult {
        #[serde(default = "forward")]
        next: bool,
    },

    SaveDocument,
    GetThumbnail {
        page_number: usize,
    },
    AbortGetThumbnail,

    GetDocumentPath,
    ChangeBackground {
        red: i64,
        green: i64,
        blue: i64,
    },
    AppendSchoolLogo {
        base64_image: String,
        #[serde(default)]
        duplex: bool,
    },
    ToggleSlider {
        visible: bool,
    },
    ShowSettings,
}

fn forward() -> bool {
    true
}

impl Command {
    pub fn name(&self) -> &'static str {
        self.into()
    }
}

/// Result of a dispatched command. Asynchronous commands return the handle
/// their completion arrives on.
#[derive(Debug)]
pub enum Reply {
    Done,
    Bool(bool),
    Count(usize),
    Page(usize),
    Zoom(f64),
    Dimensions(PageSize),
    CropBox(CropBox),
    Outline(Vec<OutlineItem>),
    Text(String),
    Path(PathBuf),
    Matches(Vec<SearchMatch>),
    Match(Option<SearchMatch>),
    Batch(BatchReport),
    Thumbnail(TaskHandle<String>),
    Saved(TaskHandle<PathBuf>),
}

pub struct Dispatcher {
    registry: Arc<TagRegistry>,
    tasks: TaskManager,
    store: Arc<dyn StateStore>,
    persistence: Arc<dyn DocumentPersistence>,
    config: BridgeConfig,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<TagRegistry>,
        tasks: TaskManager,
        store: Arc<dyn StateStore>,
        persistence: Arc<dyn DocumentPersistence>,
        config: BridgeConfig,
    ) -> Self {
        Self {
            registry,
            tasks,
            store,
            persistence,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<TagRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Opens a document through the engine and registers a view for it.
    #[instrument(skip(self, provider), fields(path = %path.display()))]
    pub async fn open_view(
        &self,
        tag: ViewTag,
        provider: &dyn DocumentProvider,
        path: &Path,
    ) -> Result<()> {
        if self.registry.contains(tag) {
            return Err(BridgeError::DuplicateTag(tag));
        }
        let document = provider.open(path).await?;
        self.attach(tag, document)
    }

    /// Registers a view over an already opened document, restoring its
    /// persisted view state and saved annotations.
    pub fn attach(&self, tag: ViewTag, document: Arc<dyn DocumentBackend>) -> Result<()> {
        let info = document.info().clone();
        let persisted = self.store.load(&info)?;
        let annotations = match self.persistence.load_annotations(&info)? {
            Some(xfdf) => AnnotationSync::from_document_xfdf(&xfdf)?,
            None => AnnotationSync::default(),
        };
        let session = Session::new(tag, document, &self.config.view, persisted, annotations);
        let page = session.current_page();
        self.registry.register(tag, session)?;
        info!(tag, page, path = %info.path.display(), "document view opened");
        Ok(())
    }

    /// Unregisters a view and persists its view state. Closing an unknown
    /// tag does nothing.
    pub fn close_view(&self, tag: ViewTag) -> Result<()> {
        let Some(handle) = self.registry.unregister(tag) else {
            return Ok(());
        };
        let session = handle.lock();
        self.store
            .save(session.document().info(), session.persisted_state())?;
        Ok(())
    }

    pub fn drain_events(&self, tag: ViewTag) -> Result<Vec<SessionEvent>> {
        let handle = self.registry.resolve(tag)?;
        let events = handle.lock().drain_events();
        Ok(events)
    }

    #[instrument(skip(self, command), fields(op = command.name()))]
    pub fn dispatch(&self, tag: ViewTag, command: Command) -> Result<Reply> {
        let handle = self.registry.resolve(tag)?;
        let mut session = handle.lock();
        let result = self.execute(&mut session, command);
        if let Err(err) = &result {
            debug!(kind = err.kind(), error = %err, "command rejected");
        }
        result
    }

    fn execute(&self, session: &mut Session, command: Command) -> Result<Reply> {
        let reply = match command {
            Command::SetToolMode { tool_mode } => {
                session.set_tool_mode(tool_mode);
                Reply::Done
            }
            Command::CommitTool => Reply::Bool(session.commit_tool()),
            Command::SetCurrentPage { page_number } | Command::JumpTo { page_number } => {
                session.set_current_page(page_number)?;
                Reply::Done
            }
            Command::Rotate { ccw } => {
                session.rotate(ccw);
                Reply::Done
            }
            Command::SetColorMode { color_mode } => {
                session.set_color_mode(color_mode);
                Reply::Done
            }
            Command::SetContinuous { continuous } => {
                session.set_continuous(continuous);
                Reply::Done
            }
            Command::SetZoom { zoom } => {
                session.set_zoom(zoom)?;
                Reply::Done
            }
            Command::GetDimensions => Reply::Dimensions(session.dimensions()?),
            Command::GetPageCropBox { page_number } => {
                Reply::CropBox(session.crop_box(page_number)?)
            }
            Command::CurrentPage => Reply::Page(session.current_page()),
            Command::GetPageCount => Reply::Count(session.page_count()),
            Command::GetZoom => Reply::Zoom(session.zoom()),
            Command::CloseAllTabs => {
                session.teardown();
                self.store
                    .save(session.document().info(), session.persisted_state())?;
                Reply::Done
            }

            Command::ExportAnnotations { options } => {
                Reply::Text(session.annotations().export(&options)?)
            }
            Command::ImportAnnotations { xfdf } => {
                session.annotations_mut().import(&xfdf)?;
                session.prune_selection();
                session.notify_annotations_changed();
                Reply::Done
            }
            Command::ImportAnnotationCommand {
                xfdf_command,
                initial_load,
            } => {
                let applied = session
                    .annotations_mut()
                    .receive(&xfdf_command, initial_load)?;
                debug!(sequence = applied.sequence, origin = ?applied.origin, "annotation command applied");
                session.prune_selection();
                session.notify_annotations_changed();
                Reply::Done
            }
            Command::FlattenAnnotations { forms_only } => {
                let targets = session.annotations().flatten_targets(forms_only);
                session
                    .document()
                    .flatten_annotations(&targets, forms_only)?;
                let flattened = session.annotations_mut().flatten(forms_only).len();
                debug!(flattened, forms_only, "annotations flattened");
                session.prune_selection();
                session.notify_annotations_changed();
                Reply::Count(flattened)
            }
            Command::DeleteAnnotations { annotations } => {
                let removed = session.annotations_mut().delete(&annotations);
                session.prune_selection();
                if removed > 0 {
                    session.notify_annotations_changed();
                }
                Reply::Count(removed)
            }
            Command::SetAnnotationFlags { annotations } => {
                let report = session.annotations_mut().set_flags(&annotations);
                Self::batch(session, report)
            }
            Command::SelectAnnotation { id, page_number } => {
                session.select_annotation(&id, page_number)?;
                Reply::Done
            }
            Command::SetAnnotationProperties {
                id,
                page_number,
                properties,
            } => {
                check_page(page_number, session.page_count())?;
                let report = session
                    .annotations_mut()
                    .set_properties(&id, page_number, &properties)?;
                Self::batch(session, report)
            }

            Command::SetFieldFlags {
                fields,
                flag,
                value,
            } => {
                let report = session
                    .annotations_mut()
                    .set_field_flags(&fields, flag, value);
                Self::batch(session, report)
            }
            Command::SetFieldValues { values } => {
                let report = session.annotations_mut().set_field_values(&values);
                Self::batch(session, report)
            }

            Command::ImportBookmarkJson { bookmark_json } => {
                Reply::Batch(session.import_bookmarks(&bookmark_json)?)
            }
            Command::ExportBookmarkJson => Reply::Text(session.export_bookmarks()?),
            Command::AddBookmark => {
                session.add_bookmark();
                Reply::Done
            }
            Command::GetOutline => Reply::Outline(session.outline()?),

            Command::Search {
                query,
                case_sensitive,
                whole_word,
            } => Reply::Matches(session.search(
                &query,
                SearchOptions {
                    case_sensitive,
                    whole_word,
                },
            )?),
            Command::FindText { query } => {
                Reply::Matches(session.search(&query, SearchOptions::default())?)
            }
            Command::ClearSearch | Command::CancelFindText => {
                session.clear_search();
                Reply::Done
            }
            Command::FindTextResult { next } => Reply::Match(session.find_text_result(next)),

            Command::SaveDocument => {
                let xfdf = session.annotations().export(&ExportOptions::default())?;
                let events = session.events();
                let handle = self.tasks.start_save(
                    Arc::clone(session.document()),
                    Arc::clone(&self.persistence),
                    xfdf,
                    move |path| {
                        events.lock().push(SessionEvent::DocumentSaved {
                            path: path.display().to_string(),
                        });
                    },
                );
                Reply::Saved(handle)
            }
            Command::GetThumbnail { page_number } => {
                check_page(page_number, session.page_count())?;
                let request = ThumbnailRequest {
                    page_index: page_number - 1,
                    max_dimension: self.config.thumbnail.max_dimension,
                    dark_mode: session.color_mode().is_dark(),
                };
                let document = Arc::clone(session.document());
                let handle = self
                    .tasks
                    .start_thumbnail(session.thumbnail_slot(), document, request);
                Reply::Thumbnail(handle)
            }
            Command::AbortGetThumbnail => {
                if session.abort_thumbnail() {
                    debug!(tag = session.tag(), "thumbnail aborted");
                }
                Reply::Done
            }

            Command::GetDocumentPath => Reply::Path(session.document_path().to_path_buf()),
            Command::ChangeBackground { red, green, blue } => {
                session.change_background(red, green, blue)?;
                Reply::Done
            }
            Command::AppendSchoolLogo {
                base64_image,
                duplex,
            } => {
                let (image, format) = decode_base64_image(&base64_image)
                    .map_err(|reason| BridgeError::invalid_argument("base64Image", reason))?;
                let before = session.page_count();
                session.document().append_image_page(&image, duplex)?;
                info!(
                    tag = session.tag(),
                    ?format,
                    pages_added = session.page_count().saturating_sub(before),
                    "image page appended"
                );
                session.notify_annotations_changed();
                Reply::Count(session.page_count())
            }
            Command::ToggleSlider { visible } => {
                session.toggle_slider(visible);
                Reply::Done
            }
            Command::ShowSettings => {
                session.show_settings();
                Reply::Done
            }
        };
        Ok(reply)
    }

    fn batch(session: &Session, report: BatchReport) -> Reply {
        if !report.applied.is_empty() {
            session.notify_annotations_changed();
        }
        for rejected in &report.rejected {
            warn!(tag = session.tag(), error = %rejected, "batch entry rejected");
        }
        Reply::Batch(report)
    }
}
