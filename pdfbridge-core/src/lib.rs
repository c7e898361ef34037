pub mod annotations;
pub mod backend;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod registry;
pub mod search;
pub mod session;
pub mod state;
pub mod tasks;
pub mod thumbnail;
pub mod view;

#[cfg(test)]
pub(crate) mod testing;

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use annotations::{
    Annotation, AnnotationFlag, AnnotationRef, AnnotationSet, AnnotationSync, ExportOptions,
    FieldFlag, FieldInput, FieldValue, FormField, PropertyValue, Rect, SyncState,
};
pub use backend::{
    CropBox, DocumentBackend, DocumentPersistence, DocumentProvider, OutlineItem, PageSize,
    RenderImage, SidecarPersistence, ThumbnailRequest,
};
pub use config::{BridgeConfig, ThumbnailConfig, ViewDefaults};
pub use dispatch::{Command, Dispatcher, Reply};
pub use error::{BatchReport, BridgeError, Result};
pub use registry::{SessionHandle, TagRegistry};
pub use search::{SearchMatch, SearchOptions};
pub use session::{Session, SessionEvent};
pub use state::{FileStateStore, MemoryStateStore, PersistedViewState, StateStore};
pub use tasks::{TaskHandle, TaskId, TaskKind, TaskManager};
pub use view::{ColorMode, Rotation, ToolMode};

/// Host-assigned identifier of one document view.
pub type ViewTag = i64;

pub type DocumentId = Uuid;

static DOCUMENT_NAMESPACE: Lazy<Uuid> = Lazy::new(|| {
    Uuid::parse_str("3f0c8a52-6d1e-5b7a-9c44-2e8b1d07f9a6").expect("valid namespace UUID")
});

/// Stable id of a document, derived from its canonical path.
pub fn document_id_for_path(path: &Path) -> DocumentId {
    let resolved = path
        .canonicalize()
        .or_else(|_| {
            if path.is_absolute() {
                Ok(path.to_path_buf())
            } else {
                std::env::current_dir().map(|cwd| cwd.join(path))
            }
        })
        .unwrap_or_else(|_| path.to_path_buf());
    let rendered = resolved.to_string_lossy();
    Uuid::new_v5(&DOCUMENT_NAMESPACE, rendered.as_bytes())
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DocumentInfo {
    pub id: DocumentId,
    pub path: PathBuf,
    /// Page count when the document was opened.
    pub page_count: usize,
    pub metadata: DocumentMetadata,
}
