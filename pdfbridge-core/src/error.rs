use thiserror::Error;

use crate::ViewTag;

pub type Result<T, E = BridgeError> = std::result::Result<T, E>;

/// Failures raised at the command boundary.
///
/// Engine failures are carried through untouched in [`BridgeError::Engine`];
/// everything else is validation performed by this layer before any session
/// state is mutated.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("no document view is registered under tag {0}")]
    UnknownTag(ViewTag),

    #[error("a document view is already registered under tag {0}")]
    DuplicateTag(ViewTag),

    #[error("page {page} is outside the document (1..={page_count})")]
    InvalidPage { page: usize, page_count: usize },

    #[error("invalid argument `{key}`: {reason}")]
    InvalidArgument { key: String, reason: String },

    #[error(transparent)]
    Engine(#[from] anyhow::Error),
}

impl BridgeError {
    pub fn invalid_argument(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Stable, host-facing name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownTag(_) => "unknownTag",
            Self::DuplicateTag(_) => "duplicateTag",
            Self::InvalidPage { .. } => "invalidPage",
            Self::InvalidArgument { .. } => "invalidArgument",
            Self::Engine(_) => "engine",
        }
    }
}

/// Outcome of a batch call. Batches are best-effort rather than
/// transactional: valid entries are applied, and every invalid entry is
/// reported here without failing the call.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Keys of the entries that were applied, in processing order.
    pub applied: Vec<String>,
    pub rejected: Vec<BridgeError>,
}

impl BatchReport {
    pub fn is_complete(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// Validates a 1-based page number against a page count.
pub fn check_page(page: usize, page_count: usize) -> Result<()> {
    if page == 0 || page > page_count {
        return Err(BridgeError::InvalidPage { page, page_count });
    }
    Ok(())
}
