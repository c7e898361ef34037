use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::error::{BridgeError, Result};
use crate::session::Session;
use crate::ViewTag;

pub type SessionHandle = Arc<Mutex<Session>>;

/// Owns every live session, keyed by the host's view tag.
///
/// All registration, lookup and removal goes through one lock, so the
/// mapping is consistent across threads serving different views. Each
/// session carries its own lock for the commands addressed to it.
#[derive(Default)]
pub struct TagRegistry {
    sessions: RwLock<HashMap<ViewTag, SessionHandle>>,
}

impl TagRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, tag: ViewTag, session: Session) -> Result<SessionHandle> {
        let mut sessions = self.sessions.write();
        if sessions.contains_key(&tag) {
            return Err(BridgeError::DuplicateTag(tag));
        }
        let handle = Arc::new(Mutex::new(session));
        sessions.insert(tag, Arc::clone(&handle));
        info!(tag, "view registered");
        Ok(handle)
    }

    pub fn resolve(&self, tag: ViewTag) -> Result<SessionHandle> {
        self.sessions
            .read()
            .get(&tag)
            .cloned()
            .ok_or(BridgeError::UnknownTag(tag))
    }

    pub fn contains(&self, tag: ViewTag) -> bool {
        self.sessions.read().contains_key(&tag)
    }

    /// Removes the mapping and tears the session down. Unregistering an
    /// absent tag is a no-op.
    pub fn unregister(&self, tag: ViewTag) -> Option<SessionHandle> {
        let removed = self.sessions.write().remove(&tag);
        match &removed {
            Some(handle) => {
                handle.lock().teardown();
                info!(tag, "view unregistered");
            }
            None => debug!(tag, "unregister of unknown tag ignored"),
        }
        removed
    }

    pub fn tags(&self) -> Vec<ViewTag> {
        let mut tags: Vec<_> = self.sessions.read().keys().copied().collect();
        tags.sort_unstable();
        tags
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}
