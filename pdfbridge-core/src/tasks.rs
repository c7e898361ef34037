//! Long-running work (thumbnails, saves) run off the command path.
//!
//! Every task owns a single-fire completion slot. Normal completion and
//! abort both take the sender out of the slot under one lock, so the first
//! of the two wins and the completion is delivered exactly once. A task
//! that was aborted or superseded before it finished always delivers
//! `None`.

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Context;
use parking_lot::Mutex;
use serde::Serialize;
use strum::{AsRefStr, Display};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::backend::{DocumentBackend, DocumentPersistence, RenderImage, ThumbnailRequest};
use crate::thumbnail::encode_png_base64;

pub type TaskId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr, Serialize)]
#[strum(serialize_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub enum TaskKind {
    Thumbnail,
    Save,
}

type CompletionSlot<T> = Arc<Mutex<Option<oneshot::Sender<Option<T>>>>>;

/// Receiving end of a task's completion.
pub struct TaskHandle<T> {
    id: TaskId,
    kind: TaskKind,
    receiver: oneshot::Receiver<Option<T>>,
}

impl<T> TaskHandle<T> {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    /// Resolves to the artifact, or `None` when the task was aborted,
    /// superseded or failed.
    pub async fn wait(self) -> Option<T> {
        self.receiver.await.ok().flatten()
    }
}

impl<T> fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish()
    }
}

/// The cancelable thumbnail task a session holds while it is outstanding.
pub struct PendingTask {
    id: TaskId,
    page: usize,
    token: CancellationToken,
    completion: CompletionSlot<String>,
}

impl PendingTask {
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// 1-based page the thumbnail was requested for.
    pub fn page(&self) -> usize {
        self.page
    }

    pub fn is_finished(&self) -> bool {
        self.completion.lock().is_none()
    }

    /// Cancels the task and resolves its completion with `None` unless it
    /// already completed. Returns whether this call aborted anything.
    pub fn abort(&self) -> bool {
        self.token.cancel();
        match self.completion.lock().take() {
            Some(sender) => {
                let _ = sender.send(None);
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for PendingTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingTask")
            .field("id", &self.id)
            .field("page", &self.page)
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}

/// Renders and encodes, checking `token` before the render and again before
/// encoding so an abort that lands mid-render drops the pixels unencoded.
fn render_unless_cancelled<T, R, E>(
    token: &CancellationToken,
    render: R,
    encode: E,
) -> anyhow::Result<Option<T>>
where
    R: FnOnce() -> anyhow::Result<RenderImage>,
    E: FnOnce(&RenderImage) -> anyhow::Result<T>,
{
    if token.is_cancelled() {
        return Ok(None);
    }
    let image = render()?;
    if token.is_cancelled() {
        debug!("render finished after abort; skipping encode");
        return Ok(None);
    }
    encode(&image).map(Some)
}

fn deliver<T>(
    slot: &Mutex<Option<oneshot::Sender<Option<T>>>>,
    token: &CancellationToken,
    artifact: Option<T>,
) {
    let mut slot = slot.lock();
    let Some(sender) = slot.take() else {
        return;
    };
    let artifact = if token.is_cancelled() { None } else { artifact };
    let _ = sender.send(artifact);
}

/// Spawns engine work on the blocking pool of a tokio runtime.
#[derive(Clone)]
pub struct TaskManager {
    runtime: Handle,
    next_id: Arc<AtomicU64>,
}

impl TaskManager {
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Binds to the runtime the caller is running on.
    pub fn current() -> anyhow::Result<Self> {
        let runtime = Handle::try_current().context("task manager requires a tokio runtime")?;
        Ok(Self::new(runtime))
    }

    fn next_id(&self) -> TaskId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Starts a thumbnail render, superseding whatever task `slot` holds.
    pub fn start_thumbnail(
        &self,
        slot: &mut Option<PendingTask>,
        document: Arc<dyn DocumentBackend>,
        request: ThumbnailRequest,
    ) -> TaskHandle<String> {
        if let Some(previous) = slot.take() {
            if previous.abort() {
                debug!(task = previous.id, page = previous.page, "thumbnail superseded");
            }
        }

        let id = self.next_id();
        let token = CancellationToken::new();
        let (sender, receiver) = oneshot::channel();
        let completion: CompletionSlot<String> = Arc::new(Mutex::new(Some(sender)));

        let worker_token = token.clone();
        let worker_completion = Arc::clone(&completion);
        self.runtime.spawn_blocking(move || {
            let artifact = render_unless_cancelled(
                &worker_token,
                || document.render_thumbnail(request),
                encode_png_base64,
            )
            .unwrap_or_else(|err| {
                warn!(task = id, page = request.page_index + 1, error = %err, "thumbnail failed");
                None
            });
            deliver(&worker_completion, &worker_token, artifact);
        });

        debug!(task = id, page = request.page_index + 1, "thumbnail started");
        *slot = Some(PendingTask {
            id,
            page: request.page_index + 1,
            token,
            completion,
        });
        TaskHandle {
            id,
            kind: TaskKind::Thumbnail,
            receiver,
        }
    }

    /// Persists the document with an annotation snapshot taken by the
    /// caller. Saves cannot be aborted; `on_saved` runs only on success.
    pub fn start_save<F>(
        &self,
        document: Arc<dyn DocumentBackend>,
        persistence: Arc<dyn DocumentPersistence>,
        xfdf: String,
        on_saved: F,
    ) -> TaskHandle<PathBuf>
    where
        F: FnOnce(&PathBuf) + Send + 'static,
    {
        let id = self.next_id();
        let (sender, receiver) = oneshot::channel();

        self.runtime.spawn_blocking(move || {
            let path = match persistence.save(document.as_ref(), &xfdf) {
                Ok(path) => {
                    debug!(task = id, path = %path.display(), "document saved");
                    on_saved(&path);
                    Some(path)
                }
                Err(err) => {
                    warn!(task = id, error = %err, "save failed");
                    None
                }
            };
            let _ = sender.send(path);
        });

        TaskHandle {
            id,
            kind: TaskKind::Save,
            receiver,
        }
    }
}
