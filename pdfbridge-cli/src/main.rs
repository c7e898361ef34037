mod protocol;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use directories::ProjectDirs;
use pdfbridge_core::{
    BridgeConfig, Dispatcher, DocumentProvider, FileStateStore, SidecarPersistence, StateStore,
    TagRegistry, TaskManager, ViewTag,
};
use pdfbridge_render::PdfiumRenderFactory;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, OnceCell};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

use crate::protocol::{Operation, PendingCompletion};

#[derive(Debug, Parser)]
#[command(
    name = "pdfbridge",
    version,
    about = "JSON-lines bridge driving tagged PDF document views"
)]
struct Args {
    /// Configuration file (defaults to config.toml in the platform config dir)
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Open a document view before reading requests, as TAG=PATH
    #[arg(long = "open", value_parser = parse_open_arg)]
    open: Vec<(ViewTag, PathBuf)>,
}

fn parse_open_arg(arg: &str) -> Result<(ViewTag, PathBuf), String> {
    let (tag, path) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected TAG=PATH, got `{arg}`"))?;
    let tag = tag
        .trim()
        .parse::<ViewTag>()
        .map_err(|err| format!("invalid tag `{tag}`: {err}"))?;
    if path.is_empty() {
        return Err("path must not be empty".to_string());
    }
    Ok((tag, PathBuf::from(path)))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let project_dirs = ProjectDirs::from("net", "pdfbridge", "pdfbridge")
        .ok_or_else(|| anyhow!("unable to resolve platform data directories"))?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| project_dirs.config_dir().join("config.toml"));
    let config = BridgeConfig::load_or_default(&config_path)?;
    let _log_guard = init_logging(&project_dirs, &config.log_level)?;

    let state_dir = config
        .state_dir
        .clone()
        .unwrap_or_else(|| project_dirs.data_local_dir().join("state"));
    let store: Arc<dyn StateStore> = Arc::new(FileStateStore::new(state_dir)?);
    let dispatcher = Dispatcher::new(
        Arc::new(TagRegistry::new()),
        TaskManager::current()?,
        store,
        Arc::new(SidecarPersistence),
        config,
    );

    let (out, out_rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_lines(out_rx));
    let mut bridge = Bridge::new(dispatcher, out);

    for (tag, path) in &args.open {
        bridge
            .open(*tag, path)
            .await
            .with_context(|| format!("failed to open {:?} as view {}", path, tag))?;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        bridge.handle_line(&line).await;
    }

    bridge.shutdown().await;
    writer.await??;
    Ok(())
}

/// Routes request lines to the dispatcher and queues reply lines for stdout.
struct Bridge {
    dispatcher: Dispatcher,
    provider: OnceCell<PdfiumRenderFactory>,
    out: mpsc::UnboundedSender<String>,
    completions: JoinSet<()>,
}

impl Bridge {
    fn new(dispatcher: Dispatcher, out: mpsc::UnboundedSender<String>) -> Self {
        Self {
            dispatcher,
            provider: OnceCell::new(),
            out,
            completions: JoinSet::new(),
        }
    }

    /// Binds pdfium on first use so hosts that never open a document do not
    /// need the library.
    async fn provider(&self) -> Result<&PdfiumRenderFactory> {
        self.provider
            .get_or_try_init(|| async { PdfiumRenderFactory::new() })
            .await
    }

    async fn open(&self, tag: ViewTag, path: &Path) -> Result<()> {
        let provider: &dyn DocumentProvider = self.provider().await?;
        self.dispatcher.open_view(tag, provider, path).await?;
        Ok(())
    }

    async fn handle_line(&mut self, line: &str) {
        let request = match protocol::parse_request(line) {
            Ok(request) => request,
            Err(malformed) => {
                debug!(message = %malformed.message, "malformed request");
                self.send(protocol::malformed_line(malformed));
                return;
            }
        };
        let id = request.id;
        let tag = request.tag;

        let reply = match request.operation {
            Operation::Open { path } => match self.provider().await {
                Ok(provider) => self
                    .dispatcher
                    .open_view(tag, provider, &path)
                    .await
                    .map(|()| Value::Null),
                Err(err) => Err(err.into()),
            },
            Operation::Close => self.dispatcher.close_view(tag).map(|()| Value::Null),
            Operation::Events => self.dispatcher.drain_events(tag).and_then(|events| {
                serde_json::to_value(events).map_err(|err| anyhow!(err).into())
            }),
            Operation::Command(command) => match self.dispatcher.dispatch(tag, command) {
                Ok(reply) => match protocol::encode_reply(reply) {
                    Ok((value, pending)) => {
                        if let Some(pending) = pending {
                            self.await_completion(tag, pending);
                        }
                        Ok(value)
                    }
                    Err(err) => Err(anyhow!(err).into()),
                },
                Err(err) => Err(err),
            },
        };

        let line = match reply {
            Ok(result) => protocol::ok_line(id, result),
            Err(err) => protocol::bridge_error_line(id, &err),
        };
        self.send(line);
    }

    fn await_completion(&mut self, tag: ViewTag, pending: PendingCompletion) {
        let out = self.out.clone();
        let task = pending.task_id();
        self.completions.spawn(async move {
            let (kind, result) = match pending {
                PendingCompletion::Thumbnail(handle) => {
                    (handle.kind(), handle.wait().await)
                }
                PendingCompletion::Saved(handle) => (
                    handle.kind(),
                    handle.wait().await.map(|path| path.display().to_string()),
                ),
            };
            debug!(task, tag, delivered = result.is_some(), "task completed");
            let _ = out.send(protocol::completion_line(task, tag, kind.as_ref(), result));
        });
    }

    fn send(&self, line: String) {
        if self.out.send(line).is_err() {
            warn!("output channel closed; dropping reply");
        }
    }

    /// Closes every open view and waits for outstanding completions.
    async fn shutdown(mut self) {
        for tag in self.dispatcher.registry().tags() {
            if let Err(err) = self.dispatcher.close_view(tag) {
                warn!(tag, error = %err, "failed to persist view state on shutdown");
            }
        }
        while self.completions.join_next().await.is_some() {}
        info!("input closed; bridge shutting down");
    }
}

async fn write_lines(mut lines: mpsc::UnboundedReceiver<String>) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    while let Some(line) = lines.recv().await {
        stdout.write_all(line.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }
    Ok(())
}

fn init_logging(project_dirs: &ProjectDirs, default_level: &str) -> Result<WorkerGuard> {
    let log_dir = project_dirs.data_local_dir().join("logs");
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("failed to create log directory {:?}", log_dir))?;

    let file_appender = tracing_appender::rolling::never(log_dir, "pdfbridge.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);
    // stdout carries the protocol.
    let console_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_args_split_on_the_first_equals_sign() {
        assert_eq!(
            parse_open_arg("4=/tmp/a=b.pdf").unwrap(),
            (4, PathBuf::from("/tmp/a=b.pdf"))
        );
        assert_eq!(parse_open_arg("-2=x.pdf").unwrap().0, -2);
        assert!(parse_open_arg("x.pdf").is_err());
        assert!(parse_open_arg("one=x.pdf").is_err());
        assert!(parse_open_arg("1=").is_err());
    }

    #[test]
    fn args_accept_repeated_open_flags() {
        let args = Args::try_parse_from([
            "pdfbridge",
            "--config",
            "bridge.toml",
            "--open",
            "1=a.pdf",
            "--open",
            "2=b.pdf",
        ])
        .unwrap();
        assert_eq!(args.config, Some(PathBuf::from("bridge.toml")));
        assert_eq!(args.open.len(), 2);
        assert_eq!(args.open[1], (2, PathBuf::from("b.pdf")));
    }
}
