//! File watching for live editing
//!
//! Keeps one track in sync with a file on disk: every save re-evaluates the
//! file's content as that track's fragment. A broken save is reported and stays
//! in the session (evaluation failures never roll back), so the next save can
//! fix it.

use crate::command::{CommandHandler, SessionCommand};
use crate::error::{SessionError, SessionResult};
use crate::runtime::EvalRuntime;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Watches one file and feeds it to one track
pub struct TrackFileWatcher {
    track_id: String,
    path: PathBuf,
    last_content: Option<String>,
}

impl TrackFileWatcher {
    pub fn new(track_id: &str, path: &Path) -> Self {
        Self {
            track_id: track_id.to_string(),
            path: path.to_path_buf(),
            last_content: None,
        }
    }

    /// Read the file; `None` when it is unchanged since the last reload
    pub fn read_if_changed(&mut self) -> SessionResult<Option<String>> {
        let content = std::fs::read_to_string(&self.path)?;
        if self.last_content.as_deref() == Some(content.as_str()) {
            return Ok(None);
        }
        self.last_content = Some(content.clone());
        Ok(Some(content))
    }

    /// Command that loads `content` into the watched track
    pub fn command_for(&self, content: &str) -> Option<SessionCommand> {
        if content.trim().is_empty() {
            return None;
        }
        Some(SessionCommand::Eval {
            id: self.track_id.clone(),
            code: content.trim().to_string(),
        })
    }

    async fn reload<R: EvalRuntime>(&mut self, handler: &CommandHandler<R>) {
        let content = match self.read_if_changed() {
            Ok(Some(content)) => content,
            Ok(None) => return,
            Err(e) => {
                warn!("Cannot read {}: {}", self.path.display(), e);
                return;
            }
        };

        let command = match self.command_for(&content) {
            Some(command) => command,
            None => SessionCommand::Stop {
                id: self.track_id.clone(),
            },
        };

        match handler.execute(command).await {
            Ok(message) => info!("🔄 {}: {}", self.path.display(), message),
            Err(e) => {
                error!("❌ {}: {}", self.path.display(), e);
                error!("   Fix the error and save again to retry");
            }
        }
    }

    /// Evaluate the file now, then again after every change until Ctrl+C
    pub async fn run<R: EvalRuntime>(mut self, handler: &CommandHandler<R>) -> SessionResult<()> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut watcher: RecommendedWatcher =
            notify::recommended_watcher(move |res: notify::Result<Event>| match res {
                Ok(event) if matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) => {
                    let _ = tx.send(());
                }
                Ok(_) => {}
                Err(e) => warn!("Watch error: {}", e),
            })
            .map_err(|e| SessionError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;

        // Watch the directory: editors often replace the file on save
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();
        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| SessionError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;

        info!("📝 Watching {} as track {}", self.path.display(), self.track_id);
        self.reload(handler).await;

        loop {
            tokio::select! {
                changed = rx.recv() => {
                    if changed.is_none() {
                        break;
                    }
                    // Coalesce the burst of events a single save produces
                    while rx.try_recv().is_ok() {}
                    self.reload(handler).await;
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Stopping watcher");
                    break;
                }
            }
        }

        handler.execute(SessionCommand::Hush).await?;
        Ok(())
    }
}
