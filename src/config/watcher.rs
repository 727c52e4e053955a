//! Hot reload of the configuration file.
//!
//! The parent directory is watched rather than the file itself, so editors
//! that save by renaming a temporary file over the original keep triggering
//! reloads. Events for other files in the directory are ignored, as are
//! writes that leave the contents unchanged.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::{parse_config, ConfigError};
use crate::config::snapshot::ConfigSnapshot;

const POLL_INTERVAL: Duration = Duration::from_secs(2);

pub struct ConfigWatcher {
    path: PathBuf,
    updates: mpsc::UnboundedSender<ConfigSnapshot>,
}

impl ConfigWatcher {
    /// Returns the watcher and the receiving end for rebuilt snapshots.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<ConfigSnapshot>) {
        let (updates, rx) = mpsc::unbounded_channel();
        let watcher = Self {
            path: path.to_path_buf(),
            updates,
        };
        (watcher, rx)
    }

    /// Begin watching. Events stop when the returned handle is dropped.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let target = self.path.canonicalize().unwrap_or_else(|_| self.path.clone());
        let dir = match target.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let last_seen = Mutex::new(std::fs::read_to_string(&target).ok());
        let updates = self.updates;
        let file = target.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let event = match res {
                    Ok(event) => event,
                    Err(e) => {
                        tracing::error!(error = ?e, "Config watch failed");
                        return;
                    }
                };
                if !touches(&event, &file) {
                    return;
                }
                match reread(&file, &last_seen) {
                    Ok(Some(snapshot)) => {
                        tracing::info!(path = %file.display(), "Config file changed, reloading");
                        let _ = updates.send(snapshot);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::error!(path = %file.display(), error = %e, "Ignoring config change");
                    }
                }
            },
            Config::default().with_poll_interval(POLL_INTERVAL),
        )?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        tracing::info!(path = %target.display(), "Config watcher started");
        Ok(watcher)
    }
}

fn touches(event: &Event, file: &Path) -> bool {
    matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
        && event.paths.iter().any(|p| p == file || p.file_name() == file.file_name())
}

/// Parse the file if its contents differ from the last successful read.
fn reread(file: &Path, last_seen: &Mutex<Option<String>>) -> Result<Option<ConfigSnapshot>, ConfigError> {
    let content = std::fs::read_to_string(file)?;
    let mut last = last_seen.lock().unwrap_or_else(|p| p.into_inner());
    if last.as_deref() == Some(content.as_str()) {
        return Ok(None);
    }
    let snapshot = parse_config(&content)?;
    *last = Some(content);
    Ok(Some(snapshot))
}
