//! File system watcher for `kiln dev`.
//!
//! Watches the project root recursively and forwards relevant changes as
//! [`FileChange`] events. Ignored directories and hidden files are dropped.
//! Events are debounced per path: a path is reported once, with its latest
//! event, after it has been quiet for the debounce window.

use crate::error::{CliError, Result};
use kiln_build::FileChange;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};

/// File watcher with debouncing and filtering.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    root: PathBuf,
}

impl FileWatcher {
    /// Start watching `root`. Must be called inside a Tokio runtime.
    ///
    /// `ignore_patterns` holds directory or file names matched against each
    /// path component (`node_modules`) and suffix patterns (`*.log`).
    pub fn new(
        root: PathBuf,
        ignore_patterns: Vec<String>,
        debounce_ms: u64,
    ) -> Result<(Self, mpsc::Receiver<FileChange>)> {
        if !root.exists() {
            return Err(CliError::FileNotFound(root));
        }

        let (tx, rx) = mpsc::channel(100);
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let watch_root = root.clone();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let event = match res {
                Ok(event) => event,
                Err(err) => {
                    tracing::warn!(error = %err, "watch error");
                    return;
                }
            };

            for path in &event.paths {
                if should_ignore(path, &watch_root, &ignore_patterns) {
                    continue;
                }

                let change = match event.kind {
                    EventKind::Create(_) => FileChange::Created(path.clone()),
                    EventKind::Modify(_) => FileChange::Modified(path.clone()),
                    EventKind::Remove(_) => FileChange::Removed(path.clone()),
                    _ => continue,
                };

                if raw_tx.send(change).is_err() {
                    return;
                }
            }
        })?;

        watcher.watch(&root, RecursiveMode::Recursive)?;
        tracing::debug!(root = %root.display(), "watching for changes");

        tokio::spawn(debounce_changes(
            raw_rx,
            tx,
            Duration::from_millis(debounce_ms),
        ));

        Ok((
            Self {
                _watcher: watcher,
                root,
            },
            rx,
        ))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Forward each path's latest change once it has been quiet for `window`.
///
/// Pending changes are flushed when the raw channel closes.
pub(crate) async fn debounce_changes(
    mut raw: mpsc::UnboundedReceiver<FileChange>,
    tx: mpsc::Sender<FileChange>,
    window: Duration,
) {
    let mut pending: HashMap<PathBuf, (FileChange, Instant)> = HashMap::new();

    loop {
        let deadline = pending.values().map(|(_, at)| *at + window).min();

        tokio::select! {
            change = raw.recv() => match change {
                Some(change) => {
                    pending.insert(change.path().to_path_buf(), (change, Instant::now()));
                }
                None => break,
            },
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                let now = Instant::now();
                let ready: Vec<PathBuf> = pending
                    .iter()
                    .filter(|(_, (_, at))| now.duration_since(*at) >= window)
                    .map(|(path, _)| path.clone())
                    .collect();
                for path in ready {
                    if let Some((change, _)) = pending.remove(&path) {
                        if tx.send(change).await.is_err() {
                            return;
                        }
                    }
                }
            }
        }
    }

    for (_, (change, _)) in pending.drain() {
        if tx.send(change).await.is_err() {
            return;
        }
    }
}

/// True for paths outside `root`, hidden paths and paths matching a pattern.
pub fn should_ignore(path: &Path, root: &Path, ignore_patterns: &[String]) -> bool {
    let Ok(rel_path) = path.strip_prefix(root) else {
        return true;
    };

    for component in rel_path.components() {
        let Some(name) = component.as_os_str().to_str() else {
            continue;
        };
        if name.starts_with('.') && name != "." && name != ".." {
            return true;
        }
        for pattern in ignore_patterns {
            let matched = match pattern.strip_prefix('*') {
                Some(suffix) => name.ends_with(suffix),
                None => name == pattern,
            };
            if matched {
                return true;
            }
        }
    }

    false
}
