//! File system watcher feeding a pipeline's change channel.
//!
//! Watches a target's watch paths and forwards relevant changes. Debouncing
//! is not done here; the watch session owns the timer.

use std::path::{Path, PathBuf};

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::error::{CliError, Result};

/// File change event type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileChange {
    Modified(PathBuf),
    Created(PathBuf),
    Removed(PathBuf),
}

impl FileChange {
    /// Get the path affected by this change.
    pub fn path(&self) -> &Path {
        match self {
            FileChange::Modified(p) | FileChange::Created(p) | FileChange::Removed(p) => p,
        }
    }
}

/// What a change channel carries. A watcher error ends the watch loop.
pub type ChangeEvent = notify::Result<FileChange>;

/// Watcher over a set of paths under a project root.
///
/// Keep the value alive for as long as events are wanted; dropping it stops
/// the underlying OS watch and closes the channel.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    root: PathBuf,
    watched: Vec<PathBuf>,
}

impl FileWatcher {
    /// Watch `paths` recursively, ignoring anything matched by `ignore`.
    ///
    /// Paths nested in another watched path are folded into it; paths that do
    /// not exist are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns error if the root is missing, no path exists, or the OS
    /// watcher cannot be created.
    pub fn new(
        root: PathBuf,
        paths: &[PathBuf],
        ignore_patterns: Vec<String>,
    ) -> Result<(Self, mpsc::Receiver<ChangeEvent>)> {
        if !root.exists() {
            return Err(CliError::FileNotFound(root));
        }

        let watched = watch_roots(paths);
        if watched.is_empty() {
            return Err(CliError::InvalidArgument(format!(
                "none of the watch paths exist under {}",
                root.display()
            )));
        }

        let (tx, rx) = mpsc::channel(100);
        let root_clone = root.clone();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let event = match res {
                Ok(event) => event,
                Err(err) => {
                    let _ = tx.blocking_send(Err(err));
                    return;
                }
            };

            for path in &event.paths {
                if should_ignore(path, &root_clone, &ignore_patterns) {
                    continue;
                }

                let change = match event.kind {
                    notify::EventKind::Create(_) => FileChange::Created(path.clone()),
                    notify::EventKind::Modify(_) => FileChange::Modified(path.clone()),
                    notify::EventKind::Remove(_) => FileChange::Removed(path.clone()),
                    _ => continue,
                };

                // receiver gone means the pipeline stopped
                let _ = tx.blocking_send(Ok(change));
            }
        })?;

        for path in &watched {
            watcher.watch(path, RecursiveMode::Recursive)?;
            tracing::debug!(path = %path.display(), "watching");
        }

        Ok((
            Self {
                _watcher: watcher,
                root,
                watched,
            },
            rx,
        ))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The paths actually handed to the OS watcher.
    pub fn watched(&self) -> &[PathBuf] {
        &self.watched
    }
}

/// Existing paths with nested duplicates removed, in input order.
fn watch_roots(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut existing: Vec<&Path> = Vec::new();
    for path in paths {
        if path.exists() {
            existing.push(path.as_path());
        } else {
            tracing::warn!(path = %path.display(), "watch path does not exist, skipping");
        }
    }

    let mut roots = Vec::new();
    for (i, path) in existing.iter().enumerate() {
        let covered = existing.iter().enumerate().any(|(j, other)| {
            let nested = path.starts_with(other) && path != other;
            let repeated = path == other && j < i;
            nested || repeated
        });
        if !covered {
            roots.push(path.to_path_buf());
        }
    }
    roots
}

/// Check if a path should be ignored.
///
/// Paths outside the root, hidden files, `*.ext` patterns and path prefixes
/// (relative to the root) are ignored.
fn should_ignore(path: &Path, root: &Path, ignore_patterns: &[String]) -> bool {
    let rel_path = match path.strip_prefix(root) {
        Ok(p) => p,
        Err(_) => return true,
    };

    let path_str = rel_path.to_string_lossy().replace('\\', "/");

    for pattern in ignore_patterns {
        if let Some(ext) = pattern.strip_prefix('*') {
            if path_str.ends_with(ext) {
                return true;
            }
        } else {
            let prefix = pattern.trim_end_matches('/');
            if path_str == prefix
                || path_str.starts_with(&format!("{prefix}/"))
                || path_str.contains(&format!("/{prefix}/"))
            {
                return true;
            }
        }
    }

    rel_path.components().any(|component| {
        component
            .as_os_str()
            .to_str()
            .is_some_and(|name| name.starts_with('.') && name != "." && name != "..")
    })
}
