//! Glob-filtered file change subscriptions.
//!
//! Events originate from the workspace's own file operations and from
//! whatever feeds [`Workspace::notify_file_event`](crate::Workspace::notify_file_event),
//! typically a host-side watcher.

use std::path::PathBuf;

use globset::{GlobBuilder, GlobMatcher};
use lsp_types::{FileChangeType, Uri};
use tokio::sync::mpsc;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileChangeKind {
	Created,
	Changed,
	Deleted,
}

impl From<FileChangeKind> for FileChangeType {
	fn from(kind: FileChangeKind) -> Self {
		match kind {
			FileChangeKind::Created => Self::CREATED,
			FileChangeKind::Changed => Self::CHANGED,
			FileChangeKind::Deleted => Self::DELETED,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
	pub uri: Uri,
	pub path: PathBuf,
	pub kind: FileChangeKind,
}

/// Event kinds a watcher does not want to receive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchOptions {
	pub ignore_create: bool,
	pub ignore_change: bool,
	pub ignore_delete: bool,
}

impl WatchOptions {
	fn accepts(&self, kind: FileChangeKind) -> bool {
		match kind {
			FileChangeKind::Created => !self.ignore_create,
			FileChangeKind::Changed => !self.ignore_change,
			FileChangeKind::Deleted => !self.ignore_delete,
		}
	}
}

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
	#[error("invalid glob pattern {pattern:?}: {source}")]
	InvalidGlob {
		pattern: String,
		#[source]
		source: globset::Error,
	},
}

/// Receiving side of a watch registration. Dropping it unregisters.
#[derive(Debug)]
pub struct FileSystemWatcher {
	pattern: String,
	rx: mpsc::UnboundedReceiver<FileEvent>,
}

impl FileSystemWatcher {
	pub fn pattern(&self) -> &str {
		&self.pattern
	}

	/// Waits for the next event. Returns `None` once the workspace is gone.
	pub async fn recv(&mut self) -> Option<FileEvent> {
		self.rx.recv().await
	}

	pub fn try_recv(&mut self) -> Option<FileEvent> {
		self.rx.try_recv().ok()
	}
}

struct WatchEntry {
	matcher: GlobMatcher,
	options: WatchOptions,
	tx: mpsc::UnboundedSender<FileEvent>,
}

#[derive(Default)]
pub(crate) struct WatcherRegistry {
	entries: Vec<WatchEntry>,
}

impl WatcherRegistry {
	/// Registers a watcher for `pattern`. Relative patterns match at any depth.
	pub fn watch(&mut self, pattern: &str, options: WatchOptions) -> Result<FileSystemWatcher, WatchError> {
		let anchored = if pattern.starts_with('/') || pattern.starts_with("**") {
			pattern.to_string()
		} else {
			format!("**/{pattern}")
		};
		let matcher = GlobBuilder::new(&anchored)
			.literal_separator(true)
			.build()
			.map_err(|source| WatchError::InvalidGlob {
				pattern: pattern.to_string(),
				source,
			})?
			.compile_matcher();

		let (tx, rx) = mpsc::unbounded_channel();
		self.entries.push(WatchEntry { matcher, options, tx });
		Ok(FileSystemWatcher {
			pattern: pattern.to_string(),
			rx,
		})
	}

	/// Delivers `event` to every matching watcher and prunes dropped ones.
	pub fn dispatch(&mut self, event: &FileEvent) -> usize {
		self.entries.retain(|entry| !entry.tx.is_closed());
		let mut delivered = 0;
		for entry in &self.entries {
			if entry.options.accepts(event.kind) && entry.matcher.is_match(&event.path) && entry.tx.send(event.clone()).is_ok() {
				delivered += 1;
			}
		}
		trace!(path = %event.path.display(), kind = ?event.kind, delivered, "watcher.dispatch");
		delivered
	}

	pub fn len(&self) -> usize {
		self.entries.iter().filter(|entry| !entry.tx.is_closed()).count()
	}
}

#[cfg(test)]
mod tests {
	use std::path::Path;

	use super::*;
	use crate::uri::uri_from_path;

	fn event(path: &str, kind: FileChangeKind) -> FileEvent {
		FileEvent {
			uri: uri_from_path(Path::new(path), Path::new("/")).unwrap(),
			path: PathBuf::from(path),
			kind,
		}
	}

	#[test]
	fn relative_patterns_match_at_any_depth() {
		let mut registry = WatcherRegistry::default();
		let mut watcher = registry.watch("*.rs", WatchOptions::default()).unwrap();

		assert_eq!(registry.dispatch(&event("/work/src/lib.rs", FileChangeKind::Changed)), 1);
		assert_eq!(registry.dispatch(&event("/work/README.md", FileChangeKind::Changed)), 0);
		assert_eq!(watcher.try_recv().map(|e| e.path), Some(PathBuf::from("/work/src/lib.rs")));
		assert!(watcher.try_recv().is_none());
	}

	#[test]
	fn star_does_not_cross_directories() {
		let mut registry = WatcherRegistry::default();
		let _watcher = registry.watch("/work/*.toml", WatchOptions::default()).unwrap();

		assert_eq!(registry.dispatch(&event("/work/Cargo.toml", FileChangeKind::Created)), 1);
		assert_eq!(registry.dispatch(&event("/work/crates/a/Cargo.toml", FileChangeKind::Created)), 0);
	}

	#[test]
	fn ignored_kinds_are_filtered() {
		let mut registry = WatcherRegistry::default();
		let options = WatchOptions {
			ignore_change: true,
			..WatchOptions::default()
		};
		let mut watcher = registry.watch("**/*", options).unwrap();

		registry.dispatch(&event("/a.txt", FileChangeKind::Changed));
		registry.dispatch(&event("/a.txt", FileChangeKind::Deleted));
		assert_eq!(watcher.try_recv().map(|e| e.kind), Some(FileChangeKind::Deleted));
		assert!(watcher.try_recv().is_none());
	}

	#[test]
	fn dropped_watchers_are_pruned() {
		let mut registry = WatcherRegistry::default();
		let watcher = registry.watch("*.txt", WatchOptions::default()).unwrap();
		assert_eq!(registry.len(), 1);

		drop(watcher);
		assert_eq!(registry.dispatch(&event("/a.txt", FileChangeKind::Created)), 0);
		assert_eq!(registry.len(), 0);
	}

	#[test]
	fn invalid_glob_is_reported() {
		let mut registry = WatcherRegistry::default();
		let err = registry.watch("[unclosed", WatchOptions::default()).unwrap_err();
		assert!(matches!(err, WatchError::InvalidGlob { ref pattern, .. } if pattern == "[unclosed"));
	}

	#[test]
	fn kinds_map_to_lsp_change_types() {
		assert_eq!(FileChangeType::from(FileChangeKind::Deleted), FileChangeType::DELETED);
	}
}
