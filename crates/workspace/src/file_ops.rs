//! Create, delete and rename on the backing filesystem.
//!
//! Open documents follow their files: renames retarget them in place and
//! deletions wipe their buffers. Documents with unsaved changes block any
//! operation that would discard them.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lsp_types::{CreateFileOptions, DeleteFileOptions, RenameFileOptions};
use tracing::{debug, info};

use crate::document::Document;
use crate::host::HostError;
use crate::uri::uri_from_path;
use crate::watcher::FileChangeKind;
use crate::workspace::{Workspace, WorkspaceError};

#[derive(Debug, thiserror::Error)]
pub enum FileOpError {
	#[error("{} already exists", .0.display())]
	AlreadyExists(PathBuf),
	#[error("{} does not exist", .0.display())]
	NotFound(PathBuf),
	#[error("{} has unsaved changes", .0.display())]
	Modified(PathBuf),
	#[error("i/o error on {}: {source}", .path.display())]
	Io {
		path: PathBuf,
		#[source]
		source: io::Error,
	},
	#[error(transparent)]
	Host(#[from] HostError),
	#[error(transparent)]
	Workspace(#[from] WorkspaceError),
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> FileOpError + '_ {
	move |source| FileOpError::Io {
		path: path.to_path_buf(),
		source,
	}
}

/// Whether a file operation did anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOpOutcome {
	Done,
	/// Skipped because of an `ignore_if_exists` / `ignore_if_not_exists` option.
	Skipped,
}

/// Whether `path` names a directory by its trailing separator.
pub(crate) fn has_trailing_separator(path: &Path) -> bool {
	let raw = path.as_os_str().to_string_lossy();
	raw.ends_with('/') || raw.ends_with(std::path::MAIN_SEPARATOR)
}

fn flag(value: Option<bool>) -> bool {
	value == Some(true)
}

async fn exists(path: &Path) -> Result<bool, FileOpError> {
	tokio::fs::try_exists(path).await.map_err(io_err(path))
}

/// Writes `content` to `path` through a temporary file in the same directory.
pub(crate) async fn write_atomic(path: &Path, content: String) -> Result<(), FileOpError> {
	let target = path.to_path_buf();
	let result = tokio::task::spawn_blocking(move || -> io::Result<()> {
		use std::io::Write;

		let dir = target.parent().unwrap_or_else(|| Path::new("."));
		let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
		tmp.write_all(content.as_bytes())?;
		tmp.as_file().sync_all()?;
		tmp.persist(&target).map_err(|e| e.error)?;
		Ok(())
	})
	.await
	.map_err(|join| io::Error::other(join.to_string()));
	result.and_then(|inner| inner).map_err(io_err(path))
}

fn ensure_clean(docs: &[Arc<Document>], path: &Path) -> Result<(), FileOpError> {
	if docs.iter().any(|doc| doc.is_dirty()) {
		return Err(FileOpError::Modified(path.to_path_buf()));
	}
	Ok(())
}

impl Workspace {
	/// Creates a file, or a directory when `path` ends with a separator.
	pub async fn create_file(&mut self, path: &Path, options: Option<CreateFileOptions>) -> Result<(), FileOpError> {
		self.create_path(path, options.as_ref()).await.map(|_| ())
	}

	pub async fn delete_file(&mut self, path: &Path, options: Option<DeleteFileOptions>) -> Result<(), FileOpError> {
		self.delete_path(path, options.as_ref()).await.map(|_| ())
	}

	pub async fn rename_file(&mut self, old_path: &Path, new_path: &Path, options: Option<RenameFileOptions>) -> Result<(), FileOpError> {
		self.rename_path(old_path, new_path, options.as_ref()).await.map(|_| ())
	}

	pub(crate) async fn create_path(&mut self, path: &Path, options: Option<&CreateFileOptions>) -> Result<FileOpOutcome, FileOpError> {
		let overwrite = flag(options.and_then(|o| o.overwrite));
		let ignore_if_exists = flag(options.and_then(|o| o.ignore_if_exists));
		let is_dir = has_trailing_separator(path);
		let existed = exists(path).await?;
		if existed {
			// overwrite takes precedence over ignore_if_exists
			if !overwrite {
				if ignore_if_exists {
					debug!(path = %path.display(), "file_ops.create_skipped");
					return Ok(FileOpOutcome::Skipped);
				}
				return Err(FileOpError::AlreadyExists(path.to_path_buf()));
			}
			if is_dir {
				return Ok(FileOpOutcome::Skipped);
			}
		}

		if is_dir {
			tokio::fs::create_dir_all(path).await.map_err(io_err(path))?;
		} else {
			// a buffer can be open for a file that is not on disk yet
			let open = self.document_at_path(path);
			ensure_clean(open.as_slice(), path)?;
			if let Some(parent) = path.parent() {
				tokio::fs::create_dir_all(parent).await.map_err(io_err(parent))?;
			}
			tokio::fs::write(path, b"").await.map_err(io_err(path))?;
			if let Some(doc) = self.document_at_path(path) {
				self.write_document_lines(&doc, vec![String::new()]).await?;
				doc.set_dirty(false);
			}
		}
		info!(path = %path.display(), overwrite = existed, "file_ops.created");
		let kind = if existed { FileChangeKind::Changed } else { FileChangeKind::Created };
		self.emit_file_event(path, kind);
		Ok(FileOpOutcome::Done)
	}

	pub(crate) async fn delete_path(&mut self, path: &Path, options: Option<&DeleteFileOptions>) -> Result<FileOpOutcome, FileOpError> {
		let metadata = match tokio::fs::metadata(path).await {
			Ok(metadata) => metadata,
			Err(e) if e.kind() == io::ErrorKind::NotFound => {
				if flag(options.and_then(|o| o.ignore_if_not_exists)) {
					return Ok(FileOpOutcome::Skipped);
				}
				return Err(FileOpError::NotFound(path.to_path_buf()));
			}
			Err(e) => return Err(io_err(path)(e)),
		};

		let affected = if metadata.is_dir() {
			self.documents_under(path)
		} else {
			self.document_at_path(path).into_iter().collect()
		};
		ensure_clean(&affected, path)?;

		if metadata.is_dir() {
			if flag(options.and_then(|o| o.recursive)) {
				tokio::fs::remove_dir_all(path).await.map_err(io_err(path))?;
			} else {
				tokio::fs::remove_dir(path).await.map_err(io_err(path))?;
			}
		} else {
			tokio::fs::remove_file(path).await.map_err(io_err(path))?;
		}

		for doc in affected {
			self.remove_document(doc.buffer());
			self.host.wipe_buffer(doc.buffer()).await?;
		}
		info!(path = %path.display(), "file_ops.deleted");
		self.emit_file_event(path, FileChangeKind::Deleted);
		Ok(FileOpOutcome::Done)
	}

	pub(crate) async fn rename_path(&mut self, old_path: &Path, new_path: &Path, options: Option<&RenameFileOptions>) -> Result<FileOpOutcome, FileOpError> {
		if !exists(old_path).await? {
			return Err(FileOpError::NotFound(old_path.to_path_buf()));
		}
		if exists(new_path).await? {
			if !flag(options.and_then(|o| o.overwrite)) {
				if flag(options.and_then(|o| o.ignore_if_exists)) {
					return Ok(FileOpOutcome::Skipped);
				}
				return Err(FileOpError::AlreadyExists(new_path.to_path_buf()));
			}
			let replaced: Vec<Arc<Document>> = self.document_at_path(new_path).into_iter().collect();
			ensure_clean(&replaced, new_path)?;
			for doc in replaced {
				self.remove_document(doc.buffer());
				self.host.wipe_buffer(doc.buffer()).await?;
			}
		}

		if let Some(parent) = new_path.parent() {
			tokio::fs::create_dir_all(parent).await.map_err(io_err(parent))?;
		}
		let moved = self.documents_under(old_path);
		tokio::fs::rename(old_path, new_path).await.map_err(io_err(old_path))?;

		for doc in moved {
			let Some(doc_path) = crate::uri::path_from_uri(&doc.uri()) else {
				continue;
			};
			let Ok(rest) = doc_path.strip_prefix(old_path) else {
				continue;
			};
			let target = if rest.as_os_str().is_empty() { new_path.to_path_buf() } else { new_path.join(rest) };
			let Some(new_uri) = uri_from_path(&target, Path::new("/")) else {
				continue;
			};
			self.host.rename_buffer(doc.buffer(), &target).await?;
			self.retarget(&doc, new_uri);
		}
		info!(from = %old_path.display(), to = %new_path.display(), "file_ops.renamed");
		self.emit_file_event(old_path, FileChangeKind::Deleted);
		self.emit_file_event(new_path, FileChangeKind::Created);
		Ok(FileOpOutcome::Done)
	}
}
