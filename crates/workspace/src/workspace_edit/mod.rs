//! Application of LSP workspace edits.
//!
//! A [`WorkspaceEdit`] is applied in two phases. Planning normalizes both
//! edit shapes into one ordered operation list and validates every operation
//! against the current state without touching anything. Only a fully valid
//! plan is executed, in the order given.
//!
//! Execution is not transactional: when an operation fails mid-way, the ones
//! before it stay applied and are reported in [`ApplyEditFailure::applied`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lsp_types::{
	AnnotatedTextEdit, CreateFileOptions, DeleteFileOptions, DocumentChangeOperation, DocumentChanges, OneOf, RenameFileOptions, ResourceOp,
	TextDocumentEdit, TextEdit, Uri, WorkspaceEdit,
};
use tether_primitives::{TextModel, TextModelError};
use tracing::{debug, error};

use crate::document::Document;
use crate::file_ops::{FileOpError, FileOpOutcome, write_atomic};
use crate::host::{BufferId, MessageLevel};
use crate::uri::{path_from_uri, scheme_of};
use crate::watcher::FileChangeKind;
use crate::workspace::{Workspace, WorkspaceError};

#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
	#[error("workspace edit sets both `changes` and `documentChanges`")]
	AmbiguousShape,
	#[error("workspace edit has neither `changes` nor `documentChanges`")]
	EmptyEdit,
	#[error("version mismatch for {uri}: expected {expected}, document is at {actual}")]
	VersionMismatch { uri: String, expected: i32, actual: i32 },
	#[error("{uri} is neither an open document nor an existing file")]
	TargetNotFound { uri: String },
	#[error("scheme of {uri} is not backed by the filesystem")]
	UnsupportedScheme { uri: String },
	#[error("invalid edits for {uri}: {source}")]
	InvalidEdits {
		uri: String,
		#[source]
		source: TextModelError,
	},
	#[error("edit of {uri} was declined")]
	Declined { uri: String },
	#[error("failed to apply edits to {uri}: {source}")]
	Sync {
		uri: String,
		#[source]
		source: WorkspaceError,
	},
	#[error(transparent)]
	FileOp(#[from] FileOpError),
}

/// Result of one applied operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutcome {
	/// An open document was edited and published at `version`.
	EditedDocument { uri: Uri, version: i32 },
	/// A file that is not open was rewritten on disk.
	EditedFile { uri: Uri },
	Created { uri: Uri },
	Deleted { uri: Uri },
	Renamed { old_uri: Uri, new_uri: Uri },
	/// Nothing to do because of an `ignore_if_*` option.
	Skipped { uri: Uri },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
	pub outcomes: Vec<OperationOutcome>,
}

/// Failure of a workspace edit.
///
/// `failed_change` is the index of the offending operation in the normalized
/// order: the `documentChanges` order, or the URI-sorted `changes` entries.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct ApplyEditFailure {
	#[source]
	pub error: ApplyError,
	pub failed_change: Option<usize>,
	/// Operations applied before the failure. Empty when validation failed.
	pub applied: Vec<OperationOutcome>,
}

impl ApplyEditFailure {
	fn invalid(error: ApplyError, failed_change: Option<usize>) -> Self {
		Self {
			error,
			failed_change,
			applied: Vec::new(),
		}
	}
}

/// One normalized operation.
#[derive(Debug, Clone)]
enum Operation {
	Edit { uri: Uri, version: Option<i32>, edits: Vec<TextEdit> },
	Create { uri: Uri, options: Option<CreateFileOptions> },
	Delete { uri: Uri, options: Option<DeleteFileOptions> },
	Rename { old_uri: Uri, new_uri: Uri, options: Option<RenameFileOptions> },
}

fn normalize_text_edits(edits: &[OneOf<TextEdit, AnnotatedTextEdit>]) -> Vec<TextEdit> {
	edits
		.iter()
		.map(|edit| match edit {
			OneOf::Left(edit) => edit.clone(),
			OneOf::Right(annotated) => annotated.text_edit.clone(),
		})
		.collect()
}

fn text_document_operation(edit: &TextDocumentEdit) -> Operation {
	Operation::Edit {
		uri: edit.text_document.uri.clone(),
		version: edit.text_document.version,
		edits: normalize_text_edits(&edit.edits),
	}
}

fn normalize(edit: &WorkspaceEdit) -> Result<Vec<Operation>, ApplyError> {
	match (&edit.changes, &edit.document_changes) {
		(Some(_), Some(_)) => Err(ApplyError::AmbiguousShape),
		(None, None) => Err(ApplyError::EmptyEdit),
		(Some(changes), None) => {
			let mut entries: Vec<(&Uri, &Vec<TextEdit>)> = changes.iter().collect();
			entries.sort_by(|a, b| a.0.as_str().cmp(b.0.as_str()));
			Ok(entries
				.into_iter()
				.map(|(uri, edits)| Operation::Edit {
					uri: uri.clone(),
					version: None,
					edits: edits.clone(),
				})
				.collect())
		}
		(None, Some(DocumentChanges::Edits(edits))) => Ok(edits.iter().map(text_document_operation).collect()),
		(None, Some(DocumentChanges::Operations(ops))) => Ok(ops
			.iter()
			.map(|op| match op {
				DocumentChangeOperation::Edit(edit) => text_document_operation(edit),
				DocumentChangeOperation::Op(ResourceOp::Create(create)) => Operation::Create {
					uri: create.uri.clone(),
					options: create.options.clone(),
				},
				DocumentChangeOperation::Op(ResourceOp::Delete(delete)) => Operation::Delete {
					uri: delete.uri.clone(),
					options: delete.options.clone(),
				},
				DocumentChangeOperation::Op(ResourceOp::Rename(rename)) => Operation::Rename {
					old_uri: rename.old_uri.clone(),
					new_uri: rename.new_uri.clone(),
					options: rename.options.clone(),
				},
			})
			.collect()),
	}
}

/// Filesystem effect of a resource operation validated so far.
#[derive(Debug)]
enum Step {
	Created(PathBuf),
	/// The path and everything below it.
	Removed(PathBuf),
	Renamed { from: PathBuf, to: PathBuf },
}

/// Filesystem and document state as it will be after the operations
/// validated so far.
#[derive(Default)]
struct Simulation {
	/// Post-edit content of open documents touched by earlier operations.
	models: HashMap<BufferId, TextModel>,
	steps: Vec<Step>,
}

/// Where a path's content comes from before the simulated steps.
enum Origin {
	/// Created by a step; nothing was there before.
	Created,
	/// Removed by a step, or moved away from under it.
	Gone,
	/// Untouched by the steps, or moved here from the given path.
	Before(PathBuf),
}

impl Simulation {
	fn origin(&self, path: &Path) -> Origin {
		let mut current = path.to_path_buf();
		for step in self.steps.iter().rev() {
			match step {
				Step::Created(created) if current == *created => return Origin::Created,
				Step::Created(_) => {}
				Step::Removed(removed) if current.starts_with(removed) => return Origin::Gone,
				Step::Removed(_) => {}
				Step::Renamed { from, to } => {
					if let Ok(rest) = current.strip_prefix(to) {
						current = if rest.as_os_str().is_empty() { from.clone() } else { from.join(rest) };
					} else if current.starts_with(from) {
						return Origin::Gone;
					}
				}
			}
		}
		Origin::Before(current)
	}

	async fn exists(&self, path: &Path) -> bool {
		match self.origin(path) {
			Origin::Created => true,
			Origin::Gone => false,
			Origin::Before(before) => tokio::fs::metadata(before).await.is_ok_and(|meta| meta.is_file()),
		}
	}
}

impl Workspace {
	fn filesystem_path(&self, uri: &Uri) -> Result<PathBuf, ApplyError> {
		let unsupported = || ApplyError::UnsupportedScheme {
			uri: uri.as_str().to_string(),
		};
		if !self.config.is_filesystem_scheme(&scheme_of(uri)) {
			return Err(unsupported());
		}
		let mut path = path_from_uri(uri).ok_or_else(unsupported)?;
		if uri.as_str().ends_with('/') && !crate::file_ops::has_trailing_separator(&path) {
			path.as_mut_os_string().push("/");
		}
		Ok(path)
	}

	/// Open document that `uri` will name once the simulated steps are applied.
	fn open_document_for(&self, sim: &Simulation, uri: &Uri) -> Option<Arc<Document>> {
		let Ok(path) = self.filesystem_path(uri) else {
			return self.get_document(uri);
		};
		match sim.origin(&path) {
			Origin::Before(before) if before == path => self.get_document(uri),
			Origin::Before(before) => self.document_at_path(&before),
			Origin::Created | Origin::Gone => None,
		}
	}

	async fn validate(&self, ops: &[Operation]) -> Result<(), ApplyEditFailure> {
		let mut sim = Simulation::default();
		for (idx, op) in ops.iter().enumerate() {
			self.validate_one(&mut sim, op).await.map_err(|error| ApplyEditFailure::invalid(error, Some(idx)))?;
		}
		Ok(())
	}

	async fn validate_one(&self, sim: &mut Simulation, op: &Operation) -> Result<(), ApplyError> {
		match op {
			Operation::Edit { uri, version, edits } => {
				if let Some(doc) = self.open_document_for(sim, uri) {
					doc.force_sync();
					if let Some(expected) = *version
						&& expected != doc.version()
					{
						return Err(ApplyError::VersionMismatch {
							uri: uri.as_str().to_string(),
							expected,
							actual: doc.version(),
						});
					}
					let base = match sim.models.remove(&doc.buffer()) {
						Some(model) => model,
						None => {
							let model = doc.text_model().map_err(|e| ApplyError::Sync {
								uri: uri.as_str().to_string(),
								source: e.into(),
							})?;
							(*model).clone()
						}
					};
					let next = base.apply_edits(edits, self.config.offset_encoding).map_err(|source| ApplyError::InvalidEdits {
						uri: uri.as_str().to_string(),
						source,
					})?;
					sim.models.insert(doc.buffer(), next);
					return Ok(());
				}
				let not_found = || ApplyError::TargetNotFound {
					uri: uri.as_str().to_string(),
				};
				let path = self.filesystem_path(uri).map_err(|_| not_found())?;
				if !sim.exists(&path).await {
					return Err(not_found());
				}
			}
			Operation::Create { uri, .. } => {
				let path = self.filesystem_path(uri)?;
				sim.steps.push(Step::Created(path));
			}
			Operation::Delete { uri, .. } => {
				let path = self.filesystem_path(uri)?;
				sim.steps.push(Step::Removed(path));
			}
			Operation::Rename { old_uri, new_uri, .. } => {
				let from = self.filesystem_path(old_uri)?;
				let to = self.filesystem_path(new_uri)?;
				sim.steps.push(Step::Renamed { from, to });
			}
		}
		Ok(())
	}

	async fn execute(&mut self, op: &Operation) -> Result<OperationOutcome, ApplyError> {
		match op {
			Operation::Edit { uri, edits, .. } => match self.get_document(uri) {
				Some(doc) => self.edit_document(&doc, uri, edits).await,
				None => self.edit_file(uri, edits).await,
			},
			Operation::Create { uri, options } => {
				let path = self.filesystem_path(uri)?;
				Ok(match self.create_path(&path, options.as_ref()).await? {
					FileOpOutcome::Done => OperationOutcome::Created { uri: uri.clone() },
					FileOpOutcome::Skipped => OperationOutcome::Skipped { uri: uri.clone() },
				})
			}
			Operation::Delete { uri, options } => {
				let path = self.filesystem_path(uri)?;
				Ok(match self.delete_path(&path, options.as_ref()).await? {
					FileOpOutcome::Done => OperationOutcome::Deleted { uri: uri.clone() },
					FileOpOutcome::Skipped => OperationOutcome::Skipped { uri: uri.clone() },
				})
			}
			Operation::Rename { old_uri, new_uri, options } => {
				let old_path = self.filesystem_path(old_uri)?;
				let new_path = self.filesystem_path(new_uri)?;
				Ok(match self.rename_path(&old_path, &new_path, options.as_ref()).await? {
					FileOpOutcome::Done => OperationOutcome::Renamed {
						old_uri: old_uri.clone(),
						new_uri: new_uri.clone(),
					},
					FileOpOutcome::Skipped => OperationOutcome::Skipped { uri: new_uri.clone() },
				})
			}
		}
	}

	/// Applies edits to an open document through its host buffer.
	async fn edit_document(&mut self, doc: &Document, uri: &Uri, edits: &[TextEdit]) -> Result<OperationOutcome, ApplyError> {
		let sync_err = |source: WorkspaceError| ApplyError::Sync {
			uri: uri.as_str().to_string(),
			source,
		};
		doc.force_sync();
		let model = doc.text_model().map_err(|e| sync_err(e.into()))?;
		let next = model.apply_edits(edits, self.config.offset_encoding).map_err(|source| ApplyError::InvalidEdits {
			uri: uri.as_str().to_string(),
			source,
		})?;
		self.write_document_model(doc, &next).await.map_err(sync_err)?;
		Ok(OperationOutcome::EditedDocument {
			uri: doc.uri(),
			version: doc.version(),
		})
	}

	/// Applies edits to a file that is not open, after confirmation.
	async fn edit_file(&mut self, uri: &Uri, edits: &[TextEdit]) -> Result<OperationOutcome, ApplyError> {
		let path = self.filesystem_path(uri).map_err(|_| ApplyError::TargetNotFound {
			uri: uri.as_str().to_string(),
		})?;
		if self.config.confirm_disk_edits {
			let message = format!("{} is not open. Apply the edit to the file on disk?", path.display());
			if self.prompter.confirm(&message).await != Some(true) {
				debug!(uri = uri.as_str(), "workspace_edit.disk_edit_declined");
				return Err(ApplyError::Declined {
					uri: uri.as_str().to_string(),
				});
			}
		}

		let io_err = |source| FileOpError::Io { path: path.clone(), source };
		let text = tokio::fs::read_to_string(&path).await.map_err(io_err)?;
		let next = TextModel::new(&text, 1)
			.apply_edits(edits, self.config.offset_encoding)
			.map_err(|source| ApplyError::InvalidEdits {
				uri: uri.as_str().to_string(),
				source,
			})?;
		write_atomic(&path, next.text()).await?;
		self.emit_file_event(&path, FileChangeKind::Changed);
		Ok(OperationOutcome::EditedFile { uri: uri.clone() })
	}

	/// Validates and applies `edit`.
	///
	/// Validation covers every operation before anything is applied; on a
	/// validation failure nothing has changed. A failure while applying stops
	/// at the failing operation.
	pub async fn apply_workspace_edit(&mut self, edit: &WorkspaceEdit) -> Result<ApplyReport, ApplyEditFailure> {
		let ops = normalize(edit).map_err(|error| ApplyEditFailure::invalid(error, None))?;
		self.validate(&ops).await?;

		let mut outcomes = Vec::with_capacity(ops.len());
		for (idx, op) in ops.iter().enumerate() {
			match self.execute(op).await {
				Ok(outcome) => outcomes.push(outcome),
				Err(error) => {
					error!(error = %error, index = idx, applied = outcomes.len(), "workspace_edit.apply_failed");
					return Err(ApplyEditFailure {
						error,
						failed_change: Some(idx),
						applied: outcomes,
					});
				}
			}
		}
		debug!(operations = outcomes.len(), "workspace_edit.applied");
		Ok(ApplyReport { outcomes })
	}

	/// Applies `edit`, reporting failures to the user and returning only success.
	pub async fn apply_edit(&mut self, edit: &WorkspaceEdit) -> bool {
		match self.apply_workspace_edit(edit).await {
			Ok(_) => true,
			Err(failure) => {
				self.prompter.show_message(MessageLevel::Error, &failure.to_string());
				false
			}
		}
	}
}
