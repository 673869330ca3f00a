//! Document: the synchronized view of one host buffer.
//!
//! A [`Document`] mirrors the host's live lines and publishes them as a
//! sequence of immutable [`TextModel`] versions. Host changes land in the
//! live line buffer immediately; publishing is debounced so that a burst of
//! keystrokes produces one version and one [`WorkspaceEvent::DocumentChanged`].
//!
//! # Change ordering
//!
//! Every host change carries the buffer's `changedtick`. Changes whose tick is
//! not newer than the last one applied are dropped. This discards the echo
//! the host sends back for writes this side already applied locally.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use lsp_types::{Position, Range, TextDocumentItem, Uri, VersionedTextDocumentIdentifier};
use parking_lot::{Mutex, RwLock};
use tether_primitives::{LineDelta, OffsetEncoding, TextModel, TextModelError, content_change};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::events::{DocumentChange, WorkspaceEvent};
use crate::host::BufferId;

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
	#[error("document for buffer {0} is detached")]
	Detached(BufferId),
	#[error(transparent)]
	Text(#[from] TextModelError),
}

/// Whether a document has unpublished changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
	/// Live lines match the published model.
	Idle,
	/// Changes recorded, waiting for the debounce window to elapse.
	Debouncing,
}

#[derive(Debug)]
struct SyncState {
	lines: Vec<String>,
	eol: bool,
	changedtick: u64,
	phase: SyncPhase,
	last_change_at: Instant,
}

/// Initial state for a newly attached document.
pub(crate) struct DocumentInit {
	pub buffer: BufferId,
	pub uri: Uri,
	pub language_id: String,
	pub lines: Vec<String>,
	pub eol: bool,
	pub changedtick: u64,
	pub dirty: bool,
	pub encoding: OffsetEncoding,
	pub attach_seq: u64,
}

/// Tracked representation of one open host buffer.
///
/// Shared as `Arc<Document>`; renaming retargets the URI in place so that
/// holders keep observing the same document.
pub struct Document {
	buffer: BufferId,
	uri: RwLock<Uri>,
	language_id: RwLock<String>,
	encoding: OffsetEncoding,
	attach_seq: u64,
	attached: AtomicBool,
	dirty: AtomicBool,
	model: RwLock<Arc<TextModel>>,
	sync: Mutex<SyncState>,
	events: broadcast::Sender<WorkspaceEvent>,
}

impl fmt::Debug for Document {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Document")
			.field("buffer", &self.buffer)
			.field("uri", &self.uri.read().as_str())
			.field("version", &self.version())
			.field("attached", &self.is_attached())
			.finish_non_exhaustive()
	}
}

impl Document {
	pub(crate) fn new(init: DocumentInit, events: broadcast::Sender<WorkspaceEvent>) -> Self {
		let model = TextModel::from_lines(&init.lines, init.eol, 1);
		Self {
			buffer: init.buffer,
			uri: RwLock::new(init.uri),
			language_id: RwLock::new(init.language_id),
			encoding: init.encoding,
			attach_seq: init.attach_seq,
			attached: AtomicBool::new(true),
			dirty: AtomicBool::new(init.dirty),
			model: RwLock::new(Arc::new(model)),
			sync: Mutex::new(SyncState {
				lines: init.lines,
				eol: init.eol,
				changedtick: init.changedtick,
				phase: SyncPhase::Idle,
				last_change_at: Instant::now(),
			}),
			events,
		}
	}

	pub fn buffer(&self) -> BufferId {
		self.buffer
	}

	pub fn uri(&self) -> Uri {
		self.uri.read().clone()
	}

	pub fn language_id(&self) -> String {
		self.language_id.read().clone()
	}

	/// Version of the published model.
	pub fn version(&self) -> i32 {
		self.model.read().version()
	}

	pub fn is_attached(&self) -> bool {
		self.attached.load(Ordering::Acquire)
	}

	/// Whether the host buffer has unsaved modifications.
	pub fn is_dirty(&self) -> bool {
		self.dirty.load(Ordering::Acquire)
	}

	/// Whether the live content ends with a final newline.
	pub fn eol(&self) -> bool {
		self.sync.lock().eol
	}

	pub fn encoding(&self) -> OffsetEncoding {
		self.encoding
	}

	pub fn phase(&self) -> SyncPhase {
		self.sync.lock().phase
	}

	/// Host changedtick of the last change recorded into the live lines.
	pub fn changedtick(&self) -> u64 {
		self.sync.lock().changedtick
	}

	pub fn has_pending_changes(&self) -> bool {
		self.phase() == SyncPhase::Debouncing
	}

	/// Order in which documents were attached; later attachments win URI conflicts.
	pub(crate) fn attach_seq(&self) -> u64 {
		self.attach_seq
	}

	/// Current published snapshot.
	pub fn text_model(&self) -> Result<Arc<TextModel>, DocumentError> {
		self.ensure_attached()?;
		Ok(Arc::clone(&self.model.read()))
	}

	pub fn line_count(&self) -> Result<usize, DocumentError> {
		Ok(self.text_model()?.line_count())
	}

	pub fn get_line(&self, line: usize) -> Result<String, DocumentError> {
		Ok(self.text_model()?.line(line)?)
	}

	/// Lines as the host buffer holds them.
	pub fn get_lines(&self) -> Result<Vec<String>, DocumentError> {
		Ok(self.text_model()?.lines())
	}

	/// Full text, or the text inside `range` when given.
	pub fn get_text(&self, range: Option<Range>) -> Result<String, DocumentError> {
		let model = self.text_model()?;
		match range {
			Some(range) => Ok(model.text_in(range, self.encoding)?),
			None => Ok(model.text()),
		}
	}

	pub fn offset_at(&self, position: Position) -> Result<usize, DocumentError> {
		Ok(self.text_model()?.offset_at(position, self.encoding)?)
	}

	pub fn position_at(&self, offset: usize) -> Result<Position, DocumentError> {
		Ok(self.text_model()?.position_at(offset, self.encoding)?)
	}

	/// Item describing the published version, as sent in `didOpen`.
	pub fn text_document_item(&self) -> Result<TextDocumentItem, DocumentError> {
		let model = self.text_model()?;
		Ok(TextDocumentItem {
			uri: self.uri(),
			language_id: self.language_id(),
			version: model.version(),
			text: model.text(),
		})
	}

	pub fn versioned_identifier(&self) -> VersionedTextDocumentIdentifier {
		VersionedTextDocumentIdentifier {
			uri: self.uri(),
			version: self.version(),
		}
	}

	/// Records a host-reported change into the live lines.
	///
	/// Returns `Ok(false)` when the change is stale and was ignored. A delta
	/// that does not fit the live lines leaves them untouched and returns an
	/// error; callers recover by applying a full refresh.
	pub fn apply_change(&self, changedtick: u64, delta: &LineDelta) -> Result<bool, DocumentError> {
		self.ensure_attached()?;
		let mut sync = self.sync.lock();
		if changedtick <= sync.changedtick {
			trace!(buffer = self.buffer.0, changedtick, current = sync.changedtick, "document.change_ignored");
			return Ok(false);
		}
		delta.apply(&mut sync.lines)?;
		sync.changedtick = changedtick;
		sync.phase = SyncPhase::Debouncing;
		sync.last_change_at = Instant::now();
		self.dirty.store(true, Ordering::Release);
		trace!(buffer = self.buffer.0, changedtick, "document.change_recorded");
		Ok(true)
	}

	/// Whether the debounce window has elapsed since the last recorded change.
	pub fn is_due(&self, now: Instant, debounce: Duration) -> bool {
		let sync = self.sync.lock();
		sync.phase == SyncPhase::Debouncing && now.saturating_duration_since(sync.last_change_at) >= debounce
	}

	/// Instant at which pending changes become due, if any are pending.
	pub fn flush_deadline(&self, debounce: Duration) -> Option<Instant> {
		let sync = self.sync.lock();
		(sync.phase == SyncPhase::Debouncing).then(|| sync.last_change_at + debounce)
	}

	/// Publishes pending changes immediately.
	///
	/// Produces at most one new version. Returns `None` when nothing was
	/// pending or the live content already matches the published model.
	pub fn force_sync(&self) -> Option<DocumentChange> {
		let mut sync = self.sync.lock();
		if sync.phase == SyncPhase::Idle || !self.is_attached() {
			return None;
		}
		sync.phase = SyncPhase::Idle;

		let mut model = self.model.write();
		let next = TextModel::from_lines(&sync.lines, sync.eol, model.version() + 1);
		if next.same_content(&model) {
			trace!(buffer = self.buffer.0, "document.flush_unchanged");
			return None;
		}
		let content_changes = content_change(model.rope(), next.rope(), self.encoding).into_iter().collect();
		let next = Arc::new(next);
		*model = Arc::clone(&next);
		drop(model);
		drop(sync);

		let change = DocumentChange {
			buffer: self.buffer,
			uri: self.uri(),
			version: next.version(),
			content_changes,
			model: next,
		};
		debug!(buffer = self.buffer.0, version = change.version, "document.changed");
		let _ = self.events.send(WorkspaceEvent::DocumentChanged(change.clone()));
		Some(change)
	}

	pub(crate) fn set_uri(&self, uri: Uri) {
		*self.uri.write() = uri;
	}

	pub(crate) fn set_language_id(&self, language_id: String) {
		*self.language_id.write() = language_id;
	}

	pub(crate) fn set_dirty(&self, dirty: bool) {
		self.dirty.store(dirty, Ordering::Release);
	}

	pub(crate) fn set_eol(&self, eol: bool) {
		let mut sync = self.sync.lock();
		if sync.eol != eol {
			sync.eol = eol;
			sync.phase = SyncPhase::Debouncing;
			sync.last_change_at = Instant::now();
		}
	}

	/// Stops accepting changes; later queries fail with [`DocumentError::Detached`].
	pub(crate) fn mark_detached(&self) {
		self.attached.store(false, Ordering::Release);
		self.sync.lock().phase = SyncPhase::Idle;
	}

	fn ensure_attached(&self) -> Result<(), DocumentError> {
		if self.is_attached() { Ok(()) } else { Err(DocumentError::Detached(self.buffer)) }
	}
}
