use std::sync::Arc;

use lsp_types::{TextDocumentContentChangeEvent, Uri};
use tether_primitives::TextModel;

use crate::document::Document;
use crate::host::{BufferId, SaveReason};

/// Capacity of the workspace event channel. Slow subscribers observe `Lagged`.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// A published document version.
#[derive(Debug, Clone)]
pub struct DocumentChange {
	pub buffer: BufferId,
	pub uri: Uri,
	pub version: i32,
	/// Changes relative to the previous version, in the workspace offset encoding.
	pub content_changes: Vec<TextDocumentContentChangeEvent>,
	/// Snapshot the changes lead to.
	pub model: Arc<TextModel>,
}

/// Notifications broadcast by a [`Workspace`](crate::Workspace).
#[derive(Debug, Clone)]
pub enum WorkspaceEvent {
	DocumentOpened(Arc<Document>),
	DocumentClosed { buffer: BufferId, uri: Uri },
	DocumentChanged(DocumentChange),
	DocumentRenamed { document: Arc<Document>, old_uri: Uri },
	WillSave { document: Arc<Document>, reason: SaveReason },
	DocumentSaved(Arc<Document>),
}
