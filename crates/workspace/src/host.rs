//! Capabilities the core consumes from the host editor.
//!
//! The authoritative buffer state lives in the host, usually in another
//! process. Every call here is a suspension point and may fail independently
//! of the document state kept on this side.

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tether_primitives::LineDelta;

/// Opaque host handle for a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u64);

impl fmt::Display for BufferId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Snapshot of the host-side options describing a buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BufferInfo {
	/// Buffer name, usually an absolute file path or a `scheme://` resource.
	pub name: String,
	/// Special buffer kind; empty for ordinary file buffers.
	pub buftype: String,
	pub filetype: String,
	pub listed: bool,
	pub loaded: bool,
	/// Whether the buffer is written with a final newline.
	pub eol: bool,
	pub modified: bool,
}

/// Buffer content together with the changedtick it was read at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BufferLines {
	pub lines: Vec<String>,
	pub changedtick: u64,
}

/// Why the host is about to write a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveReason {
	Manual,
	AfterDelay,
	FocusOut,
}

impl From<SaveReason> for lsp_types::TextDocumentSaveReason {
	fn from(reason: SaveReason) -> Self {
		match reason {
			SaveReason::Manual => Self::MANUAL,
			SaveReason::AfterDelay => Self::AFTER_DELAY,
			SaveReason::FocusOut => Self::FOCUS_OUT,
		}
	}
}

/// Buffer lifecycle and change notifications, in host order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
	BufferCreated(BufferId),
	/// Buffer content changed. `changedtick` is the host's per-buffer change counter after the change.
	BufferChanged {
		buffer: BufferId,
		changedtick: u64,
		delta: LineDelta,
	},
	BufferDestroyed(BufferId),
	/// A buffer-local option changed (`filetype`, `buftype`, `buflisted`, `modified`, ...).
	OptionChanged { buffer: BufferId, option: String },
	/// The buffer was given a new name by the host.
	BufferRenamed(BufferId),
	BufferWillSave { buffer: BufferId, reason: SaveReason },
	BufferSaved(BufferId),
}

/// Severity of a message surfaced to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageLevel {
	Info,
	Warning,
	Error,
}

#[derive(Debug, thiserror::Error)]
pub enum HostError {
	#[error("unknown buffer {0}")]
	UnknownBuffer(BufferId),
	#[error("host request failed: {0}")]
	Request(String),
	#[error("host connection closed")]
	Disconnected,
}

/// Buffer operations provided by the host editor.
#[async_trait]
pub trait Host: Send + Sync {
	/// Options of `buffer`, or `None` when the host no longer knows it.
	async fn buffer_info(&self, buffer: BufferId) -> Result<Option<BufferInfo>, HostError>;

	async fn buffer_lines(&self, buffer: BufferId) -> Result<BufferLines, HostError>;

	/// Replaces lines `first..last` and returns the buffer's new changedtick.
	async fn set_buffer_lines(&self, buffer: BufferId, first: usize, last: usize, lines: Vec<String>) -> Result<u64, HostError>;

	/// Sets whether the buffer is written with a final newline.
	async fn set_buffer_eol(&self, buffer: BufferId, eol: bool) -> Result<(), HostError>;

	/// Subscribes to change notifications for `buffer`.
	///
	/// Returns `false` when the host refused, e.g. because the buffer is gone.
	async fn attach_buffer(&self, buffer: BufferId) -> Result<bool, HostError>;

	async fn detach_buffer(&self, buffer: BufferId) -> Result<(), HostError>;

	async fn current_buffer(&self) -> Result<BufferId, HostError>;

	/// Points `buffer` at a new file path without reloading its content.
	async fn rename_buffer(&self, buffer: BufferId, path: &Path) -> Result<(), HostError>;

	/// Unloads `buffer` and discards it.
	async fn wipe_buffer(&self, buffer: BufferId) -> Result<(), HostError>;

	async fn cwd(&self) -> Result<PathBuf, HostError>;
}

/// User interaction requested by the core.
#[async_trait]
pub trait Prompter: Send + Sync {
	/// Asks a yes/no question. `None` means the prompt was dismissed.
	async fn confirm(&self, message: &str) -> Option<bool>;

	/// Shows a message without waiting for acknowledgement.
	fn show_message(&self, level: MessageLevel, message: &str);
}
