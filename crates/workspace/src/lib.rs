//! Document synchronization core for editor hosts.
//!
//! A [`Workspace`] mirrors the buffers of a host editor as versioned
//! [`Document`]s, applies LSP workspace edits back through the host and the
//! filesystem, and hosts the registries language features hang off: virtual
//! document providers, file watchers and long-running services.
//!
//! The host is reached only through the [`Host`] and [`Prompter`] traits;
//! [`MemoryHost`] implements both in memory.

pub mod config;
pub mod content_provider;
pub mod document;
pub mod events;
pub mod file_ops;
pub mod host;
pub mod memory;
pub mod services;
pub mod uri;
pub mod watcher;
pub mod workspace;
pub mod workspace_edit;

pub use config::WorkspaceConfig;
pub use content_provider::{ContentProvider, ContentProviders, ProviderError, ProviderHandle};
pub use document::{Document, DocumentError, SyncPhase};
pub use events::{DocumentChange, WorkspaceEvent};
pub use file_ops::{FileOpError, FileOpOutcome};
pub use host::{BufferId, BufferInfo, BufferLines, Host, HostError, HostEvent, MessageLevel, Prompter, SaveReason};
pub use memory::MemoryHost;
pub use services::{Service, ServiceError, ServiceRegistry, ServiceStat, ServiceState};
pub use tether_primitives::{LineDelta, OffsetEncoding, TextModel, TextModelError};
pub use watcher::{FileChangeKind, FileEvent, FileSystemWatcher, WatchError, WatchOptions};
pub use workspace::{DocumentRef, WillSaveParticipant, Workspace, WorkspaceError};
pub use workspace_edit::{ApplyEditFailure, ApplyError, ApplyReport, OperationOutcome};

#[cfg(test)]
pub(crate) mod testing;
