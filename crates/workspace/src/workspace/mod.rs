//! Document registry and host event routing.
//!
//! The [`Workspace`] owns every attached [`Document`], indexed by buffer id
//! and by URI. It is driven from a single task: host events, content provider
//! notifications and debounce deadlines are all handled through `&mut self`.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use lsp_types::{TextEdit, Uri};
use tether_primitives::{LineDelta, TextModel};
use tokio::sync::{broadcast, mpsc};
use tokio::time::{Instant, sleep_until, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::WorkspaceConfig;
use crate::content_provider::{ContentProvider, ContentProviders, ProviderError, ProviderHandle};
use crate::document::{Document, DocumentError, DocumentInit};
use crate::events::{EVENT_CHANNEL_CAPACITY, WorkspaceEvent};
use crate::host::{BufferId, Host, HostError, HostEvent, Prompter, SaveReason};
use crate::uri::{buffer_uri, path_from_uri, scheme_of, uri_from_path, uri_key};
use crate::watcher::{FileChangeKind, FileEvent, FileSystemWatcher, WatchError, WatchOptions, WatcherRegistry};

#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
	#[error(transparent)]
	Host(#[from] HostError),
	#[error(transparent)]
	Document(#[from] DocumentError),
	#[error(transparent)]
	Provider(#[from] ProviderError),
	#[error("i/o error: {0}")]
	Io(#[from] std::io::Error),
	#[error("{0} is not a file URI")]
	NotFilesystem(String),
}

/// Lookup key for [`Workspace::get_document`].
#[derive(Debug, Clone, Copy)]
pub enum DocumentRef<'a> {
	Buffer(BufferId),
	Uri(&'a Uri),
	Str(&'a str),
}

impl From<BufferId> for DocumentRef<'_> {
	fn from(buffer: BufferId) -> Self {
		Self::Buffer(buffer)
	}
}

impl<'a> From<&'a Uri> for DocumentRef<'a> {
	fn from(uri: &'a Uri) -> Self {
		Self::Uri(uri)
	}
}

impl<'a> From<&'a str> for DocumentRef<'a> {
	fn from(uri: &'a str) -> Self {
		Self::Str(uri)
	}
}

/// Contributes edits right before a buffer is written.
#[async_trait]
pub trait WillSaveParticipant: Send + Sync {
	async fn will_save(&self, document: Arc<Document>, reason: SaveReason) -> Vec<TextEdit>;
}

/// Registry of attached documents for one host.
pub struct Workspace {
	pub(crate) host: Arc<dyn Host>,
	pub(crate) prompter: Arc<dyn Prompter>,
	pub(crate) config: WorkspaceConfig,
	documents: HashMap<BufferId, Arc<Document>>,
	uris: HashMap<String, BufferId>,
	providers: ContentProviders,
	provider_tx: mpsc::UnboundedSender<Uri>,
	provider_rx: mpsc::UnboundedReceiver<Uri>,
	watchers: WatcherRegistry,
	participants: Vec<Arc<dyn WillSaveParticipant>>,
	events: broadcast::Sender<WorkspaceEvent>,
	next_attach_seq: u64,
}

impl Workspace {
	pub fn new(host: Arc<dyn Host>, prompter: Arc<dyn Prompter>, config: WorkspaceConfig) -> Self {
		let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
		let (provider_tx, provider_rx) = mpsc::unbounded_channel();
		Self {
			host,
			prompter,
			config,
			documents: HashMap::new(),
			uris: HashMap::new(),
			providers: ContentProviders::new(),
			provider_tx,
			provider_rx,
			watchers: WatcherRegistry::default(),
			participants: Vec::new(),
			events,
			next_attach_seq: 0,
		}
	}

	pub fn config(&self) -> &WorkspaceConfig {
		&self.config
	}

	pub fn subscribe(&self) -> broadcast::Receiver<WorkspaceEvent> {
		self.events.subscribe()
	}

	pub(crate) fn emit(&self, event: WorkspaceEvent) {
		let _ = self.events.send(event);
	}

	/// Attached documents, ordered by buffer id.
	pub fn documents(&self) -> Vec<Arc<Document>> {
		let mut docs: Vec<Arc<Document>> = self.documents.values().cloned().collect();
		docs.sort_by_key(|doc| doc.buffer());
		docs
	}

	/// Looks up a document by buffer id or URI. Absence is not an error.
	pub fn get_document<'a>(&self, key: impl Into<DocumentRef<'a>>) -> Option<Arc<Document>> {
		let buffer = match key.into() {
			DocumentRef::Buffer(buffer) => buffer,
			DocumentRef::Uri(uri) => *self.uris.get(&uri_key(uri))?,
			DocumentRef::Str(raw) => {
				let key = Uri::from_str(raw).map(|uri| uri_key(&uri)).unwrap_or_else(|_| raw.to_string());
				*self.uris.get(&key)?
			}
		};
		self.documents.get(&buffer).cloned()
	}

	/// Document whose file path is `path`.
	pub(crate) fn document_at_path(&self, path: &Path) -> Option<Arc<Document>> {
		let uri = uri_from_path(path, Path::new("/"))?;
		self.get_document(&uri)
	}

	/// Documents whose file lies at or below `path`.
	pub(crate) fn documents_under(&self, path: &Path) -> Vec<Arc<Document>> {
		self.documents()
			.into_iter()
			.filter(|doc| path_from_uri(&doc.uri()).is_some_and(|doc_path| doc_path.starts_with(path)))
			.collect()
	}

	/// Document for the host's active buffer.
	///
	/// The host is asked on every call. An untracked active buffer is attached
	/// on the spot when it qualifies.
	pub async fn current_document(&mut self) -> Result<Option<Arc<Document>>, WorkspaceError> {
		let buffer = self.host.current_buffer().await?;
		if let Some(doc) = self.documents.get(&buffer) {
			return Ok(Some(Arc::clone(doc)));
		}
		self.attach(buffer).await
	}

	/// Routes one host notification.
	pub async fn handle_event(&mut self, event: HostEvent) -> Result<(), WorkspaceError> {
		match event {
			HostEvent::BufferCreated(buffer) => {
				self.attach(buffer).await?;
			}
			HostEvent::BufferChanged {
				buffer,
				changedtick,
				delta,
			} => self.on_buffer_changed(buffer, changedtick, &delta).await?,
			HostEvent::BufferDestroyed(buffer) => {
				self.remove_document(buffer);
			}
			HostEvent::OptionChanged { buffer, option } => self.on_option_changed(buffer, &option).await?,
			HostEvent::BufferRenamed(buffer) => self.on_buffer_renamed(buffer).await?,
			HostEvent::BufferWillSave { buffer, reason } => self.will_save(buffer, reason).await?,
			HostEvent::BufferSaved(buffer) => {
				if let Some(doc) = self.documents.get(&buffer) {
					doc.set_dirty(false);
					self.emit(WorkspaceEvent::DocumentSaved(Arc::clone(doc)));
				}
			}
		}
		Ok(())
	}

	/// Starts tracking `buffer` if it qualifies.
	///
	/// A buffer qualifies when it is loaded and either listed or named with a
	/// scheme that has a content provider. Provider-backed buffers are seeded
	/// with the provider's content before the document is created.
	pub async fn attach(&mut self, buffer: BufferId) -> Result<Option<Arc<Document>>, WorkspaceError> {
		if let Some(doc) = self.documents.get(&buffer) {
			return Ok(Some(Arc::clone(doc)));
		}
		let Some(info) = self.host.buffer_info(buffer).await? else {
			return Ok(None);
		};
		if !info.loaded {
			return Ok(None);
		}
		let cwd = self.host.cwd().await?;
		let Some(uri) = buffer_uri(&info, buffer, &cwd) else {
			debug!(buffer = buffer.0, name = %info.name, "workspace.uri_underivable");
			return Ok(None);
		};
		let provider = self.providers.get(&scheme_of(&uri));
		if !info.listed && provider.is_none() {
			return Ok(None);
		}
		if !self.host.attach_buffer(buffer).await? {
			warn!(buffer = buffer.0, "workspace.attach_refused");
			return Ok(None);
		}

		let mut snapshot = self.host.buffer_lines(buffer).await?;
		let mut eol = info.eol;
		if let Some(provider) = provider {
			let content = provider.provide_content(&uri).await?;
			let (lines, content_eol) = split_content(&content);
			snapshot.changedtick = self.host.set_buffer_lines(buffer, 0, snapshot.lines.len(), lines.clone()).await?;
			snapshot.lines = lines;
			eol = content_eol;
		}

		self.next_attach_seq += 1;
		let doc = Arc::new(Document::new(
			DocumentInit {
				buffer,
				uri: uri.clone(),
				language_id: info.filetype.clone(),
				lines: snapshot.lines,
				eol,
				changedtick: snapshot.changedtick,
				dirty: info.modified,
				encoding: self.config.offset_encoding,
				attach_seq: self.next_attach_seq,
			},
			self.events.clone(),
		));
		self.documents.insert(buffer, Arc::clone(&doc));
		self.uris.insert(uri_key(&uri), buffer);
		info!(buffer = buffer.0, uri = uri.as_str(), language = %info.filetype, "workspace.document_attached");
		self.emit(WorkspaceEvent::DocumentOpened(Arc::clone(&doc)));
		Ok(Some(doc))
	}

	/// Stops tracking `buffer` and unsubscribes from its changes.
	pub async fn detach(&mut self, buffer: BufferId) -> Result<Option<Arc<Document>>, WorkspaceError> {
		let Some(doc) = self.remove_document(buffer) else {
			return Ok(None);
		};
		self.host.detach_buffer(buffer).await?;
		Ok(Some(doc))
	}

	/// Detaches every document, e.g. when the integration is disabled.
	pub async fn detach_all(&mut self) {
		let buffers: Vec<BufferId> = self.documents.keys().copied().collect();
		for buffer in buffers {
			if let Err(e) = self.detach(buffer).await {
				warn!(buffer = buffer.0, error = %e, "workspace.detach_failed");
			}
		}
	}

	/// Drops `buffer` from the registry and publishes its closure.
	pub(crate) fn remove_document(&mut self, buffer: BufferId) -> Option<Arc<Document>> {
		let doc = self.documents.remove(&buffer)?;
		doc.mark_detached();
		let uri = doc.uri();
		self.unindex(&uri_key(&uri), buffer);
		debug!(buffer = buffer.0, uri = uri.as_str(), "workspace.document_detached");
		self.emit(WorkspaceEvent::DocumentClosed { buffer, uri });
		Some(doc)
	}

	/// Removes `key -> buffer`, re-pointing the key at the most recently
	/// attached document still sharing the URI.
	fn unindex(&mut self, key: &str, buffer: BufferId) {
		if self.uris.get(key) != Some(&buffer) {
			return;
		}
		self.uris.remove(key);
		let successor = self
			.documents
			.values()
			.filter(|doc| doc.buffer() != buffer && uri_key(&doc.uri()) == key)
			.max_by_key(|doc| doc.attach_seq())
			.map(|doc| doc.buffer());
		if let Some(successor) = successor {
			self.uris.insert(key.to_string(), successor);
		}
	}

	/// Points an attached document at a new URI, keeping its identity.
	pub(crate) fn retarget(&mut self, doc: &Arc<Document>, new_uri: Uri) {
		let old_uri = doc.uri();
		self.unindex(&uri_key(&old_uri), doc.buffer());
		doc.set_uri(new_uri.clone());
		self.uris.insert(uri_key(&new_uri), doc.buffer());
		info!(buffer = doc.buffer().0, from = old_uri.as_str(), to = new_uri.as_str(), "workspace.document_renamed");
		self.emit(WorkspaceEvent::DocumentRenamed {
			document: Arc::clone(doc),
			old_uri,
		});
	}

	async fn on_buffer_changed(&mut self, buffer: BufferId, changedtick: u64, delta: &LineDelta) -> Result<(), WorkspaceError> {
		let Some(doc) = self.documents.get(&buffer).cloned() else {
			trace!(buffer = buffer.0, "workspace.change_for_untracked_buffer");
			return Ok(());
		};
		match doc.apply_change(changedtick, delta) {
			Ok(_) => Ok(()),
			Err(DocumentError::Text(e)) => {
				warn!(buffer = buffer.0, error = %e, "workspace.change_misfit_full_refresh");
				let snapshot = self.host.buffer_lines(buffer).await?;
				doc.apply_change(snapshot.changedtick.max(changedtick), &LineDelta::Full(snapshot.lines))?;
				Ok(())
			}
			Err(e) => Err(e.into()),
		}
	}

	async fn on_option_changed(&mut self, buffer: BufferId, option: &str) -> Result<(), WorkspaceError> {
		match option {
			"buftype" | "buflisted" => return self.reattach(buffer).await,
			"filetype" | "modified" | "eol" | "fixeol" => {}
			_ => return Ok(()),
		}
		let Some(doc) = self.documents.get(&buffer).cloned() else {
			return Ok(());
		};
		let Some(info) = self.host.buffer_info(buffer).await? else {
			return Ok(());
		};
		match option {
			"filetype" if info.filetype != doc.language_id() => {
				debug!(buffer = buffer.0, from = %doc.language_id(), to = %info.filetype, "workspace.language_changed");
				self.emit(WorkspaceEvent::DocumentClosed { buffer, uri: doc.uri() });
				doc.set_language_id(info.filetype);
				self.emit(WorkspaceEvent::DocumentOpened(doc));
			}
			"modified" => doc.set_dirty(info.modified),
			"eol" | "fixeol" => doc.set_eol(info.eol),
			_ => {}
		}
		Ok(())
	}

	async fn on_buffer_renamed(&mut self, buffer: BufferId) -> Result<(), WorkspaceError> {
		let Some(doc) = self.documents.get(&buffer).cloned() else {
			return self.attach(buffer).await.map(|_| ());
		};
		let Some(info) = self.host.buffer_info(buffer).await? else {
			return Ok(());
		};
		let cwd = self.host.cwd().await?;
		if buffer_uri(&info, buffer, &cwd).is_some_and(|uri| uri_key(&uri) == uri_key(&doc.uri())) {
			return Ok(());
		}
		self.reattach(buffer).await
	}

	/// Re-evaluates a buffer after options affecting its identity changed.
	async fn reattach(&mut self, buffer: BufferId) -> Result<(), WorkspaceError> {
		self.detach(buffer).await?;
		self.attach(buffer).await?;
		Ok(())
	}

	/// Publishes every document whose debounce window has elapsed.
	pub fn flush_due(&mut self, now: Instant) -> usize {
		let debounce = self.config.change_debounce();
		self.documents
			.values()
			.filter(|doc| doc.is_due(now, debounce))
			.filter_map(|doc| doc.force_sync())
			.count()
	}

	/// Earliest instant at which some document becomes due.
	pub fn next_flush_deadline(&self) -> Option<Instant> {
		let debounce = self.config.change_debounce();
		self.documents.values().filter_map(|doc| doc.flush_deadline(debounce)).min()
	}

	pub fn force_sync_all(&self) {
		for doc in self.documents.values() {
			doc.force_sync();
		}
	}

	/// Replaces the host buffer content of `doc` with `new_lines` and publishes the result.
	///
	/// Only the changed line range is sent to the host. When the returned
	/// changedtick shows that other changes happened in between, the whole
	/// buffer is re-read instead of trusting the local patch.
	pub(crate) async fn write_document_lines(&self, doc: &Document, new_lines: Vec<String>) -> Result<(), WorkspaceError> {
		self.write_document(doc, new_lines, None).await
	}

	/// Writes `next` into the host buffer of `doc`, final newline included,
	/// publishing at most one new version.
	pub(crate) async fn write_document_model(&self, doc: &Document, next: &TextModel) -> Result<(), WorkspaceError> {
		self.write_document(doc, next.lines(), Some(next.eol())).await
	}

	async fn write_document(&self, doc: &Document, new_lines: Vec<String>, eol: Option<bool>) -> Result<(), WorkspaceError> {
		doc.force_sync();
		let old_lines = doc.get_lines()?;
		if let Some(LineDelta::Lines { first, last, lines }) = LineDelta::between(&old_lines, &new_lines) {
			let expected = doc.changedtick() + 1;
			let changedtick = self.host.set_buffer_lines(doc.buffer(), first, last, lines.clone()).await?;
			if changedtick == expected {
				doc.apply_change(changedtick, &LineDelta::Lines { first, last, lines })?;
			} else {
				debug!(buffer = doc.buffer().0, expected, changedtick, "workspace.write_tick_gap");
				let snapshot = self.host.buffer_lines(doc.buffer()).await?;
				doc.apply_change(snapshot.changedtick, &LineDelta::Full(snapshot.lines))?;
			}
		}
		if let Some(eol) = eol
			&& eol != doc.eol()
		{
			self.host.set_buffer_eol(doc.buffer(), eol).await?;
			doc.set_eol(eol);
			doc.set_dirty(true);
		}
		doc.force_sync();
		Ok(())
	}

	/// Content of `uri`: the open document when there is one, the file otherwise.
	pub async fn read_file(&self, uri: &Uri) -> Result<String, WorkspaceError> {
		if let Some(doc) = self.get_document(uri) {
			return Ok(doc.get_text(None)?);
		}
		let path = path_from_uri(uri).ok_or_else(|| WorkspaceError::NotFilesystem(uri.as_str().to_string()))?;
		Ok(tokio::fs::read_to_string(path).await?)
	}

	/// Registers a provider for `scheme`, replacing any previous one.
	///
	/// The provider's change stream is relayed to this workspace; handle the
	/// relayed URIs with [`run`](Self::run) or
	/// [`process_provider_changes`](Self::process_provider_changes).
	/// Must be called within a tokio runtime.
	pub fn register_content_provider(&mut self, scheme: &str, provider: Arc<dyn ContentProvider>) -> ProviderHandle {
		let forward = provider.on_did_change().map(|mut changes| {
			let tx = self.provider_tx.clone();
			let scheme = scheme.to_string();
			tokio::spawn(async move {
				loop {
					match changes.recv().await {
						Ok(uri) => {
							if tx.send(uri).is_err() {
								break;
							}
						}
						Err(broadcast::error::RecvError::Lagged(skipped)) => {
							warn!(scheme = %scheme, skipped, "workspace.provider_changes_lagged");
						}
						Err(broadcast::error::RecvError::Closed) => break,
					}
				}
			})
			.abort_handle()
		});
		self.providers.register(scheme, provider, forward)
	}

	pub fn content_providers(&self) -> &ContentProviders {
		&self.providers
	}

	/// Handles provider change notifications received so far.
	pub async fn process_provider_changes(&mut self) -> usize {
		let mut handled = 0;
		while let Ok(uri) = self.provider_rx.try_recv() {
			if let Err(e) = self.refresh_virtual_document(&uri).await {
				warn!(uri = uri.as_str(), error = %e, "workspace.provider_refresh_failed");
			}
			handled += 1;
		}
		handled
	}

	/// Re-renders an open provider-backed document from its provider.
	pub async fn refresh_virtual_document(&mut self, uri: &Uri) -> Result<(), WorkspaceError> {
		let Some(doc) = self.get_document(uri) else {
			return Ok(());
		};
		let Some(provider) = self.providers.get(&scheme_of(uri)) else {
			return Ok(());
		};
		let content = provider.provide_content(uri).await?;
		let (lines, _) = split_content(&content);
		self.write_document_lines(&doc, lines).await?;
		debug!(uri = uri.as_str(), version = doc.version(), "workspace.virtual_document_refreshed");
		Ok(())
	}

	pub fn create_file_system_watcher(&mut self, pattern: &str, options: WatchOptions) -> Result<FileSystemWatcher, WatchError> {
		self.watchers.watch(pattern, options)
	}

	/// Feeds an externally observed file change to the watchers.
	pub fn notify_file_event(&mut self, event: FileEvent) -> usize {
		self.watchers.dispatch(&event)
	}

	/// Watchers whose receiving side is still alive.
	pub fn watcher_count(&self) -> usize {
		self.watchers.len()
	}

	pub(crate) fn emit_file_event(&mut self, path: &Path, kind: FileChangeKind) {
		let Some(uri) = uri_from_path(path, Path::new("/")) else {
			return;
		};
		self.watchers.dispatch(&FileEvent {
			uri,
			path: path.to_path_buf(),
			kind,
		});
	}

	pub fn register_will_save_participant(&mut self, participant: Arc<dyn WillSaveParticipant>) {
		self.participants.push(participant);
	}

	/// Runs will-save participants for `buffer` and applies their edits.
	///
	/// Each participant gets at most `will_save_timeout_ms`; late or empty
	/// answers are skipped.
	pub async fn will_save(&mut self, buffer: BufferId, reason: SaveReason) -> Result<(), WorkspaceError> {
		let Some(doc) = self.documents.get(&buffer).cloned() else {
			return Ok(());
		};
		doc.force_sync();
		self.emit(WorkspaceEvent::WillSave {
			document: Arc::clone(&doc),
			reason,
		});

		let limit = self.config.will_save_timeout();
		for participant in self.participants.clone() {
			let edits = match timeout(limit, participant.will_save(Arc::clone(&doc), reason)).await {
				Ok(edits) => edits,
				Err(_) => {
					warn!(buffer = buffer.0, "workspace.will_save_timeout");
					continue;
				}
			};
			if edits.is_empty() {
				continue;
			}
			let model = doc.text_model()?;
			match model.apply_edits(&edits, doc.encoding()) {
				Ok(next) => self.write_document_model(&doc, &next).await?,
				Err(e) => warn!(buffer = buffer.0, error = %e, "workspace.will_save_edits_rejected"),
			}
		}
		Ok(())
	}

	/// Drives the workspace until `shutdown` fires or the host event stream ends.
	///
	/// Pending changes are published before returning.
	pub async fn run(&mut self, mut host_events: mpsc::UnboundedReceiver<HostEvent>, shutdown: CancellationToken) {
		loop {
			let deadline = self.next_flush_deadline();
			tokio::select! {
				biased;
				_ = shutdown.cancelled() => break,
				event = host_events.recv() => {
					let Some(event) = event else { break };
					if let Err(e) = self.handle_event(event).await {
						warn!(error = %e, "workspace.host_event_failed");
					}
				}
				Some(uri) = self.provider_rx.recv() => {
					if let Err(e) = self.refresh_virtual_document(&uri).await {
						warn!(uri = uri.as_str(), error = %e, "workspace.provider_refresh_failed");
					}
				}
				_ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
					self.flush_due(Instant::now());
				}
			}
		}
		self.force_sync_all();
		debug!("workspace.run_stopped");
	}
}

/// Splits text into host lines, reporting whether it ended with a newline.
pub(crate) fn split_content(content: &str) -> (Vec<String>, bool) {
	let eol = content.ends_with('\n');
	let body = content.strip_suffix('\n').unwrap_or(content);
	(body.split('\n').map(str::to_owned).collect(), eol)
}
