//! Virtual content keyed by URI scheme.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use lsp_types::Uri;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
#[error("content provider failed: {0}")]
pub struct ProviderError(pub String);

/// Generates document content for URIs of one scheme.
#[async_trait]
pub trait ContentProvider: Send + Sync {
	async fn provide_content(&self, uri: &Uri) -> Result<String, ProviderError>;

	/// Stream of URIs whose content should be re-rendered.
	fn on_did_change(&self) -> Option<broadcast::Receiver<Uri>> {
		None
	}
}

struct ProviderEntry {
	id: u64,
	provider: Arc<dyn ContentProvider>,
	forward: Option<AbortHandle>,
}

impl Drop for ProviderEntry {
	fn drop(&mut self) {
		if let Some(forward) = self.forward.take() {
			forward.abort();
		}
	}
}

#[derive(Default)]
struct ProviderMap {
	entries: HashMap<String, ProviderEntry>,
	next_id: u64,
}

/// Scheme to provider map. One provider per scheme; the latest registration wins.
#[derive(Clone, Default)]
pub struct ContentProviders {
	inner: Arc<RwLock<ProviderMap>>,
}

impl ContentProviders {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers `provider` for `scheme`, replacing any previous one.
	///
	/// `forward` is the task relaying the provider's change stream; it is
	/// aborted when the registration goes away.
	pub fn register(&self, scheme: &str, provider: Arc<dyn ContentProvider>, forward: Option<AbortHandle>) -> ProviderHandle {
		let scheme = scheme.to_ascii_lowercase();
		let mut map = self.inner.write();
		map.next_id += 1;
		let id = map.next_id;
		let previous = map.entries.insert(scheme.clone(), ProviderEntry { id, provider, forward });
		drop(map);

		if previous.is_some() {
			warn!(scheme = %scheme, "content_provider.replaced");
		} else {
			debug!(scheme = %scheme, "content_provider.registered");
		}
		ProviderHandle {
			scheme,
			id,
			inner: Arc::downgrade(&self.inner),
		}
	}

	pub fn get(&self, scheme: &str) -> Option<Arc<dyn ContentProvider>> {
		self.inner.read().entries.get(&scheme.to_ascii_lowercase()).map(|entry| Arc::clone(&entry.provider))
	}

	pub fn has(&self, scheme: &str) -> bool {
		self.inner.read().entries.contains_key(&scheme.to_ascii_lowercase())
	}

	/// Registered schemes, sorted.
	pub fn schemes(&self) -> Vec<String> {
		let mut schemes: Vec<String> = self.inner.read().entries.keys().cloned().collect();
		schemes.sort();
		schemes
	}
}

/// Registration returned by [`ContentProviders::register`].
///
/// Dropping the handle keeps the provider registered; call [`dispose`](Self::dispose) to remove it.
#[must_use = "keep the handle to unregister the provider later"]
pub struct ProviderHandle {
	scheme: String,
	id: u64,
	inner: Weak<RwLock<ProviderMap>>,
}

impl ProviderHandle {
	pub fn scheme(&self) -> &str {
		&self.scheme
	}

	/// Unregisters the provider, unless a later registration already replaced it.
	pub fn dispose(self) {
		let Some(inner) = self.inner.upgrade() else {
			return;
		};
		let mut map = inner.write();
		if map.entries.get(&self.scheme).is_some_and(|entry| entry.id == self.id) {
			map.entries.remove(&self.scheme);
			debug!(scheme = %self.scheme, "content_provider.disposed");
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	struct Fixed(&'static str);

	#[async_trait]
	impl ContentProvider for Fixed {
		async fn provide_content(&self, _uri: &Uri) -> Result<String, ProviderError> {
			Ok(self.0.to_string())
		}
	}

	async fn content(providers: &ContentProviders, scheme: &str) -> Option<String> {
		let provider = providers.get(scheme)?;
		let uri: Uri = format!("{scheme}://x").parse().unwrap();
		provider.provide_content(&uri).await.ok()
	}

	#[tokio::test]
	async fn last_registration_wins() {
		let providers = ContentProviders::new();
		let first = providers.register("git", Arc::new(Fixed("one")), None);
		let _second = providers.register("GIT", Arc::new(Fixed("two")), None);

		assert_eq!(content(&providers, "git").await.as_deref(), Some("two"));

		// Disposing the replaced registration leaves the winner alone.
		first.dispose();
		assert_eq!(content(&providers, "git").await.as_deref(), Some("two"));
	}

	#[tokio::test]
	async fn dispose_unregisters() {
		let providers = ContentProviders::new();
		let handle = providers.register("output", Arc::new(Fixed("log")), None);
		assert_eq!(providers.schemes(), vec!["output"]);
		assert_eq!(handle.scheme(), "output");

		handle.dispose();
		assert!(!providers.has("output"));
		assert!(content(&providers, "output").await.is_none());
	}

	#[tokio::test]
	async fn replacing_aborts_previous_forwarder() {
		let providers = ContentProviders::new();
		let task = tokio::spawn(std::future::pending::<()>());
		let _first = providers.register("git", Arc::new(Fixed("one")), Some(task.abort_handle()));
		let _second = providers.register("git", Arc::new(Fixed("two")), None);

		let err = task.await.unwrap_err();
		assert!(err.is_cancelled());
	}
}
