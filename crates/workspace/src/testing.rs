//! Fixtures shared by the unit tests.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::WorkspaceConfig;
use crate::host::{BufferId, HostEvent};
use crate::memory::MemoryHost;
use crate::workspace::Workspace;

pub(crate) struct Fixture {
	pub ws: Workspace,
	pub host: Arc<MemoryHost>,
	pub rx: mpsc::UnboundedReceiver<HostEvent>,
}

pub(crate) fn init_tracing() {
	let _ = tracing_subscriber::fmt().with_test_writer().with_max_level(tracing::Level::TRACE).try_init();
}

pub(crate) fn fixture(cwd: &Path) -> Fixture {
	fixture_with(cwd, WorkspaceConfig::default())
}

pub(crate) fn fixture_with(cwd: &Path, config: WorkspaceConfig) -> Fixture {
	init_tracing();
	let (host, rx) = MemoryHost::new(cwd);
	let ws = Workspace::new(host.clone(), host.clone(), config);
	Fixture { ws, host, rx }
}

impl Fixture {
	/// Handles every host event queued so far.
	pub async fn pump(&mut self) -> usize {
		let mut handled = 0;
		while let Ok(event) = self.rx.try_recv() {
			self.ws.handle_event(event).await.unwrap();
			handled += 1;
		}
		handled
	}

	/// Opens `path` as a listed buffer and attaches it.
	pub async fn open(&mut self, path: &Path, lines: &[&str]) -> BufferId {
		let id = self.host.open_buffer(&path.to_string_lossy(), "rust", lines);
		self.pump().await;
		id
	}

	/// Simulates a user edit and publishes it right away.
	pub async fn type_edit(&mut self, buffer: BufferId, first: usize, last: usize, lines: &[&str]) {
		self.host.edit(buffer, first, last, lines).unwrap();
		self.pump().await;
		self.ws.force_sync_all();
	}
}
