//! In-memory host for headless embedding and tests.
//!
//! [`MemoryHost`] behaves like an editor that notifies about every change it
//! makes, including the ones requested through [`Host::set_buffer_lines`].
//! Notifications go to the receiver returned by [`MemoryHost::new`].

use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tether_primitives::LineDelta;
use tokio::sync::mpsc;

use crate::host::{BufferId, BufferInfo, BufferLines, Host, HostError, HostEvent, MessageLevel, Prompter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryBuffer {
	pub info: BufferInfo,
	pub lines: Vec<String>,
	pub changedtick: u64,
	pub attached: bool,
}

struct MemoryState {
	buffers: BTreeMap<BufferId, MemoryBuffer>,
	next_id: u64,
	current: Option<BufferId>,
	cwd: PathBuf,
	confirm_answers: VecDeque<Option<bool>>,
	default_confirm: Option<bool>,
	prompts: Vec<String>,
	messages: Vec<(MessageLevel, String)>,
}

pub struct MemoryHost {
	state: Mutex<MemoryState>,
	events: mpsc::UnboundedSender<HostEvent>,
}

impl MemoryHost {
	pub fn new(cwd: impl Into<PathBuf>) -> (Arc<Self>, mpsc::UnboundedReceiver<HostEvent>) {
		let (events, rx) = mpsc::unbounded_channel();
		let host = Self {
			state: Mutex::new(MemoryState {
				buffers: BTreeMap::new(),
				next_id: 1,
				current: None,
				cwd: cwd.into(),
				confirm_answers: VecDeque::new(),
				default_confirm: Some(true),
				prompts: Vec::new(),
				messages: Vec::new(),
			}),
			events,
		};
		(Arc::new(host), rx)
	}

	fn notify(&self, event: HostEvent) {
		let _ = self.events.send(event);
	}

	/// Opens a listed file buffer named `name`, makes it current and reports its creation.
	pub fn open_buffer(&self, name: &str, filetype: &str, lines: &[&str]) -> BufferId {
		let info = BufferInfo {
			name: name.to_string(),
			filetype: filetype.to_string(),
			listed: true,
			loaded: true,
			eol: true,
			..BufferInfo::default()
		};
		self.add_buffer(info, lines.iter().map(|line| line.to_string()).collect())
	}

	/// Adds a buffer with explicit options, makes it current and reports its creation.
	pub fn add_buffer(&self, info: BufferInfo, lines: Vec<String>) -> BufferId {
		let mut state = self.state.lock();
		let id = BufferId(state.next_id);
		state.next_id += 1;
		let lines = if lines.is_empty() { vec![String::new()] } else { lines };
		state.buffers.insert(
			id,
			MemoryBuffer {
				info,
				lines,
				changedtick: 1,
				attached: false,
			},
		);
		state.current = Some(id);
		drop(state);
		self.notify(HostEvent::BufferCreated(id));
		id
	}

	/// Simulates a user edit of lines `first..last`.
	pub fn edit(&self, buffer: BufferId, first: usize, last: usize, lines: &[&str]) -> Result<u64, HostError> {
		let lines: Vec<String> = lines.iter().map(|line| line.to_string()).collect();
		let (tick, attached) = self.replace_lines(buffer, first, last, lines.clone())?;
		if attached {
			self.notify(HostEvent::BufferChanged {
				buffer,
				changedtick: tick,
				delta: LineDelta::Lines { first, last, lines },
			});
		}
		Ok(tick)
	}

	fn replace_lines(&self, buffer: BufferId, first: usize, last: usize, lines: Vec<String>) -> Result<(u64, bool), HostError> {
		let mut state = self.state.lock();
		let buf = state.buffers.get_mut(&buffer).ok_or(HostError::UnknownBuffer(buffer))?;
		LineDelta::Lines { first, last, lines }
			.apply(&mut buf.lines)
			.map_err(|e| HostError::Request(e.to_string()))?;
		if buf.lines.is_empty() {
			buf.lines.push(String::new());
		}
		buf.changedtick += 1;
		buf.info.modified = true;
		Ok((buf.changedtick, buf.attached))
	}

	/// Changes buffer options and reports `option` as changed.
	pub fn set_option(&self, buffer: BufferId, option: &str, update: impl FnOnce(&mut BufferInfo)) {
		if let Some(buf) = self.state.lock().buffers.get_mut(&buffer) {
			update(&mut buf.info);
		}
		self.notify(HostEvent::OptionChanged {
			buffer,
			option: option.to_string(),
		});
	}

	/// Removes a buffer and reports its destruction.
	pub fn delete_buffer(&self, buffer: BufferId) {
		let mut state = self.state.lock();
		state.buffers.remove(&buffer);
		if state.current == Some(buffer) {
			state.current = state.buffers.keys().next_back().copied();
		}
		drop(state);
		self.notify(HostEvent::BufferDestroyed(buffer));
	}

	/// Marks the buffer written and reports the save.
	pub fn mark_saved(&self, buffer: BufferId) {
		if let Some(buf) = self.state.lock().buffers.get_mut(&buffer) {
			buf.info.modified = false;
		}
		self.notify(HostEvent::BufferSaved(buffer));
	}

	pub fn set_current(&self, buffer: BufferId) {
		self.state.lock().current = Some(buffer);
	}

	pub fn buffer(&self, buffer: BufferId) -> Option<MemoryBuffer> {
		self.state.lock().buffers.get(&buffer).cloned()
	}

	pub fn lines(&self, buffer: BufferId) -> Option<Vec<String>> {
		self.buffer(buffer).map(|buf| buf.lines)
	}

	/// Queues the answer for the next confirmation prompt. `None` dismisses it.
	pub fn queue_confirm(&self, answer: Option<bool>) {
		self.state.lock().confirm_answers.push_back(answer);
	}

	/// Answer used once queued answers run out.
	pub fn set_default_confirm(&self, answer: Option<bool>) {
		self.state.lock().default_confirm = answer;
	}

	/// Confirmation prompts shown so far.
	pub fn prompts(&self) -> Vec<String> {
		self.state.lock().prompts.clone()
	}

	pub fn messages(&self) -> Vec<(MessageLevel, String)> {
		self.state.lock().messages.clone()
	}
}

#[async_trait]
impl Host for MemoryHost {
	async fn buffer_info(&self, buffer: BufferId) -> Result<Option<BufferInfo>, HostError> {
		Ok(self.state.lock().buffers.get(&buffer).map(|buf| buf.info.clone()))
	}

	async fn buffer_lines(&self, buffer: BufferId) -> Result<BufferLines, HostError> {
		let state = self.state.lock();
		let buf = state.buffers.get(&buffer).ok_or(HostError::UnknownBuffer(buffer))?;
		Ok(BufferLines {
			lines: buf.lines.clone(),
			changedtick: buf.changedtick,
		})
	}

	async fn set_buffer_lines(&self, buffer: BufferId, first: usize, last: usize, lines: Vec<String>) -> Result<u64, HostError> {
		let (tick, attached) = self.replace_lines(buffer, first, last, lines.clone())?;
		if attached {
			self.notify(HostEvent::BufferChanged {
				buffer,
				changedtick: tick,
				delta: LineDelta::Lines { first, last, lines },
			});
		}
		Ok(tick)
	}

	async fn set_buffer_eol(&self, buffer: BufferId, eol: bool) -> Result<(), HostError> {
		let attached = {
			let mut state = self.state.lock();
			let buf = state.buffers.get_mut(&buffer).ok_or(HostError::UnknownBuffer(buffer))?;
			if buf.info.eol == eol {
				return Ok(());
			}
			buf.info.eol = eol;
			buf.info.modified = true;
			buf.attached
		};
		if attached {
			self.notify(HostEvent::OptionChanged {
				buffer,
				option: "eol".to_string(),
			});
		}
		Ok(())
	}

	async fn attach_buffer(&self, buffer: BufferId) -> Result<bool, HostError> {
		let mut state = self.state.lock();
		Ok(match state.buffers.get_mut(&buffer) {
			Some(buf) => {
				buf.attached = true;
				true
			}
			None => false,
		})
	}

	async fn detach_buffer(&self, buffer: BufferId) -> Result<(), HostError> {
		if let Some(buf) = self.state.lock().buffers.get_mut(&buffer) {
			buf.attached = false;
		}
		Ok(())
	}

	async fn current_buffer(&self) -> Result<BufferId, HostError> {
		self.state.lock().current.ok_or_else(|| HostError::Request("no current buffer".into()))
	}

	async fn rename_buffer(&self, buffer: BufferId, path: &Path) -> Result<(), HostError> {
		let mut state = self.state.lock();
		let buf = state.buffers.get_mut(&buffer).ok_or(HostError::UnknownBuffer(buffer))?;
		buf.info.name = path.to_string_lossy().into_owned();
		drop(state);
		self.notify(HostEvent::BufferRenamed(buffer));
		Ok(())
	}

	async fn wipe_buffer(&self, buffer: BufferId) -> Result<(), HostError> {
		self.delete_buffer(buffer);
		Ok(())
	}

	async fn cwd(&self) -> Result<PathBuf, HostError> {
		Ok(self.state.lock().cwd.clone())
	}
}

#[async_trait]
impl Prompter for MemoryHost {
	async fn confirm(&self, message: &str) -> Option<bool> {
		let mut state = self.state.lock();
		state.prompts.push(message.to_string());
		match state.confirm_answers.pop_front() {
			Some(answer) => answer,
			None => state.default_confirm,
		}
	}

	fn show_message(&self, level: MessageLevel, message: &str) {
		self.state.lock().messages.push((level, message.to_string()));
	}
}
