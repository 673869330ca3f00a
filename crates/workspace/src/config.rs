use std::time::Duration;

use serde::{Deserialize, Serialize};
use tether_primitives::OffsetEncoding;

/// Settings for a [`Workspace`](crate::Workspace).
///
/// Loading is left to the embedder; any subset of fields may be given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceConfig {
	/// Quiet period after the last buffer change before a document publishes a new version.
	#[serde(default = "default_change_debounce_ms")]
	pub change_debounce_ms: u64,
	/// Upper bound for will-save participants, in milliseconds.
	#[serde(default = "default_will_save_timeout_ms")]
	pub will_save_timeout_ms: u64,
	/// Ask before a workspace edit rewrites a file that is not open.
	#[serde(default = "default_true")]
	pub confirm_disk_edits: bool,
	/// URI schemes backed by the local filesystem.
	#[serde(default = "default_filesystem_schemes")]
	pub filesystem_schemes: Vec<String>,
	/// Unit of the `character` field in positions exchanged with callers.
	#[serde(default)]
	pub offset_encoding: OffsetEncoding,
}

fn default_change_debounce_ms() -> u64 {
	150
}

fn default_will_save_timeout_ms() -> u64 {
	1000
}

fn default_true() -> bool {
	true
}

fn default_filesystem_schemes() -> Vec<String> {
	vec!["file".to_string()]
}

impl Default for WorkspaceConfig {
	fn default() -> Self {
		Self {
			change_debounce_ms: default_change_debounce_ms(),
			will_save_timeout_ms: default_will_save_timeout_ms(),
			confirm_disk_edits: default_true(),
			filesystem_schemes: default_filesystem_schemes(),
			offset_encoding: OffsetEncoding::default(),
		}
	}
}

impl WorkspaceConfig {
	pub fn change_debounce(&self) -> Duration {
		Duration::from_millis(self.change_debounce_ms)
	}

	pub fn will_save_timeout(&self) -> Duration {
		Duration::from_millis(self.will_save_timeout_ms)
	}

	/// Whether `scheme` addresses the local filesystem.
	pub fn is_filesystem_scheme(&self, scheme: &str) -> bool {
		self.filesystem_schemes.iter().any(|known| known.eq_ignore_ascii_case(scheme))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn missing_fields_take_defaults() {
		let config: WorkspaceConfig = serde_json::from_str(r#"{"change_debounce_ms": 20}"#).unwrap();
		assert_eq!(config.change_debounce(), Duration::from_millis(20));
		assert_eq!(config.will_save_timeout_ms, 1000);
		assert!(config.confirm_disk_edits);
		assert_eq!(config.filesystem_schemes, vec!["file"]);
		assert_eq!(config.offset_encoding, OffsetEncoding::Utf16);
	}

	#[test]
	fn offset_encoding_uses_lsp_names() {
		let config: WorkspaceConfig = serde_json::from_str(r#"{"offset_encoding": "utf-8"}"#).unwrap();
		assert_eq!(config.offset_encoding, OffsetEncoding::Utf8);
	}

	#[test]
	fn scheme_check_ignores_case() {
		let config = WorkspaceConfig::default();
		assert!(config.is_filesystem_scheme("FILE"));
		assert!(!config.is_filesystem_scheme("untitled"));
	}
}
