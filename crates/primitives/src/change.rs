//! Line-level deltas reported by hosts and the LSP content changes derived from them.

use lsp_types::TextDocumentContentChangeEvent;
use ropey::Rope;

use crate::position::{OffsetEncoding, char_range_to_lsp_range};
use crate::text_model::TextModelError;

/// A change to a host buffer expressed in whole lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineDelta {
	/// Lines `first..last` were replaced by `lines`.
	Lines { first: usize, last: usize, lines: Vec<String> },
	/// The buffer content was replaced wholesale.
	Full(Vec<String>),
}

impl LineDelta {
	/// Smallest delta turning `old` into `new`, or `None` when they are equal.
	pub fn between<S: AsRef<str>, T: AsRef<str>>(old: &[S], new: &[T]) -> Option<LineDelta> {
		let prefix = old.iter().zip(new).take_while(|(a, b)| a.as_ref() == b.as_ref()).count();
		if prefix == old.len() && prefix == new.len() {
			return None;
		}
		let max_suffix = old.len().min(new.len()) - prefix;
		let suffix = old
			.iter()
			.rev()
			.zip(new.iter().rev())
			.take(max_suffix)
			.take_while(|(a, b)| a.as_ref() == b.as_ref())
			.count();
		Some(LineDelta::Lines {
			first: prefix,
			last: old.len() - suffix,
			lines: new[prefix..new.len() - suffix].iter().map(|line| line.as_ref().to_owned()).collect(),
		})
	}

	/// Applies the delta to `target` in place.
	pub fn apply(&self, target: &mut Vec<String>) -> Result<(), TextModelError> {
		match self {
			LineDelta::Full(lines) => {
				target.clone_from(lines);
			}
			LineDelta::Lines { first, last, lines } => {
				if first > last || *last > target.len() {
					return Err(TextModelError::LineOutOfRange {
						line: (*first).max(*last),
						line_count: target.len(),
					});
				}
				target.splice(*first..*last, lines.iter().cloned());
			}
		}
		Ok(())
	}
}

/// Single incremental content change turning `old` into `new`.
///
/// The range covers everything between the longest common prefix and the
/// longest common suffix, expressed in `old` coordinates. Returns `None` when
/// the texts are identical.
pub fn content_change(old: &Rope, new: &Rope, encoding: OffsetEncoding) -> Option<TextDocumentContentChangeEvent> {
	let prefix = old.chars().zip(new.chars()).take_while(|(a, b)| a == b).count();
	let (old_len, new_len) = (old.len_chars(), new.len_chars());
	if prefix == old_len && prefix == new_len {
		return None;
	}

	let max_suffix = old_len.min(new_len) - prefix;
	let mut suffix = 0;
	let mut old_rev = old.chars_at(old_len);
	let mut new_rev = new.chars_at(new_len);
	while suffix < max_suffix {
		match (old_rev.prev(), new_rev.prev()) {
			(Some(a), Some(b)) if a == b => suffix += 1,
			_ => break,
		}
	}

	let range = char_range_to_lsp_range(old, prefix, old_len - suffix, encoding)?;
	Some(TextDocumentContentChangeEvent {
		range: Some(range),
		range_length: None,
		text: new.slice(prefix..new_len - suffix).to_string(),
	})
}
