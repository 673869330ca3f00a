//! Immutable document snapshots.

use lsp_types::{Position, Range, TextEdit};
use ropey::Rope;

use crate::position::{OffsetEncoding, char_to_lsp_position, line_content, lsp_position_to_char, lsp_range_to_char_range};

/// Errors raised by [`TextModel`] queries and edits.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TextModelError {
	#[error("line {line} out of range (document has {line_count} lines)")]
	LineOutOfRange { line: usize, line_count: usize },
	#[error("position {}:{} out of range", .0.line, .0.character)]
	PositionOutOfRange(Position),
	#[error("offset {offset} out of range (document length {len})")]
	OffsetOutOfRange { offset: usize, len: usize },
	#[error("range end {}:{} precedes start {}:{}", .0.end.line, .0.end.character, .0.start.line, .0.start.character)]
	ReversedRange(Range),
	#[error("edits overlap at {}:{}", .0.line, .0.character)]
	OverlappingEdits(Position),
}

/// A text edit resolved to char indices against a specific snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedEdit {
	pub start: usize,
	pub end: usize,
	pub replacement: String,
}

/// Content of a document at one version.
///
/// A model never changes after construction. Edits produce a new model with
/// the version advanced by one, leaving the original untouched so that
/// readers holding the previous snapshot see consistent text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextModel {
	content: Rope,
	version: i32,
}

impl TextModel {
	pub fn new(text: &str, version: i32) -> Self {
		Self {
			content: Rope::from_str(text),
			version,
		}
	}

	/// Builds a model from host buffer lines.
	///
	/// `eol` appends the final newline the host keeps implicit.
	pub fn from_lines<S: AsRef<str>>(lines: &[S], eol: bool, version: i32) -> Self {
		let mut text = String::new();
		for (idx, line) in lines.iter().enumerate() {
			if idx > 0 {
				text.push('\n');
			}
			text.push_str(line.as_ref());
		}
		if eol {
			text.push('\n');
		}
		Self::new(&text, version)
	}

	pub fn version(&self) -> i32 {
		self.version
	}

	pub fn rope(&self) -> &Rope {
		&self.content
	}

	pub fn text(&self) -> String {
		self.content.to_string()
	}

	/// Whether the content ends with a newline.
	pub fn eol(&self) -> bool {
		let len = self.content.len_chars();
		len > 0 && self.content.char(len - 1) == '\n'
	}

	/// Number of lines, counting the empty line after a trailing newline.
	pub fn line_count(&self) -> usize {
		self.content.len_lines()
	}

	/// Content of one line without its terminator.
	pub fn line(&self, line: usize) -> Result<String, TextModelError> {
		if line >= self.line_count() {
			return Err(TextModelError::LineOutOfRange {
				line,
				line_count: self.line_count(),
			});
		}
		Ok(line_content(&self.content, line).to_string())
	}

	/// Lines as the host buffer holds them, without the implicit final empty line.
	pub fn lines(&self) -> Vec<String> {
		let mut count = self.line_count();
		if self.eol() {
			count -= 1;
		}
		(0..count).map(|idx| line_content(&self.content, idx).to_string()).collect()
	}

	/// Document offset of `position`, measured in `encoding` units.
	pub fn offset_at(&self, position: Position, encoding: OffsetEncoding) -> Result<usize, TextModelError> {
		let char_idx = lsp_position_to_char(&self.content, position, encoding).ok_or(TextModelError::PositionOutOfRange(position))?;
		Ok(encoding.char_to_units(&self.content, char_idx))
	}

	/// Position of a document offset measured in `encoding` units.
	pub fn position_at(&self, offset: usize, encoding: OffsetEncoding) -> Result<Position, TextModelError> {
		let out_of_range = || TextModelError::OffsetOutOfRange {
			offset,
			len: encoding.len_of(self.content.slice(..)),
		};
		let char_idx = encoding.units_to_char(&self.content, offset).ok_or_else(out_of_range)?;
		char_to_lsp_position(&self.content, char_idx, encoding).ok_or_else(out_of_range)
	}

	/// Text covered by `range`. Both ends must lie inside the document.
	pub fn text_in(&self, range: Range, encoding: OffsetEncoding) -> Result<String, TextModelError> {
		let start = lsp_position_to_char(&self.content, range.start, encoding).ok_or(TextModelError::PositionOutOfRange(range.start))?;
		let end = lsp_position_to_char(&self.content, range.end, encoding).ok_or(TextModelError::PositionOutOfRange(range.end))?;
		if start > end {
			return Err(TextModelError::ReversedRange(range));
		}
		Ok(self.content.slice(start..end).to_string())
	}

	/// Resolves `edits` against this snapshot.
	///
	/// The result is sorted, free of overlaps, with touching edits merged.
	/// Inserts at the same point keep their given order.
	pub fn plan_edits(&self, edits: &[TextEdit], encoding: OffsetEncoding) -> Result<Vec<PlannedEdit>, TextModelError> {
		let mut planned = Vec::with_capacity(edits.len());
		for edit in edits {
			let (start, end) = lsp_range_to_char_range(&self.content, edit.range, encoding).ok_or_else(|| {
				let bad = if edit.range.start.line as usize >= self.line_count() {
					edit.range.start
				} else {
					edit.range.end
				};
				TextModelError::PositionOutOfRange(bad)
			})?;
			if start > end {
				return Err(TextModelError::ReversedRange(edit.range));
			}
			planned.push(PlannedEdit {
				start,
				end,
				replacement: edit.new_text.clone(),
			});
		}
		coalesce_and_validate(&mut planned).map_err(|at| {
			let position = char_to_lsp_position(&self.content, at, encoding).unwrap_or_default();
			TextModelError::OverlappingEdits(position)
		})?;
		Ok(planned)
	}

	/// Applies `edits` as one combined patch, returning the next version.
	pub fn apply_edits(&self, edits: &[TextEdit], encoding: OffsetEncoding) -> Result<TextModel, TextModelError> {
		let planned = self.plan_edits(edits, encoding)?;
		let mut content = self.content.clone();
		for edit in planned.iter().rev() {
			content.remove(edit.start..edit.end);
			content.insert(edit.start, &edit.replacement);
		}
		Ok(Self {
			content,
			version: self.version + 1,
		})
	}

	/// Next version of this model holding `text`.
	pub fn successor(&self, text: &str) -> TextModel {
		Self::new(text, self.version + 1)
	}

	/// Whether both models hold the same text, ignoring versions.
	pub fn same_content(&self, other: &TextModel) -> bool {
		self.content == other.content
	}
}

/// Sorts edits, merges touching ones and rejects overlaps.
///
/// On overlap, returns the char index where the conflict starts.
fn coalesce_and_validate(edits: &mut Vec<PlannedEdit>) -> Result<(), usize> {
	edits.sort_by_key(|edit| (edit.start, edit.end));
	let mut out: Vec<PlannedEdit> = Vec::with_capacity(edits.len());
	for edit in edits.drain(..) {
		if let Some(last) = out.last_mut() {
			if edit.start < last.end {
				return Err(edit.start);
			}
			if edit.start == last.end {
				last.end = edit.end;
				last.replacement.push_str(&edit.replacement);
				continue;
			}
		}
		out.push(edit);
	}
	*edits = out;
	Ok(())
}
