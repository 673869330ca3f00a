//! Conversion between LSP line/character positions and rope char indices.
//!
//! LSP positions count characters in a negotiated unit ([`OffsetEncoding`]),
//! while [`Rope`] addresses text by Unicode scalar value. Every conversion
//! here goes through the line slice so that the unit only matters within a
//! single line.

use lsp_types::{Position, PositionEncodingKind, Range};
use ropey::{Rope, RopeSlice};
use serde::{Deserialize, Serialize};

/// Unit used for the `character` field of LSP positions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OffsetEncoding {
	/// UTF-8 code units (bytes).
	#[serde(rename = "utf-8")]
	Utf8,
	/// UTF-16 code units, the LSP default.
	#[default]
	#[serde(rename = "utf-16")]
	Utf16,
	/// Unicode scalar values.
	#[serde(rename = "utf-32")]
	Utf32,
}

impl OffsetEncoding {
	/// Maps a negotiated LSP position encoding, returning `None` for unknown kinds.
	pub fn from_lsp(kind: &PositionEncodingKind) -> Option<Self> {
		match kind.as_str() {
			"utf-8" => Some(Self::Utf8),
			"utf-16" => Some(Self::Utf16),
			"utf-32" => Some(Self::Utf32),
			_ => None,
		}
	}

	/// Length of `slice` measured in this encoding's units.
	pub fn len_of(self, slice: RopeSlice<'_>) -> usize {
		match self {
			Self::Utf8 => slice.len_bytes(),
			Self::Utf16 => slice.len_utf16_cu(),
			Self::Utf32 => slice.len_chars(),
		}
	}

	/// Char index within `slice` for an offset in this encoding's units.
	///
	/// Offsets that land inside a multi-unit character resolve to that character.
	fn char_in(self, slice: RopeSlice<'_>, units: usize) -> usize {
		match self {
			Self::Utf8 => slice.byte_to_char(units),
			Self::Utf16 => slice.utf16_cu_to_char(units),
			Self::Utf32 => units,
		}
	}

	/// Converts a document-wide char index into this encoding's units.
	pub fn char_to_units(self, text: &Rope, char_idx: usize) -> usize {
		match self {
			Self::Utf8 => text.char_to_byte(char_idx),
			Self::Utf16 => text.char_to_utf16_cu(char_idx),
			Self::Utf32 => char_idx,
		}
	}

	/// Converts a document-wide unit offset into a char index, or `None` past the end.
	pub fn units_to_char(self, text: &Rope, units: usize) -> Option<usize> {
		if units > self.len_of(text.slice(..)) {
			return None;
		}
		Some(self.char_in(text.slice(..), units))
	}
}

/// Char index where the content of `line` ends, excluding its line terminator.
pub fn line_end_char(text: &Rope, line: usize) -> usize {
	let start = text.line_to_char(line);
	start + line_content(text, line).len_chars()
}

/// Content of `line` without its trailing `\n` or `\r\n`.
pub fn line_content(text: &Rope, line: usize) -> RopeSlice<'_> {
	let slice = text.line(line);
	let mut len = slice.len_chars();
	if len > 0 && slice.char(len - 1) == '\n' {
		len -= 1;
		if len > 0 && slice.char(len - 1) == '\r' {
			len -= 1;
		}
	}
	slice.slice(..len)
}

/// Converts an LSP position to a char index.
///
/// Returns `None` when the line does not exist or the character lies beyond
/// the end of the line.
pub fn lsp_position_to_char(text: &Rope, pos: Position, encoding: OffsetEncoding) -> Option<usize> {
	let line = pos.line as usize;
	if line >= text.len_lines() {
		return None;
	}
	let content = line_content(text, line);
	let character = pos.character as usize;
	if character > encoding.len_of(content) {
		return None;
	}
	Some(text.line_to_char(line) + encoding.char_in(content, character))
}

/// Converts an LSP position to a char index, clamping the character to the line end.
///
/// Servers routinely address "end of line" with an oversized character, so
/// edits are converted with this variant. The line itself must still exist.
pub fn lsp_position_to_char_clamped(text: &Rope, pos: Position, encoding: OffsetEncoding) -> Option<usize> {
	let line = pos.line as usize;
	if line >= text.len_lines() {
		return None;
	}
	let content = line_content(text, line);
	let character = (pos.character as usize).min(encoding.len_of(content));
	Some(text.line_to_char(line) + encoding.char_in(content, character))
}

/// Converts a char index to an LSP position, or `None` past the end of the text.
pub fn char_to_lsp_position(text: &Rope, char_idx: usize, encoding: OffsetEncoding) -> Option<Position> {
	if char_idx > text.len_chars() {
		return None;
	}
	let line = text.char_to_line(char_idx);
	let column = char_idx - text.line_to_char(line);
	let character = encoding.len_of(text.line(line).slice(..column));
	Some(Position {
		line: u32::try_from(line).ok()?,
		character: u32::try_from(character).ok()?,
	})
}

/// Converts an LSP range to a clamped char range.
pub fn lsp_range_to_char_range(text: &Rope, range: Range, encoding: OffsetEncoding) -> Option<(usize, usize)> {
	let start = lsp_position_to_char_clamped(text, range.start, encoding)?;
	let end = lsp_position_to_char_clamped(text, range.end, encoding)?;
	Some((start, end))
}

/// Converts a char range to an LSP range.
pub fn char_range_to_lsp_range(text: &Rope, start: usize, end: usize, encoding: OffsetEncoding) -> Option<Range> {
	Some(Range {
		start: char_to_lsp_position(text, start, encoding)?,
		end: char_to_lsp_position(text, end, encoding)?,
	})
}
