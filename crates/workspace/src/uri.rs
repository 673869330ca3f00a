//! URI helpers: path conversion, map keys, and buffer URI derivation.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use lsp_types::Uri;

use crate::host::{BufferId, BufferInfo};

/// Converts a filesystem path to a `file://` URI.
///
/// Relative paths are resolved against `base`.
pub fn uri_from_path(path: &Path, base: &Path) -> Option<Uri> {
	let abs_path = if path.is_absolute() { path.to_path_buf() } else { base.join(path) };
	let url = url::Url::from_file_path(abs_path).ok()?;
	Uri::from_str(url.as_str()).ok()
}

/// Converts a `file://` URI to a filesystem path.
pub fn path_from_uri(uri: &Uri) -> Option<PathBuf> {
	let url = url::Url::from_str(uri.as_str()).ok()?;
	url.to_file_path().ok()
}

/// Normalized string form used to index documents by URI.
///
/// Callers spell the same resource with different percent-encoding, so
/// lookups go through the WHATWG serialization when the URI parses. Escapes
/// of unreserved characters are decoded and the remaining ones uppercased.
pub fn uri_key(uri: &Uri) -> String {
	match url::Url::from_str(uri.as_str()) {
		Ok(url) => normalize_escapes(url.as_str()),
		Err(_) => normalize_escapes(uri.as_str()),
	}
}

fn normalize_escapes(raw: &str) -> String {
	let bytes = raw.as_bytes();
	let mut out = String::with_capacity(raw.len());
	let mut idx = 0;
	while idx < bytes.len() {
		if bytes[idx] == b'%'
			&& let Some(hex) = raw.get(idx + 1..idx + 3)
			&& let Ok(byte) = u8::from_str_radix(hex, 16)
		{
			if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~') {
				out.push(char::from(byte));
			} else {
				out.push('%');
				out.push_str(&hex.to_ascii_uppercase());
			}
			idx += 3;
			continue;
		}
		let Some(ch) = raw[idx..].chars().next() else {
			break;
		};
		out.push(ch);
		idx += ch.len_utf8();
	}
	out
}

/// Scheme of `uri`, lowercased.
pub fn scheme_of(uri: &Uri) -> String {
	uri.as_str().split_once(':').map(|(scheme, _)| scheme.to_ascii_lowercase()).unwrap_or_default()
}

/// Whether `name` looks like `scheme://...` rather than a path.
fn is_url(name: &str) -> bool {
	let Some((scheme, _)) = name.split_once("://") else {
		return false;
	};
	scheme.len() > 1
		&& scheme.starts_with(|c: char| c.is_ascii_alphabetic())
		&& scheme.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Derives the document URI for a host buffer.
///
/// Unnamed buffers become `untitled:<id>`, special buffers `<buftype>:<id>`.
pub(crate) fn buffer_uri(info: &BufferInfo, buffer: BufferId, cwd: &Path) -> Option<Uri> {
	let name = info.name.as_str();
	if name.is_empty() {
		return Uri::from_str(&format!("untitled:{buffer}")).ok();
	}
	let path = Path::new(name);
	if path.is_absolute() {
		return uri_from_path(path, cwd);
	}
	if is_url(name) {
		return Uri::from_str(name).ok();
	}
	if !info.buftype.is_empty() && info.buftype != "acwrite" {
		return Uri::from_str(&format!("{}:{buffer}", info.buftype)).ok();
	}
	uri_from_path(path, cwd)
}
