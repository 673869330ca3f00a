//! End-to-end scenarios against the in-memory host.

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use lsp_types::{
	CreateFile, DocumentChangeOperation, DocumentChanges, OneOf, OptionalVersionedTextDocumentIdentifier, Position, Range, ResourceOp,
	TextDocumentEdit, TextEdit, Uri, WorkspaceEdit,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use tether_workspace::uri::uri_from_path;
use tether_workspace::{ApplyError, HostEvent, MemoryHost, Workspace, WorkspaceConfig, WorkspaceEvent};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;

fn init_tracing() {
	let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn workspace(cwd: &Path) -> (Workspace, Arc<MemoryHost>, UnboundedReceiver<HostEvent>) {
	init_tracing();
	let (host, rx) = MemoryHost::new(cwd);
	let ws = Workspace::new(host.clone(), host.clone(), WorkspaceConfig::default());
	(ws, host, rx)
}

async fn pump(ws: &mut Workspace, rx: &mut UnboundedReceiver<HostEvent>) {
	while let Ok(event) = rx.try_recv() {
		ws.handle_event(event).await.unwrap();
	}
}

fn insert(uri: &Uri, version: Option<i32>, text: &str) -> WorkspaceEdit {
	WorkspaceEdit {
		document_changes: Some(DocumentChanges::Edits(vec![TextDocumentEdit {
			text_document: OptionalVersionedTextDocumentIdentifier { uri: uri.clone(), version },
			edits: vec![OneOf::Left(TextEdit {
				range: Range::new(Position::new(0, 0), Position::new(0, 0)),
				new_text: text.into(),
			})],
		}])),
		..WorkspaceEdit::default()
	}
}

#[tokio::test]
async fn versioned_insert_then_stale_replay() {
	let dir = tempfile::tempdir().unwrap();
	let (mut ws, host, mut rx) = workspace(dir.path());
	let path = dir.path().join("foo.txt");
	std::fs::write(&path, "foo\n").unwrap();
	let buffer = host.open_buffer(&path.to_string_lossy(), "text", &["foo"]);
	pump(&mut ws, &mut rx).await;

	let doc = ws.get_document(buffer).unwrap();
	assert_eq!(doc.version(), 1);
	let edit = insert(&doc.uri(), Some(1), "bar");

	ws.apply_workspace_edit(&edit).await.unwrap();
	assert_eq!(doc.get_lines().unwrap(), vec!["barfoo".to_string()]);
	assert_eq!(doc.version(), 2);
	assert_eq!(host.lines(buffer).unwrap(), vec!["barfoo".to_string()]);

	let err = ws.apply_workspace_edit(&edit).await.unwrap_err();
	assert!(
		matches!(err.error, ApplyError::VersionMismatch { expected: 1, actual: 2, .. }),
		"expected VersionMismatch, got: {err:?}"
	);
	assert_eq!(doc.get_lines().unwrap(), vec!["barfoo".to_string()]);
	assert_eq!(doc.version(), 2);
}

#[tokio::test]
async fn changes_shape_inserts_into_empty_line() {
	let dir = tempfile::tempdir().unwrap();
	let (mut ws, host, mut rx) = workspace(dir.path());
	let buffer = host.open_buffer(&dir.path().join("empty.txt").to_string_lossy(), "text", &[""]);
	pump(&mut ws, &mut rx).await;
	let uri = ws.get_document(buffer).unwrap().uri();

	let edit: WorkspaceEdit = serde_json::from_value(json!({
		"changes": {
			uri.as_str(): [{
				"range": { "start": { "line": 0, "character": 0 }, "end": { "line": 0, "character": 0 } },
				"newText": "bar"
			}]
		}
	}))
	.unwrap();
	assert!(ws.apply_edit(&edit).await);
	assert_eq!(ws.get_document(buffer).unwrap().get_line(0).unwrap(), "bar");
}

#[tokio::test]
async fn create_with_foreign_scheme_creates_nothing() {
	let dir = tempfile::tempdir().unwrap();
	let (mut ws, host, _rx) = workspace(dir.path());
	let edit = WorkspaceEdit {
		document_changes: Some(DocumentChanges::Operations(vec![DocumentChangeOperation::Op(ResourceOp::Create(CreateFile {
			uri: Uri::from_str("untitled:new").unwrap(),
			options: None,
			annotation_id: None,
		}))])),
		..WorkspaceEdit::default()
	};

	assert!(!ws.apply_edit(&edit).await);
	assert_eq!(host.messages().len(), 1);
	assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn edit_of_missing_file_creates_nothing() {
	let dir = tempfile::tempdir().unwrap();
	let (mut ws, host, _rx) = workspace(dir.path());
	let path = dir.path().join("ghost.rs");
	let uri = uri_from_path(&path, dir.path()).unwrap();

	let err = ws.apply_workspace_edit(&insert(&uri, None, "boo")).await.unwrap_err();
	assert!(matches!(err.error, ApplyError::TargetNotFound { .. }), "got: {err:?}");
	assert!(!path.exists());
	assert!(host.prompts().is_empty(), "validation fails before any prompt");
}

#[tokio::test]
async fn rename_keeps_document_identity() {
	let dir = tempfile::tempdir().unwrap();
	let (mut ws, host, mut rx) = workspace(dir.path());
	let old = dir.path().join("old.rs");
	let new = dir.path().join("new.rs");
	std::fs::write(&old, "content\n").unwrap();
	let buffer = host.open_buffer(&old.to_string_lossy(), "rust", &["content"]);
	pump(&mut ws, &mut rx).await;
	let doc = ws.get_document(buffer).unwrap();

	ws.rename_file(&old, &new, None).await.unwrap();
	pump(&mut ws, &mut rx).await;

	let old_uri = uri_from_path(&old, dir.path()).unwrap();
	let new_uri = uri_from_path(&new, dir.path()).unwrap();
	assert!(ws.get_document(&old_uri).is_none());
	let moved = ws.get_document(&new_uri).unwrap();
	assert!(Arc::ptr_eq(&moved, &doc));
	assert_eq!(moved.uri(), new_uri);
	assert_eq!(moved.get_text(None).unwrap(), "content\n");
}

#[tokio::test]
async fn create_then_delete_and_ignore_if_exists() {
	let dir = tempfile::tempdir().unwrap();
	let (mut ws, _host, _rx) = workspace(dir.path());
	let path = dir.path().join("transient.rs");

	ws.create_file(&path, None).await.unwrap();
	ws.delete_file(&path, None).await.unwrap();
	assert!(!path.exists());

	std::fs::write(&path, "kept").unwrap();
	ws.create_file(
		&path,
		Some(lsp_types::CreateFileOptions {
			overwrite: None,
			ignore_if_exists: Some(true),
		}),
	)
	.await
	.unwrap();
	assert_eq!(std::fs::read_to_string(&path).unwrap(), "kept");
}

#[tokio::test(start_paused = true)]
async fn event_loop_publishes_versions_in_order() {
	init_tracing();
	let (host, rx) = MemoryHost::new("/work");
	let mut ws = Workspace::new(host.clone(), host.clone(), WorkspaceConfig::default());
	let mut events = ws.subscribe();
	let shutdown = CancellationToken::new();
	let task = tokio::spawn({
		let shutdown = shutdown.clone();
		async move {
			ws.run(rx, shutdown).await;
			ws
		}
	});

	let buffer = host.open_buffer("/work/main.rs", "rust", &["fn main() {}"]);
	tokio::time::sleep(Duration::from_millis(1)).await;
	for (n, text) in ["a", "b", "c"].into_iter().enumerate() {
		// Each burst is two keystrokes inside the debounce window.
		host.edit(buffer, n + 1, n + 1, &[text]).unwrap();
		host.edit(buffer, n + 1, n + 2, &[format!("{text}{text}").as_str()]).unwrap();
		tokio::time::sleep(Duration::from_millis(400)).await;
	}
	shutdown.cancel();
	let ws = task.await.unwrap();

	let mut versions = Vec::new();
	while let Ok(event) = events.try_recv() {
		if let WorkspaceEvent::DocumentChanged(change) = event {
			versions.push(change.version);
		}
	}
	assert_eq!(versions, vec![2, 3, 4]);
	let doc = ws.get_document(buffer).unwrap();
	assert_eq!(doc.get_lines().unwrap(), vec!["fn main() {}", "aa", "bb", "cc"]);
}
