use lsp_types::{CreateFile, DeleteFile, RenameFile};
use pretty_assertions::assert_eq;

use super::*;

fn create(path: &Path, options: Option<CreateFileOptions>) -> DocumentChangeOperation {
	DocumentChangeOperation::Op(ResourceOp::Create(CreateFile {
		uri: uri_of(path),
		options,
		annotation_id: None,
	}))
}

fn delete(path: &Path, options: Option<DeleteFileOptions>) -> DocumentChangeOperation {
	DocumentChangeOperation::Op(ResourceOp::Delete(DeleteFile { uri: uri_of(path), options }))
}

fn rename(old: &Path, new: &Path) -> DocumentChangeOperation {
	DocumentChangeOperation::Op(ResourceOp::Rename(RenameFile {
		old_uri: uri_of(old),
		new_uri: uri_of(new),
		options: None,
		annotation_id: None,
	}))
}

#[tokio::test]
async fn create_then_edit_new_file() {
	let dir = tempfile::tempdir().unwrap();
	let mut fx = fixture(dir.path());
	let path = dir.path().join("src/new.rs");

	let edit = operations(vec![
		create(&path, None),
		DocumentChangeOperation::Edit(document_edit(uri_of(&path), None, vec![insert_at_start("pub fn new() {}\n")])),
	]);
	let report = fx.ws.apply_workspace_edit(&edit).await.unwrap();

	assert_eq!(
		report.outcomes,
		vec![OperationOutcome::Created { uri: uri_of(&path) }, OperationOutcome::EditedFile { uri: uri_of(&path) }]
	);
	assert_eq!(std::fs::read_to_string(&path).unwrap(), "pub fn new() {}\n");
}

#[tokio::test]
async fn create_then_delete_round_trip() {
	let dir = tempfile::tempdir().unwrap();
	let mut fx = fixture(dir.path());
	let path = dir.path().join("tmp.rs");

	let edit = operations(vec![create(&path, None), delete(&path, None)]);
	fx.ws.apply_workspace_edit(&edit).await.unwrap();
	assert!(!path.exists());
	assert!(fx.ws.documents().is_empty());
}

#[tokio::test]
async fn ignore_if_exists_keeps_content() {
	let dir = tempfile::tempdir().unwrap();
	let mut fx = fixture(dir.path());
	let path = dir.path().join("keep.rs");
	std::fs::write(&path, "keep").unwrap();

	let edit = operations(vec![create(
		&path,
		Some(CreateFileOptions {
			overwrite: None,
			ignore_if_exists: Some(true),
		}),
	)]);
	let report = fx.ws.apply_workspace_edit(&edit).await.unwrap();

	assert_eq!(report.outcomes, vec![OperationOutcome::Skipped { uri: uri_of(&path) }]);
	assert_eq!(std::fs::read_to_string(&path).unwrap(), "keep");
}

#[tokio::test]
async fn rename_then_edit_moved_document() {
	let dir = tempfile::tempdir().unwrap();
	let mut fx = fixture(dir.path());
	let (old, _, buffer) = open_file(&mut fx, dir.path(), "old.rs", "fn old() {}\n").await;
	let new = dir.path().join("new.rs");

	let edit = operations(vec![
		rename(&old, &new),
		DocumentChangeOperation::Edit(document_edit(
			uri_of(&new),
			Some(1),
			vec![TextEdit {
				range: Range::new(Position::new(0, 3), Position::new(0, 6)),
				new_text: "new".into(),
			}],
		)),
	]);
	let report = fx.ws.apply_workspace_edit(&edit).await.unwrap();

	assert_eq!(
		report.outcomes,
		vec![
			OperationOutcome::Renamed {
				old_uri: uri_of(&old),
				new_uri: uri_of(&new),
			},
			OperationOutcome::EditedDocument { uri: uri_of(&new), version: 2 },
		]
	);
	let doc = fx.ws.get_document(&uri_of(&new)).unwrap();
	assert_eq!(doc.buffer(), buffer);
	assert_eq!(buffer_text(&fx, buffer), "fn new() {}");
	assert!(!old.exists());
	assert_eq!(std::fs::read_to_string(&new).unwrap(), "fn old() {}\n", "the buffer holds the edit until saved");
}

#[tokio::test]
async fn edit_after_delete_is_rejected() {
	let dir = tempfile::tempdir().unwrap();
	let mut fx = fixture(dir.path());
	let (path, uri, buffer) = open_file(&mut fx, dir.path(), "gone.rs", "x\n").await;

	let edit = operations(vec![
		delete(&path, None),
		DocumentChangeOperation::Edit(document_edit(uri, None, vec![insert_at_start("y")])),
	]);
	let err = fx.ws.apply_workspace_edit(&edit).await.unwrap_err();

	assert!(matches!(err.error, ApplyError::TargetNotFound { .. }), "got: {err:?}");
	assert_eq!(err.failed_change, Some(1));
	assert!(path.exists());
	assert!(fx.ws.get_document(buffer).is_some());
}

#[tokio::test]
async fn directory_uri_creates_and_recursively_deletes() {
	let dir = tempfile::tempdir().unwrap();
	let mut fx = fixture(dir.path());
	let folder = dir.path().join("pkg");
	let folder_uri: Uri = format!("{}/", uri_of(&folder).as_str()).parse().unwrap();

	let edit = operations(vec![DocumentChangeOperation::Op(ResourceOp::Create(CreateFile {
		uri: folder_uri.clone(),
		options: None,
		annotation_id: None,
	}))]);
	fx.ws.apply_workspace_edit(&edit).await.unwrap();
	assert!(folder.is_dir());
	std::fs::write(folder.join("mod.rs"), "").unwrap();

	let edit = operations(vec![DocumentChangeOperation::Op(ResourceOp::Delete(DeleteFile {
		uri: folder_uri,
		options: Some(DeleteFileOptions {
			recursive: Some(true),
			ignore_if_not_exists: None,
			annotation_id: None,
		}),
	}))]);
	fx.ws.apply_workspace_edit(&edit).await.unwrap();
	assert!(!folder.exists());
}

#[tokio::test]
async fn directory_rename_then_edit_moved_document() {
	let dir = tempfile::tempdir().unwrap();
	let mut fx = fixture(dir.path());
	let old = dir.path().join("old");
	let new = dir.path().join("new");
	std::fs::create_dir(&old).unwrap();
	let (_, _, buffer) = open_file(&mut fx, &old, "inner.rs", "fn inner() {}\n").await;
	let moved = new.join("inner.rs");

	let edit = operations(vec![
		rename(&old, &new),
		DocumentChangeOperation::Edit(document_edit(uri_of(&moved), Some(1), vec![insert_at_start("pub ")])),
	]);
	let report = fx.ws.apply_workspace_edit(&edit).await.unwrap();

	assert_eq!(report.outcomes[1], OperationOutcome::EditedDocument { uri: uri_of(&moved), version: 2 });
	assert_eq!(fx.ws.get_document(&uri_of(&moved)).unwrap().buffer(), buffer);
	assert_eq!(buffer_text(&fx, buffer), "pub fn inner() {}");
	assert!(fx.host.prompts().is_empty(), "the moved document is edited in its buffer");
}
