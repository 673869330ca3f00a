use pretty_assertions::assert_eq;

use super::*;

#[tokio::test]
async fn workspace_edit_version_mismatch_is_rejected() {
	let dir = tempfile::tempdir().unwrap();
	let mut fx = fixture(dir.path());
	let (_, uri, buffer) = open_file(&mut fx, dir.path(), "mismatch.rs", "fn a() {}\n").await;
	bump_version(&mut fx, buffer, 4).await;

	// Edit claims version 2, but the document is at version 5.
	let edit = document_changes(vec![document_edit(uri, Some(2), vec![insert_at_start("x")])]);
	let err = fx.ws.apply_workspace_edit(&edit).await.unwrap_err();

	assert!(
		matches!(err.error, ApplyError::VersionMismatch { expected: 2, actual: 5, .. }),
		"expected VersionMismatch, got: {err:?}"
	);
	assert_eq!(err.failed_change, Some(0));
	assert!(err.applied.is_empty());
}

#[tokio::test]
async fn workspace_edit_matching_version_applies() {
	let dir = tempfile::tempdir().unwrap();
	let mut fx = fixture(dir.path());
	let (_, uri, buffer) = open_file(&mut fx, dir.path(), "match.rs", "fn a() {}\n").await;
	bump_version(&mut fx, buffer, 2).await;

	let edit = document_changes(vec![document_edit(uri.clone(), Some(3), vec![insert_at_start("// ")])]);
	let report = fx.ws.apply_workspace_edit(&edit).await.unwrap();

	assert_eq!(report.outcomes, vec![OperationOutcome::EditedDocument { uri, version: 4 }]);
	assert!(buffer_text(&fx, buffer).starts_with("// fn a() {}"));
}

#[tokio::test]
async fn workspace_edit_none_version_skips_check() {
	let dir = tempfile::tempdir().unwrap();
	let mut fx = fixture(dir.path());
	let (_, uri, buffer) = open_file(&mut fx, dir.path(), "none.rs", "x\n").await;
	bump_version(&mut fx, buffer, 6).await;

	let edit = document_changes(vec![document_edit(uri, None, vec![insert_at_start("y")])]);
	fx.ws.apply_workspace_edit(&edit).await.unwrap();
	assert!(buffer_text(&fx, buffer).starts_with("yx"));
}

#[tokio::test]
async fn pending_changes_count_towards_the_version() {
	let dir = tempfile::tempdir().unwrap();
	let mut fx = fixture(dir.path());
	let (_, uri, buffer) = open_file(&mut fx, dir.path(), "pending.rs", "a\n").await;

	// Recorded but still debouncing; validation publishes it as version 2.
	fx.host.edit(buffer, 0, 1, &["b"]).unwrap();
	fx.pump().await;

	let edit = document_changes(vec![document_edit(uri, Some(2), vec![insert_at_start("<")])]);
	fx.ws.apply_workspace_edit(&edit).await.unwrap();
	assert_eq!(buffer_text(&fx, buffer), "<b");
}

#[tokio::test]
async fn versioned_edit_of_unopened_file_needs_the_file() {
	let dir = tempfile::tempdir().unwrap();
	let mut fx = fixture(dir.path());
	let path = dir.path().join("closed.rs");
	std::fs::write(&path, "closed\n").unwrap();

	let edit = document_changes(vec![document_edit(uri_of(&path), Some(42), vec![insert_at_start("// ")])]);
	fx.ws.apply_workspace_edit(&edit).await.unwrap();
	assert_eq!(std::fs::read_to_string(&path).unwrap(), "// closed\n");

	let missing = dir.path().join("missing.rs");
	let edit = document_changes(vec![document_edit(uri_of(&missing), Some(42), vec![insert_at_start("// ")])]);
	let err = fx.ws.apply_workspace_edit(&edit).await.unwrap_err();
	assert!(matches!(err.error, ApplyError::TargetNotFound { .. }), "expected TargetNotFound, got: {err:?}");
}
