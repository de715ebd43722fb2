//! End-to-end scenarios run through the public `Engine` API

use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

use findx::{Config, Engine, FindxError, OperationKind, ReplaceSpec, SearchSpec};

struct Workspace {
    _state: TempDir,
    tree: TempDir,
    engine: Engine,
}

impl Workspace {
    fn new() -> Self {
        let state = TempDir::new().unwrap();
        let tree = TempDir::new().unwrap();
        let engine = Engine::open(Config::default().with_state_dir(state.path())).unwrap();
        Self {
            _state: state,
            tree,
            engine,
        }
    }

    fn create_test_file(&self, name: &str, content: &str) -> PathBuf {
        let path = self.tree.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path.canonicalize().unwrap()
    }
}

#[test]
fn search_finds_both_foo_lines() {
    let ws = Workspace::new();
    let file = ws.create_test_file("a.txt", "foo\nbar\nfoo\n");

    let spec = SearchSpec::builder("foo").build().unwrap();
    let outcome = ws.engine.search(ws.tree.path(), &spec).unwrap();

    let lines: Vec<usize> = outcome.matches.iter().map(|m| m.line_number).collect();
    assert_eq!(lines, vec![1, 3]);
    assert!(outcome.matches.iter().all(|m| m.file == file));
    assert_eq!(outcome.files_with_matches, 1);
    assert!(!outcome.truncated);
}

#[test]
fn replace_applies_with_one_backup_and_one_history_entry() {
    let ws = Workspace::new();
    let file = ws.create_test_file("a.txt", "foo\nbar\nfoo\n");

    let spec = ReplaceSpec::builder("foo", "baz").dry_run(false).build().unwrap();
    let outcome = ws.engine.replace(ws.tree.path(), &spec).unwrap();

    assert_eq!(fs::read_to_string(&file).unwrap(), "baz\nbar\nbaz\n");
    assert_eq!(outcome.changes.len(), 1);
    let change = &outcome.changes[0];
    assert_eq!(change.occurrence_count, 2);
    assert!(change.applied);
    assert!(change.error.is_none());

    let backups = ws.engine.list_backups(Some(&file)).unwrap();
    assert_eq!(backups.len(), 1);
    assert_eq!(change.backup_id.as_deref(), Some(backups[0].id.as_str()));

    let history = ws.engine.query_history(10, None).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].kind, OperationKind::Replace);
    assert_eq!(history[0].file, file);
    assert_eq!(history[0].backup_ref, change.backup_id);
}

#[test]
fn dry_run_reports_without_touching_disk() {
    let ws = Workspace::new();
    let file = ws.create_test_file("a.txt", "foo\nbar\nfoo\n");

    let spec = ReplaceSpec::builder("foo", "baz").dry_run(true).build().unwrap();
    let outcome = ws.engine.replace(ws.tree.path(), &spec).unwrap();

    assert_eq!(outcome.changes[0].occurrence_count, 2);
    assert!(!outcome.changes[0].applied);
    assert_eq!(fs::read_to_string(&file).unwrap(), "foo\nbar\nfoo\n");
    assert!(ws.engine.list_backups(None).unwrap().is_empty());
    assert!(ws.engine.query_history(10, None).unwrap().is_empty());
}

#[test]
fn restore_of_unknown_backup_fails_cleanly() {
    let ws = Workspace::new();
    let file = ws.create_test_file("a.txt", "foo\n");

    let err = ws.engine.restore("20240101-000000000-deadbeef-000001").unwrap_err();
    assert!(matches!(err, FindxError::BackupNotFound(_)));
    assert_eq!(fs::read_to_string(&file).unwrap(), "foo\n");
    assert!(ws.engine.query_history(10, None).unwrap().is_empty());
}

#[test]
fn replace_then_restore_round_trips() {
    let ws = Workspace::new();
    let file = ws.create_test_file("src/lib.rs", "let foo = 1;\nfoo + foo\n");

    let spec = ReplaceSpec::builder("foo", "bar").dry_run(false).build().unwrap();
    let outcome = ws.engine.replace(ws.tree.path(), &spec).unwrap();
    let backup_id = outcome.changes[0].backup_id.clone().unwrap();

    let diff = ws.engine.diff(&file, &backup_id).unwrap();
    assert!(diff.iter().any(|l| l.content == "let foo = 1;"));
    assert!(diff.iter().any(|l| l.content == "let bar = 1;"));

    ws.engine.restore(&backup_id).unwrap();
    assert_eq!(fs::read_to_string(&file).unwrap(), "let foo = 1;\nfoo + foo\n");

    let kinds: Vec<_> = ws
        .engine
        .query_history(10, Some(&file))
        .unwrap()
        .into_iter()
        .map(|e| e.kind)
        .collect();
    assert_eq!(kinds, vec![OperationKind::Restore, OperationKind::Replace]);
}

#[test]
fn delete_every_line_then_append() {
    let ws = Workspace::new();
    let file = ws.create_test_file("lines.txt", "one\ntwo\nthree\n");

    ws.engine.delete_lines(&file, 1, Some(3)).unwrap();
    assert_eq!(fs::read_to_string(&file).unwrap(), "");

    ws.engine.insert_lines(&file, 1, "x").unwrap();
    ws.engine.insert_lines(&file, 2, "y").unwrap();
    assert_eq!(fs::read_to_string(&file).unwrap(), "x\ny\n");
}

#[test]
fn out_of_range_edit_is_rejected() {
    let ws = Workspace::new();
    let file = ws.create_test_file("lines.txt", "one\ntwo\n");

    let err = ws.engine.replace_lines(&file, 2, Some(5), "z").unwrap_err();
    assert!(matches!(err, FindxError::LineRange { len: 2, .. }));
    assert_eq!(fs::read_to_string(&file).unwrap(), "one\ntwo\n");
}

#[test]
fn result_cap_keeps_first_matches_in_order() {
    let ws = Workspace::new();
    ws.create_test_file("a.txt", "hit\nhit\n");
    let b = ws.create_test_file("b.txt", "hit\nhit\nhit\n");
    ws.create_test_file("c.txt", "hit\n");

    let spec = SearchSpec::builder("hit").max_results(3).build().unwrap();
    let outcome = ws.engine.search(ws.tree.path(), &spec).unwrap();

    assert_eq!(outcome.matches.len(), 3);
    assert!(outcome.truncated);
    assert_eq!(outcome.matches[2].file, b);
    assert_eq!(outcome.matches[2].line_number, 1);
}

#[test]
fn history_is_newest_first() {
    let ws = Workspace::new();
    let a = ws.create_test_file("a.txt", "1\n2\n");
    let b = ws.create_test_file("b.txt", "1\n2\n");

    ws.engine.delete_lines(&a, 1, None).unwrap();
    ws.engine.insert_lines(&b, 1, "0").unwrap();
    ws.engine.replace_lines(&a, 1, None, "two").unwrap();

    let history = ws.engine.query_history(10, None).unwrap();
    let ids: Vec<u64> = history.iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![3, 2, 1]);
    assert_eq!(history[0].kind, OperationKind::EditLines);
    assert_eq!(history[2].kind, OperationKind::Delete);

    assert_eq!(ws.engine.query_history(1, None).unwrap().len(), 1);
    assert_eq!(ws.engine.recent_files(10).unwrap(), vec![a.clone(), b]);

    let stats = ws.engine.history_stats().unwrap();
    assert_eq!(stats.total_entries, 3);
    assert_eq!(stats.most_edited[0], (a, 2));
}

#[test]
fn history_survives_reopen() {
    let state = TempDir::new().unwrap();
    let tree = TempDir::new().unwrap();
    let file = tree.path().join("a.txt");
    fs::write(&file, "x\n").unwrap();

    {
        let engine = Engine::open(Config::default().with_state_dir(state.path())).unwrap();
        engine.insert_lines(&file, 1, "w").unwrap();
        engine.close().unwrap();
    }

    let engine = Engine::open(Config::default().with_state_dir(state.path())).unwrap();
    let entry = engine.insert_lines(&file, 1, "v").unwrap();
    assert_eq!(entry.history_id, 2);
    assert_eq!(engine.list_backups(None).unwrap().len(), 2);
    assert!(engine.reconcile().unwrap().is_consistent());
}

#[test]
fn allowed_roots_reject_outside_paths() {
    let state = TempDir::new().unwrap();
    let inside = TempDir::new().unwrap();
    let outside = TempDir::new().unwrap();
    let stray = outside.path().join("stray.txt");
    fs::write(&stray, "foo\n").unwrap();

    let mut config = Config::default().with_state_dir(state.path());
    config.edit.allowed_roots = vec![inside.path().display().to_string()];
    let engine = Engine::open(config).unwrap();

    let escape = inside.path().join("..").join(outside.path().file_name().unwrap()).join("stray.txt");
    let err = engine.delete_lines(&escape, 1, None).unwrap_err();
    assert!(matches!(err, FindxError::PathSecurity { .. }));

    let spec = ReplaceSpec::builder("foo", "bar").dry_run(false).build().unwrap();
    assert!(matches!(
        engine.replace(outside.path(), &spec),
        Err(FindxError::PathSecurity { .. })
    ));
    assert_eq!(fs::read_to_string(&stray).unwrap(), "foo\n");
}

#[test]
fn binary_and_oversized_files_are_reported_not_dropped() {
    let state = TempDir::new().unwrap();
    let tree = TempDir::new().unwrap();
    let mut config = Config::default().with_state_dir(state.path());
    config.search.max_file_size_bytes = 64;
    let engine = Engine::open(config).unwrap();

    fs::write(tree.path().join("bin.dat"), b"foo\0bar").unwrap();
    fs::write(tree.path().join("big.txt"), "foo ".repeat(64)).unwrap();
    fs::write(tree.path().join("ok.txt"), "foo\n").unwrap();

    let spec = SearchSpec::builder("foo").build().unwrap();
    let outcome = engine.search(tree.path(), &spec).unwrap();

    assert_eq!(outcome.matches.len(), 1);
    let mut skipped: Vec<String> = outcome
        .skipped
        .iter()
        .map(|s| s.path.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    skipped.sort();
    assert_eq!(skipped, vec!["big.txt", "bin.dat"]);
}
