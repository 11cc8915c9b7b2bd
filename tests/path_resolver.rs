// tests/path_resolver.rs

use std::path::{Path, PathBuf};

use codesync::errors::PathError;
use codesync::fs::mock::MockFileSystem;
use codesync::types::SyncTarget;
use codesync::watch::path_utils::{check_symlink_escape, normalize_lexical, to_destination, to_relative};

fn target(path: &str) -> SyncTarget {
    SyncTarget {
        id: "t".to_string(),
        root_id: "r".to_string(),
        path: PathBuf::from(path),
    }
}

#[test]
fn relative_paths_use_forward_slashes() {
    let rel = to_relative(Path::new("/src/a/b.txt"), Path::new("/src")).unwrap();
    assert_eq!(rel, "a/b.txt");
}

#[test]
fn relative_resolves_dot_segments_first() {
    let rel = to_relative(Path::new("/src/./a/../b.txt"), Path::new("/src/")).unwrap();
    assert_eq!(rel, "b.txt");
    assert_eq!(to_relative(Path::new("/src"), Path::new("/src")).unwrap(), "");
}

#[test]
fn paths_outside_the_root_are_rejected() {
    let err = to_relative(Path::new("/srcfoo/a.txt"), Path::new("/src")).unwrap_err();
    assert!(matches!(err, PathError::NotUnderRoot { .. }));

    let err = to_relative(Path::new("/src/../etc/passwd"), Path::new("/src")).unwrap_err();
    assert!(matches!(err, PathError::NotUnderRoot { .. }));
}

#[test]
fn destination_is_a_join_under_the_target() {
    let t = target("/dst");
    assert_eq!(to_destination("a/b.txt", &t).unwrap(), PathBuf::from("/dst/a/b.txt"));
    assert_eq!(to_destination("a/./b", &t).unwrap(), PathBuf::from("/dst/a/b"));
    assert_eq!(to_destination("a/x/../b", &t).unwrap(), PathBuf::from("/dst/a/b"));
}

#[test]
fn destination_escapes_are_rejected() {
    let t = target("/dst");
    for rel in ["../x", "a/../../x", "/etc/passwd", "", ".", "a/.."] {
        let err = to_destination(rel, &t).unwrap_err();
        assert!(matches!(err, PathError::PathEscape { .. }), "{rel}: {err:?}");
    }
}

#[test]
fn lexical_normalization_never_climbs_above_root() {
    assert_eq!(normalize_lexical(Path::new("/a/../../b")), PathBuf::from("/b"));
    assert_eq!(normalize_lexical(Path::new("/a/./b/")), PathBuf::from("/a/b"));
}

#[test]
fn symlinked_destination_ancestor_is_an_escape() {
    let fs = MockFileSystem::new();
    fs.add_dir("/dst/ok");
    fs.add_dir("/outside");
    fs.add_symlink("/dst/link", "/outside");

    let err = check_symlink_escape(&fs, Path::new("/dst/link/f.txt"), Path::new("/dst")).unwrap_err();
    assert!(matches!(err, PathError::PathEscape { .. }));

    assert!(check_symlink_escape(&fs, Path::new("/dst/ok/f.txt"), Path::new("/dst")).is_ok());
    assert!(check_symlink_escape(&fs, Path::new("/dst/new/deep/f.txt"), Path::new("/dst")).is_ok());
}

#[test]
fn missing_target_root_cannot_be_escaped() {
    let fs = MockFileSystem::new();
    assert!(check_symlink_escape(&fs, Path::new("/nowhere/a.txt"), Path::new("/nowhere")).is_ok());
}
