//! Walk-level properties of the explorer over real temporary trees.
//!
//! These tests check what holds for every discovery regardless of the random
//! choices made along the way: containment, depth, the session cap, and the
//! file/directory shape.

use std::fs;
use std::path::{Path, PathBuf};

use sleepwalker::explore::classify::{ELLIPSIS, PREVIEW_MAX_CHARS, make_preview};
use sleepwalker::explore::safety::{effective_depth, is_contained};
use sleepwalker::explore::{Discovery, DiscoveryKind, Explorer, ExplorerConfig};

fn write(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn walk(explorer: &mut Explorer, steps: usize) -> Vec<Discovery> {
    (0..steps).filter_map(|_| explorer.wander()).collect()
}

fn roomy() -> ExplorerConfig {
    ExplorerConfig {
        max_discoveries: 10_000,
        ..Default::default()
    }
}

#[test]
fn walk_never_leaves_the_allowed_root() {
    let dir = tempfile::TempDir::new().unwrap();
    let allowed = dir.path().join("allowed");
    let forbidden = dir.path().join("forbidden");
    write(&allowed.join("a/notes.md"), &"allowed notes line\n".repeat(10));
    write(&allowed.join("a/b/todo.txt"), "buy milk");
    fs::create_dir_all(allowed.join("empty")).unwrap();
    write(&forbidden.join("secret.txt"), &"do not read this\n".repeat(10));
    write(&forbidden.join("deep/more.txt"), "nope");
    #[cfg(unix)]
    std::os::unix::fs::symlink(&forbidden, allowed.join("shortcut")).unwrap();

    let roots = vec![allowed.clone()];
    let forbidden = fs::canonicalize(&forbidden).unwrap();
    let mut explorer = Explorer::new(&roots, roomy());
    let found = walk(&mut explorer, 200);

    assert!(!found.is_empty());
    for d in &found {
        assert!(is_contained(&d.path, &roots), "escaped: {}", d.path.display());
        assert!(!d.path.starts_with(&forbidden), "forbidden: {}", d.path.display());
    }
}

#[test]
fn walk_respects_depth_limit() {
    let dir = tempfile::TempDir::new().unwrap();
    let root = dir.path().join("root");
    let mut level = root.clone();
    for depth in 0..7 {
        write(&level.join(format!("file{depth}.txt")), "x");
        level = level.join(format!("d{depth}"));
    }
    fs::create_dir_all(&level).unwrap();

    let config = ExplorerConfig {
        max_depth: 2,
        ..roomy()
    };
    let canonical_root = fs::canonicalize(&root).unwrap();
    let mut explorer = Explorer::new([&root], config);
    let found = walk(&mut explorer, 300);

    assert!(!found.is_empty());
    for d in &found {
        let segments = d.path.strip_prefix(&canonical_root).unwrap().components().count();
        assert!(
            effective_depth(segments, d.is_file()) <= 2,
            "too deep: {}",
            d.path.display()
        );
    }
}

#[test]
fn session_cap_bounds_discoveries() {
    let dir = tempfile::TempDir::new().unwrap();
    for i in 0..10 {
        write(&dir.path().join(format!("f{i}.txt")), "content");
    }
    let config = ExplorerConfig {
        max_discoveries: 5,
        ..Default::default()
    };
    let mut explorer = Explorer::new([dir.path()], config);
    let found = walk(&mut explorer, 50);
    assert!(found.len() <= 5);
    assert!(explorer.discoveries_made() <= 5);
    assert!(explorer.is_exhausted());
    assert!(explorer.wander().is_none());
}

#[test]
fn discoveries_have_consistent_shape() {
    let dir = tempfile::TempDir::new().unwrap();
    write(&dir.path().join("readme.md"), &"# Title\n\nSome real prose here.\n".repeat(5));
    write(&dir.path().join("tiny.txt"), "hi");
    write(&dir.path().join("docs/guide.txt"), &"step by step guide\n".repeat(8));
    fs::write(dir.path().join("docs/photo.png"), [0x89u8, b'P', b'N', b'G', 0, 0, 0, 0]).unwrap();

    let mut explorer = Explorer::new([dir.path()], roomy());
    for d in walk(&mut explorer, 100) {
        match d.kind {
            DiscoveryKind::Directory => {
                assert!(d.size_bytes.is_none(), "{}", d.path.display());
                assert!(d.preview.is_none(), "{}", d.path.display());
            }
            DiscoveryKind::File => {
                assert!(d.size_bytes.is_some(), "{}", d.path.display());
                if d.name == "tiny.txt" || d.name == "photo.png" {
                    assert!(d.preview.is_none());
                }
            }
        }
    }
}

#[test]
fn notes_and_photos_are_both_found() {
    let dir = tempfile::TempDir::new().unwrap();
    let root = dir.path().join("root");
    write(&root.join("notes.txt"), "hello world");
    fs::create_dir_all(root.join("photos")).unwrap();
    let canonical_root: PathBuf = fs::canonicalize(&root).unwrap();

    let mut explorer = Explorer::new([&root], ExplorerConfig::default());
    let found = walk(&mut explorer, 50);

    assert!(
        found
            .iter()
            .any(|d| d.is_file() && d.name == "notes.txt" && d.size_bytes == Some(11))
    );
    assert!(
        found
            .iter()
            .any(|d| d.is_directory() && d.name == "photos")
    );
    assert!(found.iter().all(|d| d.path.starts_with(&canonical_root)));
}

#[test]
fn previews_are_bounded_and_stable() {
    let dir = tempfile::TempDir::new().unwrap();
    let long = dir.path().join("long.txt");
    write(&long, &"word ".repeat(2000));
    let short = dir.path().join("short.md");
    write(&short, "// header comment\nfirst line\nsecond line\n");

    let preview = make_preview(&long, 2048).unwrap();
    assert!(preview.chars().count() <= PREVIEW_MAX_CHARS + ELLIPSIS.chars().count());
    assert!(preview.ends_with(ELLIPSIS));
    assert_eq!(make_preview(&long, 2048), Some(preview));

    assert_eq!(make_preview(&short, 2048).as_deref(), Some("first line\nsecond line"));
    assert_eq!(make_preview(&short, 2048), make_preview(&short, 2048));
}

#[test]
fn discoveries_serialize_as_json_lines() {
    let dir = tempfile::TempDir::new().unwrap();
    write(&dir.path().join("notes.txt"), "hello world");
    let mut explorer = Explorer::new([dir.path()], ExplorerConfig::default());
    let discovery = walk(&mut explorer, 10).into_iter().next().unwrap();
    let line = serde_json::to_string(&discovery).unwrap();
    assert!(!line.contains('\n'));
    let back: Discovery = serde_json::from_str(&line).unwrap();
    assert_eq!(back, discovery);
}

#[test]
fn vcs_and_dependency_trees_are_never_entered() {
    let dir = tempfile::TempDir::new().unwrap();
    let root = dir.path().join("project");
    write(&root.join(".git/HEAD"), "ref: refs/heads/main\n");
    fs::create_dir_all(root.join(".git/objects")).unwrap();
    write(&root.join("node_modules/lodash/index.js"), "module.exports = {};\n");
    write(&root.join("notes.md"), &"remember to water the plants\n".repeat(4));
    let canonical_root = fs::canonicalize(&root).unwrap();

    let mut explorer = Explorer::new([&root], roomy());
    let found = walk(&mut explorer, 200);

    assert!(found.iter().any(|d| d.name == "notes.md"));
    for d in &found {
        let below = d.path.strip_prefix(&canonical_root).unwrap();
        assert!(
            !below
                .components()
                .any(|c| c.as_os_str() == ".git" || c.as_os_str() == "node_modules"),
            "noise: {}",
            d.path.display()
        );
    }
}
