//! Rename and delete propagation followed by a rebuild.

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use notegraph::config::Settings;
use notegraph::rename::{on_delete, on_rename, OpenDocument};
use notegraph::vault::graph::LinkGraph;

fn create_test_vault_dir() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let vault_dir = temp_dir.path().join("vault");
    fs::create_dir(&vault_dir).expect("Failed to create vault subdirectory");
    let vault_dir = fs::canonicalize(vault_dir).expect("Failed to canonicalize vault");
    (temp_dir, vault_dir)
}

fn open(path: &Path) -> OpenDocument {
    OpenDocument::new(path, fs::read_to_string(path).unwrap())
}

fn save(documents: &[OpenDocument]) {
    for document in documents {
        fs::write(&document.path, &document.text).unwrap();
    }
}

#[test]
fn test_rename_round_trip() {
    let mut docs = vec![OpenDocument::new(
        "/notes/doc.md",
        "Read [[Old Name]] or [Link](Old Name.md) or [[Old Name|the old one]].",
    )];

    let changes = on_rename(
        Path::new("/notes/Old Name.md"),
        Path::new("/notes/New Name.md"),
        &mut docs,
    );

    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].edits.len(), 3);
    assert_eq!(
        docs[0].text,
        "Read [[New Name]] or [Link](New Name.md) or [[New Name|the old one]]."
    );
}

#[test]
fn test_delete_leaves_bare_text() {
    let mut docs = vec![OpenDocument::new("/notes/doc.md", "[Click here](deleted.md)")];

    on_delete(Path::new("/notes/deleted.md"), &mut docs);

    assert_eq!(docs[0].text, "Click here");
}

#[test]
fn test_rename_then_rebuild_keeps_backlinks() {
    let (_temp_dir, vault_dir) = create_test_vault_dir();
    let old = vault_dir.join("Draft.md");
    let index = vault_dir.join("index.md");
    let notes = vault_dir.join("sub/notes.md");
    fs::create_dir(vault_dir.join("sub")).unwrap();
    fs::write(&old, "draft").unwrap();
    fs::write(&index, "[[Draft]] and [[!draft]]").unwrap();
    fs::write(&notes, "[d](../Draft.md#top)").unwrap();

    let graph = LinkGraph::new(Settings::default());
    graph.build_from_scan(&vault_dir).unwrap();
    assert_eq!(graph.backlinks_for(&old), vec![index.clone(), notes.clone()]);

    let new = vault_dir.join("Final.md");
    fs::rename(&old, &new).unwrap();
    let mut docs = vec![open(&index), open(&notes)];
    on_rename(&old, &new, &mut docs);
    save(&docs);

    assert_eq!(docs[0].text, "[[Final]] and [[!Final]]");
    assert_eq!(docs[1].text, "[d](../Final.md#top)");

    graph.build_from_scan(&vault_dir).unwrap();
    assert_eq!(graph.backlinks_for(&new), vec![index, notes]);
    assert!(graph.backlinks_for(&old).is_empty());
}

#[test]
fn test_delete_then_rebuild_drops_backlinks() {
    let (_temp_dir, vault_dir) = create_test_vault_dir();
    let gone = vault_dir.join("gone.md");
    let index = vault_dir.join("index.md");
    fs::write(&gone, "").unwrap();
    fs::write(&index, "Intro [[gone|Gone note]]\n\n[[!gone]]\n").unwrap();

    fs::remove_file(&gone).unwrap();
    let mut docs = vec![open(&index)];
    on_delete(&gone, &mut docs);
    save(&docs);

    assert_eq!(docs[0].text, "Intro Gone note\n\n\n");

    let graph = LinkGraph::new(Settings::default());
    graph.build_from_scan(&vault_dir).unwrap();
    assert!(graph.forward_links(&index).is_empty());
}
