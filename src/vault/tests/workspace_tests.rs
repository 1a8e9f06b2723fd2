//! Workspace discovery and scanning against real directories.

use std::io;
use std::path::{Path, PathBuf};

use crate::config::Settings;
use crate::documents::{DocumentSource, OpenDocuments};
use crate::error::GraphError;
use crate::paths::Boundary;
use crate::test_utils::{create_test_vault_dir, write_note};
use crate::vault::{ReferenceKind, Workspace};

fn relative(root: &Path, paths: &[PathBuf]) -> Vec<String> {
    paths
        .iter()
        .map(|p| {
            p.strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/")
        })
        .collect()
}

#[test]
fn discovers_documents_in_name_order() {
    let (_temp_dir, vault_dir) = create_test_vault_dir();
    write_note(&vault_dir, "b.markdown", "");
    write_note(&vault_dir, "a.md", "");
    write_note(&vault_dir, "notes/c.MD", "");
    write_note(&vault_dir, "image.png", "");
    write_note(&vault_dir, "todo.txt", "");

    let workspace = Workspace::discover(&Settings::default(), &vault_dir).unwrap();

    assert_eq!(workspace.root_dir(), vault_dir.as_path());
    assert_eq!(
        relative(&vault_dir, workspace.documents()),
        vec!["a.md", "b.markdown", "notes/c.MD"]
    );
    assert!(workspace.skipped().is_empty());
}

#[test]
fn hidden_entries_follow_settings() {
    let (_temp_dir, vault_dir) = create_test_vault_dir();
    write_note(&vault_dir, "visible.md", "");
    write_note(&vault_dir, ".draft.md", "");
    write_note(&vault_dir, ".trash/old.md", "");

    let hidden_skipped = Workspace::discover(&Settings::default(), &vault_dir).unwrap();
    assert_eq!(relative(&vault_dir, hidden_skipped.documents()), vec!["visible.md"]);

    let settings = Settings {
        ignore_hidden: false,
        ..Settings::default()
    };
    let everything = Workspace::discover(&settings, &vault_dir).unwrap();
    assert_eq!(
        relative(&vault_dir, everything.documents()),
        vec![".draft.md", ".trash/old.md", "visible.md"]
    );
}

#[test]
fn scan_depth_limits_directory_levels() {
    let (_temp_dir, vault_dir) = create_test_vault_dir();
    write_note(&vault_dir, "top.md", "");
    write_note(&vault_dir, "one/mid.md", "");
    write_note(&vault_dir, "one/two/deep.md", "");

    let depth = |scan_depth| {
        let settings = Settings {
            scan_depth,
            ..Settings::default()
        };
        let workspace = Workspace::discover(&settings, &vault_dir).unwrap();
        relative(&vault_dir, workspace.documents())
    };

    assert_eq!(depth(Some(0)), vec!["top.md"]);
    assert_eq!(depth(Some(1)), vec!["one/mid.md", "top.md"]);
    assert_eq!(depth(None).len(), 3);
}

#[test]
fn missing_root_is_an_error() {
    let (_temp_dir, vault_dir) = create_test_vault_dir();
    let missing = vault_dir.join("nope");

    let err = Workspace::discover(&Settings::default(), &missing).unwrap_err();

    assert!(matches!(err, GraphError::RootUnreadable { ref path, .. } if path == &missing));
}

#[test]
fn scan_prefers_open_buffers() {
    let (_temp_dir, vault_dir) = create_test_vault_dir();
    let note = write_note(&vault_dir, "note.md", "[[on disk]]");
    write_note(&vault_dir, "other.md", "![img](pic.png) [x](y.md)");

    let buffers = OpenDocuments::new();
    buffers.open(&note, "[[unsaved]] [[!embed]]");

    let workspace = Workspace::discover(&Settings::default(), &vault_dir).unwrap();
    let scanned = workspace.scan(&Settings::default(), &buffers);

    assert_eq!(scanned.len(), 2);
    let targets = scanned[0]
        .references
        .iter()
        .map(|r| (r.kind, r.raw_target.as_str()))
        .collect::<Vec<_>>();
    assert_eq!(
        targets,
        vec![
            (ReferenceKind::WikiLink, "unsaved"),
            (ReferenceKind::InclusionLink, "embed")
        ]
    );
    assert_eq!(scanned[1].references.len(), 2);
    assert!(scanned[1]
        .references
        .iter()
        .all(|r| r.source_document.as_deref() == Some(scanned[1].path.as_path())));
}

struct Unreadable(PathBuf);

impl DocumentSource for Unreadable {
    fn read(&self, path: &Path) -> io::Result<String> {
        if path == self.0 {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "locked"))
        } else {
            std::fs::read_to_string(path)
        }
    }
}

#[test]
fn unreadable_document_keeps_its_place() {
    let (_temp_dir, vault_dir) = create_test_vault_dir();
    write_note(&vault_dir, "a.md", "[[b]]");
    let locked = write_note(&vault_dir, "b.md", "[[a]]");

    let workspace = Workspace::discover(&Settings::default(), &vault_dir).unwrap();
    let scanned = workspace.scan(&Settings::default(), &Unreadable(locked.clone()));

    assert_eq!(scanned[0].references.len(), 1);
    assert_eq!(scanned[1].path, locked);
    assert!(scanned[1].references.is_empty());
    assert!(scanned[1].read_error.as_deref().unwrap().contains("locked"));
}

#[cfg(unix)]
#[test]
fn symlinked_documents_outside_the_boundary_are_skipped() {
    let (temp_dir, vault_dir) = create_test_vault_dir();
    let outside = write_note(temp_dir.path(), "outside/x.md", "[[inside]]");
    write_note(&vault_dir, "inside.md", "");
    let alias = write_note(&vault_dir, "notes/real.md", "");
    std::os::unix::fs::symlink(&outside, vault_dir.join("escaped.md")).unwrap();
    std::os::unix::fs::symlink(&alias, vault_dir.join("alias.md")).unwrap();

    // only the root is admitted
    let fenced = Workspace::discover_within(
        &Settings::default(),
        &vault_dir,
        Some(Boundary::new(Vec::<PathBuf>::new())),
    )
    .unwrap();
    assert_eq!(
        relative(&vault_dir, fenced.documents()),
        vec!["alias.md", "inside.md", "notes/real.md"]
    );
    assert_eq!(fenced.skipped().len(), 1);
    assert_eq!(fenced.skipped()[0].path, Some(vault_dir.join("escaped.md")));

    let open = Workspace::discover(
        &Settings {
            enforce_home_boundary: false,
            ..Settings::default()
        },
        &vault_dir,
    )
    .unwrap();
    assert_eq!(
        relative(&vault_dir, open.documents()),
        vec!["alias.md", "escaped.md", "inside.md", "notes/real.md"]
    );
    assert!(open.skipped().is_empty());
}

#[test]
fn root_outside_the_boundary_is_still_scanned() {
    let (_temp_dir, vault_dir) = create_test_vault_dir();
    write_note(&vault_dir, "a.md", "");
    let elsewhere = vault_dir.join("unrelated");

    let workspace =
        Workspace::discover_within(&Settings::default(), &vault_dir, Some(Boundary::new([elsewhere])))
            .unwrap();

    assert_eq!(relative(&vault_dir, workspace.documents()), vec!["a.md"]);
}
