//! Path normalization: one comparison-stable identity per file on disk.
//!
//! `normalize` prefers the OS-canonical path (symlinks, `.`/`..`, on-disk
//! case) and falls back to a lexical absolute path for files that do not
//! exist yet, so a dangling link and the file later created for it compare
//! equal. Equality is always case-insensitive, on every platform.

use std::cmp::Ordering;
use std::fmt;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Component, Path, PathBuf};

use serde::Serialize;

/// Identity key for a document path. Compares, hashes and orders by its
/// lowercased key; `as_path` keeps the resolved spelling for display and I/O.
#[derive(Debug, Clone, Serialize)]
pub struct CanonicalPath {
    path: PathBuf,
    #[serde(skip)]
    key: String,
}

impl CanonicalPath {
    fn from_resolved(path: PathBuf) -> Self {
        let key = comparison_key(&path);
        CanonicalPath { path, key }
    }

    pub fn as_path(&self) -> &Path {
        &self.path
    }

    pub fn into_path_buf(self) -> PathBuf {
        self.path
    }

    /// Lowercased comparison key.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn parent(&self) -> Option<CanonicalPath> {
        self.path
            .parent()
            .map(|parent| CanonicalPath::from_resolved(parent.to_path_buf()))
    }

    /// Case-insensitive comparison against an arbitrary spelling, without touching the disk.
    pub fn matches_spelling(&self, other: &Path) -> bool {
        self.key == comparison_key(other)
    }
}

impl PartialEq for CanonicalPath {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for CanonicalPath {}

impl Hash for CanonicalPath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state)
    }
}

impl PartialOrd for CanonicalPath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CanonicalPath {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

impl fmt::Display for CanonicalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

impl AsRef<Path> for CanonicalPath {
    fn as_ref(&self) -> &Path {
        &self.path
    }
}

/// Normalizes `path` into its canonical identity.
pub fn normalize(path: impl AsRef<Path>) -> CanonicalPath {
    let path = path.as_ref();
    let resolved = fs::canonicalize(path).unwrap_or_else(|_| canonicalize_lexically(path));

    CanonicalPath::from_resolved(resolved)
}

/// Absolute, `.`/`..`-free path whose deepest existing ancestor is canonicalized.
fn canonicalize_lexically(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let cleaned = clean_components(&absolute);

    for ancestor in cleaned.ancestors().skip(1) {
        if let Ok(canonical_ancestor) = fs::canonicalize(ancestor) {
            return match cleaned.strip_prefix(ancestor) {
                Ok(rest) => canonical_ancestor.join(rest),
                Err(_) => cleaned,
            };
        }
    }

    cleaned
}

fn clean_components(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir | Component::Normal(_) => {
                cleaned.push(component.as_os_str())
            }
            Component::CurDir => {}
            Component::ParentDir => {
                // never pops past the root
                if cleaned.file_name().is_some() {
                    cleaned.pop();
                }
            }
        }
    }
    cleaned
}

fn comparison_key(path: &Path) -> String {
    let key = clean_components(path).to_string_lossy().to_lowercase();
    if cfg!(windows) {
        key.replace('\\', "/")
    } else {
        key
    }
}

/// Directories a search may enter: the listed roots and everything below them.
/// Containment is decided on normalized paths, so a symlink counts where it points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Boundary {
    roots: Vec<CanonicalPath>,
}

impl Boundary {
    pub fn new<P: AsRef<Path>>(roots: impl IntoIterator<Item = P>) -> Self {
        Boundary {
            roots: roots.into_iter().map(normalize).collect(),
        }
    }

    /// The user's home directory, or `None` when it cannot be determined.
    pub fn home() -> Option<Boundary> {
        let home = shellexpand::tilde("~").into_owned();
        if home.is_empty() || home.starts_with('~') {
            return None;
        }
        Some(Boundary::new([home]))
    }

    pub fn allow(&mut self, dir: impl AsRef<Path>) {
        let dir = normalize(dir);
        if !self.roots.contains(&dir) {
            self.roots.push(dir);
        }
    }

    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        let path = normalize(path);
        let key = Path::new(path.key());
        self.roots.iter().any(|root| key.starts_with(root.key()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_vault_dir;

    #[test]
    fn normalization_is_idempotent() {
        let (_temp_dir, vault_dir) = create_test_vault_dir();
        fs::write(vault_dir.join("Exists.md"), "x").unwrap();

        for p in [
            vault_dir.join("Exists.md"),
            vault_dir.join("missing/../Dangling.md"),
            PathBuf::from("relative/./note.md"),
        ] {
            let once = normalize(&p);
            let twice = normalize(once.as_path());
            assert_eq!(once, twice);
            assert_eq!(once.as_path(), twice.as_path());
        }
    }

    #[test]
    fn comparison_ignores_case_and_dot_segments() {
        assert_eq!(normalize("Notes/Foo.md"), normalize("notes/foo.MD"));
        assert_eq!(normalize("notes/./sub/../Foo.md"), normalize("Notes/Foo.md"));
        assert_eq!(normalize("Notes/"), normalize("notes"));
        assert_ne!(normalize("Notes/Foo.md"), normalize("Notes/Bar.md"));
    }

    #[test]
    fn dangling_target_matches_file_created_later() {
        let (_temp_dir, vault_dir) = create_test_vault_dir();
        let before = normalize(vault_dir.join("sub/../Later.md"));

        fs::write(vault_dir.join("Later.md"), "now exists").unwrap();
        let after = normalize(vault_dir.join("later.md"));

        assert_eq!(before, after);
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_directory_resolves_to_target() {
        let (_temp_dir, vault_dir) = create_test_vault_dir();
        fs::create_dir(vault_dir.join("real")).unwrap();
        fs::write(vault_dir.join("real/Note.md"), "x").unwrap();
        std::os::unix::fs::symlink(vault_dir.join("real"), vault_dir.join("alias")).unwrap();

        assert_eq!(
            normalize(vault_dir.join("alias/Note.md")),
            normalize(vault_dir.join("real/Note.md"))
        );
        // not-yet-existing files behind the link resolve through it as well
        assert_eq!(
            normalize(vault_dir.join("alias/New.md")),
            normalize(vault_dir.join("real/New.md"))
        );
    }

    #[test]
    fn boundary_contains_descendants_only() {
        let (_temp_dir, vault_dir) = create_test_vault_dir();
        fs::create_dir(vault_dir.join("notes")).unwrap();
        let boundary = Boundary::new([vault_dir.join("notes")]);

        assert!(boundary.contains(vault_dir.join("notes")));
        assert!(boundary.contains(vault_dir.join("NOTES/deep/Later.md")));
        assert!(!boundary.contains(vault_dir.join("notes-archive/a.md")));
        assert!(!boundary.contains(vault_dir.join("notes/../other.md")));
        assert!(!boundary.contains(&vault_dir));

        let mut widened = boundary.clone();
        widened.allow(&vault_dir);
        assert!(widened.contains(vault_dir.join("other.md")));
    }

    #[cfg(unix)]
    #[test]
    fn boundary_follows_symlinks() {
        let (temp_dir, vault_dir) = create_test_vault_dir();
        fs::create_dir(temp_dir.path().join("outside")).unwrap();
        std::os::unix::fs::symlink(temp_dir.path().join("outside"), vault_dir.join("escape")).unwrap();

        let boundary = Boundary::new([&vault_dir]);
        assert!(!boundary.contains(vault_dir.join("escape")));
        assert!(boundary.contains(vault_dir.join("plain")));
    }

    #[test]
    fn home_boundary_covers_home_only() {
        let Some(home) = Boundary::home() else {
            return;
        };
        let home_dir = shellexpand::tilde("~").into_owned();

        assert!(home.contains(Path::new(&home_dir).join("notes/today.md")));
        if let Some(parent) = Path::new(&home_dir).parent() {
            assert!(!home.contains(parent));
        }
    }

    #[test]
    fn matches_spelling_is_case_insensitive() {
        let canonical = normalize("/tmp/Some/Where.md");
        assert!(canonical.matches_spelling(Path::new("/TMP/some/where.MD")));
    }
}
