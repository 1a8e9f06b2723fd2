//! Raw target + referencing document -> at most one document path.
//!
//! Resolution runs against a [`FileLookup`]: [`LiveFs`] for the editor-facing
//! callers (highlighter, preview) and [`DocumentIndex`] for bulk rebuilds,
//! where only scanned documents count as link targets.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use itertools::Itertools;
use serde::Serialize;
use tracing::trace;

use crate::config::Settings;
use crate::paths::{normalize, Boundary, CanonicalPath};
use crate::vault::{clean_target, has_document_extension, is_document_path, split_extension};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "status", content = "path", rename_all = "snake_case")]
pub enum ResolvedTarget {
    Found(PathBuf),
    NotFound,
}

impl ResolvedTarget {
    pub fn path(&self) -> Option<&Path> {
        match self {
            ResolvedTarget::Found(path) => Some(path),
            ResolvedTarget::NotFound => None,
        }
    }

    pub fn into_path(self) -> Option<PathBuf> {
        match self {
            ResolvedTarget::Found(path) => Some(path),
            ResolvedTarget::NotFound => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, ResolvedTarget::Found(_))
    }
}

/// What the resolver may ask about the files it resolves against.
pub trait FileLookup {
    /// The document at exactly `candidate`, if there is one.
    fn find_file(&self, candidate: &Path) -> Option<PathBuf>;

    /// Documents directly inside `dir`, sorted by file name. Finding `dir`
    /// itself is case-insensitive.
    fn list_dir(&self, dir: &Path) -> Vec<PathBuf>;

    /// Subdirectories directly inside `dir`, sorted by name.
    fn subdirs(&self, dir: &Path) -> Vec<PathBuf>;
}

/// The filesystem as it is right now.
#[derive(Debug, Clone)]
pub struct LiveFs {
    extensions: Vec<String>,
}

impl LiveFs {
    pub fn new(extensions: Vec<String>) -> Self {
        LiveFs { extensions }
    }
}

impl FileLookup for LiveFs {
    fn find_file(&self, candidate: &Path) -> Option<PathBuf> {
        candidate
            .is_file()
            .then(|| normalize(candidate).into_path_buf())
    }

    fn list_dir(&self, dir: &Path) -> Vec<PathBuf> {
        let Some(dir) = locate_dir(dir) else {
            return Vec::new();
        };
        read_dir_sorted(&dir)
            .into_iter()
            .filter(|path| path.is_file() && is_document_path(path, &self.extensions))
            .collect()
    }

    fn subdirs(&self, dir: &Path) -> Vec<PathBuf> {
        read_dir_sorted(dir)
            .into_iter()
            .filter(|path| path.is_dir())
            .collect()
    }
}

fn read_dir_sorted(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .flatten()
                .map(|entry| entry.path())
                .sorted_by(|a, b| a.file_name().cmp(&b.file_name()))
                .collect()
        })
        .unwrap_or_default()
}

/// Finds `dir` on disk, matching each missing component case-insensitively.
fn locate_dir(dir: &Path) -> Option<PathBuf> {
    if dir.is_dir() {
        return Some(dir.to_path_buf());
    }
    let parent = locate_dir(dir.parent()?)?;
    let wanted = dir.file_name()?.to_string_lossy().to_lowercase();

    read_dir_sorted(&parent).into_iter().find(|candidate| {
        candidate.is_dir()
            && candidate
                .file_name()
                .is_some_and(|name| name.to_string_lossy().to_lowercase() == wanted)
    })
}

/// In-memory view of a scanned document set.
#[derive(Debug, Clone, Default)]
pub struct DocumentIndex {
    files: HashMap<CanonicalPath, PathBuf>,
    dirs: BTreeMap<CanonicalPath, Vec<PathBuf>>,
}

impl DocumentIndex {
    pub fn new<'a>(documents: impl IntoIterator<Item = &'a PathBuf>) -> Self {
        let mut index = DocumentIndex::default();
        for path in documents {
            index.insert(path);
        }
        index
    }

    pub fn insert(&mut self, path: &Path) {
        let key = normalize(path);
        if self.files.insert(key, path.to_path_buf()).is_some() {
            return;
        }

        // register ancestors so neighbourhood searches can walk the tree
        let mut child = path;
        while let Some(parent) = child.parent() {
            let key = normalize(parent);
            let known = self.dirs.contains_key(&key);
            let listing = self.dirs.entry(key).or_default();
            if child == path {
                listing.push(path.to_path_buf());
                listing.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
            }
            if known {
                break;
            }
            child = parent;
        }
    }

    pub fn remove(&mut self, path: &Path) {
        let key = normalize(path);
        if let Some(stored) = self.files.remove(&key) {
            if let Some(parent) = stored.parent() {
                if let Some(listing) = self.dirs.get_mut(&normalize(parent)) {
                    listing.retain(|entry| entry != &stored);
                }
            }
        }
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.files.contains_key(&normalize(path))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FileLookup for DocumentIndex {
    fn find_file(&self, candidate: &Path) -> Option<PathBuf> {
        self.files.get(&normalize(candidate)).cloned()
    }

    fn list_dir(&self, dir: &Path) -> Vec<PathBuf> {
        self.dirs.get(&normalize(dir)).cloned().unwrap_or_default()
    }

    fn subdirs(&self, dir: &Path) -> Vec<PathBuf> {
        let dir = normalize(dir);
        self.dirs
            .keys()
            .filter(|candidate| candidate.parent().as_ref() == Some(&dir))
            .map(|candidate| candidate.as_path().to_path_buf())
            .sorted_by(|a, b| a.file_name().cmp(&b.file_name()))
            .collect()
    }
}

/// Resolves raw targets with the configured extensions and search depth.
#[derive(Debug, Clone)]
pub struct TargetResolver {
    extensions: Vec<String>,
    search_depth: usize,
    /// Directories the neighbourhood search may enter; `None` is unrestricted
    boundary: Option<Boundary>,
}

impl Default for TargetResolver {
    fn default() -> Self {
        TargetResolver::new(&Settings::default())
    }
}

impl TargetResolver {
    pub fn new(settings: &Settings) -> Self {
        TargetResolver {
            extensions: settings.extensions.clone(),
            search_depth: settings.search_depth,
            boundary: settings.home_boundary(),
        }
    }

    pub fn with_boundary(mut self, boundary: Option<Boundary>) -> Self {
        self.boundary = boundary;
        self
    }

    /// A copy whose boundary also admits `dir`. Unrestricted resolvers stay unrestricted.
    pub fn allowing(&self, dir: &Path) -> TargetResolver {
        let mut resolver = self.clone();
        if let Some(boundary) = resolver.boundary.as_mut() {
            boundary.allow(dir);
        }
        resolver
    }

    fn permits(&self, dir: &Path) -> bool {
        self.boundary
            .as_ref()
            .map_or(true, |boundary| boundary.contains(dir))
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Live filesystem lookup used by the resolver's `resolve`.
    pub fn live_fs(&self) -> LiveFs {
        LiveFs::new(self.extensions.clone())
    }

    /// Resolves against the live filesystem.
    pub fn resolve(&self, raw_target: &str, referencing_document: &Path) -> ResolvedTarget {
        self.resolve_in(&self.live_fs(), raw_target, referencing_document)
    }

    /// Resolves against `lookup`; the first successful step wins.
    ///
    /// The steps are an exact lookup with each configured extension, a
    /// case-insensitive scan of the target's directory and, when
    /// `search_depth` is non-zero, a search of the surrounding directories.
    ///
    /// # Arguments
    ///
    /// * `lookup` - Files to resolve against, e.g. [`LiveFs`] or a [`DocumentIndex`]
    /// * `raw_target` - The target as written in the link, possibly escaped or with a fragment
    /// * `referencing_document` - The document containing the link
    ///
    /// # Example
    ///
    /// ```ignore
    /// let index = DocumentIndex::new([&PathBuf::from("/vault/Recipe.md")]);
    /// let target = TargetResolver::default().resolve_in(&index, "recipe#Steps", Path::new("/vault/index.md"));
    /// assert_eq!(target, ResolvedTarget::Found(PathBuf::from("/vault/Recipe.md")));
    /// ```
    pub fn resolve_in(
        &self,
        lookup: &impl FileLookup,
        raw_target: &str,
        referencing_document: &Path,
    ) -> ResolvedTarget {
        let target = clean_target(raw_target);
        if target.is_empty() {
            return ResolvedTarget::NotFound;
        }

        let target_path = Path::new(&target);
        let base = if target_path.is_absolute() {
            target_path.to_path_buf()
        } else {
            referencing_document
                .parent()
                .unwrap_or_else(|| Path::new(""))
                .join(target_path)
        };
        let has_extension = has_document_extension(&target, &self.extensions);

        let found = self
            .exact(lookup, &base, has_extension)
            .or_else(|| self.directory_scan(lookup, &base, has_extension))
            .or_else(|| self.neighbourhood(lookup, &base, has_extension));

        trace!(raw_target, document = %referencing_document.display(), ?found, "resolved target");

        match found {
            Some(path) => ResolvedTarget::Found(path),
            None => ResolvedTarget::NotFound,
        }
    }

    fn exact(&self, lookup: &impl FileLookup, base: &Path, has_extension: bool) -> Option<PathBuf> {
        if has_extension {
            return lookup.find_file(base);
        }

        self.extensions
            .iter()
            .map(|ext| {
                let mut candidate = base.as_os_str().to_owned();
                candidate.push(".");
                candidate.push(ext);
                PathBuf::from(candidate)
            })
            .chain(std::iter::once(base.to_path_buf()))
            .find_map(|candidate| lookup.find_file(&candidate))
    }

    fn directory_scan(
        &self,
        lookup: &impl FileLookup,
        base: &Path,
        has_extension: bool,
    ) -> Option<PathBuf> {
        let dir = base.parent()?;
        let name = base.file_name()?.to_string_lossy().to_lowercase();

        lookup
            .list_dir(dir)
            .into_iter()
            .find(|candidate| name_matches(candidate, &name, has_extension))
    }

    /// Subdirectories of the referencing directory first, then those of each
    /// parent, `search_depth` levels in both directions. Stops at the boundary.
    fn neighbourhood(
        &self,
        lookup: &impl FileLookup,
        base: &Path,
        has_extension: bool,
    ) -> Option<PathBuf> {
        if self.search_depth == 0 {
            return None;
        }
        let start = base.parent()?;
        let name = base.file_name()?.to_string_lossy().to_lowercase();

        let below = self.search_subdirs(lookup, start, &name, has_extension, self.search_depth);
        if below.is_some() {
            return below;
        }

        start
            .ancestors()
            .skip(1)
            .take(self.search_depth)
            .take_while(|ancestor| {
                let permitted = self.permits(ancestor);
                if !permitted {
                    trace!(dir = %ancestor.display(), "neighbourhood search stopped at boundary");
                }
                permitted
            })
            .find_map(|ancestor| {
                lookup
                    .list_dir(ancestor)
                    .into_iter()
                    .find(|candidate| name_matches(candidate, &name, has_extension))
                    .or_else(|| {
                        self.search_subdirs(lookup, ancestor, &name, has_extension, self.search_depth)
                    })
            })
    }

    fn search_subdirs(
        &self,
        lookup: &impl FileLookup,
        dir: &Path,
        name: &str,
        has_extension: bool,
        depth: usize,
    ) -> Option<PathBuf> {
        if depth == 0 || !self.permits(dir) {
            return None;
        }
        lookup
            .subdirs(dir)
            .into_iter()
            .filter(|subdir| self.permits(subdir))
            .find_map(|subdir| {
                lookup
                    .list_dir(&subdir)
                    .into_iter()
                    .find(|candidate| name_matches(candidate, name, has_extension))
                    .or_else(|| self.search_subdirs(lookup, &subdir, name, has_extension, depth - 1))
            })
    }
}

/// Compares the full file name when the target carries an extension,
/// otherwise the name without its extension.
fn name_matches(candidate: &Path, lowercase_name: &str, has_extension: bool) -> bool {
    let Some(file_name) = candidate.file_name().map(|n| n.to_string_lossy().to_lowercase()) else {
        return false;
    };
    if has_extension {
        file_name == lowercase_name
    } else {
        split_extension(&file_name).0 == lowercase_name || file_name == lowercase_name
    }
}

/// Resolves with default settings against the live filesystem.
pub fn resolve(raw_target: &str, referencing_document: &Path) -> ResolvedTarget {
    TargetResolver::default().resolve(raw_target, referencing_document)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::test_utils::create_test_vault_dir;

    fn found(result: ResolvedTarget) -> PathBuf {
        fs::canonicalize(result.into_path().expect("target should resolve")).unwrap()
    }

    #[test]
    fn extension_fallback_and_case_scan() {
        let (_temp_dir, vault_dir) = create_test_vault_dir();
        fs::write(vault_dir.join("Recipe.md"), "# Recipe").unwrap();
        let index = vault_dir.join("index.md");
        let expected = fs::canonicalize(vault_dir.join("Recipe.md")).unwrap();

        assert_eq!(found(resolve("Recipe", &index)), expected);
        assert_eq!(found(resolve("Recipe.md", &index)), expected);
        assert_eq!(found(resolve("recipe", &index)), expected);
        assert_eq!(found(resolve("RECIPE.MD", &index)), expected);
        assert_eq!(resolve("Missing", &index), ResolvedTarget::NotFound);
    }

    #[test]
    fn markdown_extension_is_tried_after_md() {
        let (_temp_dir, vault_dir) = create_test_vault_dir();
        fs::write(vault_dir.join("Both.md"), "").unwrap();
        fs::write(vault_dir.join("Both.markdown"), "").unwrap();
        fs::write(vault_dir.join("Long.markdown"), "").unwrap();
        let index = vault_dir.join("index.md");

        assert_eq!(
            found(resolve("Both", &index)),
            fs::canonicalize(vault_dir.join("Both.md")).unwrap()
        );
        assert_eq!(
            found(resolve("Long", &index)),
            fs::canonicalize(vault_dir.join("Long.markdown")).unwrap()
        );
    }

    #[test]
    fn relative_absolute_and_decorated_targets() {
        let (_temp_dir, vault_dir) = create_test_vault_dir();
        fs::create_dir(vault_dir.join("sub")).unwrap();
        fs::write(vault_dir.join("sub/Old Name.md"), "").unwrap();
        fs::write(vault_dir.join("Top.md"), "").unwrap();
        let nested = vault_dir.join("sub/child.md");
        let expected = fs::canonicalize(vault_dir.join("sub/Old Name.md")).unwrap();

        assert_eq!(found(resolve("Old%20Name.md#Intro", &nested)), expected);
        assert_eq!(found(resolve("<Old Name.md>", &nested)), expected);
        assert_eq!(found(resolve("../Top", &nested)), fs::canonicalize(vault_dir.join("Top.md")).unwrap());

        let absolute = vault_dir.join("sub/Old Name.md");
        assert_eq!(
            found(resolve(absolute.to_str().unwrap(), Path::new("/elsewhere/x.md"))),
            expected
        );
    }

    #[test]
    fn case_insensitive_directory_component() {
        let (_temp_dir, vault_dir) = create_test_vault_dir();
        fs::create_dir(vault_dir.join("Notes")).unwrap();
        fs::write(vault_dir.join("Notes/Deep.md"), "").unwrap();

        assert_eq!(
            found(resolve("notes/deep", &vault_dir.join("index.md"))),
            fs::canonicalize(vault_dir.join("Notes/Deep.md")).unwrap()
        );
    }

    #[test]
    fn empty_and_anchor_only_targets_are_not_found() {
        let (_temp_dir, vault_dir) = create_test_vault_dir();
        let index = vault_dir.join("index.md");
        assert_eq!(resolve("", &index), ResolvedTarget::NotFound);
        assert_eq!(resolve("  #heading", &index), ResolvedTarget::NotFound);
    }

    #[test]
    fn neighbourhood_search_respects_depth() {
        let (_temp_dir, vault_dir) = create_test_vault_dir();
        fs::create_dir_all(vault_dir.join("a/b")).unwrap();
        fs::create_dir_all(vault_dir.join("side")).unwrap();
        fs::write(vault_dir.join("a/b/Buried.md"), "").unwrap();
        fs::write(vault_dir.join("side/Cousin.md"), "").unwrap();
        let index = vault_dir.join("index.md");
        let in_a = vault_dir.join("a/note.md");

        let off = TargetResolver::default();
        assert_eq!(off.resolve("Buried", &index), ResolvedTarget::NotFound);

        let shallow = TargetResolver::new(&Settings {
            search_depth: 1,
            enforce_home_boundary: false,
            ..Settings::default()
        });
        assert_eq!(shallow.resolve("Buried", &index), ResolvedTarget::NotFound);
        assert_eq!(
            found(shallow.resolve("Cousin", &in_a)),
            fs::canonicalize(vault_dir.join("side/Cousin.md")).unwrap()
        );

        let deep = TargetResolver::new(&Settings {
            search_depth: 2,
            enforce_home_boundary: false,
            ..Settings::default()
        });
        assert_eq!(
            found(deep.resolve("Buried", &index)),
            fs::canonicalize(vault_dir.join("a/b/Buried.md")).unwrap()
        );
    }

    #[test]
    fn neighbourhood_search_stops_at_the_boundary() {
        let (_temp_dir, vault_dir) = create_test_vault_dir();
        fs::create_dir_all(vault_dir.join("a/b")).unwrap();
        fs::create_dir_all(vault_dir.join("side")).unwrap();
        fs::write(vault_dir.join("a/b/Buried.md"), "").unwrap();
        fs::write(vault_dir.join("side/Cousin.md"), "").unwrap();
        let in_a = vault_dir.join("a/note.md");

        let unrestricted = TargetResolver::new(&Settings {
            search_depth: 1,
            enforce_home_boundary: false,
            ..Settings::default()
        });
        let fenced = unrestricted
            .clone()
            .with_boundary(Some(Boundary::new([vault_dir.join("a")])));

        // below the referencing directory is still inside
        assert_eq!(
            found(fenced.resolve("Buried", &in_a)),
            fs::canonicalize(vault_dir.join("a/b/Buried.md")).unwrap()
        );
        // the parent is outside, so its other children are never searched
        assert_eq!(fenced.resolve("Cousin", &in_a), ResolvedTarget::NotFound);
        assert!(unrestricted.resolve("Cousin", &in_a).is_found());
        assert!(fenced.allowing(&vault_dir).resolve("Cousin", &in_a).is_found());
    }

    #[cfg(unix)]
    #[test]
    fn neighbourhood_search_skips_symlinks_leaving_the_boundary() {
        let (temp_dir, vault_dir) = create_test_vault_dir();
        fs::create_dir_all(temp_dir.path().join("outside")).unwrap();
        fs::write(temp_dir.path().join("outside/Secret.md"), "").unwrap();
        std::os::unix::fs::symlink(temp_dir.path().join("outside"), vault_dir.join("escape")).unwrap();
        let index = vault_dir.join("index.md");

        let unrestricted = TargetResolver::new(&Settings {
            search_depth: 1,
            enforce_home_boundary: false,
            ..Settings::default()
        });
        let fenced = unrestricted.clone().with_boundary(Some(Boundary::new([&vault_dir])));

        assert!(unrestricted.resolve("Secret", &index).is_found());
        assert_eq!(fenced.resolve("Secret", &index), ResolvedTarget::NotFound);
    }

    #[test]
    fn home_boundary_follows_settings() {
        let (_temp_dir, vault_dir) = create_test_vault_dir();
        fs::create_dir_all(vault_dir.join("side")).unwrap();
        fs::write(vault_dir.join("side/Cousin.md"), "").unwrap();
        let in_a = vault_dir.join("a/note.md");

        let resolver = TargetResolver::new(&Settings {
            search_depth: 1,
            ..Settings::default()
        });
        let outside_home = Boundary::home().is_some_and(|home| !home.contains(&vault_dir));
        assert_eq!(resolver.resolve("Cousin", &in_a).is_found(), !outside_home);
    }

    #[test]
    fn document_index_only_knows_scanned_documents() {
        let (_temp_dir, vault_dir) = create_test_vault_dir();
        let vault_dir = fs::canonicalize(vault_dir).unwrap();
        fs::write(vault_dir.join("Known.md"), "").unwrap();
        fs::write(vault_dir.join("Unscanned.md"), "").unwrap();

        let known = vault_dir.join("Known.md");
        let index = DocumentIndex::new([&known]);
        let resolver = TargetResolver::default();
        let from = vault_dir.join("index.md");

        assert_eq!(
            resolver.resolve_in(&index, "known", &from),
            ResolvedTarget::Found(known.clone())
        );
        assert_eq!(
            resolver.resolve_in(&index, "Unscanned", &from),
            ResolvedTarget::NotFound
        );
        assert!(index.contains(&vault_dir.join("KNOWN.md")));
        assert_eq!(index.len(), 1);
    }
}
