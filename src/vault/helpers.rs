//! Helper functions for reference targets and workspace paths.

use std::path::Path;

use pathdiff::diff_paths;

/// Document path relative to the workspace root, with `/` separators.
pub fn workspace_relative(root_dir: &Path, path: &Path) -> Option<String> {
    diff_paths(path, root_dir)
        .and_then(|diff| diff.to_str().map(|s| s.replace('\\', "/")))
}

/// Splits `Note#Heading` into `("Note", Some("Heading"))`.
pub fn split_fragment(target: &str) -> (&str, Option<&str>) {
    match target.find('#') {
        Some(idx) => (&target[..idx], Some(&target[idx + 1..])),
        None => (target, None),
    }
}

/// Turns a raw target as written into a path-like string: trims, drops an
/// `<...>` wrapper and the `#fragment`, decodes percent escapes and uses `/`
/// as the separator.
pub fn clean_target(raw: &str) -> String {
    let trimmed = raw.trim();
    let unwrapped = trimmed
        .strip_prefix('<')
        .and_then(|s| s.strip_suffix('>'))
        .unwrap_or(trimmed);
    let (path, _) = split_fragment(unwrapped);

    let decoded = urlencoding::decode(path).map_or_else(|_| path.to_string(), |d| d.into_owned());

    decoded.replace('\\', "/").trim().to_string()
}

/// Last path segment of a target (`dir/Note.md` -> `Note.md`).
pub fn target_file_name(target: &str) -> &str {
    target
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(target)
}

/// Directory part of a target including the trailing separator, empty if none.
pub fn target_dir_prefix(target: &str) -> &str {
    match target.rfind(['/', '\\']) {
        Some(idx) => &target[..=idx],
        None => "",
    }
}

/// Splits a file name at its last dot. A leading dot does not start an extension.
pub fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => (&name[..idx], Some(&name[idx + 1..])),
        _ => (name, None),
    }
}

/// Whether `name` ends in one of `extensions` (compared case-insensitively).
pub fn has_document_extension(name: &str, extensions: &[String]) -> bool {
    match split_extension(target_file_name(name)) {
        (_, Some(ext)) => extensions.iter().any(|known| known.eq_ignore_ascii_case(ext)),
        (_, None) => false,
    }
}

/// Whether a path on disk carries a recognized document extension.
pub fn is_document_path(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|known| known.eq_ignore_ascii_case(ext)))
}
