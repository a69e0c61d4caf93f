//! Path normalisation and comparison helpers
//!
//! Every component keys paths through [`path_key`] so that the tracking store,
//! the debouncer and the per-path locks agree on identity, including on
//! case-insensitive file systems.

use std::path::{Component, Path, PathBuf};

/// Lexically normalise a path: drops `.` segments and resolves `..` against
/// the preceding segment. The file system is never touched.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component.as_os_str());
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Stable string key for a path: normalised, `/`-separated and lowercased
/// when `case_insensitive` is set.
pub fn path_key(path: &Path, case_insensitive: bool) -> String {
    let key = to_slash(&normalize(path));
    if case_insensitive { key.to_lowercase() } else { key }
}

/// Render a path with `/` separators regardless of platform.
pub fn to_slash(path: &Path) -> String {
    let joined = path
        .components()
        .filter_map(|c| match c {
            Component::RootDir => None,
            other => Some(other.as_os_str().to_string_lossy().into_owned()),
        })
        .collect::<Vec<_>>()
        .join("/");

    if path.has_root() && !joined.starts_with('/') {
        // `C:` prefixes already render first on Windows; only POSIX roots need the slash
        if cfg!(windows) { joined } else { format!("/{joined}") }
    } else {
        joined
    }
}

fn component_eq(a: &Component<'_>, b: &Component<'_>, case_insensitive: bool) -> bool {
    if case_insensitive {
        a.as_os_str().to_string_lossy().to_lowercase()
            == b.as_os_str().to_string_lossy().to_lowercase()
    } else {
        a == b
    }
}

/// If `path` is `ancestor` or lies below it, return the remainder relative to
/// `ancestor` (empty for the path itself).
pub fn relative_to(path: &Path, ancestor: &Path, case_insensitive: bool) -> Option<PathBuf> {
    let path = normalize(path);
    let ancestor = normalize(ancestor);
    let mut rest = path.components();

    for a in ancestor.components() {
        let p = rest.next()?;
        if !component_eq(&p, &a, case_insensitive) {
            return None;
        }
    }

    Some(rest.as_path().to_path_buf())
}

/// True when `path` equals `ancestor` or is one of its descendants.
pub fn is_within(path: &Path, ancestor: &Path, case_insensitive: bool) -> bool {
    relative_to(path, ancestor, case_insensitive).is_some()
}

/// True when the file name starts with `.`.
pub fn has_hidden_name(path: &Path) -> bool {
    path.file_name().map(|n| n.to_string_lossy().starts_with('.')).unwrap_or(false)
}

/// Hidden check used as a hard pre-filter: any segment below `root` (or the
/// bare file name for paths outside it), or the platform hidden attribute.
pub fn is_hidden(path: &Path, root: &Path, case_insensitive: bool) -> bool {
    let segment_hidden = match relative_to(path, root, case_insensitive) {
        Some(relative) => relative.components().any(|c| match c {
            Component::Normal(name) => name.to_string_lossy().starts_with('.'),
            _ => false,
        }),
        None => has_hidden_name(path),
    };

    segment_hidden || has_hidden_attribute(path)
}

#[cfg(windows)]
fn has_hidden_attribute(path: &Path) -> bool {
    use std::os::windows::fs::MetadataExt;
    const FILE_ATTRIBUTE_HIDDEN: u32 = 0x2;
    std::fs::metadata(path)
        .map(|m| m.file_attributes() & FILE_ATTRIBUTE_HIDDEN != 0)
        .unwrap_or(false)
}

#[cfg(not(windows))]
fn has_hidden_attribute(_path: &Path) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_resolves_dots() {
        assert_eq!(normalize(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
        assert_eq!(normalize(Path::new("a/b/./")), PathBuf::from("a/b"));
    }

    #[test]
    fn test_path_key_case_folding() {
        let p = Path::new("/Data/Notes/README.md");
        assert_eq!(path_key(p, false), "/Data/Notes/README.md");
        assert_eq!(path_key(p, true), "/data/notes/readme.md");
    }

    #[test]
    fn test_relative_to() {
        let rel = relative_to(Path::new("/root/logs/keep.log"), Path::new("/root"), false);
        assert_eq!(rel, Some(PathBuf::from("logs/keep.log")));
        assert_eq!(relative_to(Path::new("/root"), Path::new("/root"), false), Some(PathBuf::new()));
        assert_eq!(relative_to(Path::new("/rootless/a"), Path::new("/root"), false), None);
        assert!(is_within(Path::new("/Root/A"), Path::new("/root"), true));
        assert!(!is_within(Path::new("/Root/A"), Path::new("/root"), false));
    }

    #[test]
    fn test_hidden_segments() {
        let root = Path::new("/work");
        assert!(is_hidden(Path::new("/work/.git/config"), root, false));
        assert!(is_hidden(Path::new("/work/src/.env"), root, false));
        assert!(!is_hidden(Path::new("/work/src/main.rs"), root, false));
        // segments above the root do not count, nor does the root itself
        let hidden_root = Path::new("/home/.cache/work");
        assert!(!is_hidden(Path::new("/home/.cache/work/a.txt"), hidden_root, false));
        assert!(!is_hidden(hidden_root, hidden_root, false));
        assert!(is_hidden(Path::new("/elsewhere/.profile"), root, false));
    }
}
