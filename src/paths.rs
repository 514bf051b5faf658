//! Path key normalization
//!
//! The registry keys scripts by path, so every path that enters the index goes
//! through [`normalize`] first. Normalization is purely lexical: it never touches
//! the filesystem, which means deleted files still map to the key they were
//! registered under.

use std::path::{Component, Path, PathBuf};

use tower_lsp::lsp_types::Url;

/// File extension of script files
pub const SCRIPT_EXTENSION: &str = "sk";

/// Base names starting with this marker are disabled scripts
pub const DISABLE_MARKER: char = '-';

/// Lexically normalize a path: drop `.` components, fold `..`, unify separators
/// and strip trailing separators.
pub fn normalize(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    // Backslashes coming from Windows-style URIs or settings
    let unified;
    let path = match path.to_str() {
        Some(s) if cfg!(not(windows)) && s.contains('\\') => {
            unified = PathBuf::from(s.replace('\\', "/"));
            unified.as_path()
        }
        _ => path,
    };

    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Whether the file's base name carries the disable marker
pub fn is_disabled(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with(DISABLE_MARKER))
        .unwrap_or(false)
}

/// Whether the path names a script file by extension
pub fn is_script(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(SCRIPT_EXTENSION)
}

/// Script name shown to users: the file stem
pub fn script_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Path relative to the workspace root, always with forward slashes
pub fn relative_path(path: &Path, root: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Whether `path` lives under `root` (both already normalized)
pub fn is_within(path: &Path, root: &Path) -> bool {
    path.starts_with(root)
}

/// Case-folded key used to detect paths colliding on case-insensitive filesystems
pub fn case_fold_key(path: &Path) -> String {
    path.to_string_lossy().to_lowercase()
}

/// Convert a `file://` URL into a normalized path
pub fn url_to_path(url: &Url) -> Option<PathBuf> {
    url.to_file_path().ok().map(normalize)
}

/// Convert a path into a `file://` URL
pub fn path_to_url(path: &Path) -> Option<Url> {
    Url::from_file_path(path).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_folds_dots_and_trailing_separators() {
        assert_eq!(normalize("/ws/./scripts/../a.sk"), PathBuf::from("/ws/a.sk"));
        assert_eq!(normalize("/ws/scripts/"), PathBuf::from("/ws/scripts"));
        assert_eq!(normalize("/ws//scripts"), PathBuf::from("/ws/scripts"));
    }

    #[cfg(not(windows))]
    #[test]
    fn normalize_unifies_backslashes() {
        assert_eq!(normalize("/ws\\sub\\a.sk"), PathBuf::from("/ws/sub/a.sk"));
    }

    #[test]
    fn disable_marker_only_checks_base_name() {
        assert!(is_disabled(Path::new("/ws/-old.sk")));
        assert!(!is_disabled(Path::new("/-ws/old.sk")));
        assert!(!is_disabled(Path::new("/ws/old-copy.sk")));
    }

    #[test]
    fn relative_paths_use_forward_slashes() {
        let root = Path::new("/ws");
        assert_eq!(relative_path(Path::new("/ws/sub/a.sk"), root), "sub/a.sk");
        assert_eq!(relative_path(Path::new("/ws/a.sk"), root), "a.sk");
        assert_eq!(script_name(Path::new("/ws/sub/a.sk")), "a");
    }

    #[cfg(not(windows))]
    #[test]
    fn url_conversion_normalizes() {
        let url = Url::parse("file:///ws/sub/../a.sk").unwrap();
        assert_eq!(url_to_path(&url), Some(PathBuf::from("/ws/a.sk")));
        assert_eq!(
            path_to_url(Path::new("/ws/a.sk")).map(|u| u.to_string()),
            Some("file:///ws/a.sk".to_string())
        );
    }
}
