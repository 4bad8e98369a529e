//! Path Utilities
//!
//! Common path resolution for jobplug directories and module files.

use std::path::{Component, Path, PathBuf};

/// Get the jobplug base directory (`~/.jobplug/`)
pub fn jobplug_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".jobplug"))
}

/// Directory of the running executable, falling back to the working directory
pub fn execution_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Absolute, canonical form of a path used as the module cache key.
///
/// Falls back to a lexical cleanup when the path cannot be canonicalized
/// (e.g. it was removed after being probed).
pub fn normalize_path(path: &Path) -> PathBuf {
    if let Ok(canonical) = std::fs::canonicalize(path) {
        return canonical;
    }

    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_existing_path() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("mod.so");
        std::fs::write(&file, b"").unwrap();

        let dotted = dir.path().join(".").join("sub").join("..").join("mod.so");
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        assert_eq!(normalize_path(&dotted), normalize_path(&file));
    }

    #[test]
    fn test_normalize_missing_path_is_lexical() {
        let p = normalize_path(Path::new("/nowhere/a/./b/../c.so"));
        assert_eq!(p, PathBuf::from("/nowhere/a/c.so"));
    }
}
