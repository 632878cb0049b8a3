//! Configuration utility functions.

use std::path::{Path, PathBuf};

/// Config file names, in lookup order within a directory
pub const CONFIG_FILES: [&str; 2] = ["relive.toml", ".reliverc.json"];

/// First config file found in `dirs`, checking every name per directory
/// before moving on.
///
/// ```text
/// <root>/relive.toml
/// <root>/.reliverc.json
/// <cwd>/relive.toml
/// ...
/// ~/.reliverc.json
/// ```
pub fn find_config_file(dirs: &[PathBuf]) -> Option<PathBuf> {
    dirs.iter()
        .flat_map(|dir| CONFIG_FILES.iter().map(move |name| dir.join(name)))
        .find(|candidate| candidate.is_file())
}

/// The user's home directory, if `~` expands to one.
pub fn home_dir() -> Option<PathBuf> {
    let home = shellexpand::tilde("~");
    (home != "~").then(|| PathBuf::from(home.as_ref()))
}

/// Expand `~` and make `path` absolute against `base`.
pub fn resolve_path(path: &Path, base: &Path) -> PathBuf {
    let expanded = shellexpand::tilde(&path.to_string_lossy()).into_owned();
    let path = PathBuf::from(expanded);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

/// Parse as JSON when the extension says so, TOML otherwise.
pub fn is_json(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_find_config_file_order() {
        let root = TempDir::new().unwrap();
        let fallback = TempDir::new().unwrap();
        std::fs::write(fallback.path().join("relive.toml"), "").unwrap();

        let dirs = vec![root.path().to_path_buf(), fallback.path().to_path_buf()];
        assert_eq!(
            find_config_file(&dirs),
            Some(fallback.path().join("relive.toml"))
        );

        std::fs::write(root.path().join(".reliverc.json"), "{}").unwrap();
        assert_eq!(
            find_config_file(&dirs),
            Some(root.path().join(".reliverc.json"))
        );
    }

    #[test]
    fn test_find_config_file_none() {
        let empty = TempDir::new().unwrap();
        assert_eq!(find_config_file(&[empty.path().to_path_buf()]), None);
    }

    #[test]
    fn test_resolve_path() {
        let base = Path::new("/site");
        assert_eq!(resolve_path(Path::new("public"), base), PathBuf::from("/site/public"));
        assert_eq!(resolve_path(Path::new("/abs"), base), PathBuf::from("/abs"));
    }

    #[test]
    fn test_is_json() {
        assert!(is_json(Path::new(".reliverc.json")));
        assert!(!is_json(Path::new("relive.toml")));
    }
}
