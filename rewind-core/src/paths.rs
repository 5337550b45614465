use std::path::{Path, PathBuf};

/// Normalises a project path so that `./repo`, `repo/` and the absolute form
/// share one lock, one progress channel and one cached document.
pub fn project_key(cwd: &Path) -> PathBuf {
    std::fs::canonicalize(cwd).unwrap_or_else(|_| cwd.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_project_key_resolves_relative_segments() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let dotted = dir.path().join("sub").join("..");

        assert_eq!(project_key(&dotted), project_key(dir.path()));
    }

    #[test]
    fn test_project_key_keeps_missing_paths() {
        let missing = PathBuf::from("/definitely/not/here");
        assert_eq!(project_key(&missing), missing);
    }
}
