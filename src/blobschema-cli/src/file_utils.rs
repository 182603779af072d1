//! File system utilities for common traversal patterns

use anyhow::Result;
use std::path::{Path, PathBuf};

/// Walk files in a directory tree, filtering by extension
///
/// Calls the handler for each file matching the extension filter.
/// Extension should not include the dot (e.g., "bin" not ".bin").
pub fn walk_files_with_extension<F>(path: &Path, extensions: &[&str], mut handler: F) -> Result<()>
where
    F: FnMut(&Path) -> Result<()>,
{
    for entry in walkdir::WalkDir::new(path)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let file_path = entry.path();
        if has_extension(file_path, extensions) {
            handler(file_path)?;
        }
    }

    Ok(())
}

/// Collect files matching extension into a vector
pub fn collect_files_with_extension(path: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    walk_files_with_extension(path, extensions, |file_path| {
        files.push(file_path.to_path_buf());
        Ok(())
    })?;

    Ok(files)
}

pub fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| extensions.iter().any(|ext| e.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_collect_files_with_extension() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("b.bin"), b"").unwrap();
        fs::write(dir.path().join("a.BIN"), b"").unwrap();
        fs::write(dir.path().join("notes.txt"), b"").unwrap();
        fs::write(dir.path().join("nested").join("c.bin"), b"").unwrap();

        let files = collect_files_with_extension(dir.path(), &["bin"]).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().display().to_string())
            .collect();
        assert_eq!(names, vec!["a.BIN", "b.bin", "nested/c.bin"]);
    }

    #[test]
    fn test_has_extension() {
        assert!(has_extension(Path::new("x.yml"), &["yaml", "yml"]));
        assert!(!has_extension(Path::new("x"), &["bin"]));
    }
}
