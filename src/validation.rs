use crate::error::UploadError;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Validate that a path is safe to read for upload
///
/// Rejects ".." components, resolves symlinks and requires a regular file.
pub fn validate_file_path(path: &Path) -> Result<PathBuf, UploadError> {
    for component in path.components() {
        if let std::path::Component::ParentDir = component {
            return Err(UploadError::Validation(format!(
                "Path contains '..' component: {}",
                path.display()
            )));
        }
    }

    let canonical = path.canonicalize().map_err(|e| {
        UploadError::Validation(format!(
            "Failed to resolve path '{}': {}",
            path.display(),
            e
        ))
    })?;

    if !canonical.is_file() {
        return Err(UploadError::Validation(format!(
            "Not a regular file: {}",
            canonical.display()
        )));
    }

    Ok(canonical)
}

/// Validate file size is within the specified limit
pub fn validate_file_size(path: &Path, max_size: u64) -> Result<u64, UploadError> {
    let metadata = std::fs::metadata(path).map_err(|e| {
        UploadError::Validation(format!(
            "Failed to get file metadata for '{}': {}",
            path.display(),
            e
        ))
    })?;

    let size = metadata.len();

    if size > max_size {
        return Err(UploadError::Validation(format!(
            "File size ({} bytes) exceeds maximum allowed size ({} bytes): {}",
            size,
            max_size,
            path.display()
        )));
    }

    Ok(size)
}

/// Validate both path and size for a media file
pub fn validate_media_file(path: &Path, max_size: u64) -> Result<(PathBuf, u64), UploadError> {
    let canonical_path = validate_file_path(path)?;
    let size = validate_file_size(&canonical_path, max_size)?;
    Ok((canonical_path, size))
}

/// Expand files and directories into a sorted, de-duplicated list of files.
///
/// Directories are walked recursively; hidden entries (dot files) are skipped.
pub fn expand_upload_paths(paths: &[PathBuf]) -> Result<Vec<PathBuf>, UploadError> {
    let mut files = Vec::new();

    for path in paths {
        if path.is_dir() {
            for entry in WalkDir::new(path)
                .follow_links(false)
                .into_iter()
                .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name()))
            {
                let entry = entry.map_err(|e| {
                    UploadError::Validation(format!(
                        "Failed to walk '{}': {}",
                        path.display(),
                        e
                    ))
                })?;
                if entry.file_type().is_file() {
                    files.push(entry.into_path());
                }
            }
        } else {
            files.push(path.clone());
        }
    }

    files.sort();
    files.dedup();
    Ok(files)
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().map(|s| s.starts_with('.')).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_validate_path_with_parent_dir() {
        let path = Path::new("photos/../secrets.txt");
        let result = validate_file_path(path);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains(".."));
    }

    #[test]
    fn test_validate_directory_rejected() {
        let dir = tempdir().unwrap();
        assert!(validate_file_path(dir.path()).is_err());
    }

    #[test]
    fn test_validate_file_size_exceeds_limit() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("large.jpg");
        fs::write(&file_path, vec![0u8; 2048]).unwrap();

        let result = validate_file_size(&file_path, 1024);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("exceeds maximum"));
    }

    #[test]
    fn test_validate_media_file_within_limit() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("small.jpg");
        fs::write(&file_path, vec![0u8; 512]).unwrap();

        let (canonical, size) = validate_media_file(&file_path, 1024).unwrap();
        assert_eq!(size, 512);
        assert!(canonical.is_absolute());
    }

    #[test]
    fn test_expand_upload_paths_walks_directories() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("day1");
        fs::create_dir_all(&nested).unwrap();
        fs::write(dir.path().join("a.jpg"), b"a").unwrap();
        fs::write(nested.join("b.cr2"), b"b").unwrap();
        fs::write(nested.join(".DS_Store"), b"x").unwrap();

        let files = expand_upload_paths(&[dir.path().to_path_buf()]).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().any(|p| p.ends_with("a.jpg")));
        assert!(files.iter().any(|p| p.ends_with("day1/b.cr2")));
    }

    #[test]
    fn test_expand_upload_paths_dedups() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.jpg");
        fs::write(&file, b"a").unwrap();

        let files = expand_upload_paths(&[file.clone(), file.clone()]).unwrap();
        assert_eq!(files, vec![file]);
    }
}
