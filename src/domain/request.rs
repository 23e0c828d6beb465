//! The request to run one script.

use std::path::{Path, PathBuf};

use thiserror::Error;
use uuid::Uuid;

/// File extensions accepted as RenzMC scripts
pub const SCRIPT_EXTENSIONS: &[&str] = &["rmc", "renzmc"];

/// A request to run a single script
///
/// The workflow does not re-check the path; callers validate it, typically
/// through [`RunRequest::validated`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    id: Uuid,
    path: PathBuf,
}

impl RunRequest {
    /// Create a request for a path the caller has already validated
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            id: Uuid::new_v4(),
            path: path.into(),
        }
    }

    /// Check that `path` names an existing RenzMC script and build a request
    /// for its canonical absolute path
    pub fn validated(path: impl AsRef<Path>) -> Result<Self, RequestError> {
        let path = path.as_ref();

        let metadata = std::fs::metadata(path).map_err(|source| RequestError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        if !metadata.is_file() {
            return Err(RequestError::NotAFile {
                path: path.to_path_buf(),
            });
        }

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");
        if !SCRIPT_EXTENSIONS.contains(&extension) {
            return Err(RequestError::NotAScript {
                path: path.to_path_buf(),
            });
        }

        let absolute = path
            .canonicalize()
            .map_err(|source| RequestError::Unreadable {
                path: path.to_path_buf(),
                source,
            })?;

        Ok(Self::new(absolute))
    }

    /// Identifier used to correlate logs and transcript records
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name for display, falling back to the full path
    pub fn display_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Reasons a path cannot be run
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("Cannot read {}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Not a regular file: {}", .path.display())]
    NotAFile { path: PathBuf },

    #[error("This is not a RenzMC file (expected .rmc or .renzmc): {}", .path.display())]
    NotAScript { path: PathBuf },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validated_accepts_both_extensions() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["demo.rmc", "demo.renzmc"] {
            let path = dir.path().join(name);
            std::fs::write(&path, "tampilkan \"hello\"\n").unwrap();

            let request = RunRequest::validated(&path).unwrap();
            assert!(request.path().is_absolute());
            assert_eq!(request.display_name(), name);
        }
    }

    #[test]
    fn test_validated_rejects_other_extensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("demo.txt");
        std::fs::write(&path, "").unwrap();

        let result = RunRequest::validated(&path);
        assert!(matches!(result, Err(RequestError::NotAScript { .. })));
    }

    #[test]
    fn test_validated_rejects_missing_and_directories() {
        let dir = tempfile::tempdir().unwrap();

        let missing = RunRequest::validated(dir.path().join("gone.rmc"));
        assert!(matches!(missing, Err(RequestError::Unreadable { .. })));

        let folder = dir.path().join("folder.rmc");
        std::fs::create_dir(&folder).unwrap();
        let result = RunRequest::validated(&folder);
        assert!(matches!(result, Err(RequestError::NotAFile { .. })));
    }

    #[test]
    fn test_requests_get_distinct_ids() {
        let a = RunRequest::new("a.rmc");
        let b = RunRequest::new("a.rmc");
        assert_ne!(a.id(), b.id());
    }
}
