//! Input resolution: validate the path, fingerprint the bytes, and claim a
//! working directory.
//!
//! ## Why content identity?
//!
//! The working directory is named after a truncated SHA-256 of the input
//! bytes, not after the file name. Renaming or moving the input still finds
//! the artifacts of an earlier run, while two different files that happen
//! to share a name never collide. The id doubles as the restart key: rerun
//! the same bytes and every artifact on disk is picked up again.

use crate::error::PagemillError;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Length of the hex content id used for working-directory names.
pub const CONTENT_ID_LEN: usize = 16;

/// Supported input kinds, decided by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Pdf,
    Image,
}

impl InputKind {
    /// Map a file extension (case-insensitive) to an input kind.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(InputKind::Pdf),
            "png" | "jpg" | "jpeg" => Some(InputKind::Image),
            _ => None,
        }
    }

    pub fn of(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }
}

/// A validated input with its content identity and working directory.
#[derive(Debug, Clone)]
pub struct ResolvedInput {
    pub path: PathBuf,
    pub kind: InputKind,
    pub id: String,
    pub work_dir: PathBuf,
}

/// Check preconditions for `path` without touching the filesystem beyond reads.
///
/// Fails when the path is missing, not a regular file, unreadable, or has an
/// extension outside {pdf, png, jpg, jpeg}.
pub fn validate_input(path: &Path) -> Result<(PathBuf, InputKind), PagemillError> {
    let meta = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            return Err(PagemillError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(_) => {
            return Err(PagemillError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
    };

    if !meta.is_file() {
        return Err(PagemillError::NotAFile {
            path: path.to_path_buf(),
        });
    }

    let kind = InputKind::of(path).ok_or_else(|| PagemillError::UnsupportedInput {
        path: path.to_path_buf(),
        extension: path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default(),
    })?;

    let resolved = path.canonicalize().map_err(|e| match e.kind() {
        io::ErrorKind::PermissionDenied => PagemillError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => PagemillError::FileNotFound {
            path: path.to_path_buf(),
        },
    })?;

    Ok((resolved, kind))
}

/// Stable content identity: first [`CONTENT_ID_LEN`] hex chars of SHA-256.
///
/// Streams the file so large inputs are never held in memory.
pub fn content_id(path: &Path) -> Result<String, PagemillError> {
    let mut file = File::open(path).map_err(|e| match e.kind() {
        io::ErrorKind::PermissionDenied => PagemillError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => PagemillError::FileNotFound {
            path: path.to_path_buf(),
        },
    })?;

    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file
            .read(&mut buf)
            .map_err(|e| PagemillError::Internal(format!("reading {}: {e}", path.display())))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    let mut id = hex::encode(hasher.finalize());
    id.truncate(CONTENT_ID_LEN);
    Ok(id)
}

/// Validate `path`, compute its identity, and create `<work_root>/<id>/`.
///
/// Idempotent: the same bytes always map to the same existing directory.
pub fn resolve_input(path: &Path, work_root: &Path) -> Result<ResolvedInput, PagemillError> {
    let (path, kind) = validate_input(path)?;
    let id = content_id(&path)?;
    let work_dir = work_root.join(&id);

    std::fs::create_dir_all(&work_dir).map_err(|e| PagemillError::Workspace {
        path: work_dir.clone(),
        source: e,
    })?;

    debug!("Resolved {} → {} ({:?})", path.display(), work_dir.display(), kind);
    Ok(ResolvedInput {
        path,
        kind,
        id,
        work_dir,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn extension_mapping() {
        assert_eq!(InputKind::from_extension("PDF"), Some(InputKind::Pdf));
        assert_eq!(InputKind::from_extension("jpeg"), Some(InputKind::Image));
        assert_eq!(InputKind::from_extension("Png"), Some(InputKind::Image));
        assert_eq!(InputKind::from_extension("tiff"), None);
        assert_eq!(InputKind::of(Path::new("noext")), None);
    }

    #[test]
    fn content_id_is_truncated_sha256() {
        let dir = TempDir::new().unwrap();
        let p = dir.path().join("hello.pdf");
        std::fs::write(&p, b"hello").unwrap();
        // SHA-256("hello") = 2cf24dba5fb0a30e...
        assert_eq!(content_id(&p).unwrap(), "2cf24dba5fb0a30e");
    }

    #[test]
    fn same_bytes_same_workspace() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("work");
        let a = dir.path().join("a.pdf");
        let b = dir.path().join("renamed.pdf");
        std::fs::write(&a, b"%PDF-1.4 same").unwrap();
        std::fs::write(&b, b"%PDF-1.4 same").unwrap();

        let ra = resolve_input(&a, &root).unwrap();
        let rb = resolve_input(&b, &root).unwrap();
        assert_eq!(ra.id, rb.id);
        assert_eq!(ra.work_dir, rb.work_dir);
        assert!(ra.work_dir.is_dir());
    }

    #[test]
    fn rejects_unsupported_extension_before_creating_workspace() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("work");
        let p = dir.path().join("notes.docx");
        std::fs::write(&p, b"not supported").unwrap();

        let err = resolve_input(&p, &root).unwrap_err();
        assert!(matches!(err, PagemillError::UnsupportedInput { .. }));
        assert!(!root.exists());
    }

    #[test]
    fn rejects_missing_and_directory_inputs() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.pdf");
        assert!(matches!(
            validate_input(&missing),
            Err(PagemillError::FileNotFound { .. })
        ));

        let sub = dir.path().join("folder.pdf");
        std::fs::create_dir(&sub).unwrap();
        assert!(matches!(
            validate_input(&sub),
            Err(PagemillError::NotAFile { .. })
        ));
    }
}
