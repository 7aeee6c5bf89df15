//! Pipeline stages and the collaborator contracts they call.
//!
//! Each submodule owns one step: its trait (the contract the controller
//! depends on) and a default implementation. The controller never knows
//! which implementation it talks to, so tests swap in recording fakes and
//! callers can plug in their own OCR engine.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ text_layer ──▶ preprocess ──▶ layout ──▶ ocr ──▶ assemble ──▶ postprocess
//! (id/dir)  (pages/)   (pdfium)       (preprocessed/) (regions)  (blocks) (page text)  (NFKC+score)
//! ```
//!
//! 1. [`input`]      : validate the path, fingerprint bytes, create the work dir
//! 2. [`render`]     : rasterize via `pdftoppm` with a hard timeout, or reuse `pages/`
//! 3. [`text_layer`] : direct text per page; a hit skips every OCR stage
//! 4. [`preprocess`] : denoise into `preprocessed/`, reused on rerun
//! 5. [`layout`]     : optional region detection
//! 6. [`ocr`]        : recognize fragments, optionally per region
//! 7. [`assemble`]   : join fragments into page text
//! 8. [`postprocess`]: optional canonicalisation and confidence score
//!
//! Directory names under the work dir are the resume log: a file present
//! there (and non-empty) means that step already ran for that page.

pub mod assemble;
pub mod input;
pub mod layout;
pub mod ocr;
pub mod postprocess;
pub mod preprocess;
pub mod render;
pub mod tesseract;
pub mod text_layer;

use std::fs::File;
use std::io;
use std::path::Path;

/// Sub-directory of the work dir holding rasterized pages.
pub const PAGES_DIR: &str = "pages";

/// Sub-directory of the work dir holding denoised pages.
pub const PREPROCESSED_DIR: &str = "preprocessed";

/// Whether `path` is an artifact a rerun can trust: a non-empty regular file.
pub fn is_usable_artifact(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}

/// Write `dest` through a sibling temp file and rename it into place.
///
/// A crash mid-write leaves at most a stray temp file, never a truncated
/// file under `dest`'s name.
pub fn write_atomically<F>(dest: &Path, write: F) -> io::Result<()>
where
    F: FnOnce(&mut File) -> io::Result<()>,
{
    let parent = dest
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".partial-")
        .tempfile_in(parent)?;
    write(tmp.as_file_mut())?;
    tmp.as_file().sync_all()?;
    tmp.persist(dest).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn atomic_write_replaces_target() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("nested").join("out.png");
        write_atomically(&dest, |f| f.write_all(b"first")).unwrap();
        write_atomically(&dest, |f| f.write_all(b"second")).unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"second");
        assert!(is_usable_artifact(&dest));
    }

    #[test]
    fn failed_write_leaves_no_target() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("out.png");
        let err = write_atomically(&dest, |f| {
            f.write_all(b"half")?;
            Err(io::Error::other("disk full"))
        })
        .unwrap_err();
        assert_eq!(err.to_string(), "disk full");
        assert!(!dest.exists());
    }

    #[test]
    fn empty_file_is_not_usable() {
        let dir = TempDir::new().unwrap();
        let p = dir.path().join("empty.png");
        std::fs::write(&p, b"").unwrap();
        assert!(!is_usable_artifact(&p));
        assert!(!is_usable_artifact(dir.path()));
        assert!(!is_usable_artifact(&dir.path().join("missing.png")));
    }
}
