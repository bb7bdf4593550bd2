//! Document sources: a PDF on disk or already in memory.
//!
//! Both kinds are validated up front (exists, readable, `%PDF` magic bytes)
//! so callers get a typed [`DocumentOpenError`] instead of an opaque pdfium
//! failure. Validation reads only the first four bytes of a file; the full
//! document is not loaded until the rasterizer opens it.

use crate::error::DocumentOpenError;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// Where the rasterizer reads the document from.
#[derive(Clone)]
pub enum DocumentSource {
    /// A PDF file on the local file system.
    Path(PathBuf),
    /// PDF bytes already in memory. Shared so requests can be cloned cheaply.
    Bytes(Arc<[u8]>),
}

impl DocumentSource {
    /// Validate a local file and wrap it.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DocumentOpenError> {
        let path = path.as_ref().to_path_buf();
        validate_file(&path)?;
        debug!("Resolved local PDF: {}", path.display());
        Ok(DocumentSource::Path(path))
    }

    /// Validate an in-memory buffer and wrap it.
    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>) -> Result<Self, DocumentOpenError> {
        let bytes: Arc<[u8]> = bytes.into();
        check_magic(&bytes, "<memory>")?;
        Ok(DocumentSource::Bytes(bytes))
    }

    /// Human-readable origin used in error messages and logs.
    pub fn describe(&self) -> String {
        match self {
            DocumentSource::Path(p) => p.display().to_string(),
            DocumentSource::Bytes(b) => format!("<memory: {} bytes>", b.len()),
        }
    }
}

impl fmt::Debug for DocumentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentSource::Path(p) => f.debug_tuple("Path").field(p).finish(),
            DocumentSource::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
        }
    }
}

/// Outcome of asking the file-selection surface for a document.
#[derive(Debug, Clone)]
pub enum Selection {
    /// A validated, readable PDF.
    Selected(DocumentSource),
    /// The user picked nothing. Not an error.
    NoSelection,
}

impl Selection {
    pub fn into_source(self) -> Option<DocumentSource> {
        match self {
            Selection::Selected(s) => Some(s),
            Selection::NoSelection => None,
        }
    }
}

/// Turn an optional picked path into a [`Selection`].
///
/// An absent path is [`Selection::NoSelection`]; a present one must pass the
/// same validation as [`DocumentSource::from_path`].
pub fn select_source<P: AsRef<Path>>(picked: Option<P>) -> Result<Selection, DocumentOpenError> {
    match picked {
        None => Ok(Selection::NoSelection),
        Some(p) => DocumentSource::from_path(p).map(Selection::Selected),
    }
}

fn validate_file(path: &Path) -> Result<(), DocumentOpenError> {
    if !path.exists() {
        return Err(DocumentOpenError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let mut file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(DocumentOpenError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(_) => {
            return Err(DocumentOpenError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
    };

    let mut head = Vec::with_capacity(4);
    file.by_ref()
        .take(4)
        .read_to_end(&mut head)
        .map_err(|e| DocumentOpenError::Corrupt {
            origin: path.display().to_string(),
            detail: e.to_string(),
        })?;
    check_magic(&head, &path.display().to_string())
}

fn check_magic(bytes: &[u8], origin: &str) -> Result<(), DocumentOpenError> {
    if bytes.len() < 4 || &bytes[..4] != PDF_MAGIC {
        return Err(DocumentOpenError::NotAPdf {
            origin: origin.to_string(),
            magic: bytes.iter().take(4).copied().collect(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_is_not_found() {
        let err = DocumentSource::from_path("/definitely/not/a/real/file.pdf").unwrap_err();
        assert!(matches!(err, DocumentOpenError::FileNotFound { .. }));
    }

    #[test]
    fn non_pdf_file_is_rejected() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"GIF89a not a pdf").unwrap();
        let err = DocumentSource::from_path(tmp.path()).unwrap_err();
        match err {
            DocumentOpenError::NotAPdf { magic, .. } => assert_eq!(magic, b"GIF8".to_vec()),
            other => panic!("expected NotAPdf, got {other:?}"),
        }
    }

    #[test]
    fn short_file_is_rejected() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"%P").unwrap();
        assert!(matches!(
            DocumentSource::from_path(tmp.path()),
            Err(DocumentOpenError::NotAPdf { .. })
        ));
    }

    #[test]
    fn pdf_file_is_accepted() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"%PDF-1.4\n%%EOF\n").unwrap();
        let src = DocumentSource::from_path(tmp.path()).unwrap();
        assert!(matches!(src, DocumentSource::Path(_)));
        assert_eq!(src.describe(), tmp.path().display().to_string());
    }

    #[test]
    fn bytes_are_checked() {
        assert!(DocumentSource::from_bytes(b"%PDF-1.7 ...".to_vec()).is_ok());
        assert!(matches!(
            DocumentSource::from_bytes(Vec::<u8>::new()),
            Err(DocumentOpenError::NotAPdf { .. })
        ));
        let src = DocumentSource::from_bytes(b"%PDF-1.7".to_vec()).unwrap();
        assert_eq!(src.describe(), "<memory: 8 bytes>");
        assert_eq!(format!("{src:?}"), "Bytes(8)");
    }

    #[test]
    fn no_pick_is_no_selection() {
        let sel = select_source::<&Path>(None).unwrap();
        assert!(matches!(sel, Selection::NoSelection));
        assert!(sel.into_source().is_none());
    }

    #[test]
    fn bad_pick_is_an_error() {
        assert!(select_source(Some("/nope/missing.pdf")).is_err());
    }
}
