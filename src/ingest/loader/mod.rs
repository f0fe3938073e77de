
use std::fmt;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::{RagError, Result};

/// Upper bound on the size of a single uploaded document
pub const MAX_DOCUMENT_BYTES: usize = 1024 * 1024 * 1024;

/// Supported document formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Text,
}

impl DocumentKind {
    /// Detect the format from a file name; only `.pdf` and `.txt` are accepted
    #[inline]
    pub fn from_name(name: &str) -> Result<Self> {
        let extension = Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("pdf") => Ok(Self::Pdf),
            Some("txt") => Ok(Self::Text),
            _ => Err(RagError::UnsupportedFormat(name.to_string())),
        }
    }

    #[inline]
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Pdf => ".pdf",
            Self::Text => ".txt",
        }
    }
}

impl fmt::Display for DocumentKind {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pdf => write!(f, "pdf"),
            Self::Text => write!(f, "text"),
        }
    }
}

/// An uploaded file awaiting ingestion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl Document {
    #[inline]
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    #[inline]
    pub fn kind(&self) -> Result<DocumentKind> {
        DocumentKind::from_name(&self.name)
    }
}

/// Extract the text of a document.
///
/// The bytes are written to a named temporary file carrying the format's
/// suffix and parsed on the blocking pool. The file is removed when the
/// parse finishes, whatever the outcome.
#[inline]
pub async fn load_text(document: &Document) -> Result<String> {
    let kind = document.kind()?;

    if document.bytes.len() > MAX_DOCUMENT_BYTES {
        return Err(load_error(
            &document.name,
            format!(
                "file is {} bytes, larger than the {} byte limit",
                document.bytes.len(),
                MAX_DOCUMENT_BYTES
            ),
        ));
    }

    let temp_file = write_temp_file(document, kind)?;
    debug!(
        "Loading {} document {} from {}",
        kind,
        document.name,
        temp_file.path().display()
    );

    let name = document.name.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        let result = match kind {
            DocumentKind::Pdf => {
                pdf_extract::extract_text(temp_file.path()).map_err(|e| e.to_string())
            }
            DocumentKind::Text => std::fs::read(temp_file.path())
                .map_err(|e| e.to_string())
                .and_then(|bytes| {
                    String::from_utf8(bytes).map_err(|e| format!("invalid UTF-8: {}", e))
                }),
        };
        drop(temp_file);
        result
    })
    .await;

    match outcome {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(message)) => Err(load_error(&name, message)),
        Err(join_error) if join_error.is_panic() => {
            warn!("Parser panicked while reading {}", name);
            Err(load_error(&name, "parser panicked on malformed input".to_string()))
        }
        Err(join_error) => Err(load_error(&name, join_error.to_string())),
    }
}

fn write_temp_file(document: &Document, kind: DocumentKind) -> Result<NamedTempFile> {
    let mut temp_file = tempfile::Builder::new()
        .prefix("docs-rag-")
        .suffix(kind.suffix())
        .tempfile()
        .map_err(|e| load_error(&document.name, format!("failed to create temp file: {}", e)))?;

    temp_file
        .write_all(&document.bytes)
        .and_then(|()| temp_file.flush())
        .map_err(|e| load_error(&document.name, format!("failed to write temp file: {}", e)))?;

    Ok(temp_file)
}

fn load_error(name: &str, message: String) -> RagError {
    RagError::Load {
        name: name.to_string(),
        message,
    }
}
