use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("File not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("Malformed data in {}: {reason}", path.display())]
    MalformedData { path: PathBuf, reason: String },

    #[error("Missing field `{field}` in {context}")]
    MissingField { field: String, context: String },

    #[error("Could not resolve date: {0:?}")]
    AmbiguousDateFormat(String),

    /// Page-number and page-offset files disagree on the number of pages.
    #[error("Item {item}: {page_numbers} page numbers but {page_offsets} page offsets")]
    MisalignedPages {
        item: String,
        page_numbers: usize,
        page_offsets: usize,
    },

    #[error("Archive request for {item} failed: {reason}")]
    Archive { item: String, reason: String },

    #[error("Io Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Json Error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Csv Error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Sqlite Error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Reqwest Error: {0}")]
    Reqwest(#[from] reqwest::Error),
}

impl Error {
    pub fn missing(field: &str, context: impl Into<String>) -> Self {
        Error::MissingField {
            field: field.to_string(),
            context: context.into(),
        }
    }

    pub fn malformed(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::MalformedData {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Open a file, reporting a missing file as `FileNotFound` rather than a bare io error.
pub fn open_file(path: &std::path::Path) -> Result<std::fs::File> {
    std::fs::File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::FileNotFound {
            path: path.to_path_buf(),
        },
        _ => Error::Io(e),
    })
}
