//! Full-text extraction from downloaded item files.

use std::io::Read;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;

use crate::error::{open_file, Error, Result};

/// Which downloaded text file to read for an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextFormat {
    /// `{id}_hocr_searchtext.txt.gz`
    SearchText,
    /// `{id}_djvu.txt`
    DjvuTxt,
    /// Anything else; reads as empty text.
    Unsupported(String),
}

impl From<&str> for TextFormat {
    fn from(value: &str) -> Self {
        match value {
            "searchtext" => TextFormat::SearchText,
            "djvutxt" => TextFormat::DjvuTxt,
            other => TextFormat::Unsupported(other.to_string()),
        }
    }
}

impl TextFormat {
    /// Archive format name to request when downloading this text.
    pub fn archive_format(&self) -> Option<&'static str> {
        match self {
            TextFormat::SearchText => Some("OCR Search Text"),
            TextFormat::DjvuTxt => Some("DjVuTXT"),
            TextFormat::Unsupported(_) => None,
        }
    }

    pub fn file_path(&self, root: &Path, id: &str) -> Option<PathBuf> {
        let name = match self {
            TextFormat::SearchText => format!("{id}_hocr_searchtext.txt.gz"),
            TextFormat::DjvuTxt => format!("{id}_djvu.txt"),
            TextFormat::Unsupported(_) => return None,
        };
        Some(item_dir(root, id).join(name))
    }
}

pub fn item_dir(root: &Path, id: &str) -> PathBuf {
    root.join(id)
}

/// Read the whole extracted text for an item. Unsupported formats yield `""`.
pub fn get_txt_from_file(root: &Path, id: &str, format: &TextFormat) -> Result<String> {
    let Some(path) = format.file_path(root, id) else {
        return Ok(String::new());
    };

    let mut content = String::new();
    let file = open_file(&path)?;
    let read = match format {
        TextFormat::SearchText => GzDecoder::new(file).read_to_string(&mut content),
        _ => std::io::BufReader::new(file).read_to_string(&mut content),
    };
    read.map_err(|e| match e.kind() {
        std::io::ErrorKind::InvalidData | std::io::ErrorKind::InvalidInput => {
            Error::malformed(&path, e)
        }
        _ => Error::Io(e),
    })?;
    Ok(content)
}

/// Source of an item's full text, consumed by the chunker.
pub trait TextSource {
    fn item_text(&self, id: &str) -> Result<String>;
}

/// Reads text from the local download directory.
pub struct DownloadedText<'a> {
    pub root: &'a Path,
    pub format: TextFormat,
}

impl TextSource for DownloadedText<'_> {
    fn item_text(&self, id: &str) -> Result<String> {
        get_txt_from_file(self.root, id, &self.format)
    }
}
