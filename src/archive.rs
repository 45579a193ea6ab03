use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::records::ItemMetadata;
use crate::text::{get_txt_from_file, item_dir, TextFormat};

/// One file listed for an archive item.
#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveFile {
    pub name: String,
    #[serde(default)]
    pub format: String,
}

/// The parts of the item metadata API response we use.
#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveItem {
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
    #[serde(default)]
    pub files: Vec<ArchiveFile>,
}

impl ArchiveItem {
    pub fn formats(&self) -> Vec<String> {
        self.files.iter().map(|f| f.format.clone()).collect()
    }

    pub fn files_in_formats<'a>(&'a self, formats: &'a [String]) -> impl Iterator<Item = &'a ArchiveFile> {
        self.files.iter().filter(|f| formats.contains(&f.format))
    }

    /// The metadata subset written to the metadata source file. Absent fields become `""`.
    pub fn item_metadata(&self, id: &str) -> Result<ItemMetadata> {
        let meta = self.metadata.as_ref().ok_or_else(|| Error::Archive {
            item: id.to_string(),
            reason: "no such item".into(),
        })?;
        let get = |field: &str| meta.get(field).map(field_text).unwrap_or_default();

        let identifier = meta
            .get("identifier")
            .map(field_text)
            .ok_or_else(|| Error::missing("identifier", format!("archive metadata for {id}")))?;
        let date = meta
            .get("date")
            .map(field_text)
            .ok_or_else(|| Error::missing("date", format!("archive metadata for {id}")))?;

        Ok(ItemMetadata {
            id: identifier,
            date,
            series: get("series"),
            vol: get("volume"),
            iss: get("issue"),
            title: get("title"),
            next_id: get("next_item"),
            prev_id: get("previous_item"),
            restricted: get("access-restricted-item"),
        })
    }
}

/// Multi-valued fields come back as arrays; join them.
fn field_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Array(vs) => vs.iter().map(field_text).collect::<Vec<_>>().join("; "),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Client for the remote archive's metadata and download endpoints.
pub struct ArchiveClient {
    client: reqwest::Client,
    base_url: String,
}

impl ArchiveClient {
    pub fn new(base_url: &str) -> Self {
        ArchiveClient {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn item(&self, id: &str) -> Result<ArchiveItem> {
        let url = format!("{}/metadata/{}", self.base_url, id);
        debug!("GET {}", url);
        let item = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json::<ArchiveItem>()
            .await?;
        Ok(item)
    }

    pub async fn item_metadata(&self, id: &str) -> Result<ItemMetadata> {
        self.item(id).await?.item_metadata(id)
    }

    pub async fn available_formats(&self, id: &str) -> Result<Vec<String>> {
        Ok(self.item(id).await?.formats())
    }

    /// Download every file of `id` in one of `formats` into `{root}/{id}/`.
    pub async fn download(&self, id: &str, root: &Path, formats: &[String]) -> Result<Vec<PathBuf>> {
        let item = self.item(id).await?;
        if item.metadata.is_none() {
            return Err(Error::Archive {
                item: id.to_string(),
                reason: "no such item".into(),
            });
        }

        let dir = item_dir(root, id);
        tokio::fs::create_dir_all(&dir).await?;

        let mut written = Vec::new();
        for file in item.files_in_formats(formats) {
            let url = format!("{}/download/{}/{}", self.base_url, id, file.name);
            debug!("GET {}", url);
            let body = self
                .client
                .get(&url)
                .send()
                .await?
                .error_for_status()?
                .bytes()
                .await?;
            // names may carry subdirectories
            let path = dir.join(&file.name);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, &body).await?;
            written.push(path);
        }
        info!(item = id, files = written.len(), "downloaded");
        Ok(written)
    }

    /// Download the text file for `format` and return its contents.
    /// Formats without an archive counterpart download nothing and yield `""`.
    pub async fn download_and_extract_text(&self, id: &str, root: &Path, format: &TextFormat) -> Result<String> {
        let Some(archive_format) = format.archive_format() else {
            return Ok(String::new());
        };
        info!(item = id, "downloading {} text", archive_format);
        self.download(id, root, &[archive_format.to_string()]).await?;
        get_txt_from_file(root, id, format)
    }
}
