pub mod date;

use std::collections::BTreeMap;
use std::path::Path;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{open_file, Error, Result};

/// One row of the metadata source file, keyed by column name.
pub type FieldMap = BTreeMap<String, String>;

/// Read a comma-separated file with a header row into field maps, in file order.
pub fn open_metadata_records(path: &Path) -> Result<Vec<FieldMap>> {
    let mut rdr = csv::Reader::from_reader(open_file(path)?);
    let rows = rdr
        .deserialize()
        .collect::<core::result::Result<Vec<FieldMap>, _>>()?;
    Ok(rows)
}

pub fn record_id(fields: &FieldMap) -> Result<&str> {
    fields
        .get("id")
        .map(String::as_str)
        .ok_or_else(|| Error::missing("id", "metadata record"))
}

/// Item-level metadata, as written to and read from the metadata source file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemMetadata {
    pub id: String,
    pub date: String,
    pub series: String,
    pub vol: String,
    pub iss: String,
    pub title: String,
    pub next_id: String,
    pub prev_id: String,
    pub restricted: String,
}

impl ItemMetadata {
    /// `id`, `date` and `title` are required; other columns default to `""`.
    pub fn from_fields(fields: &FieldMap) -> Result<Self> {
        let id = record_id(fields)?.to_string();
        let required = |name: &str| {
            fields
                .get(name)
                .cloned()
                .ok_or_else(|| Error::missing(name, format!("metadata record {id}")))
        };
        let optional = |name: &str| fields.get(name).cloned().unwrap_or_default();

        Ok(ItemMetadata {
            date: required("date")?,
            title: required("title")?,
            series: optional("series"),
            vol: optional("vol"),
            iss: optional("iss"),
            next_id: optional("next_id"),
            prev_id: optional("prev_id"),
            restricted: optional("restricted"),
            id,
        })
    }
}

/// A `metadata` table row: the source fields plus derived `datetime` and `is_index`.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataRow {
    pub item: ItemMetadata,
    pub datetime: Option<NaiveDateTime>,
    pub is_index: bool,
}

pub fn is_index(title: &str) -> bool {
    title.to_lowercase().contains("index")
}

/// Derive `datetime` and `is_index`. An unresolvable date leaves `datetime` unset.
pub fn patch_metadata_record(item: ItemMetadata) -> MetadataRow {
    let datetime = match date::parse_raw_date(&item.date) {
        Ok(dt) => Some(dt),
        Err(e) => {
            debug!(item = %item.id, "{e}");
            None
        }
    };
    let is_index = is_index(&item.title);
    MetadataRow {
        item,
        datetime,
        is_index,
    }
}

pub fn write_metadata_records(path: &Path, items: &[ItemMetadata]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut wtr = csv::Writer::from_path(path)?;
    for item in items {
        wtr.serialize(item)?;
    }
    wtr.flush()?;
    Ok(())
}

/// A row for `index_entries`, loaded from a separately prepared CSV.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IndexEntry {
    pub source_id: String,
    #[serde(default)]
    pub year: String,
    #[serde(default)]
    pub vol: String,
    pub index_term: String,
    #[serde(default)]
    pub typ: String,
    #[serde(default)]
    pub subsidiary: String,
    pub page_num: Option<i64>,
}

pub fn open_index_entries(path: &Path) -> Result<Vec<IndexEntry>> {
    let mut rdr = csv::Reader::from_reader(open_file(path)?);
    let rows = rdr
        .deserialize()
        .collect::<core::result::Result<Vec<IndexEntry>, _>>()?;
    Ok(rows)
}
