use serde::Serialize;
use serde_json::Value;

use super::reader::RawPagePair;
use crate::error::{Error, Result};

/// One row of `pages_metadata`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageMetadataRecord {
    pub id: String,
    /// Our own running count; should equal `page_leaf_num - 1`.
    pub page_idx: i64,
    pub page_char_start: i64,
    pub page_char_end: i64,
    pub page_leaf_num: i64,
    pub page_num: String,
    pub page_num_conf: f64,
}

/// Project a raw page pair onto a flat record.
pub fn parse_page_metadata(raw: &RawPagePair) -> Result<PageMetadataRecord> {
    let context = || format!("page {} of {}", raw.page_index, raw.item_id);
    let field = |name: &str| {
        raw.page_numbers
            .get(name)
            .ok_or_else(|| Error::missing(name, context()))
    };

    let page_leaf_num = field("leafNum")?
        .as_i64()
        .ok_or_else(|| Error::malformed(&raw.item_id, format!("leafNum is not an integer ({})", context())))?;
    let page_num = match field("pageNumber")? {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        other => {
            return Err(Error::malformed(
                &raw.item_id,
                format!("pageNumber {other} is not a string ({})", context()),
            ))
        }
    };
    let page_num_conf = field("confidence")?
        .as_f64()
        .ok_or_else(|| Error::malformed(&raw.item_id, format!("confidence is not a number ({})", context())))?;

    Ok(PageMetadataRecord {
        id: raw.item_id.clone(),
        page_idx: raw.page_index as i64,
        page_char_start: raw.offsets[0],
        page_char_end: raw.offsets[1],
        page_leaf_num,
        page_num,
        page_num_conf,
    })
}
