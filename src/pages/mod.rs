pub mod chunker;
pub mod metadata;
pub mod reader;

use std::path::Path;

use metadata::{parse_page_metadata, PageMetadataRecord};

use crate::error::Result;

/// Reader → parser for one item: every page of `id` as a flat record.
pub fn page_records(id: &str, root: &Path) -> Result<Vec<PageMetadataRecord>> {
    reader::raw_pages_metadata(id, root)?
        .map(|raw| parse_page_metadata(&raw))
        .collect()
}
