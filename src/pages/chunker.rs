use serde::Serialize;

use super::metadata::PageMetadataRecord;
use crate::error::Result;
use crate::text::TextSource;

/// Read access to persisted page metadata, ordered by page index.
pub trait PageStore {
    fn pages_for_item(&self, id: &str) -> Result<Vec<PageMetadataRecord>>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkedPageRecord {
    #[serde(flatten)]
    pub page: PageMetadataRecord,
    pub page_text: String,
}

/// Split an item's full text into per-page text using its stored offsets.
///
/// One store query per call, then one text read when the item has pages;
/// nothing is cached.
pub fn chunk_page_text(
    store: &impl PageStore,
    text_source: &impl TextSource,
    id: &str,
) -> Result<Vec<ChunkedPageRecord>> {
    let pages = store.pages_for_item(id)?;
    if pages.is_empty() {
        return Ok(Vec::new());
    }
    let text = text_source.item_text(id)?;
    let bounds = char_bounds(&text);

    Ok(pages
        .into_iter()
        .map(|page| {
            let page_text = char_slice(&text, &bounds, page.page_char_start, page.page_char_end)
                .trim()
                .to_string();
            ChunkedPageRecord { page, page_text }
        })
        .collect())
}

/// Byte offset of every char, plus `text.len()` as the end bound.
fn char_bounds(text: &str) -> Vec<usize> {
    text.char_indices().map(|(i, _)| i).chain([text.len()]).collect()
}

/// `text[start..end]` counted in chars, clamped to the text; empty when out of range.
fn char_slice<'t>(text: &'t str, bounds: &[usize], start: i64, end: i64) -> &'t str {
    let last = bounds.len() - 1;
    let start = (start.max(0) as usize).min(last);
    let end = (end.max(0) as usize).min(last);
    if start >= end {
        return "";
    }
    &text[bounds[start]..bounds[end]]
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    struct Fixed {
        pages: Vec<PageMetadataRecord>,
        text: &'static str,
        reads: Cell<usize>,
    }

    impl PageStore for Fixed {
        fn pages_for_item(&self, id: &str) -> Result<Vec<PageMetadataRecord>> {
            Ok(self.pages.iter().filter(|p| p.id == id).cloned().collect())
        }
    }

    impl TextSource for Fixed {
        fn item_text(&self, _id: &str) -> Result<String> {
            self.reads.set(self.reads.get() + 1);
            Ok(self.text.to_string())
        }
    }

    fn page(idx: i64, start: i64, end: i64) -> PageMetadataRecord {
        PageMetadataRecord {
            id: "item".into(),
            page_idx: idx,
            page_char_start: start,
            page_char_end: end,
            page_leaf_num: idx + 1,
            page_num: (idx + 1).to_string(),
            page_num_conf: 1.0,
        }
    }

    fn fixed(text: &'static str, pages: Vec<PageMetadataRecord>) -> Fixed {
        Fixed { pages, text, reads: Cell::new(0) }
    }

    #[test]
    fn slices_by_offsets() {
        let src = fixed("ABCDEFGHIJ", vec![page(0, 2, 5)]);
        let out = chunk_page_text(&src, &src, "item").unwrap();
        assert_eq!(out[0].page_text, "CDE");
    }

    #[test]
    fn trims_whitespace_and_keeps_order() {
        let src = fixed("  one \n\n two\t three  ", vec![page(0, 0, 7), page(1, 7, 13), page(2, 13, 22)]);
        let out = chunk_page_text(&src, &src, "item").unwrap();
        let texts: Vec<&str> = out.iter().map(|c| c.page_text.as_str()).collect();
        assert_eq!(texts, ["one", "two", "three"]);
        assert_eq!(out[2].page.page_idx, 2);
        assert_eq!(src.reads.get(), 1);
    }

    #[test]
    fn start_past_end_of_text_is_empty() {
        let src = fixed("short", vec![page(0, 5, 9), page(1, 40, 50)]);
        let out = chunk_page_text(&src, &src, "item").unwrap();
        assert!(out.iter().all(|c| c.page_text.is_empty()));
    }

    #[test]
    fn end_clamps_to_text_length() {
        let src = fixed("ABCDEF", vec![page(0, 3, 100)]);
        let out = chunk_page_text(&src, &src, "item").unwrap();
        assert_eq!(out[0].page_text, "DEF");
    }

    #[test]
    fn offsets_count_chars_not_bytes() {
        let src = fixed("Café Ørsted naïve", vec![page(0, 5, 11), page(1, 12, 17)]);
        let out = chunk_page_text(&src, &src, "item").unwrap();
        assert_eq!(out[0].page_text, "Ørsted");
        assert_eq!(out[1].page_text, "naïve");
    }

    #[test]
    fn no_records_no_chunks() {
        let src = fixed("text", vec![page(0, 0, 4)]);
        assert!(chunk_page_text(&src, &src, "other").unwrap().is_empty());
        assert_eq!(src.reads.get(), 0);
    }

    struct NoText;

    impl TextSource for NoText {
        fn item_text(&self, id: &str) -> Result<String> {
            Err(crate::error::Error::FileNotFound { path: format!("{id}_hocr_searchtext.txt.gz").into() })
        }
    }

    #[test]
    fn undownloaded_item_without_pages_is_empty() {
        let store = fixed("", vec![]);
        assert!(chunk_page_text(&store, &NoText, "never_loaded").unwrap().is_empty());
    }

    #[test]
    fn undownloaded_item_with_pages_fails() {
        let store = fixed("", vec![page(0, 0, 4)]);
        assert!(chunk_page_text(&store, &NoText, "item").is_err());
    }

    #[test]
    fn bounds_end_with_text_length() {
        assert_eq!(char_bounds(""), [0]);
        assert_eq!(char_bounds("aé b"), [0, 1, 3, 4, 5]);
    }

    #[test]
    fn many_pages_over_long_text() {
        let text: &'static str = Box::leak("é".repeat(400_000).into_boxed_str());
        let pages: Vec<_> = (0..4_000).map(|i| page(i, i * 100, i * 100 + 100)).collect();
        let src = fixed(text, pages);

        let out = chunk_page_text(&src, &src, "item").unwrap();
        assert_eq!(out.len(), 4_000);
        assert!(out.iter().all(|c| c.page_text.chars().count() == 100));
    }
}
