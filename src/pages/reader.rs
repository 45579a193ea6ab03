use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use serde_json::Value;
use tracing::debug;

use crate::error::{open_file, Error, Result};
use crate::text::item_dir;

/// One physical page: page-number descriptor and character offsets at the same position.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPagePair {
    pub item_id: String,
    pub page_index: usize,
    /// Raw `{leafNum, pageNumber, confidence}` object, validated by the parser.
    pub page_numbers: Value,
    /// `[start, end)` character offsets into the item's search text.
    pub offsets: [i64; 2],
}

pub fn page_numbers_path(root: &Path, id: &str) -> PathBuf {
    item_dir(root, id).join(format!("{id}_page_numbers.json"))
}

pub fn page_index_path(root: &Path, id: &str) -> PathBuf {
    item_dir(root, id).join(format!("{id}_hocr_pageindex.json.gz"))
}

/// Page descriptors and offsets for one item, checked to be the same length.
///
/// Both source files end in a sentinel entry which is dropped on load. The
/// pairing is positional: leaf numbers are not cross-checked against offsets,
/// so files produced out of step still pair silently as long as their
/// lengths agree.
#[derive(Debug)]
pub struct PagePairs {
    item_id: String,
    next_index: usize,
    page_numbers: std::vec::IntoIter<Value>,
    offsets: std::vec::IntoIter<[i64; 2]>,
}

impl PagePairs {
    pub fn new(item_id: &str, mut page_numbers: Vec<Value>, mut offsets: Vec<[i64; 2]>) -> Result<Self> {
        page_numbers.pop();
        offsets.pop();
        if page_numbers.len() != offsets.len() {
            return Err(Error::MisalignedPages {
                item: item_id.to_string(),
                page_numbers: page_numbers.len(),
                page_offsets: offsets.len(),
            });
        }
        Ok(PagePairs {
            item_id: item_id.to_string(),
            next_index: 0,
            page_numbers: page_numbers.into_iter(),
            offsets: offsets.into_iter(),
        })
    }
}

impl Iterator for PagePairs {
    type Item = RawPagePair;

    fn next(&mut self) -> Option<RawPagePair> {
        let page_numbers = self.page_numbers.next()?;
        let offsets = self.offsets.next()?;
        let page_index = self.next_index;
        self.next_index += 1;
        Some(RawPagePair {
            item_id: self.item_id.clone(),
            page_index,
            page_numbers,
            offsets,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.offsets.size_hint()
    }
}

impl ExactSizeIterator for PagePairs {}

/// Load both page files for `id` under `root` and pair them up.
pub fn raw_pages_metadata(id: &str, root: &Path) -> Result<PagePairs> {
    let numbers_path = page_numbers_path(root, id);
    let page_numbers = read_page_numbers(&numbers_path)?;

    let index_path = page_index_path(root, id);
    let offsets = read_page_index(&index_path)?;

    debug!(item = id, pages = offsets.len(), "read raw page metadata");
    PagePairs::new(id, page_numbers, offsets)
}

fn read_page_numbers(path: &Path) -> Result<Vec<Value>> {
    let file = open_file(path)?;
    let doc: Value =
        serde_json::from_reader(BufReader::new(file)).map_err(|e| Error::malformed(path, e))?;
    let Value::Object(mut doc) = doc else {
        return Err(Error::malformed(path, "expected a JSON object"));
    };
    match doc.remove("pages") {
        Some(Value::Array(pages)) => Ok(pages),
        Some(_) => Err(Error::malformed(path, "`pages` is not an array")),
        None => Err(Error::missing("pages", path.display().to_string())),
    }
}

fn read_page_index(path: &Path) -> Result<Vec<[i64; 2]>> {
    let file = open_file(path)?;
    let mut raw = Vec::new();
    GzDecoder::new(file)
        .read_to_end(&mut raw)
        .map_err(|e| Error::malformed(path, e))?;
    serde_json::from_slice(&raw).map_err(|e| Error::malformed(path, e))
}
