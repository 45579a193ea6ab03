//! Table descriptors for the archive database.
//!
//! Each table is described declaratively and applied by `db::apply_schema`.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
    Integer,
    Float,
    Boolean,
    /// ISO-8601 text, e.g. `1850-01-05T00:00:00`.
    DateTime,
}

impl FieldType {
    pub fn sql(self) -> &'static str {
        match self {
            FieldType::Text | FieldType::DateTime => "TEXT",
            FieldType::Integer | FieldType::Boolean => "INTEGER",
            FieldType::Float => "FLOAT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tokenizer {
    /// Porter stemmer over unicode61.
    Porter,
    Unicode61,
}

impl Tokenizer {
    pub fn sql(self) -> &'static str {
        match self {
            Tokenizer::Porter => "porter",
            Tokenizer::Unicode61 => "unicode61",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub name: &'static str,
    pub ty: FieldType,
}

const fn field(name: &'static str, ty: FieldType) -> Field {
    Field { name, ty }
}

#[derive(Debug, Clone, Copy)]
pub struct ForeignKey {
    pub column: &'static str,
    pub table: &'static str,
    pub other_column: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct FtsSpec {
    pub fields: &'static [&'static str],
    pub tokenizer: Tokenizer,
}

#[derive(Debug, Clone, Copy)]
pub struct TableSchema {
    pub name: &'static str,
    pub fields: &'static [Field],
    /// Empty means rows are keyed by SQLite's rowid.
    pub primary_key: &'static [&'static str],
    pub foreign_keys: &'static [ForeignKey],
    pub fts: Option<FtsSpec>,
}

impl TableSchema {
    pub fn column_names(&self) -> Vec<&'static str> {
        self.fields.iter().map(|f| f.name).collect()
    }

    pub fn fts_table(&self) -> String {
        format!("{}_fts", self.name)
    }
}

use FieldType::*;

pub const METADATA: TableSchema = TableSchema {
    name: "metadata",
    fields: &[
        field("id", Text),
        field("date", Text),
        field("datetime", DateTime),
        field("series", Text),
        field("vol", Text),
        field("iss", Text),
        field("title", Text),
        field("next_id", Text),
        field("prev_id", Text),
        field("is_index", Boolean),
        field("restricted", Text),
    ],
    primary_key: &["id"],
    foreign_keys: &[],
    fts: None,
};

pub const PAGES_METADATA: TableSchema = TableSchema {
    name: "pages_metadata",
    fields: &[
        field("id", Text),
        field("page_idx", Integer),
        field("page_char_start", Integer),
        field("page_char_end", Integer),
        field("page_leaf_num", Integer),
        field("page_num", Text),
        field("page_num_conf", Float),
    ],
    primary_key: &["id", "page_idx"],
    foreign_keys: &[],
    fts: None,
};

pub const ISSUES: TableSchema = TableSchema {
    name: "issues",
    fields: &[field("id", Text), field("content", Text)],
    primary_key: &["id"],
    foreign_keys: &[ForeignKey {
        column: "id",
        table: "metadata",
        other_column: "id",
    }],
    fts: Some(FtsSpec {
        fields: &["id", "content"],
        tokenizer: Tokenizer::Porter,
    }),
};

pub const INDEX_ENTRIES: TableSchema = TableSchema {
    name: "index_entries",
    fields: &[
        field("source_id", Text),
        field("year", Text),
        field("vol", Text),
        field("index_term", Text),
        field("typ", Text),
        field("subsidiary", Text),
        field("page_num", Integer),
    ],
    primary_key: &[],
    foreign_keys: &[],
    fts: Some(FtsSpec {
        fields: &["source_id", "index_term", "subsidiary", "year", "vol", "page_num"],
        tokenizer: Tokenizer::Porter,
    }),
};

/// Stories extracted from single-volume books rather than periodical issues.
pub const STORIES: TableSchema = TableSchema {
    name: "stories",
    fields: &[
        field("book_id", Text),
        field("book_title", Text),
        field("story_id", Text),
        field("story_title", Text),
        field("story_text", Text),
        field("last_para", Text),
        field("first_line", Text),
        field("provenance", Text),
        field("chapter_order", Integer),
    ],
    primary_key: &["story_id"],
    foreign_keys: &[],
    fts: Some(FtsSpec {
        fields: &["story_title", "story_text"],
        tokenizer: Tokenizer::Unicode61,
    }),
};

/// Creation order; referenced tables come first.
pub const ALL_TABLES: &[TableSchema] = &[METADATA, PAGES_METADATA, ISSUES, INDEX_ENTRIES, STORIES];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_and_indexed_fields_are_columns() {
        for t in ALL_TABLES {
            let cols = t.column_names();
            for k in t.primary_key {
                assert!(cols.contains(k), "{}: pk {k}", t.name);
            }
            for fk in t.foreign_keys {
                assert!(cols.contains(&fk.column), "{}: fk {}", t.name, fk.column);
                let pos = ALL_TABLES.iter().position(|o| o.name == fk.table).unwrap();
                let own = ALL_TABLES.iter().position(|o| o.name == t.name).unwrap();
                assert!(pos < own, "{} must be created before {}", fk.table, t.name);
            }
            for f in t.fts.iter().flat_map(|s| s.fields) {
                assert!(cols.contains(f), "{}: fts {f}", t.name);
            }
        }
    }
}
