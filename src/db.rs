use std::path::Path;

use chrono::NaiveDateTime;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection};
use tracing::{debug, info};

use crate::error::Result;
use crate::pages::chunker::PageStore;
use crate::pages::metadata::PageMetadataRecord;
use crate::records::{IndexEntry, MetadataRow};
use crate::schema::{self, TableSchema, Tokenizer};

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path)?;
    configure(&conn)?;
    Ok(conn)
}

pub fn configure(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(())
}

fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn quoted_list(idents: &[&str]) -> String {
    idents.iter().map(|c| quote(c)).collect::<Vec<_>>().join(", ")
}

// ── Schema ──

/// The operations the loaders need from a relational store.
pub trait TableStore {
    fn table_exists(&self, name: &str) -> Result<bool>;
    fn drop_table_if_exists(&self, name: &str) -> Result<()>;
    fn create_table(&self, schema: &TableSchema) -> Result<()>;
    /// Full-text index `fields` of `table` into `{table}_fts`, kept in sync by triggers.
    fn enable_fts(&self, table: &str, fields: &[&str], tokenizer: Tokenizer) -> Result<()>;
    /// Insert rows in column order, updating rows whose primary key already exists.
    fn insert_many(&self, schema: &TableSchema, rows: Vec<Vec<Value>>) -> Result<usize>;
}

impl TableStore for Connection {
    fn table_exists(&self, name: &str) -> Result<bool> {
        let n: i64 = self.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![name],
            |r| r.get(0),
        )?;
        Ok(n > 0)
    }

    fn drop_table_if_exists(&self, name: &str) -> Result<()> {
        self.execute_batch(&format!("DROP TABLE IF EXISTS {};", quote(name)))?;
        Ok(())
    }

    fn create_table(&self, schema: &TableSchema) -> Result<()> {
        let mut defs: Vec<String> = schema
            .fields
            .iter()
            .map(|f| format!("{} {}", quote(f.name), f.ty.sql()))
            .collect();
        if !schema.primary_key.is_empty() {
            defs.push(format!("PRIMARY KEY ({})", quoted_list(schema.primary_key)));
        }
        for fk in schema.foreign_keys {
            defs.push(format!(
                "FOREIGN KEY ({}) REFERENCES {}({})",
                quote(fk.column),
                quote(fk.table),
                quote(fk.other_column)
            ));
        }
        let sql = format!("CREATE TABLE {} (\n    {}\n)", quote(schema.name), defs.join(",\n    "));
        debug!(table = schema.name, "{sql}");
        self.execute_batch(&sql)?;
        Ok(())
    }

    fn enable_fts(&self, table: &str, fields: &[&str], tokenizer: Tokenizer) -> Result<()> {
        let fts = format!("{table}_fts");
        let cols = quoted_list(fields);
        let new_vals = fields.iter().map(|c| format!("new.{}", quote(c))).collect::<Vec<_>>().join(", ");
        let old_vals = fields.iter().map(|c| format!("old.{}", quote(c))).collect::<Vec<_>>().join(", ");
        let (t, f) = (quote(table), quote(&fts));

        self.execute_batch(&format!(
            "
            CREATE VIRTUAL TABLE {f} USING fts5(
                {cols}, content={content}, tokenize='{tok}'
            );
            INSERT INTO {f}({f}) VALUES ('rebuild');

            CREATE TRIGGER {ai} AFTER INSERT ON {t} BEGIN
                INSERT INTO {f}(rowid, {cols}) VALUES (new.rowid, {new_vals});
            END;
            CREATE TRIGGER {ad} AFTER DELETE ON {t} BEGIN
                INSERT INTO {f}({f}, rowid, {cols}) VALUES ('delete', old.rowid, {old_vals});
            END;
            CREATE TRIGGER {au} AFTER UPDATE ON {t} BEGIN
                INSERT INTO {f}({f}, rowid, {cols}) VALUES ('delete', old.rowid, {old_vals});
                INSERT INTO {f}(rowid, {cols}) VALUES (new.rowid, {new_vals});
            END;
            ",
            content = format!("'{}'", table.replace('\'', "''")),
            tok = tokenizer.sql(),
            ai = quote(&format!("{table}_ai")),
            ad = quote(&format!("{table}_ad")),
            au = quote(&format!("{table}_au")),
        ))?;
        Ok(())
    }

    fn insert_many(&self, schema: &TableSchema, rows: Vec<Vec<Value>>) -> Result<usize> {
        let columns = schema.column_names();
        let placeholders = (1..=columns.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let mut sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote(schema.name),
            quoted_list(&columns),
            placeholders
        );
        // Upsert rather than REPLACE: a REPLACE would delete rows other tables reference.
        if !schema.primary_key.is_empty() {
            let updates = columns
                .iter()
                .filter(|c| !schema.primary_key.contains(*c))
                .map(|c| format!("{0} = excluded.{0}", quote(c)))
                .collect::<Vec<_>>();
            sql.push_str(&format!(" ON CONFLICT ({}) DO ", quoted_list(schema.primary_key)));
            if updates.is_empty() {
                sql.push_str("NOTHING");
            } else {
                sql.push_str(&format!("UPDATE SET {}", updates.join(", ")));
            }
        }

        // Join the caller's transaction if there is one.
        let tx = if self.is_autocommit() {
            Some(self.unchecked_transaction()?)
        } else {
            None
        };
        let mut count = 0;
        {
            let mut stmt = self.prepare(&sql)?;
            for row in rows {
                count += stmt.execute(params_from_iter(row))?;
            }
        }
        if let Some(tx) = tx {
            tx.commit()?;
        }
        Ok(count)
    }
}

/// Apply one descriptor. An existing table is left as is and `false` is returned.
pub fn apply_schema(store: &impl TableStore, schema: &TableSchema) -> Result<bool> {
    if store.table_exists(schema.name)? {
        info!(table = schema.name, "table exists, leaving it in place");
        return Ok(false);
    }
    store.create_table(schema)?;
    if let Some(fts) = &schema.fts {
        store.enable_fts(schema.name, fts.fields, fts.tokenizer)?;
    }
    Ok(true)
}

/// Create every table, first dropping existing ones (and their FTS tables) when
/// `drop` is set. Drops run in reverse so referencing tables go first.
pub fn init_schema(store: &impl TableStore, drop: bool) -> Result<Vec<&'static str>> {
    if drop {
        for t in schema::ALL_TABLES.iter().rev() {
            store.drop_table_if_exists(&t.fts_table())?;
            store.drop_table_if_exists(t.name)?;
        }
    }
    let mut created = Vec::new();
    for t in schema::ALL_TABLES {
        if apply_schema(store, t)? {
            created.push(t.name);
        }
    }
    Ok(created)
}

// ── Loading ──

fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

fn datetime(dt: Option<NaiveDateTime>) -> Value {
    dt.map_or(Value::Null, |d| Value::Text(d.format("%Y-%m-%dT%H:%M:%S").to_string()))
}

pub fn insert_metadata(store: &impl TableStore, rows: &[MetadataRow]) -> Result<usize> {
    let values = rows
        .iter()
        .map(|r| {
            vec![
                text(&r.item.id),
                text(&r.item.date),
                datetime(r.datetime),
                text(&r.item.series),
                text(&r.item.vol),
                text(&r.item.iss),
                text(&r.item.title),
                text(&r.item.next_id),
                text(&r.item.prev_id),
                Value::Integer(r.is_index as i64),
                text(&r.item.restricted),
            ]
        })
        .collect();
    store.insert_many(&schema::METADATA, values)
}

fn page_values(p: &PageMetadataRecord) -> Vec<Value> {
    vec![
        text(&p.id),
        Value::Integer(p.page_idx),
        Value::Integer(p.page_char_start),
        Value::Integer(p.page_char_end),
        Value::Integer(p.page_leaf_num),
        text(&p.page_num),
        Value::Real(p.page_num_conf),
    ]
}

/// Replace all stored pages of `id` with `pages`, atomically.
pub fn replace_item_pages(conn: &Connection, id: &str, pages: &[PageMetadataRecord]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let removed = tx.execute("DELETE FROM pages_metadata WHERE id = ?1", params![id])?;
    if removed > 0 {
        debug!(item = id, removed, "superseding stored pages");
    }
    let count = tx.insert_many(&schema::PAGES_METADATA, pages.iter().map(page_values).collect())?;
    tx.commit()?;
    Ok(count)
}

pub fn insert_issue(store: &impl TableStore, id: &str, content: &str) -> Result<usize> {
    store.insert_many(&schema::ISSUES, vec![vec![text(id), text(content)]])
}

pub fn insert_index_entries(store: &impl TableStore, entries: &[IndexEntry]) -> Result<usize> {
    let values = entries
        .iter()
        .map(|e| {
            vec![
                text(&e.source_id),
                text(&e.year),
                text(&e.vol),
                text(&e.index_term),
                text(&e.typ),
                text(&e.subsidiary),
                e.page_num.map_or(Value::Null, Value::Integer),
            ]
        })
        .collect();
    store.insert_many(&schema::INDEX_ENTRIES, values)
}

// ── Reading ──

impl PageStore for Connection {
    fn pages_for_item(&self, id: &str) -> Result<Vec<PageMetadataRecord>> {
        let mut stmt = self.prepare(
            "SELECT id, page_idx, page_char_start, page_char_end, page_leaf_num, page_num, page_num_conf
             FROM pages_metadata WHERE id = ?1 ORDER BY page_idx",
        )?;
        let rows = stmt
            .query_map(params![id], |row| {
                Ok(PageMetadataRecord {
                    id: row.get(0)?,
                    page_idx: row.get(1)?,
                    page_char_start: row.get(2)?,
                    page_char_end: row.get(3)?,
                    page_leaf_num: row.get(4)?,
                    page_num: row.get(5)?,
                    page_num_conf: row.get(6)?,
                })
            })?
            .collect::<core::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

pub struct SearchHit {
    pub id: String,
    pub title: String,
    pub snippet: String,
}

/// Full-text query over issue content, best match first.
pub fn search_issues(conn: &Connection, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
    let mut stmt = conn.prepare(
        "SELECT i.id, COALESCE(m.title, ''), snippet(issues_fts, 1, '[', ']', '...', 12)
         FROM issues_fts
         JOIN issues i ON i.rowid = issues_fts.rowid
         LEFT JOIN metadata m ON m.id = i.id
         WHERE issues_fts MATCH ?1
         ORDER BY rank
         LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(params![query, limit as i64], |row| {
            Ok(SearchHit {
                id: row.get(0)?,
                title: row.get(1)?,
                snippet: row.get(2)?,
            })
        })?
        .collect::<core::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Stats ──

pub struct Stats {
    pub items: usize,
    pub index_items: usize,
    pub dated: usize,
    pub pages: usize,
    pub issues: usize,
    pub index_entries: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let count = |sql: &str| -> Result<usize> { Ok(conn.query_row(sql, [], |r| r.get(0))?) };
    Ok(Stats {
        items: count("SELECT COUNT(*) FROM metadata")?,
        index_items: count("SELECT COUNT(*) FROM metadata WHERE is_index = 1")?,
        dated: count("SELECT COUNT(*) FROM metadata WHERE datetime IS NOT NULL")?,
        pages: count("SELECT COUNT(*) FROM pages_metadata")?,
        issues: count("SELECT COUNT(*) FROM issues")?,
        index_entries: count("SELECT COUNT(*) FROM index_entries")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{patch_metadata_record, ItemMetadata};

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        configure(&conn).unwrap();
        init_schema(&conn, true).unwrap();
        conn
    }

    fn item(id: &str, date: &str, title: &str) -> MetadataRow {
        patch_metadata_record(ItemMetadata {
            id: id.into(),
            date: date.into(),
            title: title.into(),
            ..Default::default()
        })
    }

    fn page(id: &str, idx: i64, start: i64, end: i64) -> PageMetadataRecord {
        PageMetadataRecord {
            id: id.into(),
            page_idx: idx,
            page_char_start: start,
            page_char_end: end,
            page_leaf_num: idx + 1,
            page_num: idx.to_string(),
            page_num_conf: 0.5,
        }
    }

    #[test]
    fn creates_all_tables_and_fts() {
        let conn = memory_db();
        for t in schema::ALL_TABLES {
            assert!(conn.table_exists(t.name).unwrap(), "{}", t.name);
            assert_eq!(conn.table_exists(&t.fts_table()).unwrap(), t.fts.is_some(), "{}", t.name);
        }
    }

    #[test]
    fn keep_leaves_existing_tables() {
        let conn = memory_db();
        insert_metadata(&conn, &[item("a", "1850", "Notes")]).unwrap();
        assert!(init_schema(&conn, false).unwrap().is_empty());
        assert_eq!(get_stats(&conn).unwrap().items, 1);

        init_schema(&conn, true).unwrap();
        assert_eq!(get_stats(&conn).unwrap().items, 0);
    }

    #[test]
    fn metadata_round_trip_through_sql() {
        let conn = memory_db();
        insert_metadata(&conn, &[item("a", "1850 1851", "Index to Vol 3"), item("b", "no date", "Notes")]).unwrap();

        let (dt, is_index): (Option<String>, bool) = conn
            .query_row("SELECT datetime, is_index FROM metadata WHERE id = 'a'", [], |r| Ok((r.get(0)?, r.get(1)?)))
            .unwrap();
        assert_eq!(dt.as_deref(), Some("1851-01-01T00:00:00"));
        assert!(is_index);

        let s = get_stats(&conn).unwrap();
        assert_eq!((s.items, s.index_items, s.dated), (2, 1, 1));
    }

    #[test]
    fn pages_come_back_ordered() {
        let conn = memory_db();
        replace_item_pages(&conn, "a", &[page("a", 2, 20, 30), page("a", 0, 0, 10), page("a", 1, 10, 20)]).unwrap();
        replace_item_pages(&conn, "b", &[page("b", 0, 0, 5)]).unwrap();

        let pages = conn.pages_for_item("a").unwrap();
        let idx: Vec<i64> = pages.iter().map(|p| p.page_idx).collect();
        assert_eq!(idx, [0, 1, 2]);
        assert_eq!(pages[1], page("a", 1, 10, 20));
        assert!(conn.pages_for_item("missing").unwrap().is_empty());
    }

    #[test]
    fn reloading_pages_supersedes() {
        let conn = memory_db();
        replace_item_pages(&conn, "a", &[page("a", 0, 0, 10), page("a", 1, 10, 20), page("a", 2, 20, 30)]).unwrap();
        replace_item_pages(&conn, "a", &[page("a", 0, 0, 15), page("a", 1, 15, 30)]).unwrap();

        let pages = conn.pages_for_item("a").unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].page_char_end, 15);
    }

    #[test]
    fn issue_search_uses_stemming() {
        let conn = memory_db();
        insert_metadata(&conn, &[item("a", "1850", "Notes and Queries No. 1")]).unwrap();
        insert_issue(&conn, "a", "Queries concerning the folk-lore of parishes and churches").unwrap();

        let hits = search_issues(&conn, "church", 5).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a");
        assert_eq!(hits[0].title, "Notes and Queries No. 1");
        assert!(hits[0].snippet.contains("[churches]"));
    }

    #[test]
    fn replaced_issue_is_reindexed() {
        let conn = memory_db();
        insert_metadata(&conn, &[item("a", "1850", "Notes")]).unwrap();
        insert_issue(&conn, "a", "ballads").unwrap();
        insert_issue(&conn, "a", "sermons").unwrap();

        assert!(search_issues(&conn, "ballads", 5).unwrap().is_empty());
        assert_eq!(search_issues(&conn, "sermons", 5).unwrap().len(), 1);
    }

    #[test]
    fn issue_requires_metadata_row() {
        let conn = memory_db();
        assert!(insert_issue(&conn, "orphan", "text").is_err());
    }

    #[test]
    fn index_entries_are_searchable() {
        let conn = memory_db();
        let entries = crate::records::open_index_entries(Path::new("tests/fixtures/index_entries.csv")).unwrap();
        assert_eq!(insert_index_entries(&conn, &entries).unwrap(), 3);

        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM index_entries_fts WHERE index_entries_fts MATCH 'shakespeare'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(n, 1);
    }
}
