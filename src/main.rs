mod archive;
mod config;
mod db;
mod error;
mod pages;
mod records;
mod schema;
mod text;

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::archive::ArchiveClient;
use crate::config::Settings;
use crate::pages::chunker::ChunkedPageRecord;
use crate::records::{FieldMap, ItemMetadata};
use crate::text::{DownloadedText, TextFormat};

#[derive(Parser)]
#[command(name = "ia_loader", about = "Load periodical archive items into a searchable SQLite database")]
struct Cli {
    /// Settings file (default: ./ia_loader.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Directory holding downloaded items, one subdirectory per item id
    #[arg(long, global = true)]
    download_dir: Option<PathBuf>,
    /// SQLite database file
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database tables and full-text indexes
    Init {
        /// Keep existing tables instead of dropping and recreating them
        #[arg(long)]
        keep: bool,
    },
    /// List the file formats available for an item
    Formats { id: String },
    /// Fetch item metadata from the archive and write a metadata CSV
    FetchMetadata {
        ids: Vec<String>,
        #[arg(short, long)]
        out: PathBuf,
    },
    /// Download files for every record in a metadata CSV
    Download {
        records: PathBuf,
        /// Archive format to fetch (repeatable; default from settings)
        #[arg(short, long = "format")]
        formats: Vec<String>,
    },
    /// Load a metadata CSV into the metadata table
    LoadMetadata { records: PathBuf },
    /// Extract page metadata for every record in a metadata CSV
    LoadPages { records: PathBuf },
    /// Load the full text of every record into the issues table
    LoadIssues {
        records: PathBuf,
        /// Download the text before reading it
        #[arg(long)]
        download: bool,
        /// searchtext or djvutxt (default from settings)
        #[arg(long)]
        text_format: Option<String>,
    },
    /// Load index-term rows from a CSV into the index_entries table
    LoadIndexEntries { entries: PathBuf },
    /// Split an item's text into pages using its stored page metadata
    Chunk {
        id: String,
        /// Print records as JSON
        #[arg(long)]
        json: bool,
        #[arg(long)]
        text_format: Option<String>,
    },
    /// Full-text search over issue content
    Search {
        query: String,
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
    },
    /// Show row counts
    Stats,
}

fn init_tracing() {
    // stdout carries command output, e.g. `chunk --json`
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .try_init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(dir) = cli.download_dir {
        settings.download_dir = dir;
    }
    if let Some(db) = cli.db {
        settings.db_path = db;
    }
    info!(settings = ?settings, "settings loaded");

    let result = run(cli.command, &settings).await;

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

async fn run(command: Commands, settings: &Settings) -> anyhow::Result<()> {
    let root = settings.download_dir.as_path();

    match command {
        Commands::Init { keep } => {
            let conn = db::connect(&settings.db_path)?;
            let created = db::init_schema(&conn, !keep)?;
            println!("Database: {:?}", settings.db_path);
            println!("Created {} tables: {}", created.len(), created.join(", "));
        }
        Commands::Formats { id } => {
            let client = ArchiveClient::new(&settings.archive_url);
            for format in client.available_formats(&id).await? {
                println!("{format}");
            }
        }
        Commands::FetchMetadata { ids, out } => {
            let client = ArchiveClient::new(&settings.archive_url);
            let pb = progress_bar(ids.len())?;
            let mut items = Vec::with_capacity(ids.len());
            for id in &ids {
                let item = client
                    .item_metadata(id)
                    .await
                    .with_context(|| format!("Fetching metadata for {id}"))?;
                items.push(item);
                pb.inc(1);
            }
            pb.finish_and_clear();
            records::write_metadata_records(&out, &items)?;
            println!("Wrote {} records to {:?}", items.len(), out);
        }
        Commands::Download { records: csv, formats } => {
            let formats = if formats.is_empty() {
                settings.formats.clone()
            } else {
                formats
            };
            let rows = records::open_metadata_records(&csv)?;
            let client = ArchiveClient::new(&settings.archive_url);
            let pb = progress_bar(rows.len())?;
            let mut files = 0;
            for row in &rows {
                let id = records::record_id(row)?;
                files += client
                    .download(id, root, &formats)
                    .await
                    .with_context(|| format!("Downloading {id}"))?
                    .len();
                pb.inc(1);
            }
            pb.finish_and_clear();
            println!("Downloaded {} files for {} items into {:?}", files, rows.len(), root);
        }
        Commands::LoadMetadata { records: csv } => {
            let rows = records::open_metadata_records(&csv)?;
            let patched = patch_records(&rows)?;
            let conn = db::connect(&settings.db_path)?;
            let n = db::insert_metadata(&conn, &patched)?;
            let undated = patched.iter().filter(|r| r.datetime.is_none()).count();
            println!("Saved {} metadata records ({} without a parsed date).", n, undated);
        }
        Commands::LoadPages { records: csv } => {
            let rows = records::open_metadata_records(&csv)?;
            let conn = db::connect(&settings.db_path)?;
            let (items, saved) = add_page_metadata_to_db(&conn, &rows, root)?;
            println!("Saved {} pages for {} items.", saved, items);
        }
        Commands::LoadIssues {
            records: csv,
            download,
            text_format,
        } => {
            let format = text_format
                .as_deref()
                .map(TextFormat::from)
                .unwrap_or_else(|| settings.text_format());
            let rows = records::open_metadata_records(&csv)?;
            let conn = db::connect(&settings.db_path)?;
            let client = ArchiveClient::new(&settings.archive_url);

            let pb = progress_bar(rows.len())?;
            for row in &rows {
                let id = records::record_id(row)?;
                let content = if download {
                    client.download_and_extract_text(id, root, &format).await
                } else {
                    text::get_txt_from_file(root, id, &format)
                }
                .with_context(|| format!("Reading text for {id}"))?;
                db::insert_issue(&conn, id, &content)
                    .with_context(|| format!("Saving issue {id} (is its metadata loaded?)"))?;
                pb.inc(1);
            }
            pb.finish_and_clear();
            println!("Saved {} issues.", rows.len());
        }
        Commands::LoadIndexEntries { entries } => {
            let rows = records::open_index_entries(&entries)?;
            let conn = db::connect(&settings.db_path)?;
            let n = db::insert_index_entries(&conn, &rows)?;
            println!("Saved {} index entries.", n);
        }
        Commands::Chunk {
            id,
            json,
            text_format,
        } => {
            let conn = db::connect(&settings.db_path)?;
            let source = DownloadedText {
                root,
                format: text_format
                    .as_deref()
                    .map(TextFormat::from)
                    .unwrap_or_else(|| settings.text_format()),
            };
            let chunks = pages::chunker::chunk_page_text(&conn, &source, &id)?;
            if !json && chunks.is_empty() {
                println!("No pages stored for {id}. Run 'load-pages' first.");
            } else {
                print!("{}", render_chunks(&chunks, json)?);
            }
        }
        Commands::Search { query, limit } => {
            let conn = db::connect(&settings.db_path)?;
            let hits = db::search_issues(&conn, &query, limit)?;
            if hits.is_empty() {
                println!("No matches.");
            }
            for (i, h) in hits.iter().enumerate() {
                println!("{:>3} | {} | {}", i + 1, h.id, truncate(&h.title, 48));
                println!("      {}", h.snippet.replace('\n', " "));
            }
        }
        Commands::Stats => {
            let conn = db::connect(&settings.db_path)?;
            let s = db::get_stats(&conn)?;
            println!("Items:         {}", s.items);
            println!("  dated:       {}", s.dated);
            println!("  indexes:     {}", s.index_items);
            println!("Pages:         {}", s.pages);
            println!("Issues:        {}", s.issues);
            println!("Index entries: {}", s.index_entries);
        }
    }
    Ok(())
}

fn patch_records(rows: &[FieldMap]) -> anyhow::Result<Vec<records::MetadataRow>> {
    let pb = progress_bar(rows.len())?;
    let mut patched = Vec::with_capacity(rows.len());
    for row in rows {
        let item = ItemMetadata::from_fields(row)?;
        patched.push(records::patch_metadata_record(item));
        pb.inc(1);
    }
    pb.finish_and_clear();
    Ok(patched)
}

/// Read, parse and store page metadata for each record. The first failing
/// item aborts the run; items before it stay saved, the failing one saves nothing.
fn add_page_metadata_to_db(
    conn: &rusqlite::Connection,
    rows: &[FieldMap],
    root: &Path,
) -> anyhow::Result<(usize, usize)> {
    let pb = progress_bar(rows.len())?;
    let mut saved = 0;
    for row in rows {
        let id = records::record_id(row)?;
        let item_pages = pages::page_records(id, root).with_context(|| format!("Page metadata for {id}"))?;
        saved += db::replace_item_pages(conn, id, &item_pages)?;
        pb.inc(1);
    }
    pb.finish_and_clear();
    Ok((rows.len(), saved))
}

fn progress_bar(len: usize) -> anyhow::Result<ProgressBar> {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

/// Text view of chunked pages, or a JSON array when `json` is set.
fn render_chunks(chunks: &[ChunkedPageRecord], json: bool) -> anyhow::Result<String> {
    if json {
        return Ok(serde_json::to_string_pretty(chunks)? + "\n");
    }
    let mut out = String::new();
    for c in chunks {
        let label = match c.page.page_num.as_str() {
            "" => "-",
            n => n,
        };
        out += &format!(
            "── page {} (leaf {}, p. {}) ──\n{}\n\n",
            c.page.page_idx, c.page.page_leaf_num, label, c.page_text
        );
    }
    Ok(out)
}

fn truncate(s: &str, max: usize) -> Cow<'_, str> {
    match s.char_indices().nth(max) {
        Some((cut, _)) => Cow::Owned(format!("{}...", &s[..cut])),
        None => Cow::Borrowed(s),
    }
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    let (h, m, s) = (secs / 3600, secs / 60 % 60, secs % 60);
    match (h, m) {
        (0, 0) => format!("{:.1}s", d.as_secs_f64()),
        (0, _) => format!("{m}m {s}s"),
        _ => format!("{h}h {m}m {s}s"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pages::reader::tests::write_item;
    use crate::text::tests::write_gz;

    #[test]
    fn load_then_chunk_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let id = "sim_nq_1850";
        write_item(root, id, &[(1, "", 0.0, 0, 9), (2, "1", 91.0, 9, 28)]);
        write_gz(
            &TextFormat::SearchText.file_path(root, id).unwrap(),
            b" COVER \n NOTES AND QUERIES \n",
        );

        let conn = rusqlite::Connection::open_in_memory().unwrap();
        db::configure(&conn).unwrap();
        db::init_schema(&conn, true).unwrap();

        let mut row = FieldMap::new();
        row.insert("id".into(), id.into());
        let (items, saved) = add_page_metadata_to_db(&conn, &[row], root).unwrap();
        assert_eq!((items, saved), (1, 2));

        let source = DownloadedText { root, format: TextFormat::SearchText };
        let chunks = pages::chunker::chunk_page_text(&conn, &source, id).unwrap();
        let texts: Vec<&str> = chunks.iter().map(|c| c.page_text.as_str()).collect();
        assert_eq!(texts, ["COVER", "NOTES AND QUERIES"]);

        let out = render_chunks(&chunks, true).unwrap();
        let parsed: Vec<serde_json::Value> = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1]["page_text"], "NOTES AND QUERIES");
        assert_eq!(parsed[1]["page_char_end"], 28);
        assert_eq!(parsed[0]["id"], id);
    }

    #[test]
    fn chunk_json_for_unknown_item_is_an_empty_array() {
        let out = render_chunks(&[], true).unwrap();
        let parsed: Vec<serde_json::Value> = serde_json::from_str(&out).unwrap();
        assert!(parsed.is_empty());
    }

    #[test]
    fn text_view_labels_unnumbered_pages() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write_item(root, "x", &[(1, "", 0.0, 0, 5)]);
        write_gz(&TextFormat::SearchText.file_path(root, "x").unwrap(), b"COVER");
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        db::init_schema(&conn, true).unwrap();
        let row = FieldMap::from([("id".to_string(), "x".to_string())]);
        add_page_metadata_to_db(&conn, &[row], root).unwrap();

        let source = DownloadedText { root, format: TextFormat::SearchText };
        let chunks = pages::chunker::chunk_page_text(&conn, &source, "x").unwrap();
        assert_eq!(render_chunks(&chunks, false).unwrap(), "── page 0 (leaf 1, p. -) ──\nCOVER\n\n");
    }

    #[test]
    fn truncate_counts_chars() {
        assert_eq!(truncate("Notes", 10), "Notes");
        assert_eq!(truncate("Ærø Notes", 3), "Ærø...");
    }

    #[test]
    fn failing_item_aborts_batch_without_partial_rows() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write_item(root, "good", &[(1, "1", 1.0, 0, 3)]);

        let conn = rusqlite::Connection::open_in_memory().unwrap();
        db::configure(&conn).unwrap();
        db::init_schema(&conn, true).unwrap();

        let rows: Vec<FieldMap> = ["good", "missing", "never"]
            .iter()
            .map(|id| FieldMap::from([("id".to_string(), id.to_string())]))
            .collect();
        let err = add_page_metadata_to_db(&conn, &rows, root).unwrap_err();
        assert!(err.to_string().contains("missing"));

        use crate::pages::chunker::PageStore;
        assert_eq!(conn.pages_for_item("good").unwrap().len(), 1);
        assert!(conn.pages_for_item("missing").unwrap().is_empty());
    }

    #[test]
    fn duration_formatting() {
        assert_eq!(format_duration(Duration::from_secs(75)), "1m 15s");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h 2m 5s");
    }
}
