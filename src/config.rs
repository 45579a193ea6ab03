use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ::config::{Config, Environment, File};
use serde::Deserialize;

use crate::text::TextFormat;

const ENV_PREFIX: &str = "IA";
const DEFAULT_CONFIG_NAME: &str = "ia_loader";

pub const DEFAULT_FORMATS: &[&str] = &["OCR Search Text", "OCR Page Index", "Page Numbers JSON"];

/// Runtime settings: defaults, then `ia_loader.toml` (or `--config`), then `IA_*` env vars.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub download_dir: PathBuf,
    pub db_path: PathBuf,
    pub archive_url: String,
    pub text_format: String,
    pub formats: Vec<String>,
}

impl Settings {
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("download_dir", "ia-downloads")?
            .set_default("db_path", "data/ia.sqlite")?
            .set_default("archive_url", "https://archive.org")?
            .set_default("text_format", "searchtext")?
            .set_default("formats", DEFAULT_FORMATS.to_vec())?;

        builder = match explicit {
            Some(path) => builder.add_source(File::from(path).required(true)),
            None => builder.add_source(File::with_name(DEFAULT_CONFIG_NAME).required(false)),
        };

        let settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("formats"),
            )
            .build()
            .context("Failed to load settings")?;

        settings
            .try_deserialize()
            .context("Invalid settings")
    }

    pub fn text_format(&self) -> TextFormat {
        TextFormat::from(self.text_format.as_str())
    }
}
