use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

const CONFIG_FILE: &str = "osb";
const ENV_PREFIX: &str = "OSB";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_epub_dir")]
    pub epub_dir: PathBuf,
    #[serde(default = "default_clean_db")]
    pub clean_db: PathBuf,
    #[serde(default = "default_raw_db")]
    pub raw_db: PathBuf,
    /// Max sample ids printed per report category.
    #[serde(default = "default_sample_cap")]
    pub sample_cap: usize,
    #[serde(default = "default_parallel")]
    pub parallel: bool,
    /// Annotation ids documented as resolving to no passage.
    #[serde(default)]
    pub known_orphans: Vec<String>,
    /// Passage ids documented as missing from the source.
    #[serde(default)]
    pub known_gaps: Vec<String>,
}

fn default_epub_dir() -> PathBuf {
    PathBuf::from("epub_extracted")
}
fn default_clean_db() -> PathBuf {
    PathBuf::from("data/osb_clean.sqlite")
}
fn default_raw_db() -> PathBuf {
    PathBuf::from("data/osb_raw.sqlite")
}
fn default_sample_cap() -> usize {
    5
}
fn default_parallel() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            epub_dir: default_epub_dir(),
            clean_db: default_clean_db(),
            raw_db: default_raw_db(),
            sample_cap: default_sample_cap(),
            parallel: default_parallel(),
            known_orphans: Vec::new(),
            known_gaps: Vec::new(),
        }
    }
}

impl Settings {
    /// Defaults, then `osb.toml` (if present), then `OSB_*` environment variables.
    pub fn load() -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(CONFIG_FILE).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("known_orphans")
                    .with_list_parse_key("known_gaps"),
            )
            .build()
            .context("Failed to assemble settings")?;
        settings
            .try_deserialize()
            .context("Invalid settings in osb.toml or OSB_* environment")
    }

    pub fn oebps_dir(&self) -> PathBuf {
        self.epub_dir.join("OEBPS")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_source_falls_back_to_defaults() {
        let settings: Settings = config::Config::builder()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(settings.epub_dir, PathBuf::from("epub_extracted"));
        assert_eq!(settings.sample_cap, 5);
        assert!(settings.parallel);
        assert!(settings.known_orphans.is_empty());
    }

    #[test]
    fn overrides_apply_per_key() {
        let settings: Settings = config::Config::builder()
            .set_override("sample_cap", 12)
            .unwrap()
            .set_override("epub_dir", "/tmp/osb")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(settings.sample_cap, 12);
        assert_eq!(settings.oebps_dir(), PathBuf::from("/tmp/osb/OEBPS"));
        assert_eq!(settings.raw_db, PathBuf::from("data/osb_raw.sqlite"));
    }
}
