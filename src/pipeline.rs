use std::path::Path;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::assemble::{assemble, Extraction};
use crate::error::ExtractError;
use crate::model::Corpus;
use crate::parser::{self, manifest, FileScan};

/// Manifest, every book file, the definition files, then the global join.
pub fn extract(dir: &Path, parallel: bool) -> Result<Corpus> {
    let groups = manifest::load(dir)?;
    let files: Vec<&str> = groups
        .iter()
        .flat_map(|g| g.files.iter().map(String::as_str))
        .collect();
    tracing::info!(books = groups.len(), files = files.len(), dir = %dir.display(), "manifest loaded");

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")
            .context("Invalid progress template")?
            .progress_chars("#>-"),
    );
    let results = if parallel {
        scan_parallel(dir, &files, &pb)
    } else {
        scan_sequential(dir, &files, &pb)
    };
    pb.finish_and_clear();

    let scans: Vec<FileScan> = results
        .into_iter()
        .collect::<Result<Vec<_>, ExtractError>>()?
        .into_iter()
        .flatten()
        .collect();
    let skipped = files.len() - scans.len();
    tracing::info!(scanned = scans.len(), skipped, "book files scanned");

    let notes = parser::load_notes(dir)?;
    tracing::info!(
        notes = notes.notes.len(),
        cross_references = notes.cross_references.len(),
        sources = notes.sources.len(),
        "definition files parsed"
    );

    let corpus = assemble(Extraction { groups, scans, notes })
        .with_context(|| format!("Failed to assemble corpus from {}", dir.display()))?;
    Ok(corpus)
}

type ScanResult = Result<Option<FileScan>, ExtractError>;

fn scan_one(dir: &Path, file: &str, pb: &ProgressBar) -> ScanResult {
    let result = parser::process_file(dir, file);
    if let Ok(None) = result {
        tracing::debug!(file, "navigation file skipped");
    }
    pb.inc(1);
    result
}

#[cfg(feature = "rayon")]
fn scan_parallel(dir: &Path, files: &[&str], pb: &ProgressBar) -> Vec<ScanResult> {
    files.par_iter().map(|f| scan_one(dir, f, pb)).collect()
}

#[cfg(not(feature = "rayon"))]
fn scan_parallel(dir: &Path, files: &[&str], pb: &ProgressBar) -> Vec<ScanResult> {
    scan_sequential(dir, files, pb)
}

fn scan_sequential(dir: &Path, files: &[&str], pb: &ProgressBar) -> Vec<ScanResult> {
    files.iter().map(|f| scan_one(dir, f, pb)).collect()
}
