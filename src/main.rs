mod assemble;
mod config;
mod db;
mod error;
mod model;
mod parser;
mod pipeline;
mod validate;

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Instant;

use chrono::Utc;
use clap::{Parser, Subcommand};
use itertools::Itertools;

use crate::config::Settings;
use crate::db::Stores;
use crate::model::Corpus;
use crate::validate::{Context, Reference, Report};

#[derive(Parser)]
#[command(name = "osb_extract", about = "Orthodox Study Bible EPUB extraction and validation")]
struct Cli {
    /// Extracted EPUB directory (the one holding OEBPS/)
    #[arg(long, global = true)]
    epub_dir: Option<PathBuf>,
    /// Clean-text SQLite database
    #[arg(long, global = true)]
    clean_db: Option<PathBuf>,
    /// Raw-markup SQLite database
    #[arg(long, global = true)]
    raw_db: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse the EPUB and write both stores
    Extract,
    /// Validate the stored corpus; fails when any issue is found
    Validate {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Extract, then validate the freshly written stores
    Run {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show store statistics
    Stats,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let mut settings = Settings::load()?;
    if let Some(dir) = cli.epub_dir {
        settings.epub_dir = dir;
    }
    if let Some(path) = cli.clean_db {
        settings.clean_db = path;
    }
    if let Some(path) = cli.raw_db {
        settings.raw_db = path;
    }

    let result = match cli.command {
        Commands::Extract => {
            let stores = Stores::open(&settings.clean_db, &settings.raw_db)?;
            let corpus = run_extract(&settings, &stores)?;
            print_summary(&corpus, &settings);
            Ok(())
        }
        Commands::Validate { json } => validate_stored(&settings, json),
        Commands::Run { json } => {
            let stores = Stores::open(&settings.clean_db, &settings.raw_db)?;

            // Phase 1: Extract
            let t_extract = Instant::now();
            let corpus = run_extract(&settings, &stores)?;
            println!("Extracted in {:.1}s", t_extract.elapsed().as_secs_f64());
            print_summary(&corpus, &settings);

            // Phase 2: Validate what was written, not what is in memory
            let stored = db::load_corpus(&stores)?;
            let report = run_validate(&stored, &stores, &settings, json)?;
            gate(&report)
        }
        Commands::Stats => {
            let stores = Stores::open(&settings.clean_db, &settings.raw_db)?;
            let s = db::get_stats(&stores)?;
            println!("Books:       {}", s.books);
            println!("Passages:    {} (raw: {})", s.passages, s.raw_passages);
            println!("Annotations: {}", s.annotations.iter().map(|(_, n)| n).sum::<i64>());
            for (kind, n) in &s.annotations {
                println!("  {:<11} {}", kind, n);
            }
            println!("Sources:     {}", s.patristic_sources);
            println!("Orphans:     {}", s.orphans);
            println!("Diagnostics: {}", s.diagnostics);
            println!("Last run:    {}", s.last_run.as_deref().unwrap_or("never"));
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn run_extract(settings: &Settings, stores: &Stores) -> anyhow::Result<Corpus> {
    let started = Utc::now();
    let dir = settings.oebps_dir();
    println!("Extracting from {} ...", dir.display());
    let corpus = pipeline::extract(&dir, settings.parallel)?;

    let saved = db::save_corpus(stores, &corpus)?;
    let run_id = db::record_run(&stores.clean, started, Utc::now(), &corpus)?;
    tracing::info!(
        run = run_id,
        books = saved.books,
        passages = saved.passages,
        annotations = saved.annotations,
        sources = saved.patristic_sources,
        "stores written"
    );
    Ok(corpus)
}

fn run_validate(corpus: &Corpus, stores: &Stores, settings: &Settings, json: bool) -> anyhow::Result<Report> {
    let raw_keys = db::key_sets(&stores.raw)?;
    let reference = Reference::osb();
    let ctx = Context::new(corpus, &reference, settings).with_raw_keys(&raw_keys);
    let report = validate::validate(&ctx);
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        report.print();
    }
    Ok(report)
}

/// Validate whatever the stores hold. An empty store never passes the gate.
fn validate_stored(settings: &Settings, json: bool) -> anyhow::Result<()> {
    let stores = Stores::open(&settings.clean_db, &settings.raw_db)?;
    let corpus = db::load_corpus(&stores)?;
    if corpus.passages.is_empty() {
        anyhow::bail!(
            "no passages stored in {}; run 'extract' first",
            settings.clean_db.display()
        );
    }
    let report = run_validate(&corpus, &stores, settings, json)?;
    gate(&report)
}

/// Promotion gate: warnings never fail a run, issues always do.
fn gate(report: &Report) -> anyhow::Result<()> {
    if !report.is_clean() {
        anyhow::bail!("validation found {} issue(s)", report.issues.len());
    }
    Ok(())
}

fn print_summary(corpus: &Corpus, settings: &Settings) {
    println!(
        "Saved {} books, {} passages, {} annotations, {} patristic sources.",
        corpus.books.len(),
        corpus.passages.len(),
        corpus.annotations.len(),
        corpus.patristic_sources.len(),
    );
    for (kind, n) in corpus.annotation_counts() {
        println!("  {:<11} {}", kind.as_str(), n);
    }

    let known: HashSet<&str> = settings.known_orphans.iter().map(String::as_str).collect();
    let documented = corpus.orphans.iter().filter(|id| known.contains(id.as_str())).count();
    println!(
        "\nOrphans: {} ({} documented, {} new)",
        corpus.orphans.len(),
        documented,
        corpus.orphans.len() - documented
    );
    for id in &corpus.orphans {
        let tag = if known.contains(id.as_str()) { "" } else { "  [new]" };
        println!("  {}{}", id, tag);
    }

    if !corpus.diagnostics.is_empty() {
        println!("\nDiagnostics: {}", corpus.diagnostics.len());
        let by_category = corpus.diagnostics.iter().counts_by(|d| d.category.as_str());
        for (category, n) in by_category.into_iter().sorted() {
            let first = corpus
                .diagnostics
                .iter()
                .find(|d| d.category == category)
                .map(|d| truncate(&format!("{}: {}", d.subject, d.detail), 60))
                .unwrap_or_default();
            println!("  {:<28} {:>5}  e.g. {}", category, n, first);
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
