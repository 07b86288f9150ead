mod integrity;
mod quality;
pub mod reference;
mod structure;

use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::config::Settings;
use crate::db::KeySets;
use crate::model::{Annotation, Book, Corpus, Passage};
pub use reference::Reference;

static STYLE_TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"</?[ib]>").unwrap());
static PASSAGE_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z0-9]+)_vchap(\d+)-(\d+)$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Issue,
    Warning,
}

#[derive(Debug, Clone, Serialize)]
pub struct Finding {
    pub severity: Severity,
    pub category: String,
    pub count: usize,
    pub message: String,
    pub samples: Vec<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct Report {
    pub issues: Vec<Finding>,
    pub warnings: Vec<Finding>,
}

impl Report {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn print(&self) {
        println!(
            "Validation: {} issue(s), {} warning(s)",
            self.issues.len(),
            self.warnings.len()
        );
        for (title, findings) in [("ISSUES", &self.issues), ("WARNINGS", &self.warnings)] {
            println!("\n{} ({})", title, findings.len());
            if findings.is_empty() {
                println!("  none");
            }
            for f in findings {
                println!("  [{}] {} × {}", f.category, f.count, f.message);
                if !f.samples.is_empty() {
                    println!("      e.g. {}", f.samples.join(", "));
                }
            }
        }
    }
}

/// Everything a check may read. Built once, shared read-only by all checks.
pub struct Context<'a> {
    pub corpus: &'a Corpus,
    pub reference: &'a Reference,
    pub raw_keys: Option<&'a KeySets>,
    pub known_orphans: HashSet<&'a str>,
    pub known_gaps: HashSet<&'a str>,
    pub sample_cap: usize,
    pub passages: HashMap<&'a str, &'a Passage>,
    pub annotations: HashMap<&'a str, &'a Annotation>,
    pub books: HashMap<&'a str, &'a Book>,
}

impl<'a> Context<'a> {
    pub fn new(corpus: &'a Corpus, reference: &'a Reference, settings: &'a Settings) -> Self {
        Context {
            corpus,
            reference,
            raw_keys: None,
            known_orphans: settings.known_orphans.iter().map(String::as_str).collect(),
            known_gaps: settings.known_gaps.iter().map(String::as_str).collect(),
            sample_cap: settings.sample_cap,
            passages: corpus.passages.iter().map(|p| (p.id.as_str(), p)).collect(),
            annotations: corpus.annotations.iter().map(|a| (a.id.as_str(), a)).collect(),
            books: corpus.books.iter().map(|b| (b.id.as_str(), b)).collect(),
        }
    }

    /// Compare the clean corpus against the raw copy's key sets.
    pub fn with_raw_keys(mut self, keys: &'a KeySets) -> Self {
        self.raw_keys = Some(keys);
        self
    }

    fn finding(
        &self,
        severity: Severity,
        category: &str,
        message: impl Into<String>,
        offenders: Vec<String>,
    ) -> Option<Finding> {
        if offenders.is_empty() {
            return None;
        }
        Some(Finding {
            severity,
            category: category.to_string(),
            count: offenders.len(),
            message: message.into(),
            samples: offenders.into_iter().take(self.sample_cap).collect(),
        })
    }

    pub fn issue(&self, category: &str, message: impl Into<String>, offenders: Vec<String>) -> Option<Finding> {
        self.finding(Severity::Issue, category, message, offenders)
    }

    pub fn warning(&self, category: &str, message: impl Into<String>, offenders: Vec<String>) -> Option<Finding> {
        self.finding(Severity::Warning, category, message, offenders)
    }
}

type Check = fn(&Context<'_>) -> Vec<Finding>;

const CHECKS: &[(&str, Check)] = &[
    ("required fields", integrity::required_fields),
    ("duplicate ids", integrity::duplicate_ids),
    ("referential integrity", integrity::referential),
    ("bidirectional links", integrity::bidirectional),
    ("patristic citations", integrity::patristic),
    ("store parity", integrity::store_parity),
    ("empty books", integrity::empty_books),
    ("id format", integrity::id_format),
    ("id/field agreement", integrity::id_fields),
    ("abbreviation map", integrity::abbreviations),
    ("text leaks", quality::text_leaks),
    ("encoding", quality::encoding),
    ("duplicate text", quality::duplicate_text),
    ("truncation", quality::truncation),
    ("label prefix", quality::label_prefix),
    ("sequence gaps", structure::sequence_gaps),
    ("chapter counts", structure::chapter_counts),
    ("format distribution", structure::format_distribution),
    ("multi-text split", structure::multi_text_split),
    ("self references", structure::self_references),
    ("annotation density", structure::density),
    ("orphans", structure::orphans),
    ("extraction diagnostics", structure::diagnostics),
];

fn run_check(ctx: &Context<'_>, name: &str, check: Check) -> Vec<Finding> {
    let findings = check(ctx);
    tracing::debug!(check = name, findings = findings.len(), "check finished");
    findings
}

#[cfg(feature = "rayon")]
fn run_all(ctx: &Context<'_>) -> Vec<Finding> {
    CHECKS
        .par_iter()
        .flat_map_iter(|(name, check)| run_check(ctx, name, *check))
        .collect()
}

#[cfg(not(feature = "rayon"))]
fn run_all(ctx: &Context<'_>) -> Vec<Finding> {
    CHECKS
        .iter()
        .flat_map(|(name, check)| run_check(ctx, name, *check))
        .collect()
}

/// Run every check and partition the findings by severity.
pub fn validate(ctx: &Context<'_>) -> Report {
    let mut findings = run_all(ctx);
    findings.sort_by(|a, b| a.category.cmp(&b.category).then_with(|| a.message.cmp(&b.message)));
    let (issues, warnings) = findings
        .into_iter()
        .partition(|f| f.severity == Severity::Issue);
    let report = Report { issues, warnings };
    tracing::info!(
        issues = report.issues.len(),
        warnings = report.warnings.len(),
        "validation finished"
    );
    report
}

/// Text with the two preserved style tags removed.
pub(crate) fn strip_style(text: &str) -> Cow<'_, str> {
    STYLE_TAG_RE.replace_all(text, "")
}

/// `(prefix, chapter, verse)` embedded in a passage id, for cross-checking the typed fields.
pub(crate) fn split_passage_id(id: &str) -> Option<(&str, u32, u32)> {
    let caps = PASSAGE_ID_RE.captures(id)?;
    Some((
        caps.get(1)?.as_str(),
        caps[2].parse().ok()?,
        caps[3].parse().ok()?,
    ))
}
