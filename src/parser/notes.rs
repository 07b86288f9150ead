use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Selector};

use super::anchors::{fragment, is_anchor_candidate};
use super::boundary::subtree_events;
use super::document::{plain_text, Document};
use super::text::{self, render};
use crate::model::{AnnotationKind, PatristicSource};

pub const LITURGICAL_FILE: &str = "x-liturgical.html";
pub const VARIANT_FILE: &str = "variant.html";
pub const CITATION_FILE: &str = "citation.html";
pub const CROSS_REFERENCE_FILE: &str = "crossReference.html";
pub const SOURCES_FILE: &str = "Source_Abbreviations.html";

static DEFINITION_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.footnotedef, div.footnotepara").unwrap());
static LINK_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").unwrap());
static CROSS_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div[id]").unwrap());
static ROW_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());
static CELL_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").unwrap());

static STUDY_FILE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^study(\d+)\.html$").unwrap());
static CROSS_ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^fcross\d+$").unwrap());
static PAREN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\(([^)]+)\)").unwrap());
static CITATION_SPLIT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[,;\s]+").unwrap());

const CITATION_FILLER: &[&str] = &["and", "or", "cf", "cf.", "see", "also"];

/// One definition entry from a note file, before it is joined to passages.
#[derive(Debug, Clone)]
pub struct NoteEntry {
    pub id: String,
    pub kind: AnnotationKind,
    pub label: String,
    pub text: String,
    pub html: String,
    pub plain: String,
    /// Verse tokens linked from the note, unresolved.
    pub links: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CrossReference {
    pub id: String,
    pub text: String,
    pub targets: Vec<String>,
}

/// `study{N}.html` files present in the directory, in numeric order.
pub fn study_files(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut found: Vec<(u32, String)> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter_map(|name| {
            let n = STUDY_FILE_RE.captures(&name)?.get(1)?.as_str().parse().ok()?;
            Some((n, name))
        })
        .collect();
    found.sort();
    Ok(found.into_iter().map(|(_, name)| name).collect())
}

pub fn parse_definitions(doc: &Document, kind: AnnotationKind) -> Vec<NoteEntry> {
    doc.html
        .select(&DEFINITION_SEL)
        .filter_map(|div| {
            let id = div.value().id()?.to_string();
            let label = div
                .select(&LINK_SEL)
                .next()
                .map(|a| text::normalize_plain(&plain_text(a)))
                .unwrap_or_default();
            Some(NoteEntry {
                id,
                kind,
                label,
                text: render(&subtree_events(*div), false).text,
                html: div.html(),
                plain: plain_text(div),
                links: verse_links(div),
            })
        })
        .collect()
}

pub fn parse_cross_references(doc: &Document) -> Vec<CrossReference> {
    doc.html
        .select(&CROSS_SEL)
        .filter_map(|div| {
            let id = div.value().id().filter(|id| CROSS_ID_RE.is_match(id))?;
            Some(CrossReference {
                id: id.to_string(),
                text: render(&subtree_events(*div), false).text,
                targets: verse_links(div),
            })
        })
        .collect()
}

/// Rows of the source abbreviation table as (abbreviation, full name).
pub fn parse_patristic_sources(doc: &Document) -> Vec<PatristicSource> {
    let mut seen = HashSet::new();
    doc.html
        .select(&ROW_SEL)
        .filter_map(|row| {
            let cells: Vec<ElementRef<'_>> = row.select(&CELL_SEL).collect();
            if cells.len() < 2 {
                return None;
            }
            let name = text::normalize_plain(&plain_text(cells[0]));
            let id = text::normalize_plain(&plain_text(cells[1]));
            if name.is_empty() || id.is_empty() || name == "Source" {
                return None;
            }
            seen.insert(id.clone()).then_some(PatristicSource { id, name })
        })
        .collect()
}

/// Parenthesized source abbreviations in note text, first occurrence order.
pub fn patristic_citations(plain: &str, known: &HashSet<&str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for caps in PAREN_RE.captures_iter(plain) {
        for part in CITATION_SPLIT_RE.split(&caps[1]) {
            let part = part.trim();
            if part.is_empty() || CITATION_FILLER.contains(&part.to_lowercase().as_str()) {
                continue;
            }
            if known.contains(part) && !out.iter().any(|c| c == part) {
                out.push(part.to_string());
            }
        }
    }
    out
}

fn verse_links(el: ElementRef<'_>) -> Vec<String> {
    el.select(&LINK_SEL)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(fragment)
        .filter(|f| is_anchor_candidate(f))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_definition_entries() {
        let doc = Document::parse(
            "study1.html",
            r#"<div class="footnotedef" id="f1"><a href="Genesis.html#fn1">1:1</a> <b>God</b> made all things (BasilG; cf. JohnChr, BasilG). See <a href="John.html#John_vchap1-1">Jn 1:1</a>.</div>
               <div class="footnotepara" id="f2"><a href="Genesis.html#fn2">1:2</a> More.</div>
               <div class="footnotedef">no id</div>"#,
        );
        let notes = parse_definitions(&doc, AnnotationKind::Study);
        assert_eq!(notes.len(), 2);
        let n = &notes[0];
        assert_eq!(n.id, "f1");
        assert_eq!(n.label, "1:1");
        assert!(n.text.starts_with("1:1 <b>God</b> made all things"));
        assert_eq!(n.links, ["John_vchap1-1"]);
        let known = HashSet::from(["BasilG", "JohnChr"]);
        assert_eq!(patristic_citations(&n.plain, &known), ["BasilG", "JohnChr"]);
    }

    #[test]
    fn patristic_citations_skip_filler_and_unknowns() {
        let known = HashSet::from(["AthanG"]);
        assert_eq!(
            patristic_citations("x (see also AthanG and Zzz) y (cf AthanG)", &known),
            ["AthanG"]
        );
        assert!(patristic_citations("no parentheses", &known).is_empty());
    }

    #[test]
    fn cross_references_keep_verse_targets() {
        let doc = Document::parse(
            "crossReference.html",
            r#"<div id="fcross1"><a href="Genesis.html#fcross1">1:1</a> <a href="John.html#John_vchap1-1">Jn 1:1</a>; <a href="Hebrews.html#Heb_vchap11-3">Heb 11:3</a></div>
               <div id="other">ignored</div>"#,
        );
        let refs = parse_cross_references(&doc);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].targets, ["John_vchap1-1", "Heb_vchap11-3"]);
        assert_eq!(refs[0].text, "1:1 Jn 1:1; Heb 11:3");
    }

    #[test]
    fn source_table_skips_header_and_duplicates() {
        let doc = Document::parse(
            "Source_Abbreviations.html",
            r#"<table><tr><td>Source</td><td>Abbreviation</td></tr>
               <tr><td>St. Basil the Great</td><td>BasilG</td></tr>
               <tr><td>Basil again</td><td>BasilG</td></tr>
               <tr><td>lonely cell</td></tr></table>"#,
        );
        let sources = parse_patristic_sources(&doc);
        assert_eq!(
            sources,
            [PatristicSource {
                id: "BasilG".into(),
                name: "St. Basil the Great".into()
            }]
        );
    }
}
