pub mod anchors;
pub mod articles;
pub mod boundary;
pub mod document;
pub mod manifest;
pub mod markers;
pub mod notes;
pub mod scanner;
pub mod text;

use std::path::Path;

use crate::error::ExtractError;
use crate::model::{AnnotationKind, Diagnostic, Format, PatristicSource};

use anchors::VerseRef;
use articles::Essay;
use markers::MarkerHit;
use notes::{CrossReference, NoteEntry};

/// One verse as lifted from a book file, before it is attached to a book.
#[derive(Debug, Clone)]
pub struct VerseDraft {
    pub verse: VerseRef,
    pub format: Format,
    pub text: String,
    pub html: String,
    pub markers: Vec<MarkerHit>,
}

/// Everything extracted from one book file. Owned, so files can be processed in parallel.
#[derive(Debug, Clone, Default)]
pub struct FileScan {
    pub file: String,
    pub prefixes: Vec<String>,
    pub verses: Vec<VerseDraft>,
    pub essays: Vec<Essay>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Definition files parsed once per run.
#[derive(Debug, Clone, Default)]
pub struct NoteSet {
    pub notes: Vec<NoteEntry>,
    pub cross_references: Vec<CrossReference>,
    pub sources: Vec<PatristicSource>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Load, scan and render one book file. `Ok(None)` for navigation files.
pub fn process_file(dir: &Path, file: &str) -> Result<Option<FileScan>, ExtractError> {
    match document::load(dir, file)? {
        Some(doc) => scan_document(&doc).map(Some),
        None => Ok(None),
    }
}

/// Essays first, so the verse scan never sees their anchors or text.
pub fn scan_document(doc: &document::Document) -> Result<FileScan, ExtractError> {
    let pass = articles::extract(doc);
    let found = scanner::scan(doc, &pass.excluded)?;
    let mut out = FileScan {
        file: doc.file.clone(),
        prefixes: found.prefixes,
        essays: pass.essays,
        ..Default::default()
    };

    for anchor in found.anchors {
        let span = boundary::resolve(anchor.node, &pass.excluded);
        let rendered = text::render(&span.events, anchor.format == Format::Poetry);
        let marks = markers::collect(&span.events);
        for href in marks.unrecognized {
            out.diagnostics.push(Diagnostic::new(
                "unrecognized-marker",
                anchor.verse.id.as_str(),
                href,
            ));
        }
        tracing::trace!(verse = %anchor.verse.id, end = ?span.end, scope = ?span.scope, "span resolved");
        out.verses.push(VerseDraft {
            verse: anchor.verse,
            format: anchor.format,
            text: rendered.text,
            html: rendered.html,
            markers: marks.hits,
        });
    }

    tracing::debug!(
        file = %out.file,
        verses = out.verses.len(),
        essays = out.essays.len(),
        "scanned"
    );
    Ok(out)
}

/// Parse the definition files. Study notes are required; the other files are
/// reported when absent.
pub fn load_notes(dir: &Path) -> Result<NoteSet, ExtractError> {
    let mut set = NoteSet::default();

    let studies = notes::study_files(dir).map_err(|source| ExtractError::Unreadable {
        path: dir.to_path_buf(),
        source,
    })?;
    if studies.is_empty() {
        return Err(ExtractError::MissingDefinitionFile(dir.join("study1.html")));
    }
    let mut sources: Vec<(String, AnnotationKind)> = studies
        .into_iter()
        .map(|f| (f, AnnotationKind::Study))
        .collect();
    sources.push((notes::LITURGICAL_FILE.into(), AnnotationKind::Liturgical));
    sources.push((notes::VARIANT_FILE.into(), AnnotationKind::Variant));
    sources.push((notes::CITATION_FILE.into(), AnnotationKind::Citation));

    for (file, kind) in sources {
        if let Some(doc) = optional(dir, &file, &mut set.diagnostics)? {
            let entries = notes::parse_definitions(&doc, kind);
            tracing::debug!(file, count = entries.len(), "definitions parsed");
            set.notes.extend(entries);
        }
    }
    if let Some(doc) = optional(dir, notes::CROSS_REFERENCE_FILE, &mut set.diagnostics)? {
        set.cross_references = notes::parse_cross_references(&doc);
    }
    if let Some(doc) = optional(dir, notes::SOURCES_FILE, &mut set.diagnostics)? {
        set.sources = notes::parse_patristic_sources(&doc);
    }

    Ok(set)
}

fn optional(
    dir: &Path,
    file: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<Option<document::Document>, ExtractError> {
    let path = dir.join(file);
    if !path.exists() {
        tracing::warn!(file, "definition file missing");
        diagnostics.push(Diagnostic::new("missing-definition-file", file, "not present"));
        return Ok(None);
    }
    let markup = document::read(&path)?;
    Ok(Some(document::Document::parse(file, &markup)))
}
