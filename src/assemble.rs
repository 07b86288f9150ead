use std::collections::{HashMap, HashSet};

use crate::error::ExtractError;
use crate::model::{
    Annotation, AnnotationKind, AnnotationMarker, Book, Corpus, Diagnostic, Passage,
};
use crate::parser::anchors::Registry;
use crate::parser::manifest::BookGroup;
use crate::parser::markers::MarkerKind;
use crate::parser::notes::{patristic_citations, CrossReference};
use crate::parser::{FileScan, NoteSet, VerseDraft};

/// Display names for texts that share one source file.
const MULTI_TEXT_NAMES: &[(&str, &str)] = &[
    ("Sus", "Susanna"),
    ("Dan", "Daniel"),
    ("Bel", "Bel and the Dragon"),
];

/// Raw per-file output of a run, ready to be joined into one corpus.
#[derive(Debug, Default)]
pub struct Extraction {
    pub groups: Vec<BookGroup>,
    pub scans: Vec<FileScan>,
    pub notes: NoteSet,
}

pub fn assemble(ex: Extraction) -> Result<Corpus, ExtractError> {
    let Extraction {
        groups,
        scans,
        notes,
    } = ex;
    let mut corpus = Corpus::default();
    corpus.diagnostics.extend(notes.diagnostics);
    for scan in &scans {
        corpus.diagnostics.extend(scan.diagnostics.iter().cloned());
    }

    let by_file: HashMap<&str, &FileScan> = scans.iter().map(|s| (s.file.as_str(), s)).collect();
    let registry = build_books(&groups, &by_file, &mut corpus);
    tracing::debug!(books = corpus.books.len(), abbreviations = registry.len(), "books registered");

    let cross_refs: HashMap<&str, &CrossReference> = notes
        .cross_references
        .iter()
        .map(|c| (c.id.as_str(), c))
        .collect();
    let mut seen = HashSet::new();
    for group in &groups {
        for file in &group.files {
            let Some(scan) = by_file.get(file.as_str()) else {
                continue;
            };
            for draft in &scan.verses {
                let Some(book_id) = registry.book_for(&draft.verse.abbreviation) else {
                    return Err(ExtractError::UnknownAbbreviation {
                        id: draft.verse.id.clone(),
                        file: file.clone(),
                        abbreviation: draft.verse.abbreviation.clone(),
                    });
                };
                if !seen.insert(draft.verse.id.clone()) {
                    corpus.diagnostics.push(Diagnostic::new(
                        "duplicate-anchor",
                        draft.verse.id.as_str(),
                        format!("repeated in {}; first occurrence kept", file),
                    ));
                    continue;
                }
                let passage = build_passage(draft, book_id, &cross_refs, &registry, &mut corpus.diagnostics);
                corpus.passages.push(passage);
            }
        }
    }

    let known: HashSet<&str> = notes.sources.iter().map(|s| s.id.as_str()).collect();
    let mut note_ids = HashSet::new();
    for note in notes.notes {
        if !note_ids.insert(note.id.clone()) {
            corpus
                .diagnostics
                .push(Diagnostic::new("duplicate-note", note.id.as_str(), "first definition kept"));
            continue;
        }
        let scripture_refs = resolve_links(&note.id, &note.links, &registry, &mut corpus.diagnostics);
        corpus.annotations.push(Annotation {
            patristic_citations: patristic_citations(&note.plain, &known),
            id: note.id,
            kind: note.kind,
            passage_ids: Vec::new(),
            verse_display: note.label,
            text: note.text,
            html: note.html,
            scripture_refs,
        });
    }

    attach_essays(&groups, &by_file, &registry, &known, &mut note_ids, &mut corpus);
    join_markers(&mut corpus);

    corpus.orphans = corpus
        .annotations
        .iter()
        .filter(|a| a.passage_ids.is_empty())
        .map(|a| a.id.clone())
        .collect();
    corpus.patristic_sources = notes.sources;

    tracing::info!(
        books = corpus.books.len(),
        passages = corpus.passages.len(),
        annotations = corpus.annotations.len(),
        orphans = corpus.orphans.len(),
        diagnostics = corpus.diagnostics.len(),
        "corpus assembled"
    );
    Ok(corpus)
}

/// One book per manifest group, or one per prefix when a file holds several texts.
fn build_books(groups: &[BookGroup], by_file: &HashMap<&str, &FileScan>, corpus: &mut Corpus) -> Registry {
    let mut registry = Registry::default();
    for group in groups {
        let mut prefixes: Vec<&str> = Vec::new();
        for scan in group.files.iter().filter_map(|f| by_file.get(f.as_str())) {
            for p in &scan.prefixes {
                if !prefixes.contains(&p.as_str()) {
                    prefixes.push(p);
                }
            }
        }

        let books: Vec<Book> = if prefixes.len() > 1 {
            prefixes
                .iter()
                .enumerate()
                .map(|(i, abbr)| Book {
                    id: abbr.to_lowercase(),
                    name: MULTI_TEXT_NAMES
                        .iter()
                        .find(|(a, _)| a == abbr)
                        .map(|(_, name)| name.to_string())
                        .unwrap_or_else(|| abbr.to_string()),
                    abbreviations: vec![abbr.to_string()],
                    order: group.order,
                    part: i as u32 + 1,
                    testament: group.testament,
                    files: group.files.clone(),
                })
                .collect()
        } else {
            vec![Book {
                id: group.id.clone(),
                name: group.name.clone(),
                abbreviations: prefixes.iter().map(|p| p.to_string()).collect(),
                order: group.order,
                part: 0,
                testament: group.testament,
                files: group.files.clone(),
            }]
        };

        for book in books {
            for abbr in &book.abbreviations {
                match registry.book_for(abbr) {
                    Some(existing) if existing != book.id => {
                        corpus.diagnostics.push(Diagnostic::new(
                            "abbreviation-collision",
                            abbr.as_str(),
                            format!("claimed by {} and {}", existing, book.id),
                        ));
                    }
                    _ => registry.insert(abbr, &book.id),
                }
            }
            if prefixes.len() > 1 {
                tracing::debug!(book = %book.id, part = book.part, "multi-text book split");
            }
            corpus.books.push(book);
        }
    }
    registry
}

fn build_passage(
    draft: &VerseDraft,
    book_id: &str,
    cross_refs: &HashMap<&str, &CrossReference>,
    registry: &Registry,
    diagnostics: &mut Vec<Diagnostic>,
) -> Passage {
    let mut passage = Passage {
        id: draft.verse.id.clone(),
        book_id: book_id.to_string(),
        chapter: draft.verse.chapter,
        verse: draft.verse.verse,
        text: draft.text.clone(),
        html: draft.html.clone(),
        format: draft.format,
        study_note_ids: Vec::new(),
        liturgical_ids: Vec::new(),
        variant_ids: Vec::new(),
        citation_ids: Vec::new(),
        article_ids: Vec::new(),
        cross_ref_targets: Vec::new(),
        cross_ref_text: None,
        annotation_markers: Vec::new(),
    };

    for hit in &draft.markers {
        match hit.kind {
            MarkerKind::Annotation(kind) => {
                push_unique(passage.ids_for_mut(kind), &hit.id);
                passage.annotation_markers.push(AnnotationMarker {
                    id: hit.id.clone(),
                    kind,
                    preceding: hit.preceding.clone(),
                });
            }
            MarkerKind::CrossReference => match cross_refs.get(hit.id.as_str()) {
                Some(cr) => {
                    for target in resolve_links(&passage.id, &cr.targets, registry, diagnostics) {
                        push_unique(&mut passage.cross_ref_targets, &target);
                    }
                    if passage.cross_ref_text.is_none() && !cr.text.is_empty() {
                        passage.cross_ref_text = Some(cr.text.clone());
                    }
                }
                None => diagnostics.push(Diagnostic::new(
                    "missing-cross-reference",
                    passage.id.as_str(),
                    hit.id.as_str(),
                )),
            },
            MarkerKind::Translation | MarkerKind::Background => {}
        }
    }
    passage
}

/// Essays link forward to the first verse after them; essays with no such verse stay orphaned.
fn attach_essays(
    groups: &[BookGroup],
    by_file: &HashMap<&str, &FileScan>,
    registry: &Registry,
    known: &HashSet<&str>,
    ids: &mut HashSet<String>,
    corpus: &mut Corpus,
) {
    let passage_index: HashMap<String, usize> = corpus
        .passages
        .iter()
        .enumerate()
        .map(|(i, p)| (p.id.clone(), i))
        .collect();

    let scans = groups
        .iter()
        .flat_map(|g| g.files.iter())
        .filter_map(|f| by_file.get(f.as_str()));
    for scan in scans {
        for essay in &scan.essays {
            if !ids.insert(essay.id.clone()) {
                corpus.diagnostics.push(Diagnostic::new(
                    "duplicate-article",
                    essay.id.as_str(),
                    format!("repeated in {}; first kept", scan.file),
                ));
                continue;
            }
            let target = essay
                .following
                .as_deref()
                .and_then(|f| passage_index.get(f).copied());
            let (passage_ids, verse_display) = match target {
                Some(i) => {
                    let p = &mut corpus.passages[i];
                    push_unique(&mut p.article_ids, &essay.id);
                    (vec![p.id.clone()], format!("{}:{}", p.chapter, p.verse))
                }
                None => {
                    tracing::debug!(article = %essay.id, title = %essay.title, file = %scan.file, "article has no following verse");
                    (Vec::new(), String::new())
                }
            };
            let scripture_refs = resolve_links(&essay.id, &essay.links, registry, &mut corpus.diagnostics);
            corpus.annotations.push(Annotation {
                id: essay.id.clone(),
                kind: AnnotationKind::Article,
                passage_ids,
                verse_display,
                text: essay.text.clone(),
                html: essay.html.clone(),
                patristic_citations: patristic_citations(&essay.text, known),
                scripture_refs,
            });
        }
    }
}

/// Fill `passage_ids` on every annotation from the markers recorded on passages.
fn join_markers(corpus: &mut Corpus) {
    let index: HashMap<String, usize> = corpus
        .annotations
        .iter()
        .enumerate()
        .map(|(i, a)| (a.id.clone(), i))
        .collect();

    for passage in &corpus.passages {
        for (kind, id) in passage.all_annotation_ids() {
            if kind == AnnotationKind::Article {
                continue;
            }
            match index.get(id).map(|&i| &mut corpus.annotations[i]) {
                Some(annotation) if annotation.kind == kind => {
                    push_unique(&mut annotation.passage_ids, &passage.id);
                }
                Some(annotation) => corpus.diagnostics.push(Diagnostic::new(
                    "marker-kind-mismatch",
                    passage.id.as_str(),
                    format!("{} marked as {} but defined as {}", id, kind.as_str(), annotation.kind.as_str()),
                )),
                None => corpus.diagnostics.push(Diagnostic::new(
                    "dangling-marker",
                    passage.id.as_str(),
                    format!("{} {} has no definition", kind.as_str(), id),
                )),
            }
        }
    }
}

/// Keep link targets that name a known book; report the rest against `owner`.
fn resolve_links(
    owner: &str,
    links: &[String],
    registry: &Registry,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<String> {
    let mut out = Vec::new();
    for link in links {
        match registry.resolve(link) {
            Some(r) => push_unique(&mut out, &r.id),
            None => diagnostics.push(Diagnostic::new("unresolved-scripture-ref", owner, link.as_str())),
        }
    }
    out
}

fn push_unique(list: &mut Vec<String>, id: &str) {
    if !list.iter().any(|x| x == id) {
        list.push(id.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Format, Testament};
    use crate::parser::anchors::VerseRef;
    use crate::parser::markers::MarkerHit;
    use crate::parser::notes::NoteEntry;

    fn draft(id: &str, markers: Vec<MarkerHit>) -> VerseDraft {
        VerseDraft {
            verse: VerseRef::parse(id).unwrap(),
            format: Format::Prose,
            text: format!("text of {id}"),
            html: String::new(),
            markers,
        }
    }

    fn study(id: &str) -> MarkerHit {
        MarkerHit {
            kind: MarkerKind::Annotation(AnnotationKind::Study),
            id: id.into(),
            preceding: String::new(),
        }
    }

    fn note(id: &str) -> NoteEntry {
        NoteEntry {
            id: id.into(),
            kind: AnnotationKind::Study,
            label: "1:1".into(),
            text: "1:1 note".into(),
            html: String::new(),
            plain: "1:1 note".into(),
            links: vec!["Dan_vchap1-1".into(), "Zzz_vchap1-1".into()],
        }
    }

    fn daniel() -> Extraction {
        Extraction {
            groups: vec![BookGroup {
                id: "daniel".into(),
                name: "Daniel".into(),
                order: 33,
                testament: Testament::Old,
                files: vec!["Daniel.html".into()],
            }],
            scans: vec![FileScan {
                file: "Daniel.html".into(),
                prefixes: vec!["Sus".into(), "Dan".into(), "Bel".into()],
                verses: vec![
                    draft("Sus_vchap1-1", vec![study("f1")]),
                    draft("Dan_vchap1-1", vec![study("f1"), study("f9")]),
                    draft("Bel_vchap1-1", vec![]),
                    draft("Bel_vchap1-1", vec![]),
                ],
                ..Default::default()
            }],
            notes: NoteSet {
                notes: vec![note("f1"), note("f2")],
                ..Default::default()
            },
        }
    }

    #[test]
    fn multi_text_file_splits_into_books() {
        let corpus = assemble(daniel()).unwrap();
        let books: Vec<_> = corpus.books.iter().map(|b| (b.id.as_str(), b.name.as_str(), b.part)).collect();
        assert_eq!(
            books,
            [("sus", "Susanna", 1), ("dan", "Daniel", 2), ("bel", "Bel and the Dragon", 3)]
        );
        assert_eq!(corpus.passages[0].book_id, "sus");
        assert_eq!(corpus.passages[1].book_id, "dan");
    }

    #[test]
    fn join_fills_both_directions() {
        let corpus = assemble(daniel()).unwrap();
        let f1 = corpus.annotations.iter().find(|a| a.id == "f1").unwrap();
        assert_eq!(f1.passage_ids, ["Sus_vchap1-1", "Dan_vchap1-1"]);
        assert_eq!(f1.scripture_refs, ["Dan_vchap1-1"]);
        assert_eq!(corpus.orphans, ["f2"]);
    }

    #[test]
    fn recovered_anomalies_become_diagnostics() {
        let corpus = assemble(daniel()).unwrap();
        let categories: Vec<_> = corpus.diagnostics.iter().map(|d| d.category.as_str()).collect();
        assert!(categories.contains(&"duplicate-anchor"));
        assert!(categories.contains(&"dangling-marker"));
        assert!(categories.contains(&"unresolved-scripture-ref"));
        assert_eq!(corpus.passages.len(), 3);
    }

    #[test]
    fn single_prefix_keeps_manifest_identity() {
        let ex = Extraction {
            groups: vec![BookGroup {
                id: "genesis".into(),
                name: "Genesis".into(),
                order: 1,
                testament: Testament::Old,
                files: vec!["Genesis.html".into()],
            }],
            scans: vec![FileScan {
                file: "Genesis.html".into(),
                prefixes: vec!["Gen".into()],
                verses: vec![draft("Gen_vchap1-1", vec![])],
                ..Default::default()
            }],
            notes: NoteSet::default(),
        };
        let corpus = assemble(ex).unwrap();
        assert_eq!(corpus.books[0].id, "genesis");
        assert_eq!(corpus.books[0].abbreviations, ["Gen"]);
        assert_eq!(corpus.books[0].part, 0);
    }
}
