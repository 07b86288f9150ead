use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::LazyLock;

use itertools::Itertools;
use regex::Regex;

use super::{split_passage_id, Context, Finding};
use crate::model::AnnotationKind;

static BOOK_ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-z0-9]+$").unwrap());
static ARTICLE_ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").unwrap());

fn note_id_re(kind: AnnotationKind) -> Option<&'static Regex> {
    static STUDY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^f\d+$").unwrap());
    static LITURGICAL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^fx\d+$").unwrap());
    static VARIANT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^fvar\d+$").unwrap());
    static CITATION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^fcit\d+$").unwrap());
    match kind {
        AnnotationKind::Study => Some(&*STUDY),
        AnnotationKind::Liturgical => Some(&*LITURGICAL),
        AnnotationKind::Variant => Some(&*VARIANT),
        AnnotationKind::Citation => Some(&*CITATION),
        AnnotationKind::Article => None,
    }
}

pub fn required_fields(ctx: &Context<'_>) -> Vec<Finding> {
    let c = ctx.corpus;
    let books = c
        .books
        .iter()
        .filter(|b| b.id.is_empty() || b.name.trim().is_empty() || b.files.is_empty())
        .map(|b| format!("book '{}'", b.id))
        .collect();
    let passages = c
        .passages
        .iter()
        .filter(|p| {
            p.id.is_empty() || p.book_id.is_empty() || p.chapter == 0 || p.verse == 0 || p.html.is_empty()
        })
        .map(|p| p.id.clone())
        .collect();
    let annotations = c
        .annotations
        .iter()
        .filter(|a| a.id.is_empty() || a.text.trim().is_empty() || a.html.is_empty())
        .map(|a| format!("{} ({})", a.id, a.kind.as_str()))
        .collect();
    let sources = c
        .patristic_sources
        .iter()
        .filter(|s| s.id.is_empty() || s.name.trim().is_empty())
        .map(|s| s.id.clone())
        .collect();

    [
        ctx.issue("required-fields", "books missing id, name or files", books),
        ctx.issue("required-fields", "passages missing id, book, chapter, verse or markup", passages),
        ctx.issue("required-fields", "annotations with empty text or markup", annotations),
        ctx.issue("required-fields", "patristic sources missing id or name", sources),
    ]
    .into_iter()
    .flatten()
    .collect()
}

fn repeated<'a>(ids: impl Iterator<Item = &'a str>) -> Vec<String> {
    ids.counts()
        .into_iter()
        .filter(|(_, n)| *n > 1)
        .map(|(id, n)| format!("{id} ×{n}"))
        .sorted()
        .collect()
}

pub fn duplicate_ids(ctx: &Context<'_>) -> Vec<Finding> {
    let c = ctx.corpus;
    let triples = c
        .passages
        .iter()
        .map(|p| (p.book_id.as_str(), p.chapter, p.verse))
        .counts()
        .into_iter()
        .filter(|(_, n)| *n > 1)
        .map(|((book, ch, v), n)| format!("{book} {ch}:{v} ×{n}"))
        .sorted()
        .collect();

    [
        ctx.issue("duplicate-id", "repeated book ids", repeated(c.books.iter().map(|b| b.id.as_str()))),
        ctx.issue(
            "duplicate-id",
            "repeated passage ids",
            repeated(c.passages.iter().map(|p| p.id.as_str())),
        ),
        ctx.issue(
            "duplicate-id",
            "repeated annotation ids",
            repeated(c.annotations.iter().map(|a| a.id.as_str())),
        ),
        ctx.issue(
            "duplicate-id",
            "repeated patristic source ids",
            repeated(c.patristic_sources.iter().map(|s| s.id.as_str())),
        ),
        ctx.issue("duplicate-verse", "book/chapter/verse appears more than once", triples),
    ]
    .into_iter()
    .flatten()
    .collect()
}

/// Every foreign-key-shaped field resolves.
pub fn referential(ctx: &Context<'_>) -> Vec<Finding> {
    let c = ctx.corpus;
    let mut book_refs = Vec::new();
    let mut annotation_refs = Vec::new();
    let mut cross_refs = Vec::new();
    for p in &c.passages {
        if !ctx.books.contains_key(p.book_id.as_str()) {
            book_refs.push(format!("{} → {}", p.id, p.book_id));
        }
        for (_, id) in p.all_annotation_ids() {
            if !ctx.annotations.contains_key(id.as_str()) {
                annotation_refs.push(format!("{} → {}", p.id, id));
            }
        }
        for target in &p.cross_ref_targets {
            if !ctx.passages.contains_key(target.as_str()) && !ctx.known_gaps.contains(target.as_str()) {
                cross_refs.push(format!("{} → {}", p.id, target));
            }
        }
    }

    let mut passage_refs = Vec::new();
    let mut scripture_refs = Vec::new();
    for a in &c.annotations {
        for id in &a.passage_ids {
            if !ctx.passages.contains_key(id.as_str()) {
                passage_refs.push(format!("{} → {}", a.id, id));
            }
        }
        for id in &a.scripture_refs {
            if !ctx.passages.contains_key(id.as_str()) && !ctx.known_gaps.contains(id.as_str()) {
                scripture_refs.push(format!("{} → {}", a.id, id));
            }
        }
    }

    [
        ctx.issue("dangling-reference", "passage book_id names no book", book_refs),
        ctx.issue("dangling-reference", "passage lists an unknown annotation", annotation_refs),
        ctx.issue("dangling-reference", "cross reference targets an unknown passage", cross_refs),
        ctx.issue("dangling-reference", "annotation points at an unknown passage", passage_refs),
        ctx.issue("dangling-reference", "scripture reference names an unknown passage", scripture_refs),
    ]
    .into_iter()
    .flatten()
    .collect()
}

/// Passage → Annotation is authoritative; the reverse list must mirror it exactly.
pub fn bidirectional(ctx: &Context<'_>) -> Vec<Finding> {
    let mut forward = Vec::new();
    let mut kinds = Vec::new();
    for p in &ctx.corpus.passages {
        for (kind, id) in p.all_annotation_ids() {
            let Some(a) = ctx.annotations.get(id.as_str()) else {
                continue;
            };
            if a.kind != kind {
                kinds.push(format!("{}: {} listed as {} but is {}", p.id, id, kind.as_str(), a.kind.as_str()));
            } else if !a.passage_ids.contains(&p.id) {
                forward.push(format!("{} → {}", p.id, id));
            }
        }
    }

    let mut reverse = Vec::new();
    for a in &ctx.corpus.annotations {
        for pid in &a.passage_ids {
            let Some(p) = ctx.passages.get(pid.as_str()) else {
                continue;
            };
            if !p.ids_for(a.kind).contains(&a.id) {
                reverse.push(format!("{} → {}", a.id, pid));
            }
        }
    }

    [
        ctx.issue("bidirectional-link", "annotation does not list the passage back", forward),
        ctx.issue("bidirectional-link", "passage does not list the annotation back", reverse),
        ctx.issue("bidirectional-link", "annotation listed under the wrong kind", kinds),
    ]
    .into_iter()
    .flatten()
    .collect()
}

pub fn patristic(ctx: &Context<'_>) -> Vec<Finding> {
    let known: HashSet<&str> = ctx
        .corpus
        .patristic_sources
        .iter()
        .map(|s| s.id.as_str())
        .collect();
    let unresolved = ctx
        .corpus
        .annotations
        .iter()
        .flat_map(|a| {
            a.patristic_citations
                .iter()
                .filter(|c| !known.contains(c.as_str()))
                .map(move |c| format!("{} cites {}", a.id, c))
        })
        .collect();
    ctx.issue("patristic-unresolved", "citation names no patristic source", unresolved)
        .into_iter()
        .collect()
}

/// Clean and raw copies must hold exactly the same keys.
pub fn store_parity(ctx: &Context<'_>) -> Vec<Finding> {
    let Some(raw) = ctx.raw_keys else {
        return Vec::new();
    };
    let c = ctx.corpus;
    let clean: [(&str, BTreeSet<&str>); 4] = [
        ("books", c.books.iter().map(|b| b.id.as_str()).collect()),
        ("passages", c.passages.iter().map(|p| p.id.as_str()).collect()),
        ("annotations", c.annotations.iter().map(|a| a.id.as_str()).collect()),
        (
            "patristic_sources",
            c.patristic_sources.iter().map(|s| s.id.as_str()).collect(),
        ),
    ];

    let mut out = Vec::new();
    for ((table, clean_keys), (_, raw_keys)) in clean.iter().zip(raw.tables()) {
        let raw_keys: BTreeSet<&str> = raw_keys.iter().map(String::as_str).collect();
        let only_clean = clean_keys.difference(&raw_keys).map(|k| k.to_string()).collect();
        let only_raw = raw_keys.difference(clean_keys).map(|k| k.to_string()).collect();
        out.extend(ctx.issue("store-parity", format!("{table}: present in clean copy only"), only_clean));
        out.extend(ctx.issue("store-parity", format!("{table}: present in raw copy only"), only_raw));
    }
    out
}

pub fn empty_books(ctx: &Context<'_>) -> Vec<Finding> {
    let populated: HashSet<&str> = ctx.corpus.passages.iter().map(|p| p.book_id.as_str()).collect();
    let empty = ctx
        .corpus
        .books
        .iter()
        .filter(|b| !populated.contains(b.id.as_str()))
        .map(|b| b.id.clone())
        .collect();
    ctx.issue("empty-book", "book has no passages", empty).into_iter().collect()
}

pub fn id_format(ctx: &Context<'_>) -> Vec<Finding> {
    let c = ctx.corpus;
    let books = c
        .books
        .iter()
        .filter(|b| !BOOK_ID_RE.is_match(&b.id))
        .map(|b| b.id.clone())
        .collect();
    let passages = c
        .passages
        .iter()
        .filter(|p| split_passage_id(&p.id).is_none())
        .map(|p| p.id.clone())
        .collect();
    let annotations = c
        .annotations
        .iter()
        .filter(|a| {
            let re = note_id_re(a.kind).unwrap_or(&*ARTICLE_ID_RE);
            !re.is_match(&a.id)
        })
        .map(|a| format!("{} ({})", a.id, a.kind.as_str()))
        .collect();

    [
        ctx.issue("id-format", "book id is not lowercase alphanumeric", books),
        ctx.issue("id-format", "passage id is not <Abbrev>_vchap<C>-<V>", passages),
        ctx.issue("id-format", "annotation id does not match its kind's pattern", annotations),
    ]
    .into_iter()
    .flatten()
    .collect()
}

/// Chapter and verse embedded in the id agree with the typed fields.
pub fn id_fields(ctx: &Context<'_>) -> Vec<Finding> {
    let mismatched = ctx
        .corpus
        .passages
        .iter()
        .filter_map(|p| {
            let (_, chapter, verse) = split_passage_id(&p.id)?;
            (chapter != p.chapter || verse != p.verse)
                .then(|| format!("{} has {}:{}", p.id, p.chapter, p.verse))
        })
        .collect();
    ctx.issue("id-field-mismatch", "chapter/verse fields disagree with the id", mismatched)
        .into_iter()
        .collect()
}

/// Abbreviations and books map onto each other in both directions.
pub fn abbreviations(ctx: &Context<'_>) -> Vec<Finding> {
    let mut owners: HashMap<&str, Vec<&str>> = HashMap::new();
    for b in &ctx.corpus.books {
        for abbr in &b.abbreviations {
            owners.entry(abbr.as_str()).or_default().push(b.id.as_str());
        }
    }

    let mut used: HashSet<(&str, &str)> = HashSet::new();
    let mut unmapped = BTreeSet::new();
    for p in &ctx.corpus.passages {
        let Some((prefix, _, _)) = split_passage_id(&p.id) else {
            continue;
        };
        used.insert((prefix, p.book_id.as_str()));
        let owned = owners
            .get(prefix)
            .is_some_and(|books| books.contains(&p.book_id.as_str()));
        if !owned {
            unmapped.insert(format!("{} in {}", prefix, p.book_id));
        }
    }

    let shared = owners
        .iter()
        .filter(|(_, books)| books.len() > 1)
        .map(|(abbr, books)| format!("{} → {}", abbr, books.join("/")))
        .sorted()
        .collect();
    let no_abbreviation = ctx
        .corpus
        .books
        .iter()
        .filter(|b| b.abbreviations.is_empty())
        .map(|b| b.id.clone())
        .collect();
    let unused = ctx
        .corpus
        .books
        .iter()
        .flat_map(|b| {
            b.abbreviations
                .iter()
                .filter(|a| !used.contains(&(a.as_str(), b.id.as_str())))
                .map(move |a| format!("{} ({})", a, b.id))
        })
        .collect();

    [
        ctx.issue("abbreviation-map", "passage prefix is not an abbreviation of its book", unmapped.into_iter().collect()),
        ctx.issue("abbreviation-map", "abbreviation claimed by several books", shared),
        ctx.issue("abbreviation-map", "book has no abbreviation", no_abbreviation),
        ctx.warning("unused-abbreviation", "abbreviation used by no passage", unused),
    ]
    .into_iter()
    .flatten()
    .collect()
}

#[cfg(test)]
mod tests {
    use super::super::tests::{annotation, book, passage, small_corpus};
    use super::super::{Context, Reference};
    use super::*;
    use crate::config::Settings;
    use crate::db::KeySets;
    use crate::model::Corpus;

    fn run(corpus: &Corpus, check: fn(&Context<'_>) -> Vec<Finding>) -> Vec<Finding> {
        let reference = Reference::none();
        let settings = Settings::default();
        check(&Context::new(corpus, &reference, &settings))
    }

    #[test]
    fn blank_annotation_text_is_required() {
        let mut corpus = small_corpus();
        corpus.annotations[0].text = "  ".into();
        let found = run(&corpus, required_fields);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].samples, ["f1 (study)"]);
    }

    #[test]
    fn duplicate_triples_are_issues() {
        let mut corpus = small_corpus();
        let mut again = corpus.passages[1].clone();
        again.id = "Gen_vchap1-2".into();
        corpus.passages.push(again);
        let found = run(&corpus, duplicate_ids);
        let cats: Vec<_> = found.iter().map(|f| f.category.as_str()).collect();
        assert_eq!(cats, ["duplicate-id", "duplicate-verse"]);
        assert_eq!(found[1].samples, ["genesis 1:2 ×2"]);
    }

    #[test]
    fn dangling_cross_reference_respects_known_gaps() {
        let mut corpus = small_corpus();
        corpus.passages[0].cross_ref_targets = vec!["Gen_vchap1-3".into(), "Gen_vchap9-99".into()];
        assert_eq!(run(&corpus, referential).len(), 1);

        let reference = Reference::none();
        let settings = Settings {
            known_gaps: vec!["Gen_vchap9-99".into()],
            ..Settings::default()
        };
        assert!(referential(&Context::new(&corpus, &reference, &settings)).is_empty());
    }

    #[test]
    fn one_sided_links_are_reported_in_both_directions() {
        let mut corpus = small_corpus();
        corpus.annotations[0].passage_ids.push("Gen_vchap1-2".into());
        corpus.passages[2].variant_ids.push("f1".into());
        let found = run(&corpus, bidirectional);
        let messages: Vec<_> = found.iter().map(|f| f.message.as_str()).collect();
        assert!(messages.contains(&"passage does not list the annotation back"));
        assert!(messages.contains(&"annotation listed under the wrong kind"));
    }

    #[test]
    fn unknown_patristic_citation() {
        let mut corpus = small_corpus();
        corpus.annotations[0].patristic_citations = vec!["JohnChr".into()];
        let found = run(&corpus, patristic);
        assert_eq!(found[0].samples, ["f1 cites JohnChr"]);
    }

    #[test]
    fn parity_compares_every_table() {
        let corpus = small_corpus();
        let mut raw = KeySets {
            books: ["genesis".to_string()].into(),
            passages: corpus.passages.iter().map(|p| p.id.clone()).collect(),
            annotations: ["f1".to_string(), "f2".to_string()].into(),
            patristic_sources: Default::default(),
        };
        let reference = Reference::none();
        let settings = Settings::default();
        let found = store_parity(&Context::new(&corpus, &reference, &settings).with_raw_keys(&raw));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].message, "annotations: present in raw copy only");

        raw.annotations.remove("f2");
        assert!(store_parity(&Context::new(&corpus, &reference, &settings).with_raw_keys(&raw)).is_empty());
    }

    #[test]
    fn book_without_passages() {
        let mut corpus = small_corpus();
        corpus.books.push(book("exodus", "Exod"));
        let found = run(&corpus, empty_books);
        assert_eq!(found[0].samples, ["exodus"]);
    }

    #[test]
    fn annotation_ids_follow_their_kind() {
        let mut corpus = small_corpus();
        corpus
            .annotations
            .push(annotation("fx3", AnnotationKind::Variant, &[], "1:1 text"));
        let found = run(&corpus, id_format);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].samples, ["fx3 (variant)"]);
    }

    #[test]
    fn id_embedded_numbers_match_fields() {
        let mut corpus = small_corpus();
        corpus.passages[2].verse = 4;
        let found = run(&corpus, id_fields);
        assert_eq!(found[0].samples, ["Gen_vchap1-3 has 1:4"]);
    }

    #[test]
    fn abbreviation_map_both_directions() {
        let mut corpus = small_corpus();
        corpus.books[0].abbreviations.push("Gn".into());
        corpus.passages.push(passage("genesis", "Ge", 1, 4, "And God saw the light."));
        let found = run(&corpus, abbreviations);
        let issue = found.iter().find(|f| f.category == "abbreviation-map").unwrap();
        assert_eq!(issue.samples, ["Ge in genesis"]);
        let unused = found.iter().find(|f| f.category == "unused-abbreviation").unwrap();
        assert_eq!(unused.samples, ["Gn (genesis)"]);
    }
}
