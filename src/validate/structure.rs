use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use itertools::Itertools;

use super::{split_passage_id, Context, Finding};
use crate::model::Format;

const DENSITY_MIN_BOOKS: usize = 3;
const DENSITY_HIGH: f64 = 3.0;
const DENSITY_LOW: f64 = 0.2;
const FORMAT_MAJORITY: f64 = 0.5;

/// Missing chapters and verses per book. Documented gaps are suppressed.
pub fn sequence_gaps(ctx: &Context<'_>) -> Vec<Finding> {
    // book -> chapter -> (prefix, verses)
    let mut layout: BTreeMap<&str, BTreeMap<u32, (&str, BTreeSet<u32>)>> = BTreeMap::new();
    for p in &ctx.corpus.passages {
        let prefix = split_passage_id(&p.id).map(|(prefix, _, _)| prefix).unwrap_or_default();
        layout
            .entry(p.book_id.as_str())
            .or_default()
            .entry(p.chapter)
            .or_insert_with(|| (prefix, BTreeSet::new()))
            .1
            .insert(p.verse);
    }

    let mut chapter_gaps = Vec::new();
    let mut verse_gaps = Vec::new();
    for (book, chapters) in &layout {
        let last = chapters.keys().next_back().copied().unwrap_or(0);
        for ch in 1..=last {
            if !chapters.contains_key(&ch) {
                chapter_gaps.push(format!("{book} {ch}"));
            }
        }
        for (ch, (prefix, verses)) in chapters {
            let last = verses.iter().next_back().copied().unwrap_or(0);
            for v in 1..=last {
                let id = format!("{prefix}_vchap{ch}-{v}");
                if !verses.contains(&v) && !ctx.known_gaps.contains(id.as_str()) {
                    verse_gaps.push(id);
                }
            }
        }
    }

    [
        ctx.warning("chapter-gap", "chapter missing inside a book", chapter_gaps),
        ctx.warning("verse-gap", "verse missing inside a chapter", verse_gaps),
    ]
    .into_iter()
    .flatten()
    .collect()
}

/// Observed chapters per book against the reference table.
pub fn chapter_counts(ctx: &Context<'_>) -> Vec<Finding> {
    let observed = ctx
        .corpus
        .passages
        .iter()
        .map(|p| (p.book_id.as_str(), p.chapter))
        .collect::<HashSet<_>>()
        .into_iter()
        .counts_by(|(book, _)| book);

    let mismatched = ctx
        .corpus
        .books
        .iter()
        .filter_map(|b| {
            let expected = *ctx.reference.chapters.get(b.id.as_str())?;
            let found = observed.get(b.id.as_str()).copied().unwrap_or(0);
            (found != expected as usize).then(|| format!("{}: {} of {}", b.id, found, expected))
        })
        .collect();
    ctx.issue("chapter-count", "chapter count differs from the reference table", mismatched)
        .into_iter()
        .collect()
}

/// Books with a known literary character should be laid out mostly that way.
pub fn format_distribution(ctx: &Context<'_>) -> Vec<Finding> {
    let mut shares: HashMap<&str, (usize, usize)> = HashMap::new();
    for p in &ctx.corpus.passages {
        let entry = shares.entry(p.book_id.as_str()).or_default();
        if p.format == Format::Poetry {
            entry.0 += 1;
        }
        entry.1 += 1;
    }
    let share = |book: &str| {
        shares
            .get(book)
            .filter(|(_, total)| *total > 0)
            .map(|(poetry, total)| *poetry as f64 / *total as f64)
    };

    let poetic = ctx
        .reference
        .poetic
        .iter()
        .filter_map(|b| share(*b).filter(|s| *s < FORMAT_MAJORITY).map(|s| format!("{b}: {:.0}% poetry", s * 100.0)))
        .collect();
    let prose = ctx
        .reference
        .prose
        .iter()
        .filter_map(|b| {
            share(*b)
                .filter(|s| 1.0 - *s < FORMAT_MAJORITY)
                .map(|s| format!("{b}: {:.0}% prose", (1.0 - s) * 100.0))
        })
        .collect();

    [
        ctx.warning("format-distribution", "poetic book laid out mostly as prose", poetic),
        ctx.warning("format-distribution", "narrative book laid out mostly as poetry", prose),
    ]
    .into_iter()
    .flatten()
    .collect()
}

/// Verse totals of texts split out of one shared file stay plausible.
pub fn multi_text_split(ctx: &Context<'_>) -> Vec<Finding> {
    let counts = ctx.corpus.passages.iter().counts_by(|p| p.book_id.as_str());
    let implausible = ctx
        .reference
        .split_ranges
        .iter()
        .filter(|(book, _)| ctx.books.contains_key(*book))
        .filter_map(|(book, range)| {
            let n = counts.get(*book).copied().unwrap_or(0);
            (!range.contains(&n)).then(|| format!("{book}: {n} verses, expected {}..={}", range.start(), range.end()))
        })
        .collect();
    ctx.warning("multi-text-split", "split text has an implausible verse count", implausible)
        .into_iter()
        .collect()
}

pub fn self_references(ctx: &Context<'_>) -> Vec<Finding> {
    let own = ctx
        .corpus
        .passages
        .iter()
        .filter(|p| p.cross_ref_targets.contains(&p.id))
        .map(|p| p.id.clone())
        .collect();
    ctx.warning("self-reference", "passage cross-references itself", own)
        .into_iter()
        .collect()
}

/// Annotations per passage, per book, compared with the corpus mean.
pub fn density(ctx: &Context<'_>) -> Vec<Finding> {
    let mut per_book: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
    for p in &ctx.corpus.passages {
        let entry = per_book.entry(p.book_id.as_str()).or_default();
        entry.0 += p.all_annotation_ids().count();
        entry.1 += 1;
    }
    if per_book.len() < DENSITY_MIN_BOOKS {
        return Vec::new();
    }

    let ratios: Vec<(&str, f64)> = per_book
        .into_iter()
        .map(|(book, (notes, verses))| (book, notes as f64 / verses as f64))
        .collect();
    let mean = ratios.iter().map(|(_, r)| r).sum::<f64>() / ratios.len() as f64;
    if mean <= 0.0 {
        return Vec::new();
    }
    let outliers = ratios
        .iter()
        .filter(|(_, r)| *r > mean * DENSITY_HIGH || *r < mean * DENSITY_LOW)
        .map(|(book, r)| format!("{book}: {r:.2} per verse (mean {mean:.2})"))
        .collect();
    ctx.warning("annotation-density", "book far from the mean annotation density", outliers)
        .into_iter()
        .collect()
}

/// Undocumented orphans, reported once with every offender counted.
pub fn orphans(ctx: &Context<'_>) -> Vec<Finding> {
    let undocumented = ctx
        .corpus
        .annotations
        .iter()
        .filter(|a| a.passage_ids.is_empty() && !ctx.known_orphans.contains(a.id.as_str()))
        .map(|a| format!("{} ({})", a.id, a.kind.as_str()))
        .collect();
    ctx.warning("orphan-annotation", "annotation resolves to no passage", undocumented)
        .into_iter()
        .collect()
}

/// Anomalies recovered during extraction resurface here, one warning per category.
pub fn diagnostics(ctx: &Context<'_>) -> Vec<Finding> {
    ctx.corpus
        .diagnostics
        .iter()
        .into_group_map_by(|d| d.category.as_str())
        .into_iter()
        .sorted_by_key(|(category, _)| *category)
        .filter_map(|(category, found)| {
            let samples = found
                .iter()
                .map(|d| format!("{}: {}", d.subject, d.detail))
                .collect();
            ctx.warning(
                &format!("extraction/{category}"),
                "recorded during extraction",
                samples,
            )
        })
        .collect()
}
