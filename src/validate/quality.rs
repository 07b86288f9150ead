use std::collections::HashMap;
use std::sync::LazyLock;

use itertools::Itertools;
use regex::Regex;

use super::{strip_style, Context, Finding};
use crate::model::AnnotationKind;

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"</?[A-Za-z][A-Za-z0-9]*[^>]*>").unwrap());
static ENTITY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"&(#\d+|#x[0-9A-Fa-f]+|[A-Za-z]+);").unwrap());
static VERSE_NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+\s").unwrap());

const MARKER_GLYPHS: &[char] = &['†', '‡', 'ω'];
const ZERO_WIDTH: &[char] = &['\u{200b}', '\u{200c}', '\u{200d}', '\u{2060}', '\u{feff}'];
const MIN_DUPLICATE_LEN: usize = 12;

/// Markup, glyphs or verse numbers that should never reach clean text.
pub fn text_leaks(ctx: &Context<'_>) -> Vec<Finding> {
    let c = ctx.corpus;
    let mut markup = Vec::new();
    let mut glyphs = Vec::new();
    let mut numbers = Vec::new();
    let mut blank = Vec::new();
    for p in &c.passages {
        if p.text.trim().is_empty() {
            blank.push(p.id.clone());
            continue;
        }
        if TAG_RE.is_match(&strip_style(&p.text)) {
            markup.push(p.id.clone());
        }
        if p.text.contains(MARKER_GLYPHS) {
            glyphs.push(p.id.clone());
        }
        if VERSE_NUMBER_RE.is_match(&p.text) {
            numbers.push(format!("{}: {}", p.id, snippet(&p.text)));
        }
    }
    for a in &c.annotations {
        if TAG_RE.is_match(&strip_style(&a.text)) {
            markup.push(a.id.clone());
        }
    }

    [
        ctx.issue("blank-text", "passage text is empty or whitespace", blank),
        ctx.issue("markup-leak", "markup other than <i>/<b> in clean text", markup),
        ctx.issue("marker-glyph", "marker glyph left in passage text", glyphs),
        ctx.warning("verse-number-leak", "passage text starts with a number", numbers),
    ]
    .into_iter()
    .flatten()
    .collect()
}

pub fn encoding(ctx: &Context<'_>) -> Vec<Finding> {
    let mut control = Vec::new();
    let mut zero_width = Vec::new();
    let mut entities = Vec::new();
    let mut replacement = Vec::new();
    let texts = ctx
        .corpus
        .passages
        .iter()
        .map(|p| (&p.id, &p.text))
        .chain(ctx.corpus.annotations.iter().map(|a| (&a.id, &a.text)));
    for (id, text) in texts {
        if text.chars().any(|ch| ch.is_control() && ch != '\n' && ch != '\t') {
            control.push(id.clone());
        }
        if text.contains(ZERO_WIDTH) {
            zero_width.push(id.clone());
        }
        if ENTITY_RE.is_match(text) {
            entities.push(id.clone());
        }
        if text.contains('\u{fffd}') {
            replacement.push(id.clone());
        }
    }

    [
        ctx.issue("encoding", "control characters", control),
        ctx.issue("encoding", "zero-width characters", zero_width),
        ctx.issue("encoding", "undecoded HTML entities", entities),
        ctx.issue("encoding", "replacement characters", replacement),
    ]
    .into_iter()
    .flatten()
    .collect()
}

/// Clusters of ids sharing the exact same (style-stripped) text.
fn clusters<'a>(items: impl Iterator<Item = (&'a str, &'a str)>) -> Vec<String> {
    let mut by_text: HashMap<String, Vec<&str>> = HashMap::new();
    for (id, text) in items {
        let key = strip_style(text).trim().to_string();
        if key.chars().count() >= MIN_DUPLICATE_LEN {
            by_text.entry(key).or_default().push(id);
        }
    }
    by_text
        .into_values()
        .filter(|ids| ids.len() > 1)
        .map(|ids| ids.join(" = "))
        .sorted()
        .collect()
}

pub fn duplicate_text(ctx: &Context<'_>) -> Vec<Finding> {
    let c = ctx.corpus;
    let passages = clusters(c.passages.iter().map(|p| (p.id.as_str(), p.text.as_str())));
    let annotations = clusters(c.annotations.iter().map(|a| (a.id.as_str(), a.text.as_str())));
    [
        ctx.warning("duplicate-passage-text", "passages with identical text", passages),
        ctx.warning("duplicate-annotation-text", "annotations with identical text", annotations),
    ]
    .into_iter()
    .flatten()
    .collect()
}

fn unbalanced(text: &str, open: char, close: char) -> bool {
    text.matches(open).count() != text.matches(close).count()
}

fn ends_sentence(text: &str) -> bool {
    let trimmed = strip_style(text);
    let trimmed = trimmed.trim_end_matches(['"', '\'', '\u{201d}', '\u{2019}', ')', ' ']);
    trimmed.ends_with(['.', '!', '?'])
}

fn starts_lowercase(text: &str) -> bool {
    strip_style(text)
        .chars()
        .find(|c| c.is_alphabetic())
        .is_some_and(char::is_lowercase)
}

/// Heuristic signs that a span was cut short or started mid-sentence.
pub fn truncation(ctx: &Context<'_>) -> Vec<Finding> {
    let c = ctx.corpus;
    let mut unbalanced_ids = Vec::new();
    let cut_short = |text: &str| unbalanced(text, '(', ')') || unbalanced(text, '\u{201c}', '\u{201d}');
    for p in &c.passages {
        if cut_short(&p.text) {
            unbalanced_ids.push(p.id.clone());
        }
    }
    for a in &c.annotations {
        if cut_short(&a.text) {
            unbalanced_ids.push(a.id.clone());
        }
    }

    // A verse may continue the previous one's sentence; only flag after a full stop.
    let mut lowercase = Vec::new();
    let chapters = c
        .passages
        .iter()
        .into_group_map_by(|p| (p.book_id.as_str(), p.chapter));
    for (_, mut verses) in chapters {
        verses.sort_by_key(|p| p.verse);
        for pair in verses.windows(2) {
            let (prev, cur) = (pair[0], pair[1]);
            if ends_sentence(&prev.text) && starts_lowercase(&cur.text) {
                lowercase.push(format!("{}: {}", cur.id, snippet(&cur.text)));
            }
        }
    }
    lowercase.sort();

    [
        ctx.warning("possible-truncation", "unbalanced parentheses or quotation marks", unbalanced_ids),
        ctx.warning("lowercase-start", "verse starts lowercase after a full stop", lowercase),
    ]
    .into_iter()
    .flatten()
    .collect()
}

/// Note text should open with its own verse-range label.
pub fn label_prefix(ctx: &Context<'_>) -> Vec<Finding> {
    let mismatched = ctx
        .corpus
        .annotations
        .iter()
        .filter(|a| a.kind != AnnotationKind::Article && !a.verse_display.is_empty())
        .filter(|a| !strip_style(&a.text).trim_start().starts_with(a.verse_display.as_str()))
        .map(|a| format!("{} '{}' vs '{}'", a.id, a.verse_display, snippet(&a.text)))
        .collect();
    ctx.warning("label-mismatch", "note text does not start with its verse label", mismatched)
        .into_iter()
        .collect()
}

fn snippet(text: &str) -> String {
    text.chars().take(30).collect()
}
