use std::sync::LazyLock;

use ego_tree::{NodeId, NodeRef};
use regex::Regex;
use scraper::Node;

use super::anchors::{fragment, is_anchor_candidate};
use super::boundary::SpanEvent;
use super::document::href_of;
use super::text;
use crate::model::AnnotationKind;

static MARKER_FRAGMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^f[a-z]*\d+$").unwrap());
static STUDY_FILE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^study\d+\.html$").unwrap());

/// Characters of verse text kept before each marker.
const PRECEDING_CHARS: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    Annotation(AnnotationKind),
    CrossReference,
    Translation,
    Background,
}

impl MarkerKind {
    /// Noise kinds carry no annotation; their glyph is dropped from verse text.
    pub fn is_noise(self) -> bool {
        !matches!(self, MarkerKind::Annotation(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkClass {
    Marker { kind: MarkerKind, id: String },
    /// Shaped like a marker but pointing somewhere unknown.
    Unrecognized,
    /// A link to another verse.
    Scripture(String),
    Other,
}

/// Destination file → expected fragment prefix and kind.
fn destination(file: &str) -> Option<(&'static str, MarkerKind)> {
    let kind = match file {
        "x-liturgical.html" => ("fx", MarkerKind::Annotation(AnnotationKind::Liturgical)),
        "variant.html" => ("fvar", MarkerKind::Annotation(AnnotationKind::Variant)),
        "citation.html" => ("fcit", MarkerKind::Annotation(AnnotationKind::Citation)),
        "crossReference.html" => ("fcross", MarkerKind::CrossReference),
        "translation.html" => ("ftran", MarkerKind::Translation),
        "background.html" => ("fback", MarkerKind::Background),
        f if STUDY_FILE_RE.is_match(f) => ("f", MarkerKind::Annotation(AnnotationKind::Study)),
        _ => return None,
    };
    Some(kind)
}

pub fn classify(href: &str) -> LinkClass {
    let Some(frag) = fragment(href) else {
        return LinkClass::Other;
    };
    if is_anchor_candidate(frag) {
        return LinkClass::Scripture(frag.to_string());
    }
    if !MARKER_FRAGMENT_RE.is_match(frag) {
        return LinkClass::Other;
    }
    let path = href.split('#').next().unwrap_or_default();
    let file = path.rsplit('/').next().unwrap_or(path);

    match destination(file) {
        Some((prefix, kind))
            if frag
                .strip_prefix(prefix)
                .is_some_and(|n| n.bytes().all(|b| b.is_ascii_digit())) =>
        {
            LinkClass::Marker {
                kind,
                id: frag.to_string(),
            }
        }
        _ => LinkClass::Unrecognized,
    }
}

/// Whether a link's own text is a marker glyph that must not reach verse text.
pub fn strips_text(node: NodeRef<'_, Node>) -> bool {
    let Some(href) = href_of(node) else {
        return false;
    };
    match classify(href) {
        LinkClass::Marker { kind, .. } if kind.is_noise() => {
            let label: String = node
                .descendants()
                .filter_map(|n| n.value().as_text())
                .flat_map(|t| t.chars())
                .filter(|c| !c.is_whitespace())
                .collect();
            let mut chars = label.chars();
            matches!((chars.next(), chars.next()), (Some(c), None) if c.is_alphabetic())
        }
        LinkClass::Marker { .. } => true,
        _ => false,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerHit {
    pub kind: MarkerKind,
    pub id: String,
    pub preceding: String,
}

#[derive(Debug, Default)]
pub struct SpanMarkers {
    pub hits: Vec<MarkerHit>,
    pub unrecognized: Vec<String>,
}

/// Every marker link inside a span with the verse text that precedes it.
pub fn collect(events: &[SpanEvent<'_>]) -> SpanMarkers {
    let mut found = SpanMarkers::default();
    let mut plain = String::new();
    let mut skipping: Option<NodeId> = None;

    for event in events {
        match *event {
            SpanEvent::Open(node) => {
                if skipping.is_some() {
                    continue;
                }
                let Some(href) = href_of(node) else {
                    continue;
                };
                match classify(href) {
                    LinkClass::Marker { kind, id } => {
                        found.hits.push(MarkerHit {
                            kind,
                            id,
                            preceding: preceding(&plain),
                        });
                        if strips_text(node) {
                            skipping = Some(node.id());
                        }
                    }
                    LinkClass::Unrecognized => found.unrecognized.push(href.to_string()),
                    LinkClass::Scripture(_) | LinkClass::Other => {}
                }
            }
            SpanEvent::Close(node) => {
                if skipping == Some(node.id()) {
                    skipping = None;
                }
            }
            SpanEvent::Text(_, t) => {
                if skipping.is_none() {
                    plain.push_str(t);
                    plain.push(' ');
                }
            }
        }
    }
    found
}

/// Trailing context of the verse so far, cut at a word boundary when one is close.
fn preceding(plain: &str) -> String {
    let cleaned = text::normalize_plain(plain);
    let chars: Vec<char> = cleaned.chars().collect();
    if chars.len() <= PRECEDING_CHARS {
        return cleaned;
    }
    let tail: String = chars[chars.len() - PRECEDING_CHARS..].iter().collect();
    match tail.char_indices().take(10).find(|(_, c)| *c == ' ') {
        Some((i, _)) => tail[i + 1..].to_string(),
        None => tail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::boundary::subtree_events;
    use crate::parser::document::Document;

    #[test]
    fn classifies_every_destination() {
        use AnnotationKind::*;
        let cases = [
            ("study1.html#f1", MarkerKind::Annotation(Study)),
            ("study12.html#f3040", MarkerKind::Annotation(Study)),
            ("x-liturgical.html#fx12", MarkerKind::Annotation(Liturgical)),
            ("variant.html#fvar3", MarkerKind::Annotation(Variant)),
            ("citation.html#fcit9", MarkerKind::Annotation(Citation)),
            ("crossReference.html#fcross100", MarkerKind::CrossReference),
            ("translation.html#ftran2", MarkerKind::Translation),
            ("background.html#fback7", MarkerKind::Background),
        ];
        for (href, kind) in cases {
            match classify(href) {
                LinkClass::Marker { kind: k, .. } => assert_eq!(k, kind, "{href}"),
                other => panic!("{href} classified as {other:?}"),
            }
        }
    }

    #[test]
    fn unknown_destination_is_unrecognized() {
        assert_eq!(classify("glossary.html#fg12"), LinkClass::Unrecognized);
        assert_eq!(classify("variant.html#fx12"), LinkClass::Unrecognized);
        assert_eq!(
            classify("Isaiah.html#Isa_vchap7-14"),
            LinkClass::Scripture("Isa_vchap7-14".into())
        );
        assert_eq!(classify("intro.html#chapter2"), LinkClass::Other);
        assert_eq!(classify("intro.html"), LinkClass::Other);
    }

    #[test]
    fn collects_markers_with_preceding_text() {
        let doc = Document::parse(
            "t.html",
            r#"<p>In the beginning God made heaven and earth.<a href="study1.html#f1">†</a>
               And the earth<a href="crossReference.html#fcross4">a</a> was<a href="glossary.html#fg1">*</a></p>"#,
        );
        let p = doc
            .root()
            .descendants()
            .find(|n| crate::parser::document::tag_is(*n, &["p"]))
            .unwrap();
        let found = collect(&subtree_events(p));
        assert_eq!(found.hits.len(), 2);
        assert_eq!(found.hits[0].id, "f1");
        assert_eq!(found.hits[0].preceding, "beginning God made heaven and earth.");
        assert_eq!(found.hits[1].kind, MarkerKind::CrossReference);
        assert!(found.hits[1].preceding.ends_with("And the earth"));
        assert_eq!(found.unrecognized, vec!["glossary.html#fg1".to_string()]);
    }

    #[test]
    fn noise_marker_keeps_text_longer_than_one_letter() {
        let doc = Document::parse(
            "t.html",
            r#"<a href="crossReference.html#fcross1">a</a><a href="crossReference.html#fcross2">see here</a><a href="study1.html#f2">†</a>"#,
        );
        let links: Vec<_> = doc
            .root()
            .descendants()
            .filter(|n| href_of(*n).is_some())
            .collect();
        assert!(strips_text(links[0]));
        assert!(!strips_text(links[1]));
        assert!(strips_text(links[2]));
    }
}
