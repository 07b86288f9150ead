use std::collections::HashSet;

use ego_tree::iter::Edge;
use ego_tree::{NodeId, NodeRef};
use scraper::Node;

use super::anchors::{is_anchor_candidate, VerseRef};
use super::document::{id_of, is_list, Document};
use crate::error::ExtractError;
use crate::model::Format;

/// A verse anchor in document order together with its structural regime.
#[derive(Debug, Clone)]
pub struct Anchor<'a> {
    pub node: NodeRef<'a, Node>,
    pub verse: VerseRef,
    pub format: Format,
}

#[derive(Debug, Default)]
pub struct Scan<'a> {
    pub anchors: Vec<Anchor<'a>>,
    /// Distinct abbreviation prefixes in order of first appearance.
    pub prefixes: Vec<String>,
}

/// Find every verse anchor outside the excluded essay containers.
pub fn scan<'a>(doc: &'a Document, excluded: &HashSet<NodeId>) -> Result<Scan<'a>, ExtractError> {
    let mut out = Scan::default();
    let mut skipping: Option<NodeId> = None;

    for edge in doc.root().traverse() {
        match edge {
            Edge::Open(node) => {
                if skipping.is_some() {
                    continue;
                }
                if excluded.contains(&node.id()) {
                    skipping = Some(node.id());
                    continue;
                }
                let Some(id) = id_of(node).filter(|id| is_anchor_candidate(id)) else {
                    continue;
                };
                let verse = VerseRef::parse(id).ok_or_else(|| ExtractError::MalformedAnchor {
                    id: id.to_string(),
                    file: doc.file.clone(),
                })?;
                if !out.prefixes.contains(&verse.abbreviation) {
                    out.prefixes.push(verse.abbreviation.clone());
                }
                out.anchors.push(Anchor {
                    node,
                    verse,
                    format: regime(node),
                });
            }
            Edge::Close(node) => {
                if skipping == Some(node.id()) {
                    skipping = None;
                }
            }
        }
    }

    Ok(out)
}

/// Anchors on or inside a list are poetry; everything else is prose.
fn regime(node: NodeRef<'_, Node>) -> Format {
    if is_list(node) || node.ancestors().any(is_list) {
        Format::Poetry
    } else {
        Format::Prose
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_anchors_in_order_with_regime() {
        let doc = Document::parse(
            "Psalms.html",
            r#"<p><span id="Ps_vchap1-1">1</span>Blessed</p>
               <ol><li><span id="Ps_vchap1-2">2</span>But</li></ol>
               <ol id="Ps_vchap1-3"><li>He shall be</li></ol>
               <p id="intro">not an anchor</p>"#,
        );
        let scan = scan(&doc, &HashSet::new()).unwrap();
        let ids: Vec<_> = scan.anchors.iter().map(|a| a.verse.id.as_str()).collect();
        assert_eq!(ids, ["Ps_vchap1-1", "Ps_vchap1-2", "Ps_vchap1-3"]);
        let formats: Vec<_> = scan.anchors.iter().map(|a| a.format).collect();
        assert_eq!(formats, [Format::Prose, Format::Poetry, Format::Poetry]);
        assert_eq!(scan.prefixes, ["Ps"]);
    }

    #[test]
    fn collects_distinct_prefixes_for_multi_text_files() {
        let doc = Document::parse(
            "Daniel.html",
            r#"<p id="Sus_vchap1-1">a</p><p id="Sus_vchap1-2">b</p>
               <p id="Dan_vchap1-1">c</p><p id="Bel_vchap1-1">d</p>"#,
        );
        let scan = scan(&doc, &HashSet::new()).unwrap();
        assert_eq!(scan.prefixes, ["Sus", "Dan", "Bel"]);
    }

    #[test]
    fn malformed_anchor_is_fatal() {
        let doc = Document::parse("Genesis.html", r#"<p id="Gen_vchap1">x</p>"#);
        let err = scan(&doc, &HashSet::new()).unwrap_err();
        assert!(matches!(err, ExtractError::MalformedAnchor { ref id, .. } if id == "Gen_vchap1"));
    }
}
