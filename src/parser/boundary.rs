use std::collections::HashSet;

use ego_tree::iter::Edge;
use ego_tree::{NodeId, NodeRef};
use scraper::Node;

use super::anchors::is_anchor_candidate;
use super::document::{id_of, is_block, is_boundary, is_content, is_list, tag_is};

/// One step of a verse span in document order.
#[derive(Debug, Clone, Copy)]
pub enum SpanEvent<'a> {
    Open(NodeRef<'a, Node>),
    Close(NodeRef<'a, Node>),
    Text(NodeRef<'a, Node>, &'a str),
}

/// Which of the three containment rules bounded the span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Anchor in (or on) a top-level block: continue into following content siblings.
    Block,
    /// Anchor nested inside a list: never leave the nearest list.
    List,
    /// Anchor is the list itself.
    Container,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum End {
    NextAnchor(String),
    Boundary,
    Exhausted,
}

#[derive(Debug)]
pub struct Span<'a> {
    pub scope: Scope,
    pub end: End,
    pub events: Vec<SpanEvent<'a>>,
}

enum Step<'a> {
    /// `sibling` marks nodes reached by leaving the host block.
    Enter { node: NodeRef<'a, Node>, sibling: bool },
    Leave(NodeRef<'a, Node>),
}

/// Explicit document-order cursor: the stack holds exactly the remaining work,
/// so each step is a single predicate check with no recursion.
struct Cursor<'a, 'x> {
    anchor: NodeId,
    stack: Vec<Step<'a>>,
    excluded: &'x HashSet<NodeId>,
}

impl<'a, 'x> Cursor<'a, 'x> {
    fn new(anchor: NodeRef<'a, Node>, scope: Scope, host: NodeRef<'a, Node>, excluded: &'x HashSet<NodeId>) -> Self {
        let mut stack = Vec::new();

        if scope == Scope::Block {
            push_siblings(&mut stack, host, true);
        }

        // Chain from host down to the anchor; each level resumes after its child on the path.
        let mut path = vec![anchor];
        let mut node = anchor;
        while node != host {
            match node.parent() {
                Some(parent) => {
                    path.push(parent);
                    node = parent;
                }
                None => break,
            }
        }
        for (depth, level) in path.iter().rev().enumerate() {
            if depth > 0 {
                push_siblings(&mut stack, *level, false);
            }
            stack.push(Step::Leave(*level));
        }
        push_children(&mut stack, anchor);

        Cursor {
            anchor: anchor.id(),
            stack,
            excluded,
        }
    }

    fn run(mut self) -> (Vec<SpanEvent<'a>>, End) {
        let mut events = Vec::new();
        while let Some(step) = self.stack.pop() {
            match step {
                Step::Leave(node) => {
                    if node.value().is_element() {
                        events.push(SpanEvent::Close(node));
                    }
                }
                Step::Enter { node, sibling } => {
                    if let Some(text) = node.value().as_text() {
                        if !sibling {
                            events.push(SpanEvent::Text(node, text));
                        }
                        continue;
                    }
                    if !node.value().is_element() {
                        continue;
                    }
                    if let Some(end) = self.stop_at(node) {
                        // Wrappers entered on the way to the stop hold nothing of this verse.
                        while matches!(events.last(), Some(SpanEvent::Open(_))) {
                            events.pop();
                        }
                        return (events, end);
                    }
                    if sibling && !is_content(node) {
                        // Skipped whole, but the next verse may still start inside it.
                        if let Some(end) = node.descendants().skip(1).find_map(|n| self.stop_at(n)) {
                            while matches!(events.last(), Some(SpanEvent::Open(_))) {
                                events.pop();
                            }
                            return (events, end);
                        }
                        continue;
                    }
                    events.push(SpanEvent::Open(node));
                    self.stack.push(Step::Leave(node));
                    push_children(&mut self.stack, node);
                }
            }
        }
        (events, End::Exhausted)
    }

    fn stop_at(&self, node: NodeRef<'a, Node>) -> Option<End> {
        if let Some(id) = id_of(node) {
            if is_anchor_candidate(id) && node.id() != self.anchor {
                return Some(End::NextAnchor(id.to_string()));
            }
        }
        if is_boundary(node) || self.excluded.contains(&node.id()) {
            return Some(End::Boundary);
        }
        // A following sibling may hold the next anchor deeper down.
        None
    }
}

fn push_children<'a>(stack: &mut Vec<Step<'a>>, node: NodeRef<'a, Node>) {
    let children: Vec<_> = node.children().collect();
    for child in children.into_iter().rev() {
        stack.push(Step::Enter {
            node: child,
            sibling: false,
        });
    }
}

fn push_siblings<'a>(stack: &mut Vec<Step<'a>>, node: NodeRef<'a, Node>, sibling: bool) {
    let siblings: Vec<_> = node.next_siblings().collect();
    for s in siblings.into_iter().rev() {
        stack.push(Step::Enter { node: s, sibling });
    }
}

/// Pick the containment rule and the node that bounds it.
pub fn scope_of(anchor: NodeRef<'_, Node>) -> (Scope, NodeRef<'_, Node>) {
    if is_list(anchor) {
        return (Scope::Container, anchor);
    }
    if let Some(list) = anchor.ancestors().find(|n| is_list(*n)) {
        return (Scope::List, list);
    }
    let host = std::iter::once(anchor)
        .chain(anchor.ancestors())
        .take_while(|n| !tag_is(*n, &["body", "html"]))
        .find(|n| is_block(*n))
        .unwrap_or(anchor);
    (Scope::Block, host)
}

/// Resolve the content a verse anchor owns, exclusive of the next anchor or boundary.
pub fn resolve<'a>(anchor: NodeRef<'a, Node>, excluded: &HashSet<NodeId>) -> Span<'a> {
    let (scope, host) = scope_of(anchor);
    let (events, end) = Cursor::new(anchor, scope, host, excluded).run();
    Span { scope, end, events }
}

/// Every event of a subtree, including the root's own open/close.
pub fn subtree_events(root: NodeRef<'_, Node>) -> Vec<SpanEvent<'_>> {
    root.traverse()
        .filter_map(|edge| match edge {
            Edge::Open(n) => match n.value() {
                Node::Element(_) => Some(SpanEvent::Open(n)),
                Node::Text(t) => Some(SpanEvent::Text(n, t)),
                _ => None,
            },
            Edge::Close(n) if n.value().is_element() => Some(SpanEvent::Close(n)),
            Edge::Close(_) => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::document::Document;

    fn anchor<'a>(doc: &'a Document, id: &str) -> NodeRef<'a, Node> {
        doc.root()
            .descendants()
            .find(|n| id_of(*n) == Some(id))
            .unwrap()
    }

    fn texts(span: &Span<'_>) -> String {
        span.events
            .iter()
            .filter_map(|e| match e {
                SpanEvent::Text(_, t) => Some(t.trim()),
                _ => None,
            })
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("|")
    }

    fn hrefs(span: &Span<'_>) -> Vec<String> {
        span.events
            .iter()
            .filter_map(|e| match e {
                SpanEvent::Open(n) => crate::parser::document::href_of(*n).map(str::to_string),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn inline_anchor_stops_at_next_inline_anchor() {
        let doc = Document::parse(
            "t.html",
            r#"<p class="tx"><span id="Gen_vchap1-1">1</span>In the beginning <span id="Gen_vchap1-2">2</span>The earth</p>"#,
        );
        let span = resolve(anchor(&doc, "Gen_vchap1-1"), &HashSet::new());
        assert_eq!(span.scope, Scope::Block);
        assert_eq!(span.end, End::NextAnchor("Gen_vchap1-2".into()));
        assert_eq!(texts(&span), "1|In the beginning");
    }

    #[test]
    fn marker_in_following_list_belongs_to_plain_verse() {
        let doc = Document::parse(
            "t.html",
            r#"<div>
                 <p class="tx"><span id="Ps_vchap1-1">1</span>Blessed is the man</p>
                 <ol><li>who walks not<a href="study5.html#f900">†</a></li></ol>
                 <p class="tx"><span id="Ps_vchap1-2">2</span>But his delight</p>
               </div>"#,
        );
        let span = resolve(anchor(&doc, "Ps_vchap1-1"), &HashSet::new());
        assert_eq!(hrefs(&span), vec!["study5.html#f900".to_string()]);
        assert_eq!(span.end, End::NextAnchor("Ps_vchap1-2".into()));
        let next = resolve(anchor(&doc, "Ps_vchap1-2"), &HashSet::new());
        assert!(hrefs(&next).is_empty());
    }

    #[test]
    fn section_header_ends_span() {
        let doc = Document::parse(
            "t.html",
            r#"<p><span id="Gen_vchap2-3">3</span>He rested.</p>
               <p class="sub1">The Garden<a href="study1.html#f5">†</a></p>
               <p>unowned text</p>"#,
        );
        let span = resolve(anchor(&doc, "Gen_vchap2-3"), &HashSet::new());
        assert_eq!(span.end, End::Boundary);
        assert_eq!(texts(&span), "3|He rested.");
        assert!(hrefs(&span).is_empty());
    }

    #[test]
    fn list_anchor_never_escapes_its_list() {
        let doc = Document::parse(
            "t.html",
            r#"<div>
                 <ol><li><sup id="Ps_vchap2-1">1</sup>Why do the nations rage</li>
                     <li>and the peoples plot</li></ol>
                 <p>after the list<a href="study5.html#f901">†</a></p>
               </div>"#,
        );
        let span = resolve(anchor(&doc, "Ps_vchap2-1"), &HashSet::new());
        assert_eq!(span.scope, Scope::List);
        assert_eq!(span.end, End::Exhausted);
        assert_eq!(texts(&span), "1|Why do the nations rage|and the peoples plot");
        assert!(hrefs(&span).is_empty());
    }

    #[test]
    fn container_anchor_covers_its_items() {
        let doc = Document::parse(
            "t.html",
            r#"<ol id="Prov_vchap1-1"><li>The proverbs of Solomon</li><li>son of David<a href="x-liturgical.html#fx7">ω</a></li></ol>
               <ol id="Prov_vchap1-2"><li>to know wisdom</li></ol>"#,
        );
        let span = resolve(anchor(&doc, "Prov_vchap1-1"), &HashSet::new());
        assert_eq!(span.scope, Scope::Container);
        assert_eq!(hrefs(&span), vec!["x-liturgical.html#fx7".to_string()]);
        assert!(!texts(&span).contains("wisdom"));
    }

    #[test]
    fn one_line_verse_before_header_keeps_only_its_own_block() {
        let doc = Document::parse(
            "t.html",
            r#"<p><span id="Gen_vchap1-31">31</span>It was very good.<a href="study1.html#f40">†</a></p>
               <p class="psalm">Chapter 2</p>
               <ol><li><a href="study1.html#f41">†</a></li></ol>"#,
        );
        let span = resolve(anchor(&doc, "Gen_vchap1-31"), &HashSet::new());
        assert_eq!(hrefs(&span), vec!["study1.html#f40".to_string()]);
        assert_eq!(span.end, End::Boundary);
    }

    #[test]
    fn excluded_container_acts_as_boundary() {
        let doc = Document::parse(
            "t.html",
            r#"<p><span id="Gen_vchap1-1">1</span>In the beginning</p>
               <div style="background-color: gray"><p>essay text</p></div>
               <p>stray</p>"#,
        );
        let div = doc
            .root()
            .descendants()
            .find(|n| crate::parser::document::is_article_container(*n))
            .unwrap();
        let excluded = HashSet::from([div.id()]);
        let span = resolve(anchor(&doc, "Gen_vchap1-1"), &excluded);
        assert_eq!(span.end, End::Boundary);
        assert!(!texts(&span).contains("essay"));
    }

    #[test]
    fn anchor_inside_skipped_sibling_ends_span() {
        let doc = Document::parse(
            "t.html",
            r#"<p><span id="Gen_vchap1-1">1</span>In the beginning</p>
               <blockquote><span id="Gen_vchap1-2">2</span>The earth</blockquote>
               <ol><li>was void<a href="study1.html#f9">†</a></li></ol>"#,
        );
        let span = resolve(anchor(&doc, "Gen_vchap1-1"), &HashSet::new());
        assert_eq!(span.end, End::NextAnchor("Gen_vchap1-2".into()));
        assert_eq!(texts(&span), "1|In the beginning");
        assert!(hrefs(&span).is_empty());

        let next = resolve(anchor(&doc, "Gen_vchap1-2"), &HashSet::new());
        assert_eq!(hrefs(&next), vec!["study1.html#f9".to_string()]);
    }

    #[test]
    fn header_tag_holding_a_boundary_class_ends_span() {
        let doc = Document::parse(
            "t.html",
            r#"<p><span id="Gen_vchap2-25">25</span>They were not ashamed.</p>
               <h2><span class="psalm">Chapter 3</span></h2>
               <ol><li>stray<a href="study1.html#f77">†</a></li></ol>"#,
        );
        let span = resolve(anchor(&doc, "Gen_vchap2-25"), &HashSet::new());
        assert_eq!(span.end, End::Boundary);
        assert!(hrefs(&span).is_empty());
    }

    #[test]
    fn block_anchor_includes_its_own_content() {
        let doc = Document::parse(
            "t.html",
            r#"<p id="Jude_vchap1-1">Jude, a bondservant</p><p id="Jude_vchap1-2">Mercy</p>"#,
        );
        let span = resolve(anchor(&doc, "Jude_vchap1-1"), &HashSet::new());
        assert_eq!(texts(&span), "Jude, a bondservant");
        assert_eq!(span.end, End::NextAnchor("Jude_vchap1-2".into()));
    }
}
