use std::collections::HashSet;
use std::sync::LazyLock;

use ego_tree::iter::Edge;
use ego_tree::{NodeId, NodeRef};
use regex::Regex;
use scraper::{ElementRef, Node};

use super::anchors::{fragment, is_anchor_candidate};
use super::boundary::subtree_events;
use super::document::{has_class, href_of, id_of, is_article_container, tag_is, Document};
use super::text::render;

static WORD_GAP_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\s\u{a0}]{2,}").unwrap());
static SLUG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

const SLUG_MAX: usize = 30;

/// An inline topical essay lifted out of a book file.
#[derive(Debug, Clone)]
pub struct Essay {
    pub id: String,
    pub title: String,
    pub text: String,
    pub html: String,
    /// Raw id of the first verse anchor after the container, if any.
    pub following: Option<String>,
    /// Verse tokens linked from inside the essay, unresolved.
    pub links: Vec<String>,
}

/// Result of the article pre-pass: the essays, plus the container nodes the
/// structural scanner must treat as absent.
#[derive(Debug, Default)]
pub struct ArticlePass {
    pub essays: Vec<Essay>,
    pub excluded: HashSet<NodeId>,
}

/// Locate essay containers and link each to the next verse anchor in document order.
pub fn extract(doc: &Document) -> ArticlePass {
    let mut pass = ArticlePass::default();
    let mut pending: Vec<usize> = Vec::new();
    let mut skipping: Option<NodeId> = None;

    for edge in doc.root().traverse() {
        match edge {
            Edge::Open(node) => {
                if skipping.is_some() {
                    continue;
                }
                if is_article_container(node) {
                    pass.excluded.insert(node.id());
                    skipping = Some(node.id());
                    if let Some(essay) = build_essay(node) {
                        pending.push(pass.essays.len());
                        pass.essays.push(essay);
                    } else {
                        tracing::debug!(file = %doc.file, "essay container without a title, skipped");
                    }
                    continue;
                }
                if let Some(id) = id_of(node).filter(|id| is_anchor_candidate(id)) {
                    for i in pending.drain(..) {
                        pass.essays[i].following = Some(id.to_string());
                    }
                }
            }
            Edge::Close(node) => {
                if skipping == Some(node.id()) {
                    skipping = None;
                }
            }
        }
    }

    pass
}

fn build_essay(container: NodeRef<'_, Node>) -> Option<Essay> {
    let title_p = container
        .descendants()
        .find(|n| tag_is(*n, &["p"]) && has_class(*n, "ct"))?;
    let title = collapse_spaced_title(title_p);
    let id = match id_of(title_p) {
        Some(id) => id.to_string(),
        None => slugify(&title),
    };
    if id.is_empty() {
        return None;
    }

    let mut parts = vec![title.clone(), String::new()];
    for p in container.descendants().filter(|n| tag_is(*n, &["p"])) {
        if has_class(p, "ct") {
            continue;
        }
        let text = render(&subtree_events(p), false).text;
        if text.is_empty() {
            continue;
        }
        if has_class(p, "sub1") {
            parts.push(String::new());
            if text == text.to_lowercase() {
                parts.push(text.to_uppercase());
            } else {
                parts.push(text);
            }
        } else if has_class(p, "ext") {
            parts.push(format!("    {}", text));
        } else {
            parts.push(text);
        }
    }

    let links = container
        .descendants()
        .filter_map(href_of)
        .filter_map(fragment)
        .filter(|f| is_anchor_candidate(f))
        .map(str::to_string)
        .collect();

    Some(Essay {
        id,
        title,
        text: parts.join("\n").trim().to_string(),
        html: ElementRef::wrap(container)
            .map(|el| el.html())
            .unwrap_or_default(),
        following: None,
        links,
    })
}

/// `T H E  H O L Y` → `THE HOLY`: single gaps sit between letters, wider gaps
/// (or separate text nodes) between words.
fn collapse_spaced_title(title_p: NodeRef<'_, Node>) -> String {
    let joined = title_p
        .descendants()
        .filter_map(|n| n.value().as_text())
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("  ");

    WORD_GAP_RE
        .split(&joined)
        .map(|word| {
            let letters: Vec<&str> = word.split(|c: char| c.is_whitespace()).collect();
            if letters.iter().all(|l| l.chars().count() == 1) {
                letters.concat()
            } else {
                letters.join(" ")
            }
        })
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn slugify(title: &str) -> String {
    let slug = SLUG_RE.replace_all(&title.to_lowercase(), "_").to_string();
    slug.trim_matches('_').chars().take(SLUG_MAX).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOOK: &str = r#"
        <div class="chapter">
          <p class="tx"><span id="Gen_vchap1-1">1</span>In the beginning.</p>
          <div style="background-color: gray;">
            <p class="ct" id="creation">T H E&#160;&#160;C R E A T I O N</p>
            <p class="sub1">the six days</p>
            <p class="tx">God made all things <i>ex nihilo</i>; see <a href="Genesis.html#Gen_vchap1-1">1:1</a>.</p>
            <p class="ext">Quoted passage.</p>
          </div>
          <p class="tx"><span id="Gen_vchap1-2">2</span>The earth was invisible.</p>
        </div>"#;

    #[test]
    fn essay_links_forward_to_next_anchor() {
        let doc = Document::parse("Genesis.html", BOOK);
        let pass = extract(&doc);
        assert_eq!(pass.essays.len(), 1);
        let essay = &pass.essays[0];
        assert_eq!(essay.id, "creation");
        assert_eq!(essay.following.as_deref(), Some("Gen_vchap1-2"));
        assert_eq!(essay.links, vec!["Gen_vchap1-1".to_string()]);
        assert_eq!(pass.excluded.len(), 1);
    }

    #[test]
    fn essay_text_layout() {
        let doc = Document::parse("Genesis.html", BOOK);
        let essay = &extract(&doc).essays[0];
        assert_eq!(essay.title, "THE CREATION");
        let lines: Vec<&str> = essay.text.lines().collect();
        assert_eq!(lines[0], "THE CREATION");
        assert!(lines.contains(&"THE SIX DAYS"));
        assert!(lines.contains(&"God made all things <i>ex nihilo</i>; see 1:1."));
        assert!(lines.contains(&"    Quoted passage."));
    }

    #[test]
    fn untitled_id_falls_back_to_slug() {
        let doc = Document::parse(
            "x.html",
            r#"<div style="background-color:gray"><p class="ct">The Holy Trinity</p></div>
               <p><span id="Matt_vchap3-16">16</span>text</p>"#,
        );
        let pass = extract(&doc);
        assert_eq!(pass.essays[0].id, "the_holy_trinity");
        assert_eq!(pass.essays[0].following.as_deref(), Some("Matt_vchap3-16"));
    }

    #[test]
    fn trailing_essay_has_no_forward_link() {
        let doc = Document::parse(
            "x.html",
            r#"<p><span id="Rev_vchap22-21">21</span>Amen.</p>
               <div style="background-color: gray"><p class="ct" id="end">E N D</p></div>"#,
        );
        let pass = extract(&doc);
        assert_eq!(pass.essays[0].following, None);
    }

    #[test]
    fn anchors_inside_container_do_not_count() {
        let doc = Document::parse(
            "x.html",
            r#"<div style="background-color: gray"><p class="ct" id="a">A</p>
                 <p id="Gen_vchap9-9">inside</p></div>
               <p id="Gen_vchap1-3">after</p>"#,
        );
        let pass = extract(&doc);
        assert_eq!(pass.essays[0].following.as_deref(), Some("Gen_vchap1-3"));
    }
}
