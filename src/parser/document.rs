use std::path::{Path, PathBuf};

use ego_tree::NodeRef;
use scraper::{ElementRef, Html, Node};

use crate::error::ExtractError;

/// Classes that terminate a verse span: chapter header, section header, sub-section header.
pub const BOUNDARY_CLASSES: &[&str] = &["psalm", "sub1", "sub2"];

/// Tags a verse span may continue into when scanning past its host block.
const CONTENT_TAGS: &[&str] = &["p", "div", "ol", "ul"];

const BLOCK_TAGS: &[&str] = &[
    "p", "div", "ol", "ul", "li", "blockquote", "table", "tr", "td", "h1", "h2", "h3", "h4",
    "h5", "h6",
];

/// One parsed markup file.
pub struct Document {
    pub file: String,
    pub html: Html,
}

impl Document {
    pub fn parse(file: &str, markup: &str) -> Self {
        Document {
            file: file.to_string(),
            html: Html::parse_document(markup),
        }
    }

    pub fn root(&self) -> NodeRef<'_, Node> {
        self.html.tree.root()
    }
}

/// Navigation-only files (tables of contents) carry no verse content.
pub fn is_navigation(file: &str) -> bool {
    file.to_ascii_lowercase().contains("toc")
}

/// Read and parse a file; `Ok(None)` for navigation files.
pub fn load(dir: &Path, file: &str) -> Result<Option<Document>, ExtractError> {
    if is_navigation(file) {
        tracing::debug!(file, "skipping navigation file");
        return Ok(None);
    }
    let markup = read(&dir.join(file))?;
    Ok(Some(Document::parse(file, &markup)))
}

pub fn read(path: &Path) -> Result<String, ExtractError> {
    std::fs::read_to_string(path).map_err(|source| ExtractError::Unreadable {
        path: PathBuf::from(path),
        source,
    })
}

// ── Element predicates ──

pub fn element(node: NodeRef<'_, Node>) -> Option<&scraper::node::Element> {
    node.value().as_element()
}

pub fn tag_is(node: NodeRef<'_, Node>, names: &[&str]) -> bool {
    element(node).is_some_and(|e| names.contains(&e.name()))
}

pub fn has_class(node: NodeRef<'_, Node>, class: &str) -> bool {
    element(node).is_some_and(|e| e.classes().any(|c| c == class))
}

pub fn is_block(node: NodeRef<'_, Node>) -> bool {
    tag_is(node, BLOCK_TAGS)
}

pub fn is_list(node: NodeRef<'_, Node>) -> bool {
    tag_is(node, &["ol", "ul"])
}

pub fn is_content(node: NodeRef<'_, Node>) -> bool {
    tag_is(node, CONTENT_TAGS)
}

pub fn is_boundary(node: NodeRef<'_, Node>) -> bool {
    element(node).is_some_and(|e| e.classes().any(|c| BOUNDARY_CLASSES.contains(&c)))
}

/// Inline essay containers: `<div style="background-color: gray;">`.
pub fn is_article_container(node: NodeRef<'_, Node>) -> bool {
    element(node).is_some_and(|e| {
        e.name() == "div"
            && e.attr("style")
                .is_some_and(|s| s.contains("background-color") && s.contains("gray"))
    })
}

pub fn id_of<'a>(node: NodeRef<'a, Node>) -> Option<&'a str> {
    node.value().as_element().and_then(|e| e.id())
}

pub fn href_of<'a>(node: NodeRef<'a, Node>) -> Option<&'a str> {
    node.value()
        .as_element()
        .filter(|e| e.name() == "a")
        .and_then(|e| e.attr("href"))
}

/// Whether any ancestor (or the node itself) has the given tag.
pub fn within(node: NodeRef<'_, Node>, tag: &str) -> bool {
    std::iter::once(node)
        .chain(node.ancestors())
        .any(|n| element(n).is_some_and(|e| e.name() == tag))
}

/// Concatenated text of a subtree with whitespace collapsed.
pub fn plain_text(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
