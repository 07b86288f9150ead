use std::sync::LazyLock;

use ego_tree::{NodeId, NodeRef};
use regex::Regex;
use scraper::Node;

use super::boundary::SpanEvent;
use super::document::{element, is_block, tag_is, within};
use super::markers::strips_text;

/// Private-use sentinel for structural line breaks, so source newlines can be collapsed freely.
const LINE_BREAK: char = '\u{E000}';
const MARKER_GLYPHS: &[char] = &['†', '‡', 'ω'];
const VOID_TAGS: &[&str] = &["br", "img", "hr", "wbr"];

static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static BREAK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\x{E000}[\s\x{E000}]*").unwrap());
static EMPTY_I_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<i>\s*</i>").unwrap());
static EMPTY_B_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<b>\s*</b>").unwrap());
static LEADING_NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+\s+").unwrap());

/// Clean text (italic/bold only) and raw markup for one span.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rendered {
    pub text: String,
    pub html: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Style {
    italic: bool,
    bold: bool,
}

#[derive(Default)]
struct CleanWriter {
    out: String,
    style: Style,
    /// Non-whitespace characters written so far, verse numbers excluded.
    seen_text: bool,
    drop_cap: Option<NodeId>,
    glue: bool,
}

impl CleanWriter {
    fn text(&mut self, node: NodeRef<'_, Node>, raw: &str) {
        let chunk = raw;
        if self.glue && !chunk.is_empty() {
            self.glue = false;
            // Only a word continuing directly after the capital joins it.
            if chunk.starts_with(char::is_lowercase) {
                let kept = self.out.trim_end().len();
                self.out.truncate(kept);
            }
        }
        if chunk.trim().is_empty() {
            self.out.push_str(chunk);
            return;
        }
        // Verse and chapter numbers arrive as their own digit-only text node.
        if !self.seen_text && chunk.trim().bytes().all(|b| b.is_ascii_digit()) {
            self.out.push(' ');
            return;
        }
        self.seen_text = true;
        self.switch(Style {
            italic: within(node, "i") || within(node, "em"),
            bold: within(node, "b") || within(node, "strong"),
        });
        self.out.push_str(chunk);
    }

    fn switch(&mut self, next: Style) {
        if next == self.style {
            return;
        }
        // Closing tags go before trailing whitespace, opening tags after it.
        let trail = self.out.len() - self.out.trim_end().len();
        let ws = self.out.split_off(self.out.len() - trail);
        if self.style.italic {
            self.out.push_str("</i>");
        }
        if self.style.bold {
            self.out.push_str("</b>");
        }
        self.out.push_str(&ws);
        if next.bold {
            self.out.push_str("<b>");
        }
        if next.italic {
            self.out.push_str("<i>");
        }
        self.style = next;
    }

    fn finish(mut self, poetry: bool) -> String {
        self.switch(Style::default());
        clean(&self.out, poetry)
    }
}

#[derive(Default)]
struct RawWriter {
    out: String,
    open: Vec<NodeId>,
}

impl RawWriter {
    fn open(&mut self, node: NodeRef<'_, Node>) {
        let Some(el) = element(node) else {
            return;
        };
        self.out.push('<');
        self.out.push_str(el.name());
        let mut attrs: Vec<_> = el.attrs().collect();
        attrs.sort_unstable();
        for (name, value) in attrs {
            self.out.push(' ');
            self.out.push_str(name);
            self.out.push_str("=\"");
            self.out.push_str(&escape(value, true));
            self.out.push('"');
        }
        if VOID_TAGS.contains(&el.name()) {
            self.out.push_str("/>");
        } else {
            self.out.push('>');
            self.open.push(node.id());
        }
    }

    /// Only closes what this span opened; ancestors on the path are left alone.
    fn close(&mut self, node: NodeRef<'_, Node>) {
        if self.open.last() == Some(&node.id()) {
            self.open.pop();
            if let Some(el) = element(node) {
                self.out.push_str(&format!("</{}>", el.name()));
            }
        }
    }

    fn finish(mut self, events: &[SpanEvent<'_>]) -> String {
        while let Some(id) = self.open.pop() {
            let name = events.iter().find_map(|e| match e {
                SpanEvent::Open(n) if n.id() == id => element(*n).map(|el| el.name()),
                _ => None,
            });
            if let Some(name) = name {
                self.out.push_str(&format!("</{}>", name));
            }
        }
        self.out.trim().to_string()
    }
}

/// Render a span into clean text plus balanced raw markup.
pub fn render(events: &[SpanEvent<'_>], poetry: bool) -> Rendered {
    let mut clean = CleanWriter::default();
    let mut raw = RawWriter::default();
    let mut skipping: Option<NodeId> = None;

    for event in events {
        match *event {
            SpanEvent::Open(node) => {
                raw.open(node);
                if skipping.is_some() {
                    continue;
                }
                if tag_is(node, &["a"]) && strips_text(node) {
                    skipping = Some(node.id());
                    continue;
                }
                if tag_is(node, &["br"]) {
                    clean.out.push(if poetry { LINE_BREAK } else { ' ' });
                } else if is_block(node) {
                    clean.out.push(' ');
                } else if !clean.seen_text && is_drop_cap(node) {
                    clean.drop_cap = Some(node.id());
                }
            }
            SpanEvent::Close(node) => {
                raw.close(node);
                if skipping == Some(node.id()) {
                    skipping = None;
                    continue;
                }
                if skipping.is_some() {
                    continue;
                }
                if clean.drop_cap == Some(node.id()) {
                    clean.drop_cap = None;
                    clean.glue = true;
                } else if poetry && tag_is(node, &["li"]) {
                    clean.out.push(LINE_BREAK);
                } else if is_block(node) {
                    clean.out.push(' ');
                }
            }
            SpanEvent::Text(node, t) => {
                raw.out.push_str(&escape(t, false));
                if skipping.is_none() {
                    clean.text(node, t);
                }
            }
        }
    }

    Rendered {
        text: clean.finish(poetry),
        html: raw.finish(events),
    }
}

/// An inline wrapper holding nothing but one capital letter.
fn is_drop_cap(node: NodeRef<'_, Node>) -> bool {
    if is_block(node) || !node.value().is_element() {
        return false;
    }
    let text: String = node
        .descendants()
        .filter_map(|n| n.value().as_text())
        .flat_map(|t| t.chars())
        .filter(|c| !c.is_whitespace())
        .collect();
    let mut chars = text.chars();
    matches!((chars.next(), chars.next()), (Some(c), None) if c.is_uppercase())
}

/// Final text normalization shared by verses, notes and essays.
pub fn clean(s: &str, poetry: bool) -> String {
    let s: String = s.chars().filter(|c| !MARKER_GLYPHS.contains(c)).collect();
    let s = EMPTY_I_RE.replace_all(&s, "");
    let s = EMPTY_B_RE.replace_all(&s, "");
    let s = WS_RE.replace_all(&s, " ");
    let s = if poetry {
        BREAK_RE.replace_all(&s, "\n").to_string()
    } else {
        s.replace(LINE_BREAK, " ")
    };
    let s = s.trim().trim_matches(LINE_BREAK).trim();
    let s = LEADING_NUMBER_RE.replace(s, "");
    s.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Whitespace-collapsed plain text without marker glyphs.
pub fn normalize_plain(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .filter(|c| !MARKER_GLYPHS.contains(c))
        .collect::<String>()
        .trim()
        .to_string()
}

fn escape(s: &str, attribute: bool) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            '\u{a0}' if !attribute => out.push_str("&#160;"),
            c => out.push(c),
        }
    }
    out
}
