use std::collections::HashMap;

/// Substring that marks an element id as a verse anchor candidate.
pub const ANCHOR_MARK: &str = "_vchap";

/// A verse anchor token split once into its parts. Downstream code carries
/// `chapter`/`verse` as typed fields and never re-derives them from `id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerseRef {
    pub id: String,
    pub abbreviation: String,
    pub chapter: u32,
    pub verse: u32,
}

impl VerseRef {
    /// Decompose `{Abbrev}_vchap{Chapter}-{Verse}`; `None` when the token is malformed.
    pub fn parse(token: &str) -> Option<Self> {
        let (abbreviation, rest) = token.split_once(ANCHOR_MARK)?;
        if abbreviation.is_empty() || !abbreviation.chars().all(|c| c.is_ascii_alphanumeric()) {
            return None;
        }
        let (chapter, verse) = rest.split_once('-')?;
        Some(VerseRef {
            id: token.to_string(),
            abbreviation: abbreviation.to_string(),
            chapter: parse_number(chapter)?,
            verse: parse_number(verse)?,
        })
    }
}

fn parse_number(s: &str) -> Option<u32> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// True when an element id looks like it is meant to be a verse anchor.
pub fn is_anchor_candidate(id: &str) -> bool {
    id.contains(ANCHOR_MARK)
}

/// The fragment of a link (`Isaiah.html#Isa_vchap7-14` → `Isa_vchap7-14`).
pub fn fragment(href: &str) -> Option<&str> {
    href.split_once('#').map(|(_, f)| f).filter(|f| !f.is_empty())
}

/// Abbreviation → book id lookup shared by every pass that needs to resolve a token.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    by_abbreviation: HashMap<String, String>,
}

impl Registry {
    pub fn insert(&mut self, abbreviation: &str, book_id: &str) {
        self.by_abbreviation
            .insert(abbreviation.to_string(), book_id.to_string());
    }

    pub fn book_for(&self, abbreviation: &str) -> Option<&str> {
        self.by_abbreviation.get(abbreviation).map(String::as_str)
    }

    /// Resolve a link target to a known verse reference.
    pub fn resolve(&self, token: &str) -> Option<VerseRef> {
        VerseRef::parse(token).filter(|r| self.by_abbreviation.contains_key(&r.abbreviation))
    }

    pub fn len(&self) -> usize {
        self.by_abbreviation.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_anchor() {
        let r = VerseRef::parse("Gen_vchap1-1").unwrap();
        assert_eq!(r.abbreviation, "Gen");
        assert_eq!((r.chapter, r.verse), (1, 1));
    }

    #[test]
    fn parses_numeric_prefix() {
        let r = VerseRef::parse("1Kgdm_vchap17-40").unwrap();
        assert_eq!(r.abbreviation, "1Kgdm");
        assert_eq!((r.chapter, r.verse), (17, 40));
    }

    #[test]
    fn rejects_malformed_tokens() {
        for bad in [
            "Gen_vchap1",
            "Gen_vchapA-1",
            "_vchap1-1",
            "Gen_vchap1-",
            "Ge n_vchap1-1",
            "Gen_vchap1-2-3",
        ] {
            assert!(VerseRef::parse(bad).is_none(), "{bad} should be rejected");
        }
    }

    #[test]
    fn fragment_of_href() {
        assert_eq!(fragment("Isaiah.html#Isa_vchap7-14"), Some("Isa_vchap7-14"));
        assert_eq!(fragment("#f12"), Some("f12"));
        assert_eq!(fragment("Isaiah.html"), None);
        assert_eq!(fragment("Isaiah.html#"), None);
    }

    #[test]
    fn registry_resolves_known_abbreviations_only() {
        let mut reg = Registry::default();
        reg.insert("Gen", "genesis");
        assert_eq!(reg.resolve("Gen_vchap2-4").map(|r| r.verse), Some(4));
        assert!(reg.resolve("Exod_vchap2-4").is_none());
        assert_eq!(reg.book_for("Gen"), Some("genesis"));
    }
}
