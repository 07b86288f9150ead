use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

use quick_xml::events::Event;
use regex::Regex;

use super::document::read;
use crate::error::ExtractError;
use crate::model::Testament;

pub const MANIFEST_FILE: &str = "content.opf";

/// First order number of the New Testament (Matthew).
pub const NT_START_ORDER: u32 = 50;

static BOOK_ITEM_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^RW_(\d+)_(.+?)(\d*)$").unwrap());

/// Files the manifest assigns to one book, in reading order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookGroup {
    pub id: String,
    pub name: String,
    pub order: u32,
    pub testament: Testament,
    pub files: Vec<String>,
}

struct Entry {
    suffix: u32,
    href: String,
    order: u32,
    name: String,
}

pub fn load(dir: &Path) -> Result<Vec<BookGroup>, ExtractError> {
    let path = dir.join(MANIFEST_FILE);
    let xml = read(&path)?;
    parse(&xml).map_err(|reason| ExtractError::Manifest { path, reason })
}

/// Group `RW_<order>_<Name><suffix>` items into books.
pub fn parse(xml: &str) -> Result<Vec<BookGroup>, String> {
    let mut reader = quick_xml::Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut grouped: HashMap<String, Vec<Entry>> = HashMap::new();
    let mut seen_items = 0usize;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.local_name().as_ref() == b"item" => {
                seen_items += 1;
                let mut id = String::new();
                let mut href = String::new();
                for attr in e.attributes() {
                    let attr = attr.map_err(|e| e.to_string())?;
                    let value = attr.unescape_value().map_err(|e| e.to_string())?.to_string();
                    match attr.key.local_name().as_ref() {
                        b"id" => id = value,
                        b"href" => href = value,
                        _ => {}
                    }
                }
                if let Some((book_id, entry)) = book_entry(&id, &href) {
                    grouped.entry(book_id).or_default().push(entry);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("at byte {}: {}", reader.buffer_position(), e)),
            _ => {}
        }
        buf.clear();
    }

    if seen_items == 0 {
        return Err("no manifest items".into());
    }

    let mut groups: Vec<BookGroup> = grouped
        .into_iter()
        .map(|(id, mut entries)| {
            entries.sort_by_key(|e| e.suffix);
            let first = &entries[0];
            BookGroup {
                name: first.name.replace('_', " "),
                order: first.order,
                testament: testament_for(first.order),
                files: entries.iter().map(|e| e.href.clone()).collect(),
                id,
            }
        })
        .collect();
    groups.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));
    Ok(groups)
}

fn book_entry(id: &str, href: &str) -> Option<(String, Entry)> {
    if !href.ends_with(".html") {
        return None;
    }
    let caps = BOOK_ITEM_RE.captures(id)?;
    let name = caps[2].to_string();
    if name.to_lowercase().contains("_toc") {
        return None;
    }
    let entry = Entry {
        suffix: caps[3].parse().unwrap_or(0),
        href: href.to_string(),
        order: caps[1].parse().ok()?,
        name,
    };
    Some((entry.name.to_lowercase().replace('_', ""), entry))
}

pub fn testament_for(order: u32) -> Testament {
    if order >= NT_START_ORDER {
        Testament::New
    } else {
        Testament::Old
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPF: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0">
  <manifest>
    <item id="RW_01_Genesis1" href="Genesis1.html" media-type="application/xhtml+xml"/>
    <item id="RW_01_Genesis" href="Genesis.html" media-type="application/xhtml+xml"/>
    <item id="RW_01_Genesis_toc" href="Genesis_toc.html" media-type="application/xhtml+xml"/>
    <item id="RW_09_1_Kingdoms" href="1Kingdoms.html" media-type="application/xhtml+xml"/>
    <item id="RW_50_Matthew" href="Matthew.html" media-type="application/xhtml+xml"/>
    <item id="study1" href="study1.html" media-type="application/xhtml+xml"/>
    <item id="RW_02_Cover" href="cover.jpg" media-type="image/jpeg"/>
  </manifest>
</package>"#;

    #[test]
    fn groups_files_per_book_in_reading_order() {
        let groups = parse(OPF).unwrap();
        let ids: Vec<_> = groups.iter().map(|g| g.id.as_str()).collect();
        assert_eq!(ids, ["genesis", "1kingdoms", "matthew"]);
        assert_eq!(groups[0].files, ["Genesis.html", "Genesis1.html"]);
        assert_eq!(groups[1].name, "1 Kingdoms");
    }

    #[test]
    fn testament_follows_order() {
        let groups = parse(OPF).unwrap();
        assert_eq!(groups[0].testament, Testament::Old);
        assert_eq!(groups[2].testament, Testament::New);
        assert_eq!(groups[2].order, 50);
    }

    #[test]
    fn empty_manifest_is_an_error() {
        assert!(parse("<package><manifest></manifest></package>").is_err());
    }
}
