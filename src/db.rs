use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;

use crate::model::{
    Annotation, AnnotationKind, Book, Corpus, Diagnostic, Format, Passage, PatristicSource,
    Testament,
};

/// The two persisted copies: clean text for readers, raw markup for re-rendering.
pub struct Stores {
    pub clean: Connection,
    pub raw: Connection,
}

impl Stores {
    pub fn open(clean: &Path, raw: &Path) -> Result<Self> {
        let stores = Stores {
            clean: connect(clean)?,
            raw: connect(raw)?,
        };
        stores.init_schema()?;
        Ok(stores)
    }

    pub fn in_memory() -> Result<Self> {
        let stores = Stores {
            clean: Connection::open_in_memory()?,
            raw: Connection::open_in_memory()?,
        };
        stores.init_schema()?;
        Ok(stores)
    }

    fn init_schema(&self) -> Result<()> {
        init_clean_schema(&self.clean)?;
        init_raw_schema(&self.raw)?;
        Ok(())
    }
}

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let conn = Connection::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    Ok(conn)
}

const BOOKS_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS books (
        id            TEXT PRIMARY KEY,
        name          TEXT NOT NULL,
        abbreviations TEXT NOT NULL,
        ord           INTEGER NOT NULL,
        part          INTEGER NOT NULL DEFAULT 0,
        testament     TEXT NOT NULL CHECK(testament IN ('old','new')),
        files         TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS patristic_sources (
        id   TEXT PRIMARY KEY,
        name TEXT NOT NULL
    );";

pub fn init_clean_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(BOOKS_TABLE)?;
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS passages (
            id                 TEXT PRIMARY KEY,
            book_id            TEXT NOT NULL,
            chapter            INTEGER NOT NULL,
            verse              INTEGER NOT NULL,
            text               TEXT NOT NULL,
            format             TEXT NOT NULL CHECK(format IN ('prose','poetry')),
            study_note_ids     TEXT NOT NULL,
            liturgical_ids     TEXT NOT NULL,
            variant_ids        TEXT NOT NULL,
            citation_ids       TEXT NOT NULL,
            article_ids        TEXT NOT NULL,
            cross_ref_targets  TEXT NOT NULL,
            cross_ref_text     TEXT,
            annotation_markers TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_passages_book ON passages(book_id);
        CREATE INDEX IF NOT EXISTS idx_passages_chapter ON passages(book_id, chapter);
        CREATE INDEX IF NOT EXISTS idx_passages_verse ON passages(book_id, chapter, verse);

        CREATE TABLE IF NOT EXISTS annotations (
            id                  TEXT PRIMARY KEY,
            type                TEXT NOT NULL,
            passage_ids         TEXT NOT NULL,
            verse_display       TEXT NOT NULL,
            text                TEXT NOT NULL,
            patristic_citations TEXT NOT NULL,
            scripture_refs      TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_annotations_type ON annotations(type);

        CREATE TABLE IF NOT EXISTS diagnostics (
            id       INTEGER PRIMARY KEY,
            category TEXT NOT NULL,
            subject  TEXT NOT NULL,
            detail   TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_diagnostics_category ON diagnostics(category);

        CREATE TABLE IF NOT EXISTS runs (
            id          INTEGER PRIMARY KEY,
            started_at  TEXT NOT NULL,
            finished_at TEXT NOT NULL,
            books       INTEGER NOT NULL,
            passages    INTEGER NOT NULL,
            annotations INTEGER NOT NULL,
            orphans     INTEGER NOT NULL,
            diagnostics INTEGER NOT NULL
        );
        ",
    )?;
    Ok(())
}

pub fn init_raw_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(BOOKS_TABLE)?;
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS passages (
            id      TEXT PRIMARY KEY,
            book_id TEXT NOT NULL,
            chapter INTEGER NOT NULL,
            verse   INTEGER NOT NULL,
            format  TEXT NOT NULL,
            html    TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_passages_book ON passages(book_id);
        CREATE INDEX IF NOT EXISTS idx_passages_chapter ON passages(book_id, chapter);
        CREATE INDEX IF NOT EXISTS idx_passages_verse ON passages(book_id, chapter, verse);

        CREATE TABLE IF NOT EXISTS annotations (
            id            TEXT PRIMARY KEY,
            type          TEXT NOT NULL,
            passage_ids   TEXT NOT NULL,
            verse_display TEXT NOT NULL,
            html          TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_annotations_type ON annotations(type);
        ",
    )?;
    Ok(())
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SaveCounts {
    pub books: usize,
    pub passages: usize,
    pub annotations: usize,
    pub patristic_sources: usize,
}

/// Replace both copies with the given corpus. Each copy is written in one transaction.
pub fn save_corpus(stores: &Stores, corpus: &Corpus) -> Result<SaveCounts> {
    save_clean(&stores.clean, corpus).context("Failed to write clean store")?;
    save_raw(&stores.raw, corpus).context("Failed to write raw store")?;
    Ok(SaveCounts {
        books: corpus.books.len(),
        passages: corpus.passages.len(),
        annotations: corpus.annotations.len(),
        patristic_sources: corpus.patristic_sources.len(),
    })
}

fn json<T: serde::Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

fn save_books(tx: &rusqlite::Transaction<'_>, corpus: &Corpus) -> Result<()> {
    tx.execute_batch("DELETE FROM books; DELETE FROM patristic_sources;")?;
    let mut b_stmt = tx.prepare(
        "INSERT INTO books (id, name, abbreviations, ord, part, testament, files)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;
    for b in &corpus.books {
        b_stmt.execute(params![
            b.id,
            b.name,
            json(&b.abbreviations)?,
            b.order,
            b.part,
            b.testament.as_str(),
            json(&b.files)?,
        ])?;
    }
    let mut s_stmt = tx.prepare("INSERT INTO patristic_sources (id, name) VALUES (?1, ?2)")?;
    for s in &corpus.patristic_sources {
        s_stmt.execute(params![s.id, s.name])?;
    }
    Ok(())
}

fn save_clean(conn: &Connection, corpus: &Corpus) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    save_books(&tx, corpus)?;
    tx.execute_batch("DELETE FROM passages; DELETE FROM annotations; DELETE FROM diagnostics;")?;
    {
        let mut p_stmt = tx.prepare(
            "INSERT INTO passages
             (id, book_id, chapter, verse, text, format, study_note_ids, liturgical_ids,
              variant_ids, citation_ids, article_ids, cross_ref_targets, cross_ref_text,
              annotation_markers)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14)",
        )?;
        for p in &corpus.passages {
            p_stmt.execute(params![
                p.id,
                p.book_id,
                p.chapter,
                p.verse,
                p.text,
                p.format.as_str(),
                json(&p.study_note_ids)?,
                json(&p.liturgical_ids)?,
                json(&p.variant_ids)?,
                json(&p.citation_ids)?,
                json(&p.article_ids)?,
                json(&p.cross_ref_targets)?,
                p.cross_ref_text,
                json(&p.annotation_markers)?,
            ])?;
        }

        let mut a_stmt = tx.prepare(
            "INSERT INTO annotations
             (id, type, passage_ids, verse_display, text, patristic_citations, scripture_refs)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        for a in &corpus.annotations {
            a_stmt.execute(params![
                a.id,
                a.kind.as_str(),
                json(&a.passage_ids)?,
                a.verse_display,
                a.text,
                json(&a.patristic_citations)?,
                json(&a.scripture_refs)?,
            ])?;
        }

        let mut d_stmt =
            tx.prepare("INSERT INTO diagnostics (category, subject, detail) VALUES (?1, ?2, ?3)")?;
        for d in &corpus.diagnostics {
            d_stmt.execute(params![d.category, d.subject, d.detail])?;
        }
    }
    tx.commit()?;
    Ok(())
}

fn save_raw(conn: &Connection, corpus: &Corpus) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    save_books(&tx, corpus)?;
    tx.execute_batch("DELETE FROM passages; DELETE FROM annotations;")?;
    {
        let mut p_stmt = tx.prepare(
            "INSERT INTO passages (id, book_id, chapter, verse, format, html)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for p in &corpus.passages {
            p_stmt.execute(params![p.id, p.book_id, p.chapter, p.verse, p.format.as_str(), p.html])?;
        }
        let mut a_stmt = tx.prepare(
            "INSERT INTO annotations (id, type, passage_ids, verse_display, html)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for a in &corpus.annotations {
            a_stmt.execute(params![
                a.id,
                a.kind.as_str(),
                json(&a.passage_ids)?,
                a.verse_display,
                a.html
            ])?;
        }
    }
    tx.commit()?;
    Ok(())
}

pub fn record_run(
    conn: &Connection,
    started: DateTime<Utc>,
    finished: DateTime<Utc>,
    corpus: &Corpus,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO runs (started_at, finished_at, books, passages, annotations, orphans, diagnostics)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            started.to_rfc3339(),
            finished.to_rfc3339(),
            corpus.books.len(),
            corpus.passages.len(),
            corpus.annotations.len(),
            corpus.orphans.len(),
            corpus.diagnostics.len(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

// ── Read-back ──

fn from_json<T: DeserializeOwned>(idx: usize, s: String) -> rusqlite::Result<T> {
    serde_json::from_str(&s)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn unknown_value(idx: usize, what: &str, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        Type::Text,
        format!("unknown {} `{}`", what, value).into(),
    )
}

fn load_books(conn: &Connection) -> Result<Vec<Book>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, abbreviations, ord, part, testament, files FROM books ORDER BY ord, part",
    )?;
    let rows = stmt
        .query_map([], |row| {
            let testament: String = row.get(5)?;
            Ok(Book {
                id: row.get(0)?,
                name: row.get(1)?,
                abbreviations: from_json(2, row.get(2)?)?,
                order: row.get(3)?,
                part: row.get(4)?,
                testament: Testament::parse(&testament)
                    .ok_or_else(|| unknown_value(5, "testament", &testament))?,
                files: from_json(6, row.get(6)?)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn load_sources(conn: &Connection) -> Result<Vec<PatristicSource>> {
    let mut stmt = conn.prepare("SELECT id, name FROM patristic_sources ORDER BY id")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(PatristicSource {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Read both copies back into one corpus; markup comes from the raw copy.
pub fn load_corpus(stores: &Stores) -> Result<Corpus> {
    let raw_passages: HashMap<String, String> = stores
        .raw
        .prepare("SELECT id, html FROM passages")?
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<_, _>>()?;
    let raw_annotations: HashMap<String, String> = stores
        .raw
        .prepare("SELECT id, html FROM annotations")?
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<_, _>>()?;

    let mut stmt = stores.clean.prepare(
        "SELECT p.id, p.book_id, p.chapter, p.verse, p.text, p.format, p.study_note_ids,
                p.liturgical_ids, p.variant_ids, p.citation_ids, p.article_ids,
                p.cross_ref_targets, p.cross_ref_text, p.annotation_markers
         FROM passages p
         LEFT JOIN books b ON b.id = p.book_id
         ORDER BY b.ord, b.part, p.chapter, p.verse, p.id",
    )?;
    let passages = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let format: String = row.get(5)?;
            Ok(Passage {
                html: raw_passages.get(&id).cloned().unwrap_or_default(),
                id,
                book_id: row.get(1)?,
                chapter: row.get(2)?,
                verse: row.get(3)?,
                text: row.get(4)?,
                format: Format::parse(&format).ok_or_else(|| unknown_value(5, "format", &format))?,
                study_note_ids: from_json(6, row.get(6)?)?,
                liturgical_ids: from_json(7, row.get(7)?)?,
                variant_ids: from_json(8, row.get(8)?)?,
                citation_ids: from_json(9, row.get(9)?)?,
                article_ids: from_json(10, row.get(10)?)?,
                cross_ref_targets: from_json(11, row.get(11)?)?,
                cross_ref_text: row.get(12)?,
                annotation_markers: from_json(13, row.get(13)?)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = stores.clean.prepare(
        "SELECT id, type, passage_ids, verse_display, text, patristic_citations, scripture_refs
         FROM annotations ORDER BY type, id",
    )?;
    let annotations = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let kind: String = row.get(1)?;
            Ok(Annotation {
                html: raw_annotations.get(&id).cloned().unwrap_or_default(),
                id,
                kind: AnnotationKind::parse(&kind).ok_or_else(|| unknown_value(1, "type", &kind))?,
                passage_ids: from_json(2, row.get(2)?)?,
                verse_display: row.get(3)?,
                text: row.get(4)?,
                patristic_citations: from_json(5, row.get(5)?)?,
                scripture_refs: from_json(6, row.get(6)?)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let diagnostics = stores
        .clean
        .prepare("SELECT category, subject, detail FROM diagnostics ORDER BY id")?
        .query_map([], |row| {
            Ok(Diagnostic {
                category: row.get(0)?,
                subject: row.get(1)?,
                detail: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let orphans = annotations
        .iter()
        .filter(|a| a.passage_ids.is_empty())
        .map(|a| a.id.clone())
        .collect();

    Ok(Corpus {
        books: load_books(&stores.clean)?,
        passages,
        annotations,
        patristic_sources: load_sources(&stores.clean)?,
        orphans,
        diagnostics,
    })
}

/// Primary keys of every table in one copy, for parity checks.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct KeySets {
    pub books: BTreeSet<String>,
    pub passages: BTreeSet<String>,
    pub annotations: BTreeSet<String>,
    pub patristic_sources: BTreeSet<String>,
}

impl KeySets {
    pub fn tables(&self) -> [(&'static str, &BTreeSet<String>); 4] {
        [
            ("books", &self.books),
            ("passages", &self.passages),
            ("annotations", &self.annotations),
            ("patristic_sources", &self.patristic_sources),
        ]
    }
}

pub fn key_sets(conn: &Connection) -> Result<KeySets> {
    let ids = |table: &str| -> Result<BTreeSet<String>> {
        let mut stmt = conn.prepare(&format!("SELECT id FROM {}", table))?;
        let rows = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<BTreeSet<String>, _>>()?;
        Ok(rows)
    };
    Ok(KeySets {
        books: ids("books")?,
        passages: ids("passages")?,
        annotations: ids("annotations")?,
        patristic_sources: ids("patristic_sources")?,
    })
}

// ── Stats ──

pub struct Stats {
    pub books: i64,
    pub passages: i64,
    pub raw_passages: i64,
    pub annotations: Vec<(String, i64)>,
    pub patristic_sources: i64,
    pub orphans: i64,
    pub diagnostics: i64,
    pub last_run: Option<String>,
}

pub fn get_stats(stores: &Stores) -> Result<Stats> {
    let count = |conn: &Connection, sql: &str| -> Result<i64> { Ok(conn.query_row(sql, [], |r| r.get(0))?) };

    let mut stmt = stores
        .clean
        .prepare("SELECT type, COUNT(*) FROM annotations GROUP BY type ORDER BY type")?;
    let annotations = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    let last_run = stores
        .clean
        .query_row("SELECT finished_at FROM runs ORDER BY id DESC LIMIT 1", [], |r| r.get(0))
        .optional()?;

    Ok(Stats {
        books: count(&stores.clean, "SELECT COUNT(*) FROM books")?,
        passages: count(&stores.clean, "SELECT COUNT(*) FROM passages")?,
        raw_passages: count(&stores.raw, "SELECT COUNT(*) FROM passages")?,
        annotations,
        patristic_sources: count(&stores.clean, "SELECT COUNT(*) FROM patristic_sources")?,
        orphans: count(&stores.clean, "SELECT COUNT(*) FROM annotations WHERE passage_ids = '[]'")?,
        diagnostics: count(&stores.clean, "SELECT COUNT(*) FROM diagnostics")?,
        last_run,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AnnotationMarker;

    fn sample() -> Corpus {
        Corpus {
            books: vec![Book {
                id: "genesis".into(),
                name: "Genesis".into(),
                abbreviations: vec!["Gen".into()],
                order: 1,
                part: 0,
                testament: Testament::Old,
                files: vec!["Genesis.html".into()],
            }],
            passages: vec![Passage {
                id: "Gen_vchap1-1".into(),
                book_id: "genesis".into(),
                chapter: 1,
                verse: 1,
                text: "In the beginning".into(),
                html: "<span>I</span>n the beginning".into(),
                format: Format::Prose,
                study_note_ids: vec!["f1".into()],
                liturgical_ids: vec![],
                variant_ids: vec![],
                citation_ids: vec![],
                article_ids: vec![],
                cross_ref_targets: vec![],
                cross_ref_text: None,
                annotation_markers: vec![AnnotationMarker {
                    id: "f1".into(),
                    kind: AnnotationKind::Study,
                    preceding: "In the beginning".into(),
                }],
            }],
            annotations: vec![Annotation {
                id: "f1".into(),
                kind: AnnotationKind::Study,
                passage_ids: vec!["Gen_vchap1-1".into()],
                verse_display: "1:1".into(),
                text: "1:1 note".into(),
                html: "<div>1:1 note</div>".into(),
                patristic_citations: vec![],
                scripture_refs: vec![],
            }],
            patristic_sources: vec![PatristicSource {
                id: "BasilG".into(),
                name: "St. Basil the Great".into(),
            }],
            orphans: vec![],
            diagnostics: vec![Diagnostic::new("duplicate-anchor", "Gen_vchap1-1", "x")],
        }
    }

    #[test]
    fn save_then_load_returns_the_same_corpus() {
        let stores = Stores::in_memory().unwrap();
        let corpus = sample();
        save_corpus(&stores, &corpus).unwrap();
        let loaded = load_corpus(&stores).unwrap();
        assert_eq!(loaded.books, corpus.books);
        assert_eq!(loaded.passages, corpus.passages);
        assert_eq!(loaded.annotations, corpus.annotations);
        assert_eq!(loaded.diagnostics, corpus.diagnostics);
    }

    #[test]
    fn saving_twice_replaces_rather_than_appends() {
        let stores = Stores::in_memory().unwrap();
        let corpus = sample();
        save_corpus(&stores, &corpus).unwrap();
        save_corpus(&stores, &corpus).unwrap();
        let stats = get_stats(&stores).unwrap();
        assert_eq!(stats.passages, 1);
        assert_eq!(stats.raw_passages, 1);
        assert_eq!(stats.diagnostics, 1);
        assert_eq!(key_sets(&stores.clean).unwrap(), key_sets(&stores.raw).unwrap());
    }

    #[test]
    fn run_history_is_kept() {
        let stores = Stores::in_memory().unwrap();
        let now = Utc::now();
        record_run(&stores.clean, now, now, &sample()).unwrap();
        let id = record_run(&stores.clean, now, now, &sample()).unwrap();
        assert_eq!(id, 2);
        assert!(get_stats(&stores).unwrap().last_run.is_some());
    }

    #[test]
    fn fresh_store_has_no_last_run() {
        let stores = Stores::in_memory().unwrap();
        assert_eq!(get_stats(&stores).unwrap().last_run, None);
    }

    #[test]
    fn broken_run_table_is_an_error() {
        let stores = Stores::in_memory().unwrap();
        stores.clean.execute_batch("DROP TABLE runs").unwrap();
        assert!(get_stats(&stores).is_err());
    }
}
