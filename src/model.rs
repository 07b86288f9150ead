use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Testament {
    Old,
    New,
}

impl Testament {
    pub fn as_str(self) -> &'static str {
        match self {
            Testament::Old => "old",
            Testament::New => "new",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "old" => Some(Testament::Old),
            "new" => Some(Testament::New),
            _ => None,
        }
    }
}

/// Structural regime a verse anchor was found under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Prose,
    Poetry,
}

impl Format {
    pub fn as_str(self) -> &'static str {
        match self {
            Format::Prose => "prose",
            Format::Poetry => "poetry",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "prose" => Some(Format::Prose),
            "poetry" => Some(Format::Poetry),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationKind {
    Study,
    Liturgical,
    Variant,
    Citation,
    Article,
}

impl AnnotationKind {
    pub const ALL: [AnnotationKind; 5] = [
        AnnotationKind::Study,
        AnnotationKind::Liturgical,
        AnnotationKind::Variant,
        AnnotationKind::Citation,
        AnnotationKind::Article,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AnnotationKind::Study => "study",
            AnnotationKind::Liturgical => "liturgical",
            AnnotationKind::Variant => "variant",
            AnnotationKind::Citation => "citation",
            AnnotationKind::Article => "article",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub id: String,
    pub name: String,
    pub abbreviations: Vec<String>,
    pub order: u32,
    /// Position inside a multi-text file; 0 for ordinary books.
    pub part: u32,
    pub testament: Testament,
    pub files: Vec<String>,
}

/// An annotation marker as it sat in the verse text, kept for precise rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationMarker {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: AnnotationKind,
    pub preceding: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passage {
    pub id: String,
    pub book_id: String,
    pub chapter: u32,
    pub verse: u32,
    pub text: String,
    pub html: String,
    pub format: Format,
    pub study_note_ids: Vec<String>,
    pub liturgical_ids: Vec<String>,
    pub variant_ids: Vec<String>,
    pub citation_ids: Vec<String>,
    pub article_ids: Vec<String>,
    pub cross_ref_targets: Vec<String>,
    pub cross_ref_text: Option<String>,
    pub annotation_markers: Vec<AnnotationMarker>,
}

impl Passage {
    pub fn ids_for(&self, kind: AnnotationKind) -> &[String] {
        match kind {
            AnnotationKind::Study => &self.study_note_ids,
            AnnotationKind::Liturgical => &self.liturgical_ids,
            AnnotationKind::Variant => &self.variant_ids,
            AnnotationKind::Citation => &self.citation_ids,
            AnnotationKind::Article => &self.article_ids,
        }
    }

    pub fn ids_for_mut(&mut self, kind: AnnotationKind) -> &mut Vec<String> {
        match kind {
            AnnotationKind::Study => &mut self.study_note_ids,
            AnnotationKind::Liturgical => &mut self.liturgical_ids,
            AnnotationKind::Variant => &mut self.variant_ids,
            AnnotationKind::Citation => &mut self.citation_ids,
            AnnotationKind::Article => &mut self.article_ids,
        }
    }

    /// Every annotation id on this passage, paired with the field it came from.
    pub fn all_annotation_ids(&self) -> impl Iterator<Item = (AnnotationKind, &String)> {
        AnnotationKind::ALL
            .into_iter()
            .flat_map(move |k| self.ids_for(k).iter().map(move |id| (k, id)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: AnnotationKind,
    pub passage_ids: Vec<String>,
    pub verse_display: String,
    pub text: String,
    pub html: String,
    pub patristic_citations: Vec<String>,
    pub scripture_refs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatristicSource {
    pub id: String,
    pub name: String,
}

/// A recovered-and-reported anomaly noticed during extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub category: String,
    pub subject: String,
    pub detail: String,
}

impl Diagnostic {
    pub fn new(category: &str, subject: impl Into<String>, detail: impl Into<String>) -> Self {
        Diagnostic {
            category: category.to_string(),
            subject: subject.into(),
            detail: detail.into(),
        }
    }
}

/// The full, immutable output of one extraction run.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    pub books: Vec<Book>,
    pub passages: Vec<Passage>,
    pub annotations: Vec<Annotation>,
    pub patristic_sources: Vec<PatristicSource>,
    /// Annotation ids that resolved to zero passages.
    pub orphans: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Corpus {
    pub fn annotation_counts(&self) -> Vec<(AnnotationKind, usize)> {
        AnnotationKind::ALL
            .into_iter()
            .map(|k| (k, self.annotations.iter().filter(|a| a.kind == k).count()))
            .collect()
    }
}
