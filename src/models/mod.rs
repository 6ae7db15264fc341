//! Core data models for the paper QA system.
//!
//! This module contains the data structures shared across the application:
//! paper records as loaded into the store, documents as handed to the reader,
//! and answers as rendered by the dashboard.

use serde::{Deserialize, Deserializer, Serialize};

/// A single arXiv paper with its precomputed abstract embedding.
///
/// Records are created once by the bulk loader and are read-only afterward.
/// Field names follow the arXiv metadata dump so records deserialize directly
/// from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperRecord {
    /// arXiv identifier (e.g. "2104.08821")
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,

    /// Paper title
    pub title: String,

    /// Abstract text
    #[serde(rename = "abstract")]
    pub abstract_text: String,

    /// Author list as a single string
    #[serde(default)]
    pub authors: String,

    /// Comma or space separated category codes (e.g. "cs.LG, stat.ML")
    #[serde(default)]
    pub categories: String,

    /// Submission year, kept as a string because it is indexed as a tag
    #[serde(deserialize_with = "string_or_number")]
    pub year: String,

    /// Last update date
    #[serde(default)]
    pub update_date: Option<String>,

    /// Journal reference
    #[serde(default, rename = "journal-ref")]
    pub journal_ref: Option<String>,

    /// Submitter name
    #[serde(default)]
    pub submitter: Option<String>,

    /// DOI
    #[serde(default)]
    pub doi: Option<String>,

    /// Precomputed embedding of the abstract
    pub vector: Vec<f32>,
}

impl PaperRecord {
    /// Flatten the record into hash fields, excluding the vector.
    ///
    /// Missing optional values are written as empty strings.
    pub fn to_fields(&self) -> Vec<(&'static str, String)> {
        let opt = |value: &Option<String>| value.clone().unwrap_or_default();
        vec![
            ("paper_id", self.id.clone()),
            ("categories", self.categories.clone()),
            ("title", self.title.clone()),
            ("year", self.year.clone()),
            ("authors", self.authors.clone()),
            ("abstract", self.abstract_text.clone()),
            ("update_date", opt(&self.update_date)),
            ("doi", opt(&self.doi)),
            ("journal-ref", opt(&self.journal_ref)),
            ("submitter", opt(&self.submitter)),
        ]
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Int(i64),
        Float(f64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Str(s) => s,
        Raw::Int(i) => i.to_string(),
        Raw::Float(f) => f.to_string(),
    })
}

/// Filters applied to a retrieval.
///
/// Both lists are optional; empty lists mean "no constraint".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filters {
    /// Years to match, as strings
    #[serde(default)]
    pub date_range: Vec<String>,

    /// Category codes to match
    #[serde(default)]
    pub categories: Vec<String>,
}

impl Filters {
    /// Build a year filter covering `start..=end`.
    pub fn from_year_range(start: i32, end: i32) -> Self {
        Self {
            date_range: (start..=end).map(|y| y.to_string()).collect(),
            categories: Vec::new(),
        }
    }

    /// Add category codes to the filter.
    pub fn with_categories(mut self, categories: Vec<String>) -> Self {
        self.categories = categories;
        self
    }
}

/// Metadata carried by a retrieved document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMeta {
    /// Paper title
    pub name: String,

    /// Raw category string
    pub categories: String,

    /// Last update date, empty when unknown
    pub update_date: String,
}

/// A retrieved abstract in the uniform shape consumed by the reader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Paper identifier
    pub id: String,

    /// Abstract text
    pub content: String,

    /// Always "text" for abstracts
    pub content_type: String,

    /// Paper metadata
    pub meta: DocumentMeta,

    /// Relevance score reported by the store
    pub score: f32,

    /// Stored vector, only populated when explicitly requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

/// Character offsets of an answer inside its context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    /// Start offset (inclusive)
    pub start: usize,

    /// End offset (exclusive)
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// An extracted answer span together with its source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    /// The extracted text
    pub answer: String,

    /// Reader confidence (0.0 to 1.0)
    pub score: f32,

    /// The text the answer was extracted from
    pub context: String,

    /// Identifier of the source document
    pub document_id: String,

    /// Position of the answer inside `context`
    pub offsets_in_document: Span,

    /// Metadata of the source document
    pub meta: DocumentMeta,
}

/// Sort answers by descending score.
pub fn sort_by_score(answers: &mut [Answer]) {
    answers.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paper_record_from_arxiv_json() {
        let json = r#"{
            "id": 704.0001,
            "title": "Calculation of prompt diphoton production",
            "abstract": "A fully differential calculation",
            "authors": "C. Balazs, E. L. Berger",
            "categories": "hep-ph",
            "year": 2007,
            "update_date": "2008-11-13",
            "journal-ref": "Phys.Rev.D76:013009,2007",
            "submitter": null,
            "doi": "10.1103/PhysRevD.76.013009",
            "vector": [0.5, -1.0]
        }"#;

        let record: PaperRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.id, "704.0001");
        assert_eq!(record.year, "2007");
        assert_eq!(record.journal_ref.as_deref(), Some("Phys.Rev.D76:013009,2007"));
        assert!(record.submitter.is_none());
        assert_eq!(record.vector, vec![0.5, -1.0]);
    }

    #[test]
    fn test_to_fields_excludes_vector() {
        let record = PaperRecord {
            id: "1".to_string(),
            title: "T".to_string(),
            abstract_text: "A".to_string(),
            authors: String::new(),
            categories: "cs.LG".to_string(),
            year: "2020".to_string(),
            update_date: None,
            journal_ref: None,
            submitter: Some("someone".to_string()),
            doi: None,
            vector: vec![1.0; 4],
        };

        let fields = record.to_fields();
        assert_eq!(fields.len(), 10);
        assert!(fields.iter().all(|(name, _)| *name != "vector"));
        assert!(fields.contains(&("submitter", "someone".to_string())));
        assert!(fields.contains(&("doi", String::new())));
    }

    #[test]
    fn test_filters_from_year_range() {
        let filters = Filters::from_year_range(2019, 2021);
        assert_eq!(filters.date_range, vec!["2019", "2020", "2021"]);
        assert!(filters.categories.is_empty());
        assert!(Filters::from_year_range(2022, 2021).date_range.is_empty());
    }

    #[test]
    fn test_sort_by_score_descending() {
        let answer = |score: f32| Answer {
            answer: String::new(),
            score,
            context: String::new(),
            document_id: String::new(),
            offsets_in_document: Span::new(0, 0),
            meta: DocumentMeta::default(),
        };
        let mut answers = vec![answer(0.2), answer(0.9), answer(0.5)];
        sort_by_score(&mut answers);
        let scores: Vec<f32> = answers.iter().map(|a| a.score).collect();
        assert_eq!(scores, vec![0.9, 0.5, 0.2]);
    }
}
