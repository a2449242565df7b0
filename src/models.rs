use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::HashMap;

/// The metadata record handed back to the host application. Shaped like the
/// host's own title/author/series/identifier container.
#[derive(Debug, Clone, Serialize)]
pub struct Metadata {
    pub title: String,
    pub authors: Vec<String>,
    pub series: Option<String>,
    /// Issue number within the series, kept as a string ("7", "202008", "½")
    pub series_index: Option<String>,
    pub identifiers: HashMap<String, String>,
    pub comments: Option<String>,
    pub publisher: Option<String>,
    pub pubdate: Option<NaiveDateTime>,
    pub has_cover: bool,
}

impl Metadata {
    pub fn new(title: String, authors: Vec<String>) -> Self {
        Metadata {
            title,
            authors,
            series: None,
            series_index: None,
            identifiers: HashMap::new(),
            comments: None,
            publisher: None,
            pubdate: None,
            has_cover: false,
        }
    }

    pub fn set_identifier(&mut self, scheme: &str, value: String) {
        self.identifiers.insert(scheme.to_string(), value);
    }

    pub fn identifier(&self, scheme: &str) -> Option<&str> {
        self.identifiers.get(scheme).map(|s| s.as_str())
    }
}

/// One identify query: free-text title, author strings, and any identifiers
/// already known out of band.
#[derive(Debug, Clone, Default)]
pub struct IdentifyRequest {
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub identifiers: HashMap<String, String>,
}

/// A ranked result; lower scores are better and 0 is an exact identifier
/// match.
#[derive(Debug, Clone)]
pub struct ScoredResult {
    pub score: i64,
    pub metadata: Metadata,
}
