//! State Snapshot Publisher
//!
//! Keeps the server informed about what the user is looking at. A snapshot is
//! sent immediately from cached dataset summaries (possibly stale), then the
//! cache is refreshed in the background and a corrected snapshot follows when
//! the refreshed list differs in size or has any content.

use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};

/// Summary of one dataset as reported by the dataset endpoint
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetSummary {
    /// Dataset identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Dataset type (e.g. `csv`, `parquet`)
    #[serde(default)]
    pub kind: String,
    /// Processing status
    #[serde(default)]
    pub status: String,
    /// Row count when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_count: Option<u64>,
    /// Size in bytes when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

/// Current route and title of the host application
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Location {
    /// Route path, always starting with `/`
    pub path: String,
    /// Decoded query parameters in order
    pub query: Vec<(String, String)>,
    /// Page title
    pub title: String,
}

impl Location {
    /// The application root
    #[must_use]
    pub fn root() -> Self {
        Self {
            path: "/".to_string(),
            query: Vec::new(),
            title: String::new(),
        }
    }

    /// Parse a route such as `/datasets/42?tab=schema`
    #[must_use]
    pub fn parse(route: &str, title: impl Into<String>) -> Self {
        let title = title.into();
        let parsed = Url::parse("http://localhost/").and_then(|base| base.join(route.trim()));
        match parsed {
            Ok(url) => Self {
                path: url.path().to_string(),
                query: url
                    .query_pairs()
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect(),
                title,
            },
            Err(_) => Self {
                path: route.to_string(),
                query: Vec::new(),
                title,
            },
        }
    }

    /// Route string including the query, form-encoded
    #[must_use]
    pub fn route(&self) -> String {
        if self.query.is_empty() {
            return self.path.clone();
        }
        let Ok(mut url) = Url::parse("http://localhost/") else {
            return self.path.clone();
        };
        url.query_pairs_mut().extend_pairs(self.query.iter());
        format!("{}?{}", self.path, url.query().unwrap_or_default())
    }

    /// Query parameter lookup
    #[must_use]
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Dataset the user is viewing
    ///
    /// A `/datasets/{id}` path segment wins over a `dataset_id` query
    /// parameter.
    #[must_use]
    pub fn active_dataset_id(&self) -> Option<String> {
        let mut segments = self.path.split('/').filter(|s| !s.is_empty());
        while let Some(segment) = segments.next() {
            if segment == "datasets" {
                if let Some(id) = segments.next() {
                    return Some(id.to_string());
                }
            }
        }
        self.query_param("dataset_id")
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }
}

impl Default for Location {
    fn default() -> Self {
        Self::root()
    }
}

/// What the user is looking at, as sent to the server
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Route including the query string
    pub route: String,
    /// Page title
    pub title: String,
    /// Dataset being viewed, if any
    pub active_dataset_id: Option<String>,
    /// Known datasets
    pub datasets: Vec<DatasetSummary>,
    /// When the snapshot was built
    pub timestamp: DateTime<Utc>,
}

/// Builds snapshots and decides when a refresh warrants a correction
pub struct SnapshotPublisher;

impl SnapshotPublisher {
    /// Snapshot of `location` using the given dataset list
    #[must_use]
    pub fn build(location: &Location, datasets: &[DatasetSummary]) -> StateSnapshot {
        StateSnapshot {
            route: location.route(),
            title: location.title.clone(),
            active_dataset_id: location.active_dataset_id(),
            datasets: datasets.to_vec(),
            timestamp: Utc::now(),
        }
    }

    /// Whether a refreshed list should trigger a corrected snapshot
    ///
    /// Only the length is compared; a non-empty list with the same length is
    /// still resent since its contents may have changed.
    #[must_use]
    pub fn needs_correction(cached_len: usize, refreshed: &[DatasetSummary]) -> bool {
        refreshed.len() != cached_len || !refreshed.is_empty()
    }
}
