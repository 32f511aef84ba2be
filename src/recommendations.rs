//! Recommendation source and the degradable fetcher in front of it.
//!
//! A failed fetch never fails the invocation: the report goes out with an
//! empty recommendation list and is marked partial.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, warn};

use crate::analytics::Recommendation;
use crate::config::RecommendationsConfig;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("recommendation source unavailable: {0}")]
    Unavailable(String),

    #[error("access denied to recommendation source: {0}")]
    AccessDenied(String),

    #[error("malformed recommendation payload: {0}")]
    Malformed(String),
}

/// Read-only feed of optimization opportunities.
pub trait RecommendationSource: Send + Sync {
    fn id(&self) -> &str;

    fn list_recommendations(
        &self,
        scope: &RecommendationsConfig,
    ) -> Result<Vec<Recommendation>, SourceError>;
}

/// Result of one fetch. `degraded` holds the reason when the source failed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchOutcome {
    pub recommendations: Vec<Recommendation>,
    pub degraded: Option<String>,
}

impl FetchOutcome {
    pub fn is_partial(&self) -> bool {
        self.degraded.is_some()
    }
}

pub struct RecommendationFetcher {
    source: Arc<dyn RecommendationSource>,
}

impl RecommendationFetcher {
    pub fn new(source: Arc<dyn RecommendationSource>) -> Self {
        Self { source }
    }

    /// Single attempt; any source error degrades to an empty list.
    pub fn fetch(&self, scope: &RecommendationsConfig) -> FetchOutcome {
        let started = Instant::now();
        match self.source.list_recommendations(scope) {
            Ok(list) => {
                let fetched = list.len();
                let recommendations: Vec<Recommendation> = list
                    .into_iter()
                    .filter(|rec| {
                        let keep = rec.monthly_savings.is_finite();
                        if !keep {
                            warn!(
                                component = "recommendations",
                                source = self.source.id(),
                                category = rec.category.as_str(),
                                "Dropping recommendation with non-finite savings"
                            );
                        }
                        keep
                    })
                    .collect();
                debug!(
                    component = "recommendations",
                    operation = "fetch",
                    source = self.source.id(),
                    fetched,
                    kept = recommendations.len(),
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Fetched recommendations"
                );
                FetchOutcome {
                    recommendations,
                    degraded: None,
                }
            }
            Err(err) => {
                warn!(
                    component = "recommendations",
                    operation = "fetch",
                    source = self.source.id(),
                    error = %err,
                    "Recommendation fetch failed; continuing without recommendations"
                );
                FetchOutcome {
                    recommendations: Vec::new(),
                    degraded: Some(err.to_string()),
                }
            }
        }
    }
}

/// Fixed list; the CLI uses an empty one when no source file is given.
#[derive(Debug, Clone, Default)]
pub struct StaticRecommendationSource {
    recommendations: Vec<Recommendation>,
}

impl StaticRecommendationSource {
    pub fn new(recommendations: Vec<Recommendation>) -> Self {
        Self { recommendations }
    }
}

impl RecommendationSource for StaticRecommendationSource {
    fn id(&self) -> &str {
        "static"
    }

    fn list_recommendations(
        &self,
        _scope: &RecommendationsConfig,
    ) -> Result<Vec<Recommendation>, SourceError> {
        Ok(self.recommendations.clone())
    }
}

/// JSON array of recommendations, read on every fetch.
#[derive(Debug, Clone)]
pub struct FileRecommendationSource {
    path: PathBuf,
}

impl FileRecommendationSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl RecommendationSource for FileRecommendationSource {
    fn id(&self) -> &str {
        "file"
    }

    fn list_recommendations(
        &self,
        _scope: &RecommendationsConfig,
    ) -> Result<Vec<Recommendation>, SourceError> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| match e.kind() {
            std::io::ErrorKind::PermissionDenied => {
                SourceError::AccessDenied(format!("{}: {e}", self.path.display()))
            }
            _ => SourceError::Unavailable(format!("{}: {e}", self.path.display())),
        })?;
        serde_json::from_str(&content).map_err(|e| SourceError::Malformed(e.to_string()))
    }
}
