//! Reference face catalog and embedding lookup.

use crate::types::{Embedding, FaceTemplate};
use serde::{Deserialize, Serialize};

/// Default match tolerance, applied to the configured [`MatchMetric`].
pub const DEFAULT_MATCH_TOLERANCE: f32 = 0.5;

/// Label shown for a face that matched no template.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Enrolled reference embeddings, kept in registration order.
#[derive(Debug, Clone, Default)]
pub struct FaceCatalog {
    templates: Vec<FaceTemplate>,
}

impl FaceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a template. Earlier registrations win ties during matching.
    pub fn register(&mut self, name: impl Into<String>, embedding: Embedding) {
        self.templates.push(FaceTemplate {
            name: name.into(),
            embedding,
        });
    }

    pub fn templates(&self) -> &[FaceTemplate] {
        &self.templates
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.iter().any(|t| t.name == name)
    }
}

/// Result of matching a query embedding against the catalog.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    Known { name: String, distance: f32 },
    Unknown,
}

impl MatchOutcome {
    pub fn name(&self) -> Option<&str> {
        match self {
            MatchOutcome::Known { name, .. } => Some(name),
            MatchOutcome::Unknown => None,
        }
    }

    /// Display label: the student name, or "Unknown".
    pub fn label(&self) -> &str {
        self.name().unwrap_or(UNKNOWN_LABEL)
    }
}

/// Strategy for comparing a query embedding against the catalog.
pub trait Matcher {
    fn find(&self, query: &Embedding, catalog: &FaceCatalog) -> MatchOutcome;
}

/// How far apart two embeddings are. Lower = more similar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMetric {
    /// `1 - cosine_similarity`, in [0, 2]. The scale ArcFace embeddings are trained on.
    #[default]
    Cosine,
    /// Plain Euclidean distance.
    Euclidean,
}

impl MatchMetric {
    pub fn distance(self, a: &Embedding, b: &Embedding) -> f32 {
        match self {
            MatchMetric::Cosine => 1.0 - a.cosine_similarity(b),
            MatchMetric::Euclidean => a.euclidean_distance(b),
        }
    }
}

/// First-within-tolerance matcher.
///
/// Templates are checked in catalog order and the first one within
/// `tolerance` wins, even if a later template is closer.
#[derive(Debug, Clone, Copy)]
pub struct ThresholdMatcher {
    pub tolerance: f32,
    pub metric: MatchMetric,
}

impl Default for ThresholdMatcher {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_MATCH_TOLERANCE,
            metric: MatchMetric::default(),
        }
    }
}

impl ThresholdMatcher {
    pub fn euclidean(tolerance: f32) -> Self {
        Self {
            tolerance,
            metric: MatchMetric::Euclidean,
        }
    }
}

impl Matcher for ThresholdMatcher {
    fn find(&self, query: &Embedding, catalog: &FaceCatalog) -> MatchOutcome {
        for template in catalog.templates() {
            let distance = self.metric.distance(query, &template.embedding);
            if distance <= self.tolerance {
                tracing::trace!(name = %template.name, distance, "catalog match");
                return MatchOutcome::Known {
                    name: template.name.clone(),
                    distance,
                };
            }
        }
        MatchOutcome::Unknown
    }
}
