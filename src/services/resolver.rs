use std::sync::Arc;

use async_trait::async_trait;

use super::similarity::{normalize, Similarity, SimilarityScorer};
use super::AdapterError;

/// One record returned by a bibliographic index search.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub identifier: String,
    pub title: String,
    /// "given family" strings, one per listed author.
    pub authors: Vec<String>,
}

/// A searchable bibliographic index (e.g. Crossref).
#[async_trait]
pub trait BibliographicIndex: Send + Sync + 'static {
    /// Up to `rows` candidates in the index's own relevance order.
    async fn search(
        &self,
        title: &str,
        author: &str,
        rows: usize,
    ) -> Result<Vec<Candidate>, AdapterError>;

    /// Times the identified work has been cited, if the index knows.
    async fn citation_count(&self, identifier: &str) -> Result<Option<u64>, AdapterError>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolverConfig {
    pub title_threshold: f64,
    pub author_threshold: f64,
    pub rows: usize,
    pub scorer: SimilarityScorer,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            title_threshold: 60.0,
            author_threshold: 75.0,
            rows: 5,
            scorer: SimilarityScorer::TokenSort,
        }
    }
}

/// Why no candidate was accepted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NoMatchReason {
    EmptyTitle,
    EmptyAuthor,
    NoIndexResults,
    TitleBelowThreshold { best_score: f64 },
    AuthorBelowThreshold { best_score: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Matched {
        identifier: String,
        title_score: f64,
        author_score: f64,
    },
    Unmatched(NoMatchReason),
}

impl Resolution {
    /// `(identifier, verified)` as stored on a record.
    pub fn into_parts(self) -> (Option<String>, bool) {
        match self {
            Self::Matched { identifier, .. } => (Some(identifier), true),
            Self::Unmatched(_) => (None, false),
        }
    }
}

/// Pick the first candidate, in index order, whose title clears the title
/// threshold and whose best author name clears the author threshold.
///
/// Author names are only scored for candidates that survived the title
/// filter, and only when at least one did. Names with nothing left after
/// normalization never match.
pub fn select_candidate<S: Similarity + ?Sized>(
    title: &str,
    author: &str,
    candidates: &[Candidate],
    config: &ResolverConfig,
    scorer: &S,
) -> Resolution {
    let title_norm = normalize(title);
    if title_norm.is_empty() {
        return Resolution::Unmatched(NoMatchReason::EmptyTitle);
    }
    let author_norm = normalize(author);
    if author_norm.is_empty() {
        return Resolution::Unmatched(NoMatchReason::EmptyAuthor);
    }
    if candidates.is_empty() {
        return Resolution::Unmatched(NoMatchReason::NoIndexResults);
    }

    let mut best_title = 0.0_f64;
    let survivors: Vec<(&Candidate, f64)> = candidates
        .iter()
        .filter_map(|candidate| {
            let score = scorer.score(&title_norm, &normalize(&candidate.title));
            best_title = best_title.max(score);
            (score >= config.title_threshold).then_some((candidate, score))
        })
        .collect();

    if survivors.is_empty() {
        return Resolution::Unmatched(NoMatchReason::TitleBelowThreshold {
            best_score: best_title,
        });
    }

    let mut best_author = 0.0_f64;
    for (candidate, title_score) in survivors {
        let author_score = candidate
            .authors
            .iter()
            .map(|name| normalize(name))
            .filter(|name| !name.is_empty())
            .map(|name| scorer.score(&author_norm, &name))
            .fold(0.0_f64, f64::max);
        best_author = best_author.max(author_score);

        if author_score >= config.author_threshold {
            return Resolution::Matched {
                identifier: candidate.identifier.clone(),
                title_score,
                author_score,
            };
        }
    }

    Resolution::Unmatched(NoMatchReason::AuthorBelowThreshold {
        best_score: best_author,
    })
}

/// Decides which external bibliographic record, if any, a harvested
/// `(title, author)` pair denotes.
pub struct IdentityResolver {
    index: Arc<dyn BibliographicIndex>,
    config: ResolverConfig,
}

impl IdentityResolver {
    pub fn new(index: Arc<dyn BibliographicIndex>, config: ResolverConfig) -> Self {
        Self { index, config }
    }

    pub fn index(&self) -> &Arc<dyn BibliographicIndex> {
        &self.index
    }

    /// A clean negative is `Ok(Resolution::Unmatched(_))`; `Err` means the
    /// index itself could not be queried.
    pub async fn resolve(&self, title: &str, author: &str) -> Result<Resolution, AdapterError> {
        if normalize(title).is_empty() {
            return Ok(Resolution::Unmatched(NoMatchReason::EmptyTitle));
        }
        let candidates = self.index.search(title, author, self.config.rows).await?;
        let resolution =
            select_candidate(title, author, &candidates, &self.config, &self.config.scorer);

        match &resolution {
            Resolution::Matched {
                identifier,
                title_score,
                author_score,
            } => tracing::info!(
                title = %title,
                doi = %identifier,
                title_score,
                author_score,
                "Identity resolved"
            ),
            Resolution::Unmatched(reason) => {
                tracing::info!(title = %title, reason = ?reason, "No acceptable candidate")
            }
        }
        Ok(resolution)
    }
}
