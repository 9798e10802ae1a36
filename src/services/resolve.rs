use std::sync::Arc;

use async_trait::async_trait;

use super::resolver::IdentityResolver;
use super::unpaywall::OpenAccessLookup;
use crate::models::{JobDocument, Record, StageKind};
use crate::pipeline::{gather_ordered, StageError, StageOutcome, StageProcessor};

/// Resolves every harvested record to a DOI, then records open-access
/// status and a missing citation count for the ones that resolved.
pub struct ResolveStage {
    resolver: IdentityResolver,
    open_access: Arc<dyn OpenAccessLookup>,
    record_concurrency: usize,
}

impl ResolveStage {
    pub fn new(
        resolver: IdentityResolver,
        open_access: Arc<dyn OpenAccessLookup>,
        record_concurrency: usize,
    ) -> Self {
        Self {
            resolver,
            open_access,
            record_concurrency,
        }
    }

    async fn resolve_record(&self, job_id: &str, author: &str, record: &Record) -> Record {
        let mut out = record.clone();
        let title = record.title.as_deref().unwrap_or_default();

        let (doi, verified) = match self.resolver.resolve(title, author).await {
            Ok(resolution) => resolution.into_parts(),
            Err(e) => {
                tracing::warn!(job_id = %job_id, title = %title, error = %e, "Bibliographic lookup failed");
                (None, false)
            }
        };

        out.open_access = match doi.as_deref() {
            Some(doi) => self.open_access.is_open_access(doi).await.unwrap_or_else(|e| {
                tracing::warn!(job_id = %job_id, doi = %doi, error = %e, "Open-access lookup failed");
                false
            }),
            None => false,
        };

        if let (true, None, Some(doi)) = (verified, out.citation_count, doi.as_deref()) {
            out.citation_count = match self.resolver.index().citation_count(doi).await {
                Ok(count) => count,
                Err(e) => {
                    tracing::warn!(job_id = %job_id, doi = %doi, error = %e, "Citation count lookup failed");
                    None
                }
            };
        }

        metrics::counter!("pipeline_records_resolved_total", "verified" => verified.to_string())
            .increment(1);
        out.doi = doi;
        out.verified = verified;
        out
    }
}

#[async_trait]
impl StageProcessor for ResolveStage {
    fn kind(&self) -> StageKind {
        StageKind::Resolve
    }

    async fn process(&self, job: &mut JobDocument) -> Result<StageOutcome, StageError> {
        let (job_id, author) = (job.job_id.as_str(), job.author.as_str());
        let resolved = gather_ordered(&job.results, self.record_concurrency, |_, record| {
            self.resolve_record(job_id, author, record)
        })
        .await;

        let verified = resolved.iter().filter(|r| r.verified).count();
        tracing::info!(job_id = %job.job_id, records = resolved.len(), verified, "Identity resolution complete");
        job.results = resolved;
        Ok(StageOutcome::Forward)
    }
}
