use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;

use super::topology::{ForwardMode, InputSource, StageRoute};
use super::StageError;
use crate::broker::{HandlerError, MessageHandler, Publisher};
use crate::models::{JobDocument, JobPhase, JobPointer, Record, StageKind};
use crate::store::{fields, JobStateStore};

const MERGE_ATTEMPTS: u32 = 8;

/// What a processor decided after working on a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    /// Persist and hand the job to the next queue(s).
    Forward,
    /// Persist and stop the chain with this terminal phase.
    Halt(JobPhase),
}

/// Stage-specific work plugged into [`StageDriver`].
#[async_trait]
pub trait StageProcessor: Send + Sync + 'static {
    fn kind(&self) -> StageKind;

    /// Enrich the records of `job` in place. Per-record failures must be
    /// absorbed here, leaving the owned field empty on that record.
    async fn process(&self, job: &mut JobDocument) -> Result<StageOutcome, StageError>;

    /// Copy the fields this stage owns from `processed` onto `latest`.
    /// Only called for stages that read their input from the store; the
    /// others replace `job_data` wholesale.
    fn merge(&self, _latest: &mut Record, _processed: &Record) {}
}

/// The consume -> load -> process -> persist -> publish loop shared by
/// every stage.
pub struct StageDriver<P> {
    processor: P,
    store: Arc<dyn JobStateStore>,
    publisher: Publisher,
    route: StageRoute,
}

impl<P: StageProcessor> StageDriver<P> {
    pub fn new(
        processor: P,
        store: Arc<dyn JobStateStore>,
        publisher: Publisher,
        route: StageRoute,
    ) -> Self {
        Self {
            processor,
            store,
            publisher,
            route,
        }
    }

    /// Run the stage for one message.
    ///
    /// Messages without a `job_id` cannot be attributed to any job and are
    /// discarded. Any other error is recorded as the stage's failure phase
    /// and returned so the consumer can log (and optionally dead-letter) it.
    pub async fn handle_message(&self, payload: Value) -> Result<(), StageError> {
        let stage = self.processor.kind();
        let Some(job_id) = payload
            .get("job_id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
        else {
            tracing::error!(stage = %stage, payload = %payload, "Message has no job_id, discarding");
            metrics::counter!("pipeline_messages_discarded_total", "stage" => stage.to_string())
                .increment(1);
            return Ok(());
        };

        let started = Instant::now();
        match self.run(&job_id, payload).await {
            Ok(()) => {
                metrics::counter!("pipeline_messages_processed_total", "stage" => stage.to_string())
                    .increment(1);
                metrics::histogram!("pipeline_stage_seconds", "stage" => stage.to_string())
                    .record(started.elapsed().as_secs_f64());
                Ok(())
            }
            Err(e) => {
                tracing::error!(job_id = %job_id, stage = %stage, error = %e, "Stage failed");
                metrics::counter!("pipeline_messages_failed_total", "stage" => stage.to_string())
                    .increment(1);
                if let Err(store_err) = self.transition(&job_id, JobPhase::Failed(stage)).await {
                    tracing::error!(job_id = %job_id, stage = %stage, error = %store_err, "Could not record stage failure");
                }
                Err(e)
            }
        }
    }

    async fn run(&self, job_id: &str, payload: Value) -> Result<(), StageError> {
        let stage = self.processor.kind();
        tracing::info!(job_id = %job_id, stage = %stage, "Stage started");

        self.transition(job_id, stage.started_phase()).await?;
        self.store
            .set(job_id, &stage.start_time_field(), &timestamp())
            .await?;

        let mut job = match self.route.input {
            InputSource::Message => serde_json::from_value::<JobDocument>(payload)
                .map_err(StageError::MalformedPayload)?,
            InputSource::Store => self.load_job(job_id).await?,
        };
        job.job_id = job_id.to_string();

        let outcome = self.processor.process(&mut job).await?;

        let document = match self.route.input {
            InputSource::Message => {
                self.store
                    .set(job_id, fields::JOB_DATA, &serde_json::to_string(&job)?)
                    .await?;
                job
            }
            InputSource::Store => self.merge_into_stored(job_id, &job).await?,
        };

        self.store
            .set(job_id, &stage.end_time_field(), &timestamp())
            .await?;

        match outcome {
            StageOutcome::Halt(phase) => {
                self.transition(job_id, phase).await?;
                tracing::info!(job_id = %job_id, stage = %stage, phase = %phase, "Stage halted the chain");
            }
            StageOutcome::Forward => {
                self.transition(job_id, stage.finished_phase()).await?;
                self.forward(&document).await?;
                tracing::info!(
                    job_id = %job_id,
                    stage = %stage,
                    records = document.results.len(),
                    "Stage finished"
                );
            }
        }
        Ok(())
    }

    async fn load_job(&self, job_id: &str) -> Result<JobDocument, StageError> {
        let (_, job) = self.load_job_raw(job_id).await?;
        Ok(job)
    }

    async fn load_job_raw(&self, job_id: &str) -> Result<(String, JobDocument), StageError> {
        let raw = self
            .store
            .get(job_id, fields::JOB_DATA)
            .await?
            .ok_or_else(|| StageError::MissingJobData(job_id.to_string()))?;
        let job = serde_json::from_str(&raw).map_err(StageError::CorruptJobData)?;
        Ok((raw, job))
    }

    /// Fan-out siblings write job_data too. Merge only this stage's fields
    /// into the latest stored document and write it back with
    /// compare-and-set, starting over when a sibling wrote in between.
    async fn merge_into_stored(
        &self,
        job_id: &str,
        processed: &JobDocument,
    ) -> Result<JobDocument, StageError> {
        for attempt in 1..=MERGE_ATTEMPTS {
            let (raw, mut latest) = self.load_job_raw(job_id).await?;
            latest.merge_by_index(processed, |target, source| self.processor.merge(target, source));
            let merged = serde_json::to_string(&latest)?;
            if self
                .store
                .compare_and_set(job_id, fields::JOB_DATA, Some(raw.as_str()), &merged)
                .await?
            {
                return Ok(latest);
            }
            tracing::debug!(job_id = %job_id, attempt, "job_data changed during merge, retrying");
        }
        Err(StageError::MergeConflict(job_id.to_string()))
    }

    async fn forward(&self, document: &JobDocument) -> Result<(), StageError> {
        for queue in &self.route.outputs {
            match self.route.forward {
                ForwardMode::Document => self.publisher.publish(queue, document).await?,
                ForwardMode::Pointer => {
                    let pointer = JobPointer {
                        job_id: document.job_id.clone(),
                    };
                    self.publisher.publish(queue, &pointer).await?
                }
            }
            tracing::debug!(job_id = %document.job_id, queue = %queue, "Forwarded job");
        }
        Ok(())
    }

    /// Write `next` to the stage's status field. Unexpected transitions
    /// (usually a redelivered message) are logged but still written.
    async fn transition(&self, job_id: &str, next: JobPhase) -> Result<(), StageError> {
        let field = self.processor.kind().status_field();
        let current = self
            .store
            .get(job_id, field)
            .await?
            .and_then(|label| label.parse::<JobPhase>().ok());
        if !JobPhase::can_transition(current.as_ref(), &next) {
            tracing::warn!(
                job_id = %job_id,
                from = ?current.map(|p| p.label()),
                to = %next,
                "Unexpected phase transition"
            );
        }
        self.store.set(job_id, field, next.label()).await?;
        Ok(())
    }
}

#[async_trait]
impl<P: StageProcessor> MessageHandler for StageDriver<P> {
    async fn handle(&self, payload: Value) -> Result<(), HandlerError> {
        self.handle_message(payload).await.map_err(Into::into)
    }
}

fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}
