//! Generic stage runtime.
//!
//! Every stage is a [`StageDriver`] around a [`StageProcessor`]; only the
//! processor differs between stages.

mod driver;
mod gather;
mod topology;

pub use driver::{StageDriver, StageOutcome, StageProcessor};
pub use gather::gather_ordered;
pub use topology::{ForwardMode, InputSource, StageRoute};

use crate::broker::BrokerError;
use crate::services::AdapterError;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("Malformed message payload: {0}")]
    MalformedPayload(serde_json::Error),

    #[error("No job_data stored for job {0}")]
    MissingJobData(String),

    #[error("job_data for job {0} kept changing during merge")]
    MergeConflict(String),

    #[error("Stored job_data is not a valid document: {0}")]
    CorruptJobData(serde_json::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Upstream dependency failed: {0}")]
    Upstream(#[from] AdapterError),
}
