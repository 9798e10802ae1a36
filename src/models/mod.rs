pub mod api;
pub mod job;
pub mod phase;

pub use job::{JobDocument, JobPointer, Record, ScrapeRequest};
pub use phase::{JobPhase, StageKind};
