//! Scholar Pipeline
//!
//! Staged processing of an author's publication list: harvest, identity
//! resolution against a bibliographic index, open-access text extraction,
//! then authorship classification and originality checks in parallel.
//! Stages communicate over durable queues and record progress in a shared
//! per-job state store.

pub mod app_state;
pub mod broker;
pub mod config;
pub mod models;
pub mod pipeline;
pub mod routes;
pub mod services;
pub mod store;
pub mod telemetry;
