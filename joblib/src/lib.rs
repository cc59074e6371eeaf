mod actors;
pub mod config;
mod engine;
pub mod errors;
pub mod queue;
pub mod store;
pub mod types;
pub mod webhook;

pub use config::{EngineConfig, JobLinks};
pub use engine::JobEngine;
pub use types::{JobId, JobRecord, JobStatus, Submission};
