//! Job lifecycle: records, tokens, controllers and the orchestrator.
//!
//! A job of either class moves `idle → analyzing → complete | error`, and
//! all of its state lives in the state store under the class's key. The
//! orchestrator writes the initial record before it returns; the spawned
//! controller writes every later snapshot.

pub mod board_job;
mod image_job;
pub mod orchestrator;
pub mod poller;
pub mod status_store;
pub mod token;
pub mod types;

pub use board_job::BoardJobSettings;
pub use orchestrator::{JobRequest, JobTicket, Orchestrator, OrchestratorBuilder};
pub use poller::{StatusPoller, DEFAULT_POLL_INTERVAL};
pub use status_store::JobStatusStore;
pub use token::{CancellationToken, TokenRegistry};
pub use types::{JobClass, JobState, JobStatus, JobSubject, Progress};
