//! Broadcasting of job status changes to in-process subscribers.

pub mod job_status;

pub use job_status::{JobStatusBroadcaster, JobStatusEvent};
