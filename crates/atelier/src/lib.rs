//! atelier - background orchestrator for image and board analysis jobs.
//!
//! Transient callers start jobs, poll their status and cancel them; a
//! long-lived process runs the work and records every step in a durable
//! key-value store, which is the only state the two sides share.

pub mod aggregate;
pub mod analysis;
pub mod board;
pub mod broadcast;
pub mod config;
pub mod db;
pub mod error;
pub mod jobs;
pub mod logging;
pub mod protocol;
pub mod store;

pub use aggregate::{aggregate, AggregateSummary, LabelCount, SourceCount};
pub use analysis::{
    AnalysisError, AnalysisInvoker, AnalysisRecord, AnalysisResult, AnalysisService,
    CredentialProvider, ImageReference, ServiceStatus,
};
pub use board::{BoardItem, BoardSource, ImageReferenceResolver, VariantResolver};
pub use config::{load_config, load_config_from_str, Config};
pub use error::{AtelierError, ConfigError, Result, StoreError};
pub use jobs::{
    BoardJobSettings, JobClass, JobRequest, JobState, JobStatus, JobTicket, Orchestrator,
    StatusPoller,
};
pub use store::{MemoryStore, SqliteStore, StateStore};
