//! Shared test utilities for atelier integration tests.
//!
//! - `fakes`: a scripted analysis service, a recording store and a paged
//!   board source
//! - `builders`: fixtures wiring those fakes into an orchestrator

pub mod builders;
pub mod fakes;

pub use builders::*;
pub use fakes::*;
