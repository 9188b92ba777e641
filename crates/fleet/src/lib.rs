//! Fleet supervision.
//!
//! The [`TeamSupervisor`] owns every team client from creation to teardown:
//! single-shot initialization, parallel connect with per-team error
//! containment, eviction of teams that can no longer stream, and
//! signal-safe idempotent shutdown.

pub mod error;
pub mod supervisor;

pub use {
    error::{Error, Result},
    supervisor::{ConnectSummary, TeamSupervisor},
};
