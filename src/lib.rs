#![forbid(unsafe_code)]

//! Batch annotation of linguistic elicitation sessions.
//!
//! Jobs are submitted over HTTP ([`api`]), run one per worker process
//! ([`jobs`], [`worker`]), and report progress as a server-sent event
//! stream. Each session's ledger is annotated by one of the passes in
//! [`processing`].

pub mod api;
pub mod config;
pub mod errors;
pub mod jobs;
pub mod ledger;
pub mod models;
pub mod processing;
pub mod worker;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
