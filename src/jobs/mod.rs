//! Server-side job management.
//!
//! Every job runs in its own worker process (see [`crate::worker`]). The
//! server keeps a [`registry::Job`] per submission and talks to the worker
//! over its stdio:
//! - `codec`: line framing shared by both directions.
//! - `control`: start-up spec and control commands written to stdin.
//! - `reader`: progress messages read from stdout into the job's channel.
//! - `spawner`: process start-up with environment isolation, and forced kill.
//! - `registry`: the job table and the cancel path.

pub mod codec;
pub mod control;
pub mod reader;
pub mod registry;
pub mod spawner;
