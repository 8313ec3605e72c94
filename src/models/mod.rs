//! Domain model module declarations.

pub mod action;
pub mod job;
pub mod progress;
