//! Shared domain types for MeetScribe.
//!
//! Everything other crates agree on lives here: the error type, the
//! configuration tree, and the records that flow between the scheduler,
//! the notetaker supervisor, and the transcript pipeline.

pub mod config;
pub mod error;
pub mod facts;
pub mod meeting;
pub mod retry;
