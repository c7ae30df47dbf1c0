//! Notetaker bot integration.
//!
//! Talks to the external recording-bot provider (create / history /
//! media), supervises a bot through one meeting with the full
//! failure-handling state machine, harvests transcripts in the
//! background, and merges per-bot transcript fragments into one ordered
//! record.

pub mod client;
pub mod harvester;
pub mod history;
pub mod merge;
pub mod supervisor;

pub use client::{HttpNotetakerClient, LatestStatus, MediaEntry, MediaLinks, NotetakerApi};
pub use supervisor::{MeetingRef, Supervisor, SupervisorConfig};
