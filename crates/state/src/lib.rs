//! Durable state for MeetScribe.
//!
//! Everything the scheduler and supervisor must remember across restarts
//! lives under one state directory as JSON/JSONL files: the trigger map,
//! the active-meeting lock, per-occurrence run results, and the
//! append-only supervisor history log. All writes are atomic
//! (write-to-temp-then-rename) so a crash never leaves a half-written
//! file behind.

pub mod atomic;
pub mod history;
pub mod lock;
pub mod paths;
pub mod results;
pub mod store;
pub mod trigger;

pub use history::{HistoryEvent, HistoryLog};
pub use lock::ActiveMeetingLock;
pub use paths::StatePaths;
pub use results::ResultsStore;
pub use trigger::TriggerStore;
