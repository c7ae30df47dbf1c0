//! Calendar integration: event snapshots, meeting-URL extraction, the
//! read-only Google Calendar client, and poll-tick eligibility
//! classification.

pub mod client;
pub mod event;
pub mod meet_url;
pub mod poller;

pub use client::{CalendarSource, GoogleCalendarClient};
pub use event::CalendarEvent;
pub use poller::{classify, eligible_events, Eligibility, JoinPolicy, SkipReason};
