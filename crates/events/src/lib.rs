//! Workflow events and their audit records.

pub mod event;

pub use event::{Event, EventRecord};
