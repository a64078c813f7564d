use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A domain-agnostic event.
///
/// Events are:
/// - **immutable** (treat them as facts)
/// - **versioned** (schema evolution)
/// - designed to be **append-only**
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name/type identifier (e.g. "invoicing.workflow.submitted").
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// When the event occurred (business time).
    fn occurred_at(&self) -> DateTime<Utc>;

    /// Audit-trail entry for this event at the given aggregate sequence number.
    fn record(&self, sequence: u64) -> EventRecord {
        EventRecord {
            sequence,
            event_type: self.event_type().to_string(),
            schema_version: self.version(),
            occurred_at: self.occurred_at(),
        }
    }
}

/// Serializable summary of an applied event.
///
/// The persistence layer owns the full payload; the engine only keeps this
/// trail so the UI can show what happened to an invoice and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// 1-based position in the aggregate's event stream.
    pub sequence: u64,
    pub event_type: String,
    pub schema_version: u32,
    pub occurred_at: DateTime<Utc>,
}
