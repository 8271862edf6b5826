//! Event types for the Penlight sync services
//!
//! Provides the shared SyncEvent definitions and EventBus used by the LTI
//! outcomes service (and any future service that wants to observe grade
//! synchronization progress).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Penlight synchronization events
///
/// Events are broadcast via EventBus and can be serialized for SSE
/// transmission to connected UIs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SyncEvent {
    /// A journal's grade was accepted by the host LMS
    ///
    /// Triggers:
    /// - SSE: update "grade sync" indicator for the journal
    GradePassbackSucceeded {
        /// Journal whose score was replaced
        journal_guid: String,
        /// Score string as sent to the LMS ("0.0" - "1.0")
        score: String,
        /// When the LMS acknowledged
        timestamp: DateTime<Utc>,
    },

    /// A passback attempt failed (LMS rejection or transport error)
    ///
    /// The affected entries remain retry-eligible; the reconciliation
    /// sweep will re-drive them.
    GradePassbackFailed {
        journal_guid: String,
        /// imsx_codeMajor from the response, when one was parseable
        code_major: Option<String>,
        /// Human-readable failure description
        description: String,
        timestamp: DateTime<Utc>,
    },

    /// A "needs grading" notification was delivered for an entry
    ///
    /// Informational only; notifications never change coupling status.
    GradingNotificationSent {
        journal_guid: String,
        entry_guid: String,
        timestamp: DateTime<Utc>,
    },

    /// An LTI launch linked a journal to the LMS outcome service
    JournalLinked {
        journal_guid: String,
        timestamp: DateTime<Utc>,
    },

    /// A reconciliation sweep pass finished
    SweepCompleted {
        /// Entries that matched the outstanding-work scan
        entries_seen: usize,
        /// Journals whose replaceResult was accepted
        journals_synced: usize,
        /// Journals whose attempt failed (left retry-eligible)
        journals_failed: usize,
        /// Per-entry "needs grading" notifications delivered
        notifications_sent: usize,
        timestamp: DateTime<Utc>,
    },
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus
///
/// Uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SyncEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists,
    /// `Err` when nobody is listening. Emitters generally ignore the
    /// error: an event with no audience is not a fault.
    pub fn emit(&self, event: SyncEvent) -> Result<usize, broadcast::error::SendError<SyncEvent>> {
        self.tx.send(event)
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
