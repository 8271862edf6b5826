//! HTTP API handlers for penlight-lti

pub mod health;
pub mod launch;
pub mod sse;
pub mod sync;

pub use health::health_routes;
pub use launch::lti_launch;
pub use sse::event_stream;
pub use sync::{grade_entry, notify_entry, passback_journal, publish_assignment, run_sweep};
