//! penlight-lti library - LTI outcomes synchronization service
//!
//! Synchronizes locally-recorded journal grades and submission state with a
//! host LMS over LTI 1.1 Basic Outcomes: OAuth1-signed replaceResult
//! envelopes out, launch signature verification in, per-entry coupling
//! status in between, and a reconciliation sweep that re-drives anything
//! left unfinished.

use axum::Router;
use sqlx::SqlitePool;
use std::sync::Arc;

use penlight_common::events::EventBus;

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod lti;
pub mod services;

use config::LtiCredentials;
use services::passback::PassbackOrchestrator;
use services::reconciliation::ReconciliationSweep;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Grade passback orchestrator
    pub orchestrator: Arc<PassbackOrchestrator>,
    /// Reconciliation sweep (also runs on a background interval)
    pub sweep: Arc<ReconciliationSweep>,
    /// Event bus feeding the SSE stream
    pub events: EventBus,
    /// Public URL of the /lti/launch endpoint, used for inbound signature
    /// verification
    pub launch_url: String,
    /// LTI consumer credentials
    pub credentials: LtiCredentials,
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{get, post};
    use tower_http::trace::TraceLayer;

    Router::new()
        .route("/lti/launch", post(api::lti_launch))
        .route("/api/journals/:journal_guid/passback", post(api::passback_journal))
        .route(
            "/api/journals/:journal_guid/entries/:entry_guid/notify",
            post(api::notify_entry),
        )
        .route("/api/entries/:entry_guid/grade", post(api::grade_entry))
        .route(
            "/api/assignments/:assignment_guid/publish",
            post(api::publish_assignment),
        )
        .route("/api/sweep", post(api::run_sweep))
        .route("/api/events", get(api::event_stream))
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
