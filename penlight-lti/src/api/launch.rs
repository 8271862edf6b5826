//! Inbound LTI launch intake
//!
//! **[LTI-SIG-020]** The host LMS launches into this endpoint with a
//! form-encoded, OAuth1-signed request carrying `lis_result_sourcedid` and
//! `lis_outcome_service_url`. The signature is verified before anything is
//! stored; a bad or incomplete signature is an authentication failure,
//! never silently accepted. Everything else about the launch handshake
//! (session creation, user provisioning) lives outside this service.

use crate::db::journals;
use crate::error::{ApiError, ApiResult};
use crate::lti::oauth;
use crate::AppState;
use axum::extract::State;
use axum::{Form, Json};
use chrono::Utc;
use penlight_common::events::SyncEvent;
use serde::Serialize;

/// Custom launch parameter naming the journal to link
const PARAM_JOURNAL: &str = "custom_journal_id";
const PARAM_SOURCEDID: &str = "lis_result_sourcedid";
const PARAM_OUTCOME_URL: &str = "lis_outcome_service_url";

#[derive(Debug, Serialize)]
pub struct LaunchResponse {
    pub journal_guid: String,
    pub linked: bool,
}

/// POST /lti/launch
///
/// Verifies the launch signature, then records the outcome-service
/// coordinates on the named journal.
pub async fn lti_launch(
    State(state): State<AppState>,
    Form(params): Form<Vec<(String, String)>>,
) -> ApiResult<Json<LaunchResponse>> {
    oauth::verify(
        "POST",
        &state.launch_url,
        &params,
        &state.credentials.consumer_key,
        &state.credentials.consumer_secret,
    )
    .map_err(|e| {
        tracing::warn!(error = %e, "Rejected LTI launch");
        ApiError::Unauthorized(e.to_string())
    })?;

    let param = |name: &str| -> Option<&str> {
        params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .filter(|v| !v.is_empty())
    };

    let journal_guid = param(PARAM_JOURNAL)
        .ok_or_else(|| ApiError::BadRequest(format!("missing {}", PARAM_JOURNAL)))?
        .to_string();
    let sourcedid = param(PARAM_SOURCEDID)
        .ok_or_else(|| ApiError::BadRequest(format!("missing {}", PARAM_SOURCEDID)))?;
    let grade_url = param(PARAM_OUTCOME_URL)
        .ok_or_else(|| ApiError::BadRequest(format!("missing {}", PARAM_OUTCOME_URL)))?;

    journals::link_outcome_service(&state.db, &journal_guid, sourcedid, grade_url).await?;

    tracing::info!(
        journal_guid = %journal_guid,
        "Journal linked to LMS outcome service via LTI launch"
    );
    state
        .events
        .emit(SyncEvent::JournalLinked {
            journal_guid: journal_guid.clone(),
            timestamp: Utc::now(),
        })
        .ok();

    Ok(Json(LaunchResponse {
        journal_guid,
        linked: true,
    }))
}
