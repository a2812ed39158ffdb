//! `/v1` HTTP routes: post a message, read history.
//!
//! Every route takes a bearer credential and runs under the same visibility
//! rules as the WebSocket subscription path.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use metrics::counter;
use parley_core::{ConversationRef, MessageDraft, MessageId, PanelId, Principal, SessionId};
use parley_realtime::{RealtimeError, Result as RealtimeResult};
use serde::Deserialize;
use tracing::debug;

use crate::errors::ApiError;
use crate::metrics::HTTP_REQUESTS_TOTAL;
use crate::server::{AppState, bearer_token};

/// Query parameters for history reads.
#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    /// Return messages older than this id.
    pub before: Option<String>,
    /// Page size; clamped server-side.
    pub limit: Option<usize>,
}

async fn authenticate(state: &AppState, headers: &HeaderMap) -> RealtimeResult<Principal> {
    let credential = bearer_token(headers, None).unwrap_or_default();
    state.auth.verify(credential).await
}

fn respond<T: serde::Serialize>(
    route: &'static str,
    ok_status: StatusCode,
    result: RealtimeResult<T>,
) -> Response {
    let response = match result {
        Ok(body) => (ok_status, Json(body)).into_response(),
        Err(e) => {
            debug!(route, error = %e, "request failed");
            ApiError(e).into_response()
        }
    };
    counter!(
        HTTP_REQUESTS_TOTAL,
        "route" => route,
        "status" => response.status().as_u16().to_string()
    )
    .increment(1);
    response
}

/// POST /v1/sessions/{id}/messages
pub async fn post_session_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(draft): Json<MessageDraft>,
) -> Response {
    let result = async {
        let author = authenticate(&state, &headers).await?;
        state
            .poster
            .post_session_message(&author, &SessionId::from_raw(id), draft)
            .await
    }
    .await;
    respond("post_session_message", StatusCode::CREATED, result)
}

/// POST /v1/panels/{id}/messages
pub async fn post_panel_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(draft): Json<MessageDraft>,
) -> Response {
    let result = async {
        let author = authenticate(&state, &headers).await?;
        state
            .poster
            .post_panel_message(&author, &PanelId::from_raw(id), draft)
            .await
    }
    .await;
    respond("post_panel_message", StatusCode::CREATED, result)
}

/// GET /v1/sessions/{id}/messages
pub async fn session_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<HistoryParams>,
    headers: HeaderMap,
) -> Response {
    let conversation = ConversationRef::Session(SessionId::from_raw(id));
    let result = history(&state, &headers, &conversation, params).await;
    respond("session_history", StatusCode::OK, result)
}

/// GET /v1/panels/{id}/messages
pub async fn panel_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<HistoryParams>,
    headers: HeaderMap,
) -> Response {
    let conversation = ConversationRef::Panel(PanelId::from_raw(id));
    let result = history(&state, &headers, &conversation, params).await;
    respond("panel_history", StatusCode::OK, result)
}

async fn history(
    state: &AppState,
    headers: &HeaderMap,
    conversation: &ConversationRef,
    params: HistoryParams,
) -> RealtimeResult<parley_realtime::HistoryPage> {
    let viewer = authenticate(state, headers).await?;
    if params.limit == Some(0) {
        return Err(RealtimeError::InvalidMessage("limit must be positive".into()));
    }
    let before = params.before.filter(|b| !b.is_empty()).map(MessageId::from_raw);
    state
        .poster
        .history(&viewer, conversation, before, params.limit)
        .await
}
