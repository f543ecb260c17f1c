//! HTTP route handlers for the conversation and preference API.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::conversation::{Conversation, ConversationUpdate, Message, NewConversation};
use crate::core::errors::{StoreError, StoreResult};
use crate::core::identity::{ResolvedIdentity, resolve};
use crate::core::ids::ConversationId;
use crate::core::preference::{Preference, PreferenceUpdate};
use crate::storage::with_deadline;

use super::error::ApiError;
use super::extract::{ApiJson, ApiQuery};
use super::state::AppState;

/// Extra wait past the store deadline for a write that committed just in time.
const RESULT_GRACE: Duration = Duration::from_millis(250);

/// Create the API router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route(
            "/conversations",
            get(list_conversations).post(create_conversation),
        )
        .route(
            "/conversations/{id}",
            get(get_conversation)
                .patch(update_conversation)
                .delete(delete_conversation),
        )
        .route("/preferences", get(get_preferences).put(save_preferences))
        .route("/identity", delete(wipe_identity))
        .with_state(state)
}

/// Run a store call under the configured request timeout.
///
/// The store refuses to commit once the deadline has passed, so a call
/// abandoned here never writes when it finally reaches the database.
async fn bounded<T, F>(state: &AppState, operation: F) -> Result<T, ApiError>
where
    F: Future<Output = StoreResult<T>>,
{
    let limit = state.config.server.request_timeout();
    let deadline = Instant::now() + limit;
    tokio::time::timeout(limit + RESULT_GRACE, with_deadline(deadline, operation))
        .await
        .map_err(|_| ApiError::Timeout(limit))?
        .map_err(ApiError::from)
}

fn parse_conversation_id(raw: &str) -> Result<ConversationId, ApiError> {
    raw.parse()
        .map_err(|_| StoreError::not_found(format!("conversation {raw}")).into())
}

/// Health check endpoint.
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "chatkeep",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Claimed identities of a request.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityQuery {
    /// Authenticated user id.
    pub user_id: Option<String>,
    /// Guest id.
    pub guest_id: Option<String>,
}

impl IdentityQuery {
    fn resolve(&self) -> StoreResult<ResolvedIdentity> {
        resolve(self.user_id.as_deref(), self.guest_id.as_deref())
    }
}

/// Conversation listing query.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    /// Authenticated user id.
    pub user_id: Option<String>,
    /// Guest id.
    pub guest_id: Option<String>,
    /// Maximum number of conversations.
    pub limit: Option<usize>,
}

/// Several conversations.
#[derive(Debug, Serialize)]
pub struct ConversationsResponse {
    /// Conversations, most recently updated first.
    pub conversations: Vec<Conversation>,
}

/// A single conversation.
#[derive(Debug, Serialize)]
pub struct ConversationResponse {
    /// The conversation.
    pub conversation: Conversation,
}

/// List an identity's conversations.
async fn list_conversations(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> Result<Json<ConversationsResponse>, ApiError> {
    let identity = resolve(query.user_id.as_deref(), query.guest_id.as_deref())?;
    let limit = state.config.listing.effective_limit(query.limit);

    let conversations = bounded(
        &state,
        state.conversations.list(&identity.filter(), limit),
    )
    .await?;

    Ok(Json(ConversationsResponse { conversations }))
}

/// Conversation creation request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversationRequest {
    /// Authenticated user id.
    pub user_id: Option<String>,
    /// Guest id.
    pub guest_id: Option<String>,
    /// Initial messages.
    pub messages: Option<Vec<Message>>,
    /// Optional title.
    pub title: Option<String>,
}

/// Start a conversation. With both ids present the user owns it.
async fn create_conversation(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<CreateConversationRequest>,
) -> Result<(StatusCode, Json<ConversationResponse>), ApiError> {
    let owner = resolve(request.user_id.as_deref(), request.guest_id.as_deref())?.prefer_user();
    let input = NewConversation {
        owner,
        messages: request.messages.unwrap_or_default(),
        title: request.title,
    };

    let conversation = bounded(&state, state.conversations.create(input)).await?;
    Ok((
        StatusCode::CREATED,
        Json(ConversationResponse { conversation }),
    ))
}

/// Fetch one conversation.
async fn get_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ConversationResponse>, ApiError> {
    let id = parse_conversation_id(&id)?;
    let conversation = bounded(&state, state.conversations.get(id)).await?;
    Ok(Json(ConversationResponse { conversation }))
}

/// Conversation update request.
#[derive(Debug, Deserialize)]
pub struct UpdateConversationRequest {
    /// Messages to append.
    pub messages: Option<Vec<Message>>,
    /// Replacement title.
    pub title: Option<String>,
}

/// Append messages to and/or retitle a conversation.
async fn update_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<UpdateConversationRequest>,
) -> Result<Json<ConversationResponse>, ApiError> {
    let id = parse_conversation_id(&id)?;
    let update = ConversationUpdate {
        messages: request.messages,
        title: request.title,
    };

    let conversation = bounded(&state, state.conversations.append_and_retitle(id, update)).await?;
    Ok(Json(ConversationResponse { conversation }))
}

/// Deletion confirmation.
#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    /// Human-readable confirmation.
    pub message: String,
    /// Id of the deleted conversation.
    pub id: ConversationId,
}

/// Delete a conversation.
async fn delete_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let id = parse_conversation_id(&id)?;
    bounded(&state, state.conversations.delete(id)).await?;
    Ok(Json(DeleteResponse {
        message: "Conversation deleted successfully".to_string(),
        id,
    }))
}

/// A preference document.
#[derive(Debug, Serialize)]
pub struct PreferencesResponse {
    /// Stored or default preferences.
    pub preferences: Preference,
}

/// Read an identity's preferences.
///
/// With both ids present the user's document wins, then the guest's; when
/// neither exists the user's defaults are returned.
async fn get_preferences(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<IdentityQuery>,
) -> Result<Json<PreferencesResponse>, ApiError> {
    let preferences = match query.resolve()? {
        ResolvedIdentity::Single(owner) => {
            bounded(&state, state.preferences.get_or_default(&owner)).await?
        }
        ResolvedIdentity::Transitional { user, guest } => {
            if let Some(found) = bounded(&state, state.preferences.get(&user)).await? {
                found
            } else if let Some(found) = bounded(&state, state.preferences.get(&guest)).await? {
                debug!("Serving guest-era preferences of {guest} to {user}");
                found
            } else {
                bounded(&state, state.preferences.get_or_default(&user)).await?
            }
        }
    };

    Ok(Json(PreferencesResponse { preferences }))
}

/// Preference write request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavePreferencesRequest {
    /// Authenticated user id.
    pub user_id: Option<String>,
    /// Guest id.
    pub guest_id: Option<String>,
    /// Fields to change.
    #[serde(flatten)]
    pub update: PreferenceUpdate,
}

/// Create or merge an identity's preferences. With both ids present the user's document is written.
async fn save_preferences(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<SavePreferencesRequest>,
) -> Result<Json<PreferencesResponse>, ApiError> {
    let owner = resolve(request.user_id.as_deref(), request.guest_id.as_deref())?.prefer_user();
    let preferences = bounded(&state, state.preferences.upsert(&owner, request.update)).await?;
    Ok(Json(PreferencesResponse { preferences }))
}

/// Outcome of an identity wipe.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WipeResponse {
    /// Number of conversations removed.
    pub deleted_conversations: u64,
    /// Number of preference documents removed.
    pub deleted_preferences: u64,
}

/// Delete every conversation and preference document of the claimed
/// identities, all or nothing.
async fn wipe_identity(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<IdentityQuery>,
) -> Result<Json<WipeResponse>, ApiError> {
    let filter = query.resolve()?.filter();
    let report = bounded(&state, state.identities.wipe(&filter)).await?;

    Ok(Json(WipeResponse {
        deleted_conversations: report.conversations,
        deleted_preferences: report.preferences,
    }))
}
