use std::convert::Infallible;
use std::pin::Pin;

use axum::{
    extract::{Path, State},
    http::{Method, StatusCode},
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use marquee_client::AppState;
use marquee_shared::{
    Conversation, ConversationId, Message, MessageKind, MessageMetadata, NewConversation,
    NewMessage, NewNotification, Notification, NotificationId, NotificationPreferences, UserId,
};
use marquee_store::Subscription;

use crate::error::ServerError;

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route(
            "/conversations",
            get(list_conversations).post(create_conversation),
        )
        .route("/conversations/events", get(conversation_events))
        .route(
            "/conversations/:id/messages",
            get(list_messages).post(send_message),
        )
        .route("/conversations/:id/read", post(mark_conversation_read))
        .route("/conversations/:id/events", get(message_events))
        .route(
            "/notifications",
            get(list_notifications).post(add_notification),
        )
        .route("/notifications/read-all", post(mark_all_notifications_read))
        .route(
            "/notifications/preferences",
            get(get_preferences).put(update_preferences),
        )
        .route("/notifications/:id/read", post(mark_notification_read))
        .route("/notifications/:id", axum::routing::delete(delete_notification))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the API until the listener fails.
pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "HTTP API listening");
    axum::serve(listener, app).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Request / response bodies
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    connected: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendMessageRequest {
    content: String,
    sender_id: UserId,
    sender_name: String,
    #[serde(default)]
    sender_avatar: Option<String>,
    #[serde(default, rename = "type")]
    kind: MessageKind,
    #[serde(default)]
    metadata: Option<MessageMetadata>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct MarkReadRequest {
    #[serde(default)]
    user_id: Option<UserId>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MarkReadResponse {
    changed: bool,
    unread_count: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NotificationFeed {
    notifications: Vec<Notification>,
    unread_count: usize,
}

#[derive(Serialize)]
struct ChangedResponse {
    changed: bool,
}

#[derive(Serialize)]
struct MarkAllResponse {
    updated: usize,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        connected: state.chat.is_connected(),
    })
}

async fn list_conversations(State(state): State<AppState>) -> Json<Vec<Conversation>> {
    Json(state.chat.get_conversations())
}

async fn create_conversation(
    State(state): State<AppState>,
    Json(new): Json<NewConversation>,
) -> Result<(StatusCode, Json<Conversation>), ServerError> {
    if new.participants.is_empty() {
        return Err(ServerError::BadRequest(
            "A conversation needs at least one participant".into(),
        ));
    }
    let conversation = state.chat.create_conversation(new);
    info!(id = %conversation.id, "Conversation created via API");
    Ok((StatusCode::CREATED, Json(conversation)))
}

async fn list_messages(
    State(state): State<AppState>,
    Path(id): Path<ConversationId>,
) -> Result<Json<Vec<Message>>, ServerError> {
    // The facade returns an empty list for unknown ids; over HTTP that is a 404.
    if state.chat.get_conversation(&id).is_none() {
        return Err(marquee_store::StoreError::UnknownConversation(id).into());
    }
    Ok(Json(state.chat.get_messages(&id)))
}

async fn send_message(
    State(state): State<AppState>,
    Path(id): Path<ConversationId>,
    Json(req): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<Message>), ServerError> {
    if req.content.trim().is_empty() && req.metadata.is_none() {
        return Err(ServerError::BadRequest("Message content is empty".into()));
    }

    let mut new = NewMessage::text(req.sender_id, req.sender_name, req.content).with_kind(req.kind);
    if let Some(metadata) = req.metadata {
        new = new.with_metadata(metadata);
    }
    if let Some(avatar) = req.sender_avatar {
        new = new.with_avatar(avatar);
    }

    let message = state.chat.send(&id, new)?;
    Ok((StatusCode::CREATED, Json(message)))
}

async fn mark_conversation_read(
    State(state): State<AppState>,
    Path(id): Path<ConversationId>,
    body: Option<Json<MarkReadRequest>>,
) -> Result<Json<MarkReadResponse>, ServerError> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let reader = req
        .user_id
        .or_else(|| state.chat.local_user())
        .ok_or_else(|| ServerError::BadRequest("userId is required while disconnected".into()))?;

    let changed = state.chat.mark_as_read(&id, &reader)?;
    let unread_count = state
        .chat
        .get_conversation(&id)
        .map_or(0, |c| c.unread_count);
    Ok(Json(MarkReadResponse {
        changed,
        unread_count,
    }))
}

async fn list_notifications(State(state): State<AppState>) -> Json<NotificationFeed> {
    Json(NotificationFeed {
        notifications: state.notifications.get_notifications(),
        unread_count: state.notifications.unread_count(),
    })
}

async fn add_notification(
    State(state): State<AppState>,
    Json(new): Json<NewNotification>,
) -> Result<Response, ServerError> {
    if new.title.trim().is_empty() {
        return Err(ServerError::BadRequest("Notification title is empty".into()));
    }
    // A kind the user switched off is accepted but not stored.
    Ok(match state.notifications.add(new) {
        Some(notification) => (StatusCode::CREATED, Json(notification)).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    })
}

async fn get_preferences(State(state): State<AppState>) -> Json<NotificationPreferences> {
    Json(state.notifications.preferences())
}

async fn update_preferences(
    State(state): State<AppState>,
    Json(preferences): Json<NotificationPreferences>,
) -> Json<NotificationPreferences> {
    state.notifications.set_preferences(preferences);
    Json(state.notifications.preferences())
}

async fn mark_all_notifications_read(State(state): State<AppState>) -> Json<MarkAllResponse> {
    Json(MarkAllResponse {
        updated: state.notifications.mark_all_as_read(),
    })
}

async fn mark_notification_read(
    State(state): State<AppState>,
    Path(id): Path<NotificationId>,
) -> Result<Json<ChangedResponse>, ServerError> {
    let changed = state.notifications.mark_as_read(&id)?;
    Ok(Json(ChangedResponse { changed }))
}

async fn delete_notification(
    State(state): State<AppState>,
    Path(id): Path<NotificationId>,
) -> Result<Json<serde_json::Value>, ServerError> {
    state.notifications.delete_notification(&id)?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}

// ---------------------------------------------------------------------------
// Server-sent events
// ---------------------------------------------------------------------------

/// Unsubscribes when the SSE stream is dropped, i.e. when the client leaves.
struct SubscriptionGuard(Subscription);

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        debug!("Event stream closed, unsubscribing");
        self.0.unsubscribe();
    }
}

type BoxedEvents = Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>;
type EventStream = Sse<BoxedEvents>;

fn sse_from<T>(rx: mpsc::UnboundedReceiver<T>, guard: SubscriptionGuard) -> EventStream
where
    T: Serialize + Send + 'static,
{
    let stream = stream::unfold((rx, guard), |(mut rx, guard)| async move {
        let item = rx.recv().await?;
        let event = Event::default()
            .json_data(&item)
            .unwrap_or_else(|e| Event::default().event("error").data(e.to_string()));
        Some((Ok(event), (rx, guard)))
    });
    let stream: BoxedEvents = Box::pin(stream);
    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn conversation_events(State(state): State<AppState>) -> EventStream {
    let (tx, rx) = mpsc::unbounded_channel::<Vec<Conversation>>();
    let listener_tx = tx.clone();
    let subscription = state
        .chat
        .subscribe_to_conversations(move |conversations: &[Conversation]| {
            let _ = listener_tx.send(conversations.to_vec());
        });
    let _ = tx.send(state.chat.get_conversations());
    sse_from(rx, SubscriptionGuard(subscription))
}

async fn message_events(
    State(state): State<AppState>,
    Path(id): Path<ConversationId>,
) -> Result<EventStream, ServerError> {
    if state.chat.get_conversation(&id).is_none() {
        return Err(marquee_store::StoreError::UnknownConversation(id).into());
    }

    let (tx, rx) = mpsc::unbounded_channel::<Vec<Message>>();
    let listener_tx = tx.clone();
    let subscription = state
        .chat
        .subscribe_to_messages(&id, move |messages: &[Message]| {
            let _ = listener_tx.send(messages.to_vec());
        });
    let _ = tx.send(state.chat.get_messages(&id));
    Ok(sse_from(rx, SubscriptionGuard(subscription)))
}
