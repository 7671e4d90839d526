use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, Path, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

use convo_shared::{Message, ReplyPreview, UserId};
use convo_store::{Store, UserProfile};

use crate::attachments::Upload;
use crate::caller::Caller;
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::gateway;
use crate::pipeline::{DeliveryPipeline, SendRequest};
use crate::registry::ConnectionRegistry;
use crate::relay::SignalRelay;

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub registry: ConnectionRegistry,
    pub pipeline: DeliveryPipeline,
    pub relay: SignalRelay,
    pub config: Arc<ServerConfig>,
    pub started_at: Instant,
}

pub fn build_router(state: AppState) -> Router {
    let config = state.config.clone();

    let mut router = Router::new()
        .route("/health", get(health_check))
        .route("/info", get(server_info))
        .route("/ws", get(gateway::ws_handler))
        .route("/api/v1/message/send/:id", post(send_message))
        .route("/api/v1/message/edit/:message_id", put(edit_message))
        .route("/api/v1/message/:id", get(get_messages))
        .route("/api/v1/user/block/:id", post(block_user))
        .route("/api/v1/user/unblock/:id", post(unblock_user))
        .route("/api/v1/user/profile", put(update_profile))
        .route("/api/v1/user/online", get(online_users))
        .route("/admin/status", get(admin_status));

    if config.object_storage.is_none() {
        router = router.nest_service(&config.uploads_route, ServeDir::new(&config.uploads_dir));
    }

    router
        .layer(DefaultBodyLimit::max(config.max_request_body()))
        .layer(cors_layer(&config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let origin = match config.cors_origin.as_deref() {
        Some(raw) => match HeaderValue::from_str(raw) {
            Ok(value) => AllowOrigin::exact(value),
            Err(_) => {
                warn!(value = %raw, "Invalid CORS_ORIGIN, allowing any origin");
                AllowOrigin::from(Any)
            }
        },
        None => AllowOrigin::from(Any),
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers(Any)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ServerInfoResponse {
    name: String,
    version: &'static str,
    online_count: usize,
    attachment_policy: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AdminStatusResponse {
    name: String,
    online_users: Vec<UserId>,
    connections: usize,
    uptime_secs: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendResponse {
    new_message: Message,
}

#[derive(Deserialize)]
struct EditRequest {
    message: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BlockListResponse {
    blocked_contacts: Vec<UserId>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileUpdate {
    full_name: String,
    #[serde(default)]
    profile_photo: String,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn server_info(State(state): State<AppState>) -> Json<ServerInfoResponse> {
    Json(ServerInfoResponse {
        name: state.config.instance_name.clone(),
        version: env!("CARGO_PKG_VERSION"),
        online_count: state.registry.online().await.len(),
        attachment_policy: state.pipeline.storage_policy(),
    })
}

// ─── Messages ───

async fn send_message(
    State(state): State<AppState>,
    caller: Caller,
    Path(receiver): Path<String>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<SendResponse>), ServerError> {
    let mut request = read_send_form(multipart).await?;
    request.receiver = Some(UserId::parse(&receiver)?);

    let new_message = state.pipeline.send(&caller, request).await?;
    Ok((StatusCode::CREATED, Json(SendResponse { new_message })))
}

/// Pull the text fields and files out of a send form. Unknown fields are
/// ignored.
async fn read_send_form(mut multipart: Multipart) -> Result<SendRequest, ServerError> {
    let mut request = SendRequest::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(format!("Multipart error: {e}")))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "attachments" => {
                let file_name = field.file_name().unwrap_or("file").to_string();
                let media_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ServerError::BadRequest(format!("Failed to read field: {e}")))?;
                request.attachments.push(Upload {
                    file_name,
                    media_type,
                    data,
                });
            }
            "message" | "replyTo" | "replyPreview" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ServerError::BadRequest(format!("Failed to read field: {e}")))?;
                match name.as_str() {
                    "message" => request.text = value,
                    "replyTo" => request.reply_to = parse_reply_to(&value)?,
                    _ => request.reply_preview = ReplyPreview::from_json_lenient(&value),
                }
            }
            _ => {}
        }
    }

    Ok(request)
}

fn parse_reply_to(raw: &str) -> Result<Option<Uuid>, ServerError> {
    let raw = raw.trim();
    if raw.is_empty() || raw == "null" {
        return Ok(None);
    }
    Uuid::parse_str(raw)
        .map(Some)
        .map_err(|_| ServerError::BadRequest(format!("Invalid replyTo: {raw}")))
}

async fn get_messages(
    State(state): State<AppState>,
    caller: Caller,
    Path(counterparty): Path<String>,
) -> Result<Json<Vec<Message>>, ServerError> {
    let counterparty = UserId::parse(&counterparty)?;
    let messages = state.pipeline.conversation(&caller, &counterparty).await?;
    Ok(Json(messages))
}

async fn edit_message(
    State(state): State<AppState>,
    caller: Caller,
    Path(message_id): Path<String>,
    payload: Result<Json<EditRequest>, JsonRejection>,
) -> Result<Json<Message>, ServerError> {
    let id = Uuid::parse_str(&message_id)
        .map_err(|_| ServerError::BadRequest(format!("Invalid message id: {message_id}")))?;
    let Json(req) = payload.map_err(|e| ServerError::BadRequest(e.body_text()))?;

    let updated = state.pipeline.edit(&caller, id, &req.message).await?;
    Ok(Json(updated))
}

// ─── Directory ───

async fn block_user(
    State(state): State<AppState>,
    caller: Caller,
    Path(target): Path<String>,
) -> Result<Json<BlockListResponse>, ServerError> {
    let target = UserId::parse(&target)?;
    if target == caller.id {
        return Err(ServerError::BadRequest("Cannot block yourself".to_string()));
    }
    let blocked_contacts = state.store.block(&caller.id, &target).await?;
    info!(user = %caller.id, blocked = %target, "Contact blocked");
    Ok(Json(BlockListResponse { blocked_contacts }))
}

async fn unblock_user(
    State(state): State<AppState>,
    caller: Caller,
    Path(target): Path<String>,
) -> Result<Json<BlockListResponse>, ServerError> {
    let target = UserId::parse(&target)?;
    let blocked_contacts = state.store.unblock(&caller.id, &target).await?;
    info!(user = %caller.id, unblocked = %target, "Contact unblocked");
    Ok(Json(BlockListResponse { blocked_contacts }))
}

async fn update_profile(
    State(state): State<AppState>,
    caller: Caller,
    payload: Result<Json<ProfileUpdate>, JsonRejection>,
) -> Result<Json<UserProfile>, ServerError> {
    let Json(update) = payload.map_err(|e| ServerError::BadRequest(e.body_text()))?;
    let profile = state
        .store
        .upsert_profile(UserProfile {
            id: caller.id,
            full_name: update.full_name.trim().to_string(),
            profile_photo: update.profile_photo.trim().to_string(),
        })
        .await?;
    Ok(Json(profile))
}

async fn online_users(State(state): State<AppState>, _caller: Caller) -> Json<Vec<UserId>> {
    Json(state.registry.online().await)
}

// ─── Admin ───

fn verify_admin_token(headers: &HeaderMap, config: &ServerConfig) -> Result<(), ServerError> {
    let Some(ref expected) = config.admin_token else {
        return Err(ServerError::AuthorizationDenied(
            "Admin API is disabled (no ADMIN_TOKEN configured)".into(),
        ));
    };

    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth.strip_prefix("Bearer ").unwrap_or(auth);

    use subtle::ConstantTimeEq;
    let token_bytes = token.as_bytes();
    let expected_bytes = expected.as_bytes();
    if token_bytes.len() != expected_bytes.len()
        || token_bytes.ct_eq(expected_bytes).unwrap_u8() != 1
    {
        return Err(ServerError::AuthorizationDenied("Invalid admin token".into()));
    }
    Ok(())
}

async fn admin_status(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Json<AdminStatusResponse>, ServerError> {
    verify_admin_token(&headers, &state.config)?;

    Ok(Json(AdminStatusResponse {
        name: state.config.instance_name.clone(),
        online_users: state.registry.online().await,
        connections: state.registry.connection_count().await,
        uptime_secs: state.started_at.elapsed().as_secs(),
    }))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}
