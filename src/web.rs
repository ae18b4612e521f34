use crate::{
    app::{AppBackend, AppError, AppLocal, MediaEntryRequest, TextEntryRequest},
    auth::{self, SessionStore},
    config::Config,
    entries::{CollectionSummary, Entry},
    ingest::ContentProcessingError,
    openai::EmbeddingError,
    projection::ProjectedPoint,
};
use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{fmt::Debug, sync::Arc};
use tokio::signal;

pub struct SharedState {
    pub app: Arc<dyn AppBackend>,
    pub sessions: Arc<SessionStore>,
    pub config: Arc<Config>,
}

async fn start_app(app: AppLocal, config: Config) {
    let sessions = Arc::new(SessionStore::new(config.auth.session_ttl_secs));
    let media_dir = config.media_dir();
    let bind_addr = config.bind_addr.clone();

    let state = Arc::new(SharedState {
        app: Arc::new(app),
        sessions,
        config: Arc::new(config),
    });

    let app = router(state, &media_dir);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await.unwrap();
    log::info!("listening on {bind_addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

pub fn start_daemon(app: AppLocal, config: Config) {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(async { start_app(app, config).await });
}

pub fn router(state: Arc<SharedState>, media_dir: &str) -> Router {
    Router::new()
        .nest_service(
            "/api/file",
            tower_http::services::ServeDir::new(media_dir),
        )
        .route("/api/add", post(add))
        .route("/api/add_image", post(add_image))
        .route("/api/add_audio", post(add_audio))
        .route("/api/delete_entry", post(delete_entry))
        .route("/api/delete_comment", post(delete_comment))
        .route("/api/collections", get(collections).post(create_collection))
        .route("/api/collection/:name", get(collection_view))
        .route("/api/collection/:name/layout", get(collection_layout))
        .route("/api/admin/signin", post(admin_signin))
        .route("/api/admin/signout", post(admin_signout))
        .route("/api/admin/status", get(admin_status))
        .layer(DefaultBodyLimit::max(100 * 1024 * 1024))
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(
                    tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO),
                )
                .on_response(
                    tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO),
                ),
        )
        .with_state(state)
}

// Wrapper that teaches axum how to render `AppError`.
#[derive(Debug)]
struct HttpError(AppError);

impl IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        let body = json!({"error": self.0.to_string()}).to_string();

        let status = match &self.0 {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::AlreadyExists(_) => StatusCode::CONFLICT,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::NestedComment(_)
            | AppError::NotAComment(_)
            | AppError::InvalidRequest(_)
            | AppError::Base64(_) => StatusCode::BAD_REQUEST,
            AppError::ContentProcessing(ContentProcessingError::EmptyContent)
            | AppError::Embedding(EmbeddingError::EmptyInput) => StatusCode::BAD_REQUEST,
            AppError::ContentProcessing(_) | AppError::Embedding(_) => {
                log::error!("{self:?}");
                StatusCode::BAD_GATEWAY
            }
            AppError::Store(_) | AppError::IO(_) | AppError::Other(_) => {
                log::error!("{self:?}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, body).into_response()
    }
}

// This enables using `?` on functions returning `Result<_, AppError>` (or
// anything convertible) inside handlers.
impl<E> From<E> for HttpError
where
    E: Into<AppError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

/// The authorization gate: a valid x-api-key header or a live admin
/// session cookie. Every mutating route checks this first.
fn authorize(state: &SharedState, headers: &HeaderMap) -> Result<(), HttpError> {
    if let Some(key) = headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
        if auth::validate_secret(key, &state.config.auth.api_key) {
            return Ok(());
        }
    }

    if let Some(cookies) = headers.get(header::COOKIE).and_then(|v| v.to_str().ok()) {
        if let Some(token) = auth::extract_session_cookie(cookies) {
            if state.sessions.validate(token) {
                return Ok(());
            }
        }
    }

    Err(HttpError(AppError::Unauthorized))
}

fn default_collection() -> String {
    "default".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddEntryRequest {
    pub data: String,

    #[serde(default = "default_collection")]
    pub collection: String,

    /// Set to make this entry a comment on an existing root entry
    #[serde(default)]
    pub parent_id: Option<String>,

    /// Free-form attribution; a leading @ marks an Instagram handle
    #[serde(default)]
    pub author: Option<String>,
}

async fn add(
    State(state): State<Arc<SharedState>>,
    headers: HeaderMap,
    Json(payload): Json<AddEntryRequest>,
) -> Result<Json<Entry>, HttpError> {
    authorize(&state, &headers)?;
    log::debug!("payload: {payload:?}");

    let request = TextEntryRequest {
        text: payload.data,
        collection: payload.collection,
        parent_id: payload.parent_id.map(Into::into),
        author: payload.author,
    };

    tokio::task::block_in_place(move || {
        state.app.add_text(request).map(Json).map_err(Into::into)
    })
}

#[derive(Clone, Deserialize)]
pub struct AddMediaRequest {
    /// Base64-encoded file contents
    pub file_b64: String,
    pub filename: String,

    #[serde(default = "default_collection")]
    pub collection: String,

    #[serde(default)]
    pub parent_id: Option<String>,

    #[serde(default)]
    pub author: Option<String>,
}

impl Debug for AddMediaRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "AddMediaRequest {{ file_b64: [{} chars], filename: {:?}, collection: {:?}, parent_id: {:?}, author: {:?} }}",
            self.file_b64.len(),
            self.filename,
            self.collection,
            self.parent_id,
            self.author
        )
    }
}

impl AddMediaRequest {
    fn into_media_request(self) -> Result<MediaEntryRequest, AppError> {
        let bytes = STANDARD.decode(self.file_b64)?;

        Ok(MediaEntryRequest {
            bytes,
            filename: self.filename,
            collection: self.collection,
            parent_id: self.parent_id.map(Into::into),
            author: self.author,
        })
    }
}

async fn add_image(
    State(state): State<Arc<SharedState>>,
    headers: HeaderMap,
    Json(payload): Json<AddMediaRequest>,
) -> Result<Json<Entry>, HttpError> {
    authorize(&state, &headers)?;
    log::debug!("payload: {payload:?}");

    tokio::task::block_in_place(move || {
        let request = payload.into_media_request()?;
        state.app.add_image(request).map(Json).map_err(Into::into)
    })
}

async fn add_audio(
    State(state): State<Arc<SharedState>>,
    headers: HeaderMap,
    Json(payload): Json<AddMediaRequest>,
) -> Result<Json<Entry>, HttpError> {
    authorize(&state, &headers)?;
    log::debug!("payload: {payload:?}");

    tokio::task::block_in_place(move || {
        let request = payload.into_media_request()?;
        state.app.add_audio(request).map(Json).map_err(Into::into)
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeleteRequest {
    pub id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    pub id: String,
    /// Entries removed, cascaded comments included
    pub deleted: usize,
}

async fn delete_entry(
    State(state): State<Arc<SharedState>>,
    headers: HeaderMap,
    Json(payload): Json<DeleteRequest>,
) -> Result<Json<DeleteResponse>, HttpError> {
    authorize(&state, &headers)?;
    log::debug!("payload: {payload:?}");

    tokio::task::block_in_place(move || {
        let deleted = state.app.delete_entry(&payload.id.clone().into())?;
        Ok(Json(DeleteResponse {
            id: payload.id,
            deleted,
        }))
    })
}

async fn delete_comment(
    State(state): State<Arc<SharedState>>,
    headers: HeaderMap,
    Json(payload): Json<DeleteRequest>,
) -> Result<Json<DeleteResponse>, HttpError> {
    authorize(&state, &headers)?;
    log::debug!("payload: {payload:?}");

    tokio::task::block_in_place(move || {
        state.app.delete_comment(&payload.id.clone().into())?;
        Ok(Json(DeleteResponse {
            id: payload.id,
            deleted: 1,
        }))
    })
}

async fn collections(
    State(state): State<Arc<SharedState>>,
) -> Result<Json<Vec<CollectionSummary>>, HttpError> {
    tokio::task::block_in_place(move || {
        state.app.collections().map(Json).map_err(Into::into)
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCollectionRequest {
    pub name: String,
}

async fn create_collection(
    State(state): State<Arc<SharedState>>,
    headers: HeaderMap,
    Json(payload): Json<CreateCollectionRequest>,
) -> Result<Json<serde_json::Value>, HttpError> {
    authorize(&state, &headers)?;
    log::debug!("payload: {payload:?}");

    let name = payload.name.trim().to_string();
    if name.is_empty() {
        return Err(HttpError(AppError::InvalidRequest(
            "collection name is required".to_string(),
        )));
    }

    tokio::task::block_in_place(move || {
        state.app.create_collection(&name)?;
        Ok(Json(json!({ "name": name })))
    })
}

async fn collection_view(
    State(state): State<Arc<SharedState>>,
    Path(name): Path<String>,
) -> Result<Json<Vec<Entry>>, HttpError> {
    tokio::task::block_in_place(move || {
        state
            .app
            .collection_view(&name)
            .map(Json)
            .map_err(Into::into)
    })
}

async fn collection_layout(
    State(state): State<Arc<SharedState>>,
    Path(name): Path<String>,
) -> Result<Json<Vec<ProjectedPoint>>, HttpError> {
    tokio::task::block_in_place(move || {
        state
            .app
            .project_collection(&name)
            .map(Json)
            .map_err(Into::into)
    })
}

#[derive(Clone, Deserialize)]
pub struct SigninRequest {
    pub username: String,
    pub password: String,
}

impl Debug for SigninRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "SigninRequest {{ username: {:?}, password: [redacted] }}",
            self.username
        )
    }
}

async fn admin_signin(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<SigninRequest>,
) -> Result<impl IntoResponse, HttpError> {
    log::debug!("payload: {payload:?}");

    let auth_config = &state.config.auth;

    let username_ok = payload.username == auth_config.admin_username;
    let password_ok = auth::validate_secret(&payload.password, &auth_config.admin_password);

    if !username_ok || !password_ok {
        return Err(HttpError(AppError::Unauthorized));
    }

    state.sessions.purge_expired();
    let token = state.sessions.create();

    let cookie = format!(
        "{}={token}; HttpOnly; Path=/; SameSite=Lax; Max-Age={}",
        auth::SESSION_COOKIE,
        auth_config.session_ttl_secs
    );

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(json!({ "ok": true })),
    ))
}

async fn admin_signout(
    State(state): State<Arc<SharedState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, HttpError> {
    if let Some(cookies) = headers.get(header::COOKIE).and_then(|v| v.to_str().ok()) {
        if let Some(token) = auth::extract_session_cookie(cookies) {
            state.sessions.destroy(token);
        }
    }

    let cookie = format!("{}=; HttpOnly; Path=/; Max-Age=0", auth::SESSION_COOKIE);

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(json!({ "ok": true })),
    ))
}

#[derive(Debug, Clone, Serialize)]
pub struct AdminStatusResponse {
    pub authorized: bool,
}

async fn admin_status(
    State(state): State<Arc<SharedState>>,
    headers: HeaderMap,
) -> Json<AdminStatusResponse> {
    let authorized = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(auth::extract_session_cookie)
        .map(|token| state.sessions.validate(token))
        .unwrap_or(false);

    Json(AdminStatusResponse { authorized })
}
