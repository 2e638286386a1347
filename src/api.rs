//! HTTP and WebSocket API for the blog server.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::{header, HeaderMap},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use crate::auth::AuthService;
use crate::config::Config;
use crate::error::AppError;
use crate::events::EventBus;
use crate::models::{
    AuthResponse, BlogPost, CreatePostInput, LoginInput, PostPublished, RegisterInput,
    UpdatePostInput, UserProfile, POST_PUBLISHED_TOPIC,
};
use crate::posts::BlogPostService;
use crate::storage::{PostRepository, Storage, UserRepository};

/// Shared application state for the API server.
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub posts: Arc<BlogPostService>,
    /// Broadcast bus for publish notifications.
    pub bus: EventBus<PostPublished>,
}

impl AppState {
    /// Wire up services over an initialized storage.
    pub fn new(storage: Storage, config: &Config) -> Self {
        let bus = EventBus::new();
        let users: Arc<dyn UserRepository> = Arc::new(storage.clone());
        let posts_repo: Arc<dyn PostRepository> = Arc::new(storage);

        Self {
            auth: Arc::new(AuthService::new(
                users,
                &config.jwt_secret,
                chrono::Duration::hours(config.token_ttl_hours),
            )),
            posts: Arc::new(BlogPostService::new(posts_repo, bus.clone())),
            bus,
        }
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/auth/register", post(register_handler))
        .route("/api/auth/login", post(login_handler))
        .route("/api/auth/me", get(me_handler))
        .route("/api/posts", get(list_posts_handler).post(create_post_handler))
        .route("/api/posts/mine", get(my_posts_handler))
        .route(
            "/api/posts/:id",
            get(get_post_handler)
                .put(update_post_handler)
                .delete(delete_post_handler),
        )
        .route("/api/posts/subscribe", get(subscribe_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Run the API server until the process is stopped.
pub async fn run_server(config: &Config) -> Result<()> {
    let storage = Storage::new(&config.db_path).await?;
    storage.initialize().await?;

    let state = AppState::new(storage, config);
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.http_port).parse()?;
    info!("API server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::AUTHORIZATION)?.to_str().ok()
}

async fn register_handler(
    State(state): State<AppState>,
    Json(input): Json<RegisterInput>,
) -> Result<Json<AuthResponse>, AppError> {
    Ok(Json(state.auth.register(input).await?))
}

async fn login_handler(
    State(state): State<AppState>,
    Json(input): Json<LoginInput>,
) -> Result<Json<AuthResponse>, AppError> {
    Ok(Json(state.auth.login(input).await?))
}

async fn me_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<UserProfile>, AppError> {
    let user = state.auth.authenticate(bearer(&headers)).await?;
    Ok(Json(user.profile()))
}

async fn list_posts_handler(
    State(state): State<AppState>,
) -> Result<Json<Vec<BlogPost>>, AppError> {
    Ok(Json(state.posts.published_posts().await?))
}

async fn my_posts_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<BlogPost>>, AppError> {
    let user = state.auth.authenticate(bearer(&headers)).await?;
    Ok(Json(state.posts.posts_by_author(&user).await?))
}

async fn get_post_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<BlogPost>, AppError> {
    Ok(Json(state.posts.post(&id).await?))
}

async fn create_post_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<CreatePostInput>,
) -> Result<Json<BlogPost>, AppError> {
    let user = state.auth.authenticate(bearer(&headers)).await?;
    Ok(Json(state.posts.create_post(input, &user).await?))
}

async fn update_post_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(input): Json<UpdatePostInput>,
) -> Result<Json<BlogPost>, AppError> {
    let user = state.auth.authenticate(bearer(&headers)).await?;
    Ok(Json(state.posts.update_post(&id, input, &user).await?))
}

async fn delete_post_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<bool>, AppError> {
    let user = state.auth.authenticate(bearer(&headers)).await?;
    Ok(Json(state.posts.delete_post(&id, &user).await?))
}

/// WebSocket upgrade for the publish-notification stream.
///
/// Subscribing requires no authentication; the stream carries only posts
/// that are public anyway.
async fn subscribe_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_subscription(socket, state))
}

/// Per-connection delivery loop: subscribe, forward events until the
/// connection goes away, then deregister exactly once.
async fn handle_subscription(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let mut subscription = state.bus.subscribe(POST_PUBLISHED_TOPIC);

    debug!(topic = subscription.topic(), "publish-feed subscriber connected");

    loop {
        tokio::select! {
            event = subscription.recv() => {
                let Some(event) = event else { break };
                let frame = match serde_json::to_string(&event) {
                    Ok(frame) => frame,
                    Err(err) => {
                        warn!("dropping undeliverable publish event: {err}");
                        continue;
                    }
                };
                if sender.send(Message::Text(frame)).await.is_err() {
                    break;
                }
            }
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sender.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
        }
    }

    // Single exit point for every close trigger; unsubscribing again via
    // the subscription's own drop is a no-op.
    state.bus.unsubscribe(&subscription);
    debug!(
        remaining = state.bus.subscriber_count(POST_PUBLISHED_TOPIC),
        "publish-feed subscriber disconnected"
    );
}
