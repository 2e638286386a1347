//! Client-side pieces: API access, session persistence, and the live
//! notification feed fed by the publish subscription.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::AppError;
use crate::models::{
    AuthResponse, BlogPost, CreatePostInput, LoginInput, PostPublished, RegisterInput, UserProfile,
};

/// HTTP client for the server's JSON API.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: String, token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            token,
        }
    }

    pub async fn register(&self, input: &RegisterInput) -> Result<AuthResponse, AppError> {
        self.post_json("/api/auth/register", input).await
    }

    pub async fn login(&self, input: &LoginInput) -> Result<AuthResponse, AppError> {
        self.post_json("/api/auth/login", input).await
    }

    pub async fn me(&self) -> Result<UserProfile, AppError> {
        self.get_json("/api/auth/me").await
    }

    /// Published posts, newest first.
    pub async fn published_posts(&self) -> Result<Vec<BlogPost>, AppError> {
        self.get_json("/api/posts").await
    }

    /// The caller's own posts, drafts included.
    pub async fn my_posts(&self) -> Result<Vec<BlogPost>, AppError> {
        self.get_json("/api/posts/mine").await
    }

    pub async fn create_post(&self, input: &CreatePostInput) -> Result<BlogPost, AppError> {
        self.post_json("/api/posts", input).await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, AppError> {
        let mut request = self.http.get(format!("{}{}", self.base_url, path));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|err| AppError::Internal(err.into()))?;
        decode(response).await
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &impl Serialize,
    ) -> Result<T, AppError> {
        let mut request = self.http.post(format!("{}{}", self.base_url, path)).json(body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|err| AppError::Internal(err.into()))?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, AppError> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|err| AppError::Internal(err.into()));
    }

    #[derive(Deserialize)]
    struct ErrorBody {
        error: String,
        message: String,
    }

    match response.json::<ErrorBody>().await {
        Ok(body) => Err(AppError::from_kind(&body.error, body.message)),
        Err(_) => Err(AppError::Internal(anyhow::anyhow!(
            "server returned {status}"
        ))),
    }
}

/// Persisted login session (token plus profile), the browser-storage analog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user: UserProfile,
}

impl Session {
    fn path(config: &Config) -> std::path::PathBuf {
        config.config_dir.join("session.json")
    }

    /// Load the stored session, if any.
    pub fn load(config: &Config) -> Option<Self> {
        let content = std::fs::read_to_string(Self::path(config)).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Persist this session.
    pub fn save(&self, config: &Config) -> Result<()> {
        config.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(Self::path(config), content).context("writing session file")?;
        Ok(())
    }

    /// Forget the stored session.
    pub fn clear(config: &Config) -> Result<()> {
        let path = Self::path(config);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

/// One entry in the on-screen notification list.
#[derive(Debug, Clone)]
pub struct Notification {
    pub id: u64,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Default)]
struct FeedState {
    next_id: u64,
    notifications: Vec<Notification>,
    posts: Vec<BlogPost>,
}

/// Client-side state container fed by the publish subscription.
///
/// Holds the received posts and a short-lived notification per event. Each
/// notification is removed a fixed delay after its own creation; the removal
/// targets the id captured at schedule time, not whatever happens to sit at
/// the front of the list when the timer fires.
#[derive(Clone)]
pub struct NotificationFeed {
    state: Arc<Mutex<FeedState>>,
    ttl: Duration,
}

impl NotificationFeed {
    pub fn new(ttl: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(FeedState::default())),
            ttl,
        }
    }

    /// Record a publish event and schedule its notification's expiry.
    pub fn apply(&self, event: &PostPublished) {
        let post = &event.0;
        let id = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            let id = state.next_id;
            state.next_id += 1;
            state.notifications.insert(
                0,
                Notification {
                    id,
                    message: format!("New post: {} by {}", post.title, post.author.username),
                    timestamp: Utc::now(),
                },
            );
            state.posts.insert(0, post.clone());
            id
        };

        let state = Arc::downgrade(&self.state);
        let ttl = self.ttl;
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            expire(&state, id);
        });
    }

    /// Current notifications, newest first.
    pub fn notifications(&self) -> Vec<Notification> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .notifications
            .clone()
    }

    /// Posts received over the feed, newest first.
    pub fn posts(&self) -> Vec<BlogPost> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .posts
            .clone()
    }

    /// Dismiss all notifications immediately.
    pub fn clear_notifications(&self) {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .notifications
            .clear();
    }
}

fn expire(state: &Weak<Mutex<FeedState>>, id: u64) {
    // The feed may have been torn down while the timer was pending.
    if let Some(state) = state.upgrade() {
        state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .notifications
            .retain(|n| n.id != id);
    }
}

/// Connect to the publish-notification stream and run the live feed until
/// the user quits.
pub async fn watch(config: &Config) -> Result<()> {
    let url = config.subscribe_url();
    let (socket, _) = connect_async(&url)
        .await
        .with_context(|| format!("connecting to {url}"))?;
    let (mut writer, mut reader) = socket.split();

    let feed = NotificationFeed::new(Duration::from_secs(config.notification_ttl_secs));

    let reader_feed = feed.clone();
    let pump = tokio::spawn(async move {
        while let Some(message) = reader.next().await {
            match message {
                Ok(Message::Text(text)) => match serde_json::from_str::<PostPublished>(&text) {
                    Ok(event) => reader_feed.apply(&event),
                    Err(err) => warn!("ignoring malformed publish event: {err}"),
                },
                Ok(Message::Close(_)) | Err(_) => break,
                _ => {}
            }
        }
        debug!("publish feed closed by server");
    });

    crate::tui::run_feed(feed, &url).await?;

    // Teardown: stop pumping and close the socket.
    pump.abort();
    let _ = writer.send(Message::Close(None)).await;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::User;

    fn event(title: &str) -> PostPublished {
        let user = User::new("alice", "alice@x.com", "hash");
        PostPublished(BlogPost::new(
            title.to_string(),
            "World".to_string(),
            true,
            user.author(),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_apply_prepends_notification_and_post() {
        let feed = NotificationFeed::new(Duration::from_secs(5));
        feed.apply(&event("first"));
        feed.apply(&event("second"));

        let notifications = feed.notifications();
        assert_eq!(notifications.len(), 2);
        assert_eq!(notifications[0].message, "New post: second by alice");
        assert_eq!(notifications[1].message, "New post: first by alice");

        let posts = feed.posts();
        assert_eq!(posts[0].title, "second");
        assert_eq!(posts[1].title, "first");
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_removes_the_scheduled_notification() {
        let feed = NotificationFeed::new(Duration::from_secs(5));
        feed.apply(&event("old"));
        // Let the expiry task register its timer before moving the clock.
        tokio::task::yield_now().await;

        tokio::time::advance(Duration::from_secs(3)).await;
        feed.apply(&event("new"));
        tokio::task::yield_now().await;

        // The first notification's timer fires; the newer one stays even
        // though it now sits at the front of the list.
        tokio::time::advance(Duration::from_secs(2)).await;
        tokio::task::yield_now().await;

        let notifications = feed.notifications();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].message, "New post: new by alice");

        tokio::time::advance(Duration::from_secs(3)).await;
        tokio::task::yield_now().await;
        assert!(feed.notifications().is_empty());

        // Posts are not expired, only notifications.
        assert_eq!(feed.posts().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_notifications() {
        let feed = NotificationFeed::new(Duration::from_secs(5));
        feed.apply(&event("one"));
        feed.clear_notifications();
        assert!(feed.notifications().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_after_teardown_is_harmless() {
        let feed = NotificationFeed::new(Duration::from_secs(5));
        feed.apply(&event("one"));
        tokio::task::yield_now().await;
        drop(feed);

        tokio::time::advance(Duration::from_secs(6)).await;
        tokio::task::yield_now().await;
    }
}
