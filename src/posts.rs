//! Blog post queries, author-gated mutations, and publish-event emission.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use crate::error::AppError;
use crate::events::EventBus;
use crate::models::{
    validate_post_fields, BlogPost, CreatePostInput, PostPublished, UpdatePostInput, User,
    POST_PUBLISHED_TOPIC,
};
use crate::storage::PostRepository;

/// Mutation handler and query surface for blog posts.
///
/// Mutations persist through the repository; whenever a mutation leaves a
/// post published, a [`PostPublished`] event is emitted on the bus. Emission
/// is fire-and-forget: it happens after persistence succeeded and its
/// outcome never affects the mutation result.
pub struct BlogPostService {
    posts: Arc<dyn PostRepository>,
    bus: EventBus<PostPublished>,
}

impl BlogPostService {
    pub fn new(posts: Arc<dyn PostRepository>, bus: EventBus<PostPublished>) -> Self {
        Self { posts, bus }
    }

    /// Create a post attributed to `author`. `published` defaults to true.
    pub async fn create_post(
        &self,
        input: CreatePostInput,
        author: &User,
    ) -> Result<BlogPost, AppError> {
        validate_post_fields(&input.title, &input.content)?;

        let published = input.published.unwrap_or(true);
        let post = BlogPost::new(input.title, input.content, published, author.author());
        self.posts.save(&post).await?;

        if post.published {
            self.emit_published(&post);
        }

        Ok(post)
    }

    /// Overwrite a post's title, content, and published flag.
    ///
    /// Only the author may update a post. Emission keys off the flag
    /// requested by the input, not off a false-to-true transition, so
    /// re-saving an already-published post emits again.
    pub async fn update_post(
        &self,
        id: &str,
        input: UpdatePostInput,
        actor: &User,
    ) -> Result<BlogPost, AppError> {
        validate_post_fields(&input.title, &input.content)?;

        let mut post = self.fetch(id).await?;
        if post.author.id != actor.id {
            return Err(AppError::Forbidden(
                "you can only update your own blog posts".to_string(),
            ));
        }

        post.title = input.title;
        post.content = input.content;
        post.published = input.published;
        post.updated_at = Utc::now();
        self.posts.save(&post).await?;

        if input.published {
            self.emit_published(&post);
        }

        Ok(post)
    }

    /// Delete a post. Only the author may delete it. Never emits an event.
    pub async fn delete_post(&self, id: &str, actor: &User) -> Result<bool, AppError> {
        let post = self.fetch(id).await?;
        if post.author.id != actor.id {
            return Err(AppError::Forbidden(
                "you can only delete your own blog posts".to_string(),
            ));
        }

        self.posts.delete(id).await?;
        Ok(true)
    }

    /// Published posts only, newest first.
    pub async fn published_posts(&self) -> Result<Vec<BlogPost>, AppError> {
        self.posts.find_published().await
    }

    /// All of `actor`'s posts regardless of the published flag, newest first.
    pub async fn posts_by_author(&self, actor: &User) -> Result<Vec<BlogPost>, AppError> {
        self.posts.find_by_author(&actor.id).await
    }

    /// A single post by id.
    pub async fn post(&self, id: &str) -> Result<BlogPost, AppError> {
        self.fetch(id).await
    }

    async fn fetch(&self, id: &str) -> Result<BlogPost, AppError> {
        self.posts
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("blog post {id} not found")))
    }

    fn emit_published(&self, post: &BlogPost) {
        let delivered = self
            .bus
            .publish(POST_PUBLISHED_TOPIC, PostPublished(post.clone()));
        debug!(post_id = %post.id, delivered, "publish event emitted");
    }
}
