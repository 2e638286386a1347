//! Data models for users, blog posts, and publish events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Topic that carries [`PostPublished`] events on the event bus.
pub const POST_PUBLISHED_TOPIC: &str = "post.published";

/// A registered user. The password hash never leaves the server; wire-facing
/// views are [`UserProfile`] and [`Author`].
#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a new user with a fresh id and timestamps.
    pub fn new(username: &str, email: &str, password_hash: &str) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            username: username.to_string(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Public profile projection.
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id.clone(),
            username: self.username.clone(),
            email: self.email.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    /// Author view embedded in posts.
    pub fn author(&self) -> Author {
        Author {
            id: self.id.clone(),
            username: self.username.clone(),
        }
    }
}

/// Wire-facing user projection, without the password hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub username: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Post author as embedded in [`BlogPost`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: String,
    pub username: String,
}

/// A blog post with its author resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlogPost {
    pub id: String,
    pub title: String,
    pub content: String,
    pub published: bool,
    pub author: Author,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BlogPost {
    /// Create a new post attributed to `author`.
    pub fn new(title: String, content: String, published: bool, author: Author) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title,
            content,
            published,
            author,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Event emitted on [`POST_PUBLISHED_TOPIC`] when a post becomes published.
///
/// Ephemeral message payload, never persisted. Serializes as the post itself
/// so subscribers receive a plain post-shaped frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostPublished(pub BlogPost);

/// Input for creating a post. `published` defaults to true when omitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePostInput {
    pub title: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<bool>,
}

/// Input for updating a post. All fields overwrite the stored post.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatePostInput {
    pub title: String,
    pub content: String,
    pub published: bool,
}

/// Registration input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterInput {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Login input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

/// Token plus profile returned by register and login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserProfile,
}

/// Check the title/content pair shared by create and update inputs.
pub fn validate_post_fields(title: &str, content: &str) -> Result<(), AppError> {
    if title.trim().is_empty() {
        return Err(AppError::Validation("title must not be empty".to_string()));
    }
    if content.trim().is_empty() {
        return Err(AppError::Validation("content must not be empty".to_string()));
    }
    Ok(())
}

/// Check registration fields.
pub fn validate_registration(input: &RegisterInput) -> Result<(), AppError> {
    if input.username.trim().len() < 3 {
        return Err(AppError::Validation(
            "username must be at least 3 characters".to_string(),
        ));
    }
    if !input.email.contains('@') {
        return Err(AppError::Validation("email must be a valid address".to_string()));
    }
    if input.password.len() < 6 {
        return Err(AppError::Validation(
            "password must be at least 6 characters".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_fields_validation() {
        assert!(validate_post_fields("Hi", "World").is_ok());
        assert!(validate_post_fields("", "World").is_err());
        assert!(validate_post_fields("Hi", "   ").is_err());
    }

    #[test]
    fn test_registration_validation() {
        let valid = RegisterInput {
            username: "alice".to_string(),
            email: "alice@x.com".to_string(),
            password: "password1".to_string(),
        };
        assert!(validate_registration(&valid).is_ok());

        let short_name = RegisterInput {
            username: "al".to_string(),
            ..valid.clone()
        };
        assert!(validate_registration(&short_name).is_err());

        let bad_email = RegisterInput {
            email: "alice".to_string(),
            ..valid.clone()
        };
        assert!(validate_registration(&bad_email).is_err());

        let short_password = RegisterInput {
            password: "12345".to_string(),
            ..valid
        };
        assert!(validate_registration(&short_password).is_err());
    }

    #[test]
    fn test_post_wire_shape_is_camel_case() {
        let user = User::new("alice", "alice@x.com", "hash");
        let post = BlogPost::new("Hi".to_string(), "World".to_string(), true, user.author());
        let json = serde_json::to_value(&post).unwrap();
        assert!(json.get("createdAt").is_some());
        assert!(json.get("created_at").is_none());
        assert_eq!(json["author"]["username"], "alice");
    }

    #[test]
    fn test_published_event_serializes_as_post() {
        let user = User::new("alice", "alice@x.com", "hash");
        let post = BlogPost::new("Hi".to_string(), "World".to_string(), true, user.author());
        let event = PostPublished(post.clone());
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            serde_json::to_value(&post).unwrap()
        );
    }

    #[test]
    fn test_create_input_published_defaults_to_none() {
        let input: CreatePostInput =
            serde_json::from_str(r#"{"title":"Hi","content":"World"}"#).unwrap();
        assert!(input.published.is_none());
    }
}
