//! In-memory repository doubles shared by service tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::AppError;
use crate::models::{BlogPost, User};
use crate::storage::{PostRepository, UserRepository};

/// In-memory `UserRepository`.
#[derive(Default)]
pub struct MemoryUsers {
    users: Mutex<HashMap<String, User>>,
}

#[async_trait]
impl UserRepository for MemoryUsers {
    async fn create(&self, user: &User) -> Result<(), AppError> {
        let mut users = self.users.lock().unwrap();
        if users
            .values()
            .any(|u| u.username == user.username || u.email == user.email)
        {
            return Err(AppError::Conflict(
                "username or email is already taken".to_string(),
            ));
        }
        users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>, AppError> {
        Ok(self.users.lock().unwrap().get(id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .values()
            .find(|u| u.username == username)
            .cloned())
    }
}

/// In-memory `PostRepository`.
#[derive(Default)]
pub struct MemoryPosts {
    posts: Mutex<HashMap<String, BlogPost>>,
}

impl MemoryPosts {
    fn sorted(&self, filter: impl Fn(&BlogPost) -> bool) -> Vec<BlogPost> {
        let mut posts: Vec<_> = self
            .posts
            .lock()
            .unwrap()
            .values()
            .filter(|p| filter(p))
            .cloned()
            .collect();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        posts
    }
}

#[async_trait]
impl PostRepository for MemoryPosts {
    async fn find_by_id(&self, id: &str) -> Result<Option<BlogPost>, AppError> {
        Ok(self.posts.lock().unwrap().get(id).cloned())
    }

    async fn find_published(&self) -> Result<Vec<BlogPost>, AppError> {
        Ok(self.sorted(|p| p.published))
    }

    async fn find_by_author(&self, author_id: &str) -> Result<Vec<BlogPost>, AppError> {
        Ok(self.sorted(|p| p.author.id == author_id))
    }

    async fn save(&self, post: &BlogPost) -> Result<(), AppError> {
        self.posts
            .lock()
            .unwrap()
            .insert(post.id.clone(), post.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), AppError> {
        self.posts.lock().unwrap().remove(id);
        Ok(())
    }
}
