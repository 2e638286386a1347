//! SQLite storage layer and the repository interfaces it implements.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::DateTime;
use sqlx::{sqlite::SqlitePool, Row};

use crate::error::AppError;
use crate::models::{Author, BlogPost, User};

/// Persistence interface for users.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a new user. Duplicate username or email is a `Conflict`.
    async fn create(&self, user: &User) -> Result<(), AppError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<User>, AppError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError>;
}

/// Persistence interface for blog posts. Reads resolve the author.
#[async_trait]
pub trait PostRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<BlogPost>, AppError>;

    /// Published posts only, newest first.
    async fn find_published(&self) -> Result<Vec<BlogPost>, AppError>;

    /// All posts by one author regardless of the published flag, newest first.
    async fn find_by_author(&self, author_id: &str) -> Result<Vec<BlogPost>, AppError>;

    /// Insert the post, or overwrite title/content/published of an existing
    /// one. The author reference is immutable after creation.
    async fn save(&self, post: &BlogPost) -> Result<(), AppError>;

    async fn delete(&self, id: &str) -> Result<(), AppError>;
}

/// SQLite-backed storage for users and posts.
#[derive(Clone)]
pub struct Storage {
    pool: Arc<SqlitePool>,
}

impl Storage {
    /// Open (or create) the database at `db_path`.
    pub async fn new(db_path: &Path) -> Result<Self, AppError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(anyhow::Error::from)?;
        }

        let db_url = format!("sqlite:{}?mode=rwc", db_path.display());
        let pool = SqlitePool::connect(&db_url).await?;

        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Open a private in-memory database.
    pub async fn in_memory() -> Result<Self, AppError> {
        let pool = SqlitePool::connect("sqlite::memory:").await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Create the schema if it does not exist yet.
    pub async fn initialize(&self) -> Result<(), AppError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&*self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS blog_posts (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                published INTEGER NOT NULL DEFAULT 0,
                author_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (author_id) REFERENCES users(id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(&*self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_posts_published ON blog_posts(published)")
            .execute(&*self.pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_posts_author ON blog_posts(author_id)")
            .execute(&*self.pool)
            .await?;

        Ok(())
    }

    fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<User, AppError> {
        let created_at: String = row.get("created_at");
        let updated_at: String = row.get("updated_at");

        Ok(User {
            id: row.get("id"),
            username: row.get("username"),
            email: row.get("email"),
            password_hash: row.get("password_hash"),
            created_at: parse_timestamp(&created_at)?,
            updated_at: parse_timestamp(&updated_at)?,
        })
    }

    fn row_to_post(row: &sqlx::sqlite::SqliteRow) -> Result<BlogPost, AppError> {
        let created_at: String = row.get("created_at");
        let updated_at: String = row.get("updated_at");
        let published: i64 = row.get("published");

        Ok(BlogPost {
            id: row.get("id"),
            title: row.get("title"),
            content: row.get("content"),
            published: published != 0,
            author: Author {
                id: row.get("author_id"),
                username: row.get("author_username"),
            },
            created_at: parse_timestamp(&created_at)?,
            updated_at: parse_timestamp(&updated_at)?,
        })
    }
}

const POST_WITH_AUTHOR: &str = r#"
    SELECT p.id, p.title, p.content, p.published, p.author_id,
           p.created_at, p.updated_at, u.username AS author_username
    FROM blog_posts p
    JOIN users u ON u.id = p.author_id
"#;

#[async_trait]
impl UserRepository for Storage {
    async fn create(&self, user: &User) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO users (id, username, email, password_hash, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.created_at.to_rfc3339())
        .bind(user.updated_at.to_rfc3339())
        .execute(&*self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(AppError::Conflict(
                "username or email is already taken".to_string(),
            )),
            Err(err) => Err(err.into()),
        }
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>, AppError> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&*self.pool)
            .await?;

        row.as_ref().map(Self::row_to_user).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let row = sqlx::query("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&*self.pool)
            .await?;

        row.as_ref().map(Self::row_to_user).transpose()
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        let row = sqlx::query("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&*self.pool)
            .await?;

        row.as_ref().map(Self::row_to_user).transpose()
    }
}

#[async_trait]
impl PostRepository for Storage {
    async fn find_by_id(&self, id: &str) -> Result<Option<BlogPost>, AppError> {
        let query = format!("{POST_WITH_AUTHOR} WHERE p.id = ?");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&*self.pool)
            .await?;

        row.as_ref().map(Self::row_to_post).transpose()
    }

    async fn find_published(&self) -> Result<Vec<BlogPost>, AppError> {
        let query = format!("{POST_WITH_AUTHOR} WHERE p.published = 1 ORDER BY p.created_at DESC");
        let rows = sqlx::query(&query).fetch_all(&*self.pool).await?;

        rows.iter().map(Self::row_to_post).collect()
    }

    async fn find_by_author(&self, author_id: &str) -> Result<Vec<BlogPost>, AppError> {
        let query = format!("{POST_WITH_AUTHOR} WHERE p.author_id = ? ORDER BY p.created_at DESC");
        let rows = sqlx::query(&query)
            .bind(author_id)
            .fetch_all(&*self.pool)
            .await?;

        rows.iter().map(Self::row_to_post).collect()
    }

    async fn save(&self, post: &BlogPost) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO blog_posts (
                id, title, content, published, author_id, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                content = excluded.content,
                published = excluded.published,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&post.id)
        .bind(&post.title)
        .bind(&post.content)
        .bind(post.published as i64)
        .bind(&post.author.id)
        .bind(post.created_at.to_rfc3339())
        .bind(post.updated_at.to_rfc3339())
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM blog_posts WHERE id = ?")
            .bind(id)
            .execute(&*self.pool)
            .await?;

        Ok(())
    }
}

fn parse_timestamp(value: &str) -> Result<chrono::DateTime<chrono::Utc>, AppError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&chrono::Utc))
        .map_err(|err| AppError::Internal(err.into()))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db) if db.message().contains("UNIQUE constraint failed")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    async fn storage() -> Storage {
        let storage = Storage::in_memory().await.unwrap();
        storage.initialize().await.unwrap();
        storage
    }

    fn post_at(title: &str, published: bool, author: &User, age_secs: i64) -> BlogPost {
        let mut post = BlogPost::new(
            title.to_string(),
            "content".to_string(),
            published,
            author.author(),
        );
        post.created_at = Utc::now() - Duration::seconds(age_secs);
        post.updated_at = post.created_at;
        post
    }

    #[tokio::test]
    async fn test_user_round_trip() {
        let storage = storage().await;
        let user = User::new("alice", "alice@x.com", "hash");
        storage.create(&user).await.unwrap();

        let by_email = storage.find_by_email("alice@x.com").await.unwrap().unwrap();
        assert_eq!(by_email.id, user.id);
        assert_eq!(by_email.password_hash, "hash");

        let by_id = UserRepository::find_by_id(&storage, &user.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_id.username, "alice");

        assert!(storage.find_by_email("bob@x.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_user_is_a_conflict() {
        let storage = storage().await;
        storage
            .create(&User::new("alice", "alice@x.com", "hash"))
            .await
            .unwrap();

        let same_email = User::new("alice2", "alice@x.com", "hash");
        assert!(matches!(
            storage.create(&same_email).await,
            Err(AppError::Conflict(_))
        ));

        let same_username = User::new("alice", "other@x.com", "hash");
        assert!(matches!(
            storage.create(&same_username).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_post_save_resolves_author() {
        let storage = storage().await;
        let author = User::new("alice", "alice@x.com", "hash");
        storage.create(&author).await.unwrap();

        let post = post_at("Hi", true, &author, 0);
        storage.save(&post).await.unwrap();

        let loaded = PostRepository::find_by_id(&storage, &post.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.title, "Hi");
        assert_eq!(loaded.author.username, "alice");
        assert!(loaded.published);
    }

    #[tokio::test]
    async fn test_save_overwrites_but_keeps_author() {
        let storage = storage().await;
        let author = User::new("alice", "alice@x.com", "hash");
        storage.create(&author).await.unwrap();

        let mut post = post_at("Hi", false, &author, 10);
        storage.save(&post).await.unwrap();

        post.title = "Updated".to_string();
        post.published = true;
        post.updated_at = Utc::now();
        storage.save(&post).await.unwrap();

        let loaded = PostRepository::find_by_id(&storage, &post.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.title, "Updated");
        assert!(loaded.published);
        assert_eq!(loaded.author.id, author.id);
    }

    #[tokio::test]
    async fn test_find_published_filters_and_orders() {
        let storage = storage().await;
        let author = User::new("alice", "alice@x.com", "hash");
        storage.create(&author).await.unwrap();

        storage.save(&post_at("oldest", true, &author, 30)).await.unwrap();
        storage.save(&post_at("draft", false, &author, 20)).await.unwrap();
        storage.save(&post_at("newest", true, &author, 10)).await.unwrap();

        let published = storage.find_published().await.unwrap();
        let titles: Vec<_> = published.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["newest", "oldest"]);
    }

    #[tokio::test]
    async fn test_find_by_author_includes_drafts() {
        let storage = storage().await;
        let alice = User::new("alice", "alice@x.com", "hash");
        let bob = User::new("bob", "bob@x.com", "hash");
        storage.create(&alice).await.unwrap();
        storage.create(&bob).await.unwrap();

        storage.save(&post_at("mine", true, &alice, 20)).await.unwrap();
        storage.save(&post_at("my draft", false, &alice, 10)).await.unwrap();
        storage.save(&post_at("not mine", true, &bob, 5)).await.unwrap();

        let mine = storage.find_by_author(&alice.id).await.unwrap();
        let titles: Vec<_> = mine.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["my draft", "mine"]);
    }

    #[tokio::test]
    async fn test_delete_removes_post() {
        let storage = storage().await;
        let author = User::new("alice", "alice@x.com", "hash");
        storage.create(&author).await.unwrap();

        let post = post_at("Hi", true, &author, 0);
        storage.save(&post).await.unwrap();
        storage.delete(&post.id).await.unwrap();

        assert!(PostRepository::find_by_id(&storage, &post.id)
            .await
            .unwrap()
            .is_none());
    }
}
