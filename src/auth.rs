//! User registration, login, and bearer-token verification.

use std::sync::Arc;

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::{validate_registration, AuthResponse, LoginInput, RegisterInput, User};
use crate::storage::UserRepository;

/// Bcrypt work factor for password hashes.
const HASH_COST: u32 = 10;

/// Claims carried by an access token.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    pub email: String,
    /// Expiry as a unix timestamp.
    pub exp: usize,
}

/// Issues and verifies bearer tokens, and manages user accounts.
pub struct AuthService {
    users: Arc<dyn UserRepository>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_ttl: Duration,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserRepository>, secret: &str, token_ttl: Duration) -> Self {
        Self {
            users,
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            token_ttl,
        }
    }

    /// Create an account and sign the first token for it.
    pub async fn register(&self, input: RegisterInput) -> Result<AuthResponse, AppError> {
        validate_registration(&input)?;

        if self.users.find_by_email(&input.email).await?.is_some()
            || self.users.find_by_username(&input.username).await?.is_some()
        {
            return Err(AppError::Conflict("user already exists".to_string()));
        }

        let password_hash = bcrypt::hash(&input.password, HASH_COST)
            .map_err(|err| AppError::Internal(err.into()))?;
        let user = User::new(&input.username, &input.email, &password_hash);
        // The unique columns catch registrations that race past the check above.
        self.users.create(&user).await?;

        Ok(AuthResponse {
            token: self.sign(&user)?,
            user: user.profile(),
        })
    }

    /// Exchange credentials for a token.
    ///
    /// Unknown email and wrong password produce the same error so callers
    /// cannot probe which addresses are registered.
    pub async fn login(&self, input: LoginInput) -> Result<AuthResponse, AppError> {
        let Some(user) = self.users.find_by_email(&input.email).await? else {
            return Err(AppError::Unauthorized("invalid credentials".to_string()));
        };

        let valid = bcrypt::verify(&input.password, &user.password_hash)
            .map_err(|err| AppError::Internal(err.into()))?;
        if !valid {
            return Err(AppError::Unauthorized("invalid credentials".to_string()));
        }

        Ok(AuthResponse {
            token: self.sign(&user)?,
            user: user.profile(),
        })
    }

    /// Resolve an `Authorization` header value to the acting user.
    pub async fn authenticate(&self, authorization: Option<&str>) -> Result<User, AppError> {
        let token = authorization
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| AppError::Unauthorized("missing bearer token".to_string()))?;

        let claims = self.verify(token)?;
        self.users
            .find_by_id(&claims.sub)
            .await?
            .ok_or_else(|| AppError::Unauthorized("unknown user".to_string()))
    }

    /// Verify a token's signature and expiry.
    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|_| AppError::Unauthorized("invalid or expired token".to_string()))
    }

    fn sign(&self, user: &User) -> Result<String, AppError> {
        let claims = Claims {
            sub: user.id.clone(),
            email: user.email.clone(),
            exp: (Utc::now() + self.token_ttl).timestamp() as usize,
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|err| AppError::Internal(err.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MemoryUsers;

    fn service() -> AuthService {
        AuthService::new(
            Arc::new(MemoryUsers::default()),
            "test-secret",
            Duration::hours(1),
        )
    }

    fn alice() -> RegisterInput {
        RegisterInput {
            username: "alice".to_string(),
            email: "alice@x.com".to_string(),
            password: "password1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_register_and_token_round_trip() {
        let auth = service();
        let response = auth.register(alice()).await.unwrap();

        assert_eq!(response.user.username, "alice");
        let user = auth
            .authenticate(Some(&format!("Bearer {}", response.token)))
            .await
            .unwrap();
        assert_eq!(user.email, "alice@x.com");
    }

    #[tokio::test]
    async fn test_register_duplicate_is_a_conflict() {
        let auth = service();
        auth.register(alice()).await.unwrap();

        let result = auth.register(alice()).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_register_rejects_invalid_input() {
        let auth = service();
        let result = auth
            .register(RegisterInput {
                password: "123".to_string(),
                ..alice()
            })
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_login_checks_the_password() {
        let auth = service();
        auth.register(alice()).await.unwrap();

        let ok = auth
            .login(LoginInput {
                email: "alice@x.com".to_string(),
                password: "password1".to_string(),
            })
            .await;
        assert!(ok.is_ok());

        let wrong = auth
            .login(LoginInput {
                email: "alice@x.com".to_string(),
                password: "nope00".to_string(),
            })
            .await;
        assert!(matches!(wrong, Err(AppError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_login_unknown_email_is_indistinct() {
        let auth = service();
        let result = auth
            .login(LoginInput {
                email: "ghost@x.com".to_string(),
                password: "password1".to_string(),
            })
            .await;
        assert!(matches!(result, Err(AppError::Unauthorized(m)) if m == "invalid credentials"));
    }

    #[tokio::test]
    async fn test_authenticate_rejects_garbage() {
        let auth = service();

        let missing = auth.authenticate(None).await;
        assert!(matches!(missing, Err(AppError::Unauthorized(_))));

        let malformed = auth.authenticate(Some("Token abc")).await;
        assert!(matches!(malformed, Err(AppError::Unauthorized(_))));

        let tampered = auth.authenticate(Some("Bearer not.a.jwt")).await;
        assert!(matches!(tampered, Err(AppError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_tokens_from_another_secret_are_rejected() {
        let auth = service();
        let response = auth.register(alice()).await.unwrap();

        let other = AuthService::new(
            Arc::new(MemoryUsers::default()),
            "other-secret",
            Duration::hours(1),
        );
        assert!(other.verify(&response.token).is_err());
    }
}
