//! Registration, login and access tokens.
//!
//! Passwords are hashed with bcrypt on the blocking pool. Access tokens are
//! HS256 JWTs carrying the user id; the role claim is informational and the
//! caller's current role is always reloaded from the repository.

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::{NewUser, Role, User};
use crate::domain::value_objects::Email;
use crate::repository::Repository;
use crate::{Result, ShopError};

const INVALID_CREDENTIALS: &str = "No active account found with the given credentials";

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct Registration {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
    #[validate(length(max = 150))]
    #[serde(default)]
    pub first_name: String,
    #[validate(length(max = 150))]
    #[serde(default)]
    pub last_name: String,
    pub address: Option<String>,
    #[validate(length(max = 15))]
    pub phone_number: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AccessToken {
    pub access: String,
    pub token_type: &'static str,
    pub expires_in: i64,
}

#[derive(Clone)]
pub struct AuthService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
    bcrypt_cost: u32,
}

impl AuthService {
    pub fn new(secret: &SecretString, ttl_hours: i64, bcrypt_cost: u32) -> Self {
        let bytes = secret.expose_secret().as_bytes();
        Self {
            encoding: EncodingKey::from_secret(bytes),
            decoding: DecodingKey::from_secret(bytes),
            ttl: Duration::hours(ttl_hours),
            bcrypt_cost,
        }
    }

    /// Creates a buyer account. Roles are granted afterwards by an admin.
    #[instrument(skip(self, repo, form), fields(email = %form.email))]
    pub async fn register(&self, repo: &dyn Repository, form: Registration) -> Result<User> {
        form.validate()?;
        let email = Email::parse(&form.email)?;
        if repo.user_by_email(&email).await?.is_some() {
            return Err(ShopError::Conflict("A user with this email already exists".into()));
        }
        let password_hash = self.hash_password(form.password).await?;
        let user = repo
            .create_user(
                NewUser {
                    email,
                    password_hash,
                    first_name: form.first_name.trim().to_string(),
                    last_name: form.last_name.trim().to_string(),
                    address: form.address,
                    phone_number: form.phone_number,
                },
                Role::Buyer,
            )
            .await?;
        tracing::info!(user_id = %user.id, "user registered");
        Ok(user)
    }

    #[instrument(skip(self, repo, credentials))]
    pub async fn login(&self, repo: &dyn Repository, credentials: Credentials) -> Result<AccessToken> {
        let unauthorized = || ShopError::Unauthorized(INVALID_CREDENTIALS.into());
        let email = Email::parse(&credentials.email).map_err(|_| unauthorized())?;
        let user = repo.user_by_email(&email).await?.ok_or_else(unauthorized)?;
        if !self.verify_password(credentials.password, user.password_hash.clone()).await? {
            tracing::info!(user_id = %user.id, "login rejected");
            return Err(unauthorized());
        }
        self.issue(&user)
    }

    pub fn issue(&self, user: &User) -> Result<AccessToken> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id,
            role: user.role,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        let access = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| ShopError::Internal(format!("token encoding failed: {e}")))?;
        Ok(AccessToken { access, token_type: "Bearer", expires_in: self.ttl.num_seconds() })
    }

    pub fn verify(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map(|data| data.claims)
            .map_err(|e| {
                let message = match e.kind() {
                    ErrorKind::ExpiredSignature => "Token has expired",
                    ErrorKind::InvalidSignature => "Token signature is invalid",
                    _ => "Token is invalid",
                };
                ShopError::Unauthorized(message.into())
            })
    }

    pub async fn hash_password(&self, password: String) -> Result<String> {
        let cost = self.bcrypt_cost;
        tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .map_err(|e| ShopError::Internal(format!("hashing task failed: {e}")))?
            .map_err(|e| ShopError::Internal(format!("password hashing failed: {e}")))
    }

    async fn verify_password(&self, password: String, hash: String) -> Result<bool> {
        tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
            .await
            .map_err(|e| ShopError::Internal(format!("hashing task failed: {e}")))?
            .map_err(|e| ShopError::Internal(format!("password verification failed: {e}")))
    }
}
