//! Accounts, login lockout, and JWT session handling.

pub mod jwt;
pub mod password;
pub mod rate_limit;

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::model::{Role, User, UserProfile};
use crate::store::{self, tokens, users, Store};
use crate::{Error, Result};

pub use jwt::{Claims, TokenIssuer, TokenKind};
pub use password::Passwords;
pub use rate_limit::KeyedLimiter;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    #[serde(default)]
    pub nickname: Option<String>,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Body returned by login and refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in_seconds: i64,
}

/// Token pair handed to the HTTP layer, which turns the refresh token into a cookie.
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in_seconds: i64,
    pub refresh_ttl_seconds: i64,
}

impl IssuedTokens {
    pub fn response(&self) -> TokenResponse {
        TokenResponse {
            access_token: self.access_token.clone(),
            expires_in_seconds: self.expires_in_seconds,
        }
    }
}

/// Caller identity resolved from an access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: Uuid,
    pub email: String,
    pub role: Role,
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

pub struct AuthService {
    store: Arc<Store>,
    tokens: TokenIssuer,
    passwords: Passwords,
    config: AuthConfig,
    login_limiter: KeyedLimiter,
    refresh_limiter: KeyedLimiter,
}

fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    }
}

impl AuthService {
    pub fn new(store: Arc<Store>, config: AuthConfig) -> Result<Self> {
        Ok(Self {
            tokens: TokenIssuer::new(&config)?,
            passwords: Passwords::new(&config)?,
            login_limiter: KeyedLimiter::per_minute("login", config.login_per_minute),
            refresh_limiter: KeyedLimiter::per_minute("refresh", config.refresh_per_minute),
            store,
            config,
        })
    }

    pub fn passwords(&self) -> &Passwords {
        &self.passwords
    }

    async fn hash_password(&self, password: String) -> Result<String> {
        let passwords = self.passwords.clone();
        tokio::task::spawn_blocking(move || passwords.hash(&password)).await?
    }

    async fn verify_password(&self, password: String, hash: String) -> Result<bool> {
        let passwords = self.passwords.clone();
        Ok(tokio::task::spawn_blocking(move || passwords.verify(&password, &hash)).await?)
    }

    pub async fn register(&self, request: RegisterRequest) -> Result<UserProfile> {
        let email = normalize_email(&request.email);
        if !looks_like_email(&email) {
            return Err(Error::Validation("email is not a valid address".to_string()));
        }
        if request.password.chars().count() < 8 {
            return Err(Error::Validation(
                "password must be at least 8 characters".to_string(),
            ));
        }
        let nickname = request
            .nickname
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());

        let password_hash = self.hash_password(request.password).await?;
        let now = store::now();
        let user = User {
            id: Uuid::new_v4(),
            email,
            nickname,
            password_hash,
            role: Role::User,
            failed_login_count: 0,
            locked_until: None,
            created_at: now,
            updated_at: now,
        };

        self.store
            .write(|tx| {
                if users::find_by_email(tx, &user.email)?.is_some() {
                    return Err(Error::Conflict("email is already registered".to_string()));
                }
                users::insert(tx, &user)
            })
            .await?;

        tracing::info!(user_id = %user.id, "Registered account {}", user.email);
        Ok(user.profile())
    }

    pub async fn login(&self, request: LoginRequest, client_ip: &str) -> Result<IssuedTokens> {
        self.login_limiter.check(client_ip)?;
        let email = normalize_email(&request.email);

        let user = self
            .store
            .read(|c| users::find_by_email(c, &email))
            .await?
            .ok_or_else(|| {
                metrics::counter!("daybook_login_failures_total", "reason" => "unknown").increment(1);
                Error::Unauthorized("invalid email or password".to_string())
            })?;

        if let Some(until) = user.locked_until.filter(|_| user.is_locked(Utc::now())) {
            return Err(Error::Locked(until));
        }

        let ok = self
            .verify_password(request.password, user.password_hash.clone())
            .await?;
        if !ok {
            let failed = user.failed_login_count + 1;
            let (count, locked_until) = if failed >= self.config.max_failed_login {
                tracing::warn!(user_id = %user.id, "Locking account after {} failed logins", failed);
                (0, Some(Utc::now() + Duration::minutes(self.config.lock_minutes)))
            } else {
                (failed, None)
            };
            self.store
                .write(|tx| users::set_login_state(tx, user.id, count, locked_until))
                .await?;
            metrics::counter!("daybook_login_failures_total", "reason" => "password").increment(1);
            return Err(Error::Unauthorized("invalid email or password".to_string()));
        }

        if user.failed_login_count > 0 || user.locked_until.is_some() {
            self.store
                .write(|tx| users::set_login_state(tx, user.id, 0, None))
                .await?;
        }

        let issued = self.issue_pair(&user).await?;
        tracing::info!(user_id = %user.id, "Login succeeded");
        Ok(issued)
    }

    /// Validate the refresh token against the stored one and rotate it.
    pub async fn refresh(&self, refresh_token: &str, client_ip: &str) -> Result<IssuedTokens> {
        self.refresh_limiter.check(client_ip)?;
        let claims = self.tokens.verify(refresh_token, TokenKind::Refresh)?;

        let (stored, user) = self
            .store
            .read(|c| Ok((tokens::find(c, claims.sub)?, users::find_by_id(c, claims.sub)?)))
            .await?;
        let user = user.ok_or_else(|| Error::Unauthorized("account no longer exists".to_string()))?;
        match stored {
            Some((hash, expires_at)) if hash == tokens::digest(refresh_token) && expires_at > Utc::now() => {}
            _ => return Err(Error::Unauthorized("refresh token revoked".to_string())),
        }

        self.issue_pair(&user).await
    }

    pub async fn logout(&self, user_id: Uuid) -> Result<()> {
        self.store.write(|tx| tokens::delete(tx, user_id)).await
    }

    pub async fn me(&self, user_id: Uuid) -> Result<UserProfile> {
        self.store
            .read(|c| users::find_by_id(c, user_id))
            .await?
            .map(|u| u.profile())
            .ok_or_else(|| Error::NotFound("account".to_string()))
    }

    /// Resolve a bearer token without touching the database.
    pub fn authenticate(&self, access_token: &str) -> Result<Principal> {
        let claims = self.tokens.verify(access_token, TokenKind::Access)?;
        Ok(Principal {
            user_id: claims.sub,
            email: claims.email,
            role: claims.role,
        })
    }

    async fn issue_pair(&self, user: &User) -> Result<IssuedTokens> {
        let access_token = self.tokens.issue(user, TokenKind::Access)?;
        let refresh_token = self.tokens.issue(user, TokenKind::Refresh)?;
        let refresh_ttl = self.tokens.ttl(TokenKind::Refresh);
        let expires_at = Utc::now() + refresh_ttl;
        self.store
            .write(|tx| tokens::store(tx, user.id, &refresh_token, expires_at))
            .await?;
        Ok(IssuedTokens {
            access_token,
            refresh_token,
            expires_in_seconds: self.tokens.ttl(TokenKind::Access).num_seconds(),
            refresh_ttl_seconds: refresh_ttl.num_seconds(),
        })
    }
}
