//! HS256 access/refresh tokens.

use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use jwt::{SignWithKey, VerifyWithKey};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::model::{Role, User};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub nickname: String,
    pub role: Role,
    pub typ: TokenKind,
    pub iat: i64,
    pub exp: i64,
    /// Unique per token so rotation never reissues an identical string.
    pub jti: Uuid,
}

pub struct TokenIssuer {
    access_key: Hmac<Sha256>,
    refresh_key: Hmac<Sha256>,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenIssuer {
    pub fn new(config: &AuthConfig) -> Result<Self> {
        if config.access_secret == config.refresh_secret {
            return Err(Error::Config(
                "access and refresh secrets must differ".to_string(),
            ));
        }
        Ok(Self {
            access_key: hmac_key(&config.access_secret)?,
            refresh_key: hmac_key(&config.refresh_secret)?,
            access_ttl: Duration::seconds(config.access_ttl_secs),
            refresh_ttl: Duration::seconds(config.refresh_ttl_secs),
        })
    }

    pub fn ttl(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        }
    }

    fn key(&self, kind: TokenKind) -> &Hmac<Sha256> {
        match kind {
            TokenKind::Access => &self.access_key,
            TokenKind::Refresh => &self.refresh_key,
        }
    }

    pub fn issue(&self, user: &User, kind: TokenKind) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id,
            email: user.email.clone(),
            nickname: user.nickname.clone(),
            role: user.role,
            typ: kind,
            iat: now.timestamp(),
            exp: (now + self.ttl(kind)).timestamp(),
            jti: Uuid::new_v4(),
        };
        claims
            .sign_with_key(self.key(kind))
            .map_err(|e| Error::Internal(format!("token signing failed: {}", e)))
    }

    /// Check signature, token kind and expiry.
    pub fn verify(&self, token: &str, kind: TokenKind) -> Result<Claims> {
        let claims: Claims = token
            .verify_with_key(self.key(kind))
            .map_err(|_| Error::Unauthorized("invalid token".to_string()))?;
        if claims.typ != kind {
            return Err(Error::Unauthorized("wrong token type".to_string()));
        }
        if claims.exp <= Utc::now().timestamp() {
            return Err(Error::Unauthorized("token expired".to_string()));
        }
        Ok(claims)
    }
}

fn hmac_key(secret: &str) -> Result<Hmac<Sha256>> {
    if secret.len() < 32 {
        return Err(Error::Config(
            "JWT secrets must be at least 32 bytes".to_string(),
        ));
    }
    Hmac::new_from_slice(secret.as_bytes()).map_err(|e| Error::Config(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            email: "jwt@example.com".into(),
            nickname: "jwt".into(),
            password_hash: String::new(),
            role: Role::Admin,
            failed_login_count: 0,
            locked_until: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_issue_and_verify() {
        let issuer = TokenIssuer::new(&AuthConfig::default()).unwrap();
        let u = user();
        let token = issuer.issue(&u, TokenKind::Access).unwrap();
        let claims = issuer.verify(&token, TokenKind::Access).unwrap();
        assert_eq!(claims.sub, u.id);
        assert_eq!(claims.role, Role::Admin);
        assert_eq!(claims.exp - claims.iat, 15 * 60);
    }

    #[test]
    fn test_kinds_do_not_cross() {
        let issuer = TokenIssuer::new(&AuthConfig::default()).unwrap();
        let refresh = issuer.issue(&user(), TokenKind::Refresh).unwrap();
        assert!(issuer.verify(&refresh, TokenKind::Access).is_err());
        assert!(issuer.verify(&refresh, TokenKind::Refresh).is_ok());
    }

    #[test]
    fn test_expired_rejected() {
        let config = AuthConfig {
            access_ttl_secs: -5,
            ..AuthConfig::default()
        };
        let issuer = TokenIssuer::new(&config).unwrap();
        let token = issuer.issue(&user(), TokenKind::Access).unwrap();
        assert!(matches!(
            issuer.verify(&token, TokenKind::Access),
            Err(Error::Unauthorized(_))
        ));
    }

    #[test]
    fn test_tampered_rejected() {
        let issuer = TokenIssuer::new(&AuthConfig::default()).unwrap();
        let mut token = issuer.issue(&user(), TokenKind::Access).unwrap();
        token.push('x');
        assert!(issuer.verify(&token, TokenKind::Access).is_err());
        assert!(issuer.verify("not-a-token", TokenKind::Access).is_err());
    }

    #[test]
    fn test_rotation_produces_distinct_tokens() {
        let issuer = TokenIssuer::new(&AuthConfig::default()).unwrap();
        let u = user();
        let a = issuer.issue(&u, TokenKind::Refresh).unwrap();
        let b = issuer.issue(&u, TokenKind::Refresh).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_short_or_shared_secret_rejected() {
        let short = AuthConfig {
            access_secret: "short".into(),
            ..AuthConfig::default()
        };
        assert!(TokenIssuer::new(&short).is_err());

        let shared = AuthConfig {
            refresh_secret: AuthConfig::default().access_secret,
            ..AuthConfig::default()
        };
        assert!(TokenIssuer::new(&shared).is_err());
    }
}
