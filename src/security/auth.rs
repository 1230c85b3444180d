//! Request authentication.
//!
//! # Responsibilities
//! - Decide whether a request's credentials are acceptable
//! - Reject unauthenticated requests before they reach the dispatcher
//!
//! # Design Decisions
//! - Strategies sit behind the `Authenticator` trait and are chosen from config
//! - Basic auth stores argon2 PHC strings, never plain passwords
//! - Rejections are a flat 403 with no hint about which check failed

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::config::{AuthConfig, AuthMode};

/// A strategy for accepting or refusing a request by its headers.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, headers: &HeaderMap) -> bool;
}

/// Accepts everything.
#[derive(Debug, Default)]
pub struct AllowAll;

impl Authenticator for AllowAll {
    fn authenticate(&self, _headers: &HeaderMap) -> bool {
        true
    }
}

/// `Authorization: Bearer <token>` against a fixed token list.
#[derive(Debug)]
pub struct BearerToken {
    tokens: HashSet<String>,
}

impl BearerToken {
    pub fn new(tokens: impl IntoIterator<Item = String>) -> Self {
        Self {
            tokens: tokens.into_iter().collect(),
        }
    }
}

impl Authenticator for BearerToken {
    fn authenticate(&self, headers: &HeaderMap) -> bool {
        credentials(headers, "Bearer").is_some_and(|token| self.tokens.contains(token))
    }
}

/// `Authorization: Basic <base64(user:password)>` against argon2 password hashes.
#[derive(Debug)]
pub struct HttpBasicAuth {
    users: BTreeMap<String, String>,
}

impl HttpBasicAuth {
    /// `users` maps user names to argon2 PHC strings.
    pub fn new(users: BTreeMap<String, String>) -> Self {
        Self { users }
    }
}

impl Authenticator for HttpBasicAuth {
    fn authenticate(&self, headers: &HeaderMap) -> bool {
        let Some(encoded) = credentials(headers, "Basic") else {
            return false;
        };
        let Ok(decoded) = STANDARD.decode(encoded) else {
            return false;
        };
        let Ok(decoded) = String::from_utf8(decoded) else {
            return false;
        };
        let Some((user, password)) = decoded.split_once(':') else {
            return false;
        };

        match self.users.get(user) {
            Some(stored) => verify_password(password, stored),
            None => false,
        }
    }
}

/// Hash a password with a fresh salt into the PHC string stored in `auth.users`.
pub fn hash_password(password: &str) -> Result<String, password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default().hash_password(password.as_bytes(), &salt)?.to_string())
}

/// Check `password` against a stored PHC string.
///
/// The cost parameters come from `stored`. Comparison is constant time.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored) else {
        tracing::warn!("Stored password hash is not a PHC string");
        return false;
    };
    Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok()
}

fn credentials<'a>(headers: &'a HeaderMap, scheme: &str) -> Option<&'a str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (given, rest) = value.split_once(' ')?;
    given.eq_ignore_ascii_case(scheme).then(|| rest.trim())
}

/// Build the authenticator selected by `config.mode`.
pub fn build_authenticator(config: &AuthConfig) -> Arc<dyn Authenticator> {
    match config.mode {
        AuthMode::None => Arc::new(AllowAll),
        AuthMode::Bearer => Arc::new(BearerToken::new(config.tokens.iter().cloned())),
        AuthMode::Basic => Arc::new(HttpBasicAuth::new(config.users.clone())),
    }
}

/// Middleware that refuses requests the authenticator does not accept.
pub async fn auth_middleware(
    State(authenticator): State<Arc<dyn Authenticator>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if authenticator.authenticate(request.headers()) {
        return next.run(request).await;
    }

    tracing::info!(
        method = %request.method(),
        path = %request.uri().path(),
        "Rejected unauthenticated request"
    );
    (StatusCode::FORBIDDEN, "Forbidden").into_response()
}
