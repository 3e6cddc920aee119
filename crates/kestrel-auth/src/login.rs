use std::sync::Arc;

use kestrel_core::EventBus;
use kestrel_storage::Facade;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::audit::{AuditLog, AuditOutcome};
use crate::jwt::{generate_token_pair, JwtError, TokenLifetimes, TokenPair};
use crate::password::verify_password;
use crate::rate_limit::RateLimiter;

pub const USERS_NAMESPACE: &str = "auth_users";

const LOGIN_ACTION: &str = "auth.login";
const LOGIN_RATE_LIMIT: u32 = 5;
const LOGIN_RATE_WINDOW_SECS: u64 = 60;

#[derive(Debug, Error)]
pub enum LoginError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("too many login attempts, try again later")]
    RateLimited,
    #[error("token generation failed: {0}")]
    Token(#[from] JwtError),
    #[error("storage error: {0}")]
    Storage(#[from] kestrel_storage::StorageError),
}

#[derive(Debug, Serialize, Deserialize)]
struct UserRecord {
    user_id: Uuid,
    username: String,
    password_hash: String,
    scopes: Vec<String>,
    is_admin: bool,
}

/// Verifies a username/password pair against `auth_users`, issues a
/// fresh token pair on success, and records an audit entry for every
/// outcome — including the rate-limited case, which is recorded and
/// returned *before* any credential lookup happens, per the boundary
/// layer's "don't even look up the account once the limiter trips" rule.
pub async fn login(
    facade: &Facade,
    rate_limiter: &RateLimiter,
    audit: &AuditLog,
    bus: &Arc<EventBus>,
    jwt_secret: &str,
    lifetimes: TokenLifetimes,
    username: &str,
    password: &str,
) -> Result<TokenPair, LoginError> {
    let rate_limit_key = format!("auth.login:{username}");
    let allowed = rate_limiter
        .try_acquire(&rate_limit_key, LOGIN_RATE_LIMIT, LOGIN_RATE_WINDOW_SECS)
        .await
        .map_err(|err| kestrel_storage::StorageError::Backend(err.to_string()))?;

    if !allowed {
        let _ = audit
            .record(username, LOGIN_ACTION, AuditOutcome::RateLimited, None)
            .await;
        return Err(LoginError::RateLimited);
    }

    let record = match facade.get(USERS_NAMESPACE, username).await? {
        Some(value) => serde_json::from_value::<UserRecord>(value).ok(),
        None => None,
    };

    let record = match record {
        Some(record) => record,
        None => {
            let _ = audit
                .record(username, LOGIN_ACTION, AuditOutcome::Failure, Some("unknown user".to_string()))
                .await;
            return Err(LoginError::InvalidCredentials);
        }
    };

    let valid = verify_password(password, &record.password_hash).unwrap_or(false);
    if !valid {
        let _ = audit
            .record(username, LOGIN_ACTION, AuditOutcome::Failure, Some("bad password".to_string()))
            .await;
        return Err(LoginError::InvalidCredentials);
    }

    let tokens = generate_token_pair(
        record.user_id,
        &record.username,
        record.scopes,
        record.is_admin,
        jwt_secret,
        lifetimes,
    )?;

    let _ = audit.record(username, LOGIN_ACTION, AuditOutcome::Success, None).await;

    let payload = serde_json::json!({
        "user_id": record.user_id,
        "username": record.username,
    });
    bus.publish("auth.login", payload).await;

    Ok(tokens)
}
