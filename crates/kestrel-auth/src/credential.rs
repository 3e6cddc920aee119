use kestrel_storage::Facade;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::jwt::{validate_token, JwtError};

pub const API_KEYS_NAMESPACE: &str = "auth_api_keys";
pub const SESSIONS_NAMESPACE: &str = "auth_sessions";
pub const REVOKED_NAMESPACE: &str = "auth_revoked";

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("no credential presented")]
    Missing,
    #[error("api key is invalid")]
    InvalidApiKey,
    #[error("session is invalid or expired")]
    InvalidSession,
    #[error("token is invalid: {0}")]
    InvalidToken(#[from] JwtError),
    #[error("credential has been revoked")]
    Revoked,
    #[error("storage error: {0}")]
    Storage(#[from] kestrel_storage::StorageError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CredentialSource {
    ApiKey,
    Session,
    Jwt,
}

/// The one shape every downstream component sees, regardless of which
/// credential kind produced it. Service handlers and policy decisions
/// never see an api key, a session cookie, or a JWT claim set — only
/// this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestContext {
    pub subject: String,
    pub scopes: Vec<String>,
    pub is_admin: bool,
    pub source: CredentialSource,
    pub user_id: Option<Uuid>,
    pub session_id: Option<Uuid>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiKeyRecord {
    key: String,
    subject: String,
    scopes: Vec<String>,
    is_admin: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionRecord {
    subject: String,
    scopes: Vec<String>,
    is_admin: bool,
    user_id: Uuid,
    expires_at: i64,
}

/// Byte-for-byte comparison that always inspects every byte, so a
/// mismatch on the first byte takes exactly as long as a mismatch on
/// the last one.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

pub struct CredentialSet<'a> {
    /// Raw value of an `Authorization: Bearer <opaque>` header. The same
    /// string is tried both as an API key lookup and, failing that, as a
    /// JWT — the wire format doesn't distinguish the two, so resolution
    /// does.
    pub bearer_token: Option<&'a str>,
    pub session_token: Option<&'a str>,
}

/// Resolves whichever credential is present, in the spec's mandated
/// priority order: API key, then session, then JWT. A bearer value that
/// doesn't match any `auth_api_keys` record falls through to the session
/// and then to JWT verification of that same value — but a bearer value
/// that *does* match an API key record and fails for any other reason
/// (revoked, bad checksum) is rejected on the spot, not quietly retried
/// as a JWT.
pub async fn resolve_context(
    facade: &Facade,
    jwt_secret: &str,
    credentials: CredentialSet<'_>,
) -> Result<RequestContext, CredentialError> {
    if let Some(token) = credentials.bearer_token {
        match resolve_api_key(facade, token).await {
            Ok(ctx) => return Ok(ctx),
            Err(CredentialError::InvalidApiKey) => {}
            Err(other) => return Err(other),
        }
    }

    if let Some(token) = credentials.session_token {
        return resolve_session(facade, token).await;
    }

    if let Some(token) = credentials.bearer_token {
        return resolve_jwt(facade, jwt_secret, token).await;
    }

    Err(CredentialError::Missing)
}

async fn resolve_api_key(facade: &Facade, key: &str) -> Result<RequestContext, CredentialError> {
    let value = facade
        .get(API_KEYS_NAMESPACE, key)
        .await?
        .ok_or(CredentialError::InvalidApiKey)?;
    let record: ApiKeyRecord =
        serde_json::from_value(value).map_err(|_| CredentialError::InvalidApiKey)?;

    if !constant_time_eq(&record.key, key) {
        return Err(CredentialError::InvalidApiKey);
    }
    if is_revoked(facade, &format!("apikey:{key}")).await? {
        return Err(CredentialError::Revoked);
    }

    Ok(RequestContext {
        subject: record.subject,
        scopes: record.scopes,
        is_admin: record.is_admin,
        source: CredentialSource::ApiKey,
        user_id: None,
        session_id: None,
    })
}

async fn resolve_session(facade: &Facade, token: &str) -> Result<RequestContext, CredentialError> {
    let value = facade
        .get(SESSIONS_NAMESPACE, token)
        .await?
        .ok_or(CredentialError::InvalidSession)?;
    let record: SessionRecord =
        serde_json::from_value(value).map_err(|_| CredentialError::InvalidSession)?;

    if record.expires_at < chrono::Utc::now().timestamp() {
        return Err(CredentialError::InvalidSession);
    }
    if is_revoked(facade, &format!("session:{token}")).await? {
        return Err(CredentialError::Revoked);
    }

    Ok(RequestContext {
        subject: record.subject,
        scopes: record.scopes,
        is_admin: record.is_admin,
        source: CredentialSource::Session,
        user_id: Some(record.user_id),
        session_id: Uuid::parse_str(token).ok(),
    })
}

async fn resolve_jwt(
    facade: &Facade,
    jwt_secret: &str,
    token: &str,
) -> Result<RequestContext, CredentialError> {
    let claims = validate_token(token, jwt_secret)?;

    if is_revoked(facade, &format!("jwt:{}", claims.sub)).await? {
        return Err(CredentialError::Revoked);
    }

    Ok(RequestContext {
        subject: claims.subject_name,
        scopes: claims.scopes,
        is_admin: claims.is_admin,
        source: CredentialSource::Jwt,
        user_id: Some(claims.sub),
        session_id: None,
    })
}

async fn is_revoked(facade: &Facade, revocation_key: &str) -> Result<bool, CredentialError> {
    Ok(facade.exists(REVOKED_NAMESPACE, revocation_key).await?)
}
