use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("token encoding failed: {0}")]
    Encode(#[from] jsonwebtoken::errors::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub subject_name: String,
    pub scopes: Vec<String>,
    pub is_admin: bool,
    pub token_type: TokenType,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
}

/// Session lifetime configuration. Defaults match the 15-minute access
/// / 7-day refresh split; both are overridable at `Runtime` construction
/// time (spec's Open Question on session lifetimes).
#[derive(Debug, Clone, Copy)]
pub struct TokenLifetimes {
    pub access_minutes: i64,
    pub refresh_days: i64,
}

impl Default for TokenLifetimes {
    fn default() -> Self {
        Self {
            access_minutes: 15,
            refresh_days: 7,
        }
    }
}

pub fn generate_token_pair(
    subject: Uuid,
    subject_name: &str,
    scopes: Vec<String>,
    is_admin: bool,
    secret: &str,
    lifetimes: TokenLifetimes,
) -> Result<TokenPair, JwtError> {
    let now = Utc::now();

    let access_exp = now + Duration::minutes(lifetimes.access_minutes);
    let access_claims = Claims {
        sub: subject,
        subject_name: subject_name.to_string(),
        scopes: scopes.clone(),
        is_admin,
        token_type: TokenType::Access,
        iat: now.timestamp(),
        exp: access_exp.timestamp(),
    };
    let access_token = encode(
        &Header::default(),
        &access_claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    let refresh_exp = now + Duration::days(lifetimes.refresh_days);
    let refresh_claims = Claims {
        sub: subject,
        subject_name: subject_name.to_string(),
        scopes,
        is_admin,
        token_type: TokenType::Refresh,
        iat: now.timestamp(),
        exp: refresh_exp.timestamp(),
    };
    let refresh_token = encode(
        &Header::default(),
        &refresh_claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(TokenPair {
        access_token,
        refresh_token,
        token_type: "Bearer",
        expires_in: lifetimes.access_minutes * 60,
    })
}

pub fn validate_token(token: &str, secret: &str) -> Result<Claims, JwtError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}
