//! HS256 session tokens and single-use reset tokens.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use clinic_core::models::role::Role;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use rand::distr::Alphanumeric;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::AuthError;

/// Claims embedded in every session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject: principal id.
    pub sub: String,
    /// Email at issuance.
    pub email: String,
    /// Global role at issuance.
    pub role: String,
    /// Active tenant, absent for a super-administrator without one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
    /// Impersonating super-administrator, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub act: Option<String>,
}

fn parse_claim_uuid(claim: &str, value: &str) -> Result<Uuid, AuthError> {
    Uuid::parse_str(value).map_err(|_| AuthError::TokenInvalid(format!("malformed {claim} claim")))
}

impl SessionClaims {
    pub fn principal_id(&self) -> Result<Uuid, AuthError> {
        parse_claim_uuid("sub", &self.sub)
    }

    pub fn active_tenant(&self) -> Result<Option<Uuid>, AuthError> {
        self.tenant_id
            .as_deref()
            .map(|t| parse_claim_uuid("tenant_id", t))
            .transpose()
    }

    pub fn impersonator(&self) -> Result<Option<Uuid>, AuthError> {
        self.act
            .as_deref()
            .map(|a| parse_claim_uuid("act", a))
            .transpose()
    }
}

/// Who a token is issued for.
#[derive(Debug, Clone)]
pub struct TokenSubject {
    pub principal_id: Uuid,
    pub email: String,
    pub role: Role,
    pub tenant_id: Option<Uuid>,
    pub impersonator_id: Option<Uuid>,
}

/// Issue a token valid for the configured lifetime.
pub fn issue_token(subject: &TokenSubject, config: &AuthConfig) -> Result<String, AuthError> {
    let now = Utc::now();
    let lifetime = Duration::seconds(config.access_token_lifetime_secs as i64);
    issue_token_between(subject, now, now + lifetime, config)
}

/// Issue a token with explicit issuance and expiry instants.
pub fn issue_token_between(
    subject: &TokenSubject,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    config: &AuthConfig,
) -> Result<String, AuthError> {
    let claims = SessionClaims {
        sub: subject.principal_id.to_string(),
        email: subject.email.clone(),
        role: subject.role.as_str().to_string(),
        tenant_id: subject.tenant_id.map(|t| t.to_string()),
        iss: config.token_issuer.clone(),
        iat: issued_at.timestamp(),
        exp: expires_at.timestamp(),
        jti: Uuid::new_v4().to_string(),
        act: subject.impersonator_id.map(|a| a.to_string()),
    };

    let key = EncodingKey::from_secret(config.secret_key.as_bytes());
    jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &key)
        .map_err(|e| AuthError::Crypto(format!("JWT encode: {e}")))
}

/// Verify signature, issuer and expiry.
///
/// Expiry is strict. Skew tolerance only applies to `iat`, so tokens
/// minted by a node whose clock runs slightly ahead still validate.
pub fn decode_token(token: &str, config: &AuthConfig) -> Result<SessionClaims, AuthError> {
    let key = DecodingKey::from_secret(config.secret_key.as_bytes());

    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    validation.set_issuer(&[&config.token_issuer]);
    validation.set_required_spec_claims(&["sub", "exp", "iat", "iss"]);

    let claims = jsonwebtoken::decode::<SessionClaims>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::TokenInvalid(e.to_string()),
        })?;

    if claims.iat > Utc::now().timestamp() + config.clock_skew_secs as i64 {
        return Err(AuthError::TokenInvalid("issued in the future".into()));
    }
    Ok(claims)
}

/// 32 random bytes, base64url without padding.
pub fn generate_reset_token() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// SHA-256 of a raw reset token, hex-encoded. Only this is stored.
pub fn hash_reset_token(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}

/// Random alphanumeric password for onboarded principals.
pub fn generate_password(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}
