//! HS256 verification of Supabase access tokens.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{TimeZone, Utc};
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use thiserror::Error;
use tracing::debug;

use shared_models::auth::{JwtClaims, User};

type HmacSha256 = Hmac<Sha256>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("JWT secret is not set")]
    MissingSecret,

    #[error("Invalid token format")]
    Malformed,

    #[error("Unsupported token algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Invalid token signature")]
    BadSignature,

    #[error("Invalid claims: {0}")]
    BadClaims(String),

    #[error("Token expired")]
    Expired,
}

/// The three dot-separated segments of a compact JWS.
struct Segments<'a> {
    header: &'a str,
    claims: &'a str,
    signature: &'a str,
}

impl<'a> Segments<'a> {
    fn split(token: &'a str) -> Result<Self, TokenError> {
        let mut parts = token.split('.');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(header), Some(claims), Some(signature), None) => Ok(Self { header, claims, signature }),
            _ => Err(TokenError::Malformed),
        }
    }

    fn signing_input(&self) -> String {
        format!("{}.{}", self.header, self.claims)
    }
}

fn decode_json(segment: &str) -> Result<Value, TokenError> {
    let bytes = URL_SAFE_NO_PAD.decode(segment).map_err(|_| TokenError::Malformed)?;
    serde_json::from_slice(&bytes).map_err(|e| TokenError::BadClaims(e.to_string()))
}

fn ensure_hs256(header: &Value) -> Result<(), TokenError> {
    match header.get("alg").and_then(Value::as_str) {
        Some("HS256") => Ok(()),
        Some(other) => Err(TokenError::UnsupportedAlgorithm(other.to_string())),
        None => Err(TokenError::Malformed),
    }
}

fn verify_signature(segments: &Segments<'_>, secret: &str) -> Result<(), TokenError> {
    let signature = URL_SAFE_NO_PAD.decode(segments.signature).map_err(|_| TokenError::BadSignature)?;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| TokenError::MissingSecret)?;
    mac.update(segments.signing_input().as_bytes());
    mac.verify_slice(&signature).map_err(|_| TokenError::BadSignature)
}

/// Verify `token` against the project secret and turn its claims into a `User`.
pub fn validate_token(token: &str, jwt_secret: &str) -> Result<User, TokenError> {
    if jwt_secret.is_empty() {
        return Err(TokenError::MissingSecret);
    }

    let segments = Segments::split(token)?;
    ensure_hs256(&decode_json(segments.header)?)?;
    verify_signature(&segments, jwt_secret).inspect_err(|_| debug!("Token signature verification failed"))?;

    let claims: JwtClaims = serde_json::from_value(decode_json(segments.claims)?)
        .map_err(|e| TokenError::BadClaims(e.to_string()))?;

    let now = Utc::now().timestamp();
    if claims.exp.is_some_and(|exp| (exp as i64) < now) {
        debug!("Token for {} expired at {:?}", claims.sub, claims.exp);
        return Err(TokenError::Expired);
    }

    let created_at = claims.iat.and_then(|iat| Utc.timestamp_opt(iat as i64, 0).single());
    let role = claims.application_role();

    debug!("Token accepted for user {} with role {:?}", claims.sub, role);
    Ok(User {
        id: claims.sub,
        email: claims.email,
        role,
        metadata: claims.user_metadata,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{JwtTestUtils, TestUser};
    use serde_json::json;

    const SECRET: &str = "unit-test-secret";

    fn signed(header: Value, claims: Value, secret: &str) -> String {
        let header = URL_SAFE_NO_PAD.encode(header.to_string());
        let claims = URL_SAFE_NO_PAD.encode(claims.to_string());
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{}.{}", header, claims).as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        format!("{}.{}.{}", header, claims, signature)
    }

    #[test]
    fn valid_token_yields_user_with_app_role() {
        let nurse = TestUser::nurse("nurse@hospital.com");
        let token = JwtTestUtils::create_test_token(&nurse, SECRET, Some(1));

        let user = validate_token(&token, SECRET).unwrap();
        assert_eq!(user.id, nurse.id);
        assert_eq!(user.role.as_deref(), Some("nurse"));
        assert!(user.created_at.is_some());
    }

    #[test]
    fn rejects_bad_tokens() {
        let user = TestUser::default();

        let expired = JwtTestUtils::create_expired_token(&user, SECRET);
        assert_eq!(validate_token(&expired, SECRET).unwrap_err(), TokenError::Expired);

        let forged = JwtTestUtils::create_invalid_signature_token(&user);
        assert_eq!(validate_token(&forged, SECRET).unwrap_err(), TokenError::BadSignature);

        let malformed = JwtTestUtils::create_malformed_token();
        assert!(validate_token(&malformed, SECRET).is_err());
        assert_eq!(validate_token("only.two", SECRET).unwrap_err(), TokenError::Malformed);
        assert_eq!(validate_token("a.b.c.d", SECRET).unwrap_err(), TokenError::Malformed);
        assert_eq!(validate_token(&forged, "").unwrap_err(), TokenError::MissingSecret);
    }

    #[test]
    fn only_hs256_is_accepted() {
        let claims = json!({"sub": "abc", "role": "authenticated"});

        let none_alg = signed(json!({"alg": "none", "typ": "JWT"}), claims.clone(), SECRET);
        assert_eq!(
            validate_token(&none_alg, SECRET).unwrap_err(),
            TokenError::UnsupportedAlgorithm("none".to_string())
        );

        let hs256 = signed(json!({"alg": "HS256", "typ": "JWT"}), claims, SECRET);
        let user = validate_token(&hs256, SECRET).unwrap();
        assert_eq!(user.role.as_deref(), Some("authenticated"));
        assert_eq!(user.created_at, None);
    }
}
