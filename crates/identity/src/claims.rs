use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use progear_core::UserClaims;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

/// The signed-in user's ID token, presented as the exchange subject.
#[derive(Clone)]
pub struct UserAssertion(SecretString);

impl UserAssertion {
    pub fn new(id_token: impl Into<String>) -> Self {
        Self(SecretString::from(id_token.into().trim().to_string()))
    }

    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    pub fn is_empty(&self) -> bool {
        self.0.expose_secret().is_empty()
    }

    /// Reads the payload without verifying the signature. Display only.
    pub fn decode_claims(&self) -> Result<UserClaims, String> {
        let mut segments = self.expose().split('.');
        let payload = match (segments.next(), segments.next(), segments.next(), segments.next()) {
            (Some(_), Some(payload), Some(_), None) => payload,
            _ => return Err("expected a compact JWT with three segments".to_string()),
        };

        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|error| format!("payload is not base64url: {error}"))?;
        let raw: RawIdTokenClaims = serde_json::from_slice(&bytes)
            .map_err(|error| format!("payload is not a JSON claim set: {error}"))?;

        Ok(UserClaims {
            sub: raw.sub,
            email: raw.email,
            name: raw.name,
            preferred_username: raw.preferred_username,
            issuer: raw.iss,
            expires_at: raw.exp.and_then(|exp| DateTime::from_timestamp(exp, 0)),
            active: None,
        })
    }

    /// Decodes the claims and refuses assertions whose `exp` has passed.
    pub fn usable_claims(&self, now: DateTime<Utc>) -> Result<UserClaims, String> {
        if self.is_empty() {
            return Err("user assertion is empty".to_string());
        }
        let claims = self.decode_claims()?;
        if let Some(expires_at) = claims.expires_at {
            if expires_at <= now {
                return Err(format!("user assertion expired at {}", expires_at.to_rfc3339()));
            }
        }
        Ok(claims)
    }
}

impl fmt::Debug for UserAssertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("UserAssertion(<redacted>)")
    }
}

#[derive(Debug, Deserialize)]
struct RawIdTokenClaims {
    sub: Option<String>,
    email: Option<String>,
    name: Option<String>,
    preferred_username: Option<String>,
    iss: Option<String>,
    exp: Option<i64>,
}
