//! Agent client assertions (`private_key_jwt`).
//!
//! The agent proves its own identity to the authorization server with a
//! short-lived JWT signed by its private key. The key is provisioned as a
//! private JWK, the same document whose public half is registered with the
//! agent directory. RSA keys sign `RS256`; OKP/Ed25519 keys sign `EdDSA`.

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use ed25519_dalek::Signer as _;
use rsa::pkcs1v15;
use rsa::sha2::Sha256;
use rsa::signature::{SignatureEncoding, Signer as _};
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPrivateKey};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::AuthExchangeError;

pub const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

const ASSERTION_LIFETIME_SECS: i64 = 300;
const MIN_RSA_BITS: usize = 2048;

#[derive(Deserialize)]
struct PrivateJwk {
    kty: String,
    alg: Option<String>,
    kid: Option<String>,
    crv: Option<String>,
    x: Option<String>,
    n: Option<String>,
    e: Option<String>,
    d: Option<String>,
    p: Option<String>,
    q: Option<String>,
}

#[derive(Serialize)]
struct AssertionHeader<'a> {
    alg: &'static str,
    typ: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    kid: Option<&'a str>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct AssertionClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

enum KeyMaterial {
    Rsa { signer: Box<pkcs1v15::SigningKey<Sha256>>, public: rsa::RsaPublicKey },
    Ed25519(ed25519_dalek::SigningKey),
}

pub struct AgentSigningKey {
    key: KeyMaterial,
    key_id: Option<String>,
}

impl AgentSigningKey {
    /// Ed25519 key from its 32-byte private scalar.
    pub fn from_bytes(secret: &[u8; 32], key_id: Option<String>) -> Self {
        Self { key: KeyMaterial::Ed25519(ed25519_dalek::SigningKey::from_bytes(secret)), key_id }
    }

    pub fn from_rsa(key: RsaPrivateKey, key_id: Option<String>) -> Result<Self, AuthExchangeError> {
        let bits = key.size() * 8;
        if bits < MIN_RSA_BITS {
            return Err(AuthExchangeError::Configuration(format!(
                "agent RSA key must be at least {MIN_RSA_BITS} bits, got {bits}"
            )));
        }
        let public = key.to_public_key();
        let signer = Box::new(pkcs1v15::SigningKey::<Sha256>::new(key));
        Ok(Self { key: KeyMaterial::Rsa { signer, public }, key_id })
    }

    pub fn from_jwk(jwk: &str) -> Result<Self, AuthExchangeError> {
        let jwk: PrivateJwk = serde_json::from_str(jwk).map_err(|error| {
            AuthExchangeError::Configuration(format!("agent private key is not a JWK: {error}"))
        })?;

        match jwk.kty.as_str() {
            "RSA" => Self::from_rsa_jwk(jwk),
            "OKP" => Self::from_okp_jwk(jwk),
            other => Err(AuthExchangeError::Configuration(format!(
                "agent private key must be an RSA or OKP/Ed25519 JWK, got kty `{other}`"
            ))),
        }
    }

    fn from_rsa_jwk(jwk: PrivateJwk) -> Result<Self, AuthExchangeError> {
        expect_alg(jwk.alg.as_deref(), "RS256")?;

        let n = decode_biguint("n", jwk.n.as_deref())?;
        let e = decode_biguint("e", jwk.e.as_deref())?;
        let d = decode_biguint("d", jwk.d.as_deref())?;
        let p = decode_biguint("p", jwk.p.as_deref())?;
        let q = decode_biguint("q", jwk.q.as_deref())?;

        let mut key = RsaPrivateKey::from_components(n, e, d, vec![p, q]).map_err(|error| {
            AuthExchangeError::Configuration(format!("agent RSA key is invalid: {error}"))
        })?;
        key.validate().map_err(|error| {
            AuthExchangeError::Configuration(format!("agent RSA key is invalid: {error}"))
        })?;
        key.precompute().map_err(|error| {
            AuthExchangeError::Configuration(format!("agent RSA key is invalid: {error}"))
        })?;

        Self::from_rsa(key, jwk.kid)
    }

    fn from_okp_jwk(jwk: PrivateJwk) -> Result<Self, AuthExchangeError> {
        let crv = jwk.crv.as_deref().unwrap_or_default();
        if crv != "Ed25519" {
            return Err(AuthExchangeError::Configuration(format!(
                "agent OKP key must use crv Ed25519, got `{crv}`"
            )));
        }
        expect_alg(jwk.alg.as_deref(), "EdDSA")?;

        let secret = decode_scalar("d", jwk.d.as_deref())?;
        let signing_key = Self::from_bytes(&secret, jwk.kid);

        if let (Some(x), KeyMaterial::Ed25519(key)) = (jwk.x.as_deref(), &signing_key.key) {
            let public = decode_scalar("x", Some(x))?;
            if public != key.verifying_key().to_bytes() {
                return Err(AuthExchangeError::Configuration(
                    "agent private key `x` does not match the key derived from `d`".to_string(),
                ));
            }
        }

        Ok(signing_key)
    }

    pub fn key_id(&self) -> Option<&str> {
        self.key_id.as_deref()
    }

    /// JWS `alg` used for client assertions.
    pub fn algorithm(&self) -> &'static str {
        match self.key {
            KeyMaterial::Rsa { .. } => "RS256",
            KeyMaterial::Ed25519(_) => "EdDSA",
        }
    }

    /// Public half as a JWK, for registering the agent key.
    pub fn public_jwk(&self) -> Value {
        let mut jwk = match &self.key {
            KeyMaterial::Rsa { public, .. } => json!({
                "kty": "RSA",
                "use": "sig",
                "alg": "RS256",
                "n": URL_SAFE_NO_PAD.encode(public.n().to_bytes_be()),
                "e": URL_SAFE_NO_PAD.encode(public.e().to_bytes_be()),
            }),
            KeyMaterial::Ed25519(key) => json!({
                "kty": "OKP",
                "crv": "Ed25519",
                "use": "sig",
                "alg": "EdDSA",
                "x": URL_SAFE_NO_PAD.encode(key.verifying_key().to_bytes()),
            }),
        };
        if let (Some(kid), Some(object)) = (self.key_id.as_deref(), jwk.as_object_mut()) {
            object.insert("kid".to_string(), Value::String(kid.to_string()));
        }
        jwk
    }

    /// Signs a client assertion for `audience` (the endpoint it is sent to).
    pub fn client_assertion(
        &self,
        client_id: &str,
        audience: &str,
    ) -> Result<String, AuthExchangeError> {
        let issued_at = Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: client_id.to_string(),
            sub: client_id.to_string(),
            aud: audience.to_string(),
            iat: issued_at,
            exp: issued_at + ASSERTION_LIFETIME_SECS,
            jti: Uuid::new_v4().to_string(),
        };
        let header = AssertionHeader { alg: self.algorithm(), typ: "JWT", kid: self.key_id() };

        let header = encode_segment(&header)?;
        let claims = encode_segment(&claims)?;
        let signing_input = format!("{header}.{claims}");
        let signature = match &self.key {
            KeyMaterial::Rsa { signer, .. } => signer.sign(signing_input.as_bytes()).to_vec(),
            KeyMaterial::Ed25519(key) => key.sign(signing_input.as_bytes()).to_bytes().to_vec(),
        };

        Ok(format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature)))
    }
}

impl fmt::Debug for AgentSigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentSigningKey")
            .field("algorithm", &self.algorithm())
            .field("key_id", &self.key_id)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

fn expect_alg(declared: Option<&str>, supported: &str) -> Result<(), AuthExchangeError> {
    match declared {
        Some(alg) if alg != supported => Err(AuthExchangeError::Configuration(format!(
            "agent key declares alg `{alg}`, only `{supported}` is supported for this key type"
        ))),
        _ => Ok(()),
    }
}

fn encode_segment<T: Serialize>(value: &T) -> Result<String, AuthExchangeError> {
    let bytes = serde_json::to_vec(value).map_err(|error| {
        AuthExchangeError::Configuration(format!("could not encode client assertion: {error}"))
    })?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

fn decode_field(field: &str, value: Option<&str>) -> Result<Vec<u8>, AuthExchangeError> {
    let value = value.ok_or_else(|| {
        AuthExchangeError::Configuration(format!("agent private key is missing `{field}`"))
    })?;
    URL_SAFE_NO_PAD.decode(value.trim_end_matches('=')).map_err(|error| {
        AuthExchangeError::Configuration(format!("agent private key `{field}` is not base64url: {error}"))
    })
}

fn decode_biguint(field: &str, value: Option<&str>) -> Result<BigUint, AuthExchangeError> {
    decode_field(field, value).map(|bytes| BigUint::from_bytes_be(&bytes))
}

fn decode_scalar(field: &str, value: Option<&str>) -> Result<[u8; 32], AuthExchangeError> {
    decode_field(field, value)?.try_into().map_err(|bytes: Vec<u8>| {
        AuthExchangeError::Configuration(format!(
            "agent private key `{field}` must be 32 bytes, got {}",
            bytes.len()
        ))
    })
}
