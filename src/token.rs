//! Bearer tokens for the AI gateway.

use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::{Deserialize, Serialize};

use crate::config::AsapConfig;
use crate::error::TokenError;

const AUDIENCE: &str = "ai-gateway";

pub trait TokenSource: Send + Sync {
    fn token(&self) -> Result<String, TokenError>;
}

/// Fixed token, for local gateways and tests.
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl TokenSource for StaticToken {
    fn token(&self) -> Result<String, TokenError> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AsapClaims {
    pub iss: String,
    pub sub: String,
    pub aud: Vec<String>,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

/// Mints a short-lived RS256 ASAP token per request.
pub struct AsapSigner {
    config: AsapConfig,
}

impl AsapSigner {
    pub fn new(config: AsapConfig) -> Self {
        Self { config }
    }

    pub fn claims(&self, issuer: &str, now: i64) -> AsapClaims {
        let nonce = uuid::Uuid::new_v4().simple().to_string();
        AsapClaims {
            iss: issuer.to_string(),
            sub: issuer.to_string(),
            aud: vec![AUDIENCE.to_string()],
            iat: now,
            exp: now + self.config.expiry_secs,
            jti: format!("{}-{}-{}", issuer, now, &nonce[..8]),
        }
    }
}

impl TokenSource for AsapSigner {
    fn token(&self) -> Result<String, TokenError> {
        let raw_key = self.config.private_key.as_deref().ok_or(TokenError::MissingKey)?;
        let (Some(issuer), Some(kid)) = (self.config.issuer.as_deref(), self.config.kid.as_deref())
        else {
            return Err(TokenError::MissingConfig);
        };

        let pem = normalize_private_key(raw_key)?;
        let key = EncodingKey::from_rsa_pem(pem.as_bytes())?;

        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(kid.to_string());

        let claims = self.claims(issuer, chrono::Utc::now().timestamp());
        Ok(encode(&header, &claims, &key)?)
    }
}

/// Accepts PEM with real or escaped (`\n`) newlines, or base64 of a PEM.
pub fn normalize_private_key(raw: &str) -> Result<String, TokenError> {
    let key = raw.replace("\\n", "\n");
    if key.contains("-----BEGIN") {
        return Ok(key);
    }
    let decoded = BASE64_STANDARD
        .decode(key.trim())
        .map_err(|_| TokenError::KeyEncoding)?;
    String::from_utf8(decoded).map_err(|_| TokenError::KeyEncoding)
}
