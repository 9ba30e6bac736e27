//! Bearer token verification
//!
//! Both back-ends issue RS256 JWTs. The verifier keeps a per-issuer JWKS
//! cache with cooperative refresh: a `kid` miss triggers one refresh,
//! attempted up to three times, before the token is rejected.

use jsonwebtoken::jwk::{Jwk, JwkSet};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use polaris_common::db::models::IdpKind;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;

const JWKS_FETCH_TIMEOUT: Duration = Duration::from_secs(4);
const KID_MISS_REFRESH_ATTEMPTS: u32 = 3;

/// Token verification failures
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Expired signature")]
    ExpiredSignature,

    #[error("Provider unreachable: {0}")]
    ProviderUnreachable(String),
}

impl From<TokenError> for polaris_common::Error {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::InvalidToken(msg) => polaris_common::Error::Unauthorized(msg),
            TokenError::ExpiredSignature => {
                polaris_common::Error::Unauthorized("token expired".to_string())
            }
            TokenError::ProviderUnreachable(msg) => polaris_common::Error::external("idp", msg),
        }
    }
}

/// Normalized claims shared by both back-ends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    pub subject: String,
    pub email: String,
    pub auth_groups: Vec<String>,
    pub idp: IdpKind,
    pub auth_time: i64,
    pub role: Option<String>,
}

/// Where a back-end publishes its signing keys
#[derive(Debug, Clone)]
pub struct JwksSource {
    pub idp: IdpKind,
    pub issuer: String,
    pub jwks_url: String,
    pub group_claim: &'static str,
}

impl JwksSource {
    pub fn cognito(issuer: String) -> Self {
        let jwks_url = format!("{issuer}/.well-known/jwks.json");
        Self {
            idp: IdpKind::Cognito,
            issuer,
            jwks_url,
            group_claim: "cognito:groups",
        }
    }

    pub fn okta(issuer: String) -> Self {
        let jwks_url = format!("{issuer}/v1/keys");
        Self {
            idp: IdpKind::Okta,
            issuer,
            jwks_url,
            group_claim: "groups",
        }
    }
}

struct CachedKeys {
    by_kid: HashMap<String, Jwk>,
}

pub struct TokenVerifier {
    sources: Vec<JwksSource>,
    caches: Vec<RwLock<CachedKeys>>,
    http: reqwest::Client,
}

impl TokenVerifier {
    pub fn new(sources: Vec<JwksSource>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(JWKS_FETCH_TIMEOUT)
            .build()
            .unwrap_or_default();
        let caches = sources
            .iter()
            .map(|_| {
                RwLock::new(CachedKeys {
                    by_kid: HashMap::new(),
                })
            })
            .collect();
        Self {
            sources,
            caches,
            http,
        }
    }

    /// Pre-load keys without network access; tests and warm starts
    pub async fn prime(&self, idp: IdpKind, jwks: JwkSet) {
        for (i, source) in self.sources.iter().enumerate() {
            if source.idp == idp {
                let mut cache = self.caches[i].write().await;
                cache.by_kid = index_keys(&jwks);
            }
        }
    }

    async fn refresh(&self, index: usize) -> Result<(), TokenError> {
        let source = &self.sources[index];
        let mut last_error = String::new();

        for attempt in 1..=KID_MISS_REFRESH_ATTEMPTS {
            match self.fetch_jwks(&source.jwks_url).await {
                Ok(jwks) => {
                    let mut cache = self.caches[index].write().await;
                    cache.by_kid = index_keys(&jwks);
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(
                        issuer = %source.issuer,
                        attempt,
                        error = %e,
                        "JWKS refresh failed"
                    );
                    last_error = e;
                }
            }
        }

        Err(TokenError::ProviderUnreachable(last_error))
    }

    async fn fetch_jwks(&self, url: &str) -> Result<JwkSet, String> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("jwks endpoint returned {}", response.status()));
        }
        response.json::<JwkSet>().await.map_err(|e| e.to_string())
    }

    async fn key_for_kid(&self, kid: &str) -> Result<(usize, Jwk), TokenError> {
        // Cached first
        for (i, cache) in self.caches.iter().enumerate() {
            if let Some(jwk) = cache.read().await.by_kid.get(kid) {
                return Ok((i, jwk.clone()));
            }
        }

        // Kid miss: refresh each source once (bounded retries inside)
        for i in 0..self.sources.len() {
            self.refresh(i).await?;
            if let Some(jwk) = self.caches[i].read().await.by_kid.get(kid) {
                return Ok((i, jwk.clone()));
            }
        }

        Err(TokenError::InvalidToken(format!("unknown kid: {kid}")))
    }

    /// Verify a bearer token and return normalized claims.
    ///
    /// `verify_expiry` is optional because some callers (invitation
    /// inspection) need the claims of an already-expired token.
    pub async fn verify(&self, bearer: &str, verify_expiry: bool) -> Result<Claims, TokenError> {
        let token = bearer.strip_prefix("Bearer ").unwrap_or(bearer).trim();
        if token.is_empty() {
            return Err(TokenError::InvalidToken("empty token".to_string()));
        }

        let header = decode_header(token)
            .map_err(|e| TokenError::InvalidToken(format!("bad header: {e}")))?;
        let kid = header
            .kid
            .ok_or_else(|| TokenError::InvalidToken("missing kid".to_string()))?;

        let (source_index, jwk) = self.key_for_kid(&kid).await?;
        let source = &self.sources[source_index];

        let key = DecodingKey::from_jwk(&jwk)
            .map_err(|e| TokenError::InvalidToken(format!("bad jwk: {e}")))?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = verify_expiry;
        validation.validate_aud = false;
        if !verify_expiry {
            validation.required_spec_claims = Default::default();
        }

        let data = decode::<Value>(token, &key, &validation).map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::ExpiredSignature,
            _ => TokenError::InvalidToken(e.to_string()),
        })?;

        normalize_claims(&data.claims, source.idp, source.group_claim)
    }
}

fn index_keys(jwks: &JwkSet) -> HashMap<String, Jwk> {
    jwks.keys
        .iter()
        .filter_map(|k| k.common.key_id.clone().map(|kid| (kid, k.clone())))
        .collect()
}

/// Map a verified payload onto the normalized claim set
pub fn normalize_claims(
    payload: &Value,
    idp: IdpKind,
    group_claim: &str,
) -> Result<Claims, TokenError> {
    let subject = payload
        .get("sub")
        .and_then(Value::as_str)
        .ok_or_else(|| TokenError::InvalidToken("missing sub claim".to_string()))?
        .to_string();
    let email = payload
        .get("email")
        .and_then(Value::as_str)
        .ok_or_else(|| TokenError::InvalidToken("missing email claim".to_string()))?
        .to_string();
    let auth_time = payload
        .get("auth_time")
        .and_then(Value::as_i64)
        .ok_or_else(|| TokenError::InvalidToken("missing auth_time claim".to_string()))?;

    let auth_groups = payload
        .get(group_claim)
        .and_then(Value::as_array)
        .map(|groups| {
            groups
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();

    let role = payload
        .get("custom:role")
        .or_else(|| payload.get("role"))
        .and_then(Value::as_str)
        .map(String::from);

    Ok(Claims {
        subject,
        email,
        auth_groups,
        idp,
        auth_time,
        role,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cognito_claims_normalize_from_provider_shape() {
        let payload = json!({
            "sub": "abc-123",
            "email": "ada@acme.example",
            "auth_time": 1700000000,
            "cognito:groups": ["SuperAdmin", "Admin"],
            "custom:role": "Admin",
        });
        let claims = normalize_claims(&payload, IdpKind::Cognito, "cognito:groups").unwrap();
        assert_eq!(claims.subject, "abc-123");
        assert_eq!(claims.auth_groups, vec!["SuperAdmin", "Admin"]);
        assert_eq!(claims.role.as_deref(), Some("Admin"));
        assert_eq!(claims.idp, IdpKind::Cognito);
    }

    #[test]
    fn okta_claims_use_plain_groups() {
        let payload = json!({
            "sub": "00u1",
            "email": "ada@acme.example",
            "auth_time": 1700000000,
            "groups": ["Everyone"],
        });
        let claims = normalize_claims(&payload, IdpKind::Okta, "groups").unwrap();
        assert_eq!(claims.auth_groups, vec!["Everyone"]);
        assert!(claims.role.is_none());
    }

    #[test]
    fn missing_required_claims_are_invalid() {
        let payload = json!({ "email": "a@x.example", "auth_time": 1 });
        let err = normalize_claims(&payload, IdpKind::Cognito, "cognito:groups").unwrap_err();
        assert!(matches!(err, TokenError::InvalidToken(_)));
    }

    #[tokio::test]
    async fn malformed_bearer_is_rejected_without_network() {
        let verifier = TokenVerifier::new(vec![]);
        let err = verifier.verify("Bearer not-a-jwt", true).await.unwrap_err();
        assert!(matches!(err, TokenError::InvalidToken(_)));

        let err = verifier.verify("", true).await.unwrap_err();
        assert!(matches!(err, TokenError::InvalidToken(_)));
    }

    #[tokio::test]
    async fn unknown_kid_with_no_sources_is_invalid() {
        let verifier = TokenVerifier::new(vec![]);
        // A structurally valid unsigned-header token with a kid the
        // verifier cannot resolve. Header/payload are base64url JSON.
        let header = "eyJhbGciOiJSUzI1NiIsImtpZCI6Im5vcGUifQ"; // {"alg":"RS256","kid":"nope"}
        let payload = "e30"; // {}
        let token = format!("{header}.{payload}.c2ln");
        let err = verifier.verify(&token, true).await.unwrap_err();
        assert!(matches!(err, TokenError::InvalidToken(_)));
    }
}
