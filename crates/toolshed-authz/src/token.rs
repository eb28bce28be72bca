//! Bearer token minting and verification.
//!
//! # Purpose
//! Issue and verify the short-lived access tokens catalog clients present as
//! `Authorization: Bearer <jwt>`.
//!
//! # Key invariants
//! - Tokens are always EdDSA (Ed25519); any other `alg` is rejected.
//! - `iss`, `aud`, `sub`, `exp` and `nbf` are mandatory and validated.
//! - `sub` is the decimal id of the user the token was issued to.
//! - The private key is a raw 32-byte Ed25519 seed and the public key must be
//!   derived from it.
//!
//! # Concurrency model
//! [`TokenAuthority`] is cheap to clone and shares one key cache behind a
//! `RwLock`; verification only takes read locks once a key has been used.
//!
//! # Rotation
//! New tokens are signed with the current key. Verification tries the key
//! named by the header `kid` first, then the remaining keys, so tokens signed
//! by a previous key keep working until they expire.
//!
//! # Examples
//! ```rust
//! use std::time::Duration;
//! use toolshed_authz::{SigningKeySet, TokenAuthority, UserId};
//!
//! let keys = SigningKeySet::from_seed("k1", [7u8; 32]).expect("keys");
//! let authority = TokenAuthority::new(keys, Duration::from_secs(300), 5).expect("authority");
//! let token = authority.mint(UserId::new(42)).expect("mint");
//! let claims = authority.verify(&token).expect("verify");
//! assert_eq!(claims.user_id(), Some(UserId::new(42)));
//! ```
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use ed25519_dalek::SigningKey as Ed25519SigningKey;
use ed25519_dalek::pkcs8::EncodePrivateKey;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::{AuthzError, AuthzResult, CredentialError, UserId};

pub const TOKEN_ISSUER: &str = "toolshed-catalog";
pub const TOKEN_AUDIENCE: &str = "toolshed-api";
pub const TOKEN_TYPE: &str = "Bearer";

const ED25519_KEY_LEN: usize = 32;

/// Claims carried by catalog access tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogClaims {
    pub iss: String,
    pub aud: String,
    pub sub: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

impl CatalogClaims {
    /// The user the token was issued to, if the subject is a well formed id.
    pub fn user_id(&self) -> Option<UserId> {
        self.sub.parse().ok()
    }
}

/// Ed25519 signing key plus its key id.
///
/// # Security
/// - Never serialize or log `private_key`.
#[derive(Clone)]
pub struct SigningKey {
    pub kid: String,
    pub alg: Algorithm,
    pub private_key: [u8; ED25519_KEY_LEN],
    pub public_key: [u8; ED25519_KEY_LEN],
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("alg", &self.alg)
            .finish_non_exhaustive()
    }
}

impl SigningKey {
    pub fn from_seed(kid: impl Into<String>, seed: [u8; ED25519_KEY_LEN]) -> Self {
        let public_key = Ed25519SigningKey::from_bytes(&seed)
            .verifying_key()
            .to_bytes();
        SigningKey {
            kid: kid.into(),
            alg: Algorithm::EdDSA,
            private_key: seed,
            public_key,
        }
    }

    /// Decode a hex seed as found in configuration.
    ///
    /// # Errors
    /// - [`AuthzError::InvalidSigningKey`] if the value is not 64 hex chars.
    pub fn from_seed_hex(kid: impl Into<String>, seed_hex: &str) -> AuthzResult<Self> {
        let bytes = hex::decode(seed_hex.trim())
            .map_err(|err| AuthzError::InvalidSigningKey(format!("seed is not hex: {err}")))?;
        let seed: [u8; ED25519_KEY_LEN] = bytes.try_into().map_err(|bytes: Vec<u8>| {
            AuthzError::InvalidSigningKey(format!(
                "seed must be {ED25519_KEY_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(SigningKey::from_seed(kid, seed))
    }

    /// Fresh random key with a random `kid`.
    pub fn generate() -> Self {
        let mut seed = [0u8; ED25519_KEY_LEN];
        rand::thread_rng().fill_bytes(&mut seed);
        let mut kid_bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut kid_bytes);
        SigningKey::from_seed(hex::encode(kid_bytes), seed)
    }

    /// Check the algorithm is EdDSA and the public key matches the seed.
    pub fn validate(&self) -> AuthzResult<()> {
        if self.alg != Algorithm::EdDSA {
            return Err(AuthzError::InvalidSigningKey(format!(
                "unsupported signing algorithm: {:?}",
                self.alg
            )));
        }
        let expected = Ed25519SigningKey::from_bytes(&self.private_key)
            .verifying_key()
            .to_bytes();
        if expected != self.public_key {
            return Err(AuthzError::InvalidSigningKey(
                "Ed25519 public key does not match private seed".to_string(),
            ));
        }
        Ok(())
    }
}

/// Current signing key and the previous keys still accepted for verification.
#[derive(Debug, Clone)]
pub struct SigningKeySet {
    pub current: SigningKey,
    pub previous: Vec<SigningKey>,
}

impl SigningKeySet {
    pub fn new(current: SigningKey, previous: Vec<SigningKey>) -> AuthzResult<Self> {
        let keys = SigningKeySet { current, previous };
        keys.validate()?;
        Ok(keys)
    }

    pub fn from_seed(kid: impl Into<String>, seed: [u8; ED25519_KEY_LEN]) -> AuthzResult<Self> {
        SigningKeySet::new(SigningKey::from_seed(kid, seed), Vec::new())
    }

    pub fn generate() -> Self {
        SigningKeySet {
            current: SigningKey::generate(),
            previous: Vec::new(),
        }
    }

    pub fn validate(&self) -> AuthzResult<()> {
        self.all_keys().try_for_each(SigningKey::validate)
    }

    /// Current key first, then previous keys in rotation order.
    pub fn all_keys(&self) -> impl Iterator<Item = &SigningKey> {
        std::iter::once(&self.current).chain(self.previous.iter())
    }

    /// Make `next` current and keep the old current key for verification.
    pub fn rotate(&mut self, next: SigningKey) -> AuthzResult<()> {
        next.validate()?;
        let old = std::mem::replace(&mut self.current, next);
        self.previous.insert(0, old);
        Ok(())
    }

    fn ordered_for(&self, kid: Option<&str>) -> Vec<&SigningKey> {
        let mut ordered: Vec<&SigningKey> = Vec::new();
        if let Some(kid) = kid {
            ordered.extend(self.all_keys().filter(|key| key.kid == kid));
        }
        ordered.extend(self.all_keys().filter(|key| Some(key.kid.as_str()) != kid));
        ordered
    }
}

#[derive(Clone, Default)]
struct KeyCache {
    encoding: Arc<RwLock<HashMap<String, EncodingKey>>>,
    decoding: Arc<RwLock<HashMap<String, DecodingKey>>>,
}

impl KeyCache {
    fn encoding_key(&self, key: &SigningKey) -> AuthzResult<EncodingKey> {
        if let Ok(map) = self.encoding.read()
            && let Some(found) = map.get(&key.kid)
        {
            return Ok(found.clone());
        }
        // jsonwebtoken wants PKCS8 DER for EdDSA signing keys.
        let der = Ed25519SigningKey::from_bytes(&key.private_key)
            .to_pkcs8_der()
            .map_err(|err| AuthzError::InvalidSigningKey(format!("encode Ed25519 key: {err}")))?;
        let encoding_key = EncodingKey::from_ed_der(der.as_bytes());
        if let Ok(mut map) = self.encoding.write() {
            map.insert(key.kid.clone(), encoding_key.clone());
        }
        Ok(encoding_key)
    }

    fn decoding_key(&self, key: &SigningKey) -> AuthzResult<DecodingKey> {
        if let Ok(map) = self.decoding.read()
            && let Some(found) = map.get(&key.kid)
        {
            return Ok(found.clone());
        }
        let x = URL_SAFE_NO_PAD.encode(key.public_key);
        let decoding_key = DecodingKey::from_ed_components(&x)?;
        if let Ok(mut map) = self.decoding.write() {
            map.insert(key.kid.clone(), decoding_key.clone());
        }
        Ok(decoding_key)
    }
}

/// Mints and verifies access tokens with one signing key set.
#[derive(Clone)]
pub struct TokenAuthority {
    keys: Arc<SigningKeySet>,
    ttl: Duration,
    leeway: u64,
    cache: KeyCache,
}

impl std::fmt::Debug for TokenAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenAuthority")
            .field("current_kid", &self.keys.current.kid)
            .field("ttl", &self.ttl)
            .field("leeway", &self.leeway)
            .finish()
    }
}

impl TokenAuthority {
    pub fn new(keys: SigningKeySet, ttl: Duration, leeway: u64) -> AuthzResult<Self> {
        keys.validate()?;
        Ok(TokenAuthority {
            keys: Arc::new(keys),
            ttl,
            leeway,
            cache: KeyCache::default(),
        })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn keys(&self) -> &SigningKeySet {
        &self.keys
    }

    /// Issue a token for `user` valid from now until now + ttl.
    pub fn mint(&self, user: UserId) -> AuthzResult<String> {
        let now = now_epoch_seconds();
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        let mut jti = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut jti);
        let claims = CatalogClaims {
            iss: TOKEN_ISSUER.to_string(),
            aud: TOKEN_AUDIENCE.to_string(),
            sub: user.to_string(),
            iat: now,
            nbf: now,
            exp: now.saturating_add(ttl),
            jti: Some(hex::encode(jti)),
        };
        self.encode(&claims)
    }

    fn encode(&self, claims: &CatalogClaims) -> AuthzResult<String> {
        let mut header = Header::new(self.keys.current.alg);
        header.kid = Some(self.keys.current.kid.clone());
        let encoding_key = self.cache.encoding_key(&self.keys.current)?;
        Ok(jsonwebtoken::encode(&header, claims, &encoding_key)?)
    }

    /// Verify a raw token and return its claims.
    ///
    /// # Errors
    /// - [`CredentialError::Expired`] when the signature is good but `exp` has
    ///   passed or `nbf` is still in the future (outside the leeway).
    /// - [`CredentialError::Invalid`] for everything else: malformed token,
    ///   unknown key, wrong algorithm, issuer, audience or subject.
    pub fn verify(&self, token: &str) -> Result<CatalogClaims, CredentialError> {
        let header = jsonwebtoken::decode_header(token).map_err(|_| CredentialError::Invalid)?;
        if header.alg != Algorithm::EdDSA {
            return Err(CredentialError::Invalid);
        }

        let mut validation = Validation::new(Algorithm::EdDSA);
        validation.set_audience(&[TOKEN_AUDIENCE]);
        validation.set_issuer(&[TOKEN_ISSUER]);
        validation.set_required_spec_claims(&["exp", "nbf", "iss", "aud", "sub"]);
        validation.validate_nbf = true;
        validation.leeway = self.leeway;

        for key in self.keys.ordered_for(header.kid.as_deref()) {
            let Ok(decoding_key) = self.cache.decoding_key(key) else {
                continue;
            };
            match jsonwebtoken::decode::<CatalogClaims>(token, &decoding_key, &validation) {
                Ok(data) => {
                    if data.claims.user_id().is_none() {
                        return Err(CredentialError::Invalid);
                    }
                    return Ok(data.claims);
                }
                // Claim checks run after the signature check, so these mean
                // this key signed the token.
                Err(err)
                    if matches!(
                        err.kind(),
                        ErrorKind::ExpiredSignature | ErrorKind::ImmatureSignature
                    ) =>
                {
                    return Err(CredentialError::Expired);
                }
                Err(err) if matches!(err.kind(), ErrorKind::InvalidSignature) => continue,
                Err(_) => return Err(CredentialError::Invalid),
            }
        }
        Err(CredentialError::Invalid)
    }

    /// Verify the value of an `Authorization` header.
    pub fn verify_header(
        &self,
        authorization: Option<&str>,
    ) -> Result<CatalogClaims, CredentialError> {
        let token = bearer_token(authorization)?;
        self.verify(token)
    }
}

/// Extract the token from a `Bearer <token>` header value.
pub fn bearer_token(authorization: Option<&str>) -> Result<&str, CredentialError> {
    let value = authorization.ok_or(CredentialError::Missing)?;
    let (scheme, token) = value
        .trim()
        .split_once(' ')
        .ok_or(CredentialError::Invalid)?;
    if !scheme.eq_ignore_ascii_case(TOKEN_TYPE) {
        return Err(CredentialError::Invalid);
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(CredentialError::Invalid);
    }
    Ok(token)
}

fn now_epoch_seconds() -> i64 {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    i64::try_from(secs).unwrap_or(i64::MAX)
}
