//! Key material for the catalog: user/group API keys and the token signing
//! key set.
//!
//! # Key invariants
//! - API keys are 32 lowercase hex characters drawn from the OS RNG.
//! - The signing key set always uses the configured `kid` for the current
//!   key, even when the seed itself is random.
//! - Private key material is never logged.
use crate::config::TokenConfig;
use crate::model::API_KEY_LEN;
use anyhow::{Context, Result};
use rand::RngCore;
use toolshed_authz::{SigningKey, SigningKeySet, TokenAuthority};

/// Fresh opaque API key for a user or group.
pub fn generate_api_key() -> String {
    let mut bytes = [0u8; API_KEY_LEN / 2];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Build the signing key set described by `config`.
///
/// Without a configured seed a random one is generated, so tokens issued by a
/// previous process stop verifying after a restart.
///
/// # Errors
/// - A configured seed (current or previous) that is not 32 bytes of hex.
pub fn signing_keys_from_config(config: &TokenConfig) -> Result<SigningKeySet> {
    let current = match config.signing_seed_hex.as_deref() {
        Some(seed_hex) => SigningKey::from_seed_hex(config.signing_kid.clone(), seed_hex)
            .context("decode CATALOG_TOKEN_SIGNING_SEED")?,
        None => {
            tracing::warn!(
                kid = %config.signing_kid,
                "no token signing seed configured; generating an ephemeral key"
            );
            let mut seed = [0u8; 32];
            rand::thread_rng().fill_bytes(&mut seed);
            SigningKey::from_seed(config.signing_kid.clone(), seed)
        }
    };
    let previous = config
        .previous_seeds
        .iter()
        .map(|(kid, seed_hex)| {
            SigningKey::from_seed_hex(kid.clone(), seed_hex)
                .with_context(|| format!("decode previous signing seed {kid}"))
        })
        .collect::<Result<Vec<_>>>()?;
    SigningKeySet::new(current, previous).context("validate signing key set")
}

pub fn token_authority_from_config(config: &TokenConfig) -> Result<TokenAuthority> {
    let keys = signing_keys_from_config(config)?;
    TokenAuthority::new(keys, config.ttl, config.leeway_secs).context("build token authority")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use toolshed_authz::UserId;

    fn token_config(seed: Option<&str>) -> TokenConfig {
        TokenConfig {
            signing_seed_hex: seed.map(str::to_string),
            signing_kid: "catalog-1".to_string(),
            previous_seeds: Vec::new(),
            ttl: Duration::from_secs(60),
            leeway_secs: 0,
        }
    }

    #[test]
    fn api_keys_are_hex_and_distinct() {
        let a = generate_api_key();
        let b = generate_api_key();
        assert_eq!(a.len(), API_KEY_LEN);
        assert!(a.bytes().all(|b| b.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn configured_seed_is_deterministic() {
        let seed = "11".repeat(32);
        let a = signing_keys_from_config(&token_config(Some(&seed))).expect("keys");
        let b = signing_keys_from_config(&token_config(Some(&seed))).expect("keys");
        assert_eq!(a.current.public_key, b.current.public_key);
        assert_eq!(a.current.kid, "catalog-1");
    }

    #[test]
    fn missing_seed_keeps_configured_kid() {
        let keys = signing_keys_from_config(&token_config(None)).expect("keys");
        assert_eq!(keys.current.kid, "catalog-1");
    }

    #[test]
    fn bad_seed_is_rejected() {
        assert!(signing_keys_from_config(&token_config(Some("zz"))).is_err());
    }

    #[test]
    fn previous_seeds_still_verify() {
        let old_seed = "22".repeat(32);
        let old = token_authority_from_config(&TokenConfig {
            signing_kid: "catalog-0".to_string(),
            ..token_config(Some(&old_seed))
        })
        .expect("old authority");
        let token = old.mint(UserId::new(3)).expect("mint");

        let mut config = token_config(Some(&"33".repeat(32)));
        config.previous_seeds = vec![("catalog-0".to_string(), old_seed)];
        let rotated = token_authority_from_config(&config).expect("rotated authority");
        let claims = rotated.verify(&token).expect("verify");
        assert_eq!(claims.user_id(), Some(UserId::new(3)));
    }
}
