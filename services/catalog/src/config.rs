//! Catalog service configuration.
//!
//! Values come from `CATALOG_*` environment variables with defaults, then an
//! optional YAML file named by `CATALOG_CONFIG` overrides any key it sets.
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    Memory,
    Postgres,
}

impl std::str::FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "postgres" | "postgresql" => Ok(StorageBackend::Postgres),
            other => bail!("unknown storage backend: {other}"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostgresConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
}

fn default_max_connections() -> u32 {
    10
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_acquire_timeout_ms() -> u64 {
    5_000
}

#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// Hex Ed25519 seed. A random key is generated when absent, which
    /// invalidates issued tokens on restart.
    pub signing_seed_hex: Option<String>,
    pub signing_kid: String,
    /// Previous seeds still accepted for verification, as `kid:hex` pairs.
    pub previous_seeds: Vec<(String, String)>,
    pub ttl: Duration,
    pub leeway_secs: u64,
}

#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub bind_addr: SocketAddr,
    pub metrics_bind: SocketAddr,
    pub storage: StorageBackend,
    pub postgres: Option<PostgresConfig>,
    pub token: TokenConfig,
    /// Upper bound for one request's unit of work.
    pub store_timeout: Duration,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogConfigOverride {
    bind_addr: Option<String>,
    metrics_bind: Option<String>,
    storage: Option<StorageBackend>,
    postgres: Option<PostgresConfig>,
    token_signing_seed: Option<String>,
    token_signing_kid: Option<String>,
    token_previous_seeds: Option<Vec<String>>,
    token_ttl_secs: Option<u64>,
    token_leeway_secs: Option<u64>,
    store_timeout_ms: Option<u64>,
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .map_err(|err| anyhow::anyhow!("parse {name}: {err}")),
        Err(_) => Ok(default),
    }
}

fn parse_previous_seeds(values: impl IntoIterator<Item = String>) -> Result<Vec<(String, String)>> {
    values
        .into_iter()
        .filter(|value| !value.trim().is_empty())
        .map(|value| {
            let (kid, seed) = value
                .split_once(':')
                .with_context(|| format!("previous seed must be kid:hex, got {value:?}"))?;
            Ok((kid.trim().to_string(), seed.trim().to_string()))
        })
        .collect()
}

impl CatalogConfig {
    pub fn from_env() -> Result<Self> {
        let bind_addr = env_or("CATALOG_BIND", "0.0.0.0:8080")
            .parse()
            .with_context(|| "parse CATALOG_BIND")?;
        let metrics_bind = env_or("CATALOG_METRICS_BIND", "0.0.0.0:9090")
            .parse()
            .with_context(|| "parse CATALOG_METRICS_BIND")?;
        let storage = env_or("CATALOG_STORAGE", "memory").parse()?;
        let postgres = match std::env::var("CATALOG_POSTGRES_URL") {
            Ok(url) => Some(PostgresConfig {
                url,
                max_connections: env_parse(
                    "CATALOG_POSTGRES_MAX_CONNECTIONS",
                    default_max_connections(),
                )?,
                connect_timeout_ms: env_parse(
                    "CATALOG_POSTGRES_CONNECT_TIMEOUT_MS",
                    default_connect_timeout_ms(),
                )?,
                acquire_timeout_ms: env_parse(
                    "CATALOG_POSTGRES_ACQUIRE_TIMEOUT_MS",
                    default_acquire_timeout_ms(),
                )?,
            }),
            Err(_) => None,
        };
        let previous_seeds = parse_previous_seeds(
            env_or("CATALOG_TOKEN_PREVIOUS_SEEDS", "")
                .split(',')
                .map(str::to_string),
        )?;
        let token = TokenConfig {
            signing_seed_hex: std::env::var("CATALOG_TOKEN_SIGNING_SEED").ok(),
            signing_kid: env_or("CATALOG_TOKEN_SIGNING_KID", "catalog-1"),
            previous_seeds,
            ttl: Duration::from_secs(env_parse("CATALOG_TOKEN_TTL_SECS", 3600)?),
            leeway_secs: env_parse("CATALOG_TOKEN_LEEWAY_SECS", 30)?,
        };
        let store_timeout = Duration::from_millis(env_parse("CATALOG_STORE_TIMEOUT_MS", 5_000)?);
        Ok(Self {
            bind_addr,
            metrics_bind,
            storage,
            postgres,
            token,
            store_timeout,
        })
    }

    pub fn from_env_or_yaml() -> Result<Self> {
        let mut config = Self::from_env()?;
        if let Ok(path) = std::env::var("CATALOG_CONFIG") {
            let contents =
                fs::read_to_string(&path).with_context(|| format!("read CATALOG_CONFIG: {path}"))?;
            let override_cfg: CatalogConfigOverride =
                serde_yaml::from_str(&contents).with_context(|| "parse catalog config yaml")?;
            config.apply(override_cfg)?;
        }
        config.validate()?;
        Ok(config)
    }

    fn apply(&mut self, overrides: CatalogConfigOverride) -> Result<()> {
        if let Some(value) = overrides.bind_addr {
            self.bind_addr = value.parse().with_context(|| "parse bind_addr")?;
        }
        if let Some(value) = overrides.metrics_bind {
            self.metrics_bind = value.parse().with_context(|| "parse metrics_bind")?;
        }
        if let Some(value) = overrides.storage {
            self.storage = value;
        }
        if let Some(value) = overrides.postgres {
            self.postgres = Some(value);
        }
        if let Some(value) = overrides.token_signing_seed {
            self.token.signing_seed_hex = Some(value);
        }
        if let Some(value) = overrides.token_signing_kid {
            self.token.signing_kid = value;
        }
        if let Some(values) = overrides.token_previous_seeds {
            self.token.previous_seeds = parse_previous_seeds(values)?;
        }
        if let Some(value) = overrides.token_ttl_secs {
            self.token.ttl = Duration::from_secs(value);
        }
        if let Some(value) = overrides.token_leeway_secs {
            self.token.leeway_secs = value;
        }
        if let Some(value) = overrides.store_timeout_ms {
            self.store_timeout = Duration::from_millis(value);
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.storage == StorageBackend::Postgres && self.postgres.is_none() {
            bail!("storage is postgres but no postgres url is configured");
        }
        if self.token.ttl.is_zero() {
            bail!("token ttl must be positive");
        }
        if self.store_timeout.is_zero() {
            bail!("store timeout must be positive");
        }
        Ok(())
    }

    /// Defaults suitable for tests: ephemeral ports, memory storage, random key.
    pub fn for_tests() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            metrics_bind: SocketAddr::from(([127, 0, 0, 1], 0)),
            storage: StorageBackend::Memory,
            postgres: None,
            token: TokenConfig {
                signing_seed_hex: None,
                signing_kid: "test".to_string(),
                previous_seeds: Vec::new(),
                ttl: Duration::from_secs(600),
                leeway_secs: 0,
            },
            store_timeout: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    struct EnvGuard {
        key: &'static str,
        previous: Option<String>,
    }

    impl EnvGuard {
        fn set(key: &'static str, value: &str) -> Self {
            let previous = std::env::var(key).ok();
            unsafe { std::env::set_var(key, value) };
            Self { key, previous }
        }

        fn unset(key: &'static str) -> Self {
            let previous = std::env::var(key).ok();
            unsafe { std::env::remove_var(key) };
            Self { key, previous }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match &self.previous {
                Some(value) => unsafe { std::env::set_var(self.key, value) },
                None => unsafe { std::env::remove_var(self.key) },
            }
        }
    }

    #[test]
    #[serial]
    fn defaults_use_memory_storage() {
        let _storage = EnvGuard::unset("CATALOG_STORAGE");
        let _config = EnvGuard::unset("CATALOG_CONFIG");
        let _pg = EnvGuard::unset("CATALOG_POSTGRES_URL");
        let config = CatalogConfig::from_env_or_yaml().expect("config");
        assert_eq!(config.storage, StorageBackend::Memory);
        assert_eq!(config.token.ttl, Duration::from_secs(3600));
        assert_eq!(config.store_timeout, Duration::from_millis(5_000));
    }

    #[test]
    #[serial]
    fn postgres_without_url_is_rejected() {
        let _storage = EnvGuard::set("CATALOG_STORAGE", "postgres");
        let _config = EnvGuard::unset("CATALOG_CONFIG");
        let _pg = EnvGuard::unset("CATALOG_POSTGRES_URL");
        assert!(CatalogConfig::from_env_or_yaml().is_err());
    }

    #[test]
    #[serial]
    fn yaml_overrides_env() {
        let mut file = tempfile_path();
        let path = file.0.clone();
        writeln!(
            file.1,
            "bind_addr: 127.0.0.1:7000\nstorage: postgres\npostgres:\n  url: postgres://localhost/catalog\ntoken_ttl_secs: 60\ntoken_previous_seeds:\n  - old:{}\nstore_timeout_ms: 250",
            "00".repeat(32)
        )
        .expect("write yaml");
        let _storage = EnvGuard::unset("CATALOG_STORAGE");
        let _pg = EnvGuard::unset("CATALOG_POSTGRES_URL");
        let _config = EnvGuard::set("CATALOG_CONFIG", &path);
        let config = CatalogConfig::from_env_or_yaml().expect("config");
        assert_eq!(config.bind_addr.port(), 7000);
        assert_eq!(config.storage, StorageBackend::Postgres);
        assert_eq!(config.postgres.expect("pg").max_connections, 10);
        assert_eq!(config.token.ttl, Duration::from_secs(60));
        assert_eq!(config.token.previous_seeds[0].0, "old");
        assert_eq!(config.store_timeout, Duration::from_millis(250));
        let _ = std::fs::remove_file(path);
    }

    #[test]
    #[serial]
    fn invalid_env_values_fail() {
        let _config = EnvGuard::unset("CATALOG_CONFIG");
        let _ttl = EnvGuard::set("CATALOG_TOKEN_TTL_SECS", "soon");
        assert!(CatalogConfig::from_env().is_err());
    }

    #[test]
    fn storage_backend_parsing() {
        assert_eq!(
            "Postgres".parse::<StorageBackend>().expect("parse"),
            StorageBackend::Postgres
        );
        assert!("sqlite".parse::<StorageBackend>().is_err());
    }

    fn tempfile_path() -> (String, std::fs::File) {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let path = std::env::temp_dir().join(format!("catalog-config-{nanos}.yaml"));
        let file = std::fs::File::create(&path).expect("create temp file");
        (path.to_string_lossy().into_owned(), file)
    }
}
