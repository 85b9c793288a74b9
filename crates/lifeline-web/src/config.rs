use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, bail};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Embedded SQLite store, on-disk objects, in-process change feed.
    Local,
    /// The hosted platform.
    Remote,
}

impl FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Backend::Local),
            "remote" => Ok(Backend::Remote),
            other => bail!("LIFELINE_BACKEND must be `local` or `remote`, got `{}`", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub backend: Backend,
    pub db_path: PathBuf,
    pub storage_dir: PathBuf,
    pub jwt_secret: String,
    pub public_url: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let or = |key: &str, default: &str| var(key).unwrap_or_else(|| default.into());

        let port: u16 = or("LIFELINE_PORT", "3000")
            .parse()
            .context("LIFELINE_PORT is not a port number")?;
        let backend: Backend = or("LIFELINE_BACKEND", "local").parse()?;

        let config = Config {
            host: or("LIFELINE_HOST", "0.0.0.0"),
            port,
            backend,
            db_path: or("LIFELINE_DB_PATH", "lifeline.db").into(),
            storage_dir: or("LIFELINE_STORAGE_DIR", "./lifeline-storage").into(),
            jwt_secret: var("LIFELINE_JWT_SECRET").unwrap_or_default(),
            public_url: or("LIFELINE_PUBLIC_URL", "http://localhost:3000"),
            supabase_url: var("SUPABASE_URL").unwrap_or_default(),
            supabase_anon_key: var("SUPABASE_ANON_KEY").unwrap_or_default(),
        };

        match config.backend {
            Backend::Local => {
                if config.jwt_secret.is_empty()
                    || PLACEHOLDER_SECRETS.contains(&config.jwt_secret.as_str())
                {
                    bail!(
                        "LIFELINE_JWT_SECRET is unset or still a placeholder. \
                         Set it in your .env file and restart."
                    );
                }
            }
            Backend::Remote => {
                if config.supabase_url.is_empty() || config.supabase_anon_key.is_empty() {
                    bail!("SUPABASE_URL and SUPABASE_ANON_KEY are required for the remote backend");
                }
            }
        }

        Ok(config)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
