use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, bail};

/// Placeholder secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

const DEFAULT_MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub db_path: PathBuf,
    pub images_dir: PathBuf,
    pub secret: String,
    pub secure_cookies: bool,
    pub max_image_bytes: usize,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads every `PENWORK_*` setting through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret = lookup("PENWORK_SECRET").unwrap_or_default();
        if secret.is_empty() || PLACEHOLDER_SECRETS.contains(&secret.as_str()) {
            bail!("PENWORK_SECRET is unset or still a placeholder; set it in your .env file");
        }

        let host = lookup("PENWORK_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = match lookup("PENWORK_PORT") {
            Some(v) => v.parse().context("PENWORK_PORT must be a port number")?,
            None => 8000,
        };
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", host, port))?;

        let db_path: PathBuf = lookup("PENWORK_DB_PATH")
            .unwrap_or_else(|| "penwork.db".into())
            .into();
        let images_dir: PathBuf = lookup("PENWORK_IMAGES_DIR")
            .unwrap_or_else(|| "./uploads/images".into())
            .into();

        let secure_cookies = lookup("PENWORK_SECURE_COOKIES")
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let max_image_bytes = match lookup("PENWORK_MAX_IMAGE_BYTES") {
            Some(v) => v
                .parse()
                .context("PENWORK_MAX_IMAGE_BYTES must be a byte count")?,
            None => DEFAULT_MAX_IMAGE_BYTES,
        };

        Ok(Config {
            addr,
            db_path,
            images_dir,
            secret,
            secure_cookies,
            max_image_bytes,
        })
    }
}
