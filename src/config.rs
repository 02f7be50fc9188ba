use std::path::PathBuf;

use anyhow::Context;
use serde::Deserialize;

/// One year.
pub const MAX_TTL_HOURS: i64 = 24 * 365;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub ttl_hours: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    /// Directory served at `/uploads`.
    pub root: PathBuf,
    /// Scheme, host and port used when building public image URLs.
    pub public_base_url: String,
}

impl UploadConfig {
    pub fn products_dir(&self) -> PathBuf {
        self.root.join("products")
    }

    pub fn products_url(&self) -> String {
        format!(
            "{}/uploads/products",
            self.public_base_url.trim_end_matches('/')
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub host: String,
    pub port: u16,
    pub jwt: JwtConfig,
    pub uploads: UploadConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").context("DATABASE_URL must be set")?;

        let secret = lookup("JWT_SECRET").context("JWT_SECRET must be set")?;
        anyhow::ensure!(!secret.trim().is_empty(), "JWT_SECRET must not be empty");

        let port = parsed_or(&lookup, "APP_PORT", 8081);
        let ttl_hours = parsed_or(&lookup, "JWT_TTL_HOURS", 24);
        anyhow::ensure!(
            (1..=MAX_TTL_HOURS).contains(&ttl_hours),
            "JWT_TTL_HOURS must be between 1 and {}",
            MAX_TTL_HOURS
        );
        let jwt = JwtConfig { secret, ttl_hours };
        let uploads = UploadConfig {
            root: lookup("UPLOAD_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("uploads")),
            public_base_url: lookup("PUBLIC_BASE_URL")
                .unwrap_or_else(|| format!("http://localhost:{}", port)),
        };

        Ok(Self {
            database_url,
            db_max_connections: parsed_or(&lookup, "DB_MAX_CONNECTIONS", 10),
            host: lookup("APP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            jwt,
            uploads,
        })
    }
}

fn parsed_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}
