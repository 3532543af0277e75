use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub secret: String,
    pub ttl_minutes: i64,
    pub secure_cookies: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlobConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    pub api_key: String,
    pub from_email: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub session: SessionConfig,
    pub blob: BlobConfig,
    pub redis_url: String,
    pub code_ttl_seconds: u64,
    /// Absent when the mail channel is not configured; send-verification
    /// then fails per request instead of at boot.
    pub mail: Option<MailConfig>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let session = SessionConfig {
            secret: std::env::var("SESSION_SECRET").context("SESSION_SECRET is not set")?,
            ttl_minutes: std::env::var("SESSION_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60),
            secure_cookies: std::env::var("APP_ENV")
                .map(|v| v == "production")
                .unwrap_or(false),
        };
        let blob = BlobConfig {
            endpoint: std::env::var("BLOB_ENDPOINT").context("BLOB_ENDPOINT is not set")?,
            bucket: std::env::var("BLOB_BUCKET").context("BLOB_BUCKET is not set")?,
            access_key: std::env::var("BLOB_ACCESS_KEY").context("BLOB_ACCESS_KEY is not set")?,
            secret_key: std::env::var("BLOB_SECRET_KEY").context("BLOB_SECRET_KEY is not set")?,
            region: std::env::var("BLOB_REGION").unwrap_or_else(|_| "us-east-1".into()),
        };
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".into());
        let code_ttl_seconds = std::env::var("CODE_TTL_SECONDS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(300);
        let mail = match (
            std::env::var("SENDGRID_API_KEY"),
            std::env::var("SENDGRID_FROM"),
        ) {
            (Ok(api_key), Ok(from_email)) => Some(MailConfig {
                api_key,
                from_email,
            }),
            _ => None,
        };
        Ok(Self {
            session,
            blob,
            redis_url,
            code_ttl_seconds,
            mail,
        })
    }
}
