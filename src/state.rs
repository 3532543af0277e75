use crate::config::{AppConfig, BlobConfig, SessionConfig};
use crate::mailer::{Mailer, SendGridMailer};
use crate::secrets::{RedisSecrets, SecretStore};
use crate::storage::{BlobStore, ObjectRef, RecordStore};
use axum::async_trait;
use bytes::Bytes;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub records: Arc<dyn RecordStore>,
    pub secrets: Arc<dyn SecretStore>,
    /// `None` when SendGrid credentials are missing from the environment.
    pub mailer: Option<Arc<dyn Mailer>>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let records = Arc::new(
            BlobStore::new(
                &config.blob.endpoint,
                &config.blob.bucket,
                &config.blob.access_key,
                &config.blob.secret_key,
                &config.blob.region,
            )
            .await?,
        ) as Arc<dyn RecordStore>;

        let secrets =
            Arc::new(RedisSecrets::connect(&config.redis_url).await?) as Arc<dyn SecretStore>;

        let mailer = config
            .mail
            .clone()
            .map(|mail| Arc::new(SendGridMailer::new(mail)) as Arc<dyn Mailer>);

        Ok(Self {
            config,
            records,
            secrets,
            mailer,
        })
    }

    /// In-memory collaborators for tests: same contracts, no network.
    pub fn fake() -> Self {
        let config = Arc::new(AppConfig {
            session: SessionConfig {
                secret: "test-secret".into(),
                ttl_minutes: 60,
                secure_cookies: false,
            },
            blob: BlobConfig {
                endpoint: "http://blob.local".into(),
                bucket: "test".into(),
                access_key: "test".into(),
                secret_key: "test".into(),
                region: "us-east-1".into(),
            },
            redis_url: "redis://localhost:6379".into(),
            code_ttl_seconds: 300,
            mail: None,
        });

        Self {
            config,
            records: Arc::new(MemoryRecords::default()),
            secrets: Arc::new(MemorySecrets::default()),
            mailer: Some(Arc::new(NullMailer)),
        }
    }
}

/// Reproduces the record-store contract in memory, including the
/// store-assigned suffix on plain writes. The suffix is a counter rather
/// than random so tests see deterministic path ordering.
#[derive(Default)]
pub struct MemoryRecords {
    objects: std::sync::Mutex<std::collections::BTreeMap<String, Bytes>>,
    writes: std::sync::atomic::AtomicU64,
}

impl MemoryRecords {
    fn url(path: &str) -> String {
        format!("http://blob.local/test/{path}")
    }
}

#[async_trait]
impl RecordStore for MemoryRecords {
    async fn write(&self, path: &str, body: Bytes) -> anyhow::Result<ObjectRef> {
        let n = self
            .writes
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let path = match path.rsplit_once('.') {
            Some((stem, ext)) => format!("{stem}-{n:06x}.{ext}"),
            None => format!("{path}-{n:06x}"),
        };
        self.write_at(&path, body).await
    }

    async fn write_at(&self, path: &str, body: Bytes) -> anyhow::Result<ObjectRef> {
        self.objects
            .lock()
            .unwrap()
            .insert(path.to_string(), body);
        Ok(ObjectRef {
            path: path.to_string(),
            url: Self::url(path),
        })
    }

    async fn find(&self, prefix: &str) -> anyhow::Result<Vec<ObjectRef>> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .keys()
            .filter(|path| path.starts_with(prefix))
            .map(|path| ObjectRef {
                path: path.clone(),
                url: Self::url(path),
            })
            .collect())
    }

    async fn fetch(&self, path: &str) -> anyhow::Result<Option<Bytes>> {
        Ok(self.objects.lock().unwrap().get(path).cloned())
    }
}

/// In-memory secret store with real expiry semantics.
#[derive(Default)]
pub struct MemorySecrets {
    entries: std::sync::Mutex<std::collections::HashMap<String, (String, std::time::Instant)>>,
}

#[async_trait]
impl SecretStore for MemorySecrets {
    async fn put(&self, key: &str, value: &str, ttl_seconds: u64) -> anyhow::Result<()> {
        let expires_at = std::time::Instant::now() + std::time::Duration::from_secs(ttl_seconds);
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), (value.to_string(), expires_at));
        Ok(())
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let mut entries = self.entries.lock().unwrap();
        let expired = match entries.get(key) {
            Some((value, expires_at)) if *expires_at > std::time::Instant::now() => {
                return Ok(Some(value.clone()));
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.remove(key);
        }
        Ok(None)
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}

/// Accepts every send without delivering anything.
pub struct NullMailer;

#[async_trait]
impl Mailer for NullMailer {
    async fn send_verification_code(&self, _to: &str, _code: &str) -> anyhow::Result<()> {
        Ok(())
    }
}
