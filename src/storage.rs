use anyhow::Context;
use aws_config::{defaults, BehaviorVersion};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    Client,
};
use aws_smithy_types::byte_stream::ByteStream;
use axum::async_trait;
use bytes::Bytes;
use rand::{distributions::Alphanumeric, Rng};

/// A stored object's physical address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub path: String,
    pub url: String,
}

/// Append-like object store holding one JSON document per path.
///
/// `write` does not overwrite a logical path: the store assigns a fresh
/// suffixed physical path on every call, so "the document for X" is really
/// "every object whose path starts with X's prefix". `write_at` is the only
/// way to replace an object in place, and it requires the exact physical
/// path.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn write(&self, path: &str, body: Bytes) -> anyhow::Result<ObjectRef>;
    async fn write_at(&self, path: &str, body: Bytes) -> anyhow::Result<ObjectRef>;
    async fn find(&self, prefix: &str) -> anyhow::Result<Vec<ObjectRef>>;
    /// `None` when no object exists at `path`.
    async fn fetch(&self, path: &str) -> anyhow::Result<Option<Bytes>>;
}

#[derive(Clone)]
pub struct BlobStore {
    client: Client,
    bucket: String,
    endpoint: String,
}

impl BlobStore {
    pub async fn new(
        endpoint: &str,
        bucket: &str,
        access_key: &str,
        secret_key: &str,
        region: &str,
    ) -> anyhow::Result<Self> {
        let shared = defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .credentials_provider(Credentials::new(
                access_key, secret_key, None, None, "static",
            ))
            .endpoint_url(endpoint)
            .load()
            .await;

        let conf = S3ConfigBuilder::from(&shared)
            .endpoint_url(endpoint)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(conf),
            bucket: bucket.to_string(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, self.bucket, key)
    }
}

/// Insert a random suffix before the extension, the way the store names
/// fresh objects: `users/a@x.com.json` -> `users/a@x.com-3fK9cQ1vZm8p.json`.
fn suffixed(path: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(char::from)
        .collect();
    match path.rsplit_once('.') {
        Some((stem, ext)) => format!("{stem}-{suffix}.{ext}"),
        None => format!("{path}-{suffix}"),
    }
}

#[async_trait]
impl RecordStore for BlobStore {
    async fn write(&self, path: &str, body: Bytes) -> anyhow::Result<ObjectRef> {
        self.write_at(&suffixed(path), body).await
    }

    async fn write_at(&self, path: &str, body: Bytes) -> anyhow::Result<ObjectRef> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(path)
            .body(ByteStream::from(body))
            .content_type("application/json")
            .send()
            .await
            .context("s3 put_object")?;
        Ok(ObjectRef {
            path: path.to_string(),
            url: self.public_url(path),
        })
    }

    async fn find(&self, prefix: &str) -> anyhow::Result<Vec<ObjectRef>> {
        let out = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .send()
            .await
            .context("s3 list_objects_v2")?;
        Ok(out
            .contents()
            .iter()
            .filter_map(|object| object.key())
            .map(|key| ObjectRef {
                path: key.to_string(),
                url: self.public_url(key),
            })
            .collect())
    }

    async fn fetch(&self, path: &str) -> anyhow::Result<Option<Bytes>> {
        match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
        {
            Ok(out) => {
                let data = out.body.collect().await.context("collect object body")?;
                Ok(Some(data.into_bytes()))
            }
            Err(err) => {
                let service = err.into_service_error();
                if service.is_no_such_key() {
                    Ok(None)
                } else {
                    Err(anyhow::Error::new(service).context("s3 get_object"))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_lands_before_the_extension() {
        let path = suffixed("users/a@x.com.json");
        assert!(path.starts_with("users/a@x.com-"));
        assert!(path.ends_with(".json"));
        assert_eq!(path.len(), "users/a@x.com.json".len() + 13);
    }

    #[test]
    fn suffix_appended_when_no_extension() {
        let path = suffixed("users/a@x.com");
        assert!(path.starts_with("users/a@x.com-"));
        assert!(!path.contains('.'));
    }

    #[test]
    fn two_writes_get_distinct_paths() {
        let first = suffixed("users/a@x.com.json");
        let second = suffixed("users/a@x.com.json");
        assert_ne!(first, second);
    }
}
