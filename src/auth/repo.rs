use anyhow::Context;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::warn;

use crate::storage::{ObjectRef, RecordStore};

/// One user account, stored as a JSON document in the record store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

fn record_prefix(email: &str) -> String {
    format!("users/{email}-")
}

fn record_path(email: &str) -> String {
    format!("users/{email}.json")
}

pub fn now_rfc3339() -> anyhow::Result<String> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .context("format timestamp")
}

impl UserRecord {
    pub fn new(name: &str, email: &str, password_hash: String) -> anyhow::Result<Self> {
        Ok(Self {
            email: email.to_string(),
            name: name.to_string(),
            password_hash,
            created_at: now_rfc3339()?,
            updated_at: None,
        })
    }

    /// Resolve the physical object for an email via prefix scan.
    ///
    /// The store cannot guarantee a single object per email (see the
    /// registration race); when several exist, the lexicographically
    /// smallest path wins so every caller resolves the same record.
    pub async fn find_by_email(
        store: &dyn RecordStore,
        email: &str,
    ) -> anyhow::Result<Option<ObjectRef>> {
        let mut matches = store.find(&record_prefix(email)).await?;
        matches.sort_by(|a, b| a.path.cmp(&b.path));
        if matches.len() > 1 {
            warn!(
                email = %email,
                count = matches.len(),
                "multiple records share one email, picking first by path"
            );
        }
        Ok(matches.into_iter().next())
    }

    pub async fn fetch(store: &dyn RecordStore, path: &str) -> anyhow::Result<UserRecord> {
        let body = store
            .fetch(path)
            .await?
            .with_context(|| format!("user record listed but missing: {path}"))?;
        serde_json::from_slice(&body).context("parse user record")
    }

    /// First write for an account; the store assigns the suffixed path.
    pub async fn create(&self, store: &dyn RecordStore) -> anyhow::Result<ObjectRef> {
        store.write(&record_path(&self.email), self.to_bytes()?).await
    }

    /// In-place overwrite at an already-resolved path, used by password
    /// reset so the account does not fork into a second object.
    pub async fn overwrite(
        &self,
        store: &dyn RecordStore,
        path: &str,
    ) -> anyhow::Result<ObjectRef> {
        store.write_at(path, self.to_bytes()?).await
    }

    fn to_bytes(&self) -> anyhow::Result<Bytes> {
        Ok(Bytes::from(
            serde_json::to_vec(self).context("serialize user record")?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MemoryRecords;

    fn record(email: &str) -> UserRecord {
        UserRecord::new("A", email, "$argon2id$fake".into()).unwrap()
    }

    #[tokio::test]
    async fn create_then_resolve_yields_one_suffixed_object() {
        let store = MemoryRecords::default();
        record("a@x.com").create(&store).await.unwrap();

        let found = store.find("users/a@x.com-").await.unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].path.starts_with("users/a@x.com-"));
        assert!(found[0].path.ends_with(".json"));

        let resolved = UserRecord::find_by_email(&store, "a@x.com")
            .await
            .unwrap()
            .expect("record resolves");
        let user = UserRecord::fetch(&store, &resolved.path).await.unwrap();
        assert_eq!(user.email, "a@x.com");
        assert_eq!(user.name, "A");
        assert!(user.updated_at.is_none());
    }

    #[tokio::test]
    async fn duplicate_objects_resolve_deterministically() {
        let store = MemoryRecords::default();
        // two racing registrations both landed a write
        record("a@x.com").create(&store).await.unwrap();
        record("a@x.com").create(&store).await.unwrap();

        let resolved = UserRecord::find_by_email(&store, "a@x.com")
            .await
            .unwrap()
            .unwrap();
        let all = store.find("users/a@x.com-").await.unwrap();
        assert_eq!(all.len(), 2);
        let smallest = all.iter().map(|o| o.path.clone()).min().unwrap();
        assert_eq!(resolved.path, smallest);
    }

    #[tokio::test]
    async fn overwrite_keeps_a_single_object() {
        let store = MemoryRecords::default();
        record("a@x.com").create(&store).await.unwrap();
        let resolved = UserRecord::find_by_email(&store, "a@x.com")
            .await
            .unwrap()
            .unwrap();

        let mut user = UserRecord::fetch(&store, &resolved.path).await.unwrap();
        user.password_hash = "$argon2id$new".into();
        user.updated_at = Some(now_rfc3339().unwrap());
        user.overwrite(&store, &resolved.path).await.unwrap();

        let all = store.find("users/a@x.com-").await.unwrap();
        assert_eq!(all.len(), 1);
        let reread = UserRecord::fetch(&store, &resolved.path).await.unwrap();
        assert_eq!(reread.password_hash, "$argon2id$new");
        assert!(reread.updated_at.is_some());
    }

    #[tokio::test]
    async fn lookup_does_not_cross_email_boundaries() {
        let store = MemoryRecords::default();
        record("a@x.com").create(&store).await.unwrap();
        assert!(UserRecord::find_by_email(&store, "b@x.com")
            .await
            .unwrap()
            .is_none());
    }

    #[test]
    fn wire_shape_is_camel_case() {
        let user = record("a@x.com");
        let json = serde_json::to_string(&user).unwrap();
        assert!(json.contains("\"passwordHash\""));
        assert!(json.contains("\"createdAt\""));
        assert!(!json.contains("updatedAt"));
    }
}
