use anyhow::Context;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::storage::RecordStore;

/// Per-user dashboard preferences.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Profile {
    pub favorites: Vec<String>,
}

fn profile_path(email: &str) -> String {
    format!("profiles/{email}.json")
}

impl Profile {
    /// A missing document reads as an empty profile.
    pub async fn load(store: &dyn RecordStore, email: &str) -> anyhow::Result<Profile> {
        match store.fetch(&profile_path(email)).await? {
            Some(body) => serde_json::from_slice(&body).context("parse profile"),
            None => Ok(Profile::default()),
        }
    }

    /// Idempotent upsert keyed by email: always the same exact path, so
    /// repeated saves overwrite instead of accumulating objects.
    pub async fn save(&self, store: &dyn RecordStore, email: &str) -> anyhow::Result<()> {
        let body = Bytes::from(serde_json::to_vec(self).context("serialize profile")?);
        store.write_at(&profile_path(email), body).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MemoryRecords;

    #[tokio::test]
    async fn absent_profile_reads_as_empty() {
        let store = MemoryRecords::default();
        let profile = Profile::load(&store, "a@x.com").await.unwrap();
        assert!(profile.favorites.is_empty());
    }

    #[tokio::test]
    async fn save_is_an_idempotent_upsert() {
        let store = MemoryRecords::default();
        let profile = Profile {
            favorites: vec!["pulse".into(), "ldl".into()],
        };
        profile.save(&store, "a@x.com").await.unwrap();
        profile.save(&store, "a@x.com").await.unwrap();

        assert_eq!(store.find("profiles/").await.unwrap().len(), 1);
        let reread = Profile::load(&store, "a@x.com").await.unwrap();
        assert_eq!(reread.favorites, vec!["pulse", "ldl"]);
    }

    #[tokio::test]
    async fn profiles_are_scoped_per_email() {
        let store = MemoryRecords::default();
        Profile {
            favorites: vec!["pulse".into()],
        }
        .save(&store, "a@x.com")
        .await
        .unwrap();

        let other = Profile::load(&store, "b@x.com").await.unwrap();
        assert!(other.favorites.is_empty());
    }
}
