//! Verification-code issuance and validation against the secret store.

use rand::Rng;

use crate::error::ApiError;
use crate::secrets::SecretStore;

fn code_key(email: &str) -> String {
    format!("verification_code:{email}")
}

/// The KV client may hand the value back JSON-quoted or padded; both sides
/// of the comparison must be bare digit strings.
fn canonical(raw: &str) -> &str {
    raw.trim().trim_matches('"')
}

/// Generate and store a fresh 6-digit code for `email`, replacing any
/// outstanding one. Only the latest code is ever valid.
pub async fn issue(
    secrets: &dyn SecretStore,
    email: &str,
    ttl_seconds: u64,
) -> anyhow::Result<String> {
    let code = rand::thread_rng().gen_range(100_000..1_000_000).to_string();
    secrets.put(&code_key(email), &code, ttl_seconds).await?;
    Ok(code)
}

/// Check the outstanding code for `email` without consuming it.
pub async fn check(
    secrets: &dyn SecretStore,
    email: &str,
    submitted: &str,
) -> Result<(), ApiError> {
    match secrets.get(&code_key(email)).await? {
        Some(stored) if canonical(&stored) == canonical(submitted) => Ok(()),
        _ => Err(ApiError::InvalidCode),
    }
}

/// Drop a consumed code so it cannot be replayed.
pub async fn consume(secrets: &dyn SecretStore, email: &str) -> anyhow::Result<()> {
    secrets.delete(&code_key(email)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MemorySecrets;

    #[tokio::test]
    async fn issued_code_is_six_digits() {
        let secrets = MemorySecrets::default();
        let code = issue(&secrets, "a@x.com", 300).await.unwrap();
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
        assert!(check(&secrets, "a@x.com", &code).await.is_ok());
    }

    #[tokio::test]
    async fn wrong_or_missing_code_is_rejected() {
        let secrets = MemorySecrets::default();
        assert!(matches!(
            check(&secrets, "a@x.com", "123456").await,
            Err(ApiError::InvalidCode)
        ));
        issue(&secrets, "a@x.com", 300).await.unwrap();
        assert!(matches!(
            check(&secrets, "a@x.com", "000000").await,
            Err(ApiError::InvalidCode)
        ));
    }

    #[tokio::test]
    async fn quoted_store_value_still_matches() {
        let secrets = MemorySecrets::default();
        secrets
            .put("verification_code:a@x.com", "\"123456\"", 300)
            .await
            .unwrap();
        assert!(check(&secrets, "a@x.com", "123456").await.is_ok());
    }

    #[tokio::test]
    async fn reissue_invalidates_previous_code() {
        let secrets = MemorySecrets::default();
        let first = issue(&secrets, "a@x.com", 300).await.unwrap();
        let second = issue(&secrets, "a@x.com", 300).await.unwrap();
        assert!(check(&secrets, "a@x.com", &second).await.is_ok());
        if first != second {
            assert!(matches!(
                check(&secrets, "a@x.com", &first).await,
                Err(ApiError::InvalidCode)
            ));
        }
    }

    #[tokio::test]
    async fn consumed_code_cannot_be_replayed() {
        let secrets = MemorySecrets::default();
        let code = issue(&secrets, "a@x.com", 300).await.unwrap();
        consume(&secrets, "a@x.com").await.unwrap();
        assert!(matches!(
            check(&secrets, "a@x.com", &code).await,
            Err(ApiError::InvalidCode)
        ));
    }

    #[tokio::test]
    async fn expired_code_is_rejected() {
        let secrets = MemorySecrets::default();
        secrets
            .put("verification_code:a@x.com", "123456", 0)
            .await
            .unwrap();
        assert!(matches!(
            check(&secrets, "a@x.com", "123456").await,
            Err(ApiError::InvalidCode)
        ));
    }

    #[tokio::test]
    async fn codes_are_scoped_per_email() {
        let secrets = MemorySecrets::default();
        let code = issue(&secrets, "a@x.com", 300).await.unwrap();
        assert!(matches!(
            check(&secrets, "b@x.com", &code).await,
            Err(ApiError::InvalidCode)
        ));
    }
}
