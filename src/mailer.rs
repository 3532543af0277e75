use anyhow::Context;
use axum::async_trait;
use serde_json::json;

use crate::config::MailConfig;

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_verification_code(&self, to: &str, code: &str) -> anyhow::Result<()>;
}

const SENDGRID_SEND_URL: &str = "https://api.sendgrid.com/v3/mail/send";

pub struct SendGridMailer {
    http: reqwest::Client,
    config: MailConfig,
}

impl SendGridMailer {
    pub fn new(config: MailConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl Mailer for SendGridMailer {
    async fn send_verification_code(&self, to: &str, code: &str) -> anyhow::Result<()> {
        let body = json!({
            "personalizations": [{ "to": [{ "email": to }] }],
            "from": { "email": self.config.from_email },
            "subject": "Your verification code",
            "content": [{
                "type": "text/plain",
                "value": format!(
                    "Your verification code is {code}. It expires in 5 minutes."
                ),
            }],
        });
        let resp = self
            .http
            .post(SENDGRID_SEND_URL)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .context("sendgrid request")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let detail = resp.text().await.unwrap_or_default();
            anyhow::bail!("sendgrid returned {status}: {detail}");
        }
        Ok(())
    }
}
