use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info};

use shared_config::AppConfig;

use crate::OutgoingEmail;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver one email. `idempotency_key` lets the provider drop repeats.
    async fn send(&self, email: &OutgoingEmail, idempotency_key: &str) -> Result<()>;
}

/// Sends mail through a JSON mail API (`POST {MAIL_API_URL}`).
pub struct HttpMailer {
    client: reqwest::Client,
    api_url: String,
    api_token: String,
    sender: String,
}

impl HttpMailer {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: config.mail_api_url.clone(),
            api_token: config.mail_api_token.clone(),
            sender: config.mail_default_sender.clone(),
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, email: &OutgoingEmail, idempotency_key: &str) -> Result<()> {
        debug!("Sending '{}' to {}", email.subject, email.to);

        let response = self.client
            .post(&self.api_url)
            .bearer_auth(&self.api_token)
            .header("Idempotency-Key", idempotency_key)
            .json(&json!({
                "from": self.sender,
                "to": [email.to],
                "subject": email.subject,
                "text": email.body
            }))
            .send()
            .await
            .context("mail API request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("mail API returned {}: {}", status, body);
        }

        Ok(())
    }
}

/// Writes emails to the log instead of sending them.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &OutgoingEmail, idempotency_key: &str) -> Result<()> {
        info!(
            to = %email.to,
            subject = %email.subject,
            key = %idempotency_key,
            "Mail delivery not configured, logging email"
        );
        Ok(())
    }
}

pub fn mailer_from_config(config: &AppConfig) -> Arc<dyn Mailer> {
    if config.is_mail_configured() {
        Arc::new(HttpMailer::new(config))
    } else {
        Arc::new(LogMailer)
    }
}
