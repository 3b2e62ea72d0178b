use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

/// Outbound email collaborator.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, template: &str, recipient: &str, payload: Value) -> Result<()>;
}

/// Writes notifications to the log instead of delivering them.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, template: &str, recipient: &str, payload: Value) -> Result<()> {
        tracing::info!(template, recipient, %payload, "Notification (log only)");
        Ok(())
    }
}

/// Hands notifications to a mail relay over HTTP.
pub struct HttpNotifier {
    client: reqwest::Client,
    relay_url: String,
}

impl HttpNotifier {
    pub fn new(relay_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            relay_url,
        }
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn notify(&self, template: &str, recipient: &str, payload: Value) -> Result<()> {
        #[derive(Serialize)]
        struct RelayRequest<'a> {
            template: &'a str,
            to: &'a str,
            data: Value,
        }

        let response = self
            .client
            .post(format!("{}/send", self.relay_url.trim_end_matches('/')))
            .json(&RelayRequest {
                template,
                to: recipient,
                data: payload,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("mail relay rejected {}: {}", template, response.status());
        }

        tracing::debug!(template, recipient, "Notification handed to relay");
        Ok(())
    }
}
