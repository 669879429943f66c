use async_trait::async_trait;
use reqwest::Client;

use super::WebhookClient;
use crate::error::WebhookError;
use crate::webhook::NotificationRecord;

/// Posts each batch as a JSON array to a fixed URL.
pub struct JsonWebhook {
    http: Client,
    url: String,
}

impl JsonWebhook {
    pub fn new(url: impl Into<String>, user_agent: &str) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .user_agent(user_agent.to_string())
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }
}

#[async_trait]
impl WebhookClient for JsonWebhook {
    async fn send(&self, batch: &[NotificationRecord]) -> Result<(), WebhookError> {
        let resp = self.http.post(&self.url).json(batch).send().await?;
        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(WebhookError::Status(status.as_u16()))
        }
    }
}
