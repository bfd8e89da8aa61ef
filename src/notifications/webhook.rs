//! Webhook notifier for operator alerts
//!
//! Posts `{"text": ...}` to a configured URL. Delivery is best-effort: a
//! missing URL is a silent no-op and send failures are logged, never raised.

use serde_json::json;
use std::time::Duration;

use super::types::Notification;
use crate::config::OpsConfig;
use crate::logger::{self, LogTag};

/// Takes precedence over `ops.alert_webhook`
pub const WEBHOOK_ENV: &str = "OPS_ALERT_WEBHOOK";

#[derive(Clone)]
pub struct WebhookNotifier {
    url: Option<String>,
    http: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: Option<String>, timeout_secs: u64) -> Result<Self, String> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| format!("Failed to build webhook client: {}", e))?;

        Ok(Self {
            url: url.filter(|u| !u.trim().is_empty()),
            http,
        })
    }

    pub fn from_config(config: &OpsConfig) -> Result<Self, String> {
        let url = std::env::var(WEBHOOK_ENV)
            .ok()
            .or_else(|| config.alert_webhook.clone());
        Self::new(url, config.notify_timeout_secs)
    }

    /// A notifier that never sends; used when no webhook is wanted
    pub fn disabled() -> Self {
        Self {
            url: None,
            http: reqwest::Client::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.url.is_some()
    }

    /// Post a plain text message
    pub async fn send_message(&self, text: &str) -> Result<(), String> {
        let url = match &self.url {
            Some(url) => url,
            None => return Ok(()),
        };

        let response = self
            .http
            .post(url)
            .json(&json!({ "text": text }))
            .send()
            .await
            .map_err(|e| format!("Failed to post webhook: {}", e))?;

        if !response.status().is_success() {
            return Err(format!("Webhook returned HTTP {}", response.status().as_u16()));
        }

        logger::debug(
            LogTag::Notify,
            &format!("Sent webhook notification (length={})", text.len()),
        );
        Ok(())
    }

    pub async fn send(&self, notification: &Notification) -> Result<(), String> {
        self.send_message(&notification.render()).await
    }

    /// Send and swallow any failure
    pub async fn send_best_effort(&self, notification: &Notification) {
        if let Err(e) = self.send(notification).await {
            logger::debug(LogTag::Notify, &format!("Notification dropped: {}", e));
        }
    }
}
