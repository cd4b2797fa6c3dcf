//! Slack Incoming Webhook
//!
//! Slack Incoming Webhook通知
//!
//! Fire-and-forget sink for error/completion reporting; delivery failures
//! are never allowed to fail the operation being reported on.

use log::warn;
use serde::Serialize;

use crate::error::{Result, TransferError};

/// Webhook投稿ペイロード
#[derive(Debug, Clone, Serialize, Default)]
pub struct SlackMessage {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_emoji: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
}

impl SlackMessage {
    /// テキストのみのメッセージを作成
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// Slack Incoming Webhookクライアント
pub struct IncomingWebhook {
    url: String,
    client: reqwest::Client,
}

impl IncomingWebhook {
    /// Webhook URLからクライアントを作成
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }

    /// メッセージを投稿する
    pub async fn send(&self, message: &SlackMessage) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(message)
            .send()
            .await
            .map_err(|e| TransferError::Remote(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(TransferError::Remote(format!(
                "webhook returned {}",
                response.status()
            )))
        }
    }

    /// Post a message, logging instead of propagating failures.
    pub async fn send_or_log(&self, message: &SlackMessage) {
        if let Err(e) = self.send(message).await {
            warn!("slack notification failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_only_payload_omits_optional_fields() {
        let message = SlackMessage::text("load finished");
        let json = serde_json::to_string(&message).unwrap();
        assert_eq!(json, r#"{"text":"load finished"}"#);
    }

    #[test]
    fn test_full_payload_serialization() {
        let message = SlackMessage {
            text: "load failed".to_string(),
            username: Some("bulksync".to_string()),
            icon_emoji: Some(":warning:".to_string()),
            channel: Some("#data-ops".to_string()),
        };
        let json: serde_json::Value =
            serde_json::to_value(&message).unwrap();
        assert_eq!(json["username"], "bulksync");
        assert_eq!(json["icon_emoji"], ":warning:");
        assert_eq!(json["channel"], "#data-ops");
    }
}
