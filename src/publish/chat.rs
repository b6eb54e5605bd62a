//! Chat connector (Slack-style).
//!
//! Posts a Block Kit summary card to a channel. A bot token gets
//! `chat.postMessage` (and a stored message timestamp for the status
//! endpoint); with only an incoming webhook configured, the message goes
//! there and the stored channel is the literal "webhook".

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::info;

use super::{PublishConnector, PublishRef};
use crate::config::ChatConfig;
use crate::db::{MeetingRecord, SpeakerMapping};
use crate::error::{PipelineError, PipelineResult};

/// Slack caps a section block at 3000 chars; truncate with headroom for the
/// ellipsis marker.
const SUMMARY_LIMIT: usize = 2500;

pub struct ChatConnector {
    client: reqwest::Client,
    webhook_url: Option<String>,
    bot_token: Option<String>,
    default_channel: Option<String>,
    app_url: Option<String>,
    api_url: String,
}

impl ChatConnector {
    pub fn new(config: &ChatConfig, timeout: Duration) -> PipelineResult<Self> {
        if !config.is_configured() {
            return Err(PipelineError::Internal(anyhow::anyhow!(
                "chat connector requires a webhook_url or a bot_token"
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::Internal(e.into()))?;

        Ok(Self {
            client,
            webhook_url: config.webhook_url.clone(),
            bot_token: config.bot_token.clone(),
            default_channel: config.default_channel.clone(),
            app_url: config.app_url.clone(),
            api_url: "https://slack.com/api".to_string(),
        })
    }

    async fn send_bot_message(
        &self,
        token: &str,
        channel: &str,
        message: Value,
    ) -> PipelineResult<PublishRef> {
        let mut payload = message;
        payload["channel"] = json!(channel);

        let response = self
            .client
            .post(format!("{}/chat.postMessage", self.api_url))
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| PipelineError::from_reqwest("chat", e))?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| PipelineError::from_reqwest("chat", e))?;

        if !status.is_success() {
            return Err(PipelineError::from_status("chat", status, &body.to_string()));
        }
        if !body["ok"].as_bool().unwrap_or(false) {
            return Err(PipelineError::permanent(format!(
                "chat API error: {}",
                body["error"].as_str().unwrap_or("unknown error")
            )));
        }

        Ok(PublishRef {
            external_id: body["ts"].as_str().unwrap_or_default().to_string(),
            external_location: body["channel"]
                .as_str()
                .unwrap_or(channel)
                .to_string(),
        })
    }

    async fn send_webhook_message(&self, url: &str, message: Value) -> PipelineResult<PublishRef> {
        let response = self
            .client
            .post(url)
            .json(&message)
            .send()
            .await
            .map_err(|e| PipelineError::from_reqwest("chat webhook", e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PipelineError::from_reqwest("chat webhook", e))?;

        if !status.is_success() || body != "ok" {
            return Err(PipelineError::from_status("chat webhook", status, &body));
        }

        Ok(PublishRef {
            external_id: String::new(),
            external_location: "webhook".to_string(),
        })
    }
}

#[async_trait]
impl PublishConnector for ChatConnector {
    fn name(&self) -> &'static str {
        "chat"
    }

    fn is_published(&self, record: &MeetingRecord) -> bool {
        !record.chat_channel.is_empty()
    }

    async fn publish(
        &self,
        record: &MeetingRecord,
        _mappings: &[SpeakerMapping],
    ) -> PipelineResult<PublishRef> {
        let message = format_message(record, self.app_url.as_deref());

        let reference = if let Some(token) = &self.bot_token {
            let channel = self.default_channel.as_deref().ok_or_else(|| {
                PipelineError::permanent("no chat channel configured for bot publishing")
            })?;
            self.send_bot_message(token, channel, message).await?
        } else {
            let url = self.webhook_url.as_deref().ok_or_else(|| {
                PipelineError::permanent("chat connector has neither bot token nor webhook")
            })?;
            self.send_webhook_message(url, message).await?
        };

        info!(
            "Meeting {} shared to chat ({})",
            record.id, reference.external_location
        );
        Ok(reference)
    }
}

fn truncated_summary(summary: &str) -> String {
    if summary.is_empty() {
        return "No summary".to_string();
    }
    if summary.len() <= SUMMARY_LIMIT {
        return summary.to_string();
    }
    let mut cut = SUMMARY_LIMIT;
    while !summary.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}\n\n... (truncated)", &summary[..cut])
}

/// Block Kit card: header, meta fields, summary, optional deep link.
fn format_message(record: &MeetingRecord, app_url: Option<&str>) -> Value {
    let mut blocks = vec![
        json!({
            "type": "header",
            "text": {
                "type": "plain_text",
                "text": format!("📋 {}", record.title),
                "emoji": true,
            },
        }),
        json!({
            "type": "section",
            "fields": [
                {"type": "mrkdwn", "text": format!("*Meeting time:*\n{}", record.meeting_at)},
                {"type": "mrkdwn", "text": format!("*Recorded by:*\n{}", record.created_by)},
            ],
        }),
        json!({"type": "divider"}),
        json!({
            "type": "section",
            "text": {"type": "mrkdwn", "text": truncated_summary(&record.summary)},
        }),
    ];

    if let Some(app_url) = app_url.filter(|u| !u.is_empty()) {
        blocks.push(json!({"type": "divider"}));
        blocks.push(json!({
            "type": "actions",
            "elements": [{
                "type": "button",
                "text": {"type": "plain_text", "text": "📄 View full minutes", "emoji": true},
                "url": format!("{}/meetings/{}", app_url.trim_end_matches('/'), record.id),
                "action_id": "view_full_minutes",
            }],
        }));
    }

    json!({ "blocks": blocks })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meeting::MeetingStatus;

    fn record(summary: &str) -> MeetingRecord {
        MeetingRecord {
            id: 3,
            team_id: "t".to_string(),
            created_by: "dana".to_string(),
            title: "Retro".to_string(),
            meeting_at: "2026-08-07T15:00:00Z".to_string(),
            audio_path: None,
            audio_expires_at: None,
            status: MeetingStatus::Completed,
            error_message: String::new(),
            transcript: String::new(),
            raw_segments: vec![],
            corrected_transcript: String::new(),
            corrected_segments: vec![],
            summary: summary.to_string(),
            wiki_page_id: String::new(),
            wiki_page_url: String::new(),
            chat_message_ts: String::new(),
            chat_channel: String::new(),
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn test_message_has_header_and_summary() {
        let message = format_message(&record("- shipped the thing"), None);
        let blocks = message["blocks"].as_array().unwrap();

        assert_eq!(blocks[0]["type"], "header");
        assert!(blocks[0]["text"]["text"].as_str().unwrap().contains("Retro"));
        assert_eq!(blocks[3]["text"]["text"], "- shipped the thing");
        // No app URL, no button block.
        assert_eq!(blocks.len(), 4);
    }

    #[test]
    fn test_message_button_with_app_url() {
        let message = format_message(&record("x"), Some("https://minutes.example/"));
        let blocks = message["blocks"].as_array().unwrap();

        let button = &blocks.last().unwrap()["elements"][0];
        assert_eq!(button["url"], "https://minutes.example/meetings/3");
    }

    #[test]
    fn test_summary_truncation() {
        let long = "x".repeat(SUMMARY_LIMIT + 100);
        let truncated = truncated_summary(&long);
        assert!(truncated.len() < long.len());
        assert!(truncated.ends_with("(truncated)"));

        assert_eq!(truncated_summary("short"), "short");
        assert_eq!(truncated_summary(""), "No summary");
    }

    #[test]
    fn test_unconfigured_connector_rejected() {
        let config = ChatConfig::default();
        assert!(ChatConnector::new(&config, Duration::from_secs(5)).is_err());
    }

    #[test]
    fn test_is_published_reads_channel_ref() {
        let config = ChatConfig {
            webhook_url: Some("https://hooks.example/abc".to_string()),
            ..Default::default()
        };
        let connector = ChatConnector::new(&config, Duration::from_secs(5)).unwrap();

        let mut r = record("x");
        assert!(!connector.is_published(&r));
        r.chat_channel = "webhook".to_string();
        assert!(connector.is_published(&r));
    }
}
