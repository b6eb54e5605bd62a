use crate::global;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub providers: ProvidersConfig,
    pub audio: AudioConfig,
    pub text: TextConfig,
    pub pipeline: PipelineConfig,
    pub retention: RetentionConfig,
    pub publish: PublishConfig,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 4270 }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub transcription: TranscriptionProviderConfig,
    pub llm: LlmProviderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionProviderConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub language: String,
    /// Provider upload size ceiling in megabytes. The chunk planner keeps
    /// every chunk at or under this.
    pub max_upload_mb: u64,
}

impl Default for TranscriptionProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-transcribe-diarize".to_string(),
            language: "en".to_string(),
            max_upload_mb: 25,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmProviderConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
}

impl Default for LlmProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Files at or under this size (MB) skip compression entirely.
    pub compress_threshold_mb: u64,
    /// Target duration per transcription chunk, in seconds.
    pub segment_seconds: u64,
    /// Largest accepted upload, in megabytes.
    pub max_upload_mb: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            compress_threshold_mb: 10,
            segment_seconds: 20 * 60,
            max_upload_mb: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TextConfig {
    /// Input ceiling for the refinement/summarization providers, in chars.
    /// Oversize transcripts fail the attempt; no truncation is applied.
    pub max_input_chars: usize,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            max_input_chars: 200_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Concurrent pipeline/publish tasks across all meetings.
    pub workers: usize,
    /// Concurrent transcription calls within one meeting's chunk set.
    pub chunk_fanout: usize,
    /// Retry attempts for transient provider errors.
    pub max_retries: u32,
    /// First backoff delay; doubles per attempt.
    pub initial_backoff_secs: u64,
    /// Timeout applied to each external service call.
    pub request_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            chunk_fanout: 3,
            max_retries: 3,
            initial_backoff_secs: 2,
            request_timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Days an audio payload is kept before the sweep may delete it.
    pub audio_retention_days: i64,
    /// Hours between retention sweeps.
    pub sweep_interval_hours: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            audio_retention_days: 90,
            sweep_interval_hours: 24,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    pub wiki: WikiConfig,
    pub chat: ChatConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WikiConfig {
    pub site_url: String,
    pub user_email: String,
    pub api_token: String,
    pub space_key: String,
    pub parent_page_id: Option<String>,
}

impl WikiConfig {
    pub fn is_configured(&self) -> bool {
        !self.site_url.is_empty()
            && !self.user_email.is_empty()
            && !self.api_token.is_empty()
            && !self.space_key.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub webhook_url: Option<String>,
    pub bot_token: Option<String>,
    pub default_channel: Option<String>,
    /// Base URL of the web frontend; adds a "view full minutes" link when set.
    pub app_url: Option<String>,
}

impl ChatConfig {
    pub fn is_configured(&self) -> bool {
        self.webhook_url.is_some() || self.bot_token.is_some()
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if !config_path.exists() {
            info!(
                "Config file not found, creating default at {:?}",
                config_path
            );
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;

        let config: Self = toml::from_str(&content).context("Failed to parse config file")?;

        info!("Loaded config from {:?}", config_path);
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, content).context("Failed to write config file")?;

        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        global::config_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_roundtrip_through_toml() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml).unwrap();

        assert_eq!(parsed.retention.audio_retention_days, 90);
        assert_eq!(parsed.providers.transcription.max_upload_mb, 25);
        assert_eq!(parsed.audio.segment_seconds, 1200);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let parsed: Config = toml::from_str(
            r#"
            [retention]
            audio_retention_days = 30
            "#,
        )
        .unwrap();

        assert_eq!(parsed.retention.audio_retention_days, 30);
        assert_eq!(parsed.retention.sweep_interval_hours, 24);
        assert_eq!(parsed.pipeline.max_retries, 3);
    }

    #[test]
    fn test_wiki_config_requires_all_fields() {
        let mut wiki = WikiConfig::default();
        assert!(!wiki.is_configured());

        wiki.site_url = "https://example.atlassian.net".to_string();
        wiki.user_email = "bot@example.com".to_string();
        wiki.api_token = "token".to_string();
        assert!(!wiki.is_configured());

        wiki.space_key = "MEET".to_string();
        assert!(wiki.is_configured());
    }
}
