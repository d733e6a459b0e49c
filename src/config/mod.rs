use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::transcribe::ApiKey;
use crate::utils::validate_and_normalize_url;

/// Placeholder substituted with the video id in `platform.metadata_url`
pub const VIDEO_ID_PLACEHOLDER: &str = "{video_id}";

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_2 like Mac OS X) \
AppleWebKit/605.1.15 (KHTML, like Gecko) EdgiOS/121.0.2277.107 Version/17.0 Mobile/15E148 Safari/604.1";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP listener settings
    pub server: ServerConfig,

    /// Share link and metadata endpoint rules
    pub platform: PlatformConfig,

    /// Media download limits
    pub audio: AudioConfig,

    /// Speech-recognition provider
    pub transcription: TranscriptionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// Regular expression matching a share link inside free-form text
    pub share_link_pattern: String,

    /// Metadata page or endpoint, with `{video_id}` substituted
    pub metadata_url: String,

    /// User-Agent sent to the platform; default agents are rejected
    pub user_agent: String,

    /// Ordered rewrites turning a watermarked play URL into a clean one
    pub watermark_rules: Vec<RewriteRule>,

    /// Maximum redirect hops followed when resolving a share link
    pub max_redirects: usize,

    pub request_timeout_secs: u64,

    pub connect_timeout_secs: u64,
}

/// A literal find/replace applied to play URLs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteRule {
    pub find: String,
    pub replace: String,
}

impl RewriteRule {
    pub fn new(find: impl Into<String>, replace: impl Into<String>) -> Self {
        Self {
            find: find.into(),
            replace: replace.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Download ceiling in bytes; larger media is rejected, never truncated
    pub max_bytes: u64,

    pub download_timeout_secs: u64,

    /// Demux the audio track of video containers with ffmpeg
    pub extract_audio: bool,

    pub ffmpeg_path: String,

    /// Deadline for one ffmpeg run
    pub demux_timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptionProvider {
    /// Alibaba Cloud DashScope file transcription (paraformer models)
    Dashscope,
    /// Any service exposing `/v1/audio/transcriptions`
    OpenaiCompatible,
}

impl std::fmt::Display for TranscriptionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TranscriptionProvider::Dashscope => write!(f, "dashscope"),
            TranscriptionProvider::OpenaiCompatible => write!(f, "openai_compatible"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    pub provider: TranscriptionProvider,

    /// Provider base URL, without a trailing path
    pub base_url: String,

    /// Model used when a caller does not name one
    pub default_model: String,

    /// Inline API key; takes precedence over `api_key_env`
    pub api_key: Option<String>,

    /// Environment variable read at call time when no inline key is set
    pub api_key_env: String,

    /// Language hints forwarded to providers that accept them
    pub language_hints: Vec<String>,

    /// Deadline for the whole recognition call
    pub timeout_secs: u64,

    pub poll_interval_ms: u64,

    pub max_poll_interval_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            share_link_pattern: r"https?://v\.douyin\.com/[A-Za-z0-9_\-]+/?".to_string(),
            metadata_url: "https://www.iesdouyin.com/share/video/{video_id}".to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            watermark_rules: vec![RewriteRule::new("playwm", "play")],
            max_redirects: 5,
            request_timeout_secs: 15,
            connect_timeout_secs: 10,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            max_bytes: 100 * 1024 * 1024,
            download_timeout_secs: 120,
            extract_audio: true,
            ffmpeg_path: "ffmpeg".to_string(),
            demux_timeout_secs: 120,
        }
    }
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            provider: TranscriptionProvider::Dashscope,
            base_url: "https://dashscope.aliyuncs.com".to_string(),
            default_model: "paraformer-v2".to_string(),
            api_key: None,
            api_key_env: "DASHSCOPE_API_KEY".to_string(),
            language_hints: vec!["zh".to_string(), "en".to_string()],
            timeout_secs: 300,
            poll_interval_ms: 1000,
            max_poll_interval_ms: 10_000,
        }
    }
}

impl TranscriptionConfig {
    /// Resolve the provider credential.
    ///
    /// Read at call time so a key exported after startup is picked up; blank values count as
    /// missing.
    pub fn resolve_api_key(&self) -> Option<ApiKey> {
        let non_blank = |key: &str| {
            let key = key.trim();
            (!key.is_empty()).then(|| key.to_string())
        };

        self.api_key
            .as_deref()
            .and_then(non_blank)
            .or_else(|| {
                std::env::var(&self.api_key_env)
                    .ok()
                    .as_deref()
                    .and_then(non_blank)
            })
            .map(ApiKey::new)
    }
}

impl Config {
    /// Load configuration from file (if any) and apply environment overrides
    pub fn load() -> Result<Self> {
        let mut config = match Self::config_path() {
            Some(path) if path.exists() => {
                tracing::debug!("Loading configuration from {}", path.display());
                Self::from_file(&path)?
            }
            _ => Self::default(),
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML configuration file
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = fs_err::read_to_string(path).context("Failed to read config file")?;

        let config: Config =
            serde_yaml::from_str(&content).context("Failed to parse config file")?;

        Ok(config)
    }

    /// Apply `PORT` and `HOST` from the process environment
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(port) = std::env::var("PORT") {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid PORT value: {}", port))?;
        }

        if let Ok(host) = std::env::var("HOST") {
            if !host.trim().is_empty() {
                self.server.host = host.trim().to_string();
            }
        }

        Ok(())
    }

    /// Get configuration file path
    pub fn config_path() -> Option<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Some(local_config);
        }

        dirs::config_dir().map(|dir| dir.join("douyin-mcp").join("config.yaml"))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port cannot be 0");
        }

        if self.platform.share_link_pattern.trim().is_empty() {
            anyhow::bail!("platform.share_link_pattern must not be empty");
        }

        Regex::new(&self.platform.share_link_pattern)
            .context("platform.share_link_pattern is not a valid regular expression")?;

        if !self.platform.metadata_url.contains(VIDEO_ID_PLACEHOLDER) {
            anyhow::bail!(
                "platform.metadata_url must contain the {} placeholder",
                VIDEO_ID_PLACEHOLDER
            );
        }

        validate_and_normalize_url(&self.platform.metadata_url.replace(VIDEO_ID_PLACEHOLDER, "0"))
            .context("platform.metadata_url is not a valid URL")?;

        validate_and_normalize_url(&self.transcription.base_url)
            .context("transcription.base_url is not a valid URL")?;

        if self.platform.max_redirects == 0 {
            anyhow::bail!("platform.max_redirects must be at least 1");
        }

        if self.audio.max_bytes == 0 {
            anyhow::bail!("audio.max_bytes must be greater than 0");
        }

        if self.platform.request_timeout_secs == 0
            || self.audio.download_timeout_secs == 0
            || self.audio.demux_timeout_secs == 0
            || self.transcription.timeout_secs == 0
        {
            anyhow::bail!("Timeouts must be greater than 0");
        }

        Ok(())
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!("  Listen: {}:{}", self.server.host, self.server.port);
        println!("  Share Link Pattern: {}", self.platform.share_link_pattern);
        println!("  Metadata URL: {}", self.platform.metadata_url);
        for rule in &self.platform.watermark_rules {
            println!("  Watermark Rule: {} -> {}", rule.find, rule.replace);
        }
        println!("  Max Redirects: {}", self.platform.max_redirects);
        println!(
            "  Max Media Size: {}",
            crate::utils::format_file_size(self.audio.max_bytes)
        );
        println!("  Extract Audio: {}", self.audio.extract_audio);
        println!("  Provider: {}", self.transcription.provider);
        println!("  Provider URL: {}", self.transcription.base_url);
        println!("  Default Model: {}", self.transcription.default_model);
        let key_state = if self.transcription.resolve_api_key().is_some() {
            "configured"
        } else {
            "missing"
        };
        println!(
            "  API Key ({}): {}",
            self.transcription.api_key_env, key_state
        );
        if let Some(path) = Self::config_path() {
            println!("  Config File: {}", path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.transcription.default_model, "paraformer-v2");
        assert_eq!(
            config.platform.watermark_rules,
            vec![RewriteRule::new("playwm", "play")]
        );
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = "server:\n  port: 9100\naudio:\n  extract_audio: false\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.host, "0.0.0.0");
        assert!(!config.audio.extract_audio);
        assert_eq!(config.platform.max_redirects, 5);
    }

    #[test]
    fn test_provider_from_yaml() {
        let yaml = "transcription:\n  provider: openai_compatible\n  base_url: http://localhost:9000\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            config.transcription.provider,
            TranscriptionProvider::OpenaiCompatible
        );
    }

    #[test]
    fn test_validation_rejects_bad_pattern() {
        let mut config = Config::default();
        config.platform.share_link_pattern = "https?://(".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_requires_placeholder() {
        let mut config = Config::default();
        config.platform.metadata_url = "https://www.iesdouyin.com/share/video/".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_port() {
        let mut config = Config::default();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_inline_key_wins_and_blank_is_missing() {
        let mut transcription = TranscriptionConfig {
            api_key_env: "DOUYIN_MCP_TEST_NEVER_SET".to_string(),
            ..Default::default()
        };
        assert!(transcription.resolve_api_key().is_none());

        transcription.api_key = Some("   ".to_string());
        assert!(transcription.resolve_api_key().is_none());

        transcription.api_key = Some("sk-inline".to_string());
        assert_eq!(
            transcription.resolve_api_key().map(|k| k.expose().to_string()),
            Some("sk-inline".to_string())
        );
    }

    #[test]
    fn test_blank_inline_key_falls_back_to_env() {
        let transcription = TranscriptionConfig {
            api_key: Some("  ".to_string()),
            api_key_env: "DOUYIN_MCP_TEST_BLANK_INLINE_FALLBACK".to_string(),
            ..Default::default()
        };
        std::env::set_var("DOUYIN_MCP_TEST_BLANK_INLINE_FALLBACK", " sk-from-env ");

        assert_eq!(
            transcription.resolve_api_key().map(|k| k.expose().to_string()),
            Some("sk-from-env".to_string())
        );

        std::env::remove_var("DOUYIN_MCP_TEST_BLANK_INLINE_FALLBACK");
    }

    #[test]
    fn test_validation_rejects_zero_demux_timeout() {
        let mut config = Config::default();
        config.audio.demux_timeout_secs = 0;
        assert!(config.validate().is_err());
    }
}
