use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::audio::CaptureConfig;
use crate::session::SessionConfig;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub agent: AgentConfig,
    pub session: SessionConfig,
    pub artifacts: ArtifactsConfig,
    pub storage: StorageConfig,
    pub capture: CaptureSettings,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "voice-interview".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

/// Voice agent service endpoints and credentials
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// WebSocket base, e.g. `wss://api.elevenlabs.io`
    pub ws_url: String,
    /// REST base for conversation history
    pub api_url: String,
    pub agent_id: String,
    pub api_key: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            ws_url: "wss://api.elevenlabs.io".to_string(),
            api_url: "https://api.elevenlabs.io".to_string(),
            agent_id: String::new(),
            api_key: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ArtifactsConfig {
    /// Fetch final audio/transcript from the agent service after each interview
    pub enabled: bool,
    pub poll_attempts: u32,
    pub poll_interval_ms: u64,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_attempts: 10,
            poll_interval_ms: 2_000,
        }
    }
}

impl ArtifactsConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory interview artifacts are written below
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./interviews"),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    pub sample_rate: u32,
    pub channels: u16,
    pub frame_duration_ms: u64,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        let defaults = CaptureConfig::default();
        Self {
            sample_rate: defaults.sample_rate,
            channels: defaults.channels,
            frame_duration_ms: defaults.frame_duration_ms,
        }
    }
}

impl CaptureSettings {
    pub fn to_capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            sample_rate: self.sample_rate,
            channels: self.channels,
            frame_duration_ms: self.frame_duration_ms,
        }
    }
}

impl Config {
    /// Load `path` (any extension the `config` crate understands) plus
    /// `VOICE_INTERVIEW__SECTION__KEY` environment overrides
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("VOICE_INTERVIEW")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path))?;

        settings
            .try_deserialize()
            .context("Invalid configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = Config::load("does/not/exist/voice-interview").unwrap();
        assert_eq!(config.service.http.port, 3000);
        assert_eq!(config.session.response_timeout_ms, 30_000);
        assert_eq!(config.capture.sample_rate, 16_000);
        assert!(config.artifacts.enabled);
    }

    #[test]
    fn test_file_overrides_sections() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[service.http]
port = 8088

[agent]
agent_id = "agent_42"

[session]
response_timeout_ms = 15000

[session.reconnect]
max_attempts = 5

[session.dynamic_variables]
role = "Backend Engineer"
"#
        )
        .unwrap();

        let path = file.path().with_extension("");
        let config = Config::load(path.to_str().unwrap()).unwrap();

        assert_eq!(config.service.http.port, 8088);
        assert_eq!(config.service.http.bind, "127.0.0.1");
        assert_eq!(config.agent.agent_id, "agent_42");
        assert_eq!(config.session.response_timeout_ms, 15_000);
        assert_eq!(config.session.handshake_timeout_ms, 10_000);
        assert_eq!(config.session.reconnect.max_attempts, 5);
        assert_eq!(
            config.session.dynamic_variables.get("role").map(String::as_str),
            Some("Backend Engineer")
        );
    }
}
