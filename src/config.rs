//! Configuration loaded from `scenewright.toml`.
//!
//! Values missing from the file fall back to defaults. Environment variables
//! (including those from a `.env` file) take precedence over the file.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::llm::Provider;
use crate::orchestrator::PipelineSettings;
use crate::render::RenderQuality;
use crate::speech::{AudioFormat, VoiceSettings};

pub const CONFIG_FILE: &str = "scenewright.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ScenewrightConfig {
    /// Completion provider; selects the base URL and the API key variable.
    #[serde(default)]
    pub provider: Provider,

    #[serde(default = "default_model")]
    pub model: String,

    /// Completion API key.
    #[serde(default)]
    pub api_key: String,

    /// Overrides the provider's base URL (self-hosted gateways).
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default)]
    pub speech_api_key: String,

    #[serde(default = "default_voice")]
    pub voice: String,

    #[serde(default)]
    pub audio_format: AudioFormat,

    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Attempt budget for segmentation and for each scene's code generation.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Worker pool size. 0 means one per available execution unit.
    #[serde(default)]
    pub workers: usize,

    #[serde(default)]
    pub render_quality: RenderQuality,

    #[serde(default = "default_manim_binary")]
    pub manim_binary: String,

    #[serde(default)]
    pub timeouts: Timeouts,
}

/// Per-call timeouts in seconds.
#[derive(Debug, Clone, Deserialize)]
pub struct Timeouts {
    #[serde(default = "default_completion_secs")]
    pub completion_secs: u64,
    #[serde(default = "default_render_secs")]
    pub render_secs: u64,
    #[serde(default = "default_speech_secs")]
    pub speech_secs: u64,
    #[serde(default = "default_media_secs")]
    pub media_secs: u64,
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_voice() -> String {
    "lily".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("generated")
}

fn default_max_iterations() -> u32 {
    5
}

fn default_manim_binary() -> String {
    "manim".to_string()
}

fn default_completion_secs() -> u64 {
    120
}

fn default_render_secs() -> u64 {
    300
}

fn default_speech_secs() -> u64 {
    60
}

fn default_media_secs() -> u64 {
    120
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            completion_secs: default_completion_secs(),
            render_secs: default_render_secs(),
            speech_secs: default_speech_secs(),
            media_secs: default_media_secs(),
        }
    }
}

impl Default for ScenewrightConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            model: default_model(),
            api_key: String::new(),
            base_url: None,
            speech_api_key: String::new(),
            voice: default_voice(),
            audio_format: AudioFormat::default(),
            output_dir: default_output_dir(),
            max_iterations: default_max_iterations(),
            workers: 0,
            render_quality: RenderQuality::default(),
            manim_binary: default_manim_binary(),
            timeouts: Timeouts::default(),
        }
    }
}

impl ScenewrightConfig {
    /// Load `scenewright.toml` from the current directory, then apply the
    /// environment.
    pub fn load() -> Result<Self> {
        let mut config = Self::from_file(Path::new(CONFIG_FILE))?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parse `path`, or return defaults if it does not exist.
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))
    }

    /// Override fields from environment variables looked up through `var`.
    /// Empty values are ignored.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        let var = |key: &str| var(key).filter(|v| !v.trim().is_empty());

        if let Some(client) = var("LLM_CLIENT") {
            self.provider = Provider::from_env_value(&client);
        }
        if let Some(model) = var("LLM_MODEL") {
            self.model = model;
        }
        if let Some(key) = var(self.provider.key_var()) {
            self.api_key = key;
        }
        if let Some(key) = var("LMNT_API_KEY") {
            self.speech_api_key = key;
        }
    }

    pub fn completion_base_url(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| self.provider.base_url().to_string())
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            model: self.model.clone(),
            max_iterations: self.max_iterations.max(1),
            voice: VoiceSettings {
                voice: self.voice.clone(),
                format: self.audio_format,
            },
            completion_timeout: Duration::from_secs(self.timeouts.completion_secs),
            render_timeout: Duration::from_secs(self.timeouts.render_secs),
            speech_timeout: Duration::from_secs(self.timeouts.speech_secs),
        }
    }

    pub fn media_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.media_secs)
    }
}
