use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

pub const CONFIG_ENV: &str = "MATH_EXPLAINER_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "open_api_key", default)]
    pub openai_key: String,
    #[serde(default = "default_openai_model")]
    pub openai_model: String,
    #[serde(rename = "elevenlabs_api_key", default)]
    pub elevenlabs_key: String,
    #[serde(default = "default_voice_id")]
    pub eleven_voice_id: String,
    #[serde(default = "default_model_id")]
    pub eleven_model_id: String,
    #[serde(default = "default_local_tts_bin")]
    pub local_tts_bin: String,
    #[serde(default = "default_renderer_bin")]
    pub renderer_bin: String,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default)]
    pub timeouts: Timeouts,
    #[serde(default)]
    pub pacing: Pacing,
}

/// Subprocess and network deadlines, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub llm_secs: u64,
    pub tts_secs: u64,
    pub probe_secs: u64,
    pub media_secs: u64,
    pub render_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            llm_secs: 120,
            tts_secs: 60,
            probe_secs: 15,
            media_secs: 120,
            render_secs: 120,
        }
    }
}

/// Empirical pacing constants. Fractions apply to a segment's measured audio duration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pacing {
    pub write_fraction: f64,
    pub hold_fraction: f64,
    pub step_write_fraction: f64,
    pub step_hold_fraction: f64,
    pub title_write_fraction: f64,
    pub title_hold_fraction: f64,
    pub title_fade_out_secs: f64,
    pub header_write_fraction: f64,
    pub header_hold_fraction: f64,
    pub label_secs: f64,
    pub highlight_secs: f64,
    pub min_animation_secs: f64,
    pub words_per_second: f64,
    pub silence_min_secs: f64,
    pub silence_max_secs: f64,
    pub closing_hold_secs: f64,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            write_fraction: 0.7,
            hold_fraction: 0.3,
            step_write_fraction: 0.6,
            step_hold_fraction: 0.4,
            title_write_fraction: 0.5,
            title_hold_fraction: 0.3,
            title_fade_out_secs: 0.5,
            header_write_fraction: 0.4,
            header_hold_fraction: 0.6,
            label_secs: 0.5,
            highlight_secs: 0.5,
            min_animation_secs: 0.1,
            words_per_second: 2.5,
            silence_min_secs: 2.0,
            silence_max_secs: 10.0,
            closing_hold_secs: 2.0,
        }
    }
}

fn default_openai_model() -> String {
    "gpt-4o".to_string()
}

fn default_voice_id() -> String {
    "pNInz6obpgDQGcFmaJgB".to_string()
}

fn default_model_id() -> String {
    "eleven_turbo_v2".to_string()
}

fn default_local_tts_bin() -> String {
    "espeak-ng".to_string()
}

fn default_renderer_bin() -> String {
    "manim-json".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("generated_videos")
}

fn default_bind_addr() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_max_workers() -> usize {
    4
}

impl Default for Config {
    fn default() -> Self {
        Self {
            openai_key: String::new(),
            openai_model: default_openai_model(),
            elevenlabs_key: String::new(),
            eleven_voice_id: default_voice_id(),
            eleven_model_id: default_model_id(),
            local_tts_bin: default_local_tts_bin(),
            renderer_bin: default_renderer_bin(),
            output_dir: default_output_dir(),
            bind_addr: default_bind_addr(),
            max_workers: default_max_workers(),
            timeouts: Timeouts::default(),
            pacing: Pacing::default(),
        }
    }
}

impl Config {
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read config: {}", path.as_ref().display()))?;
        let mut config = Self::from_json(&content)?;
        config.apply_env();
        Ok(config)
    }

    /// Loads the file named by `MATH_EXPLAINER_CONFIG` (or `config.json`), falling back to
    /// defaults plus environment keys when the file is absent.
    pub async fn load_default() -> Result<Self> {
        let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        if fs::metadata(&path).await.is_ok() {
            return Self::load(&path).await;
        }
        let mut config = Self::default();
        config.apply_env();
        Ok(config)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(content).context("config.json: invalid JSON")?;
        if config.max_workers == 0 {
            anyhow::bail!("config.json: max_workers must be at least 1");
        }
        if config.pacing.words_per_second <= 0.0 {
            anyhow::bail!("config.json: pacing.words_per_second must be positive");
        }
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            if !key.is_empty() {
                self.openai_key = key;
            }
        }
        if let Ok(key) = std::env::var("ELEVENLABS_API_KEY") {
            if !key.is_empty() {
                self.elevenlabs_key = key;
            }
        }
    }
}
