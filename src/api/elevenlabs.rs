use crate::audio::VoiceProvider;
use crate::config::Config;
use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

const PROVIDER: &str = "elevenlabs";

pub struct ElevenLabsVoice {
    client: Client,
    api_key: String,
    voice_id: String,
    model_id: String,
    timeout: Duration,
}

impl ElevenLabsVoice {
    pub fn new(client: Client, cfg: &Config) -> Self {
        Self {
            client,
            api_key: cfg.elevenlabs_key.clone(),
            voice_id: cfg.eleven_voice_id.clone(),
            model_id: cfg.eleven_model_id.clone(),
            timeout: Duration::from_secs(cfg.timeouts.tts_secs),
        }
    }
}

pub async fn elevenlabs_tts_to_mp3(
    client: &Client,
    api_key: &str,
    voice_id: &str,
    model_id: &str,
    text: &str,
    out_mp3_path: &Path,
    timeout: Duration,
) -> Result<()> {
    let url = format!(
        "https://api.elevenlabs.io/v1/text-to-speech/{}?output_format=mp3_44100_128",
        voice_id
    );

    let body = serde_json::json!({
        "text": text,
        "model_id": model_id,
    });

    let resp = client
        .post(url)
        .header("Content-Type", "application/json")
        .header("xi-api-key", api_key)
        .json(&body)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| PipelineError::tts(PROVIDER, format!("request failed: {e}")))?;

    if !resp.status().is_success() {
        return Err(PipelineError::tts(
            PROVIDER,
            format!("HTTP {}", resp.status().as_u16()),
        ));
    }

    let bytes = resp
        .bytes()
        .await
        .map_err(|e| PipelineError::tts(PROVIDER, format!("response read failed: {e}")))?;
    if bytes.is_empty() {
        return Err(PipelineError::tts(PROVIDER, "empty audio body"));
    }
    if let Some(parent) = out_mp3_path.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::write(out_mp3_path, &bytes).await?;
    Ok(())
}

#[async_trait]
impl VoiceProvider for ElevenLabsVoice {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn synthesize(&self, text: &str, out_dir: &Path, stem: &str) -> Result<PathBuf> {
        if self.api_key.is_empty() {
            return Err(PipelineError::tts(PROVIDER, "API key not configured"));
        }
        let out = out_dir.join(format!("{stem}.mp3"));
        elevenlabs_tts_to_mp3(
            &self.client,
            &self.api_key,
            &self.voice_id,
            &self.model_id,
            text,
            &out,
            self.timeout,
        )
        .await?;
        Ok(out)
    }
}
