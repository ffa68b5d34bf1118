//! Secondary voice tier: a local speech engine (`espeak-ng` compatible CLI) that reads text
//! on stdin and writes WAV, converted to MP3 so it concatenates with the primary tier.

use crate::audio::VoiceProvider;
use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::ffmpeg;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

const PROVIDER: &str = "local";

pub struct LocalVoice {
    bin: String,
    timeout: Duration,
    convert_timeout: Duration,
}

impl LocalVoice {
    pub fn new(cfg: &Config) -> Self {
        Self {
            bin: cfg.local_tts_bin.clone(),
            timeout: Duration::from_secs(cfg.timeouts.tts_secs),
            convert_timeout: Duration::from_secs(cfg.timeouts.media_secs),
        }
    }

    async fn speak_to_wav(&self, text: &str, out_wav: &Path) -> Result<()> {
        let mut child = Command::new(&self.bin)
            .arg("--stdin")
            .arg("-w")
            .arg(out_wav)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PipelineError::tts(PROVIDER, format!("failed to spawn {}: {e}", self.bin)))?;

        if let Some(mut stdin) = child.stdin.take() {
            let feed = async {
                stdin.write_all(text.as_bytes()).await?;
                stdin.shutdown().await
            };
            // Engines that never drain stdin block this write.
            match tokio::time::timeout(self.timeout, feed).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    return Err(PipelineError::tts(PROVIDER, format!("writing text failed: {e}")));
                }
                Err(_) => return Err(PipelineError::tts(PROVIDER, "timed out writing text")),
            }
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| PipelineError::tts(PROVIDER, "timed out"))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::tts(
                PROVIDER,
                format!("{}: {}", output.status, stderr.trim()),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl VoiceProvider for LocalVoice {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn synthesize(&self, text: &str, out_dir: &Path, stem: &str) -> Result<PathBuf> {
        let wav = out_dir.join(format!("{stem}_local.wav"));
        let mp3 = out_dir.join(format!("{stem}_local.mp3"));
        self.speak_to_wav(text, &wav).await?;
        ffmpeg::ffmpeg_convert_to_mp3(&wav, &mp3, self.convert_timeout)
            .await
            .map_err(|e| PipelineError::tts(PROVIDER, e.to_string()))?;
        tokio::fs::remove_file(&wav).await.ok();
        Ok(mp3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[tokio::test]
    async fn engine_that_ignores_stdin_times_out() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let engine = dir.path().join("stuck-engine");
        std::fs::write(&engine, "#!/bin/sh\nsleep 30\n").unwrap();
        std::fs::set_permissions(&engine, std::fs::Permissions::from_mode(0o755)).unwrap();

        let voice = LocalVoice {
            bin: engine.to_string_lossy().into_owned(),
            timeout: Duration::from_millis(300),
            convert_timeout: Duration::from_secs(5),
        };
        // Larger than a pipe buffer, so the write cannot finish without a reader.
        let text = "a".repeat(1 << 20);
        let started = std::time::Instant::now();
        let err = voice
            .speak_to_wav(&text, &dir.path().join("out.wav"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "TTSProviderError");
        assert!(err.to_string().contains("timed out"), "{err}");
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn missing_engine_is_provider_error() {
        let cfg = Config {
            local_tts_bin: "no-such-speech-engine-xyz".to_string(),
            ..Config::default()
        };
        let dir = tempfile::tempdir().unwrap();
        let err = LocalVoice::new(&cfg)
            .synthesize("hello", dir.path(), "seg0")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "TTSProviderError");
    }
}
