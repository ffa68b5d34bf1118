//! End-to-end job: topic in, narrated video out.
//!
//! Stages run in order: script, synthesis, reconciliation, compilation, render, assembly.
//! Scratch files live in a per-job temporary directory that is removed when the job ends,
//! whether it succeeded or not. Artifacts worth keeping are written to the job's directory
//! in the [`JobStore`].

use crate::api::elevenlabs::ElevenLabsVoice;
use crate::api::local_tts::LocalVoice;
use crate::api::openai;
use crate::audio::{AudioToolkit, FfmpegToolkit, SILENCE_FLOOR_SECS, Synthesizer, VoiceProvider};
use crate::config::Config;
use crate::error::Result;
use crate::ffmpeg;
use crate::reconcile::{DurationReport, reconcile};
use crate::render::{self, Quality, RenderJob};
use crate::scene::{self, model::SCENE_NAME};
use crate::script::{self, Script};
use crate::storage::{self, JobDir, JobStore};
use crate::{logi, logok, logw};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::fs;
use tracing::Instrument;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    pub prompt: String,
    #[serde(default)]
    pub quality: Quality,
}

#[derive(Debug)]
pub struct JobOutput {
    pub job: JobDir,
    pub video_path: PathBuf,
    pub report: DurationReport,
}

/// Failed job, with the directory holding its error record.
#[derive(Debug)]
pub struct JobFailure {
    pub job: Option<JobDir>,
    pub error: crate::PipelineError,
}

pub struct Pipeline {
    cfg: Arc<Config>,
    client: Client,
    store: JobStore,
    work_root: PathBuf,
    voices: Option<Vec<Arc<dyn VoiceProvider>>>,
    toolkit: Option<Arc<dyn AudioToolkit>>,
}

impl Pipeline {
    pub fn new(cfg: Arc<Config>, client: Client) -> Self {
        let store = JobStore::new(cfg.output_dir.clone());
        Self {
            cfg,
            client,
            store,
            work_root: std::env::temp_dir(),
            voices: None,
            toolkit: None,
        }
    }

    /// Places per-job scratch directories under `root` instead of the system temp dir.
    pub fn with_work_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.work_root = root.into();
        self
    }

    /// Replaces the configured voice tiers; an empty list goes straight to silence.
    pub fn with_voices(mut self, voices: Vec<Arc<dyn VoiceProvider>>) -> Self {
        self.voices = Some(voices);
        self
    }

    /// Replaces the ffmpeg-backed silence and probe toolkit.
    pub fn with_toolkit(mut self, toolkit: Arc<dyn AudioToolkit>) -> Self {
        self.toolkit = Some(toolkit);
        self
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    fn voice_providers(&self) -> Vec<Arc<dyn VoiceProvider>> {
        if let Some(voices) = &self.voices {
            return voices.clone();
        }
        let mut providers: Vec<Arc<dyn VoiceProvider>> = Vec::new();
        if self.cfg.elevenlabs_key.is_empty() {
            logw("ElevenLabs key not configured; narration starts at the local voice tier");
        } else {
            providers.push(Arc::new(ElevenLabsVoice::new(self.client.clone(), &self.cfg)));
        }
        providers.push(Arc::new(LocalVoice::new(&self.cfg)));
        providers
    }

    async fn script_for(&self, topic: &str) -> Script {
        let raw = match openai::openai_generate_script(&self.client, &self.cfg, topic).await {
            Ok(raw) => raw,
            Err(err) => {
                logw(format!("Script generation failed: {err}"));
                None
            }
        };
        script::normalize_or_fallback(raw.as_ref(), topic)
    }

    pub async fn run(&self, request: &JobRequest) -> std::result::Result<JobOutput, JobFailure> {
        let job = match self.store.create().await {
            Ok(job) => job,
            Err(error) => return Err(JobFailure { job: None, error }),
        };
        logi(format!("Job {} started: {:?}", job.id, request.prompt));
        let started = Instant::now();

        let outcome = match self.scratch_dir().await {
            Ok(work) => {
                let outcome = self
                    .run_stages(&job, request, work.path())
                    .instrument(tracing::info_span!("job", id = %job.id))
                    .await;
                if let Err(err) = work.close() {
                    logw(format!("Failed to remove scratch directory: {err}"));
                }
                outcome
            }
            Err(err) => Err(err),
        };

        match outcome {
            Ok((video_path, report)) => {
                logok(format!(
                    "Job {} finished in {:.1}s: {}",
                    job.id,
                    started.elapsed().as_secs_f64(),
                    video_path.display()
                ));
                Ok(JobOutput {
                    job,
                    video_path,
                    report,
                })
            }
            Err(error) => {
                logw(format!("Job {} failed: {} ({})", job.id, error, error.kind()));
                if let Err(write_err) = job.write_error(&error).await {
                    logw(format!("Failed to write error record: {write_err}"));
                }
                Err(JobFailure {
                    job: Some(job),
                    error,
                })
            }
        }
    }

    async fn scratch_dir(&self) -> Result<tempfile::TempDir> {
        fs::create_dir_all(&self.work_root).await?;
        Ok(tempfile::Builder::new()
            .prefix("math-explainer-")
            .tempdir_in(&self.work_root)?)
    }

    async fn run_stages(
        &self,
        job: &JobDir,
        request: &JobRequest,
        work: &Path,
    ) -> Result<(PathBuf, DurationReport)> {
        let cfg = &self.cfg;
        let media_timeout = Duration::from_secs(cfg.timeouts.media_secs);
        job.write_json(storage::REQUEST_FILE, request).await?;

        let script = self.script_for(&request.prompt).await;
        job.write_json(storage::SCRIPT_FILE, &script).await?;
        logi(format!(
            "Script {:?}: {} segments, {:.1}s planned",
            script.title,
            script.segments.len(),
            script.total_planned_duration()
        ));

        let audio_dir = work.join("audio");
        fs::create_dir_all(&audio_dir).await?;
        let toolkit: Arc<dyn AudioToolkit> = match &self.toolkit {
            Some(toolkit) => Arc::clone(toolkit),
            None => Arc::new(FfmpegToolkit::new(
                Duration::from_secs(cfg.timeouts.probe_secs),
                media_timeout,
            )),
        };
        let synthesizer = Synthesizer::new(
            self.voice_providers(),
            toolkit,
            cfg.pacing.clone(),
            cfg.max_workers,
        )
        .with_planned_silence(SILENCE_FLOOR_SECS);
        let results = synthesizer.synthesize(&script.segments, &audio_dir).await?;

        let (segments, report) = reconcile(script.segments, &results);
        job.write_json(storage::DURATIONS_FILE, &report).await?;

        let program = scene::compile(&segments, &cfg.pacing);
        scene::validate(&program)?;
        let program_path = job.write_json(storage::SCENE_FILE, &program).await?;
        logi(format!(
            "Scene program: {} instructions, {:.1}s",
            program.instructions.len(),
            program.total_seconds()
        ));

        let media_dir = work.join("media");
        let log_path = job.path(storage::RENDER_LOG_FILE);
        let rendered = render::render(
            &cfg.renderer_bin,
            &RenderJob {
                program_path: &program_path,
                scene_name: SCENE_NAME,
                quality: request.quality,
                media_dir: &media_dir,
                log_path: &log_path,
            },
            Duration::from_secs(cfg.timeouts.render_secs),
        )
        .await?;
        let silent = job.path(storage::SILENT_VIDEO_FILE);
        fs::copy(&rendered, &silent).await?;

        let audio_paths: Vec<PathBuf> = results.iter().map(|r| r.audio_path.clone()).collect();
        let narration = job.path(storage::AUDIO_FILE);
        ffmpeg::ffmpeg_concat_audio(
            &audio_paths,
            &work.join("concat.txt"),
            &narration,
            media_timeout,
        )
        .await?;

        let final_path = job.final_video_path();
        ffmpeg::ffmpeg_mux(&silent, &narration, &final_path, media_timeout).await?;
        Ok((final_path, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// Writes a few bytes for silence and reports a fixed length for any file.
    struct StubToolkit;

    #[async_trait]
    impl AudioToolkit for StubToolkit {
        async fn silence(&self, seconds: f64, out: &Path) -> Result<()> {
            fs::write(out, format!("silence {seconds}")).await?;
            Ok(())
        }

        async fn probe_duration(&self, _path: &Path) -> Result<f64> {
            Ok(5.0)
        }
    }

    fn pipeline(out: &Path, scratch: &Path, renderer_bin: &str) -> Pipeline {
        let cfg = Config {
            openai_key: String::new(),
            elevenlabs_key: String::new(),
            renderer_bin: renderer_bin.to_string(),
            output_dir: out.to_path_buf(),
            ..Config::default()
        };
        Pipeline::new(Arc::new(cfg), Client::new())
            .with_work_root(scratch)
            .with_voices(Vec::new())
            .with_toolkit(Arc::new(StubToolkit))
    }

    fn request() -> JobRequest {
        JobRequest {
            prompt: "Solve 2x+5=9".to_string(),
            quality: Quality::Low,
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn renderer_failure_is_recorded_and_scratch_removed() {
        let out = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();

        let failure = pipeline(out.path(), scratch.path(), "false")
            .run(&request())
            .await
            .unwrap_err();

        assert_eq!(failure.error.kind(), "RenderError");
        assert!(failure.error.to_string().contains(storage::RENDER_LOG_FILE));
        let job = failure.job.unwrap();
        for name in [
            storage::ERROR_FILE,
            storage::SCRIPT_FILE,
            storage::REQUEST_FILE,
            storage::SCENE_FILE,
            storage::DURATIONS_FILE,
            storage::RENDER_LOG_FILE,
        ] {
            assert!(job.path(name).exists(), "{name} missing");
        }
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn missing_renderer_is_render_error() {
        let out = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();

        let failure = pipeline(out.path(), scratch.path(), "definitely-not-a-renderer-xyz")
            .run(&request())
            .await
            .unwrap_err();

        assert_eq!(failure.error.kind(), "RenderError");
        let record = failure.job.unwrap().diagnose().await.unwrap();
        assert_eq!(record.status, "failed");
        let durations = record.durations.unwrap();
        assert_eq!(durations.total_actual, 10.0);
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }
}
