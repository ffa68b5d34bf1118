//! Audio synthesizer: per-segment narration with a tiered fallback (voice providers in
//! order, then generated silence), executed on a bounded worker pool.

use crate::config::Pacing;
use crate::error::{PipelineError, Result};
use crate::ffmpeg;
use crate::script::Segment;
use crate::{logi, logw};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;

/// Last-resort duration when neither measurement nor plan is usable.
pub const GUARD_DURATION_SECS: f64 = 4.0;
/// Floor applied to the planned duration when sizing fallback silence.
pub const SILENCE_FLOOR_SECS: f64 = 3.0;

#[async_trait]
pub trait VoiceProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Renders `text` into an audio file under `out_dir` and returns its path.
    async fn synthesize(&self, text: &str, out_dir: &Path, stem: &str) -> Result<PathBuf>;
}

#[async_trait]
pub trait AudioToolkit: Send + Sync {
    async fn silence(&self, seconds: f64, out: &Path) -> Result<()>;

    async fn probe_duration(&self, path: &Path) -> Result<f64>;
}

pub struct FfmpegToolkit {
    probe_timeout: Duration,
    media_timeout: Duration,
}

impl FfmpegToolkit {
    pub fn new(probe_timeout: Duration, media_timeout: Duration) -> Self {
        Self {
            probe_timeout,
            media_timeout,
        }
    }
}

#[async_trait]
impl AudioToolkit for FfmpegToolkit {
    async fn silence(&self, seconds: f64, out: &Path) -> Result<()> {
        ffmpeg::ffmpeg_silence(seconds, out, self.media_timeout).await
    }

    async fn probe_duration(&self, path: &Path) -> Result<f64> {
        ffmpeg::ffprobe_duration_seconds(path, self.probe_timeout).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tier", content = "provider", rename_all = "lowercase")]
pub enum AudioSource {
    Voice(String),
    Silence,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthResult {
    pub index: usize,
    pub audio_path: PathBuf,
    pub measured_duration: f64,
    pub source: AudioSource,
}

/// Silence length: the caller's explicit target, else a word-rate estimate clamped to the
/// configured range.
pub fn silence_duration(word_count: usize, target: Option<f64>, pacing: &Pacing) -> f64 {
    if let Some(t) = target.filter(|t| t.is_finite() && *t > 0.0) {
        return t;
    }
    let estimate = word_count as f64 / pacing.words_per_second;
    estimate.clamp(pacing.silence_min_secs, pacing.silence_max_secs)
}

fn guard_duration(measured: Option<f64>, planned: f64) -> f64 {
    match measured {
        Some(d) if d.is_finite() && d > 0.0 => d,
        _ if planned.is_finite() && planned > 0.0 => planned,
        _ => GUARD_DURATION_SECS,
    }
}

async fn usable_audio(path: &Path) -> bool {
    fs::metadata(path)
        .await
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}

pub struct Synthesizer {
    providers: Vec<Arc<dyn VoiceProvider>>,
    toolkit: Arc<dyn AudioToolkit>,
    pacing: Pacing,
    max_workers: usize,
    silence_floor: Option<f64>,
}

impl Synthesizer {
    pub fn new(
        providers: Vec<Arc<dyn VoiceProvider>>,
        toolkit: Arc<dyn AudioToolkit>,
        pacing: Pacing,
        max_workers: usize,
    ) -> Self {
        Self {
            providers,
            toolkit,
            pacing,
            max_workers: max_workers.max(1),
            silence_floor: None,
        }
    }

    /// Sizes fallback silence from the planned duration, never shorter than `floor`.
    pub fn with_planned_silence(mut self, floor: f64) -> Self {
        self.silence_floor = Some(floor);
        self
    }

    fn silence_target(&self, segment: &Segment) -> Option<f64> {
        self.silence_floor.map(|floor| floor.max(segment.duration))
    }

    /// Synthesizes every segment; `result[i]` always corresponds to `segments[i]`.
    pub async fn synthesize(&self, segments: &[Segment], work_dir: &Path) -> Result<Vec<SynthResult>> {
        if segments.is_empty() {
            return Ok(Vec::new());
        }
        let workers = self.max_workers.min(segments.len());
        logi(format!(
            "Synthesizing {} segments with {} workers",
            segments.len(),
            workers
        ));

        let completed: Vec<(usize, Result<SynthResult>)> = stream::iter(0..segments.len())
            .map(|slot| async move { (slot, self.synthesize_one(&segments[slot], work_dir).await) })
            .buffer_unordered(workers)
            .collect()
            .await;

        let mut ordered: Vec<Option<SynthResult>> = vec![None; segments.len()];
        for (slot, result) in completed {
            ordered[slot] = Some(result?);
        }

        ordered
            .into_iter()
            .enumerate()
            .map(|(slot, result)| {
                result.ok_or_else(|| PipelineError::AudioSynthesisFatal {
                    index: slot,
                    reason: "no result produced".to_string(),
                })
            })
            .collect()
    }

    async fn synthesize_one(&self, segment: &Segment, work_dir: &Path) -> Result<SynthResult> {
        let stem = format!("seg{}", segment.index);

        for provider in &self.providers {
            match provider.synthesize(&segment.narration, work_dir, &stem).await {
                Ok(path) => {
                    if usable_audio(&path).await {
                        let measured = self.measure(&path, segment.duration).await;
                        return Ok(SynthResult {
                            index: segment.index,
                            audio_path: path,
                            measured_duration: measured,
                            source: AudioSource::Voice(provider.name().to_string()),
                        });
                    }
                    logw(format!(
                        "Segment {}: {} produced empty audio at {}",
                        segment.index,
                        provider.name(),
                        path.display()
                    ));
                }
                Err(err) => logw(format!("Segment {}: {}", segment.index, err)),
            }
        }

        let seconds = silence_duration(
            segment.word_count(),
            self.silence_target(segment),
            &self.pacing,
        );
        let path = work_dir.join(format!("{stem}_silence.mp3"));
        logw(format!(
            "Segment {}: all voice tiers failed, writing {:.2}s of silence",
            segment.index, seconds
        ));
        self.toolkit
            .silence(seconds, &path)
            .await
            .map_err(|err| PipelineError::AudioSynthesisFatal {
                index: segment.index,
                reason: err.to_string(),
            })?;

        let measured = self.measure(&path, segment.duration).await;
        Ok(SynthResult {
            index: segment.index,
            audio_path: path,
            measured_duration: measured,
            source: AudioSource::Silence,
        })
    }

    async fn measure(&self, path: &Path, planned: f64) -> f64 {
        let measured = match self.toolkit.probe_duration(path).await {
            Ok(d) => Some(d),
            Err(err) => {
                logw(format!("Could not measure {}: {}", path.display(), err));
                None
            }
        };
        guard_duration(measured, planned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::fallback_script;
    use std::sync::Mutex;

    // Handlers hold this future across an await for any borrow lifetime.
    fn synthesize_is_send_for_any_lifetime<'a>(
        synth: &'a Synthesizer,
        segments: &'a [Segment],
        work_dir: &'a Path,
    ) -> impl std::future::Future<Output = Result<Vec<SynthResult>>> + Send + 'a {
        synth.synthesize(segments, work_dir)
    }

    #[tokio::test]
    async fn synthesize_future_is_send() {
        let dir = tempfile::tempdir().unwrap();
        let synth = Synthesizer::new(
            Vec::new(),
            Arc::new(FakeToolkit::new(false)),
            Pacing::default(),
            2,
        );
        let segs = fallback_script("t").segments;
        let work = dir.path().to_path_buf();
        let handle = tokio::spawn(async move {
            synthesize_is_send_for_any_lifetime(&synth, &segs, &work)
                .await
                .map(|results| results.len())
        });
        assert_eq!(handle.await.unwrap().unwrap(), 2);
    }

    /// Writes `dur=<seconds>` files; `probe_duration` reads them back.
    struct FakeToolkit {
        fail_silence: bool,
        silences: Mutex<Vec<f64>>,
    }

    impl FakeToolkit {
        fn new(fail_silence: bool) -> Self {
            Self {
                fail_silence,
                silences: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl AudioToolkit for FakeToolkit {
        async fn silence(&self, seconds: f64, out: &Path) -> Result<()> {
            if self.fail_silence {
                return Err(PipelineError::media("silence", "ffmpeg missing"));
            }
            self.silences.lock().unwrap().push(seconds);
            fs::write(out, format!("dur={seconds}")).await?;
            Ok(())
        }

        async fn probe_duration(&self, path: &Path) -> Result<f64> {
            let body = fs::read_to_string(path).await?;
            body.trim()
                .strip_prefix("dur=")
                .and_then(|d| d.parse().ok())
                .ok_or_else(|| PipelineError::media("probe", "unreadable"))
        }
    }

    /// Succeeds with a word-rate duration after a delay that shrinks with the index.
    struct SlowVoice;

    #[async_trait]
    impl VoiceProvider for SlowVoice {
        fn name(&self) -> &str {
            "slow"
        }

        async fn synthesize(&self, _text: &str, out_dir: &Path, stem: &str) -> Result<PathBuf> {
            let index: u64 = stem.trim_start_matches("seg").parse().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(40u64.saturating_sub(index * 5))).await;
            let out = out_dir.join(format!("{stem}.mp3"));
            fs::write(&out, format!("dur={}", 1.0 + index as f64)).await?;
            Ok(out)
        }
    }

    struct FailingVoice(&'static str);

    #[async_trait]
    impl VoiceProvider for FailingVoice {
        fn name(&self) -> &str {
            self.0
        }

        async fn synthesize(&self, _text: &str, _out_dir: &Path, _stem: &str) -> Result<PathBuf> {
            Err(PipelineError::tts(self.0, "HTTP 500"))
        }
    }

    struct EmptyVoice;

    #[async_trait]
    impl VoiceProvider for EmptyVoice {
        fn name(&self) -> &str {
            "empty"
        }

        async fn synthesize(&self, _text: &str, out_dir: &Path, stem: &str) -> Result<PathBuf> {
            let out = out_dir.join(format!("{stem}.mp3"));
            fs::write(&out, b"").await?;
            Ok(out)
        }
    }

    /// Writes audio the probe cannot measure.
    struct UnmeasurableVoice;

    #[async_trait]
    impl VoiceProvider for UnmeasurableVoice {
        fn name(&self) -> &str {
            "garbled"
        }

        async fn synthesize(&self, _text: &str, out_dir: &Path, stem: &str) -> Result<PathBuf> {
            let out = out_dir.join(format!("{stem}.mp3"));
            fs::write(&out, b"ID3garbage").await?;
            Ok(out)
        }
    }

    fn segments(n: usize) -> Vec<Segment> {
        let template = fallback_script("t").segments.remove(0);
        (0..n)
            .map(|i| Segment {
                index: i,
                duration: 5.0,
                ..template.clone()
            })
            .collect()
    }

    #[tokio::test]
    async fn results_keep_input_order_under_concurrency() {
        let dir = tempfile::tempdir().unwrap();
        let synth = Synthesizer::new(
            vec![Arc::new(SlowVoice)],
            Arc::new(FakeToolkit::new(false)),
            Pacing::default(),
            4,
        );
        let segs = segments(8);
        let results = synth.synthesize(&segs, dir.path()).await.unwrap();
        assert_eq!(results.len(), 8);
        for (i, r) in results.iter().enumerate() {
            assert_eq!(r.index, i);
            assert_eq!(r.measured_duration, 1.0 + i as f64);
            assert_eq!(r.source, AudioSource::Voice("slow".to_string()));
        }
    }

    #[tokio::test]
    async fn cascades_to_silence_sized_from_plan() {
        let dir = tempfile::tempdir().unwrap();
        let toolkit = Arc::new(FakeToolkit::new(false));
        let synth = Synthesizer::new(
            vec![Arc::new(FailingVoice("elevenlabs")), Arc::new(FailingVoice("local"))],
            toolkit.clone(),
            Pacing::default(),
            2,
        )
        .with_planned_silence(SILENCE_FLOOR_SECS);

        let mut segs = segments(2);
        segs[0].duration = 7.5;
        segs[1].duration = 1.0;
        let results = synth.synthesize(&segs, dir.path()).await.unwrap();

        assert_eq!(results[0].source, AudioSource::Silence);
        assert_eq!(results[0].measured_duration, 7.5);
        assert_eq!(results[1].measured_duration, 3.0);
        assert!(results[0].audio_path.exists());
    }

    #[tokio::test]
    async fn empty_primary_audio_falls_through() {
        let dir = tempfile::tempdir().unwrap();
        let synth = Synthesizer::new(
            vec![Arc::new(EmptyVoice), Arc::new(SlowVoice)],
            Arc::new(FakeToolkit::new(false)),
            Pacing::default(),
            1,
        );
        let results = synth.synthesize(&segments(1), dir.path()).await.unwrap();
        assert_eq!(results[0].source, AudioSource::Voice("slow".to_string()));
    }

    #[tokio::test]
    async fn unmeasurable_audio_uses_planned_duration() {
        let dir = tempfile::tempdir().unwrap();
        let synth = Synthesizer::new(
            vec![Arc::new(UnmeasurableVoice)],
            Arc::new(FakeToolkit::new(false)),
            Pacing::default(),
            1,
        );
        let mut segs = segments(2);
        segs[1].duration = 0.0;
        let results = synth.synthesize(&segs, dir.path()).await.unwrap();
        assert_eq!(results[0].measured_duration, 5.0);
        assert_eq!(results[1].measured_duration, GUARD_DURATION_SECS);
    }

    #[tokio::test]
    async fn silence_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let synth = Synthesizer::new(
            vec![Arc::new(FailingVoice("elevenlabs"))],
            Arc::new(FakeToolkit::new(true)),
            Pacing::default(),
            2,
        );
        let err = synth.synthesize(&segments(3), dir.path()).await.unwrap_err();
        assert_eq!(err.kind(), "AudioSynthesisFatal");
    }

    #[test]
    fn word_rate_silence_is_clamped() {
        let pacing = Pacing::default();
        assert_eq!(silence_duration(0, None, &pacing), 2.0);
        assert_eq!(silence_duration(15, None, &pacing), 6.0);
        assert_eq!(silence_duration(100, None, &pacing), 10.0);
        assert_eq!(silence_duration(100, Some(4.5), &pacing), 4.5);
        assert_eq!(silence_duration(15, Some(-1.0), &pacing), 6.0);
    }
}
