use crate::error::{PipelineError, Result};
use crate::{logi, logok};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::fs;
use tokio::process::Command;
use walkdir::WalkDir;

const LOG_TAIL_CHARS: usize = 2000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    #[default]
    Low,
    Medium,
    High,
}

impl Quality {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "low" | "l" => Some(Quality::Low),
            "medium" | "m" => Some(Quality::Medium),
            "high" | "h" => Some(Quality::High),
            _ => None,
        }
    }

    pub fn flag(self) -> &'static str {
        match self {
            Quality::Low => "-ql",
            Quality::Medium => "-qm",
            Quality::High => "-qh",
        }
    }

    pub fn resolution(self) -> (u32, u32, u32) {
        match self {
            Quality::Low => (854, 480, 15),
            Quality::Medium => (1280, 720, 30),
            Quality::High => (1920, 1080, 60),
        }
    }

    /// Name of the directory the renderer writes this preset into.
    pub fn dir_name(self) -> &'static str {
        match self {
            Quality::Low => "480p15",
            Quality::Medium => "720p30",
            Quality::High => "1080p60",
        }
    }
}

/// A request to turn one serialized scene program into a silent video.
#[derive(Debug, Clone)]
pub struct RenderJob<'a> {
    pub program_path: &'a Path,
    pub scene_name: &'a str,
    pub quality: Quality,
    pub media_dir: &'a Path,
    pub log_path: &'a Path,
}

async fn log_tail(log_path: &Path) -> String {
    let text = fs::read_to_string(log_path).await.unwrap_or_default();
    let count = text.chars().count();
    text.chars().skip(count.saturating_sub(LOG_TAIL_CHARS)).collect()
}

async fn render_error(reason: impl Into<String>, log_path: &Path) -> PipelineError {
    PipelineError::Render {
        reason: reason.into(),
        log_path: log_path.to_path_buf(),
        log_tail: log_tail(log_path).await,
    }
}

/// Newest `.mp4` under `media_dir`, preferring files inside the preset's resolution directory.
pub fn find_rendered_video(media_dir: &Path, quality: Quality) -> Option<PathBuf> {
    let mut candidates: Vec<(bool, std::time::SystemTime, PathBuf)> = WalkDir::new(media_dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("mp4"))
        })
        .filter(|entry| entry.metadata().map(|m| m.len() > 0).unwrap_or(false))
        .map(|entry| {
            let in_preset = entry
                .path()
                .components()
                .any(|c| c.as_os_str() == quality.dir_name());
            let modified = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .unwrap_or(std::time::UNIX_EPOCH);
            (in_preset, modified, entry.into_path())
        })
        .collect();

    candidates.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
    candidates.pop().map(|(_, _, path)| path)
}

/// Runs `renderer_bin <flag> --media_dir <dir> <program> <scene>` with its combined output
/// written to `job.log_path`, then locates the produced video.
pub async fn render(renderer_bin: &str, job: &RenderJob<'_>, timeout: Duration) -> Result<PathBuf> {
    fs::create_dir_all(job.media_dir).await?;
    let log = std::fs::File::create(job.log_path)?;
    let log_err = log.try_clone()?;

    let (width, height, fps) = job.quality.resolution();
    logi(format!(
        "Rendering {} at {width}x{height}@{fps} with {renderer_bin}",
        job.program_path.display()
    ));

    let mut cmd = Command::new(renderer_bin);
    cmd.arg(job.quality.flag())
        .arg("--media_dir")
        .arg(job.media_dir)
        .arg(job.program_path)
        .arg(job.scene_name)
        .stdin(Stdio::null())
        .stdout(Stdio::from(log))
        .stderr(Stdio::from(log_err))
        .kill_on_drop(true);

    let status = match tokio::time::timeout(timeout, cmd.status()).await {
        Ok(Ok(status)) => status,
        Ok(Err(err)) => {
            return Err(render_error(format!("failed to spawn {renderer_bin}: {err}"), job.log_path).await);
        }
        Err(_) => {
            return Err(render_error(
                format!("timed out after {}s", timeout.as_secs()),
                job.log_path,
            )
            .await);
        }
    };

    if !status.success() {
        return Err(render_error(format!("renderer exited with {status}"), job.log_path).await);
    }

    match find_rendered_video(job.media_dir, job.quality) {
        Some(path) => {
            logok(format!("Rendered {}", path.display()));
            Ok(path)
        }
        None => Err(render_error("renderer produced no video", job.log_path).await),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_match_renderer_flags() {
        assert_eq!(Quality::default(), Quality::Low);
        assert_eq!(Quality::Low.flag(), "-ql");
        assert_eq!(Quality::High.resolution(), (1920, 1080, 60));
        assert_eq!(Quality::Medium.dir_name(), "720p30");
        assert_eq!(Quality::parse(" HIGH "), Some(Quality::High));
        assert_eq!(Quality::parse("ultra"), None);
    }

    #[test]
    fn finds_video_in_preset_dir() {
        let dir = tempfile::tempdir().unwrap();
        let other = dir.path().join("videos/scene/720p30");
        let preset = dir.path().join("videos/scene/480p15");
        std::fs::create_dir_all(&other).unwrap();
        std::fs::create_dir_all(&preset).unwrap();
        std::fs::write(other.join("MathScene.mp4"), b"x").unwrap();
        std::fs::write(preset.join("MathScene.mp4"), b"x").unwrap();
        std::fs::write(preset.join("partial.mp4"), b"").unwrap();

        let found = find_rendered_video(dir.path(), Quality::Low).unwrap();
        assert_eq!(found, preset.join("MathScene.mp4"));
        assert!(find_rendered_video(&dir.path().join("missing"), Quality::Low).is_none());
    }

    #[tokio::test]
    async fn missing_renderer_is_render_error_with_log_path() {
        let dir = tempfile::tempdir().unwrap();
        let program = dir.path().join("scene.json");
        let log = dir.path().join("render.log");
        std::fs::write(&program, "{}").unwrap();
        let job = RenderJob {
            program_path: &program,
            scene_name: "MathScene",
            quality: Quality::Low,
            media_dir: &dir.path().join("media"),
            log_path: &log,
        };
        let err = render("definitely-not-a-renderer-xyz", &job, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "RenderError");
        assert!(err.to_string().contains("render.log"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn nonzero_exit_is_render_error() {
        let dir = tempfile::tempdir().unwrap();
        let program = dir.path().join("scene.json");
        let log = dir.path().join("render.log");
        std::fs::write(&program, "{}").unwrap();
        let job = RenderJob {
            program_path: &program,
            scene_name: "MathScene",
            quality: Quality::Low,
            media_dir: &dir.path().join("media"),
            log_path: &log,
        };
        let err = render("false", &job, Duration::from_secs(5)).await.unwrap_err();
        match err {
            PipelineError::Render { log_path, .. } => assert_eq!(log_path, log),
            other => panic!("unexpected {other:?}"),
        }
    }
}
