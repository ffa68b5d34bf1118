//! Per-request artifact directories under the configured output root.
//!
//! Each request gets `<output_dir>/<uuid>/` holding the request body, the normalized script,
//! the scene program, the render log, the duration report and the final video. A failed job
//! also gets `error.json`.

use crate::error::{PipelineError, Result};
use crate::reconcile::DurationReport;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

pub const REQUEST_FILE: &str = "request.json";
pub const SCRIPT_FILE: &str = "script.json";
pub const SCENE_FILE: &str = "scene.json";
pub const RENDER_LOG_FILE: &str = "render.log";
pub const DURATIONS_FILE: &str = "durations.json";
pub const AUDIO_FILE: &str = "narration.mp3";
pub const SILENT_VIDEO_FILE: &str = "silent.mp4";
pub const FINAL_VIDEO_FILE: &str = "final.mp4";
pub const ERROR_FILE: &str = "error.json";

const RENDER_LOG_PREVIEW_CHARS: usize = 4000;

#[derive(Debug, Clone)]
pub struct JobStore {
    root: PathBuf,
}

#[derive(Debug, Clone)]
pub struct JobDir {
    pub id: Uuid,
    pub dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub kind: String,
    pub message: String,
    /// Display of each error in the `source()` chain, outermost first.
    pub chain: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl ErrorRecord {
    pub fn from_error(err: &PipelineError) -> Self {
        let mut chain = vec![err.to_string()];
        let mut source = std::error::Error::source(err);
        while let Some(inner) = source {
            chain.push(inner.to_string());
            source = inner.source();
        }
        if let PipelineError::Render { log_tail, .. } = err {
            chain.push(format!("render log tail:\n{log_tail}"));
        }
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
            chain,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ArtifactSummary {
    pub id: Uuid,
    pub created: DateTime<Utc>,
    pub size_bytes: u64,
    pub has_video: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileInfo {
    pub name: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DebugArtifacts {
    pub id: Uuid,
    pub request: Option<Value>,
    pub script: Option<Value>,
    pub scene: Option<Value>,
    pub render_log: Option<String>,
    pub error: Option<ErrorRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Diagnostics {
    pub id: Uuid,
    pub status: &'static str,
    pub durations: Option<DurationReport>,
    pub files: Vec<FileInfo>,
    pub error: Option<ErrorRecord>,
}

async fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Option<T> {
    let text = fs::read_to_string(path).await.ok()?;
    serde_json::from_str(&text).ok()
}

fn head(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

impl JobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub async fn create(&self) -> Result<JobDir> {
        let id = Uuid::new_v4();
        let dir = self.root.join(id.to_string());
        fs::create_dir_all(&dir).await?;
        Ok(JobDir { id, dir })
    }

    /// Opens an existing job. Ids that are not UUIDs never touch the filesystem.
    pub async fn open(&self, id: &str) -> Option<JobDir> {
        let id = Uuid::parse_str(id).ok()?;
        let dir = self.root.join(id.to_string());
        let meta = fs::metadata(&dir).await.ok()?;
        meta.is_dir().then_some(JobDir { id, dir })
    }

    /// Most recent jobs, newest first.
    pub async fn recent(&self, limit: usize) -> Result<Vec<ArtifactSummary>> {
        let mut out = Vec::new();
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(err) => return Err(err.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let Some(id) = entry.file_name().to_str().and_then(|n| Uuid::parse_str(n).ok()) else {
                continue;
            };
            let meta = entry.metadata().await?;
            if !meta.is_dir() {
                continue;
            }
            let created = meta.created().or_else(|_| meta.modified())?;
            let job = JobDir {
                id,
                dir: entry.path(),
            };
            let video = fs::metadata(job.final_video_path()).await.ok();
            out.push(ArtifactSummary {
                id,
                created: DateTime::<Utc>::from(created),
                size_bytes: video.as_ref().map(|m| m.len()).unwrap_or(0),
                has_video: video.is_some(),
            });
        }

        out.sort_by(|a, b| b.created.cmp(&a.created));
        out.truncate(limit);
        Ok(out)
    }
}

impl JobDir {
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    pub fn final_video_path(&self) -> PathBuf {
        self.path(FINAL_VIDEO_FILE)
    }

    /// Download name handed to clients.
    pub fn download_name(&self) -> String {
        let id = self.id.simple().to_string();
        format!("video_{}.mp4", &id[..8])
    }

    pub async fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<PathBuf> {
        let path = self.path(name);
        fs::write(&path, serde_json::to_vec_pretty(value)?).await?;
        Ok(path)
    }

    pub async fn write_error(&self, err: &PipelineError) -> Result<ErrorRecord> {
        let record = ErrorRecord::from_error(err);
        self.write_json(ERROR_FILE, &record).await?;
        Ok(record)
    }

    pub async fn debug_artifacts(&self) -> DebugArtifacts {
        let render_log = fs::read_to_string(self.path(RENDER_LOG_FILE))
            .await
            .ok()
            .map(|log| head(&log, RENDER_LOG_PREVIEW_CHARS));
        DebugArtifacts {
            id: self.id,
            request: read_json(&self.path(REQUEST_FILE)).await,
            script: read_json(&self.path(SCRIPT_FILE)).await,
            scene: read_json(&self.path(SCENE_FILE)).await,
            render_log,
            error: read_json(&self.path(ERROR_FILE)).await,
        }
    }

    pub async fn diagnose(&self) -> Result<Diagnostics> {
        let mut files = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let meta = entry.metadata().await?;
            if meta.is_file() {
                files.push(FileInfo {
                    name: entry.file_name().to_string_lossy().into_owned(),
                    size_bytes: meta.len(),
                });
            }
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));

        let error: Option<ErrorRecord> = read_json(&self.path(ERROR_FILE)).await;
        let has_video = files.iter().any(|f| f.name == FINAL_VIDEO_FILE && f.size_bytes > 0);
        let status = match (&error, has_video) {
            (Some(_), _) => "failed",
            (None, true) => "complete",
            (None, false) => "incomplete",
        };

        Ok(Diagnostics {
            id: self.id,
            status,
            durations: read_json(&self.path(DURATIONS_FILE)).await,
            files,
            error,
        })
    }
}
