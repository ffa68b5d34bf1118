use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Malformed script: {reason}")]
    MalformedScript { reason: String },

    #[error("Script has {count} segments, at least 2 are required")]
    TooFewSegments { count: usize },

    #[error("TTS provider {provider} failed: {reason}")]
    TtsProvider { provider: String, reason: String },

    #[error("Audio synthesis failed for segment {index}: {reason}")]
    AudioSynthesisFatal { index: usize, reason: String },

    #[error("Scene validation failed: {reason}")]
    SceneValidation { reason: String },

    #[error("Render failed: {reason} (log: {})", .log_path.display())]
    Render {
        reason: String,
        log_path: PathBuf,
        log_tail: String,
    },

    #[error("Media tool failed during {operation}: {reason}")]
    MediaTool { operation: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl PipelineError {
    /// Stable taxonomy name written into error records.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedScript { .. } => "MalformedScript",
            Self::TooFewSegments { .. } => "TooFewSegments",
            Self::TtsProvider { .. } => "TTSProviderError",
            Self::AudioSynthesisFatal { .. } => "AudioSynthesisFatal",
            Self::SceneValidation { .. } => "SceneValidationError",
            Self::Render { .. } => "RenderError",
            Self::MediaTool { .. } => "MediaToolError",
            Self::Io(_) => "IoError",
            Self::Json(_) => "JsonError",
            Self::Http(_) => "HttpError",
        }
    }

    pub fn tts(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TtsProvider {
            provider: provider.into(),
            reason: reason.into(),
        }
    }

    pub fn media(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MediaTool {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    pub fn validation(reason: impl Into<String>) -> Self {
        Self::SceneValidation {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(PipelineError::tts("elevenlabs", "500").kind(), "TTSProviderError");
        assert_eq!(PipelineError::validation("x").kind(), "SceneValidationError");
        assert_eq!(PipelineError::media("mux", "exit 1").kind(), "MediaToolError");
        assert_eq!(
            PipelineError::TooFewSegments { count: 1 }.kind(),
            "TooFewSegments"
        );
    }

    #[test]
    fn render_error_mentions_log_path() {
        let err = PipelineError::Render {
            reason: "exit status 1".to_string(),
            log_path: PathBuf::from("/tmp/job/render.log"),
            log_tail: "Traceback".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("/tmp/job/render.log"));
        assert!(text.contains("exit status 1"));
    }
}
