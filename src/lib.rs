pub mod api;
pub mod audio;
pub mod config;
pub mod error;
pub mod ffmpeg;
pub mod init;
pub mod pipeline;
pub mod reconcile;
pub mod render;
pub mod sanitize;
pub mod scene;
pub mod script;
pub mod server;
pub mod storage;

pub use error::{PipelineError, Result};

pub(crate) fn logv(tag: &str, message: &str) {
    match tag {
        "WARN" => tracing::warn!(tag, "{}", message),
        _ => tracing::info!(tag, "{}", message),
    }
}

pub(crate) fn logi(message: impl AsRef<str>) {
    logv("INFO", message.as_ref());
}

pub(crate) fn logok(message: impl AsRef<str>) {
    logv("OK", message.as_ref());
}

pub(crate) fn logw(message: impl AsRef<str>) {
    logv("WARN", message.as_ref());
}
