use crate::config::Config;
use crate::{logi, logw};
use anyhow::{Context, Result};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::fs;
use tokio::process::Command;

pub async fn ensure_directories(cfg: &Config) -> Result<()> {
    let dir = &cfg.output_dir;
    if !Path::new(dir).exists() {
        fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create output dir: {}", dir.display()))?;
        logi(format!("Created directory: {}", dir.display()));
    }
    Ok(())
}

const TOOL_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// True when `bin <version_flag>` runs and exits successfully within `timeout`.
pub async fn check_tool_within(bin: &str, version_flag: &str, timeout: Duration) -> bool {
    let mut cmd = Command::new(bin);
    cmd.arg(version_flag)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);
    match tokio::time::timeout(timeout, cmd.status()).await {
        Ok(Ok(status)) => status.success(),
        Ok(Err(_)) => false,
        Err(_) => {
            logw(format!("{bin} {version_flag} did not exit within {}s", timeout.as_secs()));
            false
        }
    }
}

pub async fn check_tool(bin: &str, version_flag: &str) -> bool {
    check_tool_within(bin, version_flag, TOOL_CHECK_TIMEOUT).await
}

/// Warns about every missing external tool; returns the names that were not found.
pub async fn check_tools(cfg: &Config) -> Vec<String> {
    let tools = [
        ("ffmpeg", "-version"),
        ("ffprobe", "-version"),
        (cfg.renderer_bin.as_str(), "--version"),
        (cfg.local_tts_bin.as_str(), "--version"),
    ];
    let mut missing = Vec::new();
    for (bin, flag) in tools {
        if !check_tool(bin, flag).await {
            logw(format!("{bin} not found in PATH or not runnable"));
            missing.push(bin.to_string());
        }
    }
    missing
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn creates_output_dir() {
        let root = tempfile::tempdir().unwrap();
        let cfg = Config {
            output_dir: root.path().join("nested/videos"),
            ..Config::default()
        };
        ensure_directories(&cfg).await.unwrap();
        assert!(cfg.output_dir.is_dir());
    }

    #[tokio::test]
    async fn missing_tools_are_reported() {
        let cfg = Config {
            renderer_bin: "definitely-not-a-renderer-xyz".to_string(),
            ..Config::default()
        };
        let missing = check_tools(&cfg).await;
        assert!(missing.contains(&"definitely-not-a-renderer-xyz".to_string()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn hung_tool_counts_as_missing() {
        let started = std::time::Instant::now();
        assert!(!check_tool_within("sleep", "30", Duration::from_millis(200)).await);
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(check_tool_within("true", "--version", Duration::from_secs(5)).await);
    }
}
