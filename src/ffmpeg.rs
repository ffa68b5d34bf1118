use crate::error::{PipelineError, Result};
use crate::logi;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::fs;
use tokio::process::Command;

const SILENCE_SAMPLE_RATE: u32 = 44_100;
const STDERR_TAIL_CHARS: usize = 600;

fn tail(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    text.chars().skip(count.saturating_sub(max_chars)).collect()
}

async fn run_cmd(operation: &str, args: &[String], timeout: Duration) -> Result<()> {
    if args.is_empty() {
        return Ok(());
    }

    let mut cmd = Command::new(&args[0]);
    if args.len() > 1 {
        cmd.args(&args[1..]);
    }
    cmd.stdin(Stdio::null()).kill_on_drop(true);

    let output = match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(err)) => {
            return Err(PipelineError::media(
                operation,
                format!("failed to spawn {}: {err}", args[0]),
            ));
        }
        Err(_) => {
            return Err(PipelineError::media(
                operation,
                format!("timed out after {}s", timeout.as_secs()),
            ));
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(PipelineError::media(
            operation,
            format!("{}: {}", output.status, tail(stderr.trim(), STDERR_TAIL_CHARS)),
        ));
    }

    Ok(())
}

async fn non_empty_file(path: &Path) -> bool {
    fs::metadata(path)
        .await
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}

pub async fn ffprobe_duration_seconds(path: &Path, timeout: Duration) -> Result<f64> {
    let mut cmd = Command::new("ffprobe");
    cmd.args([
        "-v",
        "error",
        "-show_entries",
        "format=duration",
        "-of",
        "default=noprint_wrappers=1:nokey=1",
    ])
    .arg(path)
    .kill_on_drop(true);

    let output = match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(err)) => return Err(PipelineError::media("probe", err.to_string())),
        Err(_) => return Err(PipelineError::media("probe", "timed out")),
    };

    if !output.status.success() {
        return Err(PipelineError::media("probe", "ffprobe failed"));
    }

    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let duration = text.parse::<f64>().unwrap_or(-1.0);
    if !duration.is_finite() || duration <= 0.0 {
        return Err(PipelineError::media(
            "probe",
            format!("invalid duration {text:?}"),
        ));
    }
    Ok(duration)
}

pub async fn ffmpeg_silence(seconds: f64, out_mp3: &Path, timeout: Duration) -> Result<()> {
    let args = vec![
        "ffmpeg".to_string(),
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-f".to_string(),
        "lavfi".to_string(),
        "-i".to_string(),
        format!("anullsrc=r={SILENCE_SAMPLE_RATE}:cl=mono"),
        "-t".to_string(),
        format!("{:.3}", seconds),
        "-c:a".to_string(),
        "libmp3lame".to_string(),
        "-b:a".to_string(),
        "128k".to_string(),
        out_mp3.display().to_string(),
    ];
    run_cmd("silence", &args, timeout).await?;
    if !non_empty_file(out_mp3).await {
        return Err(PipelineError::media("silence", "no output written"));
    }
    Ok(())
}

pub async fn ffmpeg_convert_to_mp3(input: &Path, out_mp3: &Path, timeout: Duration) -> Result<()> {
    let args = vec![
        "ffmpeg".to_string(),
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-i".to_string(),
        input.display().to_string(),
        "-ar".to_string(),
        SILENCE_SAMPLE_RATE.to_string(),
        "-ac".to_string(),
        "1".to_string(),
        "-c:a".to_string(),
        "libmp3lame".to_string(),
        "-b:a".to_string(),
        "128k".to_string(),
        out_mp3.display().to_string(),
    ];
    run_cmd("convert", &args, timeout).await?;
    if !non_empty_file(out_mp3).await {
        return Err(PipelineError::media("convert", "no output written"));
    }
    Ok(())
}

async fn write_concat_list(paths: &[PathBuf], list_txt: &Path) -> Result<()> {
    let mut body = String::new();
    for path in paths {
        let escaped = path.display().to_string().replace('\'', "'\\''");
        body.push_str(&format!("file '{}'\n", escaped));
    }
    fs::write(list_txt, body).await?;
    Ok(())
}

/// Concatenates `paths` in order into `out_mp3`. Stream copy is tried first; mixed codecs
/// from different voice tiers fall back to a re-encode.
pub async fn ffmpeg_concat_audio(
    paths: &[PathBuf],
    list_txt: &Path,
    out_mp3: &Path,
    timeout: Duration,
) -> Result<()> {
    if paths.is_empty() {
        return Err(PipelineError::media("concat", "no audio inputs"));
    }
    write_concat_list(paths, list_txt).await?;

    let base = vec![
        "ffmpeg".to_string(),
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-f".to_string(),
        "concat".to_string(),
        "-safe".to_string(),
        "0".to_string(),
        "-i".to_string(),
        list_txt.display().to_string(),
    ];

    let mut copy_args = base.clone();
    copy_args.extend(["-c".to_string(), "copy".to_string()]);
    copy_args.push(out_mp3.display().to_string());

    if let Err(err) = run_cmd("concat", &copy_args, timeout).await {
        logi(format!("Stream-copy concat failed ({err}); re-encoding"));
        let mut encode_args = base;
        encode_args.extend([
            "-c:a".to_string(),
            "libmp3lame".to_string(),
            "-b:a".to_string(),
            "128k".to_string(),
        ]);
        encode_args.push(out_mp3.display().to_string());
        run_cmd("concat", &encode_args, timeout).await?;
    }

    if !non_empty_file(out_mp3).await {
        return Err(PipelineError::media("concat", "no output written"));
    }
    Ok(())
}

/// Muxes the first input's video with the second input's audio.
pub async fn ffmpeg_mux(
    video_in: &Path,
    audio_in: &Path,
    video_out: &Path,
    timeout: Duration,
) -> Result<()> {
    let args = vec![
        "ffmpeg".to_string(),
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-i".to_string(),
        video_in.display().to_string(),
        "-i".to_string(),
        audio_in.display().to_string(),
        "-map".to_string(),
        "0:v:0".to_string(),
        "-map".to_string(),
        "1:a:0".to_string(),
        "-c:v".to_string(),
        "copy".to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-b:a".to_string(),
        "192k".to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        video_out.display().to_string(),
    ];
    run_cmd("mux", &args, timeout).await?;
    if !non_empty_file(video_out).await {
        return Err(PipelineError::media("mux", "no output written"));
    }
    Ok(())
}
