use crate::config::Config;
use crate::error::Result;
use crate::{logi, logw};
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;

const RESPONSES_URL: &str = "https://api.openai.com/v1/responses";
const MAX_TOPIC_CHARS: usize = 2_000;
const MAX_OUTPUT_TOKENS: u32 = 1_500;

pub const SCRIPT_PROMPT: &str = r#"You are an expert math tutor. Generate a JSON script for an animated video.

RULES:
1. Duration: 30-90 seconds total
2. 4-12 segments
3. For solving: Use "calculation" layout with ALL steps in step_data
4. Narration: Natural, 20-50 words per segment
5. display_text: Clean, fits on screen
6. NO generic intros like "Introduction"
7. layout is one of: title, calculation, step, equation, split, diagram, example
8. color_scheme is one of: blue, purple, green, orange, red, yellow

OUTPUT JSON:
{
  "title": "Solve x^2 - 5x + 6 = 0",
  "complexity": "moderate",
  "segments": [
    {
      "duration": 8,
      "narration": "Let's factor this quadratic...",
      "display_text": "(x - 2)(x - 3) = 0",
      "layout": "calculation",
      "color_scheme": "blue",
      "step_data": {
        "calculation_steps": ["x^2 - 5x + 6 = 0", "(x - 2)(x - 3) = 0", "x = 2 or x = 3"],
        "annotations": ["Factor", "Set to zero", "Solutions"]
      }
    }
  ]
}
"#;

fn trim_copy_utf8_safe(input: &str, max_bytes: usize) -> String {
    if input.len() <= max_bytes {
        return input.to_string();
    }

    let mut cut = max_bytes.min(input.len());
    while cut > 0 && !input.is_char_boundary(cut) {
        cut -= 1;
    }
    input[..cut].to_string()
}

fn openai_extract_output_text(resp_json: &str) -> Option<String> {
    let root: Value = serde_json::from_str(resp_json).ok()?;

    if let Some(err) = root.get("error").filter(|e| !e.is_null()) {
        if let Some(msg) = err.get("message").and_then(|v| v.as_str()) {
            logw(format!("OpenAI error message: {}", msg));
        }
        if let Some(code) = err.get("code").and_then(|v| v.as_str()) {
            logw(format!("OpenAI error code: {}", code));
        }
        return None;
    }

    let output = root.get("output")?.as_array()?;
    for item in output {
        let Some(content) = item.get("content").and_then(|v| v.as_array()) else {
            continue;
        };
        for entry in content {
            let typ = entry.get("type").and_then(|v| v.as_str());
            let text = entry.get("text").and_then(|v| v.as_str());
            if typ == Some("output_text") {
                if let Some(text) = text {
                    return Some(text.to_string());
                }
            }
        }
    }

    None
}

/// Parses the model's output text as a JSON document, tolerating a fenced code block.
fn parse_script_text(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed);
    serde_json::from_str::<Value>(unfenced.trim())
        .ok()
        .filter(Value::is_object)
}

/// Asks the model for a structured script. `Ok(None)` means the model answered but the
/// answer is unusable; callers substitute the fallback script either way.
pub async fn openai_generate_script(
    client: &Client,
    cfg: &Config,
    topic: &str,
) -> Result<Option<Value>> {
    if cfg.openai_key.is_empty() {
        logw("OpenAI key not configured; skipping script generation");
        return Ok(None);
    }

    let topic = trim_copy_utf8_safe(topic, MAX_TOPIC_CHARS);
    let body = json!({
        "model": cfg.openai_model,
        "input": [
            {"role": "system", "content": SCRIPT_PROMPT},
            {"role": "user", "content": format!("Topic: {topic}")},
        ],
        "text": {"format": {"type": "json_object"}},
        "max_output_tokens": MAX_OUTPUT_TOKENS,
    });

    let resp = client
        .post(RESPONSES_URL)
        .bearer_auth(&cfg.openai_key)
        .json(&body)
        .timeout(Duration::from_secs(cfg.timeouts.llm_secs))
        .send()
        .await?;

    let status = resp.status();
    let raw = resp.text().await.unwrap_or_default();

    if !status.is_success() {
        logw(format!("OpenAI HTTP {}", status.as_u16()));
        if !raw.is_empty() {
            let snippet = raw.chars().take(800).collect::<String>();
            logw(format!("OpenAI raw body: {}", snippet));
        }
        return Ok(None);
    }

    let Some(out_text) = openai_extract_output_text(&raw) else {
        logw("OpenAI response parse failed.");
        return Ok(None);
    };

    let script = parse_script_text(&out_text);
    match &script {
        Some(value) => {
            let count = value
                .get("segments")
                .and_then(Value::as_array)
                .map(Vec::len)
                .unwrap_or(0);
            logi(format!("OpenAI script received: {} segments", count));
        }
        None => logw("OpenAI output was not a JSON object."),
    }
    Ok(script)
}
