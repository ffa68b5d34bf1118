//! Script model and the normalizer that turns untrusted LLM JSON into it.
//!
//! Every field is read with an explicit default; the only errors this module produces are
//! `MalformedScript` and `TooFewSegments`, which callers absorb by substituting
//! [`fallback_script`].

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_DURATION_SECS: f64 = 6.0;
pub const DEFAULT_NARRATION: &str = "Let's take a closer look.";
pub const MIN_SEGMENTS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
    Comprehensive,
}

impl Complexity {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "simple" => Some(Self::Simple),
            "moderate" => Some(Self::Moderate),
            "complex" => Some(Self::Complex),
            "comprehensive" => Some(Self::Comprehensive),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    Title,
    Calculation,
    Step,
    Equation,
    Split,
    Diagram,
    Example,
    /// Generic fallback for unrecognized layouts.
    Text,
}

impl Layout {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "title" => Self::Title,
            "calculation" => Self::Calculation,
            "step" => Self::Step,
            "equation" => Self::Equation,
            "split" => Self::Split,
            "diagram" => Self::Diagram,
            "example" => Self::Example,
            _ => Self::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorScheme {
    #[default]
    Blue,
    Purple,
    Green,
    Orange,
    Red,
    Yellow,
}

impl ColorScheme {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "purple" => Self::Purple,
            "green" => Self::Green,
            "orange" => Self::Orange,
            "red" => Self::Red,
            "yellow" => Self::Yellow,
            _ => Self::Blue,
        }
    }

    pub fn hex(self) -> &'static str {
        match self {
            Self::Blue => "#58C4DD",
            Self::Purple => "#9A72AC",
            Self::Green => "#83C167",
            Self::Orange => "#FF862F",
            Self::Red => "#FC6255",
            Self::Yellow => "#FFFF00",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepData {
    pub calculation_steps: Vec<String>,
    pub annotations: Vec<String>,
}

impl StepData {
    /// Annotation for step `j`, present only when the model supplied one at that index.
    pub fn annotation(&self, j: usize) -> Option<&str> {
        self.annotations
            .get(j)
            .map(String::as_str)
            .filter(|note| !note.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub index: usize,
    /// Planned length from the model; advisory only.
    pub duration: f64,
    /// Measured narration length; authoritative once synthesis has run.
    pub actual_duration: Option<f64>,
    pub narration: String,
    pub display_text: String,
    pub layout: Layout,
    pub step_data: Option<StepData>,
    pub color_scheme: ColorScheme,
}

impl Segment {
    /// Duration that drives timing: the measured value when present, otherwise the plan.
    pub fn timing_duration(&self) -> f64 {
        match self.actual_duration {
            Some(d) if d.is_finite() && d > 0.0 => d,
            _ => self.duration,
        }
    }

    pub fn calculation_steps(&self) -> &[String] {
        self.step_data
            .as_ref()
            .map(|s| s.calculation_steps.as_slice())
            .unwrap_or(&[])
    }

    pub fn word_count(&self) -> usize {
        self.narration.split_whitespace().count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Script {
    pub title: String,
    pub complexity: Option<Complexity>,
    pub segments: Vec<Segment>,
}

impl Script {
    pub fn total_planned_duration(&self) -> f64 {
        self.segments.iter().map(|s| s.duration).sum()
    }
}

fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn read_text(obj: &Value, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(value_as_text)
        .filter(|s| !s.trim().is_empty())
}

fn read_duration(obj: &Value) -> f64 {
    let parsed = match obj.get("duration") {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().trim_end_matches('s').parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(d) if d.is_finite() && d > 0.0 => d,
        _ => DEFAULT_DURATION_SECS,
    }
}

fn read_text_list(obj: &Value, key: &str) -> Vec<String> {
    obj.get(key)
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(value_as_text).collect())
        .unwrap_or_default()
}

fn read_step_data(obj: &Value) -> Option<StepData> {
    let raw = obj.get("step_data")?;
    if !raw.is_object() {
        return None;
    }
    let calculation_steps: Vec<String> = read_text_list(raw, "calculation_steps")
        .into_iter()
        .filter(|s| !s.trim().is_empty())
        .collect();
    let annotations = read_text_list(raw, "annotations");
    Some(StepData {
        calculation_steps,
        annotations,
    })
}

fn read_segment(index: usize, obj: &Value) -> Segment {
    let layout = obj
        .get("layout")
        .and_then(Value::as_str)
        .map(Layout::parse)
        .unwrap_or(Layout::Split);
    let color_scheme = obj
        .get("color_scheme")
        .and_then(Value::as_str)
        .map(ColorScheme::parse)
        .unwrap_or_default();

    Segment {
        index,
        duration: read_duration(obj),
        actual_duration: None,
        narration: read_text(obj, "narration").unwrap_or_else(|| DEFAULT_NARRATION.to_string()),
        display_text: read_text(obj, "display_text").unwrap_or_default(),
        layout,
        step_data: read_step_data(obj),
        color_scheme,
    }
}

/// Parses the model's JSON document into a [`Script`].
pub fn normalize(raw: &Value, topic: &str) -> Result<Script> {
    let items = match raw.get("segments") {
        Some(Value::Array(items)) => items,
        Some(_) => {
            return Err(PipelineError::MalformedScript {
                reason: "`segments` is not an array".to_string(),
            });
        }
        None => {
            return Err(PipelineError::MalformedScript {
                reason: "missing `segments` key".to_string(),
            });
        }
    };

    let segments: Vec<Segment> = items
        .iter()
        .filter(|item| item.is_object())
        .enumerate()
        .map(|(index, item)| read_segment(index, item))
        .collect();

    if segments.len() < MIN_SEGMENTS {
        return Err(PipelineError::TooFewSegments {
            count: segments.len(),
        });
    }

    let title = read_text(raw, "title").unwrap_or_else(|| topic.trim().to_string());
    let complexity = raw
        .get("complexity")
        .and_then(Value::as_str)
        .and_then(Complexity::parse);

    Ok(Script {
        title,
        complexity,
        segments,
    })
}

/// Fixed two-segment script used whenever the model's output is unusable.
pub fn fallback_script(topic: &str) -> Script {
    let topic = topic.trim();
    Script {
        title: topic.to_string(),
        complexity: Some(Complexity::Simple),
        segments: vec![
            Segment {
                index: 0,
                duration: 6.0,
                actual_duration: None,
                narration: format!("Let's explore {topic} step by step."),
                display_text: topic.to_string(),
                layout: Layout::Title,
                step_data: None,
                color_scheme: ColorScheme::Blue,
            },
            Segment {
                index: 1,
                duration: 6.0,
                actual_duration: None,
                narration: "We'll break the problem down and work through each part carefully."
                    .to_string(),
                display_text: "Step by step".to_string(),
                layout: Layout::Split,
                step_data: None,
                color_scheme: ColorScheme::Blue,
            },
        ],
    }
}

/// Normalizes `raw`, substituting the fallback script when it is absent or unusable.
pub fn normalize_or_fallback(raw: Option<&Value>, topic: &str) -> Script {
    let Some(raw) = raw else {
        crate::logw("No script from model; using fallback script");
        return fallback_script(topic);
    };
    match normalize(raw, topic) {
        Ok(script) => script,
        Err(err) => {
            crate::logw(format!("{err}; using fallback script"));
            fallback_script(topic)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_segments_is_malformed() {
        let err = normalize(&json!({"title": "x"}), "x").unwrap_err();
        assert!(matches!(err, PipelineError::MalformedScript { .. }));
    }

    #[test]
    fn single_segment_is_too_few() {
        let raw = json!({"segments": [{"narration": "hi"}]});
        let err = normalize(&raw, "x").unwrap_err();
        assert!(matches!(err, PipelineError::TooFewSegments { count: 1 }));
    }

    #[test]
    fn fields_are_defaulted() {
        let raw = json!({
            "segments": [
                {},
                {"duration": -3, "layout": "hologram", "color_scheme": "teal", "narration": "  "},
                {"duration": "8", "layout": "CALCULATION", "step_data": {
                    "calculation_steps": ["2x+5=9", "", 4],
                    "annotations": ["Subtract 5"]
                }}
            ]
        });
        let script = normalize(&raw, "Solve 2x+5=9").unwrap();
        assert_eq!(script.title, "Solve 2x+5=9");
        assert_eq!(script.segments.len(), 3);

        let first = &script.segments[0];
        assert_eq!(first.duration, DEFAULT_DURATION_SECS);
        assert_eq!(first.layout, Layout::Split);
        assert_eq!(first.color_scheme, ColorScheme::Blue);
        assert_eq!(first.narration, DEFAULT_NARRATION);

        let second = &script.segments[1];
        assert_eq!(second.duration, DEFAULT_DURATION_SECS);
        assert_eq!(second.layout, Layout::Text);
        assert_eq!(second.narration, DEFAULT_NARRATION);

        let third = &script.segments[2];
        assert_eq!(third.duration, 8.0);
        assert_eq!(third.layout, Layout::Calculation);
        assert_eq!(third.calculation_steps(), ["2x+5=9", "4"]);
        let data = third.step_data.as_ref().unwrap();
        assert_eq!(data.annotation(0), Some("Subtract 5"));
        assert_eq!(data.annotation(1), None);
    }

    #[test]
    fn indices_follow_source_order() {
        let raw = json!({"segments": [{"narration": "a"}, "junk", {"narration": "b"}]});
        let script = normalize(&raw, "t").unwrap();
        let indices: Vec<usize> = script.segments.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![0, 1]);
        assert_eq!(script.segments[1].narration, "b");
    }

    #[test]
    fn fallback_has_title_then_split_for_twelve_seconds() {
        let script = normalize_or_fallback(None, "Solve 2x+5=9");
        assert_eq!(script.segments.len(), 2);
        assert_eq!(script.segments[0].layout, Layout::Title);
        assert_eq!(script.segments[1].layout, Layout::Split);
        assert_eq!(script.total_planned_duration(), 12.0);
    }

    #[test]
    fn timing_duration_prefers_measured_value() {
        let mut seg = fallback_script("t").segments.remove(0);
        assert_eq!(seg.timing_duration(), 6.0);
        seg.actual_duration = Some(9.5);
        assert_eq!(seg.timing_duration(), 9.5);
        seg.actual_duration = Some(0.0);
        assert_eq!(seg.timing_duration(), 6.0);
    }
}
