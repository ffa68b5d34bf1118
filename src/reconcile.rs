use crate::audio::{AudioSource, SynthResult};
use crate::script::Segment;
use crate::logw;
use serde::{Deserialize, Serialize};

/// Total measured narration below this suggests synthesis degraded to silence throughout.
pub const ACTUAL_TOTAL_FLOOR_SECS: f64 = 15.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentTiming {
    pub index: usize,
    pub planned: f64,
    pub actual: f64,
    pub source: Option<AudioSource>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DurationReport {
    pub segments: Vec<SegmentTiming>,
    pub total_planned: f64,
    pub total_actual: f64,
    /// Set when `total_actual` is under [`ACTUAL_TOTAL_FLOOR_SECS`].
    pub likely_degraded: bool,
}

/// Copies each measured duration onto its segment. Results are matched by segment index;
/// a segment without a usable result keeps its planned duration.
pub fn reconcile(mut segments: Vec<Segment>, results: &[SynthResult]) -> (Vec<Segment>, DurationReport) {
    let mut timings = Vec::with_capacity(segments.len());

    for segment in &mut segments {
        let result = results.iter().find(|r| r.index == segment.index);
        let actual = match result {
            Some(r) if r.measured_duration.is_finite() && r.measured_duration > 0.0 => {
                r.measured_duration
            }
            _ => {
                logw(format!(
                    "Segment {}: no measured duration, keeping planned {:.2}s",
                    segment.index, segment.duration
                ));
                segment.duration
            }
        };
        segment.actual_duration = Some(actual);
        timings.push(SegmentTiming {
            index: segment.index,
            planned: segment.duration,
            actual,
            source: result.map(|r| r.source.clone()),
        });
    }

    let total_planned: f64 = timings.iter().map(|t| t.planned).sum();
    let total_actual: f64 = timings.iter().map(|t| t.actual).sum();
    let likely_degraded = total_actual < ACTUAL_TOTAL_FLOOR_SECS;
    if likely_degraded {
        logw(format!(
            "Total narration is only {:.2}s (planned {:.2}s); audio likely degraded to silence",
            total_actual, total_planned
        ));
    }

    (
        segments,
        DurationReport {
            segments: timings,
            total_planned,
            total_actual,
            likely_degraded,
        },
    )
}
