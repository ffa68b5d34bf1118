//! Per-layout timing allocation.
//!
//! Every proportional slot is a fraction of the segment's measured narration length so the
//! visuals and the voice finish together. Fixed-cost extras (labels, highlights) are kept
//! in their own fields and sit outside the proportional budget.

use crate::config::Pacing;

/// Clamps a slot to the pacing minimum; a zero-length animation is a renderer error.
pub fn slot(seconds: f64, pacing: &Pacing) -> f64 {
    if seconds.is_finite() {
        seconds.max(pacing.min_animation_secs)
    } else {
        pacing.min_animation_secs
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepTiming {
    pub write: f64,
    /// Annotation fade-in carved out of the hold; zero when the step has no annotation.
    pub annotate: f64,
    pub hold: f64,
}

impl StepTiming {
    pub fn total(&self) -> f64 {
        self.write + self.annotate + self.hold
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalculationTiming {
    pub per_step: f64,
    pub steps: Vec<StepTiming>,
    pub highlight: f64,
}

/// Splits `duration` evenly over the steps, `write_fraction` animating and the rest held.
/// `annotated[j]` says whether step `j` carries an annotation.
pub fn calculation(duration: f64, annotated: &[bool], pacing: &Pacing) -> CalculationTiming {
    let per_step = duration / annotated.len().max(1) as f64;
    let steps = annotated
        .iter()
        .map(|&has_note| {
            let write = slot(per_step * pacing.write_fraction, pacing);
            let hold_budget = per_step * pacing.hold_fraction;
            if has_note {
                StepTiming {
                    write,
                    annotate: slot(hold_budget * 0.5, pacing),
                    hold: slot(hold_budget * 0.5, pacing),
                }
            } else {
                StepTiming {
                    write,
                    annotate: 0.0,
                    hold: slot(hold_budget, pacing),
                }
            }
        })
        .collect();

    CalculationTiming {
        per_step,
        steps,
        highlight: slot(pacing.highlight_secs, pacing),
    }
}

/// Timing for the single-element layouts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockTiming {
    /// Fixed or proportional label shown before the main element.
    pub label: Option<f64>,
    pub write: f64,
    /// Second element built after the main one (split column, diagram shape).
    pub secondary: Option<f64>,
    pub hold: f64,
    pub fade_out: Option<f64>,
    /// Remainder of a reserved exit window not used by the fade-out.
    pub tail: Option<f64>,
}

impl BlockTiming {
    fn simple(write: f64, hold: f64) -> Self {
        Self {
            label: None,
            write,
            secondary: None,
            hold,
            fade_out: None,
            tail: None,
        }
    }

    pub fn total(&self) -> f64 {
        self.label.unwrap_or(0.0)
            + self.write
            + self.secondary.unwrap_or(0.0)
            + self.hold
            + self.fade_out.unwrap_or(0.0)
            + self.tail.unwrap_or(0.0)
    }
}

/// Opening title: write and hold fractions, with the remaining window reserved for a
/// fixed-length fade-out.
pub fn title(duration: f64, pacing: &Pacing) -> BlockTiming {
    let write = slot(duration * pacing.title_write_fraction, pacing);
    let hold = slot(duration * pacing.title_hold_fraction, pacing);
    let reserve = (duration - write - hold).max(0.0);
    let fade_out = slot(pacing.title_fade_out_secs.min(reserve), pacing);
    let leftover = (reserve - fade_out).max(0.0);
    if leftover >= pacing.min_animation_secs {
        return BlockTiming {
            fade_out: Some(fade_out),
            tail: Some(leftover),
            ..BlockTiming::simple(write, hold)
        };
    }
    BlockTiming {
        fade_out: Some(fade_out),
        ..BlockTiming::simple(write, hold + leftover)
    }
}

/// Later title segments render as a header.
pub fn header(duration: f64, pacing: &Pacing) -> BlockTiming {
    BlockTiming::simple(
        slot(duration * pacing.header_write_fraction, pacing),
        slot(duration * pacing.header_hold_fraction, pacing),
    )
}

pub fn step(duration: f64, pacing: &Pacing) -> BlockTiming {
    BlockTiming {
        label: Some(slot(pacing.label_secs, pacing)),
        ..BlockTiming::simple(
            slot(duration * pacing.step_write_fraction, pacing),
            slot(duration * pacing.step_hold_fraction, pacing),
        )
    }
}

pub fn equation(duration: f64, pacing: &Pacing) -> BlockTiming {
    BlockTiming {
        label: Some(slot(pacing.label_secs, pacing)),
        ..fallback(duration, pacing)
    }
}

/// Label plus shape share the construction budget; the label takes a fixed slice.
pub fn diagram(duration: f64, pacing: &Pacing) -> BlockTiming {
    let label = slot(pacing.label_secs, pacing);
    BlockTiming {
        label: Some(label),
        ..BlockTiming::simple(
            slot(duration * pacing.step_write_fraction - label, pacing),
            slot(duration * pacing.step_hold_fraction, pacing),
        )
    }
}

/// Two columns built one after the other, then held.
pub fn split(duration: f64, pacing: &Pacing) -> BlockTiming {
    let column = duration * pacing.write_fraction / 2.0;
    BlockTiming {
        secondary: Some(slot(column, pacing)),
        ..BlockTiming::simple(
            slot(column, pacing),
            slot(duration * pacing.hold_fraction, pacing),
        )
    }
}

pub fn example(duration: f64, pacing: &Pacing) -> BlockTiming {
    diagram(duration, pacing)
}

pub fn fallback(duration: f64, pacing: &Pacing) -> BlockTiming {
    BlockTiming::simple(
        slot(duration * pacing.write_fraction, pacing),
        slot(duration * pacing.hold_fraction, pacing),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn calculation_steps_sum_to_duration() {
        let pacing = Pacing::default();
        let timing = calculation(10.0, &[true, true, false], &pacing);
        assert!((timing.per_step - 10.0 / 3.0).abs() < EPS);
        let sum: f64 = timing.steps.iter().map(StepTiming::total).sum();
        assert!((sum - 10.0).abs() < EPS);
        assert!((timing.steps[0].write - 7.0 / 3.0).abs() < EPS);
        assert_eq!(timing.steps[2].annotate, 0.0);
        assert!((timing.steps[2].hold - 1.0).abs() < EPS);
        assert_eq!(timing.highlight, 0.5);
    }

    #[test]
    fn tiny_steps_are_clamped_positive() {
        let pacing = Pacing::default();
        let timing = calculation(0.5, &[false; 40], &pacing);
        assert!(timing.steps.iter().all(|s| s.write >= 0.1 && s.hold >= 0.1));
    }

    #[test]
    fn proportional_layouts_sum_to_duration() {
        let pacing = Pacing::default();
        for d in [3.0, 7.5, 12.0] {
            assert!((title(d, &pacing).total() - d).abs() < EPS, "title {d}");
            assert!((header(d, &pacing).total() - d).abs() < EPS);
            assert!((diagram(d, &pacing).total() - d).abs() < EPS);
            assert!((split(d, &pacing).total() - d).abs() < EPS);
            assert!((example(d, &pacing).total() - d).abs() < EPS);
            assert!((fallback(d, &pacing).total() - d).abs() < EPS);
        }
    }

    #[test]
    fn labelled_layouts_add_fixed_cost() {
        let pacing = Pacing::default();
        let s = step(10.0, &pacing);
        assert_eq!(s.label, Some(0.5));
        assert!((s.write - 6.0).abs() < EPS);
        assert!((s.hold - 4.0).abs() < EPS);
        let e = equation(10.0, &pacing);
        assert!((e.total() - 10.5).abs() < EPS);
    }

    #[test]
    fn title_fade_out_is_fixed() {
        let pacing = Pacing::default();
        let t = title(10.0, &pacing);
        assert_eq!(t.write, 5.0);
        assert_eq!(t.hold, 3.0);
        assert_eq!(t.fade_out, Some(0.5));
        assert!((t.tail.unwrap() - 1.5).abs() < EPS);
    }

    #[test]
    fn nonfinite_duration_still_positive() {
        let pacing = Pacing::default();
        let t = fallback(f64::NAN, &pacing);
        assert_eq!(t.write, 0.1);
        assert_eq!(t.hold, 0.1);
    }
}
