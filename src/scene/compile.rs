use super::model::{
    Animation, Direction, Element, ElementId, Instruction, Op, Placement, SceneProgram, ShapeKind,
};
use super::timing;
use crate::config::Pacing;
use crate::sanitize::{Profile, excerpt, sanitize};
use crate::script::{Layout, Segment};

pub const CURSOR_TOP: f64 = 3.0;
pub const LINE_STEP: f64 = 0.8;
pub const CURSOR_FLOOR: f64 = -3.0;
/// Segments between mark-and-fade passes over old content.
pub const COMPACTION_PERIOD: usize = 4;
pub const DIM_OPACITY: f64 = 0.3;
/// Run time of dim/clear transitions between segments.
pub const TRANSITION_SECS: f64 = 0.3;

const WHITE: &str = "#FFFFFF";
const YELLOW: &str = "#FFFF00";
const SPLIT_EXCERPT_WORDS: usize = 10;

/// Layout state threaded from one segment's emission into the next.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutCursor {
    pub y: f64,
    pub segments_since_compaction: usize,
    /// Elements on screen at full opacity.
    pub live: Vec<ElementId>,
    /// Elements still on screen but dimmed by the last compaction pass.
    pub dimmed: Vec<ElementId>,
    pub title_shown: bool,
    pub step_number: usize,
}

impl Default for LayoutCursor {
    fn default() -> Self {
        Self {
            y: CURSOR_TOP,
            segments_since_compaction: 0,
            live: Vec::new(),
            dimmed: Vec::new(),
            title_shown: false,
            step_number: 0,
        }
    }
}

impl LayoutCursor {
    fn fits(&self, lines: usize) -> bool {
        self.y - lines.saturating_sub(1) as f64 * LINE_STEP >= CURSOR_FLOOR
    }

    fn advance(mut self, lines: usize) -> Self {
        self.y -= lines as f64 * LINE_STEP;
        self
    }

    fn show(mut self, ids: impl IntoIterator<Item = ElementId>) -> Self {
        self.live.extend(ids);
        self
    }
}

struct SceneBuilder<'a> {
    program: SceneProgram,
    next_id: u32,
    pacing: &'a Pacing,
    segment: Option<usize>,
}

impl<'a> SceneBuilder<'a> {
    fn new(pacing: &'a Pacing) -> Self {
        Self {
            program: SceneProgram::default(),
            next_id: 0,
            pacing,
            segment: None,
        }
    }

    fn push(&mut self, op: Op) {
        self.program.instructions.push(Instruction {
            segment: self.segment,
            op,
        });
    }

    fn add(&mut self, element: Element, placement: Placement) -> ElementId {
        let id = ElementId(self.next_id);
        self.next_id += 1;
        self.push(Op::Add {
            id,
            element,
            placement,
        });
        id
    }

    fn play(&mut self, targets: Vec<ElementId>, animation: Animation, run_time: f64) {
        let run_time = timing::slot(run_time, self.pacing);
        self.push(Op::Play {
            targets,
            animation,
            run_time,
        });
    }

    fn wait(&mut self, seconds: f64) {
        let seconds = timing::slot(seconds, self.pacing);
        self.push(Op::Wait { seconds });
    }

    fn transition(&mut self, op: Op) {
        let current = self.segment.take();
        self.push(op);
        self.segment = current;
    }

    /// Clears everything on screen and returns the cursor to the top.
    fn clear(&mut self, mut cursor: LayoutCursor) -> LayoutCursor {
        let mut ids = std::mem::take(&mut cursor.dimmed);
        ids.append(&mut cursor.live);
        if !ids.is_empty() {
            self.transition(Op::Remove {
                ids,
                run_time: TRANSITION_SECS,
            });
        }
        LayoutCursor {
            y: CURSOR_TOP,
            segments_since_compaction: 0,
            ..cursor
        }
    }

    /// Mark-and-fade: content dimmed last pass is removed, current content is dimmed.
    fn compact(&mut self, mut cursor: LayoutCursor) -> LayoutCursor {
        let swept = std::mem::take(&mut cursor.dimmed);
        if !swept.is_empty() {
            self.transition(Op::Remove {
                ids: swept,
                run_time: TRANSITION_SECS,
            });
        }
        if !cursor.live.is_empty() {
            self.transition(Op::Dim {
                ids: cursor.live.clone(),
                opacity: DIM_OPACITY,
                run_time: TRANSITION_SECS,
            });
            cursor.dimmed = std::mem::take(&mut cursor.live);
        }
        cursor.segments_since_compaction = 0;
        cursor
    }

    /// Makes room for `lines` rows, compacting on the period boundary.
    fn make_room(&mut self, cursor: LayoutCursor, lines: usize) -> LayoutCursor {
        if !cursor.fits(lines.max(1)) {
            return self.clear(cursor);
        }
        if cursor.segments_since_compaction >= COMPACTION_PERIOD {
            return self.compact(cursor);
        }
        cursor
    }
}

fn text(content: String, font_size: u32, color: &str) -> Element {
    Element::Text {
        content,
        font_size,
        color: color.to_string(),
    }
}

fn math(tex: String, font_size: u32, color: &str) -> Element {
    Element::Math {
        tex,
        font_size,
        color: color.to_string(),
    }
}

fn at(x: f64, y: f64) -> Placement {
    Placement::At { x, y }
}

fn right_of(target: ElementId) -> Placement {
    Placement::NextTo {
        target,
        direction: Direction::Right,
    }
}

/// Layout actually rendered; a calculation without steps degrades to the fallback.
pub fn effective_layout(segment: &Segment) -> Layout {
    match segment.layout {
        Layout::Calculation if segment.calculation_steps().is_empty() => Layout::Text,
        other => other,
    }
}

fn emit_calculation(
    b: &mut SceneBuilder,
    segment: &Segment,
    mut cursor: LayoutCursor,
) -> LayoutCursor {
    let steps = segment.calculation_steps();
    let annotated: Vec<bool> = (0..steps.len())
        .map(|j| {
            segment
                .step_data
                .as_ref()
                .and_then(|data| data.annotation(j))
                .is_some()
        })
        .collect();
    let plan = timing::calculation(segment.timing_duration(), &annotated, b.pacing);
    let color = segment.color_scheme.hex();

    let mut last = None;
    for (j, (step, step_timing)) in steps.iter().zip(&plan.steps).enumerate() {
        if !cursor.fits(1) {
            cursor = b.clear(cursor);
        }
        let eq = b.add(math(sanitize(step, Profile::Math), 40, color), at(0.0, cursor.y));
        b.play(vec![eq], Animation::Write, step_timing.write);
        cursor = cursor.show([eq]);

        if let Some(note) = segment.step_data.as_ref().and_then(|d| d.annotation(j)) {
            let note_id = b.add(text(sanitize(note, Profile::Display), 24, YELLOW), right_of(eq));
            b.play(vec![note_id], Animation::FadeIn, step_timing.annotate);
            cursor = cursor.show([note_id]);
        }
        b.wait(step_timing.hold);
        cursor = cursor.advance(1);
        last = Some(eq);
    }

    if let Some(last) = last {
        let highlight = b.add(
            Element::Box {
                target: last,
                color: YELLOW.to_string(),
            },
            Placement::Around { target: last },
        );
        b.play(vec![highlight], Animation::Create, plan.highlight);
        cursor = cursor.show([highlight]);
    }
    cursor
}

fn emit_opening_title(
    b: &mut SceneBuilder,
    segment: &Segment,
    cursor: LayoutCursor,
) -> LayoutCursor {
    let mut cursor = if cursor.live.is_empty() && cursor.dimmed.is_empty() {
        cursor
    } else {
        b.clear(cursor)
    };
    let t = timing::title(segment.timing_duration(), b.pacing);
    let id = b.add(
        text(sanitize(&segment.display_text, Profile::Display), 56, segment.color_scheme.hex()),
        at(0.0, 0.0),
    );
    b.play(vec![id], Animation::Write, t.write);
    b.wait(t.hold);
    if let Some(fade_out) = t.fade_out {
        b.push(Op::Remove {
            ids: vec![id],
            run_time: timing::slot(fade_out, b.pacing),
        });
    }
    if let Some(tail) = t.tail {
        b.wait(tail);
    }
    cursor.title_shown = true;
    cursor
}

fn emit_header(b: &mut SceneBuilder, segment: &Segment, cursor: LayoutCursor) -> LayoutCursor {
    let t = timing::header(segment.timing_duration(), b.pacing);
    let id = b.add(
        text(sanitize(&segment.display_text, Profile::Display), 40, segment.color_scheme.hex()),
        at(0.0, cursor.y),
    );
    b.play(vec![id], Animation::Write, t.write);
    b.wait(t.hold);
    cursor.show([id]).advance(1)
}

fn emit_step(b: &mut SceneBuilder, segment: &Segment, mut cursor: LayoutCursor) -> LayoutCursor {
    let t = timing::step(segment.timing_duration(), b.pacing);
    cursor.step_number += 1;
    let color = segment.color_scheme.hex();
    let label = b.add(
        text(format!("Step {}", cursor.step_number), 28, color),
        at(-4.5, cursor.y),
    );
    b.play(vec![label], Animation::FadeIn, t.label.unwrap_or(b.pacing.label_secs));
    let body = b.add(
        text(sanitize(&segment.display_text, Profile::Display), 32, WHITE),
        right_of(label),
    );
    b.play(vec![body], Animation::Write, t.write);
    b.wait(t.hold);
    cursor.show([label, body]).advance(1)
}

fn emit_equation(b: &mut SceneBuilder, segment: &Segment, cursor: LayoutCursor) -> LayoutCursor {
    let t = timing::equation(segment.timing_duration(), b.pacing);
    let color = segment.color_scheme.hex();
    let label = b.add(text("Equation:".to_string(), 28, color), at(-4.5, cursor.y));
    b.play(vec![label], Animation::Write, t.label.unwrap_or(b.pacing.label_secs));
    let body = b.add(
        math(sanitize(&segment.display_text, Profile::Math), 44, WHITE),
        right_of(label),
    );
    b.play(vec![body], Animation::Write, t.write);
    b.wait(t.hold);
    cursor.show([label, body]).advance(1)
}

fn emit_diagram(b: &mut SceneBuilder, segment: &Segment, cursor: LayoutCursor) -> LayoutCursor {
    let t = timing::diagram(segment.timing_duration(), b.pacing);
    let color = segment.color_scheme.hex();
    let label = b.add(
        text(sanitize(&segment.display_text, Profile::Display), 32, WHITE),
        at(-2.5, cursor.y),
    );
    b.play(vec![label], Animation::Write, t.label.unwrap_or(b.pacing.label_secs));
    let shape = b.add(
        Element::Shape {
            shape: ShapeKind::Circle,
            size: 0.6,
            color: color.to_string(),
        },
        Placement::NextTo {
            target: label,
            direction: Direction::Down,
        },
    );
    b.play(vec![shape], Animation::Create, t.write);
    b.wait(t.hold);
    cursor.show([label, shape]).advance(2)
}

fn emit_split(b: &mut SceneBuilder, segment: &Segment, cursor: LayoutCursor) -> LayoutCursor {
    let t = timing::split(segment.timing_duration(), b.pacing);
    let left = b.add(
        text(sanitize(&segment.display_text, Profile::Display), 32, segment.color_scheme.hex()),
        at(-3.5, cursor.y),
    );
    b.play(vec![left], Animation::Write, t.write);
    let right = b.add(
        text(excerpt(&segment.narration, SPLIT_EXCERPT_WORDS), 24, WHITE),
        at(3.0, cursor.y),
    );
    b.play(vec![right], Animation::FadeIn, t.secondary.unwrap_or(t.write));
    b.wait(t.hold);
    cursor.show([left, right]).advance(1)
}

fn emit_example(b: &mut SceneBuilder, segment: &Segment, cursor: LayoutCursor) -> LayoutCursor {
    let t = timing::example(segment.timing_duration(), b.pacing);
    let label = b.add(text("Example:".to_string(), 28, YELLOW), at(-4.5, cursor.y));
    b.play(vec![label], Animation::Write, t.label.unwrap_or(b.pacing.label_secs));
    let body = b.add(
        text(sanitize(&segment.display_text, Profile::Display), 32, segment.color_scheme.hex()),
        right_of(label),
    );
    b.play(vec![body], Animation::Write, t.write);
    b.wait(t.hold);
    cursor.show([label, body]).advance(1)
}

fn emit_fallback(b: &mut SceneBuilder, segment: &Segment, cursor: LayoutCursor) -> LayoutCursor {
    let t = timing::fallback(segment.timing_duration(), b.pacing);
    let id = b.add(
        text(sanitize(&segment.display_text, Profile::Display), 36, WHITE),
        at(0.0, cursor.y),
    );
    b.play(vec![id], Animation::Write, t.write);
    b.wait(t.hold);
    cursor.show([id]).advance(1)
}

fn lines_needed(layout: Layout, segment: &Segment) -> usize {
    match layout {
        Layout::Calculation => segment.calculation_steps().len(),
        Layout::Diagram => 2,
        _ => 1,
    }
}

/// Emits one segment's instructions and returns the cursor for the next segment.
fn emit_segment(
    b: &mut SceneBuilder,
    segment: &Segment,
    cursor: LayoutCursor,
) -> LayoutCursor {
    let layout = effective_layout(segment);
    let opening_title = layout == Layout::Title && !cursor.title_shown;

    let cursor = if opening_title {
        cursor
    } else {
        b.make_room(cursor, lines_needed(layout, segment))
    };

    b.segment = Some(segment.index);
    let mut cursor = match layout {
        Layout::Title if opening_title => emit_opening_title(b, segment, cursor),
        Layout::Title => emit_header(b, segment, cursor),
        Layout::Calculation => emit_calculation(b, segment, cursor),
        Layout::Step => emit_step(b, segment, cursor),
        Layout::Equation => emit_equation(b, segment, cursor),
        Layout::Diagram => emit_diagram(b, segment, cursor),
        Layout::Split => emit_split(b, segment, cursor),
        Layout::Example => emit_example(b, segment, cursor),
        Layout::Text => emit_fallback(b, segment, cursor),
    };
    b.segment = None;

    cursor.segments_since_compaction += 1;
    cursor
}

/// Compiles segments, in order, into a scene program. Infallible for any layout value;
/// well-formedness is checked separately by [`super::validate`].
pub fn compile(segments: &[Segment], pacing: &Pacing) -> SceneProgram {
    let mut builder = SceneBuilder::new(pacing);
    let mut cursor = LayoutCursor::default();
    for segment in segments {
        cursor = emit_segment(&mut builder, segment, cursor);
    }
    builder.wait(pacing.closing_hold_secs);
    builder.program
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::{ColorScheme, StepData};

    fn segment(index: usize, layout: Layout, duration: f64) -> Segment {
        Segment {
            index,
            duration,
            actual_duration: Some(duration),
            narration: "Narration for this part of the video".to_string(),
            display_text: format!("Segment {index}"),
            layout,
            step_data: None,
            color_scheme: ColorScheme::Blue,
        }
    }

    fn calc(index: usize, steps: &[&str], notes: &[&str], duration: f64) -> Segment {
        Segment {
            step_data: Some(StepData {
                calculation_steps: steps.iter().map(|s| s.to_string()).collect(),
                annotations: notes.iter().map(|s| s.to_string()).collect(),
            }),
            ..segment(index, Layout::Calculation, duration)
        }
    }

    #[test]
    fn empty_calculation_degrades_to_fallback() {
        let seg = calc(0, &[], &[], 5.0);
        assert_eq!(effective_layout(&seg), Layout::Text);
        let second = Segment { index: 1, ..seg.clone() };
        let program = compile(&[seg, second], &Pacing::default());
        let plays = program
            .segment_ops(0)
            .filter(|op| matches!(op, Op::Play { .. }))
            .count();
        assert_eq!(plays, 1);
    }

    #[test]
    fn cursor_moves_down_per_line() {
        let pacing = Pacing::default();
        let mut b = SceneBuilder::new(&pacing);
        let cursor = emit_segment(&mut b, &segment(0, Layout::Text, 4.0), LayoutCursor::default());
        assert!((cursor.y - (CURSOR_TOP - LINE_STEP)).abs() < 1e-9);
        let cursor = emit_segment(&mut b, &segment(1, Layout::Diagram, 4.0), cursor);
        assert!((cursor.y - (CURSOR_TOP - 3.0 * LINE_STEP)).abs() < 1e-9);
        assert_eq!(cursor.segments_since_compaction, 2);
    }

    #[test]
    fn opening_title_is_removed_and_second_title_becomes_header() {
        let pacing = Pacing::default();
        let program = compile(
            &[segment(0, Layout::Title, 10.0), segment(1, Layout::Title, 10.0)],
            &pacing,
        );
        assert!(program.segment_ops(0).any(|op| matches!(op, Op::Remove { .. })));
        assert!((program.segment_seconds(0) - 10.0).abs() < 1e-9);
        assert!(!program.segment_ops(1).any(|op| matches!(op, Op::Remove { .. })));
        assert!((program.segment_seconds(1) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn compaction_dims_then_sweeps() {
        let pacing = Pacing::default();
        let mut segs = vec![segment(0, Layout::Title, 4.0)];
        segs.extend((1..9).map(|i| segment(i, Layout::Text, 2.0)));
        let program = compile(&segs, &pacing);
        let dims = program
            .instructions
            .iter()
            .filter(|i| i.segment.is_none() && matches!(i.op, Op::Dim { .. }))
            .count();
        let removes = program
            .instructions
            .iter()
            .filter(|i| i.segment.is_none() && matches!(i.op, Op::Remove { .. }))
            .count();
        assert_eq!(dims, 2);
        assert_eq!(removes, 1);
    }

    #[test]
    fn long_calculation_wraps_to_top() {
        let pacing = Pacing::default();
        let steps: Vec<String> = (0..12).map(|i| format!("x = {i}")).collect();
        let refs: Vec<&str> = steps.iter().map(String::as_str).collect();
        let program = compile(&[calc(0, &refs, &[], 24.0), segment(1, Layout::Text, 3.0)], &pacing);
        let ys: Vec<f64> = program
            .instructions
            .iter()
            .filter_map(|i| match &i.op {
                Op::Add {
                    placement: Placement::At { y, .. },
                    element: Element::Math { .. },
                    ..
                } => Some(*y),
                _ => None,
            })
            .collect();
        assert_eq!(ys.len(), 12);
        assert!(ys.iter().all(|y| *y >= CURSOR_FLOOR));
        assert_eq!(ys[8], CURSOR_TOP);
    }

    #[test]
    fn diagram_shape_sits_below_its_label() {
        let program = compile(&[segment(0, Layout::Diagram, 4.0)], &Pacing::default());
        let shape = program.instructions.iter().find_map(|i| match &i.op {
            Op::Add {
                element: Element::Shape { .. },
                placement,
                ..
            } => Some(*placement),
            _ => None,
        });
        match shape {
            Some(Placement::NextTo { direction, .. }) => assert_eq!(direction, Direction::Down),
            other => panic!("unexpected shape placement {other:?}"),
        }
    }

    #[test]
    fn program_ends_with_closing_hold() {
        let pacing = Pacing::default();
        let program = compile(&[segment(0, Layout::Split, 4.0), segment(1, Layout::Example, 4.0)], &pacing);
        let last = program.instructions.last().unwrap();
        assert_eq!(last.segment, None);
        assert_eq!(last.op, Op::Wait { seconds: 2.0 });
    }
}
