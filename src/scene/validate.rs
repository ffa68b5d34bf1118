use super::model::{Element, ElementId, Op, Placement, SceneProgram};
use crate::error::{PipelineError, Result};
use crate::sanitize::{Profile, sanitize};
use std::collections::HashSet;

fn is_hex_color(color: &str) -> bool {
    color.len() == 7
        && color.starts_with('#')
        && color[1..].chars().all(|c| c.is_ascii_hexdigit())
}

fn check_time(what: &str, position: usize, seconds: f64) -> Result<()> {
    if seconds.is_finite() && seconds > 0.0 {
        return Ok(());
    }
    Err(PipelineError::validation(format!(
        "instruction {position}: {what} must be a positive finite time, got {seconds}"
    )))
}

fn check_alive(alive: &HashSet<ElementId>, position: usize, id: ElementId) -> Result<()> {
    if alive.contains(&id) {
        return Ok(());
    }
    Err(PipelineError::validation(format!(
        "instruction {position}: element {} is not on screen",
        id.0
    )))
}

fn check_element(alive: &HashSet<ElementId>, position: usize, element: &Element) -> Result<()> {
    let (profile, color) = match element {
        Element::Text { color, .. } => (Profile::Display, color),
        Element::Math { color, .. } => (Profile::Math, color),
        Element::Box { target, color } => {
            check_alive(alive, position, *target)?;
            (Profile::Display, color)
        }
        Element::Shape { size, color, .. } => {
            check_time("shape size", position, *size)?;
            (Profile::Display, color)
        }
    };

    if !is_hex_color(color) {
        return Err(PipelineError::validation(format!(
            "instruction {position}: bad color {color:?}"
        )));
    }

    if let Some(text) = element.text_payload() {
        // A clean payload is a fixed point of the sanitizer.
        if text.trim().is_empty() || sanitize(text, profile) != text {
            return Err(PipelineError::validation(format!(
                "instruction {position}: unsafe or empty text {text:?}"
            )));
        }
    }
    Ok(())
}

/// Checks a compiled program before it is handed to the renderer: element references
/// resolve to live elements, every timed op has a positive duration and all text is
/// already sanitized.
pub fn validate(program: &SceneProgram) -> Result<()> {
    if program.instructions.is_empty() {
        return Err(PipelineError::validation("program has no instructions"));
    }

    let mut seen = HashSet::new();
    let mut alive = HashSet::new();

    for (position, instruction) in program.instructions.iter().enumerate() {
        match &instruction.op {
            Op::Add {
                id,
                element,
                placement,
            } => {
                if !seen.insert(*id) {
                    return Err(PipelineError::validation(format!(
                        "instruction {position}: element id {} reused",
                        id.0
                    )));
                }
                if let Some(target) = placement.target() {
                    check_alive(&alive, position, target)?;
                }
                if let Placement::At { x, y } = placement {
                    if !x.is_finite() || !y.is_finite() {
                        return Err(PipelineError::validation(format!(
                            "instruction {position}: non-finite position"
                        )));
                    }
                }
                check_element(&alive, position, element)?;
                alive.insert(*id);
            }
            Op::Play {
                targets, run_time, ..
            } => {
                if targets.is_empty() {
                    return Err(PipelineError::validation(format!(
                        "instruction {position}: play without targets"
                    )));
                }
                for id in targets {
                    check_alive(&alive, position, *id)?;
                }
                check_time("run_time", position, *run_time)?;
            }
            Op::Wait { seconds } => check_time("wait", position, *seconds)?,
            Op::Dim {
                ids,
                opacity,
                run_time,
            } => {
                if !(*opacity > 0.0 && *opacity <= 1.0) {
                    return Err(PipelineError::validation(format!(
                        "instruction {position}: opacity {opacity} out of range"
                    )));
                }
                for id in ids {
                    check_alive(&alive, position, *id)?;
                }
                check_time("run_time", position, *run_time)?;
            }
            Op::Remove { ids, run_time } => {
                for id in ids {
                    check_alive(&alive, position, *id)?;
                    alive.remove(id);
                }
                check_time("run_time", position, *run_time)?;
            }
        }
    }

    program.to_json()?;
    Ok(())
}
