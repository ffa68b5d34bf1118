use crate::error::Result;
use serde::{Deserialize, Serialize};

pub const SCENE_NAME: &str = "MathScene";
pub const BACKGROUND: &str = "#0a0a0a";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Right,
    Down,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind {
    Circle,
    Square,
    Arrow,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Element {
    Text {
        content: String,
        font_size: u32,
        color: String,
    },
    Math {
        tex: String,
        font_size: u32,
        color: String,
    },
    /// Outline drawn around another element.
    Box { target: ElementId, color: String },
    Shape {
        shape: ShapeKind,
        size: f64,
        color: String,
    },
}

impl Element {
    /// Text payload handed to the renderer's typesetter, if any.
    pub fn text_payload(&self) -> Option<&str> {
        match self {
            Element::Text { content, .. } => Some(content),
            Element::Math { tex, .. } => Some(tex),
            Element::Box { .. } | Element::Shape { .. } => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Placement {
    At { x: f64, y: f64 },
    NextTo { target: ElementId, direction: Direction },
    Around { target: ElementId },
}

impl Placement {
    pub fn target(&self) -> Option<ElementId> {
        match self {
            Placement::At { .. } => None,
            Placement::NextTo { target, .. } | Placement::Around { target } => Some(*target),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Animation {
    Write,
    FadeIn,
    Create,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    /// Registers an element; it becomes visible through a later `Play`.
    Add {
        id: ElementId,
        element: Element,
        placement: Placement,
    },
    Play {
        targets: Vec<ElementId>,
        animation: Animation,
        run_time: f64,
    },
    Wait { seconds: f64 },
    Dim {
        ids: Vec<ElementId>,
        opacity: f64,
        run_time: f64,
    },
    /// Fades the elements out and drops them from the scene.
    Remove { ids: Vec<ElementId>, run_time: f64 },
}

impl Op {
    /// Scene time this op consumes.
    pub fn seconds(&self) -> f64 {
        match self {
            Op::Add { .. } => 0.0,
            Op::Play { run_time, .. } | Op::Dim { run_time, .. } | Op::Remove { run_time, .. } => {
                *run_time
            }
            Op::Wait { seconds } => *seconds,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    /// Segment this instruction belongs to; `None` for transitions between segments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment: Option<usize>,
    #[serde(flatten)]
    pub op: Op,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SceneProgram {
    pub scene_name: String,
    pub background: String,
    pub instructions: Vec<Instruction>,
}

impl Default for SceneProgram {
    fn default() -> Self {
        Self {
            scene_name: SCENE_NAME.to_string(),
            background: BACKGROUND.to_string(),
            instructions: Vec::new(),
        }
    }
}

impl SceneProgram {
    pub fn total_seconds(&self) -> f64 {
        self.instructions.iter().map(|i| i.op.seconds()).sum()
    }

    pub fn segment_seconds(&self, segment: usize) -> f64 {
        self.segment_ops(segment).map(Op::seconds).sum()
    }

    pub fn segment_ops(&self, segment: usize) -> impl Iterator<Item = &Op> {
        self.instructions
            .iter()
            .filter(move |i| i.segment == Some(segment))
            .map(|i| &i.op)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
