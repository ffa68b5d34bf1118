//! Scene compiler: turns duration-reconciled segments into a typed drawing program whose
//! timing is derived from each segment's measured narration length.

pub mod compile;
pub mod model;
pub mod timing;
pub mod validate;

pub use compile::{LayoutCursor, compile};
pub use model::{Animation, Element, ElementId, Instruction, Op, Placement, SceneProgram};
pub use validate::validate;
