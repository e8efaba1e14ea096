mod model;
mod step;

pub use model::{Sequence, SequenceState, ValidationError, Violation};
pub use step::Step;
