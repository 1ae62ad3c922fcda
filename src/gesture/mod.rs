mod classifier;
mod types;


pub use classifier::{GestureClassifier, MultiTouchState};
pub use types::{Button, GestureEvent, GestureKind, GesturePhase};
