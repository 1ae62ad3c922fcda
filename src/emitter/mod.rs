mod queue;
mod scroll;
mod sink;
#[cfg(all(feature = "device", target_os = "linux"))]
mod uinput;


pub use queue::EventEmitter;
pub use scroll::ScrollTranslator;
pub use sink::{PointerAction, PointerSink, RecordingSink};
#[cfg(all(feature = "device", target_os = "linux"))]
pub use uinput::UinputSink;
