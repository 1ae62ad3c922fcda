pub mod app;
pub mod calibration;
pub mod config;
pub mod emitter;
pub mod error;
pub mod gesture;
pub mod touch;
pub mod translator;

#[cfg(all(feature = "device", target_os = "linux"))]
pub mod input;

pub use app::{ReplaySource, ReplayStep, ScreentouchDaemon, ShutdownReason, TouchSource};
pub use calibration::{build_transform, Bounds, CalibrationSlot, CalibrationTransform, Point};
pub use config::{Rotation, ScreentouchConfig};
pub use emitter::{EventEmitter, PointerAction, PointerSink, RecordingSink, ScrollTranslator};
pub use error::{CalibrationError, DeviceError, EmitError, ErrorExt, Result, ScreentouchError};
pub use gesture::{Button, GestureClassifier, GestureEvent, GestureKind, GesturePhase};
pub use touch::{ContactId, ContactTracker, ContactUpdate, DebounceFilter, RawTouchEvent};
pub use translator::Translator;

#[cfg(all(feature = "device", target_os = "linux"))]
pub use emitter::UinputSink;

#[cfg(all(feature = "device", target_os = "linux"))]
pub use input::{discover_touch_devices, MtDecoder, TouchDevice};
