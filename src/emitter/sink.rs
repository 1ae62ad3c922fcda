use crate::error::EmitError;
use crate::gesture::Button;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

/// Low-level action understood by a virtual pointer device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerAction {
    MoveTo { x: i32, y: i32 },
    Press(Button),
    Release(Button),
    /// Wheel steps; positive `vertical` scrolls up, positive `horizontal` scrolls right
    Scroll { vertical: i32, horizontal: i32 },
}

/// Output boundary of the pipeline.
///
/// A frame is a group of actions the device must see as one report. Sinks
/// accept frames strictly in order and only fail transiently.
pub trait PointerSink: Send {
    fn send(&mut self, frame: &[PointerAction]) -> Result<(), EmitError>;
}

impl<S: PointerSink + ?Sized> PointerSink for Box<S> {
    fn send(&mut self, frame: &[PointerAction]) -> Result<(), EmitError> {
        (**self).send(frame)
    }
}

#[derive(Debug, Default)]
struct Recording {
    frames: Vec<Vec<PointerAction>>,
    failures_left: u32,
    failing: bool,
}

/// Sink that keeps every accepted frame in memory. Clones share the same
/// recording, so a handle kept outside the pipeline can inspect it.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    inner: Arc<Mutex<Recording>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the next `count` frames as busy
    pub fn fail_next(&self, count: u32) {
        self.inner.lock().failures_left = count;
    }

    /// Reject every frame until cleared
    pub fn set_failing(&self, failing: bool) {
        self.inner.lock().failing = failing;
    }

    pub fn frames(&self) -> Vec<Vec<PointerAction>> {
        self.inner.lock().frames.clone()
    }

    pub fn actions(&self) -> Vec<PointerAction> {
        self.inner.lock().frames.iter().flatten().copied().collect()
    }

    pub fn clear(&self) {
        self.inner.lock().frames.clear();
    }
}

impl PointerSink for RecordingSink {
    fn send(&mut self, frame: &[PointerAction]) -> Result<(), EmitError> {
        let mut inner = self.inner.lock();
        if inner.failing {
            return Err(EmitError::Busy {
                details: "recording sink is failing".to_string(),
            });
        }
        if inner.failures_left > 0 {
            inner.failures_left -= 1;
            return Err(EmitError::Busy {
                details: "forced failure".to_string(),
            });
        }

        debug!("Pointer frame: {:?}", frame);
        inner.frames.push(frame.to_vec());
        Ok(())
    }
}
