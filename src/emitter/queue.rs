use super::scroll::ScrollTranslator;
use super::sink::{PointerAction, PointerSink};
use crate::config::EmitterConfig;
use crate::error::EmitError;
use crate::gesture::{Button, GestureEvent, GestureKind};
use std::collections::{BTreeSet, VecDeque};
use tracing::{debug, error, warn};

type Frame = Vec<PointerAction>;

/// Maps gesture events onto pointer frames and delivers them in order.
///
/// Frames the sink refuses stay queued and are retried ahead of anything
/// newer. While a backlog exists, consecutive plain moves collapse into the
/// latest one.
pub struct EventEmitter {
    sink: Box<dyn PointerSink>,
    queue: VecDeque<Frame>,
    /// Buttons logically down once every queued frame is delivered
    pressed: BTreeSet<Button>,
    scroll: Option<ScrollTranslator>,
    max_retries: u32,
    failures: u32,
}

impl EventEmitter {
    pub fn new(config: &EmitterConfig, sink: Box<dyn PointerSink>) -> Self {
        Self {
            sink,
            queue: VecDeque::new(),
            pressed: BTreeSet::new(),
            scroll: config
                .scroll
                .then(|| ScrollTranslator::new(config.scroll_divisor)),
            max_retries: config.max_retries.max(1),
            failures: 0,
        }
    }

    /// Frames waiting for the sink
    pub fn backlog(&self) -> usize {
        self.queue.len()
    }

    pub fn is_pressed(&self, button: Button) -> bool {
        self.pressed.contains(&button)
    }

    pub fn emit(&mut self, event: &GestureEvent) -> Result<(), EmitError> {
        self.enqueue_event(event);
        self.flush()
    }

    /// Queue the frames for `event` without delivering them
    pub fn enqueue_event(&mut self, event: &GestureEvent) {
        let (x, y) = (event.position.x, event.position.y);
        let move_to = PointerAction::MoveTo { x, y };

        match event.kind {
            GestureKind::PointerMove | GestureKind::DragMove => self.enqueue(vec![move_to]),
            GestureKind::PointerDown | GestureKind::DragStart => {
                let mut frame = vec![move_to];
                if self.press(event.button) {
                    frame.push(PointerAction::Press(event.button));
                }
                self.enqueue(frame);
            }
            GestureKind::PointerUp | GestureKind::DragEnd => {
                if self.release(event.button) {
                    self.enqueue(vec![PointerAction::Release(event.button)]);
                }
            }
            GestureKind::Tap => {
                if self.press(event.button) {
                    self.enqueue(vec![move_to, PointerAction::Press(event.button)]);
                    self.release(event.button);
                    self.enqueue(vec![PointerAction::Release(event.button)]);
                }
            }
            GestureKind::MultiTouchBegin | GestureKind::MultiTouchEnd => {
                if let Some(scroll) = self.scroll.as_mut() {
                    scroll.reset();
                }
            }
            GestureKind::MultiTouchMove { .. } => {
                if let Some(action) = self.scroll.as_mut().and_then(|scroll| scroll.feed(event)) {
                    self.enqueue(vec![action]);
                }
            }
        }
    }

    /// Queue a release for every button still logically down
    pub fn release_all(&mut self) -> Result<(), EmitError> {
        let held: Vec<Button> = self.pressed.iter().copied().collect();
        for button in held {
            debug!("Releasing {:?} button", button);
            self.release(button);
            self.enqueue(vec![PointerAction::Release(button)]);
        }
        self.flush()
    }

    /// Deliver queued frames until the sink refuses one
    pub fn flush(&mut self) -> Result<(), EmitError> {
        while let Some(frame) = self.queue.front() {
            match self.sink.send(frame) {
                Ok(()) => {
                    self.queue.pop_front();
                    self.failures = 0;
                }
                Err(err) if err.is_transient() => {
                    self.failures += 1;
                    if self.failures >= self.max_retries {
                        error!(
                            "Pointer sink failed {} times in a row, giving up: {}",
                            self.failures, err
                        );
                        return Err(EmitError::Exhausted {
                            attempts: self.failures,
                            details: err.to_string(),
                        });
                    }
                    warn!(
                        "Pointer sink busy ({}), {} frames queued for retry",
                        err,
                        self.queue.len()
                    );
                    return Err(err);
                }
                Err(err) => {
                    error!("Pointer sink failed: {}", err);
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    fn press(&mut self, button: Button) -> bool {
        if !self.pressed.insert(button) {
            warn!("{:?} button already down, press skipped", button);
            return false;
        }
        true
    }

    fn release(&mut self, button: Button) -> bool {
        if !self.pressed.remove(&button) {
            warn!("{:?} button not down, release dropped", button);
            return false;
        }
        true
    }

    fn enqueue(&mut self, frame: Frame) {
        let is_move = |frame: &Frame| {
            frame
                .iter()
                .all(|action| matches!(action, PointerAction::MoveTo { .. }))
        };

        if is_move(&frame) {
            if let Some(last) = self.queue.back_mut() {
                if is_move(last) {
                    *last = frame;
                    return;
                }
            }
        }
        self.queue.push_back(frame);
    }
}
