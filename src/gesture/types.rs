use crate::calibration::Point;
use crate::touch::ContactId;
use std::time::Duration;

/// Per-contact classification state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GesturePhase {
    #[default]
    Idle,
    Pressed,
    /// Lifted quickly without moving. Never held between updates: the Tap
    /// is emitted and the contact returns to Idle in the same step.
    Tapped,
    Dragging,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Button {
    Left,
    Right,
    Middle,
}

impl Button {
    /// Button selected by a multi-finger tap
    pub fn for_fingers(fingers: u8) -> Self {
        match fingers {
            0 | 1 => Button::Left,
            2 => Button::Right,
            _ => Button::Middle,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureKind {
    PointerDown,
    PointerMove,
    PointerUp,
    Tap,
    DragStart,
    DragMove,
    DragEnd,
    MultiTouchBegin,
    MultiTouchEnd,
    /// Accepted movement of one contact while multi-touch is active
    MultiTouchMove { delta: (i32, i32) },
}

/// A semantic pointer action produced by the classifier
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureEvent {
    pub kind: GestureKind,
    pub position: Point,
    pub button: Button,
    /// Number of contacts involved
    pub fingers: u8,
    pub contact: Option<ContactId>,
    pub timestamp: Duration,
}

impl GestureEvent {
    pub fn new(kind: GestureKind, position: Point, timestamp: Duration) -> Self {
        Self {
            kind,
            position,
            button: Button::Left,
            fingers: 1,
            contact: None,
            timestamp,
        }
    }

    pub fn with_button(mut self, button: Button) -> Self {
        self.button = button;
        self
    }

    pub fn with_fingers(mut self, fingers: u8) -> Self {
        self.fingers = fingers;
        self
    }

    pub fn for_contact(mut self, id: ContactId) -> Self {
        self.contact = Some(id);
        self
    }

    pub fn is_multi_touch(&self) -> bool {
        matches!(
            self.kind,
            GestureKind::MultiTouchBegin
                | GestureKind::MultiTouchEnd
                | GestureKind::MultiTouchMove { .. }
        )
    }
}
