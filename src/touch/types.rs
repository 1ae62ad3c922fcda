use crate::calibration::Point;
use crate::gesture::GesturePhase;
use std::fmt;
use std::time::Duration;

/// What a single hardware datum reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawEventKind {
    /// The slot started tracking a contact
    Touchdown,
    /// The slot stopped tracking its contact
    Liftoff,
    PositionX(i32),
    PositionY(i32),
    Pressure(i32),
}

/// One hardware-reported datum.
///
/// `slot` is `None` when the hardware sent no slot marker ahead of the datum;
/// it then belongs to the most recently addressed slot. Timestamps are
/// monotonic offsets from the start of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawTouchEvent {
    pub slot: Option<usize>,
    pub kind: RawEventKind,
    pub timestamp: Duration,
}

impl RawTouchEvent {
    pub fn new(slot: Option<usize>, kind: RawEventKind, timestamp: Duration) -> Self {
        Self {
            slot,
            kind,
            timestamp,
        }
    }

    pub fn touchdown(slot: usize, timestamp: Duration) -> Self {
        Self::new(Some(slot), RawEventKind::Touchdown, timestamp)
    }

    pub fn liftoff(slot: usize, timestamp: Duration) -> Self {
        Self::new(Some(slot), RawEventKind::Liftoff, timestamp)
    }

    pub fn position_x(slot: usize, x: i32, timestamp: Duration) -> Self {
        Self::new(Some(slot), RawEventKind::PositionX(x), timestamp)
    }

    pub fn position_y(slot: usize, y: i32, timestamp: Duration) -> Self {
        Self::new(Some(slot), RawEventKind::PositionY(y), timestamp)
    }
}

/// Stable identity of a contact, never reused within the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContactId(pub u64);

impl fmt::Display for ContactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A tracked touch point, from touchdown to committed liftoff
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    pub id: ContactId,
    pub slot: usize,
    /// Accepted position in device units
    pub raw: Point,
    pub prev_raw: Point,
    /// Accepted position in display units
    pub position: Point,
    pub prev_position: Point,
    pub pressure: Option<i32>,
    pub first_touch: Duration,
    pub last_update: Duration,
    /// Set while a liftoff is held back by the debounce filter, and on the
    /// final snapshot handed out at commit
    pub liftoff_at: Option<Duration>,
    pub phase: GesturePhase,
}

impl Contact {
    pub fn is_lifting(&self) -> bool {
        self.liftoff_at.is_some()
    }

    /// Time from touchdown to liftoff, or to `now` if still down
    pub fn held_for(&self, now: Duration) -> Duration {
        self.liftoff_at
            .unwrap_or(now)
            .saturating_sub(self.first_touch)
    }
}

/// What changed for a contact during one cycle, after filtering
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ContactUpdate {
    Down(Contact),
    Moved(Contact),
    /// Liftoff committed; the contact has left the live set
    Up(Contact),
}

impl ContactUpdate {
    pub fn contact(&self) -> &Contact {
        match self {
            ContactUpdate::Down(contact)
            | ContactUpdate::Moved(contact)
            | ContactUpdate::Up(contact) => contact,
        }
    }

    pub fn id(&self) -> ContactId {
        self.contact().id
    }
}
