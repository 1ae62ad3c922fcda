use super::types::{Button, GestureEvent, GestureKind, GesturePhase};
use crate::calibration::Point;
use crate::config::GestureConfig;
use crate::touch::{Contact, ContactId, ContactUpdate};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy)]
struct ContactMachine {
    phase: GesturePhase,
    origin: Point,
    last: Point,
    touched_at: Duration,
    /// Took part in a multi-touch session; only moves the cursor once it ended
    grouped: bool,
    /// Button held while dragging
    button: Button,
}

/// State shared across contacts while two or more are down
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MultiTouchState {
    pub active: bool,
    pub max_fingers: u8,
    /// Some participant moved beyond the movement threshold
    pub moved: bool,
    /// Earliest touchdown among the participants
    pub started_at: Duration,
}

/// Turns filtered contact updates into gesture events.
///
/// Each live contact has its own small state machine keyed by identity; the
/// multi-touch session is tracked separately in [`MultiTouchState`].
pub struct GestureClassifier {
    move_threshold: f64,
    hold_threshold: Duration,
    multi_finger_buttons: bool,
    /// A lone touch this soon after a multi-finger tap drags with its button
    tap_drag_window: Duration,
    /// Button and liftoff time of the last multi-finger tap
    armed: Option<(Button, Duration)>,
    machines: HashMap<ContactId, ContactMachine>,
    multi: MultiTouchState,
}

impl GestureClassifier {
    pub fn new(config: &GestureConfig) -> Self {
        Self::with_settings(
            config.move_threshold as f64,
            config.hold_threshold(),
            config.multi_finger_buttons,
        )
        .with_tap_drag(config.tap_drag_window())
    }

    pub fn with_settings(
        move_threshold: f64,
        hold_threshold: Duration,
        multi_finger_buttons: bool,
    ) -> Self {
        Self {
            move_threshold,
            hold_threshold,
            multi_finger_buttons,
            tap_drag_window: Duration::ZERO,
            armed: None,
            machines: HashMap::new(),
            multi: MultiTouchState::default(),
        }
    }

    /// Zero turns tap-then-drag off
    pub fn with_tap_drag(mut self, window: Duration) -> Self {
        self.tap_drag_window = window;
        self
    }

    pub fn phase(&self, id: ContactId) -> GesturePhase {
        self.machines
            .get(&id)
            .map(|machine| machine.phase)
            .unwrap_or_default()
    }

    pub fn multi_touch(&self) -> &MultiTouchState {
        &self.multi
    }

    pub fn active_count(&self) -> usize {
        self.machines.len()
    }

    /// Classify one contact update
    pub fn handle(&mut self, update: &ContactUpdate) -> Vec<GestureEvent> {
        match update {
            ContactUpdate::Down(contact) => self.on_down(contact),
            ContactUpdate::Moved(contact) => self.on_move(contact),
            ContactUpdate::Up(contact) => self.on_up(contact, false),
        }
    }

    /// Classify a liftoff synthesised at shutdown. Drags and multi-touch
    /// sessions are closed but no tap or click is produced.
    pub fn cancel(&mut self, update: &ContactUpdate) -> Vec<GestureEvent> {
        match update {
            ContactUpdate::Up(contact) => self.on_up(contact, true),
            _ => Vec::new(),
        }
    }

    pub fn reset(&mut self) {
        if !self.machines.is_empty() {
            debug!("Resetting {} gesture state machines", self.machines.len());
        }
        self.machines.clear();
        self.multi = MultiTouchState::default();
        self.armed = None;
    }

    fn finger_count(&self) -> u8 {
        u8::try_from(self.machines.len()).unwrap_or(u8::MAX)
    }

    fn on_down(&mut self, contact: &Contact) -> Vec<GestureEvent> {
        if self.machines.contains_key(&contact.id) {
            debug!(
                "Repeated touchdown for contact {} treated as motion",
                contact.id
            );
            return self.on_move(contact);
        }

        let window = self.tap_drag_window;
        let follow_on = self.armed.take().filter(|(_, tapped_at)| {
            self.machines.is_empty() && contact.first_touch.saturating_sub(*tapped_at) <= window
        });

        let mut machine = ContactMachine {
            phase: GesturePhase::Pressed,
            origin: contact.position,
            last: contact.position,
            touched_at: contact.first_touch,
            grouped: self.multi.active,
            button: Button::Left,
        };
        if let Some((button, _)) = follow_on {
            debug!("Contact {} drags with {:?} after a tap", contact.id, button);
            machine.phase = GesturePhase::Dragging;
            machine.button = button;
            self.machines.insert(contact.id, machine);
            return vec![GestureEvent::new(
                GestureKind::DragStart,
                contact.position,
                contact.first_touch,
            )
            .with_button(button)
            .for_contact(contact.id)];
        }
        self.machines.insert(contact.id, machine);

        let fingers = self.finger_count();
        if fingers < 2 {
            return Vec::new();
        }

        if self.multi.active {
            self.multi.max_fingers = self.multi.max_fingers.max(fingers);
            self.multi.started_at = self.multi.started_at.min(contact.first_touch);
            debug!("Contact {} joined multi-touch ({} fingers)", contact.id, fingers);
            return Vec::new();
        }

        self.begin_multi_touch(contact, fingers)
    }

    fn begin_multi_touch(&mut self, contact: &Contact, fingers: u8) -> Vec<GestureEvent> {
        let mut events = Vec::new();

        let mut ids: Vec<ContactId> = self.machines.keys().copied().collect();
        ids.sort();
        let mut started_at = contact.first_touch;

        for id in ids {
            let Some(machine) = self.machines.get_mut(&id) else {
                continue;
            };
            // A drag in progress must let go of the button before the session starts
            if machine.phase == GesturePhase::Dragging {
                events.push(
                    GestureEvent::new(GestureKind::DragEnd, machine.last, contact.first_touch)
                        .with_button(machine.button)
                        .for_contact(id),
                );
                machine.phase = GesturePhase::Pressed;
            }
            machine.grouped = true;
            started_at = started_at.min(machine.touched_at);
        }

        self.multi = MultiTouchState {
            active: true,
            max_fingers: fingers,
            moved: false,
            started_at,
        };

        debug!("Multi-touch began with {} fingers", fingers);
        events.push(
            GestureEvent::new(
                GestureKind::MultiTouchBegin,
                contact.position,
                contact.first_touch,
            )
            .with_fingers(fingers)
            .for_contact(contact.id),
        );
        events
    }

    fn on_move(&mut self, contact: &Contact) -> Vec<GestureEvent> {
        let fingers = self.finger_count();
        let threshold = self.move_threshold;

        let Some(machine) = self.machines.get_mut(&contact.id) else {
            warn!("Discarding motion for unknown contact {}", contact.id);
            return Vec::new();
        };
        machine.last = contact.position;

        if machine.grouped {
            if !self.multi.active {
                return vec![GestureEvent::new(
                    GestureKind::PointerMove,
                    contact.position,
                    contact.last_update,
                )
                .for_contact(contact.id)];
            }
            if machine.origin.distance_to(contact.position) > threshold {
                self.multi.moved = true;
            }
            let delta = contact.prev_position.delta_to(contact.position);
            return vec![GestureEvent::new(
                GestureKind::MultiTouchMove { delta },
                contact.position,
                contact.last_update,
            )
            .with_fingers(fingers)
            .for_contact(contact.id)];
        }

        match machine.phase {
            GesturePhase::Pressed => {
                if machine.origin.distance_to(contact.position) <= threshold {
                    return Vec::new();
                }
                machine.phase = GesturePhase::Dragging;
                debug!("Contact {} started dragging", contact.id);
                vec![
                    GestureEvent::new(GestureKind::DragStart, machine.origin, contact.last_update)
                        .with_button(machine.button)
                        .for_contact(contact.id),
                    GestureEvent::new(GestureKind::DragMove, contact.position, contact.last_update)
                        .with_button(machine.button)
                        .for_contact(contact.id),
                ]
            }
            GesturePhase::Dragging => vec![GestureEvent::new(
                GestureKind::DragMove,
                contact.position,
                contact.last_update,
            )
            .with_button(machine.button)
            .for_contact(contact.id)],
            phase => {
                warn!(
                    "Motion for contact {} in phase {:?} discarded, resetting",
                    contact.id, phase
                );
                machine.phase = GesturePhase::Pressed;
                machine.origin = contact.position;
                Vec::new()
            }
        }
    }

    fn on_up(&mut self, contact: &Contact, cancelled: bool) -> Vec<GestureEvent> {
        let Some(machine) = self.machines.remove(&contact.id) else {
            warn!("Discarding liftoff for unknown contact {}", contact.id);
            return Vec::new();
        };
        let lifted_at = contact.liftoff_at.unwrap_or(contact.last_update);

        if machine.grouped {
            if !self.multi.active {
                // The follow-on window counts from the last finger leaving
                if let Some((_, tapped_at)) = self.armed.as_mut() {
                    *tapped_at = (*tapped_at).max(lifted_at);
                }
                return Vec::new();
            }
            if machine.origin.distance_to(contact.position) > self.move_threshold {
                self.multi.moved = true;
            }
            if self.machines.len() <= 1 {
                return self.end_multi_touch(contact, lifted_at, cancelled);
            }
            return Vec::new();
        }

        match machine.phase {
            GesturePhase::Pressed if cancelled => {
                debug!("Pressed contact {} released at shutdown", contact.id);
                Vec::new()
            }
            GesturePhase::Pressed => {
                if contact.held_for(lifted_at) < self.hold_threshold {
                    debug!("Contact {} tapped", contact.id);
                    vec![
                        GestureEvent::new(GestureKind::Tap, machine.origin, lifted_at)
                            .for_contact(contact.id),
                    ]
                } else {
                    debug!("Contact {} long press treated as a click", contact.id);
                    vec![
                        GestureEvent::new(GestureKind::PointerDown, machine.origin, lifted_at)
                            .for_contact(contact.id),
                        GestureEvent::new(GestureKind::PointerUp, machine.origin, lifted_at)
                            .for_contact(contact.id),
                    ]
                }
            }
            GesturePhase::Dragging => vec![GestureEvent::new(
                GestureKind::DragEnd,
                contact.position,
                lifted_at,
            )
            .with_button(machine.button)
            .for_contact(contact.id)],
            phase => {
                warn!(
                    "Liftoff for contact {} in phase {:?} discarded",
                    contact.id, phase
                );
                Vec::new()
            }
        }
    }

    fn end_multi_touch(
        &mut self,
        contact: &Contact,
        lifted_at: Duration,
        cancelled: bool,
    ) -> Vec<GestureEvent> {
        let session = std::mem::take(&mut self.multi);
        debug!(
            "Multi-touch ended (up to {} fingers, moved: {})",
            session.max_fingers, session.moved
        );

        let mut events = vec![GestureEvent::new(
            GestureKind::MultiTouchEnd,
            contact.position,
            lifted_at,
        )
        .with_fingers(session.max_fingers)
        .for_contact(contact.id)];

        let quick = lifted_at.saturating_sub(session.started_at) < self.hold_threshold;
        if !cancelled && self.multi_finger_buttons && !session.moved && quick {
            let button = Button::for_fingers(session.max_fingers);
            if !self.tap_drag_window.is_zero() {
                self.armed = Some((button, lifted_at));
            }
            events.push(
                GestureEvent::new(GestureKind::Tap, contact.position, lifted_at)
                    .with_button(button)
                    .with_fingers(session.max_fingers),
            );
        }
        events
    }
}
