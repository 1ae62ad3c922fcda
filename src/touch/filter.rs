use super::types::{Contact, ContactId};
use crate::calibration::Point;
use crate::config::DebounceConfig;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Verdict of the debounce stage on one contact sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    Accept,
    /// Keep the previous state; the sample is treated as sensor noise
    Suppress,
    /// Hold the liftoff until the grace window runs out
    DelayedLiftoff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleKind {
    Touchdown,
    Motion,
    Liftoff,
    /// Touchdown on a slot whose liftoff is still being held
    Resume,
    /// Last reported position of a contact with a pending jump, re-offered
    /// while the hardware stays quiet about it
    Settle,
}

/// One cycle's worth of hardware data for a contact, already calibrated
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactSample {
    pub kind: SampleKind,
    pub raw: Point,
    pub position: Point,
    pub pressure: Option<i32>,
    pub timestamp: Duration,
}

#[derive(Debug, Default)]
struct FilterState {
    jump_streak: u32,
    jump_candidate: Option<Point>,
    /// When the current run of far samples started
    jump_since: Option<Duration>,
    liftoff_deadline: Option<Duration>,
}

impl FilterState {
    fn clear_jump(&mut self) {
        self.jump_streak = 0;
        self.jump_candidate = None;
        self.jump_since = None;
    }
}

/// Suppresses single-cycle position jumps and holds liftoffs for a short
/// grace window so a momentary dropout does not end the contact.
pub struct DebounceFilter {
    max_jump: f64,
    confirm_cycles: u32,
    grace: Duration,
    jump_settle: Duration,
    states: HashMap<ContactId, FilterState>,
}

impl DebounceFilter {
    pub fn new(config: &DebounceConfig) -> Self {
        Self::with_settings(
            config.max_jump as f64,
            config.jump_confirm_cycles,
            config.liftoff_grace(),
        )
        .with_jump_settle(config.jump_settle())
    }

    /// The settle time for jumps starts out equal to `grace`
    pub fn with_settings(max_jump: f64, confirm_cycles: u32, grace: Duration) -> Self {
        Self {
            max_jump,
            confirm_cycles: confirm_cycles.max(1),
            grace,
            jump_settle: grace,
            states: HashMap::new(),
        }
    }

    /// Accept a pending jump once it has stood unchallenged this long.
    /// Zero leaves confirmation to reported cycles only.
    pub fn with_jump_settle(mut self, settle: Duration) -> Self {
        self.jump_settle = settle;
        self
    }

    pub fn grace_window(&self) -> Duration {
        self.grace
    }

    /// Decide what to do with a sample for `contact`
    pub fn filter(&mut self, contact: &Contact, sample: &ContactSample) -> FilterDecision {
        match sample.kind {
            SampleKind::Touchdown => {
                self.states.insert(contact.id, FilterState::default());
                FilterDecision::Accept
            }
            SampleKind::Motion => self.filter_motion(contact, sample),
            SampleKind::Liftoff => {
                if self.grace.is_zero() {
                    return FilterDecision::Accept;
                }

                let state = self.states.entry(contact.id).or_default();
                state.liftoff_deadline = Some(sample.timestamp + self.grace);
                debug!(
                    "Holding liftoff of contact {} until {:?}",
                    contact.id, state.liftoff_deadline
                );
                FilterDecision::DelayedLiftoff
            }
            SampleKind::Resume => {
                let state = self.states.entry(contact.id).or_default();
                match state.liftoff_deadline {
                    Some(deadline) if sample.timestamp < deadline => {
                        *state = FilterState::default();
                        FilterDecision::Accept
                    }
                    _ => FilterDecision::Suppress,
                }
            }
            SampleKind::Settle => self.settle_jump(contact, sample),
        }
    }

    /// A far sample is waiting for confirmation
    pub fn pending_jump(&self, id: ContactId) -> bool {
        self.states
            .get(&id)
            .map_or(false, |state| state.jump_candidate.is_some())
    }

    fn filter_motion(&mut self, contact: &Contact, sample: &ContactSample) -> FilterDecision {
        let max_jump = self.max_jump;
        let confirm_cycles = self.confirm_cycles;
        let state = self.states.entry(contact.id).or_default();

        if contact.position.distance_to(sample.position) <= max_jump {
            state.clear_jump();
            return FilterDecision::Accept;
        }

        // A jump is confirmed by consecutive far samples that agree with each other
        let continues = state
            .jump_candidate
            .map_or(false, |candidate| {
                candidate.distance_to(sample.position) <= max_jump
            });
        if continues {
            state.jump_streak += 1;
        } else {
            state.jump_streak = 1;
            state.jump_since = Some(sample.timestamp);
        }
        state.jump_candidate = Some(sample.position);

        if state.jump_streak >= confirm_cycles {
            debug!(
                "Accepting jump of contact {} to {:?} after {} cycles",
                contact.id, sample.position, state.jump_streak
            );
            state.clear_jump();
            FilterDecision::Accept
        } else {
            debug!(
                "Suppressing jump of contact {} to {:?} ({}/{})",
                contact.id, sample.position, state.jump_streak, confirm_cycles
            );
            FilterDecision::Suppress
        }
    }

    fn settle_jump(&mut self, contact: &Contact, sample: &ContactSample) -> FilterDecision {
        if self.jump_settle.is_zero() {
            return FilterDecision::Suppress;
        }
        let max_jump = self.max_jump;
        let settle = self.jump_settle;
        let Some(state) = self.states.get_mut(&contact.id) else {
            return FilterDecision::Suppress;
        };

        match (state.jump_candidate, state.jump_since) {
            (Some(candidate), Some(since))
                if candidate.distance_to(sample.position) <= max_jump
                    && sample.timestamp.saturating_sub(since) >= settle =>
            {
                debug!(
                    "Accepting jump of contact {} to {:?} after holding still",
                    contact.id, sample.position
                );
                state.clear_jump();
                FilterDecision::Accept
            }
            _ => FilterDecision::Suppress,
        }
    }

    /// Contacts whose held liftoff is due at `now`, earliest first
    pub fn expired(&self, now: Duration) -> Vec<ContactId> {
        let mut due: Vec<(Duration, ContactId)> = self
            .states
            .iter()
            .filter_map(|(id, state)| {
                state
                    .liftoff_deadline
                    .filter(|deadline| *deadline <= now)
                    .map(|deadline| (deadline, *id))
            })
            .collect();
        due.sort();
        due.into_iter().map(|(_, id)| id).collect()
    }

    pub fn forget(&mut self, id: ContactId) {
        self.states.remove(&id);
    }

    pub fn reset(&mut self) {
        self.states.clear();
    }
}
