use super::filter::{ContactSample, DebounceFilter, FilterDecision, SampleKind};
use super::types::{Contact, ContactId, ContactUpdate, RawEventKind, RawTouchEvent};
use crate::calibration::{CalibrationTransform, Point};
use crate::gesture::GesturePhase;
use std::time::Duration;
use tracing::{debug, warn};

/// Last axis values the hardware reported for a slot. Protocol B only sends
/// axes that changed, so these persist across batches.
#[derive(Debug, Clone, Copy, Default)]
struct SlotAxes {
    x: i32,
    y: i32,
    pressure: Option<i32>,
}

/// Everything one batch said about one slot
#[derive(Debug)]
struct SlotFrame {
    slot: usize,
    touched_at: Option<Duration>,
    lifted_at: Option<Duration>,
    ends_down: Option<bool>,
    changed: bool,
    last_timestamp: Duration,
}

impl SlotFrame {
    fn new(slot: usize, timestamp: Duration) -> Self {
        Self {
            slot,
            touched_at: None,
            lifted_at: None,
            ends_down: None,
            changed: false,
            last_timestamp: timestamp,
        }
    }
}

/// Keeps the live contacts in an arena indexed by hardware slot and assigns
/// each new contact a fresh identity.
pub struct ContactTracker {
    slots: Vec<Option<Contact>>,
    axes: Vec<SlotAxes>,
    next_id: u64,
    active_slot: usize,
    ghost_threshold: Duration,
}

impl ContactTracker {
    pub fn new(slot_count: usize, ghost_threshold: Duration) -> Self {
        let slot_count = slot_count.max(1);
        Self {
            slots: vec![None; slot_count],
            axes: vec![SlotAxes::default(); slot_count],
            next_id: 1,
            active_slot: 0,
            ghost_threshold,
        }
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn live_count(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn contacts(&self) -> impl Iterator<Item = &Contact> {
        self.slots.iter().flatten()
    }

    pub fn get(&self, id: ContactId) -> Option<&Contact> {
        self.contacts().find(|contact| contact.id == id)
    }

    pub fn set_phase(&mut self, id: ContactId, phase: GesturePhase) {
        if let Some(contact) = self.slots.iter_mut().flatten().find(|c| c.id == id) {
            contact.phase = phase;
        }
    }

    /// Apply one hardware report cycle. Returns the contacts that went down
    /// or moved, plus any liftoffs that had to be committed on the spot.
    pub fn update(
        &mut self,
        batch: &[RawTouchEvent],
        transform: &CalibrationTransform,
        filter: &mut DebounceFilter,
    ) -> Vec<ContactUpdate> {
        let mut frames: Vec<SlotFrame> = Vec::new();

        for event in batch {
            let slot = event.slot.unwrap_or(self.active_slot);
            if slot >= self.slots.len() {
                warn!(
                    "Discarding {:?} for slot {} beyond the {} tracked slots",
                    event.kind,
                    slot,
                    self.slots.len()
                );
                continue;
            }
            self.active_slot = slot;

            let index = match frames.iter().position(|frame| frame.slot == slot) {
                Some(index) => index,
                None => {
                    frames.push(SlotFrame::new(slot, event.timestamp));
                    frames.len() - 1
                }
            };
            let frame = &mut frames[index];
            frame.last_timestamp = event.timestamp;

            match event.kind {
                RawEventKind::Touchdown => {
                    frame.touched_at = Some(event.timestamp);
                    frame.ends_down = Some(true);
                }
                RawEventKind::Liftoff => {
                    frame.lifted_at.get_or_insert(event.timestamp);
                    frame.ends_down = Some(false);
                }
                RawEventKind::PositionX(x) => {
                    self.axes[slot].x = x;
                    frame.changed = true;
                }
                RawEventKind::PositionY(y) => {
                    self.axes[slot].y = y;
                    frame.changed = true;
                }
                RawEventKind::Pressure(pressure) => {
                    self.axes[slot].pressure = Some(pressure);
                    frame.changed = true;
                }
            }
        }

        let mut updates = Vec::new();
        let reported: Vec<usize> = frames.iter().map(|frame| frame.slot).collect();
        for frame in frames {
            self.resolve(frame, transform, filter, &mut updates);
        }

        // Unchanged axes are not re-sent, so a report that skips a slot with a
        // pending jump still counts as a cycle in which it stayed put
        if let Some(last) = batch.last() {
            for slot in 0..self.slots.len() {
                if !reported.contains(&slot) {
                    self.recheck_jump(
                        slot,
                        SampleKind::Motion,
                        last.timestamp,
                        transform,
                        filter,
                        &mut updates,
                    );
                }
            }
        }
        updates
    }

    /// Accept pending jumps that have held still for the settle time
    pub fn settle_jumps(
        &mut self,
        now: Duration,
        transform: &CalibrationTransform,
        filter: &mut DebounceFilter,
    ) -> Vec<ContactUpdate> {
        let mut updates = Vec::new();
        for slot in 0..self.slots.len() {
            self.recheck_jump(slot, SampleKind::Settle, now, transform, filter, &mut updates);
        }
        updates
    }

    fn recheck_jump(
        &mut self,
        slot: usize,
        kind: SampleKind,
        timestamp: Duration,
        transform: &CalibrationTransform,
        filter: &mut DebounceFilter,
        updates: &mut Vec<ContactUpdate>,
    ) {
        let Some(contact) = self.slots[slot] else {
            return;
        };
        if contact.is_lifting() || !filter.pending_jump(contact.id) {
            return;
        }
        let sample = self.sample_for(slot, kind, timestamp, transform);
        self.apply_motion(slot, sample, filter, updates);
    }

    fn sample_for(
        &self,
        slot: usize,
        kind: SampleKind,
        timestamp: Duration,
        transform: &CalibrationTransform,
    ) -> ContactSample {
        let axes = self.axes[slot];
        let raw = Point::new(axes.x, axes.y);
        ContactSample {
            kind,
            raw,
            position: transform.map(raw.x, raw.y),
            pressure: axes.pressure,
            timestamp,
        }
    }

    fn resolve(
        &mut self,
        frame: SlotFrame,
        transform: &CalibrationTransform,
        filter: &mut DebounceFilter,
        updates: &mut Vec<ContactUpdate>,
    ) {
        let slot = frame.slot;
        let latest = self.sample_for(slot, SampleKind::Motion, frame.last_timestamp, transform);
        let sample = |kind, timestamp| ContactSample {
            kind,
            timestamp,
            ..latest
        };

        let live = self.slots[slot];

        match frame.ends_down {
            Some(true) => {
                let touched_at = frame.touched_at.unwrap_or(frame.last_timestamp);
                let touchdown = sample(SampleKind::Touchdown, touched_at);

                match live {
                    None => {
                        self.touch_down(slot, touchdown, filter, updates);
                    }
                    Some(contact) if contact.is_lifting() => {
                        let resume = sample(SampleKind::Resume, touched_at);
                        if filter.filter(&contact, &resume) == FilterDecision::Accept {
                            debug!("Contact {} resumed within the grace window", contact.id);
                            if let Some(live) = self.slots[slot].as_mut() {
                                live.liftoff_at = None;
                            }
                            self.apply_motion(slot, resume, filter, updates);
                        } else {
                            self.commit(slot, None, filter, updates);
                            self.touch_down(slot, touchdown, filter, updates);
                        }
                    }
                    Some(contact) => {
                        let gap = frame
                            .lifted_at
                            .map(|lifted_at| touched_at.saturating_sub(lifted_at));

                        match gap {
                            Some(gap) if gap >= self.ghost_threshold => {
                                debug!(
                                    "Contact {} lifted and a new touch started in the same report",
                                    contact.id
                                );
                                self.commit(slot, frame.lifted_at, filter, updates);
                                self.touch_down(slot, touchdown, filter, updates);
                            }
                            _ => {
                                if gap.is_some() {
                                    debug!("Ghost release of contact {} merged", contact.id);
                                }
                                let motion = sample(SampleKind::Motion, frame.last_timestamp);
                                self.apply_motion(slot, motion, filter, updates);
                            }
                        }
                    }
                }
            }
            Some(false) => {
                let lifted_at = frame.lifted_at.unwrap_or(frame.last_timestamp);
                let contact = match (live, frame.touched_at) {
                    (Some(contact), _) => contact,
                    (None, Some(touched_at)) => {
                        // Touched and released within one report
                        let touchdown = sample(SampleKind::Touchdown, touched_at);
                        self.touch_down(slot, touchdown, filter, updates)
                    }
                    (None, None) => {
                        warn!("Discarding liftoff for slot {} with no contact", slot);
                        return;
                    }
                };

                if contact.is_lifting() {
                    debug!("Repeated liftoff for contact {} ignored", contact.id);
                    return;
                }

                if frame.changed {
                    self.apply_motion(slot, sample(SampleKind::Motion, lifted_at), filter, updates);
                }

                match filter.filter(&contact, &sample(SampleKind::Liftoff, lifted_at)) {
                    FilterDecision::DelayedLiftoff => {
                        if let Some(live) = self.slots[slot].as_mut() {
                            live.liftoff_at = Some(lifted_at);
                        }
                    }
                    FilterDecision::Accept => {
                        self.commit(slot, Some(lifted_at), filter, updates);
                    }
                    FilterDecision::Suppress => {
                        debug!("Liftoff of contact {} vetoed", contact.id);
                    }
                }
            }
            None => match live {
                Some(contact) if contact.is_lifting() => {
                    debug!(
                        "Axis update for contact {} while its liftoff is held",
                        contact.id
                    );
                }
                Some(_) => {
                    if frame.changed {
                        let motion = sample(SampleKind::Motion, frame.last_timestamp);
                        self.apply_motion(slot, motion, filter, updates);
                    }
                }
                None => {
                    debug!("Axis update for idle slot {}", slot);
                }
            },
        }
    }

    fn touch_down(
        &mut self,
        slot: usize,
        sample: ContactSample,
        filter: &mut DebounceFilter,
        updates: &mut Vec<ContactUpdate>,
    ) -> Contact {
        let id = ContactId(self.next_id);
        self.next_id += 1;

        let contact = Contact {
            id,
            slot,
            raw: sample.raw,
            prev_raw: sample.raw,
            position: sample.position,
            prev_position: sample.position,
            pressure: sample.pressure,
            first_touch: sample.timestamp,
            last_update: sample.timestamp,
            liftoff_at: None,
            phase: GesturePhase::Idle,
        };
        filter.filter(&contact, &sample);

        debug!(
            "Contact {} down on slot {} at {:?}",
            id, slot, contact.position
        );
        self.slots[slot] = Some(contact);
        updates.push(ContactUpdate::Down(contact));
        contact
    }

    fn apply_motion(
        &mut self,
        slot: usize,
        sample: ContactSample,
        filter: &mut DebounceFilter,
        updates: &mut Vec<ContactUpdate>,
    ) {
        let Some(contact) = self.slots[slot].as_mut() else {
            return;
        };

        if sample.raw == contact.raw && sample.pressure == contact.pressure {
            return;
        }

        // A resumed contact takes its position without the jump check
        let decision = match sample.kind {
            SampleKind::Resume => FilterDecision::Accept,
            _ => filter.filter(contact, &sample),
        };
        if decision != FilterDecision::Accept {
            return;
        }

        contact.prev_raw = contact.raw;
        contact.raw = sample.raw;
        contact.prev_position = contact.position;
        contact.position = sample.position;
        contact.pressure = sample.pressure;
        contact.last_update = sample.timestamp;
        updates.push(ContactUpdate::Moved(*contact));
    }

    /// Remove the contact on `slot` from the live set
    fn commit(
        &mut self,
        slot: usize,
        lifted_at: Option<Duration>,
        filter: &mut DebounceFilter,
        updates: &mut Vec<ContactUpdate>,
    ) {
        if let Some(mut contact) = self.slots[slot].take() {
            contact.liftoff_at = contact.liftoff_at.or(lifted_at).or(Some(contact.last_update));
            filter.forget(contact.id);
            debug!("Contact {} lifted from slot {}", contact.id, slot);
            updates.push(ContactUpdate::Up(contact));
        }
    }

    /// Commit every held liftoff whose grace window has run out
    pub fn commit_expired(
        &mut self,
        now: Duration,
        filter: &mut DebounceFilter,
    ) -> Vec<ContactUpdate> {
        let mut updates = Vec::new();
        for id in filter.expired(now) {
            match self.slots.iter().position(|slot| slot.as_ref().map(|c| c.id) == Some(id)) {
                Some(slot) => self.commit(slot, None, filter, &mut updates),
                None => filter.forget(id),
            }
        }
        updates
    }

    /// Commit every held liftoff now, whether or not its grace window ran out
    pub fn commit_held(&mut self, filter: &mut DebounceFilter) -> Vec<ContactUpdate> {
        let mut updates = Vec::new();
        for slot in 0..self.slots.len() {
            if self.slots[slot].map_or(false, |contact| contact.is_lifting()) {
                self.commit(slot, None, filter, &mut updates);
            }
        }
        updates
    }

    /// Lift every live contact immediately, bypassing the grace window
    pub fn release_all(
        &mut self,
        now: Duration,
        filter: &mut DebounceFilter,
    ) -> Vec<ContactUpdate> {
        let mut updates = Vec::new();
        for slot in 0..self.slots.len() {
            self.commit(slot, Some(now), filter, &mut updates);
        }
        filter.reset();
        updates
    }

    /// Match a device that came back with a different slot count. Live
    /// contacts are dropped, so call after [`ContactTracker::release_all`].
    pub fn resize(&mut self, slot_count: usize) {
        let slot_count = slot_count.max(1);
        debug!("Tracking {} slots", slot_count);
        self.slots = vec![None; slot_count];
        self.axes = vec![SlotAxes::default(); slot_count];
        self.active_slot = 0;
    }
}
