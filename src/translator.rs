use crate::calibration::{CalibrationSlot, CalibrationTransform};
use crate::config::ScreentouchConfig;
use crate::emitter::{EventEmitter, PointerSink};
use crate::error::{EmitError, Result};
use crate::gesture::{GestureClassifier, GestureEvent};
use crate::touch::{ContactTracker, ContactUpdate, DebounceFilter, RawTouchEvent};
use std::time::Duration;
use tracing::{debug, info, warn};

/// One touchscreen's pipeline: tracker, debounce filter, classifier and emitter.
///
/// Every call runs one cycle to completion. A calibration staged through
/// [`Translator::calibration_slot`] is picked up at the start of the next cycle.
pub struct Translator {
    transform: CalibrationTransform,
    calibration: CalibrationSlot,
    tracker: ContactTracker,
    filter: DebounceFilter,
    classifier: GestureClassifier,
    emitter: EventEmitter,
}

impl Translator {
    pub fn new(
        config: &ScreentouchConfig,
        transform: CalibrationTransform,
        slot_count: usize,
        sink: Box<dyn PointerSink>,
    ) -> Self {
        info!(
            "Translator ready: {} slots, display {:?}",
            slot_count,
            transform.display_bounds()
        );

        Self {
            transform,
            calibration: CalibrationSlot::new(),
            tracker: ContactTracker::new(slot_count, config.debounce.liftoff_grace()),
            filter: DebounceFilter::new(&config.debounce),
            classifier: GestureClassifier::new(&config.gesture),
            emitter: EventEmitter::new(&config.emitter, sink),
        }
    }

    /// Handle for staging a new calibration from outside the pipeline
    pub fn calibration_slot(&self) -> CalibrationSlot {
        self.calibration.clone()
    }

    pub fn transform(&self) -> &CalibrationTransform {
        &self.transform
    }

    pub fn live_contacts(&self) -> usize {
        self.tracker.live_count()
    }

    pub fn backlog(&self) -> usize {
        self.emitter.backlog()
    }

    pub fn slot_count(&self) -> usize {
        self.tracker.slot_count()
    }

    /// Follow a device that reopened with a different slot count. Any live
    /// contact is released first.
    pub fn set_slot_count(&mut self, slot_count: usize, now: Duration) -> Result<()> {
        if slot_count == self.tracker.slot_count() {
            return Ok(());
        }
        self.shutdown(now)?;
        self.tracker.resize(slot_count);
        Ok(())
    }

    /// Run one hardware report cycle
    pub fn process_batch(
        &mut self,
        batch: &[RawTouchEvent],
        now: Duration,
    ) -> Result<Vec<GestureEvent>> {
        self.apply_pending_calibration();

        // Liftoffs due before this report was produced are settled first
        let horizon = batch
            .first()
            .map_or(now, |event| event.timestamp.min(now));
        let mut updates = self.tracker.commit_expired(horizon, &mut self.filter);
        updates.extend(
            self.tracker
                .settle_jumps(horizon, &self.transform, &mut self.filter),
        );
        updates.extend(self.tracker.update(batch, &self.transform, &mut self.filter));

        debug!(
            "Cycle: {} raw events, {} contact updates",
            batch.len(),
            updates.len()
        );
        self.dispatch(&updates)
    }

    /// Commit liftoffs whose grace window ran out while the screen was quiet,
    /// accept jumps that held still, and retry anything the sink refused earlier.
    pub fn tick(&mut self, now: Duration) -> Result<Vec<GestureEvent>> {
        self.apply_pending_calibration();

        let mut updates = self.tracker.commit_expired(now, &mut self.filter);
        updates.extend(self.tracker.settle_jumps(now, &self.transform, &mut self.filter));
        if updates.is_empty() {
            if self.emitter.backlog() > 0 {
                let delivered = self.emitter.flush();
                self.settle(delivered)?;
            }
            return Ok(Vec::new());
        }
        self.dispatch(&updates)
    }

    /// Lift every contact, close drags and multi-touch, and release any
    /// button still down. The translator can keep running afterwards.
    ///
    /// Liftoffs already observed are committed as usual, so a finished tap
    /// still clicks. Contacts that are still down get no tap or click.
    pub fn shutdown(&mut self, now: Duration) -> Result<Vec<GestureEvent>> {
        let lifted = self.tracker.commit_held(&mut self.filter);
        let released = self.tracker.release_all(now, &mut self.filter);
        if !released.is_empty() {
            info!("Releasing {} live contacts", released.len());
        }

        let mut events = Vec::new();
        for update in &lifted {
            events.extend(self.classifier.handle(update));
        }
        for update in &released {
            events.extend(self.classifier.cancel(update));
        }
        self.classifier.reset();

        for event in &events {
            self.emitter.enqueue_event(event);
        }
        let delivered = self.emitter.release_all();
        self.settle(delivered)?;

        if self.emitter.backlog() > 0 {
            warn!(
                "{} pointer frames still undelivered after releasing contacts",
                self.emitter.backlog()
            );
        }
        Ok(events)
    }

    fn apply_pending_calibration(&mut self) {
        if let Some(transform) = self.calibration.take() {
            info!(
                "Applying new calibration: coefficients {:?}",
                transform.coefficients()
            );
            self.transform = transform;
        }
    }

    fn dispatch(&mut self, updates: &[ContactUpdate]) -> Result<Vec<GestureEvent>> {
        let mut events = Vec::new();
        for update in updates {
            events.extend(self.classifier.handle(update));
            if let ContactUpdate::Down(contact) | ContactUpdate::Moved(contact) = update {
                self.tracker
                    .set_phase(contact.id, self.classifier.phase(contact.id));
            }
        }

        for event in &events {
            debug!("Gesture {:?} at {:?}", event.kind, event.position);
            self.emitter.enqueue_event(event);
        }
        let delivered = self.emitter.flush();
        self.settle(delivered)?;
        Ok(events)
    }

    /// Transient sink failures leave frames queued for the next cycle
    fn settle(&self, result: std::result::Result<(), EmitError>) -> Result<()> {
        match result {
            Ok(()) => Ok(()),
            Err(err) if err.is_transient() => {
                debug!("Sink busy, {} frames deferred", self.emitter.backlog());
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::{Bounds, Point};
    use crate::emitter::{PointerAction, RecordingSink};
    use crate::error::ScreentouchError;
    use crate::gesture::{Button, GestureKind};

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    fn device() -> Bounds {
        Bounds::new(0, 1023, 0, 1023)
    }

    fn translator_with(config: &ScreentouchConfig) -> (Translator, RecordingSink) {
        let sink = RecordingSink::new();
        let transform = CalibrationTransform::identity(device()).unwrap();
        let translator = Translator::new(config, transform, 10, Box::new(sink.clone()));
        (translator, sink)
    }

    fn translator() -> (Translator, RecordingSink) {
        translator_with(&ScreentouchConfig::default())
    }

    fn down(slot: usize, x: i32, y: i32, t: u64) -> Vec<RawTouchEvent> {
        vec![
            RawTouchEvent::touchdown(slot, ms(t)),
            RawTouchEvent::position_x(slot, x, ms(t)),
            RawTouchEvent::position_y(slot, y, ms(t)),
        ]
    }

    fn moved(slot: usize, x: i32, y: i32, t: u64) -> Vec<RawTouchEvent> {
        vec![
            RawTouchEvent::position_x(slot, x, ms(t)),
            RawTouchEvent::position_y(slot, y, ms(t)),
        ]
    }

    fn lift(slot: usize, t: u64) -> Vec<RawTouchEvent> {
        vec![RawTouchEvent::liftoff(slot, ms(t))]
    }

    /// Feed each batch at its own timestamp, then tick well past every grace window
    fn run(translator: &mut Translator, batches: &[(u64, Vec<RawTouchEvent>)]) -> Vec<GestureKind> {
        let mut events = Vec::new();
        let mut last = 0;
        for (t, batch) in batches {
            events.extend(translator.process_batch(batch, ms(*t)).unwrap());
            last = *t;
        }
        events.extend(translator.tick(ms(last + 500)).unwrap());
        events.into_iter().map(|event| event.kind).collect()
    }

    #[test]
    fn test_quick_touch_taps_at_touchdown_point() {
        let (mut translator, sink) = translator();

        let mut events = translator.process_batch(&down(0, 100, 100, 0), ms(0)).unwrap();
        events.extend(translator.process_batch(&moved(0, 102, 101, 20), ms(20)).unwrap());
        events.extend(translator.process_batch(&lift(0, 40), ms(40)).unwrap());
        assert!(events.is_empty());

        let events = translator.tick(ms(70)).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, GestureKind::Tap);
        assert_eq!(events[0].position, Point::new(100, 100));

        assert_eq!(
            sink.actions(),
            vec![
                PointerAction::MoveTo { x: 100, y: 100 },
                PointerAction::Press(Button::Left),
                PointerAction::Release(Button::Left),
            ]
        );
        assert_eq!(translator.live_contacts(), 0);
    }

    #[test]
    fn test_moving_touch_drags() {
        let (mut translator, sink) = translator();

        let kinds = run(
            &mut translator,
            &[
                (0, down(0, 100, 100, 0)),
                (16, moved(0, 200, 100, 16)),
                (32, lift(0, 32)),
            ],
        );

        assert_eq!(
            kinds,
            vec![
                GestureKind::DragStart,
                GestureKind::DragMove,
                GestureKind::DragEnd
            ]
        );
        assert_eq!(
            sink.actions(),
            vec![
                PointerAction::MoveTo { x: 100, y: 100 },
                PointerAction::Press(Button::Left),
                PointerAction::MoveTo { x: 200, y: 100 },
                PointerAction::Release(Button::Left),
            ]
        );
    }

    #[test]
    fn test_brief_dropout_does_not_release() {
        let (mut translator, _sink) = translator();

        let kinds = run(
            &mut translator,
            &[
                (0, down(0, 100, 100, 0)),
                (16, moved(0, 200, 100, 16)),
                (24, lift(0, 24)),
                (40, down(0, 205, 100, 40)),
                (56, moved(0, 240, 100, 56)),
            ],
        );

        assert_eq!(
            kinds,
            vec![
                GestureKind::DragStart,
                GestureKind::DragMove,
                GestureKind::DragMove,
                GestureKind::DragMove
            ]
        );
        assert_eq!(translator.live_contacts(), 1);
    }

    #[test]
    fn test_second_finger_switches_to_multi_touch() {
        let (mut translator, sink) = translator();

        let kinds = run(
            &mut translator,
            &[
                (0, down(0, 100, 100, 0)),
                (10, down(1, 300, 100, 10)),
                (30, lift(1, 30)),
                (40, lift(0, 40)),
            ],
        );

        assert_eq!(
            kinds,
            vec![
                GestureKind::MultiTouchBegin,
                GestureKind::MultiTouchEnd,
                GestureKind::Tap
            ]
        );
        assert!(sink.actions().contains(&PointerAction::Press(Button::Right)));
    }

    #[test]
    fn test_calibration_applies_from_next_cycle() {
        let (mut translator, _sink) = translator();
        let slot = translator.calibration_slot();

        translator.process_batch(&down(0, 100, 100, 0), ms(0)).unwrap();
        slot.stage(
            CalibrationTransform::from_bounds(device(), Bounds::from_size(2048, 2048), None)
                .unwrap(),
        );

        let events = translator
            .process_batch(&moved(0, 150, 100, 16), ms(16))
            .unwrap();

        assert_eq!(translator.transform().display_bounds(), Bounds::from_size(2048, 2048));
        assert_eq!(events.last().map(|e| e.position), Some(Point::new(300, 200)));
    }

    #[test]
    fn test_shutdown_releases_dragging_contact() {
        let (mut translator, sink) = translator();

        translator.process_batch(&down(0, 100, 100, 0), ms(0)).unwrap();
        translator.process_batch(&moved(0, 200, 100, 16), ms(16)).unwrap();

        let events = translator.shutdown(ms(20)).unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, GestureKind::DragEnd);
        assert_eq!(
            sink.actions().last(),
            Some(&PointerAction::Release(Button::Left))
        );
        assert_eq!(translator.live_contacts(), 0);
    }

    #[test]
    fn test_busy_sink_catches_up_on_tick() {
        let (mut translator, sink) = translator();

        sink.fail_next(1);
        translator.process_batch(&down(0, 100, 100, 0), ms(0)).unwrap();
        translator.process_batch(&moved(0, 200, 100, 16), ms(16)).unwrap();
        assert_eq!(translator.backlog(), 2);

        translator.tick(ms(20)).unwrap();
        assert_eq!(translator.backlog(), 0);
        assert_eq!(sink.actions().len(), 3);
    }

    #[test]
    fn test_sustained_sink_failure_is_fatal() {
        let mut config = ScreentouchConfig::default();
        config.emitter.max_retries = 2;
        let (mut translator, sink) = translator_with(&config);

        sink.set_failing(true);
        translator.process_batch(&down(0, 100, 100, 0), ms(0)).unwrap();
        translator.process_batch(&moved(0, 200, 100, 16), ms(16)).unwrap();
        let result = translator.process_batch(&moved(0, 210, 100, 32), ms(32));

        assert!(matches!(
            result,
            Err(ScreentouchError::Emit(EmitError::Exhausted { attempts: 2, .. }))
        ));
    }

    #[test]
    fn test_shutdown_commits_finished_tap() {
        let (mut translator, sink) = translator();

        translator.process_batch(&down(0, 100, 100, 0), ms(0)).unwrap();
        translator.process_batch(&lift(0, 20), ms(20)).unwrap();

        let events = translator.shutdown(ms(25)).unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, GestureKind::Tap);
        assert_eq!(
            sink.actions(),
            vec![
                PointerAction::MoveTo { x: 100, y: 100 },
                PointerAction::Press(Button::Left),
                PointerAction::Release(Button::Left),
            ]
        );
    }

    #[test]
    fn test_fast_move_then_hold_drags_to_new_position() {
        let (mut translator, sink) = translator();

        let mut kinds: Vec<GestureKind> = Vec::new();
        let mut collect = |events: Vec<GestureEvent>| {
            kinds.extend(events.into_iter().map(|event| event.kind));
        };
        collect(translator.process_batch(&down(0, 100, 100, 0), ms(0)).unwrap());
        // Only the changed axis is reported while the finger rests
        collect(
            translator
                .process_batch(&[RawTouchEvent::position_x(0, 600, ms(10))], ms(10))
                .unwrap(),
        );
        collect(translator.tick(ms(20)).unwrap());
        assert!(sink.actions().is_empty());

        collect(translator.tick(ms(45)).unwrap());
        collect(translator.process_batch(&lift(0, 250), ms(250)).unwrap());
        collect(translator.tick(ms(300)).unwrap());

        assert!(kinds.contains(&GestureKind::DragStart));
        assert_eq!(kinds.last(), Some(&GestureKind::DragEnd));
        let actions = sink.actions();
        assert!(actions.contains(&PointerAction::MoveTo { x: 600, y: 100 }));
        assert_eq!(actions.last(), Some(&PointerAction::Release(Button::Left)));
    }

    #[test]
    fn test_slot_count_change_releases_contacts() {
        let (mut translator, sink) = translator();

        translator.process_batch(&down(0, 100, 100, 0), ms(0)).unwrap();
        translator.process_batch(&moved(0, 200, 100, 16), ms(16)).unwrap();
        translator.set_slot_count(3, ms(20)).unwrap();

        assert_eq!(translator.slot_count(), 3);
        assert_eq!(translator.live_contacts(), 0);
        assert_eq!(
            sink.actions().last(),
            Some(&PointerAction::Release(Button::Left))
        );

        assert!(translator.process_batch(&down(5, 300, 300, 40), ms(40)).unwrap().is_empty());
        assert_eq!(translator.live_contacts(), 0);
        translator.process_batch(&down(2, 300, 300, 50), ms(50)).unwrap();
        assert_eq!(translator.live_contacts(), 1);
    }

    #[test]
    fn test_touch_after_two_finger_tap_drags_with_right_button() {
        let (mut translator, sink) = translator();

        run(
            &mut translator,
            &[
                (0, down(0, 100, 100, 0)),
                (5, down(1, 140, 100, 5)),
                (50, lift(1, 50)),
                (60, lift(0, 60)),
                (150, down(2, 400, 400, 150)),
                (170, moved(2, 420, 400, 170)),
                (250, lift(2, 250)),
            ],
        );

        let actions = sink.actions();
        let presses = actions
            .iter()
            .filter(|action| **action == PointerAction::Press(Button::Right))
            .count();
        assert_eq!(presses, 2);
        assert!(actions.contains(&PointerAction::MoveTo { x: 420, y: 400 }));
        assert_eq!(actions.last(), Some(&PointerAction::Release(Button::Right)));
        assert!(!actions.contains(&PointerAction::Press(Button::Left)));
    }
}
