use super::*;
use crate::touch::RawEventKind;
use evdev::{AbsoluteAxisType, EventType, InputEvent, Key, Synchronization};
use std::time::Instant;

fn abs(axis: AbsoluteAxisType, value: i32) -> InputEvent {
    InputEvent::new(EventType::ABSOLUTE, axis.0, value)
}

fn syn(kind: Synchronization) -> InputEvent {
    InputEvent::new(EventType::SYNCHRONIZATION, kind.0, 0)
}

fn feed(decoder: &mut MtDecoder, events: &[InputEvent]) -> Vec<Vec<(Option<usize>, RawEventKind)>> {
    events
        .iter()
        .filter_map(|event| decoder.decode(event))
        .map(|batch| batch.iter().map(|e| (e.slot, e.kind)).collect())
        .collect()
}

#[test]
fn test_report_becomes_one_batch() {
    let mut decoder = MtDecoder::new(Instant::now());

    let batches = feed(
        &mut decoder,
        &[
            abs(AbsoluteAxisType::ABS_MT_SLOT, 0),
            abs(AbsoluteAxisType::ABS_MT_TRACKING_ID, 42),
            abs(AbsoluteAxisType::ABS_MT_POSITION_X, 100),
            abs(AbsoluteAxisType::ABS_MT_POSITION_Y, 200),
            abs(AbsoluteAxisType::ABS_MT_PRESSURE, 30),
            syn(Synchronization::SYN_REPORT),
        ],
    );

    assert_eq!(
        batches,
        vec![vec![
            (Some(0), RawEventKind::Touchdown),
            (Some(0), RawEventKind::PositionX(100)),
            (Some(0), RawEventKind::PositionY(200)),
            (Some(0), RawEventKind::Pressure(30)),
        ]]
    );
}

#[test]
fn test_axis_without_slot_marker_has_no_slot() {
    let mut decoder = MtDecoder::new(Instant::now());

    feed(
        &mut decoder,
        &[
            abs(AbsoluteAxisType::ABS_MT_SLOT, 2),
            abs(AbsoluteAxisType::ABS_MT_TRACKING_ID, 7),
            syn(Synchronization::SYN_REPORT),
        ],
    );
    let batches = feed(
        &mut decoder,
        &[
            abs(AbsoluteAxisType::ABS_MT_POSITION_X, 15),
            syn(Synchronization::SYN_REPORT),
        ],
    );

    assert_eq!(batches, vec![vec![(None, RawEventKind::PositionX(15))]]);
}

#[test]
fn test_negative_tracking_id_is_liftoff() {
    let mut decoder = MtDecoder::new(Instant::now());

    let batches = feed(
        &mut decoder,
        &[
            abs(AbsoluteAxisType::ABS_MT_SLOT, 1),
            abs(AbsoluteAxisType::ABS_MT_TRACKING_ID, -1),
            abs(AbsoluteAxisType::ABS_MT_SLOT, 0),
            abs(AbsoluteAxisType::ABS_MT_POSITION_Y, 9),
            syn(Synchronization::SYN_REPORT),
        ],
    );

    assert_eq!(
        batches,
        vec![vec![
            (Some(1), RawEventKind::Liftoff),
            (Some(0), RawEventKind::PositionY(9)),
        ]]
    );
}

#[test]
fn test_dropped_events_discard_partial_report() {
    let mut decoder = MtDecoder::new(Instant::now());

    let batches = feed(
        &mut decoder,
        &[
            abs(AbsoluteAxisType::ABS_MT_SLOT, 0),
            abs(AbsoluteAxisType::ABS_MT_POSITION_X, 1),
            syn(Synchronization::SYN_DROPPED),
            abs(AbsoluteAxisType::ABS_MT_POSITION_X, 2),
            syn(Synchronization::SYN_REPORT),
            abs(AbsoluteAxisType::ABS_MT_SLOT, 0),
            abs(AbsoluteAxisType::ABS_MT_POSITION_X, 3),
            syn(Synchronization::SYN_REPORT),
        ],
    );

    assert_eq!(batches, vec![vec![(Some(0), RawEventKind::PositionX(3))]]);
}

#[test]
fn test_single_touch_and_key_events_are_ignored() {
    let mut decoder = MtDecoder::new(Instant::now());

    let batches = feed(
        &mut decoder,
        &[
            InputEvent::new(EventType::KEY, Key::BTN_TOUCH.code(), 1),
            abs(AbsoluteAxisType::ABS_X, 100),
            abs(AbsoluteAxisType::ABS_Y, 100),
            syn(Synchronization::SYN_REPORT),
        ],
    );

    assert!(batches.is_empty());
}

#[test]
fn test_timestamps_never_run_ahead_of_session_clock() {
    let origin = Instant::now();
    let mut decoder = MtDecoder::new(origin);

    let batch = [
        abs(AbsoluteAxisType::ABS_MT_SLOT, 0),
        abs(AbsoluteAxisType::ABS_MT_TRACKING_ID, 1),
        syn(Synchronization::SYN_REPORT),
    ]
    .iter()
    .find_map(|event| decoder.decode(event))
    .unwrap();

    assert!(batch.iter().all(|event| event.timestamp <= origin.elapsed()));
}
