use super::*;
use crate::calibration::Bounds;
use crate::config::ScreentouchConfig;
use crate::emitter::{PointerAction, RecordingSink};
use crate::error::DeviceError;
use crate::gesture::Button;
use crate::touch::RawTouchEvent;
use std::time::{Duration, Instant};
use tokio::time::timeout;

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

fn bounds() -> Bounds {
    Bounds::new(0, 1023, 0, 1023)
}

fn create_test_config() -> ScreentouchConfig {
    let mut config = ScreentouchConfig::default();
    config.system.reconnect_delay_ms = 10;
    config.system.reconnect_max_retries = 3;
    config
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

fn daemon_with(
    config: ScreentouchConfig,
    source: ReplaySource,
) -> (ScreentouchDaemon, RecordingSink) {
    let sink = RecordingSink::new();
    let daemon = ScreentouchDaemon::new(
        config,
        None,
        Box::new(source),
        Box::new(sink.clone()),
        Instant::now(),
    )
    .unwrap();
    (daemon, sink)
}

fn cancel_after(daemon: &ScreentouchDaemon, delay: Duration) {
    let token = daemon.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        token.cancel();
    });
}

fn count(actions: &[PointerAction], wanted: PointerAction) -> usize {
    actions.iter().filter(|action| **action == wanted).count()
}

#[tokio::test]
async fn test_replayed_tap_clicks() {
    let source = ReplaySource::new(bounds(), 10)
        .batch(down(0, 100, 100, 0))
        .pause(ms(40))
        .batch(lift(0, 40))
        .hold_open();
    let (mut daemon, sink) = daemon_with(create_test_config(), source);
    cancel_after(&daemon, ms(200));

    let exit_code = timeout(ms(2000), daemon.run()).await.unwrap().unwrap();

    assert_eq!(exit_code, 0);
    assert_eq!(
        sink.actions(),
        vec![
            PointerAction::MoveTo { x: 100, y: 100 },
            PointerAction::Press(Button::Left),
            PointerAction::Release(Button::Left),
        ]
    );
}

#[tokio::test]
async fn test_end_of_input_releases_drag() {
    let source = ReplaySource::new(bounds(), 10)
        .batch(down(0, 100, 100, 0))
        .pause(ms(20))
        .batch(moved(0, 200, 200, 20));
    let (mut daemon, sink) = daemon_with(create_test_config(), source);

    let exit_code = timeout(ms(2000), daemon.run()).await.unwrap().unwrap();

    assert_eq!(exit_code, 0);
    let actions = sink.actions();
    assert_eq!(count(&actions, PointerAction::Press(Button::Left)), 1);
    assert_eq!(actions.last(), Some(&PointerAction::Release(Button::Left)));
}

#[tokio::test]
async fn test_device_failure_reconnects_and_continues() {
    let source = ReplaySource::new(bounds(), 10)
        .batch(down(0, 100, 100, 0))
        .pause(ms(40))
        .batch(lift(0, 40))
        .pause(ms(100))
        .fail(DeviceError::Read {
            details: "device unplugged".to_string(),
        })
        .pause(ms(100))
        .batch(down(0, 300, 300, 300))
        .pause(ms(40))
        .batch(lift(0, 340))
        .hold_open();
    let (mut daemon, sink) = daemon_with(create_test_config(), source);
    cancel_after(&daemon, ms(700));

    let exit_code = timeout(ms(3000), daemon.run()).await.unwrap().unwrap();

    assert_eq!(exit_code, 0);
    let actions = sink.actions();
    assert_eq!(count(&actions, PointerAction::Press(Button::Left)), 2);
    assert_eq!(count(&actions, PointerAction::Release(Button::Left)), 2);
    assert!(actions.contains(&PointerAction::MoveTo { x: 300, y: 300 }));
}

#[tokio::test]
async fn test_interrupted_pause_resumes_at_original_deadline() {
    let mut source = ReplaySource::new(bounds(), 10)
        .pause(ms(200))
        .batch(down(0, 100, 100, 200));
    let started = tokio::time::Instant::now();

    assert!(timeout(ms(20), source.next_batch()).await.is_err());
    assert!(timeout(ms(20), source.next_batch()).await.is_err());
    let batch = timeout(ms(1000), source.next_batch()).await.unwrap().unwrap();

    assert_eq!(batch, Some(down(0, 100, 100, 200)));
    let waited = started.elapsed();
    assert!(waited >= ms(190), "waited {:?}", waited);
    assert!(waited < ms(400), "pause restarted: waited {:?}", waited);
}

#[tokio::test]
async fn test_device_failure_after_lift_still_clicks() {
    let mut config = create_test_config();
    config.system.tick_interval_ms = 1000;
    let source = ReplaySource::new(bounds(), 10)
        .batch(down(0, 100, 100, 0))
        .batch(lift(0, 5))
        .fail(DeviceError::Read {
            details: "device unplugged".to_string(),
        });
    let (mut daemon, sink) = daemon_with(config, source);

    let exit_code = timeout(ms(2000), daemon.run()).await.unwrap().unwrap();

    assert_eq!(exit_code, 0);
    assert_eq!(
        sink.actions(),
        vec![
            PointerAction::MoveTo { x: 100, y: 100 },
            PointerAction::Press(Button::Left),
            PointerAction::Release(Button::Left),
        ]
    );
}

#[tokio::test]
async fn test_reconnect_follows_new_slot_count() {
    let source = ReplaySource::new(bounds(), 2)
        .fail(DeviceError::Read {
            details: "device unplugged".to_string(),
        })
        .reconnect_as(bounds(), 5)
        .pause(ms(20))
        .batch(down(4, 300, 300, 20))
        .pause(ms(40))
        .batch(lift(4, 60))
        .hold_open();
    let (mut daemon, sink) = daemon_with(create_test_config(), source);
    cancel_after(&daemon, ms(300));

    let exit_code = timeout(ms(2000), daemon.run()).await.unwrap().unwrap();

    assert_eq!(exit_code, 0);
    assert_eq!(daemon.translator.slot_count(), 5);
    let actions = sink.actions();
    assert!(actions.contains(&PointerAction::MoveTo { x: 300, y: 300 }));
    assert_eq!(count(&actions, PointerAction::Press(Button::Left)), 1);
}

#[tokio::test]
async fn test_unrecoverable_device_error_stops_daemon() {
    let source = ReplaySource::new(bounds(), 10)
        .fail(DeviceError::Unsupported("not a touchscreen".to_string()))
        .hold_open();
    let (mut daemon, _sink) = daemon_with(create_test_config(), source);

    let exit_code = timeout(ms(2000), daemon.run()).await.unwrap().unwrap();

    assert_eq!(exit_code, 1);
}

#[tokio::test]
async fn test_dead_pointer_device_exits_with_error() {
    let mut config = create_test_config();
    config.emitter.max_retries = 2;
    let source = ReplaySource::new(bounds(), 10)
        .batch(down(0, 100, 100, 0))
        .pause(ms(40))
        .batch(lift(0, 40))
        .hold_open();
    let (mut daemon, sink) = daemon_with(config, source);
    sink.set_failing(true);

    let exit_code = timeout(ms(2000), daemon.run()).await.unwrap().unwrap();

    assert_eq!(exit_code, 1);
    assert!(sink.actions().is_empty());
}

#[tokio::test]
async fn test_reload_calibration_stages_transform() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("screentouch.toml");
    std::fs::write(&path, "[calibration]\ndisplay_resolution = [2048, 2048]\n").unwrap();

    let sink = RecordingSink::new();
    let daemon = ScreentouchDaemon::new(
        create_test_config(),
        Some(path),
        Box::new(ReplaySource::new(bounds(), 10)),
        Box::new(sink),
        Instant::now(),
    )
    .unwrap();

    assert!(!daemon.translator.calibration_slot().is_pending());
    daemon.reload_calibration().unwrap();

    let staged = daemon.translator.calibration_slot().take().unwrap();
    assert_eq!(staged.display_bounds(), Bounds::from_size(2048, 2048));
}

#[tokio::test]
async fn test_invalid_reload_keeps_current_calibration() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("screentouch.toml");
    std::fs::write(&path, "[calibration]\ndisplay_resolution = [0, 480]\n").unwrap();

    let sink = RecordingSink::new();
    let daemon = ScreentouchDaemon::new(
        create_test_config(),
        Some(path),
        Box::new(ReplaySource::new(bounds(), 10)),
        Box::new(sink),
        Instant::now(),
    )
    .unwrap();

    assert!(daemon.reload_calibration().is_err());
    assert!(!daemon.translator.calibration_slot().is_pending());
    assert_eq!(daemon.translator.transform().display_bounds(), bounds());
}

#[test]
fn test_shutdown_reason_exit_codes() {
    assert_eq!(ShutdownReason::UserRequest.exit_code(), 0);
    assert_eq!(ShutdownReason::SourceEnded.exit_code(), 0);
    assert_eq!(ShutdownReason::Signal("SIGTERM".to_string()).exit_code(), 0);
    assert_eq!(ShutdownReason::Error("boom".to_string()).exit_code(), 1);
}
