use crate::touch::{RawEventKind, RawTouchEvent};
use evdev::{AbsoluteAxisType, InputEvent, InputEventKind, Synchronization};
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, warn};

/// Groups a multi-touch protocol B event stream into one batch per report.
///
/// Axis values that follow no `ABS_MT_SLOT` within the report are left
/// without a slot; they belong to whichever slot the device addressed last.
pub struct MtDecoder {
    origin: Instant,
    /// Kernel timestamp paired with the session offset it was first seen at
    kernel_base: Option<(SystemTime, Duration)>,
    pending: Vec<RawTouchEvent>,
    slot: Option<usize>,
    dropped: bool,
}

impl MtDecoder {
    /// `origin` is the instant session timestamps are measured from
    pub fn new(origin: Instant) -> Self {
        Self {
            origin,
            kernel_base: None,
            pending: Vec::new(),
            slot: None,
            dropped: false,
        }
    }

    /// Feed one event; returns the finished batch on `SYN_REPORT`
    pub fn decode(&mut self, event: &InputEvent) -> Option<Vec<RawTouchEvent>> {
        match event.kind() {
            InputEventKind::Synchronization(Synchronization::SYN_REPORT) => self.finish_report(),
            InputEventKind::Synchronization(Synchronization::SYN_DROPPED) => {
                warn!(
                    "Kernel dropped touch events, discarding {} pending",
                    self.pending.len()
                );
                self.pending.clear();
                self.slot = None;
                self.dropped = true;
                None
            }
            InputEventKind::AbsAxis(axis) => {
                if !self.dropped {
                    self.decode_axis(axis, event);
                }
                None
            }
            _ => None,
        }
    }

    fn finish_report(&mut self) -> Option<Vec<RawTouchEvent>> {
        self.slot = None;
        if self.dropped {
            // The report that closes a drop is incomplete as well
            debug!("Resynchronised after dropped events");
            self.dropped = false;
            self.pending.clear();
            return None;
        }
        if self.pending.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.pending))
    }

    fn decode_axis(&mut self, axis: AbsoluteAxisType, event: &InputEvent) {
        let value = event.value();
        let kind = match axis {
            AbsoluteAxisType::ABS_MT_SLOT => {
                match usize::try_from(value) {
                    Ok(slot) => self.slot = Some(slot),
                    Err(_) => warn!("Ignoring negative slot {}", value),
                }
                return;
            }
            AbsoluteAxisType::ABS_MT_TRACKING_ID if value < 0 => RawEventKind::Liftoff,
            AbsoluteAxisType::ABS_MT_TRACKING_ID => RawEventKind::Touchdown,
            AbsoluteAxisType::ABS_MT_POSITION_X => RawEventKind::PositionX(value),
            AbsoluteAxisType::ABS_MT_POSITION_Y => RawEventKind::PositionY(value),
            AbsoluteAxisType::ABS_MT_PRESSURE => RawEventKind::Pressure(value),
            // Single-touch emulation axes duplicate the slot data
            _ => return,
        };

        let timestamp = self.stamp(event.timestamp());
        self.pending
            .push(RawTouchEvent::new(self.slot, kind, timestamp));
    }

    /// Kernel event time expressed as an offset from the session origin
    fn stamp(&mut self, time: SystemTime) -> Duration {
        let now = self.origin.elapsed();
        let (kernel, session) = *self.kernel_base.get_or_insert((time, now));

        match time.duration_since(kernel) {
            Ok(offset) => (session + offset).min(now),
            Err(_) => {
                // Wall clock stepped backwards
                self.kernel_base = Some((time, now));
                now
            }
        }
    }
}
