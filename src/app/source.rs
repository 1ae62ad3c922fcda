use crate::calibration::Bounds;
use crate::error::{DeviceError, Result};
use crate::touch::RawTouchEvent;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

/// Input boundary of the daemon: delivers one raw batch per hardware report
#[async_trait]
pub trait TouchSource: Send {
    /// Next report, or `None` once the source has no more input
    async fn next_batch(&mut self) -> Result<Option<Vec<RawTouchEvent>>>;

    /// Re-establish the source after a read failure
    async fn reconnect(&mut self) -> Result<()>;

    fn describe(&self) -> String;

    /// Raw coordinate range reported by the hardware
    fn device_bounds(&self) -> Bounds;

    fn slot_count(&self) -> usize;
}

#[cfg(all(feature = "device", target_os = "linux"))]
#[async_trait]
impl TouchSource for crate::input::TouchDevice {
    async fn next_batch(&mut self) -> Result<Option<Vec<RawTouchEvent>>> {
        Ok(Some(self.read_batch().await?))
    }

    async fn reconnect(&mut self) -> Result<()> {
        // The old handle still holds the grab until it is dropped
        self.release_grab();
        *self = self.reopen()?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("{} ({})", self.path(), self.name())
    }

    fn device_bounds(&self) -> Bounds {
        self.bounds()
    }

    fn slot_count(&self) -> usize {
        crate::input::TouchDevice::slot_count(self)
    }
}

/// One scripted step of a [`ReplaySource`]
#[derive(Debug, Clone)]
pub enum ReplayStep {
    Batch(Vec<RawTouchEvent>),
    /// Fail the read as a disconnected device would
    Fail(DeviceError),
    Pause(Duration),
}

/// Scripted touch source that plays back recorded batches
pub struct ReplaySource {
    steps: VecDeque<ReplayStep>,
    bounds: Bounds,
    slot_count: usize,
    hold_open: bool,
    /// End of the pause at the front of the script, once it started
    pause_until: Option<Instant>,
    reopened_as: Option<(Bounds, usize)>,
}

impl ReplaySource {
    pub fn new(bounds: Bounds, slot_count: usize) -> Self {
        Self {
            steps: VecDeque::new(),
            bounds,
            slot_count,
            hold_open: false,
            pause_until: None,
            reopened_as: None,
        }
    }

    pub fn batch(mut self, batch: Vec<RawTouchEvent>) -> Self {
        self.steps.push_back(ReplayStep::Batch(batch));
        self
    }

    pub fn fail(mut self, error: DeviceError) -> Self {
        self.steps.push_back(ReplayStep::Fail(error));
        self
    }

    pub fn pause(mut self, duration: Duration) -> Self {
        self.steps.push_back(ReplayStep::Pause(duration));
        self
    }

    /// Report this geometry after the next reconnect
    pub fn reconnect_as(mut self, bounds: Bounds, slot_count: usize) -> Self {
        self.reopened_as = Some((bounds, slot_count));
        self
    }

    /// Keep waiting after the last step instead of reporting the end of input
    pub fn hold_open(mut self) -> Self {
        self.hold_open = true;
        self
    }
}

#[async_trait]
impl TouchSource for ReplaySource {
    /// Cancel safe: a pause interrupted by a dropped read resumes at its
    /// original deadline on the next call.
    async fn next_batch(&mut self) -> Result<Option<Vec<RawTouchEvent>>> {
        loop {
            if let Some(ReplayStep::Pause(duration)) = self.steps.front() {
                let duration = *duration;
                let deadline = *self
                    .pause_until
                    .get_or_insert_with(|| Instant::now() + duration);
                sleep_until(deadline).await;
                self.pause_until = None;
                self.steps.pop_front();
                continue;
            }

            match self.steps.pop_front() {
                Some(ReplayStep::Batch(batch)) => return Ok(Some(batch)),
                Some(ReplayStep::Fail(error)) => return Err(error.into()),
                Some(ReplayStep::Pause(_)) => {}
                None if self.hold_open => std::future::pending::<()>().await,
                None => return Ok(None),
            }
        }
    }

    async fn reconnect(&mut self) -> Result<()> {
        if let Some((bounds, slot_count)) = self.reopened_as.take() {
            self.bounds = bounds;
            self.slot_count = slot_count;
        }
        debug!("Replay source reconnected");
        Ok(())
    }

    fn describe(&self) -> String {
        format!("replay ({} steps left)", self.steps.len())
    }

    fn device_bounds(&self) -> Bounds {
        self.bounds
    }

    fn slot_count(&self) -> usize {
        self.slot_count
    }
}
