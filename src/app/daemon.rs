use super::signals::{DaemonSignal, SignalListener};
use super::source::TouchSource;
use super::types::ShutdownReason;
use crate::calibration::build_transform;
use crate::config::ScreentouchConfig;
use crate::emitter::PointerSink;
use crate::error::{ErrorExt, Result, ScreentouchError};
use crate::translator::Translator;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::time::{sleep, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Drives the translator from a touch source until cancelled
pub struct ScreentouchDaemon {
    pub(super) config: ScreentouchConfig,
    pub(super) config_path: Option<PathBuf>,
    pub(super) source: Box<dyn TouchSource>,
    pub(super) translator: Translator,
    pub(super) origin: Instant,
    pub(super) cancellation_token: CancellationToken,
}

impl ScreentouchDaemon {
    /// Assemble the daemon around an already opened source and sink.
    /// Batch timestamps from `source` must be offsets from `origin`.
    pub fn new(
        config: ScreentouchConfig,
        config_path: Option<PathBuf>,
        source: Box<dyn TouchSource>,
        sink: Box<dyn PointerSink>,
        origin: Instant,
    ) -> Result<Self> {
        let transform = build_transform(&config.calibration, source.device_bounds())?;
        let translator = Translator::new(&config, transform, source.slot_count(), sink);

        Ok(Self {
            config,
            config_path,
            source,
            translator,
            origin,
            cancellation_token: CancellationToken::new(),
        })
    }

    /// Open the configured touchscreen and create the virtual pointer for it
    #[cfg(all(feature = "device", target_os = "linux"))]
    pub fn open(config: ScreentouchConfig, config_path: Option<PathBuf>) -> Result<Self> {
        use crate::emitter::UinputSink;
        use crate::input::TouchDevice;

        let origin = Instant::now();
        let device = TouchDevice::open_configured(&config.device.path, config.device.grab, origin)?;
        let transform = build_transform(&config.calibration, device.bounds())?;
        let sink = UinputSink::create(&config.emitter.device_name, transform.display_bounds())?;

        Self::new(config, config_path, Box::new(device), Box::new(sink), origin)
    }

    /// Token that stops [`ScreentouchDaemon::run`] when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    /// Run until a signal, cancellation, end of input or fatal error.
    /// Returns the process exit code.
    pub async fn run(&mut self) -> Result<i32> {
        info!("Screentouch is running on {}", self.source.describe());

        let mut signals = SignalListener::new()?;
        let mut ticker = tokio::time::interval(self.config.system.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let token = self.cancellation_token.clone();

        let reason = loop {
            tokio::select! {
                _ = token.cancelled() => break ShutdownReason::UserRequest,
                signal = signals.recv() => match signal {
                    DaemonSignal::Reload => {
                        if let Err(e) = self.reload_calibration() {
                            error!("Calibration reload failed: {}", e.user_message());
                        }
                    }
                    DaemonSignal::Terminate(name) => break ShutdownReason::Signal(name.to_string()),
                },
                batch = self.source.next_batch() => match batch {
                    Ok(Some(batch)) => {
                        if let Err(e) = self.translator.process_batch(&batch, self.now()) {
                            break ShutdownReason::Error(e.to_string());
                        }
                    }
                    Ok(None) => break ShutdownReason::SourceEnded,
                    Err(e) => {
                        if let Err(e) = self.recover_source(e).await {
                            break ShutdownReason::Error(e.to_string());
                        }
                    }
                },
                _ = ticker.tick() => {
                    if let Err(e) = self.translator.tick(self.now()) {
                        break ShutdownReason::Error(e.to_string());
                    }
                }
            }
        };

        self.shutdown(reason)
    }

    /// Load the calibration settings again and stage the new transform.
    /// An invalid configuration leaves the current transform in place.
    pub fn reload_calibration(&self) -> Result<()> {
        let config = match &self.config_path {
            Some(path) => ScreentouchConfig::load_from_file(path)?,
            None => ScreentouchConfig::load()?,
        };
        config.validate()?;

        let transform = build_transform(&config.calibration, self.source.device_bounds())?;
        self.translator.calibration_slot().stage(transform);
        Ok(())
    }

    /// Release every contact, then reopen the source with exponential backoff
    async fn recover_source(&mut self, failure: ScreentouchError) -> Result<()> {
        warn!("Touch source failed: {}", failure.user_message());
        if !failure.is_recoverable() {
            return Err(failure);
        }
        self.translator.shutdown(self.now())?;

        let max_retries = self.config.system.reconnect_max_retries;
        let retry_delay = self.config.system.reconnect_delay();

        for attempt in 1..=max_retries {
            let delay = retry_delay * 2_u32.pow((attempt - 1).min(5));
            warn!(
                "Reopening touch source in {:?} (attempt {}/{})",
                delay, attempt, max_retries
            );

            tokio::select! {
                _ = self.cancellation_token.cancelled() => return Ok(()),
                _ = sleep(delay) => {}
            }

            match self.source.reconnect().await {
                Ok(()) => {
                    info!("Touch source reopened: {}", self.source.describe());
                    self.restage_if_resized()?;
                    return Ok(());
                }
                Err(e) => debug!("Reopen attempt {} failed: {}", attempt, e),
            }
        }

        Err(ScreentouchError::component(
            "touch_source".to_string(),
            format!("gave up after {} reconnect attempts", max_retries),
        ))
    }

    /// A reopened device may report a different coordinate range or slot count
    fn restage_if_resized(&mut self) -> Result<()> {
        let slot_count = self.source.slot_count();
        if slot_count != self.translator.slot_count() {
            info!("Device now reports {} slots", slot_count);
            self.translator.set_slot_count(slot_count, self.now())?;
        }

        let bounds = self.source.device_bounds();
        if bounds == self.translator.transform().device_bounds() {
            return Ok(());
        }

        info!("Device range changed to {:?}, recalibrating", bounds);
        let transform = build_transform(&self.config.calibration, bounds)?;
        self.translator.calibration_slot().stage(transform);
        Ok(())
    }

    fn shutdown(&mut self, reason: ShutdownReason) -> Result<i32> {
        info!("Shutdown initiated: {:?}", reason);
        self.cancellation_token.cancel();

        let mut exit_code = reason.exit_code();
        if let ShutdownReason::Error(message) = &reason {
            error!("Stopping after fatal error: {}", message);
        }

        if let Err(e) = self.translator.shutdown(self.now()) {
            error!("Failed to release contacts: {}", e);
            exit_code = 1;
        }

        info!("Screentouch shutdown completed with exit code: {}", exit_code);
        Ok(exit_code)
    }
}
