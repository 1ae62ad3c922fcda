use crate::error::Result;
use tracing::info;
#[cfg(not(unix))]
use tracing::warn;

#[cfg(unix)]
use tokio::signal::unix::{signal, Signal, SignalKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum DaemonSignal {
    /// SIGHUP: reload the calibration
    Reload,
    Terminate(&'static str),
}

pub(super) struct SignalListener {
    #[cfg(unix)]
    hangup: Signal,
    #[cfg(unix)]
    terminate: Signal,
    #[cfg(unix)]
    interrupt: Signal,
}

impl SignalListener {
    pub(super) fn new() -> Result<Self> {
        Ok(Self {
            #[cfg(unix)]
            hangup: signal(SignalKind::hangup())?,
            #[cfg(unix)]
            terminate: signal(SignalKind::terminate())?,
            #[cfg(unix)]
            interrupt: signal(SignalKind::interrupt())?,
        })
    }

    pub(super) async fn recv(&mut self) -> DaemonSignal {
        #[cfg(unix)]
        {
            tokio::select! {
                Some(()) = self.hangup.recv() => {
                    info!("Received SIGHUP signal");
                    DaemonSignal::Reload
                }
                Some(()) = self.terminate.recv() => {
                    info!("Received SIGTERM signal");
                    DaemonSignal::Terminate("SIGTERM")
                }
                Some(()) = self.interrupt.recv() => {
                    info!("Received SIGINT signal (Ctrl+C)");
                    DaemonSignal::Terminate("SIGINT")
                }
            }
        }

        #[cfg(not(unix))]
        {
            interrupt().await;
            DaemonSignal::Terminate("SIGINT")
        }
    }
}

#[cfg(not(unix))]
async fn interrupt() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received SIGINT signal (Ctrl+C)"),
        Err(e) => {
            warn!("Cannot listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
