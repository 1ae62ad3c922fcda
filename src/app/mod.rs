mod daemon;
mod signals;
mod source;
mod types;

#[cfg(test)]
mod tests;

pub use daemon::ScreentouchDaemon;
pub use source::{ReplaySource, ReplayStep, TouchSource};
pub use types::ShutdownReason;
