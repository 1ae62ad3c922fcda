use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScreentouchError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Calibration error: {0}")]
    Calibration(#[from] CalibrationError),

    #[error("Emitter error: {0}")]
    Emit(#[from] EmitError),

    #[error("Touch device error: {0}")]
    Device(#[from] DeviceError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl ScreentouchError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }
}

/// Rejected calibration parameters. The previously loaded transform stays in effect.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("coefficient {index} is not finite ({value})")]
    NonFinite { index: usize, value: f64 },

    #[error("transform is degenerate (determinant {determinant})")]
    Degenerate { determinant: f64 },

    #[error("{name} bounds are empty on the {axis} axis ({min}..={max})")]
    EmptyBounds {
        name: &'static str,
        axis: char,
        min: i32,
        max: i32,
    },
}

/// Failures reported by the virtual pointer sink
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EmitError {
    /// The sink could not take the frame right now; it stays queued
    #[error("pointer sink busy: {details}")]
    Busy { details: String },

    /// The sink kept failing past the retry budget
    #[error("pointer sink failed {attempts} consecutive times: {details}")]
    Exhausted { attempts: u32, details: String },
}

impl EmitError {
    pub fn is_transient(&self) -> bool {
        matches!(self, EmitError::Busy { .. })
    }
}

#[derive(Error, Debug, Clone)]
pub enum DeviceError {
    #[error("device not found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("failed to open {device}: {details}")]
    Open { device: String, details: String },

    #[error("unsupported device: {0}")]
    Unsupported(String),

    #[error("read error: {details}")]
    Read { details: String },

    #[error("no multi-touch device available")]
    NotAvailable,
}

pub type Result<T> = std::result::Result<T, ScreentouchError>;

pub trait ErrorExt {
    fn is_recoverable(&self) -> bool;
    fn user_message(&self) -> String;
}

impl ErrorExt for DeviceError {
    fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DeviceError::Read { .. } | DeviceError::Open { .. } | DeviceError::NotFound(_)
        )
    }

    fn user_message(&self) -> String {
        match self {
            DeviceError::NotFound(device) => format!("Touch device not found: {}", device),
            DeviceError::PermissionDenied(device) => {
                format!("Permission denied for touch device: {}", device)
            }
            DeviceError::Open { device, .. } => format!("Touch device could not be opened at {}", device),
            DeviceError::Unsupported(device) => format!("Not a multi-touch device: {}", device),
            DeviceError::Read { details } => format!("Touch device read error: {}", details),
            DeviceError::NotAvailable => "Touch input not available on this system".to_string(),
        }
    }
}

impl ErrorExt for ScreentouchError {
    fn is_recoverable(&self) -> bool {
        match self {
            ScreentouchError::Device(err) => err.is_recoverable(),
            ScreentouchError::Emit(err) => err.is_transient(),
            ScreentouchError::Calibration(_) => true,
            _ => false,
        }
    }

    fn user_message(&self) -> String {
        match self {
            ScreentouchError::Device(err) => err.user_message(),
            ScreentouchError::Emit(EmitError::Exhausted { attempts, .. }) => format!(
                "Virtual pointer device stopped accepting events after {} attempts",
                attempts
            ),
            ScreentouchError::Calibration(err) => {
                format!("Calibration rejected, keeping the previous one: {}", err)
            }
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_error_recoverability() {
        assert!(DeviceError::Read {
            details: "ENODEV".to_string()
        }
        .is_recoverable());
        assert!(!DeviceError::PermissionDenied("/dev/input/event3".to_string()).is_recoverable());
        assert!(!DeviceError::Unsupported("keyboard".to_string()).is_recoverable());
    }

    #[test]
    fn test_sink_exhaustion_is_fatal() {
        let busy: ScreentouchError = EmitError::Busy {
            details: "EAGAIN".to_string(),
        }
        .into();
        let exhausted: ScreentouchError = EmitError::Exhausted {
            attempts: 5,
            details: "EIO".to_string(),
        }
        .into();

        assert!(busy.is_recoverable());
        assert!(!exhausted.is_recoverable());
        assert!(exhausted.user_message().contains("5 attempts"));
    }

    #[test]
    fn test_component_helper() {
        let err = ScreentouchError::component("emitter", "queue overflow");
        assert_eq!(err.to_string(), "Component error in emitter: queue overflow");
    }
}
