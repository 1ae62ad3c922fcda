use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ScreentouchConfig {
    pub device: DeviceConfig,
    #[serde(default)]
    pub calibration: CalibrationConfig,
    pub debounce: DebounceConfig,
    pub gesture: GestureConfig,
    pub emitter: EmitterConfig,
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DeviceConfig {
    /// Touch input device path; empty means use the first multi-touch device found
    #[serde(default = "default_device_path")]
    pub path: String,

    /// Request exclusive access so the raw touches do not also reach other clients
    #[serde(default = "default_grab")]
    pub grab: bool,
}

#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq)]
pub struct CalibrationConfig {
    /// Display resolution (width, height); absent maps onto the device range itself
    pub display_resolution: Option<(u32, u32)>,

    /// Display rotation
    pub rotation: Option<Rotation>,

    /// Explicit affine coefficients [a, b, c, d, e, f]; overrides the derived mapping
    pub coefficients: Option<[f64; 6]>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DebounceConfig {
    /// Largest single-cycle movement (display units) accepted without confirmation
    #[serde(default = "default_max_jump")]
    pub max_jump: u32,

    /// Consecutive cycles a larger jump must persist before it is accepted
    #[serde(default = "default_jump_confirm_cycles")]
    pub jump_confirm_cycles: u32,

    /// How long a liftoff is held back waiting for the contact to resume
    #[serde(default = "default_liftoff_grace_ms")]
    pub liftoff_grace_ms: u64,

    /// A jump that stays put this long without a contradicting report is accepted
    #[serde(default = "default_jump_settle_ms")]
    pub jump_settle_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct GestureConfig {
    /// Movement (display units) from the touchdown point that turns a press into a drag
    #[serde(default = "default_move_threshold")]
    pub move_threshold: u32,

    /// Presses held longer than this are clicks rather than taps
    #[serde(default = "default_hold_threshold_ms")]
    pub hold_threshold_ms: u64,

    /// Map two and three finger taps to the right and middle buttons
    #[serde(default = "default_multi_finger_buttons")]
    pub multi_finger_buttons: bool,

    /// A touch this soon after a two or three finger tap drags with that
    /// tap's button; 0 disables
    #[serde(default = "default_tap_drag_ms")]
    pub tap_drag_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EmitterConfig {
    /// Name of the virtual pointer device
    #[serde(default = "default_emitter_device_name")]
    pub device_name: String,

    /// Consecutive sink failures tolerated before giving up
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Turn multi-finger movement into wheel events
    #[serde(default = "default_scroll")]
    pub scroll: bool,

    /// Display units of finger travel per wheel step
    #[serde(default = "default_scroll_divisor")]
    pub scroll_divisor: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SystemConfig {
    /// Interval for committing held liftoffs while the screen is quiet
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Attempts to reopen the touch device after it fails
    #[serde(default = "default_reconnect_max_retries")]
    pub reconnect_max_retries: u32,

    /// Base delay between reopen attempts, doubled each time
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    Rotate90,
    Rotate180,
    Rotate270,
}

impl DebounceConfig {
    pub fn liftoff_grace(&self) -> Duration {
        Duration::from_millis(self.liftoff_grace_ms)
    }

    pub fn jump_settle(&self) -> Duration {
        Duration::from_millis(self.jump_settle_ms)
    }
}

impl GestureConfig {
    pub fn hold_threshold(&self) -> Duration {
        Duration::from_millis(self.hold_threshold_ms)
    }

    pub fn tap_drag_window(&self) -> Duration {
        Duration::from_millis(self.tap_drag_ms)
    }
}

impl SystemConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

impl ScreentouchConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("screentouch.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            // Start with default values
            .set_default("device.path", default_device_path())?
            .set_default("device.grab", default_grab())?
            .set_default("debounce.max_jump", default_max_jump() as i64)?
            .set_default(
                "debounce.jump_confirm_cycles",
                default_jump_confirm_cycles() as i64,
            )?
            .set_default("debounce.liftoff_grace_ms", default_liftoff_grace_ms() as i64)?
            .set_default("debounce.jump_settle_ms", default_jump_settle_ms() as i64)?
            .set_default("gesture.move_threshold", default_move_threshold() as i64)?
            .set_default(
                "gesture.hold_threshold_ms",
                default_hold_threshold_ms() as i64,
            )?
            .set_default(
                "gesture.multi_finger_buttons",
                default_multi_finger_buttons(),
            )?
            .set_default("gesture.tap_drag_ms", default_tap_drag_ms() as i64)?
            .set_default("emitter.device_name", default_emitter_device_name())?
            .set_default("emitter.max_retries", default_max_retries() as i64)?
            .set_default("emitter.scroll", default_scroll())?
            .set_default("emitter.scroll_divisor", default_scroll_divisor() as i64)?
            .set_default("system.tick_interval_ms", default_tick_interval_ms() as i64)?
            .set_default(
                "system.reconnect_max_retries",
                default_reconnect_max_retries() as i64,
            )?
            .set_default(
                "system.reconnect_delay_ms",
                default_reconnect_delay_ms() as i64,
            )?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Add environment variables with SCREENTOUCH_ prefix
            .add_source(
                Environment::with_prefix("SCREENTOUCH")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: ScreentouchConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some((width, height)) = self.calibration.display_resolution {
            if width < 2 || height < 2 {
                return Err(ConfigError::Message(
                    "Display resolution must be at least 2x2".to_string(),
                ));
            }
        }

        if self.debounce.max_jump == 0 {
            return Err(ConfigError::Message(
                "Debounce max_jump must be greater than 0".to_string(),
            ));
        }

        if self.debounce.jump_confirm_cycles == 0 {
            return Err(ConfigError::Message(
                "Debounce jump_confirm_cycles must be greater than 0".to_string(),
            ));
        }

        if self.gesture.move_threshold == 0 {
            return Err(ConfigError::Message(
                "Gesture move_threshold must be greater than 0".to_string(),
            ));
        }

        if self.gesture.hold_threshold_ms == 0 {
            return Err(ConfigError::Message(
                "Gesture hold_threshold_ms must be greater than 0".to_string(),
            ));
        }

        if self.emitter.max_retries == 0 {
            return Err(ConfigError::Message(
                "Emitter max_retries must be greater than 0".to_string(),
            ));
        }

        if self.emitter.scroll_divisor == 0 {
            return Err(ConfigError::Message(
                "Emitter scroll_divisor must be greater than 0".to_string(),
            ));
        }

        if self.system.tick_interval_ms == 0 {
            return Err(ConfigError::Message(
                "System tick_interval_ms must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for ScreentouchConfig {
    fn default() -> Self {
        Self {
            device: DeviceConfig {
                path: default_device_path(),
                grab: default_grab(),
            },
            calibration: CalibrationConfig::default(),
            debounce: DebounceConfig::default(),
            gesture: GestureConfig::default(),
            emitter: EmitterConfig::default(),
            system: SystemConfig {
                tick_interval_ms: default_tick_interval_ms(),
                reconnect_max_retries: default_reconnect_max_retries(),
                reconnect_delay_ms: default_reconnect_delay_ms(),
            },
        }
    }
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            max_jump: default_max_jump(),
            jump_confirm_cycles: default_jump_confirm_cycles(),
            liftoff_grace_ms: default_liftoff_grace_ms(),
            jump_settle_ms: default_jump_settle_ms(),
        }
    }
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            move_threshold: default_move_threshold(),
            hold_threshold_ms: default_hold_threshold_ms(),
            multi_finger_buttons: default_multi_finger_buttons(),
            tap_drag_ms: default_tap_drag_ms(),
        }
    }
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            device_name: default_emitter_device_name(),
            max_retries: default_max_retries(),
            scroll: default_scroll(),
            scroll_divisor: default_scroll_divisor(),
        }
    }
}

// Default value functions
fn default_device_path() -> String {
    String::new()
}
fn default_grab() -> bool {
    true
}

fn default_max_jump() -> u32 {
    256
}
fn default_jump_confirm_cycles() -> u32 {
    3
}
fn default_liftoff_grace_ms() -> u64 {
    30
}
fn default_jump_settle_ms() -> u64 {
    30
}

fn default_move_threshold() -> u32 {
    10
}
fn default_hold_threshold_ms() -> u64 {
    300
}
fn default_multi_finger_buttons() -> bool {
    true
}
fn default_tap_drag_ms() -> u64 {
    192
}

fn default_emitter_device_name() -> String {
    "Screentouch: Touch to mouse translator".to_string()
}
fn default_max_retries() -> u32 {
    5
}
fn default_scroll() -> bool {
    true
}
fn default_scroll_divisor() -> u32 {
    8
}

fn default_tick_interval_ms() -> u64 {
    10
}
fn default_reconnect_max_retries() -> u32 {
    10
}
fn default_reconnect_delay_ms() -> u64 {
    500
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = ScreentouchConfig::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.gesture.move_threshold, 10);
        assert_eq!(config.gesture.hold_threshold(), Duration::from_millis(300));
        assert_eq!(config.debounce.jump_confirm_cycles, 3);
        assert!(config.device.path.is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[device]
path = "/dev/input/event7"
grab = false

[calibration]
display_resolution = [1280, 800]
rotation = "Rotate180"

[gesture]
move_threshold = 4
"#
        )
        .unwrap();

        let config = ScreentouchConfig::load_from_file(file.path()).unwrap();

        assert_eq!(config.device.path, "/dev/input/event7");
        assert!(!config.device.grab);
        assert_eq!(config.calibration.display_resolution, Some((1280, 800)));
        assert_eq!(config.calibration.rotation, Some(Rotation::Rotate180));
        assert_eq!(config.gesture.move_threshold, 4);
        // Untouched sections keep their defaults
        assert_eq!(config.gesture.hold_threshold_ms, 300);
        assert_eq!(config.debounce, DebounceConfig::default());
        assert_eq!(config.emitter, EmitterConfig::default());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ScreentouchConfig::load_from_file(dir.path().join("absent.toml")).unwrap();

        assert_eq!(config.debounce, DebounceConfig::default());
        assert_eq!(config.calibration, CalibrationConfig::default());
    }

    #[test]
    fn test_config_validation() {
        let mut config = ScreentouchConfig::default();
        config.emitter.scroll_divisor = 0;
        assert!(config.validate().is_err());

        config.emitter.scroll_divisor = 8;
        config.calibration.display_resolution = Some((1, 600));
        assert!(config.validate().is_err());

        config.calibration.display_resolution = Some((800, 600));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_move_threshold_is_rejected() {
        let mut config = ScreentouchConfig::default();
        config.gesture.move_threshold = 0;

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("move_threshold"));
    }

    #[test]
    fn test_environment_overrides_use_double_underscore() {
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("SCREENTOUCH_SYSTEM__RECONNECT_DELAY_MS", "750");
        let loaded = ScreentouchConfig::load_from_file(dir.path().join("absent.toml"));
        std::env::remove_var("SCREENTOUCH_SYSTEM__RECONNECT_DELAY_MS");

        let config = loaded.unwrap();
        assert_eq!(config.system.reconnect_delay_ms, 750);
        assert_eq!(
            config.system.reconnect_max_retries,
            default_reconnect_max_retries()
        );
    }

    #[test]
    fn test_serializes_to_toml() {
        let config = ScreentouchConfig::default();
        let rendered = toml::to_string_pretty(&config).unwrap();

        assert!(rendered.contains("[gesture]"));
        assert!(rendered.contains("move_threshold = 10"));
    }
}
