use super::sink::{PointerAction, PointerSink};
use crate::calibration::Bounds;
use crate::error::{DeviceError, EmitError};
use crate::gesture::Button;
use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{
    AbsInfo, AbsoluteAxisType, AttributeSet, EventType, InputEvent, Key, RelativeAxisType,
    UinputAbsSetup,
};
use std::io;
use tracing::info;

/// Virtual absolute pointer created through uinput
pub struct UinputSink {
    device: VirtualDevice,
}

impl UinputSink {
    /// Create the virtual device with its absolute range spanning `display`
    pub fn create(name: &str, display: Bounds) -> Result<Self, DeviceError> {
        let device = Self::build(name, display).map_err(|e| match e.kind() {
            io::ErrorKind::PermissionDenied => DeviceError::PermissionDenied("/dev/uinput".to_string()),
            io::ErrorKind::NotFound => DeviceError::NotFound("/dev/uinput".to_string()),
            _ => DeviceError::Open {
                device: "/dev/uinput".to_string(),
                details: e.to_string(),
            },
        })?;

        let width = display.max_x - display.min_x + 1;
        let height = display.max_y - display.min_y + 1;
        info!("Created virtual pointer '{}' spanning {}x{}", name, width, height);
        Ok(Self { device })
    }

    fn build(name: &str, display: Bounds) -> io::Result<VirtualDevice> {
        let mut keys = AttributeSet::<Key>::new();
        keys.insert(Key::BTN_LEFT);
        keys.insert(Key::BTN_RIGHT);
        keys.insert(Key::BTN_MIDDLE);

        let mut wheels = AttributeSet::<RelativeAxisType>::new();
        wheels.insert(RelativeAxisType::REL_WHEEL);
        wheels.insert(RelativeAxisType::REL_HWHEEL);

        let abs_x = AbsInfo::new(display.min_x, display.min_x, display.max_x, 0, 0, 0);
        let abs_y = AbsInfo::new(display.min_y, display.min_y, display.max_y, 0, 0, 0);

        VirtualDeviceBuilder::new()?
            .name(name)
            .with_keys(&keys)?
            .with_absolute_axis(&UinputAbsSetup::new(AbsoluteAxisType::ABS_X, abs_x))?
            .with_absolute_axis(&UinputAbsSetup::new(AbsoluteAxisType::ABS_Y, abs_y))?
            .with_relative_axes(&wheels)?
            .build()
    }
}

fn button_key(button: Button) -> Key {
    match button {
        Button::Left => Key::BTN_LEFT,
        Button::Right => Key::BTN_RIGHT,
        Button::Middle => Key::BTN_MIDDLE,
    }
}

/// Input events for one frame, without the trailing SYN_REPORT
pub(crate) fn frame_events(frame: &[PointerAction]) -> Vec<InputEvent> {
    let mut events = Vec::with_capacity(frame.len() * 2);
    for action in frame {
        match *action {
            PointerAction::MoveTo { x, y } => {
                events.push(InputEvent::new(EventType::ABSOLUTE, AbsoluteAxisType::ABS_X.0, x));
                events.push(InputEvent::new(EventType::ABSOLUTE, AbsoluteAxisType::ABS_Y.0, y));
            }
            PointerAction::Press(button) => {
                events.push(InputEvent::new(EventType::KEY, button_key(button).code(), 1));
            }
            PointerAction::Release(button) => {
                events.push(InputEvent::new(EventType::KEY, button_key(button).code(), 0));
            }
            PointerAction::Scroll {
                vertical,
                horizontal,
            } => {
                if vertical != 0 {
                    events.push(InputEvent::new(
                        EventType::RELATIVE,
                        RelativeAxisType::REL_WHEEL.0,
                        vertical,
                    ));
                }
                if horizontal != 0 {
                    events.push(InputEvent::new(
                        EventType::RELATIVE,
                        RelativeAxisType::REL_HWHEEL.0,
                        horizontal,
                    ));
                }
            }
        }
    }
    events
}

impl PointerSink for UinputSink {
    fn send(&mut self, frame: &[PointerAction]) -> Result<(), EmitError> {
        let events = frame_events(frame);
        if events.is_empty() {
            return Ok(());
        }
        // emit() appends the SYN_REPORT that closes the frame
        self.device.emit(&events).map_err(|e| EmitError::Busy {
            details: e.to_string(),
        })
    }
}
