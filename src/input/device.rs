use super::decoder::MtDecoder;
use crate::calibration::Bounds;
use crate::error::DeviceError;
use crate::touch::RawTouchEvent;
use evdev::{AbsoluteAxisType, Device, EventStream};
use std::io;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

const REQUIRED_AXES: [AbsoluteAxisType; 4] = [
    AbsoluteAxisType::ABS_MT_SLOT,
    AbsoluteAxisType::ABS_MT_TRACKING_ID,
    AbsoluteAxisType::ABS_MT_POSITION_X,
    AbsoluteAxisType::ABS_MT_POSITION_Y,
];

/// An opened multi-touch screen delivering raw report batches
pub struct TouchDevice {
    path: String,
    name: String,
    bounds: Bounds,
    slot_count: usize,
    grab: bool,
    origin: Instant,
    stream: EventStream,
    decoder: MtDecoder,
}

impl TouchDevice {
    /// Open and validate the device at `path`. Timestamps of the batches are
    /// offsets from `origin`.
    pub fn open(path: &str, grab: bool, origin: Instant) -> Result<Self, DeviceError> {
        let mut device = Device::open(path).map_err(|e| open_error(path, e))?;
        let name = device.name().unwrap_or("Unknown").to_string();
        info!("Touch device opened: {} ({})", path, name);

        validate_multitouch(&device, path)?;
        let (bounds, slot_count) = read_geometry(&device, path)?;
        debug!(
            "Device {} reports {} slots over {:?}",
            path, slot_count, bounds
        );

        if grab {
            device.grab().map_err(|e| DeviceError::Open {
                device: path.to_string(),
                details: format!("exclusive grab failed: {}", e),
            })?;
            debug!("Grabbed {} for exclusive access", path);
        }

        let stream = device.into_event_stream().map_err(|e| open_error(path, e))?;

        Ok(Self {
            path: path.to_string(),
            name,
            bounds,
            slot_count,
            grab,
            origin,
            stream,
            decoder: MtDecoder::new(origin),
        })
    }

    /// Open the configured path, or the first multi-touch device found
    pub fn open_configured(path: &str, grab: bool, origin: Instant) -> Result<Self, DeviceError> {
        if !path.is_empty() {
            return Self::open(path, grab, origin);
        }

        let candidate = discover_touch_devices()
            .into_iter()
            .next()
            .ok_or(DeviceError::NotAvailable)?;
        info!("Using discovered touch device {}", candidate);
        Self::open(&candidate, grab, origin)
    }

    /// Open the same device node again after a failure
    pub fn reopen(&self) -> Result<Self, DeviceError> {
        Self::open(&self.path, self.grab, self.origin)
    }

    /// Drop the exclusive grab so the node can be grabbed again
    pub fn release_grab(&mut self) {
        if !self.grab {
            return;
        }
        match self.stream.device_mut().ungrab() {
            Ok(()) => debug!("Released grab on {}", self.path),
            Err(e) => debug!("Releasing grab on {} failed: {}", self.path, e),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw coordinate range of the screen
    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    /// Wait for the next complete report
    pub async fn read_batch(&mut self) -> Result<Vec<RawTouchEvent>, DeviceError> {
        loop {
            let event = self
                .stream
                .next_event()
                .await
                .map_err(|e| DeviceError::Read {
                    details: format!("{}: {}", self.path, e),
                })?;

            if let Some(batch) = self.decoder.decode(&event) {
                return Ok(batch);
            }
        }
    }
}

fn open_error(path: &str, e: io::Error) -> DeviceError {
    match e.kind() {
        io::ErrorKind::NotFound => DeviceError::NotFound(path.to_string()),
        io::ErrorKind::PermissionDenied => DeviceError::PermissionDenied(path.to_string()),
        _ => DeviceError::Open {
            device: path.to_string(),
            details: e.to_string(),
        },
    }
}

fn is_multitouch(device: &Device) -> bool {
    device
        .supported_absolute_axes()
        .map(|axes| REQUIRED_AXES.iter().all(|axis| axes.contains(*axis)))
        .unwrap_or(false)
}

fn validate_multitouch(device: &Device, path: &str) -> Result<(), DeviceError> {
    if is_multitouch(device) {
        return Ok(());
    }
    Err(DeviceError::Unsupported(format!(
        "{} does not report multi-touch slots and positions",
        path
    )))
}

fn read_geometry(device: &Device, path: &str) -> Result<(Bounds, usize), DeviceError> {
    let state = device.get_abs_state().map_err(|e| DeviceError::Open {
        device: path.to_string(),
        details: format!("reading axis ranges failed: {}", e),
    })?;

    let info = |axis: AbsoluteAxisType| state[axis.0 as usize];
    let x = info(AbsoluteAxisType::ABS_MT_POSITION_X);
    let y = info(AbsoluteAxisType::ABS_MT_POSITION_Y);
    let slots = info(AbsoluteAxisType::ABS_MT_SLOT);

    let bounds = Bounds::new(x.minimum, x.maximum, y.minimum, y.maximum);
    let slot_count = usize::try_from(slots.maximum.saturating_add(1)).unwrap_or(1).max(1);
    Ok((bounds, slot_count))
}

/// Scan `/dev/input` for multi-touch screens, in event node order
pub fn discover_touch_devices() -> Vec<String> {
    let entries = match std::fs::read_dir("/dev/input") {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Cannot list /dev/input: {}", e);
            return Vec::new();
        }
    };

    let mut nodes: Vec<(u32, String)> = entries
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().to_string();
            let index = name.strip_prefix("event")?.parse().ok()?;
            Some((index, entry.path().to_string_lossy().to_string()))
        })
        .collect();
    nodes.sort();

    let mut devices = Vec::new();
    for (_, path) in nodes {
        match Device::open(Path::new(&path)) {
            Ok(device) if is_multitouch(&device) => {
                info!(
                    "Found multi-touch device: {} ({})",
                    path,
                    device.name().unwrap_or("Unknown")
                );
                devices.push(path);
            }
            Ok(_) => {}
            Err(e) => debug!("Skipping {}: {}", path, e),
        }
    }
    devices
}
