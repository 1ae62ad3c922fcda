use crate::config::{CalibrationConfig, Rotation};
use crate::error::CalibrationError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// A position in display space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point
    pub fn distance_to(&self, other: Point) -> f64 {
        let dx = (other.x - self.x) as f64;
        let dy = (other.y - self.y) as f64;
        (dx * dx + dy * dy).sqrt()
    }

    /// Component-wise difference `other - self`
    pub fn delta_to(&self, other: Point) -> (i32, i32) {
        (other.x - self.x, other.y - self.y)
    }
}

/// Inclusive rectangle used for both device space and display space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_x: i32,
    pub max_x: i32,
    pub min_y: i32,
    pub max_y: i32,
}

impl Bounds {
    pub fn new(min_x: i32, max_x: i32, min_y: i32, max_y: i32) -> Self {
        Self {
            min_x,
            max_x,
            min_y,
            max_y,
        }
    }

    /// Bounds of a `width` x `height` surface starting at the origin
    pub fn from_size(width: u32, height: u32) -> Self {
        Self::new(
            0,
            width.saturating_sub(1) as i32,
            0,
            height.saturating_sub(1) as i32,
        )
    }

    pub fn width(&self) -> f64 {
        (self.max_x - self.min_x) as f64
    }

    pub fn height(&self) -> f64 {
        (self.max_y - self.min_y) as f64
    }

    pub fn clamp(&self, x: i32, y: i32) -> (i32, i32) {
        (x.clamp(self.min_x, self.max_x), y.clamp(self.min_y, self.max_y))
    }

    fn check(&self, name: &'static str) -> Result<(), CalibrationError> {
        if self.max_x <= self.min_x {
            return Err(CalibrationError::EmptyBounds {
                name,
                axis: 'x',
                min: self.min_x,
                max: self.max_x,
            });
        }
        if self.max_y <= self.min_y {
            return Err(CalibrationError::EmptyBounds {
                name,
                axis: 'y',
                min: self.min_y,
                max: self.max_y,
            });
        }
        Ok(())
    }
}

/// Affine mapping from raw device coordinates to display coordinates.
///
/// With coefficients `[a, b, c, d, e, f]`:
///
/// ```text
/// display_x = a * raw_x + b * raw_y + c
/// display_y = d * raw_x + e * raw_y + f
/// ```
///
/// Raw input is clamped to the device bounds before mapping and the result is
/// clamped to the display bounds, so an out-of-range sample still lands on the
/// screen edge instead of dropping the contact.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationTransform {
    coefficients: [f64; 6],
    device: Bounds,
    display: Bounds,
}

impl CalibrationTransform {
    /// Build a transform from explicit coefficients
    pub fn new(
        coefficients: [f64; 6],
        device: Bounds,
        display: Bounds,
    ) -> Result<Self, CalibrationError> {
        device.check("device")?;
        display.check("display")?;

        if let Some((index, value)) = coefficients
            .iter()
            .copied()
            .enumerate()
            .find(|(_, value)| !value.is_finite())
        {
            return Err(CalibrationError::NonFinite { index, value });
        }

        let [a, b, _, d, e, _] = coefficients;
        let determinant = a * e - b * d;
        if determinant.abs() < 1e-12 {
            return Err(CalibrationError::Degenerate { determinant });
        }

        Ok(Self {
            coefficients,
            device,
            display,
        })
    }

    /// Stretch the device range over the display range, optionally rotated
    /// clockwise by the given quarter turns.
    pub fn from_bounds(
        device: Bounds,
        display: Bounds,
        rotation: Option<Rotation>,
    ) -> Result<Self, CalibrationError> {
        device.check("device")?;
        display.check("display")?;

        // Normalised device coordinates: u = su * x + tu, v = sv * y + tv
        let su = 1.0 / device.width();
        let tu = -(device.min_x as f64) * su;
        let sv = 1.0 / device.height();
        let tv = -(device.min_y as f64) * sv;

        // Rotated normalised coordinates as rows over (u, v, 1)
        let ((p1, q1, r1), (p2, q2, r2)) = match rotation {
            None => ((1.0, 0.0, 0.0), (0.0, 1.0, 0.0)),
            Some(Rotation::Rotate90) => ((0.0, -1.0, 1.0), (1.0, 0.0, 0.0)),
            Some(Rotation::Rotate180) => ((-1.0, 0.0, 1.0), (0.0, -1.0, 1.0)),
            Some(Rotation::Rotate270) => ((0.0, 1.0, 0.0), (-1.0, 0.0, 1.0)),
        };

        let dw = display.width();
        let dh = display.height();
        let coefficients = [
            dw * p1 * su,
            dw * q1 * sv,
            display.min_x as f64 + dw * (p1 * tu + q1 * tv + r1),
            dh * p2 * su,
            dh * q2 * sv,
            display.min_y as f64 + dh * (p2 * tu + q2 * tv + r2),
        ];

        debug!(
            "Derived calibration coefficients {:?} for rotation {:?}",
            coefficients, rotation
        );

        Self::new(coefficients, device, display)
    }

    /// One-to-one mapping of a range onto itself
    pub fn identity(bounds: Bounds) -> Result<Self, CalibrationError> {
        Self::from_bounds(bounds, bounds, None)
    }

    /// Map a raw device coordinate into display space
    pub fn map(&self, raw_x: i32, raw_y: i32) -> Point {
        let (rx, ry) = self.device.clamp(raw_x, raw_y);
        let (rx, ry) = (rx as f64, ry as f64);
        let [a, b, c, d, e, f] = self.coefficients;

        let x = (a * rx + b * ry + c).round();
        let y = (d * rx + e * ry + f).round();

        // Saturating float to int casts, then onto the screen
        let (x, y) = self.display.clamp(x as i32, y as i32);
        Point::new(x, y)
    }

    pub fn coefficients(&self) -> [f64; 6] {
        self.coefficients
    }

    pub fn device_bounds(&self) -> Bounds {
        self.device
    }

    pub fn display_bounds(&self) -> Bounds {
        self.display
    }
}

/// Build the session transform for a device from the calibration settings.
/// Without a display resolution the device range maps onto itself.
pub fn build_transform(
    config: &CalibrationConfig,
    device: Bounds,
) -> Result<CalibrationTransform, CalibrationError> {
    let display = config
        .display_resolution
        .map(|(width, height)| Bounds::from_size(width, height))
        .unwrap_or(device);

    match config.coefficients {
        Some(coefficients) => CalibrationTransform::new(coefficients, device, display),
        None => CalibrationTransform::from_bounds(device, display, config.rotation),
    }
}

/// Hand-off point for a recalibration requested outside the pipeline.
///
/// The reload side stages a transform at any time; the pipeline only takes it
/// between cycles so one batch is always processed under a single transform.
#[derive(Debug, Clone, Default)]
pub struct CalibrationSlot {
    pending: Arc<Mutex<Option<CalibrationTransform>>>,
}

impl CalibrationSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a transform, replacing any not yet applied
    pub fn stage(&self, transform: CalibrationTransform) {
        let replaced = self.pending.lock().replace(transform);
        if replaced.is_some() {
            debug!("Replacing a staged calibration that was never applied");
        }
        info!("New calibration staged for the next cycle");
    }

    pub fn take(&self) -> Option<CalibrationTransform> {
        self.pending.lock().take()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.lock().is_some()
    }
}
