mod decoder;
mod device;

#[cfg(test)]
mod tests;

pub use decoder::MtDecoder;
pub use device::{discover_touch_devices, TouchDevice};
