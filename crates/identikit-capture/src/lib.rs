//! identikit-capture: camera capture for the identification client.
//!
//! Opens a V4L2 device, discards warmup frames, snaps one non-dark frame
//! and turns it into the 320×320 square still that the backend expects.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, DeviceInfo, PixelFormat};
pub use frame::Frame;
