pub mod camera_control;
pub mod camera_device;
pub mod synthetic;

#[cfg(all(target_os = "linux", feature = "v4l2"))]
pub mod v4l2;

pub use camera_control::CameraControl;
pub use camera_device::{CameraDevice, DeviceFactory};
pub use synthetic::SyntheticCamera;
