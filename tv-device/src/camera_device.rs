//! The `CameraDevice` capability trait, grounded on `src/lib/core/camera.hh`
//! from the original implementation, reshaped to a trait the way
//! `media-device/src/device.rs` reshapes `Device`/`OutputDevice`.

use tv_core::{ColorSpace, ImageBuffer, ImageHeader, Result};

/// A single physical or synthetic video source. Implementations own their
/// own capture resources; `CameraControl` is the only intended caller.
pub trait CameraDevice: Send {
    /// Stable identifier for this device, e.g. a `/dev/videoN` index.
    fn id(&self) -> u8;

    /// Open with the device's default framesize.
    fn open(&mut self) -> Result<()> {
        self.open_with_size(0, 0)
    }

    /// Open requesting `(width, height)`. `0, 0` means "no preference".
    /// Implementations negotiate and may end up with a different size; the
    /// caller reads it back via `frame_header` and decides whether to revert.
    fn open_with_size(&mut self, width: u16, height: u16) -> Result<()>;

    /// Idempotent: closing an already-closed device is not an error.
    fn close(&mut self);

    fn is_open(&self) -> bool;

    /// Fill `out` with the current frame. On failure `out` is left
    /// untouched so the caller can fall back to a cached or synthetic image.
    fn get_frame(&mut self, out: &mut ImageBuffer) -> Result<()>;

    /// Only meaningful while `is_open()`.
    fn frame_header(&self) -> Option<ImageHeader>;

    /// The native colour-space this device emits; the kernel never
    /// reinterprets it, only routes it through `tv-convert`.
    fn image_format(&self) -> ColorSpace;
}

/// Constructs a `CameraDevice` for a candidate id, or reports none available.
/// `CameraControl` is generic over this so tests can supply a synthetic
/// factory instead of a real backend.
pub type DeviceFactory = Box<dyn Fn(u8) -> Option<Box<dyn CameraDevice>> + Send + Sync>;
