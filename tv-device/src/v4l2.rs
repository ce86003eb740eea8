//! Linux V4L2 backend, feature-gated behind `v4l2`. Grounded on the `v4l`
//! crate usage in `cosmic-utils-camera`'s kernel capture backend
//! (`v4l::prelude`, `v4l::video::Capture`, `v4l::io::mmap::Stream`), trimmed
//! to the single-format, single-resolution capture this kernel needs -- no
//! depth-sensor controls, no device pairing.

use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

use tv_core::error::Error;
use tv_core::{ColorSpace, ImageBuffer, ImageHeader, Result};

use crate::camera_device::CameraDevice;

/// `Stream` borrows from the `Device` it streams; the device is boxed so its
/// address is stable for the stream's lifetime, and both are dropped
/// together from `close`/`Drop`, so the borrow never outlives its target.
pub struct V4l2Camera {
    id: u8,
    device: Option<Box<v4l::Device>>,
    stream: Option<Stream<'static>>,
    width: u16,
    height: u16,
}

impl V4l2Camera {
    pub fn new(id: u8) -> Self {
        V4l2Camera {
            id,
            device: None,
            stream: None,
            width: 0,
            height: 0,
        }
    }
}

impl CameraDevice for V4l2Camera {
    fn id(&self) -> u8 {
        self.id
    }

    fn open_with_size(&mut self, width: u16, height: u16) -> Result<()> {
        let device = Box::new(
            v4l::Device::new(self.id as usize)
                .map_err(|e| Error::CameraUnavailable(format!("/dev/video{}: {e}", self.id).into()))?,
        );

        let mut format = device
            .format()
            .map_err(|e| Error::CameraUnavailable(format!("querying format: {e}").into()))?;
        if width > 0 && height > 0 {
            format.width = width as u32;
            format.height = height as u32;
        }
        format.fourcc = FourCC::new(b"YUYV");
        let format = device
            .set_format(&format)
            .map_err(|e| Error::CameraSettingsFailed(format!("negotiating format: {e}").into()))?;

        // SAFETY: `device` is heap-allocated and moved into `self.device`
        // immediately below without being deallocated or reallocated, so the
        // reference handed to `Stream` stays valid for as long as the stream
        // does; `close` drops the stream before the device.
        let device_ref: &'static v4l::Device = unsafe { &*(device.as_ref() as *const v4l::Device) };
        let stream = Stream::with_buffers(device_ref, Type::VideoCapture, 4)
            .map_err(|e| Error::CameraUnavailable(format!("starting stream: {e}").into()))?;

        self.width = format.width as u16;
        self.height = format.height as u16;
        self.device = Some(device);
        self.stream = Some(stream);
        Ok(())
    }

    fn close(&mut self) {
        self.stream = None;
        self.device = None;
    }

    fn is_open(&self) -> bool {
        self.device.is_some()
    }

    fn get_frame(&mut self, out: &mut ImageBuffer) -> Result<()> {
        let stream = self.stream.as_mut().ok_or_else(|| Error::State("device not open".into()))?;
        let (bytes, _meta) = stream
            .next()
            .map_err(|e| Error::CameraUnavailable(format!("grabbing frame: {e}").into()))?;

        let header = ImageHeader::new(self.width, self.height, bytes.len(), ColorSpace::Yuyv);
        out.allocate(header)?;
        out.copy_from(bytes);
        Ok(())
    }

    fn frame_header(&self) -> Option<ImageHeader> {
        self.is_open().then(|| {
            let bytesize = ColorSpace::Yuyv.expected_bytesize(self.width, self.height).unwrap_or(0);
            ImageHeader::new(self.width, self.height, bytesize, ColorSpace::Yuyv)
        })
    }

    fn image_format(&self) -> ColorSpace {
        ColorSpace::Yuyv
    }
}

impl Drop for V4l2Camera {
    fn drop(&mut self) {
        self.close();
    }
}
