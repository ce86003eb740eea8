//! A deterministic, allocation-free `CameraDevice` for tests and examples.
//! Fills frames with a counter-derived pattern so consumers can assert on
//! frame content without any real capture hardware.

use tv_core::{ColorSpace, ImageBuffer, ImageHeader, Result};

use crate::camera_device::CameraDevice;

pub struct SyntheticCamera {
    id: u8,
    open: bool,
    width: u16,
    height: u16,
    format: ColorSpace,
    frame_counter: u8,
    fail_next_frame: bool,
}

impl SyntheticCamera {
    pub fn new(id: u8) -> Self {
        SyntheticCamera {
            id,
            open: false,
            width: 640,
            height: 480,
            format: ColorSpace::Bgr888,
            frame_counter: 0,
            fail_next_frame: false,
        }
    }

    /// Test hook: make the next `get_frame` call fail once, exercising
    /// `CameraControl`'s fallback-substitution path.
    pub fn fail_next_frame(&mut self) {
        self.fail_next_frame = true;
    }
}

impl CameraDevice for SyntheticCamera {
    fn id(&self) -> u8 {
        self.id
    }

    fn open_with_size(&mut self, width: u16, height: u16) -> Result<()> {
        if width > 0 && height > 0 {
            self.width = width;
            self.height = height;
        }
        self.open = true;
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn get_frame(&mut self, out: &mut ImageBuffer) -> Result<()> {
        if !self.open {
            return Err(tv_core::error::Error::State("device not open".into()));
        }
        if self.fail_next_frame {
            self.fail_next_frame = false;
            return Err(tv_core::error::Error::CameraUnavailable("synthetic failure".into()));
        }
        let bytesize = self
            .format
            .expected_bytesize(self.width, self.height)
            .expect("synthetic camera only uses formats with a fixed bytesize");
        let header = ImageHeader::new(self.width, self.height, bytesize, self.format);
        out.allocate(header)?;
        let fill = self.frame_counter;
        self.frame_counter = self.frame_counter.wrapping_add(1);
        out.copy_from(&vec![fill; bytesize]);
        Ok(())
    }

    fn frame_header(&self) -> Option<ImageHeader> {
        self.open.then(|| {
            ImageHeader::new(
                self.width,
                self.height,
                self.format.expected_bytesize(self.width, self.height).unwrap_or(0),
                self.format,
            )
        })
    }

    fn image_format(&self) -> ColorSpace {
        self.format
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_device_rejects_frames() {
        let mut camera = SyntheticCamera::new(0);
        let mut image = ImageBuffer::new();
        assert!(camera.get_frame(&mut image).is_err());
    }

    #[test]
    fn open_then_frame_is_valid() {
        let mut camera = SyntheticCamera::new(0);
        camera.open_with_size(8, 4).unwrap();
        let mut image = ImageBuffer::new();
        camera.get_frame(&mut image).unwrap();
        assert!(image.is_valid());
        assert_eq!(image.header().width, 8);
        assert_eq!(image.header().height, 4);
    }

    #[test]
    fn injected_failure_does_not_corrupt_state() {
        let mut camera = SyntheticCamera::new(0);
        camera.open().unwrap();
        camera.fail_next_frame();
        let mut image = ImageBuffer::new();
        assert!(camera.get_frame(&mut image).is_err());
        assert!(camera.get_frame(&mut image).is_ok());
    }
}
