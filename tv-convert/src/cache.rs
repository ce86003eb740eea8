//! `ConverterCache`/`FrameConversions`, grounded on the original's
//! `Converter`/`FrameConversions` pair in `convert.hh`: converters are
//! created lazily per (source, target) pair and kept for the process
//! lifetime; a cached result is reused until the source frame's timestamp
//! moves on.

use std::collections::HashMap;

use tv_core::error::Error;
use tv_core::time::Timestamp;
use tv_core::{ColorSpace, ImageBuffer, ImageHeader, Result};

use crate::convert::{converter_for, Converter};

struct CachedConverter {
    converter: Box<dyn Converter>,
    output: ImageBuffer,
    converted_at: Option<Timestamp>,
}

/// Memoises conversions for a single in-flight frame, keyed by
/// (source-format, target-format). Reset via `invalidate` at the top of
/// every scheduler cycle.
#[derive(Default)]
pub struct ConverterCache {
    entries: HashMap<(ColorSpace, ColorSpace), CachedConverter>,
}

impl ConverterCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every cached result so the next `get` reruns its conversion.
    /// Converters themselves (and their output buffers) are kept to avoid
    /// reallocating on the next frame.
    pub fn invalidate(&mut self) {
        for entry in self.entries.values_mut() {
            entry.converted_at = None;
        }
    }

    fn entry(&mut self, source: ColorSpace, target: ColorSpace) -> Result<&mut CachedConverter> {
        if !self.entries.contains_key(&(source, target)) {
            let converter = converter_for(source, target).ok_or_else(|| {
                Error::InvalidArgument(format!("no converter from {source:?} to {target:?}").into())
            })?;
            self.entries.insert(
                (source, target),
                CachedConverter {
                    converter,
                    output: ImageBuffer::new(),
                    converted_at: None,
                },
            );
        }
        Ok(self.entries.get_mut(&(source, target)).expect("just inserted"))
    }

    /// Run (or reuse) the conversion of `frame` into `target`, writing the
    /// result into `out` as a borrow of the cache's own output buffer.
    pub fn get(&mut self, frame: &ImageBuffer, target: ColorSpace, out: &mut ImageBuffer) -> Result<()> {
        let source = frame.header().format;
        let frame_timestamp = frame.header().timestamp;
        let entry = self.entry(source, target)?;

        let stale = entry.converted_at != Some(frame_timestamp);
        if stale {
            let target_header = entry.converter.target_header(frame.header());
            entry.output.allocate(target_header)?;
            entry
                .converter
                .convert(frame.header(), frame.data(), entry.output.data_mut())?;
            entry.output.set_timestamp(frame_timestamp);
            entry.converted_at = Some(frame_timestamp);
        }

        out.set_from(&entry.output);
        Ok(())
    }

    pub fn header(&mut self, source_header: &ImageHeader, target: ColorSpace) -> Result<ImageHeader> {
        let entry = self.entry(source_header.format, target)?;
        Ok(entry.converter.target_header(source_header))
    }
}

/// The per-cycle facade the scheduler talks to: holds the current frame
/// plus a `ConverterCache`, matching the original's `FrameConversions`.
pub struct FrameConversions {
    frame: ImageBuffer,
    cache: ConverterCache,
}

impl Default for FrameConversions {
    fn default() -> Self {
        FrameConversions {
            frame: ImageBuffer::new(),
            cache: ConverterCache::new(),
        }
    }
}

impl FrameConversions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the current frame and invalidate every cached conversion.
    /// Must be called before any `get_frame` in a cycle.
    pub fn set_frame(&mut self, frame: &ImageBuffer) {
        self.frame.set_from(frame);
        self.cache.invalidate();
    }

    /// Also install a frame that was produced *by* a module mid-cycle (a
    /// modified image pushed back for downstream modules), without
    /// invalidating results already computed from the original frame's
    /// timestamp -- those remain valid since they're keyed by timestamp.
    pub fn set_modified_frame(&mut self, frame: &ImageBuffer) {
        self.frame.set_from(frame);
    }

    pub fn get_frame(&mut self, format: ColorSpace, out: &mut ImageBuffer) -> Result<()> {
        if !self.frame.is_valid() {
            return Err(Error::State("no frame installed".into()));
        }
        if format == self.frame.header().format {
            out.set_from(&self.frame);
            return Ok(());
        }
        self.cache.get(&self.frame, format, out)
    }

    pub fn get_header(&mut self, format: ColorSpace) -> Result<ImageHeader> {
        if format == self.frame.header().format {
            return Ok(*self.frame.header());
        }
        self.cache.header(self.frame.header(), format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_frame(format: ColorSpace, w: u16, h: u16, fill: &[u8]) -> ImageBuffer {
        ImageBuffer::solid(w, h, format, fill).unwrap()
    }

    #[test]
    fn same_format_passes_through() {
        let mut conversions = FrameConversions::new();
        let frame = solid_frame(ColorSpace::Bgr888, 2, 2, &[1, 2, 3]);
        conversions.set_frame(&frame);

        let mut out = ImageBuffer::new();
        conversions.get_frame(ColorSpace::Bgr888, &mut out).unwrap();
        assert_eq!(out.data(), frame.data());
    }

    #[test]
    fn converts_and_caches_until_next_frame() {
        let mut conversions = FrameConversions::new();
        let frame = solid_frame(ColorSpace::Bgr888, 2, 2, &[10, 20, 30]);
        conversions.set_frame(&frame);

        let mut gray = ImageBuffer::new();
        conversions.get_frame(ColorSpace::Gray, &mut gray).unwrap();
        assert!(gray.is_valid());
        assert_eq!(gray.header().format, ColorSpace::Gray);

        let mut gray_again = ImageBuffer::new();
        conversions.get_frame(ColorSpace::Gray, &mut gray_again).unwrap();
        assert_eq!(gray.data(), gray_again.data());
    }

    #[test]
    fn unsupported_target_errors() {
        let mut conversions = FrameConversions::new();
        let frame = solid_frame(ColorSpace::Rgb888, 2, 2, &[1, 2, 3]);
        conversions.set_frame(&frame);

        let mut out = ImageBuffer::new();
        assert!(conversions.get_frame(ColorSpace::Yv12, &mut out).is_err());
    }

    #[test]
    fn new_frame_forces_reconversion() {
        let mut conversions = FrameConversions::new();
        let frame_a = solid_frame(ColorSpace::Bgr888, 2, 2, &[0, 0, 0]);
        conversions.set_frame(&frame_a);
        let mut gray_a = ImageBuffer::new();
        conversions.get_frame(ColorSpace::Gray, &mut gray_a).unwrap();

        std::thread::sleep(std::time::Duration::from_millis(1));
        let frame_b = solid_frame(ColorSpace::Bgr888, 2, 2, &[255, 255, 255]);
        conversions.set_frame(&frame_b);
        let mut gray_b = ImageBuffer::new();
        conversions.get_frame(ColorSpace::Gray, &mut gray_b).unwrap();

        assert_ne!(gray_a.data(), gray_b.data());
    }
}
