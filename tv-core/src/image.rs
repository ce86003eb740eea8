//! Frame headers and pixel storage, grounded on `src/lib/imaging/image.hh`.
//!
//! `ImageBuffer` keeps a single ownership flag rather than a foreign-data
//! boolean on the allocator: the buffer either owns its pixel storage or
//! borrows someone else's, and reallocation only ever happens through
//! `allocate`/`set_from`.

use crate::error::Error;
use crate::time::Timestamp;
use crate::Result;

/// Supported pixel formats. The byte layout of each is documented on the
/// variant that produces or consumes it; the kernel never interprets pixel
/// bytes itself, only routes them through the conversion table (`tv-convert`).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum ColorSpace {
    /// No image is expected; used by modules that never read pixels.
    None,
    /// An error sentinel; never a valid target format.
    #[default]
    Invalid,
    /// Packed Y'CbCr 4:2:2, two bytes per pixel.
    Yuyv,
    /// Planar Y'CbCr 4:2:0, one luma and two quarter-resolution chroma planes.
    Yv12,
    /// Interleaved blue-green-red, three bytes per pixel.
    Bgr888,
    /// Interleaved red-green-blue, three bytes per pixel.
    Rgb888,
    /// Single-channel luminance, one byte per pixel.
    Gray,
}

impl ColorSpace {
    /// `true` unless this format is `None` or `Invalid` -- the formats an
    /// `ImageHeader` is forbidden from carrying if it wants to be valid.
    pub fn is_concrete(&self) -> bool {
        !matches!(self, ColorSpace::None | ColorSpace::Invalid)
    }

    /// Bytes per pixel, where that is format-independent of resolution.
    /// `Yv12` has no fixed per-pixel byte count (its planes use sub-sampled
    /// chroma), so callers compute its `bytesize` from width*height directly
    /// instead of through this helper.
    pub fn bytes_per_pixel(&self) -> Option<usize> {
        match self {
            ColorSpace::Yuyv => Some(2),
            ColorSpace::Bgr888 | ColorSpace::Rgb888 => Some(3),
            ColorSpace::Gray => Some(1),
            ColorSpace::Yv12 | ColorSpace::None | ColorSpace::Invalid => None,
        }
    }

    /// The expected `bytesize` of a `width x height` image in this format,
    /// if computable without device-specific stride information.
    pub fn expected_bytesize(&self, width: u16, height: u16) -> Option<usize> {
        let pixels = width as usize * height as usize;
        match self {
            ColorSpace::Yv12 => Some(pixels + pixels / 2),
            other => other.bytes_per_pixel().map(|bpp| pixels * bpp),
        }
    }
}

/// Header describing a frame: its dimensions, byte size, the instant it was
/// captured (or synthesised), and its pixel format.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImageHeader {
    pub width: u16,
    pub height: u16,
    pub bytesize: usize,
    pub timestamp: Timestamp,
    pub format: ColorSpace,
}

impl ImageHeader {
    pub fn new(width: u16, height: u16, bytesize: usize, format: ColorSpace) -> Self {
        ImageHeader {
            width,
            height,
            bytesize,
            timestamp: Timestamp::now(),
            format,
        }
    }

    /// An image is valid iff it has a positive area, a positive byte size,
    /// and a concrete format.
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0 && self.bytesize > 0 && self.format.is_concrete()
    }
}

impl PartialEq for ImageHeader {
    fn eq(&self, other: &Self) -> bool {
        self.width == other.width && self.height == other.height && self.bytesize == other.bytesize && self.format == other.format
    }
}

enum Storage {
    Owned(Vec<u8>),
    /// Borrowed pixel bytes, valid only for the lifetime the caller promises
    /// when calling `set_from`. The kernel never retains a borrow across a
    /// cycle boundary without first promoting it to owned storage.
    Borrowed(*const u8, usize),
    Empty,
}

/// A frame: header plus pixel storage, either owned or borrowed.
///
/// Borrowed storage is a raw pointer because the source of a borrow (a
/// device's internal buffer, another `ImageBuffer`'s owned storage) is not
/// expressible as a Rust lifetime across the trait-object boundaries the
/// kernel routes frames through (`CameraDevice::get_frame`, `Module::execute`).
/// Callers that borrow into an `ImageBuffer` must guarantee the source
/// outlives every read of `data()` on the borrowing buffer, exactly as the
/// original `Image`/`ImageAllocator` pair requires of its caller.
pub struct ImageBuffer {
    header: ImageHeader,
    storage: Storage,
    max_size: Option<usize>,
}

// SAFETY: `ImageBuffer` carries no interior mutability and the raw pointer in
// `Storage::Borrowed` is never dereferenced except through `data()`, under
// the same aliasing discipline a `&[u8]` would require. Sending one across
// threads only transfers the borrow's validity obligation, which the kernel
// already enforces by construction (frames are filled and consumed within
// one scheduler cycle on the executor thread, or handed to a module that
// finishes before the next frame is grabbed).
unsafe impl Send for ImageBuffer {}

// SAFETY: same reasoning as the `Send` impl above -- `ImageBuffer` has no
// interior mutability, so shared references across threads only ever read
// through `data()` under the same borrow discipline.
unsafe impl Sync for ImageBuffer {}

impl Default for ImageBuffer {
    fn default() -> Self {
        ImageBuffer {
            header: ImageHeader::default(),
            storage: Storage::Empty,
            max_size: None,
        }
    }
}

impl ImageBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Constrain every future `allocate` on this buffer to at most `bytes`.
    pub fn with_max_size(bytes: usize) -> Self {
        ImageBuffer {
            max_size: Some(bytes),
            ..Self::default()
        }
    }

    pub fn header(&self) -> &ImageHeader {
        &self.header
    }

    pub fn data(&self) -> &[u8] {
        match &self.storage {
            Storage::Owned(bytes) => bytes.as_slice(),
            // SAFETY: see the `unsafe impl Send` note above.
            Storage::Borrowed(ptr, len) => unsafe { std::slice::from_raw_parts(*ptr, *len) },
            Storage::Empty => &[],
        }
    }

    /// Mutable access to owned storage, for converters writing their output
    /// in place. Panics if this buffer currently holds a borrow or is empty.
    pub fn data_mut(&mut self) -> &mut [u8] {
        match &mut self.storage {
            Storage::Owned(bytes) => bytes.as_mut_slice(),
            _ => panic!("data_mut requires owned storage"),
        }
    }

    pub fn is_owned(&self) -> bool {
        matches!(self.storage, Storage::Owned(_))
    }

    pub fn is_valid(&self) -> bool {
        self.header.is_valid()
    }

    /// Allocate fresh owned storage for `header`, or reuse the existing
    /// allocation if its bytesize and format are unchanged. Any previously
    /// borrowed data is dropped unconditionally.
    pub fn allocate(&mut self, header: ImageHeader) -> Result<()> {
        if let Some(max) = self.max_size {
            if header.bytesize > max {
                return Err(Error::OutOfRange(format!("requested {} bytes, limit is {max}", header.bytesize).into()));
            }
        }

        match &mut self.storage {
            Storage::Owned(bytes) if bytes.len() == header.bytesize && self.header.format == header.format => {
                // reuse: same shape, just refresh the header (notably the timestamp)
            }
            _ => {
                self.storage = Storage::Owned(vec![0u8; header.bytesize]);
            }
        }
        self.header = header;
        Ok(())
    }

    /// Borrow `data` (of byte length `data.len()`) as this buffer's content.
    /// Drops any previously owned storage; becomes a borrow.
    ///
    /// # Safety
    /// The caller must ensure `data` remains valid for as long as this
    /// `ImageBuffer` (or anything it is copied into) is read.
    pub unsafe fn set_from_raw(&mut self, header: ImageHeader, data: *const u8, len: usize) {
        self.storage = Storage::Borrowed(data, len);
        self.header = header;
    }

    /// Borrow from another, already-valid `ImageBuffer`. Safe because the
    /// source's lifetime is tracked by the borrow checker.
    pub fn set_from(&mut self, other: &ImageBuffer) {
        // SAFETY: `other` outlives this call by the borrow on the parameter;
        // the resulting borrow in `self` is only as long-lived as callers
        // respect the same contract `set_from_raw` documents.
        unsafe {
            self.set_from_raw(other.header, other.data().as_ptr(), other.data().len());
        }
    }

    /// Deep-copy `src` into this buffer's existing owned storage. Requires
    /// `self` to already own storage of exactly `src.len()` bytes; this is a
    /// programming error to violate, matching the original's `assert`-guarded
    /// `copy_data`.
    pub fn copy_from(&mut self, src: &[u8]) {
        match &mut self.storage {
            Storage::Owned(bytes) => {
                assert_eq!(bytes.len(), src.len(), "copy_from: bytesize mismatch with owned storage");
                bytes.copy_from_slice(src);
            }
            _ => panic!("copy_from requires existing owned storage"),
        }
        self.header.timestamp = Timestamp::now();
    }

    /// Stamp this buffer's header with `timestamp`, without touching
    /// storage. Used by converters that write through `data_mut` directly
    /// and want their output to carry the source frame's timestamp.
    pub fn set_timestamp(&mut self, timestamp: Timestamp) {
        self.header.timestamp = timestamp;
    }

    /// Release storage and reset to the empty, invalid state.
    pub fn release(&mut self) {
        self.storage = Storage::Empty;
        self.header = ImageHeader::default();
    }

    /// Build an owned buffer holding a single solid colour, used for the
    /// camera fallback frame.
    pub fn solid(width: u16, height: u16, format: ColorSpace, fill: &[u8]) -> Result<Self> {
        let bytesize = format
            .expected_bytesize(width, height)
            .ok_or_else(|| Error::InvalidArgument("color space has no fixed byte size".into()))?;
        let mut buffer = ImageBuffer::new();
        buffer.allocate(ImageHeader::new(width, height, bytesize, format))?;
        if let Storage::Owned(bytes) = &mut buffer.storage {
            for (i, byte) in bytes.iter_mut().enumerate() {
                *byte = fill[i % fill.len()];
            }
        }
        Ok(buffer)
    }
}
