//! Single-slot camera ownership, grounded on `src/cameracontrol.cc` /
//! `cameracontrol.hh` from the original implementation. Where the original
//! keeps a `camera_map_`/`camera_user_count_` pair of maps to allow several
//! simultaneously open cameras, this reimplementation holds exactly one
//! open device at a time, with a `DeviceFactory` standing in for the
//! concrete backend.

use std::sync::Mutex;

use log::warn;
use tv_core::error::Error;
use tv_core::{ColorSpace, ImageBuffer, ImageHeader, Result};

use crate::camera_device::{CameraDevice, DeviceFactory};

const FALLBACK_WIDTH: u16 = 640;
const FALLBACK_HEIGHT: u16 = 480;
const FALLBACK_FILL: [u8; 3] = [32, 32, 32];

struct State {
    active_device: Option<Box<dyn CameraDevice>>,
    preferred_id: Option<u8>,
    usercount: u32,
    stopped: bool,
    requested_width: u16,
    requested_height: u16,
    latest_frame: ImageBuffer,
}

/// Owns at most one open `CameraDevice`, arbitrated by reference count.
/// `camera_mutex` (the single internal `Mutex`) guards every transition;
/// this may be held together with the modules mutex only in the order
/// (modules -> camera_control), never the reverse.
pub struct CameraControl {
    factory: DeviceFactory,
    fallback: ImageBuffer,
    state: Mutex<State>,
}

impl CameraControl {
    pub fn new(factory: DeviceFactory) -> Result<Self> {
        let fallback = ImageBuffer::solid(FALLBACK_WIDTH, FALLBACK_HEIGHT, ColorSpace::Bgr888, &FALLBACK_FILL)?;
        Ok(CameraControl {
            factory,
            fallback,
            state: Mutex::new(State {
                active_device: None,
                preferred_id: None,
                usercount: 0,
                stopped: true,
                requested_width: 0,
                requested_height: 0,
                latest_frame: ImageBuffer::new(),
            }),
        })
    }

    /// `is_available()`: is some device currently open.
    pub fn is_available(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.active_device.is_some()
    }

    /// `is_available(id)`: open the candidate transiently (acquire-then-close)
    /// without disturbing the current state, restoring it on every exit path.
    pub fn is_available_id(&self, id: u8) -> bool {
        let state = self.state.lock().unwrap();
        if let Some(device) = &state.active_device {
            if device.id() == id {
                return true;
            }
        }
        drop(state);

        match (self.factory)(id) {
            Some(mut probe) => {
                let opened = probe.open().is_ok();
                probe.close();
                opened
            }
            None => false,
        }
    }

    /// Only records the hint; never opens a device.
    pub fn prefer(&self, id: u8) {
        self.state.lock().unwrap().preferred_id = Some(id);
    }

    /// Stop whatever is open (if any) and reopen preferring `id`. If a
    /// camera was open before the call, one remains open afterward, falling
    /// back to any openable device if `id` itself cannot be opened.
    pub fn switch_to_preferred(&self, id: u8) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(device) = &state.active_device {
            if device.id() == id {
                return Ok(());
            }
        }
        let was_open = state.active_device.is_some();
        let usercount = state.usercount;
        close_device(&mut state);
        state.preferred_id = Some(id);

        if !was_open {
            return Ok(());
        }

        match open_device(&self.factory, id, state.requested_width, state.requested_height) {
            Ok(device) => {
                state.active_device = Some(device);
                state.usercount = usercount;
                Ok(())
            }
            Err(_) => {
                // id refused; any other openable device keeps the
                // caller-visible "a camera is open" guarantee intact.
                for candidate in 0..=u8::MAX {
                    if candidate == id {
                        continue;
                    }
                    if let Ok(device) = open_device(&self.factory, candidate, state.requested_width, state.requested_height) {
                        state.active_device = Some(device);
                        state.usercount = usercount;
                        return Ok(());
                    }
                }
                Err(Error::CameraUnavailable("no camera could be reopened".into()))
            }
        }
    }

    /// Succeeds only while closed: opens transiently with `(w, h)`, verifies
    /// the negotiated size matches exactly, then closes. Rolls back on
    /// mismatch.
    pub fn preselect_framesize(&self, width: u16, height: u16) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.active_device.is_some() {
            return Err(Error::State("camera already open".into()));
        }
        let id = state.preferred_id.unwrap_or(0);
        let mut probe = (self.factory)(id).ok_or_else(|| Error::CameraUnavailable("no such device".into()))?;
        probe.open_with_size(width, height)?;
        let negotiated = probe.frame_header();
        probe.close();

        match negotiated {
            Some(header) if header.width == width && header.height == height => {
                state.requested_width = width;
                state.requested_height = height;
                Ok(())
            }
            _ => Err(Error::CameraSettingsFailed(
                format!("device would not negotiate {width}x{height}").into(),
            )),
        }
    }

    /// Opens if closed, then increments the usercount by `n`. On open
    /// failure the usercount is left unchanged.
    pub fn acquire(&self, n: u32) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.active_device.is_none() {
            let id = state.preferred_id.unwrap_or(0);
            let (w, h) = (state.requested_width, state.requested_height);
            match open_device(&self.factory, id, w, h) {
                Ok(device) => state.active_device = Some(device),
                Err(err) => return Err(err),
            }
        }
        state.usercount += n;
        state.stopped = false;
        Ok(())
    }

    /// Decrement the usercount (clamped at zero); close once it reaches
    /// zero.
    pub fn release(&self) {
        let mut state = self.state.lock().unwrap();
        state.usercount = state.usercount.saturating_sub(1);
        if state.usercount == 0 {
            close_device(&mut state);
        }
    }

    /// Erase every user and close, regardless of the current usercount.
    pub fn release_all(&self) {
        let mut state = self.state.lock().unwrap();
        state.usercount = 0;
        close_device(&mut state);
        state.stopped = true;
    }

    /// If stopped, re-initialise; then ask the device for a frame, falling
    /// back to the solid fallback image on failure. Only fails if neither
    /// the device nor the fallback is available (the fallback is always
    /// valid by construction, so in practice this never returns `Err`).
    pub fn update_frame(&self, out: &mut ImageBuffer) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.stopped {
            let id = state.preferred_id.unwrap_or(0);
            let (w, h) = (state.requested_width, state.requested_height);
            if let Ok(device) = open_device(&self.factory, id, w, h) {
                state.active_device = Some(device);
                state.stopped = false;
            }
        }

        let State { active_device, latest_frame, .. } = &mut *state;
        let grabbed = match active_device {
            Some(device) => device.get_frame(latest_frame).is_ok(),
            None => false,
        };

        if grabbed {
            out.set_from(&state.latest_frame);
        } else {
            warn!("camera frame grab failed, substituting fallback image");
            out.set_from(&self.fallback);
        }
        Ok(())
    }

    pub fn usercount(&self) -> u32 {
        self.state.lock().unwrap().usercount
    }

    pub fn fallback_header(&self) -> ImageHeader {
        *self.fallback.header()
    }
}

fn open_device(factory: &DeviceFactory, id: u8, width: u16, height: u16) -> Result<Box<dyn CameraDevice>> {
    let mut device = factory(id).ok_or_else(|| Error::CameraUnavailable(format!("no device with id {id}").into()))?;
    device.open_with_size(width, height)?;
    Ok(device)
}

fn close_device(state: &mut State) {
    if let Some(mut device) = state.active_device.take() {
        device.close();
    }
}
