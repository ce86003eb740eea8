//! `Scheduler`, the kernel's single public entry point (called `Api` in the
//! original). Grounded on `src/lib/api.hh`/`.cc`'s main loop and on the
//! teacher's `camera_manager_main` pattern in
//! `media-device/src/linux/libcamera.rs`, where a single long-running
//! thread owns a resource and callers reach it only through message-passing
//! or a shared mutex -- never by touching the resource directly.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use log::{info, warn};
use tv_core::result_code::{DELAY_GRAIN_MS, GRAINS};
use tv_core::{ColorSpace, Error, ImageBuffer, ImageHeader, ModuleId, ModuleResult, Result, ResultCode, RuntimeConfig};
use tv_core::{FIRST_INTERNAL_MODULE_ID, FIRST_PUBLIC_MODULE_ID, LAST_PUBLIC_MODULE_ID};
use tv_convert::FrameConversions;
use tv_device::{CameraControl, DeviceFactory};
use tv_module::{apply_tag_effects, DiscoveryNotify, Module, ModuleLoader, ModuleTag, ModuleWrapper, PollingDiscovery, ResultCallback};

const IDLE_POLL_MS: u64 = 500;
const REORDER_WINDOW: u64 = 10;
const DISCOVERY_POLL_MS: u64 = 1000;

/// Never produces output, never reads pixels; exists only to hold one
/// camera usercount while `start_idle` keeps the loop warm with no real
/// module loaded.
struct IdleModule;

impl Module for IdleModule {
    fn execute(&mut self, _input_header: &ImageHeader, _input_data: &[u8], _output: Option<(&ImageHeader, &mut [u8])>) {}
}

struct Shared {
    camera_control: Arc<CameraControl>,
    modules: Arc<tv_module::SharedResource<ModuleWrapper>>,
    conversions: Arc<Mutex<FrameConversions>>,
    loader: Arc<Mutex<ModuleLoader>>,
    active: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    frameperiod_ms: Arc<AtomicU32>,
    effective_frameperiod_ms: Arc<AtomicU64>,
}

pub struct Scheduler {
    config: RuntimeConfig,
    camera_control: Arc<CameraControl>,
    modules: Arc<tv_module::SharedResource<ModuleWrapper>>,
    conversions: Arc<Mutex<FrameConversions>>,
    loader: Arc<Mutex<ModuleLoader>>,
    active: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    frameperiod_ms: Arc<AtomicU32>,
    effective_frameperiod_ms: Arc<AtomicU64>,
    executor: Mutex<Option<JoinHandle<()>>>,
    next_internal_id: Mutex<ModuleId>,
    default_callback: Mutex<Option<ResultCallback>>,
    pending: Mutex<Option<Arc<Mutex<Option<ResultCode>>>>>,
    discovery_callback: Arc<Mutex<Option<DiscoveryNotify>>>,
}

impl Scheduler {
    pub fn new(config: RuntimeConfig, device_factory: DeviceFactory) -> Result<Self> {
        let camera_control = Arc::new(CameraControl::new(device_factory)?);
        let loader = Arc::new(Mutex::new(ModuleLoader::new(config.system_modules_path.clone(), config.user_modules_path.clone())));
        let frameperiod_ms = config.frameperiod_ms;

        let discovery_callback: Arc<Mutex<Option<DiscoveryNotify>>> = Arc::new(Mutex::new(None));
        ModuleLoader::watch(&loader, Box::new(PollingDiscovery::new(Duration::from_millis(DISCOVERY_POLL_MS))), discovery_callback.clone());

        Ok(Scheduler {
            camera_control,
            modules: Arc::new(tv_module::SharedResource::new()),
            conversions: Arc::new(Mutex::new(FrameConversions::new())),
            loader,
            active: Arc::new(AtomicBool::new(false)),
            paused: Arc::new(AtomicBool::new(false)),
            frameperiod_ms: Arc::new(AtomicU32::new(frameperiod_ms)),
            effective_frameperiod_ms: Arc::new(AtomicU64::new(frameperiod_ms as u64)),
            executor: Mutex::new(None),
            next_internal_id: Mutex::new(FIRST_INTERNAL_MODULE_ID),
            default_callback: Mutex::new(None),
            pending: Mutex::new(None),
            discovery_callback,
            config,
        })
    }

    /// Registers the callback notified whenever the dynamic-library load
    /// paths gain or lose a candidate module; `module_load`'s `available`
    /// set is already refreshed by the time this fires.
    pub fn set_discovery_callback(&self, callback: DiscoveryNotify) {
        *self.discovery_callback.lock().unwrap() = Some(callback);
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn camera_available(&self) -> bool {
        self.camera_control.is_available()
    }

    pub fn camera_id_available(&self, id: u8) -> bool {
        self.camera_control.is_available_id(id)
    }

    pub fn prefer_camera_with_id(&self, id: u8) {
        self.camera_control.prefer(id);
    }

    pub fn set_framesize(&self, width: u16, height: u16) -> ResultCode {
        match self.camera_control.preselect_framesize(width, height) {
            Ok(()) => ResultCode::Ok,
            Err(err) => ResultCode::from(&err),
        }
    }

    fn allocate_public_id(&self) -> Result<ModuleId> {
        for id in FIRST_PUBLIC_MODULE_ID..=LAST_PUBLIC_MODULE_ID {
            if !self.modules.managed(id) {
                return Ok(id);
            }
        }
        Err(Error::Resource("no free public module id".into()))
    }

    /// Opens `name`'s library, constructs and initialises it, and makes it
    /// available to `module_start`. Returns the assigned id.
    pub fn module_load(&self, name: &str) -> Result<ModuleId> {
        let id = self.allocate_public_id()?;
        let mut wrapper = self.loader.lock().unwrap().load_module_from_library(name, id)?;
        if !wrapper.initialize() {
            let _ = self.loader.lock().unwrap().destroy_module(id, wrapper);
            return Err(Error::ConstructionFailed(format!("{name}::init returned false").into()));
        }
        self.modules.insert(id, wrapper);
        info!("module '{name}' loaded as id {id}");
        Ok(id)
    }

    /// Wraps and initialises an in-process module, bypassing the dynamic
    /// library loader entirely. For embedders that compile their modules in
    /// rather than shipping them as separate plug-in libraries.
    pub fn module_register(&self, name: &str, module: Box<dyn Module>) -> Result<ModuleId> {
        let id = self.allocate_public_id()?;
        let mut wrapper = ModuleWrapper::new(id, name, module);
        if !wrapper.initialize() {
            return Err(Error::ConstructionFailed(format!("{name}::init returned false").into()));
        }
        self.modules.insert(id, wrapper);
        info!("module '{name}' registered in-process as id {id}");
        Ok(id)
    }

    /// Loads the internal idle module and starts the loop, so the camera
    /// stays warm while no real module is active.
    pub fn start_idle(&self) -> ResultCode {
        let id = {
            let mut next = self.next_internal_id.lock().unwrap();
            let id = *next;
            *next += 1;
            id
        };
        let mut wrapper = ModuleWrapper::new(id, "__idle__", Box::new(IdleModule));
        if !wrapper.initialize() {
            return ResultCode::ModuleInitializationFailed;
        }
        wrapper.enable();
        self.modules.insert(id, wrapper);
        if self.camera_control.acquire(1).is_err() {
            self.modules.remove(id);
            return ResultCode::CameraNotAvailable;
        }
        self.start()
    }

    /// One camera user per enable, regardless of the module's expected
    /// format -- matching every module's destroy/disable path in releasing
    /// unconditionally. Skips the acquire (but still calls `enable`) if the
    /// module is already active, so a second `module_start` on a running
    /// module cannot inflate the usercount.
    pub fn module_start(&self, id: ModuleId) -> ResultCode {
        let already_enabled = match self.modules.exec_one(id, |w| w.enabled()) {
            Some(enabled) => enabled,
            None => return ResultCode::InvalidId,
        };
        if !already_enabled && self.camera_control.acquire(1).is_err() {
            return ResultCode::CameraNotAvailable;
        }
        match self.modules.exec_one(id, |w| w.enable()) {
            Some(true) => ResultCode::Ok,
            Some(false) => {
                if !already_enabled {
                    self.camera_control.release();
                }
                ResultCode::ModuleInitializationFailed
            }
            None => ResultCode::InvalidId,
        }
    }

    pub fn module_stop(&self, id: ModuleId) -> ResultCode {
        match self.modules.exec_one(id, |w| w.disable()) {
            Some(()) => {
                self.camera_control.release();
                ResultCode::Ok
            }
            None => ResultCode::InvalidId,
        }
    }

    pub fn module_is_active(&self, id: ModuleId) -> bool {
        self.modules.exec_one(id, |w| w.enabled()).unwrap_or(false)
    }

    /// Tags `id` for removal at the next cycle boundary if the loop is
    /// running, or removes it immediately if it isn't.
    pub fn module_remove(&self, id: ModuleId) -> ResultCode {
        if self.is_running() {
            match self.modules.exec_one(id, |w| w.tag(ModuleTag::REMOVABLE)) {
                Some(()) => ResultCode::Ok,
                None => ResultCode::InvalidId,
            }
        } else {
            self.remove_module_now(id)
        }
    }

    fn remove_module_now(&self, id: ModuleId) -> ResultCode {
        match self.modules.remove(id) {
            Some(wrapper) => {
                self.camera_control.release();
                self.loader.lock().unwrap().destroy_module(id, wrapper);
                ResultCode::Ok
            }
            None => ResultCode::InvalidId,
        }
    }

    pub fn get_result(&self, id: ModuleId) -> ModuleResult {
        self.modules.exec_one(id, |w| w.result().clone()).unwrap_or_else(ModuleResult::unset)
    }

    pub fn set_callback(&self, id: ModuleId, callback: ResultCallback) -> ResultCode {
        match self.modules.exec_one(id, |w| w.set_callback(callback)) {
            Some(true) => ResultCode::Ok,
            Some(false) => ResultCode::ModuleNoSuchParameter,
            None => ResultCode::InvalidId,
        }
    }

    pub fn set_default_callback(&self, callback: ResultCallback) {
        *self.default_callback.lock().unwrap() = Some(callback);
    }

    /// Routed through the low-latency path: the executor thread may be
    /// mid-cycle, so the actual set happens on a detached retry thread.
    /// Returns the real code if it lands within `GRAINS * DELAY_GRAIN_MS`,
    /// otherwise `ResultBuffered`; the eventual outcome is retrieved with
    /// `get_buffered_result`.
    pub fn set_parameter(&self, id: ModuleId, name: &str, value: i32) -> ResultCode {
        let name = name.to_string();
        let modules = self.modules.clone();
        self.run_low_latency(move || {
            match modules.exec_one(id, |w| w.set_parameter_i32(&name, value)) {
                Some(true) => ResultCode::Ok,
                Some(false) => ResultCode::ModuleErrorSettingParameter,
                None => ResultCode::InvalidId,
            }
        })
    }

    pub fn get_parameter(&self, id: ModuleId, name: &str) -> Result<i32> {
        let deadline = Duration::from_millis(DELAY_GRAIN_MS * GRAINS as u64);
        let grain = Duration::from_millis(DELAY_GRAIN_MS);
        self.modules
            .exec_one_now(id, deadline, grain, |w| w.get_parameter_i32(name))
            .flatten()
            .ok_or_else(|| Error::NoSuchParameter(name.to_string().into()))
    }

    /// Only one low-latency call may be in flight at a time: a second call
    /// while one is pending is rejected as `Busy` rather than queued.
    fn run_low_latency(&self, work: impl FnOnce() -> ResultCode + Send + 'static) -> ResultCode {
        {
            let mut pending = self.pending.lock().unwrap();
            if let Some(slot) = pending.as_ref() {
                if slot.lock().unwrap().is_none() {
                    return ResultCode::Busy;
                }
                *pending = None;
            }
        }

        let slot: Arc<Mutex<Option<ResultCode>>> = Arc::new(Mutex::new(None));
        let slot_for_thread = slot.clone();
        std::thread::spawn(move || {
            let result = work();
            *slot_for_thread.lock().unwrap() = Some(result);
        });

        let started = Instant::now();
        let deadline = Duration::from_millis(DELAY_GRAIN_MS * GRAINS as u64);
        loop {
            if let Some(result) = *slot.lock().unwrap() {
                return result;
            }
            if started.elapsed() >= deadline {
                *self.pending.lock().unwrap() = Some(slot);
                return ResultCode::ResultBuffered;
            }
            std::thread::sleep(Duration::from_millis(DELAY_GRAIN_MS));
        }
    }

    /// Retrieves the outcome of the single in-flight low-latency call, if
    /// any. `ResultNotAvailable` if nothing is pending.
    pub fn get_buffered_result(&self) -> ResultCode {
        let mut pending = self.pending.lock().unwrap();
        let outcome = match pending.as_ref() {
            Some(slot) => *slot.lock().unwrap(),
            None => return ResultCode::ResultNotAvailable,
        };
        match outcome {
            Some(result) => {
                *pending = None;
                result
            }
            None => ResultCode::ResultBuffered,
        }
    }

    pub fn is_running(&self) -> bool {
        self.executor.lock().unwrap().is_some()
    }

    pub fn effective_frameperiod_ms(&self) -> u64 {
        self.effective_frameperiod_ms.load(Ordering::Relaxed)
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::Release);
    }

    /// Spawns the executor thread. Fails if already running, if no module
    /// is currently enabled, or if the camera cannot be reacquired for the
    /// active modules (on top of whatever usercount each module already
    /// holds from its own `module_start`).
    pub fn start(&self) -> ResultCode {
        let mut executor = self.executor.lock().unwrap();
        if executor.is_some() {
            return ResultCode::ThreadRunning;
        }
        let active_count = self.modules.count_matching(|w| w.enabled());
        if active_count == 0 {
            return ResultCode::NoActiveModules;
        }
        if self.camera_control.acquire(active_count as u32).is_err() {
            return ResultCode::CameraNotAvailable;
        }

        self.active.store(true, Ordering::Release);
        let shared = Shared {
            camera_control: self.camera_control.clone(),
            modules: self.modules.clone(),
            conversions: self.conversions.clone(),
            loader: self.loader.clone(),
            active: self.active.clone(),
            paused: self.paused.clone(),
            frameperiod_ms: self.frameperiod_ms.clone(),
            effective_frameperiod_ms: self.effective_frameperiod_ms.clone(),
        };
        *executor = Some(std::thread::spawn(move || run_loop(shared)));
        ResultCode::Ok
    }

    /// Stops the loop (idempotent) and releases every camera user it held.
    pub fn stop(&self) -> ResultCode {
        self.active.store(false, Ordering::Release);
        if let Some(handle) = self.executor.lock().unwrap().take() {
            let _ = handle.join();
        }
        self.camera_control.release_all();
        ResultCode::Ok
    }

    /// `stop`, then disables and tags every module removable so the next
    /// (already-stopped) state has nothing left running. Safe to call from
    /// a `Drop` impl.
    pub fn quit(&self) -> ResultCode {
        self.stop();
        self.modules.exec_all(|_, w| {
            w.disable();
            w.tag(ModuleTag::REMOVABLE);
        });
        let removed = self.modules.remove_if(|w| w.is_removable());
        let mut loader = self.loader.lock().unwrap();
        for (id, wrapper) in removed {
            loader.destroy_module(id, wrapper);
        }
        ResultCode::Ok
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.quit();
    }
}

fn run_loop(shared: Shared) {
    let mut frame = ImageBuffer::new();
    let mut iteration: u64 = 0;
    let mut window_start = Instant::now();

    while shared.active.load(Ordering::Acquire) {
        let loop_start = Instant::now();

        let nothing_to_do = shared.paused.load(Ordering::Acquire) || shared.modules.count_matching(|w| w.enabled()) == 0;
        if nothing_to_do {
            std::thread::sleep(Duration::from_millis(IDLE_POLL_MS));
            continue;
        }

        if shared.camera_control.update_frame(&mut frame).is_ok() {
            shared.conversions.lock().unwrap().set_frame(&frame);
            shared.modules.exec_all(|_id, wrapper| {
                module_exec(wrapper, &shared.conversions, &shared.camera_control);
            });

            // Removal here only unlinks the wrapper and frees its library
            // handle; the camera user it held was already released when it
            // was tagged `Removable` in `module_exec`.
            let removed = shared.modules.remove_if(|w| w.is_removable());
            if !removed.is_empty() {
                let mut loader = shared.loader.lock().unwrap();
                for (id, wrapper) in removed {
                    loader.destroy_module(id, wrapper);
                }
            }
        } else {
            warn!("camera frame grab failed for the whole cycle, skipping module execution");
        }

        iteration += 1;
        if iteration % REORDER_WINDOW == 0 {
            let elapsed = window_start.elapsed().as_millis() as u64 / REORDER_WINDOW;
            shared.effective_frameperiod_ms.store(elapsed, Ordering::Relaxed);
            window_start = Instant::now();
        }

        let target = loop_start + Duration::from_millis(shared.frameperiod_ms.load(Ordering::Relaxed) as u64);
        let now = Instant::now();
        if target > now {
            std::thread::sleep(target - now);
        }
    }
}

/// Runs one module's `execute` and applies its tag effects.
///
/// `apply_tag_effects` signals release for both `EXEC_AND_DISABLE` (disabled
/// right here, camera user released on the spot) and `EXEC_AND_REMOVE`
/// (tagged `Removable` and released on the spot too -- the loop's later
/// `remove_if` sweep only unlinks the wrapper, it never touches the
/// camera). One release per module regardless of its expected format,
/// matching every other enable/disable path.
fn module_exec(wrapper: &mut ModuleWrapper, conversions: &Arc<Mutex<FrameConversions>>, camera_control: &CameraControl) {
    if !wrapper.enabled() {
        return;
    }

    let format = wrapper.expected_format();
    if format != ColorSpace::None {
        let mut input = ImageBuffer::new();
        if conversions.lock().unwrap().get_frame(format, &mut input).is_err() {
            return;
        }
        if wrapper.execute(&input).is_err() {
            return;
        }
        if wrapper.outputs_image() && wrapper.output_image().is_valid() {
            conversions.lock().unwrap().set_modified_frame(wrapper.output_image());
        }
    } else {
        let empty = ImageBuffer::new();
        let _ = wrapper.execute(&empty);
    }

    if apply_tag_effects(wrapper) {
        camera_control.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tv_core::Parameter;
    use tv_device::SyntheticCamera;

    fn factory() -> DeviceFactory {
        Box::new(|id| if id == 0 { Some(Box::new(SyntheticCamera::new(0))) } else { None })
    }

    fn test_config() -> RuntimeConfig {
        let dir = std::env::temp_dir().join(format!("tv-scheduler-test-{}-{}", std::process::id(), line!()));
        for sub in ["lib", "data", "scripts"] {
            std::fs::create_dir_all(dir.join(sub)).unwrap();
        }
        RuntimeConfig::new("/usr/lib/tinkervision", &dir).unwrap().with_frameperiod_ms(20)
    }

    struct CountingModule {
        produces_result: bool,
        parameter: Parameter,
    }

    impl Module for CountingModule {
        fn input_format(&self) -> ColorSpace {
            ColorSpace::Bgr888
        }
        fn produces_result(&self) -> bool {
            self.produces_result
        }
        fn execute(&mut self, _input_header: &ImageHeader, _input_data: &[u8], _output: Option<(&ImageHeader, &mut [u8])>) {}
        fn has_result(&self) -> bool {
            self.produces_result
        }
        fn result(&self) -> ModuleResult {
            ModuleResult { x: 1, ..ModuleResult::unset() }
        }
        fn parameters_mut(&mut self) -> &mut [Parameter] {
            std::slice::from_mut(&mut self.parameter)
        }
        fn parameters(&self) -> &[Parameter] {
            std::slice::from_ref(&self.parameter)
        }
    }

    fn register_test_module(scheduler: &Scheduler) -> ModuleId {
        let module = Box::new(CountingModule {
            produces_result: false,
            parameter: Parameter::numerical("threshold", 0, 255, 10).unwrap(),
        });
        scheduler.module_register("test", module).unwrap()
    }

    #[test]
    fn start_fails_with_no_active_modules() {
        let scheduler = Scheduler::new(test_config(), factory()).unwrap();
        assert_eq!(scheduler.start(), ResultCode::NoActiveModules);
    }

    /// `start` reacquires the camera for every currently-enabled module on
    /// top of whatever each module's own `module_start` already holds --
    /// once the device disappears between a `stop` and the next `start`,
    /// the still-enabled module is not re-acquired by `module_start` (it is
    /// already enabled), so `start` is the only thing left that can observe
    /// the failure.
    #[test]
    fn restarting_after_the_camera_disappears_reports_camera_not_available() {
        let camera_present = Arc::new(AtomicBool::new(true));
        let flag = camera_present.clone();
        let factory: DeviceFactory = Box::new(move |id| {
            if id == 0 && flag.load(Ordering::SeqCst) {
                Some(Box::new(SyntheticCamera::new(0)) as Box<dyn tv_device::CameraDevice>)
            } else {
                None
            }
        });

        let scheduler = Scheduler::new(test_config(), factory).unwrap();
        let id = register_test_module(&scheduler);
        assert_eq!(scheduler.module_start(id), ResultCode::Ok);
        assert_eq!(scheduler.start(), ResultCode::Ok);
        scheduler.stop();

        camera_present.store(false, Ordering::SeqCst);
        assert_eq!(scheduler.start(), ResultCode::CameraNotAvailable);
    }

    #[test]
    fn starting_twice_reports_thread_running() {
        let scheduler = Scheduler::new(test_config(), factory()).unwrap();
        let id = register_test_module(&scheduler);
        assert_eq!(scheduler.module_start(id), ResultCode::Ok);
        assert_eq!(scheduler.start(), ResultCode::Ok);
        assert_eq!(scheduler.start(), ResultCode::ThreadRunning);
        scheduler.stop();
    }

    #[test]
    fn module_lifecycle_acquires_and_releases_camera() {
        let scheduler = Scheduler::new(test_config(), factory()).unwrap();
        let id = register_test_module(&scheduler);
        assert_eq!(scheduler.module_start(id), ResultCode::Ok);
        assert!(scheduler.camera_available());
        assert_eq!(scheduler.module_stop(id), ResultCode::Ok);
        assert!(!scheduler.camera_available());
    }

    #[test]
    fn set_and_get_parameter_roundtrip() {
        let scheduler = Scheduler::new(test_config(), factory()).unwrap();
        let id = register_test_module(&scheduler);
        assert_eq!(scheduler.set_parameter(id, "threshold", 42), ResultCode::Ok);
        assert_eq!(scheduler.get_parameter(id, "threshold").unwrap(), 42);
    }

    #[test]
    fn unknown_module_id_is_reported() {
        let scheduler = Scheduler::new(test_config(), factory()).unwrap();
        assert_eq!(scheduler.module_start(99), ResultCode::InvalidId);
        assert!(scheduler.get_parameter(99, "threshold").is_err());
    }

    #[test]
    fn running_loop_executes_module_and_stops_cleanly() {
        let scheduler = Scheduler::new(test_config(), factory()).unwrap();
        let id = register_test_module(&scheduler);
        scheduler.module_start(id);
        scheduler.start();
        std::thread::sleep(Duration::from_millis(80));
        assert_eq!(scheduler.stop(), ResultCode::Ok);
        assert!(!scheduler.camera_available());
    }

    #[test]
    fn removable_module_is_swept_within_one_cycle() {
        let scheduler = Scheduler::new(test_config(), factory()).unwrap();
        let id = register_test_module(&scheduler);
        scheduler.module_start(id);
        scheduler.start();
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(scheduler.module_remove(id), ResultCode::Ok);
        std::thread::sleep(Duration::from_millis(80));
        assert!(!scheduler.module_is_active(id));
        scheduler.stop();
    }
}
