use std::time::Duration;

use tv_core::{ColorSpace, ImageHeader, ModuleResult, ResultCode, RuntimeConfig};
use tv_device::{DeviceFactory, SyntheticCamera};
use tv_module::Module;
use tv_scheduler::Scheduler;

struct FrameCounter {
    count: i32,
}

impl Module for FrameCounter {
    fn input_format(&self) -> ColorSpace {
        ColorSpace::Bgr888
    }

    fn has_result(&self) -> bool {
        true
    }

    fn result(&self) -> ModuleResult {
        ModuleResult { x: self.count, ..ModuleResult::unset() }
    }

    fn execute(&mut self, _input_header: &ImageHeader, _input_data: &[u8], _output: Option<(&ImageHeader, &mut [u8])>) {
        self.count += 1;
    }
}

fn config() -> RuntimeConfig {
    let dir = std::env::temp_dir().join(format!("tv-scheduler-integration-{}-{}", std::process::id(), line!()));
    for sub in ["lib", "data", "scripts"] {
        std::fs::create_dir_all(dir.join(sub)).unwrap();
    }
    RuntimeConfig::new("/usr/lib/tinkervision", &dir).unwrap().with_frameperiod_ms(15)
}

fn synthetic_factory() -> DeviceFactory {
    Box::new(|id| if id == 0 { Some(Box::new(SyntheticCamera::new(0)) as Box<dyn tv_device::CameraDevice>) } else { None })
}

#[test]
fn registered_module_accumulates_executions_while_running() {
    let scheduler = Scheduler::new(config(), synthetic_factory()).unwrap();
    let id = scheduler.module_register("frame_counter", Box::new(FrameCounter { count: 0 })).unwrap();

    assert_eq!(scheduler.module_start(id), ResultCode::Ok);
    assert_eq!(scheduler.start(), ResultCode::Ok);

    std::thread::sleep(Duration::from_millis(200));
    scheduler.stop();

    let result = scheduler.get_result(id);
    assert!(result.x > 0, "expected at least one executed cycle, got {}", result.x);
}

#[test]
fn start_idle_holds_the_camera_with_no_real_module() {
    let scheduler = Scheduler::new(config(), synthetic_factory()).unwrap();
    assert_eq!(scheduler.start_idle(), ResultCode::Ok);
    assert!(scheduler.camera_available());
    scheduler.quit();
    assert!(!scheduler.camera_available());
}

#[test]
fn removed_module_stops_receiving_results_after_quit() {
    let scheduler = Scheduler::new(config(), synthetic_factory()).unwrap();
    let id = scheduler.module_register("frame_counter", Box::new(FrameCounter { count: 0 })).unwrap();
    scheduler.module_start(id);
    scheduler.start();
    std::thread::sleep(Duration::from_millis(60));
    scheduler.quit();
    assert!(!scheduler.module_is_active(id));
}
