//! Wires a synthetic camera and two in-process demo modules through the
//! scheduler, runs them for a handful of cycles, and prints what each module
//! produced. No real capture hardware or on-disk plug-in libraries involved.

use std::time::Duration;

use tv::device::SyntheticCamera;
use tv::module::Module;
use tv::{ColorSpace, ImageHeader, ModuleResult, Parameter, ResultCode, RuntimeConfig, Scheduler};

/// Counts the frames it sees and reports the count as `result().x`.
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

/// Reports the mean of its input bytes once every `period` executions,
/// exposed as a tunable `period` parameter.
struct MeanBrightness {
    parameter: Parameter,
    since_last: u32,
    last_mean: i32,
}

impl MeanBrightness {
    fn new(period: i32) -> tv::Result<Self> {
        Ok(MeanBrightness {
            parameter: Parameter::numerical("period", 1, 100, period)?,
            since_last: 0,
            last_mean: -1,
        })
    }
}

impl Module for MeanBrightness {
    fn input_format(&self) -> ColorSpace {
        ColorSpace::Bgr888
    }

    fn has_result(&self) -> bool {
        true
    }

    fn result(&self) -> ModuleResult {
        ModuleResult { x: self.last_mean, ..ModuleResult::unset() }
    }

    fn parameters(&self) -> &[Parameter] {
        std::slice::from_ref(&self.parameter)
    }

    fn parameters_mut(&mut self) -> &mut [Parameter] {
        std::slice::from_mut(&mut self.parameter)
    }

    fn execute(&mut self, _input_header: &ImageHeader, input_data: &[u8], _output: Option<(&ImageHeader, &mut [u8])>) {
        self.since_last += 1;
        let period = self.parameter.get_i32().unwrap_or(1) as u32;
        if self.since_last < period {
            return;
        }
        self.since_last = 0;
        let sum: u64 = input_data.iter().map(|&b| b as u64).sum();
        self.last_mean = (sum / input_data.len().max(1) as u64) as i32;
    }
}

fn synthetic_factory() -> tv::device::DeviceFactory {
    Box::new(|id| if id == 0 { Some(Box::new(SyntheticCamera::new(0)) as Box<dyn tv::device::CameraDevice>) } else { None })
}

fn main() -> tv::Result<()> {
    env_logger::init();

    let prefix = std::env::temp_dir().join(format!("tv-synthetic-run-{}", std::process::id()));
    for sub in ["lib", "data", "scripts"] {
        std::fs::create_dir_all(prefix.join(sub)).expect("create demo prefix subdirectory");
    }
    let config = RuntimeConfig::new("/usr/lib/tinkervision", &prefix)?.with_frameperiod_ms(50);

    let scheduler = Scheduler::new(config, synthetic_factory())?;

    let counter_id = scheduler.module_register("frame_counter", Box::new(FrameCounter { count: 0 }))?;
    let brightness_id = scheduler.module_register("mean_brightness", Box::new(MeanBrightness::new(3)?))?;

    assert_eq!(scheduler.module_start(counter_id), ResultCode::Ok);
    assert_eq!(scheduler.module_start(brightness_id), ResultCode::Ok);

    assert_eq!(scheduler.start(), ResultCode::Ok);
    println!("running with effective frame period {} ms", scheduler.effective_frameperiod_ms());

    std::thread::sleep(Duration::from_millis(400));

    println!("frame_counter result: {:?}", scheduler.get_result(counter_id));
    println!("mean_brightness result: {:?}", scheduler.get_result(brightness_id));

    scheduler.stop();
    let _ = std::fs::remove_dir_all(&prefix);
    Ok(())
}
