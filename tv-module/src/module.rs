//! The `Module` plug-in interface, grounded on `src/lib/interface/module.hh`.
//! Parameters are registered from the constructor or `init` only; the
//! wrapper never exposes a way to register one afterward.

use tv_core::{ColorSpace, ImageHeader, ModuleResult, Parameter};

/// What a vision-module plug-in must implement. Loaded either in-process
/// (for tests and `tv-examples`) or through `ModuleLoader`'s dynamic-library
/// boundary.
pub trait Module: Send {
    /// The colour-space this module expects its input in. `ColorSpace::None`
    /// means the module never reads pixels.
    fn input_format(&self) -> ColorSpace {
        ColorSpace::None
    }

    fn produces_result(&self) -> bool {
        false
    }

    fn outputs_image(&self) -> bool {
        false
    }

    /// One-shot setup. Parameters must be registered here or in the
    /// constructor, never afterward.
    fn init(&mut self) -> bool {
        true
    }

    /// Queried immediately before each `execute` when `outputs_image()` is
    /// true, so the wrapper can size a fresh output buffer.
    fn output_image_header(&self, _input_header: &ImageHeader) -> ImageHeader {
        ImageHeader::default()
    }

    /// `output` is `Some` iff `outputs_image()`.
    fn execute(&mut self, input_header: &ImageHeader, input_data: &[u8], output: Option<(&ImageHeader, &mut [u8])>);

    fn has_result(&self) -> bool {
        false
    }

    fn result(&self) -> ModuleResult {
        ModuleResult::unset()
    }

    fn stop(&mut self) {}

    fn parameters(&self) -> &[Parameter] {
        &[]
    }

    fn parameters_mut(&mut self) -> &mut [Parameter] {
        &mut []
    }
}
