pub mod config;
pub mod error;
pub mod image;
pub mod module_result;
pub mod parameter;
pub mod result_code;
pub mod time;

mod utils;

pub use config::RuntimeConfig;
pub use image::{ColorSpace, ImageBuffer, ImageHeader};
pub use module_result::ModuleResult;
pub use parameter::{Parameter, ParameterKind};
pub use result_code::ResultCode;
pub use error::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Maximum length of strings crossing the runtime boundary, including the
/// terminating NUL. Mirrors the original `TV_STRING_SIZE`.
pub const TV_STRING_SIZE: usize = 30;

/// Public module ids live in `[1, 127]`; internal ids (idle module, scene
/// nodes) live in `[128, 32767]`. `0` means "no module", `-1` is invalid.
pub type ModuleId = i16;

pub const NO_MODULE_ID: ModuleId = 0;
pub const INVALID_MODULE_ID: ModuleId = -1;
pub const FIRST_PUBLIC_MODULE_ID: ModuleId = 1;
pub const LAST_PUBLIC_MODULE_ID: ModuleId = 127;
pub const FIRST_INTERNAL_MODULE_ID: ModuleId = 128;
