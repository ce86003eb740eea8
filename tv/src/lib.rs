//! Facade crate: re-exports the core types plus each optional subsystem
//! behind its own feature, so a consumer depending only on `tv` gets the
//! whole runtime without naming every member crate.

pub use tv_core::*;

#[cfg(feature = "convert")]
pub use tv_convert as convert;

#[cfg(feature = "device")]
pub use tv_device as device;

#[cfg(feature = "module")]
pub use tv_module as module;

#[cfg(feature = "scheduler")]
pub use tv_scheduler::Scheduler;
