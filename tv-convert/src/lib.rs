pub mod cache;
pub mod convert;

pub use cache::{ConverterCache, FrameConversions};
pub use convert::{converter_for, Converter};
