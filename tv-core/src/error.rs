use std::borrow::Cow;

use thiserror::Error;

/// Covers taxonomy kinds 1-3 of the error model (argument, resource, state).
/// Transient device failures (kind 4) never reach here: `CameraControl`
/// swallows them and substitutes the fallback frame. Plug-in failures (kind
/// 5) become a `Removable` tag, never an `Error`. Deadline misses (kind 6)
/// become `ResultCode::ResultBuffered`, not an `Error`. Kind 7 (programmer
/// errors) are asserted, not returned.
#[derive(Clone, Debug, Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(Cow<'static, str>),
    #[error("resource unavailable: {0}")]
    Resource(Cow<'static, str>),
    #[error("invalid state: {0}")]
    State(Cow<'static, str>),
    #[error("value out of range: {0}")]
    OutOfRange(Cow<'static, str>),
    #[error("no such parameter: {0}")]
    NoSuchParameter(Cow<'static, str>),
    #[error("camera unavailable: {0}")]
    CameraUnavailable(Cow<'static, str>),
    #[error("camera settings rejected: {0}")]
    CameraSettingsFailed(Cow<'static, str>),
    #[error("module construction failed: {0}")]
    ConstructionFailed(Cow<'static, str>),
    #[error("dlopen failed: {0}")]
    DlopenFailed(Cow<'static, str>),
    #[error("dlsym failed: {0}")]
    DlsymFailed(Cow<'static, str>),
    #[error("dlclose failed: {0}")]
    DlcloseFailed(Cow<'static, str>),
    #[error("not implemented")]
    NotImplemented,
}

#[macro_export]
macro_rules! invalid_argument {
    ($msg:literal) => {
        $crate::error::Error::InvalidArgument($msg.into())
    };
    ($($arg:tt)*) => {
        $crate::error::Error::InvalidArgument(format!($($arg)*).into())
    };
}

#[macro_export]
macro_rules! state_error {
    ($msg:literal) => {
        $crate::error::Error::State($msg.into())
    };
    ($($arg:tt)*) => {
        $crate::error::Error::State(format!($($arg)*).into())
    };
}

#[macro_export]
macro_rules! resource_error {
    ($msg:literal) => {
        $crate::error::Error::Resource($msg.into())
    };
    ($($arg:tt)*) => {
        $crate::error::Error::Resource(format!($($arg)*).into())
    };
}
