//! Numeric result codes crossing the public API boundary, mirroring the
//! original C ABI's `tinkervision_defines.h` values exactly so existing
//! integrations keep working against the same numbers.

/// Result of a public API call. `#[repr(i16)]` so it can be returned
/// across an FFI boundary without a conversion table at the call site.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(i16)]
pub enum ResultCode {
    Ok = 0,
    ResultBuffered = 1,

    NotImplemented = -1,
    InternalError = -2,
    InvalidArgument = -3,
    Busy = -4,

    NodeAllocationFailed = -11,
    NoActiveModules = -12,

    CameraNotAvailable = -21,
    CameraSettingsFailed = -22,

    InvalidId = -31,
    ModuleInitializationFailed = -32,
    ModuleNoSuchParameter = -33,
    ModuleErrorSettingParameter = -34,

    ExecThreadFailure = -41,
    ThreadRunning = -42,

    ModuleDlopenFailed = -51,
    ModuleDlsymFailed = -52,
    ModuleDlcloseFailed = -53,
    ModuleConstructionFailed = -54,
    ModuleNotAvailable = -55,

    ResultNotAvailable = -61,
    GlobalCallbackActive = -62,
}

impl ResultCode {
    pub fn is_ok(&self) -> bool {
        matches!(self, ResultCode::Ok | ResultCode::ResultBuffered)
    }

    pub fn code(&self) -> i16 {
        *self as i16
    }
}

impl std::fmt::Display for ResultCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}({})", self.code())
    }
}

impl From<&crate::error::Error> for ResultCode {
    fn from(err: &crate::error::Error) -> Self {
        use crate::error::Error::*;
        match err {
            InvalidArgument(_) => ResultCode::InvalidArgument,
            Resource(_) => ResultCode::Busy,
            State(_) => ResultCode::InternalError,
            OutOfRange(_) => ResultCode::InvalidArgument,
            NoSuchParameter(_) => ResultCode::ModuleNoSuchParameter,
            CameraUnavailable(_) => ResultCode::CameraNotAvailable,
            CameraSettingsFailed(_) => ResultCode::CameraSettingsFailed,
            ConstructionFailed(_) => ResultCode::ModuleConstructionFailed,
            DlopenFailed(_) => ResultCode::ModuleDlopenFailed,
            DlsymFailed(_) => ResultCode::ModuleDlsymFailed,
            DlcloseFailed(_) => ResultCode::ModuleDlcloseFailed,
            NotImplemented => ResultCode::NotImplemented,
        }
    }
}

/// Check every `#[repr(i16)]` window before every 100ms grain of waiting for
/// a low-latency result; after `GRAINS` misses the call returns
/// `ResultBuffered` instead of blocking further.
pub const DELAY_GRAIN_MS: u64 = 100;
pub const GRAINS: u32 = 10;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_original_numbering() {
        assert_eq!(ResultCode::Ok.code(), 0);
        assert_eq!(ResultCode::ResultBuffered.code(), 1);
        assert_eq!(ResultCode::NotImplemented.code(), -1);
        assert_eq!(ResultCode::CameraNotAvailable.code(), -21);
        assert_eq!(ResultCode::ModuleDlopenFailed.code(), -51);
        assert_eq!(ResultCode::GlobalCallbackActive.code(), -62);
    }

    #[test]
    fn ok_variants() {
        assert!(ResultCode::Ok.is_ok());
        assert!(ResultCode::ResultBuffered.is_ok());
        assert!(!ResultCode::Busy.is_ok());
    }

    #[test]
    fn error_conversion_maps_camera_unavailable() {
        let err = crate::error::Error::CameraUnavailable("no device".into());
        assert_eq!(ResultCode::from(&err), ResultCode::CameraNotAvailable);
    }
}
