//! `RuntimeConfig`, grounded on `src/lib/core/environment.hh`'s `Environment`,
//! following the common pattern of a small `*Config` value threaded by
//! reference into device/codec constructors.

use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::Result;

/// Paths and scheduler defaults shared across the module loader and
/// scheduler. Cheap to clone; callers that need to share one instance wrap
/// it in `Arc<RuntimeConfig>`.
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    pub system_modules_path: PathBuf,
    pub user_modules_path: PathBuf,
    pub user_data_path: PathBuf,
    pub user_scripts_path: PathBuf,
    pub user_prefix: PathBuf,
    pub frameperiod_ms: u32,
    pub requested_width: u16,
    pub requested_height: u16,
}

const MODULES_FOLDER: &str = "lib";
const DATA_FOLDER: &str = "data";
const SCRIPTS_FOLDER: &str = "scripts";

impl RuntimeConfig {
    /// `system_modules_path` is taken as given (conventionally
    /// `/usr/lib/tinkervision/`, but not validated -- the original treats it
    /// the same way). `user_prefix` is validated: its `lib`, `data`, and
    /// `scripts` subdirectories must already exist.
    pub fn new(system_modules_path: impl Into<PathBuf>, user_prefix: impl Into<PathBuf>) -> Result<Self> {
        let user_prefix = user_prefix.into();
        let user_modules_path = require_subdir(&user_prefix, MODULES_FOLDER)?;
        let user_data_path = require_subdir(&user_prefix, DATA_FOLDER)?;
        let user_scripts_path = require_subdir(&user_prefix, SCRIPTS_FOLDER)?;

        Ok(RuntimeConfig {
            system_modules_path: system_modules_path.into(),
            user_modules_path,
            user_data_path,
            user_scripts_path,
            user_prefix,
            frameperiod_ms: 100,
            requested_width: 0,
            requested_height: 0,
        })
    }

    pub fn with_frameperiod_ms(mut self, ms: u32) -> Self {
        self.frameperiod_ms = ms;
        self
    }

    pub fn with_requested_size(mut self, width: u16, height: u16) -> Self {
        self.requested_width = width;
        self.requested_height = height;
        self
    }
}

fn require_subdir(prefix: &Path, name: &str) -> Result<PathBuf> {
    let path = prefix.join(name);
    if !path.is_dir() {
        return Err(Error::Resource(
            format!("{} does not exist under user prefix {}", name, prefix.display()).into(),
        ));
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_missing_subdirectories() {
        let dir = std::env::temp_dir().join(format!("tv-core-config-test-{}", std::process::id()));
        let _ = std::fs::create_dir_all(&dir);
        assert!(RuntimeConfig::new("/usr/lib/tinkervision", &dir).is_err());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn accepts_prefix_with_required_subdirectories() {
        let dir = std::env::temp_dir().join(format!("tv-core-config-test-ok-{}", std::process::id()));
        for sub in [MODULES_FOLDER, DATA_FOLDER, SCRIPTS_FOLDER] {
            std::fs::create_dir_all(dir.join(sub)).unwrap();
        }
        let config = RuntimeConfig::new("/usr/lib/tinkervision", &dir).unwrap();
        assert_eq!(config.user_modules_path, dir.join(MODULES_FOLDER));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
