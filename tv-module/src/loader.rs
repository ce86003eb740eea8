//! `ModuleLoader`, grounded on `module_loader.hh`. `create`/`destroy` cross
//! the dynamic-library boundary as a crate-private `*mut c_void` wrapping a
//! `Box<dyn Module>`, since trait objects have no stable `extern "C"` ABI.
//! `destroy_module` takes the caller's `ModuleWrapper` by value so the
//! plug-in's own teardown runs, and only then is the library handle it came
//! from released -- the library is never unloaded while its module is live.

use std::ffi::c_void;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use libloading::{Library, Symbol};
use log::{info, warn};
use tv_core::{Error, ModuleId, Result};

use crate::discovery::{Discovery, DiscoveryEvent};
use crate::module::Module;
use crate::wrapper::ModuleWrapper;

/// A user-registered callback notified of (directory, filename, event) once
/// `ModuleLoader::watch` has already replayed `rescan`'s validation.
pub type DiscoveryNotify = Box<dyn Fn(&Path, &str, DiscoveryEvent) + Send>;

type CreateSymbol = unsafe extern "C" fn(id: ModuleId) -> *mut c_void;
type DestroySymbol = unsafe extern "C" fn(*mut c_void);

#[derive(Clone, Debug)]
pub struct AvailableModule {
    pub name: String,
    pub load_path: PathBuf,
}

/// Keeps a loaded library alive for as long as modules constructed from it
/// may still be executing. `destroy_module` drops the caller's
/// `ModuleWrapper` (running the plug-in's own teardown) before this handle
/// is removed, so the library is never unloaded out from under a live
/// `Box<dyn Module>`.
struct ModuleHandle {
    library: Library,
}

pub struct ModuleLoader {
    system_path: PathBuf,
    user_path: PathBuf,
    availables: Vec<AvailableModule>,
    handles: Vec<(ModuleId, ModuleHandle)>,
    last_error: Option<Error>,
    /// Kept alive only so its watcher thread runs for as long as the loader
    /// does; the thread itself never reaches back into this struct, it only
    /// invokes the callback `watch` installed.
    discovery: Option<Box<dyn Discovery>>,
}

fn library_filename_stem(path: &Path) -> Option<String> {
    path.file_stem().map(|stem| stem.to_string_lossy().into_owned())
}

fn list_candidate_libraries(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().and_then(|ext| ext.to_str()) == Some(std::env::consts::DLL_EXTENSION))
        .collect()
}

impl ModuleLoader {
    /// Scans both load paths and keeps, as *available*, every candidate
    /// library that survives a construct round trip (construction succeeds,
    /// then is immediately destroyed again).
    pub fn new(system_path: impl Into<PathBuf>, user_path: impl Into<PathBuf>) -> Self {
        let system_path = system_path.into();
        let user_path = user_path.into();
        let mut loader = ModuleLoader {
            system_path,
            user_path,
            availables: Vec::new(),
            handles: Vec::new(),
            last_error: None,
            discovery: None,
        };
        loader.rescan();
        loader
    }

    /// Starts watching both load paths for creation/deletion through
    /// `discovery`, replaying `rescan`'s validation on every event before
    /// handing it to `notify` (if any is registered by then). `loader` must
    /// be the same handle the caller keeps using everywhere else -- the
    /// watcher's callback fires on `discovery`'s own background thread and
    /// reaches the loader only through this lock.
    pub fn watch(loader: &Arc<Mutex<ModuleLoader>>, mut discovery: Box<dyn Discovery>, notify: Arc<Mutex<Option<DiscoveryNotify>>>) {
        let (system_path, user_path) = {
            let guard = loader.lock().unwrap();
            (guard.system_path.clone(), guard.user_path.clone())
        };

        let loader_for_callback = loader.clone();
        discovery.set_callback(Box::new(move |dir, name, event| {
            loader_for_callback.lock().unwrap().rescan();
            if let Some(callback) = notify.lock().unwrap().as_ref() {
                callback(dir, name, event);
            }
        }));
        discovery.watch(vec![system_path, user_path]);
        loader.lock().unwrap().discovery = Some(discovery);
    }

    pub fn rescan(&mut self) {
        self.availables.clear();
        for dir in [self.user_path.clone(), self.system_path.clone()] {
            for path in list_candidate_libraries(&dir) {
                let Some(name) = library_filename_stem(&path) else { continue };
                if self.probe_library(&path).is_ok() {
                    self.availables.push(AvailableModule { name, load_path: path });
                }
            }
        }
    }

    fn probe_library(&self, path: &Path) -> Result<()> {
        let library = unsafe { Library::new(path) }.map_err(|e| Error::DlopenFailed(e.to_string().into()))?;
        let create: Symbol<CreateSymbol> = unsafe { library.get(b"create\0") }.map_err(|e| Error::DlsymFailed(e.to_string().into()))?;
        let destroy: Symbol<DestroySymbol> = unsafe { library.get(b"destroy\0") }.map_err(|e| Error::DlsymFailed(e.to_string().into()))?;

        let raw = unsafe { create(0) };
        if raw.is_null() {
            return Err(Error::ConstructionFailed(format!("{} returned null", path.display()).into()));
        }
        unsafe { destroy(raw) };
        Ok(())
    }

    pub fn available_modules(&self) -> &[AvailableModule] {
        &self.availables
    }

    pub fn library_available(&self, name: &str) -> bool {
        self.availables.iter().any(|module| module.name == name)
    }

    fn find_load_path(&self, name: &str) -> Option<PathBuf> {
        self.availables.iter().find(|module| module.name == name).map(|module| module.load_path.clone())
    }

    /// Opens `name`, constructs its module with `id`, and wraps it in a
    /// `ModuleWrapper`. User path takes precedence via `available_modules`'s
    /// scan order (user before system).
    pub fn load_module_from_library(&mut self, name: &str, id: ModuleId) -> Result<ModuleWrapper> {
        let path = self.find_load_path(name).ok_or_else(|| Error::Resource(format!("no such library: {name}").into()))?;

        let library = unsafe { Library::new(&path) }.map_err(|e| {
            let err = Error::DlopenFailed(e.to_string().into());
            self.last_error = Some(err.clone());
            err
        })?;

        let (create, destroy) = unsafe {
            let create: Symbol<CreateSymbol> = library.get(b"create\0").map_err(|e| Error::DlsymFailed(e.to_string().into()))?;
            let destroy: Symbol<DestroySymbol> = library.get(b"destroy\0").map_err(|e| Error::DlsymFailed(e.to_string().into()))?;
            (*create, *destroy)
        };

        let raw = unsafe { create(id) };
        if raw.is_null() {
            let err = Error::ConstructionFailed(format!("{name} returned null").into());
            self.last_error = Some(err.clone());
            return Err(err);
        }

        let module: Box<dyn Module> = unsafe { *Box::from_raw(raw as *mut Box<dyn Module>) };
        info!("loaded module '{name}' as id {id}");
        let _ = destroy; // resolved only to validate the ABI contract at load time

        self.handles.push((id, ModuleHandle { library }));

        Ok(ModuleWrapper::new(id, path.display().to_string(), module))
    }

    /// Consumes `wrapper` (running the plug-in's `stop`/`Drop` teardown),
    /// then releases the library handle opened for `id`. A failure to
    /// locate the handle is reported as `false`; the wrapper is still
    /// dropped either way.
    pub fn destroy_module(&mut self, id: ModuleId, wrapper: ModuleWrapper) -> bool {
        drop(wrapper.into_module());
        if let Some(position) = self.handles.iter().position(|(handle_id, _)| *handle_id == id) {
            self.handles.remove(position);
            true
        } else {
            warn!("destroy_module: id {id} has no open library handle");
            false
        }
    }

    /// Releases every remaining library handle. Callers must have already
    /// dropped all `ModuleWrapper`s constructed from them (e.g. via
    /// `SharedResource::free_all`).
    pub fn destroy_all(&mut self) {
        self.handles.clear();
    }

    pub fn last_error(&mut self) -> Option<Error> {
        self.last_error.take()
    }

    pub fn libraries_count(&self) -> usize {
        self.availables.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::PollingDiscovery;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[test]
    fn watch_rescans_and_notifies_when_a_library_file_appears() {
        let user_dir = std::env::temp_dir().join(format!("tv-loader-watch-user-{}", std::process::id()));
        let system_dir = std::env::temp_dir().join(format!("tv-loader-watch-system-{}", std::process::id()));
        std::fs::create_dir_all(&user_dir).unwrap();
        std::fs::create_dir_all(&system_dir).unwrap();

        let loader = Arc::new(Mutex::new(ModuleLoader::new(system_dir.clone(), user_dir.clone())));
        let notified = Arc::new(AtomicBool::new(false));
        let notified_for_callback = notified.clone();
        let notify: Arc<Mutex<Option<DiscoveryNotify>>> = Arc::new(Mutex::new(Some(Box::new(
            move |_dir: &Path, _name: &str, _event: DiscoveryEvent| {
                notified_for_callback.store(true, Ordering::SeqCst);
            },
        ))));

        ModuleLoader::watch(&loader, Box::new(PollingDiscovery::new(Duration::from_millis(20))), notify);

        std::thread::sleep(Duration::from_millis(40));
        std::fs::write(user_dir.join(format!("plugin.{}", std::env::consts::DLL_EXTENSION)), b"fake").unwrap();
        std::thread::sleep(Duration::from_millis(100));

        assert!(notified.load(Ordering::SeqCst), "expected the watcher to notify on file creation");

        loader.lock().unwrap().discovery.take();
        std::fs::remove_dir_all(&user_dir).ok();
        std::fs::remove_dir_all(&system_dir).ok();
    }
}
