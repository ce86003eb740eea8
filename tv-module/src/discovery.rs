//! `Discovery`, grounded on `src/lib/tools/dirwatch.hh`. No `inotify`
//! dependency is pulled in; `PollingDiscovery` diffs a directory listing on
//! a fixed interval, which is enough to keep `ModuleLoader` in sync in
//! tests and small deployments. A production build can swap in a real
//! `inotify`-backed `Discovery` without touching `ModuleLoader`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DiscoveryEvent {
    FileCreated,
    FileDeleted,
    DirDeleted,
}

pub type DiscoveryCallback = Box<dyn Fn(&Path, &str, DiscoveryEvent) + Send>;

pub trait Discovery: Send {
    fn watch(&mut self, paths: Vec<PathBuf>);
    fn set_callback(&mut self, callback: DiscoveryCallback);
    fn stop(&mut self);
}

/// Polls its watched directories on a background thread every `interval`.
pub struct PollingDiscovery {
    paths: Arc<std::sync::Mutex<Vec<PathBuf>>>,
    callback: Arc<std::sync::Mutex<Option<DiscoveryCallback>>>,
    running: Arc<AtomicBool>,
    interval: Duration,
    handle: Option<std::thread::JoinHandle<()>>,
}

fn snapshot(dir: &Path) -> HashSet<String> {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default()
}

impl PollingDiscovery {
    pub fn new(interval: Duration) -> Self {
        PollingDiscovery {
            paths: Arc::new(std::sync::Mutex::new(Vec::new())),
            callback: Arc::new(std::sync::Mutex::new(None)),
            running: Arc::new(AtomicBool::new(false)),
            interval,
            handle: None,
        }
    }

    fn spawn(&mut self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let paths = self.paths.clone();
        let callback = self.callback.clone();
        let running = self.running.clone();
        let interval = self.interval;

        self.handle = Some(std::thread::spawn(move || {
            let mut last: Vec<(PathBuf, HashSet<String>)> = Vec::new();
            while running.load(Ordering::SeqCst) {
                let watched = paths.lock().unwrap().clone();
                let mut current = Vec::with_capacity(watched.len());

                for dir in &watched {
                    if !dir.exists() {
                        if let Some((_, previous)) = last.iter().find(|(path, _)| path == dir) {
                            if let Some(cb) = callback.lock().unwrap().as_ref() {
                                for _ in previous {
                                    cb(dir, "", DiscoveryEvent::DirDeleted);
                                }
                            }
                        }
                        continue;
                    }

                    let files = snapshot(dir);
                    if let Some((_, previous)) = last.iter().find(|(path, _)| path == dir) {
                        if let Some(cb) = callback.lock().unwrap().as_ref() {
                            for created in files.difference(previous) {
                                cb(dir, created, DiscoveryEvent::FileCreated);
                            }
                            for deleted in previous.difference(&files) {
                                cb(dir, deleted, DiscoveryEvent::FileDeleted);
                            }
                        }
                    }
                    current.push((dir.clone(), files));
                }

                last = current;
                std::thread::sleep(interval);
            }
        }));
    }
}

impl Discovery for PollingDiscovery {
    fn watch(&mut self, paths: Vec<PathBuf>) {
        *self.paths.lock().unwrap() = paths;
        self.spawn();
    }

    fn set_callback(&mut self, callback: DiscoveryCallback) {
        *self.callback.lock().unwrap() = Some(callback);
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PollingDiscovery {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn reports_file_creation() {
        let dir = std::env::temp_dir().join(format!("tv-discovery-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let mut discovery = PollingDiscovery::new(Duration::from_millis(20));
        let events: Arc<Mutex<Vec<(String, DiscoveryEvent)>>> = Arc::new(Mutex::new(Vec::new()));
        let events_clone = events.clone();
        discovery.set_callback(Box::new(move |_dir, name, event| {
            events_clone.lock().unwrap().push((name.to_string(), event));
        }));
        discovery.watch(vec![dir.clone()]);

        std::thread::sleep(Duration::from_millis(50));
        std::fs::write(dir.join("plugin.so"), b"fake").unwrap();
        std::thread::sleep(Duration::from_millis(80));

        discovery.stop();
        std::fs::remove_dir_all(&dir).ok();

        let seen = events.lock().unwrap();
        assert!(seen.iter().any(|(name, event)| name == "plugin.so" && *event == DiscoveryEvent::FileCreated));
    }
}
