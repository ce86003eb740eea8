//! `SharedResource<R>`, grounded on `shared_resource.hh`. The original
//! guards an `unordered_map` plus a separate insertion-order linked list
//! behind one mutex; here a single `Mutex<Inner<R>>` holds both an
//! insertion-ordered `Vec<ModuleId>` and a `HashMap<ModuleId, R>`, which is
//! the idiomatic Rust shape for the same invariant (one lock, ordered
//! iteration).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tv_core::ModuleId;

struct Inner<R> {
    order: Vec<ModuleId>,
    items: HashMap<ModuleId, R>,
}

pub struct SharedResource<R> {
    inner: Mutex<Inner<R>>,
}

impl<R> Default for SharedResource<R> {
    fn default() -> Self {
        SharedResource {
            inner: Mutex::new(Inner { order: Vec::new(), items: HashMap::new() }),
        }
    }
}

impl<R> SharedResource<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// False if `id` is already managed.
    pub fn insert(&self, id: ModuleId, resource: R) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.items.contains_key(&id) {
            return false;
        }
        inner.items.insert(id, resource);
        inner.order.push(id);
        true
    }

    /// False if `id` was not managed.
    pub fn remove(&self, id: ModuleId) -> Option<R> {
        let mut inner = self.inner.lock().unwrap();
        let removed = inner.items.remove(&id);
        if removed.is_some() {
            inner.order.retain(|&managed| managed != id);
        }
        removed
    }

    pub fn managed(&self, id: ModuleId) -> bool {
        self.inner.lock().unwrap().items.contains_key(&id)
    }

    pub fn count(&self) -> usize {
        self.inner.lock().unwrap().items.len()
    }

    pub fn managed_id(&self, index: usize) -> Option<ModuleId> {
        self.inner.lock().unwrap().order.get(index).copied()
    }

    /// Execute `executor` on every managed resource, in insertion order.
    pub fn exec_all(&self, mut executor: impl FnMut(ModuleId, &mut R)) {
        let mut inner = self.inner.lock().unwrap();
        let Inner { order, items } = &mut *inner;
        for id in order.iter() {
            if let Some(resource) = items.get_mut(id) {
                executor(*id, resource);
            }
        }
    }

    /// Execute `executor` on a single resource, returning its result, or
    /// `None` if `id` is not managed.
    pub fn exec_one<T>(&self, id: ModuleId, executor: impl FnOnce(&mut R) -> T) -> Option<T> {
        let mut inner = self.inner.lock().unwrap();
        inner.items.get_mut(&id).map(executor)
    }

    /// Low-latency variant of `exec_one`: polls in `grain`-sized steps up to
    /// `deadline`, returning as soon as the resource becomes available
    /// (e.g. a module currently mid-execute on the scheduler thread), or
    /// `None` once the deadline passes without ever being able to run
    /// `executor` -- this mutex never blocks for long, so the poll is a
    /// best-effort retry, not a queue.
    pub fn exec_one_now<T>(&self, id: ModuleId, deadline: Duration, grain: Duration, mut executor: impl FnMut(&mut R) -> T) -> Option<T> {
        let started = Instant::now();
        loop {
            if let Some(result) = self.exec_one(id, &mut executor) {
                return Some(result);
            }
            if started.elapsed() >= deadline {
                return None;
            }
            std::thread::sleep(grain);
        }
    }

    /// Counts how many managed resources satisfy `predicate`.
    pub fn count_matching(&self, mut predicate: impl FnMut(&R) -> bool) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.items.values().filter(|resource| predicate(resource)).count()
    }

    /// Removes every managed resource for which `predicate` holds. Returns
    /// the removed `(id, resource)` pairs in insertion order, so callers can
    /// still release per-id side effects (camera usercounts, library
    /// handles) for whatever was just removed.
    pub fn remove_if(&self, mut predicate: impl FnMut(&R) -> bool) -> Vec<(ModuleId, R)> {
        let mut inner = self.inner.lock().unwrap();
        let doomed: Vec<ModuleId> = inner
            .order
            .iter()
            .copied()
            .filter(|id| inner.items.get(id).map(&mut predicate).unwrap_or(false))
            .collect();
        let mut removed = Vec::with_capacity(doomed.len());
        for id in &doomed {
            if let Some(resource) = inner.items.remove(id) {
                removed.push((*id, resource));
            }
        }
        inner.order.retain(|id| !doomed.contains(id));
        removed
    }

    pub fn free_all(&self) -> Vec<(ModuleId, R)> {
        let mut inner = self.inner.lock().unwrap();
        inner.order.clear();
        inner.items.drain().collect()
    }

    /// Moves `second` to immediately follow `first` in iteration order.
    /// False if either id is unmanaged.
    pub fn reorder(&self, first: ModuleId, second: ModuleId) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if !inner.items.contains_key(&first) || !inner.items.contains_key(&second) {
            return false;
        }
        inner.order.retain(|&id| id != second);
        let position = inner.order.iter().position(|&id| id == first).expect("first is managed");
        inner.order.insert(position + 1, second);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_rejects_duplicate_id() {
        let resources: SharedResource<u32> = SharedResource::new();
        assert!(resources.insert(1, 10));
        assert!(!resources.insert(1, 20));
    }

    #[test]
    fn exec_all_visits_in_insertion_order() {
        let resources: SharedResource<u32> = SharedResource::new();
        resources.insert(3, 30);
        resources.insert(1, 10);
        resources.insert(2, 20);

        let mut seen = Vec::new();
        resources.exec_all(|id, value| seen.push((id, *value)));
        assert_eq!(seen, vec![(3, 30), (1, 10), (2, 20)]);
    }

    #[test]
    fn remove_if_drops_matching_and_keeps_rest() {
        let resources: SharedResource<u32> = SharedResource::new();
        resources.insert(1, 10);
        resources.insert(2, 20);
        resources.insert(3, 30);

        let removed = resources.remove_if(|value| *value >= 20);
        assert_eq!(removed.len(), 2);
        assert_eq!(removed.iter().map(|(id, _)| *id).collect::<Vec<_>>(), vec![2, 3]);
        assert_eq!(resources.count(), 1);
        assert!(resources.managed(1));
    }

    #[test]
    fn reorder_moves_second_after_first() {
        let resources: SharedResource<u32> = SharedResource::new();
        resources.insert(1, 10);
        resources.insert(2, 20);
        resources.insert(3, 30);

        assert!(resources.reorder(3, 1));
        let mut seen = Vec::new();
        resources.exec_all(|id, _| seen.push(id));
        assert_eq!(seen, vec![2, 3, 1]);
    }

    #[test]
    fn exec_one_now_returns_none_past_deadline_when_never_available() {
        let resources: SharedResource<u32> = SharedResource::new();
        let result = resources.exec_one_now(99, Duration::from_millis(20), Duration::from_millis(5), |value| *value);
        assert!(result.is_none());
    }

    #[test]
    fn free_all_clears_everything() {
        let resources: SharedResource<u32> = SharedResource::new();
        resources.insert(1, 10);
        resources.insert(2, 20);
        let freed = resources.free_all();
        assert_eq!(freed.len(), 2);
        assert_eq!(resources.count(), 0);
        assert_eq!(freed.iter().map(|(id, _)| *id).collect::<Vec<_>>(), vec![1, 2]);
    }
}
