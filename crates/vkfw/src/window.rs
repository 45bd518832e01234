//! Window registry
//!
//! Windows live in a generational arena. A [`WindowId`] stays unique for the
//! lifetime of the process; once the window is reclaimed its id simply stops
//! resolving.
//!
//! Lifetime is governed by an explicit strong count:
//! - creation starts the count at 1 (the application's reference),
//! - every subsystem that keeps an id across a suspension point (text-input
//!   gate, focus trackers) takes its own reference,
//! - destruction sets the `DELETED` tombstone and drops the application's
//!   reference,
//! - the record, including its backend data, is reclaimed when the count
//!   reaches zero.
//!
//! The registry sits behind a mutex so that backends may touch references
//! from helper threads.

use std::any::Any;
use std::sync::{Arc, Mutex, MutexGuard};

use ash::vk;
use bitflags::bitflags;
use slotmap::{new_key_type, SlotMap};

use crate::keys::PointerMode;
use crate::logging::{debug, warn, LogSource};

new_key_type! {
    /// Stable handle of a window
    pub struct WindowId;
}

bitflags! {
    /// Per-window state bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct WindowFlags: u32 {
        /// `destroy_window` was called; the record lingers only while
        /// references remain
        const DELETED = 1;
        /// Text input events are delivered for this window
        const TEXT_INPUT_ENABLED = 2;
    }
}

/// Application data attached to a window
pub type UserData = Arc<dyn Any + Send + Sync>;

/// Backend-private state attached to a window
///
/// Dropping it is the backend's free routine.
pub type BackendData = Box<dyn Any + Send>;

struct WindowRecord {
    extent: vk::Extent2D,
    refcount: u32,
    flags: WindowFlags,
    pointer_mode: PointerMode,
    user_data: Option<UserData>,
    backend_data: Option<BackendData>,
}

/// Shared, lock-protected arena of windows
///
/// Clones refer to the same registry.
#[derive(Clone, Default)]
pub struct WindowRegistry {
    inner: Arc<Mutex<SlotMap<WindowId, WindowRecord>>>,
}

impl std::fmt::Debug for WindowRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowRegistry").field("windows", &self.len()).finish()
    }
}

impl WindowRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SlotMap<WindowId, WindowRecord>> {
        // A panicking handler must not wedge every later reference drop
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Register a new window with one reference
    pub fn insert(&self, extent: vk::Extent2D, backend_data: Option<BackendData>) -> WindowId {
        self.lock().insert(WindowRecord {
            extent,
            refcount: 1,
            flags: WindowFlags::empty(),
            pointer_mode: PointerMode::empty(),
            user_data: None,
            backend_data,
        })
    }

    /// Take a strong reference; `false` if the window is already gone
    pub fn ref_window(&self, id: WindowId) -> bool {
        self.lock().get_mut(id).map_or(false, |record| {
            record.refcount += 1;
            true
        })
    }

    /// Release a strong reference
    ///
    /// Returns `true` if this was the last reference and the window was
    /// reclaimed.
    pub fn unref_window(&self, id: WindowId) -> bool {
        let freed = {
            let mut windows = self.lock();
            let Some(record) = windows.get_mut(id) else {
                warn!(target: LogSource::Core.target(), "unref of unknown window {id:?}");
                return false;
            };
            record.refcount -= 1;
            if record.refcount > 0 {
                return false;
            }
            windows.remove(id)
        };

        // Backend data is dropped outside the lock so its destructor may
        // use the registry.
        drop(freed);
        debug!(target: LogSource::Core.target(), "window {id:?} freed");
        true
    }

    /// Current strong count, 0 once reclaimed
    pub fn refcount(&self, id: WindowId) -> u32 {
        self.lock().get(id).map_or(0, |record| record.refcount)
    }

    /// Whether the id still resolves
    pub fn contains(&self, id: WindowId) -> bool {
        self.lock().contains_key(id)
    }

    /// Whether the id resolves to a window that has not been destroyed
    pub fn is_live(&self, id: WindowId) -> bool {
        self.lock()
            .get(id)
            .map_or(false, |record| !record.flags.contains(WindowFlags::DELETED))
    }

    /// Number of windows not yet reclaimed
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no window is registered
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Set the tombstone bit; `false` if already deleted or gone
    pub fn mark_deleted(&self, id: WindowId) -> bool {
        self.lock().get_mut(id).map_or(false, |record| {
            let first = !record.flags.contains(WindowFlags::DELETED);
            record.flags.insert(WindowFlags::DELETED);
            first
        })
    }

    /// Whether the window was destroyed; reclaimed windows count as deleted
    pub fn is_deleted(&self, id: WindowId) -> bool {
        self.flags(id).map_or(true, |flags| flags.contains(WindowFlags::DELETED))
    }

    /// Flags of a window
    pub fn flags(&self, id: WindowId) -> Option<WindowFlags> {
        self.lock().get(id).map(|record| record.flags)
    }

    /// Set flags on a window
    pub fn insert_flags(&self, id: WindowId, flags: WindowFlags) {
        if let Some(record) = self.lock().get_mut(id) {
            record.flags.insert(flags);
        }
    }

    /// Clear flags on a window
    pub fn remove_flags(&self, id: WindowId, flags: WindowFlags) {
        if let Some(record) = self.lock().get_mut(id) {
            record.flags.remove(flags);
        }
    }

    /// Cached framebuffer extent
    pub fn extent(&self, id: WindowId) -> Option<vk::Extent2D> {
        self.lock().get(id).map(|record| record.extent)
    }

    /// Update the cached framebuffer extent
    pub fn set_extent(&self, id: WindowId, extent: vk::Extent2D) {
        if let Some(record) = self.lock().get_mut(id) {
            record.extent = extent;
        }
    }

    /// Pointer mode last requested for the window
    pub fn pointer_mode(&self, id: WindowId) -> Option<PointerMode> {
        self.lock().get(id).map(|record| record.pointer_mode)
    }

    /// Record the requested pointer mode
    pub fn set_pointer_mode(&self, id: WindowId, mode: PointerMode) {
        if let Some(record) = self.lock().get_mut(id) {
            record.pointer_mode = mode;
        }
    }

    /// Application data of the window
    pub fn user_data(&self, id: WindowId) -> Option<UserData> {
        self.lock().get(id).and_then(|record| record.user_data.clone())
    }

    /// Attach application data, returning the previous value
    pub fn set_user_data(&self, id: WindowId, data: Option<UserData>) -> Option<UserData> {
        self.lock()
            .get_mut(id)
            .and_then(|record| std::mem::replace(&mut record.user_data, data))
    }

    /// Run `f` on the backend data of a window
    ///
    /// Returns `None` if the window is gone, has no backend data, or the data
    /// is not a `T`. The registry lock is held while `f` runs, so `f` must
    /// not call back into the registry.
    pub fn with_backend_data<T: 'static, R>(
        &self,
        id: WindowId,
        f: impl FnOnce(&mut T) -> R,
    ) -> Option<R> {
        let mut windows = self.lock();
        let data = windows.get_mut(id)?.backend_data.as_mut()?;
        data.downcast_mut::<T>().map(f)
    }

    /// Replace the backend data of a window, returning the old value
    pub fn set_backend_data(&self, id: WindowId, data: Option<BackendData>) -> Option<BackendData> {
        self.lock()
            .get_mut(id)
            .and_then(|record| std::mem::replace(&mut record.backend_data, data))
    }

    /// Ids of every registered window
    pub fn ids(&self) -> Vec<WindowId> {
        self.lock().keys().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const EXTENT: vk::Extent2D = vk::Extent2D { width: 640, height: 480 };

    struct FreeCounter(Arc<AtomicUsize>);

    impl Drop for FreeCounter {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_freed_only_at_zero() {
        let frees = Arc::new(AtomicUsize::new(0));
        let registry = WindowRegistry::new();
        let id = registry.insert(EXTENT, Some(Box::new(FreeCounter(frees.clone()))));

        assert!(registry.ref_window(id));
        assert_eq!(registry.refcount(id), 2);

        assert!(!registry.unref_window(id));
        assert_eq!(frees.load(Ordering::SeqCst), 0);
        assert!(registry.contains(id));

        assert!(registry.unref_window(id));
        assert_eq!(frees.load(Ordering::SeqCst), 1);
        assert!(!registry.contains(id));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_deleted_window_lingers_while_referenced() {
        let registry = WindowRegistry::new();
        let id = registry.insert(EXTENT, None);
        registry.ref_window(id);

        assert!(registry.mark_deleted(id));
        assert!(!registry.mark_deleted(id));
        registry.unref_window(id);

        assert!(registry.contains(id));
        assert!(registry.is_deleted(id));
        assert!(!registry.is_live(id));

        registry.unref_window(id);
        assert!(registry.is_deleted(id));
        assert!(!registry.ref_window(id));
    }

    #[test]
    fn test_stale_id_does_not_alias() {
        let registry = WindowRegistry::new();
        let old = registry.insert(EXTENT, None);
        registry.unref_window(old);
        let new = registry.insert(EXTENT, None);

        assert_ne!(old, new);
        assert!(!registry.contains(old));
        assert!(!registry.unref_window(old));
        assert_eq!(registry.refcount(new), 1);
    }

    #[test]
    fn test_flags_and_extent() {
        let registry = WindowRegistry::new();
        let id = registry.insert(EXTENT, None);

        registry.insert_flags(id, WindowFlags::TEXT_INPUT_ENABLED);
        assert_eq!(registry.flags(id), Some(WindowFlags::TEXT_INPUT_ENABLED));
        registry.remove_flags(id, WindowFlags::TEXT_INPUT_ENABLED);
        assert_eq!(registry.flags(id), Some(WindowFlags::empty()));

        registry.set_extent(id, vk::Extent2D { width: 800, height: 600 });
        assert_eq!(registry.extent(id), Some(vk::Extent2D { width: 800, height: 600 }));

        registry.set_pointer_mode(id, PointerMode::RELATIVE | PointerMode::HIDDEN);
        assert_eq!(registry.pointer_mode(id), Some(PointerMode::RELATIVE | PointerMode::HIDDEN));
    }

    #[test]
    fn test_user_and_backend_data() {
        let registry = WindowRegistry::new();
        let id = registry.insert(EXTENT, Some(Box::new(7_u32)));

        assert_eq!(registry.with_backend_data(id, |n: &mut u32| {
            *n += 1;
            *n
        }), Some(8));
        assert_eq!(registry.with_backend_data(id, |s: &mut String| s.len()), None);

        registry.set_user_data(id, Some(Arc::new("player one")));
        let data = registry.user_data(id).unwrap();
        assert_eq!(data.downcast_ref::<&str>(), Some(&"player one"));
        assert!(registry.set_user_data(id, None).is_some());
        assert!(registry.user_data(id).is_none());
    }
}
