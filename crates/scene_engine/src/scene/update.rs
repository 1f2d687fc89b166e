//! Phase gate between the application thread and the render threads
//!
//! Structural writes to live nodes are valid only while the update window is
//! open; picking is valid only while the picking window is open. Cull and
//! render run outside both windows, after the update has been published.
//! Every write or pick on a live node asks the scene's [`UpdateHandler`]
//! first and fails with a timing error instead of racing.

use std::sync::atomic::{AtomicBool, Ordering};

/// Grants or denies writes and picks on live nodes
pub trait UpdateHandler: Send + Sync {
    /// Whether child lists, transforms and node data may change
    fn is_data_write_permitted(&self) -> bool;

    /// Whether bounds may be set or invalidated
    fn is_bounds_write_permitted(&self) -> bool;

    /// Whether pick requests may run
    fn is_picking_permitted(&self) -> bool;
}

/// Update handler driven by the pipeline manager
///
/// The manager opens the update window around the application's update
/// callback and the picking window around pick requests. The windows are
/// plain flags; exclusion between writers and readers comes from the scene
/// lock the manager holds while a window is open.
#[derive(Debug, Default)]
pub struct UpdatePhase {
    update_open: AtomicBool,
    picking_open: AtomicBool,
}

impl UpdatePhase {
    /// Create a gate with both windows closed
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the update window
    pub fn begin_update(&self) {
        self.update_open.store(true, Ordering::Release);
    }

    /// Close the update window
    pub fn end_update(&self) {
        self.update_open.store(false, Ordering::Release);
    }

    /// Open the picking window
    pub fn begin_picking(&self) {
        self.picking_open.store(true, Ordering::Release);
    }

    /// Close the picking window
    pub fn end_picking(&self) {
        self.picking_open.store(false, Ordering::Release);
    }

    /// Run `f` with the update window open, closing it afterwards even if
    /// `f` returns early
    pub fn with_update<R>(&self, f: impl FnOnce() -> R) -> R {
        let _window = WindowGuard::open(&self.update_open);
        f()
    }

    /// Run `f` with the picking window open
    pub fn with_picking<R>(&self, f: impl FnOnce() -> R) -> R {
        let _window = WindowGuard::open(&self.picking_open);
        f()
    }
}

impl UpdateHandler for UpdatePhase {
    fn is_data_write_permitted(&self) -> bool {
        self.update_open.load(Ordering::Acquire)
    }

    fn is_bounds_write_permitted(&self) -> bool {
        self.update_open.load(Ordering::Acquire)
    }

    fn is_picking_permitted(&self) -> bool {
        self.picking_open.load(Ordering::Acquire)
    }
}

/// Closes a window flag when dropped
struct WindowGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> WindowGuard<'a> {
    fn open(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self { flag }
    }
}

impl Drop for WindowGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_windows_start_closed() {
        let phase = UpdatePhase::new();
        assert!(!phase.is_data_write_permitted());
        assert!(!phase.is_bounds_write_permitted());
        assert!(!phase.is_picking_permitted());
    }

    #[test]
    fn test_scoped_windows_close_on_exit() {
        let phase = UpdatePhase::new();
        let inside = phase.with_update(|| phase.is_data_write_permitted() && !phase.is_picking_permitted());
        assert!(inside);
        assert!(!phase.is_data_write_permitted());

        let picking = phase.with_picking(|| phase.is_picking_permitted());
        assert!(picking);
        assert!(!phase.is_picking_permitted());
    }
}
