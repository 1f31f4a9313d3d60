//! On-screen outline of the capture region
//!
//! At most one outline window exists at a time. Creation and destruction go
//! through a single mutex-guarded slot, so concurrent show/hide/update calls
//! from the key listener, the command channel and the tracker never leak or
//! double-destroy a window.

pub mod outline;
pub mod selection;
pub mod tracker;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::geometry::SharedRegion;

/// Creates outline windows of a given full size
pub trait OverlayBackend: Send + Sync {
    fn create(&self, width: u32, height: u32) -> Result<Box<dyn OverlayWindow>>;
}

pub trait OverlayWindow: Send {
    /// Move the window's top-left corner
    fn move_to(&mut self, x: i32, y: i32) -> Result<()>;
    fn destroy(self: Box<Self>) -> Result<()>;
}

pub struct OverlaySync {
    backend: Box<dyn OverlayBackend>,
    region: SharedRegion,
    window: Mutex<Option<Box<dyn OverlayWindow>>>,
}

impl OverlaySync {
    pub fn new(backend: Box<dyn OverlayBackend>, region: SharedRegion) -> Self {
        Self {
            backend,
            region,
            window: Mutex::new(None),
        }
    }

    pub fn region(&self) -> &SharedRegion {
        &self.region
    }

    pub fn is_visible(&self) -> bool {
        self.window.lock().is_some()
    }

    /// Create the outline if none exists
    pub fn show(&self) -> Result<()> {
        let mut slot = self.window.lock();
        if slot.is_some() {
            debug!("Overlay already visible");
            return Ok(());
        }
        let (width, height) = self.region.read().outline_size();
        let window = self
            .backend
            .create(width, height)
            .with_context(|| format!("Failed to create {}x{} overlay", width, height))?;
        *slot = Some(window);
        info!(width, height, "Overlay shown");
        Ok(())
    }

    /// Destroy the outline if present. Never fails.
    pub fn hide(&self) {
        let taken = self.window.lock().take();
        if let Some(window) = taken {
            match window.destroy() {
                Ok(()) => info!("Overlay hidden"),
                Err(e) => error!(error = ?e, "Failed to destroy overlay window"),
            }
        }
    }

    /// Recreate the outline at the current region size
    pub fn update_size(&self) -> Result<()> {
        self.hide();
        self.show()
    }

    /// Center the live outline on a point; no-op when hidden
    pub fn reposition_centered(&self, cx: i32, cy: i32) -> Result<()> {
        let mut slot = self.window.lock();
        if let Some(window) = slot.as_mut() {
            let (width, height) = self.region.read().outline_size();
            window.move_to(cx - (width / 2) as i32, cy - (height / 2) as i32)?;
        }
        Ok(())
    }
}

impl Drop for OverlaySync {
    fn drop(&mut self) {
        self.hide();
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory overlay backend shared by the overlay and controller tests

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    pub struct Counters {
        pub created: AtomicUsize,
        pub destroyed: AtomicUsize,
        pub last_size: Mutex<(u32, u32)>,
        pub last_move: Mutex<Option<(i32, i32)>>,
    }

    pub struct FakeBackend(pub Arc<Counters>);

    struct FakeWindow(Arc<Counters>);

    impl OverlayBackend for FakeBackend {
        fn create(&self, width: u32, height: u32) -> Result<Box<dyn OverlayWindow>> {
            self.0.created.fetch_add(1, Ordering::SeqCst);
            *self.0.last_size.lock() = (width, height);
            Ok(Box::new(FakeWindow(Arc::clone(&self.0))))
        }
    }

    impl OverlayWindow for FakeWindow {
        fn move_to(&mut self, x: i32, y: i32) -> Result<()> {
            *self.0.last_move.lock() = Some((x, y));
            Ok(())
        }

        fn destroy(self: Box<Self>) -> Result<()> {
            self.0.destroyed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }
}
