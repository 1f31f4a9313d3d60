//! Keeps the outline centered on the pointer

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info};

use super::OverlaySync;
use crate::constants::overlay::TRACK_INTERVAL_MS;
use crate::x11_utils::CursorDriver;

pub struct OverlayTracker {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl OverlayTracker {
    pub fn spawn(
        overlay: Arc<OverlaySync>,
        cursor: Arc<dyn CursorDriver>,
        text_mode: Arc<AtomicBool>,
    ) -> Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let handle = thread::Builder::new()
            .name("overlay-tracker".to_string())
            .spawn(move || {
                info!("Overlay tracker started");
                while flag.load(Ordering::SeqCst) {
                    track_once(&overlay, cursor.as_ref(), &text_mode);
                    thread::sleep(Duration::from_millis(TRACK_INTERVAL_MS));
                }
            })
            .context("Failed to spawn overlay tracker thread")?;
        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
            info!("Overlay tracker stopped");
        }
    }
}

impl Drop for OverlayTracker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn track_once(overlay: &OverlaySync, cursor: &dyn CursorDriver, text_mode: &AtomicBool) {
    if !overlay.is_visible() {
        return;
    }
    if text_mode.load(Ordering::SeqCst) {
        overlay.hide();
        return;
    }
    let result = cursor
        .position()
        .and_then(|(x, y)| overlay.reposition_centered(x, y));
    if let Err(e) = result {
        debug!(error = %e, "Overlay tracking step failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::CaptureRegion;
    use crate::overlay::testing::{Counters, FakeBackend};

    struct FixedCursor(i32, i32);

    impl CursorDriver for FixedCursor {
        fn position(&self) -> Result<(i32, i32)> {
            Ok((self.0, self.1))
        }

        fn warp(&self, _x: i32, _y: i32) -> Result<()> {
            Ok(())
        }
    }

    fn overlay() -> (Arc<OverlaySync>, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        let region = CaptureRegion::new(100, 1.0).shared();
        (
            Arc::new(OverlaySync::new(Box::new(FakeBackend(counters.clone())), region)),
            counters,
        )
    }

    #[test]
    fn test_track_recenters_visible_overlay() {
        let (overlay, counters) = overlay();
        let text_mode = AtomicBool::new(false);

        track_once(&overlay, &FixedCursor(500, 400), &text_mode);
        assert_eq!(*counters.last_move.lock(), None);

        overlay.show().unwrap();
        track_once(&overlay, &FixedCursor(500, 400), &text_mode);
        assert_eq!(*counters.last_move.lock(), Some((400, 300)));
    }

    #[test]
    fn test_track_hides_in_text_mode() {
        let (overlay, _counters) = overlay();
        overlay.show().unwrap();
        track_once(&overlay, &FixedCursor(0, 0), &AtomicBool::new(true));
        assert!(!overlay.is_visible());
    }

    #[test]
    fn test_tracker_thread_stops() {
        let (overlay, counters) = overlay();
        overlay.show().unwrap();
        let mut tracker = OverlayTracker::spawn(
            overlay,
            Arc::new(FixedCursor(200, 200)),
            Arc::new(AtomicBool::new(false)),
        )
        .unwrap();
        thread::sleep(Duration::from_millis(50));
        tracker.stop();
        assert_eq!(*counters.last_move.lock(), Some((100, 100)));
    }
}
