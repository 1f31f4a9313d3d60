//! Central command dispatcher
//!
//! Keyboard bindings and the command channel both end up in
//! [`Controller::execute`]. The controller owns the mode flags and threshold,
//! and drives geometry, overlay, magnet, renderer and viewer in response.

use anyhow::{bail, Context, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::{DisplayMode, Persistence, Settings};
use crate::constants::{threshold, timing};
use crate::debounce::Debouncer;
use crate::geometry::{CaptureRegion, SharedRegion};
use crate::input::InputHandler;
use crate::ipc::{Command, Status, StatusSink};
use crate::magnet::{MagnetField, MagnetState};
use crate::overlay::selection::{self, AreaSelector};
use crate::overlay::{OverlayBackend, OverlaySync};
use crate::render::Renderer;
use crate::viewer::{TextSource, ViewerSync};
use crate::x11_utils::CursorDriver;

/// Collaborators the controller drives
pub struct Services {
    pub renderer: Box<dyn Renderer>,
    pub viewer: Box<dyn ViewerSync>,
    pub status: Box<dyn StatusSink>,
    pub selector: Box<dyn AreaSelector>,
    pub cursor: Arc<dyn CursorDriver>,
    pub persistence: Box<dyn Persistence>,
}

pub struct Controller {
    capture_mode: Arc<AtomicBool>,
    stopped: AtomicBool,
    text_mode: Arc<AtomicBool>,
    selecting: AtomicBool,
    threshold: AtomicI32,
    scroll_offset: AtomicI32,
    region: SharedRegion,
    overlay: Arc<OverlaySync>,
    magnet: Mutex<Option<MagnetField>>,
    text: Mutex<TextSource>,
    settings: Mutex<Settings>,
    debouncer: Debouncer,
    services: Services,
}

impl Controller {
    pub fn new(
        settings: Settings,
        overlay_backend: Box<dyn OverlayBackend>,
        text: TextSource,
        services: Services,
    ) -> Result<Arc<Self>> {
        let region = CaptureRegion::new(settings.half_width, settings.ratio).shared();
        let overlay = Arc::new(OverlaySync::new(overlay_backend, Arc::clone(&region)));

        Ok(Arc::new(Self {
            capture_mode: Arc::new(AtomicBool::new(true)),
            stopped: AtomicBool::new(false),
            text_mode: Arc::new(AtomicBool::new(settings.mode == DisplayMode::Text)),
            selecting: AtomicBool::new(false),
            threshold: AtomicI32::new(settings.threshold),
            scroll_offset: AtomicI32::new(0),
            region,
            overlay,
            magnet: Mutex::new(None),
            text: Mutex::new(text),
            settings: Mutex::new(settings),
            debouncer: Debouncer::new()?,
            services,
        }))
    }

    pub fn overlay(&self) -> Arc<OverlaySync> {
        Arc::clone(&self.overlay)
    }

    pub fn text_mode_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.text_mode)
    }

    /// Push the initial mode to the viewer and show the outline
    pub fn start(&self) -> Result<()> {
        self.sync_mode()
    }

    /// Run one command; failures are logged and never propagate to the caller
    pub fn execute(self: &Arc<Self>, command: Command) {
        debug!(command = %command, "Executing command");
        if let Err(e) = self.dispatch(&command) {
            error!(command = %command, error = ?e, "Command failed");
        }
    }

    fn dispatch(self: &Arc<Self>, command: &Command) -> Result<()> {
        match command {
            Command::ThreshUp => self.adjust_threshold(|t| t + threshold::STEP),
            Command::ThreshDown => self.adjust_threshold(|t| t - threshold::STEP),
            Command::ThreshToggle => self.adjust_threshold(|t| {
                if t > threshold::TOGGLE_PIVOT {
                    threshold::TOGGLE_LOW
                } else {
                    threshold::TOGGLE_HIGH
                }
            }),
            Command::SizeUp => self.adjust_region(|r| r.expand(None)),
            Command::SizeDown => self.adjust_region(|r| r.shrink(None)),
            Command::RatioUp => self.adjust_region(CaptureRegion::expand_ratio),
            Command::RatioDown => self.adjust_region(CaptureRegion::shrink_ratio),
            Command::ToggleCapture => self.toggle_capture(),
            Command::ToggleStop => self.toggle_stop(),
            Command::ToggleMode => self.toggle_mode(),
            Command::Refresh => {
                self.schedule_refresh();
                Ok(())
            }
            Command::SelectArea => self.select_area(),
            Command::GetThresh => {
                self.report(Status::Threshold(self.threshold()));
                Ok(())
            }
            Command::GetSize => {
                let region = self.region();
                self.report(Status::Size {
                    half_width: region.half_width(),
                    half_height: region.half_height(),
                });
                Ok(())
            }
            Command::GetRatio => {
                self.report(Status::Ratio(self.region().ratio()));
                Ok(())
            }
            Command::StartMagnet => self.start_magnet(None),
            Command::StopMagnet => {
                self.stop_magnet();
                Ok(())
            }
            Command::AddMagnet => self.add_magnet(),
            Command::RotateMagnet => {
                self.with_magnet(MagnetField::rotate_positions);
                Ok(())
            }
            Command::ClearMagnet => {
                self.with_magnet(MagnetField::clear_positions);
                Ok(())
            }
            Command::ToggleMagnet => self.toggle_magnet(),
            Command::ScrollUp => self.move_scroll(-1),
            Command::ScrollDown => self.move_scroll(1),
            Command::MagnetPreset(name) => self.load_preset(name),
        }
    }

    pub fn threshold(&self) -> i32 {
        self.threshold.load(Ordering::SeqCst)
    }

    pub fn region(&self) -> CaptureRegion {
        *self.region.read()
    }

    fn report(&self, status: Status) {
        self.services.status.send(&status);
    }

    /// Geometry and threshold only change while actively capturing images
    fn can_adjust(&self) -> bool {
        !self.stopped.load(Ordering::SeqCst)
            && !self.text_mode.load(Ordering::SeqCst)
            && self.capture_mode.load(Ordering::SeqCst)
    }

    fn persist(&self, update: impl FnOnce(&mut Settings)) {
        let mut settings = self.settings.lock();
        update(&mut settings);
        if let Err(e) = self.services.persistence.save(&settings) {
            warn!(error = ?e, "Failed to save settings");
        }
    }

    fn persist_region(&self) {
        let region = self.region();
        self.persist(|s| {
            s.half_width = region.half_width();
            s.ratio = region.ratio();
        });
    }

    fn adjust_threshold(&self, update: impl FnOnce(i32) -> i32) -> Result<()> {
        if !self.can_adjust() {
            debug!("Threshold change refused");
            return Ok(());
        }
        let value = update(self.threshold());
        self.threshold.store(value, Ordering::SeqCst);
        info!(threshold = value, "Threshold changed");

        self.report(Status::Threshold(value));
        self.persist(|s| s.threshold = value);

        if !self.services.renderer.rebinarize(value)? {
            self.capture_at_cursor()?;
        }
        Ok(())
    }

    fn adjust_region(&self, update: impl FnOnce(&mut CaptureRegion)) -> Result<()> {
        if !self.can_adjust() {
            debug!("Region change refused");
            return Ok(());
        }
        let region = {
            let mut region = self.region.write();
            update(&mut region);
            *region
        };
        info!(
            half_width = region.half_width(),
            half_height = region.half_height(),
            ratio = region.ratio(),
            "Capture region changed"
        );
        self.persist_region();
        self.overlay.update_size()
    }

    fn toggle_capture(&self) -> Result<()> {
        if self.stopped.load(Ordering::SeqCst) {
            debug!("Capture toggle refused while stopped");
            return Ok(());
        }
        let capturing = !self.capture_mode.fetch_xor(true, Ordering::SeqCst);
        info!(capturing, "Capture mode toggled");
        self.refresh_overlay_visibility()
    }

    fn toggle_stop(&self) -> Result<()> {
        let stopped = !self.stopped.fetch_xor(true, Ordering::SeqCst);
        self.capture_mode.store(!stopped, Ordering::SeqCst);
        info!(stopped, "Stop toggled");
        self.refresh_overlay_visibility()
    }

    fn toggle_mode(&self) -> Result<()> {
        let text = !self.text_mode.fetch_xor(true, Ordering::SeqCst);
        if !self.capture_mode.load(Ordering::SeqCst) {
            self.toggle_capture()?;
        }
        let mode = if text { DisplayMode::Text } else { DisplayMode::Image };
        info!(mode = mode.as_str(), "Display mode toggled");
        self.persist(|s| s.mode = mode);
        self.sync_mode()
    }

    fn display_mode(&self) -> DisplayMode {
        if self.text_mode.load(Ordering::SeqCst) {
            DisplayMode::Text
        } else {
            DisplayMode::Image
        }
    }

    /// Write the mode and scroll files and put the outline in the right state
    fn sync_mode(&self) -> Result<()> {
        let mode = self.display_mode();
        let viewer = &self.services.viewer;
        viewer.write_mode(mode)?;
        viewer.write_scroll_offset(self.scroll_offset.load(Ordering::SeqCst))?;
        if mode == DisplayMode::Text {
            viewer.write_content(&self.text.lock().current())?;
        }
        self.refresh_overlay_visibility()
    }

    /// The outline is visible exactly when capturing images
    fn refresh_overlay_visibility(&self) -> Result<()> {
        let visible = self.capture_mode.load(Ordering::SeqCst)
            && !self.stopped.load(Ordering::SeqCst)
            && !self.text_mode.load(Ordering::SeqCst);
        if visible {
            self.overlay.show()
        } else {
            self.overlay.hide();
            Ok(())
        }
    }

    fn move_scroll(&self, delta: i32) -> Result<()> {
        let offset = (self.scroll_offset.load(Ordering::SeqCst) + delta).max(0);
        self.scroll_offset.store(offset, Ordering::SeqCst);
        self.services.viewer.write_scroll_offset(offset)
    }

    fn weak(self: &Arc<Self>) -> Weak<Self> {
        Arc::downgrade(self)
    }

    fn schedule_refresh(self: &Arc<Self>) {
        let this = self.weak();
        self.debouncer.schedule(
            "refresh",
            Duration::from_millis(timing::REFRESH_DEBOUNCE_MS),
            move || {
                if let Some(this) = this.upgrade() {
                    if let Err(e) = this.run_refresh() {
                        error!(error = ?e, "Refresh failed");
                    }
                }
            },
        );
    }

    fn run_refresh(&self) -> Result<()> {
        self.services.renderer.flash()?;
        if self.text_mode.load(Ordering::SeqCst) {
            self.sync_mode()?;
        }
        Ok(())
    }

    fn capture_at_cursor(&self) -> Result<()> {
        let center = self.services.cursor.position()?;
        let region = self.region();
        self.services.renderer.capture_binarized(
            center,
            (region.half_width(), region.half_height()),
            self.threshold(),
        )
    }

    fn select_area(self: &Arc<Self>) -> Result<()> {
        if self.selecting.swap(true, Ordering::SeqCst) {
            info!("Area selection already in progress");
            return Ok(());
        }
        let this = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name("selection".to_string())
            .spawn(move || {
                // The magnet must not drag the pointer mid-drag
                let paused_here = this.magnet.lock().as_ref().is_some_and(|field| {
                    if field.is_paused() {
                        false
                    } else {
                        field.pause();
                        true
                    }
                });
                match selection::select_area(&this.overlay, this.services.selector.as_ref()) {
                    Ok(true) => this.persist_region(),
                    Ok(false) => {}
                    Err(e) => error!(error = ?e, "Area selection failed"),
                }
                if paused_here {
                    this.with_magnet(MagnetField::resume);
                }
                this.selecting.store(false, Ordering::SeqCst);
            });
        if let Err(e) = spawned {
            self.selecting.store(false, Ordering::SeqCst);
            return Err(e).context("Failed to spawn selection thread");
        }
        Ok(())
    }

    fn start_magnet(&self, positions: Option<Vec<i32>>) -> Result<()> {
        let mut slot = self.magnet.lock();
        if slot.is_some() {
            info!("Magnet already running");
            return Ok(());
        }
        let settings = self.settings.lock();
        let positions = match positions {
            Some(positions) => positions,
            None if !settings.magnet.positions.is_empty() => settings.magnet.positions.clone(),
            None => vec![self.services.cursor.position()?.0],
        };
        let field = MagnetField::start(
            MagnetState::new(&settings.magnet, positions),
            Duration::from_millis(settings.magnet.tick_ms),
            Arc::clone(&self.services.cursor),
            Arc::clone(&self.capture_mode),
        )?;
        *slot = Some(field);
        Ok(())
    }

    fn stop_magnet(&self) {
        // Dropping the field joins its thread
        let field = self.magnet.lock().take();
        if field.is_none() {
            debug!("Magnet not running");
        }
    }

    fn with_magnet(&self, action: impl FnOnce(&MagnetField)) -> bool {
        match self.magnet.lock().as_ref() {
            Some(field) => {
                action(field);
                true
            }
            None => {
                debug!("Magnet not running");
                false
            }
        }
    }

    fn add_magnet(&self) -> Result<()> {
        let x = self.services.cursor.position()?.0;
        if !self.with_magnet(|field| field.add_position(x)) {
            self.start_magnet(Some(vec![x]))?;
        }
        Ok(())
    }

    fn toggle_magnet(&self) -> Result<()> {
        if !self.with_magnet(|field| {
            field.toggle_pause();
        }) {
            self.start_magnet(None)?;
        }
        Ok(())
    }

    fn load_preset(&self, name: &str) -> Result<()> {
        let Some(preset) = self.settings.lock().magnet.presets.get(name).cloned() else {
            bail!("Unknown magnet preset '{}'", name);
        };

        let loaded = self
            .magnet
            .lock()
            .as_ref()
            .map(|field| field.load_preset(name, &preset));
        let (width, height) = match loaded {
            Some(frame) => frame,
            None => {
                self.start_magnet(Some(preset.positions.clone()))?;
                (preset.frame_size[0], preset.frame_size[1])
            }
        };
        {
            let mut region = self.region.write();
            region.set_width((width / 2) as i32);
            region.set_height((height / 2) as i32);
        }
        self.stopped.store(false, Ordering::SeqCst);
        self.capture_mode.store(true, Ordering::SeqCst);
        info!(preset = %name, width, height, "Preset applied");

        self.persist_region();
        if self.overlay.is_visible() {
            self.overlay.update_size()
        } else {
            self.refresh_overlay_visibility()
        }
    }

    /// Stop background work owned by the controller
    pub fn shutdown(&self) {
        self.stop_magnet();
        self.overlay.hide();
    }
}

impl InputHandler for Arc<Controller> {
    fn on_command(&self, command: Command) {
        self.execute(command);
    }

    fn on_click(&self) {
        if !self.capture_mode.load(Ordering::SeqCst) || self.text_mode.load(Ordering::SeqCst) {
            return;
        }
        let this = self.weak();
        self.debouncer.schedule(
            "capture",
            Duration::from_millis(timing::CAPTURE_DEBOUNCE_MS),
            move || {
                let Some(this) = this.upgrade() else {
                    return;
                };
                let result = this
                    .capture_at_cursor()
                    .and_then(|()| this.services.renderer.flash());
                if let Err(e) = result {
                    error!(error = ?e, "Click capture failed");
                }
            },
        );
    }

    fn on_scroll(&self, delta: i32) {
        self.with_magnet(MagnetField::on_scroll);
        if !self.text_mode.load(Ordering::SeqCst) {
            return;
        }
        // Wheel up goes back a page
        let page = {
            let mut text = self.text.lock();
            text.turn(-delta).then(|| text.current())
        };
        if let Some(page) = page {
            self.scroll_offset.store(0, Ordering::SeqCst);
            let viewer = &self.services.viewer;
            let result = viewer
                .write_content(&page)
                .and_then(|()| viewer.write_scroll_offset(0));
            if let Err(e) = result {
                error!(error = ?e, "Failed to update text page");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::testing::fifo_paths;
    use crate::ipc::{CommandChannel, CommandListener};
    use crate::overlay::selection::Selection;
    use crate::overlay::testing::{Counters, FakeBackend};
    use crate::render::Frame;
    use std::fs::OpenOptions;
    use std::io::{Read, Write};
    use std::os::unix::fs::OpenOptionsExt;
    use std::sync::atomic::AtomicUsize;
    use std::sync::OnceLock;
    use std::time::Instant;

    #[derive(Default)]
    struct Recorder {
        statuses: Mutex<Vec<String>>,
        modes: Mutex<Vec<DisplayMode>>,
        scrolls: Mutex<Vec<i32>>,
        contents: Mutex<Vec<String>>,
        rebinarized: Mutex<Vec<i32>>,
        captures: Mutex<Vec<((i32, i32), (i32, i32), i32)>>,
        flashes: AtomicUsize,
        saves: Mutex<Vec<Settings>>,
        warps: Mutex<Vec<(i32, i32)>>,
    }

    struct Fake(Arc<Recorder>);

    impl Renderer for Fake {
        fn capture_binarized(&self, center: (i32, i32), half: (i32, i32), threshold: i32) -> Result<()> {
            self.0.captures.lock().push((center, half, threshold));
            Ok(())
        }

        fn rebinarize(&self, threshold: i32) -> Result<bool> {
            self.0.rebinarized.lock().push(threshold);
            Ok(!self.0.captures.lock().is_empty())
        }

        fn display(&self, _frame: &Frame) -> Result<()> {
            Ok(())
        }

        fn flash(&self) -> Result<()> {
            self.0.flashes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    impl ViewerSync for Fake {
        fn write_mode(&self, mode: DisplayMode) -> Result<()> {
            self.0.modes.lock().push(mode);
            Ok(())
        }

        fn write_scroll_offset(&self, offset: i32) -> Result<()> {
            self.0.scrolls.lock().push(offset);
            Ok(())
        }

        fn write_content(&self, text: &str) -> Result<()> {
            self.0.contents.lock().push(text.to_string());
            Ok(())
        }
    }

    impl StatusSink for Fake {
        fn send(&self, status: &Status) {
            self.0.statuses.lock().push(status.to_string());
        }
    }

    impl Persistence for Fake {
        fn save(&self, settings: &Settings) -> Result<()> {
            self.0.saves.lock().push(settings.clone());
            Ok(())
        }
    }

    impl CursorDriver for Fake {
        fn position(&self) -> Result<(i32, i32)> {
            Ok((1234, 500))
        }

        fn warp(&self, x: i32, y: i32) -> Result<()> {
            self.0.warps.lock().push((x, y));
            Ok(())
        }
    }

    struct FixedSelection(Option<Selection>);

    impl AreaSelector for FixedSelection {
        fn select(&self) -> Result<Option<Selection>> {
            Ok(self.0)
        }
    }

    /// Records whether the magnet was paused while the user was selecting
    struct MagnetWatchingSelection {
        controller: Arc<OnceLock<Weak<Controller>>>,
        seen_paused: Arc<Mutex<Option<bool>>>,
    }

    impl AreaSelector for MagnetWatchingSelection {
        fn select(&self) -> Result<Option<Selection>> {
            let paused = self
                .controller
                .get()
                .and_then(Weak::upgrade)
                .and_then(|c| c.magnet.lock().as_ref().map(MagnetField::is_paused));
            *self.seen_paused.lock() = paused;
            Ok(None)
        }
    }

    struct Harness {
        controller: Arc<Controller>,
        rec: Arc<Recorder>,
        overlay: Arc<Counters>,
    }

    fn harness_with(settings: Settings, text: &str, selection: Option<Selection>) -> Harness {
        build(settings, text, Box::new(FixedSelection(selection)), None)
    }

    fn build(
        settings: Settings,
        text: &str,
        selector: Box<dyn AreaSelector>,
        status: Option<Box<dyn StatusSink>>,
    ) -> Harness {
        let rec = Arc::new(Recorder::default());
        let overlay = Arc::new(Counters::default());
        let services = Services {
            renderer: Box::new(Fake(rec.clone())),
            viewer: Box::new(Fake(rec.clone())),
            status: status.unwrap_or_else(|| Box::new(Fake(rec.clone()))),
            selector,
            cursor: Arc::new(Fake(rec.clone())),
            persistence: Box::new(Fake(rec.clone())),
        };
        let controller = Controller::new(
            settings,
            Box::new(FakeBackend(overlay.clone())),
            TextSource::new(text),
            services,
        )
        .unwrap();
        controller.start().unwrap();
        Harness {
            controller,
            rec,
            overlay,
        }
    }

    fn harness() -> Harness {
        harness_with(Settings::default(), "", None)
    }

    fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_start_syncs_viewer_and_shows_overlay() {
        let h = harness();
        assert_eq!(*h.rec.modes.lock(), vec![DisplayMode::Image]);
        assert!(h.controller.overlay().is_visible());
        assert_eq!(h.overlay.created.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_thresh_up_then_get_thresh() {
        let h = harness();
        h.controller.execute(Command::ThreshUp);
        h.controller.execute(Command::GetThresh);

        assert_eq!(*h.rec.statuses.lock(), vec!["thresh:190", "thresh:190"]);
        assert_eq!(h.rec.saves.lock().last().unwrap().threshold, 190);
        // Nothing captured yet, so a fresh capture replaces rebinarization
        assert_eq!(h.rec.captures.lock()[0], ((1234, 500), (400, 333), 190));
    }

    #[test]
    fn test_thresh_toggle() {
        let h = harness();
        h.controller.execute(Command::ThreshToggle);
        assert_eq!(h.controller.threshold(), 120);
        h.controller.execute(Command::ThreshToggle);
        assert_eq!(h.controller.threshold(), 180);
    }

    #[test]
    fn test_size_up_refused_while_stopped() {
        let h = harness();
        h.controller.execute(Command::ToggleStop);
        assert!(!h.controller.overlay().is_visible());
        let before = h.controller.region();
        let created = h.overlay.created.load(Ordering::SeqCst);

        h.controller.execute(Command::SizeUp);
        h.controller.execute(Command::RatioDown);
        h.controller.execute(Command::ThreshUp);

        assert_eq!(h.controller.region(), before);
        assert_eq!(h.controller.threshold(), 180);
        assert_eq!(h.overlay.created.load(Ordering::SeqCst), created);
        assert!(h.rec.statuses.lock().is_empty());
    }

    #[test]
    fn test_size_up_resizes_overlay() {
        let h = harness();
        h.controller.execute(Command::SizeUp);
        h.controller.execute(Command::GetSize);

        assert_eq!(h.controller.region().half_width(), 410);
        assert_eq!(*h.overlay.last_size.lock(), (820, 682));
        assert_eq!(*h.rec.statuses.lock(), vec!["size:410x341"]);
        assert_eq!(h.rec.saves.lock().last().unwrap().half_width, 410);
    }

    #[test]
    fn test_ratio_commands() {
        let h = harness();
        h.controller.execute(Command::RatioUp);
        h.controller.execute(Command::GetRatio);
        assert_eq!(*h.rec.statuses.lock(), vec!["ratio:1.3"]);
    }

    #[test]
    fn test_toggle_capture_refused_while_stopped() {
        let h = harness();
        h.controller.execute(Command::ToggleCapture);
        assert!(!h.controller.overlay().is_visible());
        h.controller.execute(Command::ToggleCapture);
        assert!(h.controller.overlay().is_visible());

        h.controller.execute(Command::ToggleStop);
        h.controller.execute(Command::ToggleCapture);
        assert!(!h.controller.overlay().is_visible());

        h.controller.execute(Command::ToggleStop);
        assert!(h.controller.overlay().is_visible());
    }

    #[test]
    fn test_text_mode_hides_overlay_and_pages_on_scroll() {
        let text = format!("{}{}", "a".repeat(260), "second page");
        let h = harness_with(Settings::default(), &text, None);

        h.controller.execute(Command::ToggleMode);
        assert!(!h.controller.overlay().is_visible());
        assert_eq!(*h.rec.modes.lock(), vec![DisplayMode::Image, DisplayMode::Text]);
        assert_eq!(h.rec.saves.lock().last().unwrap().mode, DisplayMode::Text);
        assert_eq!(h.rec.contents.lock().last().unwrap(), &"a".repeat(260));

        // Size changes don't apply in text mode
        h.controller.execute(Command::SizeUp);
        assert_eq!(h.controller.region().half_width(), 400);

        h.controller.on_scroll(-1);
        assert_eq!(h.rec.contents.lock().last().unwrap(), "second page");
        h.controller.on_scroll(-1);
        assert_eq!(h.rec.contents.lock().len(), 2);

        h.controller.execute(Command::ToggleMode);
        assert!(h.controller.overlay().is_visible());
    }

    #[test]
    fn test_scroll_offset_never_negative() {
        let h = harness();
        h.controller.execute(Command::ScrollUp);
        h.controller.execute(Command::ScrollDown);
        h.controller.execute(Command::ScrollDown);
        assert_eq!(*h.rec.scrolls.lock(), vec![0, 0, 1, 2]);
    }

    #[test]
    fn test_refresh_is_debounced() {
        let h = harness();
        for _ in 0..3 {
            h.controller.execute(Command::Refresh);
        }
        assert!(wait_for(|| h.rec.flashes.load(Ordering::SeqCst) == 1));
        thread::sleep(Duration::from_millis(100));
        assert_eq!(h.rec.flashes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_click_captures_then_flashes() {
        let h = harness();
        h.controller.on_click();
        assert!(wait_for(|| h.rec.flashes.load(Ordering::SeqCst) == 1));
        assert_eq!(h.rec.captures.lock().len(), 1);

        h.controller.execute(Command::ToggleCapture);
        h.controller.on_click();
        thread::sleep(Duration::from_millis(100));
        assert_eq!(h.rec.captures.lock().len(), 1);
    }

    #[test]
    fn test_select_area_updates_region() {
        let selection = Some(Selection { x: 0, y: 0, width: 600, height: 400 });
        let h = harness_with(Settings::default(), "", selection);

        h.controller.execute(Command::SelectArea);
        assert!(wait_for(|| h.controller.region().half_width() == 300));
        assert!(wait_for(|| !h.controller.selecting.load(Ordering::SeqCst)));
        assert_eq!(h.controller.region().half_height(), 200);
        assert!(h.controller.overlay().is_visible());
        assert_eq!(h.rec.saves.lock().last().unwrap().ratio, 1.5);
    }

    #[test]
    fn test_magnet_lifecycle() {
        let h = harness();
        h.controller.execute(Command::RotateMagnet);
        assert!(h.controller.magnet.lock().is_none());

        // No configured positions: the cursor's X becomes the attractor
        h.controller.execute(Command::StartMagnet);
        assert_eq!(h.controller.magnet.lock().as_ref().unwrap().positions(), vec![1234]);

        h.controller.execute(Command::StopMagnet);
        assert!(h.controller.magnet.lock().is_none());

        h.controller.execute(Command::AddMagnet);
        assert_eq!(h.controller.magnet.lock().as_ref().unwrap().positions(), vec![1234]);
        h.controller.execute(Command::ClearMagnet);
        assert!(h.controller.magnet.lock().as_ref().unwrap().positions().is_empty());
        h.controller.shutdown();
        assert!(h.controller.magnet.lock().is_none());
    }

    #[test]
    fn test_preset_applies_frame_and_clears_stop() {
        let h = harness();
        h.controller.execute(Command::ToggleStop);
        h.controller.execute(Command::MagnetPreset("thomas".to_string()));

        let region = h.controller.region();
        assert_eq!((region.half_width(), region.half_height()), (404, 252));
        assert!(!h.controller.stopped.load(Ordering::SeqCst));
        assert!(h.controller.capture_mode.load(Ordering::SeqCst));
        assert!(h.controller.overlay().is_visible());
        assert_eq!(
            h.controller.magnet.lock().as_ref().unwrap().positions(),
            vec![2106, 2204]
        );
        h.controller.shutdown();
    }

    #[test]
    fn test_command_channel_round_trip() {
        let (control, status) = fifo_paths("controller");
        let channel = CommandChannel::create(control.clone(), status.clone()).unwrap();
        let h = build(
            Settings::default(),
            "",
            Box::new(FixedSelection(None)),
            Some(Box::new(channel.status_writer())),
        );

        let mut reader = OpenOptions::new()
            .read(true)
            .custom_flags(nix::libc::O_NONBLOCK)
            .open(&status)
            .unwrap();
        let mut listener = {
            let controller = Arc::clone(&h.controller);
            CommandListener::spawn(channel.control_path().to_path_buf(), move |command| {
                controller.execute(command);
            })
            .unwrap()
        };

        let mut writer = OpenOptions::new().write(true).open(&control).unwrap();
        writer.write_all(b"thresh_up\nget_thresh\n").unwrap();
        drop(writer);

        // Both the change itself and the query report the new value
        let mut received = String::new();
        let mut buf = [0u8; 64];
        let complete = wait_for(|| {
            if let Ok(n) = reader.read(&mut buf) {
                received.push_str(&String::from_utf8_lossy(&buf[..n]));
            }
            received.len() >= "thresh:190\nthresh:190\n".len()
        });
        listener.stop();

        assert!(complete, "status so far: {:?}", received);
        assert_eq!(received, "thresh:190\nthresh:190\n");
        assert_eq!(h.controller.threshold(), 190);
    }

    #[test]
    fn test_selection_pauses_running_magnet() {
        let target = Arc::new(OnceLock::new());
        let seen_paused = Arc::new(Mutex::new(None));
        let h = build(
            Settings::default(),
            "",
            Box::new(MagnetWatchingSelection {
                controller: Arc::clone(&target),
                seen_paused: Arc::clone(&seen_paused),
            }),
            None,
        );
        let _ = target.set(Arc::downgrade(&h.controller));

        h.controller.execute(Command::StartMagnet);
        h.controller.execute(Command::SelectArea);
        assert!(wait_for(|| seen_paused.lock().is_some()));
        assert_eq!(*seen_paused.lock(), Some(true));
        assert!(wait_for(|| !h.controller.selecting.load(Ordering::SeqCst)));
        assert!(!h.controller.magnet.lock().as_ref().unwrap().is_paused());

        // A magnet the user paused stays paused afterwards
        h.controller.execute(Command::ToggleMagnet);
        h.controller.execute(Command::SelectArea);
        assert!(wait_for(|| !h.controller.selecting.load(Ordering::SeqCst)));
        assert!(h.controller.magnet.lock().as_ref().unwrap().is_paused());
        h.controller.shutdown();
    }

    #[test]
    fn test_unknown_preset_changes_nothing() {
        let h = harness();
        let before = h.controller.region();
        h.controller.execute(Command::MagnetPreset("nope".to_string()));
        assert_eq!(h.controller.region(), before);
        assert!(h.controller.magnet.lock().is_none());
    }
}
