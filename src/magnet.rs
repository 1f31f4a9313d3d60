//! Cursor magnet
//!
//! A background loop that pulls the pointer's X coordinate toward the active
//! attractor (the first configured position). Used to keep the capture region
//! locked onto a text column while reading.

use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

use crate::config::{MagnetPreset, MagnetSettings};
use crate::constants::magnet::FORCE_GAIN;
use crate::x11_utils::CursorDriver;

#[derive(Debug, Clone)]
pub struct MagnetState {
    positions: Vec<i32>,
    radius: i32,
    force_strength: f64,
    dead_zone: i32,
    scroll_pause: Duration,
    paused: bool,
    last_scroll: Option<Instant>,
}

impl MagnetState {
    pub fn new(settings: &MagnetSettings, positions: Vec<i32>) -> Self {
        let mut state = Self {
            positions: Vec::new(),
            radius: settings.radius,
            force_strength: settings.force_strength.clamp(0.0, 1.0),
            dead_zone: settings.dead_zone,
            scroll_pause: Duration::from_millis(settings.scroll_pause_ms),
            paused: false,
            last_scroll: None,
        };
        for x in positions {
            state.add_position(x);
        }
        state
    }

    pub fn positions(&self) -> &[i32] {
        &self.positions
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Returns false if `x` was already an attractor
    pub fn add_position(&mut self, x: i32) -> bool {
        if self.positions.contains(&x) {
            return false;
        }
        self.positions.push(x);
        true
    }

    /// Move the active attractor to the back
    pub fn rotate(&mut self) {
        if self.positions.len() >= 2 {
            self.positions.rotate_left(1);
        }
    }

    pub fn clear(&mut self) {
        self.positions.clear();
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn note_scroll(&mut self, now: Instant) {
        self.last_scroll = Some(now);
    }

    pub fn replace_positions(&mut self, positions: &[i32]) {
        self.positions.clear();
        for &x in positions {
            self.add_position(x);
        }
    }

    /// Where the pointer at `x` should be moved, or `None` to leave it alone
    pub fn target_x(&self, x: i32, now: Instant) -> Option<i32> {
        if self.paused {
            return None;
        }
        let magnet = *self.positions.first()?;
        if let Some(last) = self.last_scroll {
            if now.saturating_duration_since(last) < self.scroll_pause {
                return None;
            }
        }

        let distance = (x - magnet).abs();
        let target = if distance < self.dead_zone {
            magnet
        } else if distance < self.radius {
            let falloff = (self.radius - distance) as f64 / self.radius as f64;
            // Capped so one step never overshoots the attractor
            let force = (self.force_strength * falloff * FORCE_GAIN).min(1.0);
            (x as f64 + (magnet - x) as f64 * force).round() as i32
        } else {
            return None;
        };

        (target != x).then_some(target)
    }
}

/// Running magnet loop plus its shared state
pub struct MagnetField {
    state: Arc<Mutex<MagnetState>>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl MagnetField {
    /// Spawn the loop. It only acts while `active` is set.
    pub fn start(
        state: MagnetState,
        tick: Duration,
        cursor: Arc<dyn CursorDriver>,
        active: Arc<AtomicBool>,
    ) -> Result<Self> {
        let state = Arc::new(Mutex::new(state));
        let running = Arc::new(AtomicBool::new(true));

        let handle = {
            let state = Arc::clone(&state);
            let running = Arc::clone(&running);
            thread::Builder::new()
                .name("magnet".to_string())
                .spawn(move || run_loop(&state, tick, cursor.as_ref(), &active, &running))
                .context("Failed to spawn magnet thread")?
        };

        info!(positions = ?state.lock().positions(), tick_ms = tick.as_millis() as u64, "Magnet started");
        Ok(Self {
            state,
            running,
            handle: Some(handle),
        })
    }

    pub fn positions(&self) -> Vec<i32> {
        self.state.lock().positions().to_vec()
    }

    pub fn add_position(&self, x: i32) {
        if self.state.lock().add_position(x) {
            info!(x, "Magnet position added");
        } else {
            debug!(x, "Magnet position already present");
        }
    }

    pub fn rotate_positions(&self) {
        let mut state = self.state.lock();
        state.rotate();
        info!(positions = ?state.positions(), "Magnet positions rotated");
    }

    pub fn clear_positions(&self) {
        self.state.lock().clear();
        info!("Magnet positions cleared");
    }

    pub fn is_paused(&self) -> bool {
        self.state.lock().is_paused()
    }

    pub fn pause(&self) {
        self.state.lock().set_paused(true);
        info!("Magnet paused");
    }

    pub fn resume(&self) {
        self.state.lock().set_paused(false);
        info!("Magnet resumed");
    }

    /// Returns the new paused state
    pub fn toggle_pause(&self) -> bool {
        let mut state = self.state.lock();
        let paused = !state.is_paused();
        state.set_paused(paused);
        info!(paused, "Magnet pause toggled");
        paused
    }

    pub fn on_scroll(&self) {
        self.state.lock().note_scroll(Instant::now());
    }

    /// Swap in the preset's attractors and hand back its frame size
    pub fn load_preset(&self, name: &str, preset: &MagnetPreset) -> (u32, u32) {
        self.state.lock().replace_positions(&preset.positions);
        info!(preset = %name, positions = ?preset.positions, "Magnet preset loaded");
        (preset.frame_size[0], preset.frame_size[1])
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Magnet thread panicked");
            }
            info!("Magnet stopped");
        }
    }
}

impl Drop for MagnetField {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_loop(
    state: &Mutex<MagnetState>,
    tick: Duration,
    cursor: &dyn CursorDriver,
    active: &AtomicBool,
    running: &AtomicBool,
) {
    while running.load(Ordering::SeqCst) {
        thread::sleep(tick);
        if !active.load(Ordering::SeqCst) {
            continue;
        }

        let (x, y) = match cursor.position() {
            Ok(pos) => pos,
            Err(e) => {
                debug!(error = %e, "Magnet could not read cursor");
                continue;
            }
        };

        let target = state.lock().target_x(x, Instant::now());
        if let Some(target) = target {
            trace!(from = x, to = target, "Magnet pull");
            if let Err(e) = cursor.warp(target, y) {
                debug!(error = %e, "Magnet could not move cursor");
            }
        }
    }
}
