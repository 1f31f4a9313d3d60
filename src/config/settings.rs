//! User settings persisted as TOML
//!
//! Every field has a serde default so partial files load cleanly; values are
//! validated and clamped after loading.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::warn;

use crate::constants::{geometry, ipc, magnet, threshold};

/// Which content the viewer is showing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    Image,
    Text,
}

impl DisplayMode {
    pub fn as_str(self) -> &'static str {
        match self {
            DisplayMode::Image => "image",
            DisplayMode::Text => "text",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_threshold")]
    pub threshold: i32,

    /// Capture aspect ratio (width / height)
    #[serde(default = "default_ratio")]
    pub ratio: f64,

    /// Capture half-width in pixels; the height follows from the ratio
    #[serde(default = "default_half_width")]
    pub half_width: i32,

    #[serde(default = "default_mode")]
    pub mode: DisplayMode,

    /// Directory the external viewer reads frames and scripts from
    #[serde(default = "default_viewer_dir")]
    pub viewer_dir: PathBuf,

    /// Text shown page by page in text mode
    #[serde(default = "default_content_file")]
    pub content_file: PathBuf,

    #[serde(default)]
    pub pipes: PipeSettings,

    #[serde(default)]
    pub magnet: MagnetSettings,

    #[serde(default)]
    pub keys: KeyBindings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipeSettings {
    #[serde(default = "default_control_pipe")]
    pub control: PathBuf,
    #[serde(default = "default_status_pipe")]
    pub status: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MagnetSettings {
    #[serde(default = "default_magnet_radius")]
    pub radius: i32,

    /// 0.0 - 1.0
    #[serde(default = "default_force_strength")]
    pub force_strength: f64,

    #[serde(default = "default_dead_zone")]
    pub dead_zone: i32,

    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    #[serde(default = "default_scroll_pause_ms")]
    pub scroll_pause_ms: u64,

    /// Attractors used by start_magnet; empty means "current cursor X"
    #[serde(default)]
    pub positions: Vec<i32>,

    #[serde(default = "default_presets")]
    pub presets: BTreeMap<String, MagnetPreset>,
}

/// Named bundle of attractor positions plus the capture size that goes with them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MagnetPreset {
    pub positions: Vec<i32>,
    /// Full capture width and height
    pub frame_size: [u32; 2],
}

/// Key spec → command token tables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyBindings {
    #[serde(default = "default_press_bindings")]
    pub press: BTreeMap<String, String>,
    #[serde(default = "default_double_tap_bindings")]
    pub double_tap: BTreeMap<String, String>,
    #[serde(default = "default_combo_bindings")]
    pub combo: BTreeMap<String, String>,
}

fn default_threshold() -> i32 {
    threshold::DEFAULT
}

fn default_ratio() -> f64 {
    geometry::DEFAULT_RATIO
}

fn default_half_width() -> i32 {
    geometry::DEFAULT_HALF_WIDTH
}

fn default_mode() -> DisplayMode {
    DisplayMode::Image
}

fn default_viewer_dir() -> PathBuf {
    PathBuf::from("viewer")
}

fn default_content_file() -> PathBuf {
    PathBuf::from("content")
}

fn default_control_pipe() -> PathBuf {
    PathBuf::from(ipc::DEFAULT_CONTROL_PIPE)
}

fn default_status_pipe() -> PathBuf {
    PathBuf::from(ipc::DEFAULT_STATUS_PIPE)
}

fn default_magnet_radius() -> i32 {
    magnet::RADIUS
}

fn default_force_strength() -> f64 {
    magnet::FORCE_STRENGTH
}

fn default_dead_zone() -> i32 {
    magnet::DEAD_ZONE
}

fn default_tick_ms() -> u64 {
    magnet::TICK_MS
}

fn default_scroll_pause_ms() -> u64 {
    magnet::SCROLL_PAUSE_MS
}

fn default_presets() -> BTreeMap<String, MagnetPreset> {
    let preset = |positions: &[i32], w, h| MagnetPreset {
        positions: positions.to_vec(),
        frame_size: [w, h],
    };
    BTreeMap::from([
        ("nndesign".to_string(), preset(&[2021], 788, 492)),
        ("thomas".to_string(), preset(&[2106, 2204], 808, 505)),
        (
            "advanced-engineer-math".to_string(),
            preset(&[1790, 1743], 828, 523),
        ),
    ])
}

fn bindings(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(key, command)| (key.to_string(), command.to_string()))
        .collect()
}

fn default_press_bindings() -> BTreeMap<String, String> {
    bindings(&[
        ("5", "refresh"),
        ("[", "size_down"),
        ("]", "size_up"),
        ("9", "ratio_down"),
        ("0", "ratio_up"),
        ("`", "toggle_capture"),
        ("scroll_lock", "toggle_stop"),
        ("f7", "select_area"),
    ])
}

fn default_double_tap_bindings() -> BTreeMap<String, String> {
    bindings(&[("f9", "toggle_magnet")])
}

fn default_combo_bindings() -> BTreeMap<String, String> {
    bindings(&[
        ("alt+shift+m", "add_magnet"),
        ("alt+shift+r", "rotate_magnet"),
        ("alt+shift+c", "clear_magnet"),
        ("alt+shift+x", "stop_magnet"),
    ])
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            ratio: default_ratio(),
            half_width: default_half_width(),
            mode: default_mode(),
            viewer_dir: default_viewer_dir(),
            content_file: default_content_file(),
            pipes: PipeSettings::default(),
            magnet: MagnetSettings::default(),
            keys: KeyBindings::default(),
        }
    }
}

impl Default for PipeSettings {
    fn default() -> Self {
        Self {
            control: default_control_pipe(),
            status: default_status_pipe(),
        }
    }
}

impl Default for MagnetSettings {
    fn default() -> Self {
        Self {
            radius: default_magnet_radius(),
            force_strength: default_force_strength(),
            dead_zone: default_dead_zone(),
            tick_ms: default_tick_ms(),
            scroll_pause_ms: default_scroll_pause_ms(),
            positions: Vec::new(),
            presets: default_presets(),
        }
    }
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self {
            press: default_press_bindings(),
            double_tap: default_double_tap_bindings(),
            combo: default_combo_bindings(),
        }
    }
}

impl Settings {
    /// Clamp values into ranges the rest of the app can rely on
    pub fn validate_and_clamp(&mut self) {
        if !self.ratio.is_finite() {
            warn!(ratio = self.ratio, "ratio is not a number, using default");
            self.ratio = default_ratio();
        } else if self.ratio < geometry::MIN_RATIO || self.ratio > geometry::MAX_RATIO {
            warn!(ratio = self.ratio, min = geometry::MIN_RATIO, max = geometry::MAX_RATIO, "ratio out of range, clamping");
            self.ratio = self.ratio.clamp(geometry::MIN_RATIO, geometry::MAX_RATIO);
        }

        if self.half_width < geometry::MIN_DIMENSION {
            warn!(half_width = self.half_width, using = default_half_width(), "half_width below minimum, using default");
            self.half_width = default_half_width();
        }

        let magnet = &mut self.magnet;
        if !(0.0..=1.0).contains(&magnet.force_strength) {
            warn!(force_strength = magnet.force_strength, "magnet force_strength outside 0..1, clamping");
            magnet.force_strength = if magnet.force_strength.is_nan() {
                default_force_strength()
            } else {
                magnet.force_strength.clamp(0.0, 1.0)
            };
        }
        if magnet.radius < 1 {
            warn!(radius = magnet.radius, "magnet radius must be positive, using default");
            magnet.radius = default_magnet_radius();
        }
        if magnet.dead_zone < 0 {
            warn!(dead_zone = magnet.dead_zone, "magnet dead_zone negative, clamping to 0");
            magnet.dead_zone = 0;
        }
        if magnet.tick_ms == 0 {
            warn!("magnet tick_ms is 0, using default");
            magnet.tick_ms = default_tick_ms();
        }
    }
}
