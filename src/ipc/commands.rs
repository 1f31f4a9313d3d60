//! Command tokens and status lines carried over the command channel
//!
//! The same `Command` values are produced by keyboard bindings, so both
//! control surfaces drive exactly one dispatch table.

use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Result};

/// Prefix for preset-loading tokens (`magnet_thomas`)
pub const PRESET_PREFIX: &str = "magnet_";

/// Every action an external controller or key binding can trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    ThreshUp,
    ThreshDown,
    ThreshToggle,
    SizeUp,
    SizeDown,
    RatioUp,
    RatioDown,
    ToggleCapture,
    ToggleStop,
    ToggleMode,
    Refresh,
    SelectArea,
    GetThresh,
    GetSize,
    GetRatio,
    StartMagnet,
    StopMagnet,
    AddMagnet,
    RotateMagnet,
    ClearMagnet,
    ToggleMagnet,
    ScrollUp,
    ScrollDown,
    /// Load a named magnet preset
    MagnetPreset(String),
}

impl Command {
    /// Wire token for this command
    pub fn token(&self) -> String {
        let token = match self {
            Command::ThreshUp => "thresh_up",
            Command::ThreshDown => "thresh_down",
            Command::ThreshToggle => "thresh_toggle",
            Command::SizeUp => "size_up",
            Command::SizeDown => "size_down",
            Command::RatioUp => "ratio_up",
            Command::RatioDown => "ratio_down",
            Command::ToggleCapture => "toggle_capture",
            Command::ToggleStop => "toggle_stop",
            Command::ToggleMode => "toggle_mode",
            Command::Refresh => "refresh",
            Command::SelectArea => "select_area",
            Command::GetThresh => "get_thresh",
            Command::GetSize => "get_size",
            Command::GetRatio => "get_ratio",
            Command::StartMagnet => "start_magnet",
            Command::StopMagnet => "stop_magnet",
            Command::AddMagnet => "add_magnet",
            Command::RotateMagnet => "rotate_magnet",
            Command::ClearMagnet => "clear_magnet",
            Command::ToggleMagnet => "toggle_magnet",
            Command::ScrollUp => "scroll_up",
            Command::ScrollDown => "scroll_down",
            Command::MagnetPreset(name) => return format!("{PRESET_PREFIX}{name}"),
        };
        token.to_string()
    }
}

impl FromStr for Command {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let token = s.trim();
        let command = match token {
            "thresh_up" => Command::ThreshUp,
            "thresh_down" => Command::ThreshDown,
            "thresh_toggle" => Command::ThreshToggle,
            "size_up" => Command::SizeUp,
            "size_down" => Command::SizeDown,
            "ratio_up" => Command::RatioUp,
            "ratio_down" => Command::RatioDown,
            "toggle_capture" => Command::ToggleCapture,
            "toggle_stop" => Command::ToggleStop,
            "toggle_mode" => Command::ToggleMode,
            "refresh" => Command::Refresh,
            "select_area" => Command::SelectArea,
            "get_thresh" => Command::GetThresh,
            "get_size" => Command::GetSize,
            "get_ratio" => Command::GetRatio,
            "start_magnet" => Command::StartMagnet,
            "stop_magnet" => Command::StopMagnet,
            "add_magnet" => Command::AddMagnet,
            "rotate_magnet" => Command::RotateMagnet,
            "clear_magnet" => Command::ClearMagnet,
            "toggle_magnet" => Command::ToggleMagnet,
            "scroll_up" => Command::ScrollUp,
            "scroll_down" => Command::ScrollDown,
            _ => match token.strip_prefix(PRESET_PREFIX) {
                Some(name) if !name.is_empty() => Command::MagnetPreset(name.to_string()),
                _ => bail!("Unknown command: {:?}", token),
            },
        };
        Ok(command)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token())
    }
}

/// Status lines written back on the status stream
#[derive(Debug, Clone, PartialEq)]
pub enum Status {
    Threshold(i32),
    Size { half_width: i32, half_height: i32 },
    Ratio(f64),
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Threshold(t) => write!(f, "thresh:{t}"),
            Status::Size {
                half_width,
                half_height,
            } => write!(f, "size:{half_width}x{half_height}"),
            Status::Ratio(r) => write!(f, "ratio:{r}"),
        }
    }
}
