//! Application-wide constants
//!
//! Defaults and fixed timings used throughout the application, kept in one
//! place so the control paths agree on them.

/// Capture-region geometry defaults and bounds
pub mod geometry {
    /// Smallest allowed aspect ratio (width / height)
    pub const MIN_RATIO: f64 = 0.2;

    /// Largest allowed aspect ratio (width / height)
    pub const MAX_RATIO: f64 = 4.0;

    /// Default aspect ratio for a fresh config
    pub const DEFAULT_RATIO: f64 = 1.2;

    /// Default half-width of the capture rectangle in pixels
    pub const DEFAULT_HALF_WIDTH: i32 = 400;

    /// Linear adjust increment for size_up/size_down
    pub const STEP: i32 = 10;

    /// Ratio adjust increment for ratio_up/ratio_down
    pub const RATIO_STEP: f64 = 0.1;

    /// Minimum value for either half dimension
    pub const MIN_DIMENSION: i32 = 1;
}

/// Binarization threshold constants
pub mod threshold {
    /// Startup threshold when the config has none
    pub const DEFAULT: i32 = 180;

    /// Amount thresh_up/thresh_down move the threshold
    pub const STEP: i32 = 10;

    /// Toggle goes to LOW when above TOGGLE_PIVOT, otherwise to HIGH
    pub const TOGGLE_LOW: i32 = 120;
    pub const TOGGLE_HIGH: i32 = 180;
    pub const TOGGLE_PIVOT: i32 = 150;
}

/// Input event constants (from evdev)
pub mod input {
    /// Key press event value
    pub const KEY_PRESS: i32 = 1;

    /// Key release event value
    pub const KEY_RELEASE: i32 = 0;

    /// Maximum gap between two presses that still counts as a double-tap
    pub const DOUBLE_TAP_WINDOW_MS: u64 = 300;
}

/// Cursor magnet defaults
pub mod magnet {
    pub const RADIUS: i32 = 200;
    pub const FORCE_STRENGTH: f64 = 0.3;
    pub const DEAD_ZONE: i32 = 30;
    pub const TICK_MS: u64 = 8;

    /// Magnet stays quiet this long after a wheel event
    pub const SCROLL_PAUSE_MS: u64 = 500;

    /// Multiplier applied on top of force_strength * falloff
    pub const FORCE_GAIN: f64 = 2.0;
}

/// Outline overlay constants
pub mod overlay {
    /// Outline stroke width in pixels
    pub const LINE_WIDTH: u16 = 3;

    /// Outline color (0xRRGGBB)
    pub const COLOR: u32 = 0xFF0000;

    /// _NET_WM_WINDOW_OPACITY value (roughly 80%)
    pub const OPACITY: u32 = 0xCCCC_CCCC;

    /// Cursor tracking period (~100Hz)
    pub const TRACK_INTERVAL_MS: u64 = 10;

    /// Drags at or below this size in either dimension are ignored
    pub const MIN_SELECTION: u32 = 10;

    /// The external selection tool is killed after this long
    pub const SELECTION_TIMEOUT_SECS: u64 = 30;

    /// Program used for interactive rectangle selection
    pub const SELECTION_TOOL: &str = "slop";
}

/// Command channel constants
pub mod ipc {
    pub const DEFAULT_CONTROL_PIPE: &str = "/tmp/eink_control";
    pub const DEFAULT_STATUS_PIPE: &str = "/tmp/eink_status";

    /// Outer poll period of the command listener
    pub const POLL_INTERVAL_MS: u16 = 100;

    /// Pause between reads after data arrived
    pub const READ_BACKOFF_MS: u64 = 10;

    /// Maximum bytes consumed per read
    pub const READ_BUFFER: usize = 1024;

    /// Listener join timeout on shutdown
    pub const JOIN_TIMEOUT_MS: u64 = 1000;
}

/// Debounce timings
pub mod timing {
    /// Delay for the refresh command
    pub const REFRESH_DEBOUNCE_MS: u64 = 50;

    /// Delay for click-triggered captures
    pub const CAPTURE_DEBOUNCE_MS: u64 = 50;

    /// How long the black frame stays up during an e-ink flash
    pub const FLASH_HOLD_MS: u64 = 500;
}

/// Viewer output constants
pub mod viewer {
    pub const FRAME_FILE: &str = "res.png";
    pub const STAGING_FILE: &str = "to_view.png";
    pub const MODE_FILE: &str = "mode.js";
    pub const SCROLL_FILE: &str = "scroll.js";
    pub const CONTENT_FILE: &str = "content.js";

    /// Characters per page of the text source
    pub const PAGE_CHARS: usize = 260;
}

/// Config file location
pub mod config {
    pub const APP_DIR: &str = "eink-lens";
    pub const FILENAME: &str = "config.toml";
}

/// Input device discovery
pub mod paths {
    pub const DEV_INPUT: &str = "/dev/input";
}

/// Permission hints for evdev access
pub mod permissions {
    pub const INPUT_GROUP: &str = "input";
    pub const ADD_TO_INPUT_GROUP: &str = "sudo usermod -aG input $USER";
}
