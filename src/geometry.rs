//! Capture-region geometry
//!
//! The region is stored as half extents around the cursor. Height is always
//! derived from width and aspect ratio, so every mutator recomputes it.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::constants::geometry::*;

/// Geometry shared between the controller, overlay and renderer.
/// Readers take a `Copy` snapshot so two-field updates look atomic.
pub type SharedRegion = Arc<RwLock<CaptureRegion>>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureRegion {
    half_width: i32,
    half_height: i32,
    ratio: f64,
    pub step: i32,
    pub ratio_step: f64,
}

impl Default for CaptureRegion {
    fn default() -> Self {
        Self::new(DEFAULT_HALF_WIDTH, DEFAULT_RATIO)
    }
}

impl CaptureRegion {
    pub fn new(half_width: i32, ratio: f64) -> Self {
        let mut region = Self {
            half_width: half_width.max(MIN_DIMENSION),
            half_height: MIN_DIMENSION,
            ratio: clamp_ratio(ratio),
            step: STEP,
            ratio_step: RATIO_STEP,
        };
        region.update_height();
        region
    }

    pub fn shared(self) -> SharedRegion {
        Arc::new(RwLock::new(self))
    }

    pub fn half_width(&self) -> i32 {
        self.half_width
    }

    pub fn half_height(&self) -> i32 {
        self.half_height
    }

    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    /// Full outline size (2 * half extents)
    pub fn outline_size(&self) -> (u32, u32) {
        (self.half_width as u32 * 2, self.half_height as u32 * 2)
    }

    /// Shrink the half-width by `step`, or by the default step when `None`
    pub fn shrink(&mut self, step: Option<i32>) {
        self.adjust_width(-step.unwrap_or(self.step));
    }

    pub fn expand(&mut self, step: Option<i32>) {
        self.adjust_width(step.unwrap_or(self.step));
    }

    pub fn shrink_ratio(&mut self) {
        self.set_ratio(round_ratio(self.ratio - self.ratio_step));
    }

    pub fn expand_ratio(&mut self) {
        self.set_ratio(round_ratio(self.ratio + self.ratio_step));
    }

    pub fn set_width(&mut self, half_width: i32) {
        self.half_width = half_width.max(MIN_DIMENSION);
        self.update_height();
    }

    /// Height is never stored independently: the ratio is re-derived from the
    /// current width at full precision, so the requested height comes back
    /// exactly unless the ratio bounds cut in.
    pub fn set_height(&mut self, half_height: i32) {
        let half_height = half_height.max(MIN_DIMENSION);
        let mut ratio = clamp_ratio(self.half_width as f64 / half_height as f64);
        // w / (w / h) can land just under h and floor to h - 1
        for _ in 0..MAX_RATIO_NUDGES {
            if derived_height(self.half_width, ratio) >= half_height || ratio <= MIN_RATIO {
                break;
            }
            ratio = f64::from_bits(ratio.to_bits() - 1);
        }
        self.set_ratio(ratio.max(MIN_RATIO));
    }

    fn adjust_width(&mut self, delta: i32) {
        self.half_width = (self.half_width + delta).max(MIN_DIMENSION);
        self.update_height();
    }

    fn set_ratio(&mut self, ratio: f64) {
        self.ratio = clamp_ratio(ratio);
        self.update_height();
    }

    fn update_height(&mut self) {
        self.half_height = derived_height(self.half_width, self.ratio);
    }
}

/// `floor(half_width / ratio)`, never below the minimum dimension
pub fn derived_height(half_width: i32, ratio: f64) -> i32 {
    ((half_width as f64 / ratio).floor() as i32).max(MIN_DIMENSION)
}

/// One-ulp steps tried when correcting a derived ratio
const MAX_RATIO_NUDGES: usize = 16;

fn clamp_ratio(ratio: f64) -> f64 {
    if !ratio.is_finite() {
        return DEFAULT_RATIO;
    }
    ratio.clamp(MIN_RATIO, MAX_RATIO)
}

/// Two decimals, so repeated ratio steps don't drift
fn round_ratio(ratio: f64) -> f64 {
    (ratio * 100.0).round() / 100.0
}
