//! Screen capture, binarization and frame output for the e-ink viewer

use anyhow::{bail, Context, Result};
use parking_lot::Mutex;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info};
use x11rb::protocol::xproto::{ConnectionExt as _, ImageFormat};

use crate::constants::overlay::LINE_WIDTH;
use crate::constants::timing::FLASH_HOLD_MS;
use crate::constants::viewer::{FRAME_FILE, STAGING_FILE};
use crate::x11_utils::{clamp_i16, X11Context};

/// Captured pixels in BGRX order, 4 bytes per pixel
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub bgrx: Vec<u8>,
}

/// 8-bit grayscale image, one byte per pixel
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl Frame {
    pub fn black(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; (width * height) as usize],
        }
    }
}

pub trait Renderer: Send + Sync {
    /// Capture the box around `center` and display it binarized
    fn capture_binarized(&self, center: (i32, i32), half_extent: (i32, i32), threshold: i32) -> Result<()>;
    /// Redisplay the last capture with a new threshold.
    /// Returns false when there is nothing captured yet.
    fn rebinarize(&self, threshold: i32) -> Result<bool>;
    fn display(&self, frame: &Frame) -> Result<()>;
    /// Full black frame, then the previous one again, to clear e-ink ghosting
    fn flash(&self) -> Result<()>;
}

/// Source of raw screen pixels
pub trait ScreenSource: Send + Sync {
    fn screen_size(&self) -> (u32, u32);
    fn grab(&self, x: i32, y: i32, width: u32, height: u32) -> Result<RawFrame>;
}

impl<T: ScreenSource + ?Sized> ScreenSource for Arc<T> {
    fn screen_size(&self) -> (u32, u32) {
        (**self).screen_size()
    }

    fn grab(&self, x: i32, y: i32, width: u32, height: u32) -> Result<RawFrame> {
        (**self).grab(x, y, width, height)
    }
}

impl ScreenSource for X11Context {
    fn screen_size(&self) -> (u32, u32) {
        (self.screen_width as u32, self.screen_height as u32)
    }

    fn grab(&self, x: i32, y: i32, width: u32, height: u32) -> Result<RawFrame> {
        let reply = self
            .conn
            .get_image(
                ImageFormat::Z_PIXMAP,
                self.root,
                clamp_i16(x),
                clamp_i16(y),
                width as u16,
                height as u16,
                !0,
            )
            .context("Failed to request screen image")?
            .reply()
            .with_context(|| format!("Failed to capture {}x{} at ({}, {})", width, height, x, y))?;

        let expected = (width * height * 4) as usize;
        if reply.data.len() != expected {
            bail!(
                "Unsupported screen format: depth {} gave {} bytes, expected {}",
                reply.depth,
                reply.data.len(),
                expected
            );
        }
        Ok(RawFrame {
            width,
            height,
            bgrx: reply.data,
        })
    }
}

/// ITU-R 601 luma, then `> threshold` is white
pub fn binarize(raw: &RawFrame, threshold: i32) -> Frame {
    let pixels = raw
        .bgrx
        .chunks_exact(4)
        .map(|px| {
            let (b, g, r) = (px[0] as i32, px[1] as i32, px[2] as i32);
            let luma = (299 * r + 587 * g + 114 * b) / 1000;
            if luma > threshold { 255 } else { 0 }
        })
        .collect();
    Frame {
        width: raw.width,
        height: raw.height,
        pixels,
    }
}

/// Clip a box centered on `center` to the screen, as `(x, y, w, h)`
pub fn capture_rect(center: (i32, i32), half: (i32, i32), screen: (u32, u32)) -> Option<(i32, i32, u32, u32)> {
    let (sw, sh) = (screen.0 as i32, screen.1 as i32);
    let x0 = (center.0 - half.0).max(0);
    let y0 = (center.1 - half.1).max(0);
    let x1 = (center.0 + half.0).min(sw);
    let y1 = (center.1 + half.1).min(sh);
    (x1 > x0 && y1 > y0).then(|| (x0, y0, (x1 - x0) as u32, (y1 - y0) as u32))
}

/// Drop a `border` pixel margin (the outline drawn on top of the capture)
pub fn crop_border(raw: RawFrame, border: u32) -> RawFrame {
    if raw.width <= border * 2 || raw.height <= border * 2 {
        return raw;
    }
    let width = raw.width - border * 2;
    let height = raw.height - border * 2;
    let stride = raw.width as usize * 4;
    let mut bgrx = Vec::with_capacity((width * height * 4) as usize);
    for row in border..border + height {
        let start = row as usize * stride + border as usize * 4;
        bgrx.extend_from_slice(&raw.bgrx[start..start + width as usize * 4]);
    }
    RawFrame { width, height, bgrx }
}

pub fn write_png(path: &Path, frame: &Frame) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut encoder = png::Encoder::new(BufWriter::new(file), frame.width, frame.height);
    encoder.set_color(png::ColorType::Grayscale);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header().context("Failed to write PNG header")?;
    writer
        .write_image_data(&frame.pixels)
        .context("Failed to write PNG data")?;
    writer.finish().context("Failed to finish PNG")?;
    Ok(())
}

/// Writes binarized frames where the viewer picks them up
pub struct FrameRenderer<S> {
    source: S,
    viewer_dir: PathBuf,
    last_raw: Mutex<Option<RawFrame>>,
    last_shown: Mutex<Option<Frame>>,
    flash_hold: Duration,
}

impl<S: ScreenSource> FrameRenderer<S> {
    pub fn new(source: S, viewer_dir: PathBuf) -> Self {
        Self {
            source,
            viewer_dir,
            last_raw: Mutex::new(None),
            last_shown: Mutex::new(None),
            flash_hold: Duration::from_millis(FLASH_HOLD_MS),
        }
    }

    fn write_frame(&self, frame: &Frame) -> Result<()> {
        let staging = self.viewer_dir.join(STAGING_FILE);
        let target = self.viewer_dir.join(FRAME_FILE);
        write_png(&staging, frame)?;
        // The viewer must never see a half-written file
        fs::rename(&staging, &target)
            .with_context(|| format!("Failed to move frame into {}", target.display()))?;
        Ok(())
    }
}

impl<S: ScreenSource> Renderer for FrameRenderer<S> {
    fn capture_binarized(&self, center: (i32, i32), half_extent: (i32, i32), threshold: i32) -> Result<()> {
        let Some((x, y, w, h)) = capture_rect(center, half_extent, self.source.screen_size()) else {
            debug!(center = ?center, "Capture box is off screen");
            return Ok(());
        };
        let raw = crop_border(self.source.grab(x, y, w, h)?, LINE_WIDTH as u32);
        let frame = binarize(&raw, threshold);
        *self.last_raw.lock() = Some(raw);
        self.display(&frame)?;
        debug!(x, y, width = w, height = h, threshold, "Captured frame");
        Ok(())
    }

    fn rebinarize(&self, threshold: i32) -> Result<bool> {
        let frame = match self.last_raw.lock().as_ref() {
            Some(raw) => binarize(raw, threshold),
            None => return Ok(false),
        };
        self.display(&frame)?;
        Ok(true)
    }

    fn display(&self, frame: &Frame) -> Result<()> {
        self.write_frame(frame)?;
        *self.last_shown.lock() = Some(frame.clone());
        Ok(())
    }

    fn flash(&self) -> Result<()> {
        let previous = self.last_shown.lock().clone();
        let (width, height) = previous
            .as_ref()
            .map(|f| (f.width, f.height))
            .unwrap_or_else(|| self.source.screen_size());

        self.write_frame(&Frame::black(width, height))?;
        thread::sleep(self.flash_hold);
        if let Some(frame) = previous {
            self.write_frame(&frame)?;
        }
        info!("E-ink refresh flash done");
        Ok(())
    }
}
