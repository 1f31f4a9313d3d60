//! X11 outline window
//!
//! A borderless override-redirect window whose bounding shape is reduced to a
//! thin frame, with an empty input shape so clicks reach the windows below.

use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tracing::{debug, error, info};
use x11rb::connection::Connection;
use x11rb::protocol::shape::{ConnectionExt as ShapeExt, SK, SO};
use x11rb::protocol::xproto::*;
use x11rb::wrapper::ConnectionExt as WrapperExt;

use super::{OverlayBackend, OverlayWindow};
use crate::constants::overlay::{COLOR, LINE_WIDTH, OPACITY};
use crate::x11_utils::{clamp_i16, CursorDriver, X11Context};

pub struct X11OutlineBackend {
    ctx: Arc<X11Context>,
}

impl X11OutlineBackend {
    pub fn new(ctx: Arc<X11Context>) -> Result<Self> {
        let version = ctx
            .conn
            .shape_query_version()
            .context("Failed to query SHAPE extension")?
            .reply()
            .context("SHAPE extension not available")?;
        debug!(major = version.major_version, minor = version.minor_version, "SHAPE extension");
        Ok(Self { ctx })
    }
}

impl OverlayBackend for X11OutlineBackend {
    fn create(&self, width: u32, height: u32) -> Result<Box<dyn OverlayWindow>> {
        let (cx, cy) = self.ctx.position().unwrap_or((0, 0));
        let x = cx - (width / 2) as i32;
        let y = cy - (height / 2) as i32;
        Ok(Box::new(OutlineWindow::new(Arc::clone(&self.ctx), x, y, width, height)?))
    }
}

pub struct OutlineWindow {
    ctx: Arc<X11Context>,
    window: Window,
    destroyed: bool,
}

impl OutlineWindow {
    fn new(ctx: Arc<X11Context>, x: i32, y: i32, width: u32, height: u32) -> Result<Self> {
        let (Ok(w), Ok(h)) = (u16::try_from(width), u16::try_from(height)) else {
            bail!("Overlay size {}x{} exceeds X11 limits", width, height);
        };
        if w == 0 || h == 0 {
            bail!("Invalid overlay dimensions {}x{} (must be non-zero)", w, h);
        }

        let conn = &ctx.conn;
        let window = conn.generate_id().context("Failed to generate X11 window ID")?;
        conn.create_window(
            ctx.root_depth,
            window,
            ctx.root,
            clamp_i16(x),
            clamp_i16(y),
            w,
            h,
            0,
            WindowClass::INPUT_OUTPUT,
            ctx.root_visual,
            &CreateWindowAux::new()
                .override_redirect(1)
                .background_pixel(COLOR),
        )
        .context("Failed to create overlay window")?;

        // From here on Drop cleans up if a later step fails
        let outline = Self {
            ctx: Arc::clone(&ctx),
            window,
            destroyed: false,
        };
        outline.setup_properties()?;
        outline.apply_shape(w, h)?;

        conn.map_window(window)
            .context("Failed to map overlay window")?;
        conn.flush().context("Failed to flush X11 connection after overlay creation")?;
        info!(window, x, y, width, height, "Mapped overlay window");
        Ok(outline)
    }

    /// Opacity, WM_CLASS and always-on-top
    fn setup_properties(&self) -> Result<()> {
        let conn = &self.ctx.conn;
        let atoms = &self.ctx.atoms;
        conn.change_property32(
            PropMode::REPLACE,
            self.window,
            atoms.net_wm_window_opacity,
            AtomEnum::CARDINAL,
            &[OPACITY],
        )
        .context("Failed to set overlay opacity")?;
        conn.change_property8(
            PropMode::REPLACE,
            self.window,
            AtomEnum::WM_CLASS,
            AtomEnum::STRING,
            b"eink-lens\0eink-lens\0",
        )
        .context("Failed to set overlay WM_CLASS")?;
        conn.change_property32(
            PropMode::REPLACE,
            self.window,
            atoms.net_wm_state,
            AtomEnum::ATOM,
            &[atoms.net_wm_state_above],
        )
        .context("Failed to set overlay always-on-top")?;
        Ok(())
    }

    fn apply_shape(&self, width: u16, height: u16) -> Result<()> {
        let conn = &self.ctx.conn;
        conn.shape_rectangles(
            SO::SET,
            SK::BOUNDING,
            ClipOrdering::UNSORTED,
            self.window,
            0,
            0,
            &frame_rects(width, height, LINE_WIDTH),
        )
        .context("Failed to set overlay bounding shape")?;
        // Empty input region: the outline never receives clicks
        conn.shape_rectangles(SO::SET, SK::INPUT, ClipOrdering::UNSORTED, self.window, 0, 0, &[])
            .context("Failed to set overlay input shape")?;
        Ok(())
    }
}

impl OverlayWindow for OutlineWindow {
    fn move_to(&mut self, x: i32, y: i32) -> Result<()> {
        self.ctx
            .conn
            .configure_window(
                self.window,
                &ConfigureWindowAux::new()
                    .x(x)
                    .y(y)
                    .stack_mode(StackMode::ABOVE),
            )
            .context("Failed to move overlay window")?;
        self.ctx.conn.flush().context("Failed to flush overlay move")?;
        self.ctx.drain_events();
        Ok(())
    }

    fn destroy(mut self: Box<Self>) -> Result<()> {
        self.destroyed = true;
        self.ctx
            .conn
            .destroy_window(self.window)
            .context("Failed to destroy overlay window")?;
        self.ctx.conn.flush().context("Failed to flush overlay destroy")?;
        Ok(())
    }
}

impl Drop for OutlineWindow {
    fn drop(&mut self) {
        if self.destroyed {
            return;
        }
        if let Err(e) = self.ctx.conn.destroy_window(self.window) {
            error!(window = self.window, error = %e, "Failed to clean up overlay window");
        }
        let _ = self.ctx.conn.flush();
    }
}

/// Four strips forming a frame of `line` pixels inside a `width`x`height` box
pub fn frame_rects(width: u16, height: u16, line: u16) -> [Rectangle; 4] {
    let line_w = line.min(width);
    let line_h = line.min(height);
    let right = (width - line_w) as i16;
    let bottom = (height - line_h) as i16;
    [
        Rectangle { x: 0, y: 0, width, height: line_h },
        Rectangle { x: 0, y: bottom, width, height: line_h },
        Rectangle { x: 0, y: 0, width: line_w, height },
        Rectangle { x: right, y: 0, width: line_w, height },
    ]
}
