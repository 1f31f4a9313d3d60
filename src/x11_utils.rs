use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, trace};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::*;
use x11rb::rust_connection::RustConnection;

/// Reads and moves the pointer in root-window coordinates
pub trait CursorDriver: Send + Sync {
    fn position(&self) -> Result<(i32, i32)>;
    fn warp(&self, x: i32, y: i32) -> Result<()>;
}

/// Pre-cached X11 atoms to avoid repeated roundtrips
pub struct CachedAtoms {
    pub net_wm_window_opacity: Atom,
    pub net_wm_state: Atom,
    pub net_wm_state_above: Atom,
}

fn intern(conn: &RustConnection, name: &str) -> Result<Atom> {
    Ok(conn
        .intern_atom(false, name.as_bytes())
        .with_context(|| format!("Failed to intern {} atom", name))?
        .reply()
        .with_context(|| format!("Failed to get reply for {} atom", name))?
        .atom)
}

impl CachedAtoms {
    pub fn new(conn: &RustConnection) -> Result<Self> {
        // Do all intern_atom roundtrips once at startup
        Ok(Self {
            net_wm_window_opacity: intern(conn, "_NET_WM_WINDOW_OPACITY")?,
            net_wm_state: intern(conn, "_NET_WM_STATE")?,
            net_wm_state_above: intern(conn, "_NET_WM_STATE_ABOVE")?,
        })
    }
}

/// Shared X11 connection plus the root-screen facts every backend needs.
///
/// `RustConnection` is `Send + Sync`, so one context is shared by the overlay,
/// the magnet loop and the renderer.
pub struct X11Context {
    pub conn: RustConnection,
    pub root: Window,
    pub root_depth: u8,
    pub root_visual: Visualid,
    pub screen_width: u16,
    pub screen_height: u16,
    pub atoms: CachedAtoms,
}

impl X11Context {
    pub fn connect() -> Result<Arc<Self>> {
        let (conn, screen_num) = x11rb::connect(None).context("Failed to connect to X11 server")?;
        let screen = conn
            .setup()
            .roots
            .get(screen_num)
            .with_context(|| format!("X11 screen {} not found", screen_num))?;
        let (root, root_depth, root_visual) = (screen.root, screen.root_depth, screen.root_visual);
        let (screen_width, screen_height) = (screen.width_in_pixels, screen.height_in_pixels);
        info!(screen = screen_num, width = screen_width, height = screen_height, "Connected to X11");

        let atoms = CachedAtoms::new(&conn)?;
        Ok(Arc::new(Self {
            conn,
            root,
            root_depth,
            root_visual,
            screen_width,
            screen_height,
            atoms,
        }))
    }

    /// Discard queued events and async request errors
    pub fn drain_events(&self) {
        while let Ok(Some(event)) = self.conn.poll_for_event() {
            trace!(event = ?event, "Discarding X11 event");
        }
    }
}

impl CursorDriver for X11Context {
    fn position(&self) -> Result<(i32, i32)> {
        let reply = self
            .conn
            .query_pointer(self.root)
            .context("Failed to query pointer")?
            .reply()
            .context("Failed to get reply for pointer query")?;
        Ok((reply.root_x as i32, reply.root_y as i32))
    }

    fn warp(&self, x: i32, y: i32) -> Result<()> {
        self.conn
            .warp_pointer(x11rb::NONE, self.root, 0, 0, 0, 0, clamp_i16(x), clamp_i16(y))
            .with_context(|| format!("Failed to warp pointer to ({}, {})", x, y))?;
        self.conn
            .flush()
            .context("Failed to flush X11 connection after pointer warp")?;
        Ok(())
    }
}

/// X11 coordinates are 16-bit
pub fn clamp_i16(v: i32) -> i16 {
    v.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}
