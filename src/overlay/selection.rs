//! Interactive area selection
//!
//! The outline is hidden while the user drags a rectangle with an external
//! tool; a big enough selection becomes the new capture size.

use anyhow::{Context, Result};
use std::io::Read;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::OverlaySync;
use crate::constants::overlay::{MIN_SELECTION, SELECTION_TIMEOUT_SECS, SELECTION_TOOL};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Blocking rectangle picker; `Ok(None)` means the user cancelled
pub trait AreaSelector: Send + Sync {
    fn select(&self) -> Result<Option<Selection>>;
}

/// Runs `slop` and parses its `x y w h` output
pub struct SlopSelector {
    timeout: Duration,
}

impl Default for SlopSelector {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(SELECTION_TIMEOUT_SECS),
        }
    }
}

impl AreaSelector for SlopSelector {
    fn select(&self) -> Result<Option<Selection>> {
        let mut child = Command::new(SELECTION_TOOL)
            .args(["-f", "%x %y %w %h"])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to start '{}' - is it installed?", SELECTION_TOOL))?;

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            if let Some(status) = child.try_wait().context("Failed to wait for selection tool")? {
                break status;
            }
            if Instant::now() >= deadline {
                warn!(timeout_secs = self.timeout.as_secs(), "Selection timed out");
                let _ = child.kill();
                let _ = child.wait();
                return Ok(None);
            }
            thread::sleep(Duration::from_millis(50));
        };

        if !status.success() {
            info!("Selection cancelled");
            return Ok(None);
        }

        let mut output = String::new();
        if let Some(mut stdout) = child.stdout.take() {
            stdout
                .read_to_string(&mut output)
                .context("Failed to read selection tool output")?;
        }
        Ok(parse_selection(&output))
    }
}

/// Parse `"x y w h"`; anything else is treated as no selection
pub fn parse_selection(output: &str) -> Option<Selection> {
    let mut fields = output.split_whitespace();
    let selection = Selection {
        x: fields.next()?.parse().ok()?,
        y: fields.next()?.parse().ok()?,
        width: fields.next()?.parse().ok()?,
        height: fields.next()?.parse().ok()?,
    };
    fields.next().is_none().then_some(selection)
}

/// Hide the outline, let the user pick an area, and apply it.
///
/// Returns true when the capture size changed. The outline ends up in the
/// same visibility it had before.
pub fn select_area(overlay: &OverlaySync, selector: &dyn AreaSelector) -> Result<bool> {
    let was_visible = overlay.is_visible();
    overlay.hide();

    let restore = |overlay: &OverlaySync| -> Result<()> {
        if was_visible { overlay.show() } else { Ok(()) }
    };

    let selection = match selector.select() {
        Ok(selection) => selection,
        Err(e) => {
            restore(overlay)?;
            return Err(e);
        }
    };

    match selection {
        Some(sel) if sel.width > MIN_SELECTION && sel.height > MIN_SELECTION => {
            {
                let mut region = overlay.region().write();
                region.set_width((sel.width / 2) as i32);
                region.set_height((sel.height / 2) as i32);
                info!(
                    half_width = region.half_width(),
                    half_height = region.half_height(),
                    ratio = region.ratio(),
                    "Capture area selected"
                );
            }
            restore(overlay)?;
            Ok(true)
        }
        other => {
            debug!(selection = ?other, "Selection ignored");
            restore(overlay)?;
            Ok(false)
        }
    }
}
