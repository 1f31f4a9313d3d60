//! Command channel over named pipes
//!
//! An external menu process writes newline-separated command tokens into the
//! control FIFO and reads `key:value` status lines back from the status FIFO.
//! Both FIFOs are owned by this process: recreated at startup and removed on
//! shutdown.

use anyhow::{Context, Result};
use nix::sys::stat::Mode;
use nix::unistd::mkfifo;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace, warn};

pub mod commands;
pub mod listener;

pub use commands::{Command, Status};
pub use listener::CommandListener;

/// Where status replies go
pub trait StatusSink: Send + Sync {
    fn send(&self, status: &Status);
}

/// Owns the control and status FIFOs
pub struct CommandChannel {
    control: PathBuf,
    status: PathBuf,
    removed: bool,
}

impl CommandChannel {
    /// Create both FIFOs, replacing stale files from an earlier run
    pub fn create(control: PathBuf, status: PathBuf) -> Result<Self> {
        for path in [&control, &status] {
            remove_if_exists(path)?;
            mkfifo(path.as_path(), Mode::S_IRUSR | Mode::S_IWUSR)
                .with_context(|| format!("Failed to create FIFO at {}", path.display()))?;
            info!(path = %path.display(), "Created FIFO");
        }
        Ok(Self {
            control,
            status,
            removed: false,
        })
    }

    pub fn control_path(&self) -> &Path {
        &self.control
    }

    pub fn status_writer(&self) -> StatusWriter {
        StatusWriter {
            path: self.status.clone(),
        }
    }

    /// Remove both FIFOs; safe to call more than once
    pub fn remove(&mut self) {
        if self.removed {
            return;
        }
        self.removed = true;
        for path in [&self.control, &self.status] {
            if let Err(e) = remove_if_exists(path) {
                warn!(error = ?e, "Failed to remove FIFO");
            }
        }
        info!("Command channel removed");
    }
}

impl Drop for CommandChannel {
    fn drop(&mut self) {
        self.remove();
    }
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "Removed stale file");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
    }
}

/// Writes one status line per call; silently drops it when nobody listens
#[derive(Debug, Clone)]
pub struct StatusWriter {
    path: PathBuf,
}

impl StatusSink for StatusWriter {
    fn send(&self, status: &Status) {
        // Non-blocking open fails with ENXIO when no reader has the FIFO open
        let mut pipe = match OpenOptions::new()
            .write(true)
            .custom_flags(nix::libc::O_NONBLOCK)
            .open(&self.path)
        {
            Ok(pipe) => pipe,
            Err(e) => {
                trace!(error = %e, status = %status, "No status reader, dropping");
                return;
            }
        };
        if let Err(e) = pipe.write_all(format!("{status}\n").as_bytes()) {
            trace!(error = %e, status = %status, "Status write dropped");
            return;
        }
        debug!(status = %status, "Status sent");
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Unique FIFO paths under the temp dir
    pub fn fifo_paths(name: &str) -> (PathBuf, PathBuf) {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        let n = COUNTER.fetch_add(1, Ordering::SeqCst);
        let base = std::env::temp_dir();
        let stem = format!("eink-lens-{}-{}-{}", std::process::id(), name, n);
        (
            base.join(format!("{stem}-control")),
            base.join(format!("{stem}-status")),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::testing::fifo_paths;
    use super::*;
    use std::io::Read;
    use std::os::unix::fs::FileTypeExt;

    #[test]
    fn test_create_replaces_stale_files_and_remove_cleans_up() {
        let (control, status) = fifo_paths("create");
        std::fs::write(&control, "stale").unwrap();

        let mut channel = CommandChannel::create(control.clone(), status.clone()).unwrap();
        assert!(std::fs::metadata(&control).unwrap().file_type().is_fifo());
        assert!(std::fs::metadata(&status).unwrap().file_type().is_fifo());

        channel.remove();
        channel.remove();
        assert!(!control.exists());
        assert!(!status.exists());
    }

    #[test]
    fn test_status_without_reader_is_dropped() {
        let (control, status) = fifo_paths("noreader");
        let channel = CommandChannel::create(control, status).unwrap();
        channel.status_writer().send(&Status::Threshold(180));
    }

    #[test]
    fn test_status_reaches_reader() {
        let (control, status) = fifo_paths("reader");
        let channel = CommandChannel::create(control, status.clone()).unwrap();

        let mut reader = OpenOptions::new()
            .read(true)
            .custom_flags(nix::libc::O_NONBLOCK)
            .open(&status)
            .unwrap();
        channel.status_writer().send(&Status::Threshold(190));
        channel.status_writer().send(&Status::Size {
            half_width: 400,
            half_height: 333,
        });

        let mut received = String::new();
        reader.read_to_string(&mut received).unwrap();
        assert_eq!(received, "thresh:190\nsize:400x333\n");
    }
}
