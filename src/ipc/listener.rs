//! Command listener thread for the control FIFO

use anyhow::{Context, Result};
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read};
use std::os::fd::AsFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

use super::Command;
use crate::constants::ipc::{JOIN_TIMEOUT_MS, POLL_INTERVAL_MS, READ_BACKOFF_MS, READ_BUFFER};

pub struct CommandListener {
    stop: Arc<AtomicBool>,
    done_rx: mpsc::Receiver<()>,
    handle: Option<JoinHandle<()>>,
}

impl CommandListener {
    /// Spawn the listener. Every parsed command is handed to `dispatch` on the
    /// listener thread.
    pub fn spawn<F>(path: PathBuf, dispatch: F) -> Result<Self>
    where
        F: Fn(Command) + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = mpsc::channel();
        let flag = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name("command-listener".to_string())
            .spawn(move || {
                if let Err(e) = run_listener(&path, &flag, &dispatch) {
                    error!(error = ?e, "Command listener crashed");
                }
                let _ = done_tx.send(());
            })
            .context("Failed to spawn command listener thread")?;

        Ok(Self {
            stop,
            done_rx,
            handle: Some(handle),
        })
    }

    /// Ask the thread to stop and wait up to one second for it
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        let Some(handle) = self.handle.take() else {
            return;
        };
        match self
            .done_rx
            .recv_timeout(Duration::from_millis(JOIN_TIMEOUT_MS))
        {
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => {
                let _ = handle.join();
                info!("Command listener stopped");
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                warn!(timeout_ms = JOIN_TIMEOUT_MS, "Command listener did not stop in time, detaching");
            }
        }
    }
}

impl Drop for CommandListener {
    fn drop(&mut self) {
        self.stop();
    }
}

fn open_control(path: &Path) -> Result<File> {
    // O_NONBLOCK lets the open succeed before any writer shows up
    OpenOptions::new()
        .read(true)
        .custom_flags(nix::libc::O_NONBLOCK)
        .open(path)
        .with_context(|| format!("Failed to open control FIFO {}", path.display()))
}

fn run_listener(path: &Path, stop: &AtomicBool, dispatch: &dyn Fn(Command)) -> Result<()> {
    let mut pipe = open_control(path)?;
    info!(path = %path.display(), "Command listener started");

    let mut pending = Vec::new();
    let mut buf = [0u8; READ_BUFFER];

    while !stop.load(Ordering::SeqCst) {
        let ready = {
            let mut fds = [PollFd::new(pipe.as_fd(), PollFlags::POLLIN)];
            match poll(&mut fds, PollTimeout::from(POLL_INTERVAL_MS)) {
                Ok(n) => n > 0,
                Err(Errno::EINTR) => false,
                Err(e) => return Err(e).context("Failed to poll control FIFO"),
            }
        };
        if !ready {
            continue;
        }

        match pipe.read(&mut buf) {
            Ok(0) => {
                // Writer closed; flush a final unterminated line
                if !pending.is_empty() {
                    pending.push(b'\n');
                    dispatch_lines(&mut pending, dispatch);
                }
                // A hung-up read end polls ready forever; a fresh one waits for the next
                // writer. It is opened before the old one drops so a reader always exists.
                pipe = open_control(path)?;
                trace!("Control FIFO reopened");
            }
            Ok(n) => {
                pending.extend_from_slice(&buf[..n]);
                dispatch_lines(&mut pending, dispatch);
                thread::sleep(Duration::from_millis(READ_BACKOFF_MS));
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e).context("Failed to read control FIFO"),
        }
    }

    debug!("Command listener loop exited");
    Ok(())
}

fn dispatch_lines(pending: &mut Vec<u8>, dispatch: &dyn Fn(Command)) {
    for line in take_lines(pending) {
        match line.parse::<Command>() {
            Ok(command) => {
                debug!(command = %command, "Received command");
                dispatch(command);
            }
            Err(e) => warn!(line = %line, error = %e, "Ignoring unknown command"),
        }
    }
}

/// Remove every complete line from `pending`, returning the non-empty ones trimmed
pub fn take_lines(pending: &mut Vec<u8>) -> Vec<String> {
    let Some(last_newline) = pending.iter().rposition(|&b| b == b'\n') else {
        return Vec::new();
    };
    let complete: Vec<u8> = pending.drain(..=last_newline).collect();
    String::from_utf8_lossy(&complete)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
