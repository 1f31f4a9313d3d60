use anyhow::{Context, Result};
use evdev::{Device, InputEventKind, Key, RelativeAxisType};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{debug, error, info, trace, warn};

use super::keys::key_name;
use super::{InputHandler, InputMultiplexer};
use crate::constants::{input, paths, permissions};
use crate::ipc::Command;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct DeviceRole {
    keyboard: bool,
    pointer: bool,
}

fn classify(device: &Device) -> DeviceRole {
    let keys = device.supported_keys();
    let keyboard = keys.is_some_and(|k| k.contains(Key::KEY_TAB) && k.contains(Key::KEY_A));
    let pointer = keys.is_some_and(|k| k.contains(Key::BTN_LEFT))
        && device
            .supported_relative_axes()
            .is_some_and(|axes| axes.contains(RelativeAxisType::REL_WHEEL));
    DeviceRole { keyboard, pointer }
}

/// Find all keyboards and wheel mice
fn find_input_devices() -> Result<Vec<(Device, DeviceRole)>> {
    info!(path = %paths::DEV_INPUT, "Scanning for input devices...");

    let mut devices = Vec::new();
    for entry in std::fs::read_dir(paths::DEV_INPUT)
        .context(format!("Failed to read {} - are you in the '{}' group?", paths::DEV_INPUT, permissions::INPUT_GROUP))?
    {
        let path = entry?.path();
        if !is_event_node(&path) {
            continue;
        }
        if let Ok(device) = Device::open(&path) {
            let role = classify(&device);
            if role.keyboard || role.pointer {
                info!(device_path = %path.display(), name = ?device.name(), keyboard = role.keyboard, pointer = role.pointer, "Found input device");
                devices.push((device, role));
            }
        }
    }

    if devices.is_empty() {
        anyhow::bail!(
            "No input device found. Ensure you're in '{}' group:\n\
             {}\n\
             Then log out and back in.",
            permissions::INPUT_GROUP,
            permissions::ADD_TO_INPUT_GROUP
        )
    }

    info!(count = devices.len(), "Listening on input device(s)");
    Ok(devices)
}

fn is_event_node(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with("event"))
}

/// Spawn one listener thread per device. Keyboards share a single multiplexer
/// so chords spanning two devices still register.
pub fn spawn_listeners(
    bindings: InputMultiplexer<Command>,
    handler: Arc<dyn InputHandler>,
) -> Result<Vec<thread::JoinHandle<()>>> {
    let devices = find_input_devices()?;
    let mux = Arc::new(Mutex::new(bindings));
    let mut handles = Vec::new();

    for (device, role) in devices {
        let mux = Arc::clone(&mux);
        let handler = Arc::clone(&handler);
        let handle = thread::Builder::new()
            .name("input".to_string())
            .spawn(move || {
                info!(device = ?device.name(), "Input listener started");
                if let Err(e) = listen(device, role, &mux, handler.as_ref()) {
                    error!(error = %e, "Input listener error");
                }
            })
            .context("Failed to spawn input listener thread")?;
        handles.push(handle);
    }

    Ok(handles)
}

/// Process events from a single device until it goes away
fn listen(
    mut device: Device,
    role: DeviceRole,
    mux: &Mutex<InputMultiplexer<Command>>,
    handler: &dyn InputHandler,
) -> Result<()> {
    loop {
        // Collect first: the events iterator borrows the device
        let events: Vec<_> = device
            .fetch_events()
            .context("Failed to fetch events")?
            .collect();

        for event in events {
            match event.kind() {
                InputEventKind::Key(key) if role.pointer && matches!(key, Key::BTN_LEFT | Key::BTN_MIDDLE) => {
                    if event.value() == input::KEY_PRESS {
                        debug!(button = ?key, "Pointer click");
                        handler.on_click();
                    }
                }
                InputEventKind::Key(key) if role.keyboard => {
                    let Some(name) = key_name(key) else {
                        continue;
                    };
                    let fired = match event.value() {
                        input::KEY_PRESS => mux.lock().key_down(name, Instant::now()),
                        input::KEY_RELEASE => {
                            mux.lock().key_up(name);
                            continue;
                        }
                        // Auto-repeat
                        _ => continue,
                    };
                    // Lock released before running actions
                    for command in fired {
                        trace!(key = name, command = %command, "Key binding fired");
                        handler.on_command(command);
                    }
                }
                InputEventKind::RelAxis(RelativeAxisType::REL_WHEEL) if role.pointer => {
                    handler.on_scroll(event.value());
                }
                _ => {}
            }
        }
    }
}

/// Check if input devices are readable (user has input group permissions)
pub fn check_permissions() -> bool {
    std::fs::read_dir(paths::DEV_INPUT).is_ok()
}

/// Print helpful error message if permissions missing
pub fn print_permission_error() {
    error!(path = %paths::DEV_INPUT, "Cannot access input devices");
    error!(group = %permissions::INPUT_GROUP, "Hotkeys and click capture require group membership");
    error!(command = %permissions::ADD_TO_INPUT_GROUP, "Add user to input group");
    error!("  Then log out and back in");
    warn!(continuing = true, "Continuing with the command channel only...");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_event_node() {
        assert!(is_event_node(Path::new("/dev/input/event3")));
        assert!(!is_event_node(Path::new("/dev/input/mouse0")));
        assert!(!is_event_node(Path::new("/dev/input/by-id")));
    }
}
