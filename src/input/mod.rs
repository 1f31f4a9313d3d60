//! Keyboard and pointer input
//!
//! Raw evdev events are normalized to key names, run through the
//! [`InputMultiplexer`] and turned into [`Command`]s for the controller.

pub mod keys;
pub mod listener;
pub mod multiplexer;

pub use multiplexer::InputMultiplexer;

use tracing::{info, warn};

use crate::config::KeyBindings;
use crate::ipc::Command;
use keys::ComboSpec;

/// Receives everything the input listeners produce
pub trait InputHandler: Send + Sync {
    fn on_command(&self, command: Command);
    /// Left or middle button pressed
    fn on_click(&self);
    /// Wheel moved; positive is away from the user
    fn on_scroll(&self, delta: i32);
}

/// Build the binding table from config, skipping entries that don't parse
pub fn build_bindings(bindings: &KeyBindings) -> InputMultiplexer<Command> {
    let mut mux = InputMultiplexer::new();

    for (key, token) in &bindings.press {
        match token.parse::<Command>() {
            Ok(command) => mux.on_press(key, command),
            Err(e) => warn!(key = %key, error = %e, "Skipping key binding"),
        }
    }

    for (key, token) in &bindings.double_tap {
        match token.parse::<Command>() {
            Ok(command) => mux.on_double_tap(key, command),
            Err(e) => warn!(key = %key, error = %e, "Skipping double-tap binding"),
        }
    }

    for (spec, token) in &bindings.combo {
        let parsed = spec
            .parse::<ComboSpec>()
            .and_then(|combo| Ok((combo, token.parse::<Command>()?)));
        match parsed {
            Ok((combo, command)) => mux.on_combo(combo, command),
            Err(e) => warn!(combo = %spec, error = %e, "Skipping combo binding"),
        }
    }

    info!(count = mux.binding_count(), "Key bindings loaded");
    mux
}
