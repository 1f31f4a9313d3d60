//! Canonical key names and chord specifications
//!
//! Every physical key maps to one lowercase name: letters and digits as
//! themselves, punctuation as its unshifted character, everything else by
//! name (`f7`, `left`, `scroll_lock`, `shift_l`, ...).

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Result};
use evdev::Key;

/// Modifier aliases usable in chord specs; each matches either physical side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    Alt,
    Shift,
    Ctrl,
}

impl Modifier {
    pub fn physical_keys(self) -> &'static [&'static str] {
        match self {
            Modifier::Alt => &["alt_l", "alt_r"],
            Modifier::Shift => &["shift_l", "shift_r"],
            Modifier::Ctrl => &["ctrl_l", "ctrl_r"],
        }
    }

    fn from_alias(name: &str) -> Option<Self> {
        match name {
            "alt" => Some(Modifier::Alt),
            "shift" => Some(Modifier::Shift),
            "ctrl" | "control" => Some(Modifier::Ctrl),
            _ => None,
        }
    }
}

/// One member of a chord
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyMatcher {
    Modifier(Modifier),
    Exact(String),
}

impl KeyMatcher {
    pub fn matches(&self, key: &str) -> bool {
        match self {
            KeyMatcher::Modifier(m) => m.physical_keys().contains(&key),
            KeyMatcher::Exact(name) => name == key,
        }
    }
}

/// A set of keys that must all be held at once, parsed from `alt+shift+m`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComboSpec {
    keys: Vec<KeyMatcher>,
    source: String,
}

impl ComboSpec {
    pub fn keys(&self) -> &[KeyMatcher] {
        &self.keys
    }

    /// True when every member has at least one held physical key
    pub fn is_satisfied(&self, held: &HashSet<String>) -> bool {
        self.keys
            .iter()
            .all(|matcher| held.iter().any(|key| matcher.matches(key)))
    }
}

impl FromStr for ComboSpec {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut keys = Vec::new();
        for part in s.split('+') {
            let name = normalize_name(part);
            if name.is_empty() {
                bail!("Empty key in combo '{}'", s);
            }
            let matcher = match Modifier::from_alias(&name) {
                Some(modifier) => KeyMatcher::Modifier(modifier),
                None => KeyMatcher::Exact(name),
            };
            if !keys.contains(&matcher) {
                keys.push(matcher);
            }
        }
        if keys.len() < 2 {
            bail!("Combo '{}' needs at least two keys", s);
        }
        Ok(Self {
            keys,
            source: s.trim().to_lowercase(),
        })
    }
}

impl fmt::Display for ComboSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Normalize a key name typed in config or produced by a device
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Canonical name for an evdev key, `None` for keys we never bind
pub fn key_name(key: Key) -> Option<&'static str> {
    let name = match key {
        Key::KEY_A => "a",
        Key::KEY_B => "b",
        Key::KEY_C => "c",
        Key::KEY_D => "d",
        Key::KEY_E => "e",
        Key::KEY_F => "f",
        Key::KEY_G => "g",
        Key::KEY_H => "h",
        Key::KEY_I => "i",
        Key::KEY_J => "j",
        Key::KEY_K => "k",
        Key::KEY_L => "l",
        Key::KEY_M => "m",
        Key::KEY_N => "n",
        Key::KEY_O => "o",
        Key::KEY_P => "p",
        Key::KEY_Q => "q",
        Key::KEY_R => "r",
        Key::KEY_S => "s",
        Key::KEY_T => "t",
        Key::KEY_U => "u",
        Key::KEY_V => "v",
        Key::KEY_W => "w",
        Key::KEY_X => "x",
        Key::KEY_Y => "y",
        Key::KEY_Z => "z",
        Key::KEY_0 => "0",
        Key::KEY_1 => "1",
        Key::KEY_2 => "2",
        Key::KEY_3 => "3",
        Key::KEY_4 => "4",
        Key::KEY_5 => "5",
        Key::KEY_6 => "6",
        Key::KEY_7 => "7",
        Key::KEY_8 => "8",
        Key::KEY_9 => "9",
        Key::KEY_GRAVE => "`",
        Key::KEY_MINUS => "-",
        Key::KEY_EQUAL => "=",
        Key::KEY_LEFTBRACE => "[",
        Key::KEY_RIGHTBRACE => "]",
        Key::KEY_BACKSLASH => "\\",
        Key::KEY_SEMICOLON => ";",
        Key::KEY_APOSTROPHE => "'",
        Key::KEY_COMMA => ",",
        Key::KEY_DOT => ".",
        Key::KEY_SLASH => "/",
        Key::KEY_F1 => "f1",
        Key::KEY_F2 => "f2",
        Key::KEY_F3 => "f3",
        Key::KEY_F4 => "f4",
        Key::KEY_F5 => "f5",
        Key::KEY_F6 => "f6",
        Key::KEY_F7 => "f7",
        Key::KEY_F8 => "f8",
        Key::KEY_F9 => "f9",
        Key::KEY_F10 => "f10",
        Key::KEY_F11 => "f11",
        Key::KEY_F12 => "f12",
        Key::KEY_LEFT => "left",
        Key::KEY_RIGHT => "right",
        Key::KEY_UP => "up",
        Key::KEY_DOWN => "down",
        Key::KEY_HOME => "home",
        Key::KEY_END => "end",
        Key::KEY_PAGEUP => "page_up",
        Key::KEY_PAGEDOWN => "page_down",
        Key::KEY_INSERT => "insert",
        Key::KEY_DELETE => "delete",
        Key::KEY_ESC => "esc",
        Key::KEY_TAB => "tab",
        Key::KEY_SPACE => "space",
        Key::KEY_ENTER => "enter",
        Key::KEY_BACKSPACE => "backspace",
        Key::KEY_CAPSLOCK => "caps_lock",
        Key::KEY_SCROLLLOCK => "scroll_lock",
        Key::KEY_PAUSE => "pause",
        Key::KEY_SYSRQ => "print_screen",
        Key::KEY_LEFTSHIFT => "shift_l",
        Key::KEY_RIGHTSHIFT => "shift_r",
        Key::KEY_LEFTCTRL => "ctrl_l",
        Key::KEY_RIGHTCTRL => "ctrl_r",
        Key::KEY_LEFTALT => "alt_l",
        Key::KEY_RIGHTALT => "alt_r",
        Key::KEY_LEFTMETA => "super_l",
        Key::KEY_RIGHTMETA => "super_r",
        _ => return None,
    };
    Some(name)
}
