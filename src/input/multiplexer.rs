//! Key event multiplexer
//!
//! Turns a stream of normalized key-down/key-up events into fired bindings of
//! three classes: plain press, double-tap and chord. The multiplexer only
//! decides what fired; the caller runs the returned actions.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use super::keys::{normalize_name, ComboSpec};
use crate::constants::input::DOUBLE_TAP_WINDOW_MS;

#[derive(Debug)]
pub struct InputMultiplexer<A> {
    held: HashSet<String>,
    last_down: HashMap<String, Instant>,
    press: HashMap<String, Vec<A>>,
    double_tap: HashMap<String, Vec<A>>,
    combos: Vec<(ComboSpec, Vec<A>)>,
    double_tap_window: Duration,
}

impl<A: Clone> Default for InputMultiplexer<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Clone> InputMultiplexer<A> {
    pub fn new() -> Self {
        Self {
            held: HashSet::new(),
            last_down: HashMap::new(),
            press: HashMap::new(),
            double_tap: HashMap::new(),
            combos: Vec::new(),
            double_tap_window: Duration::from_millis(DOUBLE_TAP_WINDOW_MS),
        }
    }

    pub fn on_press(&mut self, key: &str, action: A) {
        self.press.entry(normalize_name(key)).or_default().push(action);
    }

    pub fn on_double_tap(&mut self, key: &str, action: A) {
        self.double_tap
            .entry(normalize_name(key))
            .or_default()
            .push(action);
    }

    pub fn on_combo(&mut self, combo: ComboSpec, action: A) {
        if let Some((_, actions)) = self.combos.iter_mut().find(|(spec, _)| *spec == combo) {
            actions.push(action);
        } else {
            self.combos.push((combo, vec![action]));
        }
    }

    pub fn binding_count(&self) -> usize {
        self.press.values().map(Vec::len).sum::<usize>()
            + self.double_tap.values().map(Vec::len).sum::<usize>()
            + self.combos.iter().map(|(_, a)| a.len()).sum::<usize>()
    }

    pub fn is_held(&self, key: &str) -> bool {
        self.held.contains(&normalize_name(key))
    }

    /// Process a key-down at `now` and return every action that fired, in
    /// order: chords first, then the double-tap or plain binding.
    pub fn key_down(&mut self, key: &str, now: Instant) -> Vec<A> {
        let key = normalize_name(key);
        self.held.insert(key.clone());
        trace!(key = %key, held = self.held.len(), "Key down");

        let mut fired = Vec::new();

        for (combo, actions) in &self.combos {
            if combo.is_satisfied(&self.held) {
                debug!(combo = %combo, "Combo fired");
                fired.extend(actions.iter().cloned());
            }
        }

        if let Some(actions) = self.double_tap.get(&key) {
            let is_double = self
                .last_down
                .get(&key)
                .is_some_and(|prev| now.saturating_duration_since(*prev) <= self.double_tap_window);

            if is_double {
                // A third press inside the window starts a new pair
                self.last_down.remove(&key);
                debug!(key = %key, "Double-tap fired");
                fired.extend(actions.iter().cloned());
                return fired;
            }
            self.last_down.insert(key.clone(), now);
        }

        if let Some(actions) = self.press.get(&key) {
            debug!(key = %key, "Key binding fired");
            fired.extend(actions.iter().cloned());
        }

        fired
    }

    pub fn key_up(&mut self, key: &str) {
        let key = normalize_name(key);
        self.held.remove(&key);
        trace!(key = %key, held = self.held.len(), "Key up");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Act {
        Plain,
        Double,
        Chord,
    }

    fn ms(base: Instant, offset: u64) -> Instant {
        base + Duration::from_millis(offset)
    }

    fn tap(mux: &mut InputMultiplexer<Act>, key: &str, at: Instant) -> Vec<Act> {
        let fired = mux.key_down(key, at);
        mux.key_up(key);
        fired
    }

    #[test]
    fn test_plain_press_fires_every_time() {
        let mut mux = InputMultiplexer::new();
        mux.on_press("5", Act::Plain);
        let t0 = Instant::now();

        assert_eq!(tap(&mut mux, "5", t0), vec![Act::Plain]);
        assert_eq!(tap(&mut mux, "5", ms(t0, 50)), vec![Act::Plain]);
        assert!(tap(&mut mux, "6", ms(t0, 60)).is_empty());
    }

    #[test]
    fn test_double_tap_within_window_suppresses_second_plain() {
        let mut mux = InputMultiplexer::new();
        mux.on_press("f9", Act::Plain);
        mux.on_double_tap("f9", Act::Double);
        let t0 = Instant::now();

        assert_eq!(tap(&mut mux, "f9", t0), vec![Act::Plain]);
        assert_eq!(tap(&mut mux, "f9", ms(t0, 200)), vec![Act::Double]);
    }

    #[test]
    fn test_presses_outside_window_fire_plain_both_times() {
        let mut mux = InputMultiplexer::new();
        mux.on_press("f9", Act::Plain);
        mux.on_double_tap("f9", Act::Double);
        let t0 = Instant::now();

        assert_eq!(tap(&mut mux, "f9", t0), vec![Act::Plain]);
        assert_eq!(tap(&mut mux, "f9", ms(t0, 301)), vec![Act::Plain]);
    }

    #[test]
    fn test_window_is_inclusive_at_300ms() {
        let mut mux = InputMultiplexer::new();
        mux.on_double_tap("f9", Act::Double);
        let t0 = Instant::now();

        assert!(tap(&mut mux, "f9", t0).is_empty());
        assert_eq!(tap(&mut mux, "f9", ms(t0, 300)), vec![Act::Double]);
    }

    #[test]
    fn test_third_press_does_not_double_again() {
        let mut mux = InputMultiplexer::new();
        mux.on_press("f9", Act::Plain);
        mux.on_double_tap("f9", Act::Double);
        let t0 = Instant::now();

        assert_eq!(tap(&mut mux, "f9", t0), vec![Act::Plain]);
        assert_eq!(tap(&mut mux, "f9", ms(t0, 100)), vec![Act::Double]);
        // Window does not slide: third press starts a new pair
        assert_eq!(tap(&mut mux, "f9", ms(t0, 200)), vec![Act::Plain]);
        assert_eq!(tap(&mut mux, "f9", ms(t0, 250)), vec![Act::Double]);
    }

    #[test]
    fn test_combo_requires_all_keys_held() {
        let mut mux = InputMultiplexer::new();
        mux.on_combo("alt+shift+m".parse().unwrap(), Act::Chord);
        let t0 = Instant::now();

        assert!(mux.key_down("alt_l", t0).is_empty());
        assert!(mux.key_down("shift_r", ms(t0, 10)).is_empty());
        assert_eq!(mux.key_down("m", ms(t0, 20)), vec![Act::Chord]);
        mux.key_up("m");

        // Releasing shift breaks the chord
        mux.key_up("shift_r");
        assert!(mux.key_down("m", ms(t0, 40)).is_empty());
        mux.key_up("m");
        assert!(!mux.is_held("m"));
        assert!(mux.is_held("alt_l"));
    }

    #[test]
    fn test_combo_refires_while_modifiers_stay_held() {
        let mut mux = InputMultiplexer::new();
        mux.on_combo("alt+shift+m".parse().unwrap(), Act::Chord);
        let t0 = Instant::now();

        mux.key_down("alt_r", t0);
        mux.key_down("shift_l", t0);
        assert_eq!(tap(&mut mux, "m", ms(t0, 10)), vec![Act::Chord]);
        assert_eq!(tap(&mut mux, "m", ms(t0, 20)), vec![Act::Chord]);
    }

    #[test]
    fn test_combo_completes_on_modifier_press() {
        let mut mux = InputMultiplexer::new();
        mux.on_combo("alt+m".parse().unwrap(), Act::Chord);
        let t0 = Instant::now();

        assert!(mux.key_down("m", t0).is_empty());
        assert_eq!(mux.key_down("alt_l", ms(t0, 5)), vec![Act::Chord]);
    }

    #[test]
    fn test_any_key_down_reevaluates_satisfied_combo() {
        let mut mux = InputMultiplexer::new();
        mux.on_combo("alt+m".parse().unwrap(), Act::Chord);
        let t0 = Instant::now();

        mux.key_down("alt_l", t0);
        assert_eq!(mux.key_down("m", ms(t0, 5)), vec![Act::Chord]);
        assert_eq!(mux.key_down("x", ms(t0, 10)), vec![Act::Chord]);
    }

    #[test]
    fn test_combo_and_plain_are_independent() {
        let mut mux = InputMultiplexer::new();
        mux.on_press("m", Act::Plain);
        mux.on_combo("ctrl+m".parse().unwrap(), Act::Chord);
        let t0 = Instant::now();

        mux.key_down("ctrl_l", t0);
        assert_eq!(mux.key_down("m", ms(t0, 5)), vec![Act::Chord, Act::Plain]);
        assert_eq!(mux.binding_count(), 2);
    }

    #[test]
    fn test_key_names_are_case_insensitive() {
        let mut mux = InputMultiplexer::new();
        mux.on_press("F7", Act::Plain);
        assert_eq!(tap(&mut mux, "f7", Instant::now()), vec![Act::Plain]);
    }
}
