//! Global gesture detection.
//!
//! Two detectors are built on the [`source::EventSource`] seam:
//!
//! - [`double_tap::DoubleTapGesture`] — double-tap of a single modifier key
//!   within a bounded window (passive: events always pass through).
//! - [`combo::ComboGesture`] — a modifier+key combination held down, with
//!   press/release edges (intercepting: matching keystrokes are consumed).
//!
//! Both run their state machines on the source's listener thread and hand
//! every user-visible side effect to a worker, so the OS never sees a stalled
//! tap callback.

pub mod combo;
pub mod double_tap;
pub mod source;
pub mod synthetic;

#[cfg(target_os = "macos")]
pub mod quartz;

use crate::error::{Result, SottoError};

/// Virtual key code as reported by the host's event facility.
pub type KeyCode = u16;

/// The four modifier keys a gesture can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    Shift,
    Command,
    Option,
    Control,
}

impl Modifier {
    pub const ALL: [Modifier; 4] = [
        Modifier::Shift,
        Modifier::Command,
        Modifier::Option,
        Modifier::Control,
    ];

    /// Parse a modifier name (common aliases accepted, case-insensitive).
    ///
    /// # Errors
    /// `SottoError::UnsupportedModifier` for anything outside the supported
    /// set.
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "shift" => Ok(Modifier::Shift),
            "command" | "cmd" => Ok(Modifier::Command),
            "option" | "alt" => Ok(Modifier::Option),
            "control" | "ctrl" => Ok(Modifier::Control),
            _ => Err(SottoError::UnsupportedModifier(name.to_string())),
        }
    }

    /// Physical key codes for the left and right variants of this modifier
    /// (macOS virtual key codes from Events.h).
    pub fn key_codes(self) -> (KeyCode, KeyCode) {
        match self {
            Modifier::Shift => (56, 60),
            Modifier::Command => (55, 54),
            Modifier::Option => (58, 61),
            Modifier::Control => (59, 62),
        }
    }

    /// True when `code` is either physical variant of this modifier.
    pub fn matches_key_code(self, code: KeyCode) -> bool {
        let (left, right) = self.key_codes();
        code == left || code == right
    }
}

/// Which modifier keys are currently held, independent of left/right variant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModifierSet {
    pub shift: bool,
    pub command: bool,
    pub option: bool,
    pub control: bool,
}

impl ModifierSet {
    pub const EMPTY: ModifierSet = ModifierSet {
        shift: false,
        command: false,
        option: false,
        control: false,
    };

    pub fn contains(&self, modifier: Modifier) -> bool {
        match modifier {
            Modifier::Shift => self.shift,
            Modifier::Command => self.command,
            Modifier::Option => self.option,
            Modifier::Control => self.control,
        }
    }

    pub fn insert(&mut self, modifier: Modifier) {
        match modifier {
            Modifier::Shift => self.shift = true,
            Modifier::Command => self.command = true,
            Modifier::Option => self.option = true,
            Modifier::Control => self.control = true,
        }
    }

    /// Builder-style insert.
    pub fn with(mut self, modifier: Modifier) -> Self {
        self.insert(modifier);
        self
    }

    /// Copy of this set with `modifier` cleared.
    pub fn without(mut self, modifier: Modifier) -> Self {
        match modifier {
            Modifier::Shift => self.shift = false,
            Modifier::Command => self.command = false,
            Modifier::Option => self.option = false,
            Modifier::Control => self.control = false,
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }

    /// True when every modifier in `other` is also held in `self`.
    pub fn is_superset_of(&self, other: &ModifierSet) -> bool {
        Modifier::ALL
            .iter()
            .all(|m| !other.contains(*m) || self.contains(*m))
    }
}

/// Resolve a key name to its virtual key code (macOS layout).
pub fn key_code_for_name(name: &str) -> Option<KeyCode> {
    let code = match name.trim().to_ascii_lowercase().as_str() {
        "a" => 0,
        "s" => 1,
        "d" => 2,
        "f" => 3,
        "h" => 4,
        "g" => 5,
        "z" => 6,
        "x" => 7,
        "c" => 8,
        "v" => 9,
        "b" => 11,
        "q" => 12,
        "w" => 13,
        "e" => 14,
        "r" => 15,
        "y" => 16,
        "t" => 17,
        "1" => 18,
        "2" => 19,
        "3" => 20,
        "4" => 21,
        "6" => 22,
        "5" => 23,
        "9" => 25,
        "7" => 26,
        "8" => 28,
        "0" => 29,
        "o" => 31,
        "u" => 32,
        "i" => 34,
        "p" => 35,
        "l" => 37,
        "j" => 38,
        "k" => 40,
        "n" => 45,
        "m" => 46,
        "space" => 49,
        "return" => 36,
        "tab" => 48,
        "delete" => 51,
        "escape" => 53,
        "left" => 123,
        "right" => 124,
        "down" => 125,
        "up" => 126,
        "f1" => 122,
        "f2" => 120,
        "f3" => 99,
        "f4" => 118,
        "f5" => 96,
        "f6" => 97,
        "f7" => 98,
        "f8" => 100,
        "f9" => 101,
        "f10" => 109,
        "f11" => 103,
        "f12" => 111,
        _ => return None,
    };
    Some(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_aliases_case_insensitively() {
        assert_eq!(Modifier::parse("Shift").unwrap(), Modifier::Shift);
        assert_eq!(Modifier::parse("CMD").unwrap(), Modifier::Command);
        assert_eq!(Modifier::parse("alt").unwrap(), Modifier::Option);
        assert_eq!(Modifier::parse(" ctrl ").unwrap(), Modifier::Control);
    }

    #[test]
    fn parse_rejects_unknown_modifier() {
        let err = Modifier::parse("hyper").unwrap_err();
        assert!(matches!(
            err,
            crate::error::SottoError::UnsupportedModifier(_)
        ));
    }

    #[test]
    fn left_and_right_variants_match() {
        assert!(Modifier::Shift.matches_key_code(56));
        assert!(Modifier::Shift.matches_key_code(60));
        assert!(!Modifier::Shift.matches_key_code(55));
        assert!(Modifier::Command.matches_key_code(54));
    }

    #[test]
    fn modifier_set_ops() {
        let set = ModifierSet::EMPTY
            .with(Modifier::Command)
            .with(Modifier::Shift);
        assert!(set.contains(Modifier::Command));
        assert!(set.contains(Modifier::Shift));
        assert!(!set.contains(Modifier::Control));
        assert!(!set.is_empty());
        assert!(set.without(Modifier::Command).without(Modifier::Shift).is_empty());
    }

    #[test]
    fn superset_check() {
        let held = ModifierSet::EMPTY
            .with(Modifier::Command)
            .with(Modifier::Shift);
        let target = ModifierSet::EMPTY.with(Modifier::Command);
        assert!(held.is_superset_of(&target));
        assert!(!target.is_superset_of(&held));
        assert!(held.is_superset_of(&ModifierSet::EMPTY));
    }

    #[test]
    fn key_names_resolve() {
        assert_eq!(key_code_for_name("d"), Some(2));
        assert_eq!(key_code_for_name("Space"), Some(49));
        assert_eq!(key_code_for_name("f5"), Some(96));
        assert_eq!(key_code_for_name("hyper"), None);
    }
}
