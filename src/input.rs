//! Input events queued by the caller and replayed into the engine on the next tick.
//!
//! # Main Types
//!
//! - [`MouseEvent`], [`ScrollEvent`], [`KeyEvent`]: queued input, one queue per kind and view.
//! - [`MouseButton`]: mouse buttons (none, left, middle, right).
//! - [`Modifiers`]: keyboard modifiers (Shift, Control, Alt, Meta), using the engine's bit layout.
//! - [`KeyEventKind`]: caller-side key event kinds and their mapping to engine codes.

use crate::queue::truncate_utf8;
use bitflags::bitflags;
use std::fmt::{Debug, Display};

/// Kind of mouse event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum MouseEventKind {
    Moved = 0,
    Down = 1,
    Up = 2,
}

impl MouseEventKind {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(MouseEventKind::Moved),
            1 => Some(MouseEventKind::Down),
            2 => Some(MouseEventKind::Up),
            _ => None,
        }
    }
}

/// Represents a mouse button that can be pressed or released
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum MouseButton {
    /// No button (plain moves)
    None = 0,
    /// Left mouse button pressed (or depressed)
    Left = 1,
    /// Middle mouse button pressed (or depressed)
    Middle = 2,
    /// Right mouse button pressed (or depressed)
    Right = 3,
}

impl MouseButton {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(MouseButton::None),
            1 => Some(MouseButton::Left),
            2 => Some(MouseButton::Middle),
            3 => Some(MouseButton::Right),
            _ => None,
        }
    }
}

impl Display for MouseButton {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MouseButton::None => write!(f, "None"),
            MouseButton::Left => write!(f, "Left"),
            MouseButton::Middle => write!(f, "Middle"),
            MouseButton::Right => write!(f, "Right"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ScrollEventKind {
    ByPixel = 0,
    ByPage = 1,
}

impl ScrollEventKind {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(ScrollEventKind::ByPixel),
            1 => Some(ScrollEventKind::ByPage),
            _ => None,
        }
    }
}

/// Key event kind as the caller submits it.
///
/// The engine numbers its kinds differently, see [`KeyEventKind::engine_code`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum KeyEventKind {
    RawKeyDown = 0,
    KeyDown = 1,
    KeyUp = 2,
    Char = 3,
}

impl KeyEventKind {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(KeyEventKind::RawKeyDown),
            1 => Some(KeyEventKind::KeyDown),
            2 => Some(KeyEventKind::KeyUp),
            3 => Some(KeyEventKind::Char),
            _ => None,
        }
    }

    /// Engine numbering: KeyDown=0, KeyUp=1, RawKeyDown=2, Char=3.
    pub fn engine_code(self) -> u32 {
        match self {
            KeyEventKind::RawKeyDown => 2,
            KeyEventKind::KeyDown => 0,
            KeyEventKind::KeyUp => 1,
            KeyEventKind::Char => 3,
        }
    }
}

bitflags! {
    #[derive(Default)]
    pub struct Modifiers: u32 {
        const ALT     = 0b0001;
        const CONTROL = 0b0010;
        const META    = 0b0100;
        const SHIFT   = 0b1000;
    }
}

impl Display for Modifiers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();

        if self.contains(Modifiers::SHIFT) {
            parts.push("Shift");
        }
        if self.contains(Modifiers::CONTROL) {
            parts.push("Control");
        }
        if self.contains(Modifiers::ALT) {
            parts.push("Alt");
        }
        if self.contains(Modifiers::META) {
            parts.push("Meta");
        }

        if parts.is_empty() {
            write!(f, "None")
        } else {
            write!(f, "{}", parts.join("+"))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseEvent {
    pub kind: MouseEventKind,
    pub x: i32,
    pub y: i32,
    pub button: MouseButton,
}

impl MouseEvent {
    pub fn new(kind: MouseEventKind, x: i32, y: i32, button: MouseButton) -> Self {
        Self { kind, x, y, button }
    }

    /// Clamps the position into `[0, width) x [0, height)`. A zero dimension only clamps at 0.
    pub fn clamped(self, width: u32, height: u32) -> Self {
        let clamp = |v: i32, max: u32| {
            let v = v.max(0);
            if max > 0 {
                v.min(max.saturating_sub(1).min(i32::MAX as u32) as i32)
            } else {
                v
            }
        };
        Self { x: clamp(self.x, width), y: clamp(self.y, height), ..self }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollEvent {
    pub kind: ScrollEventKind,
    pub dx: i32,
    pub dy: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEvent {
    pub kind: KeyEventKind,
    /// Platform virtual key code. Also used as the native key code.
    pub virtual_key: i32,
    pub modifiers: Modifiers,
    /// Text generated by the key, empty for non-character keys.
    pub text: String,
}

impl KeyEvent {
    /// Builds a key event, cutting `text` to `max_text` bytes.
    pub fn new(kind: KeyEventKind, virtual_key: i32, modifiers: Modifiers, text: &str, max_text: usize) -> Self {
        Self {
            kind,
            virtual_key,
            modifiers,
            text: truncate_utf8(text, max_text).to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mousebutton_display() {
        assert_eq!(MouseButton::None.to_string(), "None");
        assert_eq!(MouseButton::Left.to_string(), "Left");
        assert_eq!(MouseButton::Middle.to_string(), "Middle");
        assert_eq!(MouseButton::Right.to_string(), "Right");
    }

    #[test]
    fn modifiers_display_empty_is_none() {
        let m = Modifiers::empty();
        assert_eq!(m.to_string(), "None");
        assert!(!m.contains(Modifiers::SHIFT));
    }

    #[test]
    fn modifiers_display_combo_in_order() {
        let all = Modifiers::SHIFT | Modifiers::CONTROL | Modifiers::ALT | Modifiers::META;
        assert_eq!(all.to_string(), "Shift+Control+Alt+Meta");
        assert_eq!((Modifiers::META | Modifiers::SHIFT).to_string(), "Shift+Meta");
    }

    #[test]
    fn modifier_bits_follow_engine_layout() {
        assert_eq!(Modifiers::ALT.bits(), 1);
        assert_eq!(Modifiers::CONTROL.bits(), 2);
        assert_eq!(Modifiers::META.bits(), 4);
        assert_eq!(Modifiers::SHIFT.bits(), 8);
        // Unknown bits from the C ABI are dropped
        assert_eq!(Modifiers::from_bits_truncate(0xF2), Modifiers::CONTROL);
    }

    #[test]
    fn key_kinds_map_to_engine_codes() {
        assert_eq!(KeyEventKind::RawKeyDown.engine_code(), 2);
        assert_eq!(KeyEventKind::KeyDown.engine_code(), 0);
        assert_eq!(KeyEventKind::KeyUp.engine_code(), 1);
        assert_eq!(KeyEventKind::Char.engine_code(), 3);
        assert_eq!(KeyEventKind::from_code(4), None);
    }

    #[test]
    fn mouse_positions_are_clamped() {
        let e = MouseEvent::new(MouseEventKind::Moved, -5, 900, MouseButton::None);
        let c = e.clamped(800, 600);
        assert_eq!((c.x, c.y), (0, 599));

        let inside = MouseEvent::new(MouseEventKind::Down, 10, 20, MouseButton::Left).clamped(800, 600);
        assert_eq!((inside.x, inside.y), (10, 20));
    }

    #[test]
    fn key_text_is_truncated() {
        let long = "x".repeat(40);
        let e = KeyEvent::new(KeyEventKind::Char, 0x58, Modifiers::empty(), &long, 31);
        assert_eq!(e.text.len(), 31);
    }
}
