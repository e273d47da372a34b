//! Platform-independent input events
//!
//! The window layer translates winit events into these; the interaction
//! controller and tests consume them.

use glam::Vec2;

/// Keys the controller reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    W,
    A,
    S,
    D,
    Escape,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Primary,
    Secondary,
    Middle,
    Other(u16),
}

/// Set of held mouse buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MouseButtons(u8);

impl MouseButtons {
    pub const NONE: Self = Self(0);
    pub const PRIMARY: Self = Self(1 << 0);
    pub const SECONDARY: Self = Self(1 << 1);
    pub const MIDDLE: Self = Self(1 << 2);

    fn bit(button: MouseButton) -> Self {
        match button {
            MouseButton::Primary => Self::PRIMARY,
            MouseButton::Secondary => Self::SECONDARY,
            MouseButton::Middle => Self::MIDDLE,
            MouseButton::Other(_) => Self::NONE,
        }
    }

    pub fn contains(self, other: Self) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, button: MouseButton) {
        self.0 |= Self::bit(button).0;
    }

    pub fn remove(&mut self, button: MouseButton) {
        self.0 &= !Self::bit(button).0;
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for MouseButtons {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// An input event
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    KeyDown(KeyCode),
    KeyUp(KeyCode),
    ButtonDown(MouseButton),
    ButtonUp(MouseButton),
    /// Relative pointer motion in pixels, with the buttons held during it
    MouseMotion { delta: Vec2, buttons: MouseButtons },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_button_mask() {
        let mut buttons = MouseButtons::default();
        buttons.insert(MouseButton::Primary);
        buttons.insert(MouseButton::Middle);
        assert!(buttons.contains(MouseButtons::PRIMARY));
        assert!(!buttons.contains(MouseButtons::SECONDARY));
        assert!(buttons.contains(MouseButtons::PRIMARY | MouseButtons::MIDDLE));

        buttons.remove(MouseButton::Primary);
        buttons.remove(MouseButton::Middle);
        assert!(buttons.is_empty());
    }

    #[test]
    fn test_other_buttons_are_not_tracked() {
        let mut buttons = MouseButtons::default();
        buttons.insert(MouseButton::Other(7));
        assert!(buttons.is_empty());
        assert!(!buttons.contains(MouseButtons::NONE));
    }
}
