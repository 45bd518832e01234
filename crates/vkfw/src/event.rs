//! The portable event model
//!
//! Every backend normalizes its native events into [`Event`]. The numeric
//! [`EventType`] codes are stable: applications written against one release
//! keep matching on the same codes in the next.
//!
//! Two event kinds never describe input:
//! - [`EventKind::None`] means the wait elapsed without anything happening.
//! - [`EventKind::Null`] means something happened but the library consumed it
//!   internally. The retrieval functions swallow these; backends produce them.

use ash::vk;

use crate::keys::{Key, Keycode, Modifiers, MouseButton, ScrollDirection};
use crate::session::Context;
use crate::window::WindowId;

/// Stable numeric event type codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum EventType {
    /// No event was delivered
    None = 0,
    /// Event consumed internally
    Null = 1,
    /// The user asked to close the window
    WindowCloseRequest = 2,
    /// The framebuffer size changed
    WindowResizeNotify = 3,
    /// The window lost keyboard focus
    WindowLostFocus = 4,
    /// The window gained keyboard focus
    WindowGainedFocus = 5,
    /// Absolute pointer motion
    PointerMotion = 6,
    /// Mouse button pressed
    ButtonPressed = 7,
    /// Mouse button released
    ButtonReleased = 8,
    /// Wheel scroll
    Scroll = 9,
    /// Key pressed
    KeyPressed = 10,
    /// Key released
    KeyReleased = 11,
    /// Unicode text input
    TextInput = 12,
    /// Relative pointer motion
    RelativePointerMotion = 13,
}

impl EventType {
    /// Numeric code
    pub const fn code(self) -> i32 {
        self as i32
    }
}

/// Event payload
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EventKind {
    /// See [`EventType::None`]
    None,
    /// See [`EventType::Null`]
    Null,
    /// Close button or window manager close
    WindowCloseRequest,
    /// New framebuffer extent
    WindowResizeNotify {
        /// Extent in pixels
        extent: vk::Extent2D,
    },
    /// Keyboard focus left the window
    WindowLostFocus,
    /// Keyboard focus entered the window
    WindowGainedFocus,
    /// Pointer moved inside the window
    PointerMotion {
        /// Pointer x in window coordinates
        x: i32,
        /// Pointer y in window coordinates
        y: i32,
    },
    /// Mouse button pressed
    ButtonPressed {
        /// Pointer x
        x: i32,
        /// Pointer y
        y: i32,
        /// Which button
        button: MouseButton,
    },
    /// Mouse button released
    ButtonReleased {
        /// Pointer x
        x: i32,
        /// Pointer y
        y: i32,
        /// Which button
        button: MouseButton,
    },
    /// Wheel scroll
    Scroll {
        /// Pointer x
        x: i32,
        /// Pointer y
        y: i32,
        /// Scroll axis
        direction: ScrollDirection,
        /// Signed magnitude; the sign convention is backend defined
        value: i32,
    },
    /// Key pressed
    KeyPressed {
        /// Pointer x
        x: i32,
        /// Pointer y
        y: i32,
        /// Logical key, filled in by the core from `keycode`
        key: Key,
        /// Raw platform keycode
        keycode: Keycode,
    },
    /// Key released
    KeyReleased {
        /// Pointer x
        x: i32,
        /// Pointer y
        y: i32,
        /// Logical key, filled in by the core from `keycode`
        key: Key,
        /// Raw platform keycode
        keycode: Keycode,
    },
    /// A character was typed into a window with text input enabled
    TextInput {
        /// Pointer x
        x: i32,
        /// Pointer y
        y: i32,
        /// Unicode scalar value
        codepoint: u32,
    },
    /// Relative pointer motion (pointer mode `RELATIVE`)
    RelativePointerMotion {
        /// Horizontal delta
        dx: i32,
        /// Vertical delta
        dy: i32,
    },
}

/// One event as seen by the application
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Event {
    /// Window the event concerns, if any
    ///
    /// This is a borrowed handle: it is only guaranteed to be alive while
    /// the event is being handled.
    pub window: Option<WindowId>,
    /// Payload
    pub kind: EventKind,
    /// Modifiers active when an input event happened
    pub modifiers: Modifiers,
}

impl Event {
    /// Create an event for a window
    pub const fn new(window: Option<WindowId>, kind: EventKind) -> Self {
        Self { window, kind, modifiers: Modifiers::empty() }
    }

    /// Nothing happened
    pub const fn none() -> Self {
        Self::new(None, EventKind::None)
    }

    /// Something happened that the application does not get to see
    pub const fn null() -> Self {
        Self::new(None, EventKind::Null)
    }

    /// Builder-style modifier setter
    #[must_use]
    pub const fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    /// Whether no event was delivered
    pub const fn is_none(&self) -> bool {
        matches!(self.kind, EventKind::None)
    }

    /// Whether this event was consumed internally
    pub const fn is_null(&self) -> bool {
        matches!(self.kind, EventKind::Null)
    }

    /// Stable type code of the event
    pub const fn event_type(&self) -> EventType {
        match self.kind {
            EventKind::None => EventType::None,
            EventKind::Null => EventType::Null,
            EventKind::WindowCloseRequest => EventType::WindowCloseRequest,
            EventKind::WindowResizeNotify { .. } => EventType::WindowResizeNotify,
            EventKind::WindowLostFocus => EventType::WindowLostFocus,
            EventKind::WindowGainedFocus => EventType::WindowGainedFocus,
            EventKind::PointerMotion { .. } => EventType::PointerMotion,
            EventKind::ButtonPressed { .. } => EventType::ButtonPressed,
            EventKind::ButtonReleased { .. } => EventType::ButtonReleased,
            EventKind::Scroll { .. } => EventType::Scroll,
            EventKind::KeyPressed { .. } => EventType::KeyPressed,
            EventKind::KeyReleased { .. } => EventType::KeyReleased,
            EventKind::TextInput { .. } => EventType::TextInput,
            EventKind::RelativePointerMotion { .. } => EventType::RelativePointerMotion,
        }
    }

    /// Logical key of a key event
    pub const fn key(&self) -> Option<Key> {
        match self.kind {
            EventKind::KeyPressed { key, .. } | EventKind::KeyReleased { key, .. } => Some(key),
            _ => None,
        }
    }

    /// Codepoint of a text input event as a `char`
    pub fn text(&self) -> Option<char> {
        match self.kind {
            EventKind::TextInput { codepoint, .. } => char::from_u32(codepoint),
            _ => None,
        }
    }
}

impl Default for Event {
    fn default() -> Self {
        Self::none()
    }
}

/// Mark an event the application has no case for
///
/// Handlers should call this from the fallback arm of their `match` so that
/// event types added in later releases are explicitly ignored. It does
/// nothing.
#[inline]
pub fn unhandled_event(_event: &Event) {}

/// Application-side receiver of dispatched events
///
/// The handler gets the session [`Context`] so it can call back into the
/// library (enable text input, look up user data, ...) while an event is
/// being delivered.
pub trait EventHandler {
    /// Handle one event
    fn on_event(&mut self, cx: &mut Context, event: &Event);
}

impl<F> EventHandler for F
where
    F: FnMut(&mut Context, &Event),
{
    fn on_event(&mut self, cx: &mut Context, event: &Event) {
        self(cx, event);
    }
}
