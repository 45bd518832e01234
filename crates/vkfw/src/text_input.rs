//! Text-input gate
//!
//! Character input is not delivered in the same cycle as the key press that
//! produced it. Backends park the codepoint here and the next retrieval call
//! hands it out before asking the backend for anything else. This keeps the
//! key that opens a text field from also typing into it.
//!
//! The gate holds a single event and a strong reference to its window, so a
//! window destroyed while its character is parked is reclaimed only once the
//! gate lets go of it.

use crate::event::{Event, EventKind};
use crate::keys::Modifiers;
use crate::logging::{debug, LogSource};
use crate::window::{WindowFlags, WindowId, WindowRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingTextInput {
    window: WindowId,
    codepoint: u32,
    x: i32,
    y: i32,
    modifiers: Modifiers,
}

/// Single-slot deferred text input event
#[derive(Debug, Default)]
pub struct TextInputGate {
    pending: Option<PendingTextInput>,
}

impl TextInputGate {
    /// Create an empty gate
    pub const fn new() -> Self {
        Self { pending: None }
    }

    /// Whether an event is parked
    pub const fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Window of the parked event
    pub fn pending_window(&self) -> Option<WindowId> {
        self.pending.map(|p| p.window)
    }

    /// Park a character for `window`
    ///
    /// Does nothing unless text input is enabled on the window. A parked
    /// event is replaced, and its window reference released.
    pub fn queue(
        &mut self,
        windows: &WindowRegistry,
        window: WindowId,
        codepoint: u32,
        x: i32,
        y: i32,
        modifiers: Modifiers,
    ) {
        let enabled = windows
            .flags(window)
            .map_or(false, |flags| flags.contains(WindowFlags::TEXT_INPUT_ENABLED));
        if !enabled || !windows.ref_window(window) {
            return;
        }

        let previous = self.pending.replace(PendingTextInput { window, codepoint, x, y, modifiers });
        if let Some(previous) = previous {
            windows.unref_window(previous.window);
        }
    }

    /// Drop the parked event if it targets `window`
    pub fn discard_for(&mut self, windows: &WindowRegistry, window: WindowId) {
        if self.pending_window() == Some(window) {
            self.clear(windows);
        }
    }

    /// Take the parked event
    ///
    /// The window reference is released whether or not the event is
    /// delivered; events for destroyed windows are dropped.
    pub fn drain(&mut self, windows: &WindowRegistry) -> Option<Event> {
        let pending = self.pending.take()?;
        let deleted = windows.is_deleted(pending.window);

        let event = if deleted {
            debug!(
                target: LogSource::Core.target(),
                "dropping text input for destroyed window {:?}", pending.window
            );
            None
        } else {
            Some(
                Event::new(
                    Some(pending.window),
                    EventKind::TextInput { x: pending.x, y: pending.y, codepoint: pending.codepoint },
                )
                .with_modifiers(pending.modifiers),
            )
        };

        windows.unref_window(pending.window);
        event
    }

    /// Drop whatever is parked
    pub fn clear(&mut self, windows: &WindowRegistry) {
        if let Some(pending) = self.pending.take() {
            windows.unref_window(pending.window);
        }
    }
}
