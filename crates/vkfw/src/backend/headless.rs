//! In-memory backend
//!
//! The headless backend has no display. Its input comes from a
//! [`HeadlessController`], which can be handed to another thread or kept by
//! a test. Input is scheduled at absolute times on the session clock, so
//! combined with [`ManualClock`](crate::time::ManualClock) every wait and
//! deadline is deterministic.
//!
//! It behaves like a keyboard-and-pointer backend:
//! - raw key input becomes key events and feeds the text-input gate,
//! - keyboard focus holds a window reference until focus moves on,
//! - input aimed at a destroyed window is consumed internally,
//! - a scripted disconnect surfaces as a lost surface.

use std::any::Any;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use crate::backend::{BackendCaps, WindowBackend};
use crate::error::{VkfwError, VkfwResult};
use crate::event::{Event, EventKind};
use crate::keys::{Key, KeyTable, KeyTranslator, Keycode, Modifiers, PointerMode};
use crate::logging::{debug, trace, LogSource};
use crate::session::Context;
use crate::time::{EventMode, EventWait, MILLIS};
use crate::window::{BackendData, WindowId, WindowRegistry};

/// How often a blocking wait re-checks for input fed from other threads
const POLL_INTERVAL: u64 = MILLIS;

/// X11-style keycodes of a US layout
const US_LAYOUT: &[(Keycode, Key)] = &[
    (9, Key::Esc),
    (10, Key::Num1),
    (11, Key::Num2),
    (12, Key::Num3),
    (13, Key::Num4),
    (14, Key::Num5),
    (15, Key::Num6),
    (16, Key::Num7),
    (17, Key::Num8),
    (18, Key::Num9),
    (19, Key::Num0),
    (22, Key::Backspace),
    (24, Key::Q),
    (25, Key::W),
    (26, Key::E),
    (27, Key::R),
    (28, Key::T),
    (29, Key::Y),
    (30, Key::U),
    (31, Key::I),
    (32, Key::O),
    (33, Key::P),
    (37, Key::LeftCtrl),
    (38, Key::A),
    (39, Key::S),
    (40, Key::D),
    (41, Key::F),
    (42, Key::G),
    (43, Key::H),
    (44, Key::J),
    (45, Key::K),
    (46, Key::L),
    (50, Key::LeftShift),
    (52, Key::Z),
    (53, Key::X),
    (54, Key::C),
    (55, Key::V),
    (56, Key::B),
    (57, Key::N),
    (58, Key::M),
    (62, Key::RightShift),
    (64, Key::LeftAlt),
    (65, Key::Space),
    (67, Key::F1),
    (68, Key::F2),
    (69, Key::F3),
    (70, Key::F4),
    (71, Key::F5),
    (72, Key::F6),
    (73, Key::F7),
    (74, Key::F8),
    (75, Key::F9),
    (76, Key::F10),
    (95, Key::F11),
    (96, Key::F12),
    (105, Key::RightCtrl),
    (108, Key::RightAlt),
    (110, Key::Home),
    (111, Key::ArrowUp),
    (112, Key::PageUp),
    (113, Key::ArrowLeft),
    (114, Key::ArrowRight),
    (115, Key::End),
    (116, Key::ArrowDown),
    (117, Key::PageDown),
    (118, Key::Insert),
    (119, Key::Del),
];

/// Scripted input for the headless backend
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HeadlessInput {
    /// Deliver an event as-is
    Event(Event),
    /// Something only the backend cares about
    Internal,
    /// A physical key changed state
    Key {
        /// Focused window
        window: WindowId,
        /// Raw keycode
        keycode: Keycode,
        /// Press or release
        pressed: bool,
        /// Character the press produced, if any
        text: Option<char>,
    },
    /// The pointer moved to a new position
    Pointer {
        /// Window under the pointer
        window: WindowId,
        /// New x
        x: i32,
        /// New y
        y: i32,
    },
    /// Keyboard focus moved to a window
    FocusIn(WindowId),
    /// Keyboard focus left its window
    FocusOut,
    /// The display connection broke
    Disconnect,
}

#[derive(Debug, Clone, Copy)]
struct Scheduled {
    available_at: u64,
    input: HeadlessInput,
}

/// Per-window backend data
#[derive(Debug)]
struct HeadlessWindow {
    title: String,
    visible: bool,
    pointer_mode: PointerMode,
    frees: Arc<AtomicUsize>,
}

impl Drop for HeadlessWindow {
    fn drop(&mut self) {
        self.frees.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Default)]
struct HeadlessState {
    connected: bool,
    registry: Option<WindowRegistry>,
    inputs: VecDeque<Scheduled>,
    focus: Option<WindowId>,
    pointer: (i32, i32),
    modifiers: Modifiers,
    fail_next_create: bool,
    dispatches: usize,
}

fn lock(state: &Mutex<HeadlessState>) -> MutexGuard<'_, HeadlessState> {
    state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Backend without a display
pub struct HeadlessBackend {
    state: Arc<Mutex<HeadlessState>>,
    keymap: Arc<RwLock<KeyTable>>,
    frees: Arc<AtomicUsize>,
    caps: BackendCaps,
    refuse_connection: bool,
}

/// Handle for feeding and inspecting a [`HeadlessBackend`]
#[derive(Clone)]
pub struct HeadlessController {
    state: Arc<Mutex<HeadlessState>>,
    keymap: Arc<RwLock<KeyTable>>,
    frees: Arc<AtomicUsize>,
}

impl HeadlessBackend {
    /// Create a backend and the controller that drives it
    pub fn new() -> (Self, HeadlessController) {
        let state = Arc::new(Mutex::new(HeadlessState::default()));
        let keymap = Arc::new(RwLock::new(KeyTable::from_pairs(US_LAYOUT.iter().copied())));
        let frees = Arc::new(AtomicUsize::new(0));

        let controller = HeadlessController {
            state: state.clone(),
            keymap: keymap.clone(),
            frees: frees.clone(),
        };
        let backend = Self {
            state,
            keymap,
            frees,
            caps: BackendCaps::ALLOC_WINDOW
                | BackendCaps::CLOSE_CONNECTION
                | BackendCaps::SHOW_WINDOW
                | BackendCaps::HIDE_WINDOW
                | BackendCaps::SET_TITLE
                | BackendCaps::UPDATE_POINTER_MODE
                | BackendCaps::GET_EVENT,
            refuse_connection: false,
        };
        (backend, controller)
    }

    /// A backend whose connection attempt always fails
    pub fn failing_connection() -> (Self, HeadlessController) {
        let (mut backend, controller) = Self::new();
        backend.refuse_connection = true;
        (backend, controller)
    }

    /// Also provide a backend-driven `dispatch_events`
    #[must_use]
    pub fn with_dispatch(mut self) -> Self {
        self.caps |= BackendCaps::DISPATCH_EVENTS;
        self
    }

    /// Only advertise capabilities within `caps`
    #[must_use]
    pub fn limit_capabilities(mut self, caps: BackendCaps) -> Self {
        self.caps &= caps;
        self
    }

    fn state(&self) -> MutexGuard<'_, HeadlessState> {
        lock(&self.state)
    }

    /// Pop the first input due at `now`
    fn take_due(&self, now: u64) -> Option<HeadlessInput> {
        let mut state = self.state();
        if state.inputs.front().map_or(false, |s| s.available_at <= now) {
            state.inputs.pop_front().map(|s| s.input)
        } else {
            None
        }
    }

    fn next_available(&self) -> Option<u64> {
        self.state().inputs.front().map(|s| s.available_at)
    }

    fn targets_dead_window(cx: &Context, window: Option<WindowId>) -> bool {
        window.map_or(false, |w| cx.windows().is_deleted(w))
    }

    /// Turn one scripted input into what the application sees
    fn process(&mut self, cx: &mut Context, input: HeadlessInput) -> VkfwResult<Event> {
        match input {
            HeadlessInput::Event(event) => {
                if Self::targets_dead_window(cx, event.window) {
                    trace!(target: LogSource::Backend.target(), "event for destroyed window dropped");
                    return Ok(Event::null());
                }
                Ok(event)
            }
            HeadlessInput::Internal => Ok(Event::null()),
            HeadlessInput::Key { window, keycode, pressed, text } => {
                if Self::targets_dead_window(cx, Some(window)) {
                    return Ok(Event::null());
                }
                let ((x, y), modifiers) = {
                    let state = self.state();
                    (state.pointer, state.modifiers)
                };
                if pressed {
                    if let Some(c) = text {
                        cx.queue_text_input_event(window, u32::from(c), x, y, modifiers);
                    }
                }

                let kind = if pressed {
                    EventKind::KeyPressed { x, y, key: Key::Unknown, keycode }
                } else {
                    EventKind::KeyReleased { x, y, key: Key::Unknown, keycode }
                };
                Ok(Event::new(Some(window), kind).with_modifiers(modifiers))
            }
            HeadlessInput::Pointer { window, x, y } => {
                if Self::targets_dead_window(cx, Some(window)) {
                    return Ok(Event::null());
                }
                let (previous, modifiers) = {
                    let mut state = self.state();
                    (std::mem::replace(&mut state.pointer, (x, y)), state.modifiers)
                };
                let relative = cx
                    .windows()
                    .pointer_mode(window)
                    .map_or(false, |mode| mode.contains(PointerMode::RELATIVE));

                let kind = if relative {
                    EventKind::RelativePointerMotion { dx: x - previous.0, dy: y - previous.1 }
                } else {
                    EventKind::PointerMotion { x, y }
                };
                Ok(Event::new(Some(window), kind).with_modifiers(modifiers))
            }
            HeadlessInput::FocusIn(window) => {
                if !cx.ref_window(window) {
                    return Ok(Event::null());
                }
                let previous = self.state().focus.replace(window);
                if let Some(previous) = previous {
                    cx.unref_window(previous);
                }
                if cx.windows().is_deleted(window) {
                    return Ok(Event::null());
                }
                Ok(Event::new(Some(window), EventKind::WindowGainedFocus))
            }
            HeadlessInput::FocusOut => {
                let Some(window) = self.state().focus.take() else {
                    return Ok(Event::null());
                };
                let event = if cx.windows().is_deleted(window) {
                    Event::null()
                } else {
                    Event::new(Some(window), EventKind::WindowLostFocus)
                };
                cx.unref_window(window);
                Ok(event)
            }
            HeadlessInput::Disconnect => {
                debug!(target: LogSource::Backend.target(), "headless connection dropped");
                self.state().connected = false;
                Err(VkfwError::SurfaceLost)
            }
        }
    }

    fn release_focus(&self, cx: &Context) {
        let focus = self.state().focus.take();
        if let Some(window) = focus {
            cx.unref_window(window);
        }
    }
}

impl WindowBackend for HeadlessBackend {
    fn name(&self) -> &'static str {
        "headless"
    }

    fn capabilities(&self) -> BackendCaps {
        self.caps
    }

    fn open_connection(&mut self, cx: &mut Context) -> VkfwResult<()> {
        if self.refuse_connection {
            return Err(VkfwError::InitializationFailed("headless display refused connection".into()));
        }
        let mut state = self.state();
        state.connected = true;
        state.registry = Some(cx.windows().clone());
        debug!(target: LogSource::Backend.target(), "headless connection open");
        Ok(())
    }

    fn close_connection(&mut self, cx: &mut Context) {
        self.release_focus(cx);
        let mut state = self.state();
        state.connected = false;
        state.inputs.clear();
        debug!(target: LogSource::Backend.target(), "headless connection closed");
    }

    fn alloc_window(&mut self) -> VkfwResult<Option<BackendData>> {
        Ok(Some(Box::new(HeadlessWindow {
            title: String::new(),
            visible: false,
            pointer_mode: PointerMode::empty(),
            frees: self.frees.clone(),
        })))
    }

    fn create_window(&mut self, _cx: &mut Context, window: WindowId) -> VkfwResult<()> {
        let mut state = self.state();
        if !state.connected {
            return Err(VkfwError::SurfaceLost);
        }
        if std::mem::take(&mut state.fail_next_create) {
            return Err(VkfwError::InitializationFailed("scripted window creation failure".into()));
        }
        trace!(target: LogSource::Backend.target(), "headless window {window:?} created");
        Ok(())
    }

    fn destroy_window(&mut self, cx: &mut Context, window: WindowId) {
        cx.windows().with_backend_data(window, |w: &mut HeadlessWindow| w.visible = false);
        trace!(target: LogSource::Backend.target(), "headless window {window:?} destroyed");
    }

    fn show_window(&mut self, cx: &mut Context, window: WindowId) -> VkfwResult<()> {
        cx.windows()
            .with_backend_data(window, |w: &mut HeadlessWindow| w.visible = true)
            .ok_or(VkfwError::InvalidWindow)
    }

    fn hide_window(&mut self, cx: &mut Context, window: WindowId) -> VkfwResult<()> {
        cx.windows()
            .with_backend_data(window, |w: &mut HeadlessWindow| w.visible = false)
            .ok_or(VkfwError::InvalidWindow)
    }

    fn set_title(&mut self, cx: &mut Context, window: WindowId, title: &str) -> VkfwResult<()> {
        cx.windows()
            .with_backend_data(window, |w: &mut HeadlessWindow| w.title = title.to_owned())
            .ok_or(VkfwError::InvalidWindow)
    }

    fn update_pointer_mode(&mut self, cx: &mut Context, window: WindowId, mode: PointerMode) -> VkfwResult<()> {
        cx.windows()
            .with_backend_data(window, |w: &mut HeadlessWindow| w.pointer_mode = mode)
            .ok_or(VkfwError::InvalidWindow)
    }

    fn get_event(&mut self, cx: &mut Context, wait: EventWait) -> VkfwResult<Event> {
        if !self.state().connected {
            return Err(VkfwError::SurfaceLost);
        }

        let deadline = wait.deadline(cx.time());
        loop {
            if let Some(input) = self.take_due(cx.time()) {
                return self.process(cx, input);
            }

            let now = cx.time();
            if deadline.map_or(false, |d| now >= d) {
                return Ok(Event::none());
            }

            let mut wake = now.saturating_add(POLL_INTERVAL);
            if let Some(d) = deadline {
                wake = wake.min(d);
            }
            if let Some(next) = self.next_available() {
                wake = wake.min(next.max(now));
            }
            cx.delay_until(wake);
        }
    }

    fn dispatch_events(&mut self, cx: &mut Context, mode: EventMode, timeout: u64) -> VkfwResult<()> {
        self.state().dispatches += 1;

        let wait = EventWait::new(mode, timeout);
        let start = cx.time();
        loop {
            cx.deliver_pending_text_input();
            let event = self.get_event(cx, wait.rebase(start, cx.time()))?;
            if event.is_none() {
                return Ok(());
            }
            if !event.is_null() {
                cx.send_event_to_application(event);
            }
        }
    }

    fn key_translator(&self) -> Option<Arc<dyn KeyTranslator>> {
        let translator: Arc<dyn KeyTranslator> = self.keymap.clone();
        Some(translator)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl HeadlessController {
    /// Deliver `input` as soon as possible
    pub fn push(&self, input: HeadlessInput) {
        self.push_at(0, input);
    }

    /// Deliver `input` once the session clock reaches `time`
    ///
    /// Inputs due at the same time keep their push order.
    pub fn push_at(&self, time: u64, input: HeadlessInput) {
        let mut state = lock(&self.state);
        let index = state.inputs.partition_point(|s| s.available_at <= time);
        state.inputs.insert(index, Scheduled { available_at: time, input });
    }

    /// Number of inputs not yet consumed
    pub fn pending(&self) -> usize {
        lock(&self.state).inputs.len()
    }

    /// Make the next window creation fail
    pub fn fail_next_create(&self) {
        lock(&self.state).fail_next_create = true;
    }

    /// Modifiers reported with subsequent input
    pub fn set_modifiers(&self, modifiers: Modifiers) {
        lock(&self.state).modifiers = modifiers;
    }

    /// Switch keyboard layout
    pub fn set_keymap(&self, pairs: impl IntoIterator<Item = (Keycode, Key)>) {
        let mut table = self.keymap.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        table.rebuild(pairs);
    }

    /// Whether the backend is connected
    pub fn is_connected(&self) -> bool {
        lock(&self.state).connected
    }

    /// Window currently holding keyboard focus
    pub fn focus(&self) -> Option<WindowId> {
        lock(&self.state).focus
    }

    /// How many times the backend ran its own dispatch loop
    pub fn backend_dispatches(&self) -> usize {
        lock(&self.state).dispatches
    }

    /// How many windows have had their backend data freed
    pub fn freed_windows(&self) -> usize {
        self.frees.load(Ordering::SeqCst)
    }

    fn with_window<R>(&self, window: WindowId, f: impl FnOnce(&mut HeadlessWindow) -> R) -> Option<R> {
        let registry = lock(&self.state).registry.clone()?;
        registry.with_backend_data(window, f)
    }

    /// Current title of a window
    pub fn title(&self, window: WindowId) -> Option<String> {
        self.with_window(window, |w| w.title.clone())
    }

    /// Whether a window is shown
    pub fn is_visible(&self, window: WindowId) -> bool {
        self.with_window(window, |w| w.visible).unwrap_or(false)
    }

    /// Pointer mode the backend last applied to a window
    pub fn pointer_mode(&self, window: WindowId) -> Option<PointerMode> {
        self.with_window(window, |w| w.pointer_mode)
    }
}

impl std::fmt::Debug for HeadlessBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeadlessBackend").field("caps", &self.caps).finish_non_exhaustive()
    }
}

impl std::fmt::Debug for HeadlessController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeadlessController").field("pending", &self.pending()).finish_non_exhaustive()
    }
}
