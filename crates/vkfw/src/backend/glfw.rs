//! GLFW desktop backend
//!
//! Creates Vulkan-capable windows (no client API) through GLFW and maps its
//! callbacks onto the VKFW event model. GLFW reports input per window in
//! batches, so translated events are buffered and handed out one at a time.
//!
//! Keycodes are GLFW scancodes. The key table is built from GLFW's own
//! key-to-scancode query when the connection opens.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use ash::vk;

use crate::backend::queue::InputQueue;
use crate::backend::{BackendCaps, WindowBackend};
use crate::error::{VkfwError, VkfwResult};
use crate::event::{Event, EventKind};
use crate::keys::{Key, KeyTable, KeyTranslator, Modifiers, MouseButton, PointerMode, ScrollDirection};
use crate::logging::{debug, trace, warn, LogSource};
use crate::session::Context;
use crate::time::{EventWait, SECONDS};
use crate::window::WindowId;

/// GLFW scancodes go well past 255 on some platforms
const SCANCODE_RANGE: usize = 512;

const GLFW_KEYS: &[(glfw::Key, Key)] = &[
    (glfw::Key::Space, Key::Space),
    (glfw::Key::Num0, Key::Num0),
    (glfw::Key::Num1, Key::Num1),
    (glfw::Key::Num2, Key::Num2),
    (glfw::Key::Num3, Key::Num3),
    (glfw::Key::Num4, Key::Num4),
    (glfw::Key::Num5, Key::Num5),
    (glfw::Key::Num6, Key::Num6),
    (glfw::Key::Num7, Key::Num7),
    (glfw::Key::Num8, Key::Num8),
    (glfw::Key::Num9, Key::Num9),
    (glfw::Key::A, Key::A),
    (glfw::Key::B, Key::B),
    (glfw::Key::C, Key::C),
    (glfw::Key::D, Key::D),
    (glfw::Key::E, Key::E),
    (glfw::Key::F, Key::F),
    (glfw::Key::G, Key::G),
    (glfw::Key::H, Key::H),
    (glfw::Key::I, Key::I),
    (glfw::Key::J, Key::J),
    (glfw::Key::K, Key::K),
    (glfw::Key::L, Key::L),
    (glfw::Key::M, Key::M),
    (glfw::Key::N, Key::N),
    (glfw::Key::O, Key::O),
    (glfw::Key::P, Key::P),
    (glfw::Key::Q, Key::Q),
    (glfw::Key::R, Key::R),
    (glfw::Key::S, Key::S),
    (glfw::Key::T, Key::T),
    (glfw::Key::U, Key::U),
    (glfw::Key::V, Key::V),
    (glfw::Key::W, Key::W),
    (glfw::Key::X, Key::X),
    (glfw::Key::Y, Key::Y),
    (glfw::Key::Z, Key::Z),
    (glfw::Key::Backspace, Key::Backspace),
    (glfw::Key::LeftControl, Key::LeftCtrl),
    (glfw::Key::LeftShift, Key::LeftShift),
    (glfw::Key::LeftAlt, Key::LeftAlt),
    (glfw::Key::RightControl, Key::RightCtrl),
    (glfw::Key::RightShift, Key::RightShift),
    (glfw::Key::RightAlt, Key::RightAlt),
    (glfw::Key::F1, Key::F1),
    (glfw::Key::F2, Key::F2),
    (glfw::Key::F3, Key::F3),
    (glfw::Key::F4, Key::F4),
    (glfw::Key::F5, Key::F5),
    (glfw::Key::F6, Key::F6),
    (glfw::Key::F7, Key::F7),
    (glfw::Key::F8, Key::F8),
    (glfw::Key::F9, Key::F9),
    (glfw::Key::F10, Key::F10),
    (glfw::Key::F11, Key::F11),
    (glfw::Key::F12, Key::F12),
    (glfw::Key::F13, Key::F13),
    (glfw::Key::F14, Key::F14),
    (glfw::Key::F15, Key::F15),
    (glfw::Key::F16, Key::F16),
    (glfw::Key::F17, Key::F17),
    (glfw::Key::F18, Key::F18),
    (glfw::Key::F19, Key::F19),
    (glfw::Key::F20, Key::F20),
    (glfw::Key::F21, Key::F21),
    (glfw::Key::F22, Key::F22),
    (glfw::Key::F23, Key::F23),
    (glfw::Key::F24, Key::F24),
    (glfw::Key::F25, Key::F25),
    (glfw::Key::Escape, Key::Esc),
    (glfw::Key::Delete, Key::Del),
    (glfw::Key::Insert, Key::Insert),
    (glfw::Key::Home, Key::Home),
    (glfw::Key::End, Key::End),
    (glfw::Key::PageUp, Key::PageUp),
    (glfw::Key::PageDown, Key::PageDown),
    (glfw::Key::KpDivide, Key::NumpadDivide),
    (glfw::Key::KpMultiply, Key::NumpadMultiply),
    (glfw::Key::KpSubtract, Key::NumpadSubtract),
    (glfw::Key::KpAdd, Key::NumpadAdd),
    (glfw::Key::KpEnter, Key::NumpadEnter),
    (glfw::Key::Kp0, Key::Numpad0),
    (glfw::Key::Kp1, Key::Numpad1),
    (glfw::Key::Kp2, Key::Numpad2),
    (glfw::Key::Kp3, Key::Numpad3),
    (glfw::Key::Kp4, Key::Numpad4),
    (glfw::Key::Kp5, Key::Numpad5),
    (glfw::Key::Kp6, Key::Numpad6),
    (glfw::Key::Kp7, Key::Numpad7),
    (glfw::Key::Kp8, Key::Numpad8),
    (glfw::Key::Kp9, Key::Numpad9),
    (glfw::Key::Left, Key::ArrowLeft),
    (glfw::Key::Right, Key::ArrowRight),
    (glfw::Key::Up, Key::ArrowUp),
    (glfw::Key::Down, Key::ArrowDown),
    (glfw::Key::KpDecimal, Key::NumpadComma),
];

struct GlfwWindow {
    window: glfw::PWindow,
    events: glfw::GlfwReceiver<(f64, glfw::WindowEvent)>,
    cursor: (f64, f64),
    modifiers: Modifiers,
}

/// Backend on top of GLFW
pub struct GlfwBackend {
    glfw: Option<glfw::Glfw>,
    windows: HashMap<WindowId, GlfwWindow>,
    pending: InputQueue,
    keymap: Arc<RwLock<KeyTable>>,
}

impl GlfwBackend {
    /// Create an unconnected backend
    pub fn new() -> Self {
        Self {
            glfw: None,
            windows: HashMap::new(),
            pending: InputQueue::new(),
            keymap: Arc::new(RwLock::new(KeyTable::with_keycode_range(SCANCODE_RANGE))),
        }
    }

    fn build_keymap(&self) {
        let pairs = GLFW_KEYS
            .iter()
            .filter_map(|&(glfw_key, key)| glfw::get_key_scancode(Some(glfw_key)).map(|code| (code, key)));

        let mut table = self.keymap.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        table.rebuild(pairs);
        debug!(
            target: LogSource::Backend.target(),
            "glfw keymap built with {} keycodes",
            table.mapped_keycodes()
        );
    }

    fn window_mut(&mut self, window: WindowId) -> VkfwResult<&mut GlfwWindow> {
        self.windows.get_mut(&window).ok_or(VkfwError::InvalidWindow)
    }

    /// Drain GLFW's per-window queues into `pending`
    #[allow(clippy::cast_possible_truncation)]
    fn collect(&mut self, cx: &Context) -> VkfwResult<()> {
        for (&id, state) in &mut self.windows {
            let relative = cx
                .windows()
                .pointer_mode(id)
                .map_or(false, |mode| mode.contains(PointerMode::RELATIVE));

            for (_, event) in glfw::flush_messages(&state.events) {
                let (x, y) = (state.cursor.0 as i32, state.cursor.1 as i32);
                let kind = match event {
                    glfw::WindowEvent::Close => EventKind::WindowCloseRequest,
                    glfw::WindowEvent::FramebufferSize(w, h) => EventKind::WindowResizeNotify {
                        extent: vk::Extent2D {
                            width: u32::try_from(w).unwrap_or(0),
                            height: u32::try_from(h).unwrap_or(0),
                        },
                    },
                    glfw::WindowEvent::Focus(true) => EventKind::WindowGainedFocus,
                    glfw::WindowEvent::Focus(false) => EventKind::WindowLostFocus,
                    glfw::WindowEvent::CursorPos(nx, ny) => {
                        let previous = std::mem::replace(&mut state.cursor, (nx, ny));
                        if relative {
                            EventKind::RelativePointerMotion {
                                dx: (nx - previous.0) as i32,
                                dy: (ny - previous.1) as i32,
                            }
                        } else {
                            EventKind::PointerMotion { x: nx as i32, y: ny as i32 }
                        }
                    }
                    glfw::WindowEvent::MouseButton(button, action, mods) => {
                        state.modifiers = translate_modifiers(mods);
                        let button = MouseButton::from_id(button as i32 + 1);
                        match action {
                            glfw::Action::Release => EventKind::ButtonReleased { x, y, button },
                            _ => EventKind::ButtonPressed { x, y, button },
                        }
                    }
                    glfw::WindowEvent::Scroll(dx, dy) => {
                        if dy != 0.0 {
                            self.pending.push_event(
                                Event::new(
                                    Some(id),
                                    EventKind::Scroll {
                                        x,
                                        y,
                                        direction: ScrollDirection::Vertical,
                                        value: dy.round() as i32,
                                    },
                                )
                                .with_modifiers(state.modifiers),
                            )?;
                        }
                        if dx == 0.0 {
                            continue;
                        }
                        EventKind::Scroll { x, y, direction: ScrollDirection::Horizontal, value: dx.round() as i32 }
                    }
                    glfw::WindowEvent::Key(_, scancode, action, mods) => {
                        state.modifiers = translate_modifiers(mods);
                        match action {
                            glfw::Action::Release => {
                                EventKind::KeyReleased { x, y, key: Key::Unknown, keycode: scancode }
                            }
                            // repeats are reported as presses
                            _ => EventKind::KeyPressed { x, y, key: Key::Unknown, keycode: scancode },
                        }
                    }
                    glfw::WindowEvent::Char(c) => {
                        self.pending.push_text(id, u32::from(c), x, y, state.modifiers)?;
                        continue;
                    }
                    other => {
                        trace!(target: LogSource::Backend.target(), "ignored glfw event {other:?}");
                        continue;
                    }
                };

                self.pending.push_event(Event::new(Some(id), kind).with_modifiers(state.modifiers))?;
            }
        }
        Ok(())
    }
}

impl Default for GlfwBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn translate_modifiers(mods: glfw::Modifiers) -> Modifiers {
    let mut modifiers = Modifiers::empty();
    if mods.contains(glfw::Modifiers::Shift) {
        modifiers |= Modifiers::SHIFT;
    }
    if mods.contains(glfw::Modifiers::Control) {
        modifiers |= Modifiers::CTRL;
    }
    if mods.contains(glfw::Modifiers::Alt) {
        modifiers |= Modifiers::LEFT_ALT;
    }
    if mods.contains(glfw::Modifiers::CapsLock) {
        modifiers |= Modifiers::CAPS_LOCK;
    }
    if mods.contains(glfw::Modifiers::NumLock) {
        modifiers |= Modifiers::NUM_LOCK;
    }
    modifiers
}

impl WindowBackend for GlfwBackend {
    fn name(&self) -> &'static str {
        "glfw"
    }

    fn capabilities(&self) -> BackendCaps {
        BackendCaps::CLOSE_CONNECTION
            | BackendCaps::CREATE_SURFACE
            | BackendCaps::SHOW_WINDOW
            | BackendCaps::HIDE_WINDOW
            | BackendCaps::SET_TITLE
            | BackendCaps::UPDATE_POINTER_MODE
            | BackendCaps::GET_EVENT
    }

    fn open_connection(&mut self, _cx: &mut Context) -> VkfwResult<()> {
        let mut glfw = glfw::init(glfw::log_errors)
            .map_err(|e| VkfwError::InitializationFailed(format!("GLFW initialization failed: {e:?}")))?;

        if !glfw.vulkan_supported() {
            return Err(VkfwError::InitializationFailed("GLFW found no Vulkan loader".into()));
        }

        // Configure for Vulkan (no OpenGL context); windows start hidden
        glfw.window_hint(glfw::WindowHint::ClientApi(glfw::ClientApiHint::NoApi));
        glfw.window_hint(glfw::WindowHint::Visible(false));
        glfw.window_hint(glfw::WindowHint::Resizable(true));

        self.glfw = Some(glfw);
        self.build_keymap();
        debug!(target: LogSource::Backend.target(), "glfw connection open");
        Ok(())
    }

    fn close_connection(&mut self, _cx: &mut Context) {
        self.pending.clear();
        self.windows.clear();
        self.glfw = None;
        debug!(target: LogSource::Backend.target(), "glfw connection closed");
    }

    fn create_window(&mut self, cx: &mut Context, window: WindowId) -> VkfwResult<()> {
        let glfw = self.glfw.as_mut().ok_or(VkfwError::SurfaceLost)?;
        let extent = cx.framebuffer_extent(window).ok_or(VkfwError::InvalidWindow)?;

        let (mut handle, events) = glfw
            .create_window(extent.width, extent.height, "VKFW", glfw::WindowMode::Windowed)
            .ok_or_else(|| VkfwError::InitializationFailed("GLFW window creation failed".into()))?;

        handle.set_key_polling(true);
        handle.set_char_polling(true);
        handle.set_cursor_pos_polling(true);
        handle.set_mouse_button_polling(true);
        handle.set_scroll_polling(true);
        handle.set_focus_polling(true);
        handle.set_close_polling(true);
        handle.set_framebuffer_size_polling(true);

        self.windows.insert(
            window,
            GlfwWindow { window: handle, events, cursor: (0.0, 0.0), modifiers: Modifiers::empty() },
        );
        Ok(())
    }

    fn destroy_window(&mut self, _cx: &mut Context, window: WindowId) {
        if self.windows.remove(&window).is_none() {
            warn!(target: LogSource::Backend.target(), "glfw has no window for {window:?}");
        }
    }

    fn create_surface(
        &mut self,
        _cx: &mut Context,
        window: WindowId,
        instance: vk::Instance,
    ) -> VkfwResult<vk::SurfaceKHR> {
        let state = self.window_mut(window)?;
        let mut surface = vk::SurfaceKHR::null();
        let result = state.window.create_window_surface(instance, std::ptr::null(), &mut surface);

        if result == vk::Result::SUCCESS {
            Ok(surface)
        } else {
            Err(result.into())
        }
    }

    fn show_window(&mut self, _cx: &mut Context, window: WindowId) -> VkfwResult<()> {
        self.window_mut(window)?.window.show();
        Ok(())
    }

    fn hide_window(&mut self, _cx: &mut Context, window: WindowId) -> VkfwResult<()> {
        self.window_mut(window)?.window.hide();
        Ok(())
    }

    fn set_title(&mut self, _cx: &mut Context, window: WindowId, title: &str) -> VkfwResult<()> {
        self.window_mut(window)?.window.set_title(title);
        Ok(())
    }

    fn update_pointer_mode(&mut self, _cx: &mut Context, window: WindowId, mode: PointerMode) -> VkfwResult<()> {
        let cursor_mode = if mode.intersects(PointerMode::RELATIVE | PointerMode::GRABBED) {
            glfw::CursorMode::Disabled
        } else if mode.contains(PointerMode::HIDDEN) {
            glfw::CursorMode::Hidden
        } else {
            glfw::CursorMode::Normal
        };
        self.window_mut(window)?.window.set_cursor_mode(cursor_mode);
        Ok(())
    }

    #[allow(clippy::cast_precision_loss)]
    fn get_event(&mut self, cx: &mut Context, wait: EventWait) -> VkfwResult<Event> {
        if let Some(event) = self.pending.pop(cx) {
            return Ok(event);
        }

        let glfw = self.glfw.as_mut().ok_or(VkfwError::SurfaceLost)?;
        let remaining = wait.remaining(cx.time());
        match remaining {
            Some(0) => glfw.poll_events(),
            None => glfw.wait_events(),
            Some(micros) => glfw.wait_events_timeout(micros as f64 / SECONDS as f64),
        }

        self.collect(cx)?;
        if let Some(event) = self.pending.pop(cx) {
            return Ok(event);
        }

        // Woken without input before the deadline: let the core retry
        let expired = wait.is_poll() || wait.remaining(cx.time()) == Some(0);
        Ok(if expired { Event::none() } else { Event::null() })
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_list_has_no_duplicates() {
        let keys: std::collections::HashSet<_> = GLFW_KEYS.iter().map(|&(_, k)| k).collect();
        assert_eq!(keys.len(), GLFW_KEYS.len());
        assert!(keys.iter().all(|k| k.is_known()));
    }

    #[test]
    fn test_modifier_translation() {
        let mods = glfw::Modifiers::Shift | glfw::Modifiers::Control;
        assert_eq!(translate_modifiers(mods), Modifiers::SHIFT | Modifiers::CTRL);
        assert_eq!(translate_modifiers(glfw::Modifiers::empty()), Modifiers::empty());
    }

    #[test]
    fn test_unconnected_backend_has_empty_keymap() {
        let backend = GlfwBackend::new();
        let translator = backend.key_translator().unwrap();
        assert_eq!(translator.translate_keycode(38), Key::Unknown);
        assert_eq!(backend.capabilities() & BackendCaps::DISPATCH_EVENTS, BackendCaps::empty());
    }
}
