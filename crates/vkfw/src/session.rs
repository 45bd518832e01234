//! Session and context
//!
//! All library state lives in a [`Session`]: the active backend plus a
//! [`Context`] holding the window registry, the text-input gate, the clock
//! and the application's event handler. Backends and event handlers receive
//! the context; applications drive the session.
//!
//! A session is single-use. Once terminated (explicitly or by drop) its
//! backend connection is closed for good; start a new session instead of
//! reviving an old one.

use std::sync::Arc;

use ash::vk;

use crate::backend::{BackendCaps, WindowBackend};
use crate::config::VkfwConfig;
use crate::error::{VkfwError, VkfwResult};
use crate::event::{Event, EventHandler, EventKind};
use crate::keys::{Key, KeyTranslator, Keycode, Modifiers, PointerMode};
use crate::logging::{self, debug, info, warn, LogSource};
use crate::text_input::TextInputGate;
use crate::time::{Clock, MonotonicClock};
use crate::window::{UserData, WindowFlags, WindowId, WindowRegistry};

/// Library version in Vulkan `make_api_version` encoding
pub const VERSION: u32 = vk::make_api_version(0, 2, 2, 0);

/// Verify that an application built against `expected` can use this library
///
/// The variant must be 0, the major version must match, and the application
/// must not expect a newer minor version than this library provides.
pub fn check_version(expected: u32) -> VkfwResult<()> {
    let variant = vk::api_version_variant(expected);
    let major = vk::api_version_major(expected);
    let minor = vk::api_version_minor(expected);

    if variant != 0
        || major != vk::api_version_major(VERSION)
        || minor > vk::api_version_minor(VERSION)
    {
        return Err(VkfwError::VersionMismatch {
            expected_variant: variant,
            expected_major: major,
            expected_minor: minor,
            expected_patch: vk::api_version_patch(expected),
        });
    }
    Ok(())
}

/// Shared state handed to backends and event handlers
pub struct Context {
    windows: WindowRegistry,
    gate: TextInputGate,
    clock: Box<dyn Clock>,
    handler: Option<Box<dyn EventHandler>>,
    handler_generation: u64,
    translator: Option<Arc<dyn KeyTranslator>>,
    config: VkfwConfig,
}

impl Context {
    fn new(config: VkfwConfig, clock: Box<dyn Clock>) -> Self {
        Self {
            windows: WindowRegistry::new(),
            gate: TextInputGate::new(),
            clock,
            handler: None,
            handler_generation: 0,
            translator: None,
            config,
        }
    }

    /// Library configuration
    pub const fn config(&self) -> &VkfwConfig {
        &self.config
    }

    /// The window registry
    pub const fn windows(&self) -> &WindowRegistry {
        &self.windows
    }

    /// Monotonic time in microseconds
    pub fn time(&self) -> u64 {
        self.clock.now()
    }

    /// Sleep for `duration` microseconds
    pub fn delay(&self, duration: u64) {
        self.clock.delay(duration);
    }

    /// Sleep until `deadline`
    pub fn delay_until(&self, deadline: u64) {
        self.clock.delay_until(deadline);
    }

    /// Take a strong reference to a window
    pub fn ref_window(&self, window: WindowId) -> bool {
        self.windows.ref_window(window)
    }

    /// Release a strong reference to a window
    pub fn unref_window(&self, window: WindowId) -> bool {
        self.windows.unref_window(window)
    }

    /// Cached framebuffer extent of a window
    pub fn framebuffer_extent(&self, window: WindowId) -> Option<vk::Extent2D> {
        self.windows.extent(window)
    }

    /// Park a typed character for delivery on the next retrieval call
    ///
    /// Ignored unless text input is enabled on the window.
    pub fn queue_text_input_event(
        &mut self,
        window: WindowId,
        codepoint: u32,
        x: i32,
        y: i32,
        modifiers: Modifiers,
    ) {
        self.gate.queue(&self.windows, window, codepoint, x, y, modifiers);
    }

    /// Start delivering text input events for a window
    pub fn enable_text_input(&mut self, window: WindowId) -> VkfwResult<()> {
        if !self.windows.is_live(window) {
            return Err(VkfwError::InvalidWindow);
        }
        self.windows.insert_flags(window, WindowFlags::TEXT_INPUT_ENABLED);
        Ok(())
    }

    /// Stop delivering text input events for a window
    ///
    /// A character already parked for the window is discarded.
    pub fn disable_text_input(&mut self, window: WindowId) {
        self.windows.remove_flags(window, WindowFlags::TEXT_INPUT_ENABLED);
        self.gate.discard_for(&self.windows, window);
    }

    /// Whether text input is enabled for a window
    pub fn text_input_enabled(&self, window: WindowId) -> bool {
        self.windows
            .flags(window)
            .map_or(false, |flags| flags.contains(WindowFlags::TEXT_INPUT_ENABLED))
    }

    /// Whether a character is parked in the text-input gate
    pub const fn text_input_pending(&self) -> bool {
        self.gate.is_pending()
    }

    pub(crate) fn drain_text_input(&mut self) -> Option<Event> {
        self.gate.drain(&self.windows)
    }

    /// Send a parked text input event to the application
    ///
    /// Backends running their own dispatch loop call this between events.
    /// Returns whether anything was delivered.
    pub fn deliver_pending_text_input(&mut self) -> bool {
        match self.drain_text_input() {
            Some(event) => {
                self.send_event_to_application(event);
                true
            }
            None => false,
        }
    }

    /// Logical key for a platform keycode in the active layout
    pub fn translate_keycode(&self, keycode: Keycode) -> Key {
        self.translator
            .as_ref()
            .map_or(Key::Unknown, |t| t.translate_keycode(keycode))
    }

    /// Preferred platform keycode for a logical key
    pub fn translate_key(&self, key: Key) -> Option<Keycode> {
        self.translator.as_ref().and_then(|t| t.translate_key(key))
    }

    /// Apply the core's bookkeeping to a freshly retrieved event
    ///
    /// Resize notifications refresh the cached extent; key events get their
    /// logical key from the keycode.
    pub fn post_process(&mut self, event: &mut Event) {
        match &mut event.kind {
            EventKind::WindowResizeNotify { extent } => {
                if let Some(window) = event.window {
                    self.windows.set_extent(window, *extent);
                }
            }
            EventKind::KeyPressed { key, keycode, .. } | EventKind::KeyReleased { key, keycode, .. } => {
                *key = self.translate_keycode(*keycode);
            }
            _ => {}
        }
    }

    /// Post-process an event and hand it to the application's handler
    ///
    /// Safe to call from within a handler; a handler installed while one is
    /// running replaces it once the running call returns.
    pub fn send_event_to_application(&mut self, mut event: Event) {
        self.post_process(&mut event);

        let Some(mut handler) = self.handler.take() else {
            return;
        };
        let generation = self.handler_generation;
        handler.on_event(self, &event);
        if self.handler_generation == generation {
            self.handler = Some(handler);
        }
    }

    /// Install the application's event handler, returning the previous one
    pub fn set_event_handler(
        &mut self,
        handler: Option<Box<dyn EventHandler>>,
    ) -> Option<Box<dyn EventHandler>> {
        self.handler_generation = self.handler_generation.wrapping_add(1);
        std::mem::replace(&mut self.handler, handler)
    }

    /// Whether an event handler is installed
    pub const fn has_event_handler(&self) -> bool {
        self.handler.is_some()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("windows", &self.windows)
            .field("gate", &self.gate)
            .field("has_handler", &self.handler.is_some())
            .field("has_translator", &self.translator.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for a [`Session`]
pub struct SessionBuilder {
    config: VkfwConfig,
    clock: Option<Box<dyn Clock>>,
    candidates: Vec<Box<dyn WindowBackend>>,
    expected_version: Option<u32>,
}

impl SessionBuilder {
    fn new() -> Self {
        Self {
            config: VkfwConfig::default(),
            clock: None,
            candidates: Vec::new(),
            expected_version: None,
        }
    }

    /// Use this configuration
    #[must_use]
    pub fn config(mut self, config: VkfwConfig) -> Self {
        self.config = config;
        self
    }

    /// Use this clock instead of the system's monotonic clock
    #[must_use]
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Some(Box::new(clock));
        self
    }

    /// Add a candidate backend; candidates are probed in insertion order
    #[must_use]
    pub fn backend(mut self, backend: impl WindowBackend + 'static) -> Self {
        self.candidates.push(Box::new(backend));
        self
    }

    /// Add an already boxed candidate backend
    #[must_use]
    pub fn boxed_backend(mut self, backend: Box<dyn WindowBackend>) -> Self {
        self.candidates.push(backend);
        self
    }

    /// Refuse to start unless the library is compatible with `version`
    #[must_use]
    pub const fn compiled_against(mut self, version: u32) -> Self {
        self.expected_version = Some(version);
        self
    }

    /// Check the version, then activate the first candidate that connects
    ///
    /// Without explicit candidates the bundled desktop backends are probed.
    pub fn build(self) -> VkfwResult<Session> {
        if let Some(expected) = self.expected_version {
            check_version(expected)?;
        }

        let config = self.config;
        if config.logging != crate::config::LoggingConfig::default() {
            logging::init_with(&config.logging);
        }
        info!(
            target: LogSource::Core.target(),
            "VKFW {}.{}.{}",
            vk::api_version_major(VERSION),
            vk::api_version_minor(VERSION),
            vk::api_version_patch(VERSION)
        );

        let clock = self.clock.unwrap_or_else(|| Box::new(MonotonicClock::new()));
        let mut context = Context::new(config, clock);

        let candidates = if self.candidates.is_empty() {
            default_backends()
        } else {
            self.candidates
        };

        for mut backend in candidates {
            let name = backend.name();
            if !context.config.backends.is_enabled(name) {
                debug!(target: LogSource::Core.target(), "backend {name} disabled by config");
                continue;
            }

            match backend.open_connection(&mut context) {
                Ok(()) => {
                    info!(target: LogSource::Core.target(), "using backend {name}");
                    context.translator = backend.key_translator();
                    return Ok(Session { context, backend, terminated: false });
                }
                Err(err) => {
                    warn!(target: LogSource::Core.target(), "backend {name} unavailable: {err}");
                }
            }
        }

        Err(VkfwError::NoBackend)
    }
}

fn default_backends() -> Vec<Box<dyn WindowBackend>> {
    #[allow(unused_mut)]
    let mut backends: Vec<Box<dyn WindowBackend>> = Vec::new();
    #[cfg(feature = "glfw")]
    backends.push(Box::new(crate::backend::glfw::GlfwBackend::new()));
    backends
}

/// An initialized library instance bound to one backend
pub struct Session {
    pub(crate) context: Context,
    pub(crate) backend: Box<dyn WindowBackend>,
    terminated: bool,
}

impl Session {
    /// Start configuring a session
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// The shared context
    pub const fn context(&self) -> &Context {
        &self.context
    }

    /// The shared context, mutably
    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.context
    }

    /// Name of the active backend
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// The active backend as its concrete type
    pub fn backend<T: 'static>(&self) -> Option<&T> {
        self.backend.as_any().downcast_ref()
    }

    /// The active backend as its concrete type, mutably
    pub fn backend_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.backend.as_any_mut().downcast_mut()
    }

    pub(crate) fn has_capability(&self, caps: BackendCaps) -> bool {
        self.backend.capabilities().contains(caps)
    }

    fn live(&self, window: WindowId) -> VkfwResult<()> {
        if self.context.windows.is_live(window) {
            Ok(())
        } else {
            Err(VkfwError::InvalidWindow)
        }
    }

    /// Monotonic time in microseconds
    pub fn time(&self) -> u64 {
        self.context.time()
    }

    /// Sleep for `duration` microseconds
    pub fn delay(&self, duration: u64) {
        self.context.delay(duration);
    }

    /// Sleep until `deadline`
    pub fn delay_until(&self, deadline: u64) {
        self.context.delay_until(deadline);
    }

    /// Create a window with the given framebuffer extent
    ///
    /// The window starts hidden on backends that support showing and
    /// hiding.
    pub fn create_window(&mut self, extent: vk::Extent2D) -> VkfwResult<WindowId> {
        let backend_data = if self.has_capability(BackendCaps::ALLOC_WINDOW) {
            self.backend.alloc_window()?
        } else {
            None
        };

        let window = self.context.windows.insert(extent, backend_data);
        if let Err(err) = self.backend.create_window(&mut self.context, window) {
            warn!(target: LogSource::Core.target(), "window creation failed: {err}");
            // Drop our reference rather than removing; the backend may have
            // taken its own along the way.
            self.context.windows.unref_window(window);
            return Err(err);
        }

        debug!(
            target: LogSource::Core.target(),
            "created window {window:?} ({}x{})", extent.width, extent.height
        );
        Ok(window)
    }

    /// Destroy a window
    ///
    /// The window is marked deleted before the backend tears it down, so an
    /// event racing with destruction sees the tombstone. Its memory is
    /// reclaimed once every internal reference is released.
    pub fn destroy_window(&mut self, window: WindowId) -> VkfwResult<()> {
        if !self.context.windows.mark_deleted(window) {
            return Err(VkfwError::InvalidWindow);
        }
        self.backend.destroy_window(&mut self.context, window);
        self.context.windows.unref_window(window);
        debug!(target: LogSource::Core.target(), "destroyed window {window:?}");
        Ok(())
    }

    /// Create a Vulkan surface for a window
    pub fn create_surface(&mut self, window: WindowId, instance: vk::Instance) -> VkfwResult<vk::SurfaceKHR> {
        self.live(window)?;
        if !self.has_capability(BackendCaps::CREATE_SURFACE) {
            return Err(VkfwError::Unsupported("create_surface"));
        }
        self.backend.create_surface(&mut self.context, window, instance)
    }

    /// Whether a queue family can present to this backend's windows
    ///
    /// Backends without a query report `true`.
    pub fn query_present_support(
        &mut self,
        instance: vk::Instance,
        device: vk::PhysicalDevice,
        queue_family: u32,
    ) -> VkfwResult<bool> {
        if self.has_capability(BackendCaps::QUERY_PRESENT_SUPPORT) {
            self.backend.query_present_support(instance, device, queue_family)
        } else {
            Ok(true)
        }
    }

    /// Change a window's title; a no-op on backends without titles
    pub fn set_window_title(&mut self, window: WindowId, title: &str) -> VkfwResult<()> {
        self.live(window)?;
        if self.has_capability(BackendCaps::SET_TITLE) {
            self.backend.set_title(&mut self.context, window, title)?;
        }
        Ok(())
    }

    /// Show a window
    pub fn show_window(&mut self, window: WindowId) -> VkfwResult<()> {
        self.live(window)?;
        if self.has_capability(BackendCaps::SHOW_WINDOW) {
            self.backend.show_window(&mut self.context, window)?;
        }
        Ok(())
    }

    /// Hide a window
    pub fn hide_window(&mut self, window: WindowId) -> VkfwResult<()> {
        self.live(window)?;
        if self.has_capability(BackendCaps::HIDE_WINDOW) {
            self.backend.hide_window(&mut self.context, window)?;
        }
        Ok(())
    }

    /// Change the pointer mode of a window
    pub fn set_pointer_mode(&mut self, window: WindowId, mode: PointerMode) -> VkfwResult<()> {
        self.live(window)?;
        self.context.windows.set_pointer_mode(window, mode);
        if self.has_capability(BackendCaps::UPDATE_POINTER_MODE) {
            self.backend.update_pointer_mode(&mut self.context, window, mode)?;
        }
        Ok(())
    }

    /// Pointer mode of a window
    pub fn pointer_mode(&self, window: WindowId) -> Option<PointerMode> {
        self.context.windows.pointer_mode(window)
    }

    /// Latest known framebuffer extent of a window
    pub fn framebuffer_extent(&self, window: WindowId) -> VkfwResult<vk::Extent2D> {
        self.context.framebuffer_extent(window).ok_or(VkfwError::InvalidWindow)
    }

    /// Attach application data to a window
    pub fn set_window_user_data(&mut self, window: WindowId, data: Option<UserData>) -> VkfwResult<()> {
        self.live(window)?;
        self.context.windows.set_user_data(window, data);
        Ok(())
    }

    /// Application data of a window
    pub fn window_user_data(&self, window: WindowId) -> Option<UserData> {
        self.context.windows.user_data(window)
    }

    /// See [`Context::enable_text_input`]
    pub fn enable_text_input(&mut self, window: WindowId) -> VkfwResult<()> {
        self.context.enable_text_input(window)
    }

    /// See [`Context::disable_text_input`]
    pub fn disable_text_input(&mut self, window: WindowId) {
        self.context.disable_text_input(window);
    }

    /// See [`Context::translate_keycode`]
    pub fn translate_keycode(&self, keycode: Keycode) -> Key {
        self.context.translate_keycode(keycode)
    }

    /// See [`Context::translate_key`]
    pub fn translate_key(&self, key: Key) -> Option<Keycode> {
        self.context.translate_key(key)
    }

    /// Install the handler used by `dispatch_events`, returning the old one
    pub fn set_event_handler(
        &mut self,
        handler: impl EventHandler + 'static,
    ) -> Option<Box<dyn EventHandler>> {
        self.context.set_event_handler(Some(Box::new(handler)))
    }

    /// Remove the event handler, returning it
    pub fn clear_event_handler(&mut self) -> Option<Box<dyn EventHandler>> {
        self.context.set_event_handler(None)
    }

    /// Shut the session down
    ///
    /// Equivalent to dropping the session.
    pub fn terminate(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if self.terminated {
            return;
        }
        self.terminated = true;

        self.context.set_event_handler(None);
        self.context.gate.clear(&self.context.windows);
        if self.has_capability(BackendCaps::CLOSE_CONNECTION) {
            self.backend.close_connection(&mut self.context);
        }

        let remaining = self.context.windows.len();
        if remaining > 0 {
            warn!(target: LogSource::Core.target(), "{remaining} windows still alive at shutdown");
        }
        info!(target: LogSource::Core.target(), "session terminated");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("backend", &self.backend.name())
            .field("context", &self.context)
            .field("terminated", &self.terminated)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::headless::HeadlessBackend;
    use crate::time::ManualClock;

    const EXTENT: vk::Extent2D = vk::Extent2D { width: 320, height: 200 };

    fn headless_session() -> (Session, crate::backend::headless::HeadlessController) {
        let (backend, controller) = HeadlessBackend::new();
        let session = Session::builder()
            .clock(ManualClock::new(0))
            .backend(backend)
            .build()
            .unwrap();
        (session, controller)
    }

    #[test]
    fn test_version_check() {
        assert!(check_version(VERSION).is_ok());
        assert!(check_version(vk::make_api_version(0, 2, 0, 7)).is_ok());
        assert!(check_version(vk::make_api_version(0, 2, 3, 0)).is_err());
        assert!(check_version(vk::make_api_version(0, 3, 0, 0)).is_err());
        assert!(check_version(vk::make_api_version(1, 2, 2, 0)).is_err());
    }

    #[test]
    fn test_incompatible_version_fails_before_probing() {
        let (backend, controller) = HeadlessBackend::new();
        let err = Session::builder()
            .backend(backend)
            .compiled_against(vk::make_api_version(0, 1, 0, 0))
            .build()
            .unwrap_err();
        assert!(matches!(err, VkfwError::VersionMismatch { expected_major: 1, .. }));
        assert!(!controller.is_connected());
    }

    #[test]
    fn test_first_working_backend_wins() {
        let (broken, _) = HeadlessBackend::failing_connection();
        let (working, controller) = HeadlessBackend::new();
        let session = Session::builder().backend(broken).backend(working).build().unwrap();

        assert_eq!(session.backend_name(), "headless");
        assert!(controller.is_connected());
    }

    #[test]
    fn test_disabled_backend_is_skipped() {
        let mut config = VkfwConfig::default();
        config.backends.disable("headless");
        let (backend, controller) = HeadlessBackend::new();

        let err = Session::builder().config(config).backend(backend).build().unwrap_err();
        assert!(matches!(err, VkfwError::NoBackend));
        assert!(!controller.is_connected());
    }

    #[test]
    fn test_failed_create_releases_window() {
        let (mut session, controller) = headless_session();
        controller.fail_next_create();

        assert!(session.create_window(EXTENT).is_err());
        assert!(session.context().windows().is_empty());
    }

    #[test]
    fn test_destroy_twice_is_invalid() {
        let (mut session, _) = headless_session();
        let window = session.create_window(EXTENT).unwrap();

        session.destroy_window(window).unwrap();
        assert!(matches!(session.destroy_window(window), Err(VkfwError::InvalidWindow)));
        assert!(matches!(session.show_window(window), Err(VkfwError::InvalidWindow)));
        assert!(session.context().windows().is_empty());
    }

    #[test]
    fn test_window_chrome_reaches_backend() {
        let (mut session, controller) = headless_session();
        let window = session.create_window(EXTENT).unwrap();

        session.set_window_title(window, "Asteroids").unwrap();
        session.show_window(window).unwrap();
        session.set_pointer_mode(window, PointerMode::RELATIVE).unwrap();

        assert_eq!(controller.title(window).as_deref(), Some("Asteroids"));
        assert!(controller.is_visible(window));
        assert_eq!(controller.pointer_mode(window), Some(PointerMode::RELATIVE));
        assert_eq!(session.pointer_mode(window), Some(PointerMode::RELATIVE));

        session.hide_window(window).unwrap();
        assert!(!controller.is_visible(window));
    }

    #[test]
    fn test_presentation_fallbacks() {
        let (mut session, _) = headless_session();
        let window = session.create_window(EXTENT).unwrap();

        let supported = session
            .query_present_support(vk::Instance::null(), vk::PhysicalDevice::null(), 0)
            .unwrap();
        assert!(supported);
        assert!(matches!(
            session.create_surface(window, vk::Instance::null()),
            Err(VkfwError::Unsupported(_))
        ));
    }

    #[test]
    fn test_user_data() {
        let (mut session, _) = headless_session();
        let window = session.create_window(EXTENT).unwrap();

        session.set_window_user_data(window, Some(Arc::new(42_u32))).unwrap();
        let data = session.window_user_data(window).unwrap();
        assert_eq!(data.downcast_ref::<u32>(), Some(&42));
    }

    #[test]
    fn test_terminate_closes_connection_and_releases_gate() {
        let (mut session, controller) = headless_session();
        let window = session.create_window(EXTENT).unwrap();
        session.enable_text_input(window).unwrap();
        session.context_mut().queue_text_input_event(window, 'z' as u32, 0, 0, Modifiers::empty());
        session.destroy_window(window).unwrap();
        assert!(session.context().windows().contains(window));

        let registry = session.context().windows().clone();
        session.terminate();

        assert!(!controller.is_connected());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_handler_replaced_from_inside_handler() {
        let (mut session, _) = headless_session();
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        let counter = calls.clone();
        session.set_event_handler(move |cx: &mut Context, _: &Event| {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            cx.set_event_handler(None);
        });

        session.context_mut().send_event_to_application(Event::null());
        session.context_mut().send_event_to_application(Event::null());

        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert!(!session.context().has_event_handler());
    }
}
