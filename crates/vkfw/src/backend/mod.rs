//! Backend adapter interface
//!
//! A backend turns one display system into VKFW windows and events. Only a
//! handful of entries are mandatory; everything else is optional and
//! advertised through [`BackendCaps`]. The core checks the capability before
//! calling an optional entry and falls back to its own default when it is
//! absent, so a backend never has to stub out functionality it lacks.
//!
//! Backends call back into the core through the [`Context`] they are handed:
//! - [`Context::send_event_to_application`] from a backend-driven dispatch loop
//! - [`Context::queue_text_input_event`] for typed characters
//! - [`Context::ref_window`] / [`Context::unref_window`] while holding a window
//! - [`Context::time`] and the delay helpers for timed waits

use std::any::Any;
use std::sync::Arc;

use ash::vk;
use bitflags::bitflags;

use crate::error::{VkfwError, VkfwResult};
use crate::event::Event;
use crate::keys::{KeyTranslator, PointerMode};
use crate::session::Context;
use crate::time::{EventMode, EventWait};
use crate::window::{BackendData, WindowId};

pub mod headless;
pub mod queue;

#[cfg(feature = "glfw")]
pub mod glfw;

bitflags! {
    /// Optional entries a backend implements
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BackendCaps: u32 {
        /// `alloc_window` provides per-window backend data
        const ALLOC_WINDOW = 1 << 0;
        /// `close_connection` must be called at shutdown
        const CLOSE_CONNECTION = 1 << 1;
        /// `create_surface`
        const CREATE_SURFACE = 1 << 2;
        /// `query_present_support`
        const QUERY_PRESENT_SUPPORT = 1 << 3;
        /// `show_window`
        const SHOW_WINDOW = 1 << 4;
        /// `hide_window`
        const HIDE_WINDOW = 1 << 5;
        /// `set_title`
        const SET_TITLE = 1 << 6;
        /// `update_pointer_mode`
        const UPDATE_POINTER_MODE = 1 << 7;
        /// `get_event`
        const GET_EVENT = 1 << 8;
        /// `dispatch_events`, preferred over `get_event` by the dispatch loop
        const DISPATCH_EVENTS = 1 << 9;
    }
}

/// A display system adapter
///
/// Optional methods have default bodies that report
/// [`VkfwError::Unsupported`]; the core never reaches them unless the
/// matching [`BackendCaps`] bit is set.
pub trait WindowBackend {
    /// Short lowercase name used in configuration and logs
    fn name(&self) -> &'static str;

    /// Optional entries this backend implements
    fn capabilities(&self) -> BackendCaps;

    /// Connect to the display system
    ///
    /// Failing here makes the session try the next candidate backend.
    fn open_connection(&mut self, cx: &mut Context) -> VkfwResult<()>;

    /// Disconnect at session teardown
    fn close_connection(&mut self, _cx: &mut Context) {}

    /// Create the backend data stored with a new window
    fn alloc_window(&mut self) -> VkfwResult<Option<BackendData>> {
        Ok(None)
    }

    /// Build the native window for a freshly registered id
    fn create_window(&mut self, cx: &mut Context, window: WindowId) -> VkfwResult<()>;

    /// Tear down the native window
    ///
    /// The window is already marked deleted when this runs.
    fn destroy_window(&mut self, cx: &mut Context, window: WindowId);

    /// Create a Vulkan surface for the window
    fn create_surface(
        &mut self,
        _cx: &mut Context,
        _window: WindowId,
        _instance: vk::Instance,
    ) -> VkfwResult<vk::SurfaceKHR> {
        Err(VkfwError::Unsupported("create_surface"))
    }

    /// Whether a queue family of a physical device can present to this
    /// display system
    fn query_present_support(
        &mut self,
        _instance: vk::Instance,
        _device: vk::PhysicalDevice,
        _queue_family: u32,
    ) -> VkfwResult<bool> {
        Err(VkfwError::Unsupported("query_present_support"))
    }

    /// Map the window
    fn show_window(&mut self, _cx: &mut Context, _window: WindowId) -> VkfwResult<()> {
        Err(VkfwError::Unsupported("show_window"))
    }

    /// Unmap the window
    fn hide_window(&mut self, _cx: &mut Context, _window: WindowId) -> VkfwResult<()> {
        Err(VkfwError::Unsupported("hide_window"))
    }

    /// Change the window title
    fn set_title(&mut self, _cx: &mut Context, _window: WindowId, _title: &str) -> VkfwResult<()> {
        Err(VkfwError::Unsupported("set_title"))
    }

    /// Apply a new pointer mode
    fn update_pointer_mode(
        &mut self,
        _cx: &mut Context,
        _window: WindowId,
        _mode: PointerMode,
    ) -> VkfwResult<()> {
        Err(VkfwError::Unsupported("update_pointer_mode"))
    }

    /// Retrieve at most one event within the wait budget
    ///
    /// Returns [`Event::none`] when the budget ran out and [`Event::null`]
    /// when something was handled internally. Key events may leave `key` as
    /// `Unknown`; the core translates the keycode afterwards.
    fn get_event(&mut self, _cx: &mut Context, _wait: EventWait) -> VkfwResult<Event> {
        Err(VkfwError::Unsupported("get_event"))
    }

    /// Deliver events to the application until the wait budget runs out
    ///
    /// Every event goes through [`Context::send_event_to_application`].
    /// The loop owns the text-input gate while it runs: call
    /// [`Context::deliver_pending_text_input`] before each retrieval. The
    /// core does not drain the gate after the loop returns.
    /// `timeout` is relative for [`EventMode::Timeout`] and absolute for
    /// [`EventMode::Deadline`]; [`EventMode::Poll`] always comes with `0`.
    fn dispatch_events(&mut self, _cx: &mut Context, _mode: EventMode, _timeout: u64) -> VkfwResult<()> {
        Err(VkfwError::Unsupported("dispatch_events"))
    }

    /// Keycode translation for the active layout
    fn key_translator(&self) -> Option<Arc<dyn KeyTranslator>> {
        None
    }

    /// Get access to the concrete type for downcasting
    fn as_any(&self) -> &dyn Any;

    /// Get mutable access to the concrete type for downcasting
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
