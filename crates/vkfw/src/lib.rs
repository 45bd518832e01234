//! # VKFW
//!
//! Windowing and input for Vulkan applications.
//!
//! VKFW opens a connection to the display system, creates windows, hands out
//! Vulkan surfaces and normalizes input into one portable event model. The
//! display-specific work lives in backends; the crate itself owns the part
//! every backend shares:
//!
//! - **Event model**: a tagged event with stable type codes
//! - **Dispatch engine**: poll, wait with timeout, wait until a deadline, or
//!   run a dispatch loop into an event handler
//! - **Text input gate**: typed characters are delivered one cycle after the
//!   key press that produced them
//! - **Window registry**: reference-counted windows that survive until every
//!   subsystem holding them lets go
//! - **Key translation**: layout-independent keys next to raw keycodes
//!
//! ## Quick Start
//!
//! ```rust
//! use vkfw::prelude::*;
//! use vkfw::backend::headless::{HeadlessBackend, HeadlessInput};
//!
//! fn main() -> Result<(), VkfwError> {
//!     let (backend, controller) = HeadlessBackend::new();
//!     let mut session = Session::builder()
//!         .compiled_against(vkfw::VERSION)
//!         .backend(backend)
//!         .build()?;
//!
//!     let window = session.create_window(Extent2D { width: 800, height: 600 })?;
//!     session.show_window(window)?;
//!     controller.push(HeadlessInput::Event(Event::new(Some(window), EventKind::WindowCloseRequest)));
//!
//!     let mut running = true;
//!     while running {
//!         let event = session.wait_next_event(10 * MILLIS)?;
//!         match event.kind {
//!             EventKind::None => {}
//!             EventKind::WindowCloseRequest => running = false,
//!             _ => unhandled_event(&event),
//!         }
//!     }
//!
//!     session.destroy_window(window)?;
//!     session.terminate();
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod backend;
pub mod config;
pub mod error;
pub mod event;
pub mod keys;
pub mod logging;
pub mod pump;
pub mod session;
pub mod text_input;
pub mod time;
pub mod window;

mod dispatch;

#[cfg(test)]
mod tests;

pub use error::{VkfwError, VkfwResult};
pub use session::{check_version, Context, Session, SessionBuilder, VERSION};

/// Common imports for VKFW users
pub mod prelude {
    pub use crate::{
        backend::{BackendCaps, WindowBackend},
        config::{Config, VkfwConfig},
        event::{unhandled_event, Event, EventHandler, EventKind, EventType},
        keys::{Key, Keycode, Modifiers, MouseButton, PointerMode, ScrollDirection},
        time::{Clock, EventMode, EventWait, MILLIS, NO_TIMEOUT, SECONDS},
        window::WindowId,
        Context, Session, VkfwError, VkfwResult,
    };
    pub use ash::vk::Extent2D;
}
