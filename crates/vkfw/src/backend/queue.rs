//! Buffer for backends that receive input in batches
//!
//! Some display libraries hand over everything that happened since the last
//! poll at once, with typed characters reported as separate entries after
//! the key press that produced them. [`InputQueue`] holds such a batch and
//! hands it out one event per retrieval.
//!
//! Characters follow the same rule as on every other backend: they are
//! offered to the text-input gate together with their key press, before the
//! application sees the key. Enabling text input in response to that key
//! therefore does not capture the character that came with it.

use std::collections::VecDeque;

use crate::error::VkfwResult;
use crate::event::{Event, EventKind};
use crate::keys::Modifiers;
use crate::session::Context;
use crate::window::WindowId;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Pending {
    Event(Event),
    Text { window: WindowId, codepoint: u32, x: i32, y: i32, modifiers: Modifiers },
}

/// Ordered batch of translated input
#[derive(Debug, Default)]
pub struct InputQueue {
    pending: VecDeque<Pending>,
}

impl InputQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, item: Pending) -> VkfwResult<()> {
        self.pending.try_reserve(1)?;
        self.pending.push_back(item);
        Ok(())
    }

    /// Append an event
    pub fn push_event(&mut self, event: Event) -> VkfwResult<()> {
        self.push(Pending::Event(event))
    }

    /// Append a typed character
    pub fn push_text(
        &mut self,
        window: WindowId,
        codepoint: u32,
        x: i32,
        y: i32,
        modifiers: Modifiers,
    ) -> VkfwResult<()> {
        self.push(Pending::Text { window, codepoint, x, y, modifiers })
    }

    /// Number of buffered entries
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is buffered
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Forget everything buffered
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Next entry as an event
    ///
    /// A key press takes the characters queued right behind it for the same
    /// window and parks them in the gate before it is returned. A character
    /// with no key press in front of it is parked when reached and yields
    /// [`Event::null`]. Events for destroyed windows become [`Event::null`].
    pub fn pop(&mut self, cx: &mut Context) -> Option<Event> {
        let event = match self.pending.pop_front()? {
            Pending::Event(event) => {
                if let (EventKind::KeyPressed { .. }, Some(window)) = (event.kind, event.window) {
                    self.park_text_for(cx, window);
                }
                event
            }
            Pending::Text { window, codepoint, x, y, modifiers } => {
                cx.queue_text_input_event(window, codepoint, x, y, modifiers);
                Event::null()
            }
        };

        if event.window.map_or(false, |w| cx.windows().is_deleted(w)) {
            return Some(Event::null());
        }
        Some(event)
    }

    fn park_text_for(&mut self, cx: &mut Context, key_window: WindowId) {
        while let Some(&Pending::Text { window, codepoint, x, y, modifiers }) = self.pending.front() {
            if window != key_window {
                break;
            }
            self.pending.pop_front();
            cx.queue_text_input_event(window, codepoint, x, y, modifiers);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::Any;
    use std::sync::{Arc, Mutex};

    use ash::vk;

    use crate::backend::{BackendCaps, WindowBackend};
    use crate::event::EventType;
    use crate::keys::Key;
    use crate::session::Session;
    use crate::time::{EventMode, EventWait, ManualClock};

    const EXTENT: vk::Extent2D = vk::Extent2D { width: 200, height: 100 };

    /// Backend that serves a prepared batch
    #[derive(Default)]
    struct BatchBackend {
        queue: InputQueue,
    }

    impl WindowBackend for BatchBackend {
        fn name(&self) -> &'static str {
            "batch"
        }

        fn capabilities(&self) -> BackendCaps {
            BackendCaps::GET_EVENT
        }

        fn open_connection(&mut self, _cx: &mut Context) -> VkfwResult<()> {
            Ok(())
        }

        fn create_window(&mut self, _cx: &mut Context, _window: WindowId) -> VkfwResult<()> {
            Ok(())
        }

        fn destroy_window(&mut self, _cx: &mut Context, _window: WindowId) {}

        fn get_event(&mut self, cx: &mut Context, _wait: EventWait) -> VkfwResult<Event> {
            Ok(self.queue.pop(cx).unwrap_or_else(Event::none))
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    fn batch_session() -> (Session, WindowId) {
        let mut session = Session::builder()
            .clock(ManualClock::new(0))
            .backend(BatchBackend::default())
            .build()
            .unwrap();
        let window = session.create_window(EXTENT).unwrap();
        (session, window)
    }

    fn key_press(window: WindowId) -> Event {
        Event::new(Some(window), EventKind::KeyPressed { x: 0, y: 0, key: Key::Unknown, keycode: 20 })
    }

    fn queue(session: &mut Session) -> &mut InputQueue {
        &mut session.backend_mut::<BatchBackend>().unwrap().queue
    }

    fn record_types(session: &mut Session, enable_on_key: bool) -> Arc<Mutex<Vec<EventType>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        session.set_event_handler(move |cx: &mut Context, event: &Event| {
            sink.lock().unwrap().push(event.event_type());
            if enable_on_key && event.event_type() == EventType::KeyPressed {
                if let Some(window) = event.window {
                    cx.enable_text_input(window).unwrap();
                }
            }
        });
        seen
    }

    #[test]
    fn test_enabling_on_key_press_skips_its_character() {
        let (mut session, window) = batch_session();
        queue(&mut session).push_event(key_press(window)).unwrap();
        queue(&mut session).push_text(window, 't' as u32, 0, 0, Modifiers::empty()).unwrap();
        let seen = record_types(&mut session, true);

        session.dispatch_events(EventMode::Poll, 0).unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![EventType::KeyPressed]);
        assert!(session.context().text_input_enabled(window));
        assert!(session.get_next_event().unwrap().is_none());
    }

    #[test]
    fn test_character_follows_its_key_when_enabled() {
        let (mut session, window) = batch_session();
        session.enable_text_input(window).unwrap();
        let close = Event::new(Some(window), EventKind::WindowCloseRequest);
        queue(&mut session).push_event(key_press(window)).unwrap();
        queue(&mut session).push_text(window, 't' as u32, 3, 4, Modifiers::SHIFT).unwrap();
        queue(&mut session).push_event(close).unwrap();

        assert_eq!(session.get_next_event().unwrap().event_type(), EventType::KeyPressed);
        assert_eq!(queue(&mut session).len(), 1, "character left the queue with its key");

        let text = session.get_next_event().unwrap();
        assert_eq!(text.kind, EventKind::TextInput { x: 3, y: 4, codepoint: 't' as u32 });
        assert_eq!(text.modifiers, Modifiers::SHIFT);
        assert_eq!(session.get_next_event().unwrap(), close);
        assert!(session.get_next_event().unwrap().is_none());
    }

    #[test]
    fn test_character_without_key_press_is_parked_when_reached() {
        let (mut session, window) = batch_session();
        session.enable_text_input(window).unwrap();
        queue(&mut session).push_text(window, 0xE9, 0, 0, Modifiers::empty()).unwrap();

        // the Null from parking is swallowed and the gate delivers right away
        assert_eq!(session.get_next_event().unwrap().text(), Some('é'));
        assert!(queue(&mut session).is_empty());
    }

    #[test]
    fn test_character_for_other_window_stays_queued() {
        let (mut session, first) = batch_session();
        let second = session.create_window(EXTENT).unwrap();
        session.enable_text_input(second).unwrap();
        queue(&mut session).push_event(key_press(first)).unwrap();
        queue(&mut session).push_text(second, 'x' as u32, 0, 0, Modifiers::empty()).unwrap();

        assert_eq!(session.get_next_event().unwrap().window, Some(first));
        assert_eq!(queue(&mut session).len(), 1);
        let text = session.get_next_event().unwrap();
        assert_eq!((text.window, text.text()), (Some(second), Some('x')));
    }

    #[test]
    fn test_events_for_destroyed_windows_are_consumed() {
        let (mut session, window) = batch_session();
        queue(&mut session).push_event(Event::new(Some(window), EventKind::WindowGainedFocus)).unwrap();
        session.destroy_window(window).unwrap();

        assert!(session.get_next_event().unwrap().is_none());
        assert!(queue(&mut session).is_empty());
    }
}
