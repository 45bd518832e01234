//! Reentrant modal-loop pump
//!
//! Some platforms only deliver input from inside their own message loop,
//! and call the window procedure from arbitrarily deep inside it (a window
//! being dragged keeps the loop in a modal state for as long as the drag
//! lasts). A retrieval call cannot return from there without unwinding the
//! platform's stack.
//!
//! [`ModalPump`] runs such a loop on a dedicated thread. The caller and the
//! loop meet on zero-capacity channels, so exactly one of them runs at any
//! time: the caller sends a request and parks; the loop wakes, runs until the
//! window procedure calls [`PumpContext::yield_event`], and parks again while
//! the caller carries on with the event. Ordering is the same as if the loop
//! ran on the caller's thread.

use std::thread::{self, JoinHandle};

use crossbeam::channel::{bounded, Receiver, Sender};

use crate::error::{VkfwError, VkfwResult};
use crate::event::Event;
use crate::logging::{debug, warn, LogSource};
use crate::time::EventWait;

/// A platform message loop driven by a [`ModalPump`]
pub trait ModalLoop {
    /// Run the loop until the platform connection ends
    ///
    /// Returning `Ok` ends the pump normally; any error is reported to the
    /// waiting caller as [`VkfwError::Unknown`].
    fn run(&mut self, pump: &mut PumpContext) -> VkfwResult<()>;
}

impl<F> ModalLoop for F
where
    F: FnMut(&mut PumpContext) -> VkfwResult<()>,
{
    fn run(&mut self, pump: &mut PumpContext) -> VkfwResult<()> {
        self(pump)
    }
}

/// The loop side of a [`ModalPump`]
pub struct PumpContext {
    requests: Receiver<EventWait>,
    replies: Sender<VkfwResult<Event>>,
    current: Option<EventWait>,
}

impl PumpContext {
    /// Budget of the request being served
    ///
    /// Parks until the caller asks for an event if no request is
    /// outstanding. `None` means the pump was dropped and the loop should
    /// return.
    pub fn request(&mut self) -> Option<EventWait> {
        if self.current.is_none() {
            self.current = self.requests.recv().ok();
        }
        self.current
    }

    /// Hand one event to the caller and park until the next request
    ///
    /// Returns `false` once the pump is gone; the loop should then unwind
    /// and return.
    pub fn yield_event(&mut self, event: Event) -> bool {
        if self.request().is_none() {
            return false;
        }
        self.current = None;
        if self.replies.send(Ok(event)).is_err() {
            return false;
        }
        self.request().is_some()
    }
}

/// Caller side of a modal loop running on its own thread
pub struct ModalPump {
    requests: Option<Sender<EventWait>>,
    replies: Receiver<VkfwResult<Event>>,
    thread: Option<JoinHandle<()>>,
}

impl ModalPump {
    /// Start `modal` on a new thread
    ///
    /// The loop does not run until the first [`ModalPump::get_event`].
    pub fn spawn<L>(mut modal: L) -> VkfwResult<Self>
    where
        L: ModalLoop + Send + 'static,
    {
        let (request_tx, request_rx) = bounded(0);
        let (reply_tx, reply_rx) = bounded(0);

        let thread = thread::Builder::new()
            .name("vkfw-modal-pump".into())
            .spawn(move || {
                let mut pump = PumpContext { requests: request_rx, replies: reply_tx, current: None };

                let reply = match modal.run(&mut pump) {
                    Ok(()) => {
                        debug!(target: LogSource::Backend.target(), "modal loop finished");
                        if pump.current.is_none() {
                            return;
                        }
                        VkfwError::SurfaceLost
                    }
                    Err(err) => {
                        warn!(target: LogSource::Backend.target(), "modal loop failed: {err}");
                        if pump.request().is_none() {
                            return;
                        }
                        VkfwError::Unknown
                    }
                };
                let _ = pump.replies.send(Err(reply));
            })
            .map_err(|e| VkfwError::InitializationFailed(format!("modal pump thread: {e}")))?;

        Ok(Self { requests: Some(request_tx), replies: reply_rx, thread: Some(thread) })
    }

    /// Let the loop run until it yields one event
    ///
    /// After the loop has ended every call fails with
    /// [`VkfwError::SurfaceLost`].
    pub fn get_event(&mut self, wait: EventWait) -> VkfwResult<Event> {
        let requests = self.requests.as_ref().ok_or(VkfwError::SurfaceLost)?;
        if requests.send(wait).is_err() {
            self.requests = None;
            return Err(VkfwError::SurfaceLost);
        }
        self.replies.recv().unwrap_or(Err(VkfwError::SurfaceLost))
    }

    /// Whether the loop can still serve requests
    pub const fn is_running(&self) -> bool {
        self.requests.is_some()
    }
}

impl Drop for ModalPump {
    fn drop(&mut self) {
        // Closing the request channel wakes a parked loop with `None`
        self.requests = None;
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!(target: LogSource::Backend.target(), "modal loop panicked");
            }
        }
    }
}

impl std::fmt::Debug for ModalPump {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModalPump").field("running", &self.is_running()).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventKind, EventType};
    use std::sync::{Arc, Mutex};

    /// Window procedure that only reaches the pump after nesting a few levels
    fn window_proc(pump: &mut PumpContext, depth: u32, event: Event) -> bool {
        if depth < 4 {
            return window_proc(pump, depth + 1, event);
        }
        pump.yield_event(event)
    }

    fn message_loop(mut messages: Vec<EventKind>) -> impl FnMut(&mut PumpContext) -> VkfwResult<()> + Send {
        move |pump: &mut PumpContext| -> VkfwResult<()> {
            for kind in messages.drain(..) {
                if !window_proc(pump, 0, Event::new(None, kind)) {
                    return Ok(());
                }
            }
            while pump.request().is_some() {
                if !pump.yield_event(Event::none()) {
                    break;
                }
            }
            Ok(())
        }
    }

    #[test]
    fn test_events_cross_nested_callbacks_in_order() {
        let mut pump = ModalPump::spawn(message_loop(vec![
            EventKind::WindowGainedFocus,
            EventKind::PointerMotion { x: 1, y: 2 },
            EventKind::WindowCloseRequest,
        ]))
        .unwrap();

        let types: Vec<_> = (0..4)
            .map(|_| pump.get_event(EventWait::Poll).unwrap().event_type())
            .collect();
        assert_eq!(
            types,
            vec![
                EventType::WindowGainedFocus,
                EventType::PointerMotion,
                EventType::WindowCloseRequest,
                EventType::None,
            ]
        );
    }

    #[test]
    fn test_loop_sees_each_request_budget() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        let mut pump = ModalPump::spawn(move |pump: &mut PumpContext| -> VkfwResult<()> {
            while let Some(wait) = pump.request() {
                log.lock().unwrap().push(wait);
                if !pump.yield_event(Event::none()) {
                    break;
                }
            }
            Ok(())
        })
        .unwrap();

        pump.get_event(EventWait::Poll).unwrap();
        pump.get_event(EventWait::Timeout(500)).unwrap();
        drop(pump);

        assert_eq!(*seen.lock().unwrap(), vec![EventWait::Poll, EventWait::Timeout(500)]);
    }

    #[test]
    fn test_loop_failure_is_unknown_then_lost() {
        let mut pump = ModalPump::spawn(|_: &mut PumpContext| -> VkfwResult<()> {
            Err(VkfwError::InitializationFailed("no display".into()))
        })
        .unwrap();

        assert!(matches!(pump.get_event(EventWait::Poll), Err(VkfwError::Unknown)));
        assert!(matches!(pump.get_event(EventWait::Poll), Err(VkfwError::SurfaceLost)));
        assert!(!pump.is_running());
    }

    #[test]
    fn test_finished_loop_reports_surface_lost() {
        let mut pump = ModalPump::spawn(message_loop(vec![EventKind::WindowLostFocus])).unwrap();
        assert_eq!(pump.get_event(EventWait::Poll).unwrap().event_type(), EventType::WindowLostFocus);

        let mut finished = ModalPump::spawn(|pump: &mut PumpContext| -> VkfwResult<()> {
            pump.request();
            Ok(())
        })
        .unwrap();
        assert!(matches!(finished.get_event(EventWait::Poll), Err(VkfwError::SurfaceLost)));
        assert!(matches!(finished.get_event(EventWait::Poll), Err(VkfwError::SurfaceLost)));
    }

    #[test]
    fn test_drop_while_parked() {
        let mut pump = ModalPump::spawn(message_loop(vec![EventKind::WindowGainedFocus])).unwrap();
        pump.get_event(EventWait::Poll).unwrap();
        // the loop is parked inside the window procedure; dropping must not hang
        drop(pump);
    }
}
