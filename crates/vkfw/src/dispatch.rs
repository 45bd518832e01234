//! Event retrieval and dispatch
//!
//! Four entry points share one engine:
//! - [`Session::get_next_event`] never blocks,
//! - [`Session::wait_next_event`] blocks for a relative timeout,
//! - [`Session::wait_next_event_until`] blocks until an absolute deadline,
//! - [`Session::dispatch_events`] feeds the installed handler until the
//!   queue is empty or the budget is spent.
//!
//! Every retrieval drains the text-input gate before asking the backend, so
//! a parked character always wins over fresh backend input. Events the
//! backend consumed internally ([`EventKind::Null`]) are never returned; the
//! engine retries within what is left of the caller's budget.
//!
//! [`EventKind::Null`]: crate::event::EventKind::Null

use crate::backend::BackendCaps;
use crate::error::VkfwResult;
use crate::event::Event;
use crate::logging::{error, trace, LogSource};
use crate::session::Session;
use crate::time::{EventMode, EventWait};

impl Session {
    /// Retrieve one event without blocking
    ///
    /// Returns [`Event::none`] when nothing is pending.
    pub fn get_next_event(&mut self) -> VkfwResult<Event> {
        self.next_event(EventWait::Poll)
    }

    /// Retrieve one event, blocking for at most `timeout` microseconds
    ///
    /// A timeout of `0` behaves exactly like [`Session::get_next_event`];
    /// [`NO_TIMEOUT`](crate::time::NO_TIMEOUT) blocks until something
    /// happens.
    pub fn wait_next_event(&mut self, timeout: u64) -> VkfwResult<Event> {
        self.next_event(EventWait::new(EventMode::Timeout, timeout))
    }

    /// Retrieve one event, blocking until `deadline` at the latest
    ///
    /// A deadline of `0` behaves exactly like [`Session::get_next_event`].
    pub fn wait_next_event_until(&mut self, deadline: u64) -> VkfwResult<Event> {
        self.next_event(EventWait::new(EventMode::Deadline, deadline))
    }

    fn next_event(&mut self, wait: EventWait) -> VkfwResult<Event> {
        let start = self.context.time();
        let mut budget = wait;
        loop {
            let mut event = self.fetch_raw_event(budget)?;
            if !event.is_null() {
                self.context.post_process(&mut event);
                return Ok(event);
            }
            trace!(target: LogSource::Core.target(), "swallowed internal event");
            budget = wait.rebase(start, self.context.time());
        }
    }

    /// One event from the gate or the backend, before post-processing
    fn fetch_raw_event(&mut self, wait: EventWait) -> VkfwResult<Event> {
        if let Some(event) = self.context.drain_text_input() {
            return Ok(event);
        }

        if !self.has_capability(BackendCaps::GET_EVENT) {
            // Nothing to wait on, so waiting is just sleeping
            match wait {
                EventWait::Poll => {}
                EventWait::Timeout(timeout) => self.context.delay(timeout),
                EventWait::Deadline(deadline) => self.context.delay_until(deadline),
            }
            return Ok(Event::none());
        }

        self.backend.get_event(&mut self.context, wait).map_err(|err| {
            error!(target: LogSource::Core.target(), "{} backend failed: {err}", self.backend.name());
            err
        })
    }

    /// Deliver events to the installed handler
    ///
    /// In [`EventMode::Poll`] everything already pending is delivered and
    /// `timeout` is ignored. In [`EventMode::Timeout`] and
    /// [`EventMode::Deadline`] events are delivered until the budget runs
    /// out; the deadline is checked after each event, so one slow handler
    /// can overrun it, but no new wait starts after it passed.
    pub fn dispatch_events(&mut self, mode: EventMode, timeout: u64) -> VkfwResult<()> {
        let timeout = if mode == EventMode::Poll { 0 } else { timeout };

        if self.has_capability(BackendCaps::DISPATCH_EVENTS) {
            self.context.deliver_pending_text_input();
            self.backend
                .dispatch_events(&mut self.context, mode, timeout)
                .map_err(|err| {
                    error!(target: LogSource::Core.target(), "{} backend failed: {err}", self.backend.name());
                    err
                })?;
            return Ok(());
        }

        let deadline = match mode {
            EventMode::Poll => 0,
            EventMode::Timeout if timeout == 0 => 0,
            EventMode::Timeout => self.context.time().saturating_add(timeout),
            EventMode::Deadline => timeout,
        };
        let guard = self.context.config().events.wait_guard_micros;

        loop {
            loop {
                let event = self.fetch_raw_event(EventWait::new(EventMode::Deadline, deadline))?;
                if event.is_none() {
                    break;
                }
                if !event.is_null() {
                    self.context.send_event_to_application(event);
                }
                if deadline != 0 && self.context.time() >= deadline {
                    return Ok(());
                }
            }

            let now = self.context.time();
            if deadline == 0 || now >= deadline || deadline - now < guard {
                return Ok(());
            }
        }
    }
}
