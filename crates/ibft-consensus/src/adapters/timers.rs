//! Timer implementations for the core
//!
//! `TokioTimers` spawns one sleeping task per armed timer and posts the fired
//! event into the core's queue. `RecordingTimers` only records armings so
//! tests can fire them by hand.

use crate::domain::{ConsensusMessage, View};
use crate::events::CoreEvent;
use crate::ports::RoundTimers;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Timers backed by tokio tasks.
///
/// Must be used from within a tokio runtime.
pub struct TokioTimers<P> {
    events: UnboundedSender<CoreEvent<P>>,
    round_change: Option<JoinHandle<()>>,
    future_preprepare: Option<JoinHandle<()>>,
}

impl<P: Send + 'static> TokioTimers<P> {
    pub fn new(events: UnboundedSender<CoreEvent<P>>) -> Self {
        Self {
            events,
            round_change: None,
            future_preprepare: None,
        }
    }

    fn spawn(&self, delay: Duration, event: CoreEvent<P>) -> JoinHandle<()> {
        let events = self.events.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            trace!(kind = event.kind(), "Timer fired");
            // The core may already be gone
            let _ = events.send(event);
        })
    }

    fn stop_round_change(&mut self) {
        if let Some(handle) = self.round_change.take() {
            handle.abort();
        }
    }
}

impl<P: Send + 'static> RoundTimers for TokioTimers<P> {
    fn start_round_change(&mut self, next_view: View, timeout: Duration) {
        self.stop_round_change();
        self.round_change = Some(self.spawn(timeout, CoreEvent::Timeout { next_view }));
        debug!(%next_view, ?timeout, "Round change timer set");
    }

    fn start_future_preprepare(&mut self, message: ConsensusMessage, delay: Duration) {
        self.stop_future_preprepare();
        self.future_preprepare = Some(self.spawn(delay, CoreEvent::Deliver(message)));
        debug!(?delay, "Future preprepare timer set");
    }

    fn stop_future_preprepare(&mut self) {
        if let Some(handle) = self.future_preprepare.take() {
            handle.abort();
        }
    }

    fn stop_all(&mut self) {
        self.stop_round_change();
        self.stop_future_preprepare();
    }
}

impl<P> Drop for TokioTimers<P> {
    fn drop(&mut self) {
        for handle in [self.round_change.take(), self.future_preprepare.take()]
            .into_iter()
            .flatten()
        {
            handle.abort();
        }
    }
}

/// Armings seen by a `RecordingTimers`
#[derive(Debug, Default)]
pub struct TimerLog {
    pub round_change: Option<(View, Duration)>,
    pub future_preprepare: Option<(ConsensusMessage, Duration)>,
    /// Every round-change arming, oldest first
    pub history: Vec<(View, Duration)>,
}

/// Timers that never fire on their own.
///
/// Clones share the same log, so a test keeps one handle while the core owns
/// another.
#[derive(Clone, Debug, Default)]
pub struct RecordingTimers {
    log: Arc<Mutex<TimerLog>>,
}

impl RecordingTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Disarm the round-change timer, returning the view it would announce
    pub fn fire_round_change(&self) -> Option<View> {
        self.log.lock().round_change.take().map(|(view, _)| view)
    }

    /// Disarm the future-preprepare timer, returning the parked message
    pub fn fire_future_preprepare(&self) -> Option<ConsensusMessage> {
        self.log
            .lock()
            .future_preprepare
            .take()
            .map(|(message, _)| message)
    }

    pub fn armed_round_change(&self) -> Option<(View, Duration)> {
        self.log.lock().round_change
    }

    pub fn armed_future_preprepare(&self) -> Option<Duration> {
        self.log.lock().future_preprepare.as_ref().map(|(_, delay)| *delay)
    }

    pub fn history(&self) -> Vec<(View, Duration)> {
        self.log.lock().history.clone()
    }
}

impl RoundTimers for RecordingTimers {
    fn start_round_change(&mut self, next_view: View, timeout: Duration) {
        let mut log = self.log.lock();
        log.round_change = Some((next_view, timeout));
        log.history.push((next_view, timeout));
    }

    fn start_future_preprepare(&mut self, message: ConsensusMessage, delay: Duration) {
        self.log.lock().future_preprepare = Some((message, delay));
    }

    fn stop_future_preprepare(&mut self) {
        self.log.lock().future_preprepare = None;
    }

    fn stop_all(&mut self) {
        let mut log = self.log.lock();
        log.round_change = None;
        log.future_preprepare = None;
    }
}
