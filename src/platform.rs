//! Seams to the host: sensor platform, watchdog timer and caller bridge
//!
//! The session drives these through traits so that it can run against a real
//! sensor stack, a simulator, or test doubles.

use core::time::Duration;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;

use tracing::trace;

use crate::error::PlatformError;
use crate::types::{Failure, Orientation, RawSample, SamplingRate, SensorAccuracy, SensorInfo, SensorKind};

/// Source of raw sensor samples
///
/// Samples, accuracy changes and lifecycle notifications flow the other way:
/// the host calls into the session (or sends it a [`SessionEvent`]).
pub trait SensorPlatform {
    /// Enumerate every sensor the device exposes
    fn sensors(&self) -> Vec<SensorInfo>;

    /// Start delivering samples of `kind`
    fn subscribe(&mut self, kind: SensorKind, rate: SamplingRate) -> Result<(), PlatformError>;

    /// Stop delivering samples of `kind`
    fn unsubscribe(&mut self, kind: SensorKind);
}

/// Identifies one scheduled timer callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(pub u64);

/// Cancellable one-shot timer
///
/// Expiry is reported back to the session with the handle that was returned
/// by `schedule`, which lets the session discard stale callbacks.
pub trait Timer {
    fn schedule(&mut self, delay: Duration) -> TimerHandle;
    fn cancel(&mut self, handle: TimerHandle);
}

/// Delivery channel to the caller
///
/// One `start` yields many emissions until `stop`; the bridge keeps its
/// channel open across them.
pub trait Bridge {
    fn emit(&mut self, orientation: Orientation);
    fn fail(&mut self, failure: Failure);
}

/// Message forwarded through a channel or collected by a bridge
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeMessage {
    Orientation(Orientation),
    Failure(Failure),
}

impl BridgeMessage {
    /// JSON payload for the host callback
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            BridgeMessage::Orientation(orientation) => orientation.to_json(),
            BridgeMessage::Failure(failure) => failure.to_json(),
        }
    }
}

impl Bridge for Vec<BridgeMessage> {
    fn emit(&mut self, orientation: Orientation) {
        self.push(BridgeMessage::Orientation(orientation));
    }

    fn fail(&mut self, failure: Failure) {
        self.push(BridgeMessage::Failure(failure));
    }
}

impl Bridge for Sender<BridgeMessage> {
    fn emit(&mut self, orientation: Orientation) {
        // A closed receiver means the caller went away; nothing left to notify.
        let _ = self.send(BridgeMessage::Orientation(orientation));
    }

    fn fail(&mut self, failure: Failure) {
        let _ = self.send(BridgeMessage::Failure(failure));
    }
}

/// Everything a session reacts to, for hosts that serialize callbacks onto
/// one control thread
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Start,
    Stop,
    Destroy,
    Pause,
    Resume,
    Reset,
    Sample(RawSample),
    AccuracyChanged(SensorKind, SensorAccuracy),
    Watchdog(TimerHandle),
}

/// Timer driven by the host's own clock
///
/// The host calls [`ManualTimer::advance`] from its loop and hands every
/// expired handle to the session.
#[derive(Debug, Default)]
pub struct ManualTimer {
    now: Duration,
    next_id: u64,
    pending: Vec<(TimerHandle, Duration)>,
}

impl ManualTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time elapsed since the timer was created
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Handles that are scheduled and not yet expired or cancelled
    pub fn pending(&self) -> Vec<TimerHandle> {
        self.pending.iter().map(|(handle, _)| *handle).collect()
    }

    /// Move the clock forward and return the handles that expired, in
    /// deadline order
    pub fn advance(&mut self, elapsed: Duration) -> Vec<TimerHandle> {
        self.now += elapsed;
        let now = self.now;
        let mut expired: Vec<(TimerHandle, Duration)> = Vec::new();
        self.pending.retain(|&(handle, deadline)| {
            if deadline <= now {
                expired.push((handle, deadline));
                false
            } else {
                true
            }
        });
        expired.sort_by_key(|&(_, deadline)| deadline);
        expired.into_iter().map(|(handle, _)| handle).collect()
    }
}

impl Timer for ManualTimer {
    fn schedule(&mut self, delay: Duration) -> TimerHandle {
        self.next_id += 1;
        let handle = TimerHandle(self.next_id);
        self.pending.push((handle, self.now + delay));
        handle
    }

    fn cancel(&mut self, handle: TimerHandle) {
        self.pending.retain(|&(pending, _)| pending != handle);
    }
}

/// Timer backed by a sleeping thread per schedule
///
/// Expiry is posted as [`SessionEvent::Watchdog`] on the session's event
/// channel, so the callback runs on the control thread like every other
/// event. Cancellation only suppresses the post; a post already in flight is
/// rejected by the session's handle and status re-check.
#[derive(Debug)]
pub struct ThreadTimer {
    events: Sender<SessionEvent>,
    next_id: u64,
    cancelled: HashMap<TimerHandle, Arc<AtomicBool>>,
}

impl ThreadTimer {
    pub fn new(events: Sender<SessionEvent>) -> Self {
        Self {
            events,
            next_id: 0,
            cancelled: HashMap::new(),
        }
    }

    /// Number of scheduled handles not yet cancelled
    pub fn armed(&self) -> usize {
        self.cancelled.len()
    }
}

impl Timer for ThreadTimer {
    fn schedule(&mut self, delay: Duration) -> TimerHandle {
        self.next_id += 1;
        let handle = TimerHandle(self.next_id);
        let cancelled = Arc::new(AtomicBool::new(false));
        self.cancelled.insert(handle, cancelled.clone());

        let events = self.events.clone();
        std::thread::spawn(move || {
            std::thread::sleep(delay);
            if !cancelled.load(Ordering::Acquire) {
                trace!(?handle, "timer expired");
                let _ = events.send(SessionEvent::Watchdog(handle));
            }
        });
        handle
    }

    fn cancel(&mut self, handle: TimerHandle) {
        if let Some(flag) = self.cancelled.remove(&handle) {
            flag.store(true, Ordering::Release);
        }
    }
}
