//! Listener session: sensor subscriptions, startup watchdog and delivery

use std::sync::mpsc::Receiver;

use tracing::{debug, info, trace, warn};

use crate::error::SessionError;
use crate::estimator::OrientationEstimator;
use crate::platform::{Bridge, SensorPlatform, SessionEvent, Timer, TimerHandle};
use crate::types::{RawSample, SensorAccuracy, SensorKind, SessionSettings, SessionStatus};

/// One orientation subscription
///
/// Owns the status state machine and the estimator for a start→stop cycle.
/// All methods take `&mut self`; a host with callbacks on several threads
/// either wraps the session in a mutex or posts [`SessionEvent`]s to a single
/// control thread running [`Session::run`].
///
/// ```text
/// Stopped ──start──▶ Starting ──first accelerometer sample──▶ Running
///    ▲                  │  └──────watchdog / sensor missing──▶ FailedToStart
///    └──────stop────────┴───────────────────────────────────────────┘
/// ```
pub struct Session<P, T, B> {
    settings: SessionSettings,
    status: SessionStatus,
    estimator: OrientationEstimator,
    platform: P,
    timer: T,
    bridge: B,
    watchdog: Option<TimerHandle>,
    subscribed: bool,
    paused: bool,
}

impl<P, T, B> Session<P, T, B>
where
    P: SensorPlatform,
    T: Timer,
    B: Bridge,
{
    /// Create a stopped session with default settings
    pub fn new(platform: P, timer: T, bridge: B) -> Self {
        Self::with_settings(SessionSettings::default(), platform, timer, bridge)
    }

    pub fn with_settings(settings: SessionSettings, platform: P, timer: T, bridge: B) -> Self {
        Self {
            settings,
            status: SessionStatus::Stopped,
            estimator: OrientationEstimator::with_settings(settings.fusion),
            platform,
            timer,
            bridge,
            watchdog: None,
            subscribed: false,
            paused: false,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn settings(&self) -> SessionSettings {
        self.settings
    }

    pub fn estimator(&self) -> &OrientationEstimator {
        &self.estimator
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    pub fn timer_mut(&mut self) -> &mut T {
        &mut self.timer
    }

    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    pub fn bridge(&self) -> &B {
        &self.bridge
    }

    /// Whether sensor delivery is suspended by a platform pause
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Start listening
    ///
    /// Does nothing while already starting or running. Failures are reported
    /// through the bridge, never returned.
    pub fn start(&mut self) {
        if self.status.is_active() {
            debug!(status = ?self.status, "start ignored, session already active");
            return;
        }

        let sensors = self.platform.sensors();
        let missing: Vec<SensorKind> = SensorKind::REQUIRED
            .into_iter()
            .filter(|kind| !sensors.iter().any(|sensor| sensor.kind == Some(*kind)))
            .collect();
        if !missing.is_empty() {
            warn!(?missing, "required sensors unavailable");
            self.fail(SessionError::SensorUnavailable { sensors });
            return;
        }

        self.estimator.reset();
        self.status = SessionStatus::Starting;
        info!(rate = ?self.settings.rate, "starting orientation session");

        if let Err(error) = self.subscribe() {
            self.fail(error);
            return;
        }
        self.watchdog = Some(self.timer.schedule(self.settings.watchdog));
    }

    /// Stop listening and discard the fused state
    pub fn stop(&mut self) {
        if self.status == SessionStatus::Stopped {
            return;
        }
        self.disarm_watchdog();
        self.unsubscribe();
        self.paused = false;
        self.estimator.reset();
        self.status = SessionStatus::Stopped;
        info!("orientation session stopped");
    }

    /// Host is tearing the listener down
    pub fn on_destroy(&mut self) {
        self.stop();
    }

    /// Host navigated away; a running session is stopped
    pub fn on_reset(&mut self) {
        if self.status == SessionStatus::Running {
            self.stop();
        }
    }

    /// Suspend sensor delivery, keeping status and fused state
    pub fn on_pause(&mut self) {
        if self.status.is_active() && !self.paused {
            debug!("pausing sensor delivery");
            self.unsubscribe();
            self.paused = true;
        }
    }

    /// Resume sensor delivery after a pause
    ///
    /// A refused re-subscription fails the session whether it was starting or
    /// already running.
    pub fn on_resume(&mut self) {
        if !self.paused {
            return;
        }
        self.paused = false;
        if !self.status.is_active() {
            return;
        }

        debug!("resuming sensor delivery");
        if let Err(error) = self.subscribe() {
            self.fail(error);
        }
    }

    /// Watchdog expiry
    ///
    /// Only the currently armed handle counts, and only while still starting;
    /// anything else is a stale or raced callback and is ignored.
    pub fn on_watchdog(&mut self, handle: TimerHandle) {
        if self.watchdog != Some(handle) {
            trace!(?handle, "stale watchdog ignored");
            return;
        }
        self.disarm_watchdog();
        if self.status == SessionStatus::Starting {
            warn!(timeout = ?self.settings.watchdog, "no accelerometer sample before watchdog expiry");
            self.fail(SessionError::StartTimeout);
        }
    }

    /// Feed one sensor sample
    ///
    /// The first accelerometer sample while starting moves the session to
    /// running. Every accelerometer sample while running emits an orientation.
    pub fn on_sample(&mut self, sample: RawSample) {
        match self.status {
            SessionStatus::Running => {}
            SessionStatus::Starting => {
                if sample.kind == SensorKind::Accelerometer {
                    self.disarm_watchdog();
                    self.status = SessionStatus::Running;
                    info!("first accelerometer sample received, session running");
                }
            }
            SessionStatus::Stopped | SessionStatus::FailedToStart => {
                trace!(kind = %sample.kind, status = ?self.status, "sample ignored");
                return;
            }
        }

        if let Some(orientation) = self.estimator.update(&sample) {
            self.bridge.emit(orientation);
        }
    }

    /// Platform accuracy report
    pub fn on_accuracy_changed(&mut self, kind: SensorKind, accuracy: SensorAccuracy) {
        if self.status == SessionStatus::Stopped {
            return;
        }
        debug!(sensor = %kind, ?accuracy, "accuracy changed");
        self.estimator.set_accuracy(kind, accuracy);
    }

    /// Dispatch one serialized event
    ///
    /// Returns `false` once the session has been destroyed.
    pub fn handle(&mut self, event: SessionEvent) -> bool {
        match event {
            SessionEvent::Start => self.start(),
            SessionEvent::Stop => self.stop(),
            SessionEvent::Destroy => {
                self.on_destroy();
                return false;
            }
            SessionEvent::Pause => self.on_pause(),
            SessionEvent::Resume => self.on_resume(),
            SessionEvent::Reset => self.on_reset(),
            SessionEvent::Sample(sample) => self.on_sample(sample),
            SessionEvent::AccuracyChanged(kind, accuracy) => self.on_accuracy_changed(kind, accuracy),
            SessionEvent::Watchdog(handle) => self.on_watchdog(handle),
        }
        true
    }

    /// Process events until the channel closes or the session is destroyed
    pub fn run(&mut self, events: Receiver<SessionEvent>) {
        for event in events {
            if !self.handle(event) {
                break;
            }
        }
        self.stop();
    }

    fn subscribe(&mut self) -> Result<(), SessionError> {
        if self.subscribed {
            return Ok(());
        }
        for (index, kind) in SensorKind::REQUIRED.into_iter().enumerate() {
            if let Err(source) = self.platform.subscribe(kind, self.settings.rate) {
                for done in &SensorKind::REQUIRED[..index] {
                    self.platform.unsubscribe(*done);
                }
                return Err(SessionError::SubscribeFailed { kind, source });
            }
        }
        self.subscribed = true;
        Ok(())
    }

    fn unsubscribe(&mut self) {
        if !self.subscribed {
            return;
        }
        for kind in SensorKind::REQUIRED {
            self.platform.unsubscribe(kind);
        }
        self.subscribed = false;
    }

    fn disarm_watchdog(&mut self) {
        if let Some(handle) = self.watchdog.take() {
            self.timer.cancel(handle);
        }
    }

    /// End the current start attempt and tell the caller once
    fn fail(&mut self, error: SessionError) {
        self.disarm_watchdog();
        self.unsubscribe();
        self.paused = false;
        self.status = SessionStatus::FailedToStart;
        warn!(%error, "orientation session failed to start");
        self.bridge.fail(error.to_failure());
    }
}
