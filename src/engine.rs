//! Compass engine: on/off lifecycle, timeout watchdog and heading publication

use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::error::{CompassError, Error};
use crate::platform::OrientationPlatform;
use crate::smoother::HeadingSmoother;
use crate::source::{OrientationSource, SourceCallback, StartOutcome};
use crate::types::{CompassEvent, CompassSettings, EngineState, OrientationSample};

/// Event names a [`CompassEngine`] emits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    /// Every sample delivered while on, before gating (`sample`)
    Sample,
    Heading,
    Error,
    TurnOn,
    TurnOff,
}

impl EngineEvent {
    pub fn name(self) -> &'static str {
        match self {
            EngineEvent::Sample => "sample",
            EngineEvent::Heading => "heading",
            EngineEvent::Error => "error",
            EngineEvent::TurnOn => "turnon",
            EngineEvent::TurnOff => "turnoff",
        }
    }
}

impl FromStr for EngineEvent {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "sample" => Ok(EngineEvent::Sample),
            "heading" => Ok(EngineEvent::Heading),
            "error" => Ok(EngineEvent::Error),
            "turnon" => Ok(EngineEvent::TurnOn),
            "turnoff" => Ok(EngineEvent::TurnOff),
            other => Err(Error::UnsupportedEvent(other.to_owned())),
        }
    }
}

type Notify = Arc<dyn Fn() + Send + Sync>;

/// Callback registered on a [`CompassEngine`]
#[derive(Clone)]
pub enum EngineCallback {
    Sample(Arc<dyn Fn(&OrientationSample) + Send + Sync>),
    Heading(Arc<dyn Fn(&CompassEvent) + Send + Sync>),
    Error(Arc<dyn Fn(&CompassError) + Send + Sync>),
    TurnOn(Notify),
    TurnOff(Notify),
}

impl EngineCallback {
    pub fn sample(callback: impl Fn(&OrientationSample) + Send + Sync + 'static) -> Self {
        EngineCallback::Sample(Arc::new(callback))
    }

    pub fn heading(callback: impl Fn(&CompassEvent) + Send + Sync + 'static) -> Self {
        EngineCallback::Heading(Arc::new(callback))
    }

    pub fn error(callback: impl Fn(&CompassError) + Send + Sync + 'static) -> Self {
        EngineCallback::Error(Arc::new(callback))
    }

    pub fn turn_on(callback: impl Fn() + Send + Sync + 'static) -> Self {
        EngineCallback::TurnOn(Arc::new(callback))
    }

    pub fn turn_off(callback: impl Fn() + Send + Sync + 'static) -> Self {
        EngineCallback::TurnOff(Arc::new(callback))
    }

    pub(crate) fn event(&self) -> EngineEvent {
        match self {
            EngineCallback::Sample(_) => EngineEvent::Sample,
            EngineCallback::Heading(_) => EngineEvent::Heading,
            EngineCallback::Error(_) => EngineEvent::Error,
            EngineCallback::TurnOn(_) => EngineEvent::TurnOn,
            EngineCallback::TurnOff(_) => EngineEvent::TurnOff,
        }
    }

    /// Parse `event` and check that this callback fits it
    pub(crate) fn validate_for(&self, event: &str) -> Result<(), Error> {
        let event: EngineEvent = event.parse()?;
        if self.event() != event {
            return Err(Error::CallbackMismatch {
                event: event.name(),
                callback: self.event().name(),
            });
        }
        Ok(())
    }
}

/// One optional callback per engine event
#[derive(Default, Clone)]
pub(crate) struct EngineCallbacks {
    pub(crate) sample: Option<Arc<dyn Fn(&OrientationSample) + Send + Sync>>,
    pub(crate) heading: Option<Arc<dyn Fn(&CompassEvent) + Send + Sync>>,
    pub(crate) error: Option<Arc<dyn Fn(&CompassError) + Send + Sync>>,
    pub(crate) turn_on: Option<Notify>,
    pub(crate) turn_off: Option<Notify>,
}

impl EngineCallbacks {
    pub(crate) fn set(&mut self, callback: EngineCallback) {
        match callback {
            EngineCallback::Sample(f) => self.sample = Some(f),
            EngineCallback::Heading(f) => self.heading = Some(f),
            EngineCallback::Error(f) => self.error = Some(f),
            EngineCallback::TurnOn(f) => self.turn_on = Some(f),
            EngineCallback::TurnOff(f) => self.turn_off = Some(f),
        }
    }
}

/// Compass engine
///
/// Owns one [`OrientationSource`] and one [`HeadingSmoother`]. Turning it on
/// subscribes to the platform and arms a single-shot watchdog; every usable
/// sample is smoothed and published as a [`CompassEvent`]. If no heading
/// arrives before the watchdog fires, or sensor permission is refused, the
/// engine turns itself off, lands in [`EngineState::Disabled`] and reports
/// exactly one [`CompassError`].
///
/// The handle is cheap to clone; clones drive the same engine. Callbacks run
/// with no internal lock held and may call back into the engine.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use compass_heading::{CompassEngine, EngineCallback, LocalEventBus, OrientationEvent, OrientationStream};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let bus = Arc::new(LocalEventBus::new());
/// let engine = CompassEngine::new(bus.clone());
/// engine
///     .on("heading", EngineCallback::heading(|event| println!("heading {:.1}", event.heading)))
///     .unwrap();
///
/// engine.turn_on().unwrap();
/// bus.dispatch(OrientationStream::Relative, OrientationEvent::from_alpha(90.0));
/// assert!((engine.heading().unwrap() - 270.0).abs() < 1e-9);
/// # }
/// ```
#[derive(Clone)]
pub struct CompassEngine {
    shared: Arc<EngineShared>,
}

struct EngineShared {
    source: OrientationSource,
    inner: Mutex<EngineInner>,
}

struct EngineInner {
    settings: CompassSettings,
    state: EngineState,
    smoother: HeadingSmoother,
    /// Last published heading of the current session
    heading: Option<f64>,
    /// Bumped on every turn-on; stale timers compare against it
    session: u64,
    turned_on_at: Option<Instant>,
    watchdog: Option<AbortHandle>,
    callbacks: EngineCallbacks,
}

impl EngineInner {
    fn disarm_watchdog(&mut self) {
        if let Some(watchdog) = self.watchdog.take() {
            watchdog.abort();
        }
    }

    /// Leave the current session; returns whether the engine was on
    fn end_session(&mut self, next: EngineState) -> bool {
        let was_on = self.state.is_on();
        self.state = next;
        self.disarm_watchdog();
        self.smoother.clear();
        self.heading = None;
        was_on
    }
}

impl CompassEngine {
    /// Create an engine with default settings
    pub fn new(platform: Arc<dyn OrientationPlatform>) -> Self {
        Self::build(platform, CompassSettings::default())
    }

    /// Create an engine with validated `settings`
    pub fn with_settings(
        platform: Arc<dyn OrientationPlatform>,
        settings: CompassSettings,
    ) -> Result<Self, Error> {
        settings.validate()?;
        Ok(Self::build(platform, settings))
    }

    fn build(platform: Arc<dyn OrientationPlatform>, settings: CompassSettings) -> Self {
        let shared = Arc::new(EngineShared {
            source: OrientationSource::new(platform),
            inner: Mutex::new(EngineInner {
                smoother: HeadingSmoother::new(settings.history_size),
                settings,
                state: EngineState::Idle,
                heading: None,
                session: 0,
                turned_on_at: None,
                watchdog: None,
                callbacks: EngineCallbacks::default(),
            }),
        });

        // The engine owns the source, so source callbacks hold the engine weakly
        let weak = Arc::downgrade(&shared);
        shared.source.set_callback(SourceCallback::orientation(move |sample| {
            if let Some(shared) = weak.upgrade() {
                shared.handle_sample(sample);
            }
        }));

        let weak = Arc::downgrade(&shared);
        shared.source.set_callback(SourceCallback::error(move |error| {
            if let Some(shared) = weak.upgrade() {
                let session = shared.lock().session;
                shared.fail(session, error.clone());
            }
        }));

        let weak = Arc::downgrade(&shared);
        shared.source.set_callback(SourceCallback::permission_granted(move || {
            if let Some(shared) = weak.upgrade() {
                let mut inner = shared.lock();
                if inner.state == EngineState::Acquiring {
                    inner.state = EngineState::Listening;
                }
            }
        }));

        Self { shared }
    }

    /// Register the callback for `event` (`sample`, `heading`, `error`,
    /// `turnon`, `turnoff`), replacing any previous one
    ///
    /// `sample` sees every sample that arrives while the engine is on, including
    /// ones without a heading and ones the accuracy gate drops.
    ///
    /// # Errors
    /// [`Error::UnsupportedEvent`] for unknown names and
    /// [`Error::CallbackMismatch`] when the callback kind does not fit.
    pub fn on(&self, event: &str, callback: EngineCallback) -> Result<(), Error> {
        callback.validate_for(event)?;
        self.set_callback(callback);
        Ok(())
    }

    pub(crate) fn set_callback(&self, callback: EngineCallback) {
        self.shared.lock().callbacks.set(callback);
    }

    /// Turn the compass on
    ///
    /// No-op while already on. From `Idle` or `Disabled` this starts a new
    /// session: the `turnon` callback fires synchronously, the source starts,
    /// and the watchdog is armed for the configured timeout.
    ///
    /// # Errors
    /// [`Error::NoRuntime`] outside a Tokio runtime.
    pub fn turn_on(&self) -> Result<(), Error> {
        let runtime = Handle::try_current().map_err(|_| Error::NoRuntime("compass watchdog"))?;

        let (session, notify) = {
            let mut inner = self.shared.lock();
            if inner.state.is_on() {
                return Ok(());
            }

            inner.session += 1;
            inner.state = EngineState::Acquiring;
            inner.smoother.clear();
            inner.heading = None;
            inner.turned_on_at = Some(Instant::now());
            info!(
                session = inner.session,
                timeout_ms = inner.settings.timeout_ms,
                "compass turned on"
            );
            (inner.session, inner.callbacks.turn_on.clone())
        };

        if let Some(notify) = notify {
            notify();
        }

        if !self.shared.is_current(session) {
            // Turned off from inside the turnon callback
            return Ok(());
        }

        let outcome = self.shared.source.start()?;

        let mut inner = self.shared.lock();
        if !inner.state.is_on() {
            // Turned off from another handle while the source was starting
            self.shared.source.stop();
            return Ok(());
        }
        if inner.session != session {
            return Ok(());
        }
        if outcome == StartOutcome::Subscribed && inner.state == EngineState::Acquiring {
            inner.state = EngineState::Listening;
        }

        let timeout = inner.settings.timeout();
        let weak = Arc::downgrade(&self.shared);
        let watchdog = runtime.spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(shared) = weak.upgrade() {
                shared.expire(session);
            }
        });
        inner.watchdog = Some(watchdog.abort_handle());

        Ok(())
    }

    /// Turn the compass off
    ///
    /// Stops the source, clears the history and fires `turnoff`. Idempotent;
    /// from `Disabled` it returns to `Idle` without another notification.
    pub fn turn_off(&self) {
        let notify = {
            let mut inner = self.shared.lock();
            if !inner.end_session(EngineState::Idle) {
                return;
            }
            info!(session = inner.session, "compass turned off");
            inner.callbacks.turn_off.clone()
        };

        self.shared.source.stop();
        if let Some(notify) = notify {
            notify();
        }
    }

    pub fn state(&self) -> EngineState {
        self.shared.lock().state
    }

    pub fn is_on(&self) -> bool {
        self.state().is_on()
    }

    /// Last heading published in the current session
    pub fn heading(&self) -> Option<f64> {
        self.shared.lock().heading
    }

    /// Headings currently held by the smoother
    pub fn history_len(&self) -> usize {
        self.shared.lock().smoother.len()
    }

    pub fn settings(&self) -> CompassSettings {
        self.shared.lock().settings.clone()
    }

    /// When the current session started
    pub fn turned_on_at(&self) -> Option<Instant> {
        self.shared.lock().turned_on_at
    }

    /// The engine's orientation source, for inspection
    pub fn source(&self) -> &OrientationSource {
        &self.shared.source
    }
}

impl Drop for EngineShared {
    fn drop(&mut self) {
        self.inner
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .disarm_watchdog();
    }
}

impl EngineShared {
    fn lock(&self) -> MutexGuard<'_, EngineInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self, session: u64) -> bool {
        let inner = self.lock();
        inner.session == session && inner.state.is_on()
    }

    fn handle_sample(&self, sample: &OrientationSample) {
        let on_sample = {
            let inner = self.lock();
            if !inner.state.is_on() {
                return;
            }
            inner.callbacks.sample.clone()
        };
        if let Some(on_sample) = on_sample {
            on_sample(sample);
        }

        let Some(heading) = sample.heading else {
            trace!(stream = sample.stream.event_name(), "sample without heading");
            return;
        };

        let (callback, event) = {
            let mut inner = self.lock();
            if !inner.state.is_on() {
                return;
            }
            if !inner.settings.accepts_accuracy(sample.raw.compass_accuracy) {
                debug!(
                    accuracy = ?sample.raw.compass_accuracy,
                    min_accuracy = ?inner.settings.min_accuracy,
                    "sample below accuracy threshold"
                );
                return;
            }

            inner.smoother.record(heading);
            let published = if inner.settings.smoothing {
                inner.smoother.current_average().unwrap_or(heading)
            } else {
                heading
            };

            if inner.heading.is_none() {
                let elapsed_ms = inner
                    .turned_on_at
                    .map(|started| started.elapsed().as_millis() as u64)
                    .unwrap_or_default();
                debug!(heading = published, elapsed_ms, "first compass heading");
                inner.disarm_watchdog();
            }
            inner.heading = Some(published);
            if inner.state == EngineState::Acquiring {
                inner.state = EngineState::Listening;
            }

            let event = CompassEvent {
                heading: published,
                stream: sample.stream,
                raw: sample.raw,
            };
            (inner.callbacks.heading.clone(), event)
        };

        if let Some(callback) = callback {
            callback(&event);
        }
    }

    fn expire(&self, session: u64) {
        let error = {
            let inner = self.lock();
            if inner.session != session || !inner.state.is_on() || inner.heading.is_some() {
                return;
            }
            CompassError::timeout(inner.settings.timeout())
        };
        self.fail(session, error);
    }

    /// End `session` in `Disabled` and report `error` once
    fn fail(&self, session: u64, error: CompassError) {
        let (turn_off, on_error) = {
            let mut inner = self.lock();
            if inner.session != session || !inner.state.is_on() {
                return;
            }
            inner.end_session(EngineState::Disabled);
            warn!(code = %error.code(), message = error.message(), "compass disabled");
            (inner.callbacks.turn_off.clone(), inner.callbacks.error.clone())
        };

        self.source.stop();
        if let Some(turn_off) = turn_off {
            turn_off();
        }
        if let Some(on_error) = on_error {
            on_error(&error);
        }
    }
}
