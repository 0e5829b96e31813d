//! Orientation source: permission flow, dual-stream subscription and normalization

use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::runtime::Handle;
use tracing::{debug, trace, warn};

use crate::compass::{StreamAuthority, calculate_heading};
use crate::error::{CompassError, Error, PlatformError};
use crate::platform::{Listener, ListenerId, OrientationPlatform};
use crate::types::{OrientationEvent, OrientationSample, OrientationStream, PermissionState};

/// Event names an [`OrientationSource`] emits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceEvent {
    /// A normalized sample (`deviceorientation`)
    DeviceOrientation,
    /// A permission failure (`error`)
    Error,
    /// The relative stream was subscribed after a grant (`permissiongranted`)
    PermissionGranted,
}

impl SourceEvent {
    pub fn name(self) -> &'static str {
        match self {
            SourceEvent::DeviceOrientation => "deviceorientation",
            SourceEvent::Error => "error",
            SourceEvent::PermissionGranted => "permissiongranted",
        }
    }
}

impl FromStr for SourceEvent {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "deviceorientation" => Ok(SourceEvent::DeviceOrientation),
            "error" => Ok(SourceEvent::Error),
            "permissiongranted" => Ok(SourceEvent::PermissionGranted),
            other => Err(Error::UnsupportedEvent(other.to_owned())),
        }
    }
}

/// Callback registered on an [`OrientationSource`]
#[derive(Clone)]
pub enum SourceCallback {
    Orientation(Arc<dyn Fn(&OrientationSample) + Send + Sync>),
    Error(Arc<dyn Fn(&CompassError) + Send + Sync>),
    PermissionGranted(Arc<dyn Fn() + Send + Sync>),
}

impl SourceCallback {
    pub fn orientation(callback: impl Fn(&OrientationSample) + Send + Sync + 'static) -> Self {
        SourceCallback::Orientation(Arc::new(callback))
    }

    pub fn error(callback: impl Fn(&CompassError) + Send + Sync + 'static) -> Self {
        SourceCallback::Error(Arc::new(callback))
    }

    pub fn permission_granted(callback: impl Fn() + Send + Sync + 'static) -> Self {
        SourceCallback::PermissionGranted(Arc::new(callback))
    }

    fn event(&self) -> SourceEvent {
        match self {
            SourceCallback::Orientation(_) => SourceEvent::DeviceOrientation,
            SourceCallback::Error(_) => SourceEvent::Error,
            SourceCallback::PermissionGranted(_) => SourceEvent::PermissionGranted,
        }
    }
}

/// Result of [`OrientationSource::start`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// Both streams are subscribed
    Subscribed,
    /// The absolute stream is subscribed; the relative one waits for a grant
    AwaitingPermission,
}

/// Produces headings from whichever orientation stream fires
///
/// `start` subscribes to the relative stream (after a permission grant when
/// the platform demands one) and, unconditionally, to the absolute stream.
/// Each raw event is normalized into an [`OrientationSample`] and passed to
/// the `deviceorientation` callback. Dropping the source removes its listeners
/// from the platform.
pub struct OrientationSource {
    shared: Arc<SourceShared>,
}

struct SourceShared {
    platform: Arc<dyn OrientationPlatform>,
    inner: Mutex<SourceInner>,
}

#[derive(Default)]
struct SourceInner {
    started: bool,
    /// A permission future is outstanding
    request_in_flight: bool,
    /// The current session wants the outcome of that future
    awaiting_grant: bool,
    authority: StreamAuthority,
    relative: Option<Subscription>,
    absolute: Option<Subscription>,
    next_token: u64,
    callbacks: SourceCallbacks,
}

#[derive(Default, Clone)]
struct SourceCallbacks {
    orientation: Option<Arc<dyn Fn(&OrientationSample) + Send + Sync>>,
    error: Option<Arc<dyn Fn(&CompassError) + Send + Sync>>,
    permission_granted: Option<Arc<dyn Fn() + Send + Sync>>,
}

#[derive(Debug, Clone, Copy)]
struct Subscription {
    id: ListenerId,
    /// Listeners compare this against the live subscription and go inert on mismatch
    token: u64,
}

impl SourceInner {
    fn slot(&mut self, stream: OrientationStream) -> &mut Option<Subscription> {
        match stream {
            OrientationStream::Relative => &mut self.relative,
            OrientationStream::Absolute => &mut self.absolute,
        }
    }
}

impl OrientationSource {
    pub fn new(platform: Arc<dyn OrientationPlatform>) -> Self {
        Self {
            shared: Arc::new(SourceShared {
                platform,
                inner: Mutex::new(SourceInner::default()),
            }),
        }
    }

    /// Register the callback for `event`, replacing any previous one
    ///
    /// # Errors
    /// [`Error::UnsupportedEvent`] for unknown names and
    /// [`Error::CallbackMismatch`] when the callback kind does not fit.
    pub fn on(&self, event: &str, callback: SourceCallback) -> Result<(), Error> {
        let event: SourceEvent = event.parse()?;
        if callback.event() != event {
            return Err(Error::CallbackMismatch {
                event: event.name(),
                callback: callback.event().name(),
            });
        }
        self.set_callback(callback);
        Ok(())
    }

    pub(crate) fn set_callback(&self, callback: SourceCallback) {
        let mut inner = self.shared.lock();
        match callback {
            SourceCallback::Orientation(f) => inner.callbacks.orientation = Some(f),
            SourceCallback::Error(f) => inner.callbacks.error = Some(f),
            SourceCallback::PermissionGranted(f) => inner.callbacks.permission_granted = Some(f),
        }
    }

    /// Subscribe to both orientation streams
    ///
    /// Idempotent while started, and at most one permission request is ever
    /// outstanding: a restart during a pending prompt reuses it.
    ///
    /// # Errors
    /// [`Error::NoRuntime`] when a permission request is needed and the caller
    /// is not inside a Tokio runtime.
    pub fn start(&self) -> Result<StartOutcome, Error> {
        let needs_permission = self.shared.platform.requires_permission();
        let runtime = if needs_permission {
            Some(Handle::try_current().map_err(|_| Error::NoRuntime("permission request"))?)
        } else {
            None
        };

        let mut inner = self.shared.lock();
        if inner.started {
            return Ok(if inner.awaiting_grant {
                StartOutcome::AwaitingPermission
            } else {
                StartOutcome::Subscribed
            });
        }

        inner.started = true;
        inner.authority = StreamAuthority::Undetermined;

        let outcome = match runtime {
            Some(runtime) => {
                inner.awaiting_grant = true;
                if !inner.request_in_flight {
                    inner.request_in_flight = true;
                    self.spawn_permission_request(&runtime);
                }
                StartOutcome::AwaitingPermission
            }
            None => {
                self.shared.subscribe(&mut inner, OrientationStream::Relative);
                StartOutcome::Subscribed
            }
        };

        self.shared.subscribe(&mut inner, OrientationStream::Absolute);
        Ok(outcome)
    }

    /// Unsubscribe from both streams; safe when never started
    pub fn stop(&self) {
        let mut inner = self.shared.lock();
        inner.started = false;
        inner.awaiting_grant = false;
        inner.authority = StreamAuthority::Undetermined;
        for stream in [OrientationStream::Relative, OrientationStream::Absolute] {
            self.shared.unsubscribe(&mut inner, stream);
        }
    }

    pub fn is_started(&self) -> bool {
        self.shared.lock().started
    }

    /// Whether a listener for `stream` is currently registered
    pub fn is_subscribed(&self, stream: OrientationStream) -> bool {
        self.shared.lock().slot(stream).is_some()
    }

    /// Which stream currently drives the heading
    pub fn authority(&self) -> StreamAuthority {
        self.shared.lock().authority
    }

    fn spawn_permission_request(&self, runtime: &Handle) {
        let platform = Arc::clone(&self.shared.platform);
        let weak = Arc::downgrade(&self.shared);

        runtime.spawn(async move {
            let response = platform.request_permission().await;
            if let Some(shared) = weak.upgrade() {
                shared.resolve_permission(response);
            }
        });
    }
}

impl Drop for SourceShared {
    fn drop(&mut self) {
        // Listeners only hold weak handles; without this they stay on the platform
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        for subscription in [inner.relative.take(), inner.absolute.take()].into_iter().flatten() {
            self.platform.remove_listener(subscription.id);
        }
    }
}

impl SourceShared {
    fn lock(&self) -> MutexGuard<'_, SourceInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn subscribe(self: &Arc<Self>, inner: &mut SourceInner, stream: OrientationStream) {
        if inner.slot(stream).is_some() {
            return;
        }

        inner.next_token += 1;
        let token = inner.next_token;
        let weak: Weak<SourceShared> = Arc::downgrade(self);
        let listener: Listener = Arc::new(move |event: &OrientationEvent| {
            if let Some(shared) = weak.upgrade() {
                shared.handle_event(stream, token, event);
            }
        });

        let id = self.platform.add_listener(stream, listener);
        *inner.slot(stream) = Some(Subscription { id, token });
        trace!(stream = stream.event_name(), "subscribed");
    }

    fn unsubscribe(&self, inner: &mut SourceInner, stream: OrientationStream) {
        if let Some(subscription) = inner.slot(stream).take() {
            self.platform.remove_listener(subscription.id);
            trace!(stream = stream.event_name(), "unsubscribed");
        }
    }

    fn resolve_permission(self: &Arc<Self>, response: Result<PermissionState, PlatformError>) {
        let mut inner = self.lock();
        inner.request_in_flight = false;
        if !inner.awaiting_grant {
            debug!("permission settled after stop, discarding");
            return;
        }
        inner.awaiting_grant = false;

        match response {
            Ok(PermissionState::Granted) => {
                debug!("orientation permission granted");
                // The absolute stream may already have won while the prompt was open
                if inner.authority.admits(OrientationStream::Relative) {
                    self.subscribe(&mut inner, OrientationStream::Relative);
                }
                let callback = inner.callbacks.permission_granted.clone();
                drop(inner);
                if let Some(callback) = callback {
                    callback();
                }
            }
            other => {
                match other {
                    Ok(state) => debug!(?state, "orientation permission not granted"),
                    Err(e) => warn!(error = %e, "orientation permission request failed"),
                }
                let callback = inner.callbacks.error.clone();
                drop(inner);
                if let Some(callback) = callback {
                    callback(&CompassError::permission_denied());
                }
            }
        }
    }

    fn handle_event(&self, stream: OrientationStream, token: u64, event: &OrientationEvent) {
        let (callback, sample) = {
            let mut inner = self.lock();
            if inner.slot(stream).map(|subscription| subscription.token) != Some(token) {
                // Stale listener; removal raced with an in-flight dispatch
                return;
            }

            let (authority, dropped) = inner.authority.observe(stream, event);
            inner.authority = authority;
            if let Some(dropped) = dropped {
                debug!(
                    authoritative = stream.event_name(),
                    dropped = dropped.event_name(),
                    "orientation stream preempted"
                );
                self.unsubscribe(&mut inner, dropped);
            }

            let sample = OrientationSample {
                heading: calculate_heading(event),
                stream,
                raw: *event,
            };
            (inner.callbacks.orientation.clone(), sample)
        };

        trace!(stream = stream.event_name(), heading = ?sample.heading, "orientation sample");
        if let Some(callback) = callback {
            callback(&sample);
        }
    }
}
