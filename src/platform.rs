//! Platform capability: orientation event bus and sensor permission prompt

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::PlatformError;
use crate::types::{OrientationEvent, OrientationStream, PermissionState};

/// Callback the platform invokes for each orientation event
pub type Listener = Arc<dyn Fn(&OrientationEvent) + Send + Sync>;

/// Handle identifying one registered listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

/// Everything the compass needs from the host platform
///
/// Browsers keep orientation listeners in a process-wide registry. Injecting
/// it through this trait lets tests and non-browser hosts substitute their
/// own event source.
#[async_trait]
pub trait OrientationPlatform: Send + Sync {
    /// Whether orientation events only fire after an explicit runtime grant
    fn requires_permission(&self) -> bool;

    /// Ask for sensor access
    ///
    /// Only called when [`requires_permission`](Self::requires_permission)
    /// returns `true`. A rejected request is an `Err`.
    async fn request_permission(&self) -> Result<PermissionState, PlatformError>;

    /// Register a listener for one stream
    fn add_listener(&self, stream: OrientationStream, listener: Listener) -> ListenerId;

    /// Remove a listener; unknown ids are ignored
    ///
    /// After this returns the listener must not be invoked again, even if a
    /// dispatch for its stream is already in progress.
    fn remove_listener(&self, id: ListenerId);
}

/// How a [`LocalEventBus`] answers permission requests
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PermissionPrompt {
    /// Events fire without any grant
    #[default]
    NotRequired,
    /// The prompt resolves to this state
    Respond(PermissionState),
    /// The prompt rejects with this reason
    Fail(String),
}

/// In-memory orientation event bus
///
/// Hosts forward platform events with [`dispatch`](Self::dispatch); tests use
/// it as a fake browser window.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use compass_heading::{LocalEventBus, OrientationEvent, OrientationPlatform, OrientationStream};
///
/// let bus = LocalEventBus::new();
/// let id = bus.add_listener(OrientationStream::Relative, Arc::new(|event: &OrientationEvent| {
///     assert_eq!(event.alpha, Some(42.0));
/// }));
///
/// assert_eq!(bus.dispatch(OrientationStream::Relative, OrientationEvent::from_alpha(42.0)), 1);
/// bus.remove_listener(id);
/// assert_eq!(bus.listener_count(OrientationStream::Relative), 0);
/// ```
#[derive(Default)]
pub struct LocalEventBus {
    prompt: PermissionPrompt,
    prompt_delay: Duration,
    inner: Mutex<BusInner>,
}

#[derive(Default)]
struct BusInner {
    next_id: u64,
    listeners: Vec<(ListenerId, OrientationStream, Listener)>,
    permission_requests: usize,
}

impl LocalEventBus {
    /// Bus that needs no permission grant
    pub fn new() -> Self {
        Self::default()
    }

    /// Bus whose permission prompt behaves as `prompt`
    pub fn with_permission(prompt: PermissionPrompt) -> Self {
        Self {
            prompt,
            ..Default::default()
        }
    }

    /// Delay before the permission prompt settles
    pub fn with_prompt_delay(mut self, delay: Duration) -> Self {
        self.prompt_delay = delay;
        self
    }

    /// Deliver an event to every listener of `stream`
    ///
    /// Listeners run without the bus lock held, so they may add or remove
    /// listeners. A listener removed mid-dispatch is skipped.
    ///
    /// # Returns
    /// Number of listeners invoked
    pub fn dispatch(&self, stream: OrientationStream, event: OrientationEvent) -> usize {
        let snapshot: Vec<(ListenerId, Listener)> = self
            .lock()
            .listeners
            .iter()
            .filter(|(_, listener_stream, _)| *listener_stream == stream)
            .map(|(id, _, listener)| (*id, Arc::clone(listener)))
            .collect();

        let mut delivered = 0;
        for (id, listener) in snapshot {
            if !self.is_registered(id) {
                continue;
            }
            listener(&event);
            delivered += 1;
        }

        tracing::trace!(stream = stream.event_name(), delivered, "dispatched orientation event");
        delivered
    }

    /// Listeners currently registered for `stream`
    pub fn listener_count(&self, stream: OrientationStream) -> usize {
        self.lock()
            .listeners
            .iter()
            .filter(|(_, listener_stream, _)| *listener_stream == stream)
            .count()
    }

    /// Number of permission requests issued so far
    pub fn permission_requests(&self) -> usize {
        self.lock().permission_requests
    }

    fn is_registered(&self, id: ListenerId) -> bool {
        self.lock()
            .listeners
            .iter()
            .any(|(listener_id, _, _)| *listener_id == id)
    }

    fn lock(&self) -> MutexGuard<'_, BusInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl OrientationPlatform for LocalEventBus {
    fn requires_permission(&self) -> bool {
        self.prompt != PermissionPrompt::NotRequired
    }

    async fn request_permission(&self) -> Result<PermissionState, PlatformError> {
        self.lock().permission_requests += 1;

        if !self.prompt_delay.is_zero() {
            tokio::time::sleep(self.prompt_delay).await;
        }

        match &self.prompt {
            PermissionPrompt::NotRequired => Ok(PermissionState::Granted),
            PermissionPrompt::Respond(state) => Ok(*state),
            PermissionPrompt::Fail(reason) => Err(PlatformError::PermissionRequest(reason.clone())),
        }
    }

    fn add_listener(&self, stream: OrientationStream, listener: Listener) -> ListenerId {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = ListenerId::new(inner.next_id);
        inner.listeners.push((id, stream, listener));
        id
    }

    fn remove_listener(&self, id: ListenerId) {
        self.lock()
            .listeners
            .retain(|(listener_id, _, _)| *listener_id != id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_listener(counter: &Arc<AtomicUsize>) -> Listener {
        let counter = Arc::clone(counter);
        Arc::new(move |_event: &OrientationEvent| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_dispatch_reaches_only_matching_stream() {
        let bus = LocalEventBus::new();
        let relative = Arc::new(AtomicUsize::new(0));
        let absolute = Arc::new(AtomicUsize::new(0));
        bus.add_listener(OrientationStream::Relative, counting_listener(&relative));
        bus.add_listener(OrientationStream::Absolute, counting_listener(&absolute));

        bus.dispatch(OrientationStream::Relative, OrientationEvent::from_alpha(1.0));
        bus.dispatch(OrientationStream::Relative, OrientationEvent::from_alpha(2.0));

        assert_eq!(relative.load(Ordering::SeqCst), 2);
        assert_eq!(absolute.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_listener_removed_mid_dispatch_is_skipped() {
        let bus = Arc::new(LocalEventBus::new());
        let second_calls = Arc::new(AtomicUsize::new(0));
        let second_id = Arc::new(Mutex::new(None::<ListenerId>));

        // First listener removes the second one before it runs
        let remover = {
            let bus = Arc::clone(&bus);
            let second_id = Arc::clone(&second_id);
            Arc::new(move |_event: &OrientationEvent| {
                if let Some(id) = second_id.lock().unwrap().take() {
                    bus.remove_listener(id);
                }
            })
        };
        bus.add_listener(OrientationStream::Relative, remover);
        let id = bus.add_listener(OrientationStream::Relative, counting_listener(&second_calls));
        *second_id.lock().unwrap() = Some(id);

        let delivered = bus.dispatch(OrientationStream::Relative, OrientationEvent::from_alpha(0.0));

        assert_eq!(delivered, 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
        assert_eq!(bus.listener_count(OrientationStream::Relative), 1);
    }

    #[test]
    fn test_remove_unknown_listener_is_ignored() {
        let bus = LocalEventBus::new();
        bus.remove_listener(ListenerId::new(99));
        assert_eq!(bus.listener_count(OrientationStream::Absolute), 0);
    }

    #[tokio::test]
    async fn test_permission_prompt_responses() {
        let open = LocalEventBus::new();
        assert!(!open.requires_permission());

        let granted = LocalEventBus::with_permission(PermissionPrompt::Respond(PermissionState::Granted));
        assert!(granted.requires_permission());
        assert_eq!(granted.request_permission().await, Ok(PermissionState::Granted));
        assert_eq!(granted.permission_requests(), 1);

        let failing = LocalEventBus::with_permission(PermissionPrompt::Fail("blocked".into()));
        assert_eq!(
            failing.request_permission().await,
            Err(PlatformError::PermissionRequest("blocked".into()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_permission_prompt_delay() {
        let bus = LocalEventBus::with_permission(PermissionPrompt::Respond(PermissionState::Denied))
            .with_prompt_delay(Duration::from_millis(200));

        let started = tokio::time::Instant::now();
        assert_eq!(bus.request_permission().await, Ok(PermissionState::Denied));
        assert!(started.elapsed() >= Duration::from_millis(200));
    }
}
