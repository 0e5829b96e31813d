//! Map control behavior with recording views

use std::sync::{Arc, Mutex};
use std::time::Duration;

use compass_heading::{
    CompassButton, CompassControl, CompassEngine, CompassSettings, ControlViews, DebugReadout,
    EngineCallback, ErrorCode, LocalEventBus, OrientationEvent, OrientationStream, Viewport,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ButtonSignal {
    EnterWaiting,
    ExitWaiting,
    Activate,
    Deactivate,
    Disable,
}

#[derive(Default)]
struct RecordingButton {
    signals: Mutex<Vec<ButtonSignal>>,
}

impl RecordingButton {
    fn push(&self, signal: ButtonSignal) {
        self.signals.lock().unwrap().push(signal);
    }

    fn take(&self) -> Vec<ButtonSignal> {
        std::mem::take(&mut *self.signals.lock().unwrap())
    }
}

impl CompassButton for RecordingButton {
    fn enter_waiting(&self) {
        self.push(ButtonSignal::EnterWaiting);
    }
    fn exit_waiting(&self) {
        self.push(ButtonSignal::ExitWaiting);
    }
    fn activate(&self) {
        self.push(ButtonSignal::Activate);
    }
    fn deactivate(&self) {
        self.push(ButtonSignal::Deactivate);
    }
    fn disable(&self) {
        self.push(ButtonSignal::Disable);
    }
}

#[derive(Default)]
struct RecordingReadout {
    lines: Mutex<Vec<Option<(String, String)>>>,
}

impl DebugReadout for RecordingReadout {
    fn show(&self, heading: &str, accuracy: &str) {
        self.lines
            .lock()
            .unwrap()
            .push(Some((heading.to_string(), accuracy.to_string())));
    }

    fn clear(&self) {
        self.lines.lock().unwrap().push(None);
    }
}

#[derive(Default)]
struct RecordingViewport {
    bearing: Mutex<f64>,
    updates: Mutex<Vec<f64>>,
}

impl Viewport for RecordingViewport {
    fn bearing(&self) -> f64 {
        *self.bearing.lock().unwrap()
    }

    fn set_bearing(&self, bearing: f64) {
        *self.bearing.lock().unwrap() = bearing;
        self.updates.lock().unwrap().push(bearing);
    }
}

struct Fixture {
    bus: Arc<LocalEventBus>,
    button: Arc<RecordingButton>,
    readout: Arc<RecordingReadout>,
    viewport: Arc<RecordingViewport>,
    control: CompassControl,
}

fn fixture(settings: CompassSettings) -> Fixture {
    let bus = Arc::new(LocalEventBus::new());
    let button = Arc::new(RecordingButton::default());
    let readout = Arc::new(RecordingReadout::default());
    let viewport = Arc::new(RecordingViewport::default());

    let engine = CompassEngine::with_settings(bus.clone(), settings).unwrap();
    let control = CompassControl::new(
        engine,
        ControlViews {
            button: button.clone(),
            viewport: viewport.clone(),
            debug: Some(readout.clone() as Arc<dyn DebugReadout>),
        },
    );

    Fixture {
        bus,
        button,
        readout,
        viewport,
        control,
    }
}

fn heading_event(heading: f64) -> OrientationEvent {
    OrientationEvent::from_compass_heading(heading)
}

#[tokio::test(start_paused = true)]
async fn test_button_signal_sequence() {
    let f = fixture(CompassSettings {
        smoothing: false,
        ..Default::default()
    });

    f.control.click().unwrap();
    assert_eq!(
        f.button.take(),
        vec![ButtonSignal::Activate, ButtonSignal::EnterWaiting]
    );

    f.bus.dispatch(OrientationStream::Relative, heading_event(45.0));
    assert_eq!(f.button.take(), vec![ButtonSignal::ExitWaiting]);

    f.control.click().unwrap();
    assert_eq!(
        f.button.take(),
        vec![ButtonSignal::Deactivate, ButtonSignal::ExitWaiting]
    );
}

#[tokio::test(start_paused = true)]
async fn test_bearing_follows_heading_beyond_threshold() {
    let f = fixture(CompassSettings {
        smoothing: false,
        bearing_threshold: 1.0,
        ..Default::default()
    });

    f.control.click().unwrap();
    f.bus.dispatch(OrientationStream::Relative, heading_event(90.0));
    // Within the dead band
    f.bus.dispatch(OrientationStream::Relative, heading_event(90.5));
    f.bus.dispatch(OrientationStream::Relative, heading_event(92.0));

    assert_eq!(*f.viewport.updates.lock().unwrap(), vec![90.0, 92.0]);
    assert_eq!(f.viewport.bearing(), 92.0);
}

#[tokio::test(start_paused = true)]
async fn test_bearing_threshold_wraps_around_north() {
    let f = fixture(CompassSettings {
        smoothing: false,
        bearing_threshold: 2.0,
        ..Default::default()
    });
    f.viewport.set_bearing(359.5);
    f.viewport.updates.lock().unwrap().clear();

    f.control.click().unwrap();
    // 1° apart across north, inside the 2° threshold
    f.bus.dispatch(OrientationStream::Relative, heading_event(0.5));
    assert!(f.viewport.updates.lock().unwrap().is_empty());

    f.bus.dispatch(OrientationStream::Relative, heading_event(3.0));
    assert_eq!(*f.viewport.updates.lock().unwrap(), vec![3.0]);
}

#[tokio::test(start_paused = true)]
async fn test_debug_readout_shows_and_clears() {
    let f = fixture(CompassSettings {
        smoothing: false,
        ..Default::default()
    });

    f.control.click().unwrap();
    f.bus.dispatch(
        OrientationStream::Relative,
        heading_event(123.456).with_accuracy(10.0),
    );
    f.bus.dispatch(OrientationStream::Relative, heading_event(200.0));
    f.control.user_gesture();

    assert_eq!(
        *f.readout.lines.lock().unwrap(),
        vec![
            Some(("123.5".to_string(), "10".to_string())),
            Some(("200.0".to_string(), String::new())),
            None,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_error_disables_button_and_reaches_hook() {
    let f = fixture(CompassSettings {
        timeout_ms: 50,
        ..Default::default()
    });
    let codes = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&codes);
    f.control
        .on(
            "error",
            EngineCallback::error(move |error| sink.lock().unwrap().push(error.code())),
        )
        .unwrap();

    f.control.click().unwrap();
    f.button.take();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(
        f.button.take(),
        vec![
            ButtonSignal::Deactivate,
            ButtonSignal::ExitWaiting,
            ButtonSignal::Disable,
        ]
    );
    assert_eq!(*codes.lock().unwrap(), vec![ErrorCode::Timeout]);
    assert!(!f.control.engine().is_on());
}

#[tokio::test(start_paused = true)]
async fn test_hooks_run_after_view_updates() {
    let f = fixture(CompassSettings {
        smoothing: false,
        ..Default::default()
    });
    let seen = Arc::new(Mutex::new(Vec::new()));

    let (sink, viewport) = (Arc::clone(&seen), f.viewport.clone());
    f.control
        .on(
            "heading",
            EngineCallback::heading(move |event| {
                // The viewport already moved when the hook runs
                sink.lock().unwrap().push((event.heading, viewport.bearing()));
            }),
        )
        .unwrap();
    let turned_on = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&turned_on);
    f.control
        .on("turnon", EngineCallback::turn_on(move || *counter.lock().unwrap() += 1))
        .unwrap();

    f.control.click().unwrap();
    f.bus.dispatch(OrientationStream::Relative, heading_event(270.0));

    assert_eq!(*turned_on.lock().unwrap(), 1);
    assert_eq!(*seen.lock().unwrap(), vec![(270.0, 270.0)]);
}

#[tokio::test(start_paused = true)]
async fn test_on_validates_event_names() {
    let f = fixture(CompassSettings::default());
    assert!(f.control.on("compass", EngineCallback::turn_on(|| {})).is_err());
    assert!(f.control.on("heading", EngineCallback::turn_on(|| {})).is_err());
}

#[tokio::test(start_paused = true)]
async fn test_debug_readout_shows_unpublished_samples() {
    let f = fixture(CompassSettings {
        min_accuracy: Some(10.0),
        ..Default::default()
    });

    f.control.click().unwrap();
    f.bus.dispatch(OrientationStream::Relative, OrientationEvent::default());
    f.bus.dispatch(
        OrientationStream::Relative,
        heading_event(30.0).with_accuracy(5.0),
    );

    assert_eq!(
        *f.readout.lines.lock().unwrap(),
        vec![
            Some((String::new(), String::new())),
            Some(("30.0".to_string(), "5".to_string())),
        ]
    );
    // Neither sample moved the map or cleared the waiting indicator
    assert!(f.viewport.updates.lock().unwrap().is_empty());
    assert_eq!(
        f.button.take(),
        vec![ButtonSignal::Activate, ButtonSignal::EnterWaiting]
    );
}

#[tokio::test(start_paused = true)]
async fn test_remove_turns_compass_off() {
    let f = fixture(CompassSettings::default());

    f.control.click().unwrap();
    assert_eq!(f.bus.listener_count(OrientationStream::Absolute), 1);

    f.control.remove();
    assert!(!f.control.engine().is_on());
    assert_eq!(f.bus.listener_count(OrientationStream::Relative), 0);
    assert_eq!(f.bus.listener_count(OrientationStream::Absolute), 0);
    assert_eq!(*f.readout.lines.lock().unwrap(), vec![None]);
}
