//! Core types and settings for the compass heading engine

use core::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// The two overlapping orientation event families a browser may expose
///
/// # Streams
/// - **Relative**: `deviceorientation`, referenced to an arbitrary starting
///   orientation unless the vendor adds a compass heading (WebKit)
/// - **Absolute**: `deviceorientationabsolute`, referenced to north
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrientationStream {
    /// Primary stream, may need a permission grant before it fires
    Relative,
    /// Secondary stream, subscribed unconditionally
    Absolute,
}

impl OrientationStream {
    /// Platform event name of the stream
    pub fn event_name(self) -> &'static str {
        match self {
            OrientationStream::Relative => "deviceorientation",
            OrientationStream::Absolute => "deviceorientationabsolute",
        }
    }

    /// The competing stream
    pub fn other(self) -> Self {
        match self {
            OrientationStream::Relative => OrientationStream::Absolute,
            OrientationStream::Absolute => OrientationStream::Relative,
        }
    }
}

/// Raw orientation event as the platform reports it
///
/// Field names deserialize from the browser's `DeviceOrientationEvent` shape,
/// including the WebKit compass extensions. Only `alpha` and
/// `compass_heading` feed the heading; the rest is kept for diagnostics.
///
/// # Example
/// ```
/// use compass_heading::OrientationEvent;
///
/// let event: OrientationEvent =
///     serde_json::from_str(r#"{"alpha": 90.0, "webkitCompassAccuracy": 12.5}"#).unwrap();
/// assert_eq!(event.alpha, Some(90.0));
/// assert_eq!(event.compass_heading, None);
/// assert_eq!(event.compass_accuracy, Some(12.5));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OrientationEvent {
    /// Rotation around the vertical axis in `[0, 360)`, not north-referenced
    pub alpha: Option<f64>,
    /// Front-to-back tilt in degrees
    pub beta: Option<f64>,
    /// Left-to-right tilt in degrees
    pub gamma: Option<f64>,
    /// Whether the platform claims `alpha` is earth-referenced
    pub absolute: bool,
    /// Vendor compass heading, north-referenced, `[0, 360)`
    #[serde(rename = "webkitCompassHeading")]
    pub compass_heading: Option<f64>,
    /// Vendor accuracy figure accompanying `compass_heading`
    #[serde(rename = "webkitCompassAccuracy")]
    pub compass_accuracy: Option<f64>,
}

impl OrientationEvent {
    /// Event carrying only an `alpha` rotation
    pub fn from_alpha(alpha: f64) -> Self {
        Self {
            alpha: Some(alpha),
            ..Default::default()
        }
    }

    /// Event carrying a vendor compass heading
    pub fn from_compass_heading(heading: f64) -> Self {
        Self {
            compass_heading: Some(heading),
            ..Default::default()
        }
    }

    /// Attach a vendor accuracy figure
    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.compass_accuracy = Some(accuracy);
        self
    }

    /// `alpha` if present and finite
    pub fn usable_alpha(&self) -> Option<f64> {
        self.alpha.filter(|alpha| alpha.is_finite())
    }

    /// Vendor compass heading if present and finite
    pub fn usable_compass_heading(&self) -> Option<f64> {
        self.compass_heading.filter(|heading| heading.is_finite())
    }
}

/// A normalized orientation reading
///
/// Produced per raw platform event and handed straight to the callback;
/// never retained.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientationSample {
    /// Heading in `[0, 360)`, absent while the platform has no usable value
    pub heading: Option<f64>,
    /// Stream that delivered the event
    pub stream: OrientationStream,
    /// The event as received
    pub raw: OrientationEvent,
}

/// Heading published by the engine
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CompassEvent {
    /// Smoothed (or raw, with smoothing off) heading in `[0, 360)`
    pub heading: f64,
    /// Stream of the event that produced this heading
    pub stream: OrientationStream,
    /// Originating raw event, for diagnostic display
    pub raw: OrientationEvent,
}

/// Lifecycle state of a [`CompassEngine`](crate::CompassEngine)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum EngineState {
    /// Off
    #[default]
    Idle,
    /// Permission requested, awaiting grant or denial
    Acquiring,
    /// Subscribed, awaiting the first heading or already streaming
    Listening,
    /// Last session ended in a terminal error
    Disabled,
}

impl EngineState {
    /// Whether the compass is on (`Acquiring` or `Listening`)
    pub fn is_on(self) -> bool {
        matches!(self, EngineState::Acquiring | EngineState::Listening)
    }
}

/// Outcome of a platform permission prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    Granted,
    Denied,
    /// The user dismissed the prompt without deciding
    Default,
}

impl PermissionState {
    /// Map a browser permission response string
    ///
    /// Anything other than `granted` or `denied` counts as undecided.
    pub fn from_response(response: &str) -> Self {
        match response {
            "granted" => PermissionState::Granted,
            "denied" => PermissionState::Denied,
            _ => PermissionState::Default,
        }
    }
}

/// Engine and control settings
///
/// Every key is optional in serialized form; missing keys take the defaults.
///
/// # Example
/// ```
/// use compass_heading::CompassSettings;
///
/// let settings = CompassSettings::from_json(r#"{"timeoutMs": 5000, "minAccuracy": 10}"#).unwrap();
/// assert_eq!(settings.timeout_ms, 5000);
/// assert_eq!(settings.history_size, 100);
/// assert_eq!(settings.min_accuracy, Some(10.0));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompassSettings {
    /// Watchdog duration in milliseconds
    pub timeout_ms: u64,
    /// Number of headings the smoother keeps
    pub history_size: usize,
    /// Samples whose vendor accuracy is below this are dropped
    pub min_accuracy: Option<f64>,
    /// Publish the circular mean instead of the latest heading
    pub smoothing: bool,
    /// Minimum bearing change in degrees before the viewport is rotated
    pub bearing_threshold: f64,
}

impl Default for CompassSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 3000,
            history_size: 100,
            min_accuracy: None,
            smoothing: true,
            bearing_threshold: 1.0,
        }
    }
}

impl CompassSettings {
    /// Parse a JSON options object
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let settings: CompassSettings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Watchdog duration
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<(), Error> {
        if self.timeout_ms == 0 {
            return Err(Error::InvalidSettings("timeoutMs must be positive".into()));
        }
        if self.history_size == 0 {
            return Err(Error::InvalidSettings("historySize must be at least 1".into()));
        }
        if let Some(min_accuracy) = self.min_accuracy {
            if !min_accuracy.is_finite() {
                return Err(Error::InvalidSettings("minAccuracy must be finite".into()));
            }
        }
        if !self.bearing_threshold.is_finite() || self.bearing_threshold < 0.0 {
            return Err(Error::InvalidSettings(
                "bearingThreshold must be a non-negative number".into(),
            ));
        }
        Ok(())
    }

    /// Whether a sample with this vendor accuracy passes the accuracy gate
    ///
    /// A zero on either side counts as "not set" and never rejects.
    pub fn accepts_accuracy(&self, accuracy: Option<f64>) -> bool {
        match (self.min_accuracy, accuracy) {
            (Some(min_accuracy), Some(accuracy)) if min_accuracy != 0.0 && accuracy != 0.0 => {
                accuracy >= min_accuracy
            }
            _ => true,
        }
    }
}
