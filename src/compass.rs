//! Heading normalization across browser orientation event families

use serde::Serialize;

use crate::math::{FULL_TURN, normalize_degrees};
use crate::types::{OrientationEvent, OrientationStream};

/// Calculate the compass heading of a raw orientation event
///
/// A vendor compass heading is already north-referenced and wins whenever it
/// is present. Otherwise the heading is derived from `alpha`, which rotates
/// counter-clockwise, so heading = `(360 - alpha) mod 360`.
///
/// # Returns
/// Heading in degrees (range: 0° to 360°, 0° = North), or `None` when the
/// event has neither field
///
/// # Example
/// ```
/// use compass_heading::{OrientationEvent, compass::calculate_heading};
///
/// assert_eq!(calculate_heading(&OrientationEvent::from_alpha(90.0)), Some(270.0));
/// assert_eq!(calculate_heading(&OrientationEvent::from_compass_heading(45.0)), Some(45.0));
/// assert_eq!(calculate_heading(&OrientationEvent::default()), None);
/// ```
pub fn calculate_heading(event: &OrientationEvent) -> Option<f64> {
    if let Some(heading) = event.usable_compass_heading() {
        return Some(normalize_degrees(heading));
    }

    event.usable_alpha().map(heading_from_alpha)
}

/// Convert a device `alpha` rotation into a clockwise compass heading
pub fn heading_from_alpha(alpha: f64) -> f64 {
    normalize_degrees(FULL_TURN - alpha)
}

/// Which orientation stream drives the heading
///
/// Both streams may fire for the same physical rotation. Whichever first
/// proves to be north-referenced becomes authoritative and the other stream
/// is dropped for the rest of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum StreamAuthority {
    /// Either stream may still bootstrap the heading
    #[default]
    Undetermined,
    /// The relative stream reported a vendor compass heading
    PrimaryAuthoritative,
    /// The absolute stream reported an `alpha`
    SecondaryAuthoritative,
}

impl StreamAuthority {
    /// Feed one event and get the next authority plus the stream to drop, if any
    ///
    /// # Example
    /// ```
    /// use compass_heading::{OrientationEvent, OrientationStream, StreamAuthority};
    ///
    /// let (authority, dropped) = StreamAuthority::Undetermined
    ///     .observe(OrientationStream::Absolute, &OrientationEvent::from_alpha(10.0));
    /// assert_eq!(authority, StreamAuthority::SecondaryAuthoritative);
    /// assert_eq!(dropped, Some(OrientationStream::Relative));
    /// ```
    pub fn observe(
        self,
        stream: OrientationStream,
        event: &OrientationEvent,
    ) -> (StreamAuthority, Option<OrientationStream>) {
        match (self, stream) {
            (StreamAuthority::Undetermined, OrientationStream::Absolute)
                if event.usable_alpha().is_some() =>
            {
                (
                    StreamAuthority::SecondaryAuthoritative,
                    Some(OrientationStream::Relative),
                )
            }
            (StreamAuthority::Undetermined, OrientationStream::Relative)
                if event.usable_compass_heading().is_some() =>
            {
                (
                    StreamAuthority::PrimaryAuthoritative,
                    Some(OrientationStream::Absolute),
                )
            }
            _ => (self, None),
        }
    }

    /// Whether events from `stream` may still drive the heading
    pub fn admits(self, stream: OrientationStream) -> bool {
        match self {
            StreamAuthority::Undetermined => true,
            StreamAuthority::PrimaryAuthoritative => stream == OrientationStream::Relative,
            StreamAuthority::SecondaryAuthoritative => stream == OrientationStream::Absolute,
        }
    }
}
