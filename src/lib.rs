//! Compass Heading - smoothed device heading for map viewports
//!
//! Mobile browsers report device orientation through two overlapping event
//! families (`deviceorientation` and `deviceorientationabsolute`), some only
//! after an explicit permission grant, and only some of them are referenced
//! to north. This crate reconciles them into a single heading, smooths it
//! with a circular moving average, and wraps the whole flow in an on/off
//! engine with a timeout watchdog and deterministic error reporting.
//!
//! # Features
//!
//! - Heading normalization from WebKit compass headings or `alpha` rotation
//! - Dual-stream preemption: the first north-referenced stream wins
//! - Permission flow with grant/deny/reject outcomes
//! - Circular (angular) moving average over a bounded history
//! - Timeout watchdog with exactly one error per failed session
//! - Injected platform capability, with an in-memory [`LocalEventBus`]
//! - Map control glue for a button, a debug readout and a viewport
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use compass_heading::{
//!     CompassEngine, EngineCallback, LocalEventBus, OrientationEvent, OrientationStream,
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! // Platform events are forwarded into the bus by the host
//! let bus = Arc::new(LocalEventBus::new());
//! let engine = CompassEngine::new(bus.clone());
//!
//! engine
//!     .on("heading", EngineCallback::heading(|event| {
//!         println!("heading: {:.1}°", event.heading);
//!     }))
//!     .unwrap();
//! engine
//!     .on("error", EngineCallback::error(|error| {
//!         eprintln!("compass failed: {}", error);
//!     }))
//!     .unwrap();
//!
//! engine.turn_on().unwrap();
//!
//! // A device rotated by alpha = 90° faces west
//! bus.dispatch(OrientationStream::Relative, OrientationEvent::from_alpha(90.0));
//! assert!((engine.heading().unwrap() - 270.0).abs() < 1e-9);
//!
//! engine.turn_off();
//! # }
//! ```

pub mod compass;
pub mod control;
mod engine;
mod error;
mod math;
pub mod platform;
mod smoother;
pub mod source;
mod types;

// Re-export all public types and functions
pub use compass::{StreamAuthority, calculate_heading, heading_from_alpha};
pub use control::{CompassButton, CompassControl, ControlViews, DebugReadout, Viewport};
pub use engine::{CompassEngine, EngineCallback, EngineEvent};
pub use error::{CompassError, Error, ErrorCode, PlatformError};
pub use math::{
    DEG_TO_RAD, FULL_TURN, HeadingVectorExt, RAD_TO_DEG, angular_difference, normalize_degrees,
};
pub use platform::{Listener, ListenerId, LocalEventBus, OrientationPlatform, PermissionPrompt};
pub use smoother::{DEFAULT_HISTORY_SIZE, HeadingSmoother};
pub use source::{OrientationSource, SourceCallback, SourceEvent, StartOutcome};
pub use types::*;
