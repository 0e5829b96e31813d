//! Map control binding a compass engine to its button, debug readout and viewport

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::engine::{CompassEngine, EngineCallback, EngineCallbacks};
use crate::error::{CompassError, Error};
use crate::math::angular_difference;
use crate::types::{CompassEvent, OrientationSample};

/// The clickable compass button
pub trait CompassButton: Send + Sync {
    /// Show the "waiting for a heading" indicator
    fn enter_waiting(&self);
    /// Hide the waiting indicator
    fn exit_waiting(&self);
    /// Show the button as on
    fn activate(&self);
    /// Show the button as off
    fn deactivate(&self);
    /// Grey the button out after a terminal error
    fn disable(&self);
}

/// Textual heading readout for debugging
pub trait DebugReadout: Send + Sync {
    fn show(&self, heading: &str, accuracy: &str);
    fn clear(&self);
}

/// The host map view
pub trait Viewport: Send + Sync {
    /// Current bearing in degrees
    fn bearing(&self) -> f64;
    fn set_bearing(&self, bearing: f64);
}

/// Collaborators a [`CompassControl`] drives
#[derive(Clone)]
pub struct ControlViews {
    pub button: Arc<dyn CompassButton>,
    pub viewport: Arc<dyn Viewport>,
    pub debug: Option<Arc<dyn DebugReadout>>,
}

/// Compass map control
///
/// Translates engine transitions into button signals, mirrors every sample to
/// the debug readout and rotates the viewport when the heading moved by at
/// least the configured bearing threshold.
pub struct CompassControl {
    engine: CompassEngine,
    hooks: Arc<Mutex<EngineCallbacks>>,
}

impl CompassControl {
    /// Take over `engine`'s callbacks and wire them to `views`
    ///
    /// Callbacks the caller wants on top go through [`CompassControl::on`].
    pub fn new(engine: CompassEngine, views: ControlViews) -> Self {
        let hooks: Arc<Mutex<EngineCallbacks>> = Arc::default();
        let threshold = engine.settings().bearing_threshold;

        let (button, forward) = (Arc::clone(&views.button), Arc::clone(&hooks));
        engine.set_callback(EngineCallback::turn_on(move || {
            button.activate();
            button.enter_waiting();
            if let Some(hook) = lock(&forward).turn_on.clone() {
                hook();
            }
        }));

        let (button, debug, forward) = (
            Arc::clone(&views.button),
            views.debug.clone(),
            Arc::clone(&hooks),
        );
        engine.set_callback(EngineCallback::turn_off(move || {
            button.deactivate();
            button.exit_waiting();
            if let Some(debug) = &debug {
                debug.clear();
            }
            if let Some(hook) = lock(&forward).turn_off.clone() {
                hook();
            }
        }));

        let (button, forward) = (Arc::clone(&views.button), Arc::clone(&hooks));
        engine.set_callback(EngineCallback::error(move |error: &CompassError| {
            button.disable();
            if let Some(hook) = lock(&forward).error.clone() {
                hook(error);
            }
        }));

        let ControlViews {
            button,
            viewport,
            debug,
        } = views;

        let forward = Arc::clone(&hooks);
        engine.set_callback(EngineCallback::sample(move |sample: &OrientationSample| {
            if let Some(debug) = &debug {
                let heading = sample
                    .heading
                    .map(|heading| format!("{heading:.1}"))
                    .unwrap_or_default();
                let accuracy = sample
                    .raw
                    .compass_accuracy
                    .map(|accuracy| accuracy.to_string())
                    .unwrap_or_default();
                debug.show(&heading, &accuracy);
            }
            if let Some(hook) = lock(&forward).sample.clone() {
                hook(sample);
            }
        }));

        let forward = Arc::clone(&hooks);
        engine.set_callback(EngineCallback::heading(move |event: &CompassEvent| {
            button.exit_waiting();
            if angular_difference(viewport.bearing(), event.heading).abs() >= threshold {
                viewport.set_bearing(event.heading);
            }
            if let Some(hook) = lock(&forward).heading.clone() {
                hook(event);
            }
        }));

        Self { engine, hooks }
    }

    /// Register a caller callback, run after the control's own view updates
    ///
    /// # Errors
    /// Same as [`CompassEngine::on`].
    pub fn on(&self, event: &str, callback: EngineCallback) -> Result<(), Error> {
        callback.validate_for(event)?;
        lock(&self.hooks).set(callback);
        Ok(())
    }

    /// Button press: toggle the compass
    pub fn click(&self) -> Result<(), Error> {
        if self.engine.is_on() {
            self.engine.turn_off();
            Ok(())
        } else {
            self.engine.turn_on()
        }
    }

    /// The user dragged the map; manual rotation wins over the compass
    pub fn user_gesture(&self) {
        if self.engine.is_on() {
            self.engine.turn_off();
        }
    }

    /// Detach from the map: the compass is turned off and stays off
    /// until the next click
    pub fn remove(&self) {
        self.engine.turn_off();
    }

    pub fn engine(&self) -> &CompassEngine {
        &self.engine
    }
}

fn lock(hooks: &Mutex<EngineCallbacks>) -> MutexGuard<'_, EngineCallbacks> {
    hooks.lock().unwrap_or_else(PoisonError::into_inner)
}
