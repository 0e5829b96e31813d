//! Drive a compass engine from a simulated device slowly turning east
//!
//! Run with `RUST_LOG=compass_heading=debug cargo run --example simulated`
//! to see the engine's own logging.

use std::sync::Arc;
use std::time::Duration;

use compass_heading::{
    CompassEngine, CompassSettings, EngineCallback, LocalEventBus, OrientationEvent,
    OrientationStream, PermissionPrompt, PermissionState,
};
use tracing_subscriber::EnvFilter;

const SAMPLE_PERIOD: Duration = Duration::from_millis(50);

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), compass_heading::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // A device that asks for sensor access before streaming
    let bus = Arc::new(
        LocalEventBus::with_permission(PermissionPrompt::Respond(PermissionState::Granted))
            .with_prompt_delay(Duration::from_millis(200)),
    );
    let settings = CompassSettings::from_json(r#"{ "timeoutMs": 2000, "historySize": 10 }"#)?;
    let engine = CompassEngine::with_settings(bus.clone(), settings)?;

    engine.on("turnon", EngineCallback::turn_on(|| println!("compass on, waiting for heading")))?;
    engine.on("turnoff", EngineCallback::turn_off(|| println!("compass off")))?;
    engine.on(
        "heading",
        EngineCallback::heading(|event| {
            println!(
                "heading: {:6.1}  (from {})",
                event.heading,
                event.stream.event_name()
            );
        }),
    )?;
    engine.on(
        "error",
        EngineCallback::error(|error| eprintln!("compass error: {error}")),
    )?;

    engine.turn_on()?;

    // Let the permission prompt settle
    tokio::time::sleep(Duration::from_millis(250)).await;

    for step in 0..40 {
        // this loop should repeat each time the platform reports an orientation
        let alpha = 360.0 - step as f64 * 2.5;
        let jitter = if step % 2 == 0 { 1.5 } else { -1.5 };
        bus.dispatch(
            OrientationStream::Relative,
            OrientationEvent::from_alpha(alpha + jitter),
        );
        tokio::time::sleep(SAMPLE_PERIOD).await;
    }

    engine.turn_off();
    Ok(())
}
