//! Telemetry Module
//!
//! The line follow task publishes a snapshot after every tick. Readers only ever see the
//! most recent one.

use defmt::Format;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use follower_core::{LineSample, TickOutcome};

static TELEMETRY: Signal<CriticalSectionRawMutex, Telemetry> = Signal::new();

#[derive(Debug, Clone, Copy, Format)]
pub struct Telemetry {
    /// Latest ultrasonic distance in cm, negative if there is no valid reading
    pub distance_cm: f32,
    /// Current line sensor reading
    pub line: LineSample,
    /// What the last tick did
    pub outcome: TickOutcome,
}

/// Replaces the current snapshot
pub fn publish(telemetry: Telemetry) {
    TELEMETRY.signal(telemetry);
}

/// Waits for a snapshot newer than the last one taken
pub async fn wait() -> Telemetry {
    TELEMETRY.wait().await
}
