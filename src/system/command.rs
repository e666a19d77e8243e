//! Line Follow Command Module
//!
//! Carries start and abort requests into the line follow task. It uses an embassy-sync
//! Signal, so only the latest command is kept if the task has not picked it up yet.

use defmt::Format;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;

/// Signal for line follow commands
pub static LINE_FOLLOW: Signal<CriticalSectionRawMutex, Command> = Signal::new();

/// Sends a new command, does not wait for it to be processed
pub fn update(command: Command) {
    LINE_FOLLOW.signal(command);
}

/// Waits for the next command
pub async fn wait() -> Command {
    LINE_FOLLOW.wait().await
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub enum Command {
    /// Reset all control state and start following
    Initialize,
    /// Stop immediately and stay stopped until the next `Initialize`
    Abort,
}
