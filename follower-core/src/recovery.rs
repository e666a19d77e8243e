//! Line recovery
//!
//! Entered when the line is lost or the robot hits a cross marking. The robot creeps
//! towards the side it last saw the line on, one wheel at exploration speed and the
//! other stopped, until either some sensors see the line again or the time box runs
//! out.

use core::time::Duration;

use crate::line::LineSample;
use crate::steering::LastSeenSide;
use crate::time::Instant;

/// Result of one recovery step
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RecoveryOutcome {
    /// Still searching, drive the wheels at these target velocities
    Searching { left: f32, right: f32 },
    /// One to three sensors see the line
    Reacquired,
    /// The time box ran out without seeing the line
    TimedOut,
}

/// An active blind search
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Recovery {
    since: Instant,
}

impl Recovery {
    pub const fn start(now: Instant) -> Self {
        Self { since: now }
    }

    pub fn since(&self) -> Instant {
        self.since
    }

    /// Decides what the search does this tick
    ///
    /// Four asserted sensors do not count as reacquired, that is the cross marking
    /// that may have started the search.
    pub fn step(
        &self,
        sample: LineSample,
        last_seen: LastSeenSide,
        now: Instant,
        timeout: Duration,
        explore_speed: f32,
    ) -> RecoveryOutcome {
        if sample.any() && sample.asserted() < 4 {
            RecoveryOutcome::Reacquired
        } else if now.saturating_duration_since(self.since) >= timeout {
            RecoveryOutcome::TimedOut
        } else {
            let (left, right) = search_targets(last_seen, explore_speed);
            RecoveryOutcome::Searching { left, right }
        }
    }
}

/// `(left, right)` wheel targets that turn the robot towards `last_seen`
pub fn search_targets(last_seen: LastSeenSide, speed: f32) -> (f32, f32) {
    match last_seen {
        LastSeenSide::Left => (0.0, speed),
        LastSeenSide::Right => (speed, 0.0),
        LastSeenSide::Unknown => (speed, speed),
    }
}
