//! Line-following control core
//!
//! Everything the robot needs to follow a printed line, recover when it loses it and
//! swerve around an obstacle, without touching a concrete HAL. The firmware crate owns
//! the pins and the executor; this crate owns the state and the decisions.
//!
//! # Data flow per control tick
//! sensors → [`steering::classify`] → recovery / obstacle check → [`pid::PidController`]
//! → [`shaper::PwmShaper`] → [`actuation::MotorActuator`]
//!
//! The only state shared with interrupt context are the wheel pulse counters in
//! [`encoder::WheelEncoders`] and the echo timestamps in [`ranger::EchoCapture`]. All
//! other state lives in one
//! [`controller::LineFollower`] that the control task owns.
//!
//! Nothing in here reads a clock. Every time-dependent call takes a [`time::Instant`],
//! which keeps the state machines deterministic and testable on the host.

#![cfg_attr(not(test), no_std)]

mod log;

pub mod actuation;
pub mod config;
pub mod controller;
pub mod encoder;
pub mod line;
pub mod maneuver;
pub mod pid;
pub mod ranger;
pub mod recovery;
pub mod shaper;
pub mod steering;
pub mod time;

pub use config::ControlConfig;
pub use controller::{LineFollower, TickOutcome};
pub use line::LineSample;
pub use time::Instant;
