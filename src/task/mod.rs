//! Async tasks of the robot
pub mod encoder;
pub mod line_follow;
pub mod motor_driver;
pub mod report;
pub mod start_button;
pub mod ultrasonic_echo;

/// Current uptime as the control core's timestamp
pub fn now() -> follower_core::Instant {
    follower_core::Instant::from_micros(embassy_time::Instant::now().as_micros())
}
