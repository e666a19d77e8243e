//! Fixed tuning of the controller
//!
//! Everything is chosen at build time and handed to [`crate::LineFollower::new`]; there
//! is no runtime re-tuning.

use core::time::Duration;

use crate::encoder::WheelGeometry;
use crate::maneuver::{ManeuverStep, AVOIDANCE_SEQUENCE};
use crate::pid::PidGains;
use crate::ranger::RangerConfig;

#[derive(Debug, Clone, Copy)]
pub struct ControlConfig {
    /// Cruise target for both wheels in m/s
    pub base_velocity: f32,
    /// Ceiling for target magnitudes in m/s
    pub max_velocity: f32,
    /// Rate of the PID and actuation sub-step
    pub control_period: Duration,

    pub left_pid: PidGains,
    pub right_pid: PidGains,

    /// PWM added or removed per wheel for a soft correction
    pub steer_soft_pwm: i32,
    /// PWM added or removed per wheel for a hard correction
    pub steer_hard_pwm: i32,

    /// Smallest non-zero PWM a wheel is driven with
    pub pwm_min_run: i32,
    /// Largest PWM change per control period
    pub pwm_slew: i32,

    /// Static target velocity factors for mechanical asymmetry
    pub left_scale: f32,
    pub right_scale: f32,
    /// PWM multipliers applied after steering, before shaping
    pub left_pwm_trim: f32,
    pub right_pwm_trim: f32,

    /// Speed of the creeping wheel during recovery
    pub recovery_speed: f32,
    pub recovery_timeout: Duration,
    /// How long an all-on or all-off reading may last before stopping
    pub sensor_fault_after: Duration,

    /// Readings above zero and below this start the avoidance maneuver
    pub obstacle_threshold_cm: f32,
    /// Upper bound for every moving maneuver step
    pub maneuver_watchdog: Duration,
    pub avoidance: &'static [ManeuverStep],

    pub geometry: WheelGeometry,
    pub ranger: RangerConfig,
}

impl ControlConfig {
    pub const DEFAULT: Self = Self {
        base_velocity: 0.5,
        max_velocity: 0.8,
        control_period: Duration::from_millis(10),

        left_pid: PidGains::DEFAULT,
        right_pid: PidGains::DEFAULT,

        steer_soft_pwm: 4,
        steer_hard_pwm: 7,

        pwm_min_run: 50,
        pwm_slew: 50,

        left_scale: 1.0,
        right_scale: 1.0,
        // Left motor is a little weaker on the test chassis
        left_pwm_trim: 1.1,
        right_pwm_trim: 1.0,

        recovery_speed: 0.3,
        recovery_timeout: Duration::from_millis(2_000),
        sensor_fault_after: Duration::from_millis(1_500),

        obstacle_threshold_cm: 15.0,
        maneuver_watchdog: Duration::from_millis(4_000),
        avoidance: &AVOIDANCE_SEQUENCE,

        geometry: WheelGeometry::DEFAULT,
        ranger: RangerConfig::DEFAULT,
    };

    /// Whether `distance_cm` is a valid reading close enough to swerve
    pub fn is_obstacle(&self, distance_cm: f32) -> bool {
        distance_cm > 0.0 && distance_cm < self.obstacle_threshold_cm
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranger::NO_READING;

    #[test]
    fn obstacle_window() {
        let config = ControlConfig::DEFAULT;
        assert!(config.is_obstacle(10.0));
        assert!(!config.is_obstacle(15.0));
        assert!(!config.is_obstacle(40.0));
        assert!(!config.is_obstacle(NO_READING));
        assert!(!config.is_obstacle(0.0));
    }
}
