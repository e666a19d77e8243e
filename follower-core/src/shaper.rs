//! PWM shaping
//!
//! Post-processes each wheel's PWM command before it reaches the driver:
//! - a non-zero command below the minimum-run duty is raised to it, so the motor
//!   never sits energised without turning
//! - the change from the previous command is limited per tick to soften jerks
//! - the result is clamped to the duty range
//!
//! A zero command is never raised, so the wheel can actually stop.

use crate::actuation::DUTY_MAX;

/// Shapes `target` against the previously shaped output
pub fn shape_pwm(target: i32, previous: i32, min_run: i32, slew: i32) -> i32 {
    let mut shaped = target;
    if shaped > 0 && shaped < min_run {
        shaped = min_run;
    }
    if shaped < 0 && shaped > -min_run {
        shaped = -min_run;
    }
    shaped = shaped.clamp(previous - slew, previous + slew);
    shaped.clamp(0, DUTY_MAX)
}

/// Per-wheel shaper remembering its last output
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PwmShaper {
    min_run: i32,
    slew: i32,
    previous: i32,
}

impl PwmShaper {
    pub const fn new(min_run: i32, slew: i32) -> Self {
        Self {
            min_run,
            slew,
            previous: 0,
        }
    }

    pub fn shape(&mut self, target: i32) -> i32 {
        self.previous = shape_pwm(target, self.previous, self.min_run, self.slew);
        self.previous
    }

    /// Forgets the previous output, used when the wheel was braked to rest
    pub fn reset(&mut self) {
        self.previous = 0;
    }

    pub fn previous(&self) -> i32 {
        self.previous
    }
}
