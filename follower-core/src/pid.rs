//! Wheel velocity PID
//!
//! One controller per wheel turns the gap between target and measured linear velocity
//! into a PWM magnitude. The integral term is clamped to the output range so a stalled
//! wheel cannot wind it up without bound.

use crate::actuation::DUTY_MAX;

/// Gains and output range of one wheel controller
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PidGains {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    /// Lower clamp of the integral term
    pub out_min: f32,
    /// Upper clamp of the integral term
    pub out_max: f32,
}

impl PidGains {
    /// Pure proportional control, tuned on the robot at 0.5 m/s cruise
    pub const DEFAULT: Self = Self {
        kp: 250.0,
        ki: 0.0,
        kd: 0.0,
        out_min: 0.0,
        out_max: DUTY_MAX as f32,
    };
}

impl Default for PidGains {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PidController {
    gains: PidGains,
    integral: f32,
    prev_error: f32,
}

impl PidController {
    pub const fn new(gains: PidGains) -> Self {
        Self {
            gains,
            integral: 0.0,
            prev_error: 0.0,
        }
    }

    /// Runs one control step and returns the PWM magnitude in `0..=255`
    ///
    /// `dt_s` must be positive; the control loop only steps after a full period.
    pub fn step(&mut self, target: f32, measured: f32, dt_s: f32) -> i32 {
        let error = target - measured;

        self.integral = (self.integral + self.gains.ki * error * dt_s)
            .clamp(self.gains.out_min, self.gains.out_max);
        let derivative = (error - self.prev_error) / dt_s;
        self.prev_error = error;

        let output = self.gains.kp * error + self.integral + self.gains.kd * derivative;
        (output as i32).clamp(0, DUTY_MAX)
    }

    /// Drops integral and derivative history
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.prev_error = 0.0;
    }

    pub fn integral(&self) -> f32 {
        self.integral
    }

    pub fn prev_error(&self) -> f32 {
        self.prev_error
    }

    pub fn gains(&self) -> &PidGains {
        &self.gains
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 0.01;

    fn pi_gains() -> PidGains {
        PidGains {
            kp: 100.0,
            ki: 500.0,
            kd: 0.0,
            out_min: 0.0,
            out_max: 255.0,
        }
    }

    #[test]
    fn proportional_only_output() {
        let mut pid = PidController::new(PidGains::DEFAULT);
        // 250 * 0.5 = 125
        assert_eq!(pid.step(0.5, 0.0, DT), 125);
        // 250 * 0.25 = 62.5, truncated
        assert_eq!(pid.step(0.5, 0.25, DT), 62);
    }

    #[test]
    fn output_is_clamped_to_duty_range() {
        let mut pid = PidController::new(PidGains::DEFAULT);
        assert_eq!(pid.step(2.0, 0.0, DT), 255);
        // Overshoot gives a negative raw output
        assert_eq!(pid.step(0.0, 0.5, DT), 0);
    }

    #[test]
    fn sustained_error_winds_integral_up_to_the_clamp() {
        let mut pid = PidController::new(pi_gains());
        let mut previous = pid.integral();
        loop {
            pid.step(0.5, 0.0, DT);
            let integral = pid.integral();
            if integral >= 255.0 {
                break;
            }
            assert!(integral > previous);
            previous = integral;
        }
        assert_eq!(pid.integral(), 255.0);
        pid.step(0.5, 0.0, DT);
        assert_eq!(pid.integral(), 255.0);
    }

    #[test]
    fn zero_error_holds_the_carried_integral() {
        let mut pid = PidController::new(pi_gains());
        for _ in 0..4 {
            pid.step(0.5, 0.0, DT);
        }
        let carried = pid.integral();
        assert!(carried > 0.0);

        let first = pid.step(0.4, 0.4, DT);
        for _ in 0..10 {
            assert_eq!(pid.step(0.4, 0.4, DT), first);
        }
        assert_eq!(first, carried as i32);
        assert_eq!(pid.integral(), carried);
    }

    #[test]
    fn reset_clears_history() {
        let mut pid = PidController::new(pi_gains());
        pid.step(0.5, 0.1, DT);
        pid.reset();
        assert_eq!(pid.integral(), 0.0);
        assert_eq!(pid.prev_error(), 0.0);
    }
}
