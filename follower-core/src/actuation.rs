//! Motor actuation
//!
//! Maps signed velocity/PWM pairs onto what an H-bridge understands: a direction pin
//! pair and a duty magnitude. Stopping uses the driver's short-brake state (both
//! direction inputs high, duty zero) rather than letting the wheels coast.

/// Largest duty magnitude
pub const DUTY_MAX: i32 = 255;

/// Rotation direction of one wheel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    Forward,
    Backward,
}

/// What one wheel's H-bridge channel should do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WheelCommand {
    /// Direction pins set for `direction`, PWM at `duty` out of 255
    Drive { direction: Direction, duty: u8 },
    /// Both direction pins high, PWM zero
    Brake,
}

impl WheelCommand {
    /// Direction from the sign of the commanded velocity, magnitude from the shaped PWM
    pub fn from_velocity(velocity: f32, pwm: i32) -> Self {
        let direction = if velocity >= 0.0 {
            Direction::Forward
        } else {
            Direction::Backward
        };
        Self::Drive {
            direction,
            duty: clamp_duty(pwm),
        }
    }

    /// Direction and magnitude both from a signed PWM value
    pub fn from_signed_pwm(pwm: i32) -> Self {
        let direction = if pwm >= 0 {
            Direction::Forward
        } else {
            Direction::Backward
        };
        Self::Drive {
            direction,
            duty: clamp_duty(pwm),
        }
    }

    /// Duty magnitude, zero when braking
    pub fn duty(&self) -> u8 {
        match self {
            Self::Drive { duty, .. } => *duty,
            Self::Brake => 0,
        }
    }
}

fn clamp_duty(pwm: i32) -> u8 {
    pwm.saturating_abs().min(DUTY_MAX) as u8
}

/// Two independently driven wheels
pub trait MotorActuator {
    fn drive(&mut self, left: WheelCommand, right: WheelCommand);

    /// Actively brakes both wheels
    fn brake(&mut self) {
        self.drive(WheelCommand::Brake, WheelCommand::Brake);
    }
}
