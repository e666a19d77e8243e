//! TB6612FNG motor driver
//!
//! Implements [`MotorActuator`] on top of the `tb6612fng` motor channels. Motor A is the
//! left wheel, motor B the right one. Standby is released once at start-up. The control
//! core thinks in duty out of 255, the driver crate takes a percentage, so duties are
//! rescaled on the way out.
//!
//! # PWM
//! 10 kHz, cheaper DC motors often work better at lower frequencies.

use defmt::{info, warn};
use embassy_rp::gpio::{Level, Output};
use embassy_rp::pwm::{self, Pwm, PwmOutput};
use follower_core::actuation::{Direction, MotorActuator, WheelCommand, DUTY_MAX};
use tb6612fng::{DriveCommand, Motor};

use crate::system::resources::MotorDriverResources;

const PWM_FREQUENCY_HZ: u32 = 10_000;

type WheelMotor = Motor<Output<'static>, Output<'static>, PwmOutput<'static>>;

pub struct Tb6612Motors {
    left: WheelMotor,
    right: WheelMotor,
    /// Held high while the driver is in use
    _standby: Output<'static>,
}

impl Tb6612Motors {
    /// Configures the PWM slices and pins, wakes the driver and brakes both wheels
    pub fn new(r: MotorDriverResources) -> Self {
        let clock_freq_hz = embassy_rp::clocks::clk_sys_freq(); // 150MHz

        // Calculate minimum divider needed to keep period under 16-bit limit (65535)
        let divider = ((clock_freq_hz / PWM_FREQUENCY_HZ) / 65535 + 1) as u8;
        let period = (clock_freq_hz / (PWM_FREQUENCY_HZ * divider as u32)) as u16 - 1;

        let mut pwm_config = pwm::Config::default();
        pwm_config.divider = divider.into();
        pwm_config.top = period;

        let left_fwd = Output::new(r.left_forward_pin, Level::Low);
        let left_bckw = Output::new(r.left_backward_pin, Level::Low);
        let (left_pwm, _) = Pwm::new_output_a(r.left_slice, r.left_pwm_pin, pwm_config.clone()).split();
        let left_motor = Motor::new(left_fwd, left_bckw, left_pwm.expect("left PWM channel A not configured")).unwrap();

        let right_fwd = Output::new(r.right_forward_pin, Level::Low);
        let right_bckw = Output::new(r.right_backward_pin, Level::Low);
        let (_, right_pwm) = Pwm::new_output_b(r.right_slice, r.right_pwm_pin, pwm_config).split();
        let right_motor = Motor::new(right_fwd, right_bckw, right_pwm.expect("right PWM channel B not configured")).unwrap();

        let mut motors = Self {
            left: left_motor,
            right: right_motor,
            _standby: Output::new(r.standby_pin, Level::High),
        };
        motors.brake();
        info!("motor driver ready");
        motors
    }
}

impl MotorActuator for Tb6612Motors {
    fn drive(&mut self, left: WheelCommand, right: WheelCommand) {
        if self.left.drive(drive_command(left)).is_err() {
            warn!("left motor rejected {}", left);
        }
        if self.right.drive(drive_command(right)).is_err() {
            warn!("right motor rejected {}", right);
        }
    }
}

fn drive_command(command: WheelCommand) -> DriveCommand {
    match command {
        WheelCommand::Drive { direction, duty } => {
            let percent = libm::roundf(duty as f32 * 100.0 / DUTY_MAX as f32) as u8;
            match direction {
                Direction::Forward => DriveCommand::Forward(percent),
                Direction::Backward => DriveCommand::Backward(percent),
            }
        }
        WheelCommand::Brake => DriveCommand::Brake,
    }
}
