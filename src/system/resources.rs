//! Hardware Resource Management
//!
//! Splits the RP2350 peripherals into groups, one per task, so every pin has exactly one
//! owner.
//!
//! # Resource Groups
//! - Line sensors: five digital inputs, outer-left to outer-right
//! - Distance sensor: HC-SR04 trigger pin, echo pin in a group of its own
//! - Motor driver: TB6612FNG standby, direction pins and PWM slices
//! - Motor encoders: one optical interrupter input per wheel
//! - Start button: starts and aborts line following

use assign_resources::assign_resources;
use embassy_rp::peripherals;

assign_resources! {
    /// TCRT5000 line sensor outputs, low over the line
    line_sensors: LineSensorResources {
        outer_left: PIN_10,
        left: PIN_11,
        middle: PIN_12,
        right: PIN_13,
        outer_right: PIN_16,
    },
    /// HC-SR04 trigger, pulsed by the line follow task
    us_distance_sensor: UltrasonicDistanceSensorResources {
       trigger_pin: PIN_15,
    },
    /// HC-SR04 echo, timestamped by its own edge task
    us_echo: UltrasonicEchoResources {
       echo_pin: PIN_14,
    },
    /// TB6612FNG dual motor driver pins and PWM channels
    motor_driver: MotorDriverResources {
        standby_pin: PIN_22,
        // Motor A, left wheel
        left_slice: PWM_SLICE6,
        left_pwm_pin: PIN_28,
        left_forward_pin: PIN_21,
        left_backward_pin: PIN_20,
        // Motor B, right wheel
        right_slice: PWM_SLICE5,
        right_pwm_pin: PIN_27,
        right_forward_pin: PIN_19,
        right_backward_pin: PIN_18,
    },
    /// Slotted-disc encoder inputs
    motor_encoders: MotorEncoderResources {
        left_encoder_pin: PIN_7,
        right_encoder_pin: PIN_9,
    },
    /// Start/abort push button
    start_button: StartButtonResources {
        btn: PIN_17,
    },
}
