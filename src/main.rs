//! Line follower firmware entry point
//!
//! Splits the peripherals into per-task resource groups and spawns the tasks. All
//! control decisions live in the `follower-core` crate; the tasks here own the pins and
//! feed the controller.

#![no_std]
#![no_main]

use crate::task::{line_follow::line_follow, report::report, start_button::start_button};
use embassy_executor::Spawner;
use embassy_rp::block::ImageDef;
use embassy_rp::config::Config;
use system::resources::{
    AssignedResources, LineSensorResources, MotorDriverResources, MotorEncoderResources, StartButtonResources,
    UltrasonicDistanceSensorResources, UltrasonicEchoResources,
};
use {defmt_rtt as _, panic_probe as _};

/// Firmware image type for bootloader
#[link_section = ".start_block"]
#[used]
pub static IMAGE_DEF: ImageDef = ImageDef::secure_exe();

/// System core modules
mod system;
/// Task implementations
mod task;

/// Firmware entry point
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let p = embassy_rp::init(Config::default());

    // Split the resources into separate groups for each task
    let r = split_resources!(p);

    // Encoders first so no pulse is missed once the wheels turn
    task::encoder::spawn(&spawner, r.motor_encoders);
    spawner.spawn(task::ultrasonic_echo::capture_echo(r.us_echo)).unwrap();
    spawner
        .spawn(line_follow(r.line_sensors, r.us_distance_sensor, r.motor_driver))
        .unwrap();
    spawner.spawn(start_button(r.start_button)).unwrap();
    spawner.spawn(report()).unwrap();
}
