//! Line follow task
//!
//! Owns the [`LineFollower`] and drives it from a fixed-rate ticker. Commands from
//! [`crate::system::command`] are handled between ticks, so an abort takes effect before
//! the next tick runs.
//!
//! # Operation
//! - Starts disabled, waits for an `Initialize` command
//! - While enabled, runs one controller tick per millisecond
//! - While disabled, keeps pumping the ultrasonic ranger so distance telemetry stays live
//! - Publishes a telemetry snapshot after every tick

use core::mem::discriminant;

use defmt::info;
use embassy_futures::select::{select, Either};
use embassy_rp::gpio::{Input, Level, Output, Pull};
use embassy_time::{Delay, Duration, Ticker};
use follower_core::line::LineSensorArray;
use follower_core::ranger::Ranger;
use follower_core::{ControlConfig, LineFollower, TickOutcome};

use crate::system::command::{self, Command};
use crate::system::resources::{LineSensorResources, MotorDriverResources, UltrasonicDistanceSensorResources};
use crate::system::telemetry::{self, Telemetry};
use crate::task::encoder::ENCODERS;
use crate::task::motor_driver::Tb6612Motors;
use crate::task::now;
use crate::task::ultrasonic_echo::ECHO;

/// Outer loop rate, well above the 10 ms control period so the classifier sees every change
const TICK_INTERVAL: Duration = Duration::from_millis(1);

#[embassy_executor::task]
pub async fn line_follow(
    sensors: LineSensorResources,
    distance: UltrasonicDistanceSensorResources,
    motors: MotorDriverResources,
) {
    let config = ControlConfig::DEFAULT;

    // The sensor modules drive their outputs, pull-ups only keep a missing sensor off the line
    let sensors = LineSensorArray::new([
        Input::new(sensors.outer_left, Pull::Up),
        Input::new(sensors.left, Pull::Up),
        Input::new(sensors.middle, Pull::Up),
        Input::new(sensors.right, Pull::Up),
        Input::new(sensors.outer_right, Pull::Up),
    ]);
    let ranger = Ranger::new(
        Output::new(distance.trigger_pin, Level::Low),
        &ECHO,
        Delay,
        config.ranger,
    );
    let motors = Tb6612Motors::new(motors);

    let mut follower = LineFollower::new(config, sensors, ranger, motors, &ENCODERS);
    let mut last_outcome = TickOutcome::Disabled;
    let mut ticker = Ticker::every(TICK_INTERVAL);
    info!("line follow task ready, waiting for start");

    loop {
        match select(ticker.next(), command::wait()).await {
            Either::First(()) => {
                let now = now();
                let outcome = if follower.is_enabled() {
                    follower.run_one_tick(now)
                } else {
                    follower.pump_ranging(now);
                    TickOutcome::Disabled
                };

                if discriminant(&outcome) != discriminant(&last_outcome) {
                    info!("line follow: {}", outcome);
                }
                last_outcome = outcome;

                telemetry::publish(Telemetry {
                    distance_cm: follower.distance_reading(now),
                    line: follower.line_sensor_bitmap(),
                    outcome,
                });
            }
            Either::Second(Command::Initialize) => {
                follower.initialize(now());
                ticker.reset();
            }
            Either::Second(Command::Abort) => follower.abort(),
        }
    }
}
