//! HC-SR04 echo timing
//!
//! Awaits both edges of the echo pulse through the GPIO interrupt and stores their
//! timestamps in [`ECHO`]. The ranger in the line follow task turns them into a
//! distance, so the pulse width does not depend on how often the control loop runs.

use embassy_rp::gpio::{Input, Pull};
use follower_core::ranger::EchoCapture;

use crate::system::resources::UltrasonicEchoResources;
use crate::task::now;

/// Echo edges shared with the line follow task
pub static ECHO: EchoCapture = EchoCapture::new();

#[embassy_executor::task]
pub async fn capture_echo(r: UltrasonicEchoResources) {
    let mut echo = Input::new(r.echo_pin, Pull::None);
    loop {
        echo.wait_for_rising_edge().await;
        ECHO.record_rise(now());
        echo.wait_for_falling_edge().await;
        ECHO.record_fall(now());
    }
}
