//! Wheel encoder pulse counting
//!
//! One task per wheel awaits every edge of its encoder signal through the GPIO
//! interrupt and records it in the shared [`ENCODERS`] counters. The debounce window is
//! applied by the counter itself, so the tasks never sleep between edges.

use embassy_rp::gpio::{Input, Pull};
use follower_core::encoder::{EncoderCounter, WheelEncoders};

use crate::system::resources::MotorEncoderResources;

/// Pulse counters shared with the line follow task
pub static ENCODERS: WheelEncoders = WheelEncoders::new();

/// Starts counting on both wheels
pub fn spawn(spawner: &embassy_executor::Spawner, r: MotorEncoderResources) {
    let left = Input::new(r.left_encoder_pin, Pull::Up);
    let right = Input::new(r.right_encoder_pin, Pull::Up);
    spawner.spawn(count_edges(left, &ENCODERS.left)).unwrap();
    spawner.spawn(count_edges(right, &ENCODERS.right)).unwrap();
}

#[embassy_executor::task(pool_size = 2)]
async fn count_edges(mut pin: Input<'static>, counter: &'static EncoderCounter) {
    loop {
        pin.wait_for_any_edge().await;
        counter.record_edge(super::now());
    }
}
