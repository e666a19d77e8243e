//! Telemetry report
//!
//! Logs the latest telemetry snapshot a few times per second. Stands in for the
//! application layer that would otherwise forward it off the robot.

use defmt::debug;
use embassy_time::{Duration, Timer};

use crate::system::telemetry;

const REPORT_INTERVAL: Duration = Duration::from_millis(500);

#[embassy_executor::task]
pub async fn report() {
    loop {
        let snapshot = telemetry::wait().await;
        debug!(
            "distance {} cm, line {=u8:b}, {}",
            snapshot.distance_cm,
            snapshot.line.bits(),
            snapshot.outcome
        );
        Timer::after(REPORT_INTERVAL).await;
    }
}
