//! Start button handling
//!
//! A short press (re)starts line following, holding the button aborts it.

use defmt::info;
use embassy_futures::select::{select, Either};
use embassy_rp::gpio::{Input, Level, Pull};
use embassy_time::{Duration, Timer};

use crate::system::command::{self, Command};
use crate::system::resources::StartButtonResources;

/// Button hold threshold (ms)
const HOLD_DURATION: Duration = Duration::from_millis(700);

/// Button debounce delay (ms)
const DEBOUNCE_DURATION: Duration = Duration::from_millis(30);

#[embassy_executor::task]
pub async fn start_button(r: StartButtonResources) {
    let mut button = Input::new(r.btn, Pull::Down);

    loop {
        if debounce(&mut button).await != Level::High {
            continue;
        }

        let command = match select(Timer::after(HOLD_DURATION), debounce(&mut button)).await {
            Either::First(()) => Command::Abort,
            Either::Second(_) => Command::Initialize,
        };
        info!("start button: {}", command);
        command::update(command);

        if command == Command::Abort {
            button.wait_for_low().await;
        }
    }
}

/// Ensures stable button state
async fn debounce(button: &mut Input<'static>) -> Level {
    loop {
        let st_level = button.get_level();
        button.wait_for_any_edge().await;
        Timer::after(DEBOUNCE_DURATION).await;
        let end_level = button.get_level();
        if st_level != end_level {
            break end_level;
        }
    }
}
