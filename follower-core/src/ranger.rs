//! HC-SR04 ultrasonic ranging without blocking
//!
//! The sensor answers a short trigger pulse with an echo pulse whose width is the round
//! trip time of the sound burst. The echo edges are timestamped where they happen, by the
//! GPIO edge handler writing into an [`EchoCapture`], so the width keeps microsecond
//! resolution no matter how rarely the control loop gets around to [`Ranger::update`].
//! Each call advances a three-state machine:
//!
//! - `Idle`: fires a trigger at most once per period, then waits for the echo to rise
//! - `AwaitingRise`: picks up the captured rising edge, gives up after the echo timeout
//! - `AwaitingFall`: converts the captured high time to centimeters once the echo dropped
//!
//! Any timeout publishes [`NO_READING`]. The only blocking part is the trigger pulse
//! itself, a dozen microseconds.

use core::cell::Cell;
use core::time::Duration;

use critical_section::Mutex;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;

use crate::log::debug;
use crate::time::Instant;

/// Distance reported when there is no valid measurement
pub const NO_READING: f32 = -1.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangerConfig {
    /// Minimum time between two trigger pulses
    pub period: Duration,
    /// Longest wait for each echo edge, ~5 m of range
    pub echo_timeout: Duration,
    /// Low time before the trigger pulse
    pub trigger_settle_us: u32,
    /// High time of the trigger pulse
    pub trigger_pulse_us: u32,
    /// Speed of sound in centimeters per microsecond
    pub cm_per_us: f32,
}

impl RangerConfig {
    pub const DEFAULT: Self = Self {
        period: Duration::from_millis(250),
        echo_timeout: Duration::from_millis(30),
        trigger_settle_us: 2,
        trigger_pulse_us: 10,
        cm_per_us: 0.0343,
    };

    /// One-way distance for an echo that stayed high for `echo_us`
    pub fn distance_cm(&self, echo_us: u64) -> f32 {
        echo_us as f32 * self.cm_per_us / 2.0
    }
}

impl Default for RangerConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct EchoEdges {
    rise: Option<Instant>,
    fall: Option<Instant>,
}

/// Echo edge timestamps, written by the edge handler and read by the [`Ranger`]
///
/// Lives in a `static` like the wheel counters. A fall only counts after a rise, a new
/// rise starts over.
pub struct EchoCapture {
    edges: Mutex<Cell<EchoEdges>>,
}

impl EchoCapture {
    pub const fn new() -> Self {
        Self {
            edges: Mutex::new(Cell::new(EchoEdges { rise: None, fall: None })),
        }
    }

    /// Echo went high at `at`
    pub fn record_rise(&self, at: Instant) {
        critical_section::with(|cs| {
            self.edges.borrow(cs).set(EchoEdges {
                rise: Some(at),
                fall: None,
            })
        });
    }

    /// Echo went low at `at`, ignored without a preceding rise
    pub fn record_fall(&self, at: Instant) {
        critical_section::with(|cs| {
            let cell = self.edges.borrow(cs);
            let mut edges = cell.get();
            if edges.rise.is_some() && edges.fall.is_none() {
                edges.fall = Some(at);
                cell.set(edges);
            }
        });
    }

    /// Forgets both edges, called right before a trigger
    pub fn clear(&self) {
        critical_section::with(|cs| self.edges.borrow(cs).set(EchoEdges::default()));
    }

    fn edges(&self) -> EchoEdges {
        critical_section::with(|cs| self.edges.borrow(cs).get())
    }
}

impl Default for EchoCapture {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RangingState {
    Idle,
    AwaitingRise { since: Instant },
    AwaitingFall { rise: Instant },
}

/// Distance source used by the controller
pub trait RangeSensor {
    /// Advances the measurement without blocking
    fn update(&mut self, now: Instant);

    /// Advances, then returns a sample taken since the last call or [`NO_READING`]
    fn read_latest(&mut self, now: Instant) -> f32;

    /// Most recent distance, whether or not it was already consumed
    fn latest(&self) -> f32;

    /// Marks the pending sample as consumed without reading it
    fn discard_pending(&mut self);

    /// Back to idle with no reading
    fn reset(&mut self);
}

pub struct Ranger<'a, T, D> {
    trigger: T,
    echo: &'a EchoCapture,
    delay: D,
    config: RangerConfig,
    state: RangingState,
    last_trigger: Option<Instant>,
    distance_cm: f32,
    fresh: bool,
}

impl<'a, T: OutputPin, D: DelayNs> Ranger<'a, T, D> {
    pub fn new(trigger: T, echo: &'a EchoCapture, delay: D, config: RangerConfig) -> Self {
        Self {
            trigger,
            echo,
            delay,
            config,
            state: RangingState::Idle,
            last_trigger: None,
            distance_cm: NO_READING,
            fresh: false,
        }
    }

    pub fn state(&self) -> RangingState {
        self.state
    }

    /// Whether a sample arrived that `read_latest` has not returned yet
    pub fn sample_ready(&self) -> bool {
        self.fresh
    }

    fn fire_trigger(&mut self) {
        self.echo.clear();
        let _ = self.trigger.set_low();
        self.delay.delay_us(self.config.trigger_settle_us);
        let _ = self.trigger.set_high();
        self.delay.delay_us(self.config.trigger_pulse_us);
        let _ = self.trigger.set_low();
    }

    fn publish(&mut self, distance_cm: f32) {
        self.distance_cm = distance_cm;
        self.fresh = true;
        self.state = RangingState::Idle;
    }

    /// Publishes the captured echo if it already dropped
    fn try_finish(&mut self, rise: Instant, fall: Option<Instant>, now: Instant) {
        if let Some(fall) = fall {
            let high_for = fall.saturating_duration_since(rise);
            if high_for > self.config.echo_timeout {
                debug!("ranging: echo too long");
                self.publish(NO_READING);
            } else {
                let distance = self.config.distance_cm(high_for.as_micros() as u64);
                self.publish(distance);
            }
        } else if now.saturating_duration_since(rise) > self.config.echo_timeout {
            debug!("ranging: echo too long");
            self.publish(NO_READING);
        }
    }
}

impl<T: OutputPin, D: DelayNs> RangeSensor for Ranger<'_, T, D> {
    fn update(&mut self, now: Instant) {
        match self.state {
            RangingState::Idle => {
                let due = self
                    .last_trigger
                    .map_or(true, |last| now.saturating_duration_since(last) >= self.config.period);
                if due {
                    self.last_trigger = Some(now);
                    self.fresh = false;
                    self.fire_trigger();
                    self.state = RangingState::AwaitingRise { since: now };
                }
            }
            RangingState::AwaitingRise { since } => {
                let edges = self.echo.edges();
                if let Some(rise) = edges.rise {
                    // Short echoes rise and fall between two updates
                    self.state = RangingState::AwaitingFall { rise };
                    self.try_finish(rise, edges.fall, now);
                } else if now.saturating_duration_since(since) > self.config.echo_timeout {
                    debug!("ranging: no echo");
                    self.publish(NO_READING);
                }
            }
            RangingState::AwaitingFall { rise } => {
                let edges = self.echo.edges();
                self.try_finish(rise, edges.fall, now);
            }
        }
    }

    fn read_latest(&mut self, now: Instant) -> f32 {
        self.update(now);
        if self.fresh {
            self.fresh = false;
            self.distance_cm
        } else {
            NO_READING
        }
    }

    fn latest(&self) -> f32 {
        self.distance_cm
    }

    fn discard_pending(&mut self) {
        self.fresh = false;
    }

    fn reset(&mut self) {
        self.state = RangingState::Idle;
        self.last_trigger = None;
        self.distance_cm = NO_READING;
        self.fresh = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::convert::Infallible;
    use std::cell::Cell;
    use std::rc::Rc;

    use embedded_hal::digital::ErrorType;

    struct Trigger {
        high: Rc<Cell<bool>>,
        pulses: Rc<Cell<u32>>,
    }

    impl ErrorType for Trigger {
        type Error = Infallible;
    }

    impl OutputPin for Trigger {
        fn set_low(&mut self) -> Result<(), Infallible> {
            self.high.set(false);
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            self.high.set(true);
            self.pulses.set(self.pulses.get() + 1);
            Ok(())
        }
    }

    struct NoDelay;

    impl DelayNs for NoDelay {
        fn delay_ns(&mut self, _ns: u32) {}
    }

    struct Bench {
        ranger: Ranger<'static, Trigger, NoDelay>,
        echo: &'static EchoCapture,
        trigger_high: Rc<Cell<bool>>,
        pulses: Rc<Cell<u32>>,
    }

    fn bench() -> Bench {
        let echo: &'static EchoCapture = Box::leak(Box::new(EchoCapture::new()));
        let trigger_high = Rc::new(Cell::new(false));
        let pulses = Rc::new(Cell::new(0));
        let ranger = Ranger::new(
            Trigger {
                high: trigger_high.clone(),
                pulses: pulses.clone(),
            },
            echo,
            NoDelay,
            RangerConfig::DEFAULT,
        );
        Bench {
            ranger,
            echo,
            trigger_high,
            pulses,
        }
    }

    fn us(micros: u64) -> Instant {
        Instant::from_micros(micros)
    }

    #[test]
    fn echo_width_becomes_distance() {
        let mut b = bench();
        b.ranger.update(us(0));
        assert_eq!(b.pulses.get(), 1);
        assert!(!b.trigger_high.get(), "trigger must end low");
        assert_eq!(b.ranger.state(), RangingState::AwaitingRise { since: us(0) });

        b.echo.record_rise(us(400));
        b.ranger.update(us(900));
        assert_eq!(b.ranger.state(), RangingState::AwaitingFall { rise: us(400) });
        b.echo.record_fall(us(1_400));

        // 1000 us * 0.0343 / 2
        let distance = b.ranger.read_latest(us(2_000));
        assert!((distance - 17.15).abs() < 0.01, "got {distance}");
        assert_eq!(b.ranger.read_latest(us(3_000)), NO_READING);
        assert!((b.ranger.latest() - 17.15).abs() < 0.01);
    }

    #[test]
    fn sub_millisecond_echo_keeps_its_resolution_at_control_rate() {
        // 10 cm is a 583 us echo, shorter than one 1 ms update interval
        for offset in [0, 150, 300, 450, 600, 850] {
            let mut b = bench();
            let start = 1_000 + offset;
            b.ranger.update(us(start));
            b.echo.record_rise(us(start + 450));
            b.echo.record_fall(us(start + 450 + 583));

            let mut t = start + 1_000;
            while !b.ranger.sample_ready() {
                b.ranger.update(us(t));
                t += 1_000;
            }
            let distance = b.ranger.read_latest(us(t));
            assert!((distance - 10.0).abs() < 0.01, "offset {offset}: got {distance}");
            assert!(RangerConfig::DEFAULT.distance_cm(583) < 15.0);
        }
    }

    #[test]
    fn stray_fall_without_rise_is_ignored() {
        let mut b = bench();
        b.ranger.update(us(0));
        b.echo.record_fall(us(200));
        b.ranger.update(us(1_000));
        assert_eq!(b.ranger.state(), RangingState::AwaitingRise { since: us(0) });
    }

    #[test]
    fn edges_from_before_the_trigger_are_dropped() {
        let mut b = bench();
        b.echo.record_rise(us(10));
        b.echo.record_fall(us(20));
        b.ranger.update(us(100));
        b.ranger.update(us(1_100));
        assert!(!b.ranger.sample_ready());
        assert_eq!(b.ranger.state(), RangingState::AwaitingRise { since: us(100) });
    }

    #[test]
    fn missing_echo_yields_one_sentinel_per_trigger() {
        let mut b = bench();
        b.ranger.update(us(0));
        b.ranger.update(us(30_000));
        assert!(!b.ranger.sample_ready());
        b.ranger.update(us(30_001));
        assert!(b.ranger.sample_ready());
        assert_eq!(b.ranger.state(), RangingState::Idle);
        assert_eq!(b.ranger.latest(), NO_READING);

        b.ranger.discard_pending();
        for t in (31_000..250_000).step_by(1_000) {
            b.ranger.update(us(t));
        }
        assert!(!b.ranger.sample_ready());
        assert_eq!(b.pulses.get(), 1);
    }

    #[test]
    fn stuck_high_echo_times_out() {
        let mut b = bench();
        b.ranger.update(us(0));
        b.echo.record_rise(us(100));
        b.ranger.update(us(1_000));
        b.ranger.update(us(30_101));
        assert!(b.ranger.sample_ready());
        assert_eq!(b.ranger.read_latest(us(30_200)), NO_READING);
        assert_eq!(b.ranger.state(), RangingState::Idle);
    }

    #[test]
    fn triggers_at_fixed_cadence() {
        let mut b = bench();
        b.ranger.update(us(0));
        b.ranger.update(us(40_000));
        assert_eq!(b.ranger.state(), RangingState::Idle);
        b.ranger.update(us(249_999));
        assert_eq!(b.pulses.get(), 1);
        b.ranger.update(us(250_000));
        assert_eq!(b.pulses.get(), 2);
    }

    #[test]
    fn reset_forgets_reading() {
        let mut b = bench();
        b.ranger.update(us(0));
        b.echo.record_rise(us(10));
        b.echo.record_fall(us(510));
        b.ranger.update(us(1_000));
        assert!(b.ranger.latest() > 0.0);
        b.ranger.reset();
        assert_eq!(b.ranger.latest(), NO_READING);
        assert_eq!(b.ranger.state(), RangingState::Idle);
    }
}
