//! Wheel encoder pulse counting
//!
//! Each wheel has a slotted disc and an optical interrupter. Every edge of the pulse
//! signal is counted, so one slot yields two counts.
//!
//! # Shared state
//! The counters are the only state written from interrupt context. They live in
//! `critical_section::Mutex` cells so a `static` [`WheelEncoders`] can be updated by the
//! edge handlers and read by the control loop. Every read or reset from the control loop
//! runs inside a critical section, which holds off the edge handler for the few
//! instructions it takes, so edges arriving meanwhile are delayed but never lost.
//!
//! # Counters
//! - `delta`: pulses since the last control tick, read-and-zeroed for velocity estimation
//! - `total`: monotonic pulse count, used as a baseline for distance-gated maneuvers

use core::cell::Cell;
use core::f32::consts::PI;
use core::time::Duration;

use critical_section::{CriticalSection, Mutex};

use crate::time::Instant;

/// Edges closer than this to the previously counted edge are contact bounce or noise
pub const MIN_EDGE_INTERVAL: Duration = Duration::from_micros(300);

/// Wheel and encoder dimensions used to turn pulses into meters and degrees
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WheelGeometry {
    /// Wheel radius in meters
    pub wheel_radius_m: f32,
    /// Distance between the wheel contact points in meters
    pub track_width_m: f32,
    /// Slots on the encoder disc
    pub pulses_per_rev: u32,
    /// Counted edges per slot (2 when counting both edges)
    pub edges_per_pulse: u32,
}

impl WheelGeometry {
    pub const DEFAULT: Self = Self {
        wheel_radius_m: 0.0325,
        track_width_m: 0.0950,
        pulses_per_rev: 20,
        edges_per_pulse: 2,
    };

    /// Counted edges per wheel revolution
    pub const fn ticks_per_rev(&self) -> u32 {
        self.pulses_per_rev * self.edges_per_pulse
    }

    /// Wheel circumference in meters
    pub fn circumference_m(&self) -> f32 {
        2.0 * PI * self.wheel_radius_m
    }

    /// Linear wheel speed in m/s for `ticks` counted over `dt_s` seconds
    ///
    /// Always non-negative, the encoders do not sense direction.
    pub fn ticks_to_velocity(&self, ticks: u32, dt_s: f32) -> f32 {
        if dt_s <= 0.0 {
            return 0.0;
        }
        let revolutions = ticks as f32 / self.ticks_per_rev() as f32;
        revolutions * self.circumference_m() / dt_s
    }

    /// Pulses each wheel must count to roll `meters` forward
    pub fn counts_for_distance(&self, meters: f32) -> u32 {
        let revolutions = meters / self.circumference_m();
        libm::roundf(revolutions * self.ticks_per_rev() as f32) as u32
    }

    /// Pulses each wheel must count to spin the robot `degrees` on the spot
    pub fn counts_for_spin(&self, degrees: f32) -> u32 {
        let arc = self.track_width_m * 0.5 * degrees.to_radians();
        self.counts_for_distance(arc)
    }
}

impl Default for WheelGeometry {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[derive(Clone, Copy)]
struct Counts {
    delta: u32,
    total: u32,
    last_edge: Option<Instant>,
}

impl Counts {
    const ZERO: Self = Self {
        delta: 0,
        total: 0,
        last_edge: None,
    };
}

/// Debounced pulse counter for one wheel
pub struct EncoderCounter {
    counts: Mutex<Cell<Counts>>,
}

impl EncoderCounter {
    pub const fn new() -> Self {
        Self {
            counts: Mutex::new(Cell::new(Counts::ZERO)),
        }
    }

    /// Records an edge seen by the interrupt handler at `now`
    ///
    /// Returns `false` if the edge was rejected by the debounce window.
    pub fn record_edge(&self, now: Instant) -> bool {
        critical_section::with(|cs| {
            let cell = self.counts.borrow(cs);
            let mut counts = cell.get();
            if let Some(last) = counts.last_edge {
                if now.saturating_duration_since(last) < MIN_EDGE_INTERVAL {
                    return false;
                }
            }
            counts.delta = counts.delta.wrapping_add(1);
            counts.total = counts.total.wrapping_add(1);
            counts.last_edge = Some(now);
            cell.set(counts);
            true
        })
    }

    /// Pulses since the last reset of the delta counter
    pub fn delta(&self) -> u32 {
        critical_section::with(|cs| self.counts.borrow(cs).get().delta)
    }

    /// Monotonic pulse count
    pub fn total(&self) -> u32 {
        critical_section::with(|cs| self.counts.borrow(cs).get().total)
    }

    fn take_delta_in(&self, cs: CriticalSection<'_>) -> u32 {
        let cell = self.counts.borrow(cs);
        let mut counts = cell.get();
        let delta = counts.delta;
        counts.delta = 0;
        cell.set(counts);
        delta
    }

    fn reset_in(&self, cs: CriticalSection<'_>) {
        self.counts.borrow(cs).set(Counts::ZERO);
    }
}

impl Default for EncoderCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Left and right wheel counters, accessed together
pub struct WheelEncoders {
    pub left: EncoderCounter,
    pub right: EncoderCounter,
}

impl WheelEncoders {
    pub const fn new() -> Self {
        Self {
            left: EncoderCounter::new(),
            right: EncoderCounter::new(),
        }
    }

    /// Reads and zeroes both delta counters in one critical section
    pub fn take_deltas(&self) -> (u32, u32) {
        critical_section::with(|cs| (self.left.take_delta_in(cs), self.right.take_delta_in(cs)))
    }

    /// Zeroes both delta counters, leaving the totals untouched
    pub fn reset_deltas(&self) {
        let _ = self.take_deltas();
    }

    /// Snapshot of both monotonic totals
    pub fn totals(&self) -> (u32, u32) {
        critical_section::with(|cs| {
            (
                self.left.counts.borrow(cs).get().total,
                self.right.counts.borrow(cs).get().total,
            )
        })
    }

    /// Clears deltas, totals and the debounce history of both wheels
    pub fn reset(&self) {
        critical_section::with(|cs| {
            self.left.reset_in(cs);
            self.right.reset_in(cs);
        });
    }
}

impl Default for WheelEncoders {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edges_inside_debounce_window_are_dropped() {
        let counter = EncoderCounter::new();
        assert!(counter.record_edge(Instant::from_micros(1_000)));
        assert!(!counter.record_edge(Instant::from_micros(1_150)));
        assert!(!counter.record_edge(Instant::from_micros(1_299)));
        assert!(counter.record_edge(Instant::from_micros(1_300)));
        assert_eq!(counter.delta(), 2);
        assert_eq!(counter.total(), 2);
    }

    #[test]
    fn rejected_edge_does_not_move_the_debounce_window() {
        let counter = EncoderCounter::new();
        counter.record_edge(Instant::from_micros(0));
        counter.record_edge(Instant::from_micros(200));
        // 300 us after the first counted edge, not after the rejected one
        assert!(counter.record_edge(Instant::from_micros(300)));
    }

    #[test]
    fn taking_deltas_keeps_totals() {
        let encoders = WheelEncoders::new();
        for i in 0..5u64 {
            encoders.left.record_edge(Instant::from_millis(i));
        }
        for i in 0..3u64 {
            encoders.right.record_edge(Instant::from_millis(i));
        }
        assert_eq!(encoders.take_deltas(), (5, 3));
        assert_eq!(encoders.take_deltas(), (0, 0));
        assert_eq!(encoders.totals(), (5, 3));

        encoders.left.record_edge(Instant::from_millis(10));
        encoders.reset_deltas();
        assert_eq!(encoders.left.delta(), 0);
        assert_eq!(encoders.totals(), (6, 3));

        encoders.reset();
        assert_eq!(encoders.totals(), (0, 0));
    }

    #[test]
    fn velocity_from_ticks() {
        let geometry = WheelGeometry::DEFAULT;
        // One full revolution in one second
        let v = geometry.ticks_to_velocity(40, 1.0);
        assert!((v - geometry.circumference_m()).abs() < 1e-6);
        assert_eq!(geometry.ticks_to_velocity(10, 0.0), 0.0);
    }

    #[test]
    fn pulse_targets_for_distance_and_spin() {
        let geometry = WheelGeometry::DEFAULT;
        // 0.2 m / 0.2042 m per rev * 40 ticks = 39.2
        assert_eq!(geometry.counts_for_distance(0.2), 39);
        // 60 deg: 0.0475 m * 1.047 rad = 0.0497 m of arc = 9.7 ticks
        assert_eq!(geometry.counts_for_spin(60.0), 10);
        assert_eq!(geometry.counts_for_spin(0.0), 0);
    }
}
