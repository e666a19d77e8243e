//! Encoder-gated maneuvers
//!
//! An obstacle is passed by a fixed choreography of spins, straight advances and pauses.
//! The choreography is a table of [`ManeuverStep`]s, and [`Maneuver`] interprets it one
//! poll at a time so the control task never blocks and an abort lands within a tick.
//!
//! Spins and advances end when both wheels counted their pulse target since the step
//! began. Every moving step also carries a watchdog: a stalled wheel ends the step
//! early and the sequence continues with the next one.

use core::time::Duration;

use crate::encoder::WheelGeometry;
use crate::log::{debug, info, warn};
use crate::time::Instant;

/// Direction of an on-the-spot spin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SpinDirection {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Primitive {
    /// Wheels in opposite directions until each counted the arc for `degrees`
    Spin { direction: SpinDirection, degrees: f32 },
    /// Both wheels forward for `meters`, stopping early on the line if `until_line`
    Advance { meters: f32, until_line: bool },
    /// Brakes held for `millis`
    Pause { millis: u32 },
}

/// Condition for running a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StepGuard {
    Always,
    /// Only if no earlier `until_line` advance found the line
    LineMissed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ManeuverStep {
    pub primitive: Primitive,
    /// PWM magnitude for moving steps
    pub pwm: i16,
    pub guard: StepGuard,
}

impl ManeuverStep {
    pub const fn spin(direction: SpinDirection, degrees: f32, pwm: i16) -> Self {
        Self {
            primitive: Primitive::Spin { direction, degrees },
            pwm,
            guard: StepGuard::Always,
        }
    }

    pub const fn advance(meters: f32, pwm: i16) -> Self {
        Self {
            primitive: Primitive::Advance {
                meters,
                until_line: false,
            },
            pwm,
            guard: StepGuard::Always,
        }
    }

    pub const fn advance_until_line(meters: f32, pwm: i16) -> Self {
        Self {
            primitive: Primitive::Advance {
                meters,
                until_line: true,
            },
            pwm,
            guard: StepGuard::Always,
        }
    }

    pub const fn pause(millis: u32) -> Self {
        Self {
            primitive: Primitive::Pause { millis },
            pwm: 0,
            guard: StepGuard::Always,
        }
    }

    pub const fn only_if_line_missed(mut self) -> Self {
        self.guard = StepGuard::LineMissed;
        self
    }
}

const TURN_PWM: i16 = 120;
const FORWARD_PWM: i16 = 130;
const SETTLE_MS: u32 = 500;

/// Swerve left around an obstacle and search for the line on the far side
pub static AVOIDANCE_SEQUENCE: [ManeuverStep; 14] = [
    ManeuverStep::spin(SpinDirection::Left, 60.0, TURN_PWM),
    ManeuverStep::pause(SETTLE_MS),
    ManeuverStep::advance(0.2, FORWARD_PWM),
    ManeuverStep::pause(SETTLE_MS),
    ManeuverStep::spin(SpinDirection::Right, 60.0, TURN_PWM),
    ManeuverStep::pause(SETTLE_MS),
    ManeuverStep::advance(0.2, FORWARD_PWM),
    ManeuverStep::pause(SETTLE_MS),
    ManeuverStep::spin(SpinDirection::Right, 50.0, TURN_PWM),
    ManeuverStep::pause(SETTLE_MS),
    ManeuverStep::advance_until_line(0.6, FORWARD_PWM),
    ManeuverStep::pause(SETTLE_MS),
    ManeuverStep::spin(SpinDirection::Left, 40.0, TURN_PWM).only_if_line_missed(),
    ManeuverStep::pause(SETTLE_MS).only_if_line_missed(),
];

/// How a step ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StepEnd {
    /// Both wheels reached the pulse target
    Reached,
    /// The middle sensor found the line during an `until_line` advance
    LineFound,
    /// The watchdog expired first
    Watchdog,
    /// A pause ran its course
    Elapsed,
}

/// What the motors should do this tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ManeuverCommand {
    /// Signed PWM per wheel
    Drive { left: i16, right: i16 },
    Brake,
    /// The sequence is complete
    Finished,
}

#[derive(Debug, Clone, Copy)]
struct ActiveStep {
    started: Instant,
    left_start: u32,
    right_start: u32,
    target: u32,
}

enum Progress {
    Drive(i16, i16),
    Hold,
    Done(StepEnd),
}

/// Resumable interpreter for a maneuver table
#[derive(Debug, Clone, Copy)]
pub struct Maneuver {
    steps: &'static [ManeuverStep],
    index: usize,
    active: Option<ActiveStep>,
    line_found: bool,
    geometry: WheelGeometry,
    watchdog: Duration,
}

impl Maneuver {
    pub fn new(steps: &'static [ManeuverStep], geometry: WheelGeometry, watchdog: Duration) -> Self {
        Self {
            steps,
            index: 0,
            active: None,
            line_found: false,
            geometry,
            watchdog,
        }
    }

    /// Index of the step being executed, `None` once finished
    pub fn current_step(&self) -> Option<usize> {
        (self.index < self.steps.len()).then_some(self.index)
    }

    /// Whether an `until_line` advance stopped on the line
    pub fn line_found(&self) -> bool {
        self.line_found
    }

    /// Advances the sequence
    ///
    /// `totals` are the monotonic encoder counts, `middle_on_line` the current middle
    /// sensor. A step that completes returns [`ManeuverCommand::Brake`] for this tick;
    /// the next step starts on the following poll.
    pub fn poll(&mut self, now: Instant, totals: (u32, u32), middle_on_line: bool) -> ManeuverCommand {
        loop {
            let Some(step) = self.steps.get(self.index).copied() else {
                return ManeuverCommand::Finished;
            };

            if step.guard == StepGuard::LineMissed && self.line_found {
                debug!("maneuver: skipping step {}", self.index);
                self.index += 1;
                continue;
            }

            let active = match self.active {
                Some(active) => active,
                None => {
                    let active = self.begin(&step, now, totals);
                    debug!("maneuver: step {} target {}", self.index, active.target);
                    self.active = Some(active);
                    active
                }
            };

            return match self.evaluate(&step, &active, now, totals, middle_on_line) {
                Progress::Drive(left, right) => ManeuverCommand::Drive { left, right },
                Progress::Hold => ManeuverCommand::Brake,
                Progress::Done(end) => {
                    match end {
                        StepEnd::Watchdog => warn!("maneuver: step {} watchdog expired", self.index),
                        StepEnd::LineFound => {
                            info!("maneuver: line found");
                            self.line_found = true;
                        }
                        StepEnd::Reached | StepEnd::Elapsed => {}
                    }
                    self.active = None;
                    self.index += 1;
                    ManeuverCommand::Brake
                }
            };
        }
    }

    fn begin(&self, step: &ManeuverStep, now: Instant, (left, right): (u32, u32)) -> ActiveStep {
        let target = match step.primitive {
            Primitive::Spin { degrees, .. } => self.geometry.counts_for_spin(degrees),
            Primitive::Advance { meters, .. } => self.geometry.counts_for_distance(meters),
            Primitive::Pause { .. } => 0,
        };
        ActiveStep {
            started: now,
            left_start: left,
            right_start: right,
            target,
        }
    }

    fn evaluate(
        &self,
        step: &ManeuverStep,
        active: &ActiveStep,
        now: Instant,
        (left, right): (u32, u32),
        middle_on_line: bool,
    ) -> Progress {
        let elapsed = now.saturating_duration_since(active.started);
        let left_done = left.wrapping_sub(active.left_start) >= active.target;
        let right_done = right.wrapping_sub(active.right_start) >= active.target;
        let pwm = step.pwm;

        match step.primitive {
            Primitive::Pause { millis } => {
                if elapsed >= Duration::from_millis(millis as u64) {
                    Progress::Done(StepEnd::Elapsed)
                } else {
                    Progress::Hold
                }
            }
            Primitive::Spin { direction, .. } => {
                if left_done && right_done {
                    Progress::Done(StepEnd::Reached)
                } else if elapsed > self.watchdog {
                    Progress::Done(StepEnd::Watchdog)
                } else {
                    match direction {
                        SpinDirection::Left => Progress::Drive(-pwm, pwm),
                        SpinDirection::Right => Progress::Drive(pwm, -pwm),
                    }
                }
            }
            Primitive::Advance { until_line, .. } => {
                if until_line && middle_on_line {
                    Progress::Done(StepEnd::LineFound)
                } else if left_done && right_done {
                    Progress::Done(StepEnd::Reached)
                } else if elapsed > self.watchdog {
                    Progress::Done(StepEnd::Watchdog)
                } else {
                    // A wheel that is there already waits for the other one
                    Progress::Drive(
                        if left_done { 0 } else { pwm },
                        if right_done { 0 } else { pwm },
                    )
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WATCHDOG: Duration = Duration::from_millis(4_000);

    fn ms(millis: u64) -> Instant {
        Instant::from_millis(millis)
    }

    fn maneuver(steps: &'static [ManeuverStep]) -> Maneuver {
        Maneuver::new(steps, WheelGeometry::DEFAULT, WATCHDOG)
    }

    #[test]
    fn spin_runs_until_both_wheels_reach_target() {
        static STEPS: [ManeuverStep; 1] = [ManeuverStep::spin(SpinDirection::Left, 60.0, 120)];
        let mut m = maneuver(&STEPS);

        // Target is 10 pulses per wheel
        assert_eq!(m.poll(ms(0), (100, 200), false), ManeuverCommand::Drive { left: -120, right: 120 });
        assert_eq!(m.poll(ms(5), (110, 205), false), ManeuverCommand::Drive { left: -120, right: 120 });
        assert_eq!(m.poll(ms(10), (110, 210), false), ManeuverCommand::Brake);
        assert_eq!(m.current_step(), None);
        assert_eq!(m.poll(ms(11), (110, 210), false), ManeuverCommand::Finished);
    }

    #[test]
    fn right_spin_mirrors_left() {
        static STEPS: [ManeuverStep; 1] = [ManeuverStep::spin(SpinDirection::Right, 50.0, 90)];
        let mut m = maneuver(&STEPS);
        assert_eq!(m.poll(ms(0), (0, 0), false), ManeuverCommand::Drive { left: 90, right: -90 });
    }

    #[test]
    fn stalled_wheel_ends_on_watchdog() {
        static STEPS: [ManeuverStep; 2] = [
            ManeuverStep::spin(SpinDirection::Left, 60.0, 120),
            ManeuverStep::pause(500),
        ];
        let mut m = maneuver(&STEPS);
        m.poll(ms(0), (0, 0), false);
        assert!(matches!(m.poll(ms(4_000), (0, 50), false), ManeuverCommand::Drive { .. }));
        assert_eq!(m.poll(ms(4_001), (0, 50), false), ManeuverCommand::Brake);
        assert_eq!(m.current_step(), Some(1));
    }

    #[test]
    fn advance_balances_wheels() {
        static STEPS: [ManeuverStep; 1] = [ManeuverStep::advance(0.2, 130)];
        let mut m = maneuver(&STEPS);
        // Target is 39 pulses per wheel
        assert_eq!(m.poll(ms(0), (0, 0), false), ManeuverCommand::Drive { left: 130, right: 130 });
        assert_eq!(m.poll(ms(100), (39, 20), false), ManeuverCommand::Drive { left: 0, right: 130 });
        assert_eq!(m.poll(ms(150), (40, 30), false), ManeuverCommand::Drive { left: 0, right: 130 });
        assert_eq!(m.poll(ms(200), (41, 39), false), ManeuverCommand::Brake);
        assert_eq!(m.poll(ms(201), (41, 39), false), ManeuverCommand::Finished);
    }

    #[test]
    fn plain_advance_ignores_the_line() {
        static STEPS: [ManeuverStep; 1] = [ManeuverStep::advance(0.2, 130)];
        let mut m = maneuver(&STEPS);
        assert!(matches!(m.poll(ms(0), (0, 0), true), ManeuverCommand::Drive { .. }));
        assert!(!m.line_found());
    }

    #[test]
    fn pause_brakes_for_its_duration() {
        static STEPS: [ManeuverStep; 1] = [ManeuverStep::pause(500)];
        let mut m = maneuver(&STEPS);
        assert_eq!(m.poll(ms(1_000), (0, 0), false), ManeuverCommand::Brake);
        assert_eq!(m.current_step(), Some(0));
        assert_eq!(m.poll(ms(1_499), (0, 0), false), ManeuverCommand::Brake);
        assert_eq!(m.current_step(), Some(0));
        assert_eq!(m.poll(ms(1_500), (0, 0), false), ManeuverCommand::Brake);
        assert_eq!(m.current_step(), None);
    }

    #[test]
    fn finding_the_line_skips_the_corrective_spin() {
        static STEPS: [ManeuverStep; 3] = [
            ManeuverStep::advance_until_line(0.6, 130),
            ManeuverStep::spin(SpinDirection::Left, 40.0, 120).only_if_line_missed(),
            ManeuverStep::pause(500).only_if_line_missed(),
        ];
        let mut m = maneuver(&STEPS);
        assert!(matches!(m.poll(ms(0), (0, 0), false), ManeuverCommand::Drive { .. }));
        assert_eq!(m.poll(ms(300), (20, 20), true), ManeuverCommand::Brake);
        assert!(m.line_found());
        assert_eq!(m.poll(ms(301), (20, 20), true), ManeuverCommand::Finished);
    }

    #[test]
    fn missing_the_line_runs_the_corrective_spin() {
        static STEPS: [ManeuverStep; 2] = [
            ManeuverStep::advance_until_line(0.6, 130),
            ManeuverStep::spin(SpinDirection::Left, 40.0, 120).only_if_line_missed(),
        ];
        let mut m = maneuver(&STEPS);
        m.poll(ms(0), (0, 0), false);
        // 0.6 m is 118 pulses
        assert_eq!(m.poll(ms(900), (118, 118), false), ManeuverCommand::Brake);
        assert!(!m.line_found());
        assert_eq!(m.poll(ms(901), (118, 118), false), ManeuverCommand::Drive { left: -120, right: 120 });
    }

    #[test]
    fn avoidance_sequence_completes_on_watchdogs_alone() {
        let mut m = maneuver(&AVOIDANCE_SEQUENCE);
        let mut now = 0;
        let mut finished = false;
        while now < 60_000 {
            if m.poll(ms(now), (0, 0), false) == ManeuverCommand::Finished {
                finished = true;
                break;
            }
            now += 1;
        }
        assert!(finished);
        assert!(!m.line_found());
        // Seven moving steps at just over 4 s each, seven pauses of 0.5 s
        assert!(now > 7 * 4_000 + 7 * 500);
    }
}
