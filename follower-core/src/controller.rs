//! The line-following controller
//!
//! [`LineFollower`] owns all per-run state and the hardware handles. The firmware calls
//! [`LineFollower::run_one_tick`] at least once per control period; every call runs the
//! classifier, while the PID and actuation sub-step only runs once a full period has
//! passed.
//!
//! # Modes
//! - `Following`: classify, steer, check for obstacles, run the wheel PIDs
//! - `Recovering`: blind search towards the last seen side, PIDs held reset
//! - `Avoiding`: the avoidance maneuver drives the motors directly, bypassing the PIDs
//! - `Parked`: recovery timed out, stay at rest until a followable sample shows up
//!
//! Leaving recovery, finishing a maneuver and a sensor-fault stop are context switches:
//! the motors are braked, the encoder deltas zeroed, PIDs and shapers reset and the
//! control timing restarted.
//!
//! # Enable flag
//! [`LineFollower::abort`] disables the controller and brakes. Every later tick only
//! keeps the motors braked until [`LineFollower::initialize`] runs again. Because the
//! maneuver is polled once per tick, an abort lands within one tick in every mode.

use crate::actuation::{MotorActuator, WheelCommand};
use crate::config::ControlConfig;
use crate::encoder::WheelEncoders;
use crate::line::{LineSample, LineSensors};
use crate::log::{debug, info, warn};
use crate::maneuver::{Maneuver, ManeuverCommand};
use crate::pid::PidController;
use crate::ranger::RangeSensor;
use crate::recovery::{Recovery, RecoveryOutcome};
use crate::shaper::PwmShaper;
use crate::steering::{apply_steering, classify, LastSeenSide, LineAction, SteeringRegime};
use crate::time::Instant;

/// What the controller is doing between ticks
#[derive(Debug, Clone, Copy)]
pub enum Mode {
    /// Steering along the line, or waiting at rest for it to show up
    Following,
    /// Searching for a lost line
    Recovering(Recovery),
    /// Driving the avoidance maneuver
    Avoiding(Maneuver),
    /// Recovery timed out, braked until the line is back
    Parked,
}

/// What a call to [`LineFollower::run_one_tick`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TickOutcome {
    /// Aborted, motors held braked
    Disabled,
    /// The sensors read all-on or all-off for too long, stopped and reset
    SensorFault,
    /// Held at rest after a sensor fault or a recovery timeout
    Stopped,
    /// Recovery found the line, stopped for a fresh start
    Reacquired,
    /// Recovery gave up, parked
    RecoveryTimedOut,
    /// An obstacle started the avoidance maneuver
    ObstacleDetected,
    /// The avoidance maneuver is running
    Avoiding,
    /// The avoidance maneuver finished, stopped for a fresh start
    AvoidanceComplete,
    /// Classified, the control sub-step is not due yet
    Pending,
    /// Wheels driven with these shaped PWM magnitudes
    Actuated { left: i32, right: i32 },
}

/// Line follower state, generic over the line sensors, range sensor and motors
///
/// The wheel counters are borrowed because the edge handlers write them concurrently.
pub struct LineFollower<'a, S, R, M> {
    config: ControlConfig,
    sensors: S,
    ranger: R,
    motors: M,
    encoders: &'a WheelEncoders,

    left_pid: PidController,
    right_pid: PidController,
    left_shaper: PwmShaper,
    right_shaper: PwmShaper,

    mode: Mode,
    last_seen: LastSeenSide,
    seen_line_ever: bool,
    enabled: bool,

    /// Start of the current all-on/all-off streak
    bad_since: Option<Instant>,
    /// The fault stop already fired for the current streak
    fault_latched: bool,
    /// Last time the control sub-step ran
    last_control: Instant,
}

impl<'a, S, R, M> LineFollower<'a, S, R, M>
where
    S: LineSensors,
    R: RangeSensor,
    M: MotorActuator,
{
    /// Builds a disabled controller, [`Self::initialize`] must run before the first tick
    pub fn new(config: ControlConfig, sensors: S, ranger: R, motors: M, encoders: &'a WheelEncoders) -> Self {
        Self {
            sensors,
            ranger,
            motors,
            encoders,
            left_pid: PidController::new(config.left_pid),
            right_pid: PidController::new(config.right_pid),
            left_shaper: PwmShaper::new(config.pwm_min_run, config.pwm_slew),
            right_shaper: PwmShaper::new(config.pwm_min_run, config.pwm_slew),
            mode: Mode::Following,
            last_seen: LastSeenSide::Unknown,
            seen_line_ever: false,
            enabled: false,
            bad_since: None,
            fault_latched: false,
            last_control: Instant::from_micros(0),
            config,
        }
    }

    /// Resets every counter, flag and controller state and enables the controller
    pub fn initialize(&mut self, now: Instant) {
        self.motors.brake();
        self.encoders.reset();
        self.ranger.reset();
        self.reset_control();
        self.mode = Mode::Following;
        self.last_seen = LastSeenSide::Unknown;
        self.seen_line_ever = false;
        self.bad_since = None;
        self.fault_latched = false;
        self.last_control = now;
        self.enabled = true;
        info!("line follower initialized");
    }

    /// Disables the controller and brakes, idempotent
    pub fn abort(&mut self) {
        if self.enabled {
            info!("line follower aborted");
        }
        self.enabled = false;
        self.motors.brake();
    }

    /// Advances ranging and returns the latest distance, [`crate::ranger::NO_READING`] if none
    ///
    /// Does not consume the sample, the obstacle check still sees it.
    pub fn distance_reading(&mut self, now: Instant) -> f32 {
        self.ranger.update(now);
        self.ranger.latest()
    }

    /// Advances ranging only, for when line following is not running
    pub fn pump_ranging(&mut self, now: Instant) {
        self.ranger.update(now);
    }

    /// Current sensor reading, independent of the classifier
    pub fn line_sensor_bitmap(&mut self) -> LineSample {
        self.sensors.read()
    }

    /// Runs one pass of the control loop
    ///
    /// Reads the sensors and advances whichever mode is active. The wheel PIDs only step
    /// once a control period has passed since their last step, earlier calls return
    /// [`TickOutcome::Pending`]. A disabled controller only keeps the motors braked.
    pub fn run_one_tick(&mut self, now: Instant) -> TickOutcome {
        if !self.enabled {
            self.motors.brake();
            return TickOutcome::Disabled;
        }

        let sample = self.sensors.read();
        if sample.any() {
            self.seen_line_ever = true;
        }

        if let Mode::Avoiding(maneuver) = &mut self.mode {
            self.ranger.update(now);
            let command = maneuver.poll(now, self.encoders.totals(), sample.middle);
            return self.follow_maneuver(command, now);
        }

        if let Some(outcome) = self.guard_sensor_fault(sample, now) {
            self.ranger.update(now);
            return outcome;
        }

        if let Mode::Parked = self.mode {
            let classification = classify(sample, self.last_seen, self.seen_line_ever);
            if classification.action != LineAction::Follow {
                self.motors.brake();
                self.ranger.update(now);
                return TickOutcome::Stopped;
            }
            info!("line found while parked, resuming");
            self.mode = Mode::Following;
            self.settle(now);
        }

        let mut targets = (self.config.base_velocity, self.config.base_velocity);
        let mut steering: Option<SteeringRegime> = None;

        match self.mode {
            Mode::Recovering(recovery) => {
                self.left_pid.reset();
                self.right_pid.reset();
                let outcome = recovery.step(
                    sample,
                    self.last_seen,
                    now,
                    self.config.recovery_timeout,
                    self.config.recovery_speed,
                );
                match outcome {
                    RecoveryOutcome::Searching { left, right } => targets = (left, right),
                    RecoveryOutcome::Reacquired => {
                        info!("recovery: line reacquired");
                        self.mode = Mode::Following;
                        self.settle(now);
                        self.ranger.update(now);
                        return TickOutcome::Reacquired;
                    }
                    RecoveryOutcome::TimedOut => {
                        warn!("recovery: timed out, parking");
                        self.mode = Mode::Parked;
                        self.settle(now);
                        self.ranger.update(now);
                        return TickOutcome::RecoveryTimedOut;
                    }
                }
            }
            _ => {
                let classification = classify(sample, self.last_seen, self.seen_line_ever);
                self.last_seen = classification.last_seen;
                match classification.action {
                    LineAction::Follow => steering = Some(classification.regime),
                    LineAction::EnterRecovery => {
                        info!("recovery: started, line last seen {}", self.last_seen);
                        self.mode = Mode::Recovering(Recovery::start(now));
                    }
                    LineAction::Wait => targets = (0.0, 0.0),
                }
            }
        }

        let distance = self.ranger.read_latest(now);
        let recovering = matches!(self.mode, Mode::Recovering(_));
        if !recovering && sample.is_valid() && self.config.is_obstacle(distance) {
            info!("obstacle at {} cm, avoiding", distance);
            let mut maneuver = Maneuver::new(
                self.config.avoidance,
                self.config.geometry,
                self.config.maneuver_watchdog,
            );
            let command = maneuver.poll(now, self.encoders.totals(), sample.middle);
            self.mode = Mode::Avoiding(maneuver);
            self.follow_maneuver(command, now);
            return TickOutcome::ObstacleDetected;
        }

        let targets = (
            targets.0 * self.config.left_scale,
            targets.1 * self.config.right_scale,
        );
        self.control_step(now, targets, steering)
    }

    /// PID, steering bias, trim and shaping, once per control period
    fn control_step(&mut self, now: Instant, targets: (f32, f32), steering: Option<SteeringRegime>) -> TickOutcome {
        let elapsed = now.saturating_duration_since(self.last_control);
        if elapsed < self.config.control_period {
            return TickOutcome::Pending;
        }
        let dt_s = elapsed.as_secs_f32();
        self.last_control = now;

        let (left_ticks, right_ticks) = self.encoders.take_deltas();
        let geometry = self.config.geometry;
        let max = self.config.max_velocity;

        let left_target = targets.0.clamp(-max, max);
        let right_target = targets.1.clamp(-max, max);
        let left_measured = signed_like(geometry.ticks_to_velocity(left_ticks, dt_s), left_target);
        let right_measured = signed_like(geometry.ticks_to_velocity(right_ticks, dt_s), right_target);

        let mut pwm = (
            self.left_pid.step(left_target, left_measured, dt_s),
            self.right_pid.step(right_target, right_measured, dt_s),
        );
        if let Some(regime) = steering {
            pwm = apply_steering(regime, self.config.steer_soft_pwm, self.config.steer_hard_pwm, pwm);
        }

        let left = self.left_shaper.shape(trim(pwm.0, self.config.left_pwm_trim));
        let right = self.right_shaper.shape(trim(pwm.1, self.config.right_pwm_trim));
        debug!("control: ticks {} {} pwm {} {}", left_ticks, right_ticks, left, right);

        self.motors.drive(
            WheelCommand::from_velocity(left_target, left),
            WheelCommand::from_velocity(right_target, right),
        );
        TickOutcome::Actuated { left, right }
    }

    /// Stops once per all-on/all-off streak that outlasts the threshold
    fn guard_sensor_fault(&mut self, sample: LineSample, now: Instant) -> Option<TickOutcome> {
        if sample.is_valid() {
            self.bad_since = None;
            self.fault_latched = false;
            return None;
        }

        let since = *self.bad_since.get_or_insert(now);
        if now.saturating_duration_since(since) < self.config.sensor_fault_after {
            return None;
        }

        // Held ticks keep re-arming, the first valid sample starts from a clean period
        if self.fault_latched {
            self.settle(now);
            return Some(TickOutcome::Stopped);
        }

        warn!("line sensors read {=u8:b} for too long, stopping", sample.bits());
        self.fault_latched = true;
        if let Mode::Recovering(_) = self.mode {
            self.mode = Mode::Following;
        }
        self.settle(now);
        Some(TickOutcome::SensorFault)
    }

    fn follow_maneuver(&mut self, command: ManeuverCommand, now: Instant) -> TickOutcome {
        match command {
            ManeuverCommand::Drive { left, right } => {
                self.motors.drive(
                    WheelCommand::from_signed_pwm(left.into()),
                    WheelCommand::from_signed_pwm(right.into()),
                );
                TickOutcome::Avoiding
            }
            ManeuverCommand::Brake => {
                self.motors.brake();
                TickOutcome::Avoiding
            }
            ManeuverCommand::Finished => {
                info!("avoidance complete");
                self.mode = Mode::Following;
                // Anything measured mid-maneuver is stale
                self.ranger.discard_pending();
                self.settle(now);
                TickOutcome::AvoidanceComplete
            }
        }
    }

    /// Context switch: stop, zero the deltas, reset controllers and restart timing
    fn settle(&mut self, now: Instant) {
        self.motors.brake();
        self.encoders.reset_deltas();
        self.reset_control();
        self.last_control = now;
    }

    fn reset_control(&mut self) {
        self.left_pid.reset();
        self.right_pid.reset();
        self.left_shaper.reset();
        self.right_shaper.reset();
    }

    pub fn config(&self) -> &ControlConfig {
        &self.config
    }

    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_recovering(&self) -> bool {
        matches!(self.mode, Mode::Recovering(_))
    }

    pub fn last_seen(&self) -> LastSeenSide {
        self.last_seen
    }

    pub fn seen_line_ever(&self) -> bool {
        self.seen_line_ever
    }

    /// Left and right wheel controllers
    pub fn pids(&self) -> (&PidController, &PidController) {
        (&self.left_pid, &self.right_pid)
    }

    /// Left and right wheel shapers
    pub fn shapers(&self) -> (&PwmShaper, &PwmShaper) {
        (&self.left_shaper, &self.right_shaper)
    }

    pub fn sensors_mut(&mut self) -> &mut S {
        &mut self.sensors
    }

    pub fn ranger_mut(&mut self) -> &mut R {
        &mut self.ranger
    }

    pub fn motors(&self) -> &M {
        &self.motors
    }

    pub fn motors_mut(&mut self) -> &mut M {
        &mut self.motors
    }
}

/// Encoders do not sense direction, so the measurement takes the target's sign
fn signed_like(magnitude: f32, target: f32) -> f32 {
    if target >= 0.0 {
        magnitude
    } else {
        -magnitude
    }
}

fn trim(pwm: i32, factor: f32) -> i32 {
    (pwm as f32 * factor) as i32
}
