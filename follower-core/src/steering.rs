//! Line classification and steering policy
//!
//! [`classify`] turns a line sample into a steering regime, the next last-seen side and
//! what the controller should do. [`apply_steering`] turns a regime into a PWM bias on
//! top of the PID output. Both are pure so the whole policy can be checked without
//! hardware.
//!
//! # Rules, first match wins
//! 1. Four of five sensors on the line: a cross marking or a sharp edge. The negated
//!    outer sensor tells which side the line went (outer-left off means the line is to
//!    the right). Recovery starts.
//! 2. Outer sensor on one side without the opposite pair: hard bias towards it.
//! 3. Adjacent sensor on one side without the opposite pair: soft bias towards it.
//! 4. Both sides and the middle, or the middle alone: straight, memory cleared.
//! 5. Anything else: the line is not followable. Recovery if the line was seen
//!    before, otherwise keep waiting at rest.

use crate::line::LineSample;

/// Side the line was last seen on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LastSeenSide {
    #[default]
    Unknown,
    Left,
    Right,
}

/// Steering regimes the classifier distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SteeringRegime {
    Straight,
    SoftLeft,
    HardLeft,
    SoftRight,
    HardRight,
    NoBias,
}

/// What the controller should do with the sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LineAction {
    /// Drive at cruise speed with the regime's bias
    Follow,
    /// Line lost or at a marking, start the blind search
    EnterRecovery,
    /// Line never seen yet, stay at rest
    Wait,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Classification {
    pub regime: SteeringRegime,
    pub last_seen: LastSeenSide,
    pub action: LineAction,
}

pub fn classify(sample: LineSample, last_seen: LastSeenSide, seen_line_ever: bool) -> Classification {
    let LineSample {
        outer_left: ol,
        left: l,
        middle: m,
        right: r,
        outer_right: or,
    } = sample;

    let follow = |regime, last_seen| Classification {
        regime,
        last_seen,
        action: LineAction::Follow,
    };

    if sample.asserted() == 4 {
        let last_seen = if !ol {
            LastSeenSide::Right
        } else if !or {
            LastSeenSide::Left
        } else {
            last_seen
        };
        return Classification {
            regime: SteeringRegime::NoBias,
            last_seen,
            action: LineAction::EnterRecovery,
        };
    }

    if ol && !r && !or {
        follow(SteeringRegime::HardLeft, LastSeenSide::Left)
    } else if or && !l && !ol {
        follow(SteeringRegime::HardRight, LastSeenSide::Right)
    } else if l && !r && !or {
        follow(SteeringRegime::SoftLeft, LastSeenSide::Left)
    } else if r && !l && !ol {
        follow(SteeringRegime::SoftRight, LastSeenSide::Right)
    } else if m {
        // Middle alone, or a wide patch spanning both sides through the middle
        follow(SteeringRegime::Straight, LastSeenSide::Unknown)
    } else {
        Classification {
            regime: SteeringRegime::NoBias,
            last_seen,
            action: if seen_line_ever {
                LineAction::EnterRecovery
            } else {
                LineAction::Wait
            },
        }
    }
}

/// Adds the regime's bias to a `(left, right)` PWM pair
///
/// Turning left slows the left wheel and speeds up the right one.
pub fn apply_steering(regime: SteeringRegime, soft: i32, hard: i32, (left, right): (i32, i32)) -> (i32, i32) {
    match regime {
        SteeringRegime::SoftLeft => (left - soft, right + soft),
        SteeringRegime::HardLeft => (left - hard, right + hard),
        SteeringRegime::SoftRight => (left + soft, right - soft),
        SteeringRegime::HardRight => (left + hard, right - hard),
        SteeringRegime::Straight | SteeringRegime::NoBias => (left, right),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(bits: u8, last_seen: LastSeenSide) -> Classification {
        classify(LineSample::from_bits(bits), last_seen, true)
    }

    #[test]
    fn outer_pair_gives_hard_left() {
        let c = run(0b11000, LastSeenSide::Unknown);
        assert_eq!(c.regime, SteeringRegime::HardLeft);
        assert_eq!(c.last_seen, LastSeenSide::Left);
        assert_eq!(c.action, LineAction::Follow);
        assert_eq!(run(0b10000, LastSeenSide::Right).regime, SteeringRegime::HardLeft);
    }

    #[test]
    fn outer_right_gives_hard_right() {
        for bits in [0b00001, 0b00011] {
            let c = run(bits, LastSeenSide::Left);
            assert_eq!(c.regime, SteeringRegime::HardRight);
            assert_eq!(c.last_seen, LastSeenSide::Right);
        }
    }

    #[test]
    fn adjacent_sensors_give_soft_bias() {
        for bits in [0b01000, 0b01100] {
            let c = run(bits, LastSeenSide::Unknown);
            assert_eq!(c.regime, SteeringRegime::SoftLeft);
            assert_eq!(c.last_seen, LastSeenSide::Left);
        }
        for bits in [0b00010, 0b00110] {
            let c = run(bits, LastSeenSide::Unknown);
            assert_eq!(c.regime, SteeringRegime::SoftRight);
            assert_eq!(c.last_seen, LastSeenSide::Right);
        }
    }

    #[test]
    fn centered_and_wide_go_straight_and_forget_side() {
        for bits in [0b00100, 0b01110, 0b10101, 0b11111] {
            let c = run(bits, LastSeenSide::Left);
            assert_eq!(c.regime, SteeringRegime::Straight, "bits {bits:05b}");
            assert_eq!(c.last_seen, LastSeenSide::Unknown);
            assert_eq!(c.action, LineAction::Follow);
        }
    }

    #[test]
    fn four_of_five_enters_recovery() {
        let c = run(0b11110, LastSeenSide::Unknown);
        assert_eq!(c.action, LineAction::EnterRecovery);
        assert_eq!(c.last_seen, LastSeenSide::Left);
        assert_eq!(c.regime, SteeringRegime::NoBias);

        let c = run(0b01111, LastSeenSide::Unknown);
        assert_eq!(c.action, LineAction::EnterRecovery);
        assert_eq!(c.last_seen, LastSeenSide::Right);

        for side in [LastSeenSide::Unknown, LastSeenSide::Left, LastSeenSide::Right] {
            let c = run(0b11011, side);
            assert_eq!(c.action, LineAction::EnterRecovery);
            assert_eq!(c.last_seen, side);
        }
    }

    #[test]
    fn nothing_asserted_waits_until_line_seen() {
        let blank = LineSample::from_bits(0);
        let c = classify(blank, LastSeenSide::Unknown, false);
        assert_eq!(c.action, LineAction::Wait);

        let c = classify(blank, LastSeenSide::Left, true);
        assert_eq!(c.action, LineAction::EnterRecovery);
        assert_eq!(c.last_seen, LastSeenSide::Left);
    }

    #[test]
    fn split_pattern_without_middle_is_not_followable() {
        let c = run(0b01010, LastSeenSide::Right);
        assert_eq!(c.action, LineAction::EnterRecovery);
        assert_eq!(c.last_seen, LastSeenSide::Right);
    }

    #[test]
    fn classification_depends_only_on_its_inputs() {
        for bits in 0..32u8 {
            for side in [LastSeenSide::Unknown, LastSeenSide::Left, LastSeenSide::Right] {
                for seen in [false, true] {
                    let sample = LineSample::from_bits(bits);
                    assert_eq!(classify(sample, side, seen), classify(sample, side, seen));
                }
            }
        }
    }

    #[test]
    fn bias_direction() {
        assert_eq!(apply_steering(SteeringRegime::HardLeft, 4, 7, (100, 100)), (93, 107));
        assert_eq!(apply_steering(SteeringRegime::SoftRight, 4, 7, (100, 100)), (104, 96));
        assert_eq!(apply_steering(SteeringRegime::Straight, 4, 7, (100, 90)), (100, 90));
        assert_eq!(apply_steering(SteeringRegime::NoBias, 4, 7, (0, 0)), (0, 0));
    }
}
