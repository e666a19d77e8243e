//! Five-channel line sensor array
//!
//! Reflective sensors mounted in a row across the front of the robot, read as plain
//! digital inputs. The TCRT modules pull their output low over the dark line.

use embedded_hal::digital::InputPin;

/// One reading of the five sensors, `true` when the sensor sits over the line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LineSample {
    pub outer_left: bool,
    pub left: bool,
    pub middle: bool,
    pub right: bool,
    pub outer_right: bool,
}

impl LineSample {
    pub const fn new(outer_left: bool, left: bool, middle: bool, right: bool, outer_right: bool) -> Self {
        Self {
            outer_left,
            left,
            middle,
            right,
            outer_right,
        }
    }

    /// Builds a sample from a bitmap, bit 4 is outer-left and bit 0 is outer-right
    pub const fn from_bits(bits: u8) -> Self {
        Self::new(
            bits & 0b10000 != 0,
            bits & 0b01000 != 0,
            bits & 0b00100 != 0,
            bits & 0b00010 != 0,
            bits & 0b00001 != 0,
        )
    }

    /// Bitmap in the layout of [`LineSample::from_bits`]
    pub const fn bits(&self) -> u8 {
        (self.outer_left as u8) << 4
            | (self.left as u8) << 3
            | (self.middle as u8) << 2
            | (self.right as u8) << 1
            | self.outer_right as u8
    }

    /// Number of sensors over the line
    pub const fn asserted(&self) -> u8 {
        self.bits().count_ones() as u8
    }

    pub const fn any(&self) -> bool {
        self.bits() != 0
    }

    /// All-on and all-off readings carry no position information
    pub const fn is_valid(&self) -> bool {
        let bits = self.bits();
        bits != 0 && bits != 0b11111
    }
}

/// Source of line samples
pub trait LineSensors {
    fn read(&mut self) -> LineSample;
}

/// Five active-low digital inputs, ordered outer-left to outer-right
pub struct LineSensorArray<P> {
    pins: [P; 5],
}

impl<P: InputPin> LineSensorArray<P> {
    pub fn new(pins: [P; 5]) -> Self {
        Self { pins }
    }
}

impl<P: InputPin> LineSensors for LineSensorArray<P> {
    fn read(&mut self) -> LineSample {
        // An unreadable pin counts as off the line
        let [outer_left, left, middle, right, outer_right] =
            self.pins.each_mut().map(|pin| pin.is_low().unwrap_or(false));
        LineSample::new(outer_left, left, middle, right, outer_right)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::convert::Infallible;
    use embedded_hal::digital::ErrorType;

    struct FixedPin(bool);

    impl ErrorType for FixedPin {
        type Error = Infallible;
    }

    impl InputPin for FixedPin {
        fn is_high(&mut self) -> Result<bool, Self::Error> {
            Ok(self.0)
        }

        fn is_low(&mut self) -> Result<bool, Self::Error> {
            Ok(!self.0)
        }
    }

    #[test]
    fn bitmap_layout() {
        let sample = LineSample::from_bits(0b11000);
        assert!(sample.outer_left && sample.left);
        assert!(!sample.middle && !sample.right && !sample.outer_right);
        assert_eq!(sample.bits(), 0b11000);
        assert_eq!(sample.asserted(), 2);
    }

    #[test]
    fn all_on_and_all_off_are_invalid() {
        assert!(!LineSample::from_bits(0b00000).is_valid());
        assert!(!LineSample::from_bits(0b11111).is_valid());
        assert!(LineSample::from_bits(0b00100).is_valid());
        assert!(LineSample::from_bits(0b11110).is_valid());
    }

    #[test]
    fn low_pins_read_as_on_line() {
        let mut array = LineSensorArray::new([
            FixedPin(true),
            FixedPin(true),
            FixedPin(false),
            FixedPin(true),
            FixedPin(true),
        ]);
        assert_eq!(array.read(), LineSample::from_bits(0b00100));
    }
}
