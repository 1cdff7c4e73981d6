mod gpio;
mod key;

use std::fmt::Debug;
use crate::{GpioBias, GpioLineConfig, InputResult};
pub use gpio::*;
pub use key::*;

/// The `Keypad` trait defines the interface for keypad input devices.
pub trait Keypad: Debug {
    type Key;

    /// Returns every key currently held down, in a deterministic order.
    fn scan(&self) -> InputResult<Vec<Self::Key>>;
}

/// Pins of a 4x4 matrix keypad, by GPIO index.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct KeypadPins {
    pub rows: [usize; 4],
    pub cols: [usize; 4],
    /// Configuration of the driven row lines.
    pub row_config: GpioLineConfig,
    /// Configuration of the sampled column lines.
    pub col_config: GpioLineConfig,
}

impl KeypadPins {
    /// Rows driven high when active, columns pulled down.
    pub const fn new(rows: [usize; 4], cols: [usize; 4]) -> Self {
        Self {
            rows,
            cols,
            row_config: GpioLineConfig::new(),
            col_config: GpioLineConfig::new().with_bias(GpioBias::PullDown),
        }
    }

    pub fn pins(&self) -> impl Iterator<Item = usize> + '_ {
        self.rows.iter().chain(self.cols.iter()).copied()
    }
}

impl Default for KeypadPins {
    fn default() -> Self {
        Self::new([6, 13, 19, 26], [12, 16, 20, 21])
    }
}
