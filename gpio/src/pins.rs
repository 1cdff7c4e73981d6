use crate::keypad::KeypadPins;
use crate::rotenc::RotEncPins;
use crate::{GpioError, GpioResult};

/// Where the keypad and the rotary encoder are wired.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct PinAssignment {
    pub keypad: KeypadPins,
    pub rot_enc: RotEncPins,
}

impl PinAssignment {
    pub fn pins(&self) -> impl Iterator<Item = usize> + '_ {
        self.keypad.pins().chain(self.rot_enc.pins())
    }

    /// Checks that no pin serves two roles.
    ///
    /// # Errors
    /// - `GpioError::AlreadyInUse` with the first pin found twice.
    pub fn validate(&self) -> GpioResult<()> {
        let mut seen = Vec::new();
        for pin in self.pins() {
            if seen.contains(&pin) {
                return Err(GpioError::AlreadyInUse(pin));
            }
            seen.push(pin);
        }
        Ok(())
    }
}
