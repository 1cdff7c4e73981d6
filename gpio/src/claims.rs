use crate::{GpioError, GpioResult};
use bitvec::vec::BitVec;
use log::trace;
use std::fmt::{Debug, Formatter};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Tracks which pins of a driver are currently claimed.
pub struct PinClaims {
    used_pins: Mutex<BitVec>,
}

impl PinClaims {
    pub fn new(count: usize) -> Self {
        Self {
            used_pins: Mutex::new(BitVec::repeat(false, count)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BitVec> {
        self.used_pins.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn count(&self) -> usize {
        self.lock().len()
    }

    /// Claims all of the given pins, or none of them.
    ///
    /// # Errors
    /// - `GpioError::InvalidArgument` if an index is out of range.
    /// - `GpioError::AlreadyInUse` if a pin is already claimed, or listed twice.
    pub fn claim(&self, indices: &[usize]) -> GpioResult<()> {
        let mut used = self.lock();
        let n = used.len();

        if indices.iter().any(|&index| index >= n) {
            return Err(GpioError::InvalidArgument);
        }

        for (i, &index) in indices.iter().enumerate() {
            if used[index] || indices[..i].contains(&index) {
                return Err(GpioError::AlreadyInUse(index));
            }
        }

        for &index in indices {
            used.set(index, true);
        }
        trace!("Claimed pins {:?}", indices);

        Ok(())
    }

    pub fn release(&self, indices: &[usize]) {
        let mut used = self.lock();
        for &index in indices {
            if index < used.len() {
                used.set(index, false);
            }
        }
        trace!("Released pins {:?}", indices);
    }

    pub fn is_claimed(&self, index: usize) -> bool {
        self.lock().get(index).map(|bit| *bit).unwrap_or(false)
    }
}

impl Debug for PinClaims {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let used = self.lock();
        write!(f, "PinClaims({}/{})", used.count_ones(), used.len())
    }
}
