mod table;

use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;
use log::{debug, trace, warn};
use crate::{GpioActiveLevel, GpioBias, GpioDriver, GpioInput, GpioLineConfig, GpioResult, InputError, InputResult};
pub use table::*;

/// Pins of a quadrature rotary encoder with a push button, by GPIO index.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RotEncPins {
    pub pin_a: usize,
    pub pin_b: usize,
    pub pin_button: usize,
    /// Configuration of both quadrature channels.
    pub channel_config: GpioLineConfig,
    pub button_config: GpioLineConfig,
}

impl RotEncPins {
    /// Channels pulled up and active low, button as a plain active-high input.
    pub const fn new(pin_a: usize, pin_b: usize, pin_button: usize) -> Self {
        Self {
            pin_a,
            pin_b,
            pin_button,
            channel_config: GpioLineConfig::new()
                .with_bias(GpioBias::PullUp)
                .with_active_level(GpioActiveLevel::Low),
            button_config: GpioLineConfig::new(),
        }
    }

    pub fn pins(&self) -> [usize; 3] {
        [self.pin_a, self.pin_b, self.pin_button]
    }
}

impl Default for RotEncPins {
    fn default() -> Self {
        Self::new(17, 27, 22)
    }
}

/// Tracks the position of a quadrature rotary encoder and reads its push button.
///
/// The position is updated by [RotEnc::on_change], which must run whenever channel A or B
/// changes level. [RotEnc::poll] and [RotEnc::watch] detect those changes by sampling.
/// All methods take `&self`, so the encoder can be watched from one thread and read from another.
pub struct RotEnc<'a> {
    pin_a: Box<dyn GpioInput + 'a>,
    pin_b: Box<dyn GpioInput + 'a>,
    button: Box<dyn GpioInput + 'a>,
    state: Mutex<EncoderState>,
}

impl Debug for RotEnc<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "RotEnc({:?}, {:?}, button {:?})", self.pin_a, self.pin_b, self.button)
    }
}

impl<'a> RotEnc<'a> {
    /// Claims the channel pins and the button pin.
    ///
    /// # Errors
    /// - `InputError::HardwareInit` if a pin is out of range, already claimed or cannot be configured.
    pub fn initialize<D: GpioDriver>(driver: &'a D, pins: &RotEncPins) -> InputResult<Self> {
        let pin_a = driver
            .get_input(pins.pin_a, pins.channel_config)
            .map_err(InputError::HardwareInit)?;
        let pin_b = driver
            .get_input(pins.pin_b, pins.channel_config)
            .map_err(InputError::HardwareInit)?;
        let button = driver
            .get_input(pins.pin_button, pins.button_config)
            .map_err(InputError::HardwareInit)?;

        let rot_enc = RotEnc {
            pin_a,
            pin_b,
            button,
            state: Mutex::new(EncoderState::default()),
        };
        debug!("{:?} initialized.", rot_enc);
        Ok(rot_enc)
    }

    fn state(&self) -> MutexGuard<'_, EncoderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn read_raw(&self) -> GpioResult<(bool, bool)> {
        let a = self.pin_a.read()?;
        let b = self.pin_b.read()?;
        Ok((a, b))
    }

    /// Handles a level change on channel A or B.
    ///
    /// Samples both channels and moves the position by the transition from the previous sample.
    ///
    /// The channels are sampled while the state lock is held, so samples are applied in the order
    /// they were taken and concurrent calls never interleave. [RotEnc::position] and
    /// [RotEnc::set_position] wait for at most one such sample.
    pub fn on_change(&self) -> InputResult<()> {
        let mut state = self.state();
        let (a, b) = self.read_raw().map_err(InputError::HardwareRead)?;
        Self::apply(&mut state, a, b);
        Ok(())
    }

    /// Samples the channels and runs the change handler if either one moved since the last sample.
    ///
    /// Returns whether an edge was seen. Samples under the state lock, like [RotEnc::on_change].
    pub fn poll(&self) -> InputResult<bool> {
        let mut state = self.state();
        let current = self.read_raw().map_err(InputError::HardwareRead)?;
        if current == state.previous() {
            return Ok(false);
        }

        Self::apply(&mut state, current.0, current.1);
        Ok(true)
    }

    fn apply(state: &mut EncoderState, a: bool, b: bool) {
        let previous = state.previous();
        let delta = state.apply(a, b);
        trace!(
            "Encoder {:?} -> {:?}: {:+} (position {})",
            previous, (a, b), delta, state.position
        );
    }

    /// Polls the channels every `interval` until `stop` is set.
    ///
    /// Meant to run on its own thread, e.g. with [std::thread::scope]. Read errors are logged and
    /// the next poll tries again.
    pub fn watch(&self, stop: &AtomicBool, interval: Duration) {
        debug!("Watching {:?} every {:?}.", self, interval);
        while !stop.load(Ordering::Relaxed) {
            if let Err(err) = self.poll() {
                warn!("Encoder poll failed: {}", err);
            }
            thread::sleep(interval);
        }
        debug!("Stopped watching {:?}.", self);
    }

    /// Gets the accumulated position.
    pub fn position(&self) -> i64 {
        self.state().position
    }

    /// Overwrites the position, e.g. to zero the dial at a reference point.
    ///
    /// The last sampled channel levels are kept, so the next step is still decoded correctly.
    pub fn set_position(&self, position: i64) {
        self.state().position = position;
    }

    /// Reads the live level of the push button. Not debounced.
    pub fn button_pressed(&self) -> InputResult<bool> {
        self.button.read().map_err(InputError::HardwareRead)
    }

    /// Releases the pins.
    pub fn shutdown(self) {
        debug!("{:?} shut down at position {}.", self, self.position());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockGpioDriver;
    use crate::GpioError;

    const PINS: RotEncPins = RotEncPins::new(17, 27, 22);

    /// Sets the logical channel levels. Channels are active low.
    fn turn_to(driver: &MockGpioDriver, a: bool, b: bool) {
        driver.set_level(PINS.pin_a, !a);
        driver.set_level(PINS.pin_b, !b);
    }

    #[test]
    fn starts_at_zero_with_idle_channels() {
        let driver = MockGpioDriver::default();
        let rot_enc = RotEnc::initialize(&driver, &PINS).unwrap();
        assert_eq!(rot_enc.position(), 0);
        // Pulled up and active low, so idle channels read as 00.
        assert_eq!(rot_enc.read_raw().unwrap(), (false, false));
        assert!(!rot_enc.poll().unwrap());
    }

    #[test]
    fn edges_move_position() {
        let driver = MockGpioDriver::default();
        let rot_enc = RotEnc::initialize(&driver, &PINS).unwrap();

        for (a, b) in [(true, false), (true, true), (false, true)] {
            turn_to(&driver, a, b);
            rot_enc.on_change().unwrap();
        }
        assert_eq!(rot_enc.position(), 3);

        // Ambiguous jump from 01 to 10.
        turn_to(&driver, true, false);
        rot_enc.on_change().unwrap();
        assert_eq!(rot_enc.position(), 3);
    }

    #[test]
    fn set_position_keeps_previous_sample() {
        let driver = MockGpioDriver::default();
        let rot_enc = RotEnc::initialize(&driver, &PINS).unwrap();

        rot_enc.set_position(5);
        assert_eq!(rot_enc.position(), 5);

        turn_to(&driver, true, false);
        assert!(rot_enc.poll().unwrap());
        assert_eq!(rot_enc.position(), 6);
    }

    #[test]
    fn poll_ignores_unchanged_levels() {
        let driver = MockGpioDriver::default();
        let rot_enc = RotEnc::initialize(&driver, &PINS).unwrap();

        turn_to(&driver, false, true);
        assert!(rot_enc.poll().unwrap());
        assert!(!rot_enc.poll().unwrap());
        assert_eq!(rot_enc.position(), -1);
    }

    #[test]
    fn button_is_pass_through() {
        let driver = MockGpioDriver::default();
        let rot_enc = RotEnc::initialize(&driver, &PINS).unwrap();

        assert!(!rot_enc.button_pressed().unwrap());
        driver.set_level(PINS.pin_button, true);
        assert!(rot_enc.button_pressed().unwrap());
        driver.set_level(PINS.pin_button, false);
        assert!(!rot_enc.button_pressed().unwrap());
        driver.set_level(PINS.pin_button, true);
        assert!(rot_enc.button_pressed().unwrap());
    }

    #[test]
    fn read_failure_leaves_state_alone() {
        let driver = MockGpioDriver::default();
        let rot_enc = RotEnc::initialize(&driver, &PINS).unwrap();

        turn_to(&driver, true, false);
        driver.set_fail_reads(true);
        assert_eq!(
            rot_enc.on_change(),
            Err(InputError::HardwareRead(GpioError::Io(std::io::ErrorKind::Other)))
        );
        assert!(rot_enc.button_pressed().is_err());

        driver.set_fail_reads(false);
        rot_enc.on_change().unwrap();
        assert_eq!(rot_enc.position(), 1);
    }

    #[test]
    fn concurrent_edges_count_once() {
        let driver = MockGpioDriver::default();
        let rot_enc = RotEnc::initialize(&driver, &PINS).unwrap();

        // A single step from 00 to 10, seen by every thread.
        turn_to(&driver, true, false);
        thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..100 {
                        rot_enc.on_change().unwrap();
                        rot_enc.poll().unwrap();
                    }
                });
            }
        });

        assert_eq!(rot_enc.position(), 1);
        assert_eq!(rot_enc.read_raw().unwrap(), (true, false));
        assert!(!rot_enc.poll().unwrap());
    }

    #[test]
    fn button_pin_cannot_be_shared() {
        let driver = MockGpioDriver::default();
        let pins = RotEncPins::new(17, 27, 17);
        assert_eq!(
            RotEnc::initialize(&driver, &pins).unwrap_err(),
            InputError::HardwareInit(GpioError::AlreadyInUse(17))
        );
        // The channels claimed before the failure were released again.
        assert!(!driver.is_claimed(17));
        assert!(!driver.is_claimed(27));
    }
}
