use std::fmt::{Debug, Formatter};
use log::{debug, warn};
use crate::{GpioBusInput, GpioBusOutput, GpioDriver, GpioResult, InputError, InputResult};
use crate::keypad::{KeyMap, Keypad, KeypadKey, KeypadPins};

/// The `GpioKeypad` struct represents a GPIO-based keypad with 4 rows and 4 columns.
///
/// Rows are driven one at a time and the columns are sampled while each row is active,
/// so every row/column intersection can be told apart with 8 lines.
/// Keypads without diodes can report ghost keys when three keys on two rows and two
/// columns are held; those are reported as they are read.
pub struct GpioKeypad<'a> {
    rows: Box<dyn GpioBusOutput<4> + 'a>,
    cols: Box<dyn GpioBusInput<4> + 'a>,
    keymap: KeyMap,
}

impl Debug for GpioKeypad<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "GpioKeypad({:?}, {:?})", self.rows, self.cols)
    }
}

impl<'a> GpioKeypad<'a> {
    /// Claims the row pins as outputs (all inactive) and the column pins as inputs.
    ///
    /// # Errors
    /// - `InputError::HardwareInit` if a pin is out of range, already claimed or cannot be configured.
    pub fn initialize<D: GpioDriver>(driver: &'a D, pins: &KeypadPins, keymap: KeyMap) -> InputResult<Self> {
        let rows = driver
            .get_output_bus(pins.rows, pins.row_config)
            .map_err(InputError::HardwareInit)?;
        rows.clear().map_err(InputError::HardwareInit)?;
        let cols = driver
            .get_input_bus(pins.cols, pins.col_config)
            .map_err(InputError::HardwareInit)?;

        let keypad = GpioKeypad { rows, cols, keymap };
        debug!("{:?} initialized.", keypad);
        Ok(keypad)
    }

    pub fn keymap(&self) -> &KeyMap {
        &self.keymap
    }

    fn scan_row(&self, row: usize, pressed: &mut Vec<KeypadKey>) -> GpioResult<()> {
        let active = ActiveRow::activate(&*self.rows, row)?;

        let values = self.cols.read()?;
        for (col, &value) in values.iter().enumerate() {
            if value {
                if let Some(key) = self.keymap.key_at((row, col)) {
                    pressed.push(key);
                }
            }
        }

        active.deactivate()
    }

    /// Drives every row inactive and releases the pins.
    pub fn shutdown(self) -> InputResult<()> {
        self.rows.clear().map_err(InputError::HardwareRead)?;
        debug!("{:?} shut down.", self);
        Ok(())
    }
}

impl Keypad for GpioKeypad<'_> {
    type Key = KeypadKey;

    /// Scans rows and columns in ascending order, returning pressed keys row by row.
    ///
    /// A failure aborts the whole scan; no partial result is returned and no row stays active.
    fn scan(&self) -> InputResult<Vec<Self::Key>> {
        let mut pressed = Vec::new();

        for row in 0..4 {
            self.scan_row(row, &mut pressed).map_err(InputError::HardwareRead)?;
        }

        Ok(pressed)
    }
}

/// Keeps one keypad row active, deactivating all rows when dropped.
struct ActiveRow<'r> {
    rows: &'r dyn GpioBusOutput<4>,
    active: bool,
}

impl<'r> ActiveRow<'r> {
    fn activate(rows: &'r dyn GpioBusOutput<4>, row: usize) -> GpioResult<Self> {
        // Created before writing, so a half-done write is still undone.
        let guard = ActiveRow { rows, active: true };
        rows.write_one_hot(row)?;
        Ok(guard)
    }

    fn deactivate(mut self) -> GpioResult<()> {
        self.rows.clear()?;
        self.active = false;
        Ok(())
    }
}

impl Drop for ActiveRow<'_> {
    fn drop(&mut self) {
        if self.active {
            if let Err(err) = self.rows.clear() {
                warn!("Failed to deactivate keypad rows {:?}: {}", self.rows, err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockEvent, MockGpioDriver};
    use crate::GpioError;
    use crate::keypad::KeypadKey::*;

    const PINS: KeypadPins = KeypadPins::new([6, 13, 19, 26], [12, 16, 20, 21]);

    #[test]
    fn rows_start_inactive() {
        let driver = MockGpioDriver::default();
        let _keypad = GpioKeypad::initialize(&driver, &PINS, KeyMap::STANDARD).unwrap();
        for row in PINS.rows {
            assert_eq!(driver.driven(row), Some(false));
        }
    }

    #[test]
    fn scan_order_is_row_major() {
        let driver = MockGpioDriver::default();
        let keypad = GpioKeypad::initialize(&driver, &PINS, KeyMap::STANDARD).unwrap();
        driver.start_trace();

        keypad.scan().unwrap();

        let trace = driver.take_trace();
        let mut expected = Vec::new();
        for row in 0..4 {
            for (i, &pin) in PINS.rows.iter().enumerate() {
                expected.push(MockEvent::Write(pin, Some(i == row)));
            }
            for &pin in &PINS.cols {
                expected.push(MockEvent::Read(pin));
            }
            for &pin in &PINS.rows {
                expected.push(MockEvent::Write(pin, Some(false)));
            }
        }
        assert_eq!(trace, expected);
    }

    #[test]
    fn keys_on_separate_rows_and_columns() {
        let driver = MockGpioDriver::default();
        let keypad = GpioKeypad::initialize(&driver, &PINS, KeyMap::STANDARD).unwrap();

        driver.connect(PINS.rows[0], PINS.cols[3]);
        driver.connect(PINS.rows[3], PINS.cols[0]);
        driver.connect(PINS.rows[2], PINS.cols[2]);

        assert_eq!(keypad.scan().unwrap(), vec![KeyA, Key9, KeyAsterisk]);
    }

    #[test]
    fn failed_read_leaves_no_row_active() {
        let driver = MockGpioDriver::default();
        let keypad = GpioKeypad::initialize(&driver, &PINS, KeyMap::STANDARD).unwrap();
        driver.connect(PINS.rows[0], PINS.cols[0]);

        // Row 0 reads fine, row 1 fails.
        driver.fail_reads_after(Some(5));
        assert_eq!(
            keypad.scan(),
            Err(InputError::HardwareRead(GpioError::Io(std::io::ErrorKind::Other)))
        );
        for row in PINS.rows {
            assert_eq!(driver.driven(row), Some(false));
        }

        driver.fail_reads_after(None);
        assert_eq!(keypad.scan().unwrap(), vec![Key1]);
    }

    #[test]
    fn failed_activation_aborts_scan() {
        let driver = MockGpioDriver::default();
        let keypad = GpioKeypad::initialize(&driver, &PINS, KeyMap::STANDARD).unwrap();

        driver.set_fail_writes(true);
        assert!(matches!(keypad.scan(), Err(InputError::HardwareRead(_))));
    }

    #[test]
    fn active_low_wiring() {
        use crate::{GpioActiveLevel, GpioBias, GpioDriveMode, GpioLineConfig};

        let pins = KeypadPins {
            row_config: GpioLineConfig::new()
                .with_active_level(GpioActiveLevel::Low)
                .with_drive_mode(GpioDriveMode::OpenDrain),
            col_config: GpioLineConfig::new()
                .with_active_level(GpioActiveLevel::Low)
                .with_bias(GpioBias::PullUp),
            ..PINS
        };
        let driver = MockGpioDriver::default();
        let keypad = GpioKeypad::initialize(&driver, &pins, KeyMap::STANDARD).unwrap();
        assert!(keypad.scan().unwrap().is_empty());

        driver.connect(pins.rows[1], pins.cols[1]);
        assert_eq!(keypad.scan().unwrap(), vec![Key5]);
    }

    #[test]
    fn pins_cannot_be_claimed_twice() {
        let driver = MockGpioDriver::default();
        let keypad = GpioKeypad::initialize(&driver, &PINS, KeyMap::STANDARD).unwrap();
        assert_eq!(
            GpioKeypad::initialize(&driver, &PINS, KeyMap::STANDARD).unwrap_err(),
            InputError::HardwareInit(GpioError::AlreadyInUse(6))
        );

        keypad.shutdown().unwrap();
        assert!(PINS.pins().all(|pin| !driver.is_claimed(pin)));
        assert!(GpioKeypad::initialize(&driver, &PINS, KeyMap::STANDARD).is_ok());
    }
}
