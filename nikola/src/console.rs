use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use log::{debug, info, warn};
use nikola_gpio::keypad::{Keypad, KeypadKey};
use nikola_gpio::rotenc::RotEnc;
use nikola_gpio::InputResult;

/// What changed on the inputs during one tick.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ConsoleEvent {
    Keys(Vec<KeypadKey>),
    Position(i64),
    ButtonPressed,
    ButtonReleased,
}

impl ConsoleEvent {
    pub fn message(&self) -> String {
        match self {
            ConsoleEvent::Keys(keys) => format!(
                "Keypad = [{}]",
                keys.iter().map(|key| key.to_string()).collect::<Vec<_>>().join(",")
            ),
            ConsoleEvent::Position(position) => format!("Rotary encoder position = {}", position),
            ConsoleEvent::ButtonPressed => "Button pressed".to_string(),
            ConsoleEvent::ButtonReleased => "Button released".to_string(),
        }
    }
}

/// Text console reporting keypad and rotary encoder changes.
pub struct Console<'a, K: Keypad<Key = KeypadKey>> {
    keypad: &'a K,
    rot_enc: &'a RotEnc<'a>,
    prev_keys: Vec<KeypadKey>,
    prev_position: Option<i64>,
    prev_button: bool,
}

impl<'a, K: Keypad<Key = KeypadKey>> Console<'a, K> {
    pub fn new(keypad: &'a K, rot_enc: &'a RotEnc<'a>) -> Self {
        Self {
            keypad,
            rot_enc,
            prev_keys: Vec::new(),
            prev_position: None,
            prev_button: false,
        }
    }

    /// Reads every input once and returns what changed since the last tick.
    ///
    /// Pressing the encoder button zeroes the position.
    pub fn tick(&mut self) -> InputResult<Vec<ConsoleEvent>> {
        let mut events = Vec::new();

        let keys = self.keypad.scan()?;
        if keys != self.prev_keys {
            events.push(ConsoleEvent::Keys(keys.clone()));
            self.prev_keys = keys;
        }

        let button = self.rot_enc.button_pressed()?;
        if button != self.prev_button {
            if button {
                self.rot_enc.set_position(0);
                events.push(ConsoleEvent::ButtonPressed);
            } else {
                events.push(ConsoleEvent::ButtonReleased);
            }
            self.prev_button = button;
        }

        let position = self.rot_enc.position();
        if self.prev_position != Some(position) {
            events.push(ConsoleEvent::Position(position));
            self.prev_position = Some(position);
        }

        Ok(events)
    }

    /// Prints changes every `interval` until `quit` is set or a non-transient error occurs.
    pub fn run(&mut self, interval: Duration, quit: &AtomicBool) -> InputResult<()> {
        while !quit.load(Ordering::Relaxed) {
            match self.tick() {
                Ok(events) => {
                    for event in events {
                        println!("{}", event.message());
                    }
                }
                Err(err) if err.is_transient() => warn!("Skipping tick: {}", err),
                Err(err) => return Err(err),
            }

            thread::sleep(interval);
        }

        debug!("Console stopped.");
        Ok(())
    }
}

/// Sets `quit` once a line reading `q` arrives on `input`.
///
/// Returns without setting it when the input ends or fails, so a detached stdin never stops the console.
pub fn wait_for_quit(input: impl BufRead, quit: &AtomicBool) {
    for line in input.lines() {
        match line {
            Ok(line) if line.trim().eq_ignore_ascii_case("q") => {
                info!("Quitting...");
                quit.store(true, Ordering::Relaxed);
                return;
            }
            Ok(_) => {}
            Err(err) => {
                warn!("Cannot read commands: {}", err);
                return;
            }
        }
    }
    debug!("No more commands.");
}

#[cfg(test)]
mod tests {
    use super::*;
    use nikola_gpio::keypad::{GpioKeypad, KeyMap};
    use nikola_gpio::mock::MockGpioDriver;
    use nikola_gpio::pins::PinAssignment;
    use nikola_gpio::keypad::KeypadKey::*;

    #[test]
    fn reports_changes_only() {
        let driver = MockGpioDriver::default();
        let pins = PinAssignment::default();
        let keypad = GpioKeypad::initialize(&driver, &pins.keypad, KeyMap::STANDARD).unwrap();
        let rot_enc = RotEnc::initialize(&driver, &pins.rot_enc).unwrap();
        let mut console = Console::new(&keypad, &rot_enc);

        assert_eq!(console.tick().unwrap(), vec![ConsoleEvent::Position(0)]);
        assert!(console.tick().unwrap().is_empty());

        driver.connect(pins.keypad.rows[2], pins.keypad.cols[1]);
        driver.connect(pins.keypad.rows[3], pins.keypad.cols[2]);
        assert_eq!(console.tick().unwrap(), vec![ConsoleEvent::Keys(vec![Key8, KeyHash])]);

        rot_enc.set_position(7);
        assert_eq!(console.tick().unwrap(), vec![ConsoleEvent::Position(7)]);

        driver.set_level(pins.rot_enc.pin_button, true);
        assert_eq!(
            console.tick().unwrap(),
            vec![ConsoleEvent::ButtonPressed, ConsoleEvent::Position(0)]
        );

        driver.set_level(pins.rot_enc.pin_button, false);
        assert_eq!(console.tick().unwrap(), vec![ConsoleEvent::ButtonReleased]);
    }

    #[test]
    fn run_returns_once_quit_is_set() {
        let driver = MockGpioDriver::default();
        let pins = PinAssignment::default();
        let keypad = GpioKeypad::initialize(&driver, &pins.keypad, KeyMap::STANDARD).unwrap();
        let rot_enc = RotEnc::initialize(&driver, &pins.rot_enc).unwrap();
        let quit = AtomicBool::new(false);

        let result = thread::scope(|s| {
            let console = s.spawn(|| Console::new(&keypad, &rot_enc).run(Duration::from_millis(1), &quit));
            thread::sleep(Duration::from_millis(20));
            quit.store(true, Ordering::Relaxed);
            console.join()
        });

        assert_eq!(result.unwrap(), Ok(()));
        keypad.shutdown().unwrap();
        rot_enc.shutdown();
        assert!(pins.pins().all(|pin| !driver.is_claimed(pin)));
    }

    #[test]
    fn run_keeps_going_through_read_errors() {
        let driver = MockGpioDriver::default();
        let pins = PinAssignment::default();
        let keypad = GpioKeypad::initialize(&driver, &pins.keypad, KeyMap::STANDARD).unwrap();
        let rot_enc = RotEnc::initialize(&driver, &pins.rot_enc).unwrap();
        let quit = AtomicBool::new(false);
        driver.set_fail_reads(true);

        let result = thread::scope(|s| {
            let console = s.spawn(|| Console::new(&keypad, &rot_enc).run(Duration::from_millis(1), &quit));
            thread::sleep(Duration::from_millis(20));
            let running = !console.is_finished();
            quit.store(true, Ordering::Relaxed);
            (running, console.join())
        });

        assert!(result.0);
        assert_eq!(result.1.unwrap(), Ok(()));
    }

    #[test]
    fn quit_command() {
        let quit = AtomicBool::new(false);
        wait_for_quit("hello\n\n".as_bytes(), &quit);
        assert!(!quit.load(Ordering::Relaxed));

        wait_for_quit("x\n  Q \nnever read\n".as_bytes(), &quit);
        assert!(quit.load(Ordering::Relaxed));
    }

    #[test]
    fn messages() {
        assert_eq!(ConsoleEvent::Keys(vec![Key1, KeyD]).message(), "Keypad = [1,D]");
        assert_eq!(ConsoleEvent::Keys(vec![]).message(), "Keypad = []");
        assert_eq!(ConsoleEvent::Position(-3).message(), "Rotary encoder position = -3");
    }
}
