use std::env::{var, var_os};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use log::debug;
use nikola_gpio::keypad::{KeyMap, KeypadPins};
use nikola_gpio::pins::PinAssignment;
use nikola_gpio::rotenc::RotEncPins;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {name}")]
    InvalidValue { name: &'static str, value: String },
    #[error("invalid key map: {0:?}")]
    InvalidKeyMap(Vec<String>),
    #[error("invalid pin assignment: {0}")]
    InvalidPins(#[from] nikola_gpio::GpioError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Which GPIO driver to talk to the pins with.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Registers mapped through `/dev/gpiomem`.
    Gpiomem,
    /// Registers mapped through `/dev/mem`, needs root.
    Mem,
    /// The GPIO character device.
    Gpiod,
    /// No hardware at all, nothing is ever pressed.
    Mock,
}

impl Backend {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "gpiomem" => Some(Backend::Gpiomem),
            "mem" => Some(Backend::Mem),
            "gpiod" => Some(Backend::Gpiod),
            "mock" => Some(Backend::Mock),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
pub struct KeypadConfig {
    pub rows: [usize; 4],
    pub cols: [usize; 4],
    /// Labels of each row, e.g. `"123A"`.
    pub keys: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
pub struct EncoderConfig {
    pub pin_a: usize,
    pub pin_b: usize,
    pub pin_button: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(default)]
pub struct Config {
    pub backend: Backend,
    pub gpio_chip: String,
    pub keypad: KeypadConfig,
    pub encoder: EncoderConfig,
    /// How often the console loop runs, in milliseconds.
    pub tick_ms: u64,
    /// How often the encoder channels are sampled, in microseconds.
    pub encoder_poll_us: u64,
}

impl Config {
    fn path() -> PathBuf {
        let config_str = var_os("CONFIG_FILE");
        let config_str: &OsStr = config_str.as_deref().unwrap_or(OsStr::new("config.json"));
        Path::new(config_str).to_path_buf()
    }

    /// Loads the config file, or `None` if there is none.
    pub fn try_load() -> Result<Option<Self>, ConfigError> {
        let config_path = Self::path();
        if !config_path.exists() {
            return Ok(None);
        }

        debug!("Loading config from {}", config_path.display());
        let file = std::fs::File::open(config_path)?;
        let reader = std::io::BufReader::new(file);
        Ok(Some(serde_json::from_reader(reader)?))
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let file = std::fs::File::create(Self::path())?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Applies `NIKOLA_*` environment variables on top of the loaded values.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(value) = var("NIKOLA_GPIO_BACKEND") {
            self.backend = Backend::parse(&value)
                .ok_or(ConfigError::InvalidValue { name: "NIKOLA_GPIO_BACKEND", value })?;
        }
        if let Ok(value) = var("NIKOLA_GPIO_CHIP") {
            self.gpio_chip = value;
        }
        if let Ok(value) = var("NIKOLA_KEYPAD_PINS_ROWS") {
            self.keypad.rows = parse_pin_bus("NIKOLA_KEYPAD_PINS_ROWS", &value)?;
        }
        if let Ok(value) = var("NIKOLA_KEYPAD_PINS_COLS") {
            self.keypad.cols = parse_pin_bus("NIKOLA_KEYPAD_PINS_COLS", &value)?;
        }
        if let Ok(value) = var("NIKOLA_ENCODER_PIN_A") {
            self.encoder.pin_a = parse_pin("NIKOLA_ENCODER_PIN_A", &value)?;
        }
        if let Ok(value) = var("NIKOLA_ENCODER_PIN_B") {
            self.encoder.pin_b = parse_pin("NIKOLA_ENCODER_PIN_B", &value)?;
        }
        if let Ok(value) = var("NIKOLA_ENCODER_PIN_BUTTON") {
            self.encoder.pin_button = parse_pin("NIKOLA_ENCODER_PIN_BUTTON", &value)?;
        }
        Ok(())
    }

    /// Builds the pin assignment, checking that no pin is used twice.
    pub fn pins(&self) -> Result<PinAssignment, ConfigError> {
        let pins = PinAssignment {
            keypad: KeypadPins::new(self.keypad.rows, self.keypad.cols),
            rot_enc: RotEncPins::new(self.encoder.pin_a, self.encoder.pin_b, self.encoder.pin_button),
        };
        pins.validate()?;
        Ok(pins)
    }

    pub fn keymap(&self) -> Result<KeyMap, ConfigError> {
        KeyMap::parse(self.keypad.keys.as_slice()).map_err(|_| ConfigError::InvalidKeyMap(self.keypad.keys.clone()))
    }

    /// Console tick interval. Zero is rejected, the loop would never sleep.
    pub fn tick(&self) -> Result<Duration, ConfigError> {
        non_zero("tick_ms", self.tick_ms).map(Duration::from_millis)
    }

    /// Encoder sampling interval. Zero is rejected, the watcher would never sleep.
    pub fn encoder_poll_interval(&self) -> Result<Duration, ConfigError> {
        non_zero("encoder_poll_us", self.encoder_poll_us).map(Duration::from_micros)
    }
}

impl Default for Config {
    fn default() -> Self {
        let pins = PinAssignment::default();
        Config {
            backend: Backend::Gpiomem,
            gpio_chip: "/dev/gpiochip0".to_string(),
            keypad: KeypadConfig {
                rows: pins.keypad.rows,
                cols: pins.keypad.cols,
                keys: ["123A", "456B", "789C", "*0#D"].map(String::from).to_vec(),
            },
            encoder: EncoderConfig {
                pin_a: pins.rot_enc.pin_a,
                pin_b: pins.rot_enc.pin_b,
                pin_button: pins.rot_enc.pin_button,
            },
            tick_ms: 10,
            encoder_poll_us: 500,
        }
    }
}

fn non_zero(name: &'static str, value: u64) -> Result<u64, ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidValue { name, value: value.to_string() });
    }
    Ok(value)
}

fn parse_pin(name: &'static str, value: &str) -> Result<usize, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue { name, value: value.to_string() })
}

/// Parses four pin numbers separated by commas, semicolons or spaces.
pub fn parse_pin_bus(name: &'static str, value: &str) -> Result<[usize; 4], ConfigError> {
    let invalid = || ConfigError::InvalidValue { name, value: value.to_string() };
    value
        .split([',', ' ', ';'])
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<usize>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| invalid())?
        .try_into()
        .map_err(|_| invalid())
}
