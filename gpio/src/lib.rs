pub mod claims;
pub mod gpiod;
pub mod keypad;
pub mod mock;
pub mod pins;
pub mod raw;
pub mod rotenc;

use std::fmt::Debug;
use thiserror::Error;

#[derive(Debug, Error, Eq, PartialEq, Clone)]
pub enum GpioError {
    #[error("pin {0} already in use")]
    AlreadyInUse(usize),
    #[error("invalid argument")]
    InvalidArgument,
    #[error("the feature is not supported on this backend")]
    NotSupported,
    #[error("IO error: {0}")]
    Io(std::io::ErrorKind),
    #[error("error: {0}")]
    Other(String),
}

impl From<std::io::Error> for GpioError {
    fn from(err: std::io::Error) -> Self {
        GpioError::Io(err.kind())
    }
}

pub type GpioResult<T> = Result<T, GpioError>;

/// Errors reported by the input devices (keypad and rotary encoder).
#[derive(Debug, Error, Eq, PartialEq, Clone)]
pub enum InputError {
    /// A required pin could not be claimed or configured.
    ///
    /// The device must not be used.
    #[error("hardware initialization failed: {0}")]
    HardwareInit(#[source] GpioError),
    /// A pin read or write failed while the device was in use.
    ///
    /// The operation was aborted and may be retried.
    #[error("hardware read failed: {0}")]
    HardwareRead(#[source] GpioError),
}

impl InputError {
    /// Whether retrying the failed operation on the next tick makes sense.
    pub fn is_transient(&self) -> bool {
        matches!(self, InputError::HardwareRead(_))
    }
}

pub type InputResult<T> = Result<T, InputError>;

/// A source of GPIO lines.
///
/// Every `get_*` call claims the requested lines; the claim is released when the returned
/// handle is dropped. Asking for a line that is already claimed fails with
/// [`GpioError::AlreadyInUse`].
pub trait GpioDriver: Debug {
    /// Gets the amount of GPIO pins available.
    fn count(&self) -> GpioResult<usize>;

    /// Claims the GPIO pin at the given index as an input.
    fn get_input(
        &self,
        index: usize,
        config: GpioLineConfig,
    ) -> GpioResult<Box<dyn GpioInput + '_>>;

    /// Claims the GPIO pin at the given index as an output.
    fn get_output(
        &self,
        index: usize,
        config: GpioLineConfig,
    ) -> GpioResult<Box<dyn GpioOutput + '_>>;

    /// Claims the GPIO pins at the given indices as an input bus.
    ///
    /// Either all pins are claimed or none is.
    fn get_input_bus<const N: usize>(
        &self,
        indices: [usize; N],
        config: GpioLineConfig,
    ) -> GpioResult<Box<dyn GpioBusInput<N> + '_>>;

    /// Claims the GPIO pins at the given indices as an output bus.
    ///
    /// Either all pins are claimed or none is.
    fn get_output_bus<const N: usize>(
        &self,
        indices: [usize; N],
        config: GpioLineConfig,
    ) -> GpioResult<Box<dyn GpioBusOutput<N> + '_>>;
}

/// Specifies the active level of the GPIO pin.
///
/// By default, the active level is high.
///
/// Might be software-implemented.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum GpioActiveLevel {
    #[default] High,
    Low,
}

impl GpioActiveLevel {
    /// Converts between the logical value and the real state of the GPIO pin.
    ///
    /// The conversion is its own inverse, so it works for both reading and writing.
    pub fn get_state(&self, value: bool) -> bool {
        match self {
            GpioActiveLevel::High => value,
            GpioActiveLevel::Low => !value,
        }
    }
}

/// Specifies the bias of the GPIO pin.
///
/// You can use this to enable pull-up or pull-down resistors.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum GpioBias {
    #[default] None,
    PullUp,
    PullDown,
}

/// Specifies the drive mode of the GPIO pin.
///
/// Works only in output mode.
///
/// By default, the drive mode is push-pull, which drives the pin high or low with low impedance.
/// There's also open-drain and open-source modes, that leave the pin floating when the output is high or low, respectively.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum GpioDriveMode {
    /// GPIO pin is driven high or low with low impedance.
    #[default] PushPull,
    /// GPIO pin is driven low or left floating when high.
    OpenDrain,
    /// GPIO pin is driven high or left floating when low.
    OpenSource,
}

impl GpioDriveMode {
    /// Gets the real state that will be outputted on the GPIO pin based on the drive mode and the value.
    ///
    /// # Returns
    /// - `Some(true)` if the pin will be driven high.
    /// - `Some(false)` if the pin will be driven low.
    /// - `None` if the pin will be left floating.
    pub fn get_state(&self, value: bool) -> Option<bool> {
        match self {
            GpioDriveMode::PushPull => Some(value),
            GpioDriveMode::OpenDrain => if value { None } else { Some(false) },
            GpioDriveMode::OpenSource => if value { Some(true) } else { None },
        }
    }
}

/// Electrical configuration applied to a line when it is claimed.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct GpioLineConfig {
    pub active_level: GpioActiveLevel,
    pub bias: GpioBias,
    pub drive_mode: GpioDriveMode,
}

impl GpioLineConfig {
    pub const fn new() -> Self {
        Self {
            active_level: GpioActiveLevel::High,
            bias: GpioBias::None,
            drive_mode: GpioDriveMode::PushPull,
        }
    }

    pub const fn with_active_level(mut self, level: GpioActiveLevel) -> Self {
        self.active_level = level;
        self
    }

    pub const fn with_bias(mut self, bias: GpioBias) -> Self {
        self.bias = bias;
        self
    }

    pub const fn with_drive_mode(mut self, mode: GpioDriveMode) -> Self {
        self.drive_mode = mode;
        self
    }

    /// Gets the physical level to drive for a logical output value, or `None` to leave the line floating.
    pub fn output_state(&self, value: bool) -> Option<bool> {
        self.drive_mode.get_state(self.active_level.get_state(value))
    }

    /// Gets the logical value for a physical input level.
    pub fn input_value(&self, level: bool) -> bool {
        self.active_level.get_state(level)
    }
}

pub trait GpioInput: Debug + Send + Sync {
    /// Reads the logical state of the GPIO pin.
    fn read(&self) -> GpioResult<bool>;
}

pub trait GpioOutput: Debug + Send + Sync {
    /// Writes the logical state of the GPIO pin.
    fn write(&self, value: bool) -> GpioResult<()>;
}

pub trait GpioBusInput<const N: usize>: Debug + Send + Sync {
    /// Reads the logical states of the bus, sampling the lines in bus order.
    fn read(&self) -> GpioResult<[bool; N]>;
}

pub trait GpioBusOutput<const N: usize>: Debug + Send + Sync {
    /// Writes the logical states of the bus, in bus order.
    fn write(&self, values: &[bool; N]) -> GpioResult<()>;
}

impl<const N: usize> dyn GpioBusOutput<N> + '_ {
    /// Activates exactly one line of the bus, deactivating all others.
    pub fn write_one_hot(&self, index: usize) -> GpioResult<()> {
        if index >= N {
            return Err(GpioError::InvalidArgument);
        }

        let mut values = [false; N];
        values[index] = true;
        self.write(&values)
    }

    /// Deactivates every line of the bus.
    pub fn clear(&self) -> GpioResult<()> {
        self.write(&[false; N])
    }
}
