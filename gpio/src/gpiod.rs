//! GpiodDriver implementation for managing GPIO pins using the gpiod library.
//!
//! Active level and bias are handled by the kernel, so values passed through here are already logical.
use crate::claims::PinClaims;
use crate::{
    GpioActiveLevel, GpioBias, GpioBusInput, GpioBusOutput, GpioDriveMode, GpioDriver,
    GpioError, GpioInput, GpioLineConfig, GpioOutput, GpioResult,
};
use log::trace;
use std::fmt::{Debug, Formatter};

/// GpiodDriver is a GPIO driver that uses the Linux GPIO character device.
pub struct GpiodDriver {
    chip: gpiod::Chip,
    claims: PinClaims,
}

impl GpiodDriver {
    pub fn new(chip: gpiod::Chip) -> Self {
        let n = chip.num_lines() as usize;
        Self {
            chip,
            claims: PinClaims::new(n),
        }
    }

    /// Opens the GPIO chip at the given path, e.g. `/dev/gpiochip0`.
    pub fn open(path: &str) -> GpioResult<Self> {
        Ok(Self::new(gpiod::Chip::new(path)?))
    }

    fn check_config(config: GpioLineConfig) -> GpioResult<()> {
        if config.drive_mode != GpioDriveMode::PushPull {
            return Err(GpioError::NotSupported);
        }
        Ok(())
    }

    fn line_ids(indices: &[usize]) -> Vec<u32> {
        indices.iter().map(|&index| index as u32).collect()
    }

    fn request_inputs<const N: usize>(
        &self,
        indices: [usize; N],
        config: GpioLineConfig,
    ) -> GpioResult<GpiodInputs<'_, N>> {
        Self::check_config(config)?;
        self.claims.claim(&indices)?;
        let claim = GpiodClaim { driver: self, pin_indices: indices };

        let lines = self.chip.request_lines(
            gpiod::Options::input(Self::line_ids(&indices))
                .consumer(env!("CARGO_PKG_NAME"))
                .active(config.active_level.into())
                .bias(config.bias.into()),
        )?;

        trace!("{:?} requested as input", claim);
        Ok(GpiodInputs { lines, claim })
    }

    fn request_outputs<const N: usize>(
        &self,
        indices: [usize; N],
        config: GpioLineConfig,
    ) -> GpioResult<GpiodOutputs<'_, N>> {
        Self::check_config(config)?;
        self.claims.claim(&indices)?;
        let claim = GpiodClaim { driver: self, pin_indices: indices };

        let lines = self.chip.request_lines(
            gpiod::Options::output(Self::line_ids(&indices))
                .consumer(env!("CARGO_PKG_NAME"))
                .active(config.active_level.into())
                .bias(config.bias.into()),
        )?;
        lines.set_values([false; N])?;

        trace!("{:?} requested as output", claim);
        Ok(GpiodOutputs { lines, claim })
    }
}

impl Debug for GpiodDriver {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "GpiodDriver({})", self.chip.name())
    }
}

impl GpioDriver for GpiodDriver {
    fn count(&self) -> GpioResult<usize> {
        Ok(self.chip.num_lines() as usize)
    }

    fn get_input(&self, index: usize, config: GpioLineConfig) -> GpioResult<Box<dyn GpioInput + '_>> {
        Ok(Box::new(self.request_inputs([index], config)?))
    }

    fn get_output(&self, index: usize, config: GpioLineConfig) -> GpioResult<Box<dyn GpioOutput + '_>> {
        Ok(Box::new(self.request_outputs([index], config)?))
    }

    fn get_input_bus<const N: usize>(
        &self,
        indices: [usize; N],
        config: GpioLineConfig,
    ) -> GpioResult<Box<dyn GpioBusInput<N> + '_>> {
        Ok(Box::new(self.request_inputs(indices, config)?))
    }

    fn get_output_bus<const N: usize>(
        &self,
        indices: [usize; N],
        config: GpioLineConfig,
    ) -> GpioResult<Box<dyn GpioBusOutput<N> + '_>> {
        Ok(Box::new(self.request_outputs(indices, config)?))
    }
}

impl From<GpioActiveLevel> for gpiod::Active {
    fn from(level: GpioActiveLevel) -> Self {
        match level {
            GpioActiveLevel::High => gpiod::Active::High,
            GpioActiveLevel::Low => gpiod::Active::Low,
        }
    }
}

impl From<GpioBias> for gpiod::Bias {
    fn from(bias: GpioBias) -> Self {
        match bias {
            GpioBias::None => gpiod::Bias::Disable,
            GpioBias::PullUp => gpiod::Bias::PullUp,
            GpioBias::PullDown => gpiod::Bias::PullDown,
        }
    }
}

/// Releases the claimed pins when dropped.
struct GpiodClaim<'a, const N: usize> {
    driver: &'a GpiodDriver,
    pin_indices: [usize; N],
}

impl<const N: usize> Debug for GpiodClaim<'_, N> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}{:?}", self.driver, self.pin_indices)
    }
}

impl<const N: usize> Drop for GpiodClaim<'_, N> {
    fn drop(&mut self) {
        self.driver.claims.release(&self.pin_indices);
    }
}

struct GpiodInputs<'a, const N: usize> {
    // Dropped before the claim so the kernel line is released first.
    lines: gpiod::Lines<gpiod::Input>,
    claim: GpiodClaim<'a, N>,
}

impl<const N: usize> Debug for GpiodInputs<'_, N> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}[input]", self.claim)
    }
}

impl<const N: usize> GpioBusInput<N> for GpiodInputs<'_, N> {
    fn read(&self) -> GpioResult<[bool; N]> {
        let values = self.lines.get_values([false; N])?;
        Ok(values)
    }
}

impl GpioInput for GpiodInputs<'_, 1> {
    fn read(&self) -> GpioResult<bool> {
        let [value] = GpioBusInput::<1>::read(self)?;
        Ok(value)
    }
}

struct GpiodOutputs<'a, const N: usize> {
    lines: gpiod::Lines<gpiod::Output>,
    claim: GpiodClaim<'a, N>,
}

impl<const N: usize> Debug for GpiodOutputs<'_, N> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}[output]", self.claim)
    }
}

impl<const N: usize> GpioBusOutput<N> for GpiodOutputs<'_, N> {
    fn write(&self, values: &[bool; N]) -> GpioResult<()> {
        self.lines.set_values(*values)?;
        Ok(())
    }
}

impl GpioOutput for GpiodOutputs<'_, 1> {
    fn write(&self, value: bool) -> GpioResult<()> {
        GpioBusOutput::<1>::write(self, &[value])
    }
}
