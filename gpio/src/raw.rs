//! Direct register access to the BCM283x GPIO block through a memory mapping.
use crate::claims::PinClaims;
use crate::{GpioBias, GpioBusInput, GpioBusOutput, GpioDriver, GpioError, GpioInput, GpioLineConfig, GpioOutput, GpioResult};
use log::trace;
use memmap2::{MmapOptions, MmapRaw};
use std::fmt::{Debug, Formatter};
use std::fs::OpenOptions;
use std::sync::{Mutex, PoisonError};

pub struct RawGpioDriver {
    mmap: MmapRaw,
    claims: PinClaims,
    // Function select and pull control registers are shared between pins.
    register_lock: Mutex<()>,
}

impl RawGpioDriver {
    // 0x7e200000 on the bus
    // const GPIO_BASE: u32 = 0xFE200000;
    const GPIO_BASE: u32 = 0x3F200000;
    // const GPIO_BASE: u32 = 0x20200000;

    const PIN_COUNT: usize = 58;

    const FUNCTION_INPUT: u8 = 0b000;
    const FUNCTION_OUTPUT: u8 = 0b001;

    fn create(path: &str, offset: u64) -> GpioResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)?;

        let mmap = MmapOptions::new()
                .offset(offset)
                .len(4096)
                .map_raw(&file)?;

        Ok(RawGpioDriver {
            mmap,
            claims: PinClaims::new(Self::PIN_COUNT),
            register_lock: Mutex::new(()),
        })
    }

    /// Maps the GPIO block through `/dev/gpiomem`, which does not require root.
    pub fn new_gpiomem() -> GpioResult<Self> {
        Self::create("/dev/gpiomem", 0)
    }

    /// Maps the GPIO block through `/dev/mem`.
    pub fn new_mem() -> GpioResult<Self> {
        Self::create("/dev/mem", Self::GPIO_BASE as u64)
    }

    fn check_index(pin_index: usize) -> GpioResult<()> {
        if pin_index >= Self::PIN_COUNT {
            return Err(GpioError::InvalidArgument);
        }
        Ok(())
    }

    pub fn raw_get_pin_function(&self, pin_index: usize) -> GpioResult<u32> {
        Self::check_index(pin_index)?;

        let mmap = self.mmap.as_ptr() as *const u32;
        // GPFSELn register
        let register_ptr = unsafe { mmap.add(pin_index / 10) };
        let shift = (pin_index % 10) * 3;

        let register_value = unsafe { register_ptr.read_volatile() };
        Ok((register_value >> shift) & 0b111)
    }

    pub fn raw_set_pin_function(&self, pin_index: usize, function: u8) -> GpioResult<()> {
        if function > 0b111 {
            return Err(GpioError::InvalidArgument);
        }
        Self::check_index(pin_index)?;

        let _guard = self.register_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mmap = self.mmap.as_mut_ptr() as *mut u32;
        // GPFSELn register
        let register_ptr = unsafe { mmap.add(pin_index / 10) };
        let shift = (pin_index % 10) * 3;

        let mut register_value = unsafe { register_ptr.read_volatile() };
        register_value &= !(0b111 << shift);
        register_value |= (function as u32) << shift;
        unsafe { register_ptr.write_volatile(register_value) };

        Ok(())
    }

    fn raw_set_pin_output(&self, pin_index: usize, high: bool) -> GpioResult<()> {
        Self::check_index(pin_index)?;

        let mmap = self.mmap.as_mut_ptr() as *mut u32;
        // GPSETn/GPCLRn register, write-only so no locking needed
        let register_ptr = unsafe { mmap.add(if high { 0x1c / 4 } else { 0x28 / 4 } + pin_index / 32) };
        let shift = pin_index % 32;

        unsafe { register_ptr.write_volatile(1 << shift) };

        Ok(())
    }

    fn raw_get_pin_level(&self, pin_index: usize) -> GpioResult<bool> {
        Self::check_index(pin_index)?;

        let mmap = self.mmap.as_ptr() as *const u32;
        // GPLEVn register
        let register_ptr = unsafe { mmap.add((0x34 / 4) + pin_index / 32) };
        let shift = pin_index % 32;

        let register_value = unsafe { register_ptr.read_volatile() };
        Ok((register_value >> shift) & 1 != 0)
    }

    /// Drives the pin to the given level, or lets it float on `None`.
    fn drive_pin(&self, pin_index: usize, state: Option<bool>) -> GpioResult<()> {
        match state {
            Some(high) => {
                // Latch the level first so the pin never glitches when switching to output.
                self.raw_set_pin_output(pin_index, high)?;
                self.raw_set_pin_function(pin_index, Self::FUNCTION_OUTPUT)?;
            }
            None => {
                self.raw_set_pin_function(pin_index, Self::FUNCTION_INPUT)?;
            }
        }

        Ok(())
    }

    pub fn raw_set_bias(&self, pin_index: usize, bias: GpioBias) -> GpioResult<()> {
        Self::check_index(pin_index)?;

        let bias_value = match bias {
            GpioBias::None => 0b00,
            GpioBias::PullUp => 0b01,
            GpioBias::PullDown => 0b10,
        };

        let _guard = self.register_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mmap = self.mmap.as_mut_ptr() as *mut u32;
        // GPIO_PUP_PDN_CNTRL_REGn register (yes that is a long name)
        let register_ptr = unsafe { mmap.add(0xE4 / 4 + pin_index / 16) };
        let shift = (pin_index % 16) * 2;
        let mut register_value = unsafe { register_ptr.read_volatile() };
        register_value &= !(0b11 << shift);
        register_value |= bias_value << shift;

        unsafe { register_ptr.write_volatile(register_value) };

        Ok(())
    }

    fn raw_reset(&self, pin_index: usize) -> GpioResult<()> {
        self.raw_set_pin_function(pin_index, Self::FUNCTION_INPUT)?;
        self.raw_set_bias(pin_index, GpioBias::None)?;
        Ok(())
    }

    fn claim_lines<const N: usize>(
        &self,
        indices: [usize; N],
        config: GpioLineConfig,
        output: bool,
    ) -> GpioResult<RawGpioLines<'_, N>> {
        self.claims.claim(&indices)?;

        let lines = RawGpioLines {
            driver: self,
            pin_indices: indices,
            config,
        };

        for &index in &indices {
            self.raw_reset(index)?;
            self.raw_set_bias(index, config.bias)?;
            if output {
                self.drive_pin(index, config.output_state(false))?;
            }
        }

        trace!("{:?} configured as {}", lines, if output { "output" } else { "input" });
        Ok(lines)
    }
}

impl Debug for RawGpioDriver {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "RawGpioDriver({:?})", self.mmap.as_ptr().addr())
    }
}

impl GpioDriver for RawGpioDriver {
    fn count(&self) -> GpioResult<usize> {
        Ok(Self::PIN_COUNT)
    }

    fn get_input(&self, index: usize, config: GpioLineConfig) -> GpioResult<Box<dyn GpioInput + '_>> {
        Ok(Box::new(self.claim_lines([index], config, false)?))
    }

    fn get_output(&self, index: usize, config: GpioLineConfig) -> GpioResult<Box<dyn GpioOutput + '_>> {
        Ok(Box::new(self.claim_lines([index], config, true)?))
    }

    fn get_input_bus<const N: usize>(&self, indices: [usize; N], config: GpioLineConfig) -> GpioResult<Box<dyn GpioBusInput<N> + '_>> {
        Ok(Box::new(self.claim_lines(indices, config, false)?))
    }

    fn get_output_bus<const N: usize>(&self, indices: [usize; N], config: GpioLineConfig) -> GpioResult<Box<dyn GpioBusOutput<N> + '_>> {
        Ok(Box::new(self.claim_lines(indices, config, true)?))
    }
}

/// Claimed lines of a [RawGpioDriver]. A single pin is a bus of one.
struct RawGpioLines<'a, const N: usize> {
    driver: &'a RawGpioDriver,
    pin_indices: [usize; N],
    config: GpioLineConfig,
}

impl<const N: usize> Debug for RawGpioLines<'_, N> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}{:?}", self.driver, self.pin_indices)
    }
}

impl<const N: usize> Drop for RawGpioLines<'_, N> {
    fn drop(&mut self) {
        for &pin_index in &self.pin_indices {
            _ = self.driver.raw_reset(pin_index);
        }
        self.driver.claims.release(&self.pin_indices);
    }
}

impl<const N: usize> GpioBusInput<N> for RawGpioLines<'_, N> {
    fn read(&self) -> GpioResult<[bool; N]> {
        let mut values = [false; N];
        for (i, &pin_index) in self.pin_indices.iter().enumerate() {
            values[i] = self.config.input_value(self.driver.raw_get_pin_level(pin_index)?);
        }
        Ok(values)
    }
}

impl<const N: usize> GpioBusOutput<N> for RawGpioLines<'_, N> {
    fn write(&self, values: &[bool; N]) -> GpioResult<()> {
        for (i, &pin_index) in self.pin_indices.iter().enumerate() {
            self.driver.drive_pin(pin_index, self.config.output_state(values[i]))?;
        }
        Ok(())
    }
}

impl GpioInput for RawGpioLines<'_, 1> {
    fn read(&self) -> GpioResult<bool> {
        let [value] = GpioBusInput::<1>::read(self)?;
        Ok(value)
    }
}

impl GpioOutput for RawGpioLines<'_, 1> {
    fn write(&self, value: bool) -> GpioResult<()> {
        GpioBusOutput::<1>::write(self, &[value])
    }
}
