//! In-memory GPIO lines, for tests and for running without hardware.
//!
//! Every line has a physical level computed from, in order of priority:
//! the level it drives itself, the level driven by a line connected to it,
//! a level forced from outside, and finally its bias (floating lines read low).
use crate::claims::PinClaims;
use crate::{GpioBias, GpioBusInput, GpioBusOutput, GpioDriver, GpioError, GpioInput, GpioLineConfig, GpioOutput, GpioResult};
use log::trace;
use std::fmt::{Debug, Formatter};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A recorded line access.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MockEvent {
    /// A line was sampled.
    Read(usize),
    /// A line was driven to a physical level, or left floating on `None`.
    Write(usize, Option<bool>),
}

#[derive(Copy, Clone, Debug, Default)]
struct MockLine {
    driven: Option<bool>,
    forced: Option<bool>,
    bias: GpioBias,
}

#[derive(Debug, Default)]
struct MockState {
    lines: Vec<MockLine>,
    links: Vec<(usize, usize)>,
    reads_until_failure: Option<usize>,
    fail_writes: bool,
    /// Only recorded between `start_trace` and `stop_trace`.
    trace: Option<Vec<MockEvent>>,
}

impl MockState {
    fn record(&mut self, event: MockEvent) {
        if let Some(trace) = &mut self.trace {
            trace.push(event);
        }
    }

    fn level(&self, index: usize) -> bool {
        let line = self.lines[index];
        if let Some(level) = line.driven {
            return level;
        }

        let linked = self.links.iter().filter_map(|&(a, b)| {
            if a == index {
                Some(b)
            } else if b == index {
                Some(a)
            } else {
                None
            }
        });
        for other in linked {
            if let Some(level) = self.lines[other].driven {
                return level;
            }
        }

        line.forced.unwrap_or(matches!(line.bias, GpioBias::PullUp))
    }

    fn read(&mut self, index: usize) -> GpioResult<bool> {
        self.record(MockEvent::Read(index));
        match self.reads_until_failure {
            Some(0) => return Err(GpioError::Io(std::io::ErrorKind::Other)),
            Some(n) => self.reads_until_failure = Some(n - 1),
            None => {}
        }
        Ok(self.level(index))
    }

    fn drive(&mut self, index: usize, state: Option<bool>) -> GpioResult<()> {
        if self.fail_writes {
            return Err(GpioError::Io(std::io::ErrorKind::Other));
        }
        self.record(MockEvent::Write(index, state));
        self.lines[index].driven = state;
        Ok(())
    }
}

pub struct MockGpioDriver {
    claims: PinClaims,
    state: Mutex<MockState>,
}

impl MockGpioDriver {
    /// The pin count of a Raspberry Pi header's BCM numbering.
    pub const DEFAULT_PIN_COUNT: usize = 28;

    pub fn new(count: usize) -> Self {
        Self {
            claims: PinClaims::new(count),
            state: Mutex::new(MockState {
                lines: vec![MockLine::default(); count],
                ..MockState::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Forces the physical level of a line, as if something outside was driving it.
    pub fn set_level(&self, index: usize, level: bool) {
        self.state().lines[index].forced = Some(level);
    }

    /// Stops forcing the level of a line.
    pub fn release_level(&self, index: usize) {
        self.state().lines[index].forced = None;
    }

    /// Gets the current physical level of a line.
    pub fn level(&self, index: usize) -> bool {
        self.state().level(index)
    }

    /// Gets the level a claimed output is driving, or `None` if it is floating or not an output.
    pub fn driven(&self, index: usize) -> Option<bool> {
        self.state().lines[index].driven
    }

    /// Connects two lines, e.g. a keypad row and column through a pressed key.
    pub fn connect(&self, a: usize, b: usize) {
        let mut state = self.state();
        if !state.links.contains(&(a, b)) {
            state.links.push((a, b));
        }
    }

    pub fn disconnect(&self, a: usize, b: usize) {
        self.state().links.retain(|&link| link != (a, b) && link != (b, a));
    }

    /// Makes every read after the next `reads` ones fail. `None` stops failing.
    pub fn fail_reads_after(&self, reads: Option<usize>) {
        self.state().reads_until_failure = reads;
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads_after(if fail { Some(0) } else { None });
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.state().fail_writes = fail;
    }

    /// Starts recording line accesses, discarding anything recorded before.
    pub fn start_trace(&self) {
        self.state().trace = Some(Vec::new());
    }

    pub fn stop_trace(&self) {
        self.state().trace = None;
    }

    /// Takes the recorded line accesses, clearing the record. Recording goes on if it was started.
    pub fn take_trace(&self) -> Vec<MockEvent> {
        self.state().trace.as_mut().map(std::mem::take).unwrap_or_default()
    }

    pub fn is_claimed(&self, index: usize) -> bool {
        self.claims.is_claimed(index)
    }

    fn claim_lines<const N: usize>(
        &self,
        indices: [usize; N],
        config: GpioLineConfig,
        output: bool,
    ) -> GpioResult<MockLines<'_, N>> {
        self.claims.claim(&indices)?;

        let lines = MockLines {
            driver: self,
            pin_indices: indices,
            config,
        };

        let mut state = self.state();
        for &index in &indices {
            state.lines[index].bias = config.bias;
            if output {
                state.drive(index, config.output_state(false))?;
            }
        }
        drop(state);

        trace!("{:?} configured as {}", lines, if output { "output" } else { "input" });
        Ok(lines)
    }
}

impl Default for MockGpioDriver {
    fn default() -> Self {
        Self::new(Self::DEFAULT_PIN_COUNT)
    }
}

impl Debug for MockGpioDriver {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "MockGpioDriver({:?})", self.claims)
    }
}

impl GpioDriver for MockGpioDriver {
    fn count(&self) -> GpioResult<usize> {
        Ok(self.claims.count())
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

struct MockLines<'a, const N: usize> {
    driver: &'a MockGpioDriver,
    pin_indices: [usize; N],
    config: GpioLineConfig,
}

impl<const N: usize> Debug for MockLines<'_, N> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "MockGpioDriver{:?}", self.pin_indices)
    }
}

impl<const N: usize> Drop for MockLines<'_, N> {
    fn drop(&mut self) {
        let mut state = self.driver.state();
        for &index in &self.pin_indices {
            state.lines[index].driven = None;
            state.lines[index].bias = GpioBias::None;
        }
        drop(state);
        self.driver.claims.release(&self.pin_indices);
    }
}

impl<const N: usize> GpioBusInput<N> for MockLines<'_, N> {
    fn read(&self) -> GpioResult<[bool; N]> {
        let mut state = self.driver.state();
        let mut values = [false; N];
        for (i, &index) in self.pin_indices.iter().enumerate() {
            values[i] = self.config.input_value(state.read(index)?);
        }
        Ok(values)
    }
}

impl<const N: usize> GpioBusOutput<N> for MockLines<'_, N> {
    fn write(&self, values: &[bool; N]) -> GpioResult<()> {
        let mut state = self.driver.state();
        for (i, &index) in self.pin_indices.iter().enumerate() {
            state.drive(index, self.config.output_state(values[i]))?;
        }
        Ok(())
    }
}

impl GpioInput for MockLines<'_, 1> {
    fn read(&self) -> GpioResult<bool> {
        let [value] = GpioBusInput::<1>::read(self)?;
        Ok(value)
    }
}

impl GpioOutput for MockLines<'_, 1> {
    fn write(&self, value: bool) -> GpioResult<()> {
        GpioBusOutput::<1>::write(self, &[value])
    }
}
