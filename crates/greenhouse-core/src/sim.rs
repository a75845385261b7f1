//! Simulated board for tests and the desktop simulator
//!
//! [`SimBoard`] is a cheap, cloneable handle over shared board state. Every
//! clone sees the same pins and the same clock, so one board can be handed to a
//! component as its GPIO bank, ADC, clock and delay at the same time.
//!
//! Time only moves when something delays or when the driver calls
//! [`SimBoard::advance_ms`]. Input pins follow a script of `(time, level)`
//! change points, and analog probes produce a reading on the shared input only
//! while their power pins are driven.

use alloc::collections::BTreeMap;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::convert::Infallible;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType, PinState};

use crate::hal::{AnalogInput, Clock, GpioBank, PinId, PinMode};

const NANOS_PER_MS: u64 = 1_000_000;

/// Something the firmware did to the board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardEvent {
    Mode {
        at_ms: u64,
        pin: PinId,
        mode: PinMode,
    },
    Write {
        at_ms: u64,
        pin: PinId,
        level: PinState,
    },
    /// ADC conversion, with every pin that was being driven at that moment.
    Sample {
        at_ms: u64,
        pin: PinId,
        raw: u16,
        driven: Vec<(PinId, PinState)>,
    },
}

/// A resistive probe wired between two GPIOs and tapped by the analog input.
#[derive(Debug, Clone, Copy)]
struct Probe {
    vcc: PinId,
    gnd: PinId,
    analog_pin: PinId,
    raw: u16,
}

#[derive(Default)]
struct BoardState {
    now_ns: u64,
    modes: BTreeMap<PinId, PinMode>,
    outputs: BTreeMap<PinId, PinState>,
    scripts: BTreeMap<PinId, Vec<(u64, PinState)>>,
    probes: Vec<Probe>,
    events: Vec<BoardEvent>,
}

impl BoardState {
    fn now_ms(&self) -> u64 {
        self.now_ns / NANOS_PER_MS
    }

    fn is_driven(&self, pin: PinId, level: PinState) -> bool {
        self.modes.get(&pin) == Some(&PinMode::Output) && self.outputs.get(&pin) == Some(&level)
    }

    fn driven_pins(&self) -> Vec<(PinId, PinState)> {
        self.modes
            .iter()
            .filter(|(_, mode)| **mode == PinMode::Output)
            .map(|(pin, _)| (*pin, self.outputs.get(pin).copied().unwrap_or(PinState::Low)))
            .collect()
    }

    fn input_level(&self, pin: PinId) -> PinState {
        let now = self.now_ms();
        let scripted = self.scripts.get(&pin).and_then(|script| {
            script
                .iter()
                .take_while(|(at, _)| *at <= now)
                .last()
                .map(|(_, level)| *level)
        });
        if let Some(level) = scripted {
            return level;
        }

        match self.modes.get(&pin) {
            Some(PinMode::Output) => self.outputs.get(&pin).copied().unwrap_or(PinState::Low),
            Some(PinMode::InputPullUp) => PinState::High,
            _ => PinState::Low,
        }
    }

    /// Energized probes share the sense line; more than one averages them
    /// together, which is exactly the cross-talk the multiplexer prevents.
    fn analog_level(&self, analog_pin: PinId) -> u16 {
        let powered: Vec<u16> = self
            .probes
            .iter()
            .filter(|probe| probe.analog_pin == analog_pin)
            .filter(|probe| {
                self.is_driven(probe.vcc, PinState::High) && self.is_driven(probe.gnd, PinState::Low)
            })
            .map(|probe| probe.raw)
            .collect();

        if powered.is_empty() {
            return 0;
        }
        let sum: u32 = powered.iter().map(|raw| u32::from(*raw)).sum();
        (sum / powered.len() as u32) as u16
    }
}

#[derive(Clone, Default)]
pub struct SimBoard {
    state: Rc<RefCell<BoardState>>,
}

impl SimBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance_ms(&self, ms: u64) {
        self.state.borrow_mut().now_ns += ms * NANOS_PER_MS;
    }

    /// Drive `pin` from outside: the level changes at each listed time.
    /// Before the first entry the pin reads as its mode implies.
    pub fn script_input(&self, pin: PinId, changes: &[(u64, PinState)]) {
        let mut script = changes.to_vec();
        script.sort_by_key(|(at, _)| *at);
        self.state.borrow_mut().scripts.insert(pin, script);
    }

    /// Wire a probe that reads `raw` on `analog_pin` while powered through
    /// `vcc` (high) and `gnd` (low).
    pub fn connect_probe(&self, vcc: PinId, gnd: PinId, analog_pin: PinId, raw: u16) {
        let mut state = self.state.borrow_mut();
        state.probes.retain(|probe| !(probe.vcc == vcc && probe.gnd == gnd));
        state.probes.push(Probe {
            vcc,
            gnd,
            analog_pin,
            raw,
        });
    }

    pub fn mode(&self, pin: PinId) -> Option<PinMode> {
        self.state.borrow().modes.get(&pin).copied()
    }

    /// Pins currently configured as outputs, with their level.
    pub fn driven_pins(&self) -> Vec<(PinId, PinState)> {
        self.state.borrow().driven_pins()
    }

    pub fn events(&self) -> Vec<BoardEvent> {
        self.state.borrow().events.clone()
    }

    pub fn clear_events(&self) {
        self.state.borrow_mut().events.clear();
    }
}

impl ErrorType for SimBoard {
    type Error = Infallible;
}

impl GpioBank for SimBoard {
    fn set_mode(&mut self, pin: PinId, mode: PinMode) -> Result<(), Self::Error> {
        let mut state = self.state.borrow_mut();
        let at_ms = state.now_ms();
        state.modes.insert(pin, mode);
        state.events.push(BoardEvent::Mode { at_ms, pin, mode });
        Ok(())
    }

    fn read(&mut self, pin: PinId) -> Result<PinState, Self::Error> {
        Ok(self.state.borrow().input_level(pin))
    }

    fn write(&mut self, pin: PinId, level: PinState) -> Result<(), Self::Error> {
        let mut state = self.state.borrow_mut();
        let at_ms = state.now_ms();
        state.outputs.insert(pin, level);
        state.events.push(BoardEvent::Write { at_ms, pin, level });
        Ok(())
    }
}

impl AnalogInput for SimBoard {
    type Error = Infallible;

    fn read_raw(&mut self, pin: PinId) -> Result<u16, Self::Error> {
        let mut state = self.state.borrow_mut();
        let raw = state.analog_level(pin);
        let event = BoardEvent::Sample {
            at_ms: state.now_ms(),
            pin,
            raw,
            driven: state.driven_pins(),
        };
        state.events.push(event);
        Ok(raw)
    }
}

impl Clock for SimBoard {
    fn now_ms(&self) -> u64 {
        self.state.borrow().now_ms()
    }
}

impl DelayNs for SimBoard {
    fn delay_ns(&mut self, ns: u32) {
        self.state.borrow_mut().now_ns += u64::from(ns);
    }

    fn delay_ms(&mut self, ms: u32) {
        self.advance_ms(u64::from(ms));
    }
}

/// Error raised by [`FaultyGpio`].
#[cfg(test)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinFault;

#[cfg(test)]
impl embedded_hal::digital::Error for PinFault {
    fn kind(&self) -> embedded_hal::digital::ErrorKind {
        embedded_hal::digital::ErrorKind::Other
    }
}

/// GPIO bank over a [`SimBoard`] whose reads and writes fail on chosen pins.
/// Mode changes always go through.
#[cfg(test)]
#[derive(Clone)]
pub struct FaultyGpio {
    board: SimBoard,
    failing: Rc<RefCell<Vec<PinId>>>,
}

#[cfg(test)]
impl FaultyGpio {
    pub fn new(board: &SimBoard) -> Self {
        Self {
            board: board.clone(),
            failing: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn fail(&self, pin: PinId) {
        self.failing.borrow_mut().push(pin);
    }

    pub fn recover(&self, pin: PinId) {
        self.failing.borrow_mut().retain(|failing| *failing != pin);
    }

    fn check(&self, pin: PinId) -> Result<(), PinFault> {
        if self.failing.borrow().contains(&pin) {
            return Err(PinFault);
        }
        Ok(())
    }
}

#[cfg(test)]
impl ErrorType for FaultyGpio {
    type Error = PinFault;
}

#[cfg(test)]
impl GpioBank for FaultyGpio {
    fn set_mode(&mut self, pin: PinId, mode: PinMode) -> Result<(), Self::Error> {
        let Ok(()) = self.board.set_mode(pin, mode);
        Ok(())
    }

    fn read(&mut self, pin: PinId) -> Result<PinState, Self::Error> {
        self.check(pin)?;
        let Ok(level) = self.board.read(pin);
        Ok(level)
    }

    fn write(&mut self, pin: PinId, level: PinState) -> Result<(), Self::Error> {
        self.check(pin)?;
        let Ok(()) = self.board.write(pin, level);
        Ok(())
    }
}
