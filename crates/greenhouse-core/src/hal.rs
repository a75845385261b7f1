//! Platform capabilities consumed by the core
//!
//! Pins are addressed by number so that a sensor descriptor can stay a plain
//! `Copy` pair of identifiers. Digital levels and blocking delays reuse the
//! `embedded-hal` vocabulary; the ADC and the millisecond clock have no
//! `embedded-hal` 1.0 trait and are defined here.

use embedded_hal::digital::{ErrorType, PinState};

/// GPIO number as used by the board.
pub type PinId = u8;

/// Electrical configuration of a GPIO.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinMode {
    /// High-impedance input, no pull resistor.
    Input,
    /// Input with the internal pull-up enabled.
    InputPullUp,
    /// Push-pull output.
    Output,
}

/// Number-addressed digital I/O.
///
/// Implementations are expected to be cheap handles over the GPIO matrix;
/// the component holding a handle owns the pins it touches.
pub trait GpioBank: ErrorType {
    /// Reconfigure `pin` as input, pulled-up input or output.
    fn set_mode(&mut self, pin: PinId, mode: PinMode) -> Result<(), Self::Error>;

    /// Sample the input level of `pin`.
    fn read(&mut self, pin: PinId) -> Result<PinState, Self::Error>;

    /// Drive `pin` to `level`. Only meaningful while the pin is an output.
    fn write(&mut self, pin: PinId, level: PinState) -> Result<(), Self::Error>;
}

/// One-shot analog conversion.
pub trait AnalogInput {
    type Error: core::fmt::Debug;

    /// Convert the voltage on `pin` and return the raw ADC count.
    fn read_raw(&mut self, pin: PinId) -> Result<u16, Self::Error>;
}

/// Monotonic millisecond clock.
pub trait Clock {
    fn now_ms(&self) -> u64;

    /// Milliseconds since `start`, saturating if the clock was reset.
    fn elapsed_ms(&self, start: u64) -> u64 {
        self.now_ms().saturating_sub(start)
    }
}
