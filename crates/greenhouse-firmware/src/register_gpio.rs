//! Number-addressed GPIO for ESP32-S3
//!
//! [`RegisterGpio`] drives pins by number through the GPIO and IO MUX
//! registers, so one handle can reconfigure whichever pins a component names
//! instead of holding a typed `esp-hal` driver per pin.
//!
//! The probe multiplexer needs exactly that: the same pin is a high-impedance
//! input most of the time and a push-pull output for the few milliseconds its
//! probe is sampled.

use core::ptr::{read_volatile, write_volatile};

use embedded_hal::digital::{ErrorKind, ErrorType, PinState};
use greenhouse_core::hal::{GpioBank, PinId, PinMode};
use thiserror_no_std::Error;

// ESP32-S3 GPIO register addresses for GPIO 0-31 (low bank)
const GPIO_OUT_W1TS_REG: u32 = 0x6000_4008; // Set output bits
const GPIO_OUT_W1TC_REG: u32 = 0x6000_400C; // Clear output bits
const GPIO_ENABLE_W1TS_REG: u32 = 0x6000_4020; // Enable output mode
const GPIO_ENABLE_W1TC_REG: u32 = 0x6000_4024; // Disable output mode (enable input)
const GPIO_IN_REG: u32 = 0x6000_403C; // Input levels

// ESP32-S3 GPIO register addresses for GPIO 32-48 (high bank)
const GPIO_OUT1_W1TS_REG: u32 = 0x6000_4014; // Set output bits
const GPIO_OUT1_W1TC_REG: u32 = 0x6000_4018; // Clear output bits
const GPIO_ENABLE1_W1TS_REG: u32 = 0x6000_4030; // Enable output mode
const GPIO_ENABLE1_W1TC_REG: u32 = 0x6000_4034; // Disable output mode (enable input)
const GPIO_IN1_REG: u32 = 0x6000_4040; // Input levels

// Output signal routing, one register per pin
const GPIO_FUNC0_OUT_SEL_CFG_REG: u32 = 0x6000_4554;
const OUT_SEL_SIMPLE_GPIO: u32 = 0x100;

// IO MUX pad configuration, one register per pin
const IO_MUX_GPIO0_REG: u32 = 0x6000_9004;
const FUN_WPD: u32 = 1 << 7;
const FUN_WPU: u32 = 1 << 8;
const FUN_IE: u32 = 1 << 9;
const MCU_SEL_MASK: u32 = 0b111 << 12;
const MCU_SEL_GPIO: u32 = 1 << 12;

const MAX_PIN: PinId = 48;

// GPIO22-25 are not bonded out on the ESP32-S3
const MISSING_PINS: core::ops::RangeInclusive<PinId> = 22..=25;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpioError {
    #[error("GPIO{0} does not exist")]
    InvalidPin(PinId),
}

impl embedded_hal::digital::Error for GpioError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

/// Register addresses and bit mask for one pin
struct PinRegisters {
    out_set: u32,
    out_clr: u32,
    enable_set: u32,
    enable_clr: u32,
    input: u32,
    bit: u32,
}

/// Handle over the ESP32-S3 GPIO matrix.
///
/// # Safety
/// All register access goes through critical sections. However, the caller
/// must ensure that a pin driven through this handle is not also owned by an
/// `esp-hal` driver, and that each pin is only touched by one component.
pub struct RegisterGpio {
    _private: (),
}

impl RegisterGpio {
    pub const fn new() -> Self {
        Self { _private: () }
    }

    fn registers(pin: PinId) -> Result<PinRegisters, GpioError> {
        if pin > MAX_PIN || MISSING_PINS.contains(&pin) {
            return Err(GpioError::InvalidPin(pin));
        }

        let registers = if pin < 32 {
            // Low bank (GPIO 0-31)
            PinRegisters {
                out_set: GPIO_OUT_W1TS_REG,
                out_clr: GPIO_OUT_W1TC_REG,
                enable_set: GPIO_ENABLE_W1TS_REG,
                enable_clr: GPIO_ENABLE_W1TC_REG,
                input: GPIO_IN_REG,
                bit: 1u32 << pin,
            }
        } else {
            // High bank (GPIO 32-48)
            PinRegisters {
                out_set: GPIO_OUT1_W1TS_REG,
                out_clr: GPIO_OUT1_W1TC_REG,
                enable_set: GPIO_ENABLE1_W1TS_REG,
                enable_clr: GPIO_ENABLE1_W1TC_REG,
                input: GPIO_IN1_REG,
                bit: 1u32 << (pin - 32),
            }
        };
        Ok(registers)
    }

    /// Route the pad to the GPIO matrix with input enabled and the given pulls
    fn configure_pad(pin: PinId, pull_up: bool) {
        let reg = (IO_MUX_GPIO0_REG + 4 * u32::from(pin)) as *mut u32;
        unsafe {
            let mut value = read_volatile(reg);
            value &= !(MCU_SEL_MASK | FUN_WPU | FUN_WPD);
            value |= MCU_SEL_GPIO | FUN_IE;
            if pull_up {
                value |= FUN_WPU;
            }
            write_volatile(reg, value);
        }
    }
}

impl Default for RegisterGpio {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorType for RegisterGpio {
    type Error = GpioError;
}

impl GpioBank for RegisterGpio {
    fn set_mode(&mut self, pin: PinId, mode: PinMode) -> Result<(), Self::Error> {
        let registers = Self::registers(pin)?;
        critical_section::with(|_| unsafe {
            match mode {
                PinMode::Input | PinMode::InputPullUp => {
                    // Disable output mode (enable input mode)
                    write_volatile(registers.enable_clr as *mut u32, registers.bit);
                    Self::configure_pad(pin, mode == PinMode::InputPullUp);
                }
                PinMode::Output => {
                    let out_sel = (GPIO_FUNC0_OUT_SEL_CFG_REG + 4 * u32::from(pin)) as *mut u32;
                    write_volatile(out_sel, OUT_SEL_SIMPLE_GPIO);
                    Self::configure_pad(pin, false);
                    // Enable output mode
                    write_volatile(registers.enable_set as *mut u32, registers.bit);
                }
            }
        });
        Ok(())
    }

    fn read(&mut self, pin: PinId) -> Result<PinState, Self::Error> {
        let registers = Self::registers(pin)?;
        let levels = unsafe { read_volatile(registers.input as *const u32) };
        Ok(PinState::from(levels & registers.bit != 0))
    }

    fn write(&mut self, pin: PinId, level: PinState) -> Result<(), Self::Error> {
        let registers = Self::registers(pin)?;
        let reg = match level {
            PinState::High => registers.out_set,
            PinState::Low => registers.out_clr,
        };
        critical_section::with(|_| unsafe {
            write_volatile(reg as *mut u32, registers.bit);
        });
        Ok(())
    }
}
