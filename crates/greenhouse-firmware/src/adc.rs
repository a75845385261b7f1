//! The single shared analog input
//!
//! The probe multiplexer only ever samples one pin, so this wraps ADC1 with
//! that one pin enabled and refuses conversions on any other.

use esp_hal::Blocking;
use esp_hal::analog::adc::{Adc, AdcChannel, AdcConfig, AdcPin, Attenuation};
use esp_hal::peripherals::ADC1;
use greenhouse_core::hal::{AnalogInput, PinId};
use thiserror_no_std::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdcError {
    #[error("GPIO{0} is not wired to the ADC")]
    NotWired(PinId),
    #[error("conversion failed")]
    Conversion,
}

pub struct SharedAdc<'d, P> {
    pin: PinId,
    adc: Adc<'d, ADC1<'d>, Blocking>,
    input: AdcPin<P, ADC1<'d>>,
}

impl<'d, P> SharedAdc<'d, P>
where
    P: AdcChannel + esp_hal::gpio::AnalogPin,
{
    /// Enable `input` (GPIO number `pin`) on ADC1 with the full 0-3.1 V range.
    pub fn new(adc1: ADC1<'d>, input: P, pin: PinId) -> Self {
        let mut config = AdcConfig::new();
        let input = config.enable_pin(input, Attenuation::_11dB);
        let adc = Adc::new(adc1, config);
        Self { pin, adc, input }
    }
}

impl<'d, P: AdcChannel> AnalogInput for SharedAdc<'d, P> {
    type Error = AdcError;

    fn read_raw(&mut self, pin: PinId) -> Result<u16, Self::Error> {
        if pin != self.pin {
            return Err(AdcError::NotWired(pin));
        }
        nb::block!(self.adc.read_oneshot(&mut self.input)).map_err(|()| AdcError::Conversion)
    }
}
