use embedded_hal::delay::DelayNs;
use heapless::Vec;
use serde::{Deserialize, Serialize};

use crate::debouncer::{DebounceError, Debouncer};
use crate::hal::{AnalogInput, Clock, GpioBank, PinId};
use crate::multi_analog::{AnalogSensor, MAX_SENSORS, MultiAnalog, MuxError};

/// Default stabilization window for a mechanical button.
pub const DEFAULT_DEBOUNCE_MS: u32 = 50;

/// Default time a probe is powered before the ADC samples it.
pub const DEFAULT_SETTLE_MS: u32 = 5;

/// Which committed transitions invoke the debouncer callback.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum TriggerMode {
    /// Every committed transition.
    #[default]
    Both,
    /// Low to high only (button released, with a pull-up).
    Rising,
    /// High to low only (button pressed, with a pull-up).
    Falling,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceConfig {
    pub trigger: TriggerMode,
    /// Time the new level must hold before it is committed.
    pub settle_ms: u32,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            trigger: TriggerMode::Both,
            settle_ms: DEFAULT_DEBOUNCE_MS,
        }
    }
}

impl DebounceConfig {
    pub const fn new(trigger: TriggerMode, settle_ms: u32) -> Self {
        Self { trigger, settle_ms }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct MuxConfig {
    /// Delay between energizing a probe and sampling the shared input.
    pub settle_ms: u32,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            settle_ms: DEFAULT_SETTLE_MS,
        }
    }
}

/// Pin assignment of a complete sensor node.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    pub button_pin: PinId,
    pub debounce: DebounceConfig,
    pub analog_pin: PinId,
    pub mux: MuxConfig,
    pub sensors: Vec<AnalogSensor, MAX_SENSORS>,
}

impl NodeConfig {
    /// Node without probes; add them with [`NodeConfig::with_sensors`].
    pub fn new(
        button_pin: PinId,
        debounce: DebounceConfig,
        analog_pin: PinId,
        mux: MuxConfig,
    ) -> Self {
        Self {
            button_pin,
            debounce,
            analog_pin,
            mux,
            sensors: Vec::new(),
        }
    }

    pub fn with_sensors(mut self, sensors: &[AnalogSensor]) -> Result<Self, MuxError> {
        for sensor in sensors {
            self.sensors
                .push(*sensor)
                .map_err(|_| MuxError::RegistryFull {
                    capacity: MAX_SENSORS,
                })?;
        }
        Ok(self)
    }

    /// Build the sensor reader with every configured probe registered.
    pub fn build_reader<G, A, D>(
        &self,
        gpio: G,
        adc: A,
        delay: D,
    ) -> Result<MultiAnalog<G, A, D>, MuxError>
    where
        G: GpioBank,
        A: AnalogInput,
        D: DelayNs,
    {
        let mut reader = MultiAnalog::with_config(self.analog_pin, self.mux, gpio, adc, delay);
        for sensor in self.sensors.iter() {
            reader.add(*sensor)?;
        }
        Ok(reader)
    }

    /// Build the debouncer for the configured button.
    pub fn build_debouncer<G, C, D, F>(
        &self,
        gpio: G,
        clock: C,
        delay: D,
        callback: F,
    ) -> Result<Debouncer<G, C, D, F>, DebounceError>
    where
        G: GpioBank,
        C: Clock,
        D: DelayNs,
        F: FnMut(PinId),
    {
        Debouncer::new(gpio, clock, delay, self.button_pin, self.debounce, callback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::PinMode;
    use crate::sim::SimBoard;

    fn node_config() -> NodeConfig {
        NodeConfig::new(14, DebounceConfig::default(), 0, MuxConfig::default())
            .with_sensors(&[AnalogSensor::new(2, 3), AnalogSensor::new(4, 5)])
            .unwrap()
    }

    #[test]
    fn test_defaults_match_board_timings() {
        let debounce = DebounceConfig::default();
        assert_eq!(debounce.trigger, TriggerMode::Both);
        assert_eq!(debounce.settle_ms, 50);
        assert_eq!(MuxConfig::default().settle_ms, 5);
    }

    #[test]
    fn test_with_sensors_rejects_more_than_capacity() {
        let probes: std::vec::Vec<AnalogSensor> = (0..=MAX_SENSORS as u8)
            .map(|i| AnalogSensor::new(10 + 2 * i, 11 + 2 * i))
            .collect();

        let result = NodeConfig::new(14, DebounceConfig::default(), 0, MuxConfig::default())
            .with_sensors(&probes);

        assert_eq!(
            result,
            Err(MuxError::RegistryFull {
                capacity: MAX_SENSORS
            })
        );
    }

    #[test]
    fn test_build_reader_registers_and_isolates_every_sensor() {
        let board = SimBoard::new();
        let config = node_config();

        let reader = config
            .build_reader(board.clone(), board.clone(), board.clone())
            .unwrap();

        assert_eq!(reader.analog_pin(), 0);
        assert_eq!(reader.sensors(), config.sensors.as_slice());
        for pin in [2, 3, 4, 5] {
            assert_eq!(board.mode(pin), Some(PinMode::Input));
        }
    }

    #[test]
    fn test_build_debouncer_uses_button_pin() {
        let board = SimBoard::new();
        let config = node_config();

        let debouncer = config
            .build_debouncer(board.clone(), board.clone(), board.clone(), |_| {})
            .unwrap();

        assert_eq!(debouncer.pin(), 14);
        assert_eq!(board.mode(14), Some(PinMode::InputPullUp));
        assert!(debouncer.is_released());
    }
}
