//! Several analog probes on one ADC input
//!
//! Each probe is powered from two GPIOs instead of the supply rails, and all
//! of them feed the same analog pin. Only one probe may be powered while the
//! ADC samples, otherwise the readings mix on the shared sense line, so every
//! read runs strictly as:
//!
//! 1. isolate every registered probe (both pins high-impedance)
//! 2. drive the requested probe: `vcc` high, `gnd` low
//! 3. wait the settling interval
//! 4. sample the analog pin
//! 5. isolate every registered probe again
//!
//! Outside of [`MultiAnalog::read`] all registered probes are isolated.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorKind, PinState};
use heapless::Vec;
use log::{debug, error, trace, warn};
use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

use crate::config::MuxConfig;
use crate::hal::{AnalogInput, GpioBank, PinId, PinMode};

/// Registry capacity used by [`crate::config::NodeConfig`].
pub const MAX_SENSORS: usize = 8;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuxError {
    #[error("power pin {pin} failed: {kind:?}")]
    Pin { pin: PinId, kind: ErrorKind },
    #[error("analog input {pin} failed to convert")]
    Analog { pin: PinId },
    #[error("sensor registry is full ({capacity} sensors)")]
    RegistryFull { capacity: usize },
}

/// Power pins of one probe. Two descriptors with the same pins are the same
/// probe.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AnalogSensor {
    /// Driven high to power the probe.
    pub vcc: PinId,
    /// Driven low as the return path.
    pub gnd: PinId,
}

impl AnalogSensor {
    pub const fn new(vcc: PinId, gnd: PinId) -> Self {
        Self { vcc, gnd }
    }
}

/// One sample taken by [`MultiAnalog::read_all`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reading {
    pub sensor: AnalogSensor,
    pub raw: u16,
}

pub struct MultiAnalog<G, A, D, const N: usize = MAX_SENSORS> {
    analog_pin: PinId,
    config: MuxConfig,
    gpio: G,
    adc: A,
    delay: D,
    sensors: Vec<AnalogSensor, N>,
}

fn pin_error<E: embedded_hal::digital::Error>(pin: PinId, error: E) -> MuxError {
    MuxError::Pin {
        pin,
        kind: error.kind(),
    }
}

impl<G, A, D, const N: usize> MultiAnalog<G, A, D, N>
where
    G: GpioBank,
    A: AnalogInput,
    D: DelayNs,
{
    pub fn new(analog_pin: PinId, gpio: G, adc: A, delay: D) -> Self {
        Self::with_config(analog_pin, MuxConfig::default(), gpio, adc, delay)
    }

    pub fn with_config(analog_pin: PinId, config: MuxConfig, gpio: G, adc: A, delay: D) -> Self {
        debug!(
            "MultiAnalog on ADC pin {}: {} ms settle, room for {} probes",
            analog_pin, config.settle_ms, N
        );
        Self {
            analog_pin,
            config,
            gpio,
            adc,
            delay,
            sensors: Vec::new(),
        }
    }

    /// Register a probe. Its pins are isolated straight away.
    pub fn add(&mut self, sensor: AnalogSensor) -> Result<(), MuxError> {
        self.sensors.push(sensor).map_err(|sensor| {
            warn!(
                "No room for probe on GPIO{}/GPIO{} ({} registered)",
                sensor.vcc, sensor.gnd, N
            );
            MuxError::RegistryFull { capacity: N }
        })?;
        self.disable(sensor)?;

        debug!("Registered probe on GPIO{}/GPIO{}", sensor.vcc, sensor.gnd);
        Ok(())
    }

    /// Power `sensor` alone, sample the shared input and isolate everything
    /// again.
    ///
    /// `sensor` does not have to be registered, but only registered probes
    /// are isolated around the sample.
    pub fn read(&mut self, sensor: AnalogSensor) -> Result<u16, MuxError> {
        self.disable_all()?;
        let sample = self.sample_powered(sensor);
        let isolated = self.disable_all();

        let raw = sample?;
        isolated?;

        trace!("Probe GPIO{}/GPIO{}: raw {}", sensor.vcc, sensor.gnd, raw);
        Ok(raw)
    }

    /// Read every registered probe, in registration order.
    pub fn read_all(&mut self) -> Result<Vec<Reading, N>, MuxError> {
        let mut readings = Vec::new();
        for index in 0..self.sensors.len() {
            let sensor = self.sensors[index];
            let raw = self.read(sensor)?;
            readings
                .push(Reading { sensor, raw })
                .map_err(|_| MuxError::RegistryFull { capacity: N })?;
        }
        Ok(readings)
    }

    /// Put every registered probe into the isolated (high-impedance) state.
    pub fn disable_all(&mut self) -> Result<(), MuxError> {
        for sensor in self.sensors.iter() {
            self.gpio
                .set_mode(sensor.vcc, PinMode::Input)
                .map_err(|e| pin_error(sensor.vcc, e))?;
            self.gpio
                .set_mode(sensor.gnd, PinMode::Input)
                .map_err(|e| pin_error(sensor.gnd, e))?;
        }
        Ok(())
    }

    fn disable(&mut self, sensor: AnalogSensor) -> Result<(), MuxError> {
        self.gpio
            .set_mode(sensor.vcc, PinMode::Input)
            .map_err(|e| pin_error(sensor.vcc, e))?;
        self.gpio
            .set_mode(sensor.gnd, PinMode::Input)
            .map_err(|e| pin_error(sensor.gnd, e))
    }

    fn enable(&mut self, sensor: AnalogSensor) -> Result<(), MuxError> {
        self.gpio
            .set_mode(sensor.vcc, PinMode::Output)
            .map_err(|e| pin_error(sensor.vcc, e))?;
        self.gpio
            .set_mode(sensor.gnd, PinMode::Output)
            .map_err(|e| pin_error(sensor.gnd, e))?;

        self.gpio
            .write(sensor.vcc, PinState::High)
            .map_err(|e| pin_error(sensor.vcc, e))?;
        self.gpio
            .write(sensor.gnd, PinState::Low)
            .map_err(|e| pin_error(sensor.gnd, e))
    }

    fn sample_powered(&mut self, sensor: AnalogSensor) -> Result<u16, MuxError> {
        self.enable(sensor)?;
        self.delay.delay_ms(self.config.settle_ms);

        let pin = self.analog_pin;
        self.adc.read_raw(pin).map_err(|e| {
            error!("ADC conversion on pin {} failed: {:?}", pin, e);
            MuxError::Analog { pin }
        })
    }
}

impl<G, A, D, const N: usize> MultiAnalog<G, A, D, N> {
    pub fn analog_pin(&self) -> PinId {
        self.analog_pin
    }

    pub fn config(&self) -> &MuxConfig {
        &self.config
    }

    pub fn sensors(&self) -> &[AnalogSensor] {
        &self.sensors
    }

    pub fn contains(&self, sensor: AnalogSensor) -> bool {
        self.sensors.contains(&sensor)
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::Clock;
    use crate::sim::{BoardEvent, FaultyGpio, SimBoard};

    const ANALOG_PIN: PinId = 0;
    const SENSOR_A: AnalogSensor = AnalogSensor::new(2, 3);
    const SENSOR_B: AnalogSensor = AnalogSensor::new(4, 5);

    fn reader(board: &SimBoard) -> MultiAnalog<SimBoard, SimBoard, SimBoard> {
        let mut reader = MultiAnalog::new(ANALOG_PIN, board.clone(), board.clone(), board.clone());
        reader.add(SENSOR_A).unwrap();
        reader.add(SENSOR_B).unwrap();
        reader
    }

    fn assert_isolated(board: &SimBoard, pins: &[PinId]) {
        for pin in pins {
            assert_eq!(board.mode(*pin), Some(PinMode::Input), "GPIO{} left powered", pin);
        }
    }

    #[test]
    fn test_read_powers_only_requested_sensor() {
        let board = SimBoard::new();
        board.connect_probe(2, 3, ANALOG_PIN, 410);
        board.connect_probe(4, 5, ANALOG_PIN, 730);
        let mut reader = reader(&board);
        board.clear_events();

        let raw = reader.read(SENSOR_B).unwrap();

        assert_eq!(raw, 730);
        let samples: std::vec::Vec<_> = board
            .events()
            .into_iter()
            .filter_map(|event| match event {
                BoardEvent::Sample { pin, driven, .. } => Some((pin, driven)),
                _ => None,
            })
            .collect();
        assert_eq!(
            samples,
            vec![(ANALOG_PIN, vec![(4, PinState::High), (5, PinState::Low)])]
        );
        assert_isolated(&board, &[2, 3, 4, 5]);
        assert!(board.driven_pins().is_empty());
    }

    #[test]
    fn test_read_sequence_is_disable_enable_settle_sample_disable() {
        let board = SimBoard::new();
        let mut reader = reader(&board);
        board.clear_events();

        reader.read(SENSOR_A).unwrap();

        let events = board.events();
        let input = |at_ms, pin| BoardEvent::Mode {
            at_ms,
            pin,
            mode: PinMode::Input,
        };
        let output = |at_ms, pin| BoardEvent::Mode {
            at_ms,
            pin,
            mode: PinMode::Output,
        };
        assert_eq!(
            events,
            vec![
                input(0, 2),
                input(0, 3),
                input(0, 4),
                input(0, 5),
                output(0, 2),
                output(0, 3),
                BoardEvent::Write {
                    at_ms: 0,
                    pin: 2,
                    level: PinState::High
                },
                BoardEvent::Write {
                    at_ms: 0,
                    pin: 3,
                    level: PinState::Low
                },
                BoardEvent::Sample {
                    at_ms: 5,
                    pin: ANALOG_PIN,
                    raw: 0,
                    driven: vec![(2, PinState::High), (3, PinState::Low)],
                },
                input(5, 2),
                input(5, 3),
                input(5, 4),
                input(5, 5),
            ]
        );
    }

    #[test]
    fn test_read_isolates_sensor_left_powered() {
        let board = SimBoard::new();
        board.connect_probe(2, 3, ANALOG_PIN, 100);
        board.connect_probe(4, 5, ANALOG_PIN, 900);
        let mut reader = reader(&board);

        // Something else powered probe A behind the reader's back.
        let mut gpio = board.clone();
        gpio.set_mode(2, PinMode::Output).unwrap();
        gpio.set_mode(3, PinMode::Output).unwrap();
        gpio.write(2, PinState::High).unwrap();
        gpio.write(3, PinState::Low).unwrap();

        assert_eq!(reader.read(SENSOR_B).unwrap(), 900);
        assert_isolated(&board, &[2, 3, 4, 5]);
    }

    #[test]
    fn test_add_isolates_new_sensor() {
        let board = SimBoard::new();
        let mut reader: MultiAnalog<_, _, _> =
            MultiAnalog::new(ANALOG_PIN, board.clone(), board.clone(), board.clone());

        reader.add(SENSOR_A).unwrap();

        assert_eq!(reader.len(), 1);
        assert!(reader.contains(SENSOR_A));
        assert!(!reader.contains(SENSOR_B));
        assert_isolated(&board, &[2, 3]);
    }

    #[test]
    fn test_read_unregistered_sensor() {
        let board = SimBoard::new();
        board.connect_probe(6, 7, ANALOG_PIN, 555);
        let mut reader = reader(&board);
        let unregistered = AnalogSensor::new(6, 7);

        assert_eq!(reader.read(unregistered).unwrap(), 555);
        // Only registered probes are isolated afterwards.
        assert_isolated(&board, &[2, 3, 4, 5]);
        assert_eq!(
            board.driven_pins(),
            vec![(6, PinState::High), (7, PinState::Low)]
        );
    }

    #[test]
    fn test_read_all_in_registration_order() {
        let board = SimBoard::new();
        board.connect_probe(2, 3, ANALOG_PIN, 120);
        board.connect_probe(4, 5, ANALOG_PIN, 640);
        let mut reader = reader(&board);

        let readings = reader.read_all().unwrap();

        assert_eq!(
            readings.as_slice(),
            &[
                Reading {
                    sensor: SENSOR_A,
                    raw: 120
                },
                Reading {
                    sensor: SENSOR_B,
                    raw: 640
                },
            ]
        );
        assert_eq!(board.now_ms(), 10);
        assert_isolated(&board, &[2, 3, 4, 5]);
    }

    #[test]
    fn test_failed_read_still_isolates_every_sensor() {
        let board = SimBoard::new();
        board.connect_probe(4, 5, ANALOG_PIN, 730);
        let gpio = FaultyGpio::new(&board);
        let mut reader: MultiAnalog<_, _, _> =
            MultiAnalog::new(ANALOG_PIN, gpio.clone(), board.clone(), board.clone());
        reader.add(SENSOR_A).unwrap();
        reader.add(SENSOR_B).unwrap();
        gpio.fail(5);
        board.clear_events();

        let result = reader.read(SENSOR_B);

        assert_eq!(
            result,
            Err(MuxError::Pin {
                pin: 5,
                kind: ErrorKind::Other
            })
        );
        assert!(board.driven_pins().is_empty());
        assert_isolated(&board, &[2, 3, 4, 5]);
        assert!(
            !board
                .events()
                .iter()
                .any(|event| matches!(event, BoardEvent::Sample { .. }))
        );

        gpio.recover(5);
        assert_eq!(reader.read(SENSOR_B), Ok(730));
    }

    #[test]
    fn test_registry_full() {
        let board = SimBoard::new();
        let mut reader: MultiAnalog<_, _, _, 1> =
            MultiAnalog::new(ANALOG_PIN, board.clone(), board.clone(), board.clone());

        reader.add(SENSOR_A).unwrap();

        assert_eq!(
            reader.add(SENSOR_B),
            Err(MuxError::RegistryFull { capacity: 1 })
        );
        assert_eq!(reader.sensors(), &[SENSOR_A]);
        assert_eq!(board.mode(4), None);
    }

    #[test]
    fn test_settle_interval_from_config() {
        let board = SimBoard::new();
        let mut reader: MultiAnalog<_, _, _> = MultiAnalog::with_config(
            ANALOG_PIN,
            MuxConfig { settle_ms: 20 },
            board.clone(),
            board.clone(),
            board.clone(),
        );
        reader.add(SENSOR_A).unwrap();

        reader.read(SENSOR_A).unwrap();

        assert_eq!(board.now_ms(), 20);
    }

    #[test]
    fn test_disable_all_on_empty_registry() {
        let board = SimBoard::new();
        let mut reader: MultiAnalog<_, _, _> =
            MultiAnalog::new(ANALOG_PIN, board.clone(), board.clone(), board.clone());

        reader.disable_all().unwrap();

        assert!(reader.is_empty());
        assert!(board.events().is_empty());
    }
}
