//! Debounced digital input
//!
//! A [`Debouncer`] watches one pulled-up GPIO from the main loop. A change of
//! level is only committed once the new level has held for the whole
//! stabilization window; shorter glitches are dropped as bounce.
//!
//! ```ignore
//! let mut button = Debouncer::new(gpio, clock, delay, 0, DebounceConfig::default(), |pin| {
//!     info!("button on GPIO{} changed", pin);
//! })?;
//!
//! loop {
//!     button.poll()?;
//! }
//! ```

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{Error as _, ErrorKind, PinState};
use log::{debug, trace};
use thiserror_no_std::Error;

use crate::config::{DebounceConfig, TriggerMode};
use crate::hal::{Clock, GpioBank, PinId, PinMode};

/// Sampling period while a candidate edge is held.
const SAMPLE_PERIOD_MS: u32 = 1;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceError {
    #[error("debounced pin {pin} failed: {kind:?}")]
    Pin { pin: PinId, kind: ErrorKind },
}

/// A committed change of the settled level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: PinState,
    pub to: PinState,
}

impl Transition {
    pub fn is_rising(&self) -> bool {
        self.from == PinState::Low && self.to == PinState::High
    }

    pub fn is_falling(&self) -> bool {
        self.from == PinState::High && self.to == PinState::Low
    }
}

impl TriggerMode {
    /// Whether `transition` should invoke the callback under this mode.
    pub fn accepts(&self, transition: &Transition) -> bool {
        match self {
            TriggerMode::Both => true,
            TriggerMode::Rising => transition.is_rising(),
            TriggerMode::Falling => transition.is_falling(),
        }
    }
}

pub struct Debouncer<G, C, D, F> {
    pin: PinId,
    gpio: G,
    clock: C,
    delay: D,
    config: DebounceConfig,
    callback: F,
    previous: PinState,
    current: PinState,
}

impl<G, C, D, F> Debouncer<G, C, D, F>
where
    G: GpioBank,
    C: Clock,
    D: DelayNs,
    F: FnMut(PinId),
{
    /// Configure `pin` as a pulled-up input and seed the state from its
    /// present level.
    pub fn new(
        mut gpio: G,
        clock: C,
        delay: D,
        pin: PinId,
        config: DebounceConfig,
        callback: F,
    ) -> Result<Self, DebounceError> {
        gpio.set_mode(pin, PinMode::InputPullUp)
            .map_err(|e| DebounceError::Pin { pin, kind: e.kind() })?;
        let level = gpio
            .read(pin)
            .map_err(|e| DebounceError::Pin { pin, kind: e.kind() })?;

        debug!(
            "Debouncer on GPIO{}: {:?} trigger, {} ms window, initial level {:?}",
            pin, config.trigger, config.settle_ms, level
        );

        Ok(Self {
            pin,
            gpio,
            clock,
            delay,
            config,
            callback,
            previous: level,
            current: level,
        })
    }

    /// Check the pin once.
    ///
    /// Returns immediately while the pin matches the settled level. Otherwise
    /// the candidate level is held for up to one stabilization window; if the
    /// pin falls back to the settled level at any sample the candidate is
    /// discarded. A committed transition is returned and, when the trigger
    /// mode accepts it, reported to the callback before this returns.
    pub fn poll(&mut self) -> Result<Option<Transition>, DebounceError> {
        if self.read_level()? == self.current {
            return Ok(None);
        }

        let start = self.clock.now_ms();
        let window = u64::from(self.config.settle_ms);
        while self.clock.elapsed_ms(start) < window {
            self.delay.delay_ms(SAMPLE_PERIOD_MS);
            if self.read_level()? == self.current {
                trace!(
                    "GPIO{}: bounce after {} ms ignored",
                    self.pin,
                    self.clock.elapsed_ms(start)
                );
                return Ok(None);
            }
        }

        let level = self.read_level()?;
        if level == self.current {
            return Ok(None);
        }

        self.previous = self.current;
        self.current = level;
        let transition = Transition {
            from: self.previous,
            to: self.current,
        };
        debug!("GPIO{}: {:?} -> {:?}", self.pin, transition.from, transition.to);

        if self.config.trigger.accepts(&transition) {
            (self.callback)(self.pin);
        }

        Ok(Some(transition))
    }

    fn read_level(&mut self) -> Result<PinState, DebounceError> {
        let pin = self.pin;
        self.gpio
            .read(pin)
            .map_err(|e| DebounceError::Pin { pin, kind: e.kind() })
    }
}

impl<G, C, D, F> Debouncer<G, C, D, F> {
    pub fn pin(&self) -> PinId {
        self.pin
    }

    pub fn config(&self) -> &DebounceConfig {
        &self.config
    }

    /// Settled level.
    pub fn state(&self) -> PinState {
        self.current
    }

    /// Settled level before the last committed transition.
    pub fn previous_state(&self) -> PinState {
        self.previous
    }

    /// The input idles high through the pull-up; pressed pulls it low.
    pub fn is_pressed(&self) -> bool {
        self.current == PinState::Low
    }

    pub fn is_released(&self) -> bool {
        self.current == PinState::High
    }
}
