//! Hardware-independent core library for the greenhouse sensor node
//!
//! This crate contains the two polled building blocks of the node firmware:
//! a debounced digital input ([`debouncer::Debouncer`]) and a reader for
//! analog sensors that share one ADC input by switching their power pins
//! ([`multi_analog::MultiAnalog`]).
//!
//! Both are written against the platform traits in [`hal`] so they compile on
//! the ESP32-S3 firmware and on desktop hosts (for the simulator and tests).

#![cfg_attr(not(test), no_std)]

#[cfg(any(test, feature = "sim"))]
extern crate alloc;

pub mod config;
pub mod debouncer;
pub mod hal;
pub mod multi_analog;

#[cfg(any(test, feature = "sim"))]
pub mod sim;

pub use config::{DebounceConfig, MuxConfig, NodeConfig, TriggerMode};
pub use debouncer::{DebounceError, Debouncer, Transition};
pub use hal::{AnalogInput, Clock, GpioBank, PinId, PinMode};
pub use multi_analog::{AnalogSensor, MAX_SENSORS, MultiAnalog, MuxError, Reading};
