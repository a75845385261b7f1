//! ESP32-S3 firmware-specific modules for the greenhouse node
//!
//! This crate contains the hardware-specific implementations of the
//! `greenhouse_core::hal` traits: register-level GPIO, the ADC1 one-shot
//! driver and the embassy millisecond clock.

#![no_std]

pub mod adc;
pub mod clock;
pub mod register_gpio;
