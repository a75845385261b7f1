//! Desktop simulator for the greenhouse sensor node.
//!
//! Runs the node's control loop against a [`SimBoard`] in simulated time: a
//! button that bounces on every press and release, and three soil moisture
//! probes whose readings drift slowly. Everything the loop observes is logged,
//! so run it with `RUST_LOG=debug` to also see committed transitions and
//! `RUST_LOG=trace` to see discarded bounces.

use std::cell::Cell;
use std::rc::Rc;

use embedded_hal::digital::PinState;
use log::{info, warn};

use greenhouse_core::sim::SimBoard;
use greenhouse_core::{
    AnalogSensor, Clock, DebounceConfig, MuxConfig, NodeConfig, PinId, TriggerMode,
};

// ---------------------------------------------------------------------------
// Board layout
// ---------------------------------------------------------------------------

const BUTTON_PIN: PinId = 0;
const ANALOG_PIN: PinId = 1;

const PROBES: [AnalogSensor; 3] = [
    AnalogSensor::new(4, 5),
    AnalogSensor::new(6, 7),
    AnalogSensor::new(15, 16),
];

/// Full scale of the 12-bit ADC.
const ADC_MAX: f64 = 4095.0;

// ---------------------------------------------------------------------------
// Timing
// ---------------------------------------------------------------------------

/// Simulated run time.
const RUN_MS: u64 = 20_000;

/// Interval between probe sweeps.
const SAMPLE_INTERVAL_MS: u64 = 2_000;

/// Button presses as (press time, hold time).
const PRESSES: [(u64, u64); 4] = [(1_200, 300), (4_000, 80), (9_500, 1_500), (15_000, 30)];

// ---------------------------------------------------------------------------
// Stimulus generation
// ---------------------------------------------------------------------------

/// Contact bounce around an edge: the level flips a few times within ~10 ms
/// before settling on `settled`.
fn bounce(at_ms: u64, settled: PinState) -> Vec<(u64, PinState)> {
    let other = !settled;
    vec![
        (at_ms, settled),
        (at_ms + 2, other),
        (at_ms + 3, settled),
        (at_ms + 7, other),
        (at_ms + 9, settled),
    ]
}

fn button_script() -> Vec<(u64, PinState)> {
    PRESSES
        .iter()
        .flat_map(|&(at_ms, hold_ms)| {
            let mut edges = bounce(at_ms, PinState::Low);
            edges.extend(bounce(at_ms + hold_ms, PinState::High));
            edges
        })
        .collect()
}

/// Moisture of probe `index` at `t_ms`, as a raw ADC count.
///
/// Each probe dries out slowly along its own curve.
fn probe_raw(index: usize, t_ms: u64) -> u16 {
    let t = t_ms as f64 / 1000.0;
    let phase = index as f64 * 1.7;
    let moisture = 0.55 + 0.25 * (t / 40.0 + phase).sin() + 0.03 * (t / 3.0 + phase).cos();
    (moisture.clamp(0.0, 1.0) * ADC_MAX) as u16
}

fn node_config() -> NodeConfig {
    NodeConfig::new(
        BUTTON_PIN,
        DebounceConfig::new(TriggerMode::Both, 50),
        ANALOG_PIN,
        MuxConfig::default(),
    )
    .with_sensors(&PROBES)
    .expect("PROBES is shorter than the registry")
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() {
    env_logger::init();
    info!("Starting greenhouse node simulator");
    info!(
        "{} probes on ADC pin {}, button on GPIO{}, {} s of simulated time",
        PROBES.len(),
        ANALOG_PIN,
        BUTTON_PIN,
        RUN_MS / 1000
    );

    let board = SimBoard::new();
    let node = node_config();

    let mut probes = node
        .build_reader(board.clone(), board.clone(), board.clone())
        .expect("simulated pins never fail");

    let events = Rc::new(Cell::new(0u32));
    let counter = events.clone();
    let mut button = node
        .build_debouncer(board.clone(), board.clone(), board.clone(), move |pin| {
            counter.set(counter.get() + 1);
            info!("Button event on GPIO{}", pin);
        })
        .expect("simulated pins never fail");

    board.script_input(BUTTON_PIN, &button_script());

    let mut next_sample = 0;
    let mut sweeps = 0u32;

    // -----------------------------------------------------------------------
    // Main loop
    // -----------------------------------------------------------------------
    while board.now_ms() < RUN_MS {
        // --- Button ---------------------------------------------------------
        match button.poll() {
            Ok(Some(_)) => info!(
                "Button {} at {} ms",
                if button.is_pressed() { "pressed" } else { "released" },
                board.now_ms()
            ),
            Ok(None) => {}
            Err(e) => warn!("Button poll failed: {}", e),
        }

        // --- Probes ---------------------------------------------------------
        if board.now_ms() >= next_sample {
            for (index, probe) in PROBES.iter().enumerate() {
                board.connect_probe(
                    probe.vcc,
                    probe.gnd,
                    ANALOG_PIN,
                    probe_raw(index, board.now_ms()),
                );
            }

            match probes.read_all() {
                Ok(readings) => {
                    for reading in readings.iter() {
                        let percent = f64::from(reading.raw) / ADC_MAX * 100.0;
                        info!(
                            "t={:>6} ms  probe GPIO{:>2}/GPIO{:>2}: raw {:>4} ({:.1} %)",
                            board.now_ms(),
                            reading.sensor.vcc,
                            reading.sensor.gnd,
                            reading.raw,
                            percent
                        );
                    }
                }
                Err(e) => warn!("Probe sweep failed: {}", e),
            }

            if !board.driven_pins().is_empty() {
                warn!("Pins left powered after sweep: {:?}", board.driven_pins());
            }
            sweeps += 1;
            next_sample += SAMPLE_INTERVAL_MS;
        }

        board.advance_ms(1);
    }

    info!(
        "Simulator exiting: {} button events from {} presses, {} probe sweeps",
        events.get(),
        PRESSES.len(),
        sweeps
    );
}
