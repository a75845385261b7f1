#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use embassy_executor::Spawner;
use embassy_time::{Delay, Duration, Instant, Timer};
use esp_hal::clock::CpuClock;
use esp_hal::timer::timg::TimerGroup;
use greenhouse_core::{AnalogSensor, DebounceConfig, MuxConfig, NodeConfig, TriggerMode};
use greenhouse_firmware::adc::SharedAdc;
use greenhouse_firmware::clock::EmbassyClock;
use greenhouse_firmware::register_gpio::RegisterGpio;
use log::{error, info};

/// BOOT button, active low.
const BUTTON_PIN: u8 = 0;

/// Shared sense line, ADC1 channel 0.
const ANALOG_PIN: u8 = 1;

/// Soil moisture probes, powered as (vcc, gnd).
const PROBES: [AnalogSensor; 3] = [
    AnalogSensor::new(4, 5),
    AnalogSensor::new(6, 7),
    AnalogSensor::new(15, 16),
];

const SAMPLE_INTERVAL: Duration = Duration::from_secs(2);

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    rtt_target::rprintln!("PANIC: {}", info);
    loop {}
}

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

fn node_config() -> NodeConfig {
    NodeConfig::new(
        BUTTON_PIN,
        DebounceConfig::new(TriggerMode::Falling, 50),
        ANALOG_PIN,
        MuxConfig::default(),
    )
    .with_sensors(&PROBES)
    .expect("PROBES is shorter than the registry")
}

#[esp_rtos::main]
async fn main(_spawner: Spawner) -> ! {
    rtt_target::rtt_init_log!();

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    info!("Embassy initialized!");

    let node = node_config();
    let adc = SharedAdc::new(peripherals.ADC1, peripherals.GPIO1, ANALOG_PIN);

    let mut probes = node
        .build_reader(RegisterGpio::new(), adc, Delay)
        .expect("Failed to register probes");
    info!("{} probes on ADC pin {}", probes.len(), probes.analog_pin());

    let mut button = node
        .build_debouncer(RegisterGpio::new(), EmbassyClock, Delay, |pin| {
            info!("Button on GPIO{} pressed", pin);
        })
        .expect("Failed to configure button");

    let mut last_sample = Instant::now();

    loop {
        if let Err(e) = button.poll() {
            error!("Button poll failed: {}", e);
        }

        if last_sample.elapsed() >= SAMPLE_INTERVAL {
            match probes.read_all() {
                Ok(readings) => {
                    for reading in readings.iter() {
                        info!(
                            "Probe GPIO{}/GPIO{}: {}",
                            reading.sensor.vcc, reading.sensor.gnd, reading.raw
                        );
                    }
                }
                Err(e) => error!("Probe read failed: {}", e),
            }
            last_sample = Instant::now();
        }

        Timer::after(Duration::from_millis(1)).await;
    }
}
