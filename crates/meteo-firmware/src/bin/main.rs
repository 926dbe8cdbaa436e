#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use embassy_executor::Spawner;
use embassy_time::{Delay, Duration, Timer};
use embedded_hal_bus::spi::ExclusiveDevice;
use esp_hal::clock::CpuClock;
use esp_hal::gpio::{Input, InputConfig, Level, Output, OutputConfig, Pull};
use esp_hal::spi::Mode;
use esp_hal::spi::master::{Config as SpiConfig, Spi};
use esp_hal::time::Rate;
use esp_hal::timer::timg::TimerGroup;
use log::{error, info};

use meteo_core::config::Bmp280Config;
use meteo_core::sensors::{Bmp280Sensor, Dht11Sensor};
use meteo_core::{Monitor, MonitorConfig};
use meteo_firmware::clock::EmbassyClock;
use meteo_firmware::single_wire_pin::SingleWirePin;

/// GPIO the DHT11 data line is wired to.
const DHT11_GPIO: u8 = 21;

/// BMP280 SPI clock.
const BMP280_SPI_KHZ: u32 = 500;

/// Pause before retrying a failed BMP280 initialisation.
const BMP280_INIT_RETRY: Duration = Duration::from_secs(1);

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    rtt_target::rprintln!("PANIC: {}", info);
    loop {}
}

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

#[allow(
    clippy::large_stack_frames,
    reason = "it's not unusual to allocate larger buffers etc. in main"
)]
#[esp_rtos::main]
async fn main(_spawner: Spawner) -> ! {
    rtt_target::rtt_init_log!();

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    info!("Embassy initialized!");

    // 1. DHT11 data line: input with pull-up, driven low only for the start signal
    let _dht11_pad = Input::new(
        peripherals.GPIO21,
        InputConfig::default().with_pull(Pull::Up),
    );
    let dht11_pin = SingleWirePin::<DHT11_GPIO>::new();
    let dht11 = Dht11Sensor::new(dht11_pin, Delay, EmbassyClock);

    // 2. BMP280 on SPI2, mode 0
    let spi_bus = Spi::new(
        peripherals.SPI2,
        SpiConfig::default()
            .with_frequency(Rate::from_khz(BMP280_SPI_KHZ))
            .with_mode(Mode::_0),
    )
    .unwrap()
    .with_sck(peripherals.GPIO2)
    .with_mosi(peripherals.GPIO3)
    .with_miso(peripherals.GPIO4);

    // 3. Chip select idles high
    let cs = Output::new(peripherals.GPIO5, Level::High, OutputConfig::default());
    let mut spi_device = ExclusiveDevice::new_no_delay(spi_bus, cs).unwrap();

    // 4. Load calibration and configure, retrying until the sensor answers
    let bmp280 = loop {
        match Bmp280Sensor::init(&mut spi_device, Bmp280Config::default()) {
            Ok(bmp280) => break bmp280,
            Err(e) => {
                error!("BMP280 initialisation failed: {}", e);
                Timer::after(BMP280_INIT_RETRY).await;
            }
        }
    };

    info!("Sensors initialized!");

    let mut monitor = Monitor::new(dht11, bmp280, Delay, MonitorConfig::default());
    monitor.run().await
}
