mod config;
mod console;

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use dotenv::dotenv;
use log::{debug, info};
use nikola_gpio::GpioDriver;
use nikola_gpio::gpiod::GpiodDriver;
use nikola_gpio::keypad::GpioKeypad;
use nikola_gpio::mock::MockGpioDriver;
use nikola_gpio::raw::RawGpioDriver;
use nikola_gpio::rotenc::RotEnc;
use sysinfo::System;
use crate::config::{Backend, Config};
use crate::console::{wait_for_quit, Console};

fn main() -> eyre::Result<()> {
    // Initialize environment and logger
    dotenv().ok();
    pretty_env_logger::init();

    const UNKNOWN_STR: &str = "???";

    info!(
        "Nikola v.{} on {} ({})",
        env!("CARGO_PKG_VERSION"),
        System::host_name().as_deref().unwrap_or(UNKNOWN_STR),
        System::long_os_version().as_deref().unwrap_or(UNKNOWN_STR),
    );
    info!("Architecture {}", System::cpu_arch());

    debug!("Trying to load config...");
    let mut config = if let Some(config) = Config::try_load()? {
        info!("Config loaded.");
        config
    } else {
        info!("Config not found. Using default");
        let config = Config::default();
        config.save()?;
        info!("Default config saved.");
        config
    };
    config.apply_env()?;

    match config.backend {
        Backend::Gpiomem => run(&RawGpioDriver::new_gpiomem()?, &config),
        Backend::Mem => run(&RawGpioDriver::new_mem()?, &config),
        Backend::Gpiod => run(&GpiodDriver::open(&config.gpio_chip)?, &config),
        Backend::Mock => run(&MockGpioDriver::default(), &config),
    }
}

fn run<D: GpioDriver>(gpio: &D, config: &Config) -> eyre::Result<()> {
    debug!("{:?} initialized.", gpio);

    let pins = config.pins()?;
    let keymap = config.keymap()?;
    let tick = config.tick()?;
    let encoder_poll_interval = config.encoder_poll_interval()?;
    info!("Keypad @ Rows: {:?}, Cols: {:?}", pins.keypad.rows, pins.keypad.cols);
    info!(
        "Rotary encoder @ A: {}, B: {}, Button: {}",
        pins.rot_enc.pin_a, pins.rot_enc.pin_b, pins.rot_enc.pin_button
    );

    let keypad = GpioKeypad::initialize(gpio, &pins.keypad, keymap)?;
    let rot_enc = RotEnc::initialize(gpio, &pins.rot_enc)?;

    let stop = Arc::new(AtomicBool::new(false));
    {
        // Detached, a blocked stdin read must not hold up shutdown.
        let stop = Arc::clone(&stop);
        thread::spawn(move || wait_for_quit(io::stdin().lock(), &stop));
    }

    info!("Starting main loop, enter q to quit...");

    let result = thread::scope(|s| {
        s.spawn(|| rot_enc.watch(&stop, encoder_poll_interval));

        let result = Console::new(&keypad, &rot_enc).run(tick, &stop);
        stop.store(true, Ordering::Relaxed);
        result
    });

    keypad.shutdown()?;
    rot_enc.shutdown();

    Ok(result?)
}
