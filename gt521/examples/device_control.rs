//! Device control example
//!
//! Run with `GT521_PORT=/dev/ttyUSB0 cargo run --example device_control`.

use std::thread::sleep;
use std::time::Duration;

use gt521::{Device, LinkConfig};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = LinkConfig::from_env()?;
    println!("Connecting to {} at {} baud", config.port, config.baud);

    let mut device = Device::with_config(config);
    device.init()?;
    device.open()?;

    println!("LED on: {}", device.set_led(true)?);
    sleep(Duration::from_secs(1));
    println!("LED off: {}", device.set_led(false)?);

    for _ in 0..5 {
        println!("Finger pressed: {:?}", device.is_finger_pressed()?);
        sleep(Duration::from_millis(500));
    }

    println!("Enrolled: {:?}", device.get_enrolled_count()?);

    device.close()?;
    Ok(())
}
