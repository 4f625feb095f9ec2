//! Enroll a finger, then identify it a few times
//!
//! A watchdog thread closes the link after two minutes, which ends any
//! workflow still waiting on the sensor.

use std::thread::{self, sleep};
use std::time::Duration;

use gt521::{Device, EnrollFailure, Error, Identification, LinkConfig};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut device = Device::with_config(LinkConfig::from_env()?);
    device.init()?;
    device.open()?;

    let handle = device.close_handle();
    thread::spawn(move || {
        sleep(Duration::from_secs(120));
        handle.close_serial();
    });

    println!("Enrolled before: {:?}", device.get_enrolled_count()?);
    println!("Place a finger on the sensor three times");

    match device.enroll() {
        Ok(id) => println!("Enrolled as #{}", id),
        Err(Error::Enroll(EnrollFailure::AlreadyEnrolled(id))) => {
            println!("Finger already enrolled as #{}", id)
        }
        Err(e) => return Err(e.into()),
    }

    for _ in 0..10 {
        match device.identify()? {
            Identification::Match(id) => println!("Identified #{}", id),
            other => println!("Identify: {}", other),
        }
        sleep(Duration::from_secs(1));
    }

    device.close()?;
    Ok(())
}
