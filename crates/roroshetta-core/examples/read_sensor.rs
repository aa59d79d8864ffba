//! Example: Reading One Roroshetta Sense
//!
//! Waits for the device to advertise, runs a single session and prints
//! the decoded reading along with every session state change.
//!
//! Run with: `cargo run --example read_sensor -- <DEVICE_ADDRESS>`

use std::env;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use roroshetta_core::{
    BleTransport, Coordinator, CoordinatorConfig, DeviceIdentity, RefreshOutcome, scan,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();
    let target = if args.len() > 1 {
        DeviceIdentity::new(&args[1])
    } else {
        eprintln!("Usage: {} <DEVICE_ADDRESS>", args[0]);
        eprintln!();
        eprintln!("Example:");
        eprintln!("  {} C8:2B:96:10:20:30", args[0]);
        std::process::exit(1);
    };

    let adapter = scan::get_adapter(0).await?;
    let mut adverts = scan::advertisements(&adapter).await?;
    let coordinator = Coordinator::new(
        Arc::new(BleTransport::new(adapter.clone())),
        CoordinatorConfig::default(),
    );

    println!("Waiting for {} to advertise...", target);
    let seen = tokio::time::timeout(Duration::from_secs(30), async {
        while let Some(adv) = adverts.next().await {
            if coordinator.on_advertisement(&adv).await.as_ref() == Some(&target) {
                return true;
            }
        }
        false
    })
    .await
    .unwrap_or(false);
    scan::stop_scan(&adapter).await?;

    if !seen {
        eprintln!("{} not found", target);
        std::process::exit(1);
    }

    if let Some(mut state) = coordinator.registry().watch_state(&target).await {
        tokio::spawn(async move {
            while state.changed().await.is_ok() {
                println!("  state: {}", *state.borrow());
            }
        });
    }

    match coordinator.request_refresh(&target).await? {
        RefreshOutcome::Published(reading) => {
            println!();
            println!("Current Readings:");
            println!("  Temperature: {:.1} °C", reading.temperature);
            println!("  Heat index:  {:.1} °C", reading.heat_index);
            println!("  Humidity:    {:.1}%", reading.humidity);
            println!("  CO2:         {} ppm", reading.co2);
            println!("  TVOC:        {} ppb", reading.tvoc);
            println!("  PM2.5:       {:.1} µg/m³", reading.pm2_5);
            println!("  AQI:         {}", reading.aqi);
            println!(
                "  Light:       {:.0}%",
                reading.light_fraction() * 100.0
            );
            println!("  Fan:         {:.0}%", reading.fan_fraction() * 100.0);
            println!("  Filter:      {}%", reading.grease_filter_status);
        }
        RefreshOutcome::Failed(e) => eprintln!("Read failed: {}", e),
        other => eprintln!("No reading: {:?}", other),
    }

    Ok(())
}
