//! Example: Scanning for Roroshetta Sense Devices
//!
//! Listens to advertisements for a while and lists every device that
//! matches the Roroshetta manufacturer ID and service.
//!
//! Run with: `cargo run --example scan_devices`

use std::time::Duration;

use futures::StreamExt;
use roroshetta_core::{match_advertisement, scan};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let adapter = scan::get_adapter(0).await?;
    let adverts = scan::advertisements(&adapter).await?;

    println!("Scanning for 10 seconds...");
    let mut seen = Vec::new();
    let mut matches = adverts
        .filter_map(|adv| async move { match_advertisement(&adv).map(|id| (id, adv)) })
        .take_until(tokio::time::sleep(Duration::from_secs(10)))
        .boxed();

    while let Some((identity, adv)) = matches.next().await {
        if !seen.contains(&identity) {
            println!(
                "  {}  {}  RSSI: {}",
                identity,
                adv.local_name.as_deref().unwrap_or("(unnamed)"),
                adv.rssi.map_or_else(|| "?".to_string(), |r| format!("{r} dBm"))
            );
            seen.push(identity);
        }
    }

    scan::stop_scan(&adapter).await?;
    println!("Found {} device(s)", seen.len());
    Ok(())
}
