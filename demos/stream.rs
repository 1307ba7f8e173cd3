//! Print live poses from the rig's serial boards.
//!
//! Usage: cargo run --example stream [HEADSET_PORT [TRACKING_PORT]]
//! Ports default to VRLINK_* variables or the platform defaults.
//! Press Ctrl+C to stop.

use std::time::{Duration, Instant};
use vrlink::{BridgeConfig, DeviceBridge};

fn main() {
    env_logger::init();

    let mut config = BridgeConfig::from_env();
    let mut args = std::env::args().skip(1);
    if let Some(port) = args.next() {
        config.headset_port = port;
        config.tracking_port = args.next();
    }

    let bridge = match DeviceBridge::create(&config) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("Failed to create bridge: {}", e);
            std::process::exit(1);
        }
    };

    println!("Headset:  {}", config.headset_port);
    println!("Tracking: {}", config.tracking_port.as_deref().unwrap_or("-"));
    println!();
    println!("Streaming (Ctrl+C to stop)...");

    let mut ticks: u64 = 0;
    let mut last_report = Instant::now();

    loop {
        bridge.update();
        ticks += 1;

        for pressed in bridge.take_button_edges() {
            println!("menu {}", if pressed { "pressed" } else { "released" });
        }

        // ~90 Hz tick, print every ~9th
        if ticks % 9 == 0 {
            let pose = bridge.get_pose();
            let q = pose.orientation;
            let p = pose.position;
            println!(
                "{}  pos=[{:+.4}, {:+.4}, {:+.4}]  quat=[{:+.3}, {:+.3}, {:+.3}, {:+.3}]  age={}",
                if pose.connected { "OK  " } else { "LOST" },
                p.x, p.y, p.z,
                q.w, q.x, q.y, q.z,
                pose.age_s().map_or("-".to_string(), |a| format!("{:.3}s", a)),
            );
        }

        let now = Instant::now();
        if now.duration_since(last_report) >= Duration::from_secs(3) {
            for link in bridge.stats().links {
                println!(
                    "--- {} {}: {:?}, {} bytes, {} frames, {} errors, {} opens ---",
                    link.role, link.port, link.state, link.bytes_read, link.frames_decoded, link.decode_errors,
                    link.open_attempts,
                );
            }
            last_report = now;
        }

        std::thread::sleep(Duration::from_millis(11));
    }
}
