//! Drive the full driver against a simulated rig and print what the host
//! would see.
//!
//! Usage: RUST_LOG=info cargo run --example simulate

use std::f64::consts::PI;
use std::sync::Arc;
use std::time::Duration;
use vrlink::host::{Property, ServerTrackedDeviceProvider};
use vrlink::mock::{MockConnector, MockWire, RecordingHost};
use vrlink::{BridgeConfig, DriverConfig, DriverProvider, Quaternion, Sample, Vec3};

const TICKS: u32 = 270;

fn main() {
    env_logger::init();

    let headset = MockWire::new();
    let tracking = MockWire::new();
    let connector = MockConnector::new();
    connector.attach("sim-headset", headset.clone());
    connector.attach("sim-tracking", tracking.clone());

    let config = DriverConfig {
        bridge: BridgeConfig {
            headset_port: "sim-headset".into(),
            tracking_port: Some("sim-tracking".into()),
            reconnect_interval: Duration::from_millis(200),
            ..BridgeConfig::default()
        },
        ..DriverConfig::default()
    };
    let hmd_serial = config.hmd.serial_number.clone();
    let controller_serial = config.controller.serial_number.clone();

    let host = RecordingHost::new();
    let mut provider = DriverProvider::new(config).with_connector(Arc::new(connector));
    if let Err(e) = provider.init(Box::new(host.clone())) {
        eprintln!("Init failed: {} (code {})", e, e.code());
        std::process::exit(1);
    }
    for (id, serial) in [hmd_serial.as_str(), controller_serial.as_str()].iter().enumerate() {
        if let Err(e) = provider.activate_device(serial, id as u32) {
            eprintln!("Activating {} failed: {}", serial, e);
        }
    }
    println!("HMD model: {:?}", host.property(0, Property::ModelNumber));

    for tick in 0..TICKS {
        // Slow yaw sweep with a bobbing head.
        let yaw = (tick as f64 / TICKS as f64) * 2.0 * PI;
        headset.push_sample(&Sample::Orientation(Quaternion {
            w: (yaw / 2.0).cos(),
            x: 0.0,
            y: (yaw / 2.0).sin(),
            z: 0.0,
        }));
        tracking.push_sample(&Sample::Position(Vec3 {
            x: 0.0,
            y: 1.7 + 0.02 * (yaw * 4.0).sin(),
            z: 0.0,
        }));
        if tick % 90 == 30 {
            headset.push(b"B,menu,1;");
        }
        if tick % 90 == 40 {
            headset.push(b"B,menu,0;");
        }
        if tick == 150 {
            println!("-- unplugging tracking board --");
            tracking.unplug();
        }
        if tick == 200 {
            println!("-- replugging tracking board --");
            tracking.plug();
        }

        provider.run_frame();

        if tick % 30 == 0 {
            if let Some(pose) = host.last_pose(0) {
                println!(
                    "tick {:3}  {:?}  pos=[{:+.3}, {:+.3}, {:+.3}]  q=[{:+.3}, {:+.3}, {:+.3}, {:+.3}]",
                    tick,
                    pose.result,
                    pose.vec_position[0],
                    pose.vec_position[1],
                    pose.vec_position[2],
                    pose.q_rotation.w,
                    pose.q_rotation.x,
                    pose.q_rotation.y,
                    pose.q_rotation.z,
                );
            }
        }
        std::thread::sleep(Duration::from_millis(11));
    }

    println!("Button updates: {:?}", host.log().button_updates);
    if let Some(bridge) = provider.bridge() {
        println!("{:#?}", bridge.stats());
    }
    provider.cleanup();
}
