//! # vrlink - serial head-tracking bridge for Arduino VR rigs
//!
//! Reads orientation, position and button telemetry from one or two serial
//! boards and presents the rig to a VR host runtime as a head-mounted
//! display plus an untracked controller carrying the menu button.
//!
//! - [`DeviceBridge`] owns the serial links and publishes the latest pose
//! - [`DriverProvider`] drives the bridge and devices once per host frame
//! - C FFI for hosts that load the library directly
//!
//! ## Quick Start
//! ```no_run
//! use vrlink::{BridgeConfig, DeviceBridge};
//!
//! let bridge = DeviceBridge::create(&BridgeConfig::headset_only("/dev/ttyACM0")).unwrap();
//! loop {
//!     bridge.update();
//!     let pose = bridge.get_pose();
//!     println!("q: {:?} connected: {}", pose.orientation, pose.connected);
//!     std::thread::sleep(std::time::Duration::from_millis(11));
//! }
//! ```

pub mod error;
pub mod types;
pub mod protocol;
pub mod stream;
pub mod link;
pub mod config;
pub mod bridge;
pub mod host;
pub mod display;
pub mod hmd;
pub mod controller;
pub mod provider;
pub mod factory;
pub mod mock;
pub mod ffi;

pub use bridge::DeviceBridge;
pub use config::{BridgeConfig, DriverConfig};
pub use controller::{ControllerDevice, ControllerInput};
pub use error::{CreateError, DecodeError, InitError, LinkError};
pub use factory::driver_factory;
pub use hmd::HmdDevice;
pub use host::ServerTrackedDeviceProvider;
pub use provider::DriverProvider;
pub use types::*;
