//! Runtime configuration.
//!
//! Every knob has a default matching the reference rig and can be
//! overridden through `VRLINK_*` environment variables, since a host-loaded
//! driver has no command line.

use crate::host::ControllerRole;
use crate::link::LinkSettings;
use crate::types::Vec3;
use std::time::Duration;

#[cfg(windows)]
pub const DEFAULT_HEADSET_PORT: &str = "COM4";
#[cfg(windows)]
pub const DEFAULT_TRACKING_PORT: &str = "COM3";
#[cfg(not(windows))]
pub const DEFAULT_HEADSET_PORT: &str = "/dev/ttyACM0";
#[cfg(not(windows))]
pub const DEFAULT_TRACKING_PORT: &str = "/dev/ttyACM1";

pub const DEFAULT_BAUD_RATE: u32 = 115_200;
pub const DEFAULT_BUTTON_LINE: &str = "menu";

/// Serial links owned by the device bridge.
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    pub headset_port: String,
    /// Separate positional-tracking board, if fitted.
    pub tracking_port: Option<String>,
    pub baud_rate: u32,
    pub reconnect_interval: Duration,
    pub idle_timeout: Option<Duration>,
    /// Read each port on its own thread instead of in the frame tick.
    pub threaded_reader: bool,
    /// Digital line that drives the menu button.
    pub button_line: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        let link = LinkSettings::default();
        Self {
            headset_port: DEFAULT_HEADSET_PORT.to_string(),
            tracking_port: Some(DEFAULT_TRACKING_PORT.to_string()),
            baud_rate: DEFAULT_BAUD_RATE,
            reconnect_interval: link.reconnect_interval,
            idle_timeout: link.idle_timeout,
            threaded_reader: false,
            button_line: DEFAULT_BUTTON_LINE.to_string(),
        }
    }
}

impl BridgeConfig {
    /// Headset-only configuration on the given port.
    pub fn headset_only(port: &str) -> Self {
        Self {
            headset_port: port.to_string(),
            tracking_port: None,
            ..Self::default()
        }
    }

    pub fn from_env() -> Self {
        let defaults = Self::default();
        let tracking_port = match std::env::var("VRLINK_TRACKING_PORT") {
            Ok(v) => {
                let v = v.trim();
                if v.is_empty() || v.eq_ignore_ascii_case("none") {
                    None
                } else {
                    Some(v.to_string())
                }
            }
            Err(_) => defaults.tracking_port,
        };
        let idle_ms = read_env_u64(
            "VRLINK_IDLE_TIMEOUT_MS",
            defaults.idle_timeout.map_or(0, |d| d.as_millis() as u64),
        );

        Self {
            headset_port: read_env_string("VRLINK_HEADSET_PORT", &defaults.headset_port),
            tracking_port,
            baud_rate: read_env_u64("VRLINK_BAUD_RATE", defaults.baud_rate as u64) as u32,
            reconnect_interval: Duration::from_millis(read_env_u64(
                "VRLINK_RECONNECT_MS",
                defaults.reconnect_interval.as_millis() as u64,
            )),
            idle_timeout: (idle_ms > 0).then(|| Duration::from_millis(idle_ms)),
            threaded_reader: read_env_bool("VRLINK_THREADED_READER", defaults.threaded_reader),
            button_line: read_env_string("VRLINK_BUTTON_LINE", &defaults.button_line),
        }
    }

    pub fn link_settings(&self) -> LinkSettings {
        LinkSettings {
            reconnect_interval: self.reconnect_interval,
            idle_timeout: self.idle_timeout,
        }
    }
}

/// Geometry reported by the HMD display component. The rig has no panel of
/// its own, so these only shape the host's mirror window.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayConfig {
    pub window_width: u32,
    pub window_height: u32,
    pub render_width: u32,
    pub render_height: u32,
    pub display_frequency: f32,
    pub ipd_meters: f32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            window_width: 2560,
            window_height: 1440,
            render_width: 2560,
            render_height: 1440,
            display_frequency: 60.0,
            ipd_meters: 0.063,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HmdConfig {
    pub serial_number: String,
    pub model_number: String,
    pub manufacturer: String,
    pub render_model: String,
    pub display: DisplayConfig,
}

impl Default for HmdConfig {
    fn default() -> Self {
        Self {
            serial_number: "vrlink_headset_001".into(),
            model_number: "CustomVRHeadset_V1".into(),
            manufacturer: "CustomVR".into(),
            render_model: "generic_hmd".into(),
            display: DisplayConfig::default(),
        }
    }
}

/// The auxiliary controller exists only to surface the menu button.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    pub enabled: bool,
    pub serial_number: String,
    pub model_number: String,
    pub manufacturer: String,
    pub render_model: String,
    pub role: ControllerRole,
    pub input_profile_path: String,
    pub controller_type: String,
    pub menu_input_path: String,
    /// Where the controller is parked. It is never tracked.
    pub fixed_position: Vec3,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            serial_number: "vrlink_controller_001".into(),
            model_number: "VirtualController".into(),
            manufacturer: "CustomVR".into(),
            render_model: "{htc}vr_tracker_vive_1_0".into(),
            role: ControllerRole::LeftHand,
            input_profile_path: "{htc}/input/vive_controller_profile.json".into(),
            controller_type: "vive_controller".into(),
            menu_input_path: "/input/application_menu/click".into(),
            fixed_position: Vec3 {
                x: 0.0,
                y: -1.0,
                z: 0.0,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DriverConfig {
    pub bridge: BridgeConfig,
    pub hmd: HmdConfig,
    pub controller: ControllerConfig,
}

impl DriverConfig {
    pub fn from_env() -> Self {
        let defaults = ControllerConfig::default();
        Self {
            bridge: BridgeConfig::from_env(),
            hmd: HmdConfig::default(),
            controller: ControllerConfig {
                enabled: read_env_bool("VRLINK_CONTROLLER_ENABLED", defaults.enabled),
                menu_input_path: read_env_string("VRLINK_MENU_INPUT_PATH", &defaults.menu_input_path),
                ..defaults
            },
        }
    }
}

fn read_env_bool(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .and_then(|v| parse_bool(&v))
        .unwrap_or(default)
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn read_env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn read_env_string(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}
