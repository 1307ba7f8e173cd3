use crate::bridge::DeviceBridge;
use crate::config::DriverConfig;
use crate::controller::{ControllerDevice, ControllerInput};
use crate::error::InitError;
use crate::hmd::HmdDevice;
use crate::host::{DriverHost, Frame, ServerTrackedDeviceProvider, TrackedDeviceDriver};
use crate::link::Connector;
use std::sync::Arc;

/// Owns the device bridge and the devices registered with the host.
///
/// The bridge is built before any device and destroyed after all of them.
pub struct DriverProvider {
    config: DriverConfig,
    connector: Option<Arc<dyn Connector>>,
    controller_input: Option<ControllerInput>,
    host: Option<Box<dyn DriverHost>>,
    bridge: Option<Arc<DeviceBridge>>,
    devices: Vec<Box<dyn TrackedDeviceDriver>>,
}

impl DriverProvider {
    pub fn new(config: DriverConfig) -> Self {
        Self {
            config,
            connector: None,
            controller_input: None,
            host: None,
            bridge: None,
            devices: Vec::new(),
        }
    }

    /// Open ports through `connector` instead of real serial ports.
    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Drive the controller's menu button from `input`.
    pub fn with_controller_input(mut self, input: ControllerInput) -> Self {
        self.controller_input = Some(input);
        self
    }

    pub fn is_initialized(&self) -> bool {
        self.bridge.is_some()
    }

    pub fn bridge(&self) -> Option<&Arc<DeviceBridge>> {
        self.bridge.as_ref()
    }

    pub fn device(&self, serial_number: &str) -> Option<&dyn TrackedDeviceDriver> {
        self.devices
            .iter()
            .find(|d| d.serial_number() == serial_number)
            .map(|d| d.as_ref())
    }

    /// Route the host's activation of a registered device.
    pub fn activate_device(&mut self, serial_number: &str, object_id: u32) -> Result<(), InitError> {
        let host = self.host.as_mut().ok_or(InitError::NotInitialized)?;
        let device = self
            .devices
            .iter_mut()
            .find(|d| d.serial_number() == serial_number)
            .ok_or_else(|| {
                log::warn!("Activation for unknown device {}", serial_number);
                InitError::UnknownDevice(object_id)
            })?;
        device.activate(object_id, host.as_mut())
    }

    pub fn deactivate_device(&mut self, serial_number: &str) {
        match self.devices.iter_mut().find(|d| d.serial_number() == serial_number) {
            Some(device) => device.deactivate(),
            None => log::warn!("Deactivation for unknown device {}", serial_number),
        }
    }

    fn build_bridge(&self) -> Result<DeviceBridge, InitError> {
        let result = match &self.connector {
            Some(connector) => DeviceBridge::with_connector(&self.config.bridge, connector.clone()),
            None => DeviceBridge::create(&self.config.bridge),
        };
        result.map_err(|e| {
            log::warn!("Failed to create device bridge: {}", e);
            InitError::BridgeUnavailable
        })
    }
}

impl ServerTrackedDeviceProvider for DriverProvider {
    fn init(&mut self, mut host: Box<dyn DriverHost>) -> Result<(), InitError> {
        if self.is_initialized() {
            log::warn!("Provider already initialised, ignoring init");
            return Ok(());
        }

        let bridge = Arc::new(self.build_bridge()?);

        let mut devices: Vec<Box<dyn TrackedDeviceDriver>> = vec![Box::new(HmdDevice::new(
            self.config.hmd.clone(),
            Arc::downgrade(&bridge),
        ))];
        if self.config.controller.enabled {
            let input = self.controller_input.take().unwrap_or_default();
            devices.push(Box::new(ControllerDevice::new(
                self.config.controller.clone(),
                Arc::downgrade(&bridge),
                input,
            )));
        }

        for device in &devices {
            if !host.tracked_device_added(device.serial_number(), device.device_class()) {
                log::warn!("Host refused device {}", device.serial_number());
            }
        }

        log::info!("Driver initialised with {} device(s)", devices.len());
        self.bridge = Some(bridge);
        self.devices = devices;
        self.host = Some(host);
        Ok(())
    }

    fn cleanup(&mut self) {
        if self.bridge.is_none() && self.devices.is_empty() {
            return;
        }

        self.devices.clear();
        if let Some(bridge) = self.bridge.take() {
            match Arc::try_unwrap(bridge) {
                Ok(bridge) => bridge.destroy(),
                Err(bridge) => {
                    log::warn!("Device bridge still shared at cleanup, closing links anyway");
                    bridge.shutdown();
                }
            }
        }
        self.host = None;
        log::info!("Driver cleaned up");
    }

    fn run_frame(&mut self) {
        let (Some(bridge), Some(host)) = (self.bridge.as_ref(), self.host.as_mut()) else {
            log::trace!("run_frame before init or after cleanup");
            return;
        };

        bridge.update();
        let frame = Frame {
            snapshot: bridge.get_pose(),
            button_edges: bridge.take_button_edges(),
        };
        for device in self.devices.iter_mut() {
            device.run_frame(&frame, host.as_mut());
        }
    }
}

impl Drop for DriverProvider {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BridgeConfig, ControllerConfig};
    use crate::host::{DeviceClass, DriverPose, TrackingResult};
    use crate::mock::{MockConnector, MockWire, RecordingHost};
    use crate::types::{ConnectionState, LinkRole, Quaternion};
    use std::time::Duration;

    const HMD: &str = "vrlink_headset_001";
    const CONTROLLER: &str = "vrlink_controller_001";

    fn test_config() -> DriverConfig {
        DriverConfig {
            bridge: BridgeConfig {
                reconnect_interval: Duration::ZERO,
                idle_timeout: None,
                ..BridgeConfig::headset_only("ttyHEAD")
            },
            ..DriverConfig::default()
        }
    }

    fn provider_on(wire: &MockWire, config: DriverConfig) -> DriverProvider {
        let connector = MockConnector::new();
        connector.attach("ttyHEAD", wire.clone());
        DriverProvider::new(config).with_connector(Arc::new(connector))
    }

    fn started(wire: &MockWire) -> (DriverProvider, RecordingHost) {
        let host = RecordingHost::new();
        let mut provider = provider_on(wire, test_config());
        provider.init(Box::new(host.clone())).unwrap();
        provider.activate_device(HMD, 0).unwrap();
        provider.activate_device(CONTROLLER, 1).unwrap();
        (provider, host)
    }

    #[test]
    fn test_init_registers_devices() {
        let wire = MockWire::new();
        let (provider, host) = started(&wire);

        assert_eq!(
            host.log().added,
            vec![
                (HMD.to_string(), DeviceClass::Hmd),
                (CONTROLLER.to_string(), DeviceClass::Controller)
            ]
        );
        assert_eq!(provider.device(HMD).and_then(|d| d.object_id()), Some(0));
        assert_eq!(provider.device(CONTROLLER).and_then(|d| d.object_id()), Some(1));
        assert!(!provider.should_block_standby_mode());
        assert!(provider.interface_versions().contains(&"IServerTrackedDeviceProvider_004"));
    }

    #[test]
    fn test_controller_can_be_disabled() {
        let wire = MockWire::new();
        let mut config = test_config();
        config.controller = ControllerConfig {
            enabled: false,
            ..ControllerConfig::default()
        };
        let host = RecordingHost::new();
        let mut provider = provider_on(&wire, config);
        provider.init(Box::new(host.clone())).unwrap();

        assert_eq!(host.log().added.len(), 1);
        assert!(provider.device(CONTROLLER).is_none());
    }

    #[test]
    fn test_one_snapshot_per_tick() {
        let wire = MockWire::new();
        let (mut provider, host) = started(&wire);

        wire.push(b"Q,1,0,0,0;P,0.0,-1.0,0.0;B,menu,1;");
        provider.run_frame();

        let bridge = provider.bridge().unwrap().clone();
        let expected = DriverPose::from_snapshot(&bridge.get_pose());
        let hmd_pose = host.last_pose(0).unwrap();
        assert_eq!(hmd_pose, expected);
        assert_eq!(hmd_pose.result, TrackingResult::RunningOk);
        assert_eq!(hmd_pose.vec_position, [0.0, -1.0, 0.0]);
        assert_eq!(hmd_pose.q_rotation, Quaternion::IDENTITY);

        // The press reached the controller in the same tick.
        assert_eq!(host.log().button_updates, vec![(1, true)]);
        assert!(bridge.take_button_edges().is_empty());

        wire.push(b"B,menu,0;");
        provider.run_frame();
        assert_eq!(host.log().button_updates, vec![(1, true), (1, false)]);
        assert_eq!(host.log().poses.len(), 4);
    }

    #[test]
    fn test_polled_controller_input() {
        let wire = MockWire::new();
        let mut ticks = 0u32;
        let input = ControllerInput::Polled(Box::new(move || {
            ticks += 1;
            ticks == 2
        }));
        let host = RecordingHost::new();
        let mut provider = provider_on(&wire, test_config()).with_controller_input(input);
        provider.init(Box::new(host.clone())).unwrap();
        provider.activate_device(CONTROLLER, 1).unwrap();

        // Bridge transitions are ignored by a polled controller.
        wire.push(b"B,menu,1;");
        for _ in 0..3 {
            provider.run_frame();
        }
        assert_eq!(host.log().button_updates, vec![(1, true), (1, false)]);
    }

    #[test]
    fn test_bridge_failure_fails_init() {
        let wire = MockWire::new();
        let mut config = test_config();
        config.bridge.headset_port.clear();
        let mut provider = provider_on(&wire, config);

        let err = provider.init(Box::new(RecordingHost::new())).unwrap_err();
        assert_eq!(err, InitError::BridgeUnavailable);
        assert_eq!(err.code(), 200);
        assert!(!provider.is_initialized());
    }

    #[test]
    fn test_lifecycle_routing_errors() {
        let wire = MockWire::new();
        let mut provider = provider_on(&wire, test_config());
        assert_eq!(provider.activate_device(HMD, 0), Err(InitError::NotInitialized));

        provider.init(Box::new(RecordingHost::new())).unwrap();
        assert_eq!(provider.activate_device("nope", 7), Err(InitError::UnknownDevice(7)));

        provider.activate_device(HMD, 0).unwrap();
        provider.deactivate_device(HMD);
        assert_eq!(provider.device(HMD).and_then(|d| d.object_id()), None);
    }

    #[test]
    fn test_cleanup_is_idempotent() {
        let wire = MockWire::new();
        let (mut provider, host) = started(&wire);
        provider.run_frame();
        let poses = host.log().poses.len();

        provider.cleanup();
        provider.cleanup();
        assert!(!provider.is_initialized());
        assert!(provider.device(HMD).is_none());

        provider.run_frame();
        assert_eq!(host.log().poses.len(), poses);
    }

    #[test]
    fn test_cleanup_closes_shared_bridge() {
        let wire = MockWire::new();
        let (mut provider, _host) = started(&wire);
        wire.push(b"Q,1,0,0,0;");
        provider.run_frame();
        let kept = provider.bridge().unwrap().clone();
        assert!(kept.is_connected());
        let attempts = wire.open_attempts();

        provider.cleanup();
        assert!(!kept.is_connected());
        assert_eq!(kept.link_states(), vec![(LinkRole::Headset, ConnectionState::Disconnected)]);
        kept.update();
        assert_eq!(wire.open_attempts(), attempts);
    }
}
