use crate::bridge::DeviceBridge;
use crate::config::HmdConfig;
use crate::display::VirtualDisplay;
use crate::error::InitError;
use crate::host::{
    DeviceClass, DisplayComponent, DriverHost, DriverPose, Frame, Property, PropertyValue, TrackedDeviceDriver,
    DISPLAY_COMPONENT_VERSION,
};
use std::sync::Weak;

/// Mirror-window image the host composites for the desktop view.
const MC_IMAGE_WIDTH: i32 = 1920;
const MC_IMAGE_HEIGHT: i32 = 1080;
const MC_IMAGE_CHANNELS: i32 = 3;
const SECONDS_FROM_VSYNC_TO_PHOTONS: f32 = 0.011;
const EDID_VENDOR_ID: i32 = 0xD24E;
const EDID_PRODUCT_ID: i32 = 0x1019;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Activation {
    Inactive,
    Active { object_id: u32 },
}

/// Head-mounted display backed by the device bridge.
pub struct HmdDevice {
    config: HmdConfig,
    bridge: Weak<DeviceBridge>,
    display: VirtualDisplay,
    activation: Activation,
}

impl HmdDevice {
    pub fn new(config: HmdConfig, bridge: Weak<DeviceBridge>) -> Self {
        let display = VirtualDisplay::new(config.display.clone());
        Self {
            config,
            bridge,
            display,
            activation: Activation::Inactive,
        }
    }

    fn publish_properties(&self, object_id: u32, host: &mut dyn DriverHost) {
        let display = &self.config.display;
        let props: [(Property, PropertyValue); 19] = [
            (Property::ModelNumber, self.config.model_number.as_str().into()),
            (Property::ManufacturerName, self.config.manufacturer.as_str().into()),
            (Property::RenderModelName, self.config.render_model.as_str().into()),
            (Property::UserIpdMeters, display.ipd_meters.into()),
            (Property::DisplayFrequency, display.display_frequency.into()),
            (Property::SecondsFromVsyncToPhotons, SECONDS_FROM_VSYNC_TO_PHOTONS.into()),
            (Property::DisplayMcImageWidth, MC_IMAGE_WIDTH.into()),
            (Property::DisplayMcImageHeight, MC_IMAGE_HEIGHT.into()),
            (Property::DisplayMcImageNumChannels, MC_IMAGE_CHANNELS.into()),
            // 0 = direct mode
            (Property::DisplayMcType, 0i32.into()),
            (Property::EdidVendorId, EDID_VENDOR_ID.into()),
            (Property::EdidProductId, EDID_PRODUCT_ID.into()),
            (Property::WillDriftInYaw, true.into()),
            (Property::DeviceProvidesBatteryStatus, false.into()),
            (Property::LensCenterLeftU, 0.5f32.into()),
            (Property::LensCenterLeftV, 0.5f32.into()),
            (Property::LensCenterRightU, 0.5f32.into()),
            (Property::LensCenterRightV, 0.5f32.into()),
            (Property::UserHeadToEyeDepthMeters, 0.0f32.into()),
        ];
        for (property, value) in props {
            host.set_property(object_id, property, value);
        }
    }
}

impl TrackedDeviceDriver for HmdDevice {
    fn serial_number(&self) -> &str {
        &self.config.serial_number
    }

    fn device_class(&self) -> DeviceClass {
        DeviceClass::Hmd
    }

    fn object_id(&self) -> Option<u32> {
        match self.activation {
            Activation::Active { object_id } => Some(object_id),
            Activation::Inactive => None,
        }
    }

    fn activate(&mut self, object_id: u32, host: &mut dyn DriverHost) -> Result<(), InitError> {
        if let Activation::Active { object_id: current } = self.activation {
            log::warn!(
                "HMD {} already active as {}, ignoring activation as {}",
                self.config.serial_number,
                current,
                object_id
            );
            return Ok(());
        }

        self.publish_properties(object_id, host);
        self.activation = Activation::Active { object_id };
        log::info!("HMD {} activated as {}", self.config.serial_number, object_id);
        Ok(())
    }

    fn deactivate(&mut self) {
        if self.activation != Activation::Inactive {
            log::info!("HMD {} deactivated", self.config.serial_number);
        }
        self.activation = Activation::Inactive;
    }

    fn component(&self, name_and_version: &str) -> Option<&dyn DisplayComponent> {
        if name_and_version == DISPLAY_COMPONENT_VERSION {
            Some(&self.display)
        } else {
            log::debug!("HMD has no component {}", name_and_version);
            None
        }
    }

    fn pose(&self) -> DriverPose {
        match self.bridge.upgrade() {
            Some(bridge) => DriverPose::from_snapshot(&bridge.get_pose()),
            None => DriverPose::uninitialized(),
        }
    }

    fn run_frame(&mut self, frame: &Frame, host: &mut dyn DriverHost) {
        if let Activation::Active { object_id } = self.activation {
            host.tracked_device_pose_updated(object_id, &DriverPose::from_snapshot(&frame.snapshot));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeConfig;
    use crate::host::TrackingResult;
    use crate::mock::{MockConnector, MockWire, RecordingHost};
    use crate::types::{PoseSnapshot, Quaternion};
    use std::sync::Arc;
    use std::time::Duration;

    fn live_bridge(wire: &MockWire) -> Arc<DeviceBridge> {
        let connector = MockConnector::new();
        connector.attach("ttyHEAD", wire.clone());
        let cfg = BridgeConfig {
            reconnect_interval: Duration::ZERO,
            ..BridgeConfig::headset_only("ttyHEAD")
        };
        Arc::new(DeviceBridge::with_connector(&cfg, Arc::new(connector)).unwrap())
    }

    #[test]
    fn test_activation_publishes_properties_once() {
        let wire = MockWire::new();
        let bridge = live_bridge(&wire);
        let mut hmd = HmdDevice::new(HmdConfig::default(), Arc::downgrade(&bridge));
        let mut host = RecordingHost::new();

        hmd.activate(3, &mut host).unwrap();
        assert_eq!(hmd.object_id(), Some(3));
        assert_eq!(
            host.property(3, Property::ModelNumber),
            Some(PropertyValue::String("CustomVRHeadset_V1".into()))
        );
        assert_eq!(host.property(3, Property::UserIpdMeters), Some(PropertyValue::Float(0.063)));
        assert_eq!(host.property(3, Property::EdidVendorId), Some(PropertyValue::Int(0xD24E)));
        let count = host.log().properties.len();

        // Second activation is ignored.
        hmd.activate(9, &mut host).unwrap();
        assert_eq!(hmd.object_id(), Some(3));
        assert_eq!(host.log().properties.len(), count);

        hmd.deactivate();
        assert_eq!(hmd.object_id(), None);
    }

    #[test]
    fn test_component_lookup() {
        let hmd = HmdDevice::new(HmdConfig::default(), Weak::new());
        assert!(hmd.component(DISPLAY_COMPONENT_VERSION).is_some());
        assert!(hmd.component("IVRCameraComponent_003").is_none());
        let display = hmd.component(DISPLAY_COMPONENT_VERSION).unwrap();
        assert_eq!(display.recommended_render_target_size(), (1280, 1440));
    }

    #[test]
    fn test_pose_without_bridge_is_uninitialized() {
        let wire = MockWire::new();
        let bridge = live_bridge(&wire);
        let hmd = HmdDevice::new(HmdConfig::default(), Arc::downgrade(&bridge));

        wire.push(b"Q,0,0,1,0;");
        bridge.update();
        let pose = hmd.pose();
        assert_eq!(pose.result, TrackingResult::RunningOk);
        assert_eq!(pose.q_rotation, Quaternion { w: 0.0, x: 0.0, y: 1.0, z: 0.0 });

        drop(bridge);
        let pose = hmd.pose();
        assert_eq!(pose.result, TrackingResult::Uninitialized);
        assert!(!pose.pose_is_valid);
    }

    #[test]
    fn test_run_frame_reports_only_when_active() {
        let mut hmd = HmdDevice::new(HmdConfig::default(), Weak::new());
        let mut host = RecordingHost::new();
        let frame = Frame {
            snapshot: PoseSnapshot::default(),
            button_edges: Vec::new(),
        };

        hmd.run_frame(&frame, &mut host);
        assert!(host.log().poses.is_empty());

        hmd.activate(1, &mut host).unwrap();
        hmd.run_frame(&frame, &mut host);
        let pose = host.last_pose(1).unwrap();
        assert_eq!(pose.result, TrackingResult::Uninitialized);
        assert_eq!(hmd.debug_request("stats"), "");
    }
}
