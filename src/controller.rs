use crate::bridge::DeviceBridge;
use crate::config::ControllerConfig;
use crate::error::InitError;
use crate::host::{
    DeviceClass, DriverHost, DriverPose, Frame, InputComponentHandle, Property, PropertyValue, TrackedDeviceDriver,
};
use crate::types::Quaternion;
use std::fmt;
use std::sync::Weak;

/// Where the menu button level comes from.
pub enum ControllerInput {
    /// Transitions decoded by the device bridge.
    BridgeButton,
    /// A level sampled once per tick, e.g. a keyboard key supplied by the
    /// embedder. Edges are detected here.
    Polled(Box<dyn FnMut() -> bool + Send>),
}

impl fmt::Debug for ControllerInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerInput::BridgeButton => f.write_str("BridgeButton"),
            ControllerInput::Polled(_) => f.write_str("Polled(..)"),
        }
    }
}

impl Default for ControllerInput {
    fn default() -> Self {
        ControllerInput::BridgeButton
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Activation {
    Inactive,
    Active {
        object_id: u32,
        menu: InputComponentHandle,
    },
}

/// Untracked controller that exists to carry the menu button.
pub struct ControllerDevice {
    config: ControllerConfig,
    bridge: Weak<DeviceBridge>,
    input: ControllerInput,
    activation: Activation,
    pressed: bool,
}

impl ControllerDevice {
    pub fn new(config: ControllerConfig, bridge: Weak<DeviceBridge>, input: ControllerInput) -> Self {
        Self {
            config,
            bridge,
            input,
            activation: Activation::Inactive,
            pressed: false,
        }
    }

    /// Level last reported to the host.
    pub fn is_pressed(&self) -> bool {
        self.pressed
    }

    fn publish_properties(&self, object_id: u32, host: &mut dyn DriverHost) {
        let c = &self.config;
        let props: [(Property, PropertyValue); 6] = [
            (Property::ModelNumber, c.model_number.as_str().into()),
            (Property::ManufacturerName, c.manufacturer.as_str().into()),
            (Property::RenderModelName, c.render_model.as_str().into()),
            (Property::ControllerRoleHint, (c.role as i32).into()),
            (Property::InputProfilePath, c.input_profile_path.as_str().into()),
            (Property::ControllerType, c.controller_type.as_str().into()),
        ];
        for (property, value) in props {
            host.set_property(object_id, property, value);
        }
    }

    fn set_pressed(&mut self, menu: InputComponentHandle, pressed: bool, host: &mut dyn DriverHost) {
        if pressed != self.pressed {
            host.update_boolean_component(menu, pressed, 0.0);
            self.pressed = pressed;
        }
    }
}

impl TrackedDeviceDriver for ControllerDevice {
    fn serial_number(&self) -> &str {
        &self.config.serial_number
    }

    fn device_class(&self) -> DeviceClass {
        DeviceClass::Controller
    }

    fn object_id(&self) -> Option<u32> {
        match self.activation {
            Activation::Active { object_id, .. } => Some(object_id),
            Activation::Inactive => None,
        }
    }

    fn activate(&mut self, object_id: u32, host: &mut dyn DriverHost) -> Result<(), InitError> {
        if let Activation::Active { object_id: current, .. } = self.activation {
            log::warn!(
                "Controller {} already active as {}, ignoring activation as {}",
                self.config.serial_number,
                current,
                object_id
            );
            return Ok(());
        }

        let menu = host
            .create_boolean_component(object_id, &self.config.menu_input_path)
            .ok_or(InitError::InputComponent)?;
        self.publish_properties(object_id, host);
        self.activation = Activation::Active { object_id, menu };
        self.pressed = false;
        log::info!(
            "Controller {} activated as {} ({:?} on {})",
            self.config.serial_number,
            object_id,
            self.input,
            self.config.menu_input_path
        );

        // Edges drained before activation never reached the host.
        if let ControllerInput::BridgeButton = self.input {
            if let Some(bridge) = self.bridge.upgrade() {
                self.set_pressed(menu, bridge.button_state(), host);
            }
        }
        Ok(())
    }

    fn deactivate(&mut self) {
        if self.activation != Activation::Inactive {
            log::info!("Controller {} deactivated", self.config.serial_number);
        }
        self.activation = Activation::Inactive;
    }

    fn pose(&self) -> DriverPose {
        DriverPose::fixed(Quaternion::IDENTITY, self.config.fixed_position)
    }

    fn run_frame(&mut self, frame: &Frame, host: &mut dyn DriverHost) {
        let Activation::Active { object_id, menu } = self.activation else {
            return;
        };

        match &mut self.input {
            ControllerInput::BridgeButton => {
                for &pressed in &frame.button_edges {
                    host.update_boolean_component(menu, pressed, 0.0);
                    self.pressed = pressed;
                }
            }
            ControllerInput::Polled(level) => {
                let pressed = level();
                self.set_pressed(menu, pressed, host);
            }
        }

        host.tracked_device_pose_updated(object_id, &self.pose());
    }
}
