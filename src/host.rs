//! The host runtime's driver contract, expressed as Rust traits.
//!
//! A host adapter implements [`DriverHost`]; the crate implements
//! [`ServerTrackedDeviceProvider`], [`TrackedDeviceDriver`] and
//! [`DisplayComponent`] against it.

use crate::error::InitError;
use crate::types::{PoseSnapshot, Quaternion, Vec3};

pub const SERVER_TRACKED_DEVICE_PROVIDER_VERSION: &str = "IServerTrackedDeviceProvider_004";
pub const TRACKED_DEVICE_SERVER_DRIVER_VERSION: &str = "ITrackedDeviceServerDriver_005";
pub const DISPLAY_COMPONENT_VERSION: &str = "IVRDisplayComponent_003";

/// Interfaces this driver was built against, as reported to the host.
pub const INTERFACE_VERSIONS: &[&str] = &[
    SERVER_TRACKED_DEVICE_PROVIDER_VERSION,
    TRACKED_DEVICE_SERVER_DRIVER_VERSION,
    DISPLAY_COMPONENT_VERSION,
];

pub type InputComponentHandle = u64;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingResult {
    Uninitialized = 1,
    CalibratingInProgress = 100,
    CalibratingOutOfRange = 101,
    RunningOk = 200,
    RunningOutOfRange = 201,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    Hmd = 1,
    Controller = 2,
    GenericTracker = 3,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerRole {
    Invalid = 0,
    LeftHand = 1,
    RightHand = 2,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eye {
    Left = 0,
    Right = 1,
}

/// Static device properties written once at activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Property {
    ModelNumber,
    ManufacturerName,
    RenderModelName,
    UserIpdMeters,
    DisplayFrequency,
    SecondsFromVsyncToPhotons,
    DisplayMcImageWidth,
    DisplayMcImageHeight,
    DisplayMcImageNumChannels,
    DisplayMcType,
    EdidVendorId,
    EdidProductId,
    WillDriftInYaw,
    DeviceProvidesBatteryStatus,
    LensCenterLeftU,
    LensCenterLeftV,
    LensCenterRightU,
    LensCenterRightV,
    UserHeadToEyeDepthMeters,
    ControllerRoleHint,
    InputProfilePath,
    ControllerType,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    String(String),
    Int(i32),
    Float(f32),
    Bool(bool),
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::String(v.to_string())
    }
}

impl From<i32> for PropertyValue {
    fn from(v: i32) -> Self {
        PropertyValue::Int(v)
    }
}

impl From<f32> for PropertyValue {
    fn from(v: f32) -> Self {
        PropertyValue::Float(v)
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Bool(v)
    }
}

/// Pose record handed to the host each frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriverPose {
    pub pose_time_offset: f64,
    pub q_world_from_driver_rotation: Quaternion,
    pub vec_world_from_driver_translation: [f64; 3],
    pub q_driver_from_head_rotation: Quaternion,
    pub vec_driver_from_head_translation: [f64; 3],
    pub vec_position: [f64; 3],
    pub vec_velocity: [f64; 3],
    pub vec_acceleration: [f64; 3],
    pub q_rotation: Quaternion,
    pub vec_angular_velocity: [f64; 3],
    pub vec_angular_acceleration: [f64; 3],
    pub result: TrackingResult,
    pub pose_is_valid: bool,
    pub will_drift_in_yaw: bool,
    pub should_apply_head_model: bool,
    pub device_is_connected: bool,
}

impl Default for DriverPose {
    fn default() -> Self {
        Self {
            pose_time_offset: 0.0,
            q_world_from_driver_rotation: Quaternion::IDENTITY,
            vec_world_from_driver_translation: [0.0; 3],
            q_driver_from_head_rotation: Quaternion::IDENTITY,
            vec_driver_from_head_translation: [0.0; 3],
            vec_position: [0.0; 3],
            vec_velocity: [0.0; 3],
            vec_acceleration: [0.0; 3],
            q_rotation: Quaternion::IDENTITY,
            vec_angular_velocity: [0.0; 3],
            vec_angular_acceleration: [0.0; 3],
            result: TrackingResult::Uninitialized,
            pose_is_valid: false,
            will_drift_in_yaw: false,
            should_apply_head_model: false,
            device_is_connected: false,
        }
    }
}

impl DriverPose {
    /// Pose reported when no bridge is reachable.
    pub fn uninitialized() -> Self {
        Self::default()
    }

    /// Translate a bridge snapshot. Losing the rig degrades the result code
    /// but keeps the last known rotation and position.
    pub fn from_snapshot(snapshot: &PoseSnapshot) -> Self {
        let result = if snapshot.connected {
            TrackingResult::RunningOk
        } else if snapshot.last_update.is_none() {
            TrackingResult::Uninitialized
        } else {
            TrackingResult::RunningOutOfRange
        };

        Self {
            q_rotation: snapshot.orientation,
            vec_position: vec3_array(&snapshot.position),
            result,
            pose_is_valid: snapshot.connected,
            device_is_connected: snapshot.connected,
            ..Self::default()
        }
    }

    /// Always-valid pose pinned in place.
    pub fn fixed(rotation: Quaternion, position: Vec3) -> Self {
        Self {
            q_rotation: rotation,
            vec_position: vec3_array(&position),
            result: TrackingResult::RunningOk,
            pose_is_valid: true,
            device_is_connected: true,
            ..Self::default()
        }
    }
}

fn vec3_array(v: &Vec3) -> [f64; 3] {
    [v.x, v.y, v.z]
}

/// Host services the driver calls into.
pub trait DriverHost: Send {
    /// Register a device. The host activates it later through the provider.
    fn tracked_device_added(&mut self, serial_number: &str, class: DeviceClass) -> bool;

    fn tracked_device_pose_updated(&mut self, object_id: u32, pose: &DriverPose);

    fn set_property(&mut self, object_id: u32, property: Property, value: PropertyValue);

    fn create_boolean_component(&mut self, object_id: u32, path: &str) -> Option<InputComponentHandle>;

    fn update_boolean_component(&mut self, handle: InputComponentHandle, value: bool, time_offset: f64);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowBounds {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Tangents of the half-angles bounding an eye's frustum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectionBounds {
    pub left: f32,
    pub right: f32,
    pub top: f32,
    pub bottom: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistortionCoordinates {
    pub red: [f32; 2],
    pub green: [f32; 2],
    pub blue: [f32; 2],
}

/// Display geometry exposed by head-mounted devices.
pub trait DisplayComponent: Send + Sync {
    fn window_bounds(&self) -> WindowBounds;
    fn is_display_on_desktop(&self) -> bool;
    fn is_display_real_display(&self) -> bool;
    fn recommended_render_target_size(&self) -> (u32, u32);
    fn eye_output_viewport(&self, eye: Eye) -> Viewport;
    fn projection_raw(&self, eye: Eye) -> ProjectionBounds;
    fn compute_distortion(&self, eye: Eye, u: f32, v: f32) -> DistortionCoordinates;
    fn compute_inverse_distortion(&self, eye: Eye, channel: u32, u: f32, v: f32) -> Option<[f32; 2]>;
}

/// What every device sees in one provider tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub snapshot: PoseSnapshot,
    /// Menu button transitions decoded since the previous tick, oldest first.
    pub button_edges: Vec<bool>,
}

/// Per-device callbacks the host invokes.
pub trait TrackedDeviceDriver: Send {
    fn serial_number(&self) -> &str;

    fn device_class(&self) -> DeviceClass;

    /// Host-assigned id while active.
    fn object_id(&self) -> Option<u32>;

    fn activate(&mut self, object_id: u32, host: &mut dyn DriverHost) -> Result<(), InitError>;

    fn deactivate(&mut self);

    fn enter_standby(&mut self) {}

    fn component(&self, _name_and_version: &str) -> Option<&dyn DisplayComponent> {
        None
    }

    fn debug_request(&mut self, _request: &str) -> String {
        String::new()
    }

    fn pose(&self) -> DriverPose;

    fn run_frame(&mut self, frame: &Frame, host: &mut dyn DriverHost);
}

/// Top-level provider callbacks.
pub trait ServerTrackedDeviceProvider: Send {
    fn init(&mut self, host: Box<dyn DriverHost>) -> Result<(), InitError>;

    fn cleanup(&mut self);

    fn interface_versions(&self) -> &'static [&'static str] {
        INTERFACE_VERSIONS
    }

    fn run_frame(&mut self);

    fn should_block_standby_mode(&self) -> bool {
        false
    }

    fn enter_standby(&mut self) {}

    fn leave_standby(&mut self) {}
}
