//! In-memory stand-ins for serial hardware and the host runtime.
//!
//! Used by the unit tests and the `simulate` demo to run the full pipeline
//! without a rig or a VR runtime attached.

use crate::error::LinkError;
use crate::host::{DeviceClass, DriverHost, DriverPose, InputComponentHandle, Property, PropertyValue};
use crate::link::{Connector, Port};
use crate::protocol;
use crate::types::Sample;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct WireState {
    plugged: bool,
    inbox: Vec<u8>,
    open_attempts: u64,
    /// Bumped on every unplug so ports opened earlier go stale.
    generation: u64,
}

/// A simulated serial cable. Clones share the same cable.
#[derive(Debug, Clone, Default)]
pub struct MockWire {
    state: Arc<Mutex<WireState>>,
}

impl MockWire {
    /// A plugged-in cable with nothing buffered.
    pub fn new() -> Self {
        let wire = Self::default();
        wire.lock().plugged = true;
        wire
    }

    pub fn unplugged() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, WireState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn plug(&self) {
        self.lock().plugged = true;
    }

    /// Pull the cable: open ports fail on their next read, buffered bytes are lost.
    pub fn unplug(&self) {
        let mut state = self.lock();
        state.plugged = false;
        state.generation += 1;
        state.inbox.clear();
    }

    /// Queue bytes from the device side. Ignored while unplugged.
    pub fn push(&self, bytes: &[u8]) {
        let mut state = self.lock();
        if state.plugged {
            state.inbox.extend_from_slice(bytes);
        }
    }

    pub fn push_sample(&self, sample: &Sample) {
        self.push(protocol::encode_frame(sample, true).as_bytes());
    }

    pub fn open_attempts(&self) -> u64 {
        self.lock().open_attempts
    }
}

struct MockPort {
    wire: MockWire,
    generation: u64,
}

impl Port for MockPort {
    fn read_available(&mut self, out: &mut Vec<u8>) -> Result<usize, LinkError> {
        let mut state = self.wire.lock();
        if !state.plugged || state.generation != self.generation {
            return Err(LinkError::Disconnected);
        }
        let n = state.inbox.len();
        out.append(&mut state.inbox);
        Ok(n)
    }
}

/// Connector resolving port names to attached [`MockWire`]s.
#[derive(Debug, Default)]
pub struct MockConnector {
    wires: Mutex<HashMap<String, MockWire>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, port: &str, wire: MockWire) {
        self.wires
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(port.to_string(), wire);
    }
}

impl Connector for MockConnector {
    fn open(&self, port: &str) -> Result<Box<dyn Port>, LinkError> {
        let wire = self
            .wires
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(port)
            .cloned()
            .ok_or_else(|| LinkError::Unavailable {
                port: port.to_string(),
                reason: "no such device".into(),
            })?;

        let mut state = wire.lock();
        state.open_attempts += 1;
        if !state.plugged {
            return Err(LinkError::Unavailable {
                port: port.to_string(),
                reason: "device unplugged".into(),
            });
        }
        let generation = state.generation;
        drop(state);

        Ok(Box::new(MockPort { wire, generation }))
    }
}

/// Everything a [`RecordingHost`] has been told.
#[derive(Debug, Clone, Default)]
pub struct HostLog {
    pub added: Vec<(String, DeviceClass)>,
    pub poses: Vec<(u32, DriverPose)>,
    pub properties: Vec<(u32, Property, PropertyValue)>,
    pub components: Vec<(u32, String, InputComponentHandle)>,
    pub button_updates: Vec<(InputComponentHandle, bool)>,
}

/// Host that records every call. Clones share one log, so a test can keep a
/// clone after handing the host to a provider.
#[derive(Debug, Clone, Default)]
pub struct RecordingHost {
    log: Arc<Mutex<HostLog>>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HostLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn log(&self) -> HostLog {
        self.lock().clone()
    }

    /// Latest value written for a property.
    pub fn property(&self, object_id: u32, property: Property) -> Option<PropertyValue> {
        self.lock()
            .properties
            .iter()
            .rev()
            .find(|(id, p, _)| *id == object_id && *p == property)
            .map(|(_, _, v)| v.clone())
    }

    pub fn last_pose(&self, object_id: u32) -> Option<DriverPose> {
        self.lock()
            .poses
            .iter()
            .rev()
            .find(|(id, _)| *id == object_id)
            .map(|(_, pose)| *pose)
    }
}

impl DriverHost for RecordingHost {
    fn tracked_device_added(&mut self, serial_number: &str, class: DeviceClass) -> bool {
        self.lock().added.push((serial_number.to_string(), class));
        true
    }

    fn tracked_device_pose_updated(&mut self, object_id: u32, pose: &DriverPose) {
        self.lock().poses.push((object_id, *pose));
    }

    fn set_property(&mut self, object_id: u32, property: Property, value: PropertyValue) {
        self.lock().properties.push((object_id, property, value));
    }

    fn create_boolean_component(&mut self, object_id: u32, path: &str) -> Option<InputComponentHandle> {
        let mut log = self.lock();
        let handle = log.components.len() as InputComponentHandle + 1;
        log.components.push((object_id, path.to_string(), handle));
        Some(handle)
    }

    fn update_boolean_component(&mut self, handle: InputComponentHandle, value: bool, _time_offset: f64) {
        self.lock().button_updates.push((handle, value));
    }
}
