use std::time::Instant;

/// Unit quaternion [w, x, y, z] as sent by the headset IMU.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quaternion {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Quaternion {
    pub const IDENTITY: Quaternion = Quaternion {
        w: 1.0,
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn norm(&self) -> f64 {
        (self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Position in the tracking rig's local frame. Units are whatever the rig sends.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ORIGIN: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };
}

/// One decoded telemetry frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Sample {
    Orientation(Quaternion),
    Position(Vec3),
    /// Level of a named digital line. The bridge turns repeated levels into
    /// single transitions.
    ButtonEdge { line: String, pressed: bool },
}

impl Sample {
    pub fn kind(&self) -> SampleKinds {
        match self {
            Sample::Orientation(_) => SampleKinds::ORIENTATION,
            Sample::Position(_) => SampleKinds::POSITION,
            Sample::ButtonEdge { .. } => SampleKinds::BUTTON,
        }
    }
}

bitflags::bitflags! {
    /// Sample kinds a bridge has applied so far.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    #[repr(C)]
    pub struct SampleKinds: u32 {
        const ORIENTATION = 1 << 0;
        const POSITION    = 1 << 1;
        const BUTTON      = 1 << 2;
    }
}

/// Liveness of a single serial link.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected = 0,
    /// Port is open but nothing has arrived since it was opened.
    Connecting = 1,
    Connected = 2,
}

/// The bridge's single current view of the rig.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseSnapshot {
    pub orientation: Quaternion,
    pub position: Vec3,
    /// AND of every required link being `Connected`.
    pub connected: bool,
    /// When a sample was last applied. `None` until the first one.
    pub last_update: Option<Instant>,
    pub received: SampleKinds,
}

impl PoseSnapshot {
    /// Age of the newest sample in seconds, or `None` if nothing has arrived.
    pub fn age_s(&self) -> Option<f64> {
        self.last_update.map(|t| t.elapsed().as_secs_f64())
    }
}

impl Default for PoseSnapshot {
    fn default() -> Self {
        Self {
            orientation: Quaternion::IDENTITY,
            position: Vec3::ORIGIN,
            connected: false,
            last_update: None,
            received: SampleKinds::empty(),
        }
    }
}

/// Which physical board a link talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkRole {
    Headset,
    Tracking,
}

impl std::fmt::Display for LinkRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkRole::Headset => f.write_str("headset"),
            LinkRole::Tracking => f.write_str("tracking"),
        }
    }
}

/// Counters for one link and its decoder.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkStats {
    pub role: LinkRole,
    pub port: String,
    pub state: ConnectionState,
    pub open_attempts: u64,
    pub bytes_read: u64,
    pub frames_decoded: u64,
    pub decode_errors: u64,
}

/// Diagnostic view of a bridge.
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeStats {
    pub links: Vec<LinkStats>,
    pub button_edges: u64,
    pub dropped_edges: u64,
}
