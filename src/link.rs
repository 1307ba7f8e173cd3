use crate::error::LinkError;
use crate::stream::PortReader;
use crate::types::{ConnectionState, LinkRole, LinkStats};
use std::io::{ErrorKind, Read};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Read timeout handed to the OS driver. Only the threaded reader ever
/// blocks on it.
pub const PORT_TIMEOUT: Duration = Duration::from_millis(100);

/// Upper bound on bytes pulled from a polled port in one frame.
pub const MAX_READ_PER_POLL: usize = 4096;

/// An open byte source that can be drained without blocking.
pub trait Port: Send {
    /// Append whatever bytes are available right now to `out` and return
    /// how many were appended. Zero is a normal answer.
    fn read_available(&mut self, out: &mut Vec<u8>) -> Result<usize, LinkError>;
}

/// Opens ports by name. A missing or busy device is `LinkError::Unavailable`.
pub trait Connector: Send + Sync {
    fn open(&self, port: &str) -> Result<Box<dyn Port>, LinkError>;
}

/// Real serial ports through the `serialport` crate.
#[derive(Debug, Clone)]
pub struct SerialConnector {
    baud_rate: u32,
    threaded: bool,
}

impl SerialConnector {
    pub fn new(baud_rate: u32, threaded: bool) -> Self {
        Self {
            baud_rate,
            threaded,
        }
    }
}

impl Connector for SerialConnector {
    fn open(&self, port: &str) -> Result<Box<dyn Port>, LinkError> {
        let serial = serialport::new(port, self.baud_rate)
            .timeout(PORT_TIMEOUT)
            .open()
            .map_err(|e| LinkError::from_open(port, e))?;

        if self.threaded {
            Ok(Box::new(PortReader::spawn(serial, port)?))
        } else {
            Ok(Box::new(PolledSerial { port: serial }))
        }
    }
}

/// Serial port drained in the frame tick via `bytes_to_read`.
struct PolledSerial {
    port: Box<dyn serialport::SerialPort>,
}

impl Port for PolledSerial {
    fn read_available(&mut self, out: &mut Vec<u8>) -> Result<usize, LinkError> {
        let available = self
            .port
            .bytes_to_read()
            .map_err(|e| LinkError::Io(e.into()))? as usize;
        if available == 0 {
            return Ok(0);
        }

        let start = out.len();
        out.resize(start + available.min(MAX_READ_PER_POLL), 0);
        match self.port.read(&mut out[start..]) {
            Ok(n) => {
                out.truncate(start + n);
                Ok(n)
            }
            Err(e) if e.kind() == ErrorKind::TimedOut => {
                out.truncate(start);
                Ok(0)
            }
            Err(e) => {
                out.truncate(start);
                Err(LinkError::Io(e))
            }
        }
    }
}

/// Reconnect and liveness timing for one link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkSettings {
    /// Minimum spacing between open attempts.
    pub reconnect_interval: Duration,
    /// Close an open link that has been silent this long.
    pub idle_timeout: Option<Duration>,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            reconnect_interval: Duration::from_millis(1000),
            idle_timeout: Some(Duration::from_millis(3000)),
        }
    }
}

/// What one `poll` did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollResult {
    pub bytes: usize,
    /// The port was (re)opened during this poll.
    pub reopened: bool,
    /// The port was lost during this poll.
    pub dropped: bool,
}

/// One serial connection with throttled reconnection.
pub struct SerialLink {
    role: LinkRole,
    port_name: String,
    connector: Arc<dyn Connector>,
    settings: LinkSettings,
    port: Option<Box<dyn Port>>,
    state: ConnectionState,
    last_attempt: Option<Instant>,
    last_activity: Option<Instant>,
    open_attempts: u64,
    bytes_read: u64,
    quiet_failures: bool,
}

impl SerialLink {
    pub fn new(
        role: LinkRole,
        port_name: impl Into<String>,
        connector: Arc<dyn Connector>,
        settings: LinkSettings,
    ) -> Self {
        Self {
            role,
            port_name: port_name.into(),
            connector,
            settings,
            port: None,
            state: ConnectionState::Disconnected,
            last_attempt: None,
            last_activity: None,
            open_attempts: 0,
            bytes_read: 0,
            quiet_failures: false,
        }
    }

    pub fn role(&self) -> LinkRole {
        self.role
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.port.is_some()
    }

    /// Open the port now, ignoring the reconnect throttle.
    pub fn open(&mut self) -> Result<(), LinkError> {
        self.open_at(Instant::now())
    }

    fn open_at(&mut self, now: Instant) -> Result<(), LinkError> {
        if self.port.is_some() {
            return Ok(());
        }

        self.last_attempt = Some(now);
        self.open_attempts += 1;

        match self.connector.open(&self.port_name) {
            Ok(port) => {
                log::info!("Opened {} link on {}", self.role, self.port_name);
                self.port = Some(port);
                self.state = ConnectionState::Connecting;
                self.last_activity = Some(now);
                self.quiet_failures = false;
                Ok(())
            }
            Err(e) => {
                if self.quiet_failures {
                    log::debug!("{} link on {} still unavailable: {}", self.role, self.port_name, e);
                } else {
                    log::warn!("Failed to open {} link on {}: {}", self.role, self.port_name, e);
                    self.quiet_failures = true;
                }
                self.state = ConnectionState::Disconnected;
                Err(e)
            }
        }
    }

    /// Drain available bytes into `out` without blocking.
    pub fn read_available(&mut self, out: &mut Vec<u8>) -> Result<usize, LinkError> {
        let port = self.port.as_mut().ok_or(LinkError::Disconnected)?;
        let n = port.read_available(out)?;
        if n > 0 {
            self.bytes_read += n as u64;
            self.state = ConnectionState::Connected;
        }
        Ok(n)
    }

    /// Close the port. The next open waits out the reconnect interval.
    pub fn close(&mut self) {
        if self.port.take().is_some() {
            log::info!("Closed {} link on {}", self.role, self.port_name);
        }
        self.state = ConnectionState::Disconnected;
    }

    fn retry_due(&self, now: Instant) -> bool {
        match self.last_attempt {
            None => true,
            Some(t) => now.duration_since(t) >= self.settings.reconnect_interval,
        }
    }

    /// Per-frame pump: reopen if due, read what is there, enforce the idle
    /// timeout.
    pub fn poll(&mut self, now: Instant, out: &mut Vec<u8>) -> PollResult {
        let mut result = PollResult::default();

        if self.port.is_none() {
            if !self.retry_due(now) || self.open_at(now).is_err() {
                return result;
            }
            result.reopened = true;
        }

        match self.read_available(out) {
            Ok(0) => {
                let idle = self
                    .last_activity
                    .map(|t| now.duration_since(t))
                    .unwrap_or_default();
                if let Some(limit) = self.settings.idle_timeout {
                    if idle > limit {
                        log::warn!(
                            "{} link on {} silent for {:?}, closing",
                            self.role,
                            self.port_name,
                            idle
                        );
                        self.drop_port(now);
                        result.dropped = true;
                    }
                }
            }
            Ok(n) => {
                self.last_activity = Some(now);
                result.bytes = n;
            }
            Err(e) => {
                log::warn!("{} link on {} lost: {}", self.role, self.port_name, e);
                self.drop_port(now);
                result.dropped = true;
            }
        }

        result
    }

    fn drop_port(&mut self, now: Instant) {
        self.close();
        self.last_attempt = Some(now);
    }

    pub fn stats(&self) -> LinkStats {
        LinkStats {
            role: self.role,
            port: self.port_name.clone(),
            state: self.state,
            open_attempts: self.open_attempts,
            bytes_read: self.bytes_read,
            frames_decoded: 0,
            decode_errors: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockConnector, MockWire};

    fn settings(reconnect_ms: u64, idle_ms: Option<u64>) -> LinkSettings {
        LinkSettings {
            reconnect_interval: Duration::from_millis(reconnect_ms),
            idle_timeout: idle_ms.map(Duration::from_millis),
        }
    }

    fn link_on(wire: &MockWire, s: LinkSettings) -> SerialLink {
        let connector = MockConnector::new();
        connector.attach("ttyTEST", wire.clone());
        SerialLink::new(LinkRole::Headset, "ttyTEST", Arc::new(connector), s)
    }

    #[test]
    fn test_missing_port_is_unavailable() {
        let connector = Arc::new(MockConnector::new());
        let mut link = SerialLink::new(LinkRole::Tracking, "nowhere", connector, settings(0, None));
        assert!(matches!(link.open(), Err(LinkError::Unavailable { .. })));
        assert_eq!(link.state(), ConnectionState::Disconnected);
        assert!(!link.is_open());
    }

    #[test]
    fn test_state_follows_data() {
        let wire = MockWire::new();
        let mut link = link_on(&wire, settings(0, None));
        let mut buf = Vec::new();

        let res = link.poll(Instant::now(), &mut buf);
        assert!(res.reopened);
        assert_eq!(link.state(), ConnectionState::Connecting);

        wire.push(b"Q,1,0,0,0;");
        let res = link.poll(Instant::now(), &mut buf);
        assert_eq!(res.bytes, 10);
        assert_eq!(buf, b"Q,1,0,0,0;");
        assert_eq!(link.state(), ConnectionState::Connected);
    }

    #[test]
    fn test_reconnect_is_throttled() {
        let wire = MockWire::unplugged();
        let mut link = link_on(&wire, settings(1000, None));
        let mut buf = Vec::new();
        let t0 = Instant::now();

        link.poll(t0, &mut buf);
        link.poll(t0 + Duration::from_millis(10), &mut buf);
        link.poll(t0 + Duration::from_millis(999), &mut buf);
        assert_eq!(wire.open_attempts(), 1);

        wire.plug();
        let res = link.poll(t0 + Duration::from_millis(1000), &mut buf);
        assert!(res.reopened);
        assert_eq!(wire.open_attempts(), 2);
        assert!(link.is_open());
    }

    #[test]
    fn test_unplug_drops_link() {
        let wire = MockWire::new();
        let mut link = link_on(&wire, settings(0, None));
        let mut buf = Vec::new();
        wire.push(b"P,1,2,3;");
        link.poll(Instant::now(), &mut buf);
        assert_eq!(link.state(), ConnectionState::Connected);

        wire.unplug();
        let res = link.poll(Instant::now(), &mut buf);
        assert!(res.dropped);
        assert_eq!(link.state(), ConnectionState::Disconnected);
        assert!(!link.is_open());
    }

    #[test]
    fn test_idle_timeout_closes_link() {
        let wire = MockWire::new();
        let mut link = link_on(&wire, settings(0, Some(50)));
        let mut buf = Vec::new();
        let t0 = Instant::now();

        link.poll(t0, &mut buf);
        assert!(!link.poll(t0 + Duration::from_millis(40), &mut buf).dropped);
        let res = link.poll(t0 + Duration::from_millis(60), &mut buf);
        assert!(res.dropped);
        assert_eq!(link.state(), ConnectionState::Disconnected);
    }
}
