use crate::config::BridgeConfig;
use crate::error::CreateError;
use crate::link::{Connector, SerialConnector, SerialLink};
use crate::protocol::{TelemetryDecoder, FRAME_VERSION};
use crate::types::{BridgeStats, ConnectionState, LinkRole, PoseSnapshot, Sample};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Instant;

/// Button transitions held for the host-facing layer between ticks.
pub const EDGE_QUEUE_CAPACITY: usize = 64;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One link plus the decoder that owns its partial frames.
struct LinkChannel {
    link: SerialLink,
    decoder: TelemetryDecoder,
    scratch: Vec<u8>,
}

impl LinkChannel {
    fn new(link: SerialLink) -> Self {
        Self {
            link,
            decoder: TelemetryDecoder::new(),
            scratch: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
struct ButtonTracker {
    pressed: bool,
    edges: VecDeque<bool>,
    total_edges: u64,
    dropped_edges: u64,
}

impl ButtonTracker {
    /// Record a decoded level. Only a change of level is a transition.
    fn apply(&mut self, pressed: bool) {
        if pressed == self.pressed {
            return;
        }
        self.pressed = pressed;
        self.total_edges += 1;
        if self.edges.len() == EDGE_QUEUE_CAPACITY {
            self.edges.pop_front();
            self.dropped_edges += 1;
            log::warn!("Button edge queue full, dropping oldest transition");
        }
        self.edges.push_back(pressed);
    }
}

/// Owns the rig's serial links and publishes the latest pose.
///
/// `update` is the only mutator. It may run on a different thread from the
/// readers; a reader always gets a whole snapshot, either the one before or
/// the one after an update.
pub struct DeviceBridge {
    links: Mutex<Vec<LinkChannel>>,
    snapshot: RwLock<PoseSnapshot>,
    button: Mutex<ButtonTracker>,
    button_line: String,
    shut_down: AtomicBool,
}

impl DeviceBridge {
    /// Build a bridge over real serial ports.
    ///
    /// A missing device is not an error: the link stays disconnected and is
    /// retried from `update`.
    pub fn create(config: &BridgeConfig) -> Result<DeviceBridge, CreateError> {
        let connector = Arc::new(SerialConnector::new(config.baud_rate, config.threaded_reader));
        Self::with_connector(config, connector)
    }

    /// Build a bridge whose links open ports through `connector`.
    pub fn with_connector(
        config: &BridgeConfig,
        connector: Arc<dyn Connector>,
    ) -> Result<DeviceBridge, CreateError> {
        let headset_port = config.headset_port.trim();
        if headset_port.is_empty() {
            return Err(CreateError::NoLink("headset port name is empty".into()));
        }
        if config.button_line.trim().is_empty() {
            return Err(CreateError::NoLink("button line name is empty".into()));
        }

        let settings = config.link_settings();
        let mut links = vec![LinkChannel::new(SerialLink::new(
            LinkRole::Headset,
            headset_port,
            connector.clone(),
            settings,
        ))];

        if let Some(tracking_port) = config.tracking_port.as_deref().map(str::trim) {
            if tracking_port.is_empty() {
                return Err(CreateError::NoLink("tracking port name is empty".into()));
            }
            if tracking_port == headset_port {
                return Err(CreateError::NoLink(format!(
                    "tracking and headset share port {}",
                    tracking_port
                )));
            }
            links.push(LinkChannel::new(SerialLink::new(
                LinkRole::Tracking,
                tracking_port,
                connector,
                settings,
            )));
        }

        for channel in links.iter_mut() {
            // Failure is logged by the link and retried from update().
            let _ = channel.link.open();
        }

        log::info!(
            "Device bridge created (frame format v{}): headset={} tracking={}",
            FRAME_VERSION,
            headset_port,
            config.tracking_port.as_deref().unwrap_or("-")
        );

        Ok(DeviceBridge {
            links: Mutex::new(links),
            snapshot: RwLock::new(PoseSnapshot::default()),
            button: Mutex::new(ButtonTracker::default()),
            button_line: config.button_line.trim().to_string(),
            shut_down: AtomicBool::new(false),
        })
    }

    /// Pump every link, apply decoded samples and publish a new snapshot.
    pub fn update(&self) {
        let now = Instant::now();
        let mut links = lock(&self.links);
        if self.shut_down.load(Ordering::Acquire) {
            return;
        }
        let mut next = self.get_pose();
        let mut edges = Vec::new();

        for channel in links.iter_mut() {
            channel.scratch.clear();
            let polled = channel.link.poll(now, &mut channel.scratch);
            if polled.reopened || polled.dropped {
                channel.decoder.reset();
            }

            for sample in channel.decoder.feed(&channel.scratch) {
                let kind = sample.kind();
                match sample {
                    Sample::Orientation(q) => {
                        next.orientation = q;
                        next.last_update = Some(now);
                        next.received |= kind;
                    }
                    Sample::Position(p) => {
                        next.position = p;
                        next.last_update = Some(now);
                        next.received |= kind;
                    }
                    Sample::ButtonEdge { line, pressed } if line == self.button_line => {
                        edges.push(pressed);
                        next.received |= kind;
                    }
                    Sample::ButtonEdge { line, .. } => {
                        log::trace!("Ignoring level on unmapped line {}", line);
                    }
                }
            }
        }

        let connected = links
            .iter()
            .all(|channel| channel.link.state() == ConnectionState::Connected);
        if connected != next.connected {
            log::info!("Rig {}", if connected { "connected" } else { "disconnected" });
        }
        next.connected = connected;

        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = next;

        if !edges.is_empty() {
            let mut button = lock(&self.button);
            for pressed in edges {
                button.apply(pressed);
            }
        }
    }

    /// Copy of the current snapshot.
    pub fn get_pose(&self) -> PoseSnapshot {
        *self.snapshot.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_connected(&self) -> bool {
        self.get_pose().connected
    }

    /// Latest edge-resolved menu button level.
    pub fn button_state(&self) -> bool {
        lock(&self.button).pressed
    }

    /// Drain queued button transitions, oldest first.
    pub fn take_button_edges(&self) -> Vec<bool> {
        lock(&self.button).edges.drain(..).collect()
    }

    pub fn link_states(&self) -> Vec<(LinkRole, ConnectionState)> {
        lock(&self.links)
            .iter()
            .map(|channel| (channel.link.role(), channel.link.state()))
            .collect()
    }

    pub fn stats(&self) -> BridgeStats {
        let links = lock(&self.links)
            .iter()
            .map(|channel| {
                let mut stats = channel.link.stats();
                stats.frames_decoded = channel.decoder.frames_decoded();
                stats.decode_errors = channel.decoder.decode_errors();
                stats
            })
            .collect();
        let button = lock(&self.button);
        BridgeStats {
            links,
            button_edges: button.total_edges,
            dropped_edges: button.dropped_edges,
        }
    }

    /// Close every link and stop reopening them. Later updates are no-ops;
    /// readers keep the last pose, marked disconnected.
    pub fn shutdown(&self) {
        let mut links = lock(&self.links);
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        for channel in links.iter_mut() {
            channel.link.close();
        }
        self.snapshot.write().unwrap_or_else(PoisonError::into_inner).connected = false;
        log::info!("Device bridge shut down");
    }

    /// Close every link and release the bridge.
    pub fn destroy(self) {
        self.shutdown();
        log::info!("Device bridge destroyed");
    }
}
