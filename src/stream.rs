use crate::error::LinkError;
use crate::link::Port;
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use std::io::{ErrorKind, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Chunks buffered between the reader thread and the frame tick.
pub const CHANNEL_CAPACITY: usize = 64;

const READ_CHUNK: usize = 256;

/// Background reader for one open serial port.
///
/// The reader thread owns the port and blocks in `read()` with the port's
/// own timeout, handing raw chunks to the frame tick through a bounded
/// channel. When the port fails the thread exits and the channel
/// disconnects, which the link sees as an unplug.
pub struct PortReader {
    receiver: Receiver<Vec<u8>>,
    stop_flag: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl PortReader {
    /// Spawn the reader thread. `reader` should time out periodically so the
    /// stop flag is observed.
    pub fn spawn<R>(reader: R, name: &str) -> Result<PortReader, LinkError>
    where
        R: Read + Send + 'static,
    {
        let (sender, receiver) = crossbeam_channel::bounded(CHANNEL_CAPACITY);
        let stop_flag = Arc::new(AtomicBool::new(false));
        let stop_clone = stop_flag.clone();
        let port_name = name.to_string();

        let thread = std::thread::Builder::new()
            .name(format!("vrlink-reader {}", name))
            .spawn(move || {
                reader_loop(reader, sender, stop_clone, &port_name);
            })?;

        Ok(PortReader {
            receiver,
            stop_flag,
            thread: Some(thread),
        })
    }

    /// True until the reader thread has exited or been asked to stop.
    pub fn is_active(&self) -> bool {
        !self.stop_flag.load(Ordering::Relaxed)
            && self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn shutdown(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Port for PortReader {
    fn read_available(&mut self, out: &mut Vec<u8>) -> Result<usize, LinkError> {
        let mut total = 0;
        loop {
            match self.receiver.try_recv() {
                Ok(chunk) => {
                    total += chunk.len();
                    out.extend_from_slice(&chunk);
                }
                Err(TryRecvError::Empty) => return Ok(total),
                Err(TryRecvError::Disconnected) if total > 0 => return Ok(total),
                Err(TryRecvError::Disconnected) => return Err(LinkError::Disconnected),
            }
        }
    }
}

impl Drop for PortReader {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn reader_loop<R: Read>(mut reader: R, sender: Sender<Vec<u8>>, stop_flag: Arc<AtomicBool>, name: &str) {
    let mut buf = [0u8; READ_CHUNK];

    log::info!("Serial reader started on {}", name);

    loop {
        if stop_flag.load(Ordering::Relaxed) {
            log::info!("Serial reader on {} stopping (stop flag set)", name);
            break;
        }

        let len = match reader.read(&mut buf) {
            Ok(0) => continue,
            Ok(n) => n,
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::Interrupted) => continue,
            Err(e) => {
                log::warn!("Serial read error on {}: {}", name, e);
                break;
            }
        };

        if let Err(e) = sender.try_send(buf[..len].to_vec()) {
            match e {
                crossbeam_channel::TrySendError::Full(_) => {
                    log::trace!("Reader channel full on {}, dropping {} bytes", name, len);
                }
                crossbeam_channel::TrySendError::Disconnected(_) => {
                    log::info!("Reader channel for {} disconnected, stopping", name);
                    break;
                }
            }
        }
    }
}
