//! High-level RTSP server orchestrator: owns the listening socket, the
//! two shared encoder taps, and a fixed table of client slots.

use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;

use crate::cancellable_socket::CancellableSocket;
use crate::client::RtspClient;
use crate::config::{ServerConfig, MAX_CLIENTS};
use crate::error::{Result, RtspError};
use crate::media::RtspMedia;
use crate::tap::{AudioEncoderTap, VideoEncoderTap};

/// One entry of the fixed client table.
/// `None` means the slot is free.
struct ClientSlot {
    client: Option<Arc<RtspClient>>,
    socket: Option<Arc<CancellableSocket<TcpStream>>>,
    worker: Option<JoinHandle<()>>,
}

impl ClientSlot {
    fn empty() -> Self {
        Self {
            client: None,
            socket: None,
            worker: None,
        }
    }

    fn is_free(&self) -> bool {
        self.client.as_ref().is_none_or(|c| !c.is_running())
    }
}

/// Owns the listening socket, the shared [`VideoEncoderTap`]/
/// [`AudioEncoderTap`] every client's `RtpSession` registers against,
/// and the fixed-size client slot table.
///
/// Constructed once and reused across `start`/`stop` cycles; `start`
/// and `stop` are both idempotent.
pub struct RtspServer {
    config: ServerConfig,
    media: RtspMedia,
    video_tap: Arc<VideoEncoderTap>,
    audio_tap: Arc<AudioEncoderTap>,
    listener: Mutex<Option<Arc<CancellableSocket<std::net::TcpListener>>>>,
    slots: Arc<[Mutex<ClientSlot>; MAX_CLIENTS]>,
    acceptor: Mutex<Option<JoinHandle<()>>>,
    running: Arc<AtomicBool>,
}

impl RtspServer {
    /// Builds a server that serves `start_video`/`start_audio` tracks
    /// (at least one must be `true`), not yet listening.
    pub fn new(config: ServerConfig, start_video: bool, start_audio: bool) -> Arc<Self> {
        Arc::new(Self {
            config,
            media: RtspMedia::new(start_video, start_audio),
            video_tap: VideoEncoderTap::new(),
            audio_tap: AudioEncoderTap::new(),
            listener: Mutex::new(None),
            slots: Arc::new(std::array::from_fn(|_| Mutex::new(ClientSlot::empty()))),
            acceptor: Mutex::new(None),
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    /// The video encoder callback producers publish access units to.
    pub fn video_tap(&self) -> Arc<VideoEncoderTap> {
        Arc::clone(&self.video_tap)
    }

    /// The audio encoder callback producers publish access units to.
    pub fn audio_tap(&self) -> Arc<AudioEncoderTap> {
        Arc::clone(&self.audio_tap)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        self.listener
            .lock()
            .as_ref()
            .ok_or(RtspError::NotStarted)?
            .local_addr()
            .map_err(RtspError::Io)
    }

    /// Binds the listener and launches the acceptor thread.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(RtspError::AlreadyRunning);
        }

        let addr = std::net::SocketAddr::new(self.config.bind_addr, self.config.port);
        let listener = CancellableSocket::bind(addr).map_err(RtspError::Io)?;
        let listener = Arc::new(listener);
        *self.listener.lock() = Some(Arc::clone(&listener));

        tracing::info!(addr = %listener.local_addr().map_err(RtspError::Io)?, "RTSP server listening");

        let this = Arc::clone(self);
        let handle = std::thread::spawn(move || this.accept_loop(listener));
        *self.acceptor.lock() = Some(handle);

        Ok(())
    }

    fn accept_loop(self: Arc<Self>, listener: Arc<CancellableSocket<std::net::TcpListener>>) {
        let mut next_id: usize = 0;
        loop {
            if !self.running.load(Ordering::Acquire) {
                break;
            }

            let (stream, peer) = match listener.accept() {
                Ok(accepted) => accepted,
                Err(RtspError::Interrupted) => break,
                Err(err) => {
                    tracing::warn!(error = %err, "accept failed");
                    continue;
                }
            };

            let Some(slot_index) = self.slots.iter().position(|slot| slot.lock().is_free()) else {
                tracing::warn!(peer = %peer, "no free client slot, rejecting connection");
                drop(stream);
                continue;
            };

            let socket = match CancellableSocket::from_stream(stream) {
                Ok(socket) => Arc::new(socket),
                Err(err) => {
                    tracing::warn!(error = %err, "failed to wrap accepted connection");
                    continue;
                }
            };

            let id = next_id;
            next_id += 1;

            let client = Arc::new(RtspClient::new(
                id,
                self.media,
                self.config.session_name.clone(),
                Arc::clone(&self.video_tap),
                Arc::clone(&self.audio_tap),
            ));

            let worker_client = Arc::clone(&client);
            let worker_socket = Arc::clone(&socket);
            let handle = std::thread::spawn(move || worker_client.run(worker_socket));

            let mut slot = self.slots[slot_index].lock();
            if let Some(previous_socket) = slot.socket.take() {
                previous_socket.interrupt();
            }
            if let Some(previous) = slot.worker.take() {
                let _ = previous.join();
            }
            slot.client = Some(client);
            slot.socket = Some(socket);
            slot.worker = Some(handle);

            tracing::info!(client = id, peer = %peer, "client connected");
        }
    }

    /// Signals shutdown, interrupts the listener and every client
    /// socket, and joins every background thread. Idempotent.
    pub fn stop(&self) {
        if self
            .running
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        if let Some(listener) = self.listener.lock().take() {
            listener.interrupt();
        }

        for slot in self.slots.iter() {
            let (client, socket, worker) = {
                let mut slot = slot.lock();
                (slot.client.take(), slot.socket.take(), slot.worker.take())
            };
            if let Some(socket) = socket {
                socket.interrupt();
            }
            if let Some(worker) = worker {
                let _ = worker.join();
            }
            drop(client);
        }

        if let Some(acceptor) = self.acceptor.lock().take() {
            let _ = acceptor.join();
        }

        tracing::info!("RTSP server stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn ephemeral_config() -> ServerConfig {
        ServerConfig {
            port: 0,
            bind_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            session_name: "Test Stream".to_string(),
        }
    }

    #[test]
    fn start_then_start_again_is_already_running() {
        let server = RtspServer::new(ephemeral_config(), true, true);
        server.start().unwrap();
        assert!(matches!(server.start(), Err(RtspError::AlreadyRunning)));
        server.stop();
    }

    #[test]
    fn stop_before_start_is_a_no_op() {
        let server = RtspServer::new(ephemeral_config(), true, true);
        server.stop();
        assert!(!server.is_running());
    }

    #[test]
    fn local_addr_available_after_start() {
        let server = RtspServer::new(ephemeral_config(), true, false);
        server.start().unwrap();
        let addr = server.local_addr().unwrap();
        assert!(addr.port() > 0);
        server.stop();
    }
}
