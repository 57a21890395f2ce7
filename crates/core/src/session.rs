//! Bundles one client's audio and video writers into a single
//! start/stop unit.

use std::net::TcpStream;
use std::sync::Arc;

use crate::cancellable_socket::CancellableSocket;
use crate::stream::{AudioStream, VideoStream};
use crate::tap::{AudioEncoderTap, VideoEncoderTap};

/// One client's RTP delivery: an `AudioStream` and a `VideoStream`
/// registered as listeners on the server's shared encoder taps for as
/// long as this session is running.
///
/// Listener registration and removal are owned by the streams
/// themselves (see `VideoStream`/`AudioStream::start`): each writer
/// thread removes itself from its tap as the last thing it does before
/// exiting, whether that exit was `stop()`-requested or the writer gave
/// up on its own. This session only needs to hand the tap references
/// down and forward `start`/`stop` calls.
pub struct RtpSession {
    video: Arc<VideoStream>,
    audio: Arc<AudioStream>,
    video_tap: Arc<VideoEncoderTap>,
    audio_tap: Arc<AudioEncoderTap>,
}

impl RtpSession {
    pub fn new(video_tap: Arc<VideoEncoderTap>, audio_tap: Arc<AudioEncoderTap>) -> Self {
        Self {
            video: VideoStream::new(),
            audio: AudioStream::new(),
            video_tap,
            audio_tap,
        }
    }

    /// Starts whichever tracks have a channel assigned, each against a
    /// freshly generated SSRC.
    pub fn start(
        &self,
        socket: Arc<CancellableSocket<TcpStream>>,
        video_channel: Option<u8>,
        audio_channel: Option<u8>,
    ) {
        if let Some(channel) = video_channel {
            self.video
                .start(Arc::clone(&socket), channel, Arc::clone(&self.video_tap));
        }
        if let Some(channel) = audio_channel {
            self.audio.start(socket, channel, Arc::clone(&self.audio_tap));
        }
    }

    pub fn stop(&self) {
        self.video.stop();
        self.audio.stop();
    }

    pub fn is_running(&self) -> bool {
        self.video.is_running() || self.audio.is_running()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_is_not_running() {
        let session = RtpSession::new(VideoEncoderTap::new(), AudioEncoderTap::new());
        assert!(!session.is_running());
    }

    #[test]
    fn stop_on_never_started_session_is_a_no_op() {
        let session = RtpSession::new(VideoEncoderTap::new(), AudioEncoderTap::new());
        session.stop();
        assert!(!session.is_running());
    }
}
