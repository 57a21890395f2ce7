//! Per-client RTSP protocol state machine.
//!
//! One worker thread per accepted connection, spawned by
//! [`crate::server::RtspServer`]'s acceptor loop. Drives blocking reads
//! on a [`CancellableSocket`] and dispatches OPTIONS/DESCRIBE/SETUP/PLAY/
//! TEARDOWN/GET_PARAMETER, generating SDP and starting/stopping this
//! client's [`RtpSession`] as the handshake progresses.

use std::net::TcpStream;
use std::sync::Arc;

use crate::cancellable_socket::CancellableSocket;
use crate::error::RtspError;
use crate::media::RtspMedia;
use crate::protocol::{sdp, RtspRequest, RtspResponse};
use crate::session::RtpSession;
use crate::tap::{AudioEncoderTap, VideoEncoderTap};

/// Bound on one read's worth of request text (response buffer is
/// bounded to 2 KiB).
const REQUEST_BUFFER_SIZE: usize = 2048;

/// RTSP/1.0 methods this server answers with something other than
/// `501 Not Implemented` (PAUSE is deliberately absent — see DESIGN.md).
const SUPPORTED_METHODS: &str = "OPTIONS, DESCRIBE, SETUP, PLAY, TEARDOWN";

/// Drives one client connection from accept to disconnect.
pub struct RtspClient {
    id: usize,
    media: RtspMedia,
    session_name: String,
    video_tap: Arc<VideoEncoderTap>,
    audio_tap: Arc<AudioEncoderTap>,
    session: RtpSession,
}

impl RtspClient {
    pub fn new(
        id: usize,
        media: RtspMedia,
        session_name: String,
        video_tap: Arc<VideoEncoderTap>,
        audio_tap: Arc<AudioEncoderTap>,
    ) -> Self {
        let session = RtpSession::new(Arc::clone(&video_tap), Arc::clone(&audio_tap));
        Self {
            id,
            media,
            session_name,
            video_tap,
            audio_tap,
            session,
        }
    }

    pub fn is_running(&self) -> bool {
        self.session.is_running()
    }

    /// Runs the request/response loop until the peer disconnects, the
    /// socket is interrupted, or TEARDOWN is received. Always leaves
    /// the session stopped on return.
    pub fn run(&self, socket: Arc<CancellableSocket<TcpStream>>) {
        let client_ip = socket
            .peer_addr()
            .map(|addr| addr.ip().to_string())
            .unwrap_or_else(|_| "0.0.0.0".to_string());

        let mut buf = [0u8; REQUEST_BUFFER_SIZE];
        loop {
            let n = match socket.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(RtspError::Interrupted) => break,
                Err(err) => {
                    tracing::debug!(client = self.id, error = %err, "client read failed");
                    break;
                }
            };

            let text = String::from_utf8_lossy(&buf[..n]);
            let request = match RtspRequest::parse(&text) {
                Ok(request) => request,
                Err(_) => {
                    // Not a parseable request line — e.g. an interleaved
                    // RTP/RTCP frame arriving on the same socket during
                    // streaming. Ignore silently.
                    continue;
                }
            };

            let Some(cseq) = request.cseq_number() else {
                continue;
            };

            let teardown = request.method.eq_ignore_ascii_case("TEARDOWN");
            let response = self.handle_request(&request, cseq, &client_ip, &socket);

            if socket.write_all(response.serialize().as_bytes()).is_err() {
                break;
            }

            if teardown {
                break;
            }
        }

        self.session.stop();
    }

    fn handle_request(
        &self,
        request: &RtspRequest,
        cseq: u32,
        client_ip: &str,
        socket: &Arc<CancellableSocket<TcpStream>>,
    ) -> RtspResponse {
        let cseq_str = cseq.to_string();

        match request.method.to_ascii_uppercase().as_str() {
            "OPTIONS" => RtspResponse::ok()
                .add_header("CSeq", &cseq_str)
                .add_header("Public", SUPPORTED_METHODS),

            "DESCRIBE" => {
                // Only block on the parameter-set latch when a video
                // track is actually enabled; an audio-only deployment
                // has no VPS/SPS/PPS to wait for.
                let params = if self.media.video_enabled() {
                    self.video_tap.get_params()
                } else {
                    crate::tap::ParameterSets::default()
                };
                let sdp_body =
                    sdp::generate_sdp(&self.media, client_ip, &self.session_name, &params);
                RtspResponse::ok()
                    .add_header("CSeq", &cseq_str)
                    .add_header("Content-Type", "application/sdp")
                    .with_body(sdp_body)
            }

            "SETUP" => self.handle_setup(request, &cseq_str),

            "PLAY" => {
                self.session.start(
                    Arc::clone(socket),
                    self.media.video_enabled().then_some(self.media.video_interleave),
                    self.media.audio_enabled().then_some(self.media.audio_interleave),
                );
                RtspResponse::ok()
                    .add_header("CSeq", &cseq_str)
                    .add_header("Session", &self.session_id())
            }

            "TEARDOWN" => {
                self.session.stop();
                RtspResponse::ok().add_header("CSeq", &cseq_str)
            }

            "GET_PARAMETER" => RtspResponse::ok().add_header("CSeq", &cseq_str),

            _ => RtspResponse::new(501, "Not Implemented").add_header("CSeq", &cseq_str),
        }
    }

    fn handle_setup(&self, request: &RtspRequest, cseq_str: &str) -> RtspResponse {
        let track_id = request.track_id().unwrap_or(0);
        let Some((rtp, rtcp)) = self.media.interleave_for_track(track_id) else {
            return RtspResponse::not_found().add_header("CSeq", cseq_str);
        };

        let is_tcp = request
            .get_header("Transport")
            .is_some_and(|t| t.contains("RTP/AVP/TCP"));

        if !is_tcp {
            return RtspResponse::unsupported_transport()
                .add_header("CSeq", cseq_str)
                .add_header(
                    "Supported",
                    &format!("Transport: RTP/AVP/TCP;unicast;interleaved={}-{}", rtp, rtcp),
                );
        }

        RtspResponse::ok()
            .add_header("CSeq", cseq_str)
            .add_header(
                "Transport",
                &format!("RTP/AVP/TCP;unicast;interleaved={}-{}", rtp, rtcp),
            )
            .add_header("Session", &self.session_id())
    }

    /// `client_<id>`, matching the `client_%d` session-id format
    /// RTSP clients expect from this server family.
    fn session_id(&self) -> String {
        format!("client_{}", self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(id: usize) -> RtspClient {
        let media = RtspMedia::new(true, true);
        RtspClient::new(
            id,
            media,
            "Camera Stream".to_string(),
            VideoEncoderTap::new(),
            AudioEncoderTap::new(),
        )
    }

    fn request(raw: &str) -> RtspRequest {
        RtspRequest::parse(raw).unwrap()
    }

    #[test]
    fn options_lists_supported_methods() {
        let client = client(0);
        let req = request("OPTIONS rtsp://localhost RTSP/1.0\r\nCSeq: 1\r\n\r\n");
        let resp = client.handle_request(&req, 1, "127.0.0.1", &test_socket());
        assert_eq!(resp.status_code, 200);
        let serialized = resp.serialize();
        assert!(serialized.contains("Public: OPTIONS, DESCRIBE, SETUP, PLAY, TEARDOWN"));
    }

    #[test]
    fn setup_without_tcp_transport_is_rejected() {
        let client = client(0);
        let req = request(
            "SETUP rtsp://localhost/trackID=0 RTSP/1.0\r\n\
             CSeq: 2\r\nTransport: RTP/AVP;unicast;client_port=8000-8001\r\n\r\n",
        );
        let resp = client.handle_request(&req, 2, "127.0.0.1", &test_socket());
        assert_eq!(resp.status_code, 461);
        assert!(resp.serialize().contains("Supported: Transport: RTP/AVP/TCP"));
    }

    #[test]
    fn setup_without_tcp_transport_for_audio_track_uses_audio_channel() {
        let client = client(0);
        let req = request(
            "SETUP rtsp://localhost/trackID=1 RTSP/1.0\r\n\
             CSeq: 2\r\nTransport: RTP/AVP;unicast;client_port=8000-8001\r\n\r\n",
        );
        let resp = client.handle_request(&req, 2, "127.0.0.1", &test_socket());
        assert_eq!(resp.status_code, 461);
        let serialized = resp.serialize();
        assert!(serialized.contains("Supported: Transport: RTP/AVP/TCP;unicast;interleaved=2-3"));
    }

    #[test]
    fn setup_with_tcp_transport_for_video_track_is_accepted() {
        let client = client(0);
        let req = request(
            "SETUP rtsp://localhost/trackID=0 RTSP/1.0\r\n\
             CSeq: 3\r\nTransport: RTP/AVP/TCP;unicast;interleaved=0-1\r\n\r\n",
        );
        let resp = client.handle_request(&req, 3, "127.0.0.1", &test_socket());
        assert_eq!(resp.status_code, 200);
        let serialized = resp.serialize();
        assert!(serialized.contains("Transport: RTP/AVP/TCP;unicast;interleaved=0-1"));
        assert!(serialized.contains("Session: client_0"));
    }

    #[test]
    fn setup_with_tcp_transport_for_audio_track_uses_audio_channel() {
        let client = client(0);
        let req = request(
            "SETUP rtsp://localhost/trackID=1 RTSP/1.0\r\n\
             CSeq: 4\r\nTransport: RTP/AVP/TCP;unicast;interleaved=2-3\r\n\r\n",
        );
        let resp = client.handle_request(&req, 4, "127.0.0.1", &test_socket());
        assert!(resp.serialize().contains("Transport: RTP/AVP/TCP;unicast;interleaved=2-3"));
    }

    #[test]
    fn unrecognized_method_is_not_implemented() {
        let client = client(0);
        let req = request("PAUSE rtsp://localhost RTSP/1.0\r\nCSeq: 5\r\n\r\n");
        let resp = client.handle_request(&req, 5, "127.0.0.1", &test_socket());
        assert_eq!(resp.status_code, 501);
    }

    /// A `CancellableSocket<TcpStream>` is only needed by PLAY (to hand
    /// off to the writer threads); the other handlers never touch it,
    /// so a loopback pair is enough to satisfy the type.
    fn test_socket() -> Arc<CancellableSocket<TcpStream>> {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let _ = listener.accept().unwrap();
        Arc::new(CancellableSocket::from_stream(client).unwrap())
    }
}
