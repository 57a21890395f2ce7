//! Black-box integration test: drives a real `RtspServer` over a real
//! `TcpStream`, exercising the OPTIONS -> DESCRIBE -> SETUP -> PLAY ->
//! TEARDOWN handshake over the interleaved RTP-over-TCP transport.

use std::io::{Read, Write};
use std::net::{IpAddr, Ipv4Addr, TcpStream};
use std::time::Duration;

use rtsp::buffer::flags;
use rtsp::{RtspServer, ServerConfig};

fn ephemeral_config() -> ServerConfig {
    ServerConfig {
        port: 0,
        bind_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
        session_name: "Camera Stream".to_string(),
    }
}

/// Sends one RTSP request and reads back a full response (headers plus
/// any `Content-Length` body), tolerant of the response arriving across
/// more than one TCP read.
fn rtsp_roundtrip(stream: &mut TcpStream, request: &str) -> String {
    stream.write_all(request.as_bytes()).unwrap();

    let mut response = String::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = stream.read(&mut buf).expect("read response");
        assert!(n > 0, "server closed connection mid-response");
        response.push_str(&String::from_utf8_lossy(&buf[..n]));

        let Some(header_end) = response.find("\r\n\r\n") else {
            continue;
        };
        let content_length = response
            .lines()
            .find(|l| l.to_ascii_lowercase().starts_with("content-length:"))
            .and_then(|l| l.split(':').nth(1))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        let body_so_far = response.len() - (header_end + 4);
        if body_so_far >= content_length {
            break;
        }
    }
    response
}

fn codec_config_access_unit() -> Vec<u8> {
    let mut au = Vec::new();
    // VPS (type 32), SPS (type 33), PPS (type 34), each a trivial body.
    for (ty, body) in [(32u8, &b"vps"[..]), (33, b"sps"), (34, b"pps")] {
        au.extend_from_slice(&[0, 0, 0, 1]);
        au.push(ty << 1);
        au.push(0x01);
        au.extend_from_slice(body);
    }
    au
}

#[test]
fn options_returns_supported_methods() {
    let server = RtspServer::new(ephemeral_config(), true, true);
    server.start().unwrap();
    let addr = server.local_addr().unwrap();

    let mut stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

    let resp = rtsp_roundtrip(&mut stream, "OPTIONS rtsp://host RTSP/1.0\r\nCSeq: 1\r\n\r\n");
    assert!(resp.starts_with("RTSP/1.0 200 OK\r\n"));
    assert!(resp.contains("CSeq: 1\r\n"));
    assert!(resp.contains("Public: OPTIONS, DESCRIBE, SETUP, PLAY, TEARDOWN\r\n"));

    server.stop();
}

#[test]
fn describe_blocks_until_parameter_sets_are_available_then_returns_sdp() {
    let server = RtspServer::new(ephemeral_config(), true, false);
    server.start().unwrap();
    let addr = server.local_addr().unwrap();
    let video_tap = server.video_tap();

    // Feed the codec-config access unit from another thread shortly
    // after connecting, so DESCRIBE genuinely blocks on the latch.
    let tap_for_feeder = video_tap.clone();
    std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(50));
        tap_for_feeder.on_frame(&codec_config_access_unit(), 0, flags::CODEC_CONFIG);
    });

    let mut stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

    let resp = rtsp_roundtrip(&mut stream, "DESCRIBE rtsp://host RTSP/1.0\r\nCSeq: 2\r\n\r\n");
    assert!(resp.starts_with("RTSP/1.0 200 OK\r\n"));
    assert!(resp.contains("Content-Type: application/sdp\r\n"));
    assert!(resp.contains("m=video 0 RTP/AVP 97\r\n"));
    assert!(resp.contains("a=rtpmap:97 H265/90000\r\n"));
    assert!(resp.contains("a=control:trackID=0\r\n"));

    server.stop();
}

#[test]
fn setup_rejects_non_tcp_transport_with_461() {
    let server = RtspServer::new(ephemeral_config(), true, true);
    server.start().unwrap();
    let addr = server.local_addr().unwrap();

    let mut stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

    let resp = rtsp_roundtrip(
        &mut stream,
        "SETUP rtsp://host/trackID=0 RTSP/1.0\r\n\
         CSeq: 3\r\nTransport: RTP/AVP;unicast;client_port=6000-6001\r\n\r\n",
    );
    assert!(resp.starts_with("RTSP/1.0 461 Unsupported Transport\r\n"));
    assert!(resp.contains("CSeq: 3\r\n"));
    assert!(resp.contains("Supported: Transport: RTP/AVP/TCP;unicast;interleaved=0-1\r\n"));

    server.stop();
}

#[test]
fn setup_over_tcp_is_accepted_with_matching_interleave() {
    let server = RtspServer::new(ephemeral_config(), true, true);
    server.start().unwrap();
    let addr = server.local_addr().unwrap();

    let mut stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

    let resp = rtsp_roundtrip(
        &mut stream,
        "SETUP rtsp://host/trackID=0 RTSP/1.0\r\n\
         CSeq: 4\r\nTransport: RTP/AVP/TCP;unicast;interleaved=0-1\r\n\r\n",
    );
    assert!(resp.starts_with("RTSP/1.0 200 OK\r\n"));
    assert!(resp.contains("Transport: RTP/AVP/TCP;unicast;interleaved=0-1\r\n"));
    assert!(resp.contains("Session: client_0\r\n"));

    server.stop();
}

#[test]
fn play_then_teardown_releases_the_client_slot_for_reuse() {
    let server = RtspServer::new(ephemeral_config(), true, true);
    server.start().unwrap();
    let addr = server.local_addr().unwrap();

    {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

        let play_resp = rtsp_roundtrip(&mut stream, "PLAY rtsp://host RTSP/1.0\r\nCSeq: 5\r\n\r\n");
        assert!(play_resp.starts_with("RTSP/1.0 200 OK\r\n"));
        assert!(play_resp.contains("Session: client_0\r\n"));

        let teardown_resp =
            rtsp_roundtrip(&mut stream, "TEARDOWN rtsp://host RTSP/1.0\r\nCSeq: 6\r\n\r\n");
        assert!(teardown_resp.starts_with("RTSP/1.0 200 OK\r\n"));
    }

    // Slot should free up quickly; a fresh connection should succeed.
    std::thread::sleep(Duration::from_millis(100));
    let mut stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    let resp = rtsp_roundtrip(&mut stream, "OPTIONS rtsp://host RTSP/1.0\r\nCSeq: 1\r\n\r\n");
    assert!(resp.starts_with("RTSP/1.0 200 OK\r\n"));

    server.stop();
}

#[test]
fn play_emits_interleaved_h265_rtp_over_the_same_socket() {
    let server = RtspServer::new(ephemeral_config(), true, false);
    server.start().unwrap();
    let addr = server.local_addr().unwrap();
    let video_tap = server.video_tap();

    let mut stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

    let play_resp = rtsp_roundtrip(&mut stream, "PLAY rtsp://host RTSP/1.0\r\nCSeq: 1\r\n\r\n");
    assert!(play_resp.starts_with("RTSP/1.0 200 OK\r\n"));

    // One small keyframe access unit, well under NORMAL_VIDEO_FRAME_SIZE.
    let mut au = vec![0, 0, 0, 1, 0x26, 0x01];
    au.extend(std::iter::repeat(0xaa).take(100));
    video_tap.on_frame(&au, 1_000, flags::KEY_FRAME);

    // Read the interleaved `$` frame directly off the same socket.
    let mut prefix = [0u8; 4];
    stream.read_exact(&mut prefix).expect("interleaved frame prefix");
    assert_eq!(prefix[0], b'$');
    assert_eq!(prefix[1], 0, "video RTP is channel 0");
    let len = u16::from_be_bytes([prefix[2], prefix[3]]) as usize;

    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).expect("interleaved payload");
    assert_eq!(payload[1] & 0x80, 0x80, "single-NAL packet sets the marker bit");
    assert_eq!(payload[1] & 0x7f, 97, "H.265 payload type");

    server.stop();
}
