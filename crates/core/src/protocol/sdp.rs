//! SDP (Session Description Protocol, RFC 4566) generation for
//! DESCRIBE responses.
//!
//! One session-level header followed by a media section per enabled
//! track, video before audio.

use crate::media::RtspMedia;
use crate::tap::ParameterSets;

/// Builds the SDP body for a DESCRIBE response.
///
/// `video_params` is only consulted when `media.video_enabled()`; the
/// caller is expected to have already blocked on
/// [`VideoEncoderTap::get_params`](crate::tap::VideoEncoderTap::get_params)
/// before calling this.
pub fn generate_sdp(
    media: &RtspMedia,
    client_ip: &str,
    session_name: &str,
    video_params: &ParameterSets,
) -> String {
    let mut lines: Vec<String> = Vec::new();

    lines.push("v=0".to_string());
    lines.push("o=- 0 0 IN IP4 127.0.0.1".to_string());
    lines.push(format!("s={}", session_name));
    lines.push(format!("c=IN IP4 {}", client_ip));
    lines.push("t=0 0".to_string());
    lines.push("a=control:*".to_string());

    if media.video_enabled() {
        lines.push("m=video 0 RTP/AVP 97".to_string());
        lines.push("a=rtpmap:97 H265/90000".to_string());
        lines.push(format!(
            "a=fmtp:97 sprop-vps={};sprop-sps={};sprop-pps={}",
            video_params.vps, video_params.sps, video_params.pps
        ));
        lines.push(format!("a=control:trackID={}", media.video_track_idx));
    }

    if media.audio_enabled() {
        lines.push("m=audio 0 RTP/AVP 96".to_string());
        lines.push("a=rtpmap:96 MPEG4-GENERIC/44100/1".to_string());
        lines.push(
            "a=fmtp:96 streamtype=5; profile-level-id=15; mode=AAC-hbr; config=1208; \
             SizeLength=13; IndexLength=3; IndexDeltaLength=3;"
                .to_string(),
        );
        lines.push(format!("a=control:trackID={}", media.audio_track_idx));
    }

    let mut sdp = lines.join("\r\n");
    sdp.push_str("\r\n");
    sdp
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ParameterSets {
        ParameterSets {
            vps: "AAAA".to_string(),
            sps: "BBBB".to_string(),
            pps: "CCCC".to_string(),
        }
    }

    #[test]
    fn video_only_sdp_includes_parameter_sets() {
        let media = RtspMedia::new(true, false);
        let sdp = generate_sdp(&media, "127.0.0.1", "Camera Stream", &params());

        assert!(sdp.contains("m=video 0 RTP/AVP 97\r\n"));
        assert!(sdp.contains("a=rtpmap:97 H265/90000\r\n"));
        assert!(sdp.contains("a=fmtp:97 sprop-vps=AAAA;sprop-sps=BBBB;sprop-pps=CCCC\r\n"));
        assert!(sdp.contains("a=control:trackID=0\r\n"));
        assert!(!sdp.contains("m=audio"));
    }

    #[test]
    fn video_and_audio_sdp_assigns_sequential_track_ids() {
        let media = RtspMedia::new(true, true);
        let sdp = generate_sdp(&media, "10.0.0.5", "Camera Stream", &params());

        assert!(sdp.contains("a=control:trackID=0\r\n"));
        assert!(sdp.contains("a=control:trackID=1\r\n"));
        assert!(sdp.contains("m=audio 0 RTP/AVP 96\r\n"));
        assert!(sdp.contains("a=rtpmap:96 MPEG4-GENERIC/44100/1\r\n"));

        let video_idx = sdp.find("m=video").unwrap();
        let audio_idx = sdp.find("m=audio").unwrap();
        assert!(video_idx < audio_idx, "video section should precede audio");
    }

    #[test]
    fn sdp_ends_with_crlf() {
        let media = RtspMedia::new(true, true);
        let sdp = generate_sdp(&media, "127.0.0.1", "Camera Stream", &params());
        assert!(sdp.ends_with("\r\n"));
    }

    #[test]
    fn session_name_is_not_hardcoded() {
        let media = RtspMedia::new(true, false);
        let sdp = generate_sdp(&media, "127.0.0.1", "My Stream", &params());
        assert!(sdp.contains("s=My Stream\r\n"));
    }
}
