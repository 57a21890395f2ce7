//! Enabled-track bookkeeping shared by SDP generation and SETUP/PLAY
//! request routing.
//!
//! Built once when [`RtspServer`](crate::server::RtspServer) starts and
//! read-only thereafter.

use crate::config::{AUDIO_INTERLEAVE_CHANNEL, VIDEO_INTERLEAVE_CHANNEL};

/// Sentinel track index for a disabled track.
pub const TRACK_DISABLED: i32 = -1;

/// Which tracks this deployment serves, and their SDP track ids /
/// interleave channel assignments.
///
/// Track indices are assigned sequentially starting at 0, in the
/// order (video, audio), over whichever tracks are enabled.
#[derive(Debug, Clone, Copy)]
pub struct RtspMedia {
    pub video_track_idx: i32,
    pub audio_track_idx: i32,
    pub video_interleave: u8,
    pub audio_interleave: u8,
}

impl RtspMedia {
    /// Assigns sequential track ids to the enabled tracks, video before
    /// audio, and fixes the interleave channel pair each track uses for
    /// RTP (even) / RTCP (odd).
    pub fn new(enable_video: bool, enable_audio: bool) -> Self {
        let mut next_idx = 0;

        let video_track_idx = if enable_video {
            let idx = next_idx;
            next_idx += 1;
            idx
        } else {
            TRACK_DISABLED
        };

        let audio_track_idx = if enable_audio {
            let idx = next_idx;
            next_idx += 1;
            idx
        } else {
            TRACK_DISABLED
        };

        Self {
            video_track_idx,
            audio_track_idx,
            video_interleave: VIDEO_INTERLEAVE_CHANNEL,
            audio_interleave: AUDIO_INTERLEAVE_CHANNEL,
        }
    }

    pub fn video_enabled(&self) -> bool {
        self.video_track_idx >= 0
    }

    pub fn audio_enabled(&self) -> bool {
        self.audio_track_idx >= 0
    }

    /// Resolves a SETUP request's `trackID=k` to its RTP/RTCP
    /// interleave channel pair, or `None` if `k` names neither enabled
    /// track.
    pub fn interleave_for_track(&self, track_id: i32) -> Option<(u8, u8)> {
        if self.video_enabled() && track_id == self.video_track_idx {
            Some((self.video_interleave, self.video_interleave + 1))
        } else if self.audio_enabled() && track_id == self.audio_track_idx {
            Some((self.audio_interleave, self.audio_interleave + 1))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_only_gets_track_0() {
        let media = RtspMedia::new(true, false);
        assert_eq!(media.video_track_idx, 0);
        assert_eq!(media.audio_track_idx, TRACK_DISABLED);
        assert!(!media.audio_enabled());
    }

    #[test]
    fn video_and_audio_assigned_in_order() {
        let media = RtspMedia::new(true, true);
        assert_eq!(media.video_track_idx, 0);
        assert_eq!(media.audio_track_idx, 1);
    }

    #[test]
    fn audio_only_still_gets_track_0() {
        let media = RtspMedia::new(false, true);
        assert_eq!(media.audio_track_idx, 0);
        assert_eq!(media.video_track_idx, TRACK_DISABLED);
    }

    #[test]
    fn interleave_lookup_matches_assigned_tracks() {
        let media = RtspMedia::new(true, true);
        assert_eq!(media.interleave_for_track(0), Some((0, 1)));
        assert_eq!(media.interleave_for_track(1), Some((2, 3)));
        assert_eq!(media.interleave_for_track(2), None);
    }
}
