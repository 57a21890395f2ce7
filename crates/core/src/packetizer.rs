//! Stateless RTP/RTCP packetizers: byte-exact wire encoders for H.265
//! (RFC 7798), AAC-LATM (RFC 3640 MPEG4-GENERIC mode AAC-hbr), and RTCP
//! Sender Reports (RFC 3550 §6.4.1), all carrying the RFC 2326 §10.12
//! interleaved TCP framing prefix.

use crate::config::{
    AAC_PAYLOAD_TYPE, H265_FU_NAL_TYPE, H265_PAYLOAD_TYPE, RTP_VERSION, TCP_PREFIX_SIZE,
};
use crate::error::RtspError;
use crate::nal::NalUnit;

const RTP_HEADER_SIZE: usize = 12;
const H265_PAYLOAD_HEADER_SIZE: usize = 2;
const H265_FU_HEADER_SIZE: usize = 1;
const AAC_AU_HEADER_SIZE: usize = 2;
const AAC_AU_SIZE: usize = 2;

/// Writes the 4-byte `$<channel><len16>` interleaved framing prefix.
fn write_tcp_prefix(dst: &mut [u8], channel: u8, payload_len: usize) {
    dst[0] = b'$';
    dst[1] = channel;
    dst[2] = ((payload_len >> 8) & 0xff) as u8;
    dst[3] = (payload_len & 0xff) as u8;
}

/// Writes the fixed 12-byte RTP header (no CSRC, no extension).
fn write_rtp_header(dst: &mut [u8], marker: bool, payload_type: u8, seq: u16, timestamp: u32, ssrc: u32) {
    dst[0] = RTP_VERSION;
    dst[1] = (if marker { 0x80 } else { 0x00 }) | payload_type;
    dst[2] = (seq >> 8) as u8;
    dst[3] = (seq & 0xff) as u8;
    dst[4..8].copy_from_slice(&timestamp.to_be_bytes());
    dst[8..12].copy_from_slice(&ssrc.to_be_bytes());
}

/// Packetizes one AAC access unit as a single MPEG4-GENERIC AAC-hbr RTP
/// packet (RFC 3640 §3.2.1), with the interleaved TCP prefix.
///
/// Returns the number of bytes written to `dst`.
pub fn packetize_aac(
    channel: u8,
    ssrc: u32,
    seq: u16,
    timestamp: u32,
    payload: &[u8],
    dst: &mut [u8],
) -> Result<usize, RtspError> {
    let packet_size = RTP_HEADER_SIZE + AAC_AU_HEADER_SIZE + AAC_AU_SIZE + payload.len();
    if TCP_PREFIX_SIZE + packet_size > dst.len() {
        return Err(RtspError::PacketizerBufferTooSmall);
    }

    write_tcp_prefix(dst, channel, packet_size);
    write_rtp_header(
        &mut dst[TCP_PREFIX_SIZE..],
        true,
        AAC_PAYLOAD_TYPE,
        seq,
        timestamp,
        ssrc,
    );

    let mut i = TCP_PREFIX_SIZE + RTP_HEADER_SIZE;
    dst[i] = 0x00;
    dst[i + 1] = 0x10;
    i += AAC_AU_HEADER_SIZE;

    let size = payload.len() as u16;
    dst[i] = (size >> 5) as u8;
    dst[i + 1] = ((size << 3) & 0xf8) as u8;
    i += AAC_AU_SIZE;

    dst[i..i + payload.len()].copy_from_slice(payload);

    Ok(TCP_PREFIX_SIZE + packet_size)
}

/// Packetizes one fragment of an H.265 access unit's NAL unit, in
/// either single-NAL-unit mode (RFC 7798 §4.4.1) or fragmentation-unit
/// mode (RFC 7798 §4.4.3).
///
/// `src_offset` is the byte offset within `access_unit` to resume from;
/// the caller drives a loop advancing it via the returned offset until
/// it reaches `nal.end`. Marker bit is set on the final fragment of the
/// NAL (single-mode, or FU end).
///
/// Returns `(bytes_written, new_src_offset)`.
pub fn packetize_h265_nal(
    channel: u8,
    ssrc: u32,
    seq: u16,
    timestamp: u32,
    access_unit: &[u8],
    mut src_offset: usize,
    nal: &NalUnit,
    dst: &mut [u8],
) -> Result<(usize, usize), RtspError> {
    let header_size = RTP_HEADER_SIZE + H265_PAYLOAD_HEADER_SIZE;

    if src_offset < nal.start
        || src_offset >= nal.end
        || nal.end > access_unit.len()
        || TCP_PREFIX_SIZE + header_size >= dst.len()
    {
        return Err(RtspError::PacketizerBufferTooSmall);
    }

    let is_segment_start = src_offset == nal.start;
    let is_single_mode =
        is_segment_start && TCP_PREFIX_SIZE + header_size + (nal.end - nal.start - nal.code_size) <= dst.len();
    let is_segment_end = TCP_PREFIX_SIZE + header_size + H265_FU_HEADER_SIZE + (nal.end - src_offset) <= dst.len();

    let packet_size = if is_single_mode {
        header_size + (nal.end - nal.start - nal.code_size)
    } else if is_segment_end {
        header_size + H265_FU_HEADER_SIZE + (nal.end - src_offset)
    } else {
        dst.len() - TCP_PREFIX_SIZE
    };

    write_tcp_prefix(dst, channel, packet_size);
    write_rtp_header(
        &mut dst[TCP_PREFIX_SIZE..],
        is_single_mode || is_segment_end,
        H265_PAYLOAD_TYPE,
        seq,
        timestamp,
        ssrc,
    );

    let mut i = TCP_PREFIX_SIZE + RTP_HEADER_SIZE;

    if is_single_mode {
        src_offset += nal.code_size;
        let payload_len = nal.end - src_offset;
        dst[i..i + payload_len].copy_from_slice(&access_unit[src_offset..nal.end]);
        let total = TCP_PREFIX_SIZE + packet_size;
        return Ok((total, nal.end));
    }

    let nal_header_offset = nal.header_offset();
    let nal_type_byte = access_unit[nal_header_offset];
    let fu_type_byte1 = (nal_type_byte & 0x81) | ((H265_FU_NAL_TYPE << 1) & 0x7e);
    let nal_type = (nal_type_byte >> 1) & 0x3f;

    dst[i] = fu_type_byte1;
    dst[i + 1] = access_unit[nal_header_offset + 1];
    i += H265_PAYLOAD_HEADER_SIZE;

    let mut fu_header = nal_type;
    if is_segment_start {
        fu_header |= 0x80;
    } else if is_segment_end {
        fu_header |= 0x40;
    }
    dst[i] = fu_header;
    i += H265_FU_HEADER_SIZE;

    if is_segment_start {
        src_offset += nal.code_size;
    }

    let payload_len = packet_size - header_size - H265_FU_HEADER_SIZE;
    dst[i..i + payload_len].copy_from_slice(&access_unit[src_offset..src_offset + payload_len]);
    src_offset += payload_len;

    Ok((TCP_PREFIX_SIZE + packet_size, src_offset))
}

/// Seconds between the NTP epoch (1900-01-01) and the Unix epoch (1970-01-01).
const NTP_UNIX_EPOCH_OFFSET_SECS: u64 = 2_208_988_800;

/// Packetizes an RTCP Sender Report (RFC 3550 §6.4.1): a single 28-byte
/// compound packet, no report blocks, with the interleaved TCP prefix.
pub fn packetize_rtcp_sr(
    channel: u8,
    ssrc: u32,
    unix_time: std::time::SystemTime,
    rtp_timestamp: u32,
    packet_count: u32,
    octet_count: u32,
    dst: &mut [u8],
) -> Result<usize, RtspError> {
    const SR_BODY_SIZE: usize = 24; // everything after the 4-byte fixed header
    const PACKET_SIZE: usize = 4 + SR_BODY_SIZE;
    if TCP_PREFIX_SIZE + PACKET_SIZE > dst.len() {
        return Err(RtspError::PacketizerBufferTooSmall);
    }

    let since_epoch = unix_time
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    let ntp_secs = since_epoch.as_secs() + NTP_UNIX_EPOCH_OFFSET_SECS;
    let ntp_frac = ((since_epoch.subsec_nanos() as u64) << 32) / 1_000_000_000;

    write_tcp_prefix(dst, channel, PACKET_SIZE);

    let mut i = TCP_PREFIX_SIZE;
    dst[i] = 0x80; // V=2, P=0, RC=0
    dst[i + 1] = 200; // PT = SR
    dst[i + 2] = 0x00;
    dst[i + 3] = 0x06; // length in 32-bit words, minus one
    i += 4;

    dst[i..i + 4].copy_from_slice(&ssrc.to_be_bytes());
    i += 4;
    dst[i..i + 4].copy_from_slice(&(ntp_secs as u32).to_be_bytes());
    i += 4;
    dst[i..i + 4].copy_from_slice(&(ntp_frac as u32).to_be_bytes());
    i += 4;
    dst[i..i + 4].copy_from_slice(&rtp_timestamp.to_be_bytes());
    i += 4;
    dst[i..i + 4].copy_from_slice(&packet_count.to_be_bytes());
    i += 4;
    dst[i..i + 4].copy_from_slice(&octet_count.to_be_bytes());

    Ok(TCP_PREFIX_SIZE + PACKET_SIZE)
}
