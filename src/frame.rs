use crate::error::RadioTestError;

/// Command byte at offset 0: echo request.
pub const CMD_ECHO: u8 = 0x00;
/// Bytes before the marker: command + src + dst + seq.
pub const HEADER_LEN: usize = 13;
/// Fixed ASCII tag identifying a frame as part of this protocol.
pub const MARKER: &[u8; 4] = b"PING";
/// Smallest frame that can carry header + marker.
pub const MIN_FRAME_LEN: usize = HEADER_LEN + MARKER.len();

/// Decoded view of a probe frame. Ephemeral: built for each transmit,
/// decoded for each receive, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeFrame {
    pub command: u8,
    pub src_addr: u32,
    pub dst_addr: u32,
    pub seq: u32,
}

/// Encode a probe: 13-byte header, "PING", then filler bytes 0,1,2,...
/// up to `frame_len` total.
pub fn build_probe(src_addr: u32, dst_addr: u32, seq: u32, frame_len: usize) -> Vec<u8> {
    debug_assert!(frame_len >= MIN_FRAME_LEN);
    let mut buf = Vec::with_capacity(frame_len);
    buf.push(CMD_ECHO);
    buf.extend_from_slice(&src_addr.to_le_bytes());
    buf.extend_from_slice(&dst_addr.to_le_bytes());
    buf.extend_from_slice(&seq.to_le_bytes());
    buf.extend_from_slice(MARKER);
    for i in 0..frame_len.saturating_sub(MIN_FRAME_LEN) {
        buf.push(i as u8);
    }
    buf
}

/// Whether `frame` carries the protocol marker at the fixed offset. This is
/// the whole acceptance test on the master side: the reply's addresses are
/// reported, not enforced.
pub fn has_marker(frame: &[u8]) -> bool {
    frame.len() >= MIN_FRAME_LEN && &frame[HEADER_LEN..MIN_FRAME_LEN] == MARKER
}

/// Decode the header of a received frame. Frames shorter than the header
/// are a `ProtocolMismatch`; a missing marker is a `Frame` error.
pub fn parse_probe(frame: &[u8]) -> Result<ProbeFrame, RadioTestError> {
    if frame.len() < MIN_FRAME_LEN {
        return Err(RadioTestError::ProtocolMismatch(frame.len()));
    }
    if !has_marker(frame) {
        return Err(RadioTestError::Frame("missing PING marker".into()));
    }
    Ok(ProbeFrame {
        command: frame[0],
        src_addr: u32::from_le_bytes(frame[1..5].try_into().unwrap()),
        dst_addr: u32::from_le_bytes(frame[5..9].try_into().unwrap()),
        seq: u32::from_le_bytes(frame[9..13].try_into().unwrap()),
    })
}
