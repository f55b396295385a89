//! MPEG-TS packet framing checks.

/// TS packet size.
pub const TS_PACKET_SIZE: usize = 188;
/// TS sync byte.
pub const SYNC_BYTE: u8 = 0x47;

/// Returns true if `data` starts on a packet boundary and every complete
/// packet in it begins with the sync byte.
pub fn is_aligned_ts(data: &[u8]) -> bool {
    if data.is_empty() || data[0] != SYNC_BYTE {
        return false;
    }
    data.chunks(TS_PACKET_SIZE)
        .filter(|packet| packet.len() == TS_PACKET_SIZE)
        .all(|packet| packet[0] == SYNC_BYTE)
}
