//! DDP v1 header parsing (spec §4.4).
//!
//! ```text
//! byte 0      magic, must be 0x41 ('A')
//! byte 1      flags; bit 0 = PUSH (end of frame)
//! byte 2      sequence number (0-255)
//! bytes 3-5   24-bit big-endian data offset, in bytes
//! bytes 6-7   16-bit big-endian payload length
//! bytes 8-9   16-bit data id (ignored)
//! ```

use thiserror::Error;

pub const HEADER_LEN: usize = 10;
const MAGIC: u8 = 0x41;
const FLAG_PUSH: u8 = 0x01;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DdpError {
    #[error("datagram shorter than the 10-byte DDP header")]
    ShortHeader,
    #[error("bad magic byte {0:#04x}, expected 0x41")]
    BadMagic(u8),
    #[error("declared payload length {declared} does not match remaining bytes {actual}")]
    LengthMismatch { declared: usize, actual: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DdpHeader {
    pub sequence: u8,
    pub offset: usize,
    pub length: usize,
    pub push: bool,
}

/// Parse a raw UDP datagram into a header and its payload slice.
///
/// Packets with a bad magic byte are dropped silently per spec §4.4; this
/// still surfaces as `Err` so the caller can count it as a malformed-input
/// packet without logging, matching spec §7's policy table.
pub fn parse(datagram: &[u8]) -> Result<(DdpHeader, &[u8]), DdpError> {
    if datagram.len() < HEADER_LEN {
        return Err(DdpError::ShortHeader);
    }
    if datagram[0] != MAGIC {
        return Err(DdpError::BadMagic(datagram[0]));
    }

    let flags = datagram[1];
    let sequence = datagram[2];
    let offset = ((datagram[3] as usize) << 16) | ((datagram[4] as usize) << 8) | (datagram[5] as usize);
    let length = ((datagram[6] as usize) << 8) | (datagram[7] as usize);
    let payload = &datagram[HEADER_LEN..];

    if payload.len() != length {
        return Err(DdpError::LengthMismatch {
            declared: length,
            actual: payload.len(),
        });
    }

    Ok((
        DdpHeader {
            sequence,
            offset,
            length,
            push: flags & FLAG_PUSH != 0,
        },
        payload,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(seq: u8, offset: u32, push: bool, payload: &[u8]) -> Vec<u8> {
        let mut p = vec![0x41, if push { 0x01 } else { 0x00 }, seq];
        p.push((offset >> 16) as u8);
        p.push((offset >> 8) as u8);
        p.push(offset as u8);
        let len = payload.len() as u16;
        p.push((len >> 8) as u8);
        p.push(len as u8);
        p.push(0);
        p.push(0);
        p.extend_from_slice(payload);
        p
    }

    #[test]
    fn parses_valid_header() {
        let data = packet(7, 0, true, &[10, 20, 30]);
        let (header, payload) = parse(&data).unwrap();
        assert_eq!(header.sequence, 7);
        assert_eq!(header.offset, 0);
        assert_eq!(header.length, 3);
        assert!(header.push);
        assert_eq!(payload, &[10, 20, 30]);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut data = packet(1, 0, false, &[1, 2, 3]);
        data[0] = 0x42;
        assert_eq!(parse(&data), Err(DdpError::BadMagic(0x42)));
    }

    #[test]
    fn rejects_short_header() {
        assert_eq!(parse(&[0x41, 0, 0]), Err(DdpError::ShortHeader));
    }

    #[test]
    fn rejects_length_mismatch() {
        let mut data = packet(1, 0, false, &[1, 2, 3]);
        data.pop();
        assert!(matches!(
            parse(&data),
            Err(DdpError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn decodes_24_bit_offset() {
        let data = packet(1, 0x010203, false, &[9]);
        let (header, _) = parse(&data).unwrap();
        assert_eq!(header.offset, 0x010203);
    }
}
