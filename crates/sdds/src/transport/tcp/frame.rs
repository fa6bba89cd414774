// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 SDDS contributors

//! RTCP-style framing for RTPS over TCP.
//!
//! TCP is a stream; every RTPS message is prefixed with a 14-byte frame
//! header that also multiplexes logical ports over one physical connection:
//!
//! ```text
//! +------+-------------+--------------+---------+
//! |'RTCP'| length (u32)| logical (u16)| crc(u32)|  payload ...
//! +------+-------------+--------------+---------+
//! ```
//!
//! The length counts the header itself. The CRC covers the payload and is
//! optional per direction (calculate/check flags); a zero CRC with checking
//! disabled always passes.

use std::io::{self, Read};

/// Frame magic: "RTCP".
pub const RTCP_MAGIC: &[u8; 4] = b"RTCP";

/// Frame header size.
pub const RTCP_HEADER_SIZE: usize = 14;

/// Logical port reserved for connection-control frames (bind, keepalive).
pub const CONTROL_LOGICAL_PORT: u16 = 0;

/// CRC-32 (IEEE 802.3, reflected) over the payload.
#[must_use]
pub fn compute_crc(data: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for byte in data {
        crc ^= u32::from(*byte);
        for _ in 0..8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (0xEDB8_8320 & mask);
        }
    }
    !crc
}

/// Parsed frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Total frame length including the header.
    pub length: u32,
    /// Logical port the payload belongs to.
    pub logical_port: u16,
    /// Payload CRC (zero when the sender does not calculate CRCs).
    pub crc: u32,
}

impl FrameHeader {
    fn decode(bytes: &[u8; RTCP_HEADER_SIZE]) -> io::Result<Self> {
        if &bytes[0..4] != RTCP_MAGIC {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "bad RTCP magic"));
        }
        let length = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        let logical_port = u16::from_le_bytes([bytes[8], bytes[9]]);
        let crc = u32::from_le_bytes([bytes[10], bytes[11], bytes[12], bytes[13]]);
        if (length as usize) < RTCP_HEADER_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "RTCP length below header size",
            ));
        }
        Ok(Self {
            length,
            logical_port,
            crc,
        })
    }
}

/// Frame a payload for the given logical port.
#[must_use]
pub fn encode_frame(logical_port: u16, payload: &[u8], calculate_crc: bool) -> Vec<u8> {
    let length = (RTCP_HEADER_SIZE + payload.len()) as u32;
    let crc = if calculate_crc { compute_crc(payload) } else { 0 };
    let mut frame = Vec::with_capacity(length as usize);
    frame.extend_from_slice(RTCP_MAGIC);
    frame.extend_from_slice(&length.to_le_bytes());
    frame.extend_from_slice(&logical_port.to_le_bytes());
    frame.extend_from_slice(&crc.to_le_bytes());
    frame.extend_from_slice(payload);
    frame
}

enum ReadState {
    Header { read: usize },
    Body { header: FrameHeader, read: usize },
}

/// Incremental frame decoder for non-blocking streams.
///
/// Keeps partial-read state across calls; designed to be called repeatedly
/// whenever the socket becomes readable.
pub struct FrameDecoder {
    state: ReadState,
    buf: Vec<u8>,
    max_size: usize,
    check_crc: bool,
}

impl FrameDecoder {
    #[must_use]
    pub fn new(max_size: usize, check_crc: bool) -> Self {
        Self {
            state: ReadState::Header { read: 0 },
            buf: vec![0u8; RTCP_HEADER_SIZE],
            max_size,
            check_crc,
        }
    }

    /// Reset after a connection reset.
    pub fn reset(&mut self) {
        self.state = ReadState::Header { read: 0 };
        self.buf.resize(RTCP_HEADER_SIZE, 0);
    }

    /// Try to decode one complete frame.
    ///
    /// - `Ok(Some((logical_port, payload)))`: a frame was decoded
    /// - `Ok(None)`: need more bytes (WouldBlock)
    /// - `Err(_)`: I/O or protocol error; the connection should be reset
    pub fn decode<R: Read + ?Sized>(
        &mut self,
        reader: &mut R,
    ) -> io::Result<Option<(u16, Vec<u8>)>> {
        loop {
            match &mut self.state {
                ReadState::Header { read } => {
                    match reader.read(&mut self.buf[*read..RTCP_HEADER_SIZE]) {
                        Ok(0) => {
                            return Err(io::Error::new(
                                io::ErrorKind::UnexpectedEof,
                                "connection closed",
                            ));
                        }
                        Ok(n) => {
                            *read += n;
                            if *read < RTCP_HEADER_SIZE {
                                continue;
                            }
                            let bytes: [u8; RTCP_HEADER_SIZE] =
                                self.buf[..RTCP_HEADER_SIZE].try_into().unwrap_or_default();
                            let header = FrameHeader::decode(&bytes)?;
                            if header.length as usize > self.max_size {
                                return Err(io::Error::new(
                                    io::ErrorKind::InvalidData,
                                    format!("frame of {} bytes exceeds limit", header.length),
                                ));
                            }
                            let body_len = header.length as usize - RTCP_HEADER_SIZE;
                            self.buf.resize(body_len, 0);
                            self.state = ReadState::Body { header, read: 0 };
                        }
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(e) => return Err(e),
                    }
                }
                ReadState::Body { header, read } => {
                    let body_len = self.buf.len();
                    if *read < body_len {
                        match reader.read(&mut self.buf[*read..]) {
                            Ok(0) => {
                                return Err(io::Error::new(
                                    io::ErrorKind::UnexpectedEof,
                                    "connection closed mid-frame",
                                ));
                            }
                            Ok(n) => {
                                *read += n;
                                if *read < body_len {
                                    continue;
                                }
                            }
                            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                            Err(e) => return Err(e),
                        }
                    }

                    let header = *header;
                    let payload = std::mem::take(&mut self.buf);
                    self.reset();

                    if self.check_crc && header.crc != 0 && compute_crc(&payload) != header.crc {
                        return Err(io::Error::new(io::ErrorKind::InvalidData, "RTCP CRC mismatch"));
                    }
                    return Ok(Some((header.logical_port, payload)));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_frame_round_trip() {
        let frame = encode_frame(7411, b"RTPS-payload", true);
        assert_eq!(&frame[0..4], b"RTCP");
        assert_eq!(frame.len(), RTCP_HEADER_SIZE + 12);

        let mut decoder = FrameDecoder::new(1024, true);
        let mut cursor = Cursor::new(frame);
        let (port, payload) = decoder
            .decode(&mut cursor)
            .expect("decode")
            .expect("complete frame");
        assert_eq!(port, 7411);
        assert_eq!(payload, b"RTPS-payload");
    }

    #[test]
    fn test_length_counts_header() {
        let frame = encode_frame(1, b"abcd", false);
        let length = u32::from_le_bytes([frame[4], frame[5], frame[6], frame[7]]);
        assert_eq!(length as usize, RTCP_HEADER_SIZE + 4);
    }

    #[test]
    fn test_crc_mismatch_detected() {
        let mut frame = encode_frame(1, b"abcd", true);
        let last = frame.len() - 1;
        frame[last] ^= 0xFF;
        let mut decoder = FrameDecoder::new(1024, true);
        let mut cursor = Cursor::new(frame);
        assert!(decoder.decode(&mut cursor).is_err());
    }

    #[test]
    fn test_zero_crc_passes_when_not_calculated() {
        let frame = encode_frame(1, b"abcd", false);
        let mut decoder = FrameDecoder::new(1024, true);
        let mut cursor = Cursor::new(frame);
        assert!(decoder.decode(&mut cursor).expect("decode").is_some());
    }

    /// Reader that yields its bytes then reports WouldBlock, like a
    /// drained non-blocking socket.
    struct NonBlockingChunk(Vec<u8>, usize);

    impl Read for NonBlockingChunk {
        fn read(&mut self, out: &mut [u8]) -> std::io::Result<usize> {
            if self.1 >= self.0.len() {
                return Err(std::io::Error::new(std::io::ErrorKind::WouldBlock, "drained"));
            }
            let n = out.len().min(self.0.len() - self.1);
            out[..n].copy_from_slice(&self.0[self.1..self.1 + n]);
            self.1 += n;
            Ok(n)
        }
    }

    #[test]
    fn test_partial_reads() {
        let frame = encode_frame(9, b"split-into-pieces", true);
        let mut decoder = FrameDecoder::new(1024, true);

        // Feed the frame in two halves; the reader blocks after each half.
        let (a, b) = frame.split_at(10);
        let mut half = NonBlockingChunk(a.to_vec(), 0);
        assert!(decoder.decode(&mut half).expect("first half").is_none());
        let mut rest = NonBlockingChunk(b.to_vec(), 0);
        let (port, payload) = decoder
            .decode(&mut rest)
            .expect("second half")
            .expect("complete");
        assert_eq!(port, 9);
        assert_eq!(payload, b"split-into-pieces");
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut frame = encode_frame(1, b"abcd", false);
        frame[0] = b'X';
        let mut decoder = FrameDecoder::new(1024, false);
        let mut cursor = Cursor::new(frame);
        assert!(decoder.decode(&mut cursor).is_err());
    }
}
