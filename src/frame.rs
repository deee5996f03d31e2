//! Frame layer: split/join the `[length: u24][sequence: u8][payload]` frames
//! that wrap every MySQL protocol message, per SPEC_FULL.md §4.2.
//!
//! Grounded in `zero-mysql`'s `protocol/packet.rs` (`PacketHeader`,
//! `write_packet_header`) and the read/write loops in `tokio/conn.rs`,
//! reshaped into a pure sans-I/O `FrameReader`/`FrameWriter` pair: this
//! module never touches a socket, it only knows how to find frame
//! boundaries in bytes the engine has already read, and how to lay
//! outbound bytes out into frames.

use crate::error::{Error, Result};

pub const MAX_FRAME_PAYLOAD_LEN: usize = 0xff_ffff;

/// Reassembles frames into one logical message, tracking the expected
/// sequence number across a single command's lifetime.
#[derive(Debug, Default)]
pub struct FrameReader {
    next_seqnum: u8,
}

pub enum ReadOutcome {
    /// Not enough bytes buffered yet; caller should read more and retry.
    NeedMoreData,
    /// A full logical message is available; `consumed` is how many bytes of
    /// `buf` it occupied, including all frame headers.
    Message { len: usize, consumed: usize },
}

impl FrameReader {
    /// Resets the sequence counter. Called at the start of every new
    /// top-level command, per spec §4.2 ("resets to 0 when a new command is
    /// initiated").
    pub fn reset_sequence(&mut self) {
        self.next_seqnum = 0;
    }

    pub fn next_seqnum(&self) -> u8 {
        self.next_seqnum
    }

    /// Synchronizes the expected sequence number to continue from wherever
    /// the other direction (a write, for the single shared per-command
    /// counter spec §4.2 describes) left off.
    pub fn set_next_seqnum(&mut self, seqnum: u8) {
        self.next_seqnum = seqnum;
    }

    /// Scans `buf` for a complete logical message made of one or more
    /// frames, validating the sequence number of each. On success, the
    /// reassembled payload is appended to `out` (which is not cleared
    /// first, so callers that want a fresh payload must clear `out`
    /// themselves) and `Message` is returned with the number of leading
    /// bytes of `buf` that made up the message.
    pub fn try_read_message(&mut self, buf: &[u8], out: &mut Vec<u8>) -> Result<ReadOutcome> {
        let mut offset = 0;
        let start_len = out.len();
        loop {
            if buf.len() - offset < 4 {
                out.truncate(start_len);
                return Ok(ReadOutcome::NeedMoreData);
            }
            let length = u32::from_le_bytes([buf[offset], buf[offset + 1], buf[offset + 2], 0]) as usize;
            let seqnum = buf[offset + 3];
            if seqnum != self.next_seqnum {
                return Err(Error::SequenceNumberMismatch {
                    expected: self.next_seqnum,
                    actual: seqnum,
                });
            }
            if buf.len() - offset - 4 < length {
                out.truncate(start_len);
                return Ok(ReadOutcome::NeedMoreData);
            }
            out.extend_from_slice(&buf[offset + 4..offset + 4 + length]);
            self.next_seqnum = self.next_seqnum.wrapping_add(1);
            offset += 4 + length;
            if length < MAX_FRAME_PAYLOAD_LEN {
                return Ok(ReadOutcome::Message {
                    len: out.len() - start_len,
                    consumed: offset,
                });
            }
            // length == MAX_FRAME_PAYLOAD_LEN: more frames follow, possibly
            // an empty trailing one if the message is an exact multiple.
        }
    }
}

/// Chunks a payload into on-wire frames.
#[derive(Debug, Default)]
pub struct FrameWriter {
    next_seqnum: u8,
}

impl FrameWriter {
    pub fn reset_sequence(&mut self) {
        self.next_seqnum = 0;
    }

    pub fn next_seqnum(&self) -> u8 {
        self.next_seqnum
    }

    pub fn set_next_seqnum(&mut self, seqnum: u8) {
        self.next_seqnum = seqnum;
    }

    /// Appends `payload` to `out` as one or more frames, advancing and
    /// returning the next sequence number to use.
    pub fn write_message(&mut self, out: &mut Vec<u8>, mut payload: &[u8]) -> u8 {
        loop {
            let chunk_len = payload.len().min(MAX_FRAME_PAYLOAD_LEN);
            let (chunk, rest) = payload.split_at(chunk_len);
            out.extend_from_slice(&(chunk_len as u32).to_le_bytes()[..3]);
            out.push(self.next_seqnum);
            out.extend_from_slice(chunk);
            self.next_seqnum = self.next_seqnum.wrapping_add(1);
            payload = rest;
            if chunk_len < MAX_FRAME_PAYLOAD_LEN {
                break;
            }
            if payload.is_empty() {
                // exact multiple of MAX_FRAME_PAYLOAD_LEN: emit the empty
                // trailing frame required by spec §4.2, then stop.
                out.extend_from_slice(&[0, 0, 0, self.next_seqnum]);
                self.next_seqnum = self.next_seqnum.wrapping_add(1);
                break;
            }
        }
        self.next_seqnum
    }
}
