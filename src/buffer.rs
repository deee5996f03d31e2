//! Reusable buffers shared by a connection's algorithms and its engine.
//!
//! Grounded in `zero-mysql`'s `src/buffer.rs` (`BufferSet`), generalized so
//! the read buffer can grow to hold a reassembled multi-frame message
//! without being re-allocated on every command, per SPEC_FULL.md §5's
//! "read and write buffers are connection-private and reused across
//! operations; their capacity grows monotonically, clamped to `0x40000000`".

/// Buffers grow but are never shrunk below this; capacity above it is
/// reclaimed is never forced, but never allowed to cross the clamp below.
const MAX_BUFFER_CAPACITY: usize = 0x4000_0000;

#[derive(Debug, Default)]
pub struct BufferSet {
    /// Raw bytes read from the transport, not yet split into frames.
    pub recv_buffer: Vec<u8>,
    /// The payload of the logical message currently being parsed, assembled
    /// across one or more frames by the frame reader.
    pub message_buffer: Vec<u8>,
    /// Outbound bytes, framed and ready for the transport to write.
    pub send_buffer: Vec<u8>,
}

impl BufferSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `additional` bytes of spare capacity on `recv_buffer`,
    /// clamping growth at [`MAX_BUFFER_CAPACITY`].
    pub fn reserve_recv(&mut self, additional: usize) {
        reserve_clamped(&mut self.recv_buffer, additional);
    }
}

fn reserve_clamped(buf: &mut Vec<u8>, additional: usize) {
    let wanted = buf.len().saturating_add(additional);
    if wanted > MAX_BUFFER_CAPACITY {
        buf.reserve(MAX_BUFFER_CAPACITY.saturating_sub(buf.len()));
    } else {
        buf.reserve(additional);
    }
}
