//! The transport adapter trait and the engine that drives a sans-I/O
//! [`Algorithm`] to completion over it, per spec §6/§9.
//!
//! Grounded in `zero-mysql`'s `tokio/conn.rs` (the read/write loop that
//! drives `Query`/`Exec`'s `step()` over a live `TcpStream`), generalized
//! behind a [`Transport`] trait so the engine itself never names `tokio`
//! directly — the concrete adapter lives in `crate::tokio`.

use std::future::Future;

use crate::algorithm::{Algorithm, Progress};
use crate::buffer::BufferSet;
use crate::error::{Error, Result};
use crate::frame::{FrameReader, FrameWriter, ReadOutcome};

/// Everything an engine needs from a byte transport: partial reads,
/// complete writes, and (for connections that negotiate it) an in-place
/// upgrade to TLS, per spec §6's transport abstraction.
///
/// Methods are spelled as `-> impl Future<...> + Send` rather than plain
/// `async fn` so that code generic over `T: Transport` (the connection
/// pool's per-node background tasks, spawned via `tokio::spawn`) can prove
/// the futures it awaits are themselves `Send` — a plain `async fn` in a
/// trait doesn't carry that bound, which would otherwise infect every
/// generic caller. Implementors still just write ordinary `async fn`s;
/// the bound is satisfied automatically as long as the body only awaits
/// `Send` futures.
pub trait Transport {
    fn read_some(&mut self, buf: &mut [u8]) -> impl Future<Output = std::io::Result<usize>> + Send;

    fn write_all(&mut self, buf: &[u8]) -> impl Future<Output = std::io::Result<()>> + Send;

    /// Upgrades the transport to TLS in place. The default implementation
    /// fails; only transports built with TLS support override it.
    fn ssl_handshake(&mut self) -> impl Future<Output = Result<()>> + Send {
        async { Err(Error::ServerUnsupported("this transport does not support TLS".into())) }
    }

    /// Best-effort TLS close_notify, sent before a plain-TCP close. Default
    /// is a no-op for transports that never upgraded.
    fn ssl_shutdown(&mut self) -> impl Future<Output = Result<()>> + Send {
        async { Ok(()) }
    }
}

const READ_CHUNK: usize = 8 * 1024;

/// Owns a transport and the buffers/frame counters needed to run one
/// [`Algorithm`] at a time over it. One `Engine` backs one logical
/// connection.
pub struct Engine<T> {
    transport: T,
    buffers: BufferSet,
    frame_reader: FrameReader,
    frame_writer: FrameWriter,
}

impl<T: Transport> Engine<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            buffers: BufferSet::new(),
            frame_reader: FrameReader::default(),
            frame_writer: FrameWriter::default(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Drives `algorithm` to completion: frames and writes whatever bytes it
    /// produces, reads and reassembles whatever messages it asks for, and
    /// performs a TLS upgrade if requested. A fresh top-level command always
    /// starts its own sequence-number run, per spec §4.2.
    ///
    /// The reader and writer each track their own counter (so each can be
    /// unit-tested in isolation, see `frame.rs`), but the wire protocol has
    /// only one sequence number per command, alternating between whichever
    /// side sends next — a handshake's greeting (seq 0, from the server),
    /// login (seq 1, from the client), and OK (seq 2, from the server) all
    /// share the same count. So before every flush the writer is synced to
    /// continue from the reader's count, and after every flush the reader
    /// is synced back from the writer's, keeping both equal to that one
    /// logical counter at every suspension point.
    #[tracing::instrument(skip_all)]
    pub async fn run<A: Algorithm>(&mut self, algorithm: &mut A) -> Result<A::Output> {
        self.frame_reader.reset_sequence();
        self.frame_writer.reset_sequence();

        let mut out = Vec::new();
        let mut progress = algorithm.start(&mut out)?;
        loop {
            self.frame_writer.set_next_seqnum(self.frame_reader.next_seqnum());
            self.flush(&mut out).await?;
            self.frame_reader.set_next_seqnum(self.frame_writer.next_seqnum());
            match progress {
                Progress::Done(output) => return Ok(output),
                Progress::NeedMessage => {
                    self.read_message().await?;
                    progress = algorithm.on_message(&self.buffers.message_buffer, &mut out)?;
                }
                Progress::NeedSsl => {
                    self.transport.ssl_handshake().await?;
                    progress = algorithm.after_ssl(&mut out)?;
                }
            }
        }
    }

    async fn flush(&mut self, out: &mut Vec<u8>) -> Result<()> {
        if out.is_empty() {
            return Ok(());
        }
        self.buffers.send_buffer.clear();
        self.frame_writer.write_message(&mut self.buffers.send_buffer, out);
        self.transport.write_all(&self.buffers.send_buffer).await?;
        out.clear();
        Ok(())
    }

    async fn read_message(&mut self) -> Result<()> {
        self.buffers.message_buffer.clear();
        loop {
            match self
                .frame_reader
                .try_read_message(&self.buffers.recv_buffer, &mut self.buffers.message_buffer)?
            {
                ReadOutcome::Message { consumed, .. } => {
                    self.buffers.recv_buffer.drain(..consumed);
                    return Ok(());
                }
                ReadOutcome::NeedMoreData => self.fill_recv_buffer().await?,
            }
        }
    }

    async fn fill_recv_buffer(&mut self) -> Result<()> {
        let start = self.buffers.recv_buffer.len();
        self.buffers.reserve_recv(READ_CHUNK);
        self.buffers.recv_buffer.resize(start + READ_CHUNK, 0);
        let n = self.transport.read_some(&mut self.buffers.recv_buffer[start..]).await?;
        self.buffers.recv_buffer.truncate(start + n);
        if n == 0 {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "server closed the connection",
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::ping::PingAlgorithm;
    use std::collections::VecDeque;

    /// An in-memory transport fed from a queue of pre-framed server
    /// responses, used to drive an algorithm end to end without a socket.
    struct ScriptedTransport {
        inbound: VecDeque<u8>,
        outbound: Vec<u8>,
    }

    impl ScriptedTransport {
        fn new(inbound: Vec<u8>) -> Self {
            Self {
                inbound: inbound.into(),
                outbound: Vec::new(),
            }
        }
    }

    impl Transport for ScriptedTransport {
        async fn read_some(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = buf.len().min(self.inbound.len());
            for slot in buf.iter_mut().take(n) {
                *slot = self.inbound.pop_front().unwrap();
            }
            Ok(n)
        }

        async fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
            self.outbound.extend_from_slice(buf);
            Ok(())
        }
    }

    /// A COM_PING's OK reply lands at sequence 1: the client's command
    /// itself used up sequence 0.
    fn framed_ok() -> Vec<u8> {
        let mut payload = vec![0x00, 0, 0];
        payload.extend_from_slice(&2u16.to_le_bytes());
        payload.extend_from_slice(&0u16.to_le_bytes());
        let mut wire = Vec::new();
        wire.extend_from_slice(&(payload.len() as u32).to_le_bytes()[..3]);
        wire.push(1);
        wire.extend_from_slice(&payload);
        wire
    }

    #[tokio::test]
    async fn drives_ping_algorithm_over_a_scripted_transport() {
        let mut engine = Engine::new(ScriptedTransport::new(framed_ok()));
        let mut algo = PingAlgorithm;
        engine.run(&mut algo).await.unwrap();
        assert_eq!(engine.transport().outbound[4], crate::constant::CommandByte::Ping as u8);
    }
}
