//! Sans-I/O algorithm objects, per spec §4.6–§4.8/§9.
//!
//! Grounded in `zero-mysql`'s `protocol/command/{query,prepared}.rs`
//! (`Query`/`Exec` state machines driven by a `step(buffer_set) -> Action`
//! method, called from the read/write loop in `tokio/conn.rs`), generalized
//! into a trait so [`crate::engine::Engine`] can drive any of them the same
//! way: an algorithm never touches a socket, it only inspects a complete
//! incoming message and produces an outgoing one, exactly spec §9's "value
//! types that expose only `resume(error, bytes) -> next_action`" design
//! note (here split into `start`/`on_message` rather than one `resume`,
//! since Rust's trait object output type makes a single entry point with a
//! uniform signature awkward — see DESIGN.md).
//!
//! Whatever bytes an algorithm appends to the `out` buffer passed to
//! `start`/`on_message`/`after_ssl` are flushed by the engine regardless of
//! which [`Progress`] variant comes back — a fire-and-forget command like
//! COM_STMT_CLOSE writes its payload and returns `Done` in the same call.

pub mod close_statement;
pub mod connect;
pub mod execute;
pub mod ping;
pub mod prepare;
pub mod query;
pub mod quit;
pub mod reset;
pub(crate) mod resultset;
pub mod set_character_set;

pub use resultset::QueryResult;

use crate::error::Result;

/// What the engine must do next to keep driving an algorithm, once any
/// bytes already written to `out` have been flushed.
pub enum Progress<O> {
    /// Read (and frame-reassemble) one more logical message and call
    /// [`Algorithm::on_message`] with it.
    NeedMessage,
    /// Upgrade the transport to TLS, then call [`Algorithm::after_ssl`]
    /// instead of `on_message` (handshake only).
    NeedSsl,
    /// Finished; the algorithm's result is attached.
    Done(O),
}

/// A sans-I/O protocol algorithm: given an empty `out` buffer, produces
/// zero or more outgoing messages and consumes zero or more incoming ones,
/// never touching the transport directly.
pub trait Algorithm {
    type Output;

    /// Kicks the algorithm off, giving it a chance to write the first
    /// outgoing message (or request one straight away, for algorithms that
    /// start by reading, like an unsolicited server push).
    fn start(&mut self, out: &mut Vec<u8>) -> Result<Progress<Self::Output>>;

    /// Feeds one complete incoming message to the algorithm.
    fn on_message(&mut self, message: &[u8], out: &mut Vec<u8>) -> Result<Progress<Self::Output>>;

    /// Called instead of `on_message` after the engine completes a TLS
    /// upgrade requested via [`Progress::NeedSsl`]. Only the connect
    /// algorithm currently returns `NeedSsl`, so the default errors out.
    fn after_ssl(&mut self, _out: &mut Vec<u8>) -> Result<Progress<Self::Output>> {
        Err(crate::error::Error::LibraryBug(crate::error::eyre!(
            "after_ssl called on an algorithm that never requested a TLS upgrade"
        )))
    }
}
