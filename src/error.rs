//! Error kinds for the protocol engine, algorithms, and pool.
//!
//! Mirrors `zero-mysql`'s `error.rs` shape (a `thiserror`-derived enum with a
//! `color-eyre`-backed catch-all for invariant violations) but enumerates the
//! full kind table of spec §7 instead of the teacher's ad-hoc set.

use thiserror::Error;

pub use color_eyre::eyre::eyre;

pub type Result<T> = core::result::Result<T, Error>;

/// A MySQL server-issued error, carrying the structured diagnostics the
/// wire protocol provides (error code, SQL state, message).
#[derive(Debug, Clone, Error)]
#[error("ERROR {} ({}): {}", self.error_code, self.sql_state, self.message)]
pub struct ServerError {
    pub error_code: u16,
    pub sql_state: String,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum Error {
    /// More bytes expected before a packet is complete.
    #[error("incomplete message, more bytes required")]
    IncompleteMessage,

    /// Packet had trailing unread bytes after successful parse.
    #[error("packet had {0} unread trailing bytes")]
    ExtraBytes(usize),

    /// Frame sequence number broken.
    #[error("sequence number mismatch: expected {expected}, got {actual}")]
    SequenceNumberMismatch { expected: u8, actual: u8 },

    /// Protocol version or required capability missing.
    #[error("server unsupported: {0}")]
    ServerUnsupported(String),

    /// Malformed length encoding, invalid value, or unknown column type.
    #[error("protocol value error: {0}")]
    ProtocolValueError(String),

    /// Server requested an unsupported authentication plugin.
    #[error("unknown authentication plugin: {0}")]
    UnknownAuthPlugin(String),

    /// caching_sha2_password full auth requested over an insecure transport.
    #[error("caching_sha2_password full authentication requires a secure transport")]
    AuthPluginRequiresSsl,

    /// Execute-time parameter count did not match the prepared statement.
    #[error("wrong number of parameters: statement expects {expected}, got {actual}")]
    WrongNumParams { expected: usize, actual: usize },

    /// Attempted to read rows from a statement that returned none.
    #[error("statement produced no result set to read rows from")]
    StatementWithoutResults,

    /// A new top-level command was issued while the connection was still
    /// engaged in an incremental `start_execution`/`read_some_rows` read.
    #[error("connection is engaged in a multi-function row read; drain it before issuing another command")]
    ConnectionBusy,

    /// `read_some_rows` called without a preceding `start_execution`.
    #[error("read_some_rows called without a prior start_execution")]
    NotExecuting,

    /// An operation was attempted on a connection a prior fatal error
    /// already left in an undefined protocol state.
    #[error("connection is closed after a prior fatal error")]
    ConnectionClosed,

    /// Character set unknown to the client.
    #[error("unknown character set: {0}")]
    UnknownCharacterSet(String),

    /// Operation was cancelled by the caller.
    #[error("operation cancelled")]
    Cancelled,

    /// Operation exceeded its configured timeout. For a pool borrow
    /// timeout, carries the most recent underlying connect error observed
    /// by any of the pool's background connect attempts, if any, per
    /// spec §4.9's borrow-protocol diagnostics requirement.
    #[error("operation timed out")]
    Timeout(Option<String>),

    /// Error reported by the server.
    #[error(transparent)]
    Server(#[from] ServerError),

    /// I/O failure surfaced by the transport adapter.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Bad connection/pool configuration.
    #[error("bad config: {0}")]
    BadConfig(String),

    /// An invariant that should never be violated was violated.
    #[error("internal bug: {0}")]
    LibraryBug(color_eyre::Report),
}

impl Error {
    /// Classifies whether this error leaves the connection in an undefined
    /// protocol/transport state (fatal — requires reopening) or whether the
    /// connection remains usable (non-fatal — return to idle / retry is
    /// safe). See SPEC_FULL.md §7.1.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::WrongNumParams { .. }
            | Error::StatementWithoutResults
            | Error::UnknownCharacterSet(_)
            | Error::ConnectionBusy
            | Error::NotExecuting
            | Error::ConnectionClosed
            | Error::Server(_) => false,
            Error::IncompleteMessage
            | Error::ExtraBytes(_)
            | Error::SequenceNumberMismatch { .. }
            | Error::ServerUnsupported(_)
            | Error::ProtocolValueError(_)
            | Error::UnknownAuthPlugin(_)
            | Error::AuthPluginRequiresSsl
            | Error::Cancelled
            | Error::Timeout(_)
            | Error::Io(_)
            | Error::BadConfig(_)
            | Error::LibraryBug(_) => true,
        }
    }
}

impl From<core::convert::Infallible> for Error {
    fn from(err: core::convert::Infallible) -> Self {
        match err {}
    }
}

impl<Src, Dst: ?Sized> From<zerocopy::CastError<Src, Dst>> for Error {
    fn from(err: zerocopy::CastError<Src, Dst>) -> Self {
        Self::LibraryBug(eyre!("{:?}", err))
    }
}
