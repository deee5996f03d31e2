//! Sans-I/O MySQL/MariaDB wire protocol engine, connection lifecycle, and
//! connection pool, per spec.md/SPEC_FULL.md.
//!
//! `algorithm`/`engine` implement the sans-I/O split described in §9: an
//! [`algorithm::Algorithm`] only inspects/produces bytes, and
//! [`engine::Engine`] is the only thing that touches a [`engine::Transport`].
//! `conn` builds the public per-connection façade on top of those two, and
//! `pool` multiplexes many connections behind a single borrow API.

pub mod algorithm;
pub mod auth;
mod buffer;
pub mod codec;
pub mod conn;
pub mod constant;
pub mod engine;
pub mod error;
pub mod escape;
mod frame;
mod opts;
mod prepared;
pub mod protocol;
pub mod value;

#[cfg(feature = "tokio")]
pub mod pool;
#[cfg(feature = "tokio")]
pub mod tokio;

pub use buffer::BufferSet;
pub use conn::Conn;
pub use opts::{Address, ConnectOpts, PoolConfig, SslMode, DEFAULT_COLLATION_ID};
pub use prepared::PreparedStatement;
pub use value::Value;
