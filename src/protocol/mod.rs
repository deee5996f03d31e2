//! Message (de)serializers for every packet the core needs, per
//! SPEC_FULL.md §4.3/§4.4. Grounded in `zero-mysql`'s `handler.rs`
//! (handshake/auth), `protocol/response.rs` (OK/ERR/EOF), `col.rs`
//! (column definition), and `protocol/command/{query,prepared,resultset}.rs`
//! (row payloads), reshaped around the shared [`crate::codec::Cursor`].

pub mod column;
pub mod command;
pub mod handshake;
pub mod response;
pub mod row;

pub use column::ColumnDefinition;
pub use response::{ErrPacket, OkPacket};
pub use row::Row;
