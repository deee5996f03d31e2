//! Row (de)serialization for both row encodings, per spec §4.3/§4.4.
//!
//! Grounded in `zero-mysql`'s `protocol/command/resultset.rs`
//! (`read_binary_row`) and `row.rs`/`ref_row.rs` for the text-row shape,
//! reshaped to produce the owned [`crate::value::Value`] sequence directly
//! (spec §3's Row invariant: "every emitted row's arity equals the column
//! count of its originating resultset").

use crate::codec::{Cursor, NullBitmap};
use crate::error::{Error, Result};
use crate::protocol::ColumnDefinition;
use crate::value::Value;

pub type Row = Vec<Value>;

/// Deserializes one text-protocol row. Each field is a length-encoded
/// string, or the single byte `0xfb` meaning NULL.
pub fn parse_text_row(payload: &[u8], columns: &[ColumnDefinition]) -> Result<Row> {
    let mut cursor = Cursor::new(payload);
    let mut row = Vec::with_capacity(columns.len());
    for column in columns {
        if cursor.remaining().first() == Some(&0xfb) {
            let _ = cursor.read_int_1()?;
            row.push(Value::Null);
            continue;
        }
        let field = cursor.read_string_lenenc()?;
        row.push(Value::parse_text(column.column_type, column.flags, field)?);
    }
    cursor.finish()?;
    Ok(row)
}

/// Deserializes one binary-protocol row: a leading `0x00`, a null-bitmap
/// with offset 2, then each non-null field in the column's binary form.
pub fn parse_binary_row(payload: &[u8], columns: &[ColumnDefinition]) -> Result<Row> {
    let mut cursor = Cursor::new(payload);
    let header = cursor.read_int_1()?;
    if header != 0x00 {
        return Err(Error::ProtocolValueError(format!("binary row header must be 0x00, got 0x{header:02x}")));
    }
    let bitmap_len = NullBitmap::byte_count(columns.len(), 2);
    let bitmap_bytes = cursor.read_string_fix(bitmap_len)?;
    let bitmap = NullBitmap::new(bitmap_bytes, 2);

    let mut row = Vec::with_capacity(columns.len());
    for (i, column) in columns.iter().enumerate() {
        if bitmap.is_null(i) {
            row.push(Value::Null);
        } else {
            row.push(Value::parse_binary(column.column_type, column.flags, &mut cursor)?);
        }
    }
    cursor.finish()?;
    Ok(row)
}
