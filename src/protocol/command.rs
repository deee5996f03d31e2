//! Command packets: COM_QUERY, COM_STMT_{PREPARE,EXECUTE,CLOSE}, COM_PING,
//! COM_RESET_CONNECTION, COM_QUIT, per spec §4.3/§4.7/§4.8.
//!
//! Grounded in `zero-mysql`'s `protocol/command/{query,prepared,utility}.rs`
//! (`write_query`, `write_prepare`, `write_execute`, `write_close_statement`)
//! generalized to serialize the owned [`crate::value::Value`] parameter
//! list directly instead of going through the teacher's `Params` trait.

use crate::codec::{self, Cursor};
use crate::constant::{ColumnType, CommandByte};
use crate::error::{Error, Result};
use crate::value::Value;

pub fn write_query(out: &mut Vec<u8>, sql: &str) {
    codec::write_int_1(out, CommandByte::Query as u8);
    out.extend_from_slice(sql.as_bytes());
}

pub fn write_ping(out: &mut Vec<u8>) {
    codec::write_int_1(out, CommandByte::Ping as u8);
}

pub fn write_reset_connection(out: &mut Vec<u8>) {
    codec::write_int_1(out, CommandByte::ResetConnection as u8);
}

pub fn write_quit(out: &mut Vec<u8>) {
    codec::write_int_1(out, CommandByte::Quit as u8);
}

pub fn write_prepare(out: &mut Vec<u8>, sql: &str) {
    codec::write_int_1(out, CommandByte::StmtPrepare as u8);
    out.extend_from_slice(sql.as_bytes());
}

/// The header of a COM_STMT_PREPARE response: statement id, column count,
/// parameter count, warning count. 12 bytes after the leading `0x00`.
#[derive(Debug, Clone, Copy)]
pub struct PrepareOkHeader {
    pub statement_id: u32,
    pub num_columns: u16,
    pub num_params: u16,
    pub warning_count: u16,
}

pub fn read_prepare_ok_header(payload: &[u8]) -> Result<PrepareOkHeader> {
    let mut cursor = Cursor::new(payload);
    let header = cursor.read_int_1()?;
    if header != 0x00 {
        return Err(Error::ProtocolValueError(format!(
            "COM_STMT_PREPARE response must start with 0x00, got 0x{header:02x}"
        )));
    }
    let statement_id = cursor.read_int_4()?;
    let num_columns = cursor.read_int_2()?;
    let num_params = cursor.read_int_2()?;
    let _reserved = cursor.read_int_1()?;
    let warning_count = cursor.read_int_2()?;
    Ok(PrepareOkHeader {
        statement_id,
        num_columns,
        num_params,
        warning_count,
    })
}

pub fn write_close_statement(out: &mut Vec<u8>, statement_id: u32) {
    codec::write_int_1(out, CommandByte::StmtClose as u8);
    codec::write_int_4(out, statement_id);
}

/// Writes a COM_STMT_EXECUTE command with the parameter null-bitmap,
/// new-params-bound flag, per-parameter type bytes, and binary-encoded
/// values, per spec §4.8.
pub fn write_execute(out: &mut Vec<u8>, statement_id: u32, params: &[Value]) {
    codec::write_int_1(out, CommandByte::StmtExecute as u8);
    codec::write_int_4(out, statement_id);
    codec::write_int_1(out, 0x00); // CURSOR_TYPE_NO_CURSOR
    codec::write_int_4(out, 1); // iteration count

    if params.is_empty() {
        return;
    }

    codec::write_null_bitmap(out, params.len(), 0, |i| params[i].is_null());
    codec::write_int_1(out, 0x01); // new-params-bound-flag
    for param in params {
        let (column_type, unsigned) = binary_type_for_value(param);
        codec::write_int_1(out, column_type as u8);
        codec::write_int_1(out, if unsigned { 0x80 } else { 0x00 });
    }
    for param in params {
        write_binary_value(out, param);
    }
}

fn binary_type_for_value(value: &Value) -> (ColumnType, bool) {
    match value {
        Value::Null => (ColumnType::MYSQL_TYPE_NULL, false),
        Value::Int64(_) => (ColumnType::MYSQL_TYPE_LONGLONG, false),
        Value::UInt64(_) => (ColumnType::MYSQL_TYPE_LONGLONG, true),
        Value::Float32(_) => (ColumnType::MYSQL_TYPE_FLOAT, false),
        Value::Float64(_) => (ColumnType::MYSQL_TYPE_DOUBLE, false),
        Value::Bytes(_) => (ColumnType::MYSQL_TYPE_VAR_STRING, false),
        Value::Date(_) => (ColumnType::MYSQL_TYPE_DATE, false),
        Value::DateTime(_) => (ColumnType::MYSQL_TYPE_DATETIME, false),
        Value::Time(_) => (ColumnType::MYSQL_TYPE_TIME, false),
    }
}

fn write_binary_value(out: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Null => {}
        Value::Int64(v) => codec::write_int_8(out, *v as u64),
        Value::UInt64(v) => codec::write_int_8(out, *v),
        Value::Float32(v) => out.extend_from_slice(&v.to_bits().to_le_bytes()),
        Value::Float64(v) => out.extend_from_slice(&v.to_bits().to_le_bytes()),
        Value::Bytes(bytes) => codec::write_bytes_lenenc(out, bytes),
        Value::Date(d) => {
            if d.year == 0 && d.month == 0 && d.day == 0 {
                codec::write_int_1(out, 0);
            } else {
                codec::write_int_1(out, 4);
                codec::write_int_2(out, d.year);
                codec::write_int_1(out, d.month);
                codec::write_int_1(out, d.day);
            }
        }
        Value::DateTime(dt) => {
            if dt.microsecond != 0 {
                codec::write_int_1(out, 11);
                codec::write_int_2(out, dt.year);
                codec::write_int_1(out, dt.month);
                codec::write_int_1(out, dt.day);
                codec::write_int_1(out, dt.hour);
                codec::write_int_1(out, dt.minute);
                codec::write_int_1(out, dt.second);
                codec::write_int_4(out, dt.microsecond);
            } else if dt.hour != 0 || dt.minute != 0 || dt.second != 0 {
                codec::write_int_1(out, 7);
                codec::write_int_2(out, dt.year);
                codec::write_int_1(out, dt.month);
                codec::write_int_1(out, dt.day);
                codec::write_int_1(out, dt.hour);
                codec::write_int_1(out, dt.minute);
                codec::write_int_1(out, dt.second);
            } else if dt.year != 0 || dt.month != 0 || dt.day != 0 {
                codec::write_int_1(out, 4);
                codec::write_int_2(out, dt.year);
                codec::write_int_1(out, dt.month);
                codec::write_int_1(out, dt.day);
            } else {
                codec::write_int_1(out, 0);
            }
        }
        Value::Time(t) => {
            if t.microsecond != 0 {
                codec::write_int_1(out, 12);
                codec::write_int_1(out, t.is_negative as u8);
                codec::write_int_4(out, t.days);
                codec::write_int_1(out, t.hour);
                codec::write_int_1(out, t.minute);
                codec::write_int_1(out, t.second);
                codec::write_int_4(out, t.microsecond);
            } else if t.days != 0 || t.hour != 0 || t.minute != 0 || t.second != 0 {
                codec::write_int_1(out, 8);
                codec::write_int_1(out, t.is_negative as u8);
                codec::write_int_4(out, t.days);
                codec::write_int_1(out, t.hour);
                codec::write_int_1(out, t.minute);
                codec::write_int_1(out, t.second);
            } else {
                codec::write_int_1(out, 0);
            }
        }
    }
}

/// `SET NAMES <charset>`, sent as a text command for the set-character-set
/// algorithm (spec §4.7's command pipeline entry of the same name).
pub fn write_set_names(out: &mut Vec<u8>, charset_name: &str) {
    let sql = format!("SET NAMES {charset_name}");
    write_query(out, &sql);
}
