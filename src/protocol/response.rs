//! OK, ERR and EOF packets, per spec §4.3.
//!
//! Grounded in `zero-mysql`'s `protocol/response.rs` (`OkPayload`,
//! `ErrPayload`, `read_eof_packet`), extended with the `info` string
//! surfaced by SPEC_FULL.md's "SHOW WARNINGS-style diagnostics" supplement.

use crate::codec::Cursor;
use crate::constant::ServerStatusFlags;
use crate::error::{Error, Result, ServerError};

/// An OK packet (header byte `0x00`, or `0xfe` when it terminates a
/// deprecated-EOF resultset).
#[derive(Debug, Clone, Default)]
pub struct OkPacket {
    pub affected_rows: u64,
    pub last_insert_id: u64,
    pub status_flags: ServerStatusFlags,
    pub warnings: u16,
    /// Supplemental diagnostics string (spec's "SHOW WARNINGS-style
    /// diagnostics on OkPayload"), parsed permissively: absent or
    /// unparsable trailing bytes simply leave this empty.
    pub info: String,
}

impl OkPacket {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(payload);
        let header = cursor.read_int_1()?;
        if header != 0x00 && header != 0xfe {
            return Err(Error::ProtocolValueError(format!("not an OK packet: header 0x{header:02x}")));
        }
        let affected_rows = cursor.read_int_lenenc()?.unwrap_or(0);
        let last_insert_id = cursor.read_int_lenenc()?.unwrap_or(0);
        let status_flags = ServerStatusFlags::from_bits_truncate(cursor.read_int_2()?);
        let warnings = cursor.read_int_2()?;
        let info = String::from_utf8_lossy(cursor.read_string_eof()).into_owned();
        Ok(Self {
            affected_rows,
            last_insert_id,
            status_flags,
            warnings,
            info,
        })
    }

    pub fn more_results_exist(&self) -> bool {
        self.status_flags.contains(ServerStatusFlags::SERVER_MORE_RESULTS_EXISTS)
    }

    pub fn out_params(&self) -> bool {
        self.status_flags.contains(crate::constant::ServerStatusFlags::SERVER_PS_OUT_PARAMS)
    }
}

/// An ERR packet (header byte `0xff`).
#[derive(Debug, Clone)]
pub struct ErrPacket {
    pub error_code: u16,
    pub sql_state: String,
    pub message: String,
}

impl ErrPacket {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(payload);
        let header = cursor.read_int_1()?;
        if header != 0xff {
            return Err(Error::ProtocolValueError(format!("not an ERR packet: header 0x{header:02x}")));
        }
        let error_code = cursor.read_int_2()?;
        let _marker = cursor.read_string_fix(1)?; // '#'
        let sql_state_bytes = cursor.read_string_fix(5)?;
        let sql_state = String::from_utf8_lossy(sql_state_bytes).into_owned();
        let message = String::from_utf8_lossy(cursor.read_string_eof()).into_owned();
        Ok(Self {
            error_code,
            sql_state,
            message,
        })
    }

    pub fn into_server_error(self) -> ServerError {
        ServerError {
            error_code: self.error_code,
            sql_state: self.sql_state,
            message: self.message,
        }
    }
}

/// An EOF packet (header byte `0xfe`, total length < 9). Superseded for
/// resultset termination when `CLIENT_DEPRECATE_EOF` is negotiated, in
/// which case an [`OkPacket`] is used instead (spec's "Deprecated-EOF"
/// glossary entry).
#[derive(Debug, Clone, Copy)]
pub struct EofPacket {
    pub warnings: u16,
    pub status_flags: ServerStatusFlags,
}

impl EofPacket {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(payload);
        let header = cursor.read_int_1()?;
        if header != 0xfe {
            return Err(Error::ProtocolValueError(format!("not an EOF packet: header 0x{header:02x}")));
        }
        let warnings = cursor.read_int_2()?;
        let status_flags = ServerStatusFlags::from_bits_truncate(cursor.read_int_2()?);
        Ok(Self { warnings, status_flags })
    }

    pub fn more_results_exist(&self) -> bool {
        self.status_flags.contains(ServerStatusFlags::SERVER_MORE_RESULTS_EXISTS)
    }
}

/// First-byte dispatch shared by every response reader in §4.3/§4.7:
/// `0xff` is always ERR (a length-encoded string can never start with it),
/// and for short packets `0xfe` is EOF/OK rather than a huge lenenc string.
pub enum GenericResponse<'a> {
    Ok(&'a [u8]),
    Err(&'a [u8]),
    EofOrOk(&'a [u8]),
    Other(&'a [u8]),
}

pub fn classify_response(payload: &[u8]) -> Result<GenericResponse<'_>> {
    match payload.first() {
        None => Err(Error::IncompleteMessage),
        Some(0xff) => Ok(GenericResponse::Err(payload)),
        Some(0x00) => Ok(GenericResponse::Ok(payload)),
        // A length-encoded string this long would make the packet itself
        // 16MiB; rule it out by payload length rather than assume.
        Some(0xfe) if payload.len() < 0xff_ffff => Ok(GenericResponse::EofOrOk(payload)),
        _ => Ok(GenericResponse::Other(payload)),
    }
}

pub fn err_to_error(payload: &[u8]) -> Error {
    match ErrPacket::parse(payload) {
        Ok(err) => Error::Server(err.into_server_error()),
        Err(e) => e,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_packet_parses_affected_rows_and_status() {
        let mut payload = vec![0x00];
        payload.push(5); // affected_rows lenenc
        payload.push(10); // last_insert_id lenenc
        payload.extend_from_slice(&2u16.to_le_bytes()); // SERVER_STATUS_AUTOCOMMIT
        payload.extend_from_slice(&0u16.to_le_bytes()); // warnings
        let ok = OkPacket::parse(&payload).unwrap();
        assert_eq!(ok.affected_rows, 5);
        assert_eq!(ok.last_insert_id, 10);
        assert!(!ok.more_results_exist());
    }

    #[test]
    fn err_packet_parses_sql_state_and_message() {
        let mut payload = vec![0xff];
        payload.extend_from_slice(&1064u16.to_le_bytes());
        payload.extend_from_slice(b"#42000");
        payload.extend_from_slice(b"syntax error");
        let err = ErrPacket::parse(&payload).unwrap();
        assert_eq!(err.error_code, 1064);
        assert_eq!(err.sql_state, "42000");
        assert_eq!(err.message, "syntax error");
    }

    #[test]
    fn eof_packet_reports_more_results() {
        let mut payload = vec![0xfe];
        payload.extend_from_slice(&0u16.to_le_bytes());
        payload.extend_from_slice(&ServerStatusFlags::SERVER_MORE_RESULTS_EXISTS.bits().to_le_bytes());
        let eof = EofPacket::parse(&payload).unwrap();
        assert!(eof.more_results_exist());
    }
}
