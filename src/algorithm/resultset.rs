//! Shared resultset-reading state machine used by both the text-query and
//! binary-execute algorithms, per spec §4.7.
//!
//! Grounded in `zero-mysql`'s `protocol/command/resultset.rs`
//! (`read_result_set_header`, `read_column_definitions`, `read_rows` loop),
//! collapsed into one state machine parameterized by row encoding so the two
//! callers don't duplicate the header/column/row dance.

use crate::codec::Cursor;
use crate::error::{Error, Result};
use crate::protocol::column::MetadataMode;
use crate::protocol::response::{EofPacket, GenericResponse, OkPacket, classify_response};
use crate::protocol::row::{self, Row};
use crate::protocol::{ColumnDefinition, ErrPacket};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowEncoding {
    Text,
    Binary,
}

/// The rows and trailing status of one resultset (or the bare OK a
/// statement without a resultset produces), per spec §3's Row/QueryResult
/// invariants.
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub columns: Vec<ColumnDefinition>,
    pub rows: Vec<Row>,
    pub ok: OkPacket,
}

enum Phase {
    AwaitingHeader,
    ReadingColumns { expected: usize },
    ReadingRows,
}

pub(crate) struct ResultsetState {
    encoding: RowEncoding,
    metadata_mode: MetadataMode,
    phase: Phase,
    result: QueryResult,
}

pub(crate) enum ResultsetStep {
    NeedMessage,
    Done(QueryResult),
}

impl ResultsetState {
    pub fn new(encoding: RowEncoding, metadata_mode: MetadataMode) -> Self {
        Self {
            encoding,
            metadata_mode,
            phase: Phase::AwaitingHeader,
            result: QueryResult::default(),
        }
    }

    pub fn on_message(&mut self, message: &[u8]) -> Result<ResultsetStep> {
        match self.phase {
            Phase::AwaitingHeader => self.on_header(message),
            Phase::ReadingColumns { expected } => self.on_column(message, expected),
            Phase::ReadingRows => self.on_row(message),
        }
    }

    fn on_header(&mut self, message: &[u8]) -> Result<ResultsetStep> {
        match classify_response(message)? {
            GenericResponse::Err(payload) => Err(Error::Server(ErrPacket::parse(payload)?.into_server_error())),
            GenericResponse::Ok(payload) | GenericResponse::EofOrOk(payload) => {
                self.result.ok = OkPacket::parse(payload)?;
                Ok(ResultsetStep::Done(std::mem::take(&mut self.result)))
            }
            GenericResponse::Other(payload) => {
                let mut cursor = Cursor::new(payload);
                let column_count = cursor
                    .read_int_lenenc()?
                    .ok_or_else(|| Error::ProtocolValueError("resultset header column count was NULL".into()))?;
                self.phase = Phase::ReadingColumns {
                    expected: column_count as usize,
                };
                Ok(ResultsetStep::NeedMessage)
            }
        }
    }

    fn on_column(&mut self, message: &[u8], expected: usize) -> Result<ResultsetStep> {
        let column = ColumnDefinition::parse(message, self.metadata_mode)?;
        self.result.columns.push(column);
        if self.result.columns.len() < expected {
            Ok(ResultsetStep::NeedMessage)
        } else {
            self.phase = Phase::ReadingRows;
            Ok(ResultsetStep::NeedMessage)
        }
    }

    fn on_row(&mut self, message: &[u8]) -> Result<ResultsetStep> {
        if is_resultset_terminator(message) {
            self.result.ok = parse_terminator(message)?;
            return Ok(ResultsetStep::Done(std::mem::take(&mut self.result)));
        }
        let row = match self.encoding {
            RowEncoding::Text => row::parse_text_row(message, &self.result.columns)?,
            RowEncoding::Binary => row::parse_binary_row(message, &self.result.columns)?,
        };
        self.result.rows.push(row);
        Ok(ResultsetStep::NeedMessage)
    }
}

/// A row-position `0xfe` packet is never a real row: a length-encoded
/// integer can't start with `0xfe` and be under 9 bytes total, so the
/// classic EOF and deprecated-EOF-as-OK forms both land here unambiguously.
fn is_resultset_terminator(message: &[u8]) -> bool {
    matches!(message.first(), Some(0xfe)) && message.len() < 0xff_ffff
}

fn parse_terminator(message: &[u8]) -> Result<OkPacket> {
    if message.len() < 9 {
        let eof = EofPacket::parse(message)?;
        Ok(OkPacket {
            affected_rows: 0,
            last_insert_id: 0,
            status_flags: eof.status_flags,
            warnings: eof.warnings,
            info: String::new(),
        })
    } else {
        OkPacket::parse(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constant::{ColumnFlags, ColumnType};

    fn write_column_count(n: u64) -> Vec<u8> {
        let mut out = Vec::new();
        crate::codec::write_int_lenenc(&mut out, n);
        out
    }

    fn sample_column(name: &str) -> Vec<u8> {
        let mut p = Vec::new();
        for field in ["def", "db", "t", "t", name, name] {
            crate::codec::write_string_lenenc(&mut p, field);
        }
        p.push(0x0c);
        p.extend_from_slice(&45u16.to_le_bytes());
        p.extend_from_slice(&11u32.to_le_bytes());
        p.push(ColumnType::MYSQL_TYPE_LONG as u8);
        p.extend_from_slice(&ColumnFlags::empty().bits().to_le_bytes());
        p.push(0);
        p
    }

    #[test]
    fn statement_without_resultset_completes_on_first_ok() {
        let mut state = ResultsetState::new(RowEncoding::Text, MetadataMode::Full);
        let mut ok_payload = vec![0x00, 1, 0];
        ok_payload.extend_from_slice(&2u16.to_le_bytes());
        ok_payload.extend_from_slice(&0u16.to_le_bytes());
        match state.on_message(&ok_payload).unwrap() {
            ResultsetStep::Done(result) => {
                assert!(result.columns.is_empty());
                assert_eq!(result.ok.affected_rows, 1);
            }
            ResultsetStep::NeedMessage => panic!("expected Done"),
        }
    }

    #[test]
    fn full_resultset_walks_header_columns_and_rows() {
        let mut state = ResultsetState::new(RowEncoding::Text, MetadataMode::Full);
        assert!(matches!(
            state.on_message(&write_column_count(1)).unwrap(),
            ResultsetStep::NeedMessage
        ));
        assert!(matches!(
            state.on_message(&sample_column("id")).unwrap(),
            ResultsetStep::NeedMessage
        ));
        let mut row_payload = Vec::new();
        crate::codec::write_bytes_lenenc(&mut row_payload, b"7");
        assert!(matches!(state.on_message(&row_payload).unwrap(), ResultsetStep::NeedMessage));

        let mut terminator = vec![0xfe];
        terminator.extend_from_slice(&0u16.to_le_bytes());
        terminator.extend_from_slice(&2u16.to_le_bytes());
        match state.on_message(&terminator).unwrap() {
            ResultsetStep::Done(result) => {
                assert_eq!(result.columns.len(), 1);
                assert_eq!(result.rows.len(), 1);
            }
            ResultsetStep::NeedMessage => panic!("expected Done"),
        }
    }

    #[test]
    fn server_error_at_header_is_surfaced() {
        let mut state = ResultsetState::new(RowEncoding::Text, MetadataMode::Full);
        let mut err_payload = vec![0xff];
        err_payload.extend_from_slice(&1064u16.to_le_bytes());
        err_payload.extend_from_slice(b"#42000");
        err_payload.extend_from_slice(b"syntax error");
        let err = state.on_message(&err_payload).unwrap_err();
        assert!(matches!(err, Error::Server(_)));
    }
}
