//! COM_STMT_PREPARE: the prepare algorithm, per spec §4.8.
//!
//! Grounded in `zero-mysql`'s `protocol/command/prepared.rs`
//! (`Prepare::step()`, reading the header then the parameter and column
//! definition blocks). Both blocks are read without a trailing EOF packet:
//! this client always requests `CLIENT_DEPRECATE_EOF`, which the MySQL
//! protocol docs say suppresses the EOF after each block, just as it does
//! for resultset rows.

use crate::error::Result;
use crate::prepared::PreparedStatement;
use crate::protocol::ColumnDefinition;
use crate::protocol::column::MetadataMode;
use crate::protocol::command::{self, PrepareOkHeader};

use super::{Algorithm, Progress};

enum Phase {
    AwaitingHeader,
    ReadingParams { header: PrepareOkHeader, seen: usize },
    ReadingColumns { header: PrepareOkHeader, columns: Vec<ColumnDefinition> },
}

pub struct PrepareAlgorithm<'a> {
    sql: &'a str,
    metadata_mode: MetadataMode,
    phase: Phase,
}

impl<'a> PrepareAlgorithm<'a> {
    pub fn new(sql: &'a str, metadata_mode: MetadataMode) -> Self {
        Self {
            sql,
            metadata_mode,
            phase: Phase::AwaitingHeader,
        }
    }

    fn finish(header: PrepareOkHeader, columns: Vec<ColumnDefinition>) -> PreparedStatement {
        let mut statement = PreparedStatement::new(
            header.statement_id,
            header.num_params as usize,
            header.num_columns as usize,
        );
        if !columns.is_empty() {
            statement.columns = Some(columns);
        }
        statement
    }
}

impl<'a> Algorithm for PrepareAlgorithm<'a> {
    type Output = PreparedStatement;

    fn start(&mut self, out: &mut Vec<u8>) -> Result<Progress<Self::Output>> {
        command::write_prepare(out, self.sql);
        Ok(Progress::NeedMessage)
    }

    fn on_message(&mut self, message: &[u8], _out: &mut Vec<u8>) -> Result<Progress<Self::Output>> {
        match std::mem::replace(&mut self.phase, Phase::AwaitingHeader) {
            Phase::AwaitingHeader => {
                let header = command::read_prepare_ok_header(message)?;
                if header.num_params > 0 {
                    self.phase = Phase::ReadingParams { header, seen: 0 };
                } else if header.num_columns > 0 {
                    self.phase = Phase::ReadingColumns {
                        header,
                        columns: Vec::new(),
                    };
                } else {
                    return Ok(Progress::Done(Self::finish(header, Vec::new())));
                }
                Ok(Progress::NeedMessage)
            }
            Phase::ReadingParams { header, seen } => {
                // Parameter definitions carry no information this client
                // currently surfaces; only their count matters here.
                let seen = seen + 1;
                if seen < header.num_params as usize {
                    self.phase = Phase::ReadingParams { header, seen };
                    Ok(Progress::NeedMessage)
                } else if header.num_columns > 0 {
                    self.phase = Phase::ReadingColumns {
                        header,
                        columns: Vec::new(),
                    };
                    Ok(Progress::NeedMessage)
                } else {
                    Ok(Progress::Done(Self::finish(header, Vec::new())))
                }
            }
            Phase::ReadingColumns { header, mut columns } => {
                let column = ColumnDefinition::parse(message, self.metadata_mode)?;
                columns.push(column);
                if columns.len() < header.num_columns as usize {
                    self.phase = Phase::ReadingColumns { header, columns };
                    Ok(Progress::NeedMessage)
                } else {
                    Ok(Progress::Done(Self::finish(header, columns)))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_payload(statement_id: u32, num_columns: u16, num_params: u16) -> Vec<u8> {
        let mut p = vec![0x00];
        p.extend_from_slice(&statement_id.to_le_bytes());
        p.extend_from_slice(&num_columns.to_le_bytes());
        p.extend_from_slice(&num_params.to_le_bytes());
        p.push(0);
        p.extend_from_slice(&0u16.to_le_bytes());
        p
    }

    #[test]
    fn statement_with_no_params_or_columns_completes_on_header() {
        let mut algo = PrepareAlgorithm::new("DO 1", MetadataMode::Full);
        let _ = algo.start(&mut Vec::new());
        match algo.on_message(&header_payload(1, 0, 0), &mut Vec::new()).unwrap() {
            Progress::Done(stmt) => {
                assert_eq!(stmt.statement_id(), 1);
                assert_eq!(stmt.param_count(), 0);
            }
            _ => panic!("expected Done"),
        }
    }

    #[test]
    fn statement_with_one_param_and_one_column_reads_both_blocks() {
        let mut algo = PrepareAlgorithm::new("SELECT ? FROM t WHERE id = ?", MetadataMode::Full);
        let _ = algo.start(&mut Vec::new());
        assert!(matches!(
            algo.on_message(&header_payload(9, 1, 1), &mut Vec::new()).unwrap(),
            Progress::NeedMessage
        ));

        let mut col = Vec::new();
        for field in ["def", "", "", "", "id", ""] {
            crate::codec::write_string_lenenc(&mut col, field);
        }
        col.push(0x0c);
        col.extend_from_slice(&63u16.to_le_bytes());
        col.extend_from_slice(&11u32.to_le_bytes());
        col.push(crate::constant::ColumnType::MYSQL_TYPE_LONG as u8);
        col.extend_from_slice(&0u16.to_le_bytes());
        col.push(0);

        assert!(matches!(
            algo.on_message(&col, &mut Vec::new()).unwrap(),
            Progress::NeedMessage
        ));
        match algo.on_message(&col, &mut Vec::new()).unwrap() {
            Progress::Done(stmt) => {
                assert_eq!(stmt.param_count(), 1);
                assert_eq!(stmt.column_count(), 1);
                assert_eq!(stmt.columns().map(<[_]>::len), Some(1));
            }
            _ => panic!("expected Done"),
        }
    }
}
