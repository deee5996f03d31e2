//! COM_QUERY: the text-protocol query algorithm, per spec §4.7.
//!
//! Grounded in `zero-mysql`'s `protocol/command/query.rs` (`Query`'s
//! `step()`), rebuilt on top of the shared [`super::resultset`] state
//! machine so the header/column/row dance isn't duplicated against
//! [`super::execute`].

use crate::error::Result;
use crate::protocol::column::MetadataMode;
use crate::protocol::command;

use super::resultset::{QueryResult, ResultsetState, ResultsetStep, RowEncoding};
use super::{Algorithm, Progress};

pub struct QueryAlgorithm<'a> {
    sql: &'a str,
    metadata_mode: MetadataMode,
    resultset: Option<ResultsetState>,
    finished: Vec<QueryResult>,
}

impl<'a> QueryAlgorithm<'a> {
    pub fn new(sql: &'a str, metadata_mode: MetadataMode) -> Self {
        Self {
            sql,
            metadata_mode,
            resultset: None,
            finished: Vec::new(),
        }
    }
}

impl<'a> Algorithm for QueryAlgorithm<'a> {
    /// One entry per resultset; a statement with a single resultset (or
    /// none at all) still yields a one-element vec, per spec §4.7's
    /// "loop read-resultset-head -> read-rows until no further resultsets
    /// remain" (chained by a stored procedure's OUT params or an explicit
    /// multi-statement query).
    type Output = Vec<QueryResult>;

    fn start(&mut self, out: &mut Vec<u8>) -> Result<Progress<Self::Output>> {
        command::write_query(out, self.sql);
        Ok(Progress::NeedMessage)
    }

    fn on_message(&mut self, message: &[u8], _out: &mut Vec<u8>) -> Result<Progress<Self::Output>> {
        let state = self
            .resultset
            .get_or_insert_with(|| ResultsetState::new(RowEncoding::Text, self.metadata_mode));
        match state.on_message(message)? {
            ResultsetStep::NeedMessage => Ok(Progress::NeedMessage),
            ResultsetStep::Done(result) => {
                let more = result.ok.more_results_exist();
                self.finished.push(result);
                if more {
                    self.resultset = Some(ResultsetState::new(RowEncoding::Text, self.metadata_mode));
                    Ok(Progress::NeedMessage)
                } else {
                    Ok(Progress::Done(std::mem::take(&mut self.finished)))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_writes_com_query_with_sql_text() {
        let mut algo = QueryAlgorithm::new("SELECT 1", MetadataMode::Full);
        let mut out = Vec::new();
        assert!(matches!(algo.start(&mut out).unwrap(), Progress::NeedMessage));
        assert_eq!(out[0], crate::constant::CommandByte::Query as u8);
        assert_eq!(&out[1..], b"SELECT 1");
    }

    #[test]
    fn no_resultset_statement_completes_immediately() {
        let mut algo = QueryAlgorithm::new("DO 1", MetadataMode::Full);
        let _ = algo.start(&mut Vec::new());
        let mut ok_payload = vec![0x00, 0, 0];
        ok_payload.extend_from_slice(&2u16.to_le_bytes());
        ok_payload.extend_from_slice(&0u16.to_le_bytes());
        match algo.on_message(&ok_payload, &mut Vec::new()).unwrap() {
            Progress::Done(results) => {
                assert_eq!(results.len(), 1);
                assert!(results[0].rows.is_empty());
            }
            _ => panic!("expected Done"),
        }
    }
}
