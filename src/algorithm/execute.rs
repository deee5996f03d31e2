//! COM_STMT_EXECUTE: the binary-protocol prepared-statement execution
//! algorithm, per spec §4.8.
//!
//! Grounded in `zero-mysql`'s `protocol/command/prepared.rs` (`Exec`'s
//! `step()`), built on the shared [`super::resultset`] state machine like
//! [`super::query`], with the extra up-front parameter-count check the
//! teacher's `Exec::new` performs.

use crate::error::{Error, Result};
use crate::protocol::column::MetadataMode;
use crate::protocol::command;
use crate::value::Value;

use super::resultset::{QueryResult, ResultsetState, ResultsetStep, RowEncoding};
use super::{Algorithm, Progress};

pub struct ExecuteAlgorithm<'a> {
    statement_id: u32,
    params: &'a [Value],
    metadata_mode: MetadataMode,
    resultset: Option<ResultsetState>,
    finished: Vec<QueryResult>,
}

impl<'a> ExecuteAlgorithm<'a> {
    /// Fails fast with [`Error::WrongNumParams`] rather than sending a
    /// malformed COM_STMT_EXECUTE the server would just reject, per spec
    /// §4.8's parameter-count invariant.
    pub fn new(statement_id: u32, expected_params: usize, params: &'a [Value], metadata_mode: MetadataMode) -> Result<Self> {
        if params.len() != expected_params {
            return Err(Error::WrongNumParams {
                expected: expected_params,
                actual: params.len(),
            });
        }
        Ok(Self {
            statement_id,
            params,
            metadata_mode,
            resultset: None,
            finished: Vec::new(),
        })
    }
}

impl<'a> Algorithm for ExecuteAlgorithm<'a> {
    /// One entry per resultset, chained the same way as [`super::query`]'s
    /// algorithm — a CALL with OUT params or SERVER_MORE_RESULTS_EXISTS
    /// yields more than one.
    type Output = Vec<QueryResult>;

    fn start(&mut self, out: &mut Vec<u8>) -> Result<Progress<Self::Output>> {
        command::write_execute(out, self.statement_id, self.params);
        Ok(Progress::NeedMessage)
    }

    fn on_message(&mut self, message: &[u8], _out: &mut Vec<u8>) -> Result<Progress<Self::Output>> {
        let state = self
            .resultset
            .get_or_insert_with(|| ResultsetState::new(RowEncoding::Binary, self.metadata_mode));
        match state.on_message(message)? {
            ResultsetStep::NeedMessage => Ok(Progress::NeedMessage),
            ResultsetStep::Done(result) => {
                let more = result.ok.more_results_exist();
                self.finished.push(result);
                if more {
                    self.resultset = Some(ResultsetState::new(RowEncoding::Binary, self.metadata_mode));
                    Ok(Progress::NeedMessage)
                } else {
                    Ok(Progress::Done(std::mem::take(&mut self.finished)))
                }
            }
        }
    }
}
