//! COM_STMT_CLOSE, per spec §4.8. The server sends no response at all, so
//! this algorithm is done the moment its one message is written.
//!
//! Grounded in `zero-mysql`'s `protocol/command/prepared.rs` (`Close`).

use crate::error::Result;
use crate::protocol::command;

use super::{Algorithm, Progress};

pub struct CloseStatementAlgorithm {
    statement_id: u32,
}

impl CloseStatementAlgorithm {
    pub fn new(statement_id: u32) -> Self {
        Self { statement_id }
    }
}

impl Algorithm for CloseStatementAlgorithm {
    type Output = ();

    fn start(&mut self, out: &mut Vec<u8>) -> Result<Progress<Self::Output>> {
        command::write_close_statement(out, self.statement_id);
        Ok(Progress::Done(()))
    }

    fn on_message(&mut self, _message: &[u8], _out: &mut Vec<u8>) -> Result<Progress<Self::Output>> {
        Ok(Progress::Done(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_completes_without_waiting_for_a_reply() {
        let mut algo = CloseStatementAlgorithm::new(3);
        let mut out = Vec::new();
        assert!(matches!(algo.start(&mut out).unwrap(), Progress::Done(())));
        assert_eq!(out[0], crate::constant::CommandByte::StmtClose as u8);
    }
}
