//! COM_QUIT, per spec §4.7. The server closes the connection without
//! replying, so this algorithm is done as soon as its message is written.
//!
//! Grounded in `zero-mysql`'s `protocol/command/utility.rs` (`Quit`).

use crate::error::Result;
use crate::protocol::command;

use super::{Algorithm, Progress};

#[derive(Default)]
pub struct QuitAlgorithm;

impl Algorithm for QuitAlgorithm {
    type Output = ();

    fn start(&mut self, out: &mut Vec<u8>) -> Result<Progress<Self::Output>> {
        command::write_quit(out);
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
    fn quit_completes_without_waiting_for_a_reply() {
        let mut algo = QuitAlgorithm;
        let mut out = Vec::new();
        assert!(matches!(algo.start(&mut out).unwrap(), Progress::Done(())));
        assert_eq!(out[0], crate::constant::CommandByte::Quit as u8);
    }
}
