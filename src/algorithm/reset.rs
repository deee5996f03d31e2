//! COM_RESET_CONNECTION, per spec §4.7. Clears session state (transactions,
//! temp tables, user variables) while keeping the TCP connection; the
//! server replies with a plain OK.
//!
//! Grounded in `zero-mysql`'s `protocol/command/utility.rs` (`Reset`).

use crate::error::{Error, Result};
use crate::protocol::command;
use crate::protocol::response::{GenericResponse, OkPacket, classify_response};
use crate::protocol::ErrPacket;

use super::{Algorithm, Progress};

#[derive(Default)]
pub struct ResetConnectionAlgorithm;

impl Algorithm for ResetConnectionAlgorithm {
    type Output = ();

    fn start(&mut self, out: &mut Vec<u8>) -> Result<Progress<Self::Output>> {
        command::write_reset_connection(out);
        Ok(Progress::NeedMessage)
    }

    fn on_message(&mut self, message: &[u8], _out: &mut Vec<u8>) -> Result<Progress<Self::Output>> {
        match classify_response(message)? {
            GenericResponse::Ok(payload) | GenericResponse::EofOrOk(payload) => {
                let _ok: OkPacket = OkPacket::parse(payload)?;
                Ok(Progress::Done(()))
            }
            GenericResponse::Err(payload) => Err(Error::Server(ErrPacket::parse(payload)?.into_server_error())),
            GenericResponse::Other(_) => Err(Error::ProtocolValueError("COM_RESET_CONNECTION expects an OK response".into())),
        }
    }
}
