//! COM_PING, per spec §4.7's command pipeline. The server always replies
//! with a plain OK.
//!
//! Grounded in `zero-mysql`'s `protocol/command/utility.rs` (`Ping`).

use crate::error::{Error, Result};
use crate::protocol::command;
use crate::protocol::response::{GenericResponse, OkPacket, classify_response};
use crate::protocol::ErrPacket;

use super::{Algorithm, Progress};

#[derive(Default)]
pub struct PingAlgorithm;

impl Algorithm for PingAlgorithm {
    type Output = ();

    fn start(&mut self, out: &mut Vec<u8>) -> Result<Progress<Self::Output>> {
        command::write_ping(out);
        Ok(Progress::NeedMessage)
    }

    fn on_message(&mut self, message: &[u8], _out: &mut Vec<u8>) -> Result<Progress<Self::Output>> {
        match classify_response(message)? {
            GenericResponse::Ok(payload) | GenericResponse::EofOrOk(payload) => {
                let _ok: OkPacket = OkPacket::parse(payload)?;
                Ok(Progress::Done(()))
            }
            GenericResponse::Err(payload) => Err(Error::Server(ErrPacket::parse(payload)?.into_server_error())),
            GenericResponse::Other(_) => Err(Error::ProtocolValueError("COM_PING expects an OK response".into())),
        }
    }
}
