//! `SET NAMES <charset>`, sent as a plain text command, per SPEC_FULL.md
//! §4.7's set-character-set pipeline entry.
//!
//! Grounded in `zero-mysql`'s `protocol/command/query.rs` (it reuses the
//! text-query path for administrative statements like this one).

use crate::error::{Error, Result};
use crate::protocol::command;
use crate::protocol::response::{GenericResponse, OkPacket, classify_response};
use crate::protocol::ErrPacket;

use super::{Algorithm, Progress};

pub struct SetCharacterSetAlgorithm<'a> {
    charset_name: &'a str,
}

impl<'a> SetCharacterSetAlgorithm<'a> {
    pub fn new(charset_name: &'a str) -> Self {
        Self { charset_name }
    }
}

impl<'a> Algorithm for SetCharacterSetAlgorithm<'a> {
    type Output = ();

    fn start(&mut self, out: &mut Vec<u8>) -> Result<Progress<Self::Output>> {
        command::write_set_names(out, self.charset_name);
        Ok(Progress::NeedMessage)
    }

    fn on_message(&mut self, message: &[u8], _out: &mut Vec<u8>) -> Result<Progress<Self::Output>> {
        match classify_response(message)? {
            GenericResponse::Ok(payload) | GenericResponse::EofOrOk(payload) => {
                let _ok: OkPacket = OkPacket::parse(payload)?;
                Ok(Progress::Done(()))
            }
            GenericResponse::Err(payload) => Err(Error::Server(ErrPacket::parse(payload)?.into_server_error())),
            GenericResponse::Other(_) => Err(Error::ProtocolValueError("SET NAMES expects an OK response".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_set_names_statement() {
        let mut algo = SetCharacterSetAlgorithm::new("utf8mb4");
        let mut out = Vec::new();
        assert!(matches!(algo.start(&mut out).unwrap(), Progress::NeedMessage));
        assert_eq!(out[0], crate::constant::CommandByte::Query as u8);
        assert!(out.ends_with(b"SET NAMES utf8mb4"));
    }
}
