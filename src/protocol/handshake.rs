//! Handshake-phase packets: server greeting, login request, SSL request,
//! and auth-switch/more-data, per spec §4.3.
//!
//! Grounded in `zero-mysql`'s `protocol/connection/handshake.rs`
//! (`read_initial_handshake`, `HandshakeResponse41`, `AuthSwitchRequest`),
//! generalized to an owned type and to also emit the connection-attribute
//! block named in SPEC_FULL.md §6.

use crate::codec::{self, Cursor};
use crate::constant::CapabilityFlags;
use crate::error::{Error, Result};

/// The server's initial greeting (`Protocol::HandshakeV10`).
#[derive(Debug, Clone)]
pub struct ServerGreeting {
    pub protocol_version: u8,
    pub server_version: String,
    pub connection_id: u32,
    pub scramble: Vec<u8>,
    pub capabilities: CapabilityFlags,
    pub collation_id: u8,
    pub status_flags: u16,
    pub auth_plugin_name: String,
}

impl ServerGreeting {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(payload);
        let protocol_version = cursor.read_int_1()?;
        if protocol_version != 10 {
            return Err(Error::ServerUnsupported(format!(
                "unsupported handshake protocol version {protocol_version}"
            )));
        }
        let server_version = String::from_utf8_lossy(cursor.read_string_null()?).into_owned();
        let connection_id = cursor.read_int_4()?;
        let scramble_1 = cursor.read_string_fix(8)?.to_vec();
        let _filler = cursor.read_int_1()?;
        let cap_lower = cursor.read_int_2()? as u32;
        let collation_id = cursor.read_int_1()?;
        let status_flags = cursor.read_int_2()?;
        let cap_upper = cursor.read_int_2()? as u32;
        let capabilities = CapabilityFlags::from_bits_truncate((cap_upper << 16) | cap_lower);
        let auth_data_len = cursor.read_int_1()?;
        let _reserved = cursor.read_string_fix(10)?;

        // auth-plugin-data-part-2 is MAX(13, auth_data_len - 8) bytes
        // including its own trailing NUL; the scramble proper is all but
        // that last byte.
        let part2_len = (auth_data_len as usize).saturating_sub(8).max(13);
        let scramble_2 = cursor.read_string_fix(part2_len - 1)?;
        let _terminator = cursor.read_int_1()?;
        let mut scramble = scramble_1;
        scramble.extend_from_slice(scramble_2);

        let auth_plugin_name = if capabilities.contains(CapabilityFlags::CLIENT_PLUGIN_AUTH) {
            String::from_utf8_lossy(cursor.read_string_null()?).into_owned()
        } else {
            String::new()
        };

        Ok(Self {
            protocol_version,
            server_version,
            connection_id,
            scramble,
            capabilities,
            collation_id,
            status_flags,
            auth_plugin_name,
        })
    }

    /// MariaDB advertises itself through its version string rather than a
    /// capability bit, per spec §4.6 item 5.
    pub fn is_mariadb(&self) -> bool {
        self.server_version.contains("MariaDB")
    }
}

/// The client's handshake response (`HandshakeResponse41`).
pub struct LoginRequest<'a> {
    pub capabilities: CapabilityFlags,
    pub max_packet_size: u32,
    pub collation_id: u8,
    pub username: &'a str,
    pub auth_response: &'a [u8],
    pub database: Option<&'a str>,
    pub auth_plugin_name: &'a str,
    pub connect_attrs: &'a [(String, String)],
}

pub fn write_login_request(out: &mut Vec<u8>, req: &LoginRequest<'_>) {
    codec::write_int_4(out, req.capabilities.bits());
    codec::write_int_4(out, req.max_packet_size);
    codec::write_int_1(out, req.collation_id);
    out.extend_from_slice(&[0u8; 23]);
    codec::write_string_null(out, req.username);

    if req.capabilities.contains(CapabilityFlags::CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA) {
        codec::write_bytes_lenenc(out, req.auth_response);
    } else {
        codec::write_int_1(out, req.auth_response.len() as u8);
        codec::write_bytes_fix(out, req.auth_response);
    }

    if let Some(db) = req.database {
        codec::write_string_null(out, db);
    }

    if req.capabilities.contains(CapabilityFlags::CLIENT_PLUGIN_AUTH) {
        codec::write_string_null(out, req.auth_plugin_name);
    }

    if req.capabilities.contains(CapabilityFlags::CLIENT_CONNECT_ATTRS) {
        let mut attrs_buf = Vec::new();
        for (key, value) in req.connect_attrs {
            codec::write_string_lenenc(&mut attrs_buf, key);
            codec::write_string_lenenc(&mut attrs_buf, value);
        }
        codec::write_bytes_lenenc(out, &attrs_buf);
    }
}

/// The SSL request prefix (same layout up through collation/filler, no
/// credentials), sent before upgrading the transport to TLS.
pub fn write_ssl_request(out: &mut Vec<u8>, capabilities: CapabilityFlags, max_packet_size: u32, collation_id: u8) {
    codec::write_int_4(out, capabilities.bits());
    codec::write_int_4(out, max_packet_size);
    codec::write_int_1(out, collation_id);
    out.extend_from_slice(&[0u8; 23]);
}

pub struct AuthSwitchRequest {
    pub plugin_name: String,
    pub scramble: Vec<u8>,
}

pub enum AuthPhaseResponse {
    Ok(crate::protocol::response::OkPacket),
    Err(crate::error::ServerError),
    AuthSwitch(AuthSwitchRequest),
    /// `more data`: a plugin-specific continuation, e.g.
    /// caching_sha2_password's fast-auth/full-auth byte.
    MoreData(Vec<u8>),
}

/// Dispatches on the first payload byte per spec §4.3's "Auth switch
/// request / more data / OK / ERR: distinguished by the first payload
/// byte (`0xfe`, `0x01`, `0x00`, `0xff`)".
pub fn read_auth_phase_response(payload: &[u8]) -> Result<AuthPhaseResponse> {
    match payload.first() {
        Some(0x00) => Ok(AuthPhaseResponse::Ok(crate::protocol::response::OkPacket::parse(payload)?)),
        Some(0xff) => Ok(AuthPhaseResponse::Err(
            crate::protocol::response::ErrPacket::parse(payload)?.into_server_error(),
        )),
        Some(0x01) => Ok(AuthPhaseResponse::MoreData(payload[1..].to_vec())),
        Some(0xfe) => {
            let mut cursor = Cursor::new(payload);
            let _header = cursor.read_int_1()?;
            if cursor.is_empty() {
                // A bare 0xfe with no plugin name is the legacy "please
                // switch to mysql_old_password" signal; unsupported here.
                return Err(Error::UnknownAuthPlugin("mysql_old_password".into()));
            }
            let plugin_name = String::from_utf8_lossy(cursor.read_string_null()?).into_owned();
            let scramble = cursor.read_string_eof().to_vec();
            Ok(AuthPhaseResponse::AuthSwitch(AuthSwitchRequest { plugin_name, scramble }))
        }
        _ => Err(Error::ProtocolValueError("empty auth-phase response".into())),
    }
}
