//! The handshake/login algorithm, per spec §4.6.
//!
//! Grounded in `zero-mysql`'s `protocol/connection/handshake.rs` and
//! `handler.rs` (the greeting -> optional SSL upgrade -> login ->
//! auth-switch/more-data loop), reshaped onto [`Algorithm`] so the TLS
//! upgrade point and every round trip are explicit instead of being
//! buried in one long async function.

use crate::auth::{self, CachingSha2FastAuthResult};
use crate::constant::{CAPABILITIES_ALWAYS_DISABLED, CAPABILITIES_ALWAYS_ENABLED, CapabilityFlags};
use crate::error::{Error, Result};
use crate::opts::{Address, ConnectOpts, SslMode};
use crate::protocol::handshake::{
    self, AuthPhaseResponse, AuthSwitchRequest, LoginRequest, ServerGreeting, read_auth_phase_response,
};

use super::{Algorithm, Progress};

const MAX_PACKET_SIZE: u32 = 0x0100_0000;

/// What a successful connect negotiated, handed back to the connection
/// façade so it knows how to frame subsequent commands.
#[derive(Debug, Clone)]
pub struct ConnectOutcome {
    pub capabilities: CapabilityFlags,
    pub connection_id: u32,
    pub server_version: String,
    pub is_mariadb: bool,
}

enum State {
    AwaitingGreeting,
    AwaitingSslHandshake {
        greeting: ServerGreeting,
    },
    AwaitingAuthResult {
        capabilities: CapabilityFlags,
        greeting: ServerGreeting,
        plugin_name: String,
        secure_channel: bool,
    },
}

pub struct ConnectAlgorithm<'a> {
    opts: &'a ConnectOpts,
    state: State,
}

impl<'a> ConnectAlgorithm<'a> {
    pub fn new(opts: &'a ConnectOpts) -> Self {
        Self {
            opts,
            state: State::AwaitingGreeting,
        }
    }

    fn negotiate_capabilities(&self, greeting: &ServerGreeting, want_ssl: bool) -> CapabilityFlags {
        let mut caps = CAPABILITIES_ALWAYS_ENABLED | (self.opts.capabilities & greeting.capabilities);
        if self.opts.database.is_some() {
            caps |= CapabilityFlags::CLIENT_CONNECT_WITH_DB;
        }
        if !self.opts.connect_attrs.is_empty() {
            caps |= CapabilityFlags::CLIENT_CONNECT_ATTRS;
        }
        if self.opts.multi_queries {
            caps |= CapabilityFlags::CLIENT_MULTI_STATEMENTS;
        }
        if want_ssl {
            caps |= CapabilityFlags::CLIENT_SSL;
        }
        caps & !CAPABILITIES_ALWAYS_DISABLED
    }

    fn write_login(&self, out: &mut Vec<u8>, capabilities: CapabilityFlags, greeting: &ServerGreeting) -> Result<String> {
        let plugin_name = if greeting.auth_plugin_name.is_empty() {
            auth::MYSQL_NATIVE_PASSWORD.to_string()
        } else {
            greeting.auth_plugin_name.clone()
        };
        let password = self.opts.password.as_deref().unwrap_or("");
        let auth_response = auth::initial_response_for_plugin(&plugin_name, password, &greeting.scramble)?;
        handshake::write_login_request(
            out,
            &LoginRequest {
                capabilities,
                max_packet_size: MAX_PACKET_SIZE,
                collation_id: self.opts.collation_id,
                username: &self.opts.username,
                auth_response: &auth_response,
                database: self.opts.database.as_deref(),
                auth_plugin_name: &plugin_name,
                connect_attrs: &self.opts.connect_attrs,
            },
        );
        Ok(plugin_name)
    }

    fn handle_auth_switch(&self, req: AuthSwitchRequest, out: &mut Vec<u8>) -> Result<String> {
        let password = self.opts.password.as_deref().unwrap_or("");
        let response = auth::initial_response_for_plugin(&req.plugin_name, password, &req.scramble)?;
        out.extend_from_slice(&response);
        Ok(req.plugin_name)
    }
}

impl<'a> Algorithm for ConnectAlgorithm<'a> {
    type Output = ConnectOutcome;

    fn start(&mut self, _out: &mut Vec<u8>) -> Result<Progress<Self::Output>> {
        Ok(Progress::NeedMessage)
    }

    fn on_message(&mut self, message: &[u8], out: &mut Vec<u8>) -> Result<Progress<Self::Output>> {
        match std::mem::replace(&mut self.state, State::AwaitingGreeting) {
            State::AwaitingGreeting => {
                let greeting = ServerGreeting::parse(message)?;
                let want_ssl = match self.opts.effective_ssl_mode() {
                    SslMode::Disable => false,
                    SslMode::Enable => greeting.capabilities.contains(CapabilityFlags::CLIENT_SSL),
                    SslMode::Require => {
                        if !greeting.capabilities.contains(CapabilityFlags::CLIENT_SSL) {
                            return Err(Error::ServerUnsupported("server does not support TLS".into()));
                        }
                        true
                    }
                };

                if want_ssl {
                    let capabilities = self.negotiate_capabilities(&greeting, true);
                    handshake::write_ssl_request(out, capabilities, MAX_PACKET_SIZE, self.opts.collation_id);
                    self.state = State::AwaitingSslHandshake { greeting };
                    Ok(Progress::NeedSsl)
                } else {
                    let capabilities = self.negotiate_capabilities(&greeting, false);
                    let plugin_name = self.write_login(out, capabilities, &greeting)?;
                    let secure_channel = matches!(self.opts.address, Address::Unix { .. });
                    self.state = State::AwaitingAuthResult {
                        capabilities,
                        greeting,
                        plugin_name,
                        secure_channel,
                    };
                    Ok(Progress::NeedMessage)
                }
            }
            State::AwaitingSslHandshake { .. } => Err(Error::LibraryBug(crate::error::eyre!(
                "connect algorithm received a message while awaiting a TLS handshake"
            ))),
            State::AwaitingAuthResult {
                capabilities,
                greeting,
                plugin_name,
                secure_channel,
            } => match read_auth_phase_response(message)? {
                AuthPhaseResponse::Ok(_ok) => Ok(Progress::Done(ConnectOutcome {
                    capabilities,
                    connection_id: greeting.connection_id,
                    server_version: greeting.server_version,
                    is_mariadb: greeting.is_mariadb(),
                })),
                AuthPhaseResponse::Err(server_error) => Err(Error::Server(server_error)),
                AuthPhaseResponse::AuthSwitch(req) => {
                    let plugin_name = self.handle_auth_switch(req, out)?;
                    self.state = State::AwaitingAuthResult {
                        capabilities,
                        greeting,
                        plugin_name,
                        secure_channel,
                    };
                    Ok(Progress::NeedMessage)
                }
                AuthPhaseResponse::MoreData(data) => {
                    let byte = *data.first().ok_or_else(|| {
                        Error::ProtocolValueError("empty caching_sha2_password more-data payload".into())
                    })?;
                    match auth::parse_caching_sha2_more_data(byte)? {
                        CachingSha2FastAuthResult::FastAuthSuccess => {
                            self.state = State::AwaitingAuthResult {
                                capabilities,
                                greeting,
                                plugin_name,
                                secure_channel,
                            };
                            Ok(Progress::NeedMessage)
                        }
                        CachingSha2FastAuthResult::FullAuthRequired => {
                            if !secure_channel {
                                return Err(Error::AuthPluginRequiresSsl);
                            }
                            let password = self.opts.password.as_deref().unwrap_or("");
                            out.extend_from_slice(&auth::caching_sha2_full_auth_payload(password));
                            self.state = State::AwaitingAuthResult {
                                capabilities,
                                greeting,
                                plugin_name,
                                secure_channel,
                            };
                            Ok(Progress::NeedMessage)
                        }
                    }
                }
            },
        }
    }

    fn after_ssl(&mut self, out: &mut Vec<u8>) -> Result<Progress<Self::Output>> {
        match std::mem::replace(&mut self.state, State::AwaitingGreeting) {
            State::AwaitingSslHandshake { greeting } => {
                let capabilities = self.negotiate_capabilities(&greeting, true);
                let plugin_name = self.write_login(out, capabilities, &greeting)?;
                self.state = State::AwaitingAuthResult {
                    capabilities,
                    greeting,
                    plugin_name,
                    secure_channel: true,
                };
                Ok(Progress::NeedMessage)
            }
            other => {
                self.state = other;
                Err(Error::LibraryBug(crate::error::eyre!(
                    "after_ssl called outside the SSL-handshake step of connect"
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_greeting_bytes(plugin: &str) -> Vec<u8> {
        let mut p = Vec::new();
        p.push(10);
        p.extend_from_slice(b"8.0.34\0");
        p.extend_from_slice(&1u32.to_le_bytes());
        p.extend_from_slice(&[1u8; 8]);
        p.push(0);
        let caps = CapabilityFlags::CLIENT_PROTOCOL_41 | CapabilityFlags::CLIENT_PLUGIN_AUTH;
        p.extend_from_slice(&(caps.bits() as u16).to_le_bytes());
        p.push(45);
        p.extend_from_slice(&2u16.to_le_bytes());
        p.extend_from_slice(&((caps.bits() >> 16) as u16).to_le_bytes());
        p.push(21);
        p.extend_from_slice(&[0u8; 10]);
        p.extend_from_slice(&[2u8; 12]);
        p.push(0);
        p.extend_from_slice(plugin.as_bytes());
        p.push(0);
        p
    }

    #[test]
    fn plaintext_flow_sends_login_then_completes_on_ok() {
        let opts = ConnectOpts {
            username: "root".into(),
            password: Some("secret".into()),
            ssl_mode: SslMode::Disable,
            ..ConnectOpts::default()
        };
        let mut algo = ConnectAlgorithm::new(&opts);
        let mut out = Vec::new();
        assert!(matches!(algo.start(&mut out).unwrap(), Progress::NeedMessage));

        let mut out = Vec::new();
        let progress = algo.on_message(&sample_greeting_bytes("mysql_native_password"), &mut out).unwrap();
        assert!(matches!(progress, Progress::NeedMessage));
        assert!(out.windows(4).any(|w| w == b"root"));

        let mut ok_payload = vec![0x00, 0, 0];
        ok_payload.extend_from_slice(&2u16.to_le_bytes());
        ok_payload.extend_from_slice(&0u16.to_le_bytes());
        let mut out = Vec::new();
        match algo.on_message(&ok_payload, &mut out).unwrap() {
            Progress::Done(outcome) => assert_eq!(outcome.connection_id, 1),
            _ => panic!("expected Done"),
        }
    }

    #[test]
    fn negotiated_capabilities_keep_conditionally_enabled_flags() {
        let opts = ConnectOpts {
            database: Some("mydb".into()),
            connect_attrs: vec![("_client_name".into(), "mysql-proto-core".into())],
            ssl_mode: SslMode::Disable,
            ..ConnectOpts::default()
        };
        let algo = ConnectAlgorithm::new(&opts);
        let greeting = ServerGreeting::parse(&sample_greeting_bytes("mysql_native_password")).unwrap();
        let caps = algo.negotiate_capabilities(&greeting, true);
        assert!(caps.contains(CapabilityFlags::CLIENT_CONNECT_WITH_DB));
        assert!(caps.contains(CapabilityFlags::CLIENT_CONNECT_ATTRS));
        assert!(caps.contains(CapabilityFlags::CLIENT_SSL));
    }

    #[test]
    fn require_ssl_against_non_ssl_server_is_rejected() {
        let opts = ConnectOpts {
            ssl_mode: SslMode::Require,
            ..ConnectOpts::default()
        };
        let mut algo = ConnectAlgorithm::new(&opts);
        let mut out = Vec::new();
        let _ = algo.start(&mut out);
        let mut greeting = sample_greeting_bytes("mysql_native_password");
        // clear CLIENT_SSL (already absent) - greeting above never advertises it.
        let err = algo.on_message(&mut greeting, &mut Vec::new()).unwrap_err();
        assert!(matches!(err, Error::ServerUnsupported(_)));
    }

    #[test]
    fn caching_sha2_full_auth_without_ssl_is_rejected() {
        let opts = ConnectOpts {
            password: Some("hunter2".into()),
            ssl_mode: SslMode::Disable,
            ..ConnectOpts::default()
        };
        let mut algo = ConnectAlgorithm::new(&opts);
        let _ = algo.start(&mut Vec::new());
        let _ = algo
            .on_message(&sample_greeting_bytes("caching_sha2_password"), &mut Vec::new())
            .unwrap();
        let err = algo.on_message(&[0x01, 0x04], &mut Vec::new()).unwrap_err();
        assert!(matches!(err, Error::AuthPluginRequiresSsl));
    }
}
