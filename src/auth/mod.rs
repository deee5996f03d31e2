//! Authentication plugins: `mysql_native_password` and
//! `caching_sha2_password`, per spec §4.5.
//!
//! Grounded in `zero-mysql`'s `handler.rs` (`auth_mysql_native_password`,
//! `auth_caching_sha2_password`, `CachingSha2PasswordFastAuthResult`),
//! extended with the full-auth-over-TLS follow-up the teacher's handler
//! doesn't implement, per SPEC_FULL.md §4.5's grounding note pointing at
//! `original_source/.../caching_sha2_password.hpp`.

use crate::error::{Error, Result};

pub const MYSQL_NATIVE_PASSWORD: &str = "mysql_native_password";
pub const CACHING_SHA2_PASSWORD: &str = "caching_sha2_password";

/// `SHA1(password) XOR SHA1(scramble || SHA1(SHA1(password)))`. Empty
/// password produces an empty response.
pub fn mysql_native_password_response(password: &str, scramble: &[u8]) -> Vec<u8> {
    use sha1::{Digest, Sha1};

    if password.is_empty() {
        return Vec::new();
    }

    let stage1 = Sha1::digest(password.as_bytes());
    let stage2 = Sha1::digest(stage1);

    let mut hasher = Sha1::new();
    hasher.update(scramble);
    hasher.update(stage2);
    let token = hasher.finalize();

    stage1.iter().zip(token.iter()).map(|(a, b)| a ^ b).collect()
}

/// `SHA256(password) XOR SHA256(SHA256(SHA256(password)) || scramble)`.
/// Empty password produces an empty response.
pub fn caching_sha2_password_response(password: &str, scramble: &[u8]) -> Vec<u8> {
    use sha2::{Digest, Sha256};

    if password.is_empty() {
        return Vec::new();
    }

    let stage1 = Sha256::digest(password.as_bytes());
    let stage2 = Sha256::digest(stage1);

    let mut hasher = Sha256::new();
    hasher.update(stage2);
    hasher.update(scramble);
    let token = hasher.finalize();

    stage1.iter().zip(token.iter()).map(|(a, b)| a ^ b).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachingSha2FastAuthResult {
    FastAuthSuccess,
    FullAuthRequired,
}

/// Decodes the single "more data" byte caching_sha2_password sends after
/// the initial response: `0x03` fast-path success, `0x04` full auth.
pub fn parse_caching_sha2_more_data(byte: u8) -> Result<CachingSha2FastAuthResult> {
    match byte {
        0x03 => Ok(CachingSha2FastAuthResult::FastAuthSuccess),
        0x04 => Ok(CachingSha2FastAuthResult::FullAuthRequired),
        other => Err(Error::ProtocolValueError(format!(
            "unexpected caching_sha2_password more-data byte 0x{other:02x}"
        ))),
    }
}

/// Builds the full-auth payload (plaintext password + NUL), only valid to
/// send over a confidential transport per spec §4.5. Callers are
/// responsible for checking transport security before using this — see
/// [`crate::error::Error::AuthPluginRequiresSsl`].
pub fn caching_sha2_full_auth_payload(password: &str) -> Vec<u8> {
    let mut payload = password.as_bytes().to_vec();
    payload.push(0);
    payload
}

/// Computes the initial auth response for a named plugin.
pub fn initial_response_for_plugin(plugin_name: &str, password: &str, scramble: &[u8]) -> Result<Vec<u8>> {
    match plugin_name {
        MYSQL_NATIVE_PASSWORD => Ok(mysql_native_password_response(password, scramble)),
        CACHING_SHA2_PASSWORD => Ok(caching_sha2_password_response(password, scramble)),
        other => Err(Error::UnknownAuthPlugin(other.to_string())),
    }
}
