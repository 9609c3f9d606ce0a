//! WS-Security UsernameToken header
//!
//! ONVIF authenticates SOAP requests with the WS-Security password digest
//! profile: `Base64(SHA1(nonce + created + password))` over a fresh random
//! nonce and the current UTC timestamp.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rand::rngs::OsRng;
use rand::RngCore;
use sha1::{Digest, Sha1};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::error::{Error, Result};

const DIGEST_TYPE: &str = "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-username-token-profile-1.0#PasswordDigest";
const NONCE_ENCODING: &str = "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-soap-message-security-1.0#Base64Binary";
const NONCE_LEN: usize = 20;

/// Build the `<s:Header>` carrying a UsernameToken for one request.
///
/// Each call produces a fresh nonce and timestamp; headers must not be
/// reused across requests.
pub fn security_header(username: &str, password: &str) -> Result<String> {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let created = OffsetDateTime::now_utc()
        .replace_nanosecond(0)
        .map_err(|e| Error::Protocol(format!("timestamp: {e}")))?
        .format(&Rfc3339)
        .map_err(|e| Error::Protocol(format!("timestamp format: {e}")))?;

    let mut hasher = Sha1::new();
    hasher.update(nonce);
    hasher.update(created.as_bytes());
    hasher.update(password.as_bytes());
    let digest = BASE64.encode(hasher.finalize());

    Ok(format!(
        concat!(
            "<s:Header>",
            "<Security xmlns=\"http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd\" s:mustUnderstand=\"1\">",
            "<UsernameToken>",
            "<Username>{username}</Username>",
            "<Password Type=\"{digest_type}\">{digest}</Password>",
            "<Nonce EncodingType=\"{nonce_encoding}\">{nonce}</Nonce>",
            "<Created xmlns=\"http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd\">{created}</Created>",
            "</UsernameToken>",
            "</Security>",
            "</s:Header>"
        ),
        username = xml_escape(username),
        digest_type = DIGEST_TYPE,
        digest = digest,
        nonce_encoding = NONCE_ENCODING,
        nonce = BASE64.encode(nonce),
        created = created,
    ))
}

pub(crate) fn xml_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}
