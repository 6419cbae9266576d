//! Authentication: RFC 7617 (Basic), RFC 7616 (Digest), and NTLM.
//!
//! Schemes differ in two capabilities: whether a header can be computed
//! *preemptively* (before any server challenge) and how a challenge is
//! answered. NTLM has no preemptive form - it requires the server's nonce.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::error::{Error, Result};
use crate::ntlm;

/// Authentication scheme selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    Basic,
    Digest,
    Ntlm,
}

/// Credentials plus scheme for one protection space.
#[derive(Debug, Clone)]
pub struct Realm {
    pub username: String,
    pub password: String,
    pub scheme: AuthScheme,
    /// Send credentials before any challenge. Ignored for NTLM.
    pub preemptive: bool,
    /// NTLM domain (workgroup), empty for other schemes.
    pub ntlm_domain: String,
    /// NTLM workstation name, empty for other schemes.
    pub ntlm_host: String,
}

impl Realm {
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            scheme: AuthScheme::Basic,
            preemptive: false,
            ntlm_domain: String::new(),
            ntlm_host: String::new(),
        }
    }

    pub fn digest(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            scheme: AuthScheme::Digest,
            ..Self::basic(username, password)
        }
    }

    pub fn ntlm(
        username: impl Into<String>,
        password: impl Into<String>,
        domain: impl Into<String>,
        host: impl Into<String>,
    ) -> Self {
        Self {
            scheme: AuthScheme::Ntlm,
            ntlm_domain: domain.into(),
            ntlm_host: host.into(),
            ..Self::basic(username, password)
        }
    }

    pub fn preemptive(mut self, preemptive: bool) -> Self {
        self.preemptive = preemptive;
        self
    }

    /// The Authorization value to send before any challenge, when the
    /// scheme supports preemption. NTLM never does: it needs the server's
    /// challenge first.
    pub fn preemptive_header(&self) -> Option<String> {
        if !self.preemptive {
            return None;
        }
        match self.scheme {
            AuthScheme::Basic => Some(basic_auth(&self.username, &self.password)),
            // Digest preemption would need a cached nonce; without one there
            // is nothing valid to send.
            AuthScheme::Digest => None,
            AuthScheme::Ntlm => None,
        }
    }
}

/// Generate a Basic Auth header value (RFC 7617).
pub fn basic_auth(username: &str, password: &str) -> String {
    let plain = format!("{username}:{password}");
    format!("Basic {}", BASE64.encode(plain))
}

/// Parse a Basic Auth header value into (username, password).
pub fn parse_basic_auth(header: &str) -> Option<(String, String)> {
    let encoded = header.strip_prefix("Basic ")?.trim();
    let decoded = String::from_utf8(BASE64.decode(encoded).ok()?).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

/// Generate a Digest Auth header value (RFC 7616) for an "auth" qop
/// challenge. Supports MD5 and SHA-256 algorithm families.
#[allow(clippy::too_many_arguments)]
pub fn digest_auth(
    username: &str,
    password: &str,
    method: &str,
    uri: &str,
    realm: &str,
    nonce: &str,
    cnonce: &str,
    nc: &str,
    qop: &str,
    algorithm: &str,
    opaque: &str,
) -> String {
    use sha2::{Digest, Sha256};

    let hash = |data: &str| -> String {
        if algorithm.to_uppercase().starts_with("SHA-256") {
            hex::encode(Sha256::digest(data.as_bytes()))
        } else {
            hex::encode(ntlm::crypto::md5(data.as_bytes()))
        }
    };

    let ha1 = hash(&format!("{username}:{realm}:{password}"));
    let ha2 = hash(&format!("{method}:{uri}"));
    let response = hash(&format!("{ha1}:{nonce}:{nc}:{cnonce}:{qop}:{ha2}"));

    let mut header = format!(
        "Digest username=\"{username}\", realm=\"{realm}\", nonce=\"{nonce}\", uri=\"{uri}\", \
         qop={qop}, nc={nc}, cnonce=\"{cnonce}\", response=\"{response}\", algorithm={algorithm}"
    );
    if !opaque.is_empty() {
        header.push_str(&format!(", opaque=\"{opaque}\""));
    }
    header
}

/// Parse a WWW-Authenticate Digest challenge into its parameters.
pub fn parse_digest_challenge(header: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    let content = header.strip_prefix("Digest ").unwrap_or(header).trim();
    for part in content.split(',') {
        if let Some((key, val)) = part.trim().split_once('=') {
            map.insert(
                key.trim().to_lowercase(),
                val.trim().trim_matches('"').to_string(),
            );
        }
    }
    map
}

/// Answer a server challenge for this realm.
///
/// `challenge` is the matching `WWW-Authenticate` / `Proxy-Authenticate`
/// value. For NTLM, a challenge of just `NTLM` (no payload) asks for the
/// Type 1 message; `NTLM <base64>` carries the Type 2 to answer.
pub fn challenge_response(
    realm: &Realm,
    challenge: &str,
    method: &str,
    uri_path: &str,
) -> Result<String> {
    match realm.scheme {
        AuthScheme::Basic => Ok(basic_auth(&realm.username, &realm.password)),
        AuthScheme::Digest => {
            let params = parse_digest_challenge(challenge);
            let digest_realm = params.get("realm").cloned().unwrap_or_default();
            let nonce = params
                .get("nonce")
                .ok_or_else(|| Error::http_protocol("Digest challenge without nonce"))?;
            let qop = params.get("qop").cloned().unwrap_or_else(|| "auth".into());
            let algorithm = params.get("algorithm").cloned().unwrap_or_else(|| "MD5".into());
            let opaque = params.get("opaque").cloned().unwrap_or_default();

            let mut cnonce = [0u8; 8];
            getrandom::fill(&mut cnonce)
                .map_err(|e| Error::http_protocol(format!("cnonce RNG failed: {e}")))?;

            Ok(digest_auth(
                &realm.username,
                &realm.password,
                method,
                uri_path,
                &digest_realm,
                nonce,
                &hex::encode(cnonce),
                "00000001",
                &qop,
                &algorithm,
                &opaque,
            ))
        }
        AuthScheme::Ntlm => {
            let payload = challenge.strip_prefix("NTLM").map(str::trim).unwrap_or("");
            if payload.is_empty() {
                Ok(ntlm::negotiate_header(&realm.ntlm_domain, &realm.ntlm_host))
            } else {
                let type2 = ntlm::decode_type2_header(payload)?;
                ntlm::authenticate_header(
                    &realm.ntlm_domain,
                    &realm.ntlm_host,
                    &realm.username,
                    &realm.password,
                    &type2,
                )
            }
        }
    }
}
