//! Hash and cipher primitives for the NTLM handshake.
//!
//! MD4 (RFC 1320) and MD5 (RFC 1321) are implemented inline: MD4 has no
//! place in a general hashing dependency, and NTLM needs both bit-exactly.
//! DES is the single-block ECB variant NTLM uses for its challenge
//! responses, keyed through the 7-to-8-byte parity expansion.
//!
//! Everything here is a pure function of its inputs.

use std::fmt;

/// Failure while deriving NTLM key material.
///
/// The message codec degrades to an LM-only response on any such failure
/// instead of failing the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CryptoError(pub(crate) String);

impl fmt::Display for CryptoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NTLM crypto error: {}", self.0)
    }
}

impl std::error::Error for CryptoError {}

/// UTF-16LE bytes of a string, as NTLM encodes all Unicode fields.
pub(crate) fn utf16le(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
}

// ---------------------------------------------------------------------------
// MD4 / MD5
// ---------------------------------------------------------------------------

/// Merkle-Damgård padding shared by MD4 and MD5: 0x80, zeros to 56 mod 64,
/// then the bit length as little-endian u64.
fn pad_le(data: &[u8]) -> Vec<u8> {
    let bit_len = (data.len() as u64).wrapping_mul(8);
    let mut msg = Vec::with_capacity(data.len() + 72);
    msg.extend_from_slice(data);
    msg.push(0x80);
    while msg.len() % 64 != 56 {
        msg.push(0);
    }
    msg.extend_from_slice(&bit_len.to_le_bytes());
    msg
}

fn le_words(chunk: &[u8]) -> [u32; 16] {
    let mut m = [0u32; 16];
    for (i, word) in m.iter_mut().enumerate() {
        let off = i * 4;
        *word = u32::from_le_bytes([chunk[off], chunk[off + 1], chunk[off + 2], chunk[off + 3]]);
    }
    m
}

/// Compute the MD4 digest of `data` (RFC 1320).
pub fn md4(data: &[u8]) -> [u8; 16] {
    // Round 2 and 3 additive constants.
    const K2: u32 = 0x5a82_7999;
    const K3: u32 = 0x6ed9_eba1;
    // Message word order for rounds 2 and 3.
    const O2: [usize; 16] = [0, 4, 8, 12, 1, 5, 9, 13, 2, 6, 10, 14, 3, 7, 11, 15];
    const O3: [usize; 16] = [0, 8, 4, 12, 2, 10, 6, 14, 1, 9, 5, 13, 3, 11, 7, 15];
    const S1: [u32; 4] = [3, 7, 11, 19];
    const S2: [u32; 4] = [3, 5, 9, 13];
    const S3: [u32; 4] = [3, 9, 11, 15];

    let mut a0: u32 = 0x6745_2301;
    let mut b0: u32 = 0xefcd_ab89;
    let mut c0: u32 = 0x98ba_dcfe;
    let mut d0: u32 = 0x1032_5476;

    for chunk in pad_le(data).chunks_exact(64) {
        let m = le_words(chunk);
        let (mut a, mut b, mut c, mut d) = (a0, b0, c0, d0);

        for i in 0..16 {
            let f = (b & c) | (!b & d);
            let t = a.wrapping_add(f).wrapping_add(m[i]).rotate_left(S1[i % 4]);
            a = d;
            d = c;
            c = b;
            b = t;
        }
        for i in 0..16 {
            let g = (b & c) | (b & d) | (c & d);
            let t = a
                .wrapping_add(g)
                .wrapping_add(m[O2[i]])
                .wrapping_add(K2)
                .rotate_left(S2[i % 4]);
            a = d;
            d = c;
            c = b;
            b = t;
        }
        for i in 0..16 {
            let h = b ^ c ^ d;
            let t = a
                .wrapping_add(h)
                .wrapping_add(m[O3[i]])
                .wrapping_add(K3)
                .rotate_left(S3[i % 4]);
            a = d;
            d = c;
            c = b;
            b = t;
        }

        a0 = a0.wrapping_add(a);
        b0 = b0.wrapping_add(b);
        c0 = c0.wrapping_add(c);
        d0 = d0.wrapping_add(d);
    }

    let mut out = [0u8; 16];
    out[0..4].copy_from_slice(&a0.to_le_bytes());
    out[4..8].copy_from_slice(&b0.to_le_bytes());
    out[8..12].copy_from_slice(&c0.to_le_bytes());
    out[12..16].copy_from_slice(&d0.to_le_bytes());
    out
}

/// Compute the MD5 digest of `data` (RFC 1321).
pub fn md5(data: &[u8]) -> [u8; 16] {
    // Per-round shift amounts.
    const S: [u32; 64] = [
        7, 12, 17, 22, 7, 12, 17, 22, 7, 12, 17, 22, 7, 12, 17, 22, 5, 9, 14, 20, 5, 9, 14, 20, 5,
        9, 14, 20, 5, 9, 14, 20, 4, 11, 16, 23, 4, 11, 16, 23, 4, 11, 16, 23, 4, 11, 16, 23, 6, 10,
        15, 21, 6, 10, 15, 21, 6, 10, 15, 21, 6, 10, 15, 21,
    ];
    // T[i] = floor(2^32 * |sin(i + 1)|).
    const K: [u32; 64] = [
        0xd76aa478, 0xe8c7b756, 0x242070db, 0xc1bdceee, 0xf57c0faf, 0x4787c62a, 0xa8304613,
        0xfd469501, 0x698098d8, 0x8b44f7af, 0xffff5bb1, 0x895cd7be, 0x6b901122, 0xfd987193,
        0xa679438e, 0x49b40821, 0xf61e2562, 0xc040b340, 0x265e5a51, 0xe9b6c7aa, 0xd62f105d,
        0x02441453, 0xd8a1e681, 0xe7d3fbc8, 0x21e1cde6, 0xc33707d6, 0xf4d50d87, 0x455a14ed,
        0xa9e3e905, 0xfcefa3f8, 0x676f02d9, 0x8d2a4c8a, 0xfffa3942, 0x8771f681, 0x6d9d6122,
        0xfde5380c, 0xa4beea44, 0x4bdecfa9, 0xf6bb4b60, 0xbebfbc70, 0x289b7ec6, 0xeaa127fa,
        0xd4ef3085, 0x04881d05, 0xd9d4d039, 0xe6db99e5, 0x1fa27cf8, 0xc4ac5665, 0xf4292244,
        0x432aff97, 0xab9423a7, 0xfc93a039, 0x655b59c3, 0x8f0ccc92, 0xffeff47d, 0x85845dd1,
        0x6fa87e4f, 0xfe2ce6e0, 0xa3014314, 0x4e0811a1, 0xf7537e82, 0xbd3af235, 0x2ad7d2bb,
        0xeb86d391,
    ];

    let mut a0: u32 = 0x6745_2301;
    let mut b0: u32 = 0xefcd_ab89;
    let mut c0: u32 = 0x98ba_dcfe;
    let mut d0: u32 = 0x1032_5476;

    for chunk in pad_le(data).chunks_exact(64) {
        let m = le_words(chunk);
        let (mut a, mut b, mut c, mut d) = (a0, b0, c0, d0);

        for i in 0..64 {
            let (f, g) = match i {
                0..16 => ((b & c) | (!b & d), i),
                16..32 => ((d & b) | (!d & c), (5 * i + 1) % 16),
                32..48 => (b ^ c ^ d, (3 * i + 5) % 16),
                _ => (c ^ (b | !d), (7 * i) % 16),
            };
            let f = f.wrapping_add(a).wrapping_add(K[i]).wrapping_add(m[g]);
            a = d;
            d = c;
            c = b;
            b = b.wrapping_add(f.rotate_left(S[i]));
        }

        a0 = a0.wrapping_add(a);
        b0 = b0.wrapping_add(b);
        c0 = c0.wrapping_add(c);
        d0 = d0.wrapping_add(d);
    }

    let mut out = [0u8; 16];
    out[0..4].copy_from_slice(&a0.to_le_bytes());
    out[4..8].copy_from_slice(&b0.to_le_bytes());
    out[8..12].copy_from_slice(&c0.to_le_bytes());
    out[12..16].copy_from_slice(&d0.to_le_bytes());
    out
}

/// HMAC-MD5 (RFC 2104).
pub fn hmac_md5(key: &[u8], data: &[u8]) -> [u8; 16] {
    let mut block = [0u8; 64];
    if key.len() > 64 {
        block[..16].copy_from_slice(&md5(key));
    } else {
        block[..key.len()].copy_from_slice(key);
    }

    let mut inner = Vec::with_capacity(64 + data.len());
    inner.extend(block.iter().map(|b| b ^ 0x36));
    inner.extend_from_slice(data);
    let inner_digest = md5(&inner);

    let mut outer = Vec::with_capacity(64 + 16);
    outer.extend(block.iter().map(|b| b ^ 0x5c));
    outer.extend_from_slice(&inner_digest);
    md5(&outer)
}

// ---------------------------------------------------------------------------
// DES
// ---------------------------------------------------------------------------

// FIPS 46-3 tables. Bit positions are 1-based from the MSB, as published.

const IP: [u8; 64] = [
    58, 50, 42, 34, 26, 18, 10, 2, 60, 52, 44, 36, 28, 20, 12, 4, 62, 54, 46, 38, 30, 22, 14, 6,
    64, 56, 48, 40, 32, 24, 16, 8, 57, 49, 41, 33, 25, 17, 9, 1, 59, 51, 43, 35, 27, 19, 11, 3,
    61, 53, 45, 37, 29, 21, 13, 5, 63, 55, 47, 39, 31, 23, 15, 7,
];

const FP: [u8; 64] = [
    40, 8, 48, 16, 56, 24, 64, 32, 39, 7, 47, 15, 55, 23, 63, 31, 38, 6, 46, 14, 54, 22, 62, 30,
    37, 5, 45, 13, 53, 21, 61, 29, 36, 4, 44, 12, 52, 20, 60, 28, 35, 3, 43, 11, 51, 19, 59, 27,
    34, 2, 42, 10, 50, 18, 58, 26, 33, 1, 41, 9, 49, 17, 57, 25,
];

const E: [u8; 48] = [
    32, 1, 2, 3, 4, 5, 4, 5, 6, 7, 8, 9, 8, 9, 10, 11, 12, 13, 12, 13, 14, 15, 16, 17, 16, 17, 18,
    19, 20, 21, 20, 21, 22, 23, 24, 25, 24, 25, 26, 27, 28, 29, 28, 29, 30, 31, 32, 1,
];

const P: [u8; 32] = [
    16, 7, 20, 21, 29, 12, 28, 17, 1, 15, 23, 26, 5, 18, 31, 10, 2, 8, 24, 14, 32, 27, 3, 9, 19,
    13, 30, 6, 22, 11, 4, 25,
];

const PC1: [u8; 56] = [
    57, 49, 41, 33, 25, 17, 9, 1, 58, 50, 42, 34, 26, 18, 10, 2, 59, 51, 43, 35, 27, 19, 11, 3,
    60, 52, 44, 36, 63, 55, 47, 39, 31, 23, 15, 7, 62, 54, 46, 38, 30, 22, 14, 6, 61, 53, 45, 37,
    29, 21, 13, 5, 28, 20, 12, 4,
];

const PC2: [u8; 48] = [
    14, 17, 11, 24, 1, 5, 3, 28, 15, 6, 21, 10, 23, 19, 12, 4, 26, 8, 16, 7, 27, 20, 13, 2, 41,
    52, 31, 37, 47, 55, 30, 40, 51, 45, 33, 48, 44, 49, 39, 56, 34, 53, 46, 42, 50, 36, 29, 32,
];

const SHIFTS: [u32; 16] = [1, 1, 2, 2, 2, 2, 2, 2, 1, 2, 2, 2, 2, 2, 2, 1];

#[rustfmt::skip]
const SBOX: [[u8; 64]; 8] = [
    [
        14, 4, 13, 1, 2, 15, 11, 8, 3, 10, 6, 12, 5, 9, 0, 7,
        0, 15, 7, 4, 14, 2, 13, 1, 10, 6, 12, 11, 9, 5, 3, 8,
        4, 1, 14, 8, 13, 6, 2, 11, 15, 12, 9, 7, 3, 10, 5, 0,
        15, 12, 8, 2, 4, 9, 1, 7, 5, 11, 3, 14, 10, 0, 6, 13,
    ],
    [
        15, 1, 8, 14, 6, 11, 3, 4, 9, 7, 2, 13, 12, 0, 5, 10,
        3, 13, 4, 7, 15, 2, 8, 14, 12, 0, 1, 10, 6, 9, 11, 5,
        0, 14, 7, 11, 10, 4, 13, 1, 5, 8, 12, 6, 9, 3, 2, 15,
        13, 8, 10, 1, 3, 15, 4, 2, 11, 6, 7, 12, 0, 5, 14, 9,
    ],
    [
        10, 0, 9, 14, 6, 3, 15, 5, 1, 13, 12, 7, 11, 4, 2, 8,
        13, 7, 0, 9, 3, 4, 6, 10, 2, 8, 5, 14, 12, 11, 15, 1,
        13, 6, 4, 9, 8, 15, 3, 0, 11, 1, 2, 12, 5, 10, 14, 7,
        1, 10, 13, 0, 6, 9, 8, 7, 4, 15, 14, 3, 11, 5, 2, 12,
    ],
    [
        7, 13, 14, 3, 0, 6, 9, 10, 1, 2, 8, 5, 11, 12, 4, 15,
        13, 8, 11, 5, 6, 15, 0, 3, 4, 7, 2, 12, 1, 10, 14, 9,
        10, 6, 9, 0, 12, 11, 7, 13, 15, 1, 3, 14, 5, 2, 8, 4,
        3, 15, 0, 6, 10, 1, 13, 8, 9, 4, 5, 11, 12, 7, 2, 14,
    ],
    [
        2, 12, 4, 1, 7, 10, 11, 6, 8, 5, 3, 15, 13, 0, 14, 9,
        14, 11, 2, 12, 4, 7, 13, 1, 5, 0, 15, 10, 3, 9, 8, 6,
        4, 2, 1, 11, 10, 13, 7, 8, 15, 9, 12, 5, 6, 3, 0, 14,
        11, 8, 12, 7, 1, 14, 2, 13, 6, 15, 0, 9, 10, 4, 5, 3,
    ],
    [
        12, 1, 10, 15, 9, 2, 6, 8, 0, 13, 3, 4, 14, 7, 5, 11,
        10, 15, 4, 2, 7, 12, 9, 5, 6, 1, 13, 14, 0, 11, 3, 8,
        9, 14, 15, 5, 2, 8, 12, 3, 7, 0, 4, 10, 1, 13, 11, 6,
        4, 3, 2, 12, 9, 5, 15, 10, 11, 14, 1, 7, 6, 0, 8, 13,
    ],
    [
        4, 11, 2, 14, 15, 0, 8, 13, 3, 12, 9, 7, 5, 10, 6, 1,
        13, 0, 11, 7, 4, 9, 1, 10, 14, 3, 5, 12, 2, 15, 8, 6,
        1, 4, 11, 13, 12, 3, 7, 14, 10, 15, 6, 8, 0, 5, 9, 2,
        6, 11, 13, 8, 1, 4, 10, 7, 9, 5, 0, 15, 14, 2, 3, 12,
    ],
    [
        13, 2, 8, 4, 6, 15, 11, 1, 10, 9, 3, 14, 5, 0, 12, 7,
        1, 15, 13, 8, 10, 3, 7, 4, 12, 5, 6, 11, 0, 14, 9, 2,
        7, 11, 4, 1, 9, 12, 14, 2, 0, 6, 10, 13, 15, 3, 5, 8,
        2, 1, 14, 7, 4, 10, 8, 13, 15, 12, 9, 0, 3, 5, 6, 11,
    ],
];

/// Apply a published DES permutation table to the top `in_bits` of `input`.
fn permute(input: u64, in_bits: u32, table: &[u8]) -> u64 {
    let mut out = 0u64;
    for &pos in table {
        out = (out << 1) | ((input >> (in_bits - pos as u32)) & 1);
    }
    out
}

fn des_subkeys(key: u64) -> [u64; 16] {
    let pc1 = permute(key, 64, &PC1);
    let mut c = ((pc1 >> 28) & 0x0fff_ffff) as u32;
    let mut d = (pc1 & 0x0fff_ffff) as u32;
    let mut keys = [0u64; 16];
    for (i, &s) in SHIFTS.iter().enumerate() {
        c = ((c << s) | (c >> (28 - s))) & 0x0fff_ffff;
        d = ((d << s) | (d >> (28 - s))) & 0x0fff_ffff;
        let cd = ((c as u64) << 28) | d as u64;
        keys[i] = permute(cd, 56, &PC2);
    }
    keys
}

fn feistel(r: u32, subkey: u64) -> u32 {
    let x = permute(r as u64, 32, &E) ^ subkey;
    let mut out = 0u32;
    for (i, sbox) in SBOX.iter().enumerate() {
        let six = ((x >> (42 - 6 * i)) & 0x3f) as usize;
        let row = ((six & 0x20) >> 4) | (six & 1);
        let col = (six >> 1) & 0x0f;
        out = (out << 4) | sbox[row * 16 + col] as u32;
    }
    permute(out as u64, 32, &P) as u32
}

/// Encrypt a single 8-byte block under an 8-byte DES key (ECB, no padding).
pub fn des_encrypt_block(key: &[u8; 8], block: &[u8; 8]) -> [u8; 8] {
    let subkeys = des_subkeys(u64::from_be_bytes(*key));
    let ip = permute(u64::from_be_bytes(*block), 64, &IP);
    let mut l = (ip >> 32) as u32;
    let mut r = ip as u32;
    for k in subkeys {
        let next = l ^ feistel(r, k);
        l = r;
        r = next;
    }
    let preoutput = ((r as u64) << 32) | l as u64;
    permute(preoutput, 64, &FP).to_be_bytes()
}

/// Expand a 7-byte key half into a parity-adjusted 8-byte DES key.
///
/// Each output byte takes 7 key bits shifted into its top positions, with
/// the low bit set to give the byte odd parity.
pub fn expand_des_key(half: &[u8; 7]) -> [u8; 8] {
    let mut key = [0u8; 8];
    key[0] = half[0];
    for i in 1..7 {
        key[i] = (half[i - 1] << (8 - i)) | (half[i] >> i);
    }
    key[7] = half[6] << 1;
    for b in &mut key {
        let data_ones = (*b >> 1).count_ones();
        *b = if data_ones % 2 == 0 { *b | 1 } else { *b & 0xfe };
    }
    key
}

// ---------------------------------------------------------------------------
// NTLM key material
// ---------------------------------------------------------------------------

/// Split 16-byte hash material (zero-padded to 21) into three DES keys and
/// encrypt the challenge under each: the classic 24-byte LM-style response.
pub fn des_long_response(hash: &[u8; 16], challenge: &[u8; 8]) -> [u8; 24] {
    let mut material = [0u8; 21];
    material[..16].copy_from_slice(hash);

    let mut response = [0u8; 24];
    for i in 0..3 {
        let mut half = [0u8; 7];
        half.copy_from_slice(&material[i * 7..i * 7 + 7]);
        let key = expand_des_key(&half);
        response[i * 8..i * 8 + 8].copy_from_slice(&des_encrypt_block(&key, challenge));
    }
    response
}

/// LM hash: DES-encrypt the magic constant under keys derived from the
/// upper-cased ASCII password, padded or truncated to 14 bytes.
pub fn lm_hash(password: &str) -> Result<[u8; 16], CryptoError> {
    const MAGIC: [u8; 8] = *b"KGS!@#$%";

    let mut key_material = [0u8; 14];
    for (i, ch) in password.to_uppercase().chars().take(14).enumerate() {
        key_material[i] = if ch.is_ascii() { ch as u8 } else { b'?' };
    }

    let mut hash = [0u8; 16];
    for i in 0..2 {
        let mut half = [0u8; 7];
        half.copy_from_slice(&key_material[i * 7..i * 7 + 7]);
        let key = expand_des_key(&half);
        hash[i * 8..i * 8 + 8].copy_from_slice(&des_encrypt_block(&key, &MAGIC));
    }
    Ok(hash)
}

/// NTLM hash: MD4 of the UTF-16LE password.
pub fn ntlm_hash(password: &str) -> [u8; 16] {
    md4(&utf16le(password))
}

/// NTLMv2 hash: HMAC-MD5 keyed by the NTLM hash, over the upper-cased
/// UTF-16LE username followed by the UTF-16LE target.
pub fn ntlmv2_hash(username: &str, target: &str, password: &str) -> [u8; 16] {
    let key = ntlm_hash(password);
    let mut data = utf16le(&username.to_uppercase());
    data.extend_from_slice(&utf16le(target));
    hmac_md5(&key, &data)
}

/// NTLM2 Session Response: MD5 of server nonce + client challenge,
/// truncated to 8 bytes, then used as the challenge for an LM-style DES
/// response over the NTLM hash.
pub fn ntlm2_session_response(
    ntlm_hash: &[u8; 16],
    challenge: &[u8; 8],
    client_challenge: &[u8; 8],
) -> [u8; 24] {
    let mut nonce = [0u8; 16];
    nonce[..8].copy_from_slice(challenge);
    nonce[8..].copy_from_slice(client_challenge);
    let digest = md5(&nonce);
    let mut session_challenge = [0u8; 8];
    session_challenge.copy_from_slice(&digest[..8]);
    des_long_response(ntlm_hash, &session_challenge)
}

/// LMv2 response: HMAC-MD5 over server nonce + client challenge, with the
/// client challenge appended.
pub fn lmv2_response(
    ntlmv2_hash: &[u8; 16],
    challenge: &[u8; 8],
    client_challenge: &[u8; 8],
) -> [u8; 24] {
    let mut data = [0u8; 16];
    data[..8].copy_from_slice(challenge);
    data[8..].copy_from_slice(client_challenge);
    let mac = hmac_md5(ntlmv2_hash, &data);

    let mut response = [0u8; 24];
    response[..16].copy_from_slice(&mac);
    response[16..].copy_from_slice(client_challenge);
    response
}

/// NTLMv2 response: HMAC-MD5 over server nonce + blob, with the blob
/// appended. The blob carries a fixed signature, a Windows-epoch timestamp,
/// the client challenge, and the server's target-info block.
pub fn ntlmv2_response(
    ntlmv2_hash: &[u8; 16],
    challenge: &[u8; 8],
    client_challenge: &[u8; 8],
    timestamp: u64,
    target_info: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    // Security-buffer lengths in the Type 3 message are u16.
    if target_info.len() > u16::MAX as usize - 48 {
        return Err(CryptoError(format!(
            "target-info block too large: {} bytes",
            target_info.len()
        )));
    }

    let mut blob = Vec::with_capacity(32 + target_info.len());
    blob.extend_from_slice(&[0x01, 0x01, 0x00, 0x00]);
    blob.extend_from_slice(&[0x00; 4]);
    blob.extend_from_slice(&timestamp.to_le_bytes());
    blob.extend_from_slice(client_challenge);
    blob.extend_from_slice(&[0x00; 4]);
    blob.extend_from_slice(target_info);
    blob.extend_from_slice(&[0x00; 4]);

    let mut data = Vec::with_capacity(8 + blob.len());
    data.extend_from_slice(challenge);
    data.extend_from_slice(&blob);
    let mac = hmac_md5(ntlmv2_hash, &data);

    let mut response = Vec::with_capacity(16 + blob.len());
    response.extend_from_slice(&mac);
    response.extend_from_slice(&blob);
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn md4_rfc1320_vectors() {
        assert_eq!(hex::encode(md4(b"")), "31d6cfe0d16ae931b73c59d7e0c089c0");
        assert_eq!(hex::encode(md4(b"a")), "bde52cb31de33e46245e05fbdbd6fb24");
        assert_eq!(hex::encode(md4(b"abc")), "a448017aaf21d8525fc10ae87aa6729d");
        assert_eq!(
            hex::encode(md4(b"message digest")),
            "d9130a8164549fe818874806e1c7014b"
        );
        assert_eq!(
            hex::encode(md4(b"abcdefghijklmnopqrstuvwxyz")),
            "d79e1c308aa5bbcdeea8ed63df412da9"
        );
    }

    #[test]
    fn md5_rfc1321_vectors() {
        assert_eq!(hex::encode(md5(b"")), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(hex::encode(md5(b"abc")), "900150983cd24fb0d6963f7d28e17f72");
        assert_eq!(
            hex::encode(md5(b"message digest")),
            "f96b697d7cb7938d525a2f31aaf161d0"
        );
    }

    #[test]
    fn hmac_md5_rfc2202_vectors() {
        assert_eq!(
            hex::encode(hmac_md5(&[0x0b; 16], b"Hi There")),
            "9294727a3638bb1c13f48ef8158bfc9d"
        );
        assert_eq!(
            hex::encode(hmac_md5(b"Jefe", b"what do ya want for nothing?")),
            "750c783e6ab0b503eaa86e310a5db738"
        );
        assert_eq!(
            hex::encode(hmac_md5(&[0xaa; 16], &[0xdd; 50])),
            "56be34521d144c88dbb8c733f0e8b3f6"
        );
    }

    #[test]
    fn des_fips_known_answer() {
        let key = [0x13, 0x34, 0x57, 0x79, 0x9b, 0xbc, 0xdf, 0xf1];
        let plaintext = [0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef];
        assert_eq!(
            des_encrypt_block(&key, &plaintext),
            [0x85, 0xe8, 0x13, 0x54, 0x0f, 0x0a, 0xb4, 0x05]
        );
    }

    #[test]
    fn expand_des_key_parity() {
        let key = expand_des_key(&[0u8; 7]);
        // All-zero key material gives all-parity-bit bytes.
        assert_eq!(key, [1u8; 8]);

        for b in expand_des_key(&[0x13, 0x34, 0x57, 0x79, 0x9b, 0xbc, 0xdf]) {
            assert_eq!(b.count_ones() % 2, 1, "byte {b:#x} has even parity");
        }
    }

    #[test]
    fn lm_hash_known_value() {
        assert_eq!(
            hex::encode(lm_hash("password").unwrap()),
            "e52cac67419a9a224a3b108f3fa6cb6d"
        );
        // Upper-casing happens internally.
        assert_eq!(lm_hash("password").unwrap(), lm_hash("PassWord").unwrap());
    }

    #[test]
    fn ntlm_hash_known_value() {
        assert_eq!(
            hex::encode(ntlm_hash("password")),
            "8846f7eaee8fb117ad06bdd830b7586c"
        );
    }

    #[test]
    fn responses_are_deterministic() {
        let challenge = *b"\x01\x02\x03\x04\x05\x06\x07\x08";
        let client = *b"\xaa\xbb\xcc\xdd\xee\xff\x00\x11";

        let h = ntlm_hash("secret");
        assert_eq!(
            des_long_response(&h, &challenge),
            des_long_response(&h, &challenge)
        );
        assert_eq!(
            ntlm2_session_response(&h, &challenge, &client),
            ntlm2_session_response(&h, &challenge, &client)
        );

        let v2 = ntlmv2_hash("user", "DOMAIN", "secret");
        let a = ntlmv2_response(&v2, &challenge, &client, 0, b"info").unwrap();
        let b = ntlmv2_response(&v2, &challenge, &client, 0, b"info").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn responses_change_with_input() {
        let challenge = *b"\x01\x02\x03\x04\x05\x06\x07\x08";
        let other_challenge = *b"\x01\x02\x03\x04\x05\x06\x07\x09";
        let h = ntlm_hash("secret");
        assert_ne!(
            des_long_response(&h, &challenge),
            des_long_response(&h, &other_challenge)
        );
        assert_ne!(
            des_long_response(&ntlm_hash("secret"), &challenge),
            des_long_response(&ntlm_hash("secret2"), &challenge)
        );
    }

    #[test]
    fn lmv2_layout() {
        let v2 = ntlmv2_hash("user", "TARGET", "pw");
        let challenge = [1u8; 8];
        let client = [2u8; 8];
        let resp = lmv2_response(&v2, &challenge, &client);
        assert_eq!(&resp[16..], &client);
    }

    #[test]
    fn ntlmv2_blob_embeds_target_info() {
        let v2 = ntlmv2_hash("user", "TARGET", "pw");
        let resp = ntlmv2_response(&v2, &[1; 8], &[2; 8], 0x1122334455667788, b"TI").unwrap();
        // mac(16) + blob; blob = sig(4) + reserved(4) + time(8) + client(8)
        //   + unknown(4) + target_info + trailer(4)
        assert_eq!(resp.len(), 16 + 4 + 4 + 8 + 8 + 4 + 2 + 4);
        assert_eq!(&resp[16..20], &[0x01, 0x01, 0x00, 0x00]);
        assert_eq!(&resp[24..32], &0x1122334455667788u64.to_le_bytes());
        assert_eq!(&resp[40..44], &[0, 0, 0, 0]);
        assert_eq!(&resp[44..46], b"TI");
    }
}
