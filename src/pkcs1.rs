//! PKCS#1 v1.5 signature block construction and parsing.
//!
//! Signature blocks are assembled tail-first into a buffer sized exactly to
//! the RSA modulus: digest at the high end, DER DigestInfo prefix before it,
//! then 0xFF filler and the leading `00 01` type octets. A modulus too small
//! to hold digest + encoding is a hard error, never a truncated block.

use subtle::ConstantTimeEq;

use crate::error::TlsError;

/// DER DigestInfo prefix for MD5 (RFC 8017, appendix A.2.4 notation).
pub const DER_PREFIX_MD5: &[u8] = &[
    0x30, 0x20, 0x30, 0x0c, 0x06, 0x08, 0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x02, 0x05, 0x05,
    0x00, 0x04, 0x10,
];

/// DER DigestInfo prefix for SHA-1.
pub const DER_PREFIX_SHA1: &[u8] = &[
    0x30, 0x21, 0x30, 0x09, 0x06, 0x05, 0x2b, 0x0e, 0x03, 0x02, 0x1a, 0x05, 0x00, 0x04, 0x14,
];

/// DER DigestInfo prefix for SHA-256.
pub const DER_PREFIX_SHA256: &[u8] = &[
    0x30, 0x31, 0x30, 0x0d, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x01,
    0x05, 0x00, 0x04, 0x20,
];

/// DER DigestInfo prefix for SHA-384.
pub const DER_PREFIX_SHA384: &[u8] = &[
    0x30, 0x41, 0x30, 0x0d, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x02,
    0x05, 0x00, 0x04, 0x30,
];

/// Build an EMSA-PKCS1-v1_5 block of exactly `modulus_len` bytes around
/// `der_prefix ‖ digest`. For TLS 1.0/1.1 RSA signatures `der_prefix` is
/// empty and the raw 36-byte digest pair is encoded directly.
pub fn build_type1_block(
    der_prefix: &[u8],
    digest: &[u8],
    modulus_len: usize,
) -> Result<Vec<u8>, TlsError> {
    let mut block = vec![0u8; modulus_len];
    let mut offset = modulus_len;

    // Work backward from the end of the block.
    if digest.len() > offset {
        return Err(TlsError::BufferTooSmall {
            needed: digest.len(),
            available: offset,
        });
    }
    offset -= digest.len();
    block[offset..offset + digest.len()].copy_from_slice(digest);

    if der_prefix.len() > offset {
        return Err(TlsError::BufferTooSmall {
            needed: der_prefix.len() + digest.len(),
            available: modulus_len,
        });
    }
    offset -= der_prefix.len();
    block[offset..offset + der_prefix.len()].copy_from_slice(der_prefix);

    // Need room for 00 01, the filler, and the 00 separator; RFC 8017
    // requires at least 8 filler octets.
    if offset < 11 {
        return Err(TlsError::BufferTooSmall {
            needed: der_prefix.len() + digest.len() + 11,
            available: modulus_len,
        });
    }
    offset -= 1;
    block[offset] = 0x00;
    for b in &mut block[2..offset] {
        *b = 0xff;
    }
    block[0] = 0x00;
    block[1] = 0x01;
    Ok(block)
}

/// Strip the EMSA-PKCS1-v1_5 framing from a decrypted signature block,
/// returning the DigestInfo-plus-digest payload. Used when verifying a peer
/// signature, where timing is not premaster-sensitive; failures surface as
/// `SignatureVerificationFailed`.
pub fn strip_type1_block(block: &[u8]) -> Result<&[u8], TlsError> {
    if block.len() < 11 || block[0] != 0x00 || block[1] != 0x01 {
        return Err(TlsError::SignatureVerificationFailed);
    }
    let mut i = 2;
    while i < block.len() && block[i] == 0xff {
        i += 1;
    }
    // At least 8 filler octets, then the 00 separator.
    if i < 10 || i >= block.len() || block[i] != 0x00 {
        return Err(TlsError::SignatureVerificationFailed);
    }
    Ok(&block[i + 1..])
}

/// Constant-time equality for digest material.
pub fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && bool::from(a.ct_eq(b))
}
