use std::fmt;

/// Errors surfaced by the handshake processors and the record protection
/// engine.
///
/// Every error here is terminal for the session: the caller is expected to
/// map it to a fatal alert and tear the connection down. Conditions that are
/// recoverable in-protocol (an absent optional extension, for example) never
/// produce a `TlsError`.
///
/// There is deliberately no variant for invalid RSA premaster padding. A
/// ClientKeyExchange with bad PKCS#1 padding is absorbed by substituting
/// random secret material (RFC 5246, section 7.4.7.1) so the handshake
/// proceeds identically on the wire; the mismatch only becomes observable
/// through the later Finished verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlsError {
    /// A length field inside a handshake message is inconsistent with the
    /// message bound, or the message is shorter than its fixed header.
    IncorrectMessageLength,
    /// A read ran past the end of the input buffer.
    BufferUnderflow,
    /// The peer's protocol version is not TLS at all, or no mutually
    /// supported version exists. Carries the rejected version field.
    UnsupportedVersion(u16),
    /// None of the offered cipher suites is supported and compatible with
    /// the local credentials.
    NoSupportedCiphers,
    /// The session's suite id is not in the registry, or no suite has been
    /// negotiated yet.
    UnknownCipherSuite,
    /// The named curve is not supported. Carries the curve id.
    UnsupportedCurve(u16),
    /// The compression-method list does not contain the null method.
    BadCompressionMethod,
    /// TLS_FALLBACK_SCSV was offered while the client's version is below the
    /// newest version this implementation supports (RFC 7507).
    InappropriateFallback,
    /// A ClientHello arrived on an active session and renegotiation is not
    /// permitted by policy.
    RenegotiationDenied,
    /// The wire format of an ECC parameter block is not understood. Only
    /// named_curve(3) is supported.
    InvalidEccFormat,
    /// A peer public key failed point or length validation.
    InvalidPublicKey,
    /// A hash/signature algorithm pair outside the supported set. Carries
    /// the raw pair.
    UnsupportedSignatureAlgorithm(u16),
    /// Signature verification failed. No further detail is exposed.
    SignatureVerificationFailed,
    /// A certificate could not be parsed, or its key is unusable for the
    /// requested operation.
    InvalidCertificate(String),
    /// An operation requiring a certificate found none in the session.
    CertificateNotFound,
    /// An output buffer cannot hold the data to be written. Always a hard
    /// error, never silent truncation.
    BufferTooSmall { needed: usize, available: usize },
    /// Record payload exceeds the protocol maximum.
    RecordTooLarge(usize),
    /// The per-direction 64-bit sequence number would wrap.
    SequenceNumberOverflow,
    /// AEAD open failed, or CBC padding/MAC verification failed on an
    /// inbound record.
    DecryptionFailed,
    /// The cipher backend rejected an encryption request.
    EncryptionFailed,
    /// An operation was invoked in a handshake state that does not admit it.
    InvalidState(&'static str),
    /// A crypto primitive failed for a reason other than verification.
    CryptoFailure(String),
    /// A required capability (PSK store, PAKE exchange) was not supplied.
    MissingCapability(&'static str),
}

impl fmt::Display for TlsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TlsError::IncorrectMessageLength => write!(f, "message length inconsistent"),
            TlsError::BufferUnderflow => write!(f, "read past end of buffer"),
            TlsError::UnsupportedVersion(v) => write!(f, "unsupported protocol version 0x{v:04x}"),
            TlsError::NoSupportedCiphers => write!(f, "no mutually supported cipher suite"),
            TlsError::UnknownCipherSuite => write!(f, "cipher suite not negotiated"),
            TlsError::UnsupportedCurve(c) => write!(f, "unsupported named curve 0x{c:04x}"),
            TlsError::BadCompressionMethod => write!(f, "null compression method not offered"),
            TlsError::InappropriateFallback => write!(f, "inappropriate fallback signalled"),
            TlsError::RenegotiationDenied => write!(f, "renegotiation not permitted"),
            TlsError::InvalidEccFormat => write!(f, "unsupported ECC parameter format"),
            TlsError::InvalidPublicKey => write!(f, "invalid public key"),
            TlsError::UnsupportedSignatureAlgorithm(a) => {
                write!(f, "unsupported signature algorithm 0x{a:04x}")
            }
            TlsError::SignatureVerificationFailed => write!(f, "signature verification failed"),
            TlsError::InvalidCertificate(msg) => write!(f, "invalid certificate: {msg}"),
            TlsError::CertificateNotFound => write!(f, "no certificate available"),
            TlsError::BufferTooSmall { needed, available } => {
                write!(f, "buffer too small: need {needed} bytes, have {available}")
            }
            TlsError::RecordTooLarge(len) => write!(f, "record too large: {len} bytes"),
            TlsError::SequenceNumberOverflow => write!(f, "record sequence number exhausted"),
            TlsError::DecryptionFailed => write!(f, "record decryption failed"),
            TlsError::EncryptionFailed => write!(f, "record encryption failed"),
            TlsError::InvalidState(what) => write!(f, "invalid state: {what}"),
            TlsError::CryptoFailure(msg) => write!(f, "crypto failure: {msg}"),
            TlsError::MissingCapability(what) => write!(f, "missing capability: {what}"),
        }
    }
}

impl std::error::Error for TlsError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_diagnostic_payload() {
        let err = TlsError::UnsupportedVersion(0x0305);
        assert_eq!(err.to_string(), "unsupported protocol version 0x0305");

        let err = TlsError::BufferTooSmall {
            needed: 256,
            available: 100,
        };
        assert_eq!(err.to_string(), "buffer too small: need 256 bytes, have 100");
    }

    #[test]
    fn errors_are_comparable() {
        assert_eq!(TlsError::BufferUnderflow, TlsError::BufferUnderflow);
        assert_ne!(
            TlsError::UnsupportedCurve(0x0017),
            TlsError::UnsupportedCurve(0x0018)
        );
    }
}
