use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256};

/// Running hash of every handshake message exchanged so far.
///
/// TLS 1.2 signs and verifies against SHA-256; TLS 1.0/1.1 use the
/// concatenated MD5 + SHA-1 pair. All three run in parallel because the
/// protocol version is not known until ServerHello, by which point the
/// ClientHello has already been absorbed.
///
/// Reading a current hash clones the state rather than consuming it, since
/// CertificateVerify hashes a transcript prefix that later messages keep
/// extending.
#[derive(Clone)]
pub struct TranscriptHash {
    sha256: Sha256,
    md5: Md5,
    sha1: Sha1,
}

impl TranscriptHash {
    pub fn new() -> Self {
        TranscriptHash {
            sha256: Sha256::new(),
            md5: Md5::new(),
            sha1: Sha1::new(),
        }
    }

    /// Absorb a complete handshake message, header included.
    pub fn update(&mut self, message: &[u8]) {
        self.sha256.update(message);
        self.md5.update(message);
        self.sha1.update(message);
    }

    /// Current SHA-256 transcript digest (TLS 1.2 signatures).
    pub fn sha256_current(&self) -> [u8; 32] {
        self.sha256.clone().finalize().into()
    }

    /// Current MD5 ‖ SHA-1 transcript digest, 36 bytes (TLS 1.0/1.1
    /// signatures, no DER wrapping).
    pub fn md5_sha1_current(&self) -> [u8; 36] {
        let md5: [u8; 16] = self.md5.clone().finalize().into();
        let sha1: [u8; 20] = self.sha1.clone().finalize().into();
        let mut out = [0u8; 36];
        out[..16].copy_from_slice(&md5);
        out[16..].copy_from_slice(&sha1);
        out
    }

    /// Current SHA-1 transcript digest alone (pre-1.2 ECDSA signs only the
    /// SHA-1 half).
    pub fn sha1_current(&self) -> [u8; 20] {
        self.sha1.clone().finalize().into()
    }

    /// Discard all absorbed messages. Used when a renegotiation handshake
    /// starts a fresh transcript.
    pub fn reset(&mut self) {
        *self = TranscriptHash::new();
    }
}

impl Default for TranscriptHash {
    fn default() -> Self {
        TranscriptHash::new()
    }
}
