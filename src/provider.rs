//! Crypto capabilities supplied by the surrounding stack.
//!
//! Curve and cipher work happens inline in the processors, but three seams
//! stay pluggable: the RSA private-key operation (the key may live in a
//! secure element), PSK lookup, and the EC-J-PAKE primitive (application
//! supplied, no registry implementation exists).

use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};
use zeroize::Zeroizing;

use crate::error::TlsError;

/// Raw RSA private-key operation: `c^d mod n`, output left-padded to the
/// modulus length. No padding is added or checked here; the callers own the
/// PKCS#1 handling, including the premaster masking path where a padding
/// failure must not change behavior.
pub trait RsaPrivateKeyOps {
    fn modulus_len(&self) -> usize;
    fn raw_private_op(&self, input: &[u8]) -> Result<Zeroizing<Vec<u8>>, TlsError>;
}

impl RsaPrivateKeyOps for RsaPrivateKey {
    fn modulus_len(&self) -> usize {
        (self.n().bits() + 7) / 8
    }

    fn raw_private_op(&self, input: &[u8]) -> Result<Zeroizing<Vec<u8>>, TlsError> {
        let k = self.modulus_len();
        if input.len() > k {
            return Err(TlsError::IncorrectMessageLength);
        }
        let c = BigUint::from_bytes_be(input);
        if c >= *self.n() {
            return Err(TlsError::CryptoFailure("ciphertext out of range".into()));
        }
        let m = c.modpow(self.d(), self.n());
        Ok(Zeroizing::new(left_pad(&m.to_bytes_be(), k)))
    }
}

/// Raw RSA public-key operation: `s^e mod n`, left-padded to the modulus
/// length. Used to recover signature blocks for verification.
pub fn rsa_public_op(key: &RsaPublicKey, input: &[u8]) -> Result<Vec<u8>, TlsError> {
    let k = (key.n().bits() + 7) / 8;
    if input.len() > k {
        return Err(TlsError::SignatureVerificationFailed);
    }
    let s = BigUint::from_bytes_be(input);
    if s >= *key.n() {
        return Err(TlsError::SignatureVerificationFailed);
    }
    let m = s.modpow(key.e(), key.n());
    Ok(left_pad(&m.to_bytes_be(), k))
}

fn left_pad(bytes: &[u8], len: usize) -> Vec<u8> {
    let mut out = vec![0u8; len];
    out[len - bytes.len()..].copy_from_slice(bytes);
    out
}

/// Pre-shared key lookup for PSK suites.
pub trait PskStore {
    /// Resolve a key for the identity (client role: the server's identity
    /// hint; server role: the client's identity). `None` means unknown.
    fn psk_for_identity(&self, identity: &[u8]) -> Option<Zeroizing<Vec<u8>>>;
}

/// Application-supplied EC-J-PAKE primitive. The processors hand it the raw
/// key-exchange payload at the same point the other kinds run their math and
/// take back a 32-byte premaster.
pub trait PakeKeyExchange {
    fn process_client_exchange(&mut self, payload: &[u8]) -> Result<[u8; 32], TlsError>;
    fn process_server_exchange(&mut self, payload: &[u8]) -> Result<[u8; 32], TlsError>;
}

/// Bundle of optional capabilities passed into the key-exchange processors.
#[derive(Default)]
pub struct Capabilities<'a> {
    pub psk: Option<&'a dyn PskStore>,
    pub pake: Option<&'a mut dyn PakeKeyExchange>,
}

impl<'a> Capabilities<'a> {
    pub fn none() -> Self {
        Capabilities::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn raw_private_then_public_op_round_trips() {
        let key = RsaPrivateKey::new(&mut OsRng, 1024).unwrap();
        let public = RsaPublicKey::from(&key);
        let k = key.modulus_len();

        let mut plain = vec![0u8; k];
        plain[0] = 0x00; // keep the value below n
        for (i, b) in plain.iter_mut().enumerate().skip(1) {
            *b = (i * 7) as u8;
        }

        let sig = key.raw_private_op(&plain).unwrap();
        assert_eq!(sig.len(), k);
        let recovered = rsa_public_op(&public, &sig).unwrap();
        assert_eq!(recovered, plain);
    }

    #[test]
    fn oversized_input_is_rejected() {
        let key = RsaPrivateKey::new(&mut OsRng, 1024).unwrap();
        let too_long = vec![0xff; key.modulus_len() + 1];
        assert!(key.raw_private_op(&too_long).is_err());
    }
}
