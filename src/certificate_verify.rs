//! CertificateVerify construction and verification (RFC 5246, Section 7.4.8).
//!
//! The signed material is the running handshake transcript: for TLS 1.2 a
//! SHA-256 digest wrapped in a DER DigestInfo, for TLS 1.0/1.1 the raw
//! 36-byte MD5 ‖ SHA-1 pair with no DER wrapping (RSA), or the SHA-1 half
//! alone (ECDSA).
//!
//! ## Wire format
//!
//! - TLS 1.2: `{hash alg, sig alg}` pair, 2-byte signature length, signature
//! - TLS 1.0/1.1: 2-byte signature length, signature

use p256::ecdsa::{
    signature::hazmat::{PrehashSigner, PrehashVerifier},
    Signature as P256Signature, VerifyingKey as P256VerifyingKey,
};
use p384::ecdsa::{Signature as P384Signature, VerifyingKey as P384VerifyingKey};
use rsa::RsaPublicKey;
use x509_parser::der_parser::asn1_rs::Oid;
use x509_parser::der_parser::oid;
use x509_parser::oid_registry;
use x509_parser::prelude::*;

use crate::error::TlsError;
use crate::pkcs1::{self, DER_PREFIX_SHA256};
use crate::provider::{rsa_public_op, RsaPrivateKeyOps};
use crate::reader::Reader;
use crate::session::{LocalPrivateKey, Session, TLS_VERSION_1_2};

/// HashAlgorithm registry values (RFC 5246, Section 7.4.1.4.1).
pub const HASH_MD5: u8 = 1;
pub const HASH_SHA1: u8 = 2;
pub const HASH_SHA256: u8 = 4;
pub const HASH_SHA384: u8 = 5;

/// SignatureAlgorithm registry values.
pub const SIG_RSA: u8 = 1;
pub const SIG_ECDSA: u8 = 3;

/// OID for P-384 curve (secp384r1): 1.3.132.0.34
/// Not available in x509_parser::oid_registry as of version 0.16.
const OID_EC_P384: Oid<'static> = oid!(1.3.132 .0 .34);

/// Public key types extracted from X.509 certificates.
#[derive(Debug, Clone)]
pub enum PublicKey {
    Rsa(RsaPublicKey),
    EcdsaP256(P256VerifyingKey),
    EcdsaP384(P384VerifyingKey),
}

/// Extract the SubjectPublicKeyInfo key from a DER-encoded certificate.
pub fn extract_public_key_from_der(cert_data: &[u8]) -> Result<PublicKey, TlsError> {
    let (_, cert) = X509Certificate::from_der(cert_data)
        .map_err(|e| TlsError::InvalidCertificate(format!("failed to parse certificate: {e}")))?;

    let spki = cert.public_key();
    let algorithm_oid = &spki.algorithm.algorithm;

    if algorithm_oid == &oid_registry::OID_PKCS1_RSAENCRYPTION {
        parse_rsa_public_key(&spki.subject_public_key.data)
    } else if algorithm_oid == &oid_registry::OID_KEY_TYPE_EC_PUBLIC_KEY {
        parse_ecdsa_public_key(spki)
    } else {
        Err(TlsError::InvalidCertificate(format!(
            "unsupported public key algorithm: {algorithm_oid:?}"
        )))
    }
}

fn parse_rsa_public_key(key_data: &[u8]) -> Result<PublicKey, TlsError> {
    use rsa::pkcs1::DecodeRsaPublicKey;
    use rsa::pkcs8::DecodePublicKey;

    // The SPKI bit string typically carries a PKCS#1 RSAPublicKey, but some
    // encoders nest a full SubjectPublicKeyInfo.
    match RsaPublicKey::from_pkcs1_der(key_data) {
        Ok(key) => Ok(PublicKey::Rsa(key)),
        Err(_) => RsaPublicKey::from_public_key_der(key_data)
            .map(PublicKey::Rsa)
            .map_err(|e| {
                TlsError::InvalidCertificate(format!("failed to parse RSA public key: {e}"))
            }),
    }
}

fn parse_ecdsa_public_key(spki: &SubjectPublicKeyInfo) -> Result<PublicKey, TlsError> {
    let curve_oid = match &spki.algorithm.parameters {
        Some(params) => params.as_oid().map_err(|e| {
            TlsError::InvalidCertificate(format!("failed to parse curve OID: {e}"))
        })?,
        None => {
            return Err(TlsError::InvalidCertificate(
                "missing curve parameters for EC key".to_string(),
            ))
        }
    };

    let key_data = &spki.subject_public_key.data;

    if curve_oid == oid_registry::OID_EC_P256 {
        P256VerifyingKey::from_sec1_bytes(key_data)
            .map(PublicKey::EcdsaP256)
            .map_err(|e| {
                TlsError::InvalidCertificate(format!("failed to parse P-256 public key: {e}"))
            })
    } else if curve_oid == OID_EC_P384 {
        P384VerifyingKey::from_sec1_bytes(key_data)
            .map(PublicKey::EcdsaP384)
            .map_err(|e| {
                TlsError::InvalidCertificate(format!("failed to parse P-384 public key: {e}"))
            })
    } else {
        Err(TlsError::InvalidCertificate(format!(
            "unsupported elliptic curve: {curve_oid:?}"
        )))
    }
}

/// Build the CertificateVerify message body into `output`, returning the
/// number of bytes written.
///
/// The transcript must already contain every handshake message up to and
/// including the ClientKeyExchange; this proves possession of the private
/// key matching the certificate sent earlier.
pub fn build_certificate_verify(session: &Session, output: &mut [u8]) -> Result<usize, TlsError> {
    let cert = session
        .local_certificate
        .as_ref()
        .ok_or(TlsError::CertificateNotFound)?;
    let tls12 = session.protocol_version == TLS_VERSION_1_2;

    let signature = match &cert.key {
        LocalPrivateKey::Rsa(key) => {
            // TLS 1.2 wraps the SHA-256 transcript digest in a DigestInfo;
            // earlier versions sign the bare 36-byte MD5 ‖ SHA-1 pair.
            let block = if tls12 {
                let digest = session.transcript.sha256_current();
                pkcs1::build_type1_block(DER_PREFIX_SHA256, &digest, key.modulus_len())
            } else {
                let digest = session.transcript.md5_sha1_current();
                pkcs1::build_type1_block(&[], &digest, key.modulus_len())
            };
            // A modulus too small for digest plus encoding is unusable for
            // this handshake; surface that, never truncate.
            let block = block.map_err(|_| {
                TlsError::InvalidCertificate("RSA modulus too small for signature".to_string())
            })?;
            key.raw_private_op(&block)?.to_vec()
        }
        LocalPrivateKey::EcdsaP256(key) => {
            let sig: P256Signature = if tls12 {
                sign_prehash(key, &session.transcript.sha256_current())?
            } else {
                sign_prehash(key, &session.transcript.sha1_current())?
            };
            sig.to_der().as_bytes().to_vec()
        }
        LocalPrivateKey::EcdsaP384(key) => {
            let sig: P384Signature = if tls12 {
                sign_prehash(key, &session.transcript.sha256_current())?
            } else {
                sign_prehash(key, &session.transcript.sha1_current())?
            };
            sig.to_der().as_bytes().to_vec()
        }
    };

    let pair_len = if tls12 { 2 } else { 0 };
    let total = pair_len + 2 + signature.len();
    if output.len() < total {
        return Err(TlsError::BufferTooSmall {
            needed: total,
            available: output.len(),
        });
    }

    let mut offset = 0;
    if tls12 {
        output[0] = HASH_SHA256;
        output[1] = match cert.key {
            LocalPrivateKey::Rsa(_) => SIG_RSA,
            _ => SIG_ECDSA,
        };
        offset = 2;
    }
    output[offset..offset + 2].copy_from_slice(&(signature.len() as u16).to_be_bytes());
    offset += 2;
    output[offset..offset + signature.len()].copy_from_slice(&signature);
    Ok(offset + signature.len())
}

fn sign_prehash<K, S>(key: &K, digest: &[u8]) -> Result<S, TlsError>
where
    K: PrehashSigner<S>,
{
    key.sign_prehash(digest)
        .map_err(|e| TlsError::CryptoFailure(format!("signing failed: {e}")))
}

/// Verify a peer's CertificateVerify message body against its certificate
/// and the current transcript. Used by a server checking a client's proof of
/// possession in mutual authentication.
pub fn verify_certificate_verify(
    session: &Session,
    message: &[u8],
    peer_cert_der: &[u8],
) -> Result<(), TlsError> {
    let public_key = extract_public_key_from_der(peer_cert_der)?;
    verify_certificate_verify_with_key(session, message, &public_key)
}

/// Same as [`verify_certificate_verify`] for callers that already hold the
/// peer's parsed public key.
pub fn verify_certificate_verify_with_key(
    session: &Session,
    message: &[u8],
    public_key: &PublicKey,
) -> Result<(), TlsError> {
    let tls12 = session.protocol_version == TLS_VERSION_1_2;
    let mut reader = Reader::new(message);

    let expected_pair = if tls12 {
        let hash_alg = reader.read_u8()?;
        let sig_alg = reader.read_u8()?;
        if hash_alg != HASH_SHA256 {
            return Err(TlsError::UnsupportedSignatureAlgorithm(u16::from_be_bytes(
                [hash_alg, sig_alg],
            )));
        }
        Some(sig_alg)
    } else {
        None
    };
    let signature = reader.read_vec16()?;
    if !reader.is_empty() {
        return Err(TlsError::IncorrectMessageLength);
    }

    match public_key {
        PublicKey::Rsa(key) => {
            if expected_pair.is_some_and(|sig| sig != SIG_RSA) {
                return Err(TlsError::SignatureVerificationFailed);
            }
            let block = rsa_public_op(key, signature)?;
            let payload = pkcs1::strip_type1_block(&block)?;
            let matches = if tls12 {
                let digest = session.transcript.sha256_current();
                payload.len() == DER_PREFIX_SHA256.len() + digest.len()
                    && pkcs1::ct_eq(&payload[..DER_PREFIX_SHA256.len()], DER_PREFIX_SHA256)
                    && pkcs1::ct_eq(&payload[DER_PREFIX_SHA256.len()..], &digest)
            } else {
                pkcs1::ct_eq(payload, &session.transcript.md5_sha1_current())
            };
            if !matches {
                return Err(TlsError::SignatureVerificationFailed);
            }
            Ok(())
        }
        PublicKey::EcdsaP256(key) => {
            if expected_pair.is_some_and(|sig| sig != SIG_ECDSA) {
                return Err(TlsError::SignatureVerificationFailed);
            }
            let sig = P256Signature::from_der(signature)
                .map_err(|_| TlsError::SignatureVerificationFailed)?;
            let digest: Vec<u8> = if tls12 {
                session.transcript.sha256_current().to_vec()
            } else {
                session.transcript.sha1_current().to_vec()
            };
            key.verify_prehash(&digest, &sig)
                .map_err(|_| TlsError::SignatureVerificationFailed)
        }
        PublicKey::EcdsaP384(key) => {
            if expected_pair.is_some_and(|sig| sig != SIG_ECDSA) {
                return Err(TlsError::SignatureVerificationFailed);
            }
            let sig = P384Signature::from_der(signature)
                .map_err(|_| TlsError::SignatureVerificationFailed)?;
            let digest: Vec<u8> = if tls12 {
                session.transcript.sha256_current().to_vec()
            } else {
                session.transcript.sha1_current().to_vec()
            };
            key.verify_prehash(&digest, &sig)
                .map_err(|_| TlsError::SignatureVerificationFailed)
        }
    }
}
