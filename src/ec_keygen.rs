//! Ephemeral EC key generation and ServerKeyExchange parameter encoding
//! (RFC 8422, Section 5.4).
//!
//! Serialized form: `{curve_type=named_curve(3), curve id (2), point length
//! (1), point}`, optionally followed by a signature over
//! client_random ‖ server_random ‖ params. The private scalar is parked in
//! the session for the later ClientKeyExchange and wiped once the premaster
//! is derived.

use md5::Md5;
use p256::ecdsa::signature::hazmat::PrehashSigner;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use rand::rngs::OsRng;
use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::certificate_verify::{HASH_SHA256, SIG_ECDSA, SIG_RSA};
use crate::error::TlsError;
use crate::pkcs1::{self, DER_PREFIX_SHA256};
use crate::provider::RsaPrivateKeyOps;
use crate::session::{
    EcKeyMaterial, LocalPrivateKey, Session, NAMED_CURVE_SECP256R1, NAMED_CURVE_SECP384R1,
    NAMED_CURVE_X25519, TLS_VERSION_1_2,
};

/// ECCurveType value for named curves.
pub const EC_CURVE_TYPE_NAMED: u8 = 3;

/// Generate a fresh ephemeral keypair on `curve`, store it in the session,
/// and serialize the ServerKeyExchange parameter block into `output`. When
/// `sign` is set the block is followed by a signature made with the local
/// certificate's key. Returns the number of bytes written.
pub fn generate_ephemeral_key(
    session: &mut Session,
    curve: u16,
    sign: bool,
    output: &mut [u8],
) -> Result<usize, TlsError> {
    let (private_key, public_point) = generate_keypair(curve)?;

    let params_len = 4 + public_point.len();
    if output.len() < params_len {
        return Err(TlsError::BufferTooSmall {
            needed: params_len,
            available: output.len(),
        });
    }
    output[0] = EC_CURVE_TYPE_NAMED;
    output[1..3].copy_from_slice(&curve.to_be_bytes());
    output[3] = public_point.len() as u8;
    output[4..4 + public_point.len()].copy_from_slice(&public_point);

    session.ephemeral_key = Some(EcKeyMaterial {
        curve,
        private_key,
        public_key: public_point,
    });

    if !sign {
        return Ok(params_len);
    }
    let params = output[..params_len].to_vec();
    let written = sign_params(session, &params, &mut output[params_len..])?;
    Ok(params_len + written)
}

pub(crate) fn generate_keypair(curve: u16) -> Result<(Vec<u8>, Vec<u8>), TlsError> {
    match curve {
        NAMED_CURVE_SECP256R1 => {
            let secret = p256::SecretKey::random(&mut OsRng);
            let public = secret.public_key().to_encoded_point(false);
            Ok((secret.to_bytes().to_vec(), public.as_bytes().to_vec()))
        }
        NAMED_CURVE_SECP384R1 => {
            let secret = p384::SecretKey::random(&mut OsRng);
            let public = secret.public_key().to_encoded_point(false);
            Ok((secret.to_bytes().to_vec(), public.as_bytes().to_vec()))
        }
        NAMED_CURVE_X25519 => {
            let secret = x25519_dalek::StaticSecret::random_from_rng(OsRng);
            let public = x25519_dalek::PublicKey::from(&secret);
            Ok((secret.to_bytes().to_vec(), public.as_bytes().to_vec()))
        }
        other => Err(TlsError::UnsupportedCurve(other)),
    }
}

/// Sign client_random ‖ server_random ‖ params and append
/// `{hash,sig pair (1.2)} {u16 length} {signature}` to `output`.
fn sign_params(
    session: &Session,
    params: &[u8],
    output: &mut [u8],
) -> Result<usize, TlsError> {
    let cert = session
        .local_certificate
        .as_ref()
        .ok_or(TlsError::CertificateNotFound)?;
    let tls12 = session.protocol_version == TLS_VERSION_1_2;

    let signature = match &cert.key {
        LocalPrivateKey::Rsa(key) => {
            let block = if tls12 {
                let digest = signed_digest_sha256(session, params);
                pkcs1::build_type1_block(DER_PREFIX_SHA256, &digest, key.modulus_len())
            } else {
                // TLS 1.0/1.1 RSA signatures cover the raw MD5 ‖ SHA-1 pair.
                let digest = signed_digest_md5_sha1(session, params);
                pkcs1::build_type1_block(&[], &digest, key.modulus_len())
            }
            .map_err(|_| {
                TlsError::InvalidCertificate("RSA modulus too small for signature".to_string())
            })?;
            key.raw_private_op(&block)?.to_vec()
        }
        LocalPrivateKey::EcdsaP256(key) => {
            let digest: Vec<u8> = if tls12 {
                signed_digest_sha256(session, params).to_vec()
            } else {
                signed_digest_sha1(session, params).to_vec()
            };
            let sig: p256::ecdsa::Signature = key
                .sign_prehash(&digest)
                .map_err(|e| TlsError::CryptoFailure(format!("signing failed: {e}")))?;
            sig.to_der().as_bytes().to_vec()
        }
        LocalPrivateKey::EcdsaP384(key) => {
            let digest: Vec<u8> = if tls12 {
                signed_digest_sha256(session, params).to_vec()
            } else {
                signed_digest_sha1(session, params).to_vec()
            };
            let sig: p384::ecdsa::Signature = key
                .sign_prehash(&digest)
                .map_err(|e| TlsError::CryptoFailure(format!("signing failed: {e}")))?;
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

pub(crate) fn signed_digest_sha256(session: &Session, params: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(session.client_random);
    hasher.update(session.server_random);
    hasher.update(params);
    hasher.finalize().into()
}

pub(crate) fn signed_digest_sha1(session: &Session, params: &[u8]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(session.client_random);
    hasher.update(session.server_random);
    hasher.update(params);
    hasher.finalize().into()
}

pub(crate) fn signed_digest_md5_sha1(session: &Session, params: &[u8]) -> [u8; 36] {
    let mut md5 = Md5::new();
    md5.update(session.client_random);
    md5.update(session.server_random);
    md5.update(params);

    let md5_digest: [u8; 16] = md5.finalize().into();
    let mut out = [0u8; 36];
    out[..16].copy_from_slice(&md5_digest);
    out[16..].copy_from_slice(&signed_digest_sha1(session, params));
    out
}
