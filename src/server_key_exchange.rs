//! Client-side ServerKeyExchange processing (RFC 5246, Section 7.4.3;
//! RFC 8422, Section 5.4).
//!
//! For ECDHE suites the server's parameters are authenticated by a signature
//! over client_random ‖ server_random ‖ params made with the certificate
//! key. A signature that does not verify is a hard failure. Once the
//! parameters are trusted, a local ephemeral keypair is generated on the
//! server's curve and the premaster secret is derived immediately; the
//! public half stays in the session for the ClientKeyExchange.

use p256::ecdsa::signature::hazmat::PrehashVerifier;
use zeroize::Zeroize;

use crate::certificate_verify::{
    extract_public_key_from_der, PublicKey, HASH_SHA1, HASH_SHA256, SIG_ECDSA, SIG_RSA,
};
use crate::client_key_exchange::{ecdh_shared_secret, psk_premaster};
use crate::ec_keygen::{
    generate_keypair, signed_digest_md5_sha1, signed_digest_sha1, signed_digest_sha256,
    EC_CURVE_TYPE_NAMED,
};
use crate::error::TlsError;
use crate::pkcs1::{self, DER_PREFIX_SHA1, DER_PREFIX_SHA256};
use crate::provider::{rsa_public_op, Capabilities};
use crate::reader::Reader;
use crate::session::{EcKeyMaterial, Session, TLS_VERSION_1_2};
use crate::suite::KeyExchangeKind;

/// Process a ServerKeyExchange message body, verifying the parameter
/// signature and deriving the premaster secret.
pub fn process_server_key_exchange(
    session: &mut Session,
    message: &[u8],
    caps: &mut Capabilities<'_>,
) -> Result<(), TlsError> {
    let suite = session.negotiated_suite()?;
    match suite.key_exchange {
        KeyExchangeKind::Ecdhe => process_ecdhe(session, message),
        KeyExchangeKind::Psk => process_psk_hint(session, message, caps),
        KeyExchangeKind::EcJpake => {
            let pake = caps
                .pake
                .as_mut()
                .ok_or(TlsError::MissingCapability("EC-J-PAKE exchange"))?;
            let premaster = pake.process_server_exchange(message)?;
            session.set_premaster(premaster.to_vec());
            Ok(())
        }
        // RSA key exchange has no ServerKeyExchange message.
        KeyExchangeKind::Rsa => Err(TlsError::InvalidState(
            "ServerKeyExchange not expected for RSA key exchange",
        )),
    }
}

fn process_ecdhe(session: &mut Session, message: &[u8]) -> Result<(), TlsError> {
    let mut reader = Reader::new(message);

    if reader.read_u8()? != EC_CURVE_TYPE_NAMED {
        return Err(TlsError::InvalidEccFormat);
    }
    let curve = reader.read_u16()?;
    if !session.curve_supported(curve) {
        return Err(TlsError::UnsupportedCurve(curve));
    }
    let peer_point = reader.read_vec8()?;
    if peer_point.is_empty() {
        return Err(TlsError::InvalidPublicKey);
    }
    let params = &message[..reader.position()];

    let cert_der = session
        .remote_certificate
        .as_ref()
        .ok_or(TlsError::CertificateNotFound)?;
    let public_key = extract_public_key_from_der(cert_der)?;
    verify_params_signature(session, params, &mut reader, &public_key)?;
    if !reader.is_empty() {
        return Err(TlsError::IncorrectMessageLength);
    }

    // Parameters are authentic; run our half of the exchange.
    let (private_key, public_point) = generate_keypair(curve)?;
    let premaster = ecdh_shared_secret(curve, &private_key, peer_point)?;
    session.set_premaster(premaster.to_vec());

    // Keep only the public half for the upcoming ClientKeyExchange; the
    // scalar has served its purpose.
    let mut ephemeral = EcKeyMaterial {
        curve,
        private_key,
        public_key: public_point,
    };
    ephemeral.private_key.zeroize();
    ephemeral.private_key.clear();
    session.ephemeral_key = Some(ephemeral);
    Ok(())
}

/// Parse and check the signature trailing the ECDHE parameters, using an
/// already-extracted certificate public key.
pub fn verify_params_signature(
    session: &Session,
    params: &[u8],
    reader: &mut Reader<'_>,
    public_key: &PublicKey,
) -> Result<(), TlsError> {
    let tls12 = session.protocol_version == TLS_VERSION_1_2;

    // TLS 1.2 carries an explicit algorithm pair; earlier versions imply
    // MD5+SHA-1 for RSA certificates and SHA-1 for ECDSA.
    let hash_alg = if tls12 {
        let hash_alg = reader.read_u8()?;
        let sig_alg = reader.read_u8()?;
        let expected_sig = match public_key {
            PublicKey::Rsa(_) => SIG_RSA,
            _ => SIG_ECDSA,
        };
        if sig_alg != expected_sig || !matches!(hash_alg, HASH_SHA1 | HASH_SHA256) {
            return Err(TlsError::UnsupportedSignatureAlgorithm(u16::from_be_bytes(
                [hash_alg, sig_alg],
            )));
        }
        Some(hash_alg)
    } else {
        None
    };
    let signature = reader.read_vec16()?;

    match public_key {
        PublicKey::Rsa(key) => {
            let (prefix, digest): (&[u8], Vec<u8>) = match hash_alg {
                Some(HASH_SHA256) => (
                    DER_PREFIX_SHA256,
                    signed_digest_sha256(session, params).to_vec(),
                ),
                Some(_) => (DER_PREFIX_SHA1, signed_digest_sha1(session, params).to_vec()),
                None => (&[], signed_digest_md5_sha1(session, params).to_vec()),
            };
            let block = rsa_public_op(key, signature)?;
            let payload = pkcs1::strip_type1_block(&block)?;
            let ok = payload.len() == prefix.len() + digest.len()
                && pkcs1::ct_eq(&payload[..prefix.len()], prefix)
                && pkcs1::ct_eq(&payload[prefix.len()..], &digest);
            if !ok {
                return Err(TlsError::SignatureVerificationFailed);
            }
            Ok(())
        }
        PublicKey::EcdsaP256(key) => {
            let digest = ecdsa_digest(session, params, hash_alg);
            let sig = p256::ecdsa::Signature::from_der(signature)
                .map_err(|_| TlsError::SignatureVerificationFailed)?;
            key.verify_prehash(&digest, &sig)
                .map_err(|_| TlsError::SignatureVerificationFailed)
        }
        PublicKey::EcdsaP384(key) => {
            let digest = ecdsa_digest(session, params, hash_alg);
            let sig = p384::ecdsa::Signature::from_der(signature)
                .map_err(|_| TlsError::SignatureVerificationFailed)?;
            key.verify_prehash(&digest, &sig)
                .map_err(|_| TlsError::SignatureVerificationFailed)
        }
    }
}

fn ecdsa_digest(session: &Session, params: &[u8], hash_alg: Option<u8>) -> Vec<u8> {
    match hash_alg {
        Some(HASH_SHA256) => signed_digest_sha256(session, params).to_vec(),
        // Pre-1.2 ECDSA and the explicit SHA-1 pair both sign SHA-1.
        _ => signed_digest_sha1(session, params).to_vec(),
    }
}

/// PSK suites may send a ServerKeyExchange carrying only an identity hint
/// (RFC 4279, Section 2).
fn process_psk_hint(
    session: &mut Session,
    message: &[u8],
    caps: &mut Capabilities<'_>,
) -> Result<(), TlsError> {
    let mut reader = Reader::new(message);
    let hint = reader.read_vec16()?;
    if !reader.is_empty() {
        return Err(TlsError::IncorrectMessageLength);
    }

    let store = caps.psk.ok_or(TlsError::MissingCapability("PSK store"))?;
    let psk = store
        .psk_for_identity(hint)
        .ok_or_else(|| TlsError::CryptoFailure("no matching PSK identity".to_string()))?;

    session.psk_identity_hint = Some(hint.to_vec());
    session.set_premaster(psk_premaster(&psk));
    Ok(())
}
