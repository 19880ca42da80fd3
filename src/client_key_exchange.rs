//! Server-side ClientKeyExchange processing (RFC 5246, Section 7.4.7).
//!
//! Recovers the premaster secret for whichever key exchange the session
//! negotiated. The RSA path implements the countermeasure from RFC 5246,
//! Section 7.4.7.1: a PKCS#1 padding fault is never reported. Instead the
//! premaster is silently replaced with random bytes and the handshake
//! continues; a forged ciphertext then fails at Finished verification, which
//! is indistinguishable from a wrong premaster guess.

use rand::{rngs::OsRng, RngCore};
use subtle::{Choice, ConditionallySelectable, ConstantTimeEq};
use zeroize::Zeroizing;

use crate::error::TlsError;
use crate::provider::{Capabilities, RsaPrivateKeyOps};
use crate::reader::Reader;
use crate::session::{
    LocalPrivateKey, Session, NAMED_CURVE_SECP256R1, NAMED_CURVE_SECP384R1, NAMED_CURVE_X25519,
};
use crate::suite::KeyExchangeKind;

/// Process a ClientKeyExchange message body and store the premaster secret
/// in the session.
pub fn process_client_key_exchange(
    session: &mut Session,
    message: &[u8],
    caps: &mut Capabilities<'_>,
) -> Result<(), TlsError> {
    let suite = session.negotiated_suite()?;
    match suite.key_exchange {
        KeyExchangeKind::Rsa => process_rsa(session, message),
        KeyExchangeKind::Ecdhe => process_ecdhe(session, message),
        KeyExchangeKind::Psk => process_psk(session, message, caps),
        KeyExchangeKind::EcJpake => {
            let pake = caps
                .pake
                .as_mut()
                .ok_or(TlsError::MissingCapability("EC-J-PAKE exchange"))?;
            let premaster = pake.process_client_exchange(message)?;
            session.set_premaster(premaster.to_vec());
            Ok(())
        }
    }
}

/// RSA key exchange: decrypt the 48-byte premaster from the client's
/// PKCS#1 v1.5 ciphertext.
fn process_rsa(session: &mut Session, message: &[u8]) -> Result<(), TlsError> {
    let mut reader = Reader::new(message);
    let ciphertext = reader
        .read_vec16()
        .map_err(|_| TlsError::IncorrectMessageLength)?;

    let cert = session
        .local_certificate
        .as_ref()
        .ok_or(TlsError::CertificateNotFound)?;
    let key = match &cert.key {
        LocalPrivateKey::Rsa(key) => key,
        _ => {
            return Err(TlsError::InvalidCertificate(
                "RSA key exchange requires an RSA private key".to_string(),
            ))
        }
    };

    let block = key.raw_private_op(ciphertext)?;
    let k = block.len();

    // Constant-time padding check: 00 02 <nonzero filler> 00 <48-byte
    // premaster>. The delimiter position is fixed because the premaster
    // length is fixed.
    let mut padding_ok = Choice::from((k >= 51) as u8);
    if k >= 51 {
        padding_ok &= block[0].ct_eq(&0x00);
        padding_ok &= block[1].ct_eq(&0x02);
        padding_ok &= block[k - 49].ct_eq(&0x00);
    }

    // Select between the decrypted premaster and fresh random bytes without
    // branching on the padding result.
    let mut substitute = [0u8; 48];
    random_nonzero(&mut substitute);
    let mut premaster = Zeroizing::new(vec![0u8; 48]);
    for i in 0..48 {
        let real = if k >= 51 { block[k - 48 + i] } else { 0 };
        premaster[i] = u8::conditional_select(&substitute[i], &real, padding_ok);
    }

    session.set_premaster(premaster.to_vec());
    Ok(())
}

/// ECDHE key exchange: run the agreement between the client's public point
/// and the ephemeral private key generated for ServerKeyExchange.
fn process_ecdhe(session: &mut Session, message: &[u8]) -> Result<(), TlsError> {
    let mut reader = Reader::new(message);
    let peer_point = reader.read_vec8()?;

    let ephemeral = session
        .ephemeral_key
        .take()
        .ok_or(TlsError::InvalidState("no ephemeral key for ECDHE"))?;

    let premaster = ecdh_shared_secret(ephemeral.curve, &ephemeral.private_key, peer_point)?;
    // EcKeyMaterial wipes the scalar on drop.
    drop(ephemeral);

    session.set_premaster(premaster.to_vec());
    Ok(())
}

/// Shared-secret computation for the supported named curves.
pub(crate) fn ecdh_shared_secret(
    curve: u16,
    private_key: &[u8],
    peer_point: &[u8],
) -> Result<Zeroizing<Vec<u8>>, TlsError> {
    match curve {
        NAMED_CURVE_SECP256R1 => {
            let secret = p256::SecretKey::from_slice(private_key)
                .map_err(|_| TlsError::CryptoFailure("bad P-256 scalar".to_string()))?;
            let peer = p256::PublicKey::from_sec1_bytes(peer_point)
                .map_err(|_| TlsError::InvalidPublicKey)?;
            let shared =
                p256::ecdh::diffie_hellman(secret.to_nonzero_scalar(), peer.as_affine());
            Ok(Zeroizing::new(shared.raw_secret_bytes().to_vec()))
        }
        NAMED_CURVE_SECP384R1 => {
            let secret = p384::SecretKey::from_slice(private_key)
                .map_err(|_| TlsError::CryptoFailure("bad P-384 scalar".to_string()))?;
            let peer = p384::PublicKey::from_sec1_bytes(peer_point)
                .map_err(|_| TlsError::InvalidPublicKey)?;
            let shared =
                p384::ecdh::diffie_hellman(secret.to_nonzero_scalar(), peer.as_affine());
            Ok(Zeroizing::new(shared.raw_secret_bytes().to_vec()))
        }
        NAMED_CURVE_X25519 => {
            let scalar: [u8; 32] = private_key
                .try_into()
                .map_err(|_| TlsError::CryptoFailure("bad x25519 scalar".to_string()))?;
            let point: [u8; 32] = peer_point
                .try_into()
                .map_err(|_| TlsError::InvalidPublicKey)?;
            let secret = x25519_dalek::StaticSecret::from(scalar);
            let shared = secret.diffie_hellman(&x25519_dalek::PublicKey::from(point));
            Ok(Zeroizing::new(shared.as_bytes().to_vec()))
        }
        other => Err(TlsError::UnsupportedCurve(other)),
    }
}

/// PSK key exchange: the premaster is zeros-then-key per RFC 4279,
/// Section 2.
fn process_psk(
    session: &mut Session,
    message: &[u8],
    caps: &mut Capabilities<'_>,
) -> Result<(), TlsError> {
    let mut reader = Reader::new(message);
    let identity = reader.read_vec16()?;

    let store = caps.psk.ok_or(TlsError::MissingCapability("PSK store"))?;
    let psk = store
        .psk_for_identity(identity)
        .ok_or_else(|| TlsError::CryptoFailure("no matching PSK identity".to_string()))?;

    session.psk_identity = Some(identity.to_vec());
    session.set_premaster(psk_premaster(&psk));
    Ok(())
}

/// `[len(psk)] ‖ zeros(len(psk)) ‖ [len(psk)] ‖ psk` with 2-byte lengths.
pub(crate) fn psk_premaster(psk: &[u8]) -> Vec<u8> {
    let len = psk.len() as u16;
    let mut premaster = Vec::with_capacity(4 + 2 * psk.len());
    premaster.extend_from_slice(&len.to_be_bytes());
    premaster.extend_from_slice(&vec![0u8; psk.len()]);
    premaster.extend_from_slice(&len.to_be_bytes());
    premaster.extend_from_slice(psk);
    premaster
}

/// Fill with random bytes, none of them zero.
fn random_nonzero(out: &mut [u8]) {
    let mut rng = OsRng;
    for b in out.iter_mut() {
        loop {
            let candidate = (rng.next_u32() & 0xff) as u8;
            if candidate != 0 {
                *b = candidate;
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::PskStore;
    use crate::session::Role;
    use crate::suite;

    struct OnePsk;
    impl PskStore for OnePsk {
        fn psk_for_identity(&self, identity: &[u8]) -> Option<Zeroizing<Vec<u8>>> {
            (identity == b"device-7").then(|| Zeroizing::new(b"secret-key".to_vec()))
        }
    }

    #[test]
    fn psk_premaster_framing() {
        let premaster = psk_premaster(b"abcd");
        assert_eq!(
            premaster,
            [0, 4, 0, 0, 0, 0, 0, 4, b'a', b'b', b'c', b'd']
        );
    }

    #[test]
    fn psk_exchange_resolves_identity() {
        let mut session = Session::new(Role::Server);
        session.suite = suite::lookup(0x00ae);

        let mut message = Vec::new();
        message.extend_from_slice(&(8u16).to_be_bytes());
        message.extend_from_slice(b"device-7");

        let mut caps = Capabilities {
            psk: Some(&OnePsk),
            pake: None,
        };
        process_client_key_exchange(&mut session, &message, &mut caps).unwrap();
        assert_eq!(session.psk_identity.as_deref(), Some(&b"device-7"[..]));
        assert_eq!(
            session.premaster.as_ref().unwrap().0,
            psk_premaster(b"secret-key")
        );
    }

    #[test]
    fn psk_without_store_is_a_missing_capability() {
        let mut session = Session::new(Role::Server);
        session.suite = suite::lookup(0x00ae);
        let message = [0x00, 0x01, 0x61];
        let err = process_client_key_exchange(&mut session, &message, &mut Capabilities::none())
            .unwrap_err();
        assert_eq!(err, TlsError::MissingCapability("PSK store"));
    }

    #[test]
    fn ecdhe_without_generated_key_is_invalid_state() {
        let mut session = Session::new(Role::Server);
        session.suite = suite::lookup(0xc02f);
        let mut message = vec![65u8];
        message.extend_from_slice(&[0x04; 65]);
        let err = process_client_key_exchange(&mut session, &message, &mut Capabilities::none())
            .unwrap_err();
        assert_eq!(err, TlsError::InvalidState("no ephemeral key for ECDHE"));
    }

    #[test]
    fn x25519_agreement_matches_both_directions() {
        let a_scalar = [0x11u8; 32];
        let b_scalar = [0x42u8; 32];
        let a_public =
            x25519_dalek::PublicKey::from(&x25519_dalek::StaticSecret::from(a_scalar));
        let b_public =
            x25519_dalek::PublicKey::from(&x25519_dalek::StaticSecret::from(b_scalar));

        let ab = ecdh_shared_secret(NAMED_CURVE_X25519, &a_scalar, b_public.as_bytes()).unwrap();
        let ba = ecdh_shared_secret(NAMED_CURVE_X25519, &b_scalar, a_public.as_bytes()).unwrap();
        assert_eq!(ab.to_vec(), ba.to_vec());
    }

    #[test]
    fn truncated_rsa_ciphertext_is_a_length_error() {
        let mut session = Session::new(Role::Server);
        session.suite = suite::lookup(0x002f);
        // Declared 256-byte ciphertext, only 3 bytes present.
        let message = [0x01, 0x00, 0xaa, 0xbb, 0xcc];
        let err = process_client_key_exchange(&mut session, &message, &mut Capabilities::none())
            .unwrap_err();
        assert_eq!(err, TlsError::IncorrectMessageLength);
    }
}
