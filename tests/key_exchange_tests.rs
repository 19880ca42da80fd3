use p256::elliptic_curve::sec1::ToEncodedPoint;
use rand::rngs::OsRng;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};

use tls_session::certificate_verify::{HASH_SHA256, SIG_RSA};
use tls_session::client_key_exchange::process_client_key_exchange;
use tls_session::ec_keygen::{generate_ephemeral_key, EC_CURVE_TYPE_NAMED};
use tls_session::pkcs1::{self, DER_PREFIX_SHA256};
use tls_session::provider::{Capabilities, RsaPrivateKeyOps};
use tls_session::server_key_exchange::verify_params_signature;
use tls_session::session::{
    LocalCertificate, LocalPrivateKey, Role, Session, NAMED_CURVE_SECP256R1, NAMED_CURVE_X25519,
    TLS_VERSION_1_2,
};
use tls_session::{suite, PublicKey, Reader, TlsError};

fn rsa_server(bits: usize) -> (Session, RsaPublicKey) {
    let key = RsaPrivateKey::new(&mut OsRng, bits).unwrap();
    let public = RsaPublicKey::from(&key);
    let mut session = Session::new(Role::Server);
    session.protocol_version = TLS_VERSION_1_2;
    session.suite = suite::lookup(0x002f);
    session.local_certificate = Some(LocalCertificate {
        der: Vec::new(),
        key: LocalPrivateKey::Rsa(key),
        curve: None,
    });
    (session, public)
}

#[test]
fn ecdhe_p256_premaster_matches_client_computation() {
    let mut server = Session::new(Role::Server);
    server.suite = suite::lookup(0xc02f);
    server.protocol_version = TLS_VERSION_1_2;

    // Server emits its ephemeral parameters.
    let mut params = [0u8; 128];
    let written =
        generate_ephemeral_key(&mut server, NAMED_CURVE_SECP256R1, false, &mut params).unwrap();
    assert_eq!(params[0], EC_CURVE_TYPE_NAMED);
    let server_point = &params[4..written];

    // Client runs its half against the server's point.
    let client_secret = p256::SecretKey::random(&mut OsRng);
    let client_point = client_secret.public_key().to_encoded_point(false);
    let server_public = p256::PublicKey::from_sec1_bytes(server_point).unwrap();
    let expected = p256::ecdh::diffie_hellman(
        client_secret.to_nonzero_scalar(),
        server_public.as_affine(),
    );

    // ClientKeyExchange body: one length byte then the client's point.
    let mut message = vec![client_point.as_bytes().len() as u8];
    message.extend_from_slice(client_point.as_bytes());
    process_client_key_exchange(&mut server, &message, &mut Capabilities::none()).unwrap();

    assert_eq!(
        server.premaster.as_ref().unwrap().0,
        expected.raw_secret_bytes().to_vec()
    );
    // The ephemeral private key is gone once the premaster exists.
    assert!(server.ephemeral_key.is_none());
}

#[test]
fn ecdhe_x25519_premaster_matches_client_computation() {
    let mut server = Session::new(Role::Server);
    server.suite = suite::lookup(0xc02f);
    server.protocol_version = TLS_VERSION_1_2;

    let mut params = [0u8; 64];
    let written =
        generate_ephemeral_key(&mut server, NAMED_CURVE_X25519, false, &mut params).unwrap();
    let server_point: [u8; 32] = params[4..written].try_into().unwrap();

    let client_secret = x25519_dalek::StaticSecret::random_from_rng(OsRng);
    let client_point = x25519_dalek::PublicKey::from(&client_secret);
    let expected = client_secret.diffie_hellman(&x25519_dalek::PublicKey::from(server_point));

    let mut message = vec![32u8];
    message.extend_from_slice(client_point.as_bytes());
    process_client_key_exchange(&mut server, &message, &mut Capabilities::none()).unwrap();

    assert_eq!(server.premaster.as_ref().unwrap().0, expected.as_bytes());
}

#[test]
fn rsa_valid_ciphertext_recovers_premaster() {
    let (mut session, public) = rsa_server(1024);

    let mut premaster = [0u8; 48];
    premaster[0] = 0x03;
    premaster[1] = 0x03;
    for (i, b) in premaster.iter_mut().enumerate().skip(2) {
        *b = i as u8;
    }
    let ciphertext = public
        .encrypt(&mut OsRng, Pkcs1v15Encrypt, &premaster)
        .unwrap();

    let mut message = Vec::new();
    message.extend_from_slice(&(ciphertext.len() as u16).to_be_bytes());
    message.extend_from_slice(&ciphertext);

    process_client_key_exchange(&mut session, &message, &mut Capabilities::none()).unwrap();
    assert_eq!(session.premaster.as_ref().unwrap().0, premaster);
}

#[test]
fn rsa_bad_padding_is_masked_not_reported() {
    let (mut session, public) = rsa_server(1024);
    let k = 128;

    // A ciphertext whose decryption starts 0x00 0x01: valid RSA math, bad
    // key-exchange padding.
    let mut bogus_plain = vec![0xee_u8; k];
    bogus_plain[0] = 0x00;
    bogus_plain[1] = 0x01;
    let ciphertext = tls_session::provider::rsa_public_op(&public, &bogus_plain).unwrap();

    let mut message = Vec::new();
    message.extend_from_slice(&(ciphertext.len() as u16).to_be_bytes());
    message.extend_from_slice(&ciphertext);

    // Identical observable outcome to the valid case: success, and a
    // 48-byte premaster.
    process_client_key_exchange(&mut session, &message, &mut Capabilities::none()).unwrap();
    let premaster = &session.premaster.as_ref().unwrap().0;
    assert_eq!(premaster.len(), 48);
    // The decrypted tail must NOT have been accepted.
    assert_ne!(premaster[..], bogus_plain[k - 48..]);
}

#[test]
fn rsa_masked_premasters_differ_between_attempts() {
    let (mut first, public) = rsa_server(1024);
    let mut bogus_plain = vec![0x55_u8; 128];
    bogus_plain[0] = 0x00;
    bogus_plain[1] = 0x01;
    let ciphertext = tls_session::provider::rsa_public_op(&public, &bogus_plain).unwrap();
    let mut message = Vec::new();
    message.extend_from_slice(&(ciphertext.len() as u16).to_be_bytes());
    message.extend_from_slice(&ciphertext);

    process_client_key_exchange(&mut first, &message, &mut Capabilities::none()).unwrap();
    let a = first.premaster.as_ref().unwrap().0.clone();

    // Same ciphertext against a fresh session with the same key material
    // must yield a different random substitute.
    let mut second = Session::new(Role::Server);
    second.protocol_version = TLS_VERSION_1_2;
    second.suite = suite::lookup(0x002f);
    second.local_certificate = first.local_certificate.take();
    process_client_key_exchange(&mut second, &message, &mut Capabilities::none()).unwrap();
    let b = &second.premaster.as_ref().unwrap().0;

    assert_ne!(&a, b);
}

#[test]
fn ecdsa_params_signature_round_trip_and_bit_flip() {
    let signing_key = p256::ecdsa::SigningKey::random(&mut OsRng);
    let verifying_key = PublicKey::EcdsaP256(*signing_key.verifying_key());

    let mut server = Session::new(Role::Server);
    server.protocol_version = TLS_VERSION_1_2;
    server.client_random = [0x13; 32];
    server.server_random = [0x37; 32];
    server.local_certificate = Some(LocalCertificate {
        der: Vec::new(),
        key: LocalPrivateKey::EcdsaP256(signing_key),
        curve: Some(NAMED_CURVE_SECP256R1),
    });

    let mut body = [0u8; 512];
    let written =
        generate_ephemeral_key(&mut server, NAMED_CURVE_SECP256R1, true, &mut body).unwrap();
    let params_len = 4 + 65;

    // The verifying side sees the same randoms.
    let mut client = Session::new(Role::Client);
    client.protocol_version = TLS_VERSION_1_2;
    client.client_random = [0x13; 32];
    client.server_random = [0x37; 32];

    let mut reader = Reader::new(&body[params_len..written]);
    verify_params_signature(&client, &body[..params_len], &mut reader, &verifying_key).unwrap();

    // One flipped bit anywhere in the signature must fail verification.
    let mut tampered = body;
    tampered[written - 1] ^= 0x01;
    let mut reader = Reader::new(&tampered[params_len..written]);
    assert_eq!(
        verify_params_signature(&client, &tampered[..params_len], &mut reader, &verifying_key),
        Err(TlsError::SignatureVerificationFailed)
    );
}

#[test]
fn rsa_params_signature_round_trip_and_digest_mismatch() {
    let key = RsaPrivateKey::new(&mut OsRng, 1024).unwrap();
    let public = PublicKey::Rsa(RsaPublicKey::from(&key));

    let mut client = Session::new(Role::Client);
    client.protocol_version = TLS_VERSION_1_2;
    client.client_random = [0xaa; 32];
    client.server_random = [0xbb; 32];

    let params = [EC_CURVE_TYPE_NAMED, 0x00, 0x1d, 0x02, 0x04, 0x05];

    // Signature over client_random || server_random || params.
    let digest = {
        use sha2::{Digest, Sha256};
        let mut h = Sha256::new();
        h.update(client.client_random);
        h.update(client.server_random);
        h.update(params);
        h.finalize()
    };
    let block = pkcs1::build_type1_block(DER_PREFIX_SHA256, &digest, key.modulus_len()).unwrap();
    let signature = key.raw_private_op(&block).unwrap();

    let mut trailer = vec![HASH_SHA256, SIG_RSA];
    trailer.extend_from_slice(&(signature.len() as u16).to_be_bytes());
    trailer.extend_from_slice(&signature);

    let mut reader = Reader::new(&trailer);
    verify_params_signature(&client, &params, &mut reader, &public).unwrap();

    // A different server random changes the digest: rejection.
    client.server_random = [0xbc; 32];
    let mut reader = Reader::new(&trailer);
    assert_eq!(
        verify_params_signature(&client, &params, &mut reader, &public),
        Err(TlsError::SignatureVerificationFailed)
    );
}

#[test]
fn tls12_signature_pair_mismatch_is_rejected() {
    let signing_key = p256::ecdsa::SigningKey::random(&mut OsRng);
    let verifying_key = PublicKey::EcdsaP256(*signing_key.verifying_key());

    let client = {
        let mut s = Session::new(Role::Client);
        s.protocol_version = TLS_VERSION_1_2;
        s
    };

    // Pair claims RSA against an ECDSA certificate key.
    let trailer = [HASH_SHA256, SIG_RSA, 0x00, 0x00];
    let mut reader = Reader::new(&trailer);
    assert_eq!(
        verify_params_signature(&client, &[0u8; 4], &mut reader, &verifying_key),
        Err(TlsError::UnsupportedSignatureAlgorithm(u16::from_be_bytes([
            HASH_SHA256,
            SIG_RSA
        ]))),
    );
}
