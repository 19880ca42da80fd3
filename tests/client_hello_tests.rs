use rand::rngs::OsRng;
use rsa::RsaPrivateKey;

use tls_session::client_hello::process_client_hello;
use tls_session::session::{
    LocalCertificate, LocalPrivateKey, Role, Session, NAMED_CURVE_SECP256R1,
    NAMED_CURVE_SECP384R1, TLS_VERSION_1_0, TLS_VERSION_1_2,
};
use tls_session::TlsError;

fn build_hello(version: u16, session_id: &[u8], suites: &[u16], extensions: &[u8]) -> Vec<u8> {
    let mut msg = Vec::new();
    msg.extend_from_slice(&version.to_be_bytes());
    msg.extend_from_slice(&[0xc1; 32]);
    msg.push(session_id.len() as u8);
    msg.extend_from_slice(session_id);
    msg.extend_from_slice(&((suites.len() * 2) as u16).to_be_bytes());
    for id in suites {
        msg.extend_from_slice(&id.to_be_bytes());
    }
    msg.extend_from_slice(&[1, 0]);
    if !extensions.is_empty() {
        msg.extend_from_slice(&(extensions.len() as u16).to_be_bytes());
        msg.extend_from_slice(extensions);
    }
    msg
}

fn supported_groups_extension(curves: &[u16]) -> Vec<u8> {
    let mut ext = vec![0x00, 0x0a];
    ext.extend_from_slice(&((curves.len() * 2 + 2) as u16).to_be_bytes());
    ext.extend_from_slice(&((curves.len() * 2) as u16).to_be_bytes());
    for c in curves {
        ext.extend_from_slice(&c.to_be_bytes());
    }
    ext
}

fn server_with_rsa_cert() -> Session {
    let mut session = Session::new(Role::Server);
    let key = RsaPrivateKey::new(&mut OsRng, 512).unwrap();
    session.local_certificate = Some(LocalCertificate {
        der: Vec::new(),
        key: LocalPrivateKey::Rsa(key),
        curve: None,
    });
    session
}

fn server_with_ecdsa_cert(curve: u16) -> Session {
    let mut session = Session::new(Role::Server);
    session.local_certificate = Some(LocalCertificate {
        der: Vec::new(),
        key: LocalPrivateKey::EcdsaP256(p256::ecdsa::SigningKey::random(&mut OsRng)),
        curve: Some(curve),
    });
    session
}

#[test]
fn rsa_only_certificate_skips_ecdsa_suites() {
    // Client prefers an ECDSA suite, but the server only holds an RSA
    // certificate: the scan must fall through to TLS_RSA_WITH_AES_128_CBC_SHA.
    let mut session = server_with_rsa_cert();
    let msg = build_hello(
        TLS_VERSION_1_2,
        &[],
        &[0xc02b, 0x002f],
        &supported_groups_extension(&[NAMED_CURVE_SECP256R1]),
    );
    process_client_hello(&mut session, &msg).unwrap();
    assert_eq!(session.suite.unwrap().id, 0x002f);
}

#[test]
fn ecdsa_certificate_on_shared_curve_enables_ecdhe_ecdsa() {
    let mut session = server_with_ecdsa_cert(NAMED_CURVE_SECP256R1);
    let msg = build_hello(
        TLS_VERSION_1_2,
        &[],
        &[0xc02b, 0x00ae],
        &supported_groups_extension(&[NAMED_CURVE_SECP256R1]),
    );
    process_client_hello(&mut session, &msg).unwrap();
    assert_eq!(session.suite.unwrap().id, 0xc02b);
}

#[test]
fn ecdsa_certificate_on_unshared_curve_is_skipped() {
    // The certificate lives on P-384 but the client only offers P-256, so
    // the ECDSA suite is unusable and the PSK suite wins.
    let mut session = server_with_ecdsa_cert(NAMED_CURVE_SECP384R1);
    let msg = build_hello(
        TLS_VERSION_1_2,
        &[],
        &[0xc02b, 0x00ae],
        &supported_groups_extension(&[NAMED_CURVE_SECP256R1]),
    );
    process_client_hello(&mut session, &msg).unwrap();
    assert_eq!(session.suite.unwrap().id, 0x00ae);
}

#[test]
fn ecdhe_rsa_without_shared_curve_falls_back_to_plain_rsa() {
    // ECDHE-RSA is the client's first choice, but its curve list has no
    // overlap with ours, so the scan must settle on the plain-RSA suite.
    let mut session = server_with_rsa_cert();
    let msg = build_hello(
        TLS_VERSION_1_2,
        &[],
        &[0xc02f, 0x002f],
        &supported_groups_extension(&[0x001e]),
    );
    process_client_hello(&mut session, &msg).unwrap();
    assert_eq!(session.suite.unwrap().id, 0x002f);
}

#[test]
fn ecdhe_rsa_without_curve_extension_uses_local_curve_list() {
    // No supported_groups extension means the client takes whatever curves
    // we pick (RFC 4492, section 4), so ECDHE-RSA stays servable.
    let mut session = server_with_rsa_cert();
    let msg = build_hello(TLS_VERSION_1_2, &[], &[0xc02f, 0x002f], &[]);
    process_client_hello(&mut session, &msg).unwrap();
    assert_eq!(session.suite.unwrap().id, 0xc02f);
}

#[test]
fn first_acceptable_suite_in_client_order_wins() {
    let mut session = server_with_rsa_cert();
    let msg = build_hello(TLS_VERSION_1_2, &[], &[0x0035, 0x002f], &[]);
    process_client_hello(&mut session, &msg).unwrap();
    assert_eq!(session.suite.unwrap().id, 0x0035);
}

#[test]
fn session_id_and_random_are_captured() {
    let mut session = server_with_rsa_cert();
    let session_id = [0x7e; 24];
    let msg = build_hello(TLS_VERSION_1_2, &session_id, &[0x002f], &[]);
    process_client_hello(&mut session, &msg).unwrap();
    assert_eq!(session.client_random, [0xc1; 32]);
    assert_eq!(session.session_id_len, 24);
    assert_eq!(&session.session_id[..24], &session_id);
}

#[test]
fn oversized_session_id_is_rejected() {
    let mut session = server_with_rsa_cert();
    // Hand-build with a 33-byte session id.
    let mut msg = Vec::new();
    msg.extend_from_slice(&TLS_VERSION_1_2.to_be_bytes());
    msg.extend_from_slice(&[0; 32]);
    msg.push(33);
    msg.extend_from_slice(&[0xaa; 33]);
    msg.extend_from_slice(&[0x00, 0x02, 0x00, 0x2f]);
    msg.extend_from_slice(&[1, 0]);
    assert_eq!(
        process_client_hello(&mut session, &msg),
        Err(TlsError::IncorrectMessageLength)
    );
}

#[test]
fn truncated_messages_never_panic_and_fail_closed() {
    let full = build_hello(
        TLS_VERSION_1_2,
        &[0x7e; 8],
        &[0xc02b, 0x002f],
        &supported_groups_extension(&[NAMED_CURVE_SECP256R1]),
    );
    for len in 0..full.len() {
        let mut session = server_with_rsa_cert();
        let result = process_client_hello(&mut session, &full[..len]);
        // The only prefix that parses is one ending exactly after the
        // compression list (a hello without extensions). Everything shorter
        // or mid-field must error without committing state.
        if result.is_err() {
            assert!(session.suite.is_none());
            assert_eq!(session.protocol_version, 0);
        }
    }
}

#[test]
fn cipher_suite_length_overrunning_message_is_rejected() {
    let mut session = server_with_rsa_cert();
    let mut msg = Vec::new();
    msg.extend_from_slice(&TLS_VERSION_1_2.to_be_bytes());
    msg.extend_from_slice(&[0; 32]);
    msg.push(0);
    // Claims 200 bytes of suites, supplies 2.
    msg.extend_from_slice(&[0x00, 0xc8, 0x00, 0x2f]);
    assert_eq!(
        process_client_hello(&mut session, &msg),
        Err(TlsError::BufferUnderflow)
    );
}

#[test]
fn version_below_tls10_is_rejected() {
    let mut session = server_with_rsa_cert();
    let msg = build_hello(0x0300, &[], &[0x002f], &[]);
    assert_eq!(
        process_client_hello(&mut session, &msg),
        Err(TlsError::UnsupportedVersion(0x0300))
    );
}

#[test]
fn tls10_client_negotiates_tls10() {
    let mut session = server_with_rsa_cert();
    let msg = build_hello(TLS_VERSION_1_0, &[], &[0x002f], &[]);
    process_client_hello(&mut session, &msg).unwrap();
    assert_eq!(session.protocol_version, TLS_VERSION_1_0);
}

#[test]
fn renegotiation_frees_remote_certificate_and_resets_secrets() {
    let mut session = server_with_rsa_cert();
    session.local_session_active = true;
    session.remote_certificate = Some(vec![0x30, 0x82]);
    session.set_premaster(vec![0x42; 48]);
    session.client_sequence = 9;

    let msg = build_hello(TLS_VERSION_1_2, &[], &[0x002f], &[]);
    process_client_hello(&mut session, &msg).unwrap();

    assert!(session.renegotiation_handshake);
    assert!(session.remote_certificate.is_none());
    assert!(session.premaster.is_none());
    assert_eq!(session.client_sequence, 0);
}
