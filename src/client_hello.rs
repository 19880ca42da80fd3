//! Server-side ClientHello processing (RFC 5246, Section 7.4.1.2).
//!
//! Negotiates protocol version and cipher suite, enforces the renegotiation
//! policy, and captures the client random, session id, and curve offers. The
//! processor parses into locals and commits to the session only after every
//! check has passed, so a malformed hello leaves no partial state behind.

use crate::error::TlsError;
use crate::reader::Reader;
use crate::session::{Session, TLS_VERSION_1_0};
use crate::suite::{
    self, CipherSuiteDescriptor, KeyExchangeKind, SignatureKind, TLS_EMPTY_RENEGOTIATION_INFO_SCSV,
    TLS_FALLBACK_SCSV,
};

/// Extension type ids (RFC 8422 / RFC 5746).
pub const EXTENSION_SUPPORTED_GROUPS: u16 = 0x000a;
pub const EXTENSION_EC_POINT_FORMATS: u16 = 0x000b;
pub const EXTENSION_RENEGOTIATION_INFO: u16 = 0xff01;

/// ClientHello fixed part: version (2) + random (32) + session id length (1)
/// + cipher suite length (2) + compression length (1).
const CLIENT_HELLO_MIN_LEN: usize = 38;

/// Process a ClientHello message body (handshake header already removed).
pub fn process_client_hello(session: &mut Session, message: &[u8]) -> Result<(), TlsError> {
    if message.len() < CLIENT_HELLO_MIN_LEN {
        return Err(TlsError::IncorrectMessageLength);
    }

    // A hello on an established session is a renegotiation request, gated
    // by local policy before any parsing side effects.
    if session.local_session_active {
        if !session.renegotiation_enabled {
            return Err(TlsError::RenegotiationDenied);
        }
        if let Some(callback) = session.renegotiation_callback.as_mut() {
            callback()?;
        }
        session.renegotiation_handshake = true;
        session.local_session_active = false;
        session.remote_certificate = None;
        session.reset_secrets();
    }

    let mut reader = Reader::new(message);

    let offered_version = reader.read_u16()?;
    let negotiated_version = negotiate_version(offered_version)?;

    let mut client_random = [0u8; 32];
    client_random.copy_from_slice(reader.read_bytes(32)?);

    let session_id = reader.read_vec8()?;
    if session_id.len() > 32 {
        return Err(TlsError::IncorrectMessageLength);
    }

    let suite_bytes = reader.read_vec16()?;
    if suite_bytes.is_empty() || suite_bytes.len() % 2 != 0 {
        return Err(TlsError::IncorrectMessageLength);
    }

    let compression_methods = reader.read_vec8()?;
    if !compression_methods.contains(&0) {
        return Err(TlsError::BadCompressionMethod);
    }

    // Extensions are optional, but when present the declared length must
    // account for exactly the rest of the message.
    let mut peer_curves: Vec<u16> = Vec::new();
    let mut secure_renegotiation = false;
    if !reader.is_empty() {
        let extensions_len = reader.read_u16()? as usize;
        if extensions_len != reader.remaining() {
            return Err(TlsError::IncorrectMessageLength);
        }
        parse_extensions(&mut reader, &mut peer_curves, &mut secure_renegotiation)?;
    }

    // Scan the entire offer list: the first acceptable suite wins, but SCSVs
    // further down must still be honored.
    let mut selected: Option<&'static CipherSuiteDescriptor> = None;
    let shared_curves = session.shared_curves_with(&peer_curves);
    for pair in suite_bytes.chunks_exact(2) {
        let id = u16::from_be_bytes([pair[0], pair[1]]);
        match id {
            TLS_EMPTY_RENEGOTIATION_INFO_SCSV => {
                secure_renegotiation = true;
            }
            TLS_FALLBACK_SCSV => {
                // The client fell back from a higher version it supports; if
                // we support a higher one too, this connection is a
                // downgrade attack (RFC 7507).
                if offered_version < Session::newest_supported_version() {
                    return Err(TlsError::InappropriateFallback);
                }
            }
            _ => {
                if selected.is_none() {
                    if let Some(suite) = suite::lookup(id) {
                        if suite_compatible(suite, session, &shared_curves) {
                            selected = Some(suite);
                        }
                    }
                }
            }
        }
    }
    let selected = selected.ok_or(TlsError::NoSupportedCiphers)?;

    // All checks passed; commit.
    session.protocol_version = negotiated_version;
    session.client_random = client_random;
    session.session_id[..session_id.len()].copy_from_slice(session_id);
    session.session_id_len = session_id.len();
    session.suite = Some(selected);
    session.peer_curves = peer_curves;
    session.secure_renegotiation = secure_renegotiation;
    Ok(())
}

/// Pick the highest mutually supported version. Offers above our newest are
/// negotiated down; offers below TLS 1.0 (or non-TLS majors) are rejected.
fn negotiate_version(offered: u16) -> Result<u16, TlsError> {
    if offered >> 8 != 0x03 || offered < TLS_VERSION_1_0 {
        return Err(TlsError::UnsupportedVersion(offered));
    }
    Ok(offered.min(Session::newest_supported_version()))
}

fn parse_extensions(
    reader: &mut Reader<'_>,
    peer_curves: &mut Vec<u16>,
    secure_renegotiation: &mut bool,
) -> Result<(), TlsError> {
    while !reader.is_empty() {
        let extension_type = reader.read_u16()?;
        let data = reader.read_vec16()?;
        match extension_type {
            EXTENSION_SUPPORTED_GROUPS => {
                let mut ext = Reader::new(data);
                let list = ext.read_vec16()?;
                if list.len() % 2 != 0 || !ext.is_empty() {
                    return Err(TlsError::IncorrectMessageLength);
                }
                peer_curves.clear();
                for pair in list.chunks_exact(2) {
                    peer_curves.push(u16::from_be_bytes([pair[0], pair[1]]));
                }
            }
            EXTENSION_EC_POINT_FORMATS => {
                let mut ext = Reader::new(data);
                let formats = ext.read_vec8()?;
                // Uncompressed points are mandatory (RFC 8422, 5.1.2).
                if !formats.contains(&0) {
                    return Err(TlsError::InvalidEccFormat);
                }
            }
            EXTENSION_RENEGOTIATION_INFO => {
                *secure_renegotiation = true;
            }
            // Unknown extensions are skipped by length.
            _ => {}
        }
    }
    Ok(())
}

/// Can this suite actually be served with the local credentials and the
/// curves both sides support?
fn suite_compatible(
    suite: &CipherSuiteDescriptor,
    session: &Session,
    shared_curves: &[u16],
) -> bool {
    match suite.key_exchange {
        KeyExchangeKind::Psk | KeyExchangeKind::EcJpake => true,
        KeyExchangeKind::Rsa => matches!(
            session.local_certificate,
            Some(ref cert) if matches!(cert.key, crate::session::LocalPrivateKey::Rsa(_))
        ),
        KeyExchangeKind::Ecdhe => {
            if shared_curves.is_empty() {
                return false;
            }
            match suite.signature {
                SignatureKind::Rsa => matches!(
                    session.local_certificate,
                    Some(ref cert) if matches!(cert.key, crate::session::LocalPrivateKey::Rsa(_))
                ),
                SignatureKind::Ecdsa => matches!(
                    session.local_certificate,
                    Some(ref cert) if cert.curve.map_or(false, |c| shared_curves.contains(&c))
                ),
                SignatureKind::Anonymous => true,
            }
        }
    }
}
