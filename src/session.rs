use p256::ecdsa::SigningKey as P256SigningKey;
use p384::ecdsa::SigningKey as P384SigningKey;
use rsa::RsaPrivateKey;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::TlsError;
use crate::suite::CipherSuiteDescriptor;
use crate::transcript::TranscriptHash;

pub const TLS_VERSION_1_0: u16 = 0x0301;
pub const TLS_VERSION_1_1: u16 = 0x0302;
pub const TLS_VERSION_1_2: u16 = 0x0303;
pub const TLS_VERSION_1_3: u16 = 0x0304;

/// Versions this implementation can negotiate, newest first.
pub const SUPPORTED_VERSIONS: [u16; 3] = [TLS_VERSION_1_2, TLS_VERSION_1_1, TLS_VERSION_1_0];

pub const NAMED_CURVE_SECP256R1: u16 = 0x0017;
pub const NAMED_CURVE_SECP384R1: u16 = 0x0018;
pub const NAMED_CURVE_X25519: u16 = 0x001d;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// The 48-byte (RSA/ECDHE) or variable-length (PSK) premaster secret.
/// Wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct PreMasterSecret(pub Vec<u8>);

impl std::fmt::Debug for PreMasterSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PreMasterSecret(<redacted>)")
    }
}

/// Expanded per-direction record-protection material. Populated by the key
/// expansion outside this core; the record engine reads it.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyMaterial {
    pub client_write_key: Vec<u8>,
    pub server_write_key: Vec<u8>,
    /// CBC: current chaining IV. GCM: the 4-byte implicit nonce salt.
    pub client_iv: Vec<u8>,
    pub server_iv: Vec<u8>,
    pub client_mac_key: Vec<u8>,
    pub server_mac_key: Vec<u8>,
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KeyMaterial(<redacted>)")
    }
}

/// Ephemeral EC keypair generated for one handshake. The private scalar is
/// wiped on drop and cleared explicitly once the premaster is derived.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EcKeyMaterial {
    pub curve: u16,
    pub private_key: Vec<u8>,
    pub public_key: Vec<u8>,
}

impl std::fmt::Debug for EcKeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EcKeyMaterial")
            .field("curve", &self.curve)
            .field("private_key", &"<redacted>")
            .field("public_key", &hex_preview(&self.public_key))
            .finish()
    }
}

fn hex_preview(bytes: &[u8]) -> String {
    let head: String = bytes.iter().take(8).map(|b| format!("{b:02x}")).collect();
    format!("{head}... ({} bytes)", bytes.len())
}

/// A local signing key, as loaded from the credential store.
pub enum LocalPrivateKey {
    Rsa(RsaPrivateKey),
    EcdsaP256(P256SigningKey),
    EcdsaP384(P384SigningKey),
}

impl std::fmt::Debug for LocalPrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            LocalPrivateKey::Rsa(_) => "Rsa",
            LocalPrivateKey::EcdsaP256(_) => "EcdsaP256",
            LocalPrivateKey::EcdsaP384(_) => "EcdsaP384",
        };
        write!(f, "LocalPrivateKey::{kind}(<redacted>)")
    }
}

/// Local identity: DER certificate plus its private key.
pub struct LocalCertificate {
    pub der: Vec<u8>,
    pub key: LocalPrivateKey,
    /// Named curve of the certificate's public key, for EC certificates.
    pub curve: Option<u16>,
}

/// Per-connection handshake and record-protection state.
///
/// All buffers are owned by the session; nothing is shared between
/// connections. One session is driven from a single task at a time.
pub struct Session {
    pub role: Role,
    /// Negotiated protocol version, 0 until ClientHello processing picks one.
    pub protocol_version: u16,
    /// True once a handshake has completed on this session; a subsequent
    /// ClientHello is then a renegotiation attempt.
    pub local_session_active: bool,
    pub renegotiation_enabled: bool,
    /// True while a renegotiation handshake is in progress.
    pub renegotiation_handshake: bool,
    /// Peer offered the renegotiation-info extension or SCSV.
    pub secure_renegotiation: bool,
    /// Invoked when a renegotiation request arrives and policy allows it;
    /// an error return refuses the handshake.
    pub renegotiation_callback: Option<Box<dyn FnMut() -> Result<(), TlsError> + Send>>,
    pub suite: Option<&'static CipherSuiteDescriptor>,
    pub client_random: [u8; 32],
    pub server_random: [u8; 32],
    pub session_id: [u8; 32],
    pub session_id_len: usize,
    /// Curves we support, in preference order.
    pub supported_curves: Vec<u16>,
    /// Curves the peer offered in the supported_groups extension.
    pub peer_curves: Vec<u16>,
    pub premaster: Option<PreMasterSecret>,
    pub keys: Option<KeyMaterial>,
    /// Outbound record sequence number for each role's write direction.
    pub client_sequence: u64,
    pub server_sequence: u64,
    pub transcript: TranscriptHash,
    pub ephemeral_key: Option<EcKeyMaterial>,
    pub local_certificate: Option<LocalCertificate>,
    pub remote_certificate: Option<Vec<u8>>,
    /// PSK identity hint received in ServerKeyExchange (client role).
    pub psk_identity_hint: Option<Vec<u8>>,
    /// PSK identity received in ClientKeyExchange (server role).
    pub psk_identity: Option<Vec<u8>>,
}

impl Session {
    pub fn new(role: Role) -> Self {
        Session {
            role,
            protocol_version: 0,
            local_session_active: false,
            renegotiation_enabled: true,
            renegotiation_handshake: false,
            secure_renegotiation: false,
            renegotiation_callback: None,
            suite: None,
            client_random: [0u8; 32],
            server_random: [0u8; 32],
            session_id: [0u8; 32],
            session_id_len: 0,
            supported_curves: vec![
                NAMED_CURVE_SECP256R1,
                NAMED_CURVE_SECP384R1,
                NAMED_CURVE_X25519,
            ],
            peer_curves: Vec::new(),
            premaster: None,
            keys: None,
            client_sequence: 0,
            server_sequence: 0,
            transcript: TranscriptHash::new(),
            ephemeral_key: None,
            local_certificate: None,
            remote_certificate: None,
            psk_identity_hint: None,
            psk_identity: None,
        }
    }

    /// The negotiated suite, or an error before negotiation.
    pub fn negotiated_suite(&self) -> Result<&'static CipherSuiteDescriptor, TlsError> {
        self.suite.ok_or(TlsError::UnknownCipherSuite)
    }

    /// Newest protocol version this implementation supports.
    pub fn newest_supported_version() -> u16 {
        SUPPORTED_VERSIONS[0]
    }

    /// True when the given curve id is in our supported set.
    pub fn curve_supported(&self, curve: u16) -> bool {
        self.supported_curves.contains(&curve)
    }

    /// Curves usable for this handshake: ours intersected with the peer's
    /// offer, in our preference order. Before the peer's extension is seen
    /// (or when the peer sent none) our own list stands, per RFC 4492
    /// section 4.
    pub fn shared_curves(&self) -> Vec<u16> {
        self.shared_curves_with(&self.peer_curves)
    }

    /// Same intersection against a peer list not yet committed to the
    /// session (ClientHello processing works on locals until all checks
    /// pass).
    pub fn shared_curves_with(&self, peers: &[u16]) -> Vec<u16> {
        if peers.is_empty() {
            return self.supported_curves.clone();
        }
        self.supported_curves
            .iter()
            .copied()
            .filter(|c| peers.contains(c))
            .collect()
    }

    /// Store the premaster, wiping any previous one.
    pub fn set_premaster(&mut self, secret: Vec<u8>) {
        self.premaster = Some(PreMasterSecret(secret));
    }

    /// Wipe all secret material and negotiation state, keeping the local
    /// credentials and policy flags. Called on teardown and when a
    /// renegotiation handshake resets the connection state.
    pub fn reset_secrets(&mut self) {
        self.premaster = None;
        self.keys = None;
        if let Some(mut eph) = self.ephemeral_key.take() {
            eph.zeroize();
        }
        self.client_sequence = 0;
        self.server_sequence = 0;
        self.transcript.reset();
    }

    /// Record sequence number for the local write direction.
    pub fn local_sequence(&self) -> u64 {
        match self.role {
            Role::Client => self.client_sequence,
            Role::Server => self.server_sequence,
        }
    }

    /// Record sequence number for the peer's write direction.
    pub fn remote_sequence(&self) -> u64 {
        match self.role {
            Role::Client => self.server_sequence,
            Role::Server => self.client_sequence,
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("role", &self.role)
            .field("protocol_version", &format_args!("0x{:04x}", self.protocol_version))
            .field("suite", &self.suite.map(|s| s.id))
            .field("local_session_active", &self.local_session_active)
            .field("client_sequence", &self.client_sequence)
            .field("server_sequence", &self.server_sequence)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_curves_respect_local_preference_order() {
        let mut session = Session::new(Role::Server);
        session.peer_curves = vec![NAMED_CURVE_X25519, NAMED_CURVE_SECP256R1, 0x001e];
        assert_eq!(
            session.shared_curves(),
            vec![NAMED_CURVE_SECP256R1, NAMED_CURVE_X25519]
        );
    }

    #[test]
    fn absent_peer_curve_extension_falls_back_to_local_list() {
        let session = Session::new(Role::Server);
        assert_eq!(session.shared_curves(), session.supported_curves);
    }

    #[test]
    fn reset_wipes_secrets_and_sequences() {
        let mut session = Session::new(Role::Server);
        session.set_premaster(vec![0x42; 48]);
        session.client_sequence = 17;
        session.ephemeral_key = Some(EcKeyMaterial {
            curve: NAMED_CURVE_SECP256R1,
            private_key: vec![1; 32],
            public_key: vec![2; 65],
        });

        session.reset_secrets();
        assert!(session.premaster.is_none());
        assert!(session.ephemeral_key.is_none());
        assert_eq!(session.client_sequence, 0);
    }

    #[test]
    fn secrets_never_leak_through_debug() {
        let secret = PreMasterSecret(vec![0xAA; 48]);
        assert_eq!(format!("{secret:?}"), "PreMasterSecret(<redacted>)");

        let eph = EcKeyMaterial {
            curve: NAMED_CURVE_SECP256R1,
            private_key: vec![0xBB; 32],
            public_key: vec![0x04; 65],
        };
        let rendered = format!("{eph:?}");
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("bb"));
        assert!(rendered.is_ascii());
    }
}
