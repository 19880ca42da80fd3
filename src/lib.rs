//! TLS 1.0–1.2 handshake message processing and record payload protection.
//!
//! This crate implements the session core that sits between a transport and
//! the surrounding handshake driver: ClientHello negotiation,
//! ClientKeyExchange / ServerKeyExchange processing, ephemeral EC key
//! generation, CertificateVerify construction, and CBC/AEAD record
//! protection. Certificate chain validation, the alert layer, and transport
//! I/O are out of scope and belong to the caller.

pub mod certificate_verify;
pub mod client_hello;
pub mod client_key_exchange;
pub mod ec_keygen;
pub mod error;
pub mod packet;
pub mod pkcs1;
pub mod provider;
pub mod reader;
pub mod record;
pub mod server_key_exchange;
pub mod session;
pub mod suite;
pub mod transcript;

pub use certificate_verify::{
    build_certificate_verify, extract_public_key_from_der, verify_certificate_verify,
    verify_certificate_verify_with_key, PublicKey,
};
pub use client_hello::process_client_hello;
pub use client_key_exchange::process_client_key_exchange;
pub use ec_keygen::generate_ephemeral_key;
pub use error::TlsError;
pub use packet::{HeapPool, Packet, PacketChain, PacketPool};
pub use provider::{Capabilities, PakeKeyExchange, PskStore, RsaPrivateKeyOps};
pub use reader::Reader;
pub use record::{decrypt_record, encrypt_record};
pub use server_key_exchange::process_server_key_exchange;
pub use session::{
    EcKeyMaterial, KeyMaterial, LocalCertificate, LocalPrivateKey, PreMasterSecret, Role, Session,
};
pub use suite::CipherSuiteDescriptor;
pub use transcript::TranscriptHash;
