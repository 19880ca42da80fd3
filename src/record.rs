//! Record payload protection (RFC 5246, Section 6.2.3).
//!
//! CBC suites: MAC-then-encrypt. The record MAC is appended, TLS padding
//! brings the payload to a block multiple, and the whole chain is encrypted
//! in place block by block. A scratch block carries bytes across packet
//! boundaries, so a record split over several non-contiguous buffers is
//! encrypted without copying it together. TLS 1.1+ prepend an explicit
//! random IV; TLS 1.0 chains the previous record's last ciphertext block.
//! After every record the session write IV becomes the final ciphertext
//! block.
//!
//! AEAD suites (AES-GCM, AES-CCM_8): nonce is the 4-byte implicit salt
//! followed by the 8-byte record sequence number, which is also sent as the
//! explicit nonce. The additional data is seq ‖ type ‖ version ‖ length.
//! CCM_8 truncates the tag to 8 bytes (RFC 6655).
//!
//! Either way the write sequence number increments exactly once per record.

use aes_gcm::aead::{Aead, AeadInPlace, KeyInit as AeadKeyInit, Nonce, Payload};
use aes_gcm::Aes128Gcm;
use cipher::generic_array::GenericArray;
use cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::error::TlsError;
use crate::packet::{PacketChain, PacketPool};
use crate::session::{Role, Session, TLS_VERSION_1_0};
use crate::suite::{BulkKind, HashKind};

pub const CONTENT_CHANGE_CIPHER_SPEC: u8 = 20;
pub const CONTENT_ALERT: u8 = 21;
pub const CONTENT_HANDSHAKE: u8 = 22;
pub const CONTENT_APPLICATION_DATA: u8 = 23;

/// Maximum plaintext fragment length (RFC 5246, Section 6.2.1).
pub const MAX_PLAINTEXT_LEN: usize = 16384;

const AES_BLOCK: usize = 16;
const EXPLICIT_NONCE_LEN: usize = 8;

type Aes128Ccm8 = ccm::Ccm<aes::Aes128, ccm::consts::U8, ccm::consts::U12>;
type HmacSha1 = Hmac<Sha1>;
type HmacSha256 = Hmac<Sha256>;

struct WriteKeys {
    key: Zeroizing<Vec<u8>>,
    iv: Zeroizing<Vec<u8>>,
    mac_key: Zeroizing<Vec<u8>>,
}

/// Snapshot one direction's key material out of the session so the record
/// body can be borrowed mutably alongside it.
fn direction_keys(session: &Session, local: bool) -> Result<WriteKeys, TlsError> {
    let keys = session
        .keys
        .as_ref()
        .ok_or(TlsError::InvalidState("no record key material"))?;
    let client_side = match (session.role, local) {
        (Role::Client, true) | (Role::Server, false) => true,
        _ => false,
    };
    Ok(if client_side {
        WriteKeys {
            key: Zeroizing::new(keys.client_write_key.clone()),
            iv: Zeroizing::new(keys.client_iv.clone()),
            mac_key: Zeroizing::new(keys.client_mac_key.clone()),
        }
    } else {
        WriteKeys {
            key: Zeroizing::new(keys.server_write_key.clone()),
            iv: Zeroizing::new(keys.server_iv.clone()),
            mac_key: Zeroizing::new(keys.server_mac_key.clone()),
        }
    })
}

fn store_direction_iv(session: &mut Session, local: bool, iv: &[u8]) {
    if let Some(keys) = session.keys.as_mut() {
        let client_side = matches!(
            (session.role, local),
            (Role::Client, true) | (Role::Server, false)
        );
        if client_side {
            keys.client_iv.clear();
            keys.client_iv.extend_from_slice(iv);
        } else {
            keys.server_iv.clear();
            keys.server_iv.extend_from_slice(iv);
        }
    }
}

fn bump_sequence(seq: &mut u64) -> Result<u64, TlsError> {
    let current = *seq;
    *seq = seq.checked_add(1).ok_or(TlsError::SequenceNumberOverflow)?;
    Ok(current)
}

/// The MAC'd / authenticated pseudo-header:
/// seq (8) ‖ type (1) ‖ version (2) ‖ length (2).
fn record_header(seq: u64, record_type: u8, version: u16, length: usize) -> [u8; 13] {
    let mut header = [0u8; 13];
    header[..8].copy_from_slice(&seq.to_be_bytes());
    header[8] = record_type;
    header[9..11].copy_from_slice(&version.to_be_bytes());
    header[11..13].copy_from_slice(&(length as u16).to_be_bytes());
    header
}

/// Record MAC for CBC suites: HMAC over the pseudo-header and fragment.
fn compute_record_mac(
    hash: HashKind,
    mac_key: &[u8],
    seq: u64,
    record_type: u8,
    version: u16,
    fragment: &[u8],
) -> Result<Vec<u8>, TlsError> {
    let header = record_header(seq, record_type, version, fragment.len());
    match hash {
        HashKind::Sha1 => {
            let mut mac = <HmacSha1 as Mac>::new_from_slice(mac_key)
                .map_err(|_| TlsError::CryptoFailure("bad MAC key length".to_string()))?;
            mac.update(&header);
            mac.update(fragment);
            Ok(mac.finalize().into_bytes().to_vec())
        }
        HashKind::Sha256 | HashKind::Sha384 => {
            let mut mac = <HmacSha256 as Mac>::new_from_slice(mac_key)
                .map_err(|_| TlsError::CryptoFailure("bad MAC key length".to_string()))?;
            mac.update(&header);
            mac.update(fragment);
            Ok(mac.finalize().into_bytes().to_vec())
        }
    }
}

/// Encrypt a record's payload in place.
///
/// On entry the chain holds the plaintext fragment. On return it holds the
/// complete protected payload: `IV? ‖ ciphertext` for CBC suites,
/// `explicit nonce ‖ ciphertext ‖ tag` for AEAD. Growth for MAC, padding,
/// and tag goes through `pool`.
pub fn encrypt_record(
    session: &mut Session,
    chain: &mut PacketChain,
    pool: &mut dyn PacketPool,
    record_type: u8,
) -> Result<(), TlsError> {
    let suite = *session.negotiated_suite()?;
    let fragment_len = chain.len();
    if fragment_len > MAX_PLAINTEXT_LEN {
        return Err(TlsError::RecordTooLarge(fragment_len));
    }
    let version = session.protocol_version;
    let keys = direction_keys(session, true)?;
    let seq = match session.role {
        Role::Client => session.client_sequence,
        Role::Server => session.server_sequence,
    };

    match suite.bulk {
        BulkKind::Aes128Gcm => {
            let cipher = Aes128Gcm::new_from_slice(&keys.key)
                .map_err(|_| TlsError::CryptoFailure("bad AEAD key length".to_string()))?;
            encrypt_aead(&cipher, chain, pool, &keys, seq, record_type, version)?;
        }
        BulkKind::Aes128Ccm8 => {
            let cipher = Aes128Ccm8::new_from_slice(&keys.key)
                .map_err(|_| TlsError::CryptoFailure("bad AEAD key length".to_string()))?;
            encrypt_aead(&cipher, chain, pool, &keys, seq, record_type, version)?;
        }
        BulkKind::CbcAes128 | BulkKind::CbcAes256 => {
            // MAC over the plaintext fragment, then pad to a block multiple.
            let fragment = chain.to_vec();
            let mac = compute_record_mac(
                suite.hash,
                &keys.mac_key,
                seq,
                record_type,
                version,
                &fragment,
            )?;
            chain.append_data(&mac, pool)?;

            let pad_len = AES_BLOCK - (chain.len() % AES_BLOCK);
            let padding = vec![(pad_len - 1) as u8; pad_len];
            chain.append_data(&padding, pool)?;

            // TLS 1.0 chains from the previous record; later versions use a
            // fresh random IV carried in the clear.
            let iv: [u8; AES_BLOCK] = if version == TLS_VERSION_1_0 {
                keys.iv[..AES_BLOCK]
                    .try_into()
                    .map_err(|_| TlsError::EncryptionFailed)?
            } else {
                let mut iv = [0u8; AES_BLOCK];
                rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut iv);
                iv
            };

            let last_block = match suite.bulk {
                BulkKind::CbcAes128 => cbc_encrypt_chain::<aes::Aes128>(&keys.key, &iv, chain)?,
                _ => cbc_encrypt_chain::<aes::Aes256>(&keys.key, &iv, chain)?,
            };

            if version != TLS_VERSION_1_0 {
                prepend_to_chain(chain, &iv, pool)?;
            }
            store_direction_iv(session, true, &last_block);
        }
        BulkKind::Null => {}
    }

    let seq_slot = match session.role {
        Role::Client => &mut session.client_sequence,
        Role::Server => &mut session.server_sequence,
    };
    bump_sequence(seq_slot)?;
    Ok(())
}

fn encrypt_aead<A>(
    cipher: &A,
    chain: &mut PacketChain,
    pool: &mut dyn PacketPool,
    keys: &WriteKeys,
    seq: u64,
    record_type: u8,
    version: u16,
) -> Result<(), TlsError>
where
    A: AeadInPlace,
{
    let explicit = seq.to_be_bytes();
    let mut nonce_bytes = [0u8; 12];
    nonce_bytes[..4].copy_from_slice(&keys.iv[..4]);
    nonce_bytes[4..].copy_from_slice(&explicit);
    let nonce = Nonce::<A>::from_slice(&nonce_bytes);
    let aad = record_header(seq, record_type, version, chain.len());

    if chain.packets.len() == 1 {
        // Common case: encrypt in place, growing into the packet's own
        // prefix/trailing capacity where possible.
        let packet = &mut chain.packets[0];
        let tag = cipher
            .encrypt_in_place_detached(nonce, &aad, packet.data_mut())
            .map_err(|_| TlsError::EncryptionFailed)?;
        if packet.prefix_available() >= EXPLICIT_NONCE_LEN {
            packet.prepend(&explicit)?;
        } else {
            let mut front = pool.allocate(EXPLICIT_NONCE_LEN)?;
            front.append(&explicit)?;
            chain.packets.insert(0, front);
        }
        chain.append_data(tag.as_slice(), pool)?;
    } else {
        let plaintext = chain.to_vec();
        let ciphertext = cipher
            .encrypt(
                nonce,
                Payload {
                    msg: &plaintext,
                    aad: &aad,
                },
            )
            .map_err(|_| TlsError::EncryptionFailed)?;
        let mut packet = pool.allocate(EXPLICIT_NONCE_LEN + ciphertext.len())?;
        packet.append(&explicit)?;
        packet.append(&ciphertext)?;
        chain.packets.clear();
        chain.packets.push(packet);
    }
    Ok(())
}

/// CBC-encrypt every byte of the chain in place. Blocks may straddle packet
/// boundaries; a scratch block collects such spans, is encrypted, and is
/// written back over the same positions. Returns the last ciphertext block.
fn cbc_encrypt_chain<C>(
    key: &[u8],
    iv: &[u8],
    chain: &mut PacketChain,
) -> Result<[u8; AES_BLOCK], TlsError>
where
    C: BlockEncryptMut + cipher::BlockCipher + cipher::KeyInit,
{
    if chain.len() % AES_BLOCK != 0 {
        return Err(TlsError::EncryptionFailed);
    }
    let mut encryptor = cbc::Encryptor::<C>::new_from_slices(key, iv)
        .map_err(|_| TlsError::CryptoFailure("bad CBC key or IV length".to_string()))?;

    let mut scratch = GenericArray::<u8, <C as cipher::BlockSizeUser>::BlockSize>::default();
    let mut positions: Vec<(usize, usize)> = Vec::with_capacity(AES_BLOCK);
    let mut filled = 0usize;
    let mut last_block = [0u8; AES_BLOCK];

    for packet_index in 0..chain.packets.len() {
        for offset in 0..chain.packets[packet_index].len() {
            scratch[filled] = chain.packets[packet_index].data()[offset];
            positions.push((packet_index, offset));
            filled += 1;
            if filled == AES_BLOCK {
                encryptor.encrypt_block_mut(&mut scratch);
                for (i, &(p, o)) in positions.iter().enumerate() {
                    chain.packets[p].data_mut()[o] = scratch[i];
                }
                last_block.copy_from_slice(scratch.as_slice());
                positions.clear();
                filled = 0;
            }
        }
    }
    Ok(last_block)
}

fn prepend_to_chain(
    chain: &mut PacketChain,
    data: &[u8],
    pool: &mut dyn PacketPool,
) -> Result<(), TlsError> {
    match chain.packets.first_mut() {
        Some(first) if first.prefix_available() >= data.len() => first.prepend(data),
        _ => {
            let mut front = pool.allocate(data.len())?;
            front.append(data)?;
            chain.packets.insert(0, front);
            Ok(())
        }
    }
}

/// Decrypt and verify a protected record payload, returning the plaintext
/// fragment. Padding, MAC, and tag failures all collapse into
/// `DecryptionFailed`.
pub fn decrypt_record(
    session: &mut Session,
    payload: &[u8],
    record_type: u8,
) -> Result<Vec<u8>, TlsError> {
    let suite = *session.negotiated_suite()?;
    let version = session.protocol_version;
    let keys = direction_keys(session, false)?;
    let seq = match session.role {
        Role::Client => session.server_sequence,
        Role::Server => session.client_sequence,
    };

    let fragment = match suite.bulk {
        BulkKind::Aes128Gcm => {
            let cipher = Aes128Gcm::new_from_slice(&keys.key)
                .map_err(|_| TlsError::CryptoFailure("bad AEAD key length".to_string()))?;
            open_aead(
                &cipher,
                &keys,
                seq,
                record_type,
                version,
                payload,
                suite.tag_size(),
            )?
        }
        BulkKind::Aes128Ccm8 => {
            let cipher = Aes128Ccm8::new_from_slice(&keys.key)
                .map_err(|_| TlsError::CryptoFailure("bad AEAD key length".to_string()))?;
            open_aead(
                &cipher,
                &keys,
                seq,
                record_type,
                version,
                payload,
                suite.tag_size(),
            )?
        }
        BulkKind::CbcAes128 | BulkKind::CbcAes256 => {
            let (iv, ciphertext): ([u8; AES_BLOCK], &[u8]) = if version == TLS_VERSION_1_0 {
                (
                    keys.iv[..AES_BLOCK]
                        .try_into()
                        .map_err(|_| TlsError::DecryptionFailed)?,
                    payload,
                )
            } else {
                if payload.len() < AES_BLOCK {
                    return Err(TlsError::DecryptionFailed);
                }
                (
                    payload[..AES_BLOCK]
                        .try_into()
                        .map_err(|_| TlsError::DecryptionFailed)?,
                    &payload[AES_BLOCK..],
                )
            };
            if ciphertext.is_empty() || ciphertext.len() % AES_BLOCK != 0 {
                return Err(TlsError::DecryptionFailed);
            }

            let mut plaintext = ciphertext.to_vec();
            match suite.bulk {
                BulkKind::CbcAes128 => cbc_decrypt::<aes::Aes128>(&keys.key, &iv, &mut plaintext)?,
                _ => cbc_decrypt::<aes::Aes256>(&keys.key, &iv, &mut plaintext)?,
            }

            // The next TLS 1.0 record chains from this record's last
            // ciphertext block.
            let last_block = &ciphertext[ciphertext.len() - AES_BLOCK..];
            store_direction_iv(session, false, last_block);

            strip_padding_and_mac(&suite, &keys, seq, record_type, version, plaintext)?
        }
        BulkKind::Null => payload.to_vec(),
    };

    let seq_slot = match session.role {
        Role::Client => &mut session.server_sequence,
        Role::Server => &mut session.client_sequence,
    };
    bump_sequence(seq_slot)?;
    Ok(fragment)
}

/// Check length bounds, rebuild the nonce from the explicit prefix, and open
/// an AEAD-protected payload.
fn open_aead<A>(
    cipher: &A,
    keys: &WriteKeys,
    seq: u64,
    record_type: u8,
    version: u16,
    payload: &[u8],
    tag_len: usize,
) -> Result<Vec<u8>, TlsError>
where
    A: AeadInPlace,
{
    if payload.len() < EXPLICIT_NONCE_LEN + tag_len {
        return Err(TlsError::DecryptionFailed);
    }
    let mut nonce_bytes = [0u8; 12];
    nonce_bytes[..4].copy_from_slice(&keys.iv[..4]);
    nonce_bytes[4..].copy_from_slice(&payload[..EXPLICIT_NONCE_LEN]);
    let nonce = Nonce::<A>::from_slice(&nonce_bytes);

    let plaintext_len = payload.len() - EXPLICIT_NONCE_LEN - tag_len;
    let aad = record_header(seq, record_type, version, plaintext_len);
    cipher
        .decrypt(
            nonce,
            Payload {
                msg: &payload[EXPLICIT_NONCE_LEN..],
                aad: &aad,
            },
        )
        .map_err(|_| TlsError::DecryptionFailed)
}

fn cbc_decrypt<C>(key: &[u8], iv: &[u8], data: &mut [u8]) -> Result<(), TlsError>
where
    C: BlockDecryptMut + cipher::BlockCipher + cipher::KeyInit,
{
    let mut decryptor = cbc::Decryptor::<C>::new_from_slices(key, iv)
        .map_err(|_| TlsError::CryptoFailure("bad CBC key or IV length".to_string()))?;
    for block in data.chunks_exact_mut(AES_BLOCK) {
        decryptor.decrypt_block_mut(GenericArray::from_mut_slice(block));
    }
    Ok(())
}

fn strip_padding_and_mac(
    suite: &crate::suite::CipherSuiteDescriptor,
    keys: &WriteKeys,
    seq: u64,
    record_type: u8,
    version: u16,
    plaintext: Vec<u8>,
) -> Result<Vec<u8>, TlsError> {
    let pad_value = *plaintext.last().ok_or(TlsError::DecryptionFailed)?;
    let pad_len = pad_value as usize + 1;
    let mac_len = suite.mac_size();
    if pad_len + mac_len > plaintext.len() {
        return Err(TlsError::DecryptionFailed);
    }
    // Every padding byte must equal the padding length byte.
    let mut pad_ok = 1u8;
    for &b in &plaintext[plaintext.len() - pad_len..] {
        pad_ok &= b.ct_eq(&pad_value).unwrap_u8();
    }

    let fragment_len = plaintext.len() - pad_len - mac_len;
    let fragment = &plaintext[..fragment_len];
    let received_mac = &plaintext[fragment_len..fragment_len + mac_len];
    let expected_mac =
        compute_record_mac(suite.hash, &keys.mac_key, seq, record_type, version, fragment)?;

    let mac_ok = received_mac.ct_eq(&expected_mac).unwrap_u8();
    if pad_ok & mac_ok != 1 {
        return Err(TlsError::DecryptionFailed);
    }
    Ok(fragment.to_vec())
}
