//! Cipher suite registry.
//!
//! Each negotiable suite is described by an immutable [`CipherSuiteDescriptor`]
//! in a static table ordered by server preference. Negotiation picks the first
//! client-offered suite present in this table that is also compatible with the
//! local credentials; see `client_hello`.

/// Signalling value: the empty renegotiation-info SCSV (RFC 5746). Recognized
/// during ClientHello processing, never negotiable as a suite.
pub const TLS_EMPTY_RENEGOTIATION_INFO_SCSV: u16 = 0x00ff;

/// Signalling value: the fallback SCSV (RFC 7507). Never negotiable.
pub const TLS_FALLBACK_SCSV: u16 = 0x5600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyExchangeKind {
    Rsa,
    Ecdhe,
    Psk,
    EcJpake,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureKind {
    Rsa,
    Ecdsa,
    /// Key exchange authenticated by other means (PSK, PAKE).
    Anonymous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkKind {
    CbcAes128,
    CbcAes256,
    Aes128Gcm,
    /// AES-128-CCM with the truncated 8-byte ICV (RFC 6655).
    Aes128Ccm8,
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashKind {
    Sha1,
    Sha256,
    Sha384,
}

/// Immutable description of one cipher suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CipherSuiteDescriptor {
    pub id: u16,
    pub key_exchange: KeyExchangeKind,
    pub signature: SignatureKind,
    pub bulk: BulkKind,
    pub hash: HashKind,
}

impl CipherSuiteDescriptor {
    /// Bulk cipher write-key size in bytes.
    pub fn key_size(&self) -> usize {
        match self.bulk {
            BulkKind::CbcAes128 | BulkKind::Aes128Gcm | BulkKind::Aes128Ccm8 => 16,
            BulkKind::CbcAes256 => 32,
            BulkKind::Null => 0,
        }
    }

    /// IV size in bytes: the block size for CBC, the 4-byte implicit salt
    /// for the AEAD modes.
    pub fn iv_size(&self) -> usize {
        match self.bulk {
            BulkKind::CbcAes128 | BulkKind::CbcAes256 => 16,
            BulkKind::Aes128Gcm | BulkKind::Aes128Ccm8 => 4,
            BulkKind::Null => 0,
        }
    }

    /// Block size for block ciphers, zero otherwise.
    pub fn block_size(&self) -> usize {
        match self.bulk {
            BulkKind::CbcAes128 | BulkKind::CbcAes256 => 16,
            _ => 0,
        }
    }

    /// Record MAC key and output size. AEAD suites carry no separate MAC.
    pub fn mac_size(&self) -> usize {
        if self.is_aead() {
            return 0;
        }
        match self.hash {
            HashKind::Sha1 => 20,
            HashKind::Sha256 => 32,
            HashKind::Sha384 => 48,
        }
    }

    pub fn is_aead(&self) -> bool {
        matches!(self.bulk, BulkKind::Aes128Gcm | BulkKind::Aes128Ccm8)
    }

    /// AEAD tag length: 16 for AES-GCM, 8 for CCM_8.
    pub fn tag_size(&self) -> usize {
        match self.bulk {
            BulkKind::Aes128Gcm => 16,
            BulkKind::Aes128Ccm8 => 8,
            _ => 0,
        }
    }
}

/// Negotiable suites in server preference order.
pub static SUPPORTED_SUITES: &[CipherSuiteDescriptor] = &[
    // TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256
    CipherSuiteDescriptor {
        id: 0xc02b,
        key_exchange: KeyExchangeKind::Ecdhe,
        signature: SignatureKind::Ecdsa,
        bulk: BulkKind::Aes128Gcm,
        hash: HashKind::Sha256,
    },
    // TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256
    CipherSuiteDescriptor {
        id: 0xc02f,
        key_exchange: KeyExchangeKind::Ecdhe,
        signature: SignatureKind::Rsa,
        bulk: BulkKind::Aes128Gcm,
        hash: HashKind::Sha256,
    },
    // TLS_RSA_WITH_AES_128_GCM_SHA256
    CipherSuiteDescriptor {
        id: 0x009c,
        key_exchange: KeyExchangeKind::Rsa,
        signature: SignatureKind::Rsa,
        bulk: BulkKind::Aes128Gcm,
        hash: HashKind::Sha256,
    },
    // TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA
    CipherSuiteDescriptor {
        id: 0xc009,
        key_exchange: KeyExchangeKind::Ecdhe,
        signature: SignatureKind::Ecdsa,
        bulk: BulkKind::CbcAes128,
        hash: HashKind::Sha1,
    },
    // TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA
    CipherSuiteDescriptor {
        id: 0xc013,
        key_exchange: KeyExchangeKind::Ecdhe,
        signature: SignatureKind::Rsa,
        bulk: BulkKind::CbcAes128,
        hash: HashKind::Sha1,
    },
    // TLS_RSA_WITH_AES_128_CBC_SHA256
    CipherSuiteDescriptor {
        id: 0x003c,
        key_exchange: KeyExchangeKind::Rsa,
        signature: SignatureKind::Rsa,
        bulk: BulkKind::CbcAes128,
        hash: HashKind::Sha256,
    },
    // TLS_RSA_WITH_AES_128_CBC_SHA
    CipherSuiteDescriptor {
        id: 0x002f,
        key_exchange: KeyExchangeKind::Rsa,
        signature: SignatureKind::Rsa,
        bulk: BulkKind::CbcAes128,
        hash: HashKind::Sha1,
    },
    // TLS_RSA_WITH_AES_256_CBC_SHA
    CipherSuiteDescriptor {
        id: 0x0035,
        key_exchange: KeyExchangeKind::Rsa,
        signature: SignatureKind::Rsa,
        bulk: BulkKind::CbcAes256,
        hash: HashKind::Sha1,
    },
    // TLS_PSK_WITH_AES_128_CBC_SHA256
    CipherSuiteDescriptor {
        id: 0x00ae,
        key_exchange: KeyExchangeKind::Psk,
        signature: SignatureKind::Anonymous,
        bulk: BulkKind::CbcAes128,
        hash: HashKind::Sha256,
    },
    // TLS_ECJPAKE_WITH_AES_128_CCM_8 (vendor range, Thread commissioning)
    CipherSuiteDescriptor {
        id: 0xc0ff,
        key_exchange: KeyExchangeKind::EcJpake,
        signature: SignatureKind::Anonymous,
        bulk: BulkKind::Aes128Ccm8,
        hash: HashKind::Sha256,
    },
];

/// Find the descriptor for a suite id, if it is negotiable.
pub fn lookup(id: u16) -> Option<&'static CipherSuiteDescriptor> {
    SUPPORTED_SUITES.iter().find(|s| s.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_finds_registered_suites() {
        let suite = lookup(0x002f).unwrap();
        assert_eq!(suite.key_exchange, KeyExchangeKind::Rsa);
        assert_eq!(suite.bulk, BulkKind::CbcAes128);
        assert_eq!(suite.key_size(), 16);
        assert_eq!(suite.mac_size(), 20);
        assert_eq!(suite.block_size(), 16);
        assert!(!suite.is_aead());
    }

    #[test]
    fn scsvs_are_never_negotiable() {
        assert!(lookup(TLS_EMPTY_RENEGOTIATION_INFO_SCSV).is_none());
        assert!(lookup(TLS_FALLBACK_SCSV).is_none());
    }

    #[test]
    fn aead_suites_have_no_record_mac() {
        let suite = lookup(0xc02f).unwrap();
        assert!(suite.is_aead());
        assert_eq!(suite.mac_size(), 0);
        assert_eq!(suite.iv_size(), 4);
        assert_eq!(suite.tag_size(), 16);
    }

    #[test]
    fn ecjpake_suite_uses_ccm8_framing() {
        let suite = lookup(0xc0ff).unwrap();
        assert_eq!(suite.bulk, BulkKind::Aes128Ccm8);
        assert!(suite.is_aead());
        assert_eq!(suite.tag_size(), 8);
        assert_eq!(suite.iv_size(), 4);
        assert_eq!(suite.key_size(), 16);
    }

    #[test]
    fn table_has_no_duplicate_ids() {
        for (i, a) in SUPPORTED_SUITES.iter().enumerate() {
            for b in &SUPPORTED_SUITES[i + 1..] {
                assert_ne!(a.id, b.id);
            }
        }
    }
}
