//! Envelope header
//!
//! ```text
//! [4 bytes: magic "SAEV"][1 byte: version][1 byte: backend id][4 bytes: PBKDF2 rounds, BE]
//! ```
//! Followed directly by the backend's own layout. Envelopes without the magic
//! are legacy and carry no header at all.

use safearchive_core::{BackendTag, SaError, SaResult};

use crate::kdf::KdfParams;

pub const MAGIC: &[u8; 4] = b"SAEV";
pub const FORMAT_VERSION: u8 = 1;
pub const HEADER_LEN: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvelopeHeader {
    pub version: u8,
    pub backend: BackendTag,
    pub kdf: KdfParams,
}

impl EnvelopeHeader {
    pub fn new(backend: BackendTag, kdf: KdfParams) -> Self {
        Self {
            version: FORMAT_VERSION,
            backend,
            kdf,
        }
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[..4].copy_from_slice(MAGIC);
        out[4] = self.version;
        out[5] = self.backend.id();
        out[6..].copy_from_slice(&self.kdf.iterations.to_be_bytes());
        out
    }

    /// Prepend this header to a backend envelope.
    pub fn wrap(&self, body: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + body.len());
        out.extend_from_slice(&self.encode());
        out.extend_from_slice(body);
        out
    }

    /// Split `data` into header and body.
    ///
    /// `Ok(None)` means no magic, i.e. a legacy envelope. A present magic with
    /// an unknown version, backend id or round count is an error rather than a
    /// fallback to trial decryption.
    pub fn parse(data: &[u8]) -> SaResult<Option<(Self, &[u8])>> {
        if !has_magic(data) {
            return Ok(None);
        }
        if data.len() < HEADER_LEN {
            return Err(SaError::invalid("truncated envelope header"));
        }

        let version = data[4];
        if version != FORMAT_VERSION {
            return Err(SaError::invalid(format!(
                "unsupported envelope version {version}"
            )));
        }
        let backend = BackendTag::from_id(data[5])
            .ok_or_else(|| SaError::invalid(format!("unknown backend id {}", data[5])))?;

        let mut rounds = [0u8; 4];
        rounds.copy_from_slice(&data[6..HEADER_LEN]);
        let kdf = KdfParams::new(u32::from_be_bytes(rounds))?;

        Ok(Some((
            Self {
                version,
                backend,
                kdf,
            },
            &data[HEADER_LEN..],
        )))
    }
}

/// Whether `data` starts with the envelope magic.
pub fn has_magic(data: &[u8]) -> bool {
    data.starts_with(MAGIC)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        let header = EnvelopeHeader::new(BackendTag::Block, KdfParams::new(1_000).unwrap());
        let wrapped = header.wrap(b"body");

        let (parsed, body) = EnvelopeHeader::parse(&wrapped).unwrap().unwrap();
        assert_eq!(parsed, header);
        assert_eq!(body, b"body");
    }

    #[test]
    fn test_header_layout() {
        let header = EnvelopeHeader::new(BackendTag::Token, KdfParams::default());
        let bytes = header.encode();
        assert_eq!(&bytes[..4], b"SAEV");
        assert_eq!(bytes[4], 1);
        assert_eq!(bytes[5], 1);
        assert_eq!(&bytes[6..], &390_000u32.to_be_bytes());
    }

    #[test]
    fn test_legacy_has_no_header() {
        let legacy = [0x42u8; 64];
        assert!(EnvelopeHeader::parse(&legacy).unwrap().is_none());
        assert!(EnvelopeHeader::parse(b"").unwrap().is_none());
    }

    #[test]
    fn test_rejects_bad_header() {
        let mut bytes = EnvelopeHeader::new(BackendTag::Token, KdfParams::default()).encode();

        bytes[4] = 9;
        assert!(matches!(
            EnvelopeHeader::parse(&bytes),
            Err(SaError::InvalidInput(_))
        ));

        bytes[4] = FORMAT_VERSION;
        bytes[5] = 7;
        assert!(EnvelopeHeader::parse(&bytes).is_err());

        bytes[5] = 1;
        bytes[6..].copy_from_slice(&0u32.to_be_bytes());
        assert!(EnvelopeHeader::parse(&bytes).is_err());

        assert!(EnvelopeHeader::parse(b"SAEV\x01").is_err());
    }
}
