//! Container header layouts.
//!
//! Two historical shapes share the `Cr24` magic:
//!
//! ```text
//! key-and-signature (v2, and v3 as written by crxkit)
//! 0   4  magic "Cr24"
//! 4   4  version (u32 LE)
//! 8   4  public key length (u32 LE)
//! 12  4  signature length (u32 LE)
//! 16  *  public key, signature, archive
//!
//! header-block (v3 as served by the store)
//! 0   4  magic "Cr24"
//! 4   4  version = 3 (u32 LE)
//! 8   4  header length (u32 LE)
//! 12  *  header block, archive
//! ```
//!
//! Length fields are only trusted when they are plausible (non-zero, below
//! [`MAX_PLAUSIBLE_LEN`]) and fit inside the buffer.

use crate::{CRX_MAGIC, ZIP_MAGIC};

/// Upper bound (exclusive) for any single header length field.
pub const MAX_PLAUSIBLE_LEN: u32 = 10_000;

/// Size of the fixed prefix of a key-and-signature header.
pub const KEY_SIGNATURE_PREFIX_LEN: usize = 16;

/// Size of the fixed prefix of a header-block header.
pub const HEADER_BLOCK_PREFIX_LEN: usize = 12;

/// Container format version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrxVersion {
    /// Legacy format: key and signature lengths follow the version.
    V2,
    /// Current format.
    V3,
}

impl CrxVersion {
    /// Map the on-disk version number, if known.
    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            2 => Some(Self::V2),
            3 => Some(Self::V3),
            _ => None,
        }
    }

    /// The on-disk version number.
    pub fn as_u32(self) -> u32 {
        match self {
            Self::V2 => 2,
            Self::V3 => 3,
        }
    }
}

impl std::fmt::Display for CrxVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CRX{}", self.as_u32())
    }
}

/// Variant-specific length fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderFields {
    /// Explicit public key and signature lengths.
    KeyAndSignature {
        /// Length of the DER public key.
        public_key_len: u32,
        /// Length of the signature.
        signature_len: u32,
    },
    /// A single opaque header block.
    HeaderBlock {
        /// Length of the header block following the prefix.
        header_len: u32,
    },
}

/// A recognised container header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerHeader {
    /// Declared format version.
    pub version: CrxVersion,
    /// Length fields for this layout.
    pub fields: HeaderFields,
}

impl ContainerHeader {
    /// Header for a freshly signed container.
    pub fn signed(version: CrxVersion, public_key_len: u32, signature_len: u32) -> Self {
        Self {
            version,
            fields: HeaderFields::KeyAndSignature {
                public_key_len,
                signature_len,
            },
        }
    }

    /// Offset at which the header claims the archive starts.
    pub fn payload_offset(&self) -> usize {
        match self.fields {
            HeaderFields::KeyAndSignature {
                public_key_len,
                signature_len,
            } => KEY_SIGNATURE_PREFIX_LEN + public_key_len as usize + signature_len as usize,
            HeaderFields::HeaderBlock { header_len } => {
                HEADER_BLOCK_PREFIX_LEN + header_len as usize
            }
        }
    }

    /// Parse a header from the start of `bytes`.
    ///
    /// Returns `None` for missing magic, unknown versions, implausible
    /// lengths, or lengths that overrun the buffer. Never panics.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < HEADER_BLOCK_PREFIX_LEN || bytes[..4] != CRX_MAGIC {
            return None;
        }
        let version = CrxVersion::from_u32(read_u32_le(bytes, 4)?)?;

        let key_and_signature = Self::parse_key_and_signature(version, bytes);
        match version {
            CrxVersion::V2 => key_and_signature,
            CrxVersion::V3 => key_and_signature
                .filter(|h| bytes[h.payload_offset()..].starts_with(&ZIP_MAGIC))
                .or_else(|| Self::parse_header_block(bytes)),
        }
    }

    fn parse_key_and_signature(version: CrxVersion, bytes: &[u8]) -> Option<Self> {
        let public_key_len = read_u32_le(bytes, 8).filter(|n| is_plausible(*n))?;
        let signature_len = read_u32_le(bytes, 12).filter(|n| is_plausible(*n))?;
        let header = Self::signed(version, public_key_len, signature_len);
        (header.payload_offset() <= bytes.len()).then_some(header)
    }

    fn parse_header_block(bytes: &[u8]) -> Option<Self> {
        let header_len = read_u32_le(bytes, 8).filter(|n| is_plausible(*n))?;
        let header = Self {
            version: CrxVersion::V3,
            fields: HeaderFields::HeaderBlock { header_len },
        };
        (header.payload_offset() <= bytes.len()).then_some(header)
    }

    /// Serialize the fixed prefix (magic, version, length fields).
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(KEY_SIGNATURE_PREFIX_LEN);
        out.extend_from_slice(&CRX_MAGIC);
        out.extend_from_slice(&self.version.as_u32().to_le_bytes());
        match self.fields {
            HeaderFields::KeyAndSignature {
                public_key_len,
                signature_len,
            } => {
                out.extend_from_slice(&public_key_len.to_le_bytes());
                out.extend_from_slice(&signature_len.to_le_bytes());
            }
            HeaderFields::HeaderBlock { header_len } => {
                out.extend_from_slice(&header_len.to_le_bytes());
            }
        }
        out
    }
}

fn is_plausible(len: u32) -> bool {
    len > 0 && len < MAX_PLAUSIBLE_LEN
}

/// Read a little-endian `u32` at `offset`, if the buffer is long enough.
pub fn read_u32_le(bytes: &[u8], offset: usize) -> Option<u32> {
    let slice = bytes.get(offset..offset.checked_add(4)?)?;
    Some(u32::from_le_bytes([slice[0], slice[1], slice[2], slice[3]]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_signature_container(version: u32, pk: &[u8], sig: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"Cr24");
        out.extend_from_slice(&version.to_le_bytes());
        out.extend_from_slice(&(pk.len() as u32).to_le_bytes());
        out.extend_from_slice(&(sig.len() as u32).to_le_bytes());
        out.extend_from_slice(pk);
        out.extend_from_slice(sig);
        out.extend_from_slice(&ZIP_MAGIC);
        out.extend_from_slice(b"rest-of-archive");
        out
    }

    #[test]
    fn parses_v2_layout() {
        let bytes = key_signature_container(2, &[1; 10], &[2; 20]);
        let header = ContainerHeader::parse(&bytes).unwrap();
        assert_eq!(header.version, CrxVersion::V2);
        assert_eq!(header.payload_offset(), 46);
        assert_eq!(&bytes[46..50], &ZIP_MAGIC);
    }

    #[test]
    fn parses_signed_v3_layout() {
        let bytes = key_signature_container(3, &[1; 30], &[2; 40]);
        let header = ContainerHeader::parse(&bytes).unwrap();
        assert_eq!(header, ContainerHeader::signed(CrxVersion::V3, 30, 40));
    }

    #[test]
    fn parses_header_block_v3_layout() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"Cr24");
        bytes.extend_from_slice(&3u32.to_le_bytes());
        bytes.extend_from_slice(&5u32.to_le_bytes());
        bytes.extend_from_slice(&[9; 5]);
        bytes.extend_from_slice(&ZIP_MAGIC);

        let header = ContainerHeader::parse(&bytes).unwrap();
        assert_eq!(header.fields, HeaderFields::HeaderBlock { header_len: 5 });
        assert_eq!(header.payload_offset(), 17);
    }

    #[test]
    fn rejects_lengths_overrunning_buffer() {
        let mut bytes = key_signature_container(2, &[1; 10], &[2; 20]);
        bytes[8..12].copy_from_slice(&9_000u32.to_le_bytes());
        assert!(ContainerHeader::parse(&bytes).is_none());
    }

    #[test]
    fn rejects_implausible_lengths() {
        let mut bytes = key_signature_container(2, &[1; 10], &[2; 20]);
        bytes[12..16].copy_from_slice(&0u32.to_le_bytes());
        assert!(ContainerHeader::parse(&bytes).is_none());
    }

    #[test]
    fn rejects_unknown_version_and_magic() {
        let bytes = key_signature_container(7, &[1; 4], &[2; 4]);
        assert!(ContainerHeader::parse(&bytes).is_none());
        assert!(ContainerHeader::parse(b"PK\x03\x04garbage-garbage").is_none());
        assert!(ContainerHeader::parse(b"Cr24").is_none());
    }

    #[test]
    fn to_bytes_matches_written_prefix() {
        let header = ContainerHeader::signed(CrxVersion::V3, 294, 256);
        let bytes = header.to_bytes();
        assert_eq!(&bytes[..4], b"Cr24");
        assert_eq!(read_u32_le(&bytes, 4), Some(3));
        assert_eq!(read_u32_le(&bytes, 8), Some(294));
        assert_eq!(read_u32_le(&bytes, 12), Some(256));
    }
}
