//! Content identifiers.
//!
//! A [`Cid`] names an immutable DAG node by the SHA-256 digest of its
//! encoding, qualified by a format version and a codec tag. Two nodes with
//! identical content share a CID. [`CidBuilder`] is the stamping side:
//! overlays carry a builder and apply it to freshly produced nodes.

use std::fmt;

use sha2::{Digest, Sha256};

/// Number of bytes in a serialized [`Cid`]: version + codec + digest.
pub const CID_BYTE_LEN: usize = 2 + DIGEST_LEN;

const DIGEST_LEN: usize = 32;

/// The encoding of the block a [`Cid`] points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Codec {
    /// A protobuf-style node: named links plus an opaque data payload.
    DagPb,
    /// A bare leaf block with no links.
    Raw,
}

impl Codec {
    pub(crate) fn tag(self) -> u8 {
        match self {
            Codec::DagPb => 0x70,
            Codec::Raw => 0x55,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0x70 => Some(Codec::DagPb),
            0x55 => Some(Codec::Raw),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Codec::DagPb => "dag-pb",
            Codec::Raw => "raw",
        }
    }
}

/// A content identifier: self-describing, hash-based name for a DAG node.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cid {
    version: u8,
    codec: Codec,
    digest: [u8; DIGEST_LEN],
}

impl Cid {
    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    pub fn digest(&self) -> &[u8; DIGEST_LEN] {
        &self.digest
    }

    /// Serialize to the fixed-width wire form used inside link encodings.
    pub fn to_bytes(&self) -> [u8; CID_BYTE_LEN] {
        let mut out = [0u8; CID_BYTE_LEN];
        out[0] = self.version;
        out[1] = self.codec.tag();
        out[2..].copy_from_slice(&self.digest);
        out
    }

    /// Parse the fixed-width wire form. Returns `None` on a bad length or
    /// unknown codec tag.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != CID_BYTE_LEN {
            return None;
        }
        let codec = Codec::from_tag(bytes[1])?;
        let mut digest = [0u8; DIGEST_LEN];
        digest.copy_from_slice(&bytes[2..]);
        Some(Self {
            version: bytes[0],
            codec,
            digest,
        })
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}v{}-{}",
            self.codec.as_str(),
            self.version,
            hex::encode(self.digest)
        )
    }
}

impl fmt::Debug for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cid({self})")
    }
}

/// Stamps [`Cid`]s onto freshly encoded nodes.
///
/// Overlays inherit their builder from the parent directory when they are
/// materialized; the builder is not persisted in the DAG.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CidBuilder {
    version: u8,
    codec: Codec,
}

impl CidBuilder {
    pub const fn new(version: u8, codec: Codec) -> Self {
        Self { version, codec }
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// Hash an encoded block into its identifier.
    pub fn cid(&self, encoded: &[u8]) -> Cid {
        let mut hasher = Sha256::new();
        hasher.update(encoded);
        Cid {
            version: self.version,
            codec: self.codec,
            digest: hasher.finalize().into(),
        }
    }
}

impl Default for CidBuilder {
    fn default() -> Self {
        Self::new(1, Codec::DagPb)
    }
}
