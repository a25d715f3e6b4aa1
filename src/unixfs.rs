//! The filesystem facet carried inside a protobuf node's data payload.
//!
//! [`UnixfsData`] records what a node *is* (directory, file, symlink, ...)
//! along with the metadata the overlay carries opaquely: mode bits, a
//! modification time, and for files the content bytes and logical size.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{MfsError, Result};

/// The filesystem kind of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnixfsKind {
    Directory,
    HamtShard,
    File,
    Raw,
    Symlink,
    Metadata,
}

impl UnixfsKind {
    fn tag(self) -> u8 {
        match self {
            UnixfsKind::Directory => 1,
            UnixfsKind::HamtShard => 2,
            UnixfsKind::File => 3,
            UnixfsKind::Raw => 4,
            UnixfsKind::Symlink => 5,
            UnixfsKind::Metadata => 6,
        }
    }

    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(UnixfsKind::Directory),
            2 => Some(UnixfsKind::HamtShard),
            3 => Some(UnixfsKind::File),
            4 => Some(UnixfsKind::Raw),
            5 => Some(UnixfsKind::Symlink),
            6 => Some(UnixfsKind::Metadata),
            _ => None,
        }
    }
}

const FLAG_FILESIZE: u8 = 1 << 0;
const FLAG_MODE: u8 = 1 << 1;
const FLAG_MTIME: u8 = 1 << 2;

/// Decoded filesystem payload of a protobuf node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnixfsData {
    pub kind: UnixfsKind,
    /// Logical file size; directories leave this unset.
    pub filesize: Option<u64>,
    /// Inline content bytes for file-like kinds; empty for directories.
    pub content: Bytes,
    /// Opaque mode bits, if stamped.
    pub mode: Option<u32>,
    /// Modification time, if stamped.
    pub mtime: Option<SystemTime>,
}

impl UnixfsData {
    /// An empty directory payload.
    pub fn directory() -> Self {
        Self {
            kind: UnixfsKind::Directory,
            filesize: None,
            content: Bytes::new(),
            mode: None,
            mtime: None,
        }
    }

    /// A file payload holding `content` inline.
    pub fn file(content: Bytes) -> Self {
        Self {
            kind: UnixfsKind::File,
            filesize: Some(content.len() as u64),
            content,
            mode: None,
            mtime: None,
        }
    }

    /// Logical size: the declared file size, falling back to the inline
    /// content length.
    pub fn size(&self) -> u64 {
        self.filesize.unwrap_or(self.content.len() as u64)
    }

    pub fn set_mode(&mut self, mode: u32) {
        self.mode = Some(mode);
    }

    pub fn set_mod_time(&mut self, ts: SystemTime) {
        self.mtime = Some(ts);
    }

    /// Deterministic wire form.
    pub fn encode(&self) -> Bytes {
        let mut flags = 0u8;
        if self.filesize.is_some() {
            flags |= FLAG_FILESIZE;
        }
        if self.mode.is_some() {
            flags |= FLAG_MODE;
        }
        if self.mtime.is_some() {
            flags |= FLAG_MTIME;
        }

        let mut buf = BytesMut::with_capacity(2 + 8 + 4 + 12 + 4 + self.content.len());
        buf.put_u8(self.kind.tag());
        buf.put_u8(flags);
        if let Some(size) = self.filesize {
            buf.put_u64(size);
        }
        if let Some(mode) = self.mode {
            buf.put_u32(mode);
        }
        if let Some(ts) = self.mtime {
            let since_epoch = ts
                .duration_since(UNIX_EPOCH)
                .unwrap_or(Duration::ZERO);
            buf.put_u64(since_epoch.as_secs());
            buf.put_u32(since_epoch.subsec_nanos());
        }
        buf.put_u32(self.content.len() as u32);
        buf.put_slice(&self.content);
        buf.freeze()
    }

    /// Parse the wire form produced by [`encode`](Self::encode).
    ///
    /// An unknown kind tag fails [`MfsError::InvalidChild`]; structural
    /// damage fails [`MfsError::Malformed`].
    pub fn decode(mut buf: &[u8]) -> Result<Self> {
        if buf.remaining() < 2 {
            return Err(MfsError::Malformed("truncated unixfs payload".into()));
        }
        let kind = UnixfsKind::from_tag(buf.get_u8()).ok_or(MfsError::InvalidChild)?;
        let flags = buf.get_u8();

        let filesize = if flags & FLAG_FILESIZE != 0 {
            if buf.remaining() < 8 {
                return Err(MfsError::Malformed("truncated filesize".into()));
            }
            Some(buf.get_u64())
        } else {
            None
        };
        let mode = if flags & FLAG_MODE != 0 {
            if buf.remaining() < 4 {
                return Err(MfsError::Malformed("truncated mode".into()));
            }
            Some(buf.get_u32())
        } else {
            None
        };
        let mtime = if flags & FLAG_MTIME != 0 {
            if buf.remaining() < 12 {
                return Err(MfsError::Malformed("truncated mtime".into()));
            }
            let secs = buf.get_u64();
            let nanos = buf.get_u32();
            Some(UNIX_EPOCH + Duration::new(secs, nanos))
        } else {
            None
        };

        if buf.remaining() < 4 {
            return Err(MfsError::Malformed("truncated content length".into()));
        }
        let content_len = buf.get_u32() as usize;
        if buf.remaining() != content_len {
            return Err(MfsError::Malformed("content length mismatch".into()));
        }

        Ok(Self {
            kind,
            filesize,
            content: Bytes::copy_from_slice(buf),
            mode,
            mtime,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamped_metadata_survives_the_codec() {
        let mut data = UnixfsData::directory();
        data.set_mode(0o750);
        data.set_mod_time(UNIX_EPOCH + Duration::new(1_700_000_000, 42));
        let decoded = UnixfsData::decode(&data.encode()).unwrap();
        assert_eq!(decoded.mode, Some(0o750));
        assert_eq!(decoded.mtime, data.mtime);
        assert_eq!(decoded.kind, UnixfsKind::Directory);
    }

    #[test]
    fn file_size_prefers_the_declared_size() {
        let mut data = UnixfsData::file(Bytes::from_static(b"abc"));
        assert_eq!(data.size(), 3);
        data.filesize = Some(1000);
        assert_eq!(data.size(), 1000);
    }

    #[test]
    fn unknown_kind_is_an_invalid_child() {
        let err = UnixfsData::decode(&[0xEE, 0, 0, 0, 0, 0]).unwrap_err();
        assert!(matches!(err, MfsError::InvalidChild));
    }

    #[test]
    fn truncation_is_malformed() {
        let data = UnixfsData::file(Bytes::from_static(b"abcdef"));
        let encoded = data.encode();
        let err = UnixfsData::decode(&encoded[..encoded.len() - 2]).unwrap_err();
        assert!(matches!(err, MfsError::Malformed(_)));
    }
}
