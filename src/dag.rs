//! Immutable DAG node values and their deterministic encoding.
//!
//! Two node shapes exist: [`ProtoNode`] (an opaque data payload plus named
//! links to other nodes) and [`RawNode`] (a bare leaf). [`DagNode`] is the
//! value enum handed across the [`DagStore`](crate::store::DagStore)
//! boundary. A node's CID is its builder applied to [`encode`](ProtoNode::encode);
//! links are kept name-sorted so equal content always yields an equal CID.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::cid::{Cid, CidBuilder, Codec, CID_BYTE_LEN};
use crate::error::{MfsError, Result};

/// A named, sized edge from a directory node to a child node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DagLink {
    pub name: String,
    pub cid: Cid,
    /// Cumulative size of the subtree behind the link, in bytes.
    pub size: u64,
}

/// A node with an opaque data payload and named links.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtoNode {
    data: Bytes,
    links: Vec<DagLink>,
    builder: CidBuilder,
}

impl ProtoNode {
    /// A node with no links.
    pub fn new(data: Bytes, builder: CidBuilder) -> Self {
        Self::with_links(data, Vec::new(), builder)
    }

    /// A node with the given links. Links are name-sorted on construction.
    pub fn with_links(data: Bytes, mut links: Vec<DagLink>, builder: CidBuilder) -> Self {
        links.sort_by(|a, b| a.name.cmp(&b.name));
        Self {
            data,
            links,
            builder,
        }
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Links in name order.
    pub fn links(&self) -> &[DagLink] {
        &self.links
    }

    pub fn builder(&self) -> CidBuilder {
        self.builder
    }

    /// Deterministic wire form: version, codec, links, then payload.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(
            2 + 4 + self.links.iter().map(|l| 4 + l.name.len() + CID_BYTE_LEN + 8).sum::<usize>()
                + 4
                + self.data.len(),
        );
        buf.put_u8(self.builder.version());
        buf.put_u8(self.builder.codec().tag());
        buf.put_u32(self.links.len() as u32);
        for link in &self.links {
            buf.put_u32(link.name.len() as u32);
            buf.put_slice(link.name.as_bytes());
            buf.put_slice(&link.cid.to_bytes());
            buf.put_u64(link.size);
        }
        buf.put_u32(self.data.len() as u32);
        buf.put_slice(&self.data);
        buf.freeze()
    }

    /// Parse the wire form produced by [`encode`](Self::encode).
    pub fn decode(mut buf: &[u8]) -> Result<Self> {
        if buf.remaining() < 6 {
            return Err(MfsError::Malformed("truncated node header".into()));
        }
        let version = buf.get_u8();
        let codec = Codec::from_tag(buf.get_u8())
            .ok_or_else(|| MfsError::Malformed("unknown codec tag".into()))?;
        let link_count = buf.get_u32() as usize;
        let mut links = Vec::with_capacity(link_count.min(1024));
        for _ in 0..link_count {
            if buf.remaining() < 4 {
                return Err(MfsError::Malformed("truncated link".into()));
            }
            let name_len = buf.get_u32() as usize;
            if buf.remaining() < name_len + CID_BYTE_LEN + 8 {
                return Err(MfsError::Malformed("truncated link".into()));
            }
            let name = std::str::from_utf8(&buf[..name_len])
                .map_err(|_| MfsError::Malformed("link name is not utf-8".into()))?
                .to_owned();
            buf.advance(name_len);
            let cid = Cid::from_bytes(&buf[..CID_BYTE_LEN])
                .ok_or_else(|| MfsError::Malformed("bad link cid".into()))?;
            buf.advance(CID_BYTE_LEN);
            let size = buf.get_u64();
            links.push(DagLink { name, cid, size });
        }
        if buf.remaining() < 4 {
            return Err(MfsError::Malformed("truncated payload length".into()));
        }
        let data_len = buf.get_u32() as usize;
        if buf.remaining() != data_len {
            return Err(MfsError::Malformed("payload length mismatch".into()));
        }
        Ok(Self::with_links(
            Bytes::copy_from_slice(buf),
            links,
            CidBuilder::new(version, codec),
        ))
    }

    pub fn cid(&self) -> Cid {
        self.builder.cid(&self.encode())
    }
}

/// A bare leaf block: content bytes and nothing else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawNode {
    data: Bytes,
    builder: CidBuilder,
}

impl RawNode {
    pub fn new(data: Bytes) -> Self {
        Self {
            data,
            builder: CidBuilder::new(1, Codec::Raw),
        }
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn cid(&self) -> Cid {
        self.builder.cid(&self.data)
    }
}

/// A node value as stored in and fetched from the DAG store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DagNode {
    Proto(ProtoNode),
    Raw(RawNode),
}

impl DagNode {
    pub fn cid(&self) -> Cid {
        match self {
            DagNode::Proto(n) => n.cid(),
            DagNode::Raw(n) => n.cid(),
        }
    }

    /// Cumulative size: own payload plus everything behind the links.
    pub fn size(&self) -> u64 {
        match self {
            DagNode::Proto(n) => {
                n.data.len() as u64 + n.links.iter().map(|l| l.size).sum::<u64>()
            }
            DagNode::Raw(n) => n.data.len() as u64,
        }
    }

    /// Links in name order; empty for raw leaves.
    pub fn links(&self) -> &[DagLink] {
        match self {
            DagNode::Proto(n) => n.links(),
            DagNode::Raw(_) => &[],
        }
    }

    pub fn as_proto(&self) -> Option<&ProtoNode> {
        match self {
            DagNode::Proto(n) => Some(n),
            DagNode::Raw(_) => None,
        }
    }

    pub fn into_proto(self) -> Result<ProtoNode> {
        match self {
            DagNode::Proto(n) => Ok(n),
            DagNode::Raw(_) => Err(MfsError::NotProtobuf),
        }
    }
}

impl From<ProtoNode> for DagNode {
    fn from(n: ProtoNode) -> Self {
        DagNode::Proto(n)
    }
}

impl From<RawNode> for DagNode {
    fn from(n: RawNode) -> Self {
        DagNode::Raw(n)
    }
}
