//! # CSR Topology Layout
//!
//! Byte layout of the topology file, read in place from the partition's
//! topology buffer. All words are little-endian.
//!
//! ```text
//! [version u64 = 1][edge_data_size u64 = 0][num_nodes u64][num_edges u64]
//! [out_indices u64 x num_nodes][out_dests u32 x num_edges]
//! ```
//!
//! `out_indices[i]` is the end offset of node `i`'s edges (a prefix sum of
//! out-degrees), so node `i` owns edges `out_indices[i-1]..out_indices[i]`.
//! Edge attributes live in columns, never in the topology file.

use crate::primitives::{TOPOLOGY_FORMAT_VERSION, TOPOLOGY_HEADER_SIZE};
use crate::{EdgeId, NodeId, RdgError};
use bytes::{BufMut, Bytes, BytesMut};
use std::ops::Range;

fn read_u64(bytes: &[u8], i: usize) -> u64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(&bytes[i * 8..i * 8 + 8]);
    u64::from_le_bytes(word)
}

fn read_u32(bytes: &[u8], i: usize) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&bytes[i * 4..i * 4 + 4]);
    u32::from_le_bytes(word)
}

fn invalid(msg: impl Into<String>) -> RdgError {
    RdgError::InvalidArgument(format!("topology: {}", msg.into()))
}

/// A validated view over a topology buffer.
#[derive(Debug, Clone, Copy)]
pub struct CsrTopology<'a> {
    out_indices: &'a [u8],
    out_dests: &'a [u8],
    num_nodes: usize,
    num_edges: usize,
}

impl<'a> CsrTopology<'a> {
    /// Validate `bytes` and view them as a CSR graph.
    ///
    /// Checks the header, the exact buffer size, that offsets never
    /// decrease and end at `num_edges`, and that every destination is a
    /// valid node.
    pub fn parse(bytes: &'a [u8]) -> Result<Self, RdgError> {
        if bytes.len() < TOPOLOGY_HEADER_SIZE {
            return Err(invalid(format!("{} bytes is shorter than the header", bytes.len())));
        }
        let version = read_u64(bytes, 0);
        if version != TOPOLOGY_FORMAT_VERSION {
            return Err(invalid(format!("unsupported version {version}")));
        }
        let edge_data_size = read_u64(bytes, 1);
        if edge_data_size != 0 {
            return Err(invalid("inline edge data is not supported"));
        }
        let num_nodes = read_u64(bytes, 2);
        let num_edges = read_u64(bytes, 3);
        if num_nodes > u64::from(u32::MAX) {
            return Err(invalid(format!("{num_nodes} nodes exceed the node id space")));
        }

        let num_nodes = num_nodes as usize;
        let num_edges = usize::try_from(num_edges).map_err(|_| invalid("edge count overflow"))?;
        let expected = num_nodes
            .checked_mul(8)
            .zip(num_edges.checked_mul(4))
            .and_then(|(a, b)| a.checked_add(b))
            .and_then(|body| body.checked_add(TOPOLOGY_HEADER_SIZE))
            .ok_or_else(|| invalid("size overflow"))?;
        if bytes.len() != expected {
            return Err(invalid(format!(
                "{} bytes, expected {} for {} nodes and {} edges",
                bytes.len(),
                expected,
                num_nodes,
                num_edges
            )));
        }

        let body = &bytes[TOPOLOGY_HEADER_SIZE..];
        let (out_indices, out_dests) = body.split_at(num_nodes * 8);
        let topology = Self {
            out_indices,
            out_dests,
            num_nodes,
            num_edges,
        };
        topology.check_structure()?;
        Ok(topology)
    }

    /// View a buffer that already passed `parse`, skipping the O(n + m)
    /// structure checks.
    pub(crate) fn parse_validated(bytes: &'a [u8]) -> Result<Self, RdgError> {
        if bytes.len() < TOPOLOGY_HEADER_SIZE {
            return Err(invalid("missing header"));
        }
        let num_nodes = read_u64(bytes, 2) as usize;
        let num_edges = read_u64(bytes, 3) as usize;
        let body = &bytes[TOPOLOGY_HEADER_SIZE..];
        if body.len() < num_nodes * 8 {
            return Err(invalid("truncated offsets"));
        }
        let (out_indices, out_dests) = body.split_at(num_nodes * 8);
        Ok(Self {
            out_indices,
            out_dests,
            num_nodes,
            num_edges,
        })
    }

    fn check_structure(&self) -> Result<(), RdgError> {
        let mut prev = 0u64;
        for i in 0..self.num_nodes {
            let end = read_u64(self.out_indices, i);
            if end < prev {
                return Err(invalid(format!("offsets decrease at node {i}")));
            }
            prev = end;
        }
        if prev != self.num_edges as u64 {
            return Err(invalid(format!(
                "offsets end at {prev}, expected {}",
                self.num_edges
            )));
        }
        for e in 0..self.num_edges {
            let dest = read_u32(self.out_dests, e);
            if dest as usize >= self.num_nodes {
                return Err(invalid(format!("edge {e} points at missing node {dest}")));
            }
        }
        Ok(())
    }

    /// Encode a CSR graph into a topology buffer.
    pub fn encode(out_indices: &[u64], out_dests: &[u32]) -> Result<Bytes, RdgError> {
        let mut buf = BytesMut::with_capacity(
            TOPOLOGY_HEADER_SIZE + out_indices.len() * 8 + out_dests.len() * 4,
        );
        buf.put_u64_le(TOPOLOGY_FORMAT_VERSION);
        buf.put_u64_le(0);
        buf.put_u64_le(out_indices.len() as u64);
        buf.put_u64_le(out_dests.len() as u64);
        for &end in out_indices {
            buf.put_u64_le(end);
        }
        for &dest in out_dests {
            buf.put_u32_le(dest);
        }
        let bytes = buf.freeze();
        CsrTopology::parse(&bytes)?;
        Ok(bytes)
    }

    /// Buffer of a graph with no nodes.
    #[must_use]
    pub fn empty() -> Bytes {
        let mut buf = BytesMut::with_capacity(TOPOLOGY_HEADER_SIZE);
        buf.put_u64_le(TOPOLOGY_FORMAT_VERSION);
        buf.put_u64_le(0);
        buf.put_u64_le(0);
        buf.put_u64_le(0);
        buf.freeze()
    }

    /// Node count.
    #[must_use]
    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    /// Edge count.
    #[must_use]
    pub fn num_edges(&self) -> usize {
        self.num_edges
    }

    /// First edge of `node`; `num_edges` past the last node.
    #[must_use]
    pub fn edge_begin(&self, node: NodeId) -> EdgeId {
        match node.index() {
            0 => EdgeId(0),
            i if i <= self.num_nodes => EdgeId(read_u64(self.out_indices, i - 1)),
            _ => EdgeId(self.num_edges as u64),
        }
    }

    /// One past the last edge of `node`; `num_edges` past the last node.
    #[must_use]
    pub fn edge_end(&self, node: NodeId) -> EdgeId {
        let i = node.index();
        if i < self.num_nodes {
            EdgeId(read_u64(self.out_indices, i))
        } else {
            EdgeId(self.num_edges as u64)
        }
    }

    /// Edge ids of `node`; empty for ids past the last node.
    #[must_use]
    pub fn edge_range(&self, node: NodeId) -> Range<u64> {
        self.edge_begin(node).0..self.edge_end(node).0
    }

    /// Destination of `edge`, if it exists.
    #[must_use]
    pub fn edge_dest(&self, edge: EdgeId) -> Option<NodeId> {
        let i = edge.index();
        (i < self.num_edges).then(|| NodeId(read_u32(self.out_dests, i)))
    }
}
