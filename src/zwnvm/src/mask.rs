//! Node-mask bit helpers.
//!
//! A node mask is a fixed-size byte array with one bit per node id. Bit
//! index for id N is `(N-1)`: byte `(N-1) >> 3`, bit `(N-1) & 7`. Both the
//! flat and the object-store codec use the identical arithmetic; what
//! *signals* node existence differs per codec and is deliberately not part
//! of this type.

/// Maximum number of classic (non-long-range) Z-Wave nodes.
pub const CLASSIC_MAX_NODES: u16 = 232;
/// Classic node-mask length in bytes.
pub const CLASSIC_NODEMASK_LENGTH: usize = (CLASSIC_MAX_NODES as usize) / 8;

/// Number of node ids in the long-range extension.
pub const LR_MAX_NODES: u16 = 1024;
/// First long-range node id. Mask position 1 maps to this id.
pub const LR_MIN_NODE_ID: u16 = 256;
/// Highest long-range node id.
pub const LR_MAX_NODE_ID: u16 = LR_MIN_NODE_ID + LR_MAX_NODES - 1;
/// Long-range node-mask length in bytes.
pub const LR_NODEMASK_LENGTH: usize = (LR_MAX_NODES as usize) / 8;

/// Fixed-size node bit mask. One independent instance per semantic flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeMask<const LEN: usize>([u8; LEN]);

/// 29-byte mask covering classic node ids 1..=232.
pub type ClassicNodeMask = NodeMask<CLASSIC_NODEMASK_LENGTH>;
/// 128-byte mask covering long-range mask positions 1..=1024.
pub type LongRangeNodeMask = NodeMask<LR_NODEMASK_LENGTH>;

impl<const LEN: usize> Default for NodeMask<LEN> {
    fn default() -> Self {
        Self([0u8; LEN])
    }
}

impl<const LEN: usize> NodeMask<LEN> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(bytes: [u8; LEN]) -> Self {
        Self(bytes)
    }

    /// Parse from a byte slice; short input is zero-extended, long input
    /// truncated.
    pub fn from_slice(bytes: &[u8]) -> Self {
        let mut mask = [0u8; LEN];
        let n = bytes.len().min(LEN);
        mask[..n].copy_from_slice(&bytes[..n]);
        Self(mask)
    }

    pub fn as_bytes(&self) -> &[u8; LEN] {
        &self.0
    }

    /// Set the bit for node id `id`. Ids outside 1..=LEN*8 are ignored.
    pub fn set(&mut self, id: u16) {
        if id >= 1 && (id as usize) <= LEN * 8 {
            let index = (id - 1) as usize;
            self.0[index >> 3] |= 1 << (index & 7);
        }
    }

    /// Test the bit for node id `id`. Ids outside 1..=LEN*8 read as unset.
    pub fn contains(&self, id: u16) -> bool {
        if id >= 1 && (id as usize) <= LEN * 8 {
            let index = (id - 1) as usize;
            (self.0[index >> 3] >> (index & 7)) & 1 != 0
        } else {
            false
        }
    }

    /// Clear the whole mask (zero-fills the backing array).
    pub fn clear(&mut self) {
        self.0 = [0u8; LEN];
    }

    pub fn count(&self) -> usize {
        self.0.iter().map(|b| b.count_ones() as usize).sum()
    }

    /// Iterate the set node ids in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        (1..=(LEN * 8) as u16).filter(move |&id| self.contains(id))
    }
}
