//! Static block index, see [`BlockIndex`].

use data_types::{BlockId, RecordId};
use std::collections::{HashMap, HashSet};

/// Static mapping between blocks and records.
///
/// Blocks are the connected components of the raw blocking output, already
/// transitively closed offline: every candidate matching pair is co-blocked,
/// and pairs that never share a block are assumed non-matching. The index is
/// read-only during query execution.
#[derive(Debug)]
pub struct BlockIndex {
    blocks: Vec<Vec<RecordId>>,
    costs: Vec<u64>,
    by_record: HashMap<RecordId, Vec<BlockId>>,
}

/// Pairwise comparison cost of a block of `n` records.
fn default_cost(n: usize) -> u64 {
    let n = n as u64;
    n * n.saturating_sub(1) / 2
}

impl BlockIndex {
    /// Build an index from block membership lists, deriving each record's
    /// block set and, when `costs` is absent, the default pairwise cost.
    pub fn new(blocks: Vec<Vec<RecordId>>, costs: Option<Vec<u64>>) -> Self {
        let costs =
            costs.unwrap_or_else(|| blocks.iter().map(|b| default_cost(b.len())).collect());
        let by_record = derive_membership(&blocks);

        Self {
            blocks,
            costs,
            by_record,
        }
    }

    /// Build an index with an explicit record-to-blocks mapping, as loaded
    /// from the companion `record_blocks` file.
    pub fn from_parts(
        blocks: Vec<Vec<RecordId>>,
        costs: Vec<u64>,
        by_record: HashMap<RecordId, Vec<BlockId>>,
    ) -> Self {
        Self {
            blocks,
            costs,
            by_record,
        }
    }

    /// An index for running without blocking: all records share one block.
    pub fn single_block(rids: impl IntoIterator<Item = RecordId>) -> Self {
        Self::new(vec![rids.into_iter().collect()], None)
    }

    /// The blocks the record belongs to; empty for records untouched by
    /// blocking (implicit singletons).
    pub fn blocks_of(&self, rid: &RecordId) -> &[BlockId] {
        self.by_record.get(rid).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The member records of a block.
    ///
    /// # Panics
    ///
    /// If the block id is out of range.
    pub fn records_of(&self, bid: BlockId) -> &[RecordId] {
        &self.blocks[bid.get() as usize]
    }

    /// The comparison cost of a block.
    ///
    /// # Panics
    ///
    /// If the block id is out of range.
    pub fn cost(&self, bid: BlockId) -> u64 {
        self.costs[bid.get() as usize]
    }

    /// All blocks with their ids.
    pub fn blocks(&self) -> impl Iterator<Item = (BlockId, &[RecordId])> {
        self.blocks
            .iter()
            .enumerate()
            .map(|(i, b)| (BlockId::new(i as u64), b.as_slice()))
    }

    /// The records co-blocked with `rid`, deduplicated, without `rid`
    /// itself.
    pub fn neighbours(&self, rid: &RecordId) -> Vec<RecordId> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for bid in self.blocks_of(rid) {
            for other in self.records_of(*bid) {
                if other != rid && seen.insert(other.clone()) {
                    out.push(other.clone());
                }
            }
        }
        out
    }

    /// Number of blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Whether the index holds no blocks.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

fn derive_membership(blocks: &[Vec<RecordId>]) -> HashMap<RecordId, Vec<BlockId>> {
    let mut by_record: HashMap<RecordId, Vec<BlockId>> = HashMap::new();
    for (i, block) in blocks.iter().enumerate() {
        for rid in block {
            by_record
                .entry(rid.clone())
                .or_default()
                .push(BlockId::new(i as u64));
        }
    }
    by_record
}
