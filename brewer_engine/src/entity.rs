//! Entity expansion, see [`EntityBuilder`].

use data_types::RecordId;
use matcher::Matcher;
use observability_deps::tracing::trace;
use record_store::BlockIndex;
use std::collections::BTreeSet;

/// Expands a seed record into its full entity.
///
/// The entity of a record is the connected component containing it in the
/// graph whose edges are oracle-confirmed matches between co-blocked
/// records. Expansion is a BFS that discovers edges lazily: the full edge
/// list is never materialized, and pairs that share no block are never sent
/// to the oracle.
///
/// Because the oracle is symmetric, expansion is confluent: any seed within
/// the same true entity produces the same member set.
#[derive(Debug)]
pub struct EntityBuilder<'a> {
    blocks: &'a BlockIndex,
    matcher: &'a dyn Matcher,
}

impl<'a> EntityBuilder<'a> {
    /// Create a builder over the given block index and oracle.
    pub fn new(blocks: &'a BlockIndex, matcher: &'a dyn Matcher) -> Self {
        Self { blocks, matcher }
    }

    /// The member set of the entity containing `seed`.
    ///
    /// A seed without co-blocked neighbours resolves to a singleton without
    /// any oracle call.
    pub fn expand(&self, seed: &RecordId) -> BTreeSet<RecordId> {
        let mut entity = BTreeSet::from([seed.clone()]);
        let mut frontier = vec![seed.clone()];

        while let Some(record) = frontier.pop() {
            for neighbour in self.blocks.neighbours(&record) {
                if entity.contains(&neighbour) {
                    continue;
                }
                // the matcher contract only admits co-blocked pairs
                debug_assert!(
                    co_blocked(self.blocks, &record, &neighbour),
                    "oracle call outside the block graph: ({}, {})",
                    record,
                    neighbour,
                );
                if self.matcher.matches(&record, &neighbour) {
                    entity.insert(neighbour.clone());
                    frontier.push(neighbour);
                }
            }
        }

        trace!(seed = %seed, members = entity.len(), "expanded entity");
        entity
    }
}

fn co_blocked(blocks: &BlockIndex, a: &RecordId, b: &RecordId) -> bool {
    let b_blocks = blocks.blocks_of(b);
    blocks.blocks_of(a).iter().any(|bid| b_blocks.contains(bid))
}

#[cfg(test)]
mod tests {
    use super::*;
    use matcher::GoldMatcher;

    fn rid(s: &str) -> RecordId {
        RecordId::from(s)
    }

    fn members(entity: &BTreeSet<RecordId>) -> Vec<&str> {
        entity.iter().map(RecordId::as_str).collect()
    }

    #[test]
    fn expands_transitively_within_a_block() {
        let blocks = BlockIndex::new(vec![vec![rid("a"), rid("b"), rid("c"), rid("d")]], None);
        // a-b and b-c match, d does not; transitivity pulls c in via b
        let matcher = GoldMatcher::new([(rid("a"), rid("b")), (rid("b"), rid("c"))]);
        let builder = EntityBuilder::new(&blocks, &matcher);

        let entity = builder.expand(&rid("a"));
        assert_eq!(members(&entity), vec!["a", "b", "c"]);
    }

    #[test]
    fn expansion_is_confluent_across_seeds() {
        let blocks = BlockIndex::new(vec![vec![rid("a"), rid("b"), rid("c")]], None);
        let gold = [(rid("a"), rid("b")), (rid("b"), rid("c"))];

        let seeds = [rid("a"), rid("b"), rid("c")];
        let mut results = vec![];
        for seed in &seeds {
            let matcher = GoldMatcher::new(gold.clone());
            let builder = EntityBuilder::new(&blocks, &matcher);
            results.push(builder.expand(seed));
        }
        assert_eq!(results[0], results[1]);
        assert_eq!(results[1], results[2]);
    }

    #[test]
    fn entity_can_span_blocks() {
        // b is co-blocked with a and with c, in different blocks
        let blocks = BlockIndex::new(
            vec![vec![rid("a"), rid("b")], vec![rid("b"), rid("c")]],
            None,
        );
        let matcher = GoldMatcher::new([(rid("a"), rid("b")), (rid("b"), rid("c"))]);
        let builder = EntityBuilder::new(&blocks, &matcher);

        let entity = builder.expand(&rid("a"));
        assert_eq!(members(&entity), vec!["a", "b", "c"]);
    }

    #[test]
    fn singleton_needs_no_oracle_calls() {
        let blocks = BlockIndex::new(vec![vec![rid("a")]], None);
        let matcher = GoldMatcher::new([]);
        let builder = EntityBuilder::new(&blocks, &matcher);

        let entity = builder.expand(&rid("a"));
        assert_eq!(members(&entity), vec!["a"]);
        assert_eq!(matcher.stats().uncached_calls, 0);
        assert_eq!(matcher.stats().cached_hits, 0);
    }

    #[test]
    fn memoization_makes_uncached_calls_distinct_pairs() {
        let blocks = BlockIndex::new(vec![vec![rid("a"), rid("b"), rid("c")]], None);
        let matcher = GoldMatcher::new([(rid("a"), rid("b"))]);
        let builder = EntityBuilder::new(&blocks, &matcher);

        builder.expand(&rid("a"));
        builder.expand(&rid("c"));

        // pairs examined: (a,b), (a,c), (b,c) at most once each uncached
        assert_eq!(matcher.stats().uncached_calls, 3);
    }
}
