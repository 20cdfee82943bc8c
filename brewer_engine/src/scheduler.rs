//! The lazy resolution core, see [`Scheduler`].

use crate::{
    aggregate::aggregate_entity, entity::EntityBuilder, query::QuerySpec, QuerySnafu, Result,
    UnknownRecordSnafu,
};
use data_types::{AggregatedEntity, OrderKey, Record, RecordId, SortOrder};
use matcher::{Matcher, MatcherStats};
use observability_deps::tracing::{debug, trace};
use rand::{rngs::SmallRng, SeedableRng};
use record_store::{BlockIndex, RecordStore};
use snafu::{OptionExt, ResultExt};
use std::{
    cmp::Ordering,
    collections::{BinaryHeap, HashMap, HashSet},
    sync::Arc,
};

/// Progress counters of one scheduler run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Heap entries popped, including skipped duplicates.
    pub heads_popped: u64,
    /// Entities resolved through the entity builder.
    pub entities_resolved: u64,
    /// Resolved entities pushed back to await their correct rank.
    pub sentinel_reinsertions: u64,
    /// Result rows emitted.
    pub emitted: u64,
}

/// The BrewER priority scheduler: resolves just enough of the dataset to
/// emit the next result row in ranking order.
///
/// The scheduler keeps a heap of *candidate heads*: unresolved records keyed
/// by their raw ordering-key value, which bounds the aggregated key of the
/// entity containing them. Popping the head triggers resolution of exactly
/// that entity. Since aggregation can move the key away from the bound, a
/// freshly resolved entity is only emitted if its true key still ranks no
/// worse than the next pending head; otherwise it re-enters the heap as a
/// *sentinel* carrying its true key and surfaces again at its correct rank.
///
/// One scheduler instance serves one query; it owns all mutable state (heap,
/// resolution table, caches) and shares the record store and block index
/// read-only. [`Scheduler::next_entity`] is a pull API: the caller drives
/// pacing, and dropping the scheduler mid-stream leaves a valid emitted
/// prefix.
#[derive(Debug)]
pub struct Scheduler {
    store: Arc<RecordStore>,
    blocks: Arc<BlockIndex>,
    matcher: Arc<dyn Matcher>,
    spec: QuerySpec,

    heap: BinaryHeap<HeapEntry>,
    /// Union-find parents; components are assigned atomically when an entity
    /// is resolved, so every parent points directly at the canonical id.
    resolved: HashMap<RecordId, RecordId>,
    /// Canonical ids of entities that have left the heap for good, whether
    /// or not they produced an output row.
    emitted: HashSet<RecordId>,
    entity_cache: HashMap<RecordId, AggregatedEntity>,

    rng: SmallRng,
    stats: SchedulerStats,
    done: bool,
}

impl Scheduler {
    /// Validate the query and seed the heap with the pre-filtered candidate
    /// heads.
    pub fn new(
        store: Arc<RecordStore>,
        blocks: Arc<BlockIndex>,
        matcher: Arc<dyn Matcher>,
        spec: QuerySpec,
    ) -> Result<Self> {
        spec.validate(store.schema()).context(QuerySnafu)?;

        let mut scheduler = Self {
            store,
            blocks,
            matcher,
            rng: SmallRng::seed_from_u64(spec.rng_seed),
            spec,
            heap: BinaryHeap::new(),
            resolved: HashMap::new(),
            emitted: HashSet::new(),
            entity_cache: HashMap::new(),
            stats: SchedulerStats::default(),
            done: false,
        };
        scheduler.seed_heap()?;
        Ok(scheduler)
    }

    fn seed_heap(&mut self) -> Result<()> {
        let schema = self.store.schema();
        let ok_idx = schema
            .index_of(&self.spec.ordering_key)
            .expect("query was validated against this schema");
        let mut seen: HashSet<RecordId> = HashSet::new();
        let mut heads: Vec<(OrderKey, usize, RecordId)> = vec![];

        let mut admit = |records: &[&Record], solved: bool, seen: &mut HashSet<RecordId>| {
            for record in self.spec.having.admit_block(records, schema, solved) {
                if seen.insert(record.id().clone()) {
                    heads.push((
                        OrderKey::from_value(record.value(ok_idx)),
                        record.row(),
                        record.id().clone(),
                    ));
                }
            }
        };

        for (_bid, members) in self.blocks.blocks() {
            let records = members
                .iter()
                .map(|rid| {
                    self.store
                        .get(rid)
                        .context(UnknownRecordSnafu { rid: rid.clone() })
                })
                .collect::<Result<Vec<_>>>()?;
            if records.len() > 1 {
                admit(&records, false, &mut seen);
            }
        }

        // records with no neighbours to explore are their own entity already
        let solved: Vec<&Record> = self
            .store
            .records()
            .filter(|r| self.blocks.neighbours(r.id()).is_empty())
            .collect();
        admit(&solved, true, &mut seen);

        let ignore_null = self.spec.ignore_null;
        let order = self.spec.ordering_mode;
        let mut dropped = 0usize;
        for (key, row, rid) in heads {
            if ignore_null && key.is_null() {
                dropped += 1;
                continue;
            }
            self.heap.push(HeapEntry {
                key,
                order,
                kind: EntryKind::Head { row, rid },
            });
        }

        debug!(
            candidates = self.heap.len(),
            null_key_dropped = dropped,
            "seeded candidate heads"
        );
        Ok(())
    }

    /// Produce the next result row, resolving entities as needed.
    ///
    /// Returns `None` once the heap is exhausted or `top_k` rows are out;
    /// the scheduler is fused afterwards.
    pub fn next_entity(&mut self) -> Option<AggregatedEntity> {
        if self.done {
            return None;
        }

        loop {
            let entry = match self.heap.pop() {
                Some(entry) => entry,
                None => {
                    self.done = true;
                    return None;
                }
            };
            self.stats.heads_popped += 1;

            let canonical = match entry.kind {
                EntryKind::Sentinel { canonical } => canonical,
                EntryKind::Head { rid, .. } => match self.resolved.get(&rid) {
                    Some(canonical) => canonical.clone(),
                    None => self.resolve(&rid),
                },
            };

            if self.emitted.contains(&canonical) {
                continue;
            }

            let order_key = self
                .entity_cache
                .get(&canonical)
                .expect("resolved entity is cached")
                .order_key();

            if self.spec.ignore_null && order_key.is_null() {
                self.emitted.insert(canonical);
                continue;
            }

            // the raw-value bound was optimistic; only emit while the true
            // key still ranks ahead of everything pending
            let top_key = self.heap.peek().map(|top| top.key);
            if let Some(top_key) = top_key {
                if !order_key.ranks_no_worse_than(&top_key, self.spec.ordering_mode) {
                    trace!(canonical = %canonical, "re-inserting resolved entity as sentinel");
                    self.stats.sentinel_reinsertions += 1;
                    self.heap.push(HeapEntry {
                        key: order_key,
                        order: self.spec.ordering_mode,
                        kind: EntryKind::Sentinel { canonical },
                    });
                    continue;
                }
            }

            self.emitted.insert(canonical.clone());
            let entity = self
                .entity_cache
                .get(&canonical)
                .expect("resolved entity is cached")
                .clone();

            if !self.spec.having.matches_entity(&entity) {
                continue;
            }

            self.stats.emitted += 1;
            if let Some(k) = self.spec.top_k_limit() {
                if self.stats.emitted >= k {
                    self.done = true;
                }
            }
            return Some(entity);
        }
    }

    fn resolve(&mut self, rid: &RecordId) -> RecordId {
        let builder = EntityBuilder::new(&self.blocks, self.matcher.as_ref());
        let members = builder.expand(rid);
        let entity = aggregate_entity(&members, &self.store, &self.spec, &mut self.rng);
        let canonical = entity.canonical().clone();

        for member in &members {
            self.resolved.insert(member.clone(), canonical.clone());
        }
        self.entity_cache.insert(canonical.clone(), entity);
        self.stats.entities_resolved += 1;
        canonical
    }

    /// The query this scheduler runs.
    pub fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    /// Progress counters so far.
    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    /// Oracle cache statistics so far.
    pub fn matcher_stats(&self) -> MatcherStats {
        self.matcher.stats()
    }
}

impl Iterator for Scheduler {
    type Item = AggregatedEntity;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entity()
    }
}

/// A heap entry: a candidate head (unresolved record bounded by its raw
/// ordering-key value) or a sentinel (resolved entity carrying its true
/// key).
#[derive(Debug, Clone)]
struct HeapEntry {
    key: OrderKey,
    order: SortOrder,
    kind: EntryKind,
}

#[derive(Debug, Clone)]
enum EntryKind {
    Head { row: usize, rid: RecordId },
    Sentinel { canonical: RecordId },
}

impl HeapEntry {
    /// `Less` means this entry is scheduled first. Keys compare in query
    /// direction with empty keys last; at equal keys fresh heads precede
    /// sentinels, then dataset order and canonical id break the remaining
    /// ties.
    fn rank(&self, other: &Self) -> Ordering {
        self.key
            .cmp_in(&other.key, self.order)
            .then_with(|| match (&self.kind, &other.kind) {
                (EntryKind::Head { row: a, .. }, EntryKind::Head { row: b, .. }) => a.cmp(b),
                (EntryKind::Head { .. }, EntryKind::Sentinel { .. }) => Ordering::Less,
                (EntryKind::Sentinel { .. }, EntryKind::Head { .. }) => Ordering::Greater,
                (EntryKind::Sentinel { canonical: a }, EntryKind::Sentinel { canonical: b }) => {
                    a.cmp(b)
                }
            })
    }
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.rank(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap pops its greatest entry; rank() orders best-first
        self.rank(other).reverse()
    }
}
