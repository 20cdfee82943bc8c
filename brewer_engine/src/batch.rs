//! The resolve-everything baseline, see [`execute`].
//!
//! Batch ER resolves the whole dataset before filtering and sorting. It is
//! the correctness oracle for the lazy scheduler: restricted to post-filter
//! survivors, the scheduler must emit exactly these rows.

use crate::{
    aggregate::aggregate_entity, entity::EntityBuilder, query::QuerySpec, QuerySnafu, Result,
};
use data_types::{AggregatedEntity, RecordId};
use matcher::Matcher;
use observability_deps::tracing::debug;
use rand::{rngs::SmallRng, SeedableRng};
use record_store::{BlockIndex, RecordStore};
use snafu::ResultExt;
use std::collections::HashSet;

/// Resolve every record, aggregate every entity, post-filter and sort.
pub fn execute(
    store: &RecordStore,
    blocks: &BlockIndex,
    matcher: &dyn Matcher,
    spec: &QuerySpec,
) -> Result<Vec<AggregatedEntity>> {
    spec.validate(store.schema()).context(QuerySnafu)?;

    let mut rng = SmallRng::seed_from_u64(spec.rng_seed);
    let builder = EntityBuilder::new(blocks, matcher);
    let mut resolved: HashSet<RecordId> = HashSet::new();
    let mut entities = Vec::new();

    for record in store.records() {
        if resolved.contains(record.id()) {
            continue;
        }
        let members = builder.expand(record.id());
        resolved.extend(members.iter().cloned());
        entities.push(aggregate_entity(&members, store, spec, &mut rng));
    }
    debug!(entities = entities.len(), "batch resolution complete");

    let mut rows: Vec<_> = entities
        .into_iter()
        .filter(|e| !(spec.ignore_null && e.order_key().is_null()))
        .filter(|e| spec.having.matches_entity(e))
        .collect();
    rows.sort_by(|a, b| {
        a.order_key()
            .cmp_in(&b.order_key(), spec.ordering_mode)
            .then_with(|| a.canonical().cmp(b.canonical()))
    });
    Ok(rows)
}
