//! Folds the records of a resolved entity into one aggregated row.

use crate::query::QuerySpec;
use data_types::{
    AggregateFn, AggregatedEntity, AttrValue, ColumnType, OrderKey, Record, RecordId,
};
use itertools::Itertools;
use observability_deps::tracing::warn;
use rand::{rngs::SmallRng, Rng};
use record_store::RecordStore;
use std::collections::{BTreeSet, HashMap};

/// Separator used by the `concat` aggregation.
pub const CONCAT_SEPARATOR: &str = ", ";

/// Aggregate the members of one entity under the query's aggregation map.
///
/// Members are visited in dataset order regardless of how the entity was
/// discovered, so vote tie-breaking ("first seen") and the `random` draw
/// sequence are deterministic for a given store and seed.
pub fn aggregate_entity(
    members: &BTreeSet<RecordId>,
    store: &RecordStore,
    spec: &QuerySpec,
    rng: &mut SmallRng,
) -> AggregatedEntity {
    let mut records: Vec<&Record> = members.iter().filter_map(|rid| store.get(rid)).collect();
    records.sort_by_key(|r| r.row());

    let schema = store.schema();
    let mut values = HashMap::new();
    for (idx, column) in schema.columns().enumerate() {
        let func = match spec.aggregations.get(column.name()) {
            Some(func) => *func,
            None => continue,
        };
        let column_values: Vec<&AttrValue> = records.iter().map(|r| r.value(idx)).collect();
        values.insert(
            column.name().to_string(),
            apply(func, column.column_type(), column.name(), &column_values, rng),
        );
    }

    let order_key = values
        .get(&spec.ordering_key)
        .map(OrderKey::from_value)
        .unwrap_or_else(OrderKey::null);

    AggregatedEntity::new(members.iter().cloned().collect(), values, order_key)
}

/// Fold the values of one attribute.
pub fn apply(
    func: AggregateFn,
    column_type: ColumnType,
    attribute: &str,
    values: &[&AttrValue],
    rng: &mut SmallRng,
) -> AttrValue {
    match func {
        AggregateFn::Min => extremum(column_type, values, false),
        AggregateFn::Max => extremum(column_type, values, true),
        AggregateFn::Avg => {
            let nums = numeric_values(attribute, values);
            if nums.is_empty() {
                AttrValue::Null
            } else {
                AttrValue::Number(nums.iter().sum::<f64>() / nums.len() as f64)
            }
        }
        AggregateFn::Sum => {
            let nums = numeric_values(attribute, values);
            if nums.is_empty() {
                AttrValue::Null
            } else {
                AttrValue::Number(nums.iter().sum())
            }
        }
        AggregateFn::Vote => vote(column_type, values),
        AggregateFn::Random => {
            let present: Vec<&&AttrValue> = values.iter().filter(|v| !v.is_null()).collect();
            if present.is_empty() {
                AttrValue::Null
            } else {
                (*present[rng.gen_range(0..present.len())]).clone()
            }
        }
        AggregateFn::Concat => {
            let unique: BTreeSet<String> = values
                .iter()
                .filter_map(|v| v.as_text())
                .map(|t| t.into_owned())
                .collect();
            if unique.is_empty() {
                AttrValue::Null
            } else {
                AttrValue::Text(unique.iter().join(CONCAT_SEPARATOR))
            }
        }
    }
}

/// Min or max over the non-null values: numeric for numeric columns,
/// lexicographic for text columns.
fn extremum(column_type: ColumnType, values: &[&AttrValue], largest: bool) -> AttrValue {
    match column_type {
        ColumnType::Numeric => {
            let result = values
                .iter()
                .filter_map(|v| v.as_f64())
                .reduce(|a, b| match largest {
                    true => a.max(b),
                    false => a.min(b),
                });
            result.map(AttrValue::Number).unwrap_or(AttrValue::Null)
        }
        ColumnType::Text => {
            let result = values
                .iter()
                .filter_map(|v| v.as_text())
                .reduce(|a, b| match (b > a) == largest {
                    true => b,
                    false => a,
                });
            result
                .map(|t| AttrValue::Text(t.into_owned()))
                .unwrap_or(AttrValue::Null)
        }
    }
}

/// The non-null numeric values of the column; non-numeric values count as
/// null and are logged once each.
fn numeric_values(attribute: &str, values: &[&AttrValue]) -> Vec<f64> {
    values
        .iter()
        .filter(|v| !v.is_null())
        .filter_map(|v| match v.as_f64() {
            Some(n) => Some(n),
            None => {
                warn!(
                    attribute,
                    value = ?v,
                    "non-numeric value in numeric aggregation, treating as null"
                );
                None
            }
        })
        .collect()
}

/// Majority vote over the stringified non-null values; ties break by
/// first-seen order.
fn vote(column_type: ColumnType, values: &[&AttrValue]) -> AttrValue {
    let mut counts: Vec<(String, u64)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for text in values.iter().filter_map(|v| v.as_text()) {
        match index.get(text.as_ref()) {
            Some(&i) => counts[i].1 += 1,
            None => {
                index.insert(text.clone().into_owned(), counts.len());
                counts.push((text.into_owned(), 1));
            }
        }
    }

    // counts is in first-seen order, so a later value must win strictly
    let mut best: Option<&(String, u64)> = None;
    for candidate in &counts {
        match best {
            Some(leader) if leader.1 >= candidate.1 => {}
            _ => best = Some(candidate),
        }
    }
    let winner = best.map(|(text, _)| text.clone());

    match winner {
        None => AttrValue::Null,
        Some(text) => match column_type {
            ColumnType::Numeric => text
                .parse::<f64>()
                .map(AttrValue::Number)
                .unwrap_or(AttrValue::Text(text)),
            ColumnType::Text => AttrValue::Text(text),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn rng() -> SmallRng {
        SmallRng::seed_from_u64(7)
    }

    fn apply_text(func: AggregateFn, values: &[&AttrValue]) -> AttrValue {
        apply(func, ColumnType::Text, "attr", values, &mut rng())
    }

    fn apply_num(func: AggregateFn, values: &[&AttrValue]) -> AttrValue {
        apply(func, ColumnType::Numeric, "attr", values, &mut rng())
    }

    #[test]
    fn min_max_skip_nulls_and_nans() {
        let values: Vec<AttrValue> = vec![
            AttrValue::Number(3.0),
            AttrValue::Number(f64::NAN),
            AttrValue::Null,
            AttrValue::Number(9.5),
        ];
        let refs: Vec<&AttrValue> = values.iter().collect();

        assert_eq!(apply_num(AggregateFn::Min, &refs), AttrValue::Number(3.0));
        assert_eq!(apply_num(AggregateFn::Max, &refs), AttrValue::Number(9.5));
        assert_eq!(
            apply_num(AggregateFn::Min, &[&AttrValue::Null]),
            AttrValue::Null
        );
    }

    #[test]
    fn min_max_are_lexicographic_on_text() {
        let values: Vec<AttrValue> = vec![
            AttrValue::from("eos"),
            AttrValue::Null,
            AttrValue::from("5d"),
        ];
        let refs: Vec<&AttrValue> = values.iter().collect();

        assert_eq!(apply_text(AggregateFn::Min, &refs), AttrValue::from("5d"));
        assert_eq!(apply_text(AggregateFn::Max, &refs), AttrValue::from("eos"));
    }

    #[test]
    fn avg_and_sum() {
        let values: Vec<AttrValue> = vec![
            AttrValue::Number(2.0),
            AttrValue::Number(4.0),
            AttrValue::Number(f64::NAN),
        ];
        let refs: Vec<&AttrValue> = values.iter().collect();

        assert_eq!(apply_num(AggregateFn::Avg, &refs), AttrValue::Number(3.0));
        assert_eq!(apply_num(AggregateFn::Sum, &refs), AttrValue::Number(6.0));
        assert_eq!(apply_num(AggregateFn::Avg, &[]), AttrValue::Null);
        assert_eq!(apply_num(AggregateFn::Sum, &[]), AttrValue::Null);
    }

    #[test]
    fn vote_majority_and_first_seen_ties() {
        let values: Vec<AttrValue> = vec![
            AttrValue::from("canon"),
            AttrValue::from("kanon"),
            AttrValue::from("canon"),
            AttrValue::Null,
        ];
        let refs: Vec<&AttrValue> = values.iter().collect();
        assert_eq!(apply_text(AggregateFn::Vote, &refs), AttrValue::from("canon"));

        // tie: the value seen first wins
        let values: Vec<AttrValue> = vec![AttrValue::from("eos"), AttrValue::from("5d")];
        let refs: Vec<&AttrValue> = values.iter().collect();
        assert_eq!(apply_text(AggregateFn::Vote, &refs), AttrValue::from("eos"));

        // a strict majority wins regardless of position
        let values: Vec<AttrValue> = vec![
            AttrValue::from("eos"),
            AttrValue::from("5d"),
            AttrValue::from("5d"),
        ];
        let refs: Vec<&AttrValue> = values.iter().collect();
        assert_eq!(apply_text(AggregateFn::Vote, &refs), AttrValue::from("5d"));
    }

    #[test]
    fn vote_on_numeric_column_yields_number() {
        let values: Vec<AttrValue> = vec![
            AttrValue::Number(12.0),
            AttrValue::Number(12.0),
            AttrValue::Number(10.0),
        ];
        let refs: Vec<&AttrValue> = values.iter().collect();
        assert_eq!(apply_num(AggregateFn::Vote, &refs), AttrValue::Number(12.0));
    }

    #[test]
    fn concat_is_sorted_unique() {
        let values: Vec<AttrValue> = vec![
            AttrValue::from("eos"),
            AttrValue::from("5d"),
            AttrValue::from("eos"),
        ];
        let refs: Vec<&AttrValue> = values.iter().collect();
        assert_eq!(
            apply_text(AggregateFn::Concat, &refs),
            AttrValue::from("5d, eos")
        );
        assert_eq!(apply_text(AggregateFn::Concat, &[]), AttrValue::Null);
    }

    #[test]
    fn random_is_reproducible_for_a_seed() {
        let values: Vec<AttrValue> = vec![
            AttrValue::from("a"),
            AttrValue::from("b"),
            AttrValue::from("c"),
        ];
        let refs: Vec<&AttrValue> = values.iter().collect();

        let mut rng_a = SmallRng::seed_from_u64(42);
        let mut rng_b = SmallRng::seed_from_u64(42);
        for _ in 0..10 {
            assert_eq!(
                apply(AggregateFn::Random, ColumnType::Text, "attr", &refs, &mut rng_a),
                apply(AggregateFn::Random, ColumnType::Text, "attr", &refs, &mut rng_b),
            );
        }

        assert_eq!(
            apply(AggregateFn::Random, ColumnType::Text, "attr", &[], &mut rng_a),
            AttrValue::Null
        );
    }
}
