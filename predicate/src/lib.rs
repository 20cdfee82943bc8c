//! HAVING predicate evaluation.
//!
//! A query carries exactly two substring conditions combined with AND or OR.
//! The same predicate is applied three ways during execution:
//!
//! * strictly, to a single raw record (seeding already-resolved records);
//! * as a block-level admission test over a set of co-blocked raw records,
//!   where an AND may be satisfied by *different* records that later merge
//!   into one entity;
//! * strictly, to the aggregated values of a resolved entity (post-filter).
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(
    missing_debug_implementations,
    clippy::explicit_iter_loop,
    clippy::use_self,
    clippy::clone_on_ref_ptr
)]

use data_types::{AggregatedEntity, AttrValue, LogicalOp, Record, Schema};
use observability_deps::tracing::trace;

/// One HAVING condition: a substring test against a stringified attribute.
///
/// A null attribute never matches. Both conditions of a predicate may name
/// the same attribute; they are then two independent substring tests on that
/// column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HavingClause {
    attribute: String,
    needle: String,
}

impl HavingClause {
    /// Create a clause testing that `attribute` contains `needle`.
    pub fn new(attribute: impl Into<String>, needle: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            needle: needle.into(),
        }
    }

    /// The attribute this clause tests.
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// The substring this clause looks for.
    pub fn needle(&self) -> &str {
        &self.needle
    }

    /// Whether a single value satisfies the clause.
    pub fn matches_value(&self, value: &AttrValue) -> bool {
        value
            .as_text()
            .map(|t| t.contains(&self.needle))
            .unwrap_or(false)
    }

    fn matches_record(&self, record: &Record, schema: &Schema) -> bool {
        schema
            .index_of(&self.attribute)
            .map(|i| self.matches_value(record.value(i)))
            .unwrap_or(false)
    }
}

/// The full HAVING predicate of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HavingPredicate {
    clauses: [HavingClause; 2],
    op: LogicalOp,
}

impl HavingPredicate {
    /// Combine two clauses with the given operator.
    pub fn new(first: HavingClause, second: HavingClause, op: LogicalOp) -> Self {
        Self {
            clauses: [first, second],
            op,
        }
    }

    /// The two clauses.
    pub fn clauses(&self) -> &[HavingClause; 2] {
        &self.clauses
    }

    /// The logical operator.
    pub fn op(&self) -> LogicalOp {
        self.op
    }

    /// Strict per-record evaluation.
    pub fn matches_record(&self, record: &Record, schema: &Schema) -> bool {
        let [a, b] = &self.clauses;
        match self.op {
            LogicalOp::And => {
                a.matches_record(record, schema) && b.matches_record(record, schema)
            }
            LogicalOp::Or => a.matches_record(record, schema) || b.matches_record(record, schema),
        }
    }

    /// Pre-filter a set of co-blocked raw records, returning the members
    /// that may seed a result entity.
    ///
    /// `solved` marks records with no neighbours left to explore; they can
    /// never gain attribute values through merging, so the predicate applies
    /// strictly. Unsolved AND admission is block-level: the set is admitted
    /// only if every condition is satisfied by at least one of its records —
    /// records carrying the conditions separately may still merge into one
    /// satisfying entity — and rejected wholesale otherwise. Admitted sets
    /// (and the OR case) then contribute the records matching at least one
    /// condition.
    pub fn admit_block<'a>(
        &self,
        records: &[&'a Record],
        schema: &Schema,
        solved: bool,
    ) -> Vec<&'a Record> {
        let [a, b] = &self.clauses;

        if self.op == LogicalOp::And {
            if solved {
                return records
                    .iter()
                    .filter(|r| self.matches_record(r, schema))
                    .copied()
                    .collect();
            }

            for clause in [a, b] {
                if !records.iter().any(|r| clause.matches_record(r, schema)) {
                    trace!(
                        attribute = clause.attribute(),
                        needle = clause.needle(),
                        "block rejected: condition unsatisfiable"
                    );
                    return vec![];
                }
            }
        }

        records
            .iter()
            .filter(|r| a.matches_record(r, schema) || b.matches_record(r, schema))
            .copied()
            .collect()
    }

    /// Post-filter an aggregated entity.
    pub fn matches_entity(&self, entity: &AggregatedEntity) -> bool {
        let [a, b] = &self.clauses;
        let matches = |c: &HavingClause| {
            entity
                .value(c.attribute())
                .map(|v| c.matches_value(v))
                .unwrap_or(false)
        };
        match self.op {
            LogicalOp::And => matches(a) && matches(b),
            LogicalOp::Or => matches(a) || matches(b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use data_types::{ColumnType, OrderKey, RecordId};
    use std::collections::HashMap;

    fn schema() -> Schema {
        Schema::new([("brand", ColumnType::Text), ("model", ColumnType::Text)]).unwrap()
    }

    fn record(row: usize, rid: &str, brand: Option<&str>, model: Option<&str>) -> Record {
        let v = |o: Option<&str>| o.map(AttrValue::from).unwrap_or(AttrValue::Null);
        Record::new(RecordId::from(rid), row, vec![v(brand), v(model)])
    }

    fn and_predicate() -> HavingPredicate {
        HavingPredicate::new(
            HavingClause::new("brand", "canon"),
            HavingClause::new("model", "5d"),
            LogicalOp::And,
        )
    }

    #[test]
    fn clause_is_substring_and_null_never_matches() {
        let clause = HavingClause::new("brand", "canon");
        assert!(clause.matches_value(&AttrValue::from("canon powershot")));
        assert!(!clause.matches_value(&AttrValue::from("nikon")));
        assert!(!clause.matches_value(&AttrValue::Null));
        assert!(!clause.matches_value(&AttrValue::Number(f64::NAN)));
    }

    #[test]
    fn strict_record_matching() {
        let schema = schema();
        let both = record(0, "r1", Some("canon"), Some("eos 5d"));
        let brand_only = record(1, "r2", Some("canon"), Some("eos"));

        let and = and_predicate();
        assert!(and.matches_record(&both, &schema));
        assert!(!and.matches_record(&brand_only, &schema));

        let or = HavingPredicate::new(
            HavingClause::new("brand", "canon"),
            HavingClause::new("model", "5d"),
            LogicalOp::Or,
        );
        assert!(or.matches_record(&brand_only, &schema));
    }

    #[test]
    fn and_admission_rescues_split_conditions() {
        let schema = schema();
        // conditions carried by different records of the same block
        let brand_carrier = record(0, "r1", Some("canon"), Some("eos"));
        let model_carrier = record(1, "r2", None, Some("5d"));
        let neither = record(2, "r3", Some("fuji"), None);

        let and = and_predicate();
        let admitted = and.admit_block(&[&brand_carrier, &model_carrier, &neither], &schema, false);
        let ids: Vec<_> = admitted.iter().map(|r| r.id().as_str()).collect();
        assert_eq!(ids, vec!["r1", "r2"]);
    }

    #[test]
    fn and_admission_rejects_unsatisfiable_blocks() {
        let schema = schema();
        let brand_carrier = record(0, "r1", Some("canon"), Some("eos"));
        let also_brand = record(1, "r2", Some("canon mark"), None);

        let and = and_predicate();
        assert!(and
            .admit_block(&[&brand_carrier, &also_brand], &schema, false)
            .is_empty());
    }

    #[test]
    fn solved_records_get_strict_and() {
        let schema = schema();
        let brand_only = record(0, "r1", Some("canon"), Some("eos"));
        let both = record(1, "r2", Some("canon"), Some("5d"));

        let and = and_predicate();
        let admitted = and.admit_block(&[&brand_only], &schema, true);
        assert!(admitted.is_empty());
        let admitted = and.admit_block(&[&both], &schema, true);
        assert_eq!(admitted.len(), 1);
    }

    #[test]
    fn or_admission_ignores_block_structure() {
        let schema = schema();
        let brand_carrier = record(0, "r1", Some("canon"), None);
        let neither = record(1, "r2", Some("fuji"), None);

        let or = HavingPredicate::new(
            HavingClause::new("brand", "canon"),
            HavingClause::new("brand", "nikon"),
            LogicalOp::Or,
        );
        let admitted = or.admit_block(&[&brand_carrier, &neither], &schema, false);
        assert_eq!(admitted.len(), 1);
        assert_eq!(admitted[0].id().as_str(), "r1");
    }

    #[test]
    fn entity_post_filter() {
        let and = and_predicate();
        let entity = AggregatedEntity::new(
            vec![RecordId::from("r1"), RecordId::from("r2")],
            HashMap::from([
                ("brand".to_string(), AttrValue::from("canon")),
                ("model".to_string(), AttrValue::from("5d")),
            ]),
            OrderKey::from_f64(Some(12.0)),
        );
        assert!(and.matches_entity(&entity));

        let entity = AggregatedEntity::new(
            vec![RecordId::from("r1")],
            HashMap::from([("brand".to_string(), AttrValue::from("canon"))]),
            OrderKey::null(),
        );
        assert!(!and.matches_entity(&entity));
    }
}
