//! In-memory typed record table, see [`RecordStore`].

use data_types::{AttrValue, Record, RecordId, Schema};
use snafu::{ensure, Snafu};
use std::collections::HashMap;

#[derive(Debug, Snafu)]
#[allow(missing_docs)]
pub enum Error {
    #[snafu(display("duplicate record id: {}", rid))]
    DuplicateRecordId { rid: RecordId },

    #[snafu(display(
        "record {} has {} values but the schema has {} columns",
        rid,
        actual,
        expected
    ))]
    WrongWidth {
        rid: RecordId,
        actual: usize,
        expected: usize,
    },

    #[snafu(display("unknown attribute: {}", attribute))]
    UnknownAttribute { attribute: String },

    #[snafu(display("unknown record id: {}", rid))]
    UnknownRecord { rid: RecordId },
}

#[allow(missing_docs)]
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// An immutable table of records keyed by record id.
///
/// The store is built once (from a loader or in-memory rows) and never
/// mutated afterwards; queries share it read-only. Row order is dataset
/// order and is preserved, since the scheduler uses it as a tiebreak.
#[derive(Debug)]
pub struct RecordStore {
    schema: Schema,
    records: Vec<Record>,
    by_id: HashMap<RecordId, usize>,
}

impl RecordStore {
    /// Build a store from `(id, values)` rows in dataset order.
    pub fn new(schema: Schema, rows: Vec<(RecordId, Vec<AttrValue>)>) -> Result<Self> {
        let mut records = Vec::with_capacity(rows.len());
        let mut by_id = HashMap::with_capacity(rows.len());

        for (row, (rid, values)) in rows.into_iter().enumerate() {
            ensure!(
                values.len() == schema.len(),
                WrongWidthSnafu {
                    rid: rid.clone(),
                    actual: values.len(),
                    expected: schema.len(),
                }
            );
            ensure!(
                !by_id.contains_key(&rid),
                DuplicateRecordIdSnafu { rid: rid.clone() }
            );
            by_id.insert(rid.clone(), row);
            records.push(Record::new(rid, row, values));
        }

        Ok(Self {
            schema,
            records,
            by_id,
        })
    }

    /// The attribute schema shared by all records.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Look up a record by id.
    pub fn get(&self, rid: &RecordId) -> Option<&Record> {
        self.by_id.get(rid).map(|&i| &self.records[i])
    }

    /// All records in dataset order.
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.records.iter()
    }

    /// Project the named attributes of the given records, in the given
    /// order.
    pub fn project(&self, rids: &[RecordId], attributes: &[&str]) -> Result<Vec<Vec<AttrValue>>> {
        let indexes = attributes
            .iter()
            .map(|a| {
                self.schema
                    .index_of(a)
                    .ok_or_else(|| UnknownAttributeSnafu { attribute: *a }.build())
            })
            .collect::<Result<Vec<_>>>()?;

        rids.iter()
            .map(|rid| {
                let record = self
                    .get(rid)
                    .ok_or_else(|| UnknownRecordSnafu { rid: rid.clone() }.build())?;
                Ok(indexes.iter().map(|&i| record.value(i).clone()).collect())
            })
            .collect()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use data_types::ColumnType;

    fn schema() -> Schema {
        Schema::new([
            ("brand", ColumnType::Text),
            ("megapixels", ColumnType::Numeric),
        ])
        .unwrap()
    }

    fn store() -> RecordStore {
        RecordStore::new(
            schema(),
            vec![
                (
                    RecordId::from("r1"),
                    vec![AttrValue::from("canon"), AttrValue::from(10.0)],
                ),
                (
                    RecordId::from("r2"),
                    vec![AttrValue::Null, AttrValue::from(12.0)],
                ),
            ],
        )
        .unwrap()
    }

    #[test]
    fn lookup_preserves_dataset_order() {
        let store = store();
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(&RecordId::from("r2")).unwrap().row(), 1);
        assert!(store.get(&RecordId::from("r3")).is_none());

        let rows: Vec<_> = store.records().map(|r| r.id().as_str()).collect();
        assert_eq!(rows, vec!["r1", "r2"]);
    }

    #[test]
    fn project_selects_attributes() {
        let store = store();
        let projected = store
            .project(&[RecordId::from("r2"), RecordId::from("r1")], &["megapixels"])
            .unwrap();
        assert_eq!(
            projected,
            vec![vec![AttrValue::from(12.0)], vec![AttrValue::from(10.0)]]
        );

        let err = store
            .project(&[RecordId::from("r1")], &["model"])
            .unwrap_err();
        assert!(matches!(err, Error::UnknownAttribute { .. }));
    }

    #[test]
    fn duplicate_and_ragged_rows_are_rejected() {
        let err = RecordStore::new(
            schema(),
            vec![
                (RecordId::from("r1"), vec![AttrValue::Null, AttrValue::Null]),
                (RecordId::from("r1"), vec![AttrValue::Null, AttrValue::Null]),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, Error::DuplicateRecordId { .. }));

        let err = RecordStore::new(schema(), vec![(RecordId::from("r1"), vec![AttrValue::Null])])
            .unwrap_err();
        assert!(matches!(err, Error::WrongWidth { .. }));
    }
}
