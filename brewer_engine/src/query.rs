//! Query descriptor and validation, see [`QuerySpec`].

use data_types::{AggregateFn, ColumnType, Schema, SortOrder};
use predicate::HavingPredicate;
use snafu::{ensure, OptionExt, Snafu};
use std::collections::HashMap;
use std::fmt::Write;

#[derive(Debug, Snafu)]
#[allow(missing_docs)]
pub enum Error {
    #[snafu(display("unknown attribute in query: {}", attribute))]
    UnknownAttribute { attribute: String },

    #[snafu(display("no aggregation function given for attribute: {}", attribute))]
    MissingAggregation { attribute: String },

    #[snafu(display(
        "aggregation {} cannot be used on the ordering key",
        function
    ))]
    UnsupportedOrderingAggregate { function: AggregateFn },

    #[snafu(display("ordering key {} is not a numeric attribute", attribute))]
    OrderingKeyNotNumeric { attribute: String },
}

#[allow(missing_docs)]
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A complete query over one record collection.
///
/// This is the in-process form of
///
/// ```sql
/// SELECT [TOP(k)] f1(a1), f2(a2), ...
/// FROM dataset
/// GROUP BY _
/// HAVING fi(ai) LIKE '%v1%' AND|OR fj(aj) LIKE '%v2%'
/// ORDER BY f(ok) ASC|DESC
/// ```
///
/// where the implicit `GROUP BY _` groups records by the entity they
/// resolve to.
#[derive(Debug, Clone)]
pub struct QuerySpec {
    /// Number of entities to return; zero or negative means all of them.
    pub top_k: i64,
    /// Whether entities whose aggregated ordering key is null are dropped.
    pub ignore_null: bool,
    /// Aggregation function per attribute.
    pub aggregations: HashMap<String, AggregateFn>,
    /// Attributes projected into result rows.
    pub attributes: Vec<String>,
    /// The HAVING predicate.
    pub having: HavingPredicate,
    /// The numeric attribute results are ranked on.
    pub ordering_key: String,
    /// Ranking direction.
    pub ordering_mode: SortOrder,
    /// Seed for the query RNG driving `random` aggregation.
    pub rng_seed: u64,
}

impl QuerySpec {
    /// Check the query against the dataset schema.
    pub fn validate(&self, schema: &Schema) -> Result<()> {
        let named = self
            .attributes
            .iter()
            .map(String::as_str)
            .chain(self.having.clauses().iter().map(|c| c.attribute()))
            .chain(std::iter::once(self.ordering_key.as_str()));
        for attribute in named {
            ensure!(
                schema.index_of(attribute).is_some(),
                UnknownAttributeSnafu { attribute }
            );
            ensure!(
                self.aggregations.contains_key(attribute),
                MissingAggregationSnafu { attribute }
            );
        }

        let ok_fn = self.ordering_aggregate()?;
        ensure!(
            ok_fn.supports_ordering_key(),
            UnsupportedOrderingAggregateSnafu { function: ok_fn }
        );

        let idx = schema
            .index_of(&self.ordering_key)
            .context(UnknownAttributeSnafu {
                attribute: self.ordering_key.as_str(),
            })?;
        ensure!(
            schema.column(idx).column_type() == ColumnType::Numeric,
            OrderingKeyNotNumericSnafu {
                attribute: self.ordering_key.as_str(),
            }
        );

        Ok(())
    }

    /// The aggregation applied to the ordering key.
    pub fn ordering_aggregate(&self) -> Result<AggregateFn> {
        self.aggregations
            .get(&self.ordering_key)
            .copied()
            .context(MissingAggregationSnafu {
                attribute: self.ordering_key.as_str(),
            })
    }

    /// The effective row limit, if any.
    pub fn top_k_limit(&self) -> Option<u64> {
        (self.top_k > 0).then(|| self.top_k as u64)
    }

    /// Render the query as human-readable SQL, matching the on-disk
    /// `*_query.txt` format.
    pub fn to_sql(&self, ds_name: &str) -> String {
        let agg = |attr: &str| {
            self.aggregations
                .get(attr)
                .map(AggregateFn::name)
                .unwrap_or("?")
        };

        let mut out = String::new();
        out.push_str("select ");
        if let Some(k) = self.top_k_limit() {
            let _ = write!(out, "top({}) ", k);
        }
        let projection = self
            .attributes
            .iter()
            .map(|a| format!("{}({})", agg(a), a))
            .collect::<Vec<_>>()
            .join(", ");
        out.push_str(&projection);
        let _ = write!(out, "\nfrom {}\ngroup by _\nhaving ", ds_name);
        let having = self
            .having
            .clauses()
            .iter()
            .map(|c| format!("{}({}) like '%{}%'", agg(c.attribute()), c.attribute(), c.needle()))
            .collect::<Vec<_>>()
            .join(&format!(" {} ", self.having.op()));
        out.push_str(&having);
        let _ = write!(
            out,
            "\norder by {}({}) {}\n",
            agg(&self.ordering_key),
            self.ordering_key,
            self.ordering_mode
        );

        out.to_uppercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use data_types::LogicalOp;
    use predicate::HavingClause;

    fn camera_schema() -> Schema {
        Schema::new([
            ("brand", ColumnType::Text),
            ("model", ColumnType::Text),
            ("megapixels", ColumnType::Numeric),
        ])
        .unwrap()
    }

    fn camera_query() -> QuerySpec {
        QuerySpec {
            top_k: 0,
            ignore_null: true,
            aggregations: HashMap::from([
                ("brand".to_string(), AggregateFn::Vote),
                ("model".to_string(), AggregateFn::Vote),
                ("megapixels".to_string(), AggregateFn::Max),
            ]),
            attributes: vec![
                "brand".to_string(),
                "model".to_string(),
                "megapixels".to_string(),
            ],
            having: HavingPredicate::new(
                HavingClause::new("brand", "canon"),
                HavingClause::new("model", "5d"),
                LogicalOp::And,
            ),
            ordering_key: "megapixels".to_string(),
            ordering_mode: SortOrder::Desc,
            rng_seed: 0,
        }
    }

    #[test]
    fn valid_query_passes() {
        camera_query().validate(&camera_schema()).unwrap();
    }

    #[test]
    fn unknown_and_unaggregated_attributes_are_rejected() {
        let mut q = camera_query();
        q.attributes.push("price".to_string());
        let err = q.validate(&camera_schema()).unwrap_err();
        assert!(matches!(err, Error::UnknownAttribute { .. }));

        let mut q = camera_query();
        q.aggregations.remove("model");
        let err = q.validate(&camera_schema()).unwrap_err();
        assert!(matches!(err, Error::MissingAggregation { .. }));
    }

    #[test]
    fn ordering_key_restrictions() {
        let mut q = camera_query();
        q.aggregations
            .insert("megapixels".to_string(), AggregateFn::Concat);
        let err = q.validate(&camera_schema()).unwrap_err();
        assert!(matches!(err, Error::UnsupportedOrderingAggregate { .. }));

        let mut q = camera_query();
        q.ordering_key = "brand".to_string();
        let err = q.validate(&camera_schema()).unwrap_err();
        assert!(matches!(err, Error::OrderingKeyNotNumeric { .. }));
    }

    #[test]
    fn sql_rendering() {
        let mut q = camera_query();
        q.top_k = 3;
        let sql = q.to_sql("alaska_camera");
        assert_eq!(
            sql,
            "SELECT TOP(3) VOTE(BRAND), VOTE(MODEL), MAX(MEGAPIXELS)\n\
             FROM ALASKA_CAMERA\n\
             GROUP BY _\n\
             HAVING VOTE(BRAND) LIKE '%CANON%' AND VOTE(MODEL) LIKE '%5D%'\n\
             ORDER BY MAX(MEGAPIXELS) DESC\n"
        );
    }
}
