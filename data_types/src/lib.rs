//! Shared data types used by the BrewER query engine.
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(
    missing_debug_implementations,
    missing_docs,
    clippy::explicit_iter_loop,
    clippy::use_self,
    clippy::clone_on_ref_ptr
)]

use ordered_float::NotNan;
use snafu::Snafu;
use std::{
    borrow::Cow,
    cmp::Ordering,
    collections::HashMap,
    fmt,
    str::FromStr,
    sync::Arc,
};

/// Errors raised when constructing or parsing shared types.
#[derive(Debug, Snafu)]
#[allow(missing_docs)]
pub enum Error {
    #[snafu(display("duplicate column in schema: {}", name))]
    DuplicateColumn { name: String },

    #[snafu(display("unknown aggregate function: {}", name))]
    UnknownAggregateFn { name: String },

    #[snafu(display("unknown sort order: {}", name))]
    UnknownSortOrder { name: String },

    #[snafu(display("unknown logical operator: {}", name))]
    UnknownLogicalOp { name: String },
}

#[allow(missing_docs)]
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Unique identifier of a source record.
///
/// Record ids are opaque strings assigned by the upstream dataset; they are
/// compared lexicographically, which also defines the canonical member of a
/// resolved entity (its smallest record id).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId(Arc<str>);

impl RecordId {
    /// Create a new record id.
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Unique identifier of a block.
///
/// Blocks are materialized offline as a JSON array of record id arrays; the
/// id of a block is its position in that file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(u64);

impl BlockId {
    /// Create a new block id.
    pub fn new(v: u64) -> Self {
        Self(v)
    }

    /// The id as a plain integer.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The value of a record attribute.
///
/// Source tables materialize missing values as the literal string `NaN` in
/// text columns; loaders normalize that interchange artefact to [`Null`].
/// Numeric columns keep their non-finite values: a stored `NaN` compares
/// unequal to itself as usual and is treated as null by aggregation and
/// ordering, which [`is_null`] accounts for.
///
/// [`Null`]: AttrValue::Null
/// [`is_null`]: AttrValue::is_null
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    /// Missing value.
    Null,
    /// A text value.
    Text(String),
    /// A numeric value, possibly non-finite.
    Number(f64),
}

impl AttrValue {
    /// Whether this value counts as missing (null or numeric NaN).
    pub fn is_null(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(_) => false,
            Self::Number(v) => v.is_nan(),
        }
    }

    /// The numeric value, if present and not NaN.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(v) if !v.is_nan() => Some(*v),
            _ => None,
        }
    }

    /// The value rendered as text, for substring predicates and voting.
    ///
    /// Missing values have no text rendering.
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            Self::Null => None,
            Self::Text(s) => Some(Cow::Borrowed(s)),
            Self::Number(v) if v.is_nan() => None,
            Self::Number(v) => Some(Cow::Owned(format!("{}", v))),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

/// The type of a dataset column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// Free text.
    Text,
    /// 64-bit floating point.
    Numeric,
}

/// A named, typed dataset column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    name: String,
    column_type: ColumnType,
}

impl Column {
    /// The column name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The column type.
    pub fn column_type(&self) -> ColumnType {
        self.column_type
    }
}

/// The attribute schema of a record table.
///
/// The required `id` column is not part of the schema; it is carried on
/// [`Record`] directly.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    columns: Vec<Column>,
    by_name: HashMap<String, usize>,
}

impl Schema {
    /// Create a schema from `(name, type)` pairs, preserving order.
    pub fn new<N: Into<String>>(columns: impl IntoIterator<Item = (N, ColumnType)>) -> Result<Self> {
        let columns: Vec<_> = columns
            .into_iter()
            .map(|(name, column_type)| Column {
                name: name.into(),
                column_type,
            })
            .collect();

        let mut by_name = HashMap::with_capacity(columns.len());
        for (i, c) in columns.iter().enumerate() {
            if by_name.insert(c.name.clone(), i).is_some() {
                return DuplicateColumnSnafu { name: &c.name }.fail();
            }
        }

        Ok(Self { columns, by_name })
    }

    /// Position of the named column, if it exists.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    /// The column at the given position.
    ///
    /// # Panics
    ///
    /// If `idx` is out of range.
    pub fn column(&self, idx: usize) -> &Column {
        &self.columns[idx]
    }

    /// All columns in schema order.
    pub fn columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter()
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether the schema has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// An immutable source record: its id, its position in the dataset, and one
/// value per schema column.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    rid: RecordId,
    row: usize,
    values: Vec<AttrValue>,
}

impl Record {
    /// Create a record. `values` must be schema-width; the store enforces
    /// this at load time.
    pub fn new(rid: RecordId, row: usize, values: Vec<AttrValue>) -> Self {
        Self { rid, row, values }
    }

    /// The record id.
    pub fn id(&self) -> &RecordId {
        &self.rid
    }

    /// Zero-based position of the record in its dataset, used as the
    /// dataset-order tiebreak.
    pub fn row(&self) -> usize {
        self.row
    }

    /// The value of the column at `idx`.
    ///
    /// # Panics
    ///
    /// If `idx` is out of range.
    pub fn value(&self, idx: usize) -> &AttrValue {
        &self.values[idx]
    }

    /// All values in schema order.
    pub fn values(&self) -> &[AttrValue] {
        &self.values
    }
}

/// Result sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Smallest ordering key first.
    Asc,
    /// Largest ordering key first.
    Desc,
}

impl SortOrder {
    /// Lower-case name, matching the on-disk query rendering.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }

    /// The opposite direction.
    pub fn reverse(&self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }
}

impl FromStr for SortOrder {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            _ => UnknownSortOrderSnafu { name: s }.fail(),
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Logical connective between the two HAVING conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    /// Both conditions must hold.
    And,
    /// At least one condition must hold.
    Or,
}

impl LogicalOp {
    /// Lower-case name, matching the on-disk query rendering.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::And => "and",
            Self::Or => "or",
        }
    }
}

impl FromStr for LogicalOp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "and" => Ok(Self::And),
            "or" => Ok(Self::Or),
            _ => UnknownLogicalOpSnafu { name: s }.fail(),
        }
    }
}

impl fmt::Display for LogicalOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-attribute aggregation function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFn {
    /// Smallest non-null value (numeric or lexicographic).
    Min,
    /// Largest non-null value (numeric or lexicographic).
    Max,
    /// Mean of the non-null numeric values.
    Avg,
    /// Sum of the non-null numeric values.
    Sum,
    /// Majority among the non-null stringified values; ties break by
    /// first-seen order.
    Vote,
    /// Uniformly random non-null value, drawn from the query RNG.
    Random,
    /// Sorted-unique join of the stringified non-null values.
    Concat,
}

impl AggregateFn {
    /// Lower-case name, matching the on-disk query rendering.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Min => "min",
            Self::Max => "max",
            Self::Avg => "avg",
            Self::Sum => "sum",
            Self::Vote => "vote",
            Self::Random => "random",
            Self::Concat => "concat",
        }
    }

    /// Whether this function may aggregate the ordering key.
    ///
    /// The scheduler's provisional bounds only hold for aggregates whose
    /// result stays within the range of the aggregated values.
    pub fn supports_ordering_key(&self) -> bool {
        matches!(self, Self::Min | Self::Max | Self::Avg | Self::Vote)
    }
}

impl FromStr for AggregateFn {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "min" => Ok(Self::Min),
            "max" => Ok(Self::Max),
            "avg" => Ok(Self::Avg),
            "sum" => Ok(Self::Sum),
            "vote" => Ok(Self::Vote),
            "random" => Ok(Self::Random),
            "concat" => Ok(Self::Concat),
            _ => UnknownAggregateFnSnafu { name: s }.fail(),
        }
    }
}

impl fmt::Display for AggregateFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// An ordering-key value: the rank of a candidate head or of a resolved
/// entity.
///
/// Null and NaN collapse to the empty key, which ranks last in either sort
/// direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderKey(Option<NotNan<f64>>);

impl OrderKey {
    /// The empty key.
    pub fn null() -> Self {
        Self(None)
    }

    /// Key for an attribute value; null and NaN map to the empty key.
    pub fn from_value(v: &AttrValue) -> Self {
        Self::from_f64(v.as_f64())
    }

    /// Key for an optional float; NaN maps to the empty key.
    pub fn from_f64(v: Option<f64>) -> Self {
        Self(v.and_then(|v| NotNan::new(v).ok()))
    }

    /// Whether the key is empty.
    pub fn is_null(&self) -> bool {
        self.0.is_none()
    }

    /// The numeric key value, if any.
    pub fn get(&self) -> Option<f64> {
        self.0.map(NotNan::into_inner)
    }

    /// Rank comparison in the given direction: `Less` means `self` is
    /// emitted before `other`. Empty keys rank last; two empty keys tie.
    pub fn cmp_in(&self, other: &Self, order: SortOrder) -> Ordering {
        match (self.0, other.0) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(a), Some(b)) => match order {
                SortOrder::Asc => a.cmp(&b),
                SortOrder::Desc => b.cmp(&a),
            },
        }
    }

    /// Whether `self` may be emitted while `other` is still pending:
    /// `self` ranks no later than `other` (non-strict).
    pub fn ranks_no_worse_than(&self, other: &Self, order: SortOrder) -> bool {
        self.cmp_in(other, order) != Ordering::Greater
    }
}

/// A fully resolved, aggregated entity: the output row type of both the lazy
/// scheduler and the batch baseline.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedEntity {
    canonical: RecordId,
    members: Vec<RecordId>,
    values: HashMap<String, AttrValue>,
    order_key: OrderKey,
}

impl AggregatedEntity {
    /// Create an aggregated entity. `members` is sorted so the first element
    /// is the canonical id.
    pub fn new(
        members: Vec<RecordId>,
        values: HashMap<String, AttrValue>,
        order_key: OrderKey,
    ) -> Self {
        let mut members = members;
        members.sort_unstable();
        let canonical = members
            .first()
            .expect("an entity has at least its seed record")
            .clone();
        Self {
            canonical,
            members,
            values,
            order_key,
        }
    }

    /// The canonical id: the lexicographically smallest member.
    pub fn canonical(&self) -> &RecordId {
        &self.canonical
    }

    /// All member record ids, ascending.
    pub fn members(&self) -> &[RecordId] {
        &self.members
    }

    /// The aggregated value of the named attribute.
    pub fn value(&self, attribute: &str) -> Option<&AttrValue> {
        self.values.get(attribute)
    }

    /// The aggregated ordering-key value.
    pub fn order_key(&self) -> OrderKey {
        self.order_key
    }
}
