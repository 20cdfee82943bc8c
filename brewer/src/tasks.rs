//! The registry of query task classes.
//!
//! A task class names a dataset, its schema, the fixed aggregation choices,
//! and the value domains queries are drawn from. One task instance (an
//! index plus an RNG seed) becomes a concrete [`QuerySpec`].

use brewer_engine::QuerySpec;
use data_types::{AggregateFn, ColumnType, LogicalOp, Schema, SortOrder};
use predicate::{HavingClause, HavingPredicate};
use rand::{rngs::SmallRng, seq::SliceRandom};

/// How the two HAVING condition values are drawn.
#[derive(Debug, Clone, Copy)]
pub enum HavingDomain {
    /// Two independent draws: `(attribute, candidate values)` each.
    Independent {
        first: (&'static str, &'static [&'static str]),
        second: (&'static str, &'static [&'static str]),
    },
    /// The second draw depends on the first, e.g. a model prefix list per
    /// brand.
    Dependent {
        first: &'static str,
        second: &'static str,
        choices: &'static [(&'static str, &'static [&'static str])],
    },
}

/// One registered task class.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    /// Task (and dataset file) name.
    pub name: &'static str,
    /// Whether the dataset comes with block files; without them every
    /// record shares one block.
    pub blocking: bool,
    columns: &'static [(&'static str, ColumnType)],
    aggregations: &'static [(&'static str, AggregateFn)],
    attributes: &'static [&'static str],
    having: HavingDomain,
    operator: LogicalOp,
    ordering_key: &'static str,
    /// Ordering mode used when the drawn ordering aggregate is `max`; `min`
    /// uses the opposite.
    mode_for_max: SortOrder,
}

impl TaskSpec {
    /// The dataset schema of this task.
    pub fn schema(&self) -> Schema {
        Schema::new(self.columns.iter().copied()).expect("task schemas have unique columns")
    }

    /// The projected attributes.
    pub fn attributes(&self) -> &'static [&'static str] {
        self.attributes
    }

    /// Draw one concrete query from this task's domains.
    pub fn generate_query(&self, rng: &mut SmallRng, rng_seed: u64) -> QuerySpec {
        let ok_fn = *[AggregateFn::Max, AggregateFn::Min]
            .choose(rng)
            .expect("non-empty");
        let ordering_mode = match ok_fn {
            AggregateFn::Max => self.mode_for_max,
            _ => self.mode_for_max.reverse(),
        };

        let (first, second) = match self.having {
            HavingDomain::Independent { first, second } => (
                (first.0, *first.1.choose(rng).expect("non-empty")),
                (second.0, *second.1.choose(rng).expect("non-empty")),
            ),
            HavingDomain::Dependent {
                first,
                second,
                choices,
            } => {
                let (value, dependents) = choices.choose(rng).expect("non-empty");
                (
                    (first, *value),
                    (second, *dependents.choose(rng).expect("non-empty")),
                )
            }
        };

        let mut aggregations: std::collections::HashMap<_, _> = self
            .aggregations
            .iter()
            .map(|(a, f)| (a.to_string(), *f))
            .collect();
        aggregations.insert(self.ordering_key.to_string(), ok_fn);

        QuerySpec {
            top_k: 0,
            ignore_null: true,
            aggregations,
            attributes: self.attributes.iter().map(|a| a.to_string()).collect(),
            having: HavingPredicate::new(
                HavingClause::new(first.0, first.1),
                HavingClause::new(second.0, second.1),
                self.operator,
            ),
            ordering_key: self.ordering_key.to_string(),
            ordering_mode,
            rng_seed,
        }
    }
}

const CAMERA_BRANDS: &[(&str, &[&str])] = &[
    ("canon", &["a", "d", "elph", "g", "ixus", "mark", "s", "sd", "sx", "t", "xs", "xt"]),
    ("dahua", &["dh", "ipc", "hd", "hf", "sd"]),
    ("fuji", &["ax", "f", "hs", "jx", "s"]),
    ("hikvision", &["cd", "de", "ds", "f", "is"]),
    ("kodak", &["dc", "dx", "m", "v", "z"]),
    ("nikon", &["100", "aw", "d", "j", "l", "p", "s", "v"]),
    ("olympus", &["c", "d", "e", "fe", "sp", "sz", "tg", "vg", "vr", "xz"]),
    ("panasonic", &["dmc", "fz", "gf", "gh", "gx", "lx", "lz", "s", "tz", "x", "z", "zs"]),
    ("samsung", &["gc", "nx", "pl", "st", "wb"]),
    ("sony", &["tvl", "a", "dsc", "fd", "pj", "hx", "nex", "slt"]),
];

const USB_BRANDS: &[&str] = &[
    "intenso",
    "kingston",
    "lexar",
    "pny",
    "samsung",
    "sandisk",
    "sony",
    "toshiba",
    "transcend",
];

const USB_SIZES: &[&str] = &["4", "8", "16", "32", "64", "128", "256", "512"];

const FUNDING_SOURCES: &[&str] = &[
    "aging", "aids", "boro", "casa", "food", "health", "local", "youth",
];

const FUNDING_NAMES: &[&str] = &[
    "asian",
    "association",
    "christian",
    "community",
    "council",
    "foundation",
    "jewish",
    "service",
];

const CAMERA_COLUMNS: &[(&str, ColumnType)] = &[
    ("brand", ColumnType::Text),
    ("model", ColumnType::Text),
    ("megapixels", ColumnType::Numeric),
];

const CAMERA_AGGREGATIONS: &[(&str, AggregateFn)] = &[
    ("brand", AggregateFn::Vote),
    ("model", AggregateFn::Vote),
];

const CAMERA_ATTRIBUTES: &[&str] = &["brand", "model", "megapixels"];

const USB_COLUMNS: &[(&str, ColumnType)] = &[
    ("name", ColumnType::Text),
    ("brand", ColumnType::Text),
    ("size", ColumnType::Text),
    ("size_num", ColumnType::Numeric),
    ("price", ColumnType::Numeric),
];

const USB_AGGREGATIONS: &[(&str, AggregateFn)] = &[
    ("name", AggregateFn::Vote),
    ("brand", AggregateFn::Vote),
    ("size", AggregateFn::Vote),
    ("size_num", AggregateFn::Max),
];

const USB_ATTRIBUTES: &[&str] = &["name", "brand", "size", "size_num", "price"];

const FUNDING_COLUMNS: &[(&str, ColumnType)] = &[
    ("legal_name", ColumnType::Text),
    ("address", ColumnType::Text),
    ("source", ColumnType::Text),
    ("council_member", ColumnType::Text),
    ("amount", ColumnType::Numeric),
];

const FUNDING_AGGREGATIONS: &[(&str, AggregateFn)] = &[
    ("legal_name", AggregateFn::Vote),
    ("address", AggregateFn::Vote),
    ("source", AggregateFn::Vote),
    ("council_member", AggregateFn::Vote),
];

const FUNDING_ATTRIBUTES: &[&str] = &[
    "legal_name",
    "address",
    "source",
    "council_member",
    "amount",
];

/// All registered task classes.
pub fn all() -> Vec<TaskSpec> {
    vec![
        TaskSpec {
            name: "alaska_camera",
            blocking: true,
            columns: CAMERA_COLUMNS,
            aggregations: CAMERA_AGGREGATIONS,
            attributes: CAMERA_ATTRIBUTES,
            having: HavingDomain::Dependent {
                first: "brand",
                second: "model",
                choices: CAMERA_BRANDS,
            },
            operator: LogicalOp::And,
            ordering_key: "megapixels",
            mode_for_max: SortOrder::Asc,
        },
        TaskSpec {
            name: "alaska_camera_no_nan",
            blocking: true,
            columns: CAMERA_COLUMNS,
            aggregations: CAMERA_AGGREGATIONS,
            attributes: CAMERA_ATTRIBUTES,
            having: HavingDomain::Dependent {
                first: "brand",
                second: "model",
                choices: CAMERA_BRANDS,
            },
            operator: LogicalOp::And,
            ordering_key: "megapixels",
            mode_for_max: SortOrder::Asc,
        },
        TaskSpec {
            name: "altosight",
            blocking: true,
            columns: USB_COLUMNS,
            aggregations: USB_AGGREGATIONS,
            attributes: USB_ATTRIBUTES,
            having: HavingDomain::Independent {
                first: ("brand", USB_BRANDS),
                second: ("brand", USB_BRANDS),
            },
            operator: LogicalOp::Or,
            ordering_key: "price",
            mode_for_max: SortOrder::Desc,
        },
        TaskSpec {
            name: "altosight_no_nan",
            blocking: true,
            columns: USB_COLUMNS,
            aggregations: USB_AGGREGATIONS,
            attributes: USB_ATTRIBUTES,
            having: HavingDomain::Independent {
                first: ("brand", USB_BRANDS),
                second: ("size", USB_SIZES),
            },
            operator: LogicalOp::And,
            ordering_key: "price",
            mode_for_max: SortOrder::Asc,
        },
        TaskSpec {
            name: "altosight_sigmod",
            blocking: false,
            columns: USB_COLUMNS,
            aggregations: USB_AGGREGATIONS,
            attributes: USB_ATTRIBUTES,
            having: HavingDomain::Independent {
                first: ("brand", USB_BRANDS),
                second: ("size", USB_SIZES),
            },
            operator: LogicalOp::And,
            ordering_key: "price",
            mode_for_max: SortOrder::Desc,
        },
        TaskSpec {
            name: "altosight_sigmod_no_nan",
            blocking: false,
            columns: USB_COLUMNS,
            aggregations: USB_AGGREGATIONS,
            attributes: USB_ATTRIBUTES,
            having: HavingDomain::Independent {
                first: ("brand", USB_BRANDS),
                second: ("brand", USB_BRANDS),
            },
            operator: LogicalOp::Or,
            ordering_key: "price",
            mode_for_max: SortOrder::Asc,
        },
        TaskSpec {
            name: "funding",
            blocking: true,
            columns: FUNDING_COLUMNS,
            aggregations: FUNDING_AGGREGATIONS,
            attributes: FUNDING_ATTRIBUTES,
            having: HavingDomain::Independent {
                first: ("source", FUNDING_SOURCES),
                second: ("source", FUNDING_SOURCES),
            },
            operator: LogicalOp::Or,
            ordering_key: "amount",
            mode_for_max: SortOrder::Desc,
        },
        TaskSpec {
            name: "funding_no_nan",
            blocking: false,
            columns: FUNDING_COLUMNS,
            aggregations: FUNDING_AGGREGATIONS,
            attributes: FUNDING_ATTRIBUTES,
            having: HavingDomain::Independent {
                first: ("source", FUNDING_SOURCES),
                second: ("legal_name", FUNDING_NAMES),
            },
            operator: LogicalOp::And,
            ordering_key: "amount",
            mode_for_max: SortOrder::Desc,
        },
    ]
}

/// Look up a task class by name.
pub fn find(name: &str) -> Option<TaskSpec> {
    all().into_iter().find(|t| t.name == name)
}
