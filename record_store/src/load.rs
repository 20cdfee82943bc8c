//! Loaders for the on-disk dataset formats: the record table CSV and the
//! three companion block files.

use crate::{blocks::BlockIndex, store, store::RecordStore};
use data_types::{AttrValue, BlockId, ColumnType, RecordId, Schema};
use observability_deps::tracing::warn;
use snafu::{ensure, OptionExt, ResultExt, Snafu};
use std::{
    collections::HashMap,
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

#[derive(Debug, Snafu)]
#[allow(missing_docs)]
pub enum Error {
    #[snafu(display("cannot open {}: {}", path.display(), source))]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("cannot read CSV {}: {}", path.display(), source))]
    Csv { path: PathBuf, source: csv::Error },

    #[snafu(display("{} has no \"id\" column", path.display()))]
    MissingIdColumn { path: PathBuf },

    #[snafu(display("{} has no \"{}\" column", path.display(), column))]
    MissingColumn { path: PathBuf, column: String },

    #[snafu(display("malformed block file {}: {}", path.display(), source))]
    BlockJson {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[snafu(display("malformed block file {}: {}", path.display(), reason))]
    BlockShape { path: PathBuf, reason: String },

    #[snafu(display("invalid record table: {}", source))]
    Store { source: store::Error },
}

#[allow(missing_docs)]
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Load a record table from a CSV file.
///
/// The file must carry a unique `id` column and one column per schema
/// attribute; extra columns (such as the gold-derivation `cluster_id`) are
/// ignored. The literal `NaN` in a text column is the null marker of the
/// interchange format and loads as null; unparseable numerics load as NaN
/// with a warning.
pub fn load_records(path: &Path, schema: &Schema) -> Result<RecordStore> {
    let file = File::open(path).context(IoSnafu { path })?;
    let mut reader = csv::Reader::from_reader(BufReader::new(file));

    let headers = reader.headers().context(CsvSnafu { path })?.clone();
    let id_idx = headers
        .iter()
        .position(|h| h == "id")
        .context(MissingIdColumnSnafu { path })?;
    let column_idx = schema
        .columns()
        .map(|c| {
            headers
                .iter()
                .position(|h| h == c.name())
                .context(MissingColumnSnafu {
                    path,
                    column: c.name(),
                })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut rows = Vec::new();
    for row in reader.records() {
        let row = row.context(CsvSnafu { path })?;
        let rid = RecordId::from(row.get(id_idx).unwrap_or_default());
        let values = schema
            .columns()
            .zip(&column_idx)
            .map(|(c, &i)| parse_value(&rid, c.name(), c.column_type(), row.get(i).unwrap_or_default()))
            .collect();
        rows.push((rid, values));
    }

    RecordStore::new(schema.clone(), rows).context(StoreSnafu)
}

fn parse_value(rid: &RecordId, column: &str, column_type: ColumnType, raw: &str) -> AttrValue {
    match column_type {
        // "NaN" is how the upstream cleaning step spells null in text columns
        ColumnType::Text => match raw {
            "" | "NaN" => AttrValue::Null,
            s => AttrValue::Text(s.to_string()),
        },
        ColumnType::Numeric => match raw {
            "" => AttrValue::Number(f64::NAN),
            s => match s.parse::<f64>() {
                Ok(v) => AttrValue::Number(v),
                Err(_) => {
                    warn!(%rid, column, value = s, "non-numeric value in numeric column, treating as null");
                    AttrValue::Number(f64::NAN)
                }
            },
        },
    }
}

/// Load a block index from its three companion files.
///
/// `blocks_path` is a JSON array of record-id arrays (a block's id is its
/// position), `costs_path` a JSON object mapping block id to comparison
/// cost, `record_blocks_path` a JSON object mapping record id to its block
/// ids.
pub fn load_block_index(
    blocks_path: &Path,
    costs_path: &Path,
    record_blocks_path: &Path,
) -> Result<BlockIndex> {
    let blocks: Vec<Vec<String>> = read_json(blocks_path)?;
    let blocks: Vec<Vec<RecordId>> = blocks
        .into_iter()
        .map(|b| b.into_iter().map(RecordId::from).collect())
        .collect();

    let raw_costs: HashMap<String, u64> = read_json(costs_path)?;
    let mut costs = vec![0u64; blocks.len()];
    for (key, cost) in raw_costs {
        let idx: usize = key.parse().map_err(|_| {
            BlockShapeSnafu {
                path: costs_path,
                reason: format!("block id {:?} is not an integer", key),
            }
            .build()
        })?;
        ensure!(
            idx < blocks.len(),
            BlockShapeSnafu {
                path: costs_path,
                reason: format!("block id {} out of range ({} blocks)", idx, blocks.len()),
            }
        );
        costs[idx] = cost;
    }

    let raw_membership: HashMap<String, Vec<serde_json::Value>> = read_json(record_blocks_path)?;
    let mut by_record = HashMap::with_capacity(raw_membership.len());
    for (rid, bids) in raw_membership {
        let bids = bids
            .iter()
            .map(|v| parse_block_id(v, blocks.len(), record_blocks_path))
            .collect::<Result<Vec<_>>>()?;
        by_record.insert(RecordId::from(rid), bids);
    }

    Ok(BlockIndex::from_parts(blocks, costs, by_record))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).context(IoSnafu { path })?;
    serde_json::from_reader(BufReader::new(file)).context(BlockJsonSnafu { path })
}

fn parse_block_id(v: &serde_json::Value, n_blocks: usize, path: &Path) -> Result<BlockId> {
    let idx = match v {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
    .context(BlockShapeSnafu {
        path,
        reason: format!("block reference {} is not an id", v),
    })?;

    ensure!(
        (idx as usize) < n_blocks,
        BlockShapeSnafu {
            path,
            reason: format!("block id {} out of range ({} blocks)", idx, n_blocks),
        }
    );
    Ok(BlockId::new(idx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    fn camera_schema() -> Schema {
        Schema::new([
            ("brand", ColumnType::Text),
            ("megapixels", ColumnType::Numeric),
        ])
        .unwrap()
    }

    #[test]
    fn load_records_normalizes_nulls() {
        test_helpers::maybe_start_logging();
        let dir = TempDir::new().unwrap();
        let path = write_file(
            &dir,
            "dataset.csv",
            "id,brand,megapixels,cluster_id\n\
             r1,canon,10.1,7\n\
             r2,NaN,NaN,7\n\
             r3,nikon,not-a-number,8\n",
        );

        let store = load_records(&path, &camera_schema()).unwrap();
        assert_eq!(store.len(), 3);

        let r2 = store.get(&RecordId::from("r2")).unwrap();
        assert_eq!(r2.value(0), &AttrValue::Null);
        assert!(r2.value(1).is_null());

        // unparseable numeric becomes null, not a load failure
        let r3 = store.get(&RecordId::from("r3")).unwrap();
        assert_eq!(r3.value(0), &AttrValue::from("nikon"));
        assert!(r3.value(1).is_null());
    }

    #[test]
    fn load_records_requires_schema_columns() {
        let dir = TempDir::new().unwrap();

        let no_id = write_file(&dir, "no_id.csv", "rid,brand,megapixels\nr1,canon,10\n");
        let err = load_records(&no_id, &camera_schema()).unwrap_err();
        assert!(matches!(err, Error::MissingIdColumn { .. }));

        let no_brand = write_file(&dir, "no_brand.csv", "id,megapixels\nr1,10\n");
        let err = load_records(&no_brand, &camera_schema()).unwrap_err();
        assert!(matches!(err, Error::MissingColumn { .. }));

        let dup = write_file(
            &dir,
            "dup.csv",
            "id,brand,megapixels\nr1,canon,10\nr1,canon,10\n",
        );
        let err = load_records(&dup, &camera_schema()).unwrap_err();
        assert!(matches!(err, Error::Store { .. }));
    }

    #[test]
    fn load_block_index_round_trip() {
        let dir = TempDir::new().unwrap();
        let blocks = write_file(&dir, "blocks.txt", r#"[["r1", "r2"], ["r3"]]"#);
        let costs = write_file(&dir, "costs.txt", r#"{"0": 1, "1": 0}"#);
        let membership = write_file(
            &dir,
            "record_blocks.txt",
            r#"{"r1": [0], "r2": [0], "r3": [1]}"#,
        );

        let index = load_block_index(&blocks, &costs, &membership).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.cost(BlockId::new(0)), 1);
        assert_eq!(index.blocks_of(&RecordId::from("r2")), &[BlockId::new(0)]);
        assert_eq!(
            index.records_of(BlockId::new(0)),
            &[RecordId::from("r1"), RecordId::from("r2")]
        );
    }

    #[test]
    fn load_block_index_rejects_dangling_ids() {
        let dir = TempDir::new().unwrap();
        let blocks = write_file(&dir, "blocks.txt", r#"[["r1"]]"#);
        let costs = write_file(&dir, "costs.txt", r#"{"0": 0}"#);
        let membership = write_file(&dir, "record_blocks.txt", r#"{"r1": [3]}"#);

        let err = load_block_index(&blocks, &costs, &membership).unwrap_err();
        assert!(matches!(err, Error::BlockShape { .. }));

        let bad_costs = write_file(&dir, "bad_costs.txt", r#"{"seven": 0}"#);
        let err = load_block_index(&blocks, &bad_costs, &membership).unwrap_err();
        assert!(matches!(err, Error::BlockShape { .. }));
    }
}
