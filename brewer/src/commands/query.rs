//! Implementation of the `brewer query` command: run one task instance
//! through the lazy engine and the batch baseline, writing the result files.

use crate::tasks;
use brewer_engine::{batch, Scheduler};
use data_types::{AggregatedEntity, AttrValue};
use matcher::{GoldMatcher, Matcher};
use observability_deps::tracing::info;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use record_store::{load, BlockIndex};
use snafu::{OptionExt, ResultExt, Snafu};
use std::{
    fs,
    path::PathBuf,
    sync::Arc,
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("unknown task {:?}, `brewer tasks` lists the known ones", name))]
    UnknownTask { name: String },

    #[snafu(display("cannot load dataset: {}", source))]
    LoadDataset { source: load::Error },

    #[snafu(display("cannot load gold pairs: {}", source))]
    LoadGold { source: matcher::Error },

    #[snafu(display("query failed: {}", source))]
    Engine { source: brewer_engine::Error },

    #[snafu(display("cannot write {}: {}", path.display(), source))]
    WriteOutput {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("cannot write result rows to {}: {}", path.display(), source))]
    WriteCsv { path: PathBuf, source: csv::Error },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, clap::Parser)]
pub struct Config {
    /// Task class to run (see `brewer tasks`)
    #[clap(long)]
    task: String,

    /// Index identifying this query instance in the result files
    #[clap(long, default_value = "1")]
    index: u32,

    /// Directory holding `<task>_dataset.csv`, `<task>_gold.csv` and the
    /// block files
    #[clap(long, default_value = "data", env = "BREWER_DATA_DIR")]
    data_dir: PathBuf,

    /// Directory the result files are written to
    #[clap(long, default_value = "results", env = "BREWER_OUT_DIR")]
    out_dir: PathBuf,

    /// Seed for query generation and `random` aggregation; drawn from
    /// entropy when absent
    #[clap(long)]
    seed: Option<u64>,

    /// Skip the batch baseline run
    #[clap(long)]
    no_eager: bool,
}

pub fn command(config: Config) -> Result<()> {
    let task = tasks::find(&config.task).context(UnknownTaskSnafu { name: &config.task })?;

    let seed = config.seed.unwrap_or_else(|| rand::thread_rng().gen());
    let mut rng = SmallRng::seed_from_u64(seed);
    let query = task.generate_query(&mut rng, seed);

    let data_file = |suffix: &str| config.data_dir.join(format!("{}{}", task.name, suffix));
    let schema = task.schema();
    let store = Arc::new(load::load_records(&data_file("_dataset.csv"), &schema).context(LoadDatasetSnafu)?);
    let blocks = Arc::new(if task.blocking {
        load::load_block_index(
            &data_file("_blocks.txt"),
            &data_file("_block_costs.txt"),
            &data_file("_record_blocks.txt"),
        )
        .context(LoadDatasetSnafu)?
    } else {
        BlockIndex::single_block(store.records().map(|r| r.id().clone()))
    });
    let gold = Arc::new(GoldMatcher::from_csv(&data_file("_gold.csv")).context(LoadGoldSnafu)?);
    info!(
        task = task.name,
        records = store.len(),
        blocks = blocks.len(),
        gold_pairs = gold.len(),
        seed,
        "inputs loaded"
    );

    fs::create_dir_all(&config.out_dir).context(WriteOutputSnafu {
        path: &config.out_dir,
    })?;

    let sql = query.to_sql(task.name);
    let query_path = config.out_dir.join(format!("{}_query.txt", config.index));
    fs::write(&query_path, &sql).context(WriteOutputSnafu { path: &query_path })?;

    // lazy run: stream rows to disk as the scheduler emits them
    let lazy_path = config.out_dir.join(format!("{}_lazy.csv", config.index));
    let mut scheduler = Scheduler::new(
        Arc::clone(&store),
        Arc::clone(&blocks),
        Arc::clone(&gold) as _,
        query.clone(),
    )
    .context(EngineSnafu)?;

    let mut writer = csv::Writer::from_path(&lazy_path).context(WriteCsvSnafu { path: &lazy_path })?;
    writer
        .write_record(task.attributes())
        .context(WriteCsvSnafu { path: &lazy_path })?;
    while let Some(entity) = scheduler.next_entity() {
        writer
            .write_record(render_row(&entity, task.attributes()))
            .context(WriteCsvSnafu { path: &lazy_path })?;
    }
    writer
        .flush()
        .context(WriteOutputSnafu { path: &lazy_path })?;

    let stats = scheduler.stats();
    info!(
        emitted = stats.emitted,
        heads_popped = stats.heads_popped,
        entities_resolved = stats.entities_resolved,
        sentinel_reinsertions = stats.sentinel_reinsertions,
        oracle_calls = gold.stats().uncached_calls,
        "lazy run complete"
    );

    if !config.no_eager {
        let rows = batch::execute(&store, &blocks, gold.as_ref(), &query).context(EngineSnafu)?;
        let eager_path = config.out_dir.join(format!("{}_eager.csv", config.index));
        let mut writer =
            csv::Writer::from_path(&eager_path).context(WriteCsvSnafu { path: &eager_path })?;
        writer
            .write_record(task.attributes())
            .context(WriteCsvSnafu { path: &eager_path })?;
        for entity in &rows {
            writer
                .write_record(render_row(entity, task.attributes()))
                .context(WriteCsvSnafu { path: &eager_path })?;
        }
        writer
            .flush()
            .context(WriteOutputSnafu { path: &eager_path })?;
        info!(
            rows = rows.len(),
            oracle_calls = gold.stats().uncached_calls,
            "eager run complete"
        );
    }

    append_query_log(&config, &sql, seed)?;
    Ok(())
}

/// Append one line describing this run to the shared `queries.csv`.
fn append_query_log(config: &Config, sql: &str, seed: u64) -> Result<()> {
    let path = config.out_dir.join("queries.csv");
    let new = !path.exists();
    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .context(WriteOutputSnafu { path: &path })?;

    let mut writer = csv::WriterBuilder::new().from_writer(file);
    if new {
        writer
            .write_record(["index", "task", "seed", "query"])
            .context(WriteCsvSnafu { path: &path })?;
    }
    writer
        .write_record([
            config.index.to_string(),
            config.task.clone(),
            seed.to_string(),
            sql.replace('\n', " ").trim_end().to_string(),
        ])
        .context(WriteCsvSnafu { path: &path })?;
    writer
        .flush()
        .context(WriteOutputSnafu { path: &path })?;
    Ok(())
}

/// One output row: the projected aggregated values, nulls as empty fields.
fn render_row(entity: &AggregatedEntity, attributes: &[&str]) -> Vec<String> {
    attributes
        .iter()
        .map(|a| match entity.value(a) {
            None | Some(AttrValue::Null) => String::new(),
            Some(AttrValue::Number(v)) if v.is_nan() => String::new(),
            Some(AttrValue::Number(v)) => format!("{}", v),
            Some(AttrValue::Text(s)) => s.clone(),
        })
        .collect()
}
