//! The pairwise matching oracle, see [`Matcher`] and [`GoldMatcher`].
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(
    missing_debug_implementations,
    clippy::explicit_iter_loop,
    clippy::use_self,
    clippy::clone_on_ref_ptr
)]

use data_types::RecordId;
use observability_deps::tracing::debug;
use parking_lot::Mutex;
use snafu::{OptionExt, ResultExt, Snafu};
use std::{
    collections::{HashMap, HashSet},
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

    #[snafu(display("cannot read gold file {}: {}", path.display(), source))]
    Csv { path: PathBuf, source: csv::Error },

    #[snafu(display("gold file {} is missing the \"{}\" column", path.display(), column))]
    MissingColumn { path: PathBuf, column: String },
}

#[allow(missing_docs)]
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Cache statistics of a matcher.
///
/// `uncached_calls` counts the distinct unordered pairs the oracle was asked
/// about; it is the engine's primary cost metric. `cached_hits` counts the
/// lookups answered from the memo without consulting the oracle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatcherStats {
    /// Distinct pairs resolved by the underlying oracle.
    pub uncached_calls: u64,
    /// Lookups answered from the memo.
    pub cached_hits: u64,
}

/// Decides whether two records refer to the same real-world entity.
///
/// Implementations must be symmetric and reflexive; transitivity is NOT
/// assumed — the engine imposes it by closing matches over the block graph.
/// Callers must only ask about co-blocked pairs; anything else is a
/// programming bug on their side.
pub trait Matcher: std::fmt::Debug + Send + Sync {
    /// Whether `a` and `b` match.
    fn matches(&self, a: &RecordId, b: &RecordId) -> bool;

    /// Cache statistics accumulated so far.
    fn stats(&self) -> MatcherStats;
}

/// A [`Matcher`] backed by a set of known matching pairs ("gold" pairs),
/// with a process-lifetime memo so that each distinct pair is resolved at
/// most once.
///
/// The gold file is a CSV with columns `left_spec_id,right_spec_id`, every
/// row an ordered pair (`left < right`); a pair matches iff it is present.
#[derive(Debug)]
pub struct GoldMatcher {
    pairs: HashSet<(RecordId, RecordId)>,
    state: Mutex<CacheState>,
}

#[derive(Debug, Default)]
struct CacheState {
    memo: HashMap<(RecordId, RecordId), bool>,
    stats: MatcherStats,
}

impl GoldMatcher {
    /// Create a matcher from unordered pairs; each is normalized so the
    /// smaller id comes first.
    pub fn new(pairs: impl IntoIterator<Item = (RecordId, RecordId)>) -> Self {
        let pairs = pairs.into_iter().map(|(a, b)| ordered(a, b)).collect();
        Self {
            pairs,
            state: Default::default(),
        }
    }

    /// Load a matcher from a gold CSV file.
    pub fn from_csv(path: &Path) -> Result<Self> {
        let file = File::open(path).context(IoSnafu { path })?;
        let mut reader = csv::Reader::from_reader(BufReader::new(file));

        let headers = reader.headers().context(CsvSnafu { path })?.clone();
        let left = headers
            .iter()
            .position(|h| h == "left_spec_id")
            .context(MissingColumnSnafu {
                path,
                column: "left_spec_id",
            })?;
        let right = headers
            .iter()
            .position(|h| h == "right_spec_id")
            .context(MissingColumnSnafu {
                path,
                column: "right_spec_id",
            })?;

        let mut pairs = Vec::new();
        for row in reader.records() {
            let row = row.context(CsvSnafu { path })?;
            pairs.push((
                RecordId::from(row.get(left).unwrap_or_default()),
                RecordId::from(row.get(right).unwrap_or_default()),
            ));
        }
        debug!(path = %path.display(), n_pairs = pairs.len(), "loaded gold pairs");

        Ok(Self::new(pairs))
    }

    /// Number of gold pairs.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Whether there are no gold pairs.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl Matcher for GoldMatcher {
    fn matches(&self, a: &RecordId, b: &RecordId) -> bool {
        // reflexive lookups do not touch the memo
        if a == b {
            return true;
        }
        let key = ordered(a.clone(), b.clone());

        let mut state = self.state.lock();
        if let Some(&hit) = state.memo.get(&key) {
            state.stats.cached_hits += 1;
            return hit;
        }

        state.stats.uncached_calls += 1;
        let matched = self.pairs.contains(&key);
        state.memo.insert(key, matched);
        matched
    }

    fn stats(&self) -> MatcherStats {
        self.state.lock().stats
    }
}

fn ordered(a: RecordId, b: RecordId) -> (RecordId, RecordId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}
