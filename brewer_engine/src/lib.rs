//! Contains the BrewER query engine.
//!
//! BrewER answers SQL-like aggregate queries over collections in which one
//! real-world entity may be represented by many duplicate records. Instead of
//! resolving every duplicate upfront, the engine resolves entities on demand,
//! in the order the query ranks them, so that correct top results stream out
//! while most of the dataset is still unresolved.
//!
//! * [`query::QuerySpec`] describes a query;
//! * [`scheduler::Scheduler`] is the lazy engine: a pull API emitting one
//!   aggregated entity per call;
//! * [`batch`] is the resolve-everything baseline the scheduler is checked
//!   against.
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(
    missing_debug_implementations,
    clippy::explicit_iter_loop,
    clippy::use_self,
    clippy::clone_on_ref_ptr
)]

use data_types::RecordId;
use snafu::Snafu;

pub mod aggregate;
pub mod batch;
pub mod entity;
pub mod query;
pub mod scheduler;


pub use query::QuerySpec;
pub use scheduler::{Scheduler, SchedulerStats};

/// Fatal errors of a query run.
#[derive(Debug, Snafu)]
#[allow(missing_docs)]
pub enum Error {
    #[snafu(display("invalid query: {}", source))]
    Query { source: query::Error },

    #[snafu(display("block index references unknown record {}", rid))]
    UnknownRecord { rid: RecordId },
}

#[allow(missing_docs)]
pub type Result<T, E = Error> = std::result::Result<T, E>;
