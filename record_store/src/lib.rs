//! The read-only side of a query: an immutable record table ([`RecordStore`])
//! and the block index ([`BlockIndex`]) produced by offline blocking, with
//! loaders for their on-disk formats.
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(
    missing_debug_implementations,
    clippy::explicit_iter_loop,
    clippy::use_self,
    clippy::clone_on_ref_ptr
)]

pub mod blocks;
pub mod load;
pub mod store;

pub use blocks::BlockIndex;
pub use store::RecordStore;
