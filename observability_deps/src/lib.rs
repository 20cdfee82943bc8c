//! This crate exists to add a level of indirection between the tracing
//! ecosystem and its users within this workspace, to ensure consistent
//! versions and unified updates.
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(
    missing_debug_implementations,
    clippy::explicit_iter_loop,
    clippy::use_self,
    clippy::clone_on_ref_ptr
)]

pub use tracing;
