//! Shared test utilities: logging bootstrap and assertion helpers.
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(
    missing_debug_implementations,
    clippy::explicit_iter_loop,
    clippy::use_self,
    clippy::clone_on_ref_ptr
)]

use observability_deps::tracing;
use parking_lot::Once;
use tracing_subscriber::EnvFilter;

static LOG_SETUP: Once = Once::new();

/// Enables debug logging if the RUST_LOG environment variable is set
pub fn maybe_start_logging() {
    if std::env::var("RUST_LOG").is_ok() {
        start_logging()
    }
}

/// Start logging for tests, reading the log filter from RUST_LOG.
///
/// Hooks into the test runner's captured output so that per-test logs show up
/// with the test that produced them.
pub fn start_logging() {
    // ensure the global has been initialized exactly once
    LOG_SETUP.call_once(|| {
        let _ = tracing_log::LogTracer::init();

        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    })
}

/// Assert that `haystack` contains `needle`, with a readable failure message.
#[macro_export]
macro_rules! assert_contains {
    ($haystack:expr, $needle:expr) => {{
        let haystack = $haystack.to_string();
        let needle = $needle.to_string();
        assert!(
            haystack.contains(&needle),
            "assert_contains!\n  needle:   {:?}\n  haystack: {:?}",
            needle,
            haystack,
        );
    }};
}

/// Assert that `haystack` does not contain `needle`.
#[macro_export]
macro_rules! assert_not_contains {
    ($haystack:expr, $needle:expr) => {{
        let haystack = $haystack.to_string();
        let needle = $needle.to_string();
        assert!(
            !haystack.contains(&needle),
            "assert_not_contains!\n  needle:   {:?}\n  haystack: {:?}",
            needle,
            haystack,
        );
    }};
}
