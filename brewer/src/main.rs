//! Entrypoint of the `brewer` CLI.
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(
    missing_debug_implementations,
    clippy::explicit_iter_loop,
    clippy::use_self,
    clippy::clone_on_ref_ptr
)]

use clap::Parser;
use snafu::{ResultExt, Snafu};
use tracing_subscriber::EnvFilter;

mod commands;
mod tasks;

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("Error in query subcommand: {}", source))]
    QueryError { source: commands::query::Error },
}

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Parser)]
#[clap(
    name = "brewer",
    about = "Progressive entity resolution over dirty record collections",
    version
)]
struct Config {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace); RUST_LOG
    /// overrides this
    #[clap(short = 'v', long = "verbose", parse(from_occurrences), global = true)]
    verbose: usize,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Parser)]
enum Command {
    /// Run one query task: the lazy engine plus the batch baseline
    Query(commands::query::Config),

    /// List the registered task classes
    Tasks,
}

fn main() {
    let config = Config::parse();
    init_logging(config.verbose);

    if let Err(e) = run(config.command) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Query(config) => commands::query::command(config).context(QuerySnafu),
        Command::Tasks => {
            for task in tasks::all() {
                println!("{:<24} blocking={}", task.name, task.blocking);
            }
            Ok(())
        }
    }
}

fn init_logging(verbose: usize) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
