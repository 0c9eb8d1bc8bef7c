//! Binary entry point: parses arguments, resolves configuration, and
//! drives the parallel walker (§6, §10.1). The actual engine lives in
//! the library crate (`src/lib.rs`); this shim only wires stdio.
//!
//! Logging follows the teacher's `env_logger` + `log` facade convention:
//! nothing is emitted unless `RUST_LOG` is set, since per-file errors are
//! swallowed by design (§7) and only surfaced as `warn!` breadcrumbs.

use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;

use rgrep::cli::Cli;
use rgrep::config::Config;
use rgrep::output::Output;
use rgrep::walker;

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse_resolved();

    let config = match Config::from_cli(cli).context("invalid configuration") {
        Ok(c) => c,
        Err(e) => {
            eprintln!("rgrep: {e:#}");
            return ExitCode::from(2);
        }
    };

    let stdout_is_tty = atty::is(atty::Stream::Stdout);
    let stdout = io::BufWriter::new(io::stdout());
    let output = Output::new(
        Box::new(stdout),
        config.mode,
        config.color,
        config.heading,
        config.line_number,
        stdout_is_tty,
    );

    let stats = walker::run(Arc::new(config), Arc::new(output));
    log::info!(
        "searched {} files, {} matched, {} total matches in {:?}",
        stats.files_searched,
        stats.files_matched,
        stats.total_matches,
        stats.elapsed
    );
    let _ = io::stdout().flush();

    ExitCode::SUCCESS
}
