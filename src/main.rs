//! # scrubline command-line entry point
//!
//! ```text
//! main()
//!   ├─> parse arguments (clap)
//!   ├─> load settings (file + environment)
//!   ├─> install logging
//!   └─> run the subcommand on a tokio runtime
//! ```
//!
//! ```bash
//! scrubline run sales.csv --schema schema.json
//! scrubline profile sales.csv --visuals out/
//! scrubline validate sales.csv --schema schema.json
//! ```

#![expect(clippy::print_stdout)]

mod cli;

use anyhow::Result;
use clap::Parser as _;
use scrubline::config::AppSettings;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    let settings = AppSettings::load(cli.settings.as_deref())?;
    scrubline::logging::init(settings.log_to_file)?;

    tokio::runtime::Runtime::new()?.block_on(cli::run_command(cli.command, settings))
}
