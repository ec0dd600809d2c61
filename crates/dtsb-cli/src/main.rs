#![allow(clippy::print_stderr)]

mod args;
mod reporter;
mod tracing_config;

use anyhow::{Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::Path;
use tracing::debug;

use args::CliArgs;
use dtsb_core::{Compilation, DtsBundlePlugin};
use reporter::Reporter;

/// Unresolved modules are warnings and still exit with success.
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERRORS: i32 = 1;

fn main() -> Result<()> {
    // Zero cost unless DTSB_LOG or RUST_LOG is set.
    tracing_config::init_tracing();

    let args = CliArgs::parse();
    let cwd = std::env::current_dir().context("failed to resolve current directory")?;

    let code = run(&args, &cwd)?;
    if code != EXIT_SUCCESS {
        std::process::exit(code);
    }
    Ok(())
}

fn run(args: &CliArgs, cwd: &Path) -> Result<i32> {
    let plugin = DtsBundlePlugin::new(args.bundle_options()?);
    let mut compilation = Compilation::new(cwd, &args.output_path);
    let report = plugin.after_emit(&mut compilation);

    let pretty = args
        .pretty
        .unwrap_or_else(|| std::io::stderr().is_terminal());
    let reporter = Reporter::new(pretty);

    let output = reporter.render(&compilation);
    if !output.is_empty() {
        eprint!("{output}");
    }
    if let Some(report) = &report {
        debug!(
            entry = %report.entry.display(),
            copied = report.copied.len(),
            "bundle finished"
        );
        eprintln!("{}", reporter.format_summary(report, cwd));
    }

    if compilation.has_errors() {
        Ok(EXIT_ERRORS)
    } else {
        Ok(EXIT_SUCCESS)
    }
}
