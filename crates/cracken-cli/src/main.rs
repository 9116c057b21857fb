//! `cracken` — decompile Ren'Py `.rpyc`/`.rpymc` files and unpack `.rpa` archives.
//!
//! Argument parsing, logger and colour setup only; the work is done by
//! `cracken_cli`.

#![forbid(unsafe_code)]

use std::{path::PathBuf, process::ExitCode};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, ValueEnum};

use cracken_cli as cli;

// ──────────────────────────── CLI (clap) ────────────────────────────

#[derive(Debug, Parser)]
#[command(name = "cracken", version, about = "Decompile Ren'Py scripts and extract Ren'Py archives", long_about = None)]
struct Opt {
    /// File or folder to process
    path: PathBuf,

    /// Also decompile files extracted from archives
    #[arg(short, long)]
    recursive: bool,

    /// Delete archives after extraction
    #[arg(short, long)]
    clear: bool,

    /// Run embedded python through the formatter
    #[arg(short, long)]
    prettify: bool,

    /// Config file (default: nearest .cracken.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Decompile without writing anything
    #[arg(long = "dry-run")]
    dry_run: bool,

    /// More output (-v, -vv, -vvv)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,

    /// Errors only
    #[arg(short = 'q', long = "quiet", action = ArgAction::SetTrue)]
    quiet: bool,

    /// Colour of status lines
    #[arg(long = "color", value_enum, default_value_t = ColorChoice::Auto)]
    color: ColorChoice,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ColorChoice {
    Auto,
    Always,
    Never,
}

// ──────────────────────────── Logger / colour ────────────────────────────

fn init_telemetry(verbose: u8, quiet: bool) {
    let level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    if std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var("RUST_LOG", level);
    }
    cli::init_logger();
}

fn init_color(choice: ColorChoice) {
    #[cfg(feature = "color")]
    {
        match choice {
            ColorChoice::Auto => owo_colors::unset_override(),
            ColorChoice::Always => owo_colors::set_override(true),
            ColorChoice::Never => owo_colors::set_override(false),
        }
    }
    #[cfg(not(feature = "color"))]
    {
        let _ = choice;
    }
}

// ──────────────────────────── main ────────────────────────────

fn main() -> ExitCode {
    let opt = Opt::parse();
    init_color(opt.color);
    init_telemetry(opt.verbose, opt.quiet);

    match real_main(opt) {
        Ok(report) => ExitCode::from(report.exit_code()),
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}

fn real_main(opt: Opt) -> Result<cli::Report> {
    let cwd = std::env::current_dir().context("reading the working directory")?;
    let config = cli::config::load(opt.config.as_deref(), &cwd)?;

    let mut settings = cli::Settings::new(opt.path, &config);
    settings.recursive |= opt.recursive;
    settings.clear |= opt.clear;
    settings.prettify |= opt.prettify;
    settings.dry_run = opt.dry_run;

    cli::run(&settings)
}
