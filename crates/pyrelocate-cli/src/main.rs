//! `pyrelocate` — relocalise une installation Python
//!
//! Ici on fait uniquement : parsing d'arguments, initialisation (logger,
//! couleur), et délégation à `pyrelocate_cli` (lib).

#![forbid(unsafe_code)]

use std::{path::PathBuf, process::ExitCode};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, ValueEnum};

use pyrelocate_cli as cli;

// ──────────────────────────── CLI (clap) ────────────────────────────

#[derive(Debug, Parser)]
#[command(name = "pyrelocate", version, about = "Update the path of scripts and bytecode to a new Python prefix", long_about = None)]
struct Opt {
    /// Chemin de l'installation Python (à son nouvel emplacement)
    path: PathBuf,

    /// Chemin à écrire dans les scripts et le bytecode ("auto" : forme absolue de PATH)
    #[arg(long = "update-path", value_name = "PATH|auto", default_value = "auto")]
    update_path: cli::UpdatePath,

    /// Option d'interpréteur requise dans les shebangs (répétable)
    #[arg(long = "python-flag", value_name = "FLAG", action = ArgAction::Append, allow_hyphen_values = true)]
    python_flags: Vec<String>,

    /// Affiche le rapport en JSON sur stdout
    #[arg(long)]
    json: bool,

    /// Augmente la verbosité (-v : fichiers réécrits, -vv, -vvv)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,

    /// Mode silencieux (casse la verbosité)
    #[arg(short = 'q', long = "quiet", action = ArgAction::SetTrue)]
    quiet: bool,

    /// Force la couleur (si la feature `color` est compilée)
    #[arg(long = "color", value_enum, default_value_t = ColorChoice::Auto)]
    color: ColorChoice,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ColorChoice {
    Auto,
    Always,
    Never,
}

// ──────────────────────────── Logger / Verbosité ────────────────────────────

const fn log_level(verbose: u8, quiet: bool) -> &'static str {
    if quiet {
        return "error";
    }
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
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
    let _ = choice;
}

fn config_from(opt: &Opt) -> cli::RelocateConfig {
    let cfg = cli::RelocateConfig::default();
    if opt.python_flags.is_empty() {
        cfg
    } else {
        cfg.with_python_flags(opt.python_flags.iter().cloned())
    }
}

// ──────────────────────────── main ────────────────────────────

fn main() -> ExitCode {
    if let Err(e) = real_main() {
        eprintln!("error: {:#}", e);
        return ExitCode::from(1);
    }
    ExitCode::from(0)
}

fn real_main() -> Result<()> {
    let opt = Opt::parse();

    init_color(opt.color);
    cli::init_logger(log_level(opt.verbose, opt.quiet));

    let cfg = config_from(&opt);
    let task = cli::RelocateTask { base: opt.path.clone(), update_path: opt.update_path.clone() };
    let report = cli::relocate(&task, &cfg)?;

    if opt.json {
        let json = serde_json::to_string_pretty(&report).context("sérialisation du rapport")?;
        println!("{json}");
    } else if !opt.quiet && report.changed() > 0 {
        cli::status_ok("relocated", &cli::summarize(&report));
    }
    Ok(())
}
