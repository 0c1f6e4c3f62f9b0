//! pyrelocate-cli — bibliothèque du binaire `pyrelocate`
//!
//! Relocalise une installation Python déplacée : shebangs des scripts et
//! chemins source enregistrés dans le bytecode compilé.
//!
//! Points clés :
//! - `layout::locate` valide l’installation avant toute écriture
//! - `shebang` réécrit la première ligne des scripts (`S: <fichier>` en info)
//! - `bytecode` parcourt la bibliothèque et réécrit les `.pyc`/`.pyo` (`B: <fichier>`)
//! - `relocate::relocate` enchaîne le tout et renvoie un `RelocationReport`
//! - Traces (`feature = "trace"`) et couleurs (`feature = "color"`) optionnelles

#![deny(unused_must_use)]
#![forbid(unsafe_code)]

pub mod bytecode;
pub mod config;
pub mod layout;
pub mod relocate;
pub mod report;
pub mod shebang;

#[cfg(feature = "color")]
use owo_colors::{OwoColorize, Stream};

pub use config::{Flavor, RelocateConfig, DEFAULT_PYTHON_FLAGS};
pub use layout::{locate, Installation, LocateError, Missing};
pub use relocate::{relocate, RelocateError, RelocateTask, UpdatePath};
pub use report::{BytecodeSummary, RelocationReport, ScriptSummary};
pub use shebang::{ScriptOutcome, Shebang};

// ───────────────────────────── Initialisation ─────────────────────────────

/// Initialise le logger au niveau donné (`RUST_LOG` reste prioritaire).
pub fn init_logger(level: &str) {
    #[cfg(feature = "trace")]
    {
        let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
            .format_timestamp(None)
            .format_target(false)
            .try_init();
    }
    #[cfg(not(feature = "trace"))]
    let _ = level;
}

// ───────────────────────────── Sorties jolies ─────────────────────────────

/// Ligne de statut sur stderr, tag en vert.
pub fn status_ok(tag: &str, msg: &str) {
    #[cfg(feature = "color")]
    {
        eprintln!("{} {}", tag.if_supports_color(Stream::Stderr, |t| t.green().bold().to_string()), msg);
    }
    #[cfg(not(feature = "color"))]
    {
        eprintln!("{} {}", tag, msg);
    }
}

/// Résumé lisible d’un rapport.
pub fn summarize(report: &RelocationReport) -> String {
    format!(
        "{} → {} script(s), {} bytecode(s) réécrit(s) ({} à jour)",
        report.new_path,
        report.scripts.rewritten.len(),
        report.bytecode.rewritten.len(),
        report.scripts.up_to_date + report.bytecode.up_to_date,
    )
}

// ───────────────────────────── Tests ─────────────────────────────
