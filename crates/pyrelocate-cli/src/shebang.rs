//! Réécriture des shebangs des scripts de l’installation.
//!
//! Seule la première ligne est inspectée et, le cas échéant, remplacée ; le
//! reste du fichier est recopié octet pour octet. Tout fichier illisible,
//! binaire ou sans directive est ignoré sans erreur.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, info};

use crate::config::RelocateConfig;
use crate::report::ScriptSummary;

/// Directive `#!` décomposée.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shebang {
    /// Chemin de l’interpréteur (sans guillemets).
    pub interpreter: String,
    /// Arguments qui suivent l’interpréteur.
    pub args: Vec<String>,
    /// Guillemet entourant l’interpréteur, s’il y en avait un.
    pub quote: Option<char>,
}

impl Shebang {
    /// Analyse une première ligne (fin de ligne incluse ou non).
    pub fn parse(line: &str) -> Option<Self> {
        let body = line.strip_prefix("#!")?;
        let body = body.trim_end_matches(['\r', '\n']);
        match body.chars().next() {
            Some(q @ ('"' | '\'')) => {
                let inner = &body[1..];
                let end = inner.find(q)?;
                Some(Self {
                    interpreter: inner[..end].to_string(),
                    args: inner[end + 1..].split_whitespace().map(ToString::to_string).collect(),
                    quote: Some(q),
                })
            }
            _ => {
                let mut tokens = body.split_whitespace().map(ToString::to_string);
                let interpreter = tokens.next()?;
                Some(Self { interpreter, args: tokens.collect(), quote: None })
            }
        }
    }

    /// Reforme la directive, sans fin de ligne.
    pub fn render(&self) -> String {
        let mut out = String::from("#!");
        match self.quote {
            Some(q) => {
                out.push(q);
                out.push_str(&self.interpreter);
                out.push(q);
            }
            None => out.push_str(&self.interpreter),
        }
        for arg in &self.args {
            out.push(' ');
            out.push_str(arg);
        }
        out
    }
}

/// Issue du traitement d’un script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptOutcome {
    /// Première ligne réécrite.
    Rewritten,
    /// Déjà relocalisé : aucune écriture.
    UpToDate,
    /// Directive étrangère (autre interpréteur, `env python`).
    Ineligible,
    /// Pas un script texte à directive, ou erreur d’E/S.
    Skipped,
}

/// Décision prise pour une première ligne.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    /// Pas de directive exploitable.
    NotADirective,
    /// Directive laissée telle quelle.
    Ineligible,
    /// Directive déjà à jour.
    UpToDate,
    /// Nouvelle première ligne (sans fin de ligne).
    Rewrite(String),
}

/// Vrai si la directive délègue la recherche de l’interpréteur à `env`.
fn is_env_lookup(line: &str, shebang: &Shebang) -> bool {
    line.contains("/usr/bin/env python")
        || shebang.interpreter.rsplit(['/', '\\']).next() == Some("env")
}

/// Fusionne les arguments existants et les options requises.
///
/// L’ordre d’origine est conservé, les doublons supprimés, les options
/// manquantes ajoutées à la fin.
pub fn merge_flags(args: &[String], required: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    args.iter()
        .chain(required)
        .filter(|a| seen.insert(a.as_str()))
        .cloned()
        .collect()
}

/// Calcule le sort d’une première ligne pour une installation en `new_path`.
pub fn plan(first_line: &str, new_path: &str, cfg: &RelocateConfig) -> Plan {
    let Some(current) = Shebang::parse(first_line) else {
        return Plan::NotADirective;
    };
    if !current.interpreter.ends_with(&cfg.bin_python_suffix()) || is_env_lookup(first_line, &current) {
        return Plan::Ineligible;
    }

    let new_bin = cfg.interpreter_path(new_path);
    let add_quote = new_path.contains(' ');
    let arg_set: HashSet<&str> = current.args.iter().map(String::as_str).collect();
    let flag_set: HashSet<&str> = cfg.python_flags.iter().map(String::as_str).collect();
    if new_bin == current.interpreter && current.quote.is_some() == add_quote && arg_set == flag_set {
        return Plan::UpToDate;
    }

    let next = Shebang {
        interpreter: new_bin,
        args: merge_flags(&current.args, &cfg.python_flags),
        quote: add_quote.then(|| current.quote.unwrap_or('"')),
    };
    let line = next.render();
    if line == first_line.trim_end_matches(['\r', '\n']) {
        return Plan::UpToDate;
    }
    Plan::Rewrite(line)
}

/// Met à jour le shebang d’un script. Ne renvoie jamais d’erreur : les
/// fichiers illisibles ou non inscriptibles sont simplement ignorés.
pub fn update_script(path: &Path, new_path: &str, cfg: &RelocateConfig) -> ScriptOutcome {
    let Ok(bytes) = fs::read(path) else {
        return ScriptOutcome::Skipped;
    };
    let Ok(text) = std::str::from_utf8(&bytes) else {
        return ScriptOutcome::Skipped;
    };
    if text.is_empty() {
        return ScriptOutcome::Skipped;
    }

    let (first, rest) = match text.find('\n') {
        Some(i) => (&text[..=i], &text[i + 1..]),
        None => (text, ""),
    };

    let line = match plan(first, new_path, cfg) {
        Plan::NotADirective => return ScriptOutcome::Skipped,
        Plan::Ineligible => return ScriptOutcome::Ineligible,
        Plan::UpToDate => return ScriptOutcome::UpToDate,
        Plan::Rewrite(line) => line,
    };

    let eol = if first.ends_with("\r\n") { "\r\n" } else { "\n" };
    let mut out = String::with_capacity(text.len() + line.len());
    out.push_str(&line);
    out.push_str(eol);
    out.push_str(rest);

    if let Err(err) = fs::write(path, out) {
        debug!("script ignoré {}: {err}", path.display());
        return ScriptOutcome::Skipped;
    }
    info!("S: {}", path.display());
    ScriptOutcome::Rewritten
}

/// Met à jour tous les scripts d’un dossier (ordre alphabétique).
pub fn update_scripts(dir: &Path, new_path: &str, cfg: &RelocateConfig) -> Result<ScriptSummary> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("lecture du dossier {}", dir.display()))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .collect();
    entries.sort();

    let mut summary = ScriptSummary::default();
    for path in entries {
        match update_script(&path, new_path, cfg) {
            ScriptOutcome::Rewritten => summary.rewritten.push(path),
            ScriptOutcome::UpToDate => summary.up_to_date += 1,
            ScriptOutcome::Ineligible => summary.ineligible += 1,
            ScriptOutcome::Skipped => summary.skipped += 1,
        }
    }
    Ok(summary)
}

/* ─────────────────────────── Tests ─────────────────────────── */
