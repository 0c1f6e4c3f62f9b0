//! Bilan d’une relocalisation, sérialisable en JSON (`--json`).

use std::path::PathBuf;

use serde::Serialize;

/// Passe shebang.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScriptSummary {
    /// Scripts dont la première ligne a été réécrite.
    pub rewritten: Vec<PathBuf>,
    /// Déjà à jour.
    pub up_to_date: usize,
    /// Directive présente mais étrangère à l’installation.
    pub ineligible: usize,
    /// Binaires, fichiers vides, illisibles…
    pub skipped: usize,
}

/// Passe bytecode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BytecodeSummary {
    /// Fichiers `.pyc`/`.pyo` réécrits.
    pub rewritten: Vec<PathBuf>,
    /// Fichiers déjà à jour.
    pub up_to_date: usize,
}

/// Résultat complet de `relocate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelocationReport {
    /// Chemin écrit dans les scripts et le bytecode.
    pub new_path: String,
    /// Dossier de bibliothèque traité.
    pub lib_dir: PathBuf,
    pub scripts: ScriptSummary,
    pub bytecode: BytecodeSummary,
}

impl RelocationReport {
    /// Nombre total de fichiers modifiés.
    pub fn changed(&self) -> usize { self.scripts.rewritten.len() + self.bytecode.rewritten.len() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn json_shape() {
        let report = RelocationReport {
            new_path: "/new".into(),
            lib_dir: PathBuf::from("/new/lib/python3.9"),
            scripts: ScriptSummary { rewritten: vec![PathBuf::from("/new/bin/pip")], up_to_date: 1, ineligible: 2, skipped: 0 },
            bytecode: BytecodeSummary::default(),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["new_path"], "/new");
        assert_eq!(json["scripts"]["rewritten"][0], "/new/bin/pip");
        assert_eq!(json["scripts"]["ineligible"], 2);
        assert_eq!(json["bytecode"]["up_to_date"], 0);
        assert_eq!(report.changed(), 1);
    }
}
