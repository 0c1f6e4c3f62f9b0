//! Configuration d’une relocalisation, construite une fois au démarrage.

use serde::Serialize;

/// Options d’interpréteur ajoutées par défaut aux shebangs réécrits.
pub const DEFAULT_PYTHON_FLAGS: &[&str] = &["-s"];

/// Disposition de l’installation selon la plateforme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Flavor {
    /// `bin/`, `lib/pythonX.Y/`, `python`.
    Posix,
    /// `Scripts\`, `Lib\`, `python.exe`.
    Windows,
}

impl Flavor {
    /// Disposition de la plateforme hôte.
    pub const fn host() -> Self {
        if cfg!(windows) { Self::Windows } else { Self::Posix }
    }

    /// Séparateur de chemin.
    pub const fn separator(self) -> char {
        match self {
            Self::Posix => '/',
            Self::Windows => '\\',
        }
    }

    /// Nom du binaire de l’interpréteur.
    pub const fn python_exe(self) -> &'static str {
        match self {
            Self::Posix => "python",
            Self::Windows => "python.exe",
        }
    }

    /// Dossier des scripts exécutables.
    pub const fn scripts_dir(self) -> &'static str {
        match self {
            Self::Posix => "bin",
            Self::Windows => "Scripts",
        }
    }
}

/// Paramètres partagés par la passe shebang et la passe bytecode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelocateConfig {
    /// Disposition de l’installation.
    pub flavor: Flavor,
    /// Options que tout shebang réécrit doit porter.
    pub python_flags: Vec<String>,
}

impl Default for RelocateConfig {
    fn default() -> Self { Self::new(Flavor::host()) }
}

impl RelocateConfig {
    /// Configuration par défaut pour une disposition donnée.
    pub fn new(flavor: Flavor) -> Self {
        Self { flavor, python_flags: DEFAULT_PYTHON_FLAGS.iter().map(ToString::to_string).collect() }
    }

    /// Remplace les options d’interpréteur requises.
    #[must_use]
    pub fn with_python_flags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.python_flags = flags.into_iter().map(Into::into).collect();
        self
    }

    /// Suffixe attendu d’un interpréteur relocalisable : `/bin/python`.
    pub fn bin_python_suffix(&self) -> String {
        let sep = self.flavor.separator();
        format!("{sep}bin{sep}{}", self.flavor.python_exe())
    }

    /// Interpréteur de l’installation située en `new_path`.
    pub fn interpreter_path(&self, new_path: &str) -> String {
        self.join(new_path, &["bin", self.flavor.python_exe()])
    }

    /// Jointure textuelle avec le séparateur de la disposition.
    pub fn join(&self, base: &str, parts: &[&str]) -> String {
        let sep = self.flavor.separator();
        let mut out = base.to_string();
        for part in parts {
            if !out.is_empty() && !out.ends_with(sep) {
                out.push(sep);
            }
            out.push_str(part);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn posix_interpreter() {
        let cfg = RelocateConfig::new(Flavor::Posix);
        assert_eq!(cfg.bin_python_suffix(), "/bin/python");
        assert_eq!(cfg.interpreter_path("/new/path"), "/new/path/bin/python");
        assert_eq!(cfg.interpreter_path("/new/path/"), "/new/path/bin/python");
        assert_eq!(cfg.python_flags, vec!["-s".to_string()]);
    }

    #[test]
    fn windows_interpreter() {
        let cfg = RelocateConfig::new(Flavor::Windows);
        assert_eq!(cfg.bin_python_suffix(), "\\bin\\python.exe");
        assert_eq!(cfg.interpreter_path("C:\\Py"), "C:\\Py\\bin\\python.exe");
    }

    #[test]
    fn custom_flags() {
        let cfg = RelocateConfig::new(Flavor::Posix).with_python_flags(["-s", "-E"]);
        assert_eq!(cfg.python_flags, vec!["-s".to_string(), "-E".to_string()]);
    }
}
