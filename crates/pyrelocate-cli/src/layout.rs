//! Localisation et validation d’une installation Python.
//!
//! ```text
//! POSIX                     Windows
//! <base>/bin/python         <base>\bin\python.exe
//! <base>/bin/               <base>\Scripts\
//! <base>/lib/pythonX.Y/     <base>\Lib\
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::{Flavor, RelocateConfig};

/// Élément manquant qui invalide l’installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Missing {
    /// Aucun dossier `pythonX.Y` sous `lib/`.
    LibraryFolder,
    /// Dossier des scripts absent.
    ScriptsDir,
    /// Dossier `bin` absent.
    BinDir,
    /// Binaire de l’interpréteur absent de `bin`.
    Interpreter,
}

#[derive(Debug, Error)]
pub enum LocateError {
    #[error("{} does not refer to a Python installation", base.display())]
    NotAnInstallation { base: PathBuf, missing: Missing },
}

/// Installation résolue. Recalculée à chaque exécution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Installation {
    pub base: PathBuf,
    pub scripts_dir: PathBuf,
    /// `pythonX.Y` (POSIX) ou `Lib` (Windows).
    pub lib_name: String,
    pub lib_dir: PathBuf,
}

/// `python<chiffres>.<chiffres>`
fn is_versioned_lib(name: &str) -> bool {
    let Some(version) = name.strip_prefix("python") else {
        return false;
    };
    let Some((major, minor)) = version.split_once('.') else {
        return false;
    };
    let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    digits(major) && digits(minor)
}

/// Premier dossier `pythonX.Y` de `lib_root`, par ordre alphabétique.
fn find_lib_name(lib_root: &Path) -> Option<String> {
    let mut names: Vec<String> = fs::read_dir(lib_root)
        .ok()?
        .filter_map(Result::ok)
        .filter(|e| e.path().is_dir())
        .filter_map(|e| e.file_name().into_string().ok())
        .filter(|n| is_versioned_lib(n))
        .collect();
    names.sort();
    names.into_iter().next()
}

/// Résout les dossiers de l’installation située en `base` et vérifie sa forme.
/// Aucun fichier n’est modifié.
pub fn locate(base: &Path, cfg: &RelocateConfig) -> Result<Installation, LocateError> {
    let fail = |missing| LocateError::NotAnInstallation { base: base.to_path_buf(), missing };

    let bin_dir = base.join("bin");
    let scripts_dir = base.join(cfg.flavor.scripts_dir());
    let (lib_root, lib_name) = match cfg.flavor {
        Flavor::Posix => {
            let root = base.join("lib");
            let name = find_lib_name(&root).ok_or_else(|| fail(Missing::LibraryFolder))?;
            (root, name)
        }
        Flavor::Windows => (base.to_path_buf(), "Lib".to_string()),
    };

    if !scripts_dir.is_dir() {
        return Err(fail(Missing::ScriptsDir));
    }
    if !bin_dir.is_dir() {
        return Err(fail(Missing::BinDir));
    }
    if !bin_dir.join(cfg.flavor.python_exe()).is_file() {
        return Err(fail(Missing::Interpreter));
    }

    let lib_dir = lib_root.join(&lib_name);
    Ok(Installation { base: base.to_path_buf(), scripts_dir, lib_name, lib_dir })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn posix_install(root: &Path, libs: &[&str]) {
        fs::create_dir_all(root.join("bin")).unwrap();
        fs::write(root.join("bin/python"), "").unwrap();
        for lib in libs {
            fs::create_dir_all(root.join("lib").join(lib)).unwrap();
        }
    }

    fn missing(err: LocateError) -> Missing {
        let LocateError::NotAnInstallation { missing, .. } = err;
        missing
    }

    #[test]
    fn versioned_lib_names() {
        assert!(is_versioned_lib("python3.9"));
        assert!(is_versioned_lib("python3.11"));
        assert!(!is_versioned_lib("python3"));
        assert!(!is_versioned_lib("python3.x"));
        assert!(!is_versioned_lib("site-packages"));
    }

    #[test]
    fn locates_posix_layout() {
        let dir = tempfile::tempdir().unwrap();
        posix_install(dir.path(), &["python3.9", "pkgconfig"]);
        fs::write(dir.path().join("lib/python3.10"), "not a dir").unwrap();

        let install = locate(dir.path(), &RelocateConfig::new(Flavor::Posix)).unwrap();
        assert_eq!(install.lib_name, "python3.9");
        assert_eq!(install.lib_dir, dir.path().join("lib/python3.9"));
        assert_eq!(install.scripts_dir, dir.path().join("bin"));
    }

    #[test]
    fn first_sorted_library_folder_wins() {
        let dir = tempfile::tempdir().unwrap();
        posix_install(dir.path(), &["python3.9", "python2.7"]);
        let install = locate(dir.path(), &RelocateConfig::new(Flavor::Posix)).unwrap();
        assert_eq!(install.lib_name, "python2.7");
    }

    #[test]
    fn reports_what_is_missing() {
        let cfg = RelocateConfig::new(Flavor::Posix);
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(missing(locate(dir.path(), &cfg).unwrap_err()), Missing::LibraryFolder);

        fs::create_dir_all(dir.path().join("lib/python3.9")).unwrap();
        assert_eq!(missing(locate(dir.path(), &cfg).unwrap_err()), Missing::ScriptsDir);

        fs::create_dir_all(dir.path().join("bin")).unwrap();
        let err = locate(dir.path(), &cfg).unwrap_err();
        assert!(err.to_string().ends_with("does not refer to a Python installation"));
        assert_eq!(missing(err), Missing::Interpreter);
    }

    #[test]
    fn windows_layout_uses_scripts_and_lib() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = RelocateConfig::new(Flavor::Windows);
        fs::create_dir_all(dir.path().join("bin")).unwrap();
        fs::write(dir.path().join("bin").join("python.exe"), "").unwrap();
        assert_eq!(missing(locate(dir.path(), &cfg).unwrap_err()), Missing::ScriptsDir);

        fs::create_dir_all(dir.path().join("Scripts")).unwrap();
        let install = locate(dir.path(), &cfg).unwrap();
        assert_eq!(install.lib_name, "Lib");
        assert_eq!(install.lib_dir, dir.path().join("Lib"));
    }
}
