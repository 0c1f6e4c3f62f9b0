//! Enchaînement complet : cible → installation → scripts → bytecode.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::{debug, info};
use thiserror::Error;

use crate::bytecode::update_pycs;
use crate::config::RelocateConfig;
use crate::layout::{locate, LocateError};
use crate::report::RelocationReport;
use crate::shebang::update_scripts;

/// Chemin à écrire dans l’installation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum UpdatePath {
    /// Forme absolue du dossier de l’installation.
    #[default]
    Auto,
    /// Chemin explicite ; doit être absolu.
    Path(PathBuf),
}

impl FromStr for UpdatePath {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(if s == "auto" { Self::Auto } else { Self::Path(PathBuf::from(s)) })
    }
}

/// Une relocalisation à effectuer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelocateTask {
    /// Dossier de l’installation (à son emplacement actuel).
    pub base: PathBuf,
    pub update_path: UpdatePath,
}

#[derive(Debug, Error)]
pub enum RelocateError {
    #[error("{} is not an absolute path", .0.display())]
    NotAbsolute(PathBuf),
    #[error("{} is not valid UTF-8", .0.display())]
    NonUtf8(PathBuf),
    #[error("cannot resolve {}: {source}", path.display())]
    Resolve { path: PathBuf, source: std::io::Error },
    #[error(transparent)]
    Locate(#[from] LocateError),
    #[error(transparent)]
    Pass(#[from] anyhow::Error),
}

/// Résout le chemin cible en texte absolu.
pub fn resolve_target(base: &Path, update_path: &UpdatePath) -> Result<String, RelocateError> {
    let target = match update_path {
        UpdatePath::Auto => std::path::absolute(base)
            .map_err(|source| RelocateError::Resolve { path: base.to_path_buf(), source })?,
        UpdatePath::Path(p) => p.clone(),
    };
    if !target.is_absolute() {
        return Err(RelocateError::NotAbsolute(target));
    }
    target.into_os_string().into_string().map_err(|raw| RelocateError::NonUtf8(PathBuf::from(raw)))
}

/// Relocalise l’installation décrite par `task`.
///
/// Aucun fichier n’est touché si la cible n’est pas absolue ou si le dossier
/// n’est pas une installation Python.
pub fn relocate(task: &RelocateTask, cfg: &RelocateConfig) -> Result<RelocationReport, RelocateError> {
    let new_path = resolve_target(&task.base, &task.update_path)?;
    let install = locate(&task.base, cfg)?;
    debug!("installation {:?} → {new_path}", install);

    let scripts = update_scripts(&install.scripts_dir, &new_path, cfg)?;
    info!("scripts: {} réécrit(s)", scripts.rewritten.len());
    let bytecode = update_pycs(&install, &new_path, cfg)?;
    info!("bytecode: {} réécrit(s)", bytecode.rewritten.len());

    Ok(RelocationReport { new_path, lib_dir: install.lib_dir, scripts, bytecode })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Flavor;
    use pretty_assertions::assert_eq;
    use std::fs;

    #[test]
    fn parse_update_path() {
        assert_eq!("auto".parse::<UpdatePath>().unwrap(), UpdatePath::Auto);
        assert_eq!("/opt/py".parse::<UpdatePath>().unwrap(), UpdatePath::Path("/opt/py".into()));
    }

    #[test]
    fn relative_target_rejected() {
        let err = resolve_target(Path::new("/x"), &UpdatePath::Path("rel/py".into())).unwrap_err();
        assert_eq!(err.to_string(), "rel/py is not an absolute path");
    }

    #[test]
    fn auto_target_is_absolute_base() {
        let dir = tempfile::tempdir().unwrap();
        let target = resolve_target(dir.path(), &UpdatePath::Auto).unwrap();
        assert!(Path::new(&target).is_absolute());
        assert!(target.ends_with(dir.path().file_name().unwrap().to_str().unwrap()));
    }

    #[test]
    fn invalid_installation_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("bin")).unwrap();
        let script = dir.path().join("bin/tool");
        fs::write(&script, "#!/old/bin/python\n").unwrap();

        let task = RelocateTask { base: dir.path().to_path_buf(), update_path: UpdatePath::Path("/new".into()) };
        let err = relocate(&task, &RelocateConfig::new(Flavor::Posix)).unwrap_err();
        assert!(matches!(err, RelocateError::Locate(_)));
        assert_eq!(fs::read_to_string(&script).unwrap(), "#!/old/bin/python\n");
    }
}
