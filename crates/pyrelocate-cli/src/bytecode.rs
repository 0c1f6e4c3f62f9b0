//! Passe bytecode : parcours de la bibliothèque et réécriture des `.pyc`.

use std::ffi::OsStr;
use std::fs;
use std::path::{Component, Path};

use anyhow::{Context, Result};
use log::{info, warn};
use pyrelocate_pyc::PycFile;
use walkdir::WalkDir;

use crate::config::RelocateConfig;
use crate::layout::Installation;
use crate::report::BytecodeSummary;

const CACHE_DIR: &str = "__pycache__";

/// Réécrit le chemin source de tous les objets code de `path`.
/// Renvoie `true` si le fichier a été réécrit.
pub fn update_pyc(path: &Path, new_source: &str) -> Result<bool> {
    let data = fs::read(path).with_context(|| format!("lecture de {}", path.display()))?;
    let mut pyc = PycFile::from_bytes(&data).with_context(|| format!("décodage de {}", path.display()))?;
    if !pyc.relocate(new_source) {
        return Ok(false);
    }
    fs::write(path, pyc.to_bytes()).with_context(|| format!("écriture de {}", path.display()))?;
    info!("B: {}", path.display());
    Ok(true)
}

/// Chemin source logique d’un fichier bytecode une fois l’installation en
/// `new_path` : `__pycache__` est retiré et `mod.cpython-39.pyc` devient `mod.py`.
///
/// `None` si `file` n’est pas sous `base` ou n’a pas de nom exploitable.
pub fn logical_source_path(base: &Path, file: &Path, new_path: &str, cfg: &RelocateConfig) -> Option<String> {
    let rel = file.strip_prefix(base).ok()?;
    let stem = rel.file_stem()?.to_str()?;
    let parent = rel.parent()?;
    let cached = parent.file_name() == Some(OsStr::new(CACHE_DIR));
    let module = if cached { stem.split('.').next()? } else { stem };

    let file_name = format!("{module}.py");
    let mut parts = Vec::new();
    for comp in parent.components() {
        match comp {
            Component::Normal(name) if !(cached && name == CACHE_DIR) => parts.push(name.to_str()?),
            Component::Normal(_) | Component::CurDir => {}
            _ => return None,
        }
    }
    parts.push(file_name.as_str());
    Some(cfg.join(new_path, &parts))
}

fn is_bytecode(path: &Path) -> bool {
    matches!(path.extension().and_then(OsStr::to_str), Some("pyc" | "pyo"))
}

/// Parcourt `install.lib_dir` (ordre alphabétique) et met à jour chaque
/// `.pyc`/`.pyo`. La première erreur de fichier interrompt la passe.
pub fn update_pycs(install: &Installation, new_path: &str, cfg: &RelocateConfig) -> Result<BytecodeSummary> {
    let mut summary = BytecodeSummary::default();
    for entry in WalkDir::new(&install.lib_dir).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("parcours de {}: {err}", install.lib_dir.display());
                continue;
            }
        };
        let path = entry.path();
        if !entry.file_type().is_file() || !is_bytecode(path) {
            continue;
        }
        let Some(source) = logical_source_path(&install.base, path, new_path, cfg) else {
            continue;
        };
        if update_pyc(path, &source)? {
            summary.rewritten.push(path.to_path_buf());
        } else {
            summary.up_to_date += 1;
        }
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Flavor;
    use pretty_assertions::assert_eq;
    use pyrelocate_pyc::{Code, Object, PycFormat, StrKind, Value};

    fn cfg() -> RelocateConfig { RelocateConfig::new(Flavor::Posix) }

    fn module_pyc(filename: &str) -> Vec<u8> {
        let format = PycFormat::from_magic(3439).expect("3.8 magic");
        let s = |t: &str| Object::text(StrKind::ShortAscii, t);
        let func = Code {
            counters: vec![0, 0, 0, 1, 0, 67],
            code: Object::new(Value::Str(StrKind::Bytes, vec![0x64, 0x00, 0x53, 0x00])),
            consts: Object::new(Value::SmallTuple(vec![Object::new(Value::None)])),
            names_and_locals: (0..4).map(|_| Object::new(Value::SmallTuple(vec![]))).collect(),
            filename: s(filename),
            names_after: vec![s("f")],
            firstlineno: 1,
            tables: vec![Object::new(Value::Str(StrKind::Bytes, vec![]))],
        };
        let mut module = func.clone();
        module.names_after = vec![s("<module>")];
        module.consts = Object::new(Value::SmallTuple(vec![Object::new(Value::Code(Box::new(func))), s("f")]));
        let root = Object::new(Value::Code(Box::new(module)));
        PycFile::assemble(format, &format.blank_header(), &root).expect("valid pyc").to_bytes()
    }

    #[test]
    fn logical_path_drops_cache_dir_and_tag() {
        let base = Path::new("/old");
        assert_eq!(
            logical_source_path(base, Path::new("/old/lib/python3.11/pkg/__pycache__/mod.cpython-311.pyc"), "/new", &cfg())
                .as_deref(),
            Some("/new/lib/python3.11/pkg/mod.py")
        );
        assert_eq!(
            logical_source_path(base, Path::new("/old/lib/python3.11/pkg/__pycache__/mod.cpython-311.opt-1.pyc"), "/new", &cfg())
                .as_deref(),
            Some("/new/lib/python3.11/pkg/mod.py")
        );
        assert_eq!(
            logical_source_path(base, Path::new("/old/lib/python2.7/os.pyo"), "/new/", &cfg()).as_deref(),
            Some("/new/lib/python2.7/os.py")
        );
        assert_eq!(logical_source_path(base, Path::new("/elsewhere/x.pyc"), "/new", &cfg()), None);
    }

    #[test]
    fn update_pyc_rewrites_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mod.pyc");
        fs::write(&path, module_pyc("/old/mod.py")).unwrap();

        assert!(update_pyc(&path, "/new/mod.py").unwrap());
        let pyc = PycFile::from_bytes(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(pyc.source_path().as_deref(), Some("/new/mod.py"));
        let nested = pyc.code().nested().next().unwrap();
        assert_eq!(pyc.filename_of(nested).as_deref(), Some("/new/mod.py"));

        let before = fs::read(&path).unwrap();
        assert!(!update_pyc(&path, "/new/mod.py").unwrap());
        assert_eq!(fs::read(&path).unwrap(), before);
    }

    #[test]
    fn corrupt_pyc_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.pyc");
        fs::write(&path, b"\x55\x0d\x0d\x0a\0\0\0\0\0\0\0\0\0\0\0\0\xff").unwrap();
        let err = update_pyc(&path, "/new/bad.py").unwrap_err();
        assert!(format!("{err:#}").contains("bad.pyc"));
    }

    #[test]
    fn walk_updates_only_bytecode() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path();
        let lib = base.join("lib/python3.8");
        fs::create_dir_all(lib.join("pkg/__pycache__")).unwrap();
        fs::write(lib.join("pkg/__pycache__/mod.cpython-38.pyc"), module_pyc("/old/lib/python3.8/pkg/mod.py")).unwrap();
        fs::write(lib.join("pkg/mod.py"), "x = 1\n").unwrap();
        fs::write(lib.join("notes.txt"), "hello").unwrap();

        let install = Installation {
            base: base.to_path_buf(),
            scripts_dir: base.join("bin"),
            lib_name: "python3.8".into(),
            lib_dir: lib.clone(),
        };
        let summary = update_pycs(&install, "/new", &cfg()).unwrap();
        assert_eq!(summary.rewritten, vec![lib.join("pkg/__pycache__/mod.cpython-38.pyc")]);

        let pyc = PycFile::from_bytes(&fs::read(&summary.rewritten[0]).unwrap()).unwrap();
        assert_eq!(pyc.source_path().as_deref(), Some("/new/lib/python3.8/pkg/mod.py"));

        let again = update_pycs(&install, "/new", &cfg()).unwrap();
        assert!(again.rewritten.is_empty());
        assert_eq!(again.up_to_date, 1);
    }
}
