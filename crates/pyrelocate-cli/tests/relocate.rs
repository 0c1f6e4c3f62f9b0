//! Relocalisation de bout en bout sur une installation factice.

use std::fs;
use std::path::Path;
use std::process::Command;

use pretty_assertions::assert_eq;
use pyrelocate_cli::{relocate, Flavor, RelocateConfig, RelocateTask, UpdatePath};
use pyrelocate_pyc::{Code, Object, PycFile, PycFormat, StrKind, Value};

const PIP: &str = "#!/old/prefix/bin/python\n# -*- coding: utf-8 -*-\nimport sys\nfrom pip import main\nsys.exit(main())\n";
const ENV_SCRIPT: &str = "#!/usr/bin/env python\nprint('hi')\n";

fn text(t: &str) -> Object { Object::text(StrKind::ShortAscii, t) }

fn code(name: &str, filename: &str, consts: Vec<Object>) -> Code {
    Code {
        counters: vec![0, 0, 0, 0, 2, 64],
        code: Object::new(Value::Str(StrKind::Bytes, vec![0x64, 0x00, 0x53, 0x00])),
        consts: Object::new(Value::SmallTuple(consts)),
        names_and_locals: (0..4).map(|_| Object::new(Value::SmallTuple(vec![]))).collect(),
        filename: text(filename),
        names_after: vec![text(name)],
        firstlineno: 1,
        tables: vec![Object::new(Value::Str(StrKind::Bytes, vec![0x02, 0x01]))],
    }
}

/// Module 3.9 avec une fonction contenant elle-même une fermeture.
fn pyc_bytes(filename: &str) -> Vec<u8> {
    let inner = code("inner", filename, vec![Object::new(Value::None)]);
    let outer = code("outer", filename, vec![Object::new(Value::Code(Box::new(inner))), text("outer.<locals>.inner")]);
    let module = code("<module>", filename, vec![Object::new(Value::Code(Box::new(outer))), text("outer")]);
    let format = PycFormat::from_magic(3425).unwrap();
    PycFile::assemble(format, &format.blank_header(), &Object::new(Value::Code(Box::new(module)))).unwrap().to_bytes()
}

fn fake_install(base: &Path) {
    let lib = base.join("lib/python3.9");
    fs::create_dir_all(base.join("bin")).unwrap();
    fs::create_dir_all(lib.join("json/__pycache__")).unwrap();
    fs::write(base.join("bin/python"), b"\x7fELF").unwrap();
    fs::write(base.join("bin/pip"), PIP).unwrap();
    fs::write(base.join("bin/envtool"), ENV_SCRIPT).unwrap();
    fs::write(lib.join("json/__pycache__/decoder.cpython-39.pyc"), pyc_bytes("/old/prefix/lib/python3.9/json/decoder.py")).unwrap();
    fs::write(lib.join("json/decoder.py"), "pass\n").unwrap();
}

fn all_filenames(pyc: &PycFile) -> Vec<String> {
    fn walk(pyc: &PycFile, code: &Code, out: &mut Vec<String>) {
        out.push(pyc.filename_of(code).unwrap_or_default());
        for nested in code.nested() {
            walk(pyc, nested, out);
        }
    }
    let mut out = Vec::new();
    walk(pyc, pyc.code(), &mut out);
    out
}

#[test]
fn relocates_scripts_and_bytecode() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path();
    fake_install(base);

    let task = RelocateTask { base: base.to_path_buf(), update_path: UpdatePath::Path("/new/prefix".into()) };
    let cfg = RelocateConfig::new(Flavor::Posix);
    let report = relocate(&task, &cfg).unwrap();

    assert_eq!(report.new_path, "/new/prefix");
    assert_eq!(report.scripts.rewritten, vec![base.join("bin/pip")]);
    assert_eq!(report.scripts.ineligible, 1);
    assert_eq!(report.bytecode.rewritten.len(), 1);

    let pip = fs::read_to_string(base.join("bin/pip")).unwrap();
    assert_eq!(pip, PIP.replacen("#!/old/prefix/bin/python", "#!/new/prefix/bin/python -s", 1));
    assert_eq!(fs::read_to_string(base.join("bin/envtool")).unwrap(), ENV_SCRIPT);

    let pyc = PycFile::from_bytes(&fs::read(&report.bytecode.rewritten[0]).unwrap()).unwrap();
    assert_eq!(all_filenames(&pyc), vec!["/new/prefix/lib/python3.9/json/decoder.py"; 3]);
}

#[test]
fn second_pass_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path();
    fake_install(base);
    let task = RelocateTask { base: base.to_path_buf(), update_path: UpdatePath::Path("/new/prefix".into()) };
    let cfg = RelocateConfig::new(Flavor::Posix);

    relocate(&task, &cfg).unwrap();
    let pyc_path = base.join("lib/python3.9/json/__pycache__/decoder.cpython-39.pyc");
    let pip_after = fs::read(base.join("bin/pip")).unwrap();
    let pyc_after = fs::read(&pyc_path).unwrap();

    let again = relocate(&task, &cfg).unwrap();
    assert_eq!(again.changed(), 0);
    assert_eq!(again.scripts.up_to_date, 1);
    assert_eq!(again.bytecode.up_to_date, 1);
    assert_eq!(fs::read(base.join("bin/pip")).unwrap(), pip_after);
    assert_eq!(fs::read(&pyc_path).unwrap(), pyc_after);
}

// ───────────────────────────── Binaire ─────────────────────────────

fn pyrelocate() -> Command { Command::new(env!("CARGO_BIN_EXE_pyrelocate")) }

#[cfg(unix)]
#[test]
fn binary_auto_prints_json_report() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path();
    fake_install(base);

    let out = pyrelocate().arg(base).arg("--json").output().unwrap();
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    let report: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    let expected = std::path::absolute(base).unwrap();
    assert_eq!(report["new_path"], expected.to_str().unwrap());
    let pip = fs::read_to_string(base.join("bin/pip")).unwrap();
    assert!(pip.starts_with(&format!("#!{}/bin/python -s\n", expected.display())));
}

#[test]
fn binary_rejects_non_installation() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("lib/python3.9")).unwrap();

    let out = pyrelocate().arg(dir.path()).output().unwrap();
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.starts_with("error: "), "{stderr}");
    assert!(stderr.contains("does not refer to a Python installation"), "{stderr}");
}

#[test]
fn binary_rejects_relative_target_before_touching_files() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path();
    fake_install(base);

    let out = pyrelocate().arg(base).args(["--update-path", "relative/prefix"]).output().unwrap();
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("relative/prefix is not an absolute path"));
    assert_eq!(fs::read_to_string(base.join("bin/pip")).unwrap(), PIP);
}
