//! Integration tests exercising the pruning engine end to end against a
//! real overlay mount and a real Python interpreter. These require
//! `fuse-overlayfs` (or kernel overlay permissions), `strace`, and a
//! `python3` on `PATH`, so they're `#[ignore]`d by default; run them
//! explicitly with `cargo test -- --ignored`.

use std::path::Path;

use anyhow::Result;
use camino::Utf8PathBuf;

use pip_prune::ignore::IgnoreSet;
use pip_prune::oracle::Oracle;
use pip_prune::prune;
use pip_prune::view::View;

/// Build a minimal reference install: `lib/python3/site-packages/<pkgs>`
/// plus a `bin/python3` symlink to the system interpreter.
fn build_reference_install(root: &Path, files: &[(&str, &str)]) -> Result<()> {
    let site_packages = root.join("lib").join("python3").join("site-packages");
    std::fs::create_dir_all(&site_packages)?;
    for (rel, contents) in files {
        let path = site_packages.join(rel);
        std::fs::create_dir_all(path.parent().unwrap())?;
        std::fs::write(path, contents)?;
    }
    let bin = root.join("bin");
    std::fs::create_dir_all(&bin)?;
    let system_python = find_on_path("python3").expect("python3 required for integration tests");
    std::os::unix::fs::symlink(system_python, bin.join("python3"))?;
    Ok(())
}

fn find_on_path(name: &str) -> Option<std::path::PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

#[test]
#[ignore = "requires fuse-overlayfs/overlay mount permissions and strace on PATH"]
fn no_op_install_is_fully_prunable() -> Result<()> {
    let ref_dir = tempfile::tempdir()?;
    build_reference_install(
        ref_dir.path(),
        &[("a/__init__.py", "VALUE = 1\n"), ("a/unused.py", "VALUE = 2\n")],
    )?;

    let tmp_root = Utf8PathBuf::from_path_buf(std::env::temp_dir()).unwrap();
    let reference_install = Utf8PathBuf::from_path_buf(ref_dir.path().to_path_buf()).unwrap();

    let mut view = View::create(&reference_install, &tmp_root)?;
    let ignores = IgnoreSet::load(None, false)?;
    let oracle = Oracle::new(vec!["-c".to_string(), "print(1)".to_string()], &tmp_root)?;

    let log = prune::run(&mut view, &oracle, &ignores, 1)?;
    assert!(log.accepted.iter().any(|p| p.starts_with("a/")));

    Ok(())
}

#[test]
#[ignore = "requires fuse-overlayfs/overlay mount permissions and strace on PATH"]
fn fully_used_install_prunes_nothing() -> Result<()> {
    let ref_dir = tempfile::tempdir()?;
    build_reference_install(
        ref_dir.path(),
        &[
            ("a/__init__.py", ""),
            ("b/__init__.py", ""),
            ("c/__init__.py", ""),
        ],
    )?;

    let tmp_root = Utf8PathBuf::from_path_buf(std::env::temp_dir()).unwrap();
    let reference_install = Utf8PathBuf::from_path_buf(ref_dir.path().to_path_buf()).unwrap();

    let mut view = View::create(&reference_install, &tmp_root)?;
    let ignores = IgnoreSet::load(None, false)?;
    let oracle = Oracle::new(
        vec!["-c".to_string(), "import a, b, c".to_string()],
        &tmp_root,
    )?;

    let log = prune::run(&mut view, &oracle, &ignores, 1)?;
    assert!(log.accepted.is_empty());

    Ok(())
}

#[test]
#[ignore = "requires fuse-overlayfs/overlay mount permissions and strace on PATH"]
fn hidden_data_file_is_protected_by_trace() -> Result<()> {
    let ref_dir = tempfile::tempdir()?;
    build_reference_install(
        ref_dir.path(),
        &[
            (
                "p/__init__.py",
                "import json, pathlib\njson.loads((pathlib.Path(__file__).parent / 'data.json').read_text())\n",
            ),
            ("p/data.json", "{}"),
            ("p/unused.py", "VALUE = 1\n"),
        ],
    )?;

    let tmp_root = Utf8PathBuf::from_path_buf(std::env::temp_dir()).unwrap();
    let reference_install = Utf8PathBuf::from_path_buf(ref_dir.path().to_path_buf()).unwrap();

    let mut view = View::create(&reference_install, &tmp_root)?;
    let ignores = IgnoreSet::load(None, false)?;
    let oracle = Oracle::new(vec!["-c".to_string(), "import p".to_string()], &tmp_root)?;

    let log = prune::run(&mut view, &oracle, &ignores, 1)?;
    assert!(!log.accepted.contains(&"p/data.json".to_string()));
    assert!(!log.accepted.contains(&"p/__init__.py".to_string()));
    assert!(log.accepted.contains(&"p/unused.py".to_string()));

    Ok(())
}

mod rollback {
    use super::*;

    #[test]
    #[ignore = "requires fuse-overlayfs/overlay mount permissions"]
    fn prune_then_unprune_restores_contents() -> Result<()> {
        let ref_dir = tempfile::tempdir()?;
        build_reference_install(ref_dir.path(), &[("a/mod.py", "VALUE = 1\n")])?;

        let tmp_root = Utf8PathBuf::from_path_buf(std::env::temp_dir()).unwrap();
        let reference_install = Utf8PathBuf::from_path_buf(ref_dir.path().to_path_buf()).unwrap();
        let mut view = View::create(&reference_install, &tmp_root)?;

        let before = view.contents("")?;
        view.prune("a/mod.py")?;
        assert!(!view.contents("")?.contains(&"a/mod.py".to_string()));
        view.unprune("a/mod.py")?;
        let after = view.contents("")?;

        assert_eq!(before, after);
        Ok(())
    }
}
