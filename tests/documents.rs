use std::{fs, path::Path};

use pretty_assertions::assert_eq;
use tempfile::TempDir;
use yamlet::{
    execute, execute_source, execute_to_string, ErrorKind, Node, Options, YamletError,
    YamletResult,
};

fn write(dir: &TempDir, name: &str, source: &str) {
    let path = dir.path().join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, source).unwrap();
}

fn run(dir: &TempDir, name: &str) -> YamletResult<Node> {
    execute(dir.path().join(name), &Options::default())
}

#[test]
fn evaluates_the_readme_example() -> YamletResult<()> {
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        "main.yaml",
        "\
imports:
  utils: utils.yaml
result:
  just_an_expr: (1 + 2)
  not_an_expr: 1 + 2
  some_func_calls: (utils.add(1, utils.add(2, 3)))
  ratio: (6 / 3)
",
    );
    write(
        &dir,
        "utils.yaml",
        "\
exports:
  add: !func
    params: [x, y]
    result: x + y
",
    );

    let output = execute_to_string(dir.path().join("main.yaml"), &Options::default())?;
    assert_eq!(
        output,
        "just_an_expr: 3\nnot_an_expr: 1 + 2\nsome_func_calls: 6\nratio: 2.0\n"
    );
    Ok(())
}

#[test]
fn imports_resolve_relative_to_the_importing_file() -> YamletResult<()> {
    let dir = TempDir::new().unwrap();
    write(&dir, "main.yaml", "imports:\n  a: lib/a.yaml\nresult: (a.value)\n");
    write(&dir, "lib/a.yaml", "imports:\n  b: ../shared/b.yaml\nexports:\n  value: (b.base * 2)\n");
    write(&dir, "shared/b.yaml", "exports:\n  base: 21\n");

    assert_eq!(run(&dir, "main.yaml")?, Node::Int(42));
    Ok(())
}

#[test]
fn diamond_imports_share_one_module() -> YamletResult<()> {
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        "main.yaml",
        "\
imports:
  left: left.yaml
  right: right.yaml
result:
  sum: (left.total + right.total)
",
    );
    write(&dir, "left.yaml", "imports:\n  c: common.yaml\nexports:\n  total: (c.n + 1)\n");
    write(&dir, "right.yaml", "imports:\n  c: ./common.yaml\nexports:\n  total: (c.n + 2)\n");
    write(&dir, "common.yaml", "exports:\n  n: 10\n");

    let output = run(&dir, "main.yaml")?;
    assert_eq!(output.as_mapping().unwrap()["sum"], Node::Int(23));
    Ok(())
}

#[test]
fn import_cycles_are_reported_even_when_unused() {
    let dir = TempDir::new().unwrap();
    write(&dir, "a.yaml", "imports:\n  b: b.yaml\nresult: 1\n");
    write(&dir, "b.yaml", "imports:\n  a: a.yaml\n");

    let err = run(&dir, "a.yaml").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CyclicImport);
    match err.root() {
        YamletError::CyclicImport { chain, .. } => {
            let names: Vec<_> = chain
                .iter()
                .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
                .collect();
            assert_eq!(names, vec!["a.yaml", "b.yaml", "a.yaml"]);
        }
        other => panic!("expected cyclic import, got {:?}", other),
    }
}

#[test]
fn missing_import_is_reported_with_the_importer() {
    let dir = TempDir::new().unwrap();
    write(&dir, "main.yaml", "imports:\n  gone: gone.yaml\nresult: 1\n");

    let err = run(&dir, "main.yaml").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ImportNotFound);
    let message = err.to_string();
    assert!(message.contains("`gone`"), "{}", message);
    assert!(message.contains("main.yaml"), "{}", message);
}

#[test]
fn missing_root_document_fails() {
    let dir = TempDir::new().unwrap();
    let err = run(&dir, "absent.yaml").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ImportNotFound);
}

#[test]
fn malformed_yaml_names_the_file() {
    let dir = TempDir::new().unwrap();
    write(&dir, "main.yaml", "imports:\n  lib: broken.yaml\nresult: (lib.x)\n");
    write(&dir, "broken.yaml", "exports: [1, 2\n");

    let err = run(&dir, "main.yaml").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Yaml);
    assert!(err.to_string().contains("broken.yaml"));
}

#[test]
fn execution_is_idempotent() -> YamletResult<()> {
    let dir = TempDir::new().unwrap();
    write(&dir, "main.yaml", "imports:\n  u: u.yaml\nresult:\n  - (u.f(3))\n  - (u.half)\n");
    write(
        &dir,
        "u.yaml",
        "exports:\n  half: (1 / 2)\n  f: !func\n    params: [x]\n    result: x * x + half\n",
    );

    let first = run(&dir, "main.yaml")?;
    let second = run(&dir, "main.yaml")?;
    assert_eq!(first, second);
    assert_eq!(
        first,
        Node::Sequence(vec![Node::Float(9.5), Node::Float(0.5)])
    );
    Ok(())
}

#[test]
fn execute_source_resolves_imports_next_to_the_given_path() -> YamletResult<()> {
    let dir = TempDir::new().unwrap();
    write(&dir, "lib.yaml", "exports:\n  greeting: hello\n");

    let output = execute_source(
        dir.path().join("inline.yaml"),
        "imports:\n  lib: lib.yaml\nresult: (lib.greeting + ', world')\n",
        &Options::default(),
    )?;
    assert_eq!(output, Node::text("hello, world"));
    Ok(())
}

#[test]
fn call_depth_is_configurable() {
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        "main.yaml",
        "\
exports:
  down: !func
    params: [n]
    result: down(n - 1)
result: (down(10))
",
    );

    let options = Options { max_call_depth: 8 };
    let err = execute(Path::new(&dir.path().join("main.yaml")), &options).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RecursionLimit);
}
