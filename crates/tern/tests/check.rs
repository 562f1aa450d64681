//! End-to-end checks over real files in a temporary workspace.

use std::path::PathBuf;

use tern::{CancellationToken, Configuration, Program};
use tern_python_semantic::diagnostic::{Diagnostic, DiagnosticLevel};
use tern_python_semantic::PythonVersion;

struct TestCase {
    _temp_dir: tempfile::TempDir,
    root: PathBuf,
    config: Configuration,
}

impl TestCase {
    fn new() -> Self {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let root = temp_dir.path().join("src");
        std::fs::create_dir(&root).expect("src dir");
        let root = root.canonicalize().expect("canonical root");
        let config = Configuration::new(root.clone());
        Self {
            _temp_dir: temp_dir,
            root,
            config,
        }
    }

    fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.root.join(name);
        std::fs::write(&path, textwrap::dedent(contents)).expect("write module");
        path
    }

    fn check(&self, name: &str) -> Vec<Diagnostic> {
        let mut program = Program::new(self.config.clone());
        let path = self.root.join(name);
        let results = program
            .check_path(&path, &CancellationToken::new())
            .expect("check to complete");
        results
            .into_iter()
            .find(|result| result.path == path)
            .map(|result| result.diagnostics)
            .unwrap_or_default()
    }

    fn check_all(&self, names: &[&str]) -> Vec<(PathBuf, Vec<Diagnostic>)> {
        let mut program = Program::new(self.config.clone());
        let paths: Vec<PathBuf> = names.iter().map(|name| self.root.join(name)).collect();
        let results = program
            .check_paths(&paths, &CancellationToken::new())
            .expect("check to complete");
        results
            .into_iter()
            .map(|result| (result.path, result.diagnostics))
            .collect()
    }
}

#[test]
fn optional_narrowing() {
    let case = TestCase::new();
    case.write(
        "main.py",
        r#"
        from typing import Optional
        def f(x: Optional[int]) -> int:
            if x is None:
                return 0
            return x
        "#,
    );
    let diagnostics = case.check("main.py");
    assert!(diagnostics.is_empty(), "expected none, got {diagnostics:#?}");
}

#[test]
fn isinstance_narrowing_on_a_union() {
    let case = TestCase::new();
    case.write(
        "main.py",
        r#"
        from typing import Union
        def f(x: Union[int, str]) -> int:
            if isinstance(x, str):
                return len(x)
            return x + 1
        "#,
    );
    let diagnostics = case.check("main.py");
    assert!(diagnostics.is_empty(), "expected none, got {diagnostics:#?}");
}

#[test]
fn static_version_guard_suppresses_dead_branch() {
    let mut case = TestCase::new();
    case.config.python_version = PythonVersion::PY38;
    case.write(
        "main.py",
        r#"
        import sys
        if sys.version_info >= (3, 9):
            def f(): return undefined_name
        else:
            def f(): return 1
        "#,
    );
    let diagnostics = case.check("main.py");
    assert!(
        !diagnostics
            .iter()
            .any(|diagnostic| diagnostic.message.contains("undefined_name")),
        "dead branch must not be analyzed: {diagnostics:#?}"
    );
}

#[test]
fn static_version_guard_takes_live_branch() {
    let mut case = TestCase::new();
    case.config.python_version = PythonVersion::PY39;
    case.write(
        "main.py",
        r#"
        import sys
        if sys.version_info >= (3, 9):
            def f(): return 1
        else:
            def f(): return undefined_name
        "#,
    );
    let diagnostics = case.check("main.py");
    assert!(diagnostics.is_empty(), "expected none, got {diagnostics:#?}");
}

#[test]
fn named_tuple_synthesis() {
    let case = TestCase::new();
    case.write(
        "main.py",
        r#"
        from collections import namedtuple
        P = namedtuple("P", ["x", "y"])
        p = P(1, 2)
        p.x
        p.z
        "#,
    );
    let diagnostics = case.check("main.py");
    assert_eq!(diagnostics.len(), 1, "got {diagnostics:#?}");
    assert!(diagnostics[0]
        .message
        .contains("'z' is not a known member"));
}

#[test]
fn missing_import_is_reported_once() {
    let case = TestCase::new();
    case.write("main.py", "import nonexistent_module\n");
    let diagnostics = case.check("main.py");
    assert_eq!(diagnostics.len(), 1, "got {diagnostics:#?}");
    assert!(diagnostics[0].is_error());
    assert!(diagnostics[0]
        .message
        .starts_with("Import 'nonexistent_module' could not be resolved"));
}

#[test]
fn missing_import_severity_follows_settings() {
    let mut case = TestCase::new();
    case.config
        .diagnostic_settings
        .apply("reportMissingImports", "none");
    case.write("main.py", "import nonexistent_module\n");
    assert!(case.check("main.py").is_empty());

    case.config.diagnostic_settings.missing_imports = DiagnosticLevel::Warning;
    let diagnostics = case.check("main.py");
    assert_eq!(diagnostics.len(), 1);
    assert!(!diagnostics[0].is_error());
}

#[test]
fn import_cycles_are_detected_and_bounded() {
    let case = TestCase::new();
    case.write("a.py", "import b\n");
    case.write("b.py", "import c\n");
    case.write("c.py", "import a\n");

    let results = case.check_all(&["a.py"]);
    assert_eq!(results.len(), 3);
    for (path, diagnostics) in &results {
        let cycles = diagnostics
            .iter()
            .filter(|diagnostic| diagnostic.message.contains("Cycle detected"))
            .count();
        assert!(
            (1..=4).contains(&cycles),
            "expected 1..=4 cycle diagnostics for {}, got {diagnostics:#?}",
            path.display()
        );
    }
}

#[test]
fn cross_module_types_flow_through_imports() {
    let case = TestCase::new();
    case.write("lib.py", "class C:\n    pass\n");
    case.write(
        "main.py",
        r#"
        from lib import C
        value = C()
        "#,
    );
    let diagnostics = case.check("main.py");
    assert!(diagnostics.is_empty(), "got {diagnostics:#?}");
}

#[test]
fn unknown_import_symbol_is_reported() {
    let case = TestCase::new();
    case.write("lib.py", "x = 1\n");
    case.write("main.py", "from lib import missing\n");
    let diagnostics = case.check("main.py");
    assert_eq!(diagnostics.len(), 1, "got {diagnostics:#?}");
    assert!(diagnostics[0].message.contains("missing"));
}

#[test]
fn undefined_variable_is_reported() {
    let case = TestCase::new();
    case.write("main.py", "x = undefined_thing\n");
    let diagnostics = case.check("main.py");
    assert_eq!(diagnostics.len(), 1, "got {diagnostics:#?}");
    assert!(diagnostics[0].message.contains("'undefined_thing' is not defined"));
}

#[test]
fn type_ignore_comment_suppresses_line() {
    let case = TestCase::new();
    case.write("main.py", "x = undefined_thing  # type: ignore\ny = other_thing\n");
    let diagnostics = case.check("main.py");
    assert_eq!(diagnostics.len(), 1, "got {diagnostics:#?}");
    assert!(diagnostics[0].message.contains("other_thing"));
}

#[test]
fn file_level_type_ignore_suppresses_everything() {
    let case = TestCase::new();
    case.write("main.py", "# type: ignore\nx = undefined_thing\ny = other_thing\n");
    assert!(case.check("main.py").is_empty());
}

#[test]
fn type_ignore_can_be_disabled() {
    let mut case = TestCase::new();
    case.config.diagnostic_settings.enable_type_ignore_comments = false;
    case.write("main.py", "x = undefined_thing  # type: ignore\n");
    assert_eq!(case.check("main.py").len(), 1);
}

#[test]
fn directive_comments_override_settings() {
    let case = TestCase::new();
    case.write(
        "main.py",
        "# pyright: reportUndefinedVariable=warning\nx = undefined_thing\n",
    );
    let diagnostics = case.check("main.py");
    assert_eq!(diagnostics.len(), 1, "got {diagnostics:#?}");
    assert!(!diagnostics[0].is_error());
}

#[test]
fn ignore_globs_drop_all_diagnostics() {
    let mut case = TestCase::new();
    case.config.ignore = vec!["**/generated_*.py".to_string()];
    case.write("generated_main.py", "x = undefined_thing\n");
    assert!(case.check("generated_main.py").is_empty());
}

#[test]
fn nonlocal_at_module_level_is_an_error() {
    let case = TestCase::new();
    case.write("main.py", "nonlocal x\n");
    let diagnostics = case.check("main.py");
    assert_eq!(diagnostics.len(), 1, "got {diagnostics:#?}");
    assert!(diagnostics[0].message.contains("nonlocal"));
}

#[test]
fn annotated_assignment_checks_value() {
    let case = TestCase::new();
    case.write("main.py", "x: int = \"text\"\n");
    let diagnostics = case.check("main.py");
    assert_eq!(diagnostics.len(), 1, "got {diagnostics:#?}");
    assert!(diagnostics[0].message.contains("cannot be assigned"));
}

#[test]
fn compatible_annotated_assignments_pass() {
    let case = TestCase::new();
    case.write(
        "main.py",
        r#"
        from typing import Optional
        a: int = 1
        b: float = 2
        c: Optional[str] = None
        d: object = []
        "#,
    );
    let diagnostics = case.check("main.py");
    assert!(diagnostics.is_empty(), "got {diagnostics:#?}");
}

#[test]
fn truthiness_narrowing_removes_none() {
    let case = TestCase::new();
    case.write(
        "main.py",
        r#"
        from typing import Optional
        def f(x: Optional[int]) -> int:
            if x:
                return x
            return 0
        "#,
    );
    let diagnostics = case.check("main.py");
    assert!(diagnostics.is_empty(), "got {diagnostics:#?}");
}

#[test]
fn assignment_invalidates_earlier_narrowing() {
    let case = TestCase::new();
    case.write(
        "main.py",
        r#"
        from typing import Optional
        def f(x: Optional[int]) -> int:
            if x is None:
                x = 0
            return x
        "#,
    );
    let diagnostics = case.check("main.py");
    assert!(diagnostics.is_empty(), "got {diagnostics:#?}");
}

#[test]
fn relative_imports_resolve_inside_packages() {
    let case = TestCase::new();
    std::fs::create_dir(case.root.join("pkg")).unwrap();
    case.write("pkg/__init__.py", "");
    case.write("pkg/helper.py", "value = 1\n");
    case.write(
        "pkg/main.py",
        r#"
        from . import helper
        from .helper import value
        "#,
    );
    let diagnostics = case.check("pkg/main.py");
    assert!(diagnostics.is_empty(), "got {diagnostics:#?}");
}

#[test]
fn reanalysis_reaches_a_fixed_point() {
    let case = TestCase::new();
    case.write(
        "main.py",
        r#"
        def f():
            return g()

        def g():
            return 1
        "#,
    );
    // A converged second check over unchanged contents reports the same
    // diagnostics.
    let first = case.check("main.py");
    let second = case.check("main.py");
    assert_eq!(first, second);
    assert!(first.is_empty(), "got {first:#?}");
}

#[test]
fn cancellation_stops_the_check() {
    let case = TestCase::new();
    case.write("main.py", "x = 1\n");
    let mut program = Program::new(case.config.clone());
    let token = CancellationToken::new();
    token.cancel();
    let result = program.check_path(&case.root.join("main.py"), &token);
    assert!(result.is_err());
}
