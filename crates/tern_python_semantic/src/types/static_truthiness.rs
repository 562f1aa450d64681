use rustpython_ast as ast;

use crate::module_resolver::ExecutionEnvironment;

/// Statically evaluates an `if`/`while` test against the execution
/// environment. Returns `None` when the expression is not one of the
/// recognized patterns.
///
/// Recognized: comparisons of `sys.version_info` (optionally subscripted
/// with `[0]`) against int tuples or ints, comparisons of `sys.platform`
/// and `os.name` against string literals, the bare name `TYPE_CHECKING`,
/// literal `True`/`False`, and `not`/`and`/`or` combinations thereof.
pub fn evaluate(test: &ast::Expr, env: &ExecutionEnvironment) -> Option<bool> {
    match test {
        ast::Expr::Constant(ast::ExprConstant {
            value: ast::Constant::Bool(value),
            ..
        }) => Some(*value),
        ast::Expr::Name(name) if name.id.as_str() == "TYPE_CHECKING" => Some(true),
        ast::Expr::Attribute(attribute) => {
            // `typing.TYPE_CHECKING`
            if attribute.attr.as_str() == "TYPE_CHECKING" {
                Some(true)
            } else {
                None
            }
        }
        ast::Expr::UnaryOp(ast::ExprUnaryOp {
            op: ast::UnaryOp::Not,
            operand,
            ..
        }) => evaluate(operand, env).map(|value| !value),
        ast::Expr::BoolOp(ast::ExprBoolOp { op, values, .. }) => {
            let mut folded = matches!(op, ast::BoolOp::And);
            for value in values {
                let value = evaluate(value, env)?;
                folded = match op {
                    ast::BoolOp::And => folded && value,
                    ast::BoolOp::Or => folded || value,
                };
            }
            Some(folded)
        }
        ast::Expr::Compare(compare) => evaluate_comparison(compare, env),
        _ => None,
    }
}

/// One arm of an `if`/`elif`/`else` chain with its static liveness.
///
/// A dead arm is not walked at all: no names bound, no diagnostics. The
/// test expression of an arm is itself dead once an earlier arm was
/// statically taken.
#[derive(Copy, Clone, Debug)]
pub struct IfBranch<'a> {
    pub test: Option<&'a ast::Expr>,
    pub body: &'a [ast::Stmt],
    /// Static value of the test, when decidable.
    pub test_value: Option<bool>,
    pub test_is_live: bool,
    pub body_is_live: bool,
}

pub fn if_branches<'a>(stmt: &'a ast::StmtIf, env: &ExecutionEnvironment) -> Vec<IfBranch<'a>> {
    let mut branches = Vec::with_capacity(stmt.elif_else_clauses.len() + 1);
    let mut taken = false;

    let test_value = evaluate(&stmt.test, env);
    branches.push(IfBranch {
        test: Some(&stmt.test),
        body: &stmt.body,
        test_value,
        test_is_live: true,
        body_is_live: test_value != Some(false),
    });
    taken |= test_value == Some(true);

    for clause in &stmt.elif_else_clauses {
        if taken {
            branches.push(IfBranch {
                test: clause.test.as_ref(),
                body: &clause.body,
                test_value: None,
                test_is_live: false,
                body_is_live: false,
            });
            continue;
        }
        let test_value = clause.test.as_ref().and_then(|test| evaluate(test, env));
        branches.push(IfBranch {
            test: clause.test.as_ref(),
            body: &clause.body,
            test_value,
            test_is_live: true,
            body_is_live: test_value != Some(false),
        });
        taken |= clause.test.is_none() || test_value == Some(true);
    }

    branches
}

fn evaluate_comparison(compare: &ast::ExprCompare, env: &ExecutionEnvironment) -> Option<bool> {
    let [op] = compare.ops.as_slice() else {
        return None;
    };
    let [right] = compare.comparators.as_slice() else {
        return None;
    };

    match classify(&compare.left)? {
        StaticOperand::VersionInfo => {
            let expected = tuple_of_ints(right)?;
            let actual = vec![
                u32::from(env.python_version.major),
                u32::from(env.python_version.minor),
            ];
            Some(compare_sequences(&actual, &expected, *op)?)
        }
        StaticOperand::VersionMajor => {
            let expected = int_value(right)?;
            compare_ints(u32::from(env.python_version.major), expected, *op)
        }
        StaticOperand::SysPlatform => {
            let expected = string_value(right)?;
            let actual = env.python_platform.sys_platform()?;
            compare_strings(actual, expected, *op)
        }
        StaticOperand::OsName => {
            let expected = string_value(right)?;
            let actual = env.python_platform.os_name()?;
            compare_strings(actual, expected, *op)
        }
    }
}

enum StaticOperand {
    VersionInfo,
    VersionMajor,
    SysPlatform,
    OsName,
}

fn classify(expr: &ast::Expr) -> Option<StaticOperand> {
    match expr {
        ast::Expr::Attribute(attribute) => {
            let base = attribute_base(&attribute.value)?;
            match (base, attribute.attr.as_str()) {
                ("sys", "version_info") => Some(StaticOperand::VersionInfo),
                ("sys", "platform") => Some(StaticOperand::SysPlatform),
                ("os", "name") => Some(StaticOperand::OsName),
                _ => None,
            }
        }
        ast::Expr::Subscript(subscript) => {
            // `sys.version_info[0]`
            if !matches!(classify(&subscript.value), Some(StaticOperand::VersionInfo)) {
                return None;
            }
            if int_value(&subscript.slice)? == 0 {
                Some(StaticOperand::VersionMajor)
            } else {
                None
            }
        }
        _ => None,
    }
}

fn attribute_base(expr: &ast::Expr) -> Option<&str> {
    match expr {
        ast::Expr::Name(name) => Some(name.id.as_str()),
        _ => None,
    }
}

fn int_value(expr: &ast::Expr) -> Option<u32> {
    match expr {
        ast::Expr::Constant(ast::ExprConstant {
            value: ast::Constant::Int(value),
            ..
        }) => value.to_string().parse().ok(),
        _ => None,
    }
}

fn string_value(expr: &ast::Expr) -> Option<&str> {
    match expr {
        ast::Expr::Constant(ast::ExprConstant {
            value: ast::Constant::Str(value),
            ..
        }) => Some(value),
        _ => None,
    }
}

fn tuple_of_ints(expr: &ast::Expr) -> Option<Vec<u32>> {
    match expr {
        ast::Expr::Tuple(tuple) => tuple.elts.iter().map(int_value).collect(),
        _ => None,
    }
}

fn compare_ints(actual: u32, expected: u32, op: ast::CmpOp) -> Option<bool> {
    Some(match op {
        ast::CmpOp::Eq => actual == expected,
        ast::CmpOp::NotEq => actual != expected,
        ast::CmpOp::Lt => actual < expected,
        ast::CmpOp::LtE => actual <= expected,
        ast::CmpOp::Gt => actual > expected,
        ast::CmpOp::GtE => actual >= expected,
        _ => return None,
    })
}

fn compare_sequences(actual: &[u32], expected: &[u32], op: ast::CmpOp) -> Option<bool> {
    let ordering = actual
        .iter()
        .chain(std::iter::repeat(&0))
        .take(actual.len().max(expected.len()))
        .cmp(expected.iter().chain(std::iter::repeat(&0)).take(actual.len().max(expected.len())));
    Some(match op {
        ast::CmpOp::Eq => ordering.is_eq(),
        ast::CmpOp::NotEq => !ordering.is_eq(),
        ast::CmpOp::Lt => ordering.is_lt(),
        ast::CmpOp::LtE => ordering.is_le(),
        ast::CmpOp::Gt => ordering.is_gt(),
        ast::CmpOp::GtE => ordering.is_ge(),
        _ => return None,
    })
}

fn compare_strings(actual: &str, expected: &str, op: ast::CmpOp) -> Option<bool> {
    match op {
        ast::CmpOp::Eq => Some(actual == expected),
        ast::CmpOp::NotEq => Some(actual != expected),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::evaluate;
    use crate::module_resolver::ExecutionEnvironment;
    use crate::python_platform::PythonPlatform;
    use crate::python_version::PythonVersion;
    use rustpython_parser::Parse;

    fn env() -> ExecutionEnvironment {
        ExecutionEnvironment {
            python_version: PythonVersion::PY38,
            python_platform: PythonPlatform::Linux,
            ..ExecutionEnvironment::default()
        }
    }

    fn eval(source: &str) -> Option<bool> {
        let expr = rustpython_ast::Expr::parse(source, "<test>").unwrap();
        evaluate(&expr, &env())
    }

    #[test]
    fn version_guards() {
        assert_eq!(eval("sys.version_info >= (3, 9)"), Some(false));
        assert_eq!(eval("sys.version_info >= (3, 8)"), Some(true));
        assert_eq!(eval("sys.version_info < (3, 0)"), Some(false));
        assert_eq!(eval("sys.version_info[0] >= 3"), Some(true));
    }

    #[test]
    fn platform_guards() {
        assert_eq!(eval("sys.platform == 'linux'"), Some(true));
        assert_eq!(eval("sys.platform == 'win32'"), Some(false));
        assert_eq!(eval("os.name == 'posix'"), Some(true));
    }

    #[test]
    fn boolean_combinations() {
        assert_eq!(eval("TYPE_CHECKING"), Some(true));
        assert_eq!(eval("not TYPE_CHECKING"), Some(false));
        assert_eq!(eval("True and sys.platform == 'linux'"), Some(true));
        assert_eq!(eval("flag"), None);
        assert_eq!(eval("flag and True"), None);
    }
}
